//! Human readable rendering of snapshots and summaries.

use crate::snapshot::{MetricsSnapshot, OperationSnapshot, RunSummary};
use comfy_table::{presets::UTF8_FULL, Cell, Color, Table};
use loadgen_core::ErrorKind;
use std::collections::BTreeMap;

/// One-line periodic stats message.
pub fn stats_line(snapshot: &MetricsSnapshot) -> String {
    let mut line = format!(
        "Stats: {} ops ({:.1} ops/sec interval, {:.1} ops/sec avg), {:.2}% success",
        format_number(snapshot.total_operations()),
        snapshot.interval_ops_per_second(),
        snapshot.ops_per_second(),
        snapshot.success_rate() * 100.0,
    );
    let errors = snapshot.errors_by_kind();
    if !errors.is_empty() {
        line.push_str(&format!(", errors: {}", format_errors(&errors)));
    }
    let conn = &snapshot.connections;
    if conn.drops > 0 || conn.hard_failures > 0 {
        line.push_str(&format!(
            ", connection drops: {}, closed: {}",
            conn.drops, conn.hard_failures
        ));
    }
    if !snapshot.channels.is_empty() {
        line.push_str(&format!(
            ", messages received: {}",
            format_number(snapshot.messages_received())
        ));
    }
    line
}

/// Per-operation table with a totals row.
pub fn format_table(operations: &BTreeMap<String, OperationSnapshot>) -> String {
    let mut table = Table::new();
    table.load_preset(UTF8_FULL);
    table.set_header(vec![
        "Operation", "Total", "Success", "Errors", "Avg ms", "P50 ms", "P95 ms", "P99 ms",
        "Max ms",
    ]);

    let mut total = 0;
    let mut success = 0;
    let mut errors = 0;
    for (name, op) in operations {
        total += op.total;
        success += op.success;
        errors += op.errors;
        let errors_cell = if op.errors > 0 {
            Cell::new(format_number(op.errors)).fg(Color::Red)
        } else {
            Cell::new("0")
        };
        table.add_row(vec![
            Cell::new(name),
            Cell::new(format_number(op.total)),
            Cell::new(format_number(op.success)),
            errors_cell,
            Cell::new(format!("{:.3}", op.avg_ms)),
            Cell::new(format!("{:.3}", op.p50_ms)),
            Cell::new(format!("{:.3}", op.p95_ms)),
            Cell::new(format!("{:.3}", op.p99_ms)),
            Cell::new(format!("{:.3}", op.max_ms)),
        ]);
    }

    table.add_row(vec![
        Cell::new("TOTAL").fg(Color::Cyan),
        Cell::new(format_number(total)),
        Cell::new(format_number(success)),
        Cell::new(format_number(errors)),
        Cell::new("-"),
        Cell::new("-"),
        Cell::new("-"),
        Cell::new("-"),
        Cell::new("-"),
    ]);
    table.to_string()
}

/// Full end-of-run report.
pub fn format_summary(summary: &RunSummary) -> String {
    let mut output = String::new();

    output.push_str(&format!(
        "Load test {} ({}) - app {}, instance {}, run {}\n",
        summary.termination,
        format_duration(summary.duration_secs),
        summary.identity.app_name,
        summary.identity.instance_id,
        summary.identity.run_id,
    ));
    output.push_str(&format!(
        "Started {}  Finished {}\n\n",
        summary.started_at.format("%Y-%m-%d %H:%M:%S UTC"),
        summary.finished_at.format("%Y-%m-%d %H:%M:%S UTC"),
    ));

    if summary.operations.is_empty() {
        output.push_str("No operations recorded.\n");
    } else {
        output.push_str(&format_table(&summary.operations));
        output.push('\n');
    }

    output.push_str("\nOverall:\n");
    output.push_str(&format!(
        "  Operations: {}  Success: {}  Failed: {}  Success rate: {:.2}%\n",
        format_number(summary.total_operations),
        format_number(summary.successful_operations),
        format_number(summary.failed_operations),
        summary.success_rate * 100.0
    ));
    output.push_str(&format!(
        "  Throughput: {:.1} ops/sec\n",
        summary.ops_per_second
    ));
    if !summary.errors_by_kind.is_empty() {
        output.push_str(&format!(
            "  Errors: {}\n",
            format_errors(&summary.errors_by_kind)
        ));
    }

    output.push_str("\nConnections:\n");
    output.push_str(&format!(
        "  Attempts: {}  Failures: {}  Success rate: {:.2}%\n",
        format_number(summary.connection_attempts),
        format_number(summary.connection_failures),
        summary.connection_success_rate * 100.0
    ));
    output.push_str(&format!(
        "  Drops: {}  Reconnections: {}  Avg reconnection: {:.1}ms  Max: {:.1}ms\n",
        format_number(summary.connection_drops),
        format_number(summary.reconnection_count),
        summary.avg_reconnection_ms,
        summary.max_reconnection_ms
    ));
    if summary.hard_connection_failures > 0 {
        output.push_str(&format!(
            "  Closed after exhausting retries: {}\n",
            summary.hard_connection_failures
        ));
    }

    if !summary.channels.is_empty() {
        output.push_str("\nPub/Sub:\n");
        for (channel, c) in &summary.channels {
            output.push_str(&format!(
                "  {channel}: {} received, {} receive errors\n",
                format_number(c.received),
                format_number(c.errors)
            ));
        }
    }

    output
}

fn format_errors(errors: &BTreeMap<ErrorKind, u64>) -> String {
    errors
        .iter()
        .map(|(kind, count)| format!("{kind}={count}"))
        .collect::<Vec<_>>()
        .join(", ")
}

/// Format duration in human-readable format.
pub fn format_duration(secs: f64) -> String {
    if secs < 60.0 {
        format!("{secs:.1}s")
    } else if secs < 3600.0 {
        let mins = (secs / 60.0).floor();
        let remaining_secs = secs - (mins * 60.0);
        format!("{}m {:02.0}s", mins as u64, remaining_secs)
    } else {
        let hours = (secs / 3600.0).floor();
        let remaining = secs - (hours * 3600.0);
        let mins = (remaining / 60.0).floor();
        format!("{}h {:02.0}m", hours as u64, mins as u64)
    }
}

/// Format number with thousands separators.
pub fn format_number(n: u64) -> String {
    let s = n.to_string();
    let mut result = String::with_capacity(s.len() + s.len() / 3);
    for (i, c) in s.chars().enumerate() {
        if i > 0 && (s.len() - i) % 3 == 0 {
            result.push(',');
        }
        result.push(c);
    }
    result
}
