//! Final summary output.

use anyhow::Context;
use loadgen_metrics::report::format_summary;
use loadgen_metrics::RunSummary;
use std::path::Path;

/// Write the summary as pretty JSON to `output_file`, or print the report
/// tables to stdout when no file is given.
pub fn emit(summary: &RunSummary, output_file: Option<&Path>) -> anyhow::Result<()> {
    match output_file {
        Some(path) => {
            let json = serde_json::to_string_pretty(summary)
                .context("Failed to serialize run summary")?;
            std::fs::write(path, json)
                .with_context(|| format!("Failed to write summary to {}", path.display()))?;
            tracing::info!("Summary written to {}", path.display());
        }
        None => println!("{}", format_summary(summary)),
    }
    Ok(())
}
