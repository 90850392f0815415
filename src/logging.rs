//! Tracing subscriber setup.

use anyhow::Context;
use std::fs::OpenOptions;
use std::path::Path;
use std::sync::Mutex;
use tracing_subscriber::EnvFilter;

/// Map a `--log-level` value to an [`EnvFilter`] directive.
///
/// Accepts DEBUG, INFO, WARNING (or WARN) and ERROR in any case.
pub fn level_directive(level: &str) -> anyhow::Result<&'static str> {
    match level.trim().to_ascii_uppercase().as_str() {
        "DEBUG" => Ok("debug"),
        "INFO" => Ok("info"),
        "WARNING" | "WARN" => Ok("warn"),
        "ERROR" => Ok("error"),
        other => anyhow::bail!("Unknown log level: {other} (expected DEBUG, INFO, WARNING or ERROR)"),
    }
}

/// Install the global subscriber. `RUST_LOG` takes precedence over `level`.
///
/// With `log_file` set, output is appended to that file without ANSI colors.
pub fn init(level: &str, log_file: Option<&Path>) -> anyhow::Result<()> {
    let directive = level_directive(level)?;
    let filter =
        EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new(directive));

    match log_file {
        Some(path) => {
            let file = OpenOptions::new()
                .create(true)
                .append(true)
                .open(path)
                .with_context(|| format!("Failed to open log file: {}", path.display()))?;
            tracing_subscriber::fmt()
                .with_env_filter(filter)
                .with_writer(Mutex::new(file))
                .with_ansi(false)
                .try_init()
                .map_err(|e| anyhow::anyhow!("Failed to install logger: {e}"))?;
        }
        None => {
            tracing_subscriber::fmt()
                .with_env_filter(filter)
                .try_init()
                .map_err(|e| anyhow::anyhow!("Failed to install logger: {e}"))?;
        }
    }
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_level_directive() {
        assert_eq!(level_directive("DEBUG").unwrap(), "debug");
        assert_eq!(level_directive("info").unwrap(), "info");
        assert_eq!(level_directive("WARNING").unwrap(), "warn");
        assert_eq!(level_directive("warn").unwrap(), "warn");
        assert_eq!(level_directive("Error").unwrap(), "error");
        assert!(level_directive("TRACE-ALL").is_err());
    }
}
