//! Runner configuration and its file format.
//!
//! A [`RunnerConfig`] is either assembled from command-line flags or loaded
//! from a YAML/JSON file. The format is chosen by file extension.

pub mod duration;

use anyhow::Context;
use loadgen_core::{ConnectionConfig, RunPlan, WorkloadSpec};
use loadgen_metrics::RunIdentity;
use loadgen_profiles::Profile;
use serde::{Deserialize, Serialize};
use std::path::{Path, PathBuf};

/// Everything a run needs.
#[derive(Debug, Clone, PartialEq, Default, Serialize, Deserialize)]
#[serde(default)]
pub struct RunnerConfig {
    pub connection: ConnectionConfig,
    pub test: TestConfig,
    pub output: OutputConfig,
    pub export: ExportConfig,
    pub identity: IdentityConfig,
}

/// Run plan plus the workload it drives.
#[derive(Debug, Clone, PartialEq, Default, Serialize, Deserialize)]
#[serde(default)]
pub struct TestConfig {
    /// Profile the workload was derived from, if any.
    pub profile: Option<Profile>,
    pub plan: RunPlan,
    pub workload: WorkloadSpec,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct OutputConfig {
    pub log_level: String,
    pub log_file: Option<PathBuf>,
    /// Seconds between periodic stats lines and exports. Zero disables.
    pub metrics_interval: u64,
    pub quiet: bool,
    /// Final JSON summary destination. Printed as a table when unset.
    pub output_file: Option<PathBuf>,
}

impl Default for OutputConfig {
    fn default() -> Self {
        Self {
            log_level: "INFO".to_string(),
            log_file: None,
            metrics_interval: 5,
            quiet: false,
            output_file: None,
        }
    }
}

#[derive(Debug, Clone, PartialEq, Default, Serialize, Deserialize)]
#[serde(default)]
pub struct ExportConfig {
    /// `http://host:port/path` receiving JSON metric batches.
    pub endpoint: Option<String>,
    /// File receiving one JSON metric batch per line.
    pub file: Option<PathBuf>,
}

/// Identity labels. Unset ids are generated when the run starts.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct IdentityConfig {
    pub app_name: String,
    pub service_name: String,
    pub instance_id: Option<String>,
    pub run_id: Option<String>,
    pub version: Option<String>,
}

impl Default for IdentityConfig {
    fn default() -> Self {
        Self {
            app_name: "rust".to_string(),
            service_name: "kv-loadgen".to_string(),
            instance_id: None,
            run_id: None,
            version: None,
        }
    }
}

impl IdentityConfig {
    /// Resolve into run labels. `app_name` gets the profile name appended.
    pub fn resolve(&self, profile: Option<Profile>) -> RunIdentity {
        let profile = profile
            .map(|p| p.to_string())
            .unwrap_or_else(|| "custom".to_string());
        RunIdentity {
            app_name: format!("{}-{profile}", self.app_name),
            service_name: self.service_name.clone(),
            instance_id: self
                .instance_id
                .clone()
                .unwrap_or_else(|| uuid::Uuid::new_v4().to_string()),
            run_id: self
                .run_id
                .clone()
                .unwrap_or_else(|| uuid::Uuid::new_v4().to_string()),
            version: self
                .version
                .clone()
                .unwrap_or_else(|| env!("CARGO_PKG_VERSION").to_string()),
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum FileFormat {
    Yaml,
    Json,
}

impl FileFormat {
    fn of(path: &Path) -> anyhow::Result<Self> {
        match path
            .extension()
            .and_then(|e| e.to_str())
            .map(|e| e.to_ascii_lowercase())
            .as_deref()
        {
            Some("yaml") | Some("yml") => Ok(FileFormat::Yaml),
            Some("json") => Ok(FileFormat::Json),
            _ => anyhow::bail!(
                "Unsupported config file extension for {}: expected .yaml, .yml or .json",
                path.display()
            ),
        }
    }
}

impl RunnerConfig {
    /// Load from a `.yaml`, `.yml` or `.json` file.
    pub fn load(path: &Path) -> anyhow::Result<Self> {
        let format = FileFormat::of(path)?;
        let content = std::fs::read_to_string(path)
            .with_context(|| format!("Failed to read config file: {}", path.display()))?;
        let config = match format {
            FileFormat::Yaml => serde_yaml::from_str(&content)
                .with_context(|| format!("Failed to parse YAML config: {}", path.display()))?,
            FileFormat::Json => serde_json::from_str(&content)
                .with_context(|| format!("Failed to parse JSON config: {}", path.display()))?,
        };
        Ok(config)
    }

    /// Write to a `.yaml`, `.yml` or `.json` file.
    pub fn save(&self, path: &Path) -> anyhow::Result<()> {
        let content = match FileFormat::of(path)? {
            FileFormat::Yaml => {
                serde_yaml::to_string(self).context("Failed to serialize config to YAML")?
            }
            FileFormat::Json => {
                serde_json::to_string_pretty(self).context("Failed to serialize config to JSON")?
            }
        };
        std::fs::write(path, content)
            .with_context(|| format!("Failed to write config file: {}", path.display()))?;
        Ok(())
    }

    /// Check every section before anything connects.
    pub fn validate(&self) -> anyhow::Result<()> {
        self.connection.validate()?;
        self.test.plan.validate(self.connection.max_connections)?;
        self.test.workload.validate()?;
        if let Some(endpoint) = &self.export.endpoint {
            loadgen_metrics::HttpPushExporter::new(endpoint)
                .with_context(|| format!("Invalid export endpoint: {endpoint}"))?;
        }
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use loadgen_core::{OpKind, WorkloadKind};
    use std::time::Duration;

    fn sample() -> RunnerConfig {
        let mut config = RunnerConfig::default();
        config.connection.host = "cache.internal".to_string();
        config.connection.password = Some("secret".to_string());
        config.test.profile = Some(Profile::HighThroughput);
        config.test.workload = Profile::HighThroughput.workload();
        config.test.plan = RunPlan::new(2, 3, 4).with_duration(Some(Duration::from_secs(30)));
        config.output.quiet = true;
        config.export.file = Some(PathBuf::from("metrics.jsonl"));
        config
    }

    #[test]
    fn test_yaml_save_and_load() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("config.yaml");
        let config = sample();
        config.save(&path).unwrap();
        assert_eq!(RunnerConfig::load(&path).unwrap(), config);
    }

    #[test]
    fn test_json_save_and_load() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("config.json");
        let config = sample();
        config.save(&path).unwrap();
        let text = std::fs::read_to_string(&path).unwrap();
        assert!(text.contains("\"high_throughput\""));
        assert_eq!(RunnerConfig::load(&path).unwrap(), config);
    }

    #[test]
    fn test_partial_yaml_uses_defaults() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("partial.yml");
        std::fs::write(
            &path,
            "connection:\n  host: redis-1\n  port: 7000\ntest:\n  workload:\n    kind: pipelined\n    operations: [SET, GET]\n    pipeline_size: 25\n",
        )
        .unwrap();
        let config = RunnerConfig::load(&path).unwrap();
        assert_eq!(config.connection.host, "redis-1");
        assert_eq!(config.connection.port, 7000);
        assert_eq!(config.connection.database, 0);
        assert_eq!(config.test.workload.kind, WorkloadKind::Pipelined);
        assert_eq!(config.test.workload.operations, vec![OpKind::Set, OpKind::Get]);
        assert_eq!(config.test.workload.pipeline_size, 25);
        assert_eq!(config.test.plan, RunPlan::default());
        assert_eq!(config.output.metrics_interval, 5);
    }

    #[test]
    fn test_unknown_extension_rejected() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("config.toml");
        assert!(sample().save(&path).is_err());
        std::fs::write(&path, "").unwrap();
        assert!(RunnerConfig::load(&path).is_err());
    }

    #[test]
    fn test_identity_resolution() {
        let identity = IdentityConfig::default().resolve(Some(Profile::BasicRw));
        assert_eq!(identity.app_name, "rust-basic_rw");
        assert_eq!(identity.instance_id.len(), 36);
        assert_ne!(identity.instance_id, identity.run_id);

        let fixed = IdentityConfig {
            run_id: Some("run-7".to_string()),
            ..Default::default()
        }
        .resolve(None);
        assert_eq!(fixed.app_name, "rust-custom");
        assert_eq!(fixed.run_id, "run-7");
    }

    #[test]
    fn test_validate_rejects_bad_endpoint() {
        let mut config = RunnerConfig::default();
        assert!(config.validate().is_ok());
        config.export.endpoint = Some("https://collector:4318".to_string());
        assert!(config.validate().is_err());
    }
}
