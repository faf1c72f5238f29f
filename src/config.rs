//! Configuration management for loadprom
//!
//! Parses TOML configuration files and provides typed access to settings.
//!
//! Metric declarations keep `kind`, `measuring` and `listen_to` as raw
//! strings. They are interpreted at run start, one declaration at a time,
//! so a typo in one metric skips that metric instead of rejecting the file.

use serde::{Deserialize, Serialize};
use std::path::{Path, PathBuf};
use std::str::FromStr;

/// Upper bound for the periodic flush interval
pub const MAX_FLUSH_INTERVAL_SECONDS: u64 = 3600;

/// Root configuration structure
#[derive(Debug, Clone, Default, Deserialize, Serialize)]
pub struct Config {
    #[serde(default)]
    observability: ObservabilityConfig,
    #[serde(default)]
    export: ExportConfig,
    #[serde(default)]
    metrics: MetricsConfig,
}

/// Observability configuration
#[derive(Debug, Clone, Deserialize, Serialize)]
pub struct ObservabilityConfig {
    #[serde(default = "default_log_level")]
    pub log_level: String,
}

impl Default for ObservabilityConfig {
    fn default() -> Self {
        Self {
            log_level: default_log_level(),
        }
    }
}

fn default_log_level() -> String {
    "info".to_string()
}

/// Where and how often registry snapshots are exported
#[derive(Debug, Clone, Deserialize, Serialize)]
pub struct ExportConfig {
    #[serde(default = "default_job")]
    job: String,
    #[serde(default)]
    push_on_event: bool,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    flush_interval_seconds: Option<u64>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    textfile_dir: Option<PathBuf>,
}

impl Default for ExportConfig {
    fn default() -> Self {
        Self {
            job: default_job(),
            push_on_event: false,
            flush_interval_seconds: None,
            textfile_dir: None,
        }
    }
}

fn default_job() -> String {
    "load_test".to_string()
}

impl ExportConfig {
    /// Job name snapshots are published under
    pub fn job(&self) -> &str {
        &self.job
    }

    /// Push the full snapshot after every event (blocks the worker)
    pub fn push_on_event(&self) -> bool {
        self.push_on_event
    }

    /// Seconds between periodic flushes; `None` disables the timer
    pub fn flush_interval_seconds(&self) -> Option<u64> {
        self.flush_interval_seconds
    }

    /// Directory for `<job>.prom`; `None` means stdout
    pub fn textfile_dir(&self) -> Option<&Path> {
        self.textfile_dir.as_deref()
    }
}

/// Metric declarations and the sample variable schema
#[derive(Debug, Clone, Default, Deserialize, Serialize)]
pub struct MetricsConfig {
    #[serde(default)]
    sample_variables: Vec<String>,
    #[serde(default)]
    listener: Vec<MetricConfig>,
    #[serde(default)]
    shared: Vec<MetricConfig>,
}

impl MetricsConfig {
    /// Names of the variable slots every sample carries, in slot order
    pub fn sample_variables(&self) -> &[String] {
        &self.sample_variables
    }

    /// Metrics fed by sample or assertion events
    pub fn listener(&self) -> &[MetricConfig] {
        &self.listener
    }

    /// Metrics recorded directly by user code
    pub fn shared(&self) -> &[MetricConfig] {
        &self.shared
    }
}

/// One metric declaration as written in the file
///
/// `measuring` and `listen_to` only apply to listener metrics and are
/// ignored for shared ones.
#[derive(Debug, Clone, PartialEq, Deserialize, Serialize)]
pub struct MetricConfig {
    pub name: String,
    pub kind: String,
    #[serde(default)]
    pub help: String,
    #[serde(default)]
    pub labels: Vec<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub measuring: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub listen_to: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub buckets: Option<Vec<f64>>,
}

impl Config {
    /// Load configuration from a TOML file
    pub fn from_file<P: AsRef<Path>>(path: P) -> crate::error::AppResult<Self> {
        let path_display = path.as_ref().display().to_string();

        // Phase 1: Read file (preserves io::Error context)
        let content = std::fs::read_to_string(path.as_ref()).map_err(|source| {
            crate::error::AppError::ConfigFileRead {
                path: path_display.clone(),
                source,
            }
        })?;

        // Phase 2: Parse TOML (preserves toml::de::Error context)
        let config: Self = toml::from_str(&content).map_err(|source| {
            crate::error::AppError::ConfigParseFailed {
                path: path_display.clone(),
                source,
            }
        })?;

        // Phase 3: Validate parsed config (provides contextual reason)
        config
            .validate()
            .map_err(|e| crate::error::AppError::ConfigValidationFailed {
                path: path_display,
                reason: e.to_string(),
            })?;

        Ok(config)
    }

    pub fn observability(&self) -> &ObservabilityConfig {
        &self.observability
    }

    pub fn export(&self) -> &ExportConfig {
        &self.export
    }

    pub fn metrics(&self) -> &MetricsConfig {
        &self.metrics
    }

    /// Validate global settings after parsing
    ///
    /// Individual metric declarations are not checked here; see the module
    /// docs.
    pub fn validate(&self) -> crate::error::AppResult<()> {
        let job = &self.export.job;
        if job.trim().is_empty() {
            return Err(crate::error::AppError::Config(
                "export.job must not be empty".to_string(),
            ));
        }
        // the job name becomes a file name for the textfile sink
        if job.contains(['/', '\\']) || job == "." || job == ".." {
            return Err(crate::error::AppError::Config(format!(
                "export.job '{}' must not contain path separators",
                job
            )));
        }

        if let Some(interval) = self.export.flush_interval_seconds
            && !(1..=MAX_FLUSH_INTERVAL_SECONDS).contains(&interval)
        {
            return Err(crate::error::AppError::Config(format!(
                "export.flush_interval_seconds must be between 1 and {}, got {}",
                MAX_FLUSH_INTERVAL_SECONDS, interval
            )));
        }

        if let Some(dup) = first_duplicate(&self.metrics.sample_variables) {
            return Err(crate::error::AppError::Config(format!(
                "metrics.sample_variables lists '{}' more than once",
                dup
            )));
        }

        Ok(())
    }
}

fn first_duplicate(names: &[String]) -> Option<&str> {
    names
        .iter()
        .enumerate()
        .find(|&(i, name)| names[..i].contains(name))
        .map(|(_, name)| name.as_str())
}

impl FromStr for Config {
    type Err = crate::error::AppError;

    fn from_str(toml_str: &str) -> Result<Self, Self::Err> {
        let config: Config = toml::from_str(toml_str).map_err(|source| {
            crate::error::AppError::ConfigParseFailed {
                path: "<string>".to_string(),
                source,
            }
        })?;

        config.validate()?;
        Ok(config)
    }
}
