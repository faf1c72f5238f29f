//! Error types for loadprom
//!
//! Failures are grouped by where they are contained: a bad declaration is
//! skipped at run start, a failed update is skipped for that one event, a
//! failed export is logged and discarded. Only [`AppError`] ever reaches the
//! binary's `main`.

use crate::declaration::{EventSource, Measuring, MetricKind};
use thiserror::Error;

/// Main error type for the application
#[derive(Error, Debug)]
pub enum AppError {
    #[error("Configuration error: {0}")]
    Config(String),

    #[error("Failed to read config file {path}: {source}")]
    ConfigFileRead {
        path: String,
        #[source]
        source: std::io::Error,
    },

    #[error("Failed to parse config file {path}: {source}")]
    ConfigParseFailed {
        path: String,
        #[source]
        source: toml::de::Error,
    },

    #[error("Invalid config file {path}: {reason}")]
    ConfigValidationFailed { path: String, reason: String },

    #[error("Invalid event record on line {line}: {source}")]
    EventParse {
        line: usize,
        #[source]
        source: serde_json::Error,
    },

    #[error("I/O error: {0}")]
    Io(#[from] std::io::Error),

    #[error("Internal error: {0}")]
    Internal(String),
}

/// Convenience type alias for Results
pub type AppResult<T> = Result<T, AppError>;

/// A metric declaration that cannot be turned into a live metric
#[derive(Error, Debug, Clone, PartialEq)]
pub enum DeclarationError {
    #[error("metric name must not be empty")]
    EmptyName,

    #[error("metric '{name}' has unknown kind '{value}' (expected counter, ratio or distribution)")]
    UnknownKind { name: String, value: String },

    #[error("metric '{name}' has unknown measuring '{value}'")]
    UnknownMeasuring { name: String, value: String },

    #[error("metric '{name}' listens to unknown source '{value}' (expected samples or assertions)")]
    UnknownSource { name: String, value: String },

    #[error("metric '{name}' of kind {kind} cannot measure {measuring}")]
    IncompatibleKind {
        name: String,
        kind: MetricKind,
        measuring: Measuring,
    },

    #[error("metric '{name}' has invalid buckets: {reason}")]
    InvalidBuckets { name: String, reason: String },

    #[error("metric '{name}' is registered as {registered}, which cannot back a {measuring} updater")]
    IncompatibleInstance {
        name: String,
        registered: MetricKind,
        measuring: Measuring,
    },

    #[error("metric '{name}' could not be registered: {source}")]
    Registry {
        name: String,
        #[source]
        source: RegistryError,
    },
}

/// A single update that could not be applied
#[derive(Error, Debug)]
pub enum UpdateError {
    #[error("metric '{metric}' measures {measuring}, which does not apply to {event_source} events")]
    NotApplicable {
        metric: String,
        measuring: Measuring,
        event_source: EventSource,
    },

    #[error("metric '{metric}' needs {measuring} but the sample does not carry it")]
    MissingField { metric: String, measuring: Measuring },

    #[error("metric '{metric}' backend rejected the update: {source}")]
    Backend {
        metric: String,
        #[source]
        source: prometheus::Error,
    },
}

/// Creating or registering a backend metric failed
#[derive(Error, Debug, Clone, PartialEq)]
pub enum RegistryError {
    #[error("backend refused metric: {0}")]
    Backend(String),
}

impl From<prometheus::Error> for RegistryError {
    fn from(err: prometheus::Error) -> Self {
        Self::Backend(err.to_string())
    }
}

/// Pushing a snapshot to a sink failed
#[derive(Error, Debug)]
pub enum ExportError {
    #[error("failed to encode metrics: {0}")]
    Encode(#[from] prometheus::Error),

    #[error("failed to write metrics to {target}: {source}")]
    Write {
        target: String,
        #[source]
        source: std::io::Error,
    },
}
