//! Metric declarations
//!
//! A declaration says what a metric is (name, kind, help, ordered label
//! names) and, for listener metrics, which event stream feeds it and which
//! event field it measures. Declarations are built once per run from the
//! configuration file and never change afterwards.

use crate::config::MetricConfig;
use crate::error::DeclarationError;
use std::fmt;
use std::str::FromStr;
use std::sync::Arc;

/// Histogram buckets for the time measurings, in milliseconds
pub const DEFAULT_TIME_BUCKETS_MS: &[f64] = &[
    10.0, 25.0, 50.0, 100.0, 250.0, 500.0, 1000.0, 2500.0, 5000.0, 10000.0, 30000.0,
];

/// Histogram buckets for response sizes, in bytes
pub const DEFAULT_SIZE_BUCKETS_BYTES: &[f64] = &[
    128.0, 512.0, 1024.0, 4096.0, 16384.0, 65536.0, 262144.0, 1048576.0, 4194304.0,
];

/// Backend metric type
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum MetricKind {
    /// Monotonic counter
    Counter,
    /// Success/total pair exported with its quotient
    Ratio,
    /// Histogram of observed values
    Distribution,
}

impl MetricKind {
    pub fn as_str(&self) -> &'static str {
        match self {
            MetricKind::Counter => "counter",
            MetricKind::Ratio => "ratio",
            MetricKind::Distribution => "distribution",
        }
    }
}

impl fmt::Display for MetricKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for MetricKind {
    type Err = ();

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.to_ascii_lowercase().as_str() {
            "counter" => Ok(MetricKind::Counter),
            "ratio" | "success_ratio" => Ok(MetricKind::Ratio),
            "distribution" | "histogram" => Ok(MetricKind::Distribution),
            _ => Err(()),
        }
    }
}

/// Which updater strategy a measuring maps to
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum UpdaterKind {
    Count,
    Distribution,
}

/// The event quantity a listener metric measures
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum Measuring {
    ResponseTime,
    ResponseSize,
    Latency,
    IdleTime,
    ConnectTime,
    SuccessTotal,
    FailureTotal,
    CountTotal,
    SuccessRatio,
}

impl Measuring {
    /// Every measuring, in declaration order
    pub const ALL: [Measuring; 9] = [
        Measuring::ResponseTime,
        Measuring::ResponseSize,
        Measuring::Latency,
        Measuring::IdleTime,
        Measuring::ConnectTime,
        Measuring::SuccessTotal,
        Measuring::FailureTotal,
        Measuring::CountTotal,
        Measuring::SuccessRatio,
    ];

    pub fn as_str(&self) -> &'static str {
        match self {
            Measuring::ResponseTime => "ResponseTime",
            Measuring::ResponseSize => "ResponseSize",
            Measuring::Latency => "Latency",
            Measuring::IdleTime => "IdleTime",
            Measuring::ConnectTime => "ConnectTime",
            Measuring::SuccessTotal => "SuccessTotal",
            Measuring::FailureTotal => "FailureTotal",
            Measuring::CountTotal => "CountTotal",
            Measuring::SuccessRatio => "SuccessRatio",
        }
    }

    /// Updater variant for this measuring. Total and fixed.
    pub fn updater_kind(&self) -> UpdaterKind {
        match self {
            Measuring::SuccessTotal
            | Measuring::FailureTotal
            | Measuring::CountTotal
            | Measuring::SuccessRatio => UpdaterKind::Count,
            Measuring::ResponseTime
            | Measuring::ResponseSize
            | Measuring::Latency
            | Measuring::IdleTime
            | Measuring::ConnectTime => UpdaterKind::Distribution,
        }
    }

    /// Whether a metric of `kind` can be fed by this measuring
    ///
    /// Distribution measurings may also feed a counter, which then
    /// accumulates the extracted amount.
    pub fn accepts(&self, kind: MetricKind) -> bool {
        match (self, kind) {
            (Measuring::SuccessRatio, MetricKind::Ratio) => true,
            (Measuring::SuccessRatio, _) => false,
            (_, MetricKind::Ratio) => false,
            (_, MetricKind::Counter) => true,
            (m, MetricKind::Distribution) => m.updater_kind() == UpdaterKind::Distribution,
        }
    }

    fn default_buckets(&self) -> &'static [f64] {
        match self {
            Measuring::ResponseSize => DEFAULT_SIZE_BUCKETS_BYTES,
            _ => DEFAULT_TIME_BUCKETS_MS,
        }
    }
}

impl fmt::Display for Measuring {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for Measuring {
    type Err = ();

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        Measuring::ALL
            .into_iter()
            .find(|m| m.as_str().eq_ignore_ascii_case(s))
            .ok_or(())
    }
}

/// Event stream a listener metric subscribes to
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum EventSource {
    Samples,
    Assertions,
}

impl EventSource {
    pub fn as_str(&self) -> &'static str {
        match self {
            EventSource::Samples => "samples",
            EventSource::Assertions => "assertions",
        }
    }
}

impl fmt::Display for EventSource {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for EventSource {
    type Err = ();

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.to_ascii_lowercase().as_str() {
            "samples" => Ok(EventSource::Samples),
            "assertions" => Ok(EventSource::Assertions),
            _ => Err(()),
        }
    }
}

/// What a metric is, independent of how it is fed
///
/// Equality covers `(name, kind, labels)`; help text and buckets do not
/// change a metric's identity.
#[derive(Debug, Clone)]
pub struct MetricDeclaration {
    name: String,
    kind: MetricKind,
    help: String,
    labels: Arc<[String]>,
    buckets: Option<Vec<f64>>,
}

impl MetricDeclaration {
    /// Build a declaration, validating name and buckets
    ///
    /// Duplicate label names are not checked; the backend rejects them when
    /// the metric is created.
    pub fn new(
        name: impl Into<String>,
        kind: MetricKind,
        help: impl Into<String>,
        labels: Vec<String>,
        buckets: Option<Vec<f64>>,
    ) -> Result<Self, DeclarationError> {
        let name: String = name.into();
        if name.trim().is_empty() {
            return Err(DeclarationError::EmptyName);
        }
        if let Some(buckets) = &buckets {
            validate_buckets(&name, buckets)?;
        }

        let mut help: String = help.into();
        // the backend refuses empty help text
        if help.trim().is_empty() {
            help = name.clone();
        }

        Ok(Self {
            name,
            kind,
            help,
            labels: labels.into(),
            buckets,
        })
    }

    /// Build a declaration from its configuration entry
    pub fn from_config(config: &MetricConfig) -> Result<Self, DeclarationError> {
        let kind = config
            .kind
            .parse::<MetricKind>()
            .map_err(|_| DeclarationError::UnknownKind {
                name: config.name.clone(),
                value: config.kind.clone(),
            })?;

        Self::new(
            config.name.clone(),
            kind,
            config.help.clone(),
            config.labels.clone(),
            config.buckets.clone(),
        )
    }

    pub fn name(&self) -> &str {
        &self.name
    }

    pub fn kind(&self) -> MetricKind {
        self.kind
    }

    pub fn help(&self) -> &str {
        &self.help
    }

    /// Label names, in the order values are emitted
    pub fn labels(&self) -> &[String] {
        &self.labels
    }

    /// Histogram bucket bounds, the millisecond defaults unless configured
    pub fn buckets(&self) -> &[f64] {
        self.buckets.as_deref().unwrap_or(DEFAULT_TIME_BUCKETS_MS)
    }
}

impl PartialEq for MetricDeclaration {
    fn eq(&self, other: &Self) -> bool {
        self.name == other.name && self.kind == other.kind && self.labels == other.labels
    }
}

impl Eq for MetricDeclaration {}

/// A declaration bound to an event stream and a measured quantity
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ListenerDeclaration {
    metric: MetricDeclaration,
    measuring: Measuring,
    source: EventSource,
}

impl ListenerDeclaration {
    /// Bind a declaration to a measuring and source
    ///
    /// # Errors
    ///
    /// Returns [`DeclarationError::IncompatibleKind`] when the metric kind
    /// cannot carry the measuring (e.g. a ratio counting response times).
    pub fn new(
        mut metric: MetricDeclaration,
        measuring: Measuring,
        source: EventSource,
    ) -> Result<Self, DeclarationError> {
        if !measuring.accepts(metric.kind) {
            return Err(DeclarationError::IncompatibleKind {
                name: metric.name,
                kind: metric.kind,
                measuring,
            });
        }
        if metric.buckets.is_none() {
            metric.buckets = Some(measuring.default_buckets().to_vec());
        }

        Ok(Self {
            metric,
            measuring,
            source,
        })
    }

    /// Build a listener declaration from its configuration entry
    ///
    /// `measuring` defaults to ResponseTime and `listen_to` to samples.
    pub fn from_config(config: &MetricConfig) -> Result<Self, DeclarationError> {
        let metric = MetricDeclaration::from_config(config)?;

        let measuring = match config.measuring.as_deref() {
            None => Measuring::ResponseTime,
            Some(raw) => raw
                .parse::<Measuring>()
                .map_err(|_| DeclarationError::UnknownMeasuring {
                    name: config.name.clone(),
                    value: raw.to_string(),
                })?,
        };

        let source = match config.listen_to.as_deref() {
            None => EventSource::Samples,
            Some(raw) => raw
                .parse::<EventSource>()
                .map_err(|_| DeclarationError::UnknownSource {
                    name: config.name.clone(),
                    value: raw.to_string(),
                })?,
        };

        Self::new(metric, measuring, source)
    }

    pub fn metric(&self) -> &MetricDeclaration {
        &self.metric
    }

    pub fn name(&self) -> &str {
        self.metric.name()
    }

    pub fn measuring(&self) -> Measuring {
        self.measuring
    }

    pub fn source(&self) -> EventSource {
        self.source
    }
}

fn validate_buckets(name: &str, buckets: &[f64]) -> Result<(), DeclarationError> {
    let invalid = |reason: &str| DeclarationError::InvalidBuckets {
        name: name.to_string(),
        reason: reason.to_string(),
    };

    if buckets.is_empty() {
        return Err(invalid("bucket list is empty"));
    }
    if buckets.iter().any(|b| !b.is_finite() || *b <= 0.0) {
        return Err(invalid("bucket bounds must be finite and positive"));
    }
    if !buckets.is_sorted_by(|a, b| a < b) {
        return Err(invalid(
            "bucket bounds must be strictly increasing without duplicates",
        ));
    }
    Ok(())
}
