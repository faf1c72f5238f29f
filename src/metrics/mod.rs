//! Prometheus-backed metric instances
//!
//! A [`MetricInstance`] is the live backend object behind one declaration:
//! a `CounterVec`, a `HistogramVec`, or a [`SuccessRatio`]. All recording
//! goes through the backend's own atomic primitives; nothing here adds a
//! lock around an increment or observation.

pub mod ratio;
pub mod registry;

pub use ratio::SuccessRatio;
pub use registry::MetricRegistry;

use crate::declaration::{MetricDeclaration, MetricKind};
use prometheus::core::{Collector, Desc};
use prometheus::proto::{Metric, MetricFamily};
use prometheus::{CounterVec, HistogramOpts, HistogramVec, Opts};

/// Live backend metric for one declaration
#[derive(Clone)]
pub enum MetricInstance {
    Counter(CounterVec),
    Ratio(SuccessRatio),
    Distribution(HistogramVec),
}

impl MetricInstance {
    /// Create the backend metric described by `declaration`
    ///
    /// The instance is not registered anywhere; see
    /// [`MetricRegistry::get_or_create_and_register`].
    ///
    /// # Errors
    ///
    /// Returns an error if the backend rejects the name, help text, label
    /// names or buckets.
    pub fn create(declaration: &MetricDeclaration) -> Result<Self, prometheus::Error> {
        let labels: Vec<&str> = declaration.labels().iter().map(String::as_str).collect();

        let instance = match declaration.kind() {
            MetricKind::Counter => MetricInstance::Counter(CounterVec::new(
                Opts::new(declaration.name(), declaration.help()),
                &labels,
            )?),
            MetricKind::Ratio => MetricInstance::Ratio(SuccessRatio::new(
                declaration.name(),
                declaration.help(),
                &labels,
            )?),
            MetricKind::Distribution => MetricInstance::Distribution(HistogramVec::new(
                HistogramOpts::new(declaration.name(), declaration.help())
                    .buckets(declaration.buckets().to_vec()),
                &labels,
            )?),
        };
        Ok(instance)
    }

    pub fn kind(&self) -> MetricKind {
        match self {
            MetricInstance::Counter(_) => MetricKind::Counter,
            MetricInstance::Ratio(_) => MetricKind::Ratio,
            MetricInstance::Distribution(_) => MetricKind::Distribution,
        }
    }

    /// Add one to a counter
    pub fn inc(&self, label_values: &[&str]) -> Result<(), prometheus::Error> {
        self.inc_by(label_values, 1.0)
    }

    /// Add `amount` to a counter
    pub fn inc_by(&self, label_values: &[&str], amount: f64) -> Result<(), prometheus::Error> {
        validate_value(amount)?;
        match self {
            MetricInstance::Counter(counter) => {
                counter
                    .get_metric_with_label_values(label_values)?
                    .inc_by(amount);
                Ok(())
            }
            other => Err(wrong_kind("increment", other.kind())),
        }
    }

    /// Record one observation in a distribution
    pub fn observe(&self, label_values: &[&str], value: f64) -> Result<(), prometheus::Error> {
        validate_value(value)?;
        match self {
            MetricInstance::Distribution(histogram) => {
                histogram
                    .get_metric_with_label_values(label_values)?
                    .observe(value);
                Ok(())
            }
            other => Err(wrong_kind("observe", other.kind())),
        }
    }

    /// Record one success/failure outcome in a ratio
    pub fn record_outcome(&self, label_values: &[&str], success: bool) -> Result<(), prometheus::Error> {
        match self {
            MetricInstance::Ratio(ratio) => ratio.record(label_values, success),
            other => Err(wrong_kind("record an outcome on", other.kind())),
        }
    }

    /// Current counter value, for counters only
    ///
    /// A combination that has not been recorded reads as 0 and is not
    /// added to the export.
    pub fn counter_value(&self, label_values: &[&str]) -> Option<f64> {
        match self {
            MetricInstance::Counter(counter) => {
                find_series(counter, label_values).map(|series| {
                    series.map_or(0.0, |m| m.get_counter().value())
                })
            }
            _ => None,
        }
    }

    /// `(observation count, sum)` of a distribution
    ///
    /// Like [`counter_value`](Self::counter_value), reading never creates
    /// a series.
    pub fn distribution_stats(&self, label_values: &[&str]) -> Option<(u64, f64)> {
        match self {
            MetricInstance::Distribution(histogram) => {
                find_series(histogram, label_values).map(|series| {
                    series.map_or((0, 0.0), |m| {
                        let h = m.get_histogram();
                        (h.get_sample_count(), h.get_sample_sum())
                    })
                })
            }
            _ => None,
        }
    }

    /// Current success ratio, for ratios only
    pub fn ratio_value(&self, label_values: &[&str]) -> Option<f64> {
        match self {
            MetricInstance::Ratio(ratio) => ratio.ratio(label_values).ok(),
            _ => None,
        }
    }
}

impl std::fmt::Debug for MetricInstance {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        let name = self
            .desc()
            .last()
            .map(|d| d.fq_name.clone())
            .unwrap_or_default();
        f.debug_struct("MetricInstance")
            .field("kind", &self.kind())
            .field("name", &name)
            .finish()
    }
}

impl Collector for MetricInstance {
    fn desc(&self) -> Vec<&Desc> {
        match self {
            MetricInstance::Counter(counter) => counter.desc(),
            MetricInstance::Ratio(ratio) => ratio.desc(),
            MetricInstance::Distribution(histogram) => histogram.desc(),
        }
    }

    fn collect(&self) -> Vec<MetricFamily> {
        match self {
            MetricInstance::Counter(counter) => counter.collect(),
            MetricInstance::Ratio(ratio) => ratio.collect(),
            MetricInstance::Distribution(histogram) => histogram.collect(),
        }
    }
}

/// Look up the exported series for `label_values` without creating it
///
/// `None` when the arity does not match the declared labels, `Some(None)`
/// when the combination has not been recorded yet.
fn find_series(collector: &impl Collector, label_values: &[&str]) -> Option<Option<Metric>> {
    let descs = collector.desc();
    let names = &descs.first()?.variable_labels;
    if names.len() != label_values.len() {
        return None;
    }

    let found = collector
        .collect()
        .into_iter()
        .flat_map(|mut family| family.take_metric())
        .find(|metric| {
            names.iter().zip(label_values).all(|(name, value)| {
                metric
                    .get_label()
                    .iter()
                    .any(|pair| pair.name() == name.as_str() && pair.value() == *value)
            })
        });
    Some(found)
}

fn validate_value(value: f64) -> Result<(), prometheus::Error> {
    // NaN and infinity corrupt every percentile of a histogram
    if !value.is_finite() || value < 0.0 {
        return Err(prometheus::Error::Msg(format!(
            "value must be finite and non-negative, got: {}",
            value
        )));
    }
    Ok(())
}

fn wrong_kind(operation: &str, kind: MetricKind) -> prometheus::Error {
    prometheus::Error::Msg(format!("cannot {} a {} metric", operation, kind))
}

#[cfg(test)]
mod tests {
    use super::*;

    fn declaration(name: &str, kind: MetricKind, labels: &[&str]) -> MetricDeclaration {
        MetricDeclaration::new(
            name,
            kind,
            "test metric",
            labels.iter().map(|s| s.to_string()).collect(),
            None,
        )
        .unwrap()
    }

    #[test]
    fn test_create_matches_declared_kind() {
        for kind in [MetricKind::Counter, MetricKind::Ratio, MetricKind::Distribution] {
            let instance = MetricInstance::create(&declaration("m", kind, &["label"])).unwrap();
            assert_eq!(instance.kind(), kind);
        }
    }

    #[test]
    fn test_counter_increments() {
        let instance =
            MetricInstance::create(&declaration("hits", MetricKind::Counter, &["label"])).unwrap();
        instance.inc(&["Login"]).unwrap();
        instance.inc_by(&["Login"], 2.5).unwrap();
        assert_eq!(instance.counter_value(&["Login"]), Some(3.5));
    }

    #[test]
    fn test_distribution_observes() {
        let instance =
            MetricInstance::create(&declaration("rt", MetricKind::Distribution, &["label"]))
                .unwrap();
        instance.observe(&["Login"], 120.0).unwrap();
        instance.observe(&["Login"], 80.0).unwrap();
        assert_eq!(instance.distribution_stats(&["Login"]), Some((2, 200.0)));
    }

    #[test]
    fn test_reading_unrecorded_series_does_not_export_it() {
        let counter =
            MetricInstance::create(&declaration("hits", MetricKind::Counter, &["label"])).unwrap();
        let histogram =
            MetricInstance::create(&declaration("rt", MetricKind::Distribution, &["label"]))
                .unwrap();

        assert_eq!(counter.counter_value(&["Login"]), Some(0.0));
        assert_eq!(histogram.distribution_stats(&["Login"]), Some((0, 0.0)));

        let exported: usize = counter
            .collect()
            .iter()
            .chain(histogram.collect().iter())
            .map(|mf| mf.get_metric().len())
            .sum();
        assert_eq!(exported, 0);
    }

    #[test]
    fn test_reads_pick_the_matching_series() {
        let counter = MetricInstance::create(&declaration(
            "hits",
            MetricKind::Counter,
            &["label", "code"],
        ))
        .unwrap();
        counter.inc(&["Login", "200"]).unwrap();
        counter.inc_by(&["Login", "500"], 3.0).unwrap();

        assert_eq!(counter.counter_value(&["Login", "200"]), Some(1.0));
        assert_eq!(counter.counter_value(&["Login", "500"]), Some(3.0));
        assert_eq!(counter.counter_value(&["Login"]), None);
    }

    #[test]
    fn test_wrong_operation_for_kind_is_an_error() {
        let counter =
            MetricInstance::create(&declaration("hits", MetricKind::Counter, &[])).unwrap();
        assert!(counter.observe(&[], 1.0).is_err());
        assert!(counter.record_outcome(&[], true).is_err());

        let histogram =
            MetricInstance::create(&declaration("rt", MetricKind::Distribution, &[])).unwrap();
        assert!(histogram.inc(&[]).is_err());
    }

    #[test]
    fn test_rejects_non_finite_and_negative_values() {
        let histogram =
            MetricInstance::create(&declaration("rt", MetricKind::Distribution, &[])).unwrap();
        for bad in [f64::NAN, f64::INFINITY, f64::NEG_INFINITY, -1.0] {
            assert!(histogram.observe(&[], bad).is_err(), "{bad}");
        }
        assert!(histogram.observe(&[], 0.0).is_ok());
    }

    #[test]
    fn test_label_arity_mismatch_is_an_error() {
        let counter = MetricInstance::create(&declaration(
            "hits",
            MetricKind::Counter,
            &["label", "code"],
        ))
        .unwrap();
        assert!(counter.inc(&["Login"]).is_err());
    }

    #[test]
    fn test_duplicate_label_names_rejected_by_backend() {
        let result =
            MetricInstance::create(&declaration("dup", MetricKind::Counter, &["label", "label"]));
        assert!(result.is_err());
    }
}
