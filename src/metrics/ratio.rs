//! Success ratio collector
//!
//! Exports three families per metric:
//! - `<name>_success`: samples classified successful
//! - `<name>_total`: all samples
//! - `<name>`: `success / total`, recomputed on every collection
//!
//! The quotient is never stored between collections, so a scrape always
//! sees the ratio of the counters it reads. A combination that has not
//! recorded anything reports 0.

use prometheus::core::{Collector, Desc};
use prometheus::proto::MetricFamily;
use prometheus::{GaugeVec, IntCounterVec, Opts};
use std::collections::HashSet;
use std::sync::{Arc, PoisonError, RwLock};

/// Success/total counter pair with a derived ratio gauge
#[derive(Clone)]
pub struct SuccessRatio {
    success: IntCounterVec,
    total: IntCounterVec,
    ratio: GaugeVec,
    seen: Arc<RwLock<HashSet<Vec<String>>>>,
}

impl SuccessRatio {
    /// Create the three backing vectors
    ///
    /// # Errors
    ///
    /// Returns an error if the name, help or label names are rejected by
    /// the backend.
    pub fn new(name: &str, help: &str, labels: &[&str]) -> Result<Self, prometheus::Error> {
        let success = IntCounterVec::new(
            Opts::new(format!("{name}_success"), format!("{help} (successful)")),
            labels,
        )?;
        let total = IntCounterVec::new(
            Opts::new(format!("{name}_total"), format!("{help} (all)")),
            labels,
        )?;
        let ratio = GaugeVec::new(Opts::new(name, help), labels)?;

        Ok(Self {
            success,
            total,
            ratio,
            seen: Arc::new(RwLock::new(HashSet::new())),
        })
    }

    /// Count one outcome for the given label values
    pub fn record(&self, label_values: &[&str], success: bool) -> Result<(), prometheus::Error> {
        let total = self.total.get_metric_with_label_values(label_values)?;
        let successes = self.success.get_metric_with_label_values(label_values)?;
        self.remember(label_values);

        // total first: a concurrent reader never sees success > total
        total.inc();
        if success {
            successes.inc();
        }
        Ok(())
    }

    /// Current `success / total` for the given label values (0 before any record)
    pub fn ratio(&self, label_values: &[&str]) -> Result<f64, prometheus::Error> {
        if !self.is_seen(label_values) {
            return Ok(0.0);
        }
        let successes = self.success.get_metric_with_label_values(label_values)?.get();
        let total = self.total.get_metric_with_label_values(label_values)?.get();
        Ok(quotient(successes, total))
    }

    /// `(success, total)` counts for the given label values
    pub fn counts(&self, label_values: &[&str]) -> Result<(u64, u64), prometheus::Error> {
        if !self.is_seen(label_values) {
            return Ok((0, 0));
        }
        let successes = self.success.get_metric_with_label_values(label_values)?.get();
        let total = self.total.get_metric_with_label_values(label_values)?.get();
        Ok((successes, total))
    }

    fn is_seen(&self, label_values: &[&str]) -> bool {
        let key = owned(label_values);
        self.seen
            .read()
            .unwrap_or_else(PoisonError::into_inner)
            .contains(&key)
    }

    fn remember(&self, label_values: &[&str]) {
        let key = owned(label_values);
        if self
            .seen
            .read()
            .unwrap_or_else(PoisonError::into_inner)
            .contains(&key)
        {
            return;
        }
        self.seen
            .write()
            .unwrap_or_else(PoisonError::into_inner)
            .insert(key);
    }

    fn refresh_ratios(&self) {
        let keys: Vec<Vec<String>> = self
            .seen
            .read()
            .unwrap_or_else(PoisonError::into_inner)
            .iter()
            .cloned()
            .collect();

        for key in keys {
            let values: Vec<&str> = key.iter().map(String::as_str).collect();
            match (self.ratio(&values), self.ratio.get_metric_with_label_values(&values)) {
                (Ok(value), Ok(gauge)) => gauge.set(value),
                (Err(e), _) | (_, Err(e)) => {
                    tracing::warn!(error = %e, labels = ?values, "Failed to refresh success ratio");
                }
            }
        }
    }
}

fn owned(label_values: &[&str]) -> Vec<String> {
    label_values.iter().map(|v| v.to_string()).collect()
}

fn quotient(successes: u64, total: u64) -> f64 {
    if total == 0 {
        0.0
    } else {
        successes as f64 / total as f64
    }
}

impl Collector for SuccessRatio {
    fn desc(&self) -> Vec<&Desc> {
        self.success
            .desc()
            .into_iter()
            .chain(self.total.desc())
            .chain(self.ratio.desc())
            .collect()
    }

    fn collect(&self) -> Vec<MetricFamily> {
        self.refresh_ratios();

        let mut families = self.success.collect();
        families.extend(self.total.collect());
        families.extend(self.ratio.collect());
        families
    }
}
