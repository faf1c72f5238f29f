//! Distribution-style updates: one extracted value per event

use super::Binding;
use crate::declaration::Measuring;
use crate::error::UpdateError;
use crate::event::{Event, SampleEvent, Variables};
use crate::metrics::MetricInstance;

/// Extracts the measured field and observes it
///
/// A histogram gets one observation per event. A counter bound to a
/// distribution measuring accumulates the extracted amount instead.
#[derive(Debug, Clone)]
pub struct DistributionUpdater {
    binding: Binding,
}

impl DistributionUpdater {
    pub(crate) fn new(binding: Binding) -> Self {
        Self { binding }
    }

    pub(crate) fn binding(&self) -> &Binding {
        &self.binding
    }

    pub fn update(&self, event: &Event<'_>, vars: &Variables) -> Result<(), UpdateError> {
        let value = self.extract(event)?;
        let instance = &self.binding.instance;
        self.binding.with_labels(event, vars, |labels| match &**instance {
            MetricInstance::Counter(_) => instance.inc_by(labels, value),
            _ => instance.observe(labels, value),
        })
    }

    fn extract(&self, event: &Event<'_>) -> Result<f64, UpdateError> {
        let sample = match event {
            Event::Sample(sample) => *sample,
            Event::Assertion { .. } => {
                return Err(UpdateError::NotApplicable {
                    metric: self.binding.name.clone(),
                    measuring: self.binding.measuring,
                    event_source: event.source(),
                });
            }
        };

        field(sample, self.binding.measuring)
            .map(|v| v as f64)
            .ok_or_else(|| UpdateError::MissingField {
                metric: self.binding.name.clone(),
                measuring: self.binding.measuring,
            })
    }
}

/// The sample field a measuring reads; `None` when the sample does not
/// carry it or the measuring is not a distribution measuring
fn field(sample: &SampleEvent, measuring: Measuring) -> Option<u64> {
    match measuring {
        Measuring::ResponseTime => Some(sample.elapsed_ms),
        Measuring::ResponseSize => Some(sample.bytes),
        Measuring::Latency => sample.latency_ms,
        Measuring::IdleTime => sample.idle_time_ms,
        Measuring::ConnectTime => sample.connect_time_ms,
        Measuring::SuccessTotal
        | Measuring::FailureTotal
        | Measuring::CountTotal
        | Measuring::SuccessRatio => None,
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::declaration::{MetricDeclaration, MetricKind};
    use crate::event::{AssertionResult, VariableSchema};
    use crate::labels::LabelResolver;
    use crate::updater::{updater_for, Updater};
    use std::sync::Arc;

    fn build(measuring: Measuring, kind: MetricKind) -> (Updater, Arc<MetricInstance>) {
        let labels = vec!["label".to_string(), "code".to_string()];
        let decl = MetricDeclaration::new("m", kind, "test", labels.clone(), None).unwrap();
        let instance = Arc::new(MetricInstance::create(&decl).unwrap());
        let resolver = LabelResolver::new(&labels, &VariableSchema::default());
        let updater = updater_for(measuring, "m", Arc::clone(&instance), resolver).unwrap();
        (updater, instance)
    }

    #[test]
    fn test_response_time_observed_under_resolved_labels() {
        let (updater, instance) = build(Measuring::ResponseTime, MetricKind::Distribution);
        let sample = SampleEvent::new("HTTP Request", "200", 123);

        updater.update(&Event::Sample(&sample), &Variables::new()).unwrap();

        assert_eq!(
            instance.distribution_stats(&["HTTP Request", "200"]),
            Some((1, 123.0))
        );
    }

    #[test]
    fn test_each_measuring_reads_its_field() {
        let mut sample = SampleEvent::new("a", "200", 100);
        sample.bytes = 2048;
        sample.latency_ms = Some(40);
        sample.idle_time_ms = Some(3);
        sample.connect_time_ms = Some(12);

        for (measuring, expected) in [
            (Measuring::ResponseTime, 100.0),
            (Measuring::ResponseSize, 2048.0),
            (Measuring::Latency, 40.0),
            (Measuring::IdleTime, 3.0),
            (Measuring::ConnectTime, 12.0),
        ] {
            let (updater, instance) = build(measuring, MetricKind::Distribution);
            updater.update(&Event::Sample(&sample), &Variables::new()).unwrap();
            assert_eq!(
                instance.distribution_stats(&["a", "200"]),
                Some((1, expected)),
                "{measuring}"
            );
        }
    }

    #[test]
    fn test_missing_field_fails_the_update() {
        let (updater, instance) = build(Measuring::Latency, MetricKind::Distribution);
        let sample = SampleEvent::new("a", "200", 100);

        let err = updater.update(&Event::Sample(&sample), &Variables::new()).unwrap_err();
        assert!(matches!(err, UpdateError::MissingField { .. }));
        assert_eq!(instance.distribution_stats(&["a", "200"]), Some((0, 0.0)));
    }

    #[test]
    fn test_assertion_event_is_not_applicable() {
        let (updater, _) = build(Measuring::ResponseTime, MetricKind::Distribution);
        let sample = SampleEvent::new("a", "200", 100);
        let assertion = AssertionResult::passed("check");
        let event = Event::Assertion {
            assertion: &assertion,
            sample: &sample,
        };

        let err = updater.update(&event, &Variables::new()).unwrap_err();
        assert!(matches!(err, UpdateError::NotApplicable { .. }));
    }

    #[test]
    fn test_counter_accumulates_extracted_amount() {
        let (updater, instance) = build(Measuring::ResponseSize, MetricKind::Counter);
        for bytes in [100, 250] {
            let mut sample = SampleEvent::new("a", "200", 1);
            sample.bytes = bytes;
            updater.update(&Event::Sample(&sample), &Variables::new()).unwrap();
        }
        assert_eq!(instance.counter_value(&["a", "200"]), Some(350.0));
    }
}
