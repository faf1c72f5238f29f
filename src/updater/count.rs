//! Count-style updates: totals and success ratio

use super::Binding;
use crate::declaration::Measuring;
use crate::error::UpdateError;
use crate::event::{Event, Variables};

/// Increments a counter, or records an outcome on a success ratio
#[derive(Debug, Clone)]
pub struct CountUpdater {
    binding: Binding,
}

impl CountUpdater {
    pub(crate) fn new(binding: Binding) -> Self {
        Self { binding }
    }

    pub(crate) fn binding(&self) -> &Binding {
        &self.binding
    }

    pub fn update(&self, event: &Event<'_>, vars: &Variables) -> Result<(), UpdateError> {
        let instance = &self.binding.instance;
        let success = event.is_success();

        match self.binding.measuring {
            Measuring::CountTotal => self.binding.with_labels(event, vars, |l| instance.inc(l)),
            Measuring::SuccessTotal if success => {
                self.binding.with_labels(event, vars, |l| instance.inc(l))
            }
            Measuring::FailureTotal if !success => {
                self.binding.with_labels(event, vars, |l| instance.inc(l))
            }
            Measuring::SuccessTotal | Measuring::FailureTotal => Ok(()),
            Measuring::SuccessRatio => self
                .binding
                .with_labels(event, vars, |l| instance.record_outcome(l, success)),
            other => Err(UpdateError::NotApplicable {
                metric: self.binding.name.clone(),
                measuring: other,
                event_source: event.source(),
            }),
        }
    }
}
