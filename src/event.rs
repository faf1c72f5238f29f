//! Events produced by the load generator
//!
//! A [`SampleEvent`] is one completed request with its timings, outcome and
//! the values of the run's sample variables. Assertion results travel inside
//! the sample they were evaluated against.

use crate::declaration::EventSource;
use serde::{Deserialize, Serialize};
use std::collections::HashMap;
use std::sync::Arc;

/// Result of one assertion evaluated against a sample
#[derive(Debug, Clone, Default, PartialEq, Deserialize, Serialize)]
pub struct AssertionResult {
    pub name: String,
    #[serde(default)]
    pub failure: bool,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub failure_message: Option<String>,
}

impl AssertionResult {
    pub fn passed(name: impl Into<String>) -> Self {
        Self {
            name: name.into(),
            failure: false,
            failure_message: None,
        }
    }

    pub fn failed(name: impl Into<String>, message: impl Into<String>) -> Self {
        Self {
            name: name.into(),
            failure: true,
            failure_message: Some(message.into()),
        }
    }
}

/// A completed sample
///
/// Times are in milliseconds. `variables` holds one value per entry of the
/// run's [`VariableSchema`], in schema order; a shorter vector means the
/// trailing variables were not set.
#[derive(Debug, Clone, Default, PartialEq, Deserialize, Serialize)]
pub struct SampleEvent {
    pub label: String,
    #[serde(default)]
    pub response_code: String,
    #[serde(default = "default_success")]
    pub success: bool,
    #[serde(default)]
    pub elapsed_ms: u64,
    #[serde(default)]
    pub bytes: u64,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub latency_ms: Option<u64>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub idle_time_ms: Option<u64>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub connect_time_ms: Option<u64>,
    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    pub variables: Vec<String>,
    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    pub assertions: Vec<AssertionResult>,
}

fn default_success() -> bool {
    true
}

impl SampleEvent {
    /// A successful sample with only a label, response code and elapsed time
    pub fn new(label: impl Into<String>, response_code: impl Into<String>, elapsed_ms: u64) -> Self {
        Self {
            label: label.into(),
            response_code: response_code.into(),
            success: true,
            elapsed_ms,
            ..Default::default()
        }
    }

    /// Value of the variable at `slot`, if the sample carries one
    pub fn variable(&self, slot: usize) -> Option<&str> {
        self.variables.get(slot).map(String::as_str)
    }
}

/// One event as seen by an updater
#[derive(Debug, Clone, Copy)]
pub enum Event<'a> {
    Sample(&'a SampleEvent),
    Assertion {
        assertion: &'a AssertionResult,
        sample: &'a SampleEvent,
    },
}

impl<'a> Event<'a> {
    /// Stream this event belongs to
    pub fn source(&self) -> EventSource {
        match self {
            Event::Sample(_) => EventSource::Samples,
            Event::Assertion { .. } => EventSource::Assertions,
        }
    }

    /// The sample itself, or the sample an assertion was evaluated against
    pub fn sample(&self) -> &'a SampleEvent {
        match *self {
            Event::Sample(sample) => sample,
            Event::Assertion { sample, .. } => sample,
        }
    }

    /// Logical name: sample label or assertion name
    pub fn name(&self) -> &'a str {
        match *self {
            Event::Sample(sample) => &sample.label,
            Event::Assertion { assertion, .. } => &assertion.name,
        }
    }

    /// Whether the event counts as a success
    ///
    /// Samples carry their own flag; an assertion succeeded unless it is
    /// marked as a failure.
    pub fn is_success(&self) -> bool {
        match self {
            Event::Sample(sample) => sample.success,
            Event::Assertion { assertion, .. } => !assertion.failure,
        }
    }
}

/// Ordered names of the variables every sample carries
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct VariableSchema {
    names: Arc<[String]>,
}

impl VariableSchema {
    pub fn new<I, S>(names: I) -> Self
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        Self {
            names: names.into_iter().map(Into::into).collect(),
        }
    }

    pub fn names(&self) -> &[String] {
        &self.names
    }

    pub fn len(&self) -> usize {
        self.names.len()
    }

    pub fn is_empty(&self) -> bool {
        self.names.is_empty()
    }
}

/// Variables of the executing thread, consulted when a label is neither
/// reserved nor a sample variable
#[derive(Debug, Clone, Default, PartialEq, Eq, Deserialize, Serialize)]
#[serde(transparent)]
pub struct Variables(HashMap<String, String>);

impl Variables {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn get(&self, name: &str) -> Option<&str> {
        self.0.get(name).map(String::as_str)
    }

    pub fn insert(&mut self, name: impl Into<String>, value: impl Into<String>) {
        self.0.insert(name.into(), value.into());
    }

    pub fn is_empty(&self) -> bool {
        self.0.is_empty()
    }
}

impl<K, V> FromIterator<(K, V)> for Variables
where
    K: Into<String>,
    V: Into<String>,
{
    fn from_iter<T: IntoIterator<Item = (K, V)>>(iter: T) -> Self {
        Self(
            iter.into_iter()
                .map(|(k, v)| (k.into(), v.into()))
                .collect(),
        )
    }
}
