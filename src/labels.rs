//! Label value resolution
//!
//! Each label name is resolved, in order of precedence, from:
//! 1. `label` → the sample label (or assertion name)
//! 2. `code` → the response code (sample events only)
//! 3. a sample variable with that name
//! 4. the executing thread's variables
//!
//! Reserved names match case-insensitively. Anything unresolved or empty
//! becomes the literal `"null"` so the backend never sees an empty label.

use crate::event::{Event, VariableSchema, Variables};
use std::collections::HashMap;

/// Placeholder for labels that resolve to nothing
pub const NULL_LABEL: &str = "null";

const RESERVED_LABEL: &str = "label";
const RESERVED_CODE: &str = "code";

/// Resolves the ordered label values of one metric
///
/// The slot lookup is built once from the run's variable schema and is
/// read-only afterwards, so one resolver can be shared by every worker.
#[derive(Debug, Clone)]
pub struct LabelResolver {
    labels: Vec<String>,
    slots: HashMap<String, usize>,
}

impl LabelResolver {
    /// Build the resolver for `labels` against the sample variable schema
    ///
    /// Only label names that match a schema variable (ignoring case) get a
    /// slot entry.
    pub fn new(labels: &[String], schema: &VariableSchema) -> Self {
        let slots = labels
            .iter()
            .filter_map(|label| {
                schema
                    .names()
                    .iter()
                    .position(|var| var.eq_ignore_ascii_case(label))
                    .map(|idx| (label.clone(), idx))
            })
            .collect();

        Self {
            labels: labels.to_vec(),
            slots,
        }
    }

    pub fn labels(&self) -> &[String] {
        &self.labels
    }

    /// Resolve label values for `event`, one per label name, in order
    pub fn resolve(&self, event: &Event<'_>, vars: &Variables) -> Vec<String> {
        self.labels
            .iter()
            .map(|name| {
                let value = self.lookup(name, *event, vars);
                match value {
                    Some(v) if !v.is_empty() => v.to_string(),
                    _ => NULL_LABEL.to_string(),
                }
            })
            .collect()
    }

    fn lookup<'e>(&self, name: &str, event: Event<'e>, vars: &'e Variables) -> Option<&'e str> {
        if name.eq_ignore_ascii_case(RESERVED_LABEL) {
            return Some(event.name());
        }
        if let Event::Sample(sample) = event {
            if name.eq_ignore_ascii_case(RESERVED_CODE) {
                return Some(&sample.response_code);
            }
        }
        if let Some(&slot) = self.slots.get(name) {
            return event.sample().variable(slot);
        }
        vars.get(name)
    }
}
