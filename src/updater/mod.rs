//! Updaters bind one listener declaration to one live metric
//!
//! The measuring decides the variant: count-style measurings build a
//! [`CountUpdater`], measurings that extract a number from the event build a
//! [`DistributionUpdater`]. Updaters are immutable once built and hold no
//! state of their own; all accumulation happens in the backend metric.

pub mod count;
pub mod distribution;

pub use count::CountUpdater;
pub use distribution::DistributionUpdater;

use crate::declaration::{EventSource, ListenerDeclaration, Measuring, UpdaterKind};
use crate::error::{DeclarationError, UpdateError};
use crate::event::{Event, Variables};
use crate::labels::LabelResolver;
use crate::metrics::MetricInstance;
use std::sync::Arc;

/// Shared binding data for both updater variants
#[derive(Debug, Clone)]
pub(crate) struct Binding {
    pub(crate) name: String,
    pub(crate) measuring: Measuring,
    pub(crate) instance: Arc<MetricInstance>,
    pub(crate) resolver: LabelResolver,
}

impl Binding {
    /// Resolve label values and pass them to `apply` as `&[&str]`
    pub(crate) fn with_labels<T>(
        &self,
        event: &Event<'_>,
        vars: &Variables,
        apply: impl FnOnce(&[&str]) -> Result<T, prometheus::Error>,
    ) -> Result<T, UpdateError> {
        let values = self.resolver.resolve(event, vars);
        let values: Vec<&str> = values.iter().map(String::as_str).collect();
        apply(&values).map_err(|source| UpdateError::Backend {
            metric: self.name.clone(),
            source,
        })
    }
}

/// One observation strategy per listener metric
#[derive(Debug, Clone)]
pub enum Updater {
    Count(CountUpdater),
    Distribution(DistributionUpdater),
}

/// Build the updater variant for `measuring`, bound to `instance`
///
/// Fails when the registered instance cannot carry the measuring, which
/// happens when a metric of the same name was registered earlier with a
/// different kind.
pub fn updater_for(
    measuring: Measuring,
    name: impl Into<String>,
    instance: Arc<MetricInstance>,
    resolver: LabelResolver,
) -> Result<Updater, DeclarationError> {
    let name: String = name.into();
    if !measuring.accepts(instance.kind()) {
        return Err(DeclarationError::IncompatibleInstance {
            name,
            registered: instance.kind(),
            measuring,
        });
    }

    let binding = Binding {
        name,
        measuring,
        instance,
        resolver,
    };
    Ok(match measuring.updater_kind() {
        UpdaterKind::Count => Updater::Count(CountUpdater::new(binding)),
        UpdaterKind::Distribution => Updater::Distribution(DistributionUpdater::new(binding)),
    })
}

/// An updater together with the event stream it listens to
#[derive(Debug, Clone)]
pub struct BoundUpdater {
    source: EventSource,
    updater: Updater,
}

impl BoundUpdater {
    /// Build the updater for a listener declaration
    pub fn new(
        declaration: &ListenerDeclaration,
        instance: Arc<MetricInstance>,
        resolver: LabelResolver,
    ) -> Result<Self, DeclarationError> {
        let updater = updater_for(
            declaration.measuring(),
            declaration.name(),
            instance,
            resolver,
        )?;
        Ok(Self {
            source: declaration.source(),
            updater,
        })
    }

    pub fn updater(&self) -> &Updater {
        &self.updater
    }

    /// Whether this updater should see `event`
    pub fn matches(&self, event: &Event<'_>) -> bool {
        self.source == event.source()
    }
}

impl Updater {
    /// Apply exactly one observation for `event`
    ///
    /// # Errors
    ///
    /// Returns an error when the measured field does not exist on this event
    /// or the backend rejects the label values. Callers log and move on.
    pub fn update(&self, event: &Event<'_>, vars: &Variables) -> Result<(), UpdateError> {
        match self {
            Updater::Count(updater) => updater.update(event, vars),
            Updater::Distribution(updater) => updater.update(event, vars),
        }
    }

    pub fn name(&self) -> &str {
        &self.binding().name
    }

    pub fn measuring(&self) -> Measuring {
        self.binding().measuring
    }

    pub fn kind(&self) -> UpdaterKind {
        match self {
            Updater::Count(_) => UpdaterKind::Count,
            Updater::Distribution(_) => UpdaterKind::Distribution,
        }
    }

    fn binding(&self) -> &Binding {
        match self {
            Updater::Count(updater) => updater.binding(),
            Updater::Distribution(updater) => updater.binding(),
        }
    }
}
