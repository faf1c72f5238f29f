//! Run lifecycle
//!
//! `Idle → Running → Idle`. Run start turns the metric configuration into
//! registered metrics and updaters; every event is fanned out to the updaters
//! listening to its stream; run end exports once more and releases
//! everything so the next run starts from zero.
//!
//! Dispatch holds a shared guard on the active run for the duration of one
//! event. Run end takes the exclusive guard, so it waits for in-flight
//! events to drain and no update ever lands on a released metric.

use crate::config::{ExportConfig, MetricConfig, MetricsConfig};
use crate::declaration::{ListenerDeclaration, MetricDeclaration};
use crate::error::DeclarationError;
use crate::event::{Event, SampleEvent, VariableSchema, Variables};
use crate::export::ExportSink;
use crate::labels::LabelResolver;
use crate::metrics::{MetricInstance, MetricRegistry};
use crate::updater::BoundUpdater;
use std::collections::HashMap;
use std::sync::{Arc, PoisonError, RwLock};

/// Updaters and shared metrics of the run in progress
struct ActiveRun {
    updaters: Vec<BoundUpdater>,
    shared: HashMap<String, Arc<MetricInstance>>,
}

/// Outcome of building one run
#[derive(Debug, Default, Clone, PartialEq, Eq)]
pub struct RunSummary {
    /// Listener metrics with a live updater
    pub listeners: usize,
    /// Shared metrics published by name
    pub shared: usize,
    /// Declarations skipped because of a configuration or backend error
    pub skipped: Vec<String>,
}

/// Drives one run at a time against a process-wide registry
pub struct RunController {
    registry: Arc<MetricRegistry>,
    sink: Option<Arc<dyn ExportSink>>,
    job: String,
    push_on_event: bool,
    run: RwLock<Option<ActiveRun>>,
}

impl RunController {
    pub fn new(registry: Arc<MetricRegistry>, export: &ExportConfig) -> Self {
        Self {
            registry,
            sink: None,
            job: export.job().to_string(),
            push_on_event: export.push_on_event(),
            run: RwLock::new(None),
        }
    }

    /// Attach the sink used by [`export`](Self::export)
    pub fn with_sink(mut self, sink: Arc<dyn ExportSink>) -> Self {
        self.sink = Some(sink);
        self
    }

    pub fn registry(&self) -> &Arc<MetricRegistry> {
        &self.registry
    }

    pub fn job(&self) -> &str {
        &self.job
    }

    pub fn is_running(&self) -> bool {
        self.run
            .read()
            .unwrap_or_else(PoisonError::into_inner)
            .is_some()
    }

    /// Start a run from the metric configuration
    ///
    /// Every declaration is handled on its own: one that fails to parse,
    /// register or bind is logged and skipped, and the run proceeds with
    /// the rest. Starting while a run is active ends that run first.
    pub fn on_run_start(&self, config: &MetricsConfig) -> RunSummary {
        let mut run = self.run.write().unwrap_or_else(PoisonError::into_inner);
        if run.is_some() {
            tracing::warn!("Run started while previous run still active, ending it first");
            self.finish(&mut run);
        }

        let schema = VariableSchema::new(config.sample_variables().iter().cloned());
        let mut summary = RunSummary::default();
        let mut updaters = Vec::with_capacity(config.listener().len());
        let mut shared = HashMap::with_capacity(config.shared().len());

        for entry in config.listener() {
            match self.build_listener(entry, &schema) {
                Ok(updater) => updaters.push(updater),
                Err(e) => {
                    tracing::warn!(metric = %entry.name, error = %e, "Skipping listener metric");
                    summary.skipped.push(entry.name.clone());
                }
            }
        }

        for entry in config.shared() {
            match self.build_shared(entry) {
                Ok((name, instance)) => {
                    shared.insert(name, instance);
                }
                Err(e) => {
                    tracing::warn!(metric = %entry.name, error = %e, "Skipping shared metric");
                    summary.skipped.push(entry.name.clone());
                }
            }
        }

        summary.listeners = updaters.len();
        summary.shared = shared.len();
        *run = Some(ActiveRun { updaters, shared });

        tracing::info!(
            job = %self.job,
            listeners = summary.listeners,
            shared = summary.shared,
            skipped = summary.skipped.len(),
            "Run started"
        );
        summary
    }

    fn build_listener(
        &self,
        entry: &MetricConfig,
        schema: &VariableSchema,
    ) -> Result<BoundUpdater, DeclarationError> {
        let declaration = ListenerDeclaration::from_config(entry)?;
        let instance = self.register(declaration.metric())?;
        let resolver = LabelResolver::new(declaration.metric().labels(), schema);
        BoundUpdater::new(&declaration, instance, resolver)
    }

    fn build_shared(
        &self,
        entry: &MetricConfig,
    ) -> Result<(String, Arc<MetricInstance>), DeclarationError> {
        let declaration = MetricDeclaration::from_config(entry)?;
        let instance = self.register(&declaration)?;
        Ok((declaration.name().to_string(), instance))
    }

    fn register(
        &self,
        declaration: &MetricDeclaration,
    ) -> Result<Arc<MetricInstance>, DeclarationError> {
        self.registry
            .get_or_create_and_register(declaration)
            .map_err(|source| DeclarationError::Registry {
                name: declaration.name().to_string(),
                source,
            })
    }

    /// Dispatch one event to every updater listening to its stream
    ///
    /// Each updater runs independently; a failed update is logged and the
    /// remaining updaters still see the event. Events arriving while idle
    /// are dropped.
    pub fn on_event(&self, event: Event<'_>, vars: &Variables) {
        {
            let run = self.run.read().unwrap_or_else(PoisonError::into_inner);
            let Some(active) = run.as_ref() else {
                tracing::debug!(event = %event.name(), "Event received while idle, dropping");
                return;
            };
            dispatch(active, &event, vars);
        }

        if self.push_on_event {
            self.export();
        }
    }

    /// Dispatch a sample, then each of its assertion results
    pub fn on_sample(&self, sample: &SampleEvent, vars: &Variables) {
        {
            let run = self.run.read().unwrap_or_else(PoisonError::into_inner);
            let Some(active) = run.as_ref() else {
                tracing::debug!(event = %sample.label, "Sample received while idle, dropping");
                return;
            };

            dispatch(active, &Event::Sample(sample), vars);
            for assertion in &sample.assertions {
                dispatch(active, &Event::Assertion { assertion, sample }, vars);
            }
        }

        if self.push_on_event {
            self.export();
        }
    }

    /// Live handle of a shared metric of the current run
    pub fn shared_metric(&self, name: &str) -> Option<Arc<MetricInstance>> {
        self.run
            .read()
            .unwrap_or_else(PoisonError::into_inner)
            .as_ref()
            .and_then(|active| active.shared.get(name).cloned())
    }

    /// Push the current registry snapshot to the sink, if any
    ///
    /// Returns whether the push succeeded. Failures are logged, never
    /// propagated.
    pub fn export(&self) -> bool {
        let Some(sink) = &self.sink else {
            return false;
        };

        match sink.push(&self.job, &self.registry) {
            Ok(()) => {
                tracing::debug!(job = %self.job, sink = %sink.describe(), "Exported metrics");
                true
            }
            Err(e) => {
                tracing::error!(
                    job = %self.job,
                    sink = %sink.describe(),
                    error = %e,
                    "Failed to export metrics"
                );
                false
            }
        }
    }

    /// End the run: final export, then release every metric of the run
    ///
    /// Waits for in-flight events to finish. Calling it while idle does
    /// nothing.
    pub fn on_run_end(&self) {
        let mut run = self.run.write().unwrap_or_else(PoisonError::into_inner);
        if run.is_none() {
            tracing::debug!("Run end received while idle");
            return;
        }
        self.finish(&mut run);
    }

    fn finish(&self, run: &mut Option<ActiveRun>) {
        self.export();
        if let Some(active) = run.take() {
            tracing::info!(
                job = %self.job,
                listeners = active.updaters.len(),
                shared = active.shared.len(),
                "Run ended"
            );
        }
        self.registry.clear();
    }
}

fn dispatch(active: &ActiveRun, event: &Event<'_>, vars: &Variables) {
    for bound in active.updaters.iter().filter(|u| u.matches(event)) {
        if let Err(e) = bound.updater().update(event, vars) {
            tracing::warn!(
                metric = %bound.updater().name(),
                event = %event.name(),
                error = %e,
                "Metric update failed"
            );
        }
    }
}
