//! Metric registry
//!
//! Maps metric names to live instances and owns the Prometheus registry the
//! exporters read from. One registry is created at process start and shared
//! by reference; it outlives individual runs and is emptied between them.

use super::MetricInstance;
use crate::declaration::MetricDeclaration;
use crate::error::RegistryError;
use prometheus::proto::MetricFamily;
use prometheus::{Encoder, Registry, TextEncoder};
use std::collections::HashMap;
use std::sync::{Arc, PoisonError, RwLock};

struct Entry {
    labels: Vec<String>,
    instance: Arc<MetricInstance>,
}

/// At most one live metric instance per name
///
/// Lookups of already-registered names only take the read lock; the write
/// lock is held only while creating a missing instance.
pub struct MetricRegistry {
    backend: Registry,
    instances: RwLock<HashMap<String, Entry>>,
}

impl MetricRegistry {
    /// Create an empty registry
    pub fn new() -> Self {
        Self {
            backend: Registry::new(),
            instances: RwLock::new(HashMap::new()),
        }
    }

    /// Return the instance registered under the declaration's name,
    /// creating and registering it if there is none
    ///
    /// An existing instance is returned even if its label names differ
    /// from `declaration`'s. The mismatch is logged here and surfaces as a
    /// label arity error when values are recorded.
    ///
    /// # Errors
    ///
    /// Returns an error if the backend refuses to create or register the
    /// metric (invalid name, duplicate label names, name clash with another
    /// collector).
    pub fn get_or_create_and_register(
        &self,
        declaration: &MetricDeclaration,
    ) -> Result<Arc<MetricInstance>, RegistryError> {
        {
            let instances = self.instances.read().unwrap_or_else(PoisonError::into_inner);
            if let Some(entry) = instances.get(declaration.name()) {
                warn_on_label_mismatch(declaration, entry);
                return Ok(Arc::clone(&entry.instance));
            }
        }

        let mut instances = self
            .instances
            .write()
            .unwrap_or_else(PoisonError::into_inner);

        // another thread may have created it between the two locks
        if let Some(entry) = instances.get(declaration.name()) {
            warn_on_label_mismatch(declaration, entry);
            return Ok(Arc::clone(&entry.instance));
        }

        let instance = MetricInstance::create(declaration)?;
        self.backend.register(Box::new(instance.clone()))?;

        tracing::debug!(
            metric = %declaration.name(),
            kind = %declaration.kind(),
            labels = ?declaration.labels(),
            "Registered metric"
        );

        let instance = Arc::new(instance);
        instances.insert(
            declaration.name().to_string(),
            Entry {
                labels: declaration.labels().to_vec(),
                instance: Arc::clone(&instance),
            },
        );
        Ok(instance)
    }

    /// Look up a registered instance by name
    pub fn get(&self, name: &str) -> Option<Arc<MetricInstance>> {
        self.instances
            .read()
            .unwrap_or_else(PoisonError::into_inner)
            .get(name)
            .map(|entry| Arc::clone(&entry.instance))
    }

    /// Remove the instance registered under the declaration's name
    ///
    /// Returns whether an instance was removed.
    pub fn unregister(&self, declaration: &MetricDeclaration) -> bool {
        let removed = self
            .instances
            .write()
            .unwrap_or_else(PoisonError::into_inner)
            .remove(declaration.name());

        match removed {
            Some(entry) => {
                self.release(declaration.name(), &entry.instance);
                true
            }
            None => false,
        }
    }

    /// Remove and release every instance
    ///
    /// The next registration of any name starts from an empty metric.
    pub fn clear(&self) {
        let drained: Vec<(String, Entry)> = self
            .instances
            .write()
            .unwrap_or_else(PoisonError::into_inner)
            .drain()
            .collect();

        let count = drained.len();
        for (name, entry) in drained {
            self.release(&name, &entry.instance);
        }

        tracing::debug!(released = count, "Cleared metric registry");
    }

    /// Release everything at process shutdown
    pub fn shutdown(&self) {
        let remaining = self.len();
        self.clear();
        tracing::info!(released = remaining, "Metric registry shut down");
    }

    pub fn len(&self) -> usize {
        self.instances
            .read()
            .unwrap_or_else(PoisonError::into_inner)
            .len()
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }

    /// Names of all registered metrics, sorted
    pub fn names(&self) -> Vec<String> {
        let mut names: Vec<String> = self
            .instances
            .read()
            .unwrap_or_else(PoisonError::into_inner)
            .keys()
            .cloned()
            .collect();
        names.sort();
        names
    }

    /// Current state of every registered metric
    pub fn gather(&self) -> Vec<MetricFamily> {
        self.backend.gather()
    }

    /// Gather all metrics and encode them in Prometheus text format
    ///
    /// # Errors
    ///
    /// Returns an error if metric encoding fails.
    pub fn encode_text(&self) -> Result<String, prometheus::Error> {
        let metric_families = self.gather();
        let metric_count = metric_families.len();

        tracing::debug!(
            metric_family_count = metric_count,
            "Encoding metrics to Prometheus text format"
        );

        let mut buffer = Vec::new();
        TextEncoder::new()
            .encode(&metric_families, &mut buffer)
            .map_err(|e| {
                let metric_names: Vec<_> = metric_families.iter().map(|mf| mf.name()).collect();
                tracing::error!(
                    error = %e,
                    metric_family_count = metric_count,
                    metric_names = ?metric_names,
                    "Prometheus text encoder failed"
                );
                e
            })?;

        String::from_utf8(buffer).map_err(|e| {
            prometheus::Error::Msg(format!(
                "Prometheus encoder produced invalid UTF-8 at byte {}",
                e.utf8_error().valid_up_to()
            ))
        })
    }

    fn release(&self, name: &str, instance: &MetricInstance) {
        if let Err(e) = self.backend.unregister(Box::new(instance.clone())) {
            tracing::warn!(metric = %name, error = %e, "Failed to unregister metric from backend");
        }
    }
}

impl Default for MetricRegistry {
    fn default() -> Self {
        Self::new()
    }
}

fn warn_on_label_mismatch(declaration: &MetricDeclaration, entry: &Entry) {
    if entry.labels.as_slice() != declaration.labels() {
        tracing::warn!(
            metric = %declaration.name(),
            registered_labels = ?entry.labels,
            requested_labels = ?declaration.labels(),
            "Metric already registered with different labels, reusing existing instance"
        );
    }
}
