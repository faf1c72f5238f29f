//! Event stream drivers
//!
//! Feed a run from recorded samples (JSON lines) or from a synthetic
//! generator, spreading events across worker threads the way a load
//! generator's thread group would.

use crate::controller::RunController;
use crate::error::{AppError, AppResult};
use crate::event::{AssertionResult, SampleEvent, VariableSchema, Variables};
use rand::rngs::StdRng;
use rand::{Rng, SeedableRng};
use serde::{Deserialize, Serialize};
use std::io::BufRead;
use std::thread;
use std::time::Instant;

/// One recorded sample and the variables of the thread that produced it
///
/// On disk a record is a flat JSON object: the sample fields plus an
/// optional `context` object.
#[derive(Debug, Clone, PartialEq, Deserialize, Serialize)]
pub struct ReplayRecord {
    #[serde(flatten)]
    pub sample: SampleEvent,
    #[serde(default, skip_serializing_if = "Variables::is_empty")]
    pub context: Variables,
}

impl ReplayRecord {
    pub fn new(sample: SampleEvent) -> Self {
        Self {
            sample,
            context: Variables::new(),
        }
    }
}

/// Read JSON-lines records
///
/// Blank lines and lines starting with `#` are skipped.
///
/// # Errors
///
/// Returns [`AppError::EventParse`] with the 1-based line number of the
/// first malformed record, or [`AppError::Io`] if reading fails.
pub fn read_records<R: BufRead>(reader: R) -> AppResult<Vec<ReplayRecord>> {
    let mut records = Vec::new();
    for (idx, line) in reader.lines().enumerate() {
        let line = line?;
        let trimmed = line.trim();
        if trimmed.is_empty() || trimmed.starts_with('#') {
            continue;
        }
        let record = serde_json::from_str(trimmed).map_err(|source| AppError::EventParse {
            line: idx + 1,
            source,
        })?;
        records.push(record);
    }
    Ok(records)
}

/// Totals of one replay
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct ReplayStats {
    pub samples: usize,
    pub assertions: usize,
    pub workers: usize,
}

/// Dispatch every record through `controller` using `workers` threads
///
/// Records are dealt round-robin, so each worker sees every `workers`-th
/// record in file order. Returns once all workers have finished.
pub fn run_workers(
    controller: &RunController,
    records: &[ReplayRecord],
    workers: usize,
) -> ReplayStats {
    let workers = workers.clamp(1, records.len().max(1));
    let started = Instant::now();

    thread::scope(|scope| {
        for worker in 0..workers {
            scope.spawn(move || {
                let mut dispatched = 0usize;
                for record in records.iter().skip(worker).step_by(workers) {
                    controller.on_sample(&record.sample, &record.context);
                    dispatched += 1;
                }
                tracing::debug!(worker, dispatched, "Worker finished");
            });
        }
    });

    let stats = ReplayStats {
        samples: records.len(),
        assertions: records.iter().map(|r| r.sample.assertions.len()).sum(),
        workers,
    };
    tracing::info!(
        samples = stats.samples,
        assertions = stats.assertions,
        workers = stats.workers,
        elapsed_ms = started.elapsed().as_millis() as u64,
        "Replay finished"
    );
    stats
}

const SIMULATED_LABELS: [&str; 5] = ["Home", "Login", "Search", "Add to cart", "Checkout"];

/// Synthetic sample generator for smoke-testing dashboards
///
/// Roughly 5% of samples fail with a 5xx code, and about one sample in ten
/// carries a response assertion.
pub struct Simulator {
    rng: StdRng,
    schema: VariableSchema,
}

impl Simulator {
    pub fn new(schema: VariableSchema) -> Self {
        Self {
            rng: StdRng::from_os_rng(),
            schema,
        }
    }

    /// Reproducible generator
    pub fn seeded(schema: VariableSchema, seed: u64) -> Self {
        Self {
            rng: StdRng::seed_from_u64(seed),
            schema,
        }
    }

    /// Generate one record
    pub fn next_record(&mut self) -> ReplayRecord {
        let label = SIMULATED_LABELS[self.rng.random_range(0..SIMULATED_LABELS.len())];
        let success = self.rng.random_bool(0.95);
        let response_code = if success {
            "200"
        } else {
            ["500", "502", "503"][self.rng.random_range(0..3)]
        };

        let connect = self.rng.random_range(0..20u64);
        let latency = connect + self.rng.random_range(5..300u64);
        let elapsed = latency + self.rng.random_range(0..200u64);

        let mut sample = SampleEvent::new(label, response_code, elapsed);
        sample.success = success;
        sample.bytes = self.rng.random_range(256..65_536u64);
        sample.latency_ms = Some(latency);
        sample.connect_time_ms = Some(connect);
        sample.idle_time_ms = Some(self.rng.random_range(0..5u64));

        let thread = self.rng.random_range(1..=10u32);
        sample.variables = self
            .schema
            .names()
            .iter()
            .map(|name| format!("{name}-{thread}"))
            .collect();

        if self.rng.random_bool(0.1) {
            sample.assertions.push(if success {
                AssertionResult::passed("Response Assertion")
            } else {
                AssertionResult::failed("Response Assertion", format!("unexpected code {response_code}"))
            });
        }

        let mut record = ReplayRecord::new(sample);
        record.context.insert("thread", format!("worker-{thread}"));
        record
    }

    /// Generate `count` records
    pub fn records(&mut self, count: usize) -> Vec<ReplayRecord> {
        (0..count).map(|_| self.next_record()).collect()
    }
}
