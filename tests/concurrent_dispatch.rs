//! Integration tests for concurrent event dispatch
//!
//! Many worker threads call on_sample without coordinating with each other;
//! every update must land exactly once, and run end must wait for in-flight
//! events.

use loadprom::{
    config::Config,
    controller::RunController,
    error::ExportError,
    event::{SampleEvent, Variables},
    export::{ExportSink, TextfileSink},
    metrics::MetricRegistry,
    replay::{self, ReplayRecord},
};
use std::sync::Arc;
use std::sync::atomic::{AtomicBool, AtomicUsize, Ordering};
use std::thread;

const WORKERS: usize = 16;
const SAMPLES_PER_WORKER: usize = 500;

fn create_test_config() -> Config {
    r#"
[[metrics.listener]]
name = "requests"
kind = "counter"
labels = ["label"]
measuring = "CountTotal"

[[metrics.listener]]
name = "success"
kind = "ratio"
labels = ["label"]
measuring = "SuccessRatio"

[[metrics.listener]]
name = "resp_time"
kind = "distribution"
labels = ["label"]
measuring = "ResponseTime"
"#
    .parse()
    .expect("should parse config")
}

#[test]
fn test_concurrent_samples_are_all_counted() {
    let config = create_test_config();
    let controller = Arc::new(RunController::new(
        Arc::new(MetricRegistry::new()),
        config.export(),
    ));
    controller.on_run_start(config.metrics());

    let handles: Vec<_> = (0..WORKERS)
        .map(|worker| {
            let controller = Arc::clone(&controller);
            thread::spawn(move || {
                let vars = Variables::new();
                for i in 0..SAMPLES_PER_WORKER {
                    let mut sample = SampleEvent::new("Login", "200", 10);
                    // every fourth sample of every worker fails
                    sample.success = (worker + i) % 4 != 0;
                    controller.on_sample(&sample, &vars);
                }
            })
        })
        .collect();

    for handle in handles {
        handle.join().expect("worker should not panic");
    }

    let total = (WORKERS * SAMPLES_PER_WORKER) as f64;
    let registry = controller.registry();

    let requests = registry.get("requests").unwrap();
    assert_eq!(requests.counter_value(&["Login"]), Some(total));

    let resp_time = registry.get("resp_time").unwrap();
    assert_eq!(
        resp_time.distribution_stats(&["Login"]),
        Some((total as u64, total * 10.0))
    );

    let success = registry.get("success").unwrap();
    assert_eq!(success.ratio_value(&["Login"]), Some(0.75));
}

#[test]
fn test_run_end_waits_for_in_flight_events() {
    let config = create_test_config();
    let controller = Arc::new(RunController::new(
        Arc::new(MetricRegistry::new()),
        config.export(),
    ));
    controller.on_run_start(config.metrics());

    let stop = Arc::new(AtomicBool::new(false));
    let handles: Vec<_> = (0..4)
        .map(|_| {
            let controller = Arc::clone(&controller);
            let stop = Arc::clone(&stop);
            thread::spawn(move || {
                let sample = SampleEvent::new("Search", "200", 5);
                let vars = Variables::new();
                while !stop.load(Ordering::Relaxed) {
                    controller.on_sample(&sample, &vars);
                }
            })
        })
        .collect();

    thread::sleep(std::time::Duration::from_millis(20));
    controller.on_run_end();

    // events after run end are dropped, so nothing re-creates metrics
    thread::sleep(std::time::Duration::from_millis(20));
    assert!(controller.registry().is_empty());

    stop.store(true, Ordering::Relaxed);
    for handle in handles {
        handle.join().expect("worker should not panic");
    }
    assert!(!controller.is_running());
    assert!(controller.registry().is_empty());
}

#[test]
fn test_replay_workers_dispatch_every_record() {
    let config = create_test_config();
    let controller = RunController::new(Arc::new(MetricRegistry::new()), config.export());
    controller.on_run_start(config.metrics());

    let records: Vec<ReplayRecord> = (0..1000)
        .map(|i| {
            let label = if i % 2 == 0 { "Home" } else { "Search" };
            ReplayRecord::new(SampleEvent::new(label, "200", 1))
        })
        .collect();

    let stats = replay::run_workers(&controller, &records, 8);

    assert_eq!(stats.samples, 1000);
    assert_eq!(stats.workers, 8);
    let requests = controller.registry().get("requests").unwrap();
    assert_eq!(requests.counter_value(&["Home"]), Some(500.0));
    assert_eq!(requests.counter_value(&["Search"]), Some(500.0));
}

#[test]
fn test_replay_with_more_workers_than_records() {
    let config = create_test_config();
    let controller = RunController::new(Arc::new(MetricRegistry::new()), config.export());
    controller.on_run_start(config.metrics());

    let records = vec![ReplayRecord::new(SampleEvent::new("Home", "200", 1))];
    let stats = replay::run_workers(&controller, &records, 32);

    assert_eq!(stats.workers, 1);
    let requests = controller.registry().get("requests").unwrap();
    assert_eq!(requests.counter_value(&["Home"]), Some(1.0));
}

/// Textfile sink that counts failed pushes
struct CountingSink {
    inner: TextfileSink,
    pushes: AtomicUsize,
    failures: AtomicUsize,
}

impl ExportSink for CountingSink {
    fn push(&self, job: &str, registry: &MetricRegistry) -> Result<(), ExportError> {
        self.pushes.fetch_add(1, Ordering::Relaxed);
        let result = self.inner.push(job, registry);
        if result.is_err() {
            self.failures.fetch_add(1, Ordering::Relaxed);
        }
        result
    }

    fn describe(&self) -> String {
        self.inner.describe()
    }
}

#[test]
fn test_push_on_event_from_many_workers_keeps_textfile_intact() {
    const PUSHING_WORKERS: usize = 8;
    const SAMPLES: usize = 100;

    let dir = tempfile::tempdir().unwrap();
    let config: Config = r#"
[export]
job = "live"
push_on_event = true

[[metrics.listener]]
name = "requests"
kind = "counter"
labels = ["label"]
measuring = "CountTotal"
"#
    .parse()
    .expect("should parse config");

    let sink = Arc::new(CountingSink {
        inner: TextfileSink::new(dir.path()),
        pushes: AtomicUsize::new(0),
        failures: AtomicUsize::new(0),
    });
    let controller = Arc::new(
        RunController::new(Arc::new(MetricRegistry::new()), config.export())
            .with_sink(Arc::clone(&sink) as Arc<dyn ExportSink>),
    );
    controller.on_run_start(config.metrics());

    let handles: Vec<_> = (0..PUSHING_WORKERS)
        .map(|_| {
            let controller = Arc::clone(&controller);
            thread::spawn(move || {
                let vars = Variables::new();
                for _ in 0..SAMPLES {
                    controller.on_sample(&SampleEvent::new("Login", "200", 1), &vars);
                }
            })
        })
        .collect();
    for handle in handles {
        handle.join().expect("worker should not panic");
    }

    assert_eq!(sink.pushes.load(Ordering::Relaxed), PUSHING_WORKERS * SAMPLES);
    assert_eq!(sink.failures.load(Ordering::Relaxed), 0);

    // the last push to finish saw every sample
    let exported = std::fs::read_to_string(dir.path().join("live.prom")).unwrap();
    let expected = format!("requests{{label=\"Login\"}} {}", PUSHING_WORKERS * SAMPLES);
    assert!(exported.contains("# TYPE requests counter"));
    assert!(exported.lines().any(|line| line == expected), "{exported}");
}
