//! loadprom binary
//!
//! Loads the configuration, drives one run from recorded or simulated
//! samples, and exports the resulting Prometheus snapshots.

use clap::Parser;
use loadprom::cli::{Cli, Command, generate_config_template};
use loadprom::config::Config;
use loadprom::controller::RunController;
use loadprom::declaration::{ListenerDeclaration, MetricDeclaration};
use loadprom::event::VariableSchema;
use loadprom::export::{ExportSink, TextfileSink, WriterSink};
use loadprom::metrics::MetricRegistry;
use loadprom::replay::{self, ReplayRecord, Simulator};
use loadprom::telemetry;
use std::sync::Arc;
use std::time::Duration;

#[tokio::main]
async fn main() -> Result<(), Box<dyn std::error::Error>> {
    let cli = Cli::parse();

    match cli.command {
        Command::Config { output } => {
            let template = generate_config_template();
            match output {
                Some(path) => {
                    std::fs::write(&path, template)?;
                    eprintln!("Configuration template written to {}", path);
                }
                None => print!("{}", template),
            }
            Ok(())
        }
        Command::Check => {
            let config = Config::from_file(&cli.config)?;
            check(&config);
            Ok(())
        }
        Command::Replay { file, workers } => {
            let config = Config::from_file(&cli.config)?;
            telemetry::init(&config.observability().log_level);

            let reader = std::io::BufReader::new(std::fs::File::open(&file)?);
            let records = replay::read_records(reader)?;
            tracing::info!(file = %file, records = records.len(), "Loaded replay file");

            run(&config, records, usize::from(workers)).await
        }
        Command::Simulate {
            samples,
            workers,
            seed,
        } => {
            let config = Config::from_file(&cli.config)?;
            telemetry::init(&config.observability().log_level);

            let schema = VariableSchema::new(config.metrics().sample_variables().iter().cloned());
            let mut simulator = match seed {
                Some(seed) => Simulator::seeded(schema, seed),
                None => Simulator::new(schema),
            };
            let records = simulator.records(samples);

            run(&config, records, usize::from(workers)).await
        }
    }
}

/// Print one line per declaration: ok, or the reason it would be skipped
fn check(config: &Config) {
    let mut failures = 0usize;
    for entry in config.metrics().listener() {
        match ListenerDeclaration::from_config(entry) {
            Ok(decl) => println!(
                "ok      listener {} ({} {} on {})",
                decl.name(),
                decl.metric().kind(),
                decl.measuring(),
                decl.source()
            ),
            Err(e) => {
                failures += 1;
                println!("skipped listener {}: {}", entry.name, e);
            }
        }
    }
    for entry in config.metrics().shared() {
        match MetricDeclaration::from_config(entry) {
            Ok(decl) => println!("ok      shared   {} ({})", decl.name(), decl.kind()),
            Err(e) => {
                failures += 1;
                println!("skipped shared   {}: {}", entry.name, e);
            }
        }
    }
    println!("{} declaration(s) would be skipped", failures);
}

async fn run(
    config: &Config,
    records: Vec<ReplayRecord>,
    workers: usize,
) -> Result<(), Box<dyn std::error::Error>> {
    let registry = Arc::new(MetricRegistry::new());
    let sink: Arc<dyn ExportSink> = match config.export().textfile_dir() {
        Some(dir) => Arc::new(TextfileSink::new(dir)),
        None => Arc::new(WriterSink::stdout()),
    };
    tracing::info!(sink = %sink.describe(), job = %config.export().job(), "Exporting metrics");

    let controller = Arc::new(
        RunController::new(Arc::clone(&registry), config.export()).with_sink(sink),
    );

    let summary = controller.on_run_start(config.metrics());
    if !summary.skipped.is_empty() {
        tracing::warn!(skipped = ?summary.skipped, "Some metric declarations were skipped");
    }

    let flusher = config.export().flush_interval_seconds().map(|secs| {
        tokio::spawn(flush_periodically(
            Arc::clone(&controller),
            Duration::from_secs(secs),
        ))
    });

    let dispatcher = Arc::clone(&controller);
    let stats = tokio::task::spawn_blocking(move || {
        replay::run_workers(&dispatcher, &records, workers)
    })
    .await
    .map_err(|e| loadprom::error::AppError::Internal(format!("worker pool panicked: {}", e)))?;

    if let Some(flusher) = flusher {
        flusher.abort();
    }

    let ender = Arc::clone(&controller);
    tokio::task::spawn_blocking(move || ender.on_run_end()).await?;
    registry.shutdown();

    tracing::info!(
        samples = stats.samples,
        assertions = stats.assertions,
        workers = stats.workers,
        "Run complete"
    );
    Ok(())
}

/// Export on a fixed period until aborted
async fn flush_periodically(controller: Arc<RunController>, period: Duration) {
    let mut interval = tokio::time::interval(period);
    // the first tick completes immediately
    interval.tick().await;
    loop {
        interval.tick().await;
        let exporter = Arc::clone(&controller);
        if let Err(e) = tokio::task::spawn_blocking(move || exporter.export()).await {
            tracing::error!(error = %e, "Periodic export task failed");
        }
    }
}
