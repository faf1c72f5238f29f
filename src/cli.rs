//! Command-line interface for loadprom
//!
//! Provides argument parsing and subcommand handling for the loadprom binary.

use clap::{Parser, Subcommand};

/// Turn load-test events into Prometheus metrics
#[derive(Parser)]
#[command(name = "loadprom")]
#[command(version)]
#[command(about = "Turn load-test events into Prometheus metrics")]
#[command(
    long_about = "loadprom feeds sample and assertion events from a load test into \
    configurable Prometheus counters, success ratios and histograms, and exports \
    the snapshots as text exposition files or to stdout."
)]
pub struct Cli {
    /// Path to configuration file
    #[arg(short, long, default_value = "loadprom.toml", global = true)]
    pub config: String,

    #[command(subcommand)]
    pub command: Command,
}

#[derive(Subcommand)]
pub enum Command {
    /// Generate a template configuration file
    Config {
        /// Output file path (prints to stdout if not specified)
        #[arg(short, long)]
        output: Option<String>,
    },

    /// Validate the configuration and every metric declaration
    Check,

    /// Replay recorded samples (JSON lines) as one run
    Replay {
        /// File with one sample record per line
        file: String,

        /// Number of worker threads dispatching events
        #[arg(short, long, default_value_t = 4, value_parser = clap::value_parser!(u16).range(1..=1024))]
        workers: u16,
    },

    /// Run with randomly generated samples
    Simulate {
        /// Number of samples to generate
        #[arg(short, long, default_value_t = 1000)]
        samples: usize,

        /// Number of worker threads dispatching events
        #[arg(short, long, default_value_t = 4, value_parser = clap::value_parser!(u16).range(1..=1024))]
        workers: u16,

        /// Seed for reproducible output
        #[arg(long)]
        seed: Option<u64>,
    },
}

/// Generate template configuration content
pub fn generate_config_template() -> &'static str {
    r#"# loadprom Configuration
# ======================
#
# Declares the Prometheus metrics fed by load-test events and where their
# snapshots are exported.

# ─────────────────────────────────────────────────────────────────────────────
# OBSERVABILITY
# ─────────────────────────────────────────────────────────────────────────────

[observability]
# Log level: "trace", "debug", "info", "warn", "error" (RUST_LOG overrides)
log_level = "info"

# ─────────────────────────────────────────────────────────────────────────────
# EXPORT
# ─────────────────────────────────────────────────────────────────────────────

[export]
# Job name snapshots are published under (also the textfile name)
job = "load_test"

# Export the full snapshot after every sample. Blocks the worker thread
# for the duration of the export; leave off for large runs.
push_on_event = false

# Periodic export while a run is active, in seconds (1-3600)
flush_interval_seconds = 10

# Write <job>.prom here for a node_exporter textfile collector.
# When unset, snapshots are printed to stdout.
# textfile_dir = "/var/lib/node_exporter/textfile_collector"

# ─────────────────────────────────────────────────────────────────────────────
# METRICS
# ─────────────────────────────────────────────────────────────────────────────
#
# Label names are resolved per event:
#   - "label": sample label (or assertion name for assertion metrics)
#   - "code":  response code (sample metrics only)
#   - a name listed in sample_variables: that variable's value
#   - anything else: the thread's context variable of that name
# Unresolved or empty values are exported as "null".

[metrics]
# Variables every sample carries, in order
sample_variables = ["user"]

# Listener metrics are fed by events.
#   kind:      "counter", "ratio" or "distribution"
#   measuring: ResponseTime, ResponseSize, Latency, IdleTime, ConnectTime,
#              SuccessTotal, FailureTotal, CountTotal, SuccessRatio
#   listen_to: "samples" (default) or "assertions"
#   buckets:   histogram bounds (ms for times, bytes for ResponseSize)

[[metrics.listener]]
name = "resp_time"
kind = "distribution"
help = "Response time in milliseconds"
labels = ["label", "code"]
measuring = "ResponseTime"
buckets = [100.0, 250.0, 500.0, 1000.0, 2500.0]

[[metrics.listener]]
name = "requests"
kind = "counter"
help = "Completed samples"
labels = ["label"]
measuring = "CountTotal"

[[metrics.listener]]
name = "success"
kind = "ratio"
help = "Share of successful samples"
labels = ["label"]
measuring = "SuccessRatio"

[[metrics.listener]]
name = "assertion_failures"
kind = "counter"
help = "Failed assertions"
labels = ["label"]
measuring = "FailureTotal"
listen_to = "assertions"

# Shared metrics are not fed by events; scripts record them by name.
[[metrics.shared]]
name = "logins"
kind = "counter"
help = "Logins performed by virtual users"
labels = ["user"]
"#
}

#[cfg(test)]
mod tests {
    use super::*;
    use clap::CommandFactory;

    #[test]
    fn verify_cli() {
        // Clap's built-in verification for the CLI structure
        Cli::command().debug_assert();
    }

    #[test]
    fn default_config_path() {
        let cli = Cli::parse_from(["loadprom", "check"]);
        assert_eq!(cli.config, "loadprom.toml");
        assert!(matches!(cli.command, Command::Check));
    }

    #[test]
    fn custom_config_path() {
        let cli = Cli::parse_from(["loadprom", "--config", "custom.toml", "check"]);
        assert_eq!(cli.config, "custom.toml");
    }

    #[test]
    fn config_subcommand_with_output() {
        let cli = Cli::parse_from(["loadprom", "config", "-o", "my-config.toml"]);
        assert!(matches!(
            cli.command,
            Command::Config { output: Some(ref path) } if path == "my-config.toml"
        ));
    }

    #[test]
    fn replay_subcommand_defaults() {
        let cli = Cli::parse_from(["loadprom", "replay", "samples.jsonl"]);
        assert!(matches!(
            cli.command,
            Command::Replay { ref file, workers: 4 } if file == "samples.jsonl"
        ));
    }

    #[test]
    fn replay_rejects_zero_workers() {
        let result = Cli::try_parse_from(["loadprom", "replay", "s.jsonl", "--workers", "0"]);
        assert!(result.is_err());
    }

    #[test]
    fn simulate_subcommand() {
        let cli = Cli::parse_from(["loadprom", "simulate", "-s", "50", "--seed", "3"]);
        assert!(matches!(
            cli.command,
            Command::Simulate {
                samples: 50,
                workers: 4,
                seed: Some(3)
            }
        ));
    }

    #[test]
    fn template_is_valid_config() {
        let template = generate_config_template();
        let config: Result<crate::config::Config, _> = template.parse();
        assert!(
            config.is_ok(),
            "Template should be a valid config: {:?}",
            config.err()
        );
    }

    #[test]
    fn template_declarations_are_all_valid() {
        let config: crate::config::Config = generate_config_template().parse().unwrap();
        for entry in config.metrics().listener() {
            assert!(
                crate::declaration::ListenerDeclaration::from_config(entry).is_ok(),
                "{}",
                entry.name
            );
        }
        for entry in config.metrics().shared() {
            assert!(crate::declaration::MetricDeclaration::from_config(entry).is_ok());
        }
    }
}
