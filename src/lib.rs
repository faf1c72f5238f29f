//! loadprom - Prometheus metrics from load-test events
//!
//! Declared metrics are registered at run start, fed by sample and
//! assertion events from many worker threads, exported as Prometheus text,
//! and released at run end.

pub mod cli;
pub mod config;
pub mod controller;
pub mod declaration;
pub mod error;
pub mod event;
pub mod export;
pub mod labels;
pub mod metrics;
pub mod replay;
pub mod telemetry;
pub mod updater;
