//! Error types surfaced by the hive CLI.

use std::io;

use hive_plugins::HiveError;
use hive_plugins::telemetry::TelemetryError;
use thiserror::Error;

#[derive(Debug, Error)]
pub(crate) enum AppError {
    #[error("{0}")]
    CliUsage(clap::Error),
    #[error("failed to configure logging: {0}")]
    Telemetry(#[from] TelemetryError),
    #[error("failed to start plugin: {0}")]
    Start(HiveError),
    #[error("plugin call failed: {0}")]
    Invoke(HiveError),
    #[error("failed to write plugin reply: {0}")]
    WriteOutput(io::Error),
}
