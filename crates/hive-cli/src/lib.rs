//! Command-line host for hive plugins.
//!
//! `hive` launches one plugin executable, invokes a single operation on it and
//! prints the reply as `<status> <payload>`. By default it starts the lobby
//! plugin from `plugins/lobby/hive-lobby` and calls `hello` with `world`.

use std::ffi::OsString;
use std::io::Write;
use std::process::ExitCode;

use clap::Parser;
use clap::error::ErrorKind as ClapErrorKind;
use hive_plugins::PluginHandle;
use hive_plugins::telemetry::{self, LOG_FORMAT_ENV_VAR, TelemetryConfig};
use hive_plugins::{LogFormat, Reply};
use tracing::debug;

mod cli;
mod errors;

use cli::Cli;
use errors::AppError;

const CLI_TARGET: &str = "hive_cli";

/// Runs the CLI using the provided arguments and IO handles.
#[must_use]
pub fn run<I, W, E>(args: I, stdout: &mut W, stderr: &mut E) -> ExitCode
where
    I: IntoIterator<Item = OsString>,
    W: Write,
    E: Write,
{
    let cli = match Cli::try_parse_from(args) {
        Ok(cli) => cli,
        Err(error) if is_informational(&error) => {
            return match write!(stdout, "{error}") {
                Ok(()) => ExitCode::SUCCESS,
                Err(_) => ExitCode::FAILURE,
            };
        }
        Err(error) => return report(&AppError::CliUsage(error), stderr),
    };

    match execute(&cli) {
        Ok(reply) => match render_reply(&reply, stdout) {
            Ok(()) => ExitCode::SUCCESS,
            Err(error) => report(&error, stderr),
        },
        Err(error) => report(&error, stderr),
    }
}

fn is_informational(error: &clap::Error) -> bool {
    matches!(
        error.kind(),
        ClapErrorKind::DisplayHelp | ClapErrorKind::DisplayVersion
    )
}

fn report<E: Write>(error: &AppError, stderr: &mut E) -> ExitCode {
    writeln!(stderr, "{error}").ok();
    ExitCode::FAILURE
}

fn execute(cli: &Cli) -> Result<Reply, AppError> {
    let mut base = TelemetryConfig::from_env()?;
    if std::env::var_os(LOG_FORMAT_ENV_VAR).is_none() {
        base = base.with_log_format(LogFormat::Compact);
    }
    telemetry::initialise(&cli.telemetry(base))?;

    debug!(
        target: CLI_TARGET,
        plugin = %cli.plugin.display(),
        name = %cli.name,
        operation = %cli.operation,
        "starting plugin"
    );
    let mut handle = PluginHandle::start_with(&cli.name, &cli.plugin, cli.plugin_options())
        .map_err(AppError::Start)?;
    let outcome = handle
        .invoke(&cli.operation, cli.payload.as_bytes())
        .map_err(AppError::Invoke);
    handle.close();
    outcome
}

fn render_reply<W: Write>(reply: &Reply, stdout: &mut W) -> Result<(), AppError> {
    writeln!(
        stdout,
        "{} {}",
        reply.status(),
        String::from_utf8_lossy(reply.payload())
    )
    .map_err(AppError::WriteOutput)
}

#[cfg(test)]
mod tests;
