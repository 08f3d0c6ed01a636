//! Configurable plugin used by the end-to-end tests.
//!
//! The payload of each call is interpreted as UTF-8 text. Operations:
//!
//! | Operation | Behaviour                                                    |
//! |-----------|--------------------------------------------------------------|
//! | `echo`    | replies `200` with the payload                               |
//! | `name`    | replies `200` with the service name                          |
//! | `version` | replies `200` with the protocol version                      |
//! | `env`     | replies `200` with the variable named by the payload         |
//! | `silent`  | returns without replying                                     |
//! | `twice`   | replies twice; the second reply wins                         |
//! | `fail`    | replies `422` with the payload, then reports a failure       |
//! | `reject`  | replies `500` with no payload and fails with `bad input`     |
//! | `panic`   | panics with `fixture panic: <payload>`                       |
//! | `sleep`   | sleeps for the payload in milliseconds, then replies `200`   |
//! | `exit`    | terminates the process with the payload as exit code         |

use std::ffi::OsString;
use std::thread;
use std::time::Duration;

use clap::Parser;
use thiserror::Error;
use tracing::info;

use hive_plugins::handshake::{DEFAULT_MAGIC_KEY, DEFAULT_MAGIC_VALUE, DEFAULT_PROTOCOL_VERSION};
use hive_plugins::telemetry::{self, TelemetryConfig, TelemetryError};
use hive_plugins::{Context, HandshakeConfig, Handler, HiveError};

use crate::FIXTURE_SERVICE;

const FIXTURE_TARGET: &str = "hive_e2e::fixture";

/// Exit code used by `exit` when the payload is not a number.
pub const DEFAULT_EXIT_CODE: i32 = 3;

/// Command-line arguments accepted by the fixture plugin.
#[derive(Parser, Debug, Clone, PartialEq, Eq)]
#[command(name = "hive-fixture-plugin")]
pub struct FixtureArgs {
    /// Service name to serve under.
    #[arg(long, default_value = FIXTURE_SERVICE)]
    pub service: String,
    /// Environment variable carrying the magic cookie.
    #[arg(long, default_value = DEFAULT_MAGIC_KEY)]
    pub magic_key: String,
    /// Expected magic cookie value.
    #[arg(long, default_value = DEFAULT_MAGIC_VALUE)]
    pub magic_value: String,
    /// Application protocol version to advertise.
    #[arg(long, default_value_t = DEFAULT_PROTOCOL_VERSION)]
    pub protocol_version: u32,
    /// Delay before serving, in milliseconds.
    #[arg(long, value_name = "MILLIS", default_value_t = 0)]
    pub handshake_delay_ms: u64,
    /// Exit with this code instead of serving.
    #[arg(long, value_name = "CODE")]
    pub exit_before_handshake: Option<i32>,
}

impl FixtureArgs {
    /// Returns the handshake record the fixture serves with.
    #[must_use]
    pub fn handshake(&self) -> HandshakeConfig {
        HandshakeConfig::new(
            self.magic_key.as_str(),
            self.magic_value.as_str(),
            self.protocol_version,
        )
    }
}

/// Handler implementing the fixture operations.
#[derive(Debug, Clone)]
pub struct FixtureHandler {
    service: String,
    protocol_version: u32,
}

impl FixtureHandler {
    /// Creates a handler reporting `service` and `protocol_version`.
    #[must_use]
    pub fn new(service: impl Into<String>, protocol_version: u32) -> Self {
        Self {
            service: service.into(),
            protocol_version,
        }
    }
}

impl Handler for FixtureHandler {
    fn on(&self, ctx: &mut Context) {
        let data = String::from_utf8_lossy(ctx.data()).into_owned();
        match ctx.name() {
            "echo" => {
                let payload = ctx.data().to_vec();
                ctx.reply(200, payload);
            }
            "name" => ctx.reply(200, self.service.as_str()),
            "version" => ctx.reply(200, self.protocol_version.to_string()),
            "env" => {
                let value = std::env::var(data.trim()).unwrap_or_default();
                ctx.reply(200, value);
            }
            "silent" => {}
            "twice" => {
                ctx.reply(200, "first");
                ctx.reply(201, "second");
            }
            "fail" => {
                ctx.reply(422, data);
                ctx.fail("fixture failure");
            }
            "reject" => {
                ctx.reply(500, Vec::new());
                ctx.fail("bad input");
            }
            "panic" => fixture_panic(&data),
            "sleep" => {
                let millis = data.trim().parse().unwrap_or(0);
                thread::sleep(Duration::from_millis(millis));
                ctx.reply(200, "awake");
            }
            "exit" => {
                let code = data.trim().parse().unwrap_or(DEFAULT_EXIT_CODE);
                info!(target: FIXTURE_TARGET, code, "exiting on request");
                std::process::exit(code);
            }
            other => {
                let message = format!("unknown operation '{other}'");
                ctx.fail(message);
            }
        }
    }
}

fn fixture_panic(data: &str) {
    panic!("fixture panic: {data}");
}

/// Errors that stop the fixture plugin.
#[derive(Debug, Error)]
pub enum FixtureError {
    /// The arguments could not be parsed.
    #[error(transparent)]
    Usage(#[from] clap::Error),
    /// Logging could not be configured.
    #[error(transparent)]
    Telemetry(#[from] TelemetryError),
    /// The plugin runtime refused to serve.
    #[error(transparent)]
    Serve(#[from] HiveError),
}

/// Parses `args` and serves the fixture plugin.
///
/// # Errors
///
/// Returns [`FixtureError`] when the arguments are invalid, logging cannot be
/// configured or serving fails.
pub fn run<I>(args: I) -> Result<(), FixtureError>
where
    I: IntoIterator<Item = OsString>,
{
    let args = FixtureArgs::try_parse_from(args)?;
    telemetry::initialise(&TelemetryConfig::from_env()?)?;

    if let Some(code) = args.exit_before_handshake {
        std::process::exit(code);
    }
    if args.handshake_delay_ms > 0 {
        thread::sleep(Duration::from_millis(args.handshake_delay_ms));
    }

    let handler = FixtureHandler::new(args.service.as_str(), args.protocol_version);
    hive_plugins::serve(handler, &args.service, Some(args.handshake()))?;
    Ok(())
}
