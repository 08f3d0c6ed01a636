//! The lobby plugin.
//!
//! Lobby is the reference hive plugin. Every operation it receives is
//! answered with status `200` and the payload echoed back inside
//! `response[...]`, which makes it a convenient target for checking that a
//! host can launch, call and close a plugin.

use thiserror::Error;
use tracing::info;

use hive_plugins::telemetry::{self, TelemetryConfig, TelemetryError};
use hive_plugins::{Context, Handler, HiveError};

/// Name the lobby plugin serves under.
pub const PLUGIN_NAME: &str = "lobby";

/// Status attached to every lobby reply.
pub const LOBBY_STATUS: i32 = 200;

const LOBBY_TARGET: &str = "hive_lobby";

/// Handler answering every operation with `response[<payload>]`.
#[derive(Debug, Default, Clone, Copy)]
pub struct Lobby;

impl Handler for Lobby {
    fn on(&self, ctx: &mut Context) {
        let data = String::from_utf8_lossy(ctx.data()).into_owned();
        info!(
            target: LOBBY_TARGET,
            operation = ctx.name(),
            data = %data,
            "lobby received call"
        );
        ctx.reply(LOBBY_STATUS, format!("response[{data}]"));
    }
}

/// Errors that stop the lobby plugin from serving.
#[derive(Debug, Error)]
pub enum LobbyError {
    /// Logging could not be configured.
    #[error(transparent)]
    Telemetry(#[from] TelemetryError),
    /// The plugin runtime refused to serve.
    #[error(transparent)]
    Serve(#[from] HiveError),
}

/// Configures logging and serves [`Lobby`] until the host goes away.
///
/// # Errors
///
/// Returns [`LobbyError::Serve`] when the binary was not launched by a hive
/// host or the transport cannot be set up, and [`LobbyError::Telemetry`]
/// when the logging environment is invalid.
pub fn run() -> Result<(), LobbyError> {
    let config = TelemetryConfig::from_env()?;
    telemetry::initialise(&config)?;
    hive_plugins::serve(Lobby, PLUGIN_NAME, None)?;
    Ok(())
}
