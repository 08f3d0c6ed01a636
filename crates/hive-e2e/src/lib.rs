//! End-to-end integration tests for hive hosts and plugins.
//!
//! This crate builds two plugin binaries used by its integration tests:
//!
//! - `hive-fixture-plugin`: a configurable plugin whose operations exercise
//!   every path through the dispatch server (see [`fixture`]).
//! - `hive-e2e-lobby`: the lobby plugin, rebuilt here so tests can locate it
//!   through `CARGO_BIN_EXE_*`.
//!
//! The tests under `tests/` launch these binaries through
//! [`hive_plugins::PluginHandle`] and the `hive` CLI, covering handshake
//! failures, the handler fault boundary, both transports and process death.

pub mod fixture;

use std::time::Duration;

use hive_plugins::{HandshakeConfig, Network, PluginOptions};

/// Service name the fixture plugin serves under unless told otherwise.
pub const FIXTURE_SERVICE: &str = "fixture";

/// Launch options for the fixture plugin with a short handshake timeout.
#[must_use]
pub fn fixture_options(network: Network) -> PluginOptions {
    PluginOptions::default()
        .with_handshake(HandshakeConfig::default())
        .with_handshake_timeout(Duration::from_secs(10))
        .with_call_timeout(Duration::from_secs(10))
        .with_network(network)
}

/// Networks supported on this platform.
#[must_use]
pub fn networks() -> Vec<Network> {
    if cfg!(unix) {
        vec![Network::Unix, Network::Tcp]
    } else {
        vec![Network::Tcp]
    }
}
