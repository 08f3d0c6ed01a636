//! Out-of-process plugin host and plugin runtime for Hive.
//!
//! The `hive-plugins` crate lets a host process launch independently built
//! plugin executables and invoke named operations on them as if they were
//! local calls. Each plugin runs as its own operating-system process; the two
//! sides agree on a magic cookie and protocol version during a one-line
//! handshake on the plugin's standard output, then exchange CBOR-encoded
//! [`CallRequest`]/[`CallResponse`] envelopes over a private Unix socket or
//! loopback TCP connection.
//!
//! # Architecture
//!
//! - **Host side**: [`PluginHandle`] spawns the plugin, drives the handshake,
//!   lazily connects to the advertised endpoint and exposes
//!   [`PluginHandle::invoke`] and [`PluginHandle::close`].
//! - **Plugin side**: [`serve`] verifies the cookie, binds the transport,
//!   prints the handshake line and dispatches every request to a
//!   [`Handler`]. Handler panics are caught at the dispatch boundary and
//!   returned to the host as ordinary application errors.
//!
//! # Example
//!
//! ```rust,no_run
//! use hive_plugins::{Context, PluginHandle};
//!
//! // Host side.
//! let mut lobby = PluginHandle::start("lobby", "plugins/lobby/hive-lobby", None)?;
//! let reply = lobby.invoke("hello", b"world")?;
//! assert_eq!(reply.status(), 200);
//! lobby.close();
//!
//! // Plugin side, inside the plugin binary's `main`.
//! hive_plugins::serve(
//!     |ctx: &mut Context| {
//!         let payload = ctx.data().to_vec();
//!         ctx.reply(200, payload);
//!     },
//!     "lobby",
//!     None,
//! )?;
//! # Ok::<(), hive_plugins::HiveError>(())
//! ```

pub mod error;
pub mod handler;
pub mod handshake;
pub mod protocol;
pub mod server;
pub mod supervisor;
pub mod telemetry;
pub mod transport;

#[cfg(test)]
mod tests;

pub use self::error::{ErrorKind, HiveError};
pub use self::handler::{Context, Handler};
pub use self::handshake::{HandshakeConfig, HandshakeError, HandshakeLine};
pub use self::protocol::{CallRequest, CallResponse};
pub use self::server::{ServeConfig, Server, dispatch, serve};
pub use self::supervisor::{PluginHandle, PluginOptions, PluginState, Reply, start_plugin};
pub use self::telemetry::{LogFormat, TelemetryConfig};
pub use self::transport::{Endpoint, Network};
