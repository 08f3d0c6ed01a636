//! Socket transport between a host and its plugin.
//!
//! Plugins listen on either a Unix domain socket inside a private temporary
//! directory or a loopback TCP port. The handshake line advertises which one
//! was chosen; the host connects to it with [`Stream::connect`].

mod endpoint;
mod stream;

pub use self::endpoint::{Endpoint, EndpointParseError, Network};
pub use self::stream::{Listener, Stream};

/// Tracing target for transport operations.
const TRANSPORT_TARGET: &str = "hive_plugins::transport";
