//! Host-side launch options.

use std::ffi::OsString;
use std::time::Duration;

use crate::handshake::HandshakeConfig;
use crate::transport::Network;

/// Default bound on the wait for the handshake line.
pub const DEFAULT_HANDSHAKE_TIMEOUT: Duration = Duration::from_secs(10);

/// Default bound on connecting to the advertised endpoint.
pub const DEFAULT_CONNECT_TIMEOUT: Duration = Duration::from_secs(5);

/// Options controlling how a plugin is launched and called.
///
/// # Example
///
/// ```
/// use std::time::Duration;
/// use hive_plugins::{HandshakeConfig, Network, PluginOptions};
///
/// let options = PluginOptions::default()
///     .with_handshake(HandshakeConfig::new("LOBBY_KEY", "lobby", 2))
///     .with_supported_versions(vec![1, 2])
///     .with_handshake_timeout(Duration::from_secs(3))
///     .with_network(Network::Tcp)
///     .arg("--verbose");
/// assert_eq!(options.supported_versions(), vec![1, 2]);
/// ```
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct PluginOptions {
    handshake: HandshakeConfig,
    supported_versions: Option<Vec<u32>>,
    handshake_timeout: Duration,
    connect_timeout: Duration,
    call_timeout: Option<Duration>,
    network: Network,
    args: Vec<OsString>,
    envs: Vec<(OsString, OsString)>,
}

impl Default for PluginOptions {
    fn default() -> Self {
        Self {
            handshake: HandshakeConfig::default(),
            supported_versions: None,
            handshake_timeout: DEFAULT_HANDSHAKE_TIMEOUT,
            connect_timeout: DEFAULT_CONNECT_TIMEOUT,
            call_timeout: None,
            network: Network::default(),
            args: Vec::new(),
            envs: Vec::new(),
        }
    }
}

impl PluginOptions {
    /// Replaces the handshake record.
    #[must_use]
    pub fn with_handshake(mut self, handshake: HandshakeConfig) -> Self {
        self.handshake = handshake;
        self
    }

    /// Sets the application protocol versions the host accepts.
    ///
    /// Defaults to the handshake record's version alone.
    #[must_use]
    pub fn with_supported_versions(mut self, versions: Vec<u32>) -> Self {
        self.supported_versions = Some(versions);
        self
    }

    /// Bounds the wait for the handshake line.
    #[must_use]
    pub const fn with_handshake_timeout(mut self, timeout: Duration) -> Self {
        self.handshake_timeout = timeout;
        self
    }

    /// Bounds connection establishment.
    #[must_use]
    pub const fn with_connect_timeout(mut self, timeout: Duration) -> Self {
        self.connect_timeout = timeout;
        self
    }

    /// Bounds each read and write of a call; unbounded by default.
    #[must_use]
    pub const fn with_call_timeout(mut self, timeout: Duration) -> Self {
        self.call_timeout = Some(timeout);
        self
    }

    /// Asks the plugin to listen on `network`.
    #[must_use]
    pub const fn with_network(mut self, network: Network) -> Self {
        self.network = network;
        self
    }

    /// Appends a command-line argument for the plugin executable.
    #[must_use]
    pub fn arg(mut self, arg: impl Into<OsString>) -> Self {
        self.args.push(arg.into());
        self
    }

    /// Adds an environment variable for the plugin process.
    #[must_use]
    pub fn env(mut self, key: impl Into<OsString>, value: impl Into<OsString>) -> Self {
        self.envs.push((key.into(), value.into()));
        self
    }

    /// Returns the handshake record.
    #[must_use]
    pub const fn handshake(&self) -> &HandshakeConfig {
        &self.handshake
    }

    /// Returns the accepted application protocol versions.
    #[must_use]
    pub fn supported_versions(&self) -> Vec<u32> {
        self.supported_versions
            .clone()
            .unwrap_or_else(|| vec![self.handshake.protocol_version()])
    }

    /// Returns the handshake timeout.
    #[must_use]
    pub const fn handshake_timeout(&self) -> Duration {
        self.handshake_timeout
    }

    /// Returns the connect timeout.
    #[must_use]
    pub const fn connect_timeout(&self) -> Duration {
        self.connect_timeout
    }

    /// Returns the per-call I/O timeout, if any.
    #[must_use]
    pub const fn call_timeout(&self) -> Option<Duration> {
        self.call_timeout
    }

    /// Returns the requested network.
    #[must_use]
    pub const fn network(&self) -> Network {
        self.network
    }

    /// Returns the extra command-line arguments.
    #[must_use]
    pub fn args(&self) -> &[OsString] {
        &self.args
    }

    /// Returns the extra environment variables.
    #[must_use]
    pub fn envs(&self) -> &[(OsString, OsString)] {
        &self.envs
    }
}
