//! CLI argument definitions for the hive host.

use std::path::PathBuf;
use std::time::Duration;

use clap::Parser;
use hive_plugins::handshake::{DEFAULT_MAGIC_KEY, DEFAULT_MAGIC_VALUE, DEFAULT_PROTOCOL_VERSION};
use hive_plugins::telemetry::TelemetryConfig;
use hive_plugins::{HandshakeConfig, LogFormat, Network, PluginOptions};

/// Plugin executable launched when `--plugin` is not given.
pub(crate) const DEFAULT_PLUGIN_PATH: &str = "plugins/lobby/hive-lobby";

/// Command-line interface for the hive plugin host.
#[derive(Parser, Debug)]
#[command(
    name = "hive",
    about = "Launches a hive plugin, invokes one operation and prints the reply"
)]
pub(crate) struct Cli {
    /// Path to the plugin executable.
    #[arg(long, value_name = "PATH", default_value = DEFAULT_PLUGIN_PATH)]
    pub(crate) plugin: PathBuf,
    /// Name the plugin serves under.
    #[arg(long, default_value = "lobby")]
    pub(crate) name: String,
    /// Operation to invoke.
    #[arg(long, default_value = "hello")]
    pub(crate) operation: String,
    /// Payload sent with the call, as UTF-8 text.
    #[arg(long, default_value = "world")]
    pub(crate) payload: String,
    /// Environment variable carrying the magic cookie.
    #[arg(long, default_value = DEFAULT_MAGIC_KEY)]
    pub(crate) magic_key: String,
    /// Magic cookie value.
    #[arg(long, default_value = DEFAULT_MAGIC_VALUE)]
    pub(crate) magic_value: String,
    /// Application protocol version the host speaks.
    #[arg(long, default_value_t = DEFAULT_PROTOCOL_VERSION)]
    pub(crate) protocol_version: u32,
    /// Socket family the plugin should listen on (`unix` or `tcp`).
    #[arg(long)]
    pub(crate) network: Option<Network>,
    /// Upper bound on the handshake wait, in milliseconds.
    #[arg(long, value_name = "MILLIS")]
    pub(crate) handshake_timeout_ms: Option<u64>,
    /// Log filter expression, for example `hive_plugins=debug`.
    #[arg(long)]
    pub(crate) log_filter: Option<String>,
    /// Log output format (`json` or `compact`).
    #[arg(long)]
    pub(crate) log_format: Option<LogFormat>,
}

impl Cli {
    /// Builds launch options from the parsed flags.
    pub(crate) fn plugin_options(&self) -> PluginOptions {
        let handshake = HandshakeConfig::new(
            self.magic_key.as_str(),
            self.magic_value.as_str(),
            self.protocol_version,
        );
        let mut options = PluginOptions::default().with_handshake(handshake);
        if let Some(network) = self.network {
            options = options.with_network(network);
        }
        if let Some(millis) = self.handshake_timeout_ms {
            options = options.with_handshake_timeout(Duration::from_millis(millis));
        }
        options
    }

    /// Layers the logging flags over `base`, which usually comes from the
    /// environment.
    pub(crate) fn telemetry(&self, base: TelemetryConfig) -> TelemetryConfig {
        let mut config = base;
        if let Some(filter) = self.log_filter.as_deref() {
            config = config.with_log_filter(filter);
        }
        if let Some(format) = self.log_format {
            config = config.with_log_format(format);
        }
        config
    }
}
