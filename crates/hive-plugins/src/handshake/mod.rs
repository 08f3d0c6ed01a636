//! Handshake protocol performed before any call envelope is exchanged.
//!
//! The host launches the plugin with the magic cookie in its environment
//! (`<magic_key>=<magic_value>`). A plugin that finds the cookie binds its
//! transport and writes a single line to standard output:
//!
//! ```text
//! CORE|APP|NETWORK|ADDRESS|CODEC|MAGIC_KEY=MAGIC_VALUE
//! ```
//!
//! The host parses the line into a [`HandshakeLine`] and verifies it against
//! its own [`HandshakeConfig`] before connecting to the advertised endpoint.
//! The final field is split on the first `=`, so magic values may contain
//! `=` or `|`.

use std::fmt;
use std::str::FromStr;
use std::sync::Arc;

use thiserror::Error;

use crate::error::HiveError;
use crate::transport::{Endpoint, Network};

/// Version of the line format and envelope framing shared by all plugins.
pub const CORE_PROTOCOL_VERSION: u32 = 1;

/// Name of the envelope codec advertised in the handshake line.
pub const ENVELOPE_CODEC: &str = "cbor";

/// Magic cookie key used when the caller supplies no configuration.
pub const DEFAULT_MAGIC_KEY: &str = "HivePluginMagicKey";

/// Magic cookie value used when the caller supplies no configuration.
pub const DEFAULT_MAGIC_VALUE: &str = "HivePluginMagicValue";

/// Application protocol version used when the caller supplies none.
pub const DEFAULT_PROTOCOL_VERSION: u32 = 1;

const FIELD_COUNT: usize = 6;

/// Shared secret and protocol version both sides are configured with.
///
/// The values are verified, never negotiated: a plugin and its host must be
/// built or configured with matching records.
///
/// # Example
///
/// ```
/// use hive_plugins::HandshakeConfig;
///
/// let config = HandshakeConfig::default();
/// assert_eq!(config.magic_key(), "HivePluginMagicKey");
/// assert_eq!(config.protocol_version(), 1);
/// assert!(config.validate().is_ok());
/// ```
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct HandshakeConfig {
    magic_key: String,
    magic_value: String,
    protocol_version: u32,
}

impl Default for HandshakeConfig {
    fn default() -> Self {
        Self::new(
            DEFAULT_MAGIC_KEY,
            DEFAULT_MAGIC_VALUE,
            DEFAULT_PROTOCOL_VERSION,
        )
    }
}

impl HandshakeConfig {
    /// Creates a handshake record.
    #[must_use]
    pub fn new(
        magic_key: impl Into<String>,
        magic_value: impl Into<String>,
        protocol_version: u32,
    ) -> Self {
        Self {
            magic_key: magic_key.into(),
            magic_value: magic_value.into(),
            protocol_version,
        }
    }

    /// Returns the environment variable name carrying the cookie.
    #[must_use]
    pub const fn magic_key(&self) -> &str {
        self.magic_key.as_str()
    }

    /// Returns the expected cookie value.
    #[must_use]
    pub const fn magic_value(&self) -> &str {
        self.magic_value.as_str()
    }

    /// Returns the application protocol version.
    #[must_use]
    pub const fn protocol_version(&self) -> u32 {
        self.protocol_version
    }

    /// Checks that the record can be carried in an environment variable and
    /// a handshake line.
    ///
    /// # Errors
    ///
    /// Returns [`HiveError::InvalidConfig`] when the key is empty or contains
    /// `=`, `|` or NUL, or when the value contains NUL or a line break or
    /// starts or ends with whitespace.
    pub fn validate(&self) -> Result<(), HiveError> {
        if self.magic_key.is_empty() {
            return Err(invalid("magic key must not be empty"));
        }
        if self.magic_key.contains(['=', '|', '\0']) {
            return Err(invalid("magic key must not contain '=', '|' or NUL"));
        }
        if self.magic_value.contains(['\0', '\n', '\r']) {
            return Err(invalid("magic value must not contain NUL or line breaks"));
        }
        if self.magic_value.trim() != self.magic_value {
            return Err(invalid("magic value must not start or end with whitespace"));
        }
        Ok(())
    }

    /// Returns whether `found`, the value of the cookie variable in the
    /// plugin's environment, matches this record.
    #[must_use]
    pub fn cookie_matches(&self, found: Option<&str>) -> bool {
        found == Some(self.magic_value.as_str())
    }
}

fn invalid(message: &str) -> HiveError {
    HiveError::InvalidConfig {
        message: message.to_owned(),
    }
}

/// Errors raised while performing or verifying the handshake.
#[derive(Debug, Error)]
pub enum HandshakeError {
    /// The handshake line did not follow the expected format.
    #[error("malformed handshake line '{line}': {reason}")]
    Malformed {
        /// The offending line, trimmed.
        line: String,
        /// What was wrong with it.
        reason: String,
    },

    /// The plugin echoed a different magic cookie.
    #[error("magic cookie mismatch for key '{key}'")]
    MagicMismatch {
        /// Key the host expected.
        key: String,
    },

    /// The plugin speaks a different core protocol.
    #[error("unsupported core protocol version {found} (expected {expected})")]
    UnsupportedCoreVersion {
        /// Version advertised by the plugin.
        found: u32,
        /// Version this host implements.
        expected: u32,
    },

    /// The plugin's application protocol version is not supported.
    #[error("unsupported plugin protocol version {found} (supported: {supported:?})")]
    UnsupportedVersion {
        /// Version advertised by the plugin.
        found: u32,
        /// Versions the host accepts.
        supported: Vec<u32>,
    },

    /// The plugin uses an envelope codec the host does not understand.
    #[error("unsupported envelope codec '{found}' (expected '{ENVELOPE_CODEC}')")]
    UnsupportedProtocol {
        /// Codec advertised by the plugin.
        found: String,
    },

    /// No handshake line arrived in time.
    #[error("timed out after {timeout_ms} ms waiting for the handshake line")]
    Timeout {
        /// Configured timeout in milliseconds.
        timeout_ms: u64,
    },

    /// The plugin exited before writing a handshake line.
    #[error("plugin exited before completing the handshake (status: {status:?})")]
    ExitedEarly {
        /// Exit code, when the process exited normally.
        status: Option<i32>,
    },

    /// Reading the plugin's standard output failed.
    #[error("failed to read the handshake line: {source}")]
    Read {
        /// Underlying I/O error.
        #[source]
        source: Arc<std::io::Error>,
    },
}

/// Parsed handshake line written by a plugin on startup.
///
/// # Example
///
/// ```
/// use hive_plugins::{HandshakeConfig, HandshakeLine};
///
/// let line: HandshakeLine = "1|1|tcp|127.0.0.1:4000|cbor|HivePluginMagicKey=HivePluginMagicValue"
///     .parse()
///     .unwrap();
/// assert!(line.verify(&HandshakeConfig::default(), &[1]).is_ok());
/// assert_eq!(line.endpoint().to_string(), "tcp://127.0.0.1:4000");
/// ```
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct HandshakeLine {
    core_version: u32,
    app_version: u32,
    endpoint: Endpoint,
    codec: String,
    magic_key: String,
    magic_value: String,
}

impl HandshakeLine {
    /// Builds the line a plugin advertises for `endpoint`.
    #[must_use]
    pub fn new(config: &HandshakeConfig, endpoint: Endpoint) -> Self {
        Self {
            core_version: CORE_PROTOCOL_VERSION,
            app_version: config.protocol_version(),
            endpoint,
            codec: ENVELOPE_CODEC.to_owned(),
            magic_key: config.magic_key().to_owned(),
            magic_value: config.magic_value().to_owned(),
        }
    }

    /// Returns the core protocol version.
    #[must_use]
    pub const fn core_version(&self) -> u32 {
        self.core_version
    }

    /// Returns the application protocol version.
    #[must_use]
    pub const fn app_version(&self) -> u32 {
        self.app_version
    }

    /// Returns the endpoint the plugin is listening on.
    #[must_use]
    pub const fn endpoint(&self) -> &Endpoint {
        &self.endpoint
    }

    /// Returns the advertised envelope codec.
    #[must_use]
    pub const fn codec(&self) -> &str {
        self.codec.as_str()
    }

    /// Verifies the line against the host's record.
    ///
    /// Checks run in order: core version, application version, codec, magic
    /// cookie.
    ///
    /// # Errors
    ///
    /// Returns the first [`HandshakeError`] that applies.
    pub fn verify(
        &self,
        config: &HandshakeConfig,
        supported_versions: &[u32],
    ) -> Result<(), HandshakeError> {
        if self.core_version != CORE_PROTOCOL_VERSION {
            return Err(HandshakeError::UnsupportedCoreVersion {
                found: self.core_version,
                expected: CORE_PROTOCOL_VERSION,
            });
        }
        if !supported_versions.contains(&self.app_version) {
            return Err(HandshakeError::UnsupportedVersion {
                found: self.app_version,
                supported: supported_versions.to_vec(),
            });
        }
        if self.codec != ENVELOPE_CODEC {
            return Err(HandshakeError::UnsupportedProtocol {
                found: self.codec.clone(),
            });
        }
        if self.magic_key != config.magic_key() || self.magic_value != config.magic_value() {
            return Err(HandshakeError::MagicMismatch {
                key: config.magic_key().to_owned(),
            });
        }
        Ok(())
    }
}

impl fmt::Display for HandshakeLine {
    fn fmt(&self, formatter: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(
            formatter,
            "{}|{}|{}|{}|{}|{}={}",
            self.core_version,
            self.app_version,
            self.endpoint.network(),
            self.endpoint.address(),
            self.codec,
            self.magic_key,
            self.magic_value,
        )
    }
}

impl FromStr for HandshakeLine {
    type Err = HandshakeError;

    fn from_str(input: &str) -> Result<Self, Self::Err> {
        let line = input.trim_end_matches(['\r', '\n']);
        let malformed = |reason: String| HandshakeError::Malformed {
            line: line.to_owned(),
            reason,
        };

        let fields: Vec<&str> = line.splitn(FIELD_COUNT, '|').collect();
        let [core, app, network, address, codec, cookie] = fields.as_slice() else {
            return Err(malformed(format!(
                "expected {FIELD_COUNT} '|'-separated fields, found {}",
                fields.len()
            )));
        };

        let parse_version = |field: &str, label: &str| {
            field
                .parse::<u32>()
                .map_err(|err| malformed(format!("invalid {label} version '{field}': {err}")))
        };
        let core_version = parse_version(core, "core")?;
        let app_version = parse_version(app, "application")?;

        let network = network
            .parse::<Network>()
            .map_err(|_| malformed(format!("unknown network '{network}'")))?;
        let endpoint = Endpoint::from_parts(network, address)
            .map_err(|err| malformed(format!("invalid address: {err}")))?;

        let Some((magic_key, magic_value)) = cookie.split_once('=') else {
            return Err(malformed(String::from(
                "magic cookie field must be KEY=VALUE",
            )));
        };

        Ok(Self {
            core_version,
            app_version,
            endpoint,
            codec: (*codec).to_owned(),
            magic_key: magic_key.to_owned(),
            magic_value: magic_value.to_owned(),
        })
    }
}

#[cfg(test)]
mod tests;
