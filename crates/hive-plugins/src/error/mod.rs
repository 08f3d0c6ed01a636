//! Domain errors raised by plugin hosting and serving.
//!
//! All errors use `thiserror`-derived enums with structured context so callers
//! can inspect the failure programmatically. I/O errors are wrapped in `Arc`
//! to satisfy the `result_large_err` Clippy lint.
//!
//! Every [`HiveError`] belongs to one of four [`ErrorKind`]s: configuration
//! mistakes, handshake failures (fatal to `start`), transport failures (fatal
//! to one `invoke`) and application errors reported by the plugin's handler.

use std::path::PathBuf;
use std::sync::Arc;

use thiserror::Error;

use crate::handshake::HandshakeError;
use crate::protocol::CodecError;

/// Coarse classification of a [`HiveError`].
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ErrorKind {
    /// The caller supplied an unusable configuration.
    Config,
    /// The plugin could not be launched or failed the handshake.
    Handshake,
    /// The connection to the plugin failed or the plugin process died.
    Transport,
    /// The plugin's handler reported a failure or panicked.
    Application,
}

/// Errors arising from plugin operations.
#[derive(Debug, Error)]
pub enum HiveError {
    /// A handshake configuration failed validation.
    #[error("invalid handshake configuration: {message}")]
    InvalidConfig {
        /// Description of the validation failure.
        message: String,
    },

    /// The plugin process could not be spawned.
    #[error("plugin '{name}' failed to start from {}: {source}", path.display())]
    Spawn {
        /// Plugin name.
        name: String,
        /// Executable that was launched.
        path: PathBuf,
        /// Underlying I/O error.
        #[source]
        source: Arc<std::io::Error>,
    },

    /// The plugin did not complete the handshake.
    #[error("plugin '{name}' handshake failed: {source}")]
    Handshake {
        /// Plugin name.
        name: String,
        /// What went wrong.
        #[source]
        source: HandshakeError,
    },

    /// The advertised endpoint refused or timed out the connection.
    #[error("failed to connect to plugin '{name}' at {endpoint}: {source}")]
    Connect {
        /// Plugin name.
        name: String,
        /// Endpoint advertised in the handshake.
        endpoint: String,
        /// Underlying I/O error.
        #[source]
        source: Arc<std::io::Error>,
    },

    /// An I/O error occurred while exchanging a call envelope.
    #[error("transport error communicating with plugin '{name}': {source}")]
    Transport {
        /// Plugin name.
        name: String,
        /// Underlying I/O error.
        #[source]
        source: Arc<std::io::Error>,
    },

    /// A call envelope could not be encoded or decoded.
    #[error("malformed envelope exchanged with plugin '{name}': {source}")]
    Codec {
        /// Plugin name.
        name: String,
        /// Underlying codec error.
        #[source]
        source: CodecError,
    },

    /// The plugin process is no longer running.
    #[error("plugin '{name}' exited (status: {status:?})")]
    ProcessExited {
        /// Plugin name.
        name: String,
        /// Exit code, when the process exited normally.
        status: Option<i32>,
    },

    /// The handle was closed by the host.
    #[error("plugin '{name}' has been closed")]
    Closed {
        /// Plugin name.
        name: String,
    },

    /// The plugin's handler reported an error for this call.
    ///
    /// The status and payload the handler attached before failing are kept
    /// so callers can inspect them.
    #[error("{message}")]
    Application {
        /// Status code set by the handler, zero when it never replied.
        status: i32,
        /// Payload set by the handler, empty when it never replied.
        payload: Vec<u8>,
        /// Error text produced by the plugin.
        message: String,
    },

    /// The plugin binary was executed without the host's magic cookie.
    #[error(
        "this binary is a hive plugin and must be launched by a hive host \
         (environment variable '{key}' missing or mismatched)"
    )]
    NotLaunchedByHost {
        /// Magic cookie key that was checked.
        key: String,
    },

    /// The plugin could not bind its transport listener.
    #[error("failed to bind plugin transport on {endpoint}: {source}")]
    Bind {
        /// Endpoint the listener attempted to bind.
        endpoint: String,
        /// Underlying I/O error.
        #[source]
        source: Arc<std::io::Error>,
    },
}

impl HiveError {
    /// Returns the taxonomy bucket of this error.
    #[must_use]
    pub const fn kind(&self) -> ErrorKind {
        match self {
            Self::InvalidConfig { .. } | Self::NotLaunchedByHost { .. } => ErrorKind::Config,
            Self::Spawn { .. } | Self::Handshake { .. } | Self::Bind { .. } => {
                ErrorKind::Handshake
            }
            Self::Connect { .. }
            | Self::Transport { .. }
            | Self::Codec { .. }
            | Self::ProcessExited { .. }
            | Self::Closed { .. } => ErrorKind::Transport,
            Self::Application { .. } => ErrorKind::Application,
        }
    }

    /// Returns `true` for launch and handshake failures.
    #[must_use]
    pub fn is_handshake(&self) -> bool {
        self.kind() == ErrorKind::Handshake
    }

    /// Returns `true` for connection, codec and process-death failures.
    #[must_use]
    pub fn is_transport(&self) -> bool {
        self.kind() == ErrorKind::Transport
    }

    /// Returns `true` when the plugin's handler reported the failure.
    #[must_use]
    pub fn is_application(&self) -> bool {
        self.kind() == ErrorKind::Application
    }

    pub(crate) fn transport(name: &str, source: std::io::Error) -> Self {
        Self::Transport {
            name: name.to_owned(),
            source: Arc::new(source),
        }
    }

    pub(crate) fn handshake(name: &str, source: HandshakeError) -> Self {
        Self::Handshake {
            name: name.to_owned(),
            source,
        }
    }
}
