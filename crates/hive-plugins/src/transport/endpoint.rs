//! Transport endpoint descriptions.

use std::fmt;
use std::net::SocketAddr;

use camino::Utf8PathBuf;
use strum::{Display, EnumString};
use thiserror::Error;

/// Socket family a plugin listens on.
#[derive(Debug, Clone, Copy, PartialEq, Eq, EnumString, Display)]
#[strum(serialize_all = "snake_case", ascii_case_insensitive)]
pub enum Network {
    /// Unix domain socket in a private temporary directory.
    Unix,
    /// Loopback TCP socket on an ephemeral port.
    Tcp,
}

impl Default for Network {
    fn default() -> Self {
        if cfg!(unix) { Self::Unix } else { Self::Tcp }
    }
}

/// Address a plugin is listening on.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Endpoint {
    /// Unix domain socket endpoint.
    Unix {
        /// Filesystem path of the socket.
        path: Utf8PathBuf,
    },
    /// TCP socket endpoint.
    Tcp {
        /// Socket address to connect to.
        addr: SocketAddr,
    },
}

impl Endpoint {
    /// Builds a Unix domain socket endpoint.
    #[must_use]
    pub fn unix(path: impl Into<Utf8PathBuf>) -> Self {
        Self::Unix { path: path.into() }
    }

    /// Builds a TCP socket endpoint.
    #[must_use]
    pub const fn tcp(addr: SocketAddr) -> Self {
        Self::Tcp { addr }
    }

    /// Parses the network and address fields of a handshake line.
    ///
    /// # Errors
    ///
    /// Returns an error when the address is empty or, for TCP, not a valid
    /// `host:port` socket address.
    pub fn from_parts(network: Network, address: &str) -> Result<Self, EndpointParseError> {
        if address.is_empty() {
            return Err(EndpointParseError::Empty { network });
        }
        match network {
            Network::Unix => Ok(Self::unix(address)),
            Network::Tcp => address
                .parse::<SocketAddr>()
                .map(Self::tcp)
                .map_err(|source| EndpointParseError::InvalidTcp {
                    address: address.to_owned(),
                    source,
                }),
        }
    }

    /// Returns the socket family of the endpoint.
    #[must_use]
    pub const fn network(&self) -> Network {
        match self {
            Self::Unix { .. } => Network::Unix,
            Self::Tcp { .. } => Network::Tcp,
        }
    }

    /// Returns the address as written in the handshake line.
    #[must_use]
    pub fn address(&self) -> String {
        match self {
            Self::Unix { path } => path.to_string(),
            Self::Tcp { addr } => addr.to_string(),
        }
    }
}

impl fmt::Display for Endpoint {
    fn fmt(&self, formatter: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Unix { path } => write!(formatter, "unix://{path}"),
            Self::Tcp { addr } => write!(formatter, "tcp://{addr}"),
        }
    }
}

/// Errors encountered while parsing an [`Endpoint`].
#[derive(Debug, Error)]
pub enum EndpointParseError {
    /// The address field was empty.
    #[error("empty {network} address")]
    Empty {
        /// Network the address was meant for.
        network: Network,
    },
    /// The TCP address did not parse.
    #[error("invalid TCP address '{address}': {source}")]
    InvalidTcp {
        /// Address as received.
        address: String,
        /// Parser error.
        #[source]
        source: std::net::AddrParseError,
    },
}
