//! Connected streams and the plugin-side listener.

use std::io::{self, Read, Write};
use std::net::{Shutdown, TcpListener, TcpStream};
use std::time::Duration;

use tempfile::TempDir;
use tracing::debug;

#[cfg(unix)]
use camino::Utf8PathBuf;
#[cfg(unix)]
use std::os::unix::net::{UnixListener, UnixStream};

use super::{Endpoint, Network, TRANSPORT_TARGET};

const SOCKET_FILE: &str = "plugin.sock";
const SOCKET_DIR_PREFIX: &str = "hive-plugin-";

/// Connected byte stream between host and plugin.
#[derive(Debug)]
pub enum Stream {
    /// TCP connection.
    Tcp(TcpStream),
    /// Unix domain socket connection.
    #[cfg(unix)]
    Unix(UnixStream),
}

impl Stream {
    /// Connects to `endpoint`, giving up after `timeout`.
    ///
    /// The timeout bounds the TCP connect; Unix socket connects complete or
    /// fail immediately.
    ///
    /// # Errors
    ///
    /// Returns the underlying I/O error, or [`io::ErrorKind::Unsupported`]
    /// for Unix endpoints on platforms without Unix sockets.
    pub fn connect(endpoint: &Endpoint, timeout: Duration) -> io::Result<Self> {
        debug!(target: TRANSPORT_TARGET, %endpoint, "connecting to plugin endpoint");
        match endpoint {
            Endpoint::Tcp { addr } => {
                let stream = TcpStream::connect_timeout(addr, timeout)?;
                stream.set_nodelay(true)?;
                Ok(Self::Tcp(stream))
            }
            #[cfg(unix)]
            Endpoint::Unix { path } => UnixStream::connect(path.as_std_path()).map(Self::Unix),
            #[cfg(not(unix))]
            Endpoint::Unix { .. } => Err(io::Error::new(
                io::ErrorKind::Unsupported,
                "unix sockets are not available on this platform",
            )),
        }
    }

    /// Sets the read timeout; `None` blocks indefinitely.
    ///
    /// # Errors
    ///
    /// Returns the underlying I/O error.
    pub fn set_read_timeout(&self, timeout: Option<Duration>) -> io::Result<()> {
        match self {
            Self::Tcp(stream) => stream.set_read_timeout(timeout),
            #[cfg(unix)]
            Self::Unix(stream) => stream.set_read_timeout(timeout),
        }
    }

    /// Sets the write timeout; `None` blocks indefinitely.
    ///
    /// # Errors
    ///
    /// Returns the underlying I/O error.
    pub fn set_write_timeout(&self, timeout: Option<Duration>) -> io::Result<()> {
        match self {
            Self::Tcp(stream) => stream.set_write_timeout(timeout),
            #[cfg(unix)]
            Self::Unix(stream) => stream.set_write_timeout(timeout),
        }
    }

    /// Shuts down both halves of the connection.
    ///
    /// # Errors
    ///
    /// Returns the underlying I/O error.
    pub fn shutdown(&self) -> io::Result<()> {
        match self {
            Self::Tcp(stream) => stream.shutdown(Shutdown::Both),
            #[cfg(unix)]
            Self::Unix(stream) => stream.shutdown(Shutdown::Both),
        }
    }
}

impl Read for Stream {
    fn read(&mut self, buf: &mut [u8]) -> io::Result<usize> {
        match self {
            Self::Tcp(stream) => stream.read(buf),
            #[cfg(unix)]
            Self::Unix(stream) => stream.read(buf),
        }
    }
}

impl Write for Stream {
    fn write(&mut self, buf: &[u8]) -> io::Result<usize> {
        match self {
            Self::Tcp(stream) => stream.write(buf),
            #[cfg(unix)]
            Self::Unix(stream) => stream.write(buf),
        }
    }

    fn flush(&mut self) -> io::Result<()> {
        match self {
            Self::Tcp(stream) => stream.flush(),
            #[cfg(unix)]
            Self::Unix(stream) => stream.flush(),
        }
    }
}

/// Listening socket owned by a plugin process.
///
/// Unix listeners live in a private temporary directory that is removed,
/// together with the socket file, when the listener is dropped.
#[derive(Debug)]
pub struct Listener {
    kind: ListenerKind,
    endpoint: Endpoint,
    _socket_dir: Option<TempDir>,
}

#[derive(Debug)]
enum ListenerKind {
    Tcp(TcpListener),
    #[cfg(unix)]
    Unix(UnixListener),
}

impl Listener {
    /// Binds a fresh listener on `network`.
    ///
    /// TCP listeners bind `127.0.0.1` on an ephemeral port.
    ///
    /// # Errors
    ///
    /// Returns the underlying I/O error, or [`io::ErrorKind::Unsupported`]
    /// when Unix sockets are requested on a platform without them.
    pub fn bind(network: Network) -> io::Result<Self> {
        match network {
            Network::Tcp => {
                let listener = TcpListener::bind(("127.0.0.1", 0))?;
                let endpoint = Endpoint::tcp(listener.local_addr()?);
                Ok(Self {
                    kind: ListenerKind::Tcp(listener),
                    endpoint,
                    _socket_dir: None,
                })
            }
            Network::Unix => bind_unix(),
        }
    }

    /// Returns the endpoint clients should connect to.
    #[must_use]
    pub const fn endpoint(&self) -> &Endpoint {
        &self.endpoint
    }

    /// Blocks until a client connects.
    ///
    /// # Errors
    ///
    /// Returns the underlying I/O error.
    pub fn accept(&self) -> io::Result<Stream> {
        match &self.kind {
            ListenerKind::Tcp(listener) => {
                let (stream, _) = listener.accept()?;
                stream.set_nodelay(true)?;
                Ok(Stream::Tcp(stream))
            }
            #[cfg(unix)]
            ListenerKind::Unix(listener) => {
                let (stream, _) = listener.accept()?;
                Ok(Stream::Unix(stream))
            }
        }
    }
}

#[cfg(unix)]
fn bind_unix() -> io::Result<Listener> {
    let socket_dir = tempfile::Builder::new()
        .prefix(SOCKET_DIR_PREFIX)
        .tempdir()?;
    let path = Utf8PathBuf::from_path_buf(socket_dir.path().join(SOCKET_FILE))
        .map_err(|path| io::Error::other(format!("non UTF-8 socket path {}", path.display())))?;
    let listener = UnixListener::bind(path.as_std_path())?;
    Ok(Listener {
        kind: ListenerKind::Unix(listener),
        endpoint: Endpoint::unix(path),
        _socket_dir: Some(socket_dir),
    })
}

#[cfg(not(unix))]
fn bind_unix() -> io::Result<Listener> {
    let _ = (SOCKET_DIR_PREFIX, SOCKET_FILE);
    Err(io::Error::new(
        io::ErrorKind::Unsupported,
        "unix sockets are not available on this platform",
    ))
}
