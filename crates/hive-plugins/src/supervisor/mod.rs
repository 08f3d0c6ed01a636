//! Host-side plugin supervision.
//!
//! A [`PluginHandle`] owns one plugin process. Starting a handle spawns the
//! executable with the magic cookie in its environment, waits (bounded) for
//! the handshake line on the plugin's standard output and verifies it. The
//! connection to the advertised endpoint is opened lazily on the first call
//! and reused afterwards.
//!
//! A handle moves through [`PluginState`]s:
//! `Created -> Handshaking -> Ready <-> Invoking`, ending in `Exited` when
//! the process dies on its own or `Closed` after [`PluginHandle::close`].
//! Calls on one handle are serialized by `&mut self`; independent handles
//! share nothing.

mod options;
mod relay;

use std::io::{self, BufReader};
use std::path::{Path, PathBuf};
use std::process::{Child, ChildStdin, Command, Stdio};
use std::sync::Arc;
use std::sync::mpsc::{Receiver, RecvTimeoutError};
use std::thread;
use std::time::{Duration, Instant};

use tracing::{debug, info, warn};

pub use self::options::{DEFAULT_CONNECT_TIMEOUT, DEFAULT_HANDSHAKE_TIMEOUT, PluginOptions};
use self::relay::FirstLine;
use crate::error::HiveError;
use crate::handshake::{HandshakeConfig, HandshakeError, HandshakeLine};
use crate::protocol::{self, CallRequest, CallResponse, CodecError};
use crate::server::NETWORK_ENV_VAR;
use crate::transport::{Endpoint, Stream};

/// Tracing target for supervisor operations.
const SUPERVISOR_TARGET: &str = "hive_plugins::supervisor";

/// How often a pending handshake re-checks the child for early exit.
const POLL_INTERVAL: Duration = Duration::from_millis(20);

/// How long to wait for a child to be reaped after a failed call.
const EXIT_GRACE: Duration = Duration::from_millis(250);

/// How long to wait for a child that closed stdout before its handshake.
const HANDSHAKE_EXIT_GRACE: Duration = Duration::from_secs(2);

/// Lifecycle state of a [`PluginHandle`].
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum PluginState {
    /// The process has not been spawned yet.
    Created,
    /// The process is running; the handshake line has not been verified.
    Handshaking,
    /// The handshake succeeded and the handle accepts calls.
    Ready,
    /// A call is in flight.
    Invoking,
    /// The process exited without being closed by the host.
    Exited {
        /// Exit code, when the process exited normally.
        status: Option<i32>,
    },
    /// The host closed the handle.
    Closed,
}

/// Successful result of [`PluginHandle::invoke`].
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Reply {
    status: i32,
    payload: Vec<u8>,
}

impl Reply {
    /// Creates a reply from a status code and payload.
    #[must_use]
    pub const fn new(status: i32, payload: Vec<u8>) -> Self {
        Self { status, payload }
    }

    /// Returns the status code set by the handler.
    #[must_use]
    pub const fn status(&self) -> i32 {
        self.status
    }

    /// Returns the payload set by the handler.
    #[must_use]
    pub fn payload(&self) -> &[u8] {
        &self.payload
    }

    /// Consumes the reply, returning the payload.
    #[must_use]
    pub fn into_payload(self) -> Vec<u8> {
        self.payload
    }
}

/// Handle to a running plugin process.
///
/// Dropping the handle closes it.
#[derive(Debug)]
pub struct PluginHandle {
    name: String,
    child: Child,
    stdin: Option<ChildStdin>,
    endpoint: Endpoint,
    protocol_version: u32,
    connect_timeout: Duration,
    call_timeout: Option<Duration>,
    connection: Option<BufReader<Stream>>,
    state: PluginState,
}

/// Launches the plugin `name` from `path`.
///
/// Shorthand for [`PluginHandle::start`].
///
/// # Errors
///
/// See [`PluginHandle::start`].
pub fn start_plugin(
    name: &str,
    path: impl AsRef<Path>,
    handshake: Option<HandshakeConfig>,
) -> Result<PluginHandle, HiveError> {
    PluginHandle::start(name, path, handshake)
}

impl PluginHandle {
    /// Launches the plugin `name` from `path` with default options.
    ///
    /// A missing handshake record falls back to
    /// [`HandshakeConfig::default`].
    ///
    /// # Errors
    ///
    /// Returns [`HiveError::InvalidConfig`] for an unusable handshake
    /// record, [`HiveError::Spawn`] when the executable cannot be started and
    /// [`HiveError::Handshake`] when the plugin exits, times out or prints a
    /// line that does not verify. The process is killed on every failure.
    pub fn start(
        name: &str,
        path: impl AsRef<Path>,
        handshake: Option<HandshakeConfig>,
    ) -> Result<Self, HiveError> {
        let options = PluginOptions::default().with_handshake(handshake.unwrap_or_default());
        Self::start_with(name, path, options)
    }

    /// Launches the plugin `name` from `path` with explicit `options`.
    ///
    /// # Errors
    ///
    /// See [`PluginHandle::start`].
    pub fn start_with(
        name: &str,
        path: impl AsRef<Path>,
        options: PluginOptions,
    ) -> Result<Self, HiveError> {
        options.handshake().validate()?;
        let path = path.as_ref();
        debug!(
            target: SUPERVISOR_TARGET,
            plugin = name,
            path = %path.display(),
            state = ?PluginState::Created,
            "launching plugin"
        );

        let mut child = spawn(name, path, &options)?;
        let Some((stdin, lines)) = take_pipes(name, &mut child) else {
            kill_and_reap(&mut child);
            return Err(HiveError::Spawn {
                name: name.to_owned(),
                path: path.to_path_buf(),
                source: Arc::new(io::Error::other("plugin standard streams were not captured")),
            });
        };
        debug!(
            target: SUPERVISOR_TARGET,
            plugin = name,
            pid = child.id(),
            state = ?PluginState::Handshaking,
            "awaiting handshake"
        );

        let line = match await_handshake(&mut child, &lines, &options) {
            Ok(line) => line,
            Err(source) => {
                warn!(
                    target: SUPERVISOR_TARGET,
                    plugin = name,
                    error = %source,
                    "plugin handshake failed"
                );
                kill_and_reap(&mut child);
                return Err(HiveError::handshake(name, source));
            }
        };

        info!(
            target: SUPERVISOR_TARGET,
            plugin = name,
            pid = child.id(),
            endpoint = %line.endpoint(),
            protocol_version = line.app_version(),
            "plugin ready"
        );
        Ok(Self {
            name: name.to_owned(),
            child,
            stdin: Some(stdin),
            endpoint: line.endpoint().clone(),
            protocol_version: line.app_version(),
            connect_timeout: options.connect_timeout(),
            call_timeout: options.call_timeout(),
            connection: None,
            state: PluginState::Ready,
        })
    }

    /// Calls `operation` on the plugin with `payload`.
    ///
    /// Calls on one handle run one at a time. The connection is established
    /// on first use and dropped after any transport failure, so a later call
    /// reconnects if the plugin is still alive.
    ///
    /// # Errors
    ///
    /// Returns [`HiveError::Application`] when the handler failed or
    /// panicked, [`HiveError::Closed`] after [`close`](Self::close),
    /// [`HiveError::ProcessExited`] once the process has died, and
    /// [`HiveError::Connect`], [`HiveError::Transport`] or
    /// [`HiveError::Codec`] when the exchange itself fails.
    pub fn invoke(&mut self, operation: &str, payload: &[u8]) -> Result<Reply, HiveError> {
        self.ensure_running()?;
        self.state = PluginState::Invoking;
        let request = CallRequest::new(self.name.as_str(), operation, payload.to_vec());
        let outcome = self.exchange(&request);
        self.state = PluginState::Ready;

        let response = match outcome {
            Ok(response) => response,
            Err(error) => {
                self.connection = None;
                self.refresh_exit(EXIT_GRACE)?;
                return Err(error);
            }
        };

        let (status, payload, error) = response.into_parts();
        debug!(
            target: SUPERVISOR_TARGET,
            plugin = %self.name,
            operation,
            status,
            failed = error.is_some(),
            "call completed"
        );
        match error {
            Some(message) => Err(HiveError::Application {
                status,
                payload,
                message,
            }),
            None => Ok(Reply { status, payload }),
        }
    }

    /// Terminates the plugin process. Calling `close` again is a no-op.
    pub fn close(&mut self) {
        if self.state == PluginState::Closed {
            return;
        }
        if let Some(connection) = self.connection.take() {
            drop(connection.get_ref().shutdown());
        }
        drop(self.stdin.take());
        if !matches!(self.state, PluginState::Exited { .. }) {
            kill_and_reap(&mut self.child);
        }
        self.state = PluginState::Closed;
        info!(target: SUPERVISOR_TARGET, plugin = %self.name, "plugin closed");
    }

    /// Returns the plugin name.
    #[must_use]
    pub const fn name(&self) -> &str {
        self.name.as_str()
    }

    /// Returns the endpoint the plugin advertised.
    #[must_use]
    pub const fn endpoint(&self) -> &Endpoint {
        &self.endpoint
    }

    /// Returns the application protocol version the plugin speaks.
    #[must_use]
    pub const fn protocol_version(&self) -> u32 {
        self.protocol_version
    }

    /// Returns the operating-system process id.
    #[must_use]
    pub fn pid(&self) -> u32 {
        self.child.id()
    }

    /// Returns the last observed lifecycle state.
    #[must_use]
    pub const fn state(&self) -> PluginState {
        self.state
    }

    fn ensure_running(&mut self) -> Result<(), HiveError> {
        match self.state {
            PluginState::Closed => Err(HiveError::Closed {
                name: self.name.clone(),
            }),
            PluginState::Exited { status } => Err(HiveError::ProcessExited {
                name: self.name.clone(),
                status,
            }),
            _ => self.refresh_exit(Duration::ZERO),
        }
    }

    /// Records an exit observed within `grace` and reports it as an error.
    fn refresh_exit(&mut self, grace: Duration) -> Result<(), HiveError> {
        let Some(status) = wait_for_exit(&mut self.child, grace) else {
            return Ok(());
        };
        warn!(
            target: SUPERVISOR_TARGET,
            plugin = %self.name,
            status = ?status,
            "plugin process exited"
        );
        self.connection = None;
        self.state = PluginState::Exited { status };
        Err(HiveError::ProcessExited {
            name: self.name.clone(),
            status,
        })
    }

    fn exchange(&mut self, request: &CallRequest) -> Result<CallResponse, HiveError> {
        let name = self.name.as_str();
        let connection = match self.connection.take() {
            Some(connection) => connection,
            None => self.connect()?,
        };
        let connection = self.connection.insert(connection);
        protocol::write_message(connection.get_mut(), request)
            .map_err(|error| codec_failure(name, error))?;
        match protocol::read_message::<CallResponse>(connection) {
            Ok(Some(response)) => Ok(response),
            Ok(None) => Err(HiveError::transport(
                name,
                io::Error::new(
                    io::ErrorKind::UnexpectedEof,
                    "plugin closed the connection before responding",
                ),
            )),
            Err(error) => Err(codec_failure(name, error)),
        }
    }

    fn connect(&self) -> Result<BufReader<Stream>, HiveError> {
        let connect_error = |source: io::Error| HiveError::Connect {
            name: self.name.clone(),
            endpoint: self.endpoint.to_string(),
            source: Arc::new(source),
        };
        let stream = Stream::connect(&self.endpoint, self.connect_timeout).map_err(connect_error)?;
        stream
            .set_read_timeout(self.call_timeout)
            .and_then(|()| stream.set_write_timeout(self.call_timeout))
            .map_err(connect_error)?;
        debug!(
            target: SUPERVISOR_TARGET,
            plugin = %self.name,
            endpoint = %self.endpoint,
            "connected to plugin"
        );
        Ok(BufReader::new(stream))
    }
}

impl Drop for PluginHandle {
    fn drop(&mut self) {
        self.close();
    }
}

fn codec_failure(name: &str, error: CodecError) -> HiveError {
    match error.into_io() {
        Ok(source) => HiveError::transport(name, source),
        Err(source) => HiveError::Codec {
            name: name.to_owned(),
            source,
        },
    }
}

fn spawn(name: &str, path: &Path, options: &PluginOptions) -> Result<Child, HiveError> {
    let handshake = options.handshake();
    let mut command = Command::new(path);
    command
        .args(options.args())
        .envs(options.envs().iter().map(|(key, value)| (key, value)))
        .env(handshake.magic_key(), handshake.magic_value())
        .env(NETWORK_ENV_VAR, options.network().to_string())
        .stdin(Stdio::piped())
        .stdout(Stdio::piped())
        .stderr(Stdio::piped());
    command.spawn().map_err(|source| HiveError::Spawn {
        name: name.to_owned(),
        path: PathBuf::from(path),
        source: Arc::new(source),
    })
}

/// Detaches the child's pipes and starts their background readers.
fn take_pipes(name: &str, child: &mut Child) -> Option<(ChildStdin, Receiver<FirstLine>)> {
    let stdin = child.stdin.take()?;
    let stdout = child.stdout.take()?;
    let stderr = child.stderr.take()?;
    relay::spawn_stderr_relay(name, stderr);
    Some((stdin, relay::spawn_stdout_reader(name, stdout)))
}

/// Waits for the handshake line and verifies it against `options`.
fn await_handshake(
    child: &mut Child,
    lines: &Receiver<FirstLine>,
    options: &PluginOptions,
) -> Result<HandshakeLine, HandshakeError> {
    let raw = await_first_line(child, lines, options.handshake_timeout())?;
    let line: HandshakeLine = raw.parse()?;
    line.verify(options.handshake(), &options.supported_versions())?;
    Ok(line)
}

fn await_first_line(
    child: &mut Child,
    lines: &Receiver<FirstLine>,
    timeout: Duration,
) -> Result<String, HandshakeError> {
    let deadline = Instant::now() + timeout;
    loop {
        let remaining = deadline.saturating_duration_since(Instant::now());
        if remaining.is_zero() {
            return Err(HandshakeError::Timeout {
                timeout_ms: u64::try_from(timeout.as_millis()).unwrap_or(u64::MAX),
            });
        }
        match lines.recv_timeout(remaining.min(POLL_INTERVAL)) {
            Ok(Ok(Some(line))) => return Ok(line),
            Ok(Ok(None)) | Err(RecvTimeoutError::Disconnected) => {
                return Err(HandshakeError::ExitedEarly {
                    status: wait_for_exit(child, HANDSHAKE_EXIT_GRACE).flatten(),
                });
            }
            Ok(Err(source)) => {
                return Err(HandshakeError::Read {
                    source: Arc::new(source),
                });
            }
            Err(RecvTimeoutError::Timeout) => {
                if let Ok(Some(status)) = child.try_wait() {
                    return Err(HandshakeError::ExitedEarly {
                        status: status.code(),
                    });
                }
            }
        }
    }
}

/// Polls `child` for up to `grace`, returning its exit code once it exits.
///
/// The outer `Option` is `None` while the child is still running.
fn wait_for_exit(child: &mut Child, grace: Duration) -> Option<Option<i32>> {
    let deadline = Instant::now() + grace;
    loop {
        match child.try_wait() {
            Ok(Some(status)) => return Some(status.code()),
            Ok(None) if Instant::now() < deadline => thread::sleep(POLL_INTERVAL),
            Ok(None) | Err(_) => return None,
        }
    }
}

fn kill_and_reap(child: &mut Child) {
    drop(child.kill());
    drop(child.wait());
}
