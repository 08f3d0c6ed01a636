//! Plugin-side dispatch server.
//!
//! [`serve`] is the entry point a plugin binary calls from `main`: it checks
//! that a hive host launched the process, binds the transport, writes the
//! handshake line to standard output and then answers calls forever.
//!
//! Each accepted connection is served on its own thread. Within a connection
//! requests are handled strictly one at a time, so responses come back in
//! request order. Every handler invocation runs inside a fault boundary
//! ([`dispatch`]) that turns a panic into an application error.

use std::any::Any;
use std::io::{self, BufReader, Read, Write};
use std::panic::{self, AssertUnwindSafe};
use std::sync::Arc;
use std::thread;
use std::time::Duration;

use tracing::{debug, info, warn};

use crate::error::HiveError;
use crate::handler::{Context, Handler};
use crate::handshake::{HandshakeConfig, HandshakeLine};
use crate::protocol::{self, CallRequest, CallResponse, CodecError};
use crate::transport::{Endpoint, Listener, Network, Stream};

/// Tracing target for dispatch server operations.
const SERVER_TARGET: &str = "hive_plugins::server";

/// Environment variable through which the host selects the plugin's network.
pub const NETWORK_ENV_VAR: &str = "HIVE_PLUGIN_NETWORK";

const ACCEPT_ERROR_BACKOFF: Duration = Duration::from_millis(150);

/// Plugin-side serving configuration.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ServeConfig {
    name: String,
    handshake: HandshakeConfig,
    network: Network,
}

impl ServeConfig {
    /// Creates a configuration for the service `name`.
    ///
    /// A missing handshake record falls back to [`HandshakeConfig::default`].
    #[must_use]
    pub fn new(name: impl Into<String>, handshake: Option<HandshakeConfig>) -> Self {
        Self {
            name: name.into(),
            handshake: handshake.unwrap_or_default(),
            network: Network::default(),
        }
    }

    /// Selects the socket family to listen on.
    #[must_use]
    pub fn with_network(mut self, network: Network) -> Self {
        self.network = network;
        self
    }

    /// Returns the service name.
    #[must_use]
    pub const fn name(&self) -> &str {
        self.name.as_str()
    }

    /// Returns the handshake record.
    #[must_use]
    pub const fn handshake(&self) -> &HandshakeConfig {
        &self.handshake
    }

    /// Returns the selected network.
    #[must_use]
    pub const fn network(&self) -> Network {
        self.network
    }
}

/// Runs `handler` for one request inside the fault boundary.
///
/// A panic raised by the handler is caught here and converted into a
/// response carrying the panic message as its error, zero status and an
/// empty payload.
///
/// # Example
///
/// ```
/// use hive_plugins::{dispatch, CallRequest, Context};
///
/// let handler = |ctx: &mut Context| {
///     if ctx.name() == "explode" {
///         panic!("kaboom");
///     }
///     ctx.reply(200, b"ok".to_vec());
/// };
///
/// let response = dispatch(&handler, CallRequest::new("svc", "explode", vec![]));
/// assert_eq!(response.error(), Some("kaboom"));
/// assert_eq!(response.status(), 0);
/// ```
pub fn dispatch(handler: &dyn Handler, request: CallRequest) -> CallResponse {
    let operation = request.name().to_owned();
    let mut ctx = Context::new(request);
    let outcome = panic::catch_unwind(AssertUnwindSafe(|| handler.on(&mut ctx)));
    match outcome {
        Ok(()) => ctx.into_response(),
        Err(payload) => {
            let message = panic_message(payload.as_ref());
            warn!(
                target: SERVER_TARGET,
                operation = %operation,
                error = %message,
                "handler panicked; returning error to host"
            );
            CallResponse::failure(message)
        }
    }
}

fn panic_message(payload: &(dyn Any + Send)) -> String {
    if let Some(message) = payload.downcast_ref::<&str>() {
        (*message).to_owned()
    } else if let Some(message) = payload.downcast_ref::<String>() {
        message.clone()
    } else {
        String::from("handler panicked")
    }
}

/// Bound plugin server that has not started serving yet.
#[derive(Debug)]
pub struct Server {
    config: ServeConfig,
    listener: Listener,
}

impl Server {
    /// Validates the configuration and binds the transport listener.
    ///
    /// # Errors
    ///
    /// Returns [`HiveError::InvalidConfig`] for an unusable handshake record
    /// and [`HiveError::Bind`] when the listener cannot be created.
    pub fn bind(config: ServeConfig) -> Result<Self, HiveError> {
        config.handshake().validate()?;
        let listener = Listener::bind(config.network()).map_err(|source| HiveError::Bind {
            endpoint: config.network().to_string(),
            source: Arc::new(source),
        })?;
        Ok(Self { config, listener })
    }

    /// Returns the endpoint hosts connect to.
    #[must_use]
    pub const fn endpoint(&self) -> &Endpoint {
        self.listener.endpoint()
    }

    /// Returns the handshake line advertising this server.
    #[must_use]
    pub fn handshake_line(&self) -> HandshakeLine {
        HandshakeLine::new(self.config.handshake(), self.endpoint().clone())
    }

    /// Serves connections forever, one thread per connection.
    ///
    /// Never returns; accept failures are logged and retried after a short
    /// backoff.
    pub fn run(self, handler: impl Handler) {
        let handler: Arc<dyn Handler> = Arc::new(handler);
        let service: Arc<str> = Arc::from(self.config.name());
        info!(
            target: SERVER_TARGET,
            service = %service,
            endpoint = %self.endpoint(),
            "plugin serving"
        );
        let mut last_error = None::<io::ErrorKind>;
        loop {
            match self.listener.accept() {
                Ok(stream) => {
                    last_error = None;
                    let handler = Arc::clone(&handler);
                    let service = Arc::clone(&service);
                    thread::spawn(move || serve_connection(handler.as_ref(), &service, stream));
                }
                Err(error) => {
                    let kind = error.kind();
                    if last_error != Some(kind) {
                        warn!(target: SERVER_TARGET, error = %error, "accept failed");
                    }
                    last_error = Some(kind);
                    thread::sleep(ACCEPT_ERROR_BACKOFF);
                }
            }
        }
    }
}

/// Answers requests on one connection until the host disconnects.
fn serve_connection(handler: &dyn Handler, service: &str, stream: Stream) {
    debug!(target: SERVER_TARGET, "host connected");
    let mut reader = BufReader::new(stream);
    loop {
        let request = match protocol::read_message::<CallRequest>(&mut reader) {
            Ok(Some(request)) => request,
            Ok(None) => {
                debug!(target: SERVER_TARGET, "host disconnected");
                return;
            }
            Err(CodecError::Decode(message)) => {
                // The stream cannot be resynchronised after a malformed item.
                warn!(target: SERVER_TARGET, error = %message, "malformed request");
                let response = CallResponse::failure(format!("malformed request: {message}"));
                drop(protocol::write_message(reader.get_mut(), &response));
                return;
            }
            Err(error) => {
                warn!(target: SERVER_TARGET, error = %error, "connection failed");
                return;
            }
        };

        let response = handle_request(handler, service, request);
        if let Err(error) = protocol::write_message(reader.get_mut(), &response) {
            warn!(target: SERVER_TARGET, error = %error, "failed to write response");
            return;
        }
    }
}

fn handle_request(handler: &dyn Handler, service: &str, request: CallRequest) -> CallResponse {
    if request.service() != service {
        warn!(
            target: SERVER_TARGET,
            requested = request.service(),
            service,
            "request for unknown service"
        );
        return CallResponse::failure(format!("unknown service '{}'", request.service()));
    }
    debug!(
        target: SERVER_TARGET,
        operation = request.name(),
        payload_bytes = request.payload().len(),
        "dispatching call"
    );
    dispatch(handler, request)
}

/// Serves `handler` as the plugin `name` until the process is killed.
///
/// This is the entry point for plugin binaries. It fails fast when the
/// process was not launched by a hive host with a matching magic cookie;
/// otherwise it never returns. A missing handshake record falls back to
/// [`HandshakeConfig::default`]. The host may select the socket family via
/// [`NETWORK_ENV_VAR`].
///
/// Once serving, the plugin exits when its standard input reaches EOF, which
/// happens when the host process goes away.
///
/// # Errors
///
/// Returns [`HiveError::NotLaunchedByHost`] when the cookie is missing or
/// wrong, [`HiveError::InvalidConfig`] for an unusable handshake record,
/// [`HiveError::Bind`] when the listener cannot be created and
/// [`HiveError::Transport`] when the handshake line cannot be written.
pub fn serve(
    handler: impl Handler,
    name: &str,
    handshake: Option<HandshakeConfig>,
) -> Result<(), HiveError> {
    let mut config = ServeConfig::new(name, handshake);
    config.handshake().validate()?;

    let cookie = std::env::var(config.handshake().magic_key()).ok();
    if !config.handshake().cookie_matches(cookie.as_deref()) {
        return Err(HiveError::NotLaunchedByHost {
            key: config.handshake().magic_key().to_owned(),
        });
    }

    if let Some(requested) = std::env::var(NETWORK_ENV_VAR).ok() {
        match requested.parse::<Network>() {
            Ok(network) => config = config.with_network(network),
            Err(_) => warn!(
                target: SERVER_TARGET,
                requested = %requested,
                "ignoring unknown network requested by host"
            ),
        }
    }

    let server = Server::bind(config)?;
    let line = server.handshake_line();
    let mut stdout = io::stdout().lock();
    writeln!(stdout, "{line}")
        .and_then(|()| stdout.flush())
        .map_err(|source| HiveError::transport(name, source))?;
    drop(stdout);

    watch_parent();
    server.run(handler);
    Ok(())
}

/// Exits the process once the host closes our standard input.
fn watch_parent() {
    thread::spawn(|| {
        let mut sink = [0_u8; 64];
        let mut stdin = io::stdin();
        loop {
            match stdin.read(&mut sink) {
                Ok(0) | Err(_) => break,
                Ok(_) => {}
            }
        }
        info!(target: SERVER_TARGET, "host went away; exiting");
        std::process::exit(0);
    });
}

#[cfg(test)]
mod tests;
