//! Unit tests for the dispatch server and its fault boundary.

use std::io::BufReader;
use std::thread;
use std::time::Duration;

use rstest::{fixture, rstest};

use super::*;

const CONNECT_TIMEOUT: Duration = Duration::from_secs(2);
const SERVICE: &str = "lobby";

fn fixture_handler(ctx: &mut Context) {
    match ctx.name() {
        "echo" => {
            let payload = ctx.data().to_vec();
            ctx.reply(200, payload);
        }
        "panic" => panic!("boom on {}", ctx.name()),
        "fail" => {
            ctx.reply(500, Vec::new());
            ctx.fail("bad input");
        }
        other => {
            let message = format!("unknown operation '{other}'");
            ctx.fail(message);
        }
    }
}

/// Starts an in-process server and returns a reader over a connection to it.
fn connect(network: Network) -> BufReader<Stream> {
    let server =
        Server::bind(ServeConfig::new(SERVICE, None).with_network(network)).expect("bind server");
    let endpoint = server.endpoint().clone();
    thread::spawn(move || server.run(fixture_handler));
    BufReader::new(Stream::connect(&endpoint, CONNECT_TIMEOUT).expect("connect"))
}

fn call(connection: &mut BufReader<Stream>, request: &CallRequest) -> CallResponse {
    protocol::write_message(connection.get_mut(), request).expect("send request");
    protocol::read_message(connection)
        .expect("read response")
        .expect("response present")
}

#[fixture]
fn connection() -> BufReader<Stream> {
    connect(Network::Tcp)
}

#[rstest]
fn dispatch_returns_the_handler_reply() {
    let response = dispatch(
        &fixture_handler,
        CallRequest::new(SERVICE, "echo", b"world".to_vec()),
    );
    assert_eq!(response, CallResponse::new(200, b"world".to_vec()));
}

#[rstest]
fn dispatch_converts_formatted_panics() {
    let response = dispatch(&fixture_handler, CallRequest::new(SERVICE, "panic", vec![]));
    assert_eq!(response.error(), Some("boom on panic"));
    assert_eq!(response.status(), 0);
    assert!(response.payload().is_empty());
}

fn panics_after_reply(ctx: &mut Context) {
    ctx.reply(200, b"partial".to_vec());
    panic!("late failure");
}

fn panics_with_number(_ctx: &mut Context) {
    std::panic::panic_any(42_u32);
}

#[test]
fn dispatch_discards_partial_reply_when_handler_panics() {
    let response = dispatch(&panics_after_reply, CallRequest::new(SERVICE, "op", vec![]));
    assert_eq!(response, CallResponse::failure("late failure"));
}

#[test]
fn dispatch_describes_non_string_panics() {
    let response = dispatch(&panics_with_number, CallRequest::new(SERVICE, "op", vec![]));
    assert_eq!(response.error(), Some("handler panicked"));
}

#[rstest]
fn connection_survives_a_panicking_call(mut connection: BufReader<Stream>) {
    let failed = call(&mut connection, &CallRequest::new(SERVICE, "panic", vec![]));
    assert!(failed.is_error());

    let echoed = call(
        &mut connection,
        &CallRequest::new(SERVICE, "echo", b"still here".to_vec()),
    );
    assert_eq!(echoed, CallResponse::new(200, b"still here".to_vec()));
}

#[rstest]
fn explicit_failures_keep_status(mut connection: BufReader<Stream>) {
    let response = call(&mut connection, &CallRequest::new(SERVICE, "fail", vec![]));
    assert_eq!(response.status(), 500);
    assert_eq!(response.error(), Some("bad input"));
}

#[rstest]
fn responses_follow_request_order(mut connection: BufReader<Stream>) {
    for index in 0..25_u32 {
        let payload = index.to_string().into_bytes();
        let response = call(
            &mut connection,
            &CallRequest::new(SERVICE, "echo", payload.clone()),
        );
        assert_eq!(response.payload(), payload.as_slice(), "call {index}");
    }
}

#[rstest]
fn unknown_service_is_reported_without_dropping_the_connection(
    mut connection: BufReader<Stream>,
) {
    let response = call(&mut connection, &CallRequest::new("other", "echo", vec![1]));
    assert_eq!(response.error(), Some("unknown service 'other'"));

    let echoed = call(&mut connection, &CallRequest::new(SERVICE, "echo", vec![1]));
    assert_eq!(echoed.payload(), [1]);
}

#[rstest]
fn malformed_request_is_answered_then_closed(mut connection: BufReader<Stream>) {
    protocol::write_message(connection.get_mut(), &"not a request").expect("send garbage");
    let response: CallResponse = protocol::read_message(&mut connection)
        .expect("read response")
        .expect("response present");
    assert!(
        response
            .error()
            .is_some_and(|error| error.starts_with("malformed request")),
        "unexpected response {response:?}"
    );
    let closed: Option<CallResponse> = protocol::read_message(&mut connection).expect("clean close");
    assert!(closed.is_none());
}

#[cfg(unix)]
#[test]
fn unix_transport_serves_calls() {
    let mut connection = connect(Network::Unix);
    let response = call(
        &mut connection,
        &CallRequest::new(SERVICE, "echo", b"over unix".to_vec()),
    );
    assert_eq!(response.payload(), b"over unix");
}

#[test]
fn independent_connections_are_served_concurrently() {
    let server = Server::bind(ServeConfig::new(SERVICE, None).with_network(Network::Tcp))
        .expect("bind server");
    let endpoint = server.endpoint().clone();
    thread::spawn(move || server.run(fixture_handler));

    let mut first = BufReader::new(Stream::connect(&endpoint, CONNECT_TIMEOUT).expect("first"));
    let mut second = BufReader::new(Stream::connect(&endpoint, CONNECT_TIMEOUT).expect("second"));
    let from_second = call(&mut second, &CallRequest::new(SERVICE, "echo", vec![2]));
    let from_first = call(&mut first, &CallRequest::new(SERVICE, "echo", vec![1]));
    assert_eq!(from_first.payload(), [1]);
    assert_eq!(from_second.payload(), [2]);
}

#[test]
fn handshake_line_advertises_bound_endpoint() {
    let server = Server::bind(ServeConfig::new(SERVICE, None).with_network(Network::Tcp))
        .expect("bind server");
    let line = server.handshake_line();
    assert_eq!(line.endpoint(), server.endpoint());
    assert!(
        line.verify(&HandshakeConfig::default(), &[1]).is_ok(),
        "line {line} should verify against defaults"
    );
}

#[test]
fn bind_rejects_invalid_handshake_config() {
    let config = ServeConfig::new(SERVICE, Some(HandshakeConfig::new("", "value", 1)));
    let error = Server::bind(config).expect_err("empty key");
    assert!(matches!(error, HiveError::InvalidConfig { .. }));
}
