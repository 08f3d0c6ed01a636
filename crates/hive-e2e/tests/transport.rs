//! End-to-end tests over both transports, including process death.

use std::thread;
use std::time::Duration;

use hive_e2e::{FIXTURE_SERVICE, fixture_options, networks};
use hive_plugins::{HiveError, Network, PluginHandle, PluginState};
use rstest::rstest;

const FIXTURE: &str = env!("CARGO_BIN_EXE_hive-fixture-plugin");

fn start(network: Network) -> PluginHandle {
    PluginHandle::start_with(FIXTURE_SERVICE, FIXTURE, fixture_options(network))
        .expect("start fixture plugin")
}

#[rstest]
fn echo_round_trips_on_every_network() {
    for network in networks() {
        let mut plugin = start(network);
        assert_eq!(plugin.endpoint().network(), network);
        let reply = plugin.invoke("echo", b"world").expect("echo");
        assert_eq!(reply.status(), 200);
        assert_eq!(reply.payload(), b"world", "network {network}");
    }
}

#[rstest]
fn empty_payload_echoes_as_empty() {
    for network in networks() {
        let mut plugin = start(network);
        let reply = plugin.invoke("echo", b"").expect("empty echo");
        assert_eq!(reply.status(), 200);
        assert!(reply.payload().is_empty(), "network {network}");
    }
}

#[rstest]
fn responses_arrive_in_call_order() {
    let mut plugin = start(Network::Tcp);
    for index in 0..100_u32 {
        let payload = index.to_string();
        let reply = plugin.invoke("echo", payload.as_bytes()).expect("echo");
        assert_eq!(reply.payload(), payload.as_bytes());
    }
}

#[rstest]
fn large_and_binary_payloads_survive() {
    let payload: Vec<u8> = (0..=255_u8).cycle().take(1 << 20).collect();
    for network in networks() {
        let mut plugin = start(network);
        let reply = plugin.invoke("echo", &payload).expect("large echo");
        assert_eq!(reply.payload().len(), payload.len());
        assert!(reply.payload() == payload.as_slice(), "payload differs on {network}");
    }
}

#[rstest]
fn independent_handles_run_concurrently() {
    let workers: Vec<_> = (0..4)
        .map(|worker| {
            thread::spawn(move || {
                let mut plugin = start(Network::Tcp);
                for call in 0..20 {
                    let payload = format!("{worker}-{call}");
                    let reply = plugin.invoke("echo", payload.as_bytes()).expect("echo");
                    assert_eq!(reply.payload(), payload.as_bytes());
                }
                plugin.pid()
            })
        })
        .collect();
    let mut pids: Vec<u32> = workers
        .into_iter()
        .map(|worker| worker.join().expect("worker thread"))
        .collect();
    pids.sort_unstable();
    pids.dedup();
    assert_eq!(pids.len(), 4, "each handle owns its own process");
}

#[rstest]
fn process_death_is_a_transport_error() {
    for network in networks() {
        let mut plugin = start(network);
        let error = plugin.invoke("exit", b"9").expect_err("plugin exits mid-call");
        assert!(error.is_transport(), "{network}: {error:?}");

        thread::sleep(Duration::from_millis(300));
        let next = plugin.invoke("echo", b"anyone?").expect_err("plugin is gone");
        assert!(
            matches!(next, HiveError::ProcessExited { status: Some(9), .. }),
            "{network}: {next:?}"
        );
        assert_eq!(plugin.state(), PluginState::Exited { status: Some(9) });
    }
}

#[rstest]
fn slow_call_hits_the_call_timeout_and_recovers() {
    let options = fixture_options(Network::Tcp).with_call_timeout(Duration::from_millis(200));
    let mut plugin =
        PluginHandle::start_with(FIXTURE_SERVICE, FIXTURE, options).expect("start fixture plugin");
    let error = plugin.invoke("sleep", b"2000").expect_err("call timed out");
    assert!(matches!(error, HiveError::Transport { .. }), "{error:?}");
    assert_eq!(plugin.state(), PluginState::Ready);

    let reply = plugin.invoke("echo", b"reconnected").expect("fresh connection");
    assert_eq!(reply.payload(), b"reconnected");
}

#[rstest]
fn host_environment_reaches_the_plugin() {
    let options = fixture_options(Network::Tcp).env("HIVE_E2E_MARKER", "present");
    let mut plugin =
        PluginHandle::start_with(FIXTURE_SERVICE, FIXTURE, options).expect("start fixture plugin");
    let reply = plugin.invoke("env", b"HIVE_E2E_MARKER").expect("env call");
    assert_eq!(reply.payload(), b"present");
}
