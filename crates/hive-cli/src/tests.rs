//! Unit tests for argument handling and error reporting.

use std::time::Duration;

use clap::Parser;
use hive_plugins::handshake::{DEFAULT_MAGIC_KEY, DEFAULT_MAGIC_VALUE};
use hive_plugins::{Network, TelemetryConfig};
use rstest::rstest;

use super::*;

fn parse(args: &[&str]) -> Cli {
    Cli::try_parse_from(std::iter::once("hive").chain(args.iter().copied())).expect("valid args")
}

fn run_with(args: &[&str]) -> (ExitCode, String, String) {
    let mut stdout = Vec::new();
    let mut stderr = Vec::new();
    let argv = std::iter::once("hive")
        .chain(args.iter().copied())
        .map(OsString::from);
    let code = run(argv, &mut stdout, &mut stderr);
    (
        code,
        String::from_utf8(stdout).expect("utf8 stdout"),
        String::from_utf8(stderr).expect("utf8 stderr"),
    )
}

#[rstest]
fn defaults_call_hello_on_the_lobby() {
    let cli = parse(&[]);
    assert_eq!(cli.plugin, std::path::PathBuf::from(cli::DEFAULT_PLUGIN_PATH));
    assert_eq!(cli.name, "lobby");
    assert_eq!(cli.operation, "hello");
    assert_eq!(cli.payload, "world");

    let options = cli.plugin_options();
    assert_eq!(options.handshake().magic_key(), DEFAULT_MAGIC_KEY);
    assert_eq!(options.handshake().magic_value(), DEFAULT_MAGIC_VALUE);
    assert_eq!(options.network(), Network::default());
}

#[rstest]
fn flags_shape_the_launch_options() {
    let cli = parse(&[
        "--magic-key",
        "LOBBY",
        "--magic-value",
        "secret",
        "--protocol-version",
        "3",
        "--network",
        "TCP",
        "--handshake-timeout-ms",
        "250",
    ]);
    let options = cli.plugin_options();
    assert_eq!(options.handshake().magic_key(), "LOBBY");
    assert_eq!(options.handshake().magic_value(), "secret");
    assert_eq!(options.supported_versions(), vec![3]);
    assert_eq!(options.network(), Network::Tcp);
    assert_eq!(options.handshake_timeout(), Duration::from_millis(250));
}

#[rstest]
fn logging_flags_override_the_environment() {
    let cli = parse(&["--log-filter", "hive_plugins=trace", "--log-format", "compact"]);
    let config = cli.telemetry(TelemetryConfig::default());
    assert_eq!(config.log_filter(), "hive_plugins=trace");
    assert_eq!(config.log_format(), LogFormat::Compact);
}

#[rstest]
fn unknown_network_is_a_usage_error() {
    let (code, stdout, stderr) = run_with(&["--network", "carrier-pigeon"]);
    assert_eq!(code, ExitCode::FAILURE);
    assert!(stdout.is_empty());
    assert!(stderr.contains("carrier-pigeon"), "stderr: {stderr}");
}

#[rstest]
fn help_is_written_to_stdout() {
    let (code, stdout, stderr) = run_with(&["--help"]);
    assert_eq!(code, ExitCode::SUCCESS);
    assert!(stdout.contains("--operation"), "stdout: {stdout}");
    assert!(stderr.is_empty());
}

#[rstest]
fn missing_plugin_reports_a_start_failure() {
    let (code, stdout, stderr) = run_with(&["--plugin", "/nonexistent/hive-plugin"]);
    assert_eq!(code, ExitCode::FAILURE);
    assert!(stdout.is_empty());
    assert!(
        stderr.starts_with("failed to start plugin:"),
        "stderr: {stderr}"
    );
}

#[rstest]
fn replies_render_as_status_and_text() {
    let mut stdout = Vec::new();
    let reply = hive_plugins::Reply::new(200, b"response[world]".to_vec());
    render_reply(&reply, &mut stdout).expect("render");
    assert_eq!(stdout, b"200 response[world]\n");
}
