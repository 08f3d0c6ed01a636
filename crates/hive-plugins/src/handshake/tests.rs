//! Unit tests for handshake records and line parsing.

use rstest::{fixture, rstest};

use super::*;

const VALID_LINE: &str = "1|1|tcp|127.0.0.1:4000|cbor|HivePluginMagicKey=HivePluginMagicValue";

#[fixture]
fn defaults() -> HandshakeConfig {
    HandshakeConfig::default()
}

fn parse(line: &str) -> Result<HandshakeLine, HandshakeError> {
    line.parse()
}

#[rstest]
fn default_record_uses_documented_pair(defaults: HandshakeConfig) {
    assert_eq!(defaults.magic_key(), DEFAULT_MAGIC_KEY);
    assert_eq!(defaults.magic_value(), DEFAULT_MAGIC_VALUE);
    assert_eq!(defaults.protocol_version(), DEFAULT_PROTOCOL_VERSION);
}

#[rstest]
#[case::empty_key(HandshakeConfig::new("", "v", 1))]
#[case::equals_in_key(HandshakeConfig::new("K=EY", "v", 1))]
#[case::pipe_in_key(HandshakeConfig::new("K|EY", "v", 1))]
#[case::newline_in_value(HandshakeConfig::new("KEY", "v\n", 1))]
#[case::trailing_space_in_value(HandshakeConfig::new("KEY", "secret ", 1))]
#[case::leading_tab_in_value(HandshakeConfig::new("KEY", "\tsecret", 1))]
fn validate_rejects_unusable_records(#[case] config: HandshakeConfig) {
    let error = config.validate().expect_err("invalid record");
    assert!(matches!(error, HiveError::InvalidConfig { .. }));
}

#[rstest]
fn cookie_match_requires_exact_value(defaults: HandshakeConfig) {
    assert!(defaults.cookie_matches(Some(DEFAULT_MAGIC_VALUE)));
    assert!(!defaults.cookie_matches(Some("HivePluginMagicValue ")));
    assert!(!defaults.cookie_matches(None));
}

#[rstest]
fn valid_line_parses_and_verifies(defaults: HandshakeConfig) {
    let line = parse(VALID_LINE).expect("valid line");
    assert_eq!(line.core_version(), CORE_PROTOCOL_VERSION);
    assert_eq!(line.app_version(), 1);
    assert_eq!(line.codec(), ENVELOPE_CODEC);
    assert_eq!(line.endpoint().network(), Network::Tcp);
    line.verify(&defaults, &[1]).expect("verifies");
}

#[rstest]
fn trailing_newline_is_ignored() {
    let line = parse(&format!("{VALID_LINE}\r\n")).expect("line with newline");
    assert_eq!(line.to_string(), VALID_LINE);
}

#[rstest]
fn display_and_parse_agree(defaults: HandshakeConfig) {
    let endpoint = Endpoint::unix("/tmp/hive-plugin-abc/plugin.sock");
    let line = HandshakeLine::new(&defaults, endpoint);
    let reparsed = parse(&line.to_string()).expect("reparse");
    assert_eq!(reparsed, line);
}

#[rstest]
fn magic_value_may_contain_separators() {
    let config = HandshakeConfig::new("KEY", "a=b|c", 3);
    let line = HandshakeLine::new(&config, Endpoint::unix("/tmp/p.sock"));
    let reparsed = parse(&line.to_string()).expect("reparse");
    reparsed.verify(&config, &[3]).expect("verifies");
}

#[rstest]
fn inner_whitespace_in_magic_value_survives_the_line() {
    let config = HandshakeConfig::new("KEY", "open sesame", 1);
    config.validate().expect("valid record");
    let line = HandshakeLine::new(&config, Endpoint::unix("/tmp/p.sock"));
    let reparsed = parse(&format!("{line}\n")).expect("reparse");
    reparsed.verify(&config, &[1]).expect("verifies");
}

#[rstest]
fn only_the_line_terminator_is_stripped() {
    let line = parse(&format!("{VALID_LINE} \n")).expect("line with trailing space");
    let error = line
        .verify(&HandshakeConfig::default(), &[1])
        .expect_err("cookie differs");
    assert!(matches!(error, HandshakeError::MagicMismatch { .. }));
}

#[rstest]
#[case::empty("")]
#[case::too_few_fields("1|1|tcp|127.0.0.1:4000|cbor")]
#[case::bad_core("x|1|tcp|127.0.0.1:4000|cbor|K=V")]
#[case::bad_app("1|-1|tcp|127.0.0.1:4000|cbor|K=V")]
#[case::bad_network("1|1|udp|127.0.0.1:4000|cbor|K=V")]
#[case::bad_address("1|1|tcp|nowhere|cbor|K=V")]
#[case::missing_cookie_separator("1|1|tcp|127.0.0.1:4000|cbor|KV")]
fn malformed_lines_are_rejected(#[case] input: &str) {
    let error = parse(input).expect_err("malformed");
    assert!(
        matches!(error, HandshakeError::Malformed { .. }),
        "expected Malformed for '{input}', got {error:?}"
    );
}

#[rstest]
#[case::wrong_key(HandshakeConfig::new("OtherKey", DEFAULT_MAGIC_VALUE, 1))]
#[case::wrong_value(HandshakeConfig::new(DEFAULT_MAGIC_KEY, "OtherValue", 1))]
fn magic_mismatch_is_detected(#[case] host: HandshakeConfig) {
    let line = parse(VALID_LINE).expect("valid line");
    let error = line.verify(&host, &[1]).expect_err("mismatch");
    assert!(matches!(error, HandshakeError::MagicMismatch { .. }), "{error:?}");
}

#[rstest]
fn unsupported_app_version_is_detected(defaults: HandshakeConfig) {
    let line = parse(VALID_LINE).expect("valid line");
    let error = line.verify(&defaults, &[2, 3]).expect_err("version");
    match error {
        HandshakeError::UnsupportedVersion { found, supported } => {
            assert_eq!(found, 1);
            assert_eq!(supported, vec![2, 3]);
        }
        other => panic!("expected UnsupportedVersion, got {other:?}"),
    }
}

#[rstest]
fn unsupported_core_version_is_detected(defaults: HandshakeConfig) {
    let line = parse("2|1|tcp|127.0.0.1:4000|cbor|HivePluginMagicKey=HivePluginMagicValue")
        .expect("parses");
    let error = line.verify(&defaults, &[1]).expect_err("core version");
    assert!(matches!(
        error,
        HandshakeError::UnsupportedCoreVersion { found: 2, .. }
    ));
}

#[rstest]
fn unknown_codec_is_detected(defaults: HandshakeConfig) {
    let line = parse("1|1|tcp|127.0.0.1:4000|gob|HivePluginMagicKey=HivePluginMagicValue")
        .expect("parses");
    let error = line.verify(&defaults, &[1]).expect_err("codec");
    assert!(matches!(error, HandshakeError::UnsupportedProtocol { .. }));
}
