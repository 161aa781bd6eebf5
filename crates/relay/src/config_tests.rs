use super::*;
use clap::Parser;

fn parse(extra: &[&str]) -> RelayConfig {
    let mut args = vec!["authz-relay", "--database-url", "postgres://localhost/test"];
    args.extend_from_slice(extra);
    RelayConfig::parse_from(args)
}

#[test]
fn defaults_are_sane() {
    let config = parse(&[]);
    assert_eq!(config.batch_size, 100);
    assert_eq!(config.poll_interval_ms, 500);
}

#[test]
fn poll_interval_converts_millis_to_a_duration() {
    let config = parse(&["--poll-interval-ms", "250"]);
    assert_eq!(config.poll_interval(), std::time::Duration::from_millis(250));
}
