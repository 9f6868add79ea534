//! Tests for Config
//!
//! These tests verify:
//! - Endpoint parsing
//! - Environment loading through a lookup function
//! - Validation of every invariant contexts rely on
//! - Log level mapping

use std::collections::HashMap;
use std::time::Duration;

use kvlock::config::{parse_hosts, ENV_DB_INDEX, ENV_HOSTS, ENV_LOG_LEVEL, ENV_PASSWORD};
use kvlock::{Config, Endpoint, KvError};

// =============================================================================
// Helper Functions
// =============================================================================

fn load(vars: &[(&str, &str)]) -> kvlock::Result<Config> {
    let vars: HashMap<String, String> = vars
        .iter()
        .map(|(k, v)| (k.to_string(), v.to_string()))
        .collect();
    Config::from_lookup(|name| vars.get(name).cloned())
}

// =============================================================================
// Endpoint Tests
// =============================================================================

#[test]
fn test_endpoint_parse() {
    let endpoint: Endpoint = "redis.local:6380".parse().unwrap();
    assert_eq!(endpoint, Endpoint::new("redis.local", 6380));
    assert_eq!(endpoint.to_string(), "redis.local:6380");
}

#[test]
fn test_endpoint_parse_trims_whitespace() {
    let endpoint: Endpoint = "  10.0.0.1:6379 ".parse().unwrap();
    assert_eq!(endpoint, Endpoint::new("10.0.0.1", 6379));
}

#[test]
fn test_endpoint_parse_ipv6() {
    let endpoint: Endpoint = "[::1]:6379".parse().unwrap();
    assert_eq!(endpoint.host, "::1");
    assert_eq!(endpoint.to_string(), "[::1]:6379");
}

#[test]
fn test_endpoint_parse_rejects_malformed() {
    assert!(matches!("localhost".parse::<Endpoint>(), Err(KvError::Config(_))));
    assert!(matches!(":6379".parse::<Endpoint>(), Err(KvError::Config(_))));
    assert!(matches!("host:port".parse::<Endpoint>(), Err(KvError::Config(_))));
    assert!(matches!("host:70000".parse::<Endpoint>(), Err(KvError::Config(_))));
}

#[test]
fn test_parse_hosts_list() {
    let hosts = parse_hosts("a:1, b:2 ,c:3").unwrap();

    assert_eq!(
        hosts,
        vec![
            Endpoint::new("a", 1),
            Endpoint::new("b", 2),
            Endpoint::new("c", 3),
        ]
    );
}

#[test]
fn test_parse_hosts_rejects_empty_list() {
    assert!(parse_hosts(" , ").is_err());
}

// =============================================================================
// Environment Tests
// =============================================================================

#[test]
fn test_from_lookup_single_host() {
    let config = load(&[(ENV_HOSTS, "127.0.0.1:6379")]).unwrap();

    assert_eq!(config.hosts, vec![Endpoint::new("127.0.0.1", 6379)]);
    assert!(!config.is_cluster());
    assert_eq!(config.db_index, 0);
    assert_eq!(config.password, None);
    assert_eq!(config.log_level, "INFO");
}

#[test]
fn test_from_lookup_all_variables() {
    let config = load(&[
        (ENV_HOSTS, "a:7000,b:7001,c:7002"),
        (ENV_DB_INDEX, "3"),
        (ENV_PASSWORD, "s3cret"),
        (ENV_LOG_LEVEL, "DEBUG"),
    ])
    .unwrap();

    assert_eq!(config.hosts.len(), 3);
    assert!(config.is_cluster());
    assert_eq!(config.db_index, 3);
    assert_eq!(config.credential(), Some("s3cret"));
    assert_eq!(config.log_directive(), "debug");
}

#[test]
fn test_from_lookup_missing_hosts() {
    let result = load(&[(ENV_PASSWORD, "s3cret")]);
    assert!(matches!(result, Err(KvError::Config(_))));
}

#[test]
fn test_from_lookup_empty_hosts() {
    let result = load(&[(ENV_HOSTS, "")]);
    assert!(matches!(result, Err(KvError::Config(_))));
}

#[test]
fn test_from_lookup_invalid_db_index() {
    assert!(load(&[(ENV_HOSTS, "a:1"), (ENV_DB_INDEX, "abc")]).is_err());
    assert!(load(&[(ENV_HOSTS, "a:1"), (ENV_DB_INDEX, "200")]).is_err());
    assert!(load(&[(ENV_HOSTS, "a:1"), (ENV_DB_INDEX, "-1")]).is_err());
}

#[test]
fn test_from_lookup_empty_password_is_absent() {
    let config = load(&[(ENV_HOSTS, "a:1"), (ENV_PASSWORD, "")]).unwrap();

    assert_eq!(config.password, None);
    assert_eq!(config.credential(), None);
}

// =============================================================================
// Builder & Validation Tests
// =============================================================================

#[test]
fn test_default_config_is_valid() {
    let config = Config::default();

    config.validate().unwrap();
    assert_eq!(config.hosts, vec![Endpoint::new("127.0.0.1", 6379)]);
    assert_eq!(config.lock_ttl, Duration::from_secs(8));
}

#[test]
fn test_builder_drops_empty_password() {
    let config = Config::builder().password("").build();
    assert_eq!(config.password, None);

    let config = Config::builder().password("pw").build();
    assert_eq!(config.credential(), Some("pw"));
}

#[test]
fn test_validate_rejects_bad_values() {
    let bad = [
        Config::builder().hosts(Vec::new()).build(),
        Config::builder().db_index(-1).build(),
        Config::builder().db_index(128).build(),
        Config::builder().pool_size(0).build(),
        Config::builder().lock_ttl(Duration::ZERO).build(),
        Config::builder().drift_factor(1.0).build(),
        Config::builder().drift_factor(-0.1).build(),
    ];

    for config in &bad {
        assert!(
            matches!(config.validate(), Err(KvError::Config(_))),
            "expected invalid: {:?}",
            config
        );
    }
}

#[test]
fn test_log_directive_mapping() {
    let directive = |level: &str| Config::builder().log_level(level).build().log_directive();

    assert_eq!(directive("TRACE"), "trace");
    assert_eq!(directive("debug"), "debug");
    assert_eq!(directive("INFO"), "info");
    assert_eq!(directive("WARNING"), "warn");
    assert_eq!(directive("WARN"), "warn");
    assert_eq!(directive("ERROR"), "error");
    assert_eq!(directive("CRITICAL"), "error");
    assert_eq!(directive("whatever"), "info");
}
