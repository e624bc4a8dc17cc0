//! Configuration layering tests.
//!
//! Tests file loading, environment variable overrides, CLI overrides, and
//! the mapping into the jail manager's configuration.

use std::env;
use std::path::PathBuf;

use baniq_core::config::BaniqConfig;
use baniq_daemon::cli::DaemonCli;
use baniq_jail_manager::JailManagerConfig;
use clap::Parser;
use serial_test::serial;
use tempfile::TempDir;

const FULL_CONFIG: &str = r#"
[general]
log_level = "debug"
log_format = "pretty"
pid_file = "/run/baniq/baniq.pid"

[docker]
socket = "/run/docker.sock"

[fail2ban]
jail_dir = "/srv/fail2ban/jail.d"
filter_dir = "/srv/fail2ban/filter.d"
client_path = "/usr/bin/fail2ban-client"
reload_timeout_secs = 10
reload_retries = 2

[metrics]
enabled = true
listen_addr = "0.0.0.0"
port = 9200
"#;

fn write_config(dir: &TempDir, content: &str) -> PathBuf {
    let path = dir.path().join("baniq.toml");
    std::fs::write(&path, content).expect("should write config");
    path
}

#[test]
fn test_parse_full_config() {
    let config = BaniqConfig::parse(FULL_CONFIG).expect("full config should parse");

    assert_eq!(config.general.log_level, "debug");
    assert_eq!(config.general.log_format, "pretty");
    assert_eq!(config.general.pid_file, "/run/baniq/baniq.pid");
    assert_eq!(config.docker.socket, "/run/docker.sock");
    assert_eq!(config.fail2ban.jail_dir, "/srv/fail2ban/jail.d");
    assert_eq!(config.fail2ban.filter_dir, "/srv/fail2ban/filter.d");
    assert_eq!(config.fail2ban.client_path, "/usr/bin/fail2ban-client");
    assert_eq!(config.fail2ban.reload_timeout_secs, 10);
    assert_eq!(config.fail2ban.reload_retries, 2);
    assert!(config.metrics.enabled);
    assert_eq!(config.metrics.port, 9200);
    config.validate().expect("full config should validate");
}

#[test]
fn test_parse_empty_config_uses_defaults() {
    let config = BaniqConfig::parse("").expect("empty config should parse");

    assert_eq!(config.general.log_level, "info");
    assert_eq!(config.general.log_format, "json");
    assert!(config.general.pid_file.is_empty());
    assert_eq!(config.docker.socket, "/var/run/docker.sock");
    assert_eq!(config.fail2ban.jail_dir, "/etc/fail2ban/jail.d");
    assert_eq!(config.fail2ban.filter_dir, "/etc/fail2ban/filter.d");
    assert_eq!(config.fail2ban.client_path, "fail2ban-client");
    assert!(!config.metrics.enabled);
}

#[test]
fn test_parse_malformed_toml_fails() {
    let result = BaniqConfig::parse("[fail2ban\njail_dir = ");
    assert!(result.is_err(), "malformed TOML should be rejected");
}

#[test]
fn test_validation_rejects_out_of_range_timeout() {
    let config = BaniqConfig::parse("[fail2ban]\nreload_timeout_secs = 0").expect("should parse");
    let err = config.validate().unwrap_err().to_string();
    assert!(err.contains("reload_timeout_secs"), "got: {err}");
}

#[tokio::test]
#[serial]
async fn test_load_missing_file_is_fatal() {
    let dir = TempDir::new().expect("temp dir");
    let result = BaniqConfig::load(dir.path().join("absent.toml")).await;
    assert!(result.is_err(), "missing config file should fail to load");
}

#[tokio::test]
#[serial]
async fn test_env_override_applies_on_load() {
    let dir = TempDir::new().expect("temp dir");
    let path = write_config(&dir, FULL_CONFIG);

    // SAFETY: serialized test; the variable is removed before returning
    unsafe {
        env::set_var("BANIQ_FAIL2BAN_JAIL_DIR", "/env/jail.d");
    }

    let result = BaniqConfig::load(&path).await;

    // SAFETY: test cleanup
    unsafe {
        env::remove_var("BANIQ_FAIL2BAN_JAIL_DIR");
    }

    let config = result.expect("config should load");
    assert_eq!(config.fail2ban.jail_dir, "/env/jail.d");
    assert_eq!(config.fail2ban.filter_dir, "/srv/fail2ban/filter.d");
}

#[tokio::test]
#[serial]
async fn test_cli_override_wins_over_env_and_file() {
    let dir = TempDir::new().expect("temp dir");
    let path = write_config(&dir, FULL_CONFIG);

    // SAFETY: serialized test; the variable is removed before returning
    unsafe {
        env::set_var("BANIQ_GENERAL_LOG_LEVEL", "warn");
    }

    let result = BaniqConfig::load(&path).await;

    // SAFETY: test cleanup
    unsafe {
        env::remove_var("BANIQ_GENERAL_LOG_LEVEL");
    }

    let mut config = result.expect("config should load");
    assert_eq!(config.general.log_level, "warn", "env beats file");

    let cli = DaemonCli::parse_from([
        "baniq-daemon",
        "--log-level",
        "trace",
        "--log-format",
        "json",
        "--pid-file",
        "/tmp/cli.pid",
    ]);
    cli.apply_overrides(&mut config);

    assert_eq!(config.general.log_level, "trace");
    assert_eq!(config.general.log_format, "json");
    assert_eq!(config.general.pid_file, "/tmp/cli.pid");
    config.validate().expect("overridden config should validate");
}

#[test]
fn test_invalid_cli_log_level_fails_validation() {
    let mut config = BaniqConfig::default();
    let cli = DaemonCli::parse_from(["baniq-daemon", "--log-level", "loud"]);
    cli.apply_overrides(&mut config);

    let err = config.validate().unwrap_err().to_string();
    assert!(err.contains("log_level"), "got: {err}");
}

#[test]
fn test_jail_manager_config_from_core() {
    let config = BaniqConfig::parse(FULL_CONFIG).expect("should parse");
    let jail_config = JailManagerConfig::from_core(&config);

    assert_eq!(jail_config.docker_socket, "/run/docker.sock");
    assert_eq!(jail_config.jail_dir, PathBuf::from("/srv/fail2ban/jail.d"));
    assert_eq!(jail_config.filter_dir, PathBuf::from("/srv/fail2ban/filter.d"));
    assert_eq!(jail_config.client_path, "/usr/bin/fail2ban-client");
    assert_eq!(jail_config.reload_timeout_secs, 10);
    assert_eq!(jail_config.reload_retries, 2);
    jail_config.validate().expect("derived config should validate");
}

#[test]
fn test_example_config_is_valid() {
    let content = include_str!("../../baniq.toml.example");
    let config = BaniqConfig::parse(content).expect("example config should parse");
    config.validate().expect("example config should validate");

    let round_trip = toml::to_string(&config).expect("config should serialize");
    let reparsed = BaniqConfig::parse(&round_trip).expect("serialized config should parse");
    assert_eq!(reparsed.fail2ban.jail_dir, config.fail2ban.jail_dir);
    assert_eq!(reparsed.general.pid_file, config.general.pid_file);
}
