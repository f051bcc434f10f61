//! Tests for appy.toml discovery and environment overrides.

use appy_config::{ConfigDiscovery, ConfigError};
use serial_test::serial;
use std::fs;
use tempfile::TempDir;

#[test]
#[serial]
fn load_without_file_uses_defaults() {
    let temp = TempDir::new().unwrap();
    let discovery = ConfigDiscovery::new(temp.path());

    assert!(discovery.find().is_none());
    let config = discovery.load().unwrap();
    assert_eq!(config.http.port, 3000);
}

#[test]
#[serial]
fn load_merges_toml_file() {
    let temp = TempDir::new().unwrap();
    fs::write(
        temp.path().join("appy.toml"),
        r#"
[http]
port = 8080
ssl_enabled = true

[process]
api_command = ["cargo", "run"]

[[routes]]
method = "GET"
path = "/"

[[routes]]
method = "POST"
path = "/graphql"
"#,
    )
    .unwrap();

    let config = ConfigDiscovery::new(temp.path()).load().unwrap();
    assert_eq!(config.http.port, 8080);
    assert!(config.http.ssl_enabled);
    assert_eq!(config.http.host, "0.0.0.0");
    assert_eq!(config.process.api_command, ["cargo", "run"]);
    assert_eq!(config.process.web_command, ["npm", "start"]);
    assert_eq!(config.ssr_routes(), "/");
}

#[test]
#[serial]
fn environment_overrides_file() {
    let temp = TempDir::new().unwrap();
    fs::write(temp.path().join("appy.toml"), "[http]\nport = 8080\n").unwrap();

    unsafe {
        std::env::set_var("APPY_HTTP__PORT", "9090");
    }
    let config = ConfigDiscovery::new(temp.path()).load();
    unsafe {
        std::env::remove_var("APPY_HTTP__PORT");
    }

    assert_eq!(config.unwrap().http.port, 9090);
}

#[test]
#[serial]
fn invalid_value_names_the_field() {
    let temp = TempDir::new().unwrap();
    fs::write(temp.path().join("appy.toml"), "[http]\nport = \"not a port\"\n").unwrap();

    let err = ConfigDiscovery::new(temp.path()).load().unwrap_err();
    match err {
        ConfigError::InvalidValue { field, .. } => assert_eq!(field, "port"),
        other => panic!("unexpected error: {other}"),
    }
}
