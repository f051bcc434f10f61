//! Development orchestrator configuration types.

use serde::{Deserialize, Serialize};
use std::path::{Path, PathBuf};
use std::time::Duration;

use crate::error::{ConfigError, Result};

#[derive(Debug, Clone, Default, Serialize, Deserialize, PartialEq)]
pub struct DevConfig {
    #[serde(default)]
    pub http: HttpConfig,

    #[serde(default)]
    pub live_reload: LiveReloadConfig,

    #[serde(default)]
    pub watch: WatchConfig,

    #[serde(default)]
    pub process: ProcessConfig,

    #[serde(default)]
    pub generator: GeneratorSettings,

    /// Server routes; GET routes are handed to the dev server for pre-rendering.
    #[serde(default)]
    pub routes: Vec<RouteConfig>,
}

#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct HttpConfig {
    #[serde(default = "default_host")]
    pub host: String,

    #[serde(default = "default_port")]
    pub port: u16,

    #[serde(default = "default_ssl_port")]
    pub ssl_port: u16,

    #[serde(default)]
    pub ssl_enabled: bool,

    #[serde(default = "default_ssl_cert_path")]
    pub ssl_cert_path: PathBuf,
}

impl Default for HttpConfig {
    fn default() -> Self {
        Self {
            host: default_host(),
            port: default_port(),
            ssl_port: default_ssl_port(),
            ssl_enabled: false,
            ssl_cert_path: default_ssl_cert_path(),
        }
    }
}

impl HttpConfig {
    pub fn cert_file(&self) -> PathBuf {
        self.ssl_cert_path.join("cert.pem")
    }

    pub fn key_file(&self) -> PathBuf {
        self.ssl_cert_path.join("key.pem")
    }

    /// Whether both PEM files exist, resolving relative paths against `root`.
    pub fn ssl_certs_exist(&self, root: &Path) -> bool {
        root.join(self.cert_file()).is_file() && root.join(self.key_file()).is_file()
    }
}

#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct LiveReloadConfig {
    #[serde(default = "default_reload_path")]
    pub path: String,

    #[serde(default = "default_ws_port")]
    pub ws_port: u16,

    #[serde(default = "default_wss_port")]
    pub wss_port: u16,

    /// Wait between starting an API restart and telling browsers to reload.
    #[serde(default = "default_reload_delay_ms")]
    pub delay_ms: u64,
}

impl Default for LiveReloadConfig {
    fn default() -> Self {
        Self {
            path: default_reload_path(),
            ws_port: default_ws_port(),
            wss_port: default_wss_port(),
            delay_ms: default_reload_delay_ms(),
        }
    }
}

impl LiveReloadConfig {
    pub fn delay(&self) -> Duration {
        Duration::from_millis(self.delay_ms)
    }
}

#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct WatchConfig {
    #[serde(default = "default_watch_paths")]
    pub paths: Vec<PathBuf>,

    #[serde(default = "default_extensions")]
    pub extensions: Vec<String>,

    #[serde(default = "default_poll_interval_ms")]
    pub poll_interval_ms: u64,

    /// Events kept per poll interval; older ones are dropped.
    #[serde(default = "default_max_events")]
    pub max_events: usize,
}

impl Default for WatchConfig {
    fn default() -> Self {
        Self {
            paths: default_watch_paths(),
            extensions: default_extensions(),
            poll_interval_ms: default_poll_interval_ms(),
            max_events: default_max_events(),
        }
    }
}

impl WatchConfig {
    pub fn poll_interval(&self) -> Duration {
        Duration::from_millis(self.poll_interval_ms)
    }

    /// Watch paths anchored at `root`.
    pub fn resolve_paths(&self, root: &Path) -> Vec<PathBuf> {
        self.paths
            .iter()
            .map(|p| if p.is_absolute() { p.clone() } else { root.join(p) })
            .collect()
    }
}

#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct ProcessConfig {
    #[serde(default = "default_api_command")]
    pub api_command: Vec<String>,

    #[serde(default = "default_web_command")]
    pub web_command: Vec<String>,

    #[serde(default = "default_settle_delay_ms")]
    pub settle_delay_ms: u64,

    /// Grace period between killing both processes and reporting a fatal error.
    #[serde(default = "default_fatal_delay_ms")]
    pub fatal_delay_ms: u64,
}

impl Default for ProcessConfig {
    fn default() -> Self {
        Self {
            api_command: default_api_command(),
            web_command: default_web_command(),
            settle_delay_ms: default_settle_delay_ms(),
            fatal_delay_ms: default_fatal_delay_ms(),
        }
    }
}

impl ProcessConfig {
    pub fn settle_delay(&self) -> Duration {
        Duration::from_millis(self.settle_delay_ms)
    }

    pub fn fatal_delay(&self) -> Duration {
        Duration::from_millis(self.fatal_delay_ms)
    }
}

#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct GeneratorSettings {
    #[serde(default = "default_generator_config_path")]
    pub config_path: PathBuf,

    #[serde(default = "default_generator_command")]
    pub command: Vec<String>,

    /// Path substrings that mark a schema file.
    #[serde(default = "default_schema_markers")]
    pub schema_markers: Vec<String>,
}

impl Default for GeneratorSettings {
    fn default() -> Self {
        Self {
            config_path: default_generator_config_path(),
            command: default_generator_command(),
            schema_markers: default_schema_markers(),
        }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
pub struct RouteConfig {
    #[serde(default = "default_method")]
    pub method: String,
    pub path: String,
}

impl DevConfig {
    /// Check the configuration, returning every problem found.
    pub fn validate(&self) -> Result<()> {
        let mut errors = Vec::new();

        if self.process.api_command.is_empty() {
            errors.push("process.api_command must not be empty".to_string());
        }
        if self.process.web_command.is_empty() {
            errors.push("process.web_command must not be empty".to_string());
        }
        if self.watch.poll_interval_ms == 0 {
            errors.push("watch.poll_interval_ms must be greater than 0".to_string());
        }
        if self.watch.max_events == 0 {
            errors.push("watch.max_events must be greater than 0".to_string());
        }
        if !self.live_reload.path.starts_with('/') {
            errors.push(format!(
                "live_reload.path '{}' must start with '/'",
                self.live_reload.path
            ));
        }
        if self.live_reload.ws_port == self.live_reload.wss_port {
            errors.push(format!(
                "live_reload.ws_port and live_reload.wss_port must differ (both {})",
                self.live_reload.ws_port
            ));
        }

        if errors.is_empty() {
            Ok(())
        } else {
            Err(ConfigError::Validation(errors))
        }
    }

    /// Comma-joined GET route paths for `APPY_SSR_ROUTES`.
    pub fn ssr_routes(&self) -> String {
        self.routes
            .iter()
            .filter(|r| r.method.eq_ignore_ascii_case("GET"))
            .map(|r| r.path.as_str())
            .collect::<Vec<_>>()
            .join(",")
    }

    /// Extra environment handed to the front-end dev server.
    pub fn web_env(&self) -> Vec<(String, String)> {
        vec![
            ("APPY_SSR_ROUTES".to_string(), self.ssr_routes()),
            ("HTTP_HOST".to_string(), self.http.host.clone()),
            ("HTTP_PORT".to_string(), self.http.port.to_string()),
            ("HTTP_SSL_PORT".to_string(), self.http.ssl_port.to_string()),
            (
                "HTTP_SSL_ENABLED".to_string(),
                self.http.ssl_enabled.to_string(),
            ),
            (
                "HTTP_SSL_CERT_PATH".to_string(),
                self.http.ssl_cert_path.display().to_string(),
            ),
        ]
    }
}

fn default_host() -> String {
    "0.0.0.0".into()
}

fn default_port() -> u16 {
    3000
}

fn default_ssl_port() -> u16 {
    3443
}

fn default_ssl_cert_path() -> PathBuf {
    PathBuf::from("tmp/ssl")
}

fn default_reload_path() -> String {
    "/reload".into()
}

fn default_ws_port() -> u16 {
    12450
}

fn default_wss_port() -> u16 {
    12451
}

fn default_reload_delay_ms() -> u64 {
    4000
}

fn default_watch_paths() -> Vec<PathBuf> {
    ["assets", "cmd", "configs", "db", "pkg", "go.sum", "go.mod", "main.go"]
        .into_iter()
        .map(PathBuf::from)
        .collect()
}

fn default_extensions() -> Vec<String> {
    [
        "development",
        "env",
        "go",
        "gql",
        "graphql",
        "ini",
        "json",
        "html",
        "production",
        "test",
        "toml",
        "txt",
        "yml",
    ]
    .into_iter()
    .map(String::from)
    .collect()
}

fn default_poll_interval_ms() -> u64 {
    1000
}

fn default_max_events() -> usize {
    2
}

fn default_api_command() -> Vec<String> {
    vec!["go".into(), "run".into(), ".".into(), "serve".into()]
}

fn default_web_command() -> Vec<String> {
    vec!["npm".into(), "start".into()]
}

fn default_settle_delay_ms() -> u64 {
    500
}

fn default_fatal_delay_ms() -> u64 {
    1000
}

fn default_generator_config_path() -> PathBuf {
    PathBuf::from("pkg/graphql/config.yml")
}

fn default_generator_command() -> Vec<String> {
    [
        "go",
        "run",
        "github.com/99designs/gqlgen",
        "generate",
        "--config",
        "pkg/graphql/config.yml",
    ]
    .into_iter()
    .map(String::from)
    .collect()
}

fn default_schema_markers() -> Vec<String> {
    vec![
        ".gql".into(),
        ".graphql".into(),
        "pkg/graphql/config.yml".into(),
    ]
}

fn default_method() -> String {
    "GET".into()
}
