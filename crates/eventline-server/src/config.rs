//! Server configuration loading from file and environment variables.

use std::net::{IpAddr, Ipv4Addr};
use std::time::Duration;

use eventline_db::{MigrationContext, StoreSettings};
use eventline_ingest::{AckMode, ConsumerSettings};
use serde::Deserialize;
use thiserror::Error;

/// Top-level server configuration.
#[derive(Debug, Clone, Default, Deserialize)]
pub struct Config {
    #[serde(default)]
    pub server: ServerConfig,

    #[serde(default)]
    pub broker: BrokerConfig,

    #[serde(default)]
    pub clickhouse: ClickHouseConfig,

    #[serde(default)]
    pub ingest: IngestConfig,

    #[serde(default)]
    pub metrics: MetricsConfig,

    #[serde(default)]
    pub consumer: ConsumerConfig,

    #[serde(default)]
    pub logging: LoggingConfig,
}

/// Network configuration for the HTTP server.
#[derive(Debug, Clone, Deserialize)]
pub struct ServerConfig {
    /// Host address to bind to.
    #[serde(default = "default_host")]
    pub host: IpAddr,

    /// Port to listen on.
    #[serde(default = "default_port")]
    pub port: u16,

    /// Largest accepted request body.
    #[serde(default = "default_max_body_bytes")]
    pub max_body_bytes: usize,
}

/// NATS JetStream settings.
#[derive(Debug, Clone, Deserialize)]
pub struct BrokerConfig {
    #[serde(default = "default_broker_url")]
    pub url: String,

    /// Stream that captures `subject`. Created on start-up if missing.
    #[serde(default = "default_stream")]
    pub stream: String,

    #[serde(default = "default_subject")]
    pub subject: String,

    /// How long the client waits for a publish acknowledgement.
    #[serde(default = "default_ack_timeout_ms")]
    pub ack_timeout_ms: u64,

    /// Window in which the stream drops repeated message ids.
    #[serde(default = "default_duplicate_window_secs")]
    pub duplicate_window_secs: u64,

    #[serde(default)]
    pub ack_mode: AckMode,
}

/// Analytical store settings.
#[derive(Debug, Clone, Deserialize)]
pub struct ClickHouseConfig {
    #[serde(default = "default_clickhouse_url")]
    pub url: String,

    #[serde(default = "default_database")]
    pub database: String,

    #[serde(default = "default_user")]
    pub user: String,

    #[serde(default)]
    pub password: String,

    /// Event table queried for metrics.
    #[serde(default = "default_table")]
    pub table: String,

    #[serde(default = "default_max_execution_time_secs")]
    pub max_execution_time_secs: u64,
}

/// Write path limits.
#[derive(Debug, Clone, Deserialize)]
pub struct IngestConfig {
    /// Most events accepted by one bulk request.
    #[serde(default = "default_max_batch_size")]
    pub max_batch_size: usize,

    #[serde(default = "default_publish_deadline_ms")]
    pub publish_deadline_ms: u64,
}

/// Read path limits.
#[derive(Debug, Clone, Deserialize)]
pub struct MetricsConfig {
    #[serde(default = "default_query_deadline_ms")]
    pub query_deadline_ms: u64,
}

/// Durable consumer that moves events from the stream into the store.
#[derive(Debug, Clone, Deserialize)]
pub struct ConsumerConfig {
    /// Run the consumer in this process. Disable when a separate instance
    /// owns the store writes; instances sharing a durable name split the load.
    #[serde(default = "default_consumer_enabled")]
    pub enabled: bool,

    #[serde(default = "default_durable_name")]
    pub durable_name: String,

    #[serde(default = "default_consumer_batch_size")]
    pub batch_size: usize,

    #[serde(default = "default_consumer_max_wait_ms")]
    pub max_wait_ms: u64,

    /// Delay before a batch the store refused is redelivered.
    #[serde(default = "default_consumer_retry_delay_ms")]
    pub retry_delay_ms: u64,

    #[serde(default = "default_consumer_ack_wait_secs")]
    pub ack_wait_secs: u64,
}

/// Logging configuration.
#[derive(Debug, Clone, Deserialize)]
pub struct LoggingConfig {
    /// Log level filter (e.g., "info", "debug", "eventline_server=debug,info").
    #[serde(default = "default_log_level")]
    pub level: String,

    /// Whether to output logs in JSON format.
    #[serde(default)]
    pub json: bool,
}

fn default_host() -> IpAddr {
    IpAddr::V4(Ipv4Addr::new(127, 0, 0, 1))
}

fn default_port() -> u16 {
    8080
}

fn default_max_body_bytes() -> usize {
    2 * 1024 * 1024
}

fn default_broker_url() -> String {
    "nats://localhost:4222".to_string()
}

fn default_stream() -> String {
    "EVENTS".to_string()
}

fn default_subject() -> String {
    "events".to_string()
}

fn default_ack_timeout_ms() -> u64 {
    5_000
}

fn default_duplicate_window_secs() -> u64 {
    120
}

fn default_clickhouse_url() -> String {
    "http://localhost:8123".to_string()
}

fn default_database() -> String {
    "events_db".to_string()
}

fn default_user() -> String {
    "default".to_string()
}

fn default_table() -> String {
    "events".to_string()
}

fn default_max_execution_time_secs() -> u64 {
    60
}

fn default_max_batch_size() -> usize {
    1_000
}

fn default_publish_deadline_ms() -> u64 {
    10_000
}

fn default_query_deadline_ms() -> u64 {
    30_000
}

fn default_consumer_enabled() -> bool {
    true
}

fn default_durable_name() -> String {
    "eventline-store".to_string()
}

fn default_consumer_batch_size() -> usize {
    500
}

fn default_consumer_max_wait_ms() -> u64 {
    1_000
}

fn default_consumer_retry_delay_ms() -> u64 {
    5_000
}

fn default_consumer_ack_wait_secs() -> u64 {
    30
}

fn default_log_level() -> String {
    "info".to_string()
}

impl Default for ServerConfig {
    fn default() -> Self {
        Self {
            host: default_host(),
            port: default_port(),
            max_body_bytes: default_max_body_bytes(),
        }
    }
}

impl Default for BrokerConfig {
    fn default() -> Self {
        Self {
            url: default_broker_url(),
            stream: default_stream(),
            subject: default_subject(),
            ack_timeout_ms: default_ack_timeout_ms(),
            duplicate_window_secs: default_duplicate_window_secs(),
            ack_mode: AckMode::default(),
        }
    }
}

impl Default for ClickHouseConfig {
    fn default() -> Self {
        Self {
            url: default_clickhouse_url(),
            database: default_database(),
            user: default_user(),
            password: String::new(),
            table: default_table(),
            max_execution_time_secs: default_max_execution_time_secs(),
        }
    }
}

impl Default for IngestConfig {
    fn default() -> Self {
        Self {
            max_batch_size: default_max_batch_size(),
            publish_deadline_ms: default_publish_deadline_ms(),
        }
    }
}

impl Default for MetricsConfig {
    fn default() -> Self {
        Self {
            query_deadline_ms: default_query_deadline_ms(),
        }
    }
}

impl Default for ConsumerConfig {
    fn default() -> Self {
        Self {
            enabled: default_consumer_enabled(),
            durable_name: default_durable_name(),
            batch_size: default_consumer_batch_size(),
            max_wait_ms: default_consumer_max_wait_ms(),
            retry_delay_ms: default_consumer_retry_delay_ms(),
            ack_wait_secs: default_consumer_ack_wait_secs(),
        }
    }
}

impl Default for LoggingConfig {
    fn default() -> Self {
        Self {
            level: default_log_level(),
            json: false,
        }
    }
}

impl BrokerConfig {
    pub fn ack_timeout(&self) -> Duration {
        Duration::from_millis(self.ack_timeout_ms)
    }

    pub fn duplicate_window(&self) -> Duration {
        Duration::from_secs(self.duplicate_window_secs)
    }
}

impl ClickHouseConfig {
    pub fn store_settings(&self) -> StoreSettings {
        StoreSettings {
            url: self.url.clone(),
            database: self.database.clone(),
            user: self.user.clone(),
            password: self.password.clone(),
            max_execution_time_secs: self.max_execution_time_secs,
        }
    }
}

impl IngestConfig {
    pub fn publish_deadline(&self) -> Duration {
        Duration::from_millis(self.publish_deadline_ms)
    }
}

impl MetricsConfig {
    pub fn query_deadline(&self) -> Duration {
        Duration::from_millis(self.query_deadline_ms)
    }
}

impl ConsumerConfig {
    pub fn settings(&self) -> ConsumerSettings {
        ConsumerSettings {
            durable_name: self.durable_name.clone(),
            batch_size: self.batch_size,
            max_wait: Duration::from_millis(self.max_wait_ms),
            retry_delay: Duration::from_millis(self.retry_delay_ms),
            ack_wait: Duration::from_secs(self.ack_wait_secs),
        }
    }
}

impl Config {
    /// Names the migrations substitute into their templates.
    pub fn migration_context(&self) -> MigrationContext {
        MigrationContext {
            table: self.clickhouse.table.clone(),
        }
    }
}

/// Errors that can occur when loading configuration.
#[derive(Debug, Error)]
pub enum ConfigError {
    /// Failed to read the configuration file.
    #[error("failed to read config file: {0}")]
    FileRead(#[from] std::io::Error),

    /// Failed to parse the configuration file.
    #[error("failed to parse config file: {0}")]
    Parse(#[from] toml::de::Error),
}

/// Loads configuration from a TOML file, falling back to defaults.
///
/// Environment variable overrides:
/// - `EVENTLINE_HOST` / `EVENTLINE_PORT` override `server.host` / `server.port`
/// - `EVENTLINE_BROKER_URL`, `EVENTLINE_BROKER_STREAM`,
///   `EVENTLINE_BROKER_SUBJECT` and `EVENTLINE_BROKER_ACK_MODE` override the
///   matching `broker` keys
/// - `EVENTLINE_CLICKHOUSE_URL`, `EVENTLINE_CLICKHOUSE_DATABASE`,
///   `EVENTLINE_CLICKHOUSE_USER` and `EVENTLINE_CLICKHOUSE_PASSWORD` override
///   the matching `clickhouse` keys
/// - `EVENTLINE_CONSUMER_ENABLED` overrides `consumer.enabled`
/// - `EVENTLINE_LOG_LEVEL` overrides `logging.level`
/// - `EVENTLINE_LOG_JSON` overrides `logging.json` (set to "true" to enable)
///
/// Values that fail to parse are ignored.
///
/// # Errors
///
/// Returns `ConfigError` if the file exists but cannot be read or parsed.
pub fn load_config(path: Option<&str>) -> Result<Config, ConfigError> {
    let mut config = match path {
        Some(p) => match std::fs::read_to_string(p) {
            Ok(contents) => toml::from_str(&contents)?,
            Err(e) if e.kind() == std::io::ErrorKind::NotFound => {
                tracing::info!(path = p, "config file not found, using defaults");
                Config::default()
            }
            Err(e) => return Err(ConfigError::FileRead(e)),
        },
        None => Config::default(),
    };

    apply_overrides(&mut config, |key| std::env::var(key).ok());
    Ok(config)
}

/// Applies overrides from `lookup`, keyed by environment variable name.
pub fn apply_overrides<F>(config: &mut Config, lookup: F)
where
    F: Fn(&str) -> Option<String>,
{
    if let Some(host) = lookup("EVENTLINE_HOST") {
        if let Ok(parsed) = host.parse() {
            config.server.host = parsed;
        }
    }
    if let Some(port) = lookup("EVENTLINE_PORT") {
        if let Ok(parsed) = port.parse() {
            config.server.port = parsed;
        }
    }

    if let Some(url) = lookup("EVENTLINE_BROKER_URL") {
        config.broker.url = url;
    }
    if let Some(stream) = lookup("EVENTLINE_BROKER_STREAM") {
        config.broker.stream = stream;
    }
    if let Some(subject) = lookup("EVENTLINE_BROKER_SUBJECT") {
        config.broker.subject = subject;
    }
    if let Some(mode) = lookup("EVENTLINE_BROKER_ACK_MODE") {
        match mode.parse() {
            Ok(parsed) => config.broker.ack_mode = parsed,
            Err(e) => tracing::warn!("ignoring EVENTLINE_BROKER_ACK_MODE: {}", e),
        }
    }

    if let Some(url) = lookup("EVENTLINE_CLICKHOUSE_URL") {
        config.clickhouse.url = url;
    }
    if let Some(database) = lookup("EVENTLINE_CLICKHOUSE_DATABASE") {
        config.clickhouse.database = database;
    }
    if let Some(user) = lookup("EVENTLINE_CLICKHOUSE_USER") {
        config.clickhouse.user = user;
    }
    if let Some(password) = lookup("EVENTLINE_CLICKHOUSE_PASSWORD") {
        config.clickhouse.password = password;
    }

    if let Some(enabled) = lookup("EVENTLINE_CONSUMER_ENABLED") {
        match enabled.parse() {
            Ok(parsed) => config.consumer.enabled = parsed,
            Err(e) => tracing::warn!("ignoring EVENTLINE_CONSUMER_ENABLED: {}", e),
        }
    }

    if let Some(level) = lookup("EVENTLINE_LOG_LEVEL") {
        config.logging.level = level;
    }
    if let Some(json) = lookup("EVENTLINE_LOG_JSON") {
        config.logging.json = json == "true" || json == "1";
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::collections::HashMap;
    use std::io::Write;

    fn no_env(_: &str) -> Option<String> {
        None
    }

    #[test]
    fn defaults_cover_every_section() {
        let config = Config::default();
        assert_eq!(config.server.host, IpAddr::V4(Ipv4Addr::LOCALHOST));
        assert_eq!(config.server.port, 8080);
        assert_eq!(config.server.max_body_bytes, 2 * 1024 * 1024);
        assert_eq!(config.broker.url, "nats://localhost:4222");
        assert_eq!(config.broker.stream, "EVENTS");
        assert_eq!(config.broker.subject, "events");
        assert_eq!(config.broker.ack_mode, AckMode::Acknowledged);
        assert_eq!(config.broker.duplicate_window(), Duration::from_secs(120));
        assert_eq!(config.clickhouse.database, "events_db");
        assert_eq!(config.clickhouse.table, "events");
        assert_eq!(config.ingest.max_batch_size, 1_000);
        assert_eq!(config.ingest.publish_deadline(), Duration::from_secs(10));
        assert_eq!(config.metrics.query_deadline(), Duration::from_secs(30));
        assert!(config.consumer.enabled);
        assert_eq!(config.consumer.settings(), ConsumerSettings::default());
        assert_eq!(config.logging.level, "info");
        assert!(!config.logging.json);
    }

    #[test]
    fn missing_file_falls_back_to_defaults() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("absent.toml");
        let config = load_config(path.to_str()).unwrap();
        assert_eq!(config.clickhouse.user, "default");
    }

    #[test]
    fn partial_file_keeps_defaults_for_the_rest() {
        let mut file = tempfile::NamedTempFile::new().unwrap();
        writeln!(
            file,
            r#"
[server]
port = 9090

[broker]
subject = "ingest.events"
ack_mode = "fire_and_forget"

[clickhouse]
table = "analytics_events"
"#
        )
        .unwrap();

        let config = load_config(file.path().to_str()).unwrap();
        assert_eq!(config.server.port, 9090);
        assert_eq!(config.server.host, IpAddr::V4(Ipv4Addr::LOCALHOST));
        assert_eq!(config.broker.subject, "ingest.events");
        assert_eq!(config.broker.stream, "EVENTS");
        assert_eq!(config.broker.ack_mode, AckMode::FireAndForget);
        assert_eq!(config.clickhouse.table, "analytics_events");
        assert_eq!(config.clickhouse.database, "events_db");
        assert_eq!(config.migration_context().table, "analytics_events");
    }

    #[test]
    fn consumer_section_maps_to_settings() {
        let mut file = tempfile::NamedTempFile::new().unwrap();
        writeln!(
            file,
            r#"
[consumer]
durable_name = "store-writer"
batch_size = 50
retry_delay_ms = 250
"#
        )
        .unwrap();

        let config = load_config(file.path().to_str()).unwrap();
        let settings = config.consumer.settings();
        assert_eq!(settings.durable_name, "store-writer");
        assert_eq!(settings.batch_size, 50);
        assert_eq!(settings.retry_delay, Duration::from_millis(250));
        assert_eq!(settings.max_wait, Duration::from_secs(1));
        assert_eq!(settings.ack_wait, Duration::from_secs(30));
    }

    #[test]
    fn malformed_file_is_an_error() {
        let mut file = tempfile::NamedTempFile::new().unwrap();
        writeln!(file, "[server]\nport = \"not a number\"").unwrap();
        assert!(matches!(
            load_config(file.path().to_str()),
            Err(ConfigError::Parse(_))
        ));
    }

    #[test]
    fn env_overrides_replace_file_values() {
        let env: HashMap<&str, &str> = HashMap::from([
            ("EVENTLINE_PORT", "7070"),
            ("EVENTLINE_BROKER_URL", "nats://broker:4222"),
            ("EVENTLINE_BROKER_ACK_MODE", "fire_and_forget"),
            ("EVENTLINE_CLICKHOUSE_PASSWORD", "secret"),
            ("EVENTLINE_CONSUMER_ENABLED", "false"),
            ("EVENTLINE_LOG_JSON", "1"),
        ]);
        let mut config = Config::default();
        apply_overrides(&mut config, |key| env.get(key).map(|v| v.to_string()));

        assert_eq!(config.server.port, 7070);
        assert_eq!(config.broker.url, "nats://broker:4222");
        assert_eq!(config.broker.ack_mode, AckMode::FireAndForget);
        assert_eq!(config.clickhouse.password, "secret");
        assert!(!config.consumer.enabled);
        assert!(config.logging.json);
    }

    #[test]
    fn unparseable_overrides_are_ignored() {
        let env: HashMap<&str, &str> = HashMap::from([
            ("EVENTLINE_PORT", "eighty"),
            ("EVENTLINE_HOST", "not-an-ip"),
            ("EVENTLINE_BROKER_ACK_MODE", "sometimes"),
        ]);
        let mut config = Config::default();
        apply_overrides(&mut config, |key| env.get(key).map(|v| v.to_string()));

        assert_eq!(config.server.port, 8080);
        assert_eq!(config.server.host, IpAddr::V4(Ipv4Addr::LOCALHOST));
        assert_eq!(config.broker.ack_mode, AckMode::Acknowledged);
    }

    #[test]
    fn no_overrides_leave_defaults() {
        let mut config = Config::default();
        apply_overrides(&mut config, no_env);
        assert_eq!(config.broker.url, default_broker_url());
    }
}
