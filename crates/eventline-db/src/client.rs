//! Client construction.

use clickhouse::Client;

/// Connection settings for the analytical store.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct StoreSettings {
    /// HTTP endpoint, e.g. `http://localhost:8123`.
    pub url: String,
    pub database: String,
    pub user: String,
    pub password: String,
    /// Server-side cap on query runtime, in seconds.
    pub max_execution_time_secs: u64,
}

impl Default for StoreSettings {
    fn default() -> Self {
        Self {
            url: "http://localhost:8123".to_string(),
            database: "events_db".to_string(),
            user: "default".to_string(),
            password: String::new(),
            max_execution_time_secs: 60,
        }
    }
}

fn base_client(settings: &StoreSettings) -> Client {
    Client::default()
        .with_url(&settings.url)
        .with_user(&settings.user)
        .with_password(&settings.password)
        .with_option(
            "max_execution_time",
            settings.max_execution_time_secs.to_string(),
        )
}

/// Creates a client bound to the configured database.
///
/// No connection is made until the first request.
pub fn create_client(settings: &StoreSettings) -> Client {
    base_client(settings).with_database(&settings.database)
}

/// Creates the configured database if it does not exist yet.
///
/// # Errors
///
/// Returns the client error if the server is unreachable or refuses.
pub async fn ensure_database(settings: &StoreSettings) -> Result<(), clickhouse::error::Error> {
    base_client(settings)
        .query(&format!("CREATE DATABASE IF NOT EXISTS {}", settings.database))
        .execute()
        .await
}

/// Round-trips a trivial query.
pub async fn ping(client: &Client) -> Result<(), clickhouse::error::Error> {
    client.query("SELECT 1").execute().await
}
