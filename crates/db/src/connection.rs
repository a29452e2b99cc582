use std::time::Duration;

use sqlx::sqlite::SqlitePoolOptions;

pub type DbPool = sqlx::SqlitePool;

/// Pool sizing and lock-wait behavior, lifted from the `[database]` config
/// section.
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct PoolSettings {
    pub max_connections: u32,
    pub acquire_timeout: Duration,
    pub busy_timeout: Duration,
}

impl Default for PoolSettings {
    fn default() -> Self {
        Self::new(5, 30)
    }
}

impl PoolSettings {
    /// Maps config integers onto pool settings. The sqlite busy handler
    /// never waits longer than the acquire timeout, capped at five seconds
    /// so one wedged writer cannot stall every reader for the full acquire
    /// window.
    pub fn new(max_connections: u32, timeout_secs: u64) -> Self {
        let acquire_timeout = Duration::from_secs(timeout_secs.max(1));
        Self {
            max_connections: max_connections.max(1),
            acquire_timeout,
            busy_timeout: acquire_timeout.min(Duration::from_secs(5)),
        }
    }
}

pub async fn connect(database_url: &str) -> Result<DbPool, sqlx::Error> {
    connect_with_settings(database_url, PoolSettings::default()).await
}

pub async fn connect_with_settings(
    database_url: &str,
    settings: PoolSettings,
) -> Result<DbPool, sqlx::Error> {
    let busy_timeout_ms = settings.busy_timeout.as_millis();
    SqlitePoolOptions::new()
        .max_connections(settings.max_connections)
        .acquire_timeout(settings.acquire_timeout)
        .after_connect(move |conn, _meta| {
            Box::pin(async move {
                sqlx::query("PRAGMA foreign_keys = ON").execute(&mut *conn).await?;
                sqlx::query("PRAGMA journal_mode = WAL").execute(&mut *conn).await?;
                sqlx::query(&format!("PRAGMA busy_timeout = {busy_timeout_ms}"))
                    .execute(&mut *conn)
                    .await?;
                Ok(())
            })
        })
        .connect(database_url)
        .await
}
