//! Database connection pool management.

use anyhow::{Context, Result};
use sqlx::postgres::{PgPool, PgPoolOptions};

use crate::config::Config;

/// Pool settings for list queries.
///
/// Acquire waits keep the sqlx default; the statement timeout is applied per
/// transaction by the store.
fn pool_options(config: &Config) -> PgPoolOptions {
    PgPoolOptions::new().max_connections(config.database_max_connections)
}

/// Create a PostgreSQL connection pool sized for list queries.
pub async fn create_pool(config: &Config) -> Result<PgPool> {
    let pool = pool_options(config)
        .connect(&config.database_url)
        .await
        .context("failed to connect to PostgreSQL")?;

    tracing::info!(
        max_connections = config.database_max_connections,
        "database pool ready"
    );
    Ok(pool)
}

/// Round trip to the server, returning its version string.
pub async fn server_version(pool: &PgPool) -> Result<String> {
    sqlx::query_scalar("SHOW server_version")
        .fetch_one(pool)
        .await
        .context("database health check failed")
}

#[cfg(test)]
mod tests {
    use std::time::Duration;

    use super::*;

    #[test]
    fn statement_timeout_does_not_bound_pool_acquire() {
        let config = Config {
            database_url: "postgres://localhost/quarry".to_string(),
            database_max_connections: 4,
            statement_timeout: Duration::from_millis(250),
        };
        let options = pool_options(&config);

        assert_eq!(options.get_max_connections(), 4);
        assert_eq!(
            options.get_acquire_timeout(),
            PgPoolOptions::new().get_acquire_timeout()
        );
        assert_ne!(options.get_acquire_timeout(), config.statement_timeout);
    }
}
