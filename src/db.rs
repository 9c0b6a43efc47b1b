use sqlx::postgres::{PgPool, PgPoolOptions};
use std::future::Future;
use std::time::Duration;
use tokio::time::timeout;

use crate::auth::AuthError;
use crate::config::DatabaseConfig;

/// Type alias for the PostgreSQL connection pool
pub type DbPool = PgPool;

/// Creates and configures a PostgreSQL connection pool
///
/// # Arguments
/// * `config` - Database settings (connection fields, pool size, acquire timeout)
///
/// # Returns
/// * `Result<DbPool>` - Configured connection pool or error
pub async fn create_pool(config: &DatabaseConfig) -> Result<DbPool, sqlx::Error> {
    tracing::debug!("Creating database connection pool");

    let options = config
        .connect_options()
        .map_err(|e| sqlx::Error::Configuration(Box::new(e)))?;

    let pool = PgPoolOptions::new()
        .max_connections(config.max_connections)
        .acquire_timeout(config.acquire_timeout())
        .connect_with(options)
        .await?;

    tracing::info!("Database connection pool created successfully");
    Ok(pool)
}

/// Run embedded migrations
pub async fn run_migrations(pool: &DbPool) -> Result<(), sqlx::migrate::MigrateError> {
    sqlx::migrate!("./migrations").run(pool).await
}

/// Bound a store operation by a deadline
///
/// A breach surfaces as `AuthError::Timeout` instead of hanging the request.
pub async fn with_deadline<F, T, E>(deadline: Duration, operation: F) -> Result<T, AuthError>
where
    F: Future<Output = Result<T, E>>,
    E: Into<AuthError>,
{
    match timeout(deadline, operation).await {
        Ok(result) => result.map_err(Into::into),
        Err(_) => {
            tracing::error!("Store operation exceeded deadline of {:?}", deadline);
            Err(AuthError::Timeout(deadline))
        }
    }
}
