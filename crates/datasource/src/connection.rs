use crate::error::DataSourceError;
use dotenvy::dotenv;
use sqlx::{PgPool, postgres::PgPoolOptions};
use std::env;
use std::time::Duration;

/// Establishes a connection pool to the PostgreSQL data store.
///
/// Reads `DATABASE_URL` from the environment (loading a `.env` file when one
/// is present) and returns a pool that can be shared across the whole
/// application.
pub async fn connect() -> Result<PgPool, DataSourceError> {
    // A missing .env file is fine; the variable may come from the real
    // environment.
    let _ = dotenv();

    let database_url = env::var("DATABASE_URL").map_err(|_e| {
        DataSourceError::ConnectionConfigError("DATABASE_URL must be set.".to_string())
    })?;

    let pool = PgPoolOptions::new()
        .max_connections(10)
        .acquire_timeout(Duration::from_secs(5))
        .connect(&database_url)
        .await?;

    Ok(pool)
}
