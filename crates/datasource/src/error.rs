use thiserror::Error;

#[derive(Error, Debug)]
pub enum DataSourceError {
    #[error("Failed to load environment variables for database connection: {0}")]
    ConnectionConfigError(String),

    #[error("Data source query failed: {0}")]
    QueryError(#[from] sqlx::Error),

    #[error("Filter on '{field}' carries a value the data source cannot bind")]
    UnsupportedFilterValue { field: String },

    #[error("Table '{0}' is unavailable")]
    TableUnavailable(String),
}
