use thiserror::Error;

#[derive(Error, Debug, Clone, PartialEq)]
pub enum CoreError {
    #[error("Invalid composite expression '{0}': {1}")]
    InvalidExpression(String, String),

    #[error("Invalid input for {0}: {1}")]
    InvalidInput(String, String),
}
