use thiserror::Error;

#[derive(Error, Debug, Clone, PartialEq)]
pub enum TimeRangeError {
    #[error("Invalid custom range: start {start} is after end {end}")]
    InvalidCustomRange {
        start: chrono::DateTime<chrono::Utc>,
        end: chrono::DateTime<chrono::Utc>,
    },
}
