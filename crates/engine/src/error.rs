use thiserror::Error;
use timerange::TimeRangeError;

#[derive(Error, Debug, Clone, PartialEq)]
pub enum EngineError {
    #[error("Unknown metric id(s): {}", .0.join(", "))]
    UnknownMetrics(Vec<String>),

    #[error("Cyclic metric dependency: {}", .0.join(" -> "))]
    CyclicDependency(Vec<String>),

    #[error("Query deadline exceeded")]
    DeadlineExceeded,

    #[error("Query cancelled")]
    Cancelled,

    #[error(transparent)]
    TimeRange(#[from] TimeRangeError),
}
