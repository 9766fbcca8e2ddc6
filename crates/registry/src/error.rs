use thiserror::Error;

#[derive(Error, Debug, Clone, PartialEq)]
pub enum RegistryError {
    #[error("Duplicate metric id '{0}' in catalog")]
    DuplicateMetric(String),

    #[error("Metric '{metric}' has an invalid composite expression: {source}")]
    InvalidExpression {
        metric: String,
        source: core_types::CoreError,
    },

    #[error("Metric '{metric}' declares unknown dependency '{dependency}'")]
    UnknownDependency { metric: String, dependency: String },
}

/// The outcome of walking every registered metric's declared dependencies.
#[derive(Debug, Clone, PartialEq)]
pub struct ValidationReport {
    pub valid: bool,
    pub errors: Vec<RegistryError>,
}
