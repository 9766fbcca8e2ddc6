use crate::error::ConfigError;
use serde::Deserialize;

/// The root configuration structure for the application.
#[derive(Debug, Clone, Deserialize, Default)]
pub struct Settings {
    #[serde(default)]
    pub engine: EngineSettings,
}

/// Tuning knobs for the query engine.
#[derive(Debug, Clone, Deserialize)]
#[serde(default)]
pub struct EngineSettings {
    /// Upper bound on concurrent data-source calls within one query. Keeps a
    /// query with many metrics from exhausting the shared connection pool.
    pub max_concurrent_fetches: usize,
    /// Default deadline applied by the CLI when the caller does not pass one.
    pub query_timeout_secs: u64,
}

impl Default for EngineSettings {
    fn default() -> Self {
        Self {
            max_concurrent_fetches: 8,
            query_timeout_secs: 30,
        }
    }
}

impl Settings {
    pub fn validate(&self) -> Result<(), ConfigError> {
        if self.engine.max_concurrent_fetches == 0 {
            return Err(ConfigError::ValidationError(
                "engine.max_concurrent_fetches must be at least 1".to_string(),
            ));
        }
        if self.engine.query_timeout_secs == 0 {
            return Err(ConfigError::ValidationError(
                "engine.query_timeout_secs must be at least 1".to_string(),
            ));
        }
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn defaults_are_valid() {
        assert!(Settings::default().validate().is_ok());
    }

    #[test]
    fn zero_concurrency_is_rejected() {
        let settings = Settings {
            engine: EngineSettings {
                max_concurrent_fetches: 0,
                ..EngineSettings::default()
            },
        };
        assert!(settings.validate().is_err());
    }
}
