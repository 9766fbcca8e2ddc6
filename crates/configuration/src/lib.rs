use crate::error::ConfigError;

// Declare the modules that make up this crate.
pub mod error;
pub mod settings;

// Re-export the core types to provide a clean public API.
pub use settings::{EngineSettings, Settings};

/// Loads the application configuration from the `meridian.toml` file.
///
/// The file is optional: when it is absent every setting falls back to its
/// default, so the binary runs without any configuration on disk.
pub fn load_config() -> Result<Settings, ConfigError> {
    let builder = config::Config::builder()
        // Tells the builder to look for a file named `meridian.toml`.
        .add_source(config::File::with_name("meridian").required(false))
        // Environment variables win over the file, e.g. MERIDIAN_ENGINE__MAX_CONCURRENT_FETCHES.
        .add_source(config::Environment::with_prefix("MERIDIAN").separator("__"))
        .build()?;

    let settings = builder.try_deserialize::<Settings>()?;

    settings.validate()?;
    Ok(settings)
}
