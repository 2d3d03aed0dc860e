/// Database connection and schema creation
pub mod database;

/// Reference data loading from config.toml
pub mod seed;

/// Runtime settings from environment variables
pub mod settings;

pub use settings::Settings;
