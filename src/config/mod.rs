/// Database connection and table bootstrap
pub mod database;

/// Application settings loaded from config.toml
pub mod settings;
