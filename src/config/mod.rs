// Configuration management module
// This module handles TOML configuration management and settings

pub mod settings;

pub use settings::{
    Config, ConfigError, EmbeddingFailure, GeminiConfig, IngestConfig, RetrievalConfig,
    RetryConfig,
};

/// Get the default configuration directory path
#[inline]
pub fn get_config_dir() -> Result<std::path::PathBuf, ConfigError> {
    dirs::config_dir()
        .map(|dir| dir.join("kb-rag"))
        .ok_or(ConfigError::DirectoryError)
}
