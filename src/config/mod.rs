//! Configuration module
//!
//! Handles persisted application settings

mod settings;

pub use settings::{
    AppConfig, ConfigError, ConnectionConfig, DisplayConfig, LoggingConfig, PollingConfig,
    TargetConfig,
};

use directories::ProjectDirs;
use std::path::PathBuf;

/// Config file name inside the config directory
pub const CONFIG_FILE: &str = "config.toml";

fn project_dirs() -> Option<ProjectDirs> {
    ProjectDirs::from("com", "weighlink", "Weighlink")
}

/// Get the application configuration directory
pub fn config_dir() -> Option<PathBuf> {
    project_dirs().map(|dirs| dirs.config_dir().to_path_buf())
}

/// Get the default config file path
pub fn config_path() -> Option<PathBuf> {
    config_dir().map(|d| d.join(CONFIG_FILE))
}
