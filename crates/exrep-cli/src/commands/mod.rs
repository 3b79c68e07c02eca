//! CLI subcommands.

pub mod config;
pub mod fields;
pub mod run;

use std::path::{Path, PathBuf};

use exrep_core::models::config::ExrepConfig;

/// Default location of the configuration file.
pub fn default_config_path() -> PathBuf {
    dirs::config_dir()
        .unwrap_or_else(|| PathBuf::from("."))
        .join("exrep")
        .join("config.json")
}

/// Configuration file selected by `--config`, or the default one.
pub fn config_path(explicit: Option<&str>) -> PathBuf {
    explicit.map(PathBuf::from).unwrap_or_else(default_config_path)
}

/// Load the configuration. An explicit path must exist; a missing default file yields defaults.
pub fn load_config(explicit: Option<&str>) -> anyhow::Result<ExrepConfig> {
    match explicit {
        Some(path) => Ok(ExrepConfig::from_file(Path::new(path))?),
        None => {
            let path = default_config_path();
            if path.exists() {
                Ok(ExrepConfig::from_file(&path)?)
            } else {
                Ok(ExrepConfig::default())
            }
        }
    }
}
