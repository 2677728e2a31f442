//! Configuration loading from `~/.gravitation/config.toml`.

use gravitation_types::GravitationConfig;
use std::path::{Path, PathBuf};
use tracing::info;

/// Load the node configuration from a TOML file, falling back to defaults.
pub fn load_config(path: Option<&Path>) -> GravitationConfig {
    let config_path = path
        .map(|p| p.to_path_buf())
        .unwrap_or_else(default_config_path);

    if !config_path.exists() {
        info!(
            path = %config_path.display(),
            "Config file not found, using defaults"
        );
        return GravitationConfig::default();
    }

    match std::fs::read_to_string(&config_path) {
        Ok(contents) => match toml::from_str::<GravitationConfig>(&contents) {
            Ok(config) => {
                info!(path = %config_path.display(), "Loaded configuration");
                return config;
            }
            Err(e) => {
                tracing::warn!(
                    error = %e,
                    path = %config_path.display(),
                    "Failed to parse config, using defaults"
                );
            }
        },
        Err(e) => {
            tracing::warn!(
                error = %e,
                path = %config_path.display(),
                "Failed to read config file, using defaults"
            );
        }
    }

    GravitationConfig::default()
}

/// Get the default config file path.
pub fn default_config_path() -> PathBuf {
    gravitation_home().join("config.toml")
}

/// Get the default gravitation home directory.
pub fn gravitation_home() -> PathBuf {
    dirs::home_dir()
        .unwrap_or_else(std::env::temp_dir)
        .join(".gravitation")
}
