//! Controller configuration loading

use serde::{Deserialize, Serialize};
use std::path::Path;
use std::time::Duration;
use tracing::info;

use crate::battery::DEFAULT_BATTERY_REFRESH_FRAMES;
use crate::error::ConfigError;

/// Settings for one controller render model
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ControllerConfig {
    /// Poll connection and render model name to tear down stale models
    #[serde(default = "default_true")]
    pub update_dynamically: bool,
    /// Request the single-bone variant of the model
    #[serde(default)]
    pub merge_to_one_bone: bool,
    /// User supplied default model, preferred over every built-in fallback
    #[serde(default)]
    pub default_model: Option<String>,
    /// Hide the model unless the system is in controller interaction mode
    #[serde(default)]
    pub check_interaction_mode: bool,
    /// Editor preview against a streamed runtime
    #[serde(default)]
    pub direct_preview: bool,
    /// Runtimes older than this cannot provide render models
    #[serde(default = "default_min_runtime_version")]
    pub min_runtime_version: u32,
    /// Frames between battery refreshes while shown
    #[serde(default = "default_battery_refresh_frames")]
    pub battery_refresh_frames: u32,
    /// Disconnect watchdog period
    #[serde(default = "default_watchdog_period_secs")]
    pub watchdog_period_secs: f32,
}

fn default_true() -> bool {
    true
}

fn default_min_runtime_version() -> u32 {
    2
}

fn default_battery_refresh_frames() -> u32 {
    DEFAULT_BATTERY_REFRESH_FRAMES
}

fn default_watchdog_period_secs() -> f32 {
    1.0
}

impl Default for ControllerConfig {
    fn default() -> Self {
        Self {
            update_dynamically: true,
            merge_to_one_bone: false,
            default_model: None,
            check_interaction_mode: false,
            direct_preview: false,
            min_runtime_version: default_min_runtime_version(),
            battery_refresh_frames: default_battery_refresh_frames(),
            watchdog_period_secs: default_watchdog_period_secs(),
        }
    }
}

impl ControllerConfig {
    pub fn watchdog_period(&self) -> Duration {
        Duration::try_from_secs_f32(self.watchdog_period_secs.max(0.0)).unwrap_or(Duration::from_secs(1))
    }
}

/// Load configuration from a TOML file, or defaults when it does not exist
pub fn load_config(path: &Path) -> Result<ControllerConfig, ConfigError> {
    if path.exists() {
        let content = std::fs::read_to_string(path)?;
        let config: ControllerConfig = toml::from_str(&content)?;
        info!(path = %path.display(), "Loaded controller configuration");
        Ok(config)
    } else {
        info!(
            path = %path.display(),
            "Controller configuration not found, using defaults"
        );
        Ok(ControllerConfig::default())
    }
}

/// Save configuration to a TOML file
pub fn save_config(path: &Path, config: &ControllerConfig) -> Result<(), ConfigError> {
    let content = toml::to_string_pretty(config)?;
    if let Some(parent) = path.parent() {
        std::fs::create_dir_all(parent)?;
    }
    std::fs::write(path, content)?;
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;
    use tempfile::TempDir;

    #[test]
    fn test_missing_file_gives_defaults() {
        let temp_dir = TempDir::new().unwrap();
        let config = load_config(&temp_dir.path().join("absent.toml")).unwrap();
        assert_eq!(config, ControllerConfig::default());
        assert!(config.update_dynamically);
        assert_eq!(config.battery_refresh_frames, 200);
    }

    #[test]
    fn test_partial_file() {
        let temp_dir = TempDir::new().unwrap();
        let path = temp_dir.path().join("controller.toml");
        std::fs::write(&path, "merge_to_one_bone = true\ndefault_model = \"models/custom.glb\"\n").unwrap();

        let config = load_config(&path).unwrap();
        assert!(config.merge_to_one_bone);
        assert_eq!(config.default_model.as_deref(), Some("models/custom.glb"));
        assert_eq!(config.min_runtime_version, 2);
    }

    #[test]
    fn test_save_and_reload() {
        let temp_dir = TempDir::new().unwrap();
        let path = temp_dir.path().join("nested/controller.toml");
        let config = ControllerConfig {
            check_interaction_mode: true,
            watchdog_period_secs: 0.5,
            ..Default::default()
        };
        save_config(&path, &config).unwrap();
        assert_eq!(load_config(&path).unwrap(), config);
    }

    #[test]
    fn test_watchdog_period_out_of_range() {
        let temp_dir = TempDir::new().unwrap();
        let path = temp_dir.path().join("controller.toml");
        std::fs::write(&path, "watchdog_period_secs = inf\n").unwrap();

        let config = load_config(&path).unwrap();
        assert!(config.watchdog_period_secs.is_infinite());
        assert_eq!(config.watchdog_period(), Duration::from_secs(1));

        let negative = ControllerConfig {
            watchdog_period_secs: -3.0,
            ..Default::default()
        };
        assert_eq!(negative.watchdog_period(), Duration::ZERO);
    }

    #[test]
    fn test_invalid_toml() {
        let temp_dir = TempDir::new().unwrap();
        let path = temp_dir.path().join("bad.toml");
        std::fs::write(&path, "update_dynamically = \"yes\"").unwrap();
        assert!(matches!(load_config(&path), Err(ConfigError::ParseError(_))));
    }
}
