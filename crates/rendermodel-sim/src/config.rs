//! Scenario configuration loading

use anyhow::Result;
use rendermodel_core::battery::BatteryPolicy;
use rendermodel_core::config::ControllerConfig;
use rendermodel_core::device::{DeviceState, InteractionMode, Side};
use serde::{Deserialize, Serialize};
use std::path::Path;
use tracing::info;

/// Main configuration structure
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Config {
    #[serde(default)]
    pub sim: SimSettings,
    #[serde(default)]
    pub controller: ControllerConfig,
    /// System battery indicator policy
    #[serde(default)]
    pub battery: Option<BatteryPolicy>,
    /// Device state before the first frame
    #[serde(default)]
    pub devices: DeviceState,
    #[serde(default, rename = "step")]
    pub steps: Vec<ScenarioStep>,
}

impl Default for Config {
    fn default() -> Self {
        Self {
            sim: SimSettings::default(),
            controller: ControllerConfig::default(),
            battery: None,
            devices: DeviceState::default(),
            steps: Vec::new(),
        }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct SimSettings {
    /// Frames to simulate
    #[serde(default = "default_frames")]
    pub frames: u32,
    /// Simulated frame rate, used to advance the watchdog
    #[serde(default = "default_frame_rate")]
    pub frame_rate: f32,
    /// Directory holding `<model name>.json` descriptions
    #[serde(default = "default_models_dir")]
    pub models_dir: String,
    /// Controllers to simulate
    #[serde(default = "default_sides")]
    pub sides: Vec<Side>,
}

impl Default for SimSettings {
    fn default() -> Self {
        Self {
            frames: default_frames(),
            frame_rate: default_frame_rate(),
            models_dir: default_models_dir(),
            sides: default_sides(),
        }
    }
}

fn default_frames() -> u32 {
    600
}

fn default_frame_rate() -> f32 {
    60.0
}

fn default_models_dir() -> String {
    "render_models".to_string()
}

fn default_sides() -> Vec<Side> {
    vec![Side::Right, Side::Left]
}

/// Host-side lifecycle calls a step can trigger
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum SimAction {
    Enable,
    Disable,
    Pause,
    Resume,
    Reapply,
    Show,
    Hide,
}

/// Device changes and actions applied at the start of a frame
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct ScenarioStep {
    pub frame: u32,
    /// Controller the step targets; both when absent
    #[serde(default)]
    pub side: Option<Side>,
    #[serde(default)]
    pub connected: Option<bool>,
    #[serde(default)]
    pub tracked: Option<bool>,
    #[serde(default)]
    pub battery: Option<f32>,
    #[serde(default)]
    pub render_model_name: Option<String>,
    #[serde(default)]
    pub runtime_version: Option<u32>,
    #[serde(default)]
    pub focus_captured_by_system: Option<bool>,
    #[serde(default)]
    pub interaction_mode: Option<InteractionMode>,
    #[serde(default)]
    pub action: Option<SimAction>,
}

impl ScenarioStep {
    pub fn targets(&self, side: Side) -> bool {
        self.side.is_none_or(|s| s == side)
    }

    /// Write this step's device changes into the snapshot
    pub fn apply(&self, devices: &mut DeviceState) {
        for side in [Side::Right, Side::Left] {
            if !self.targets(side) {
                continue;
            }
            let status = devices.controller_mut(side);
            if let Some(connected) = self.connected {
                status.connected = connected;
            }
            if let Some(tracked) = self.tracked {
                status.tracked = tracked;
            }
            if let Some(battery) = self.battery {
                status.battery = battery;
            }
            if let Some(name) = &self.render_model_name {
                status.render_model_name = name.clone();
            }
        }
        if let Some(version) = self.runtime_version {
            devices.runtime_version = version;
        }
        if let Some(captured) = self.focus_captured_by_system {
            devices.focus_captured_by_system = captured;
        }
        if let Some(mode) = self.interaction_mode {
            devices.interaction_mode = mode;
        }
    }
}

/// Load configuration from file
pub fn load_config(path: &Path) -> Result<Config> {
    if path.exists() {
        let content = std::fs::read_to_string(path)?;
        let config: Config = toml::from_str(&content)?;
        info!(path = %path.display(), steps = config.steps.len(), "Loaded scenario");
        Ok(config)
    } else {
        info!(
            path = %path.display(),
            "Scenario file not found, using defaults"
        );
        Ok(Config::default())
    }
}

/// Save an example scenario to file
pub fn save_default_config(path: &Path) -> Result<()> {
    let mut config = Config::default();
    for side in [Side::Right, Side::Left] {
        let status = config.devices.controller_mut(side);
        status.connected = true;
        status.tracked = true;
        status.battery = 0.8;
    }
    config.devices.right.render_model_name = "WVR_CR_Right_001".to_string();
    config.devices.left.render_model_name = "WVR_CR_Left_001".to_string();
    config.battery = Some(BatteryPolicy {
        show: BatteryPolicy::SHOW,
    });
    config.steps = vec![
        ScenarioStep {
            frame: 120,
            side: Some(Side::Right),
            battery: Some(0.15),
            ..Default::default()
        },
        ScenarioStep {
            frame: 240,
            focus_captured_by_system: Some(true),
            ..Default::default()
        },
        ScenarioStep {
            frame: 300,
            focus_captured_by_system: Some(false),
            ..Default::default()
        },
        ScenarioStep {
            frame: 400,
            side: Some(Side::Left),
            connected: Some(false),
            tracked: Some(false),
            ..Default::default()
        },
        ScenarioStep {
            frame: 500,
            action: Some(SimAction::Reapply),
            ..Default::default()
        },
    ];

    let content = toml::to_string_pretty(&config)?;
    std::fs::write(path, content)?;
    Ok(())
}
