//! Device layer contract: connection, tracking, battery and render model queries

use serde::{Deserialize, Serialize};
use std::fmt;

/// Which controller a render model instance governs.
///
/// `Right` is the dominant hand.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Side {
    Right,
    Left,
}

impl Side {
    /// Device type the runtime uses for this side's controller
    pub fn device_type(self) -> DeviceType {
        match self {
            Side::Right => DeviceType::ControllerRight,
            Side::Left => DeviceType::ControllerLeft,
        }
    }

    pub fn short(self) -> &'static str {
        match self {
            Side::Right => "R",
            Side::Left => "L",
        }
    }
}

impl fmt::Display for Side {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.short())
    }
}

/// Runtime device types that own a render model
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum DeviceType {
    ControllerRight,
    ControllerLeft,
}

impl fmt::Display for DeviceType {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            DeviceType::ControllerRight => write!(f, "Controller_Right"),
            DeviceType::ControllerLeft => write!(f, "Controller_Left"),
        }
    }
}

/// Current system interaction mode
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum InteractionMode {
    #[default]
    Controller,
    Hand,
    Gaze,
}

/// Queries the controller render model needs from the device runtime.
pub trait DeviceLayer {
    fn is_connected(&self, side: Side) -> bool;
    fn is_tracked(&self, side: Side) -> bool;
    /// Battery charge in the 0.0..=1.0 range, negative when unknown
    fn battery_level(&self, device: DeviceType) -> f32;
    /// Render model name reported by the runtime, empty when none
    fn current_render_model_name(&self, device: DeviceType) -> String;
    fn runtime_version(&self) -> u32;
    fn input_focus_captured_by_system(&self) -> bool;
    fn current_interaction_mode(&self) -> InteractionMode;
}

/// State of one controller as reported by the runtime
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ControllerStatus {
    #[serde(default)]
    pub connected: bool,
    #[serde(default)]
    pub tracked: bool,
    #[serde(default = "default_battery")]
    pub battery: f32,
    #[serde(default)]
    pub render_model_name: String,
}

fn default_battery() -> f32 {
    -1.0
}

impl Default for ControllerStatus {
    fn default() -> Self {
        Self {
            connected: false,
            tracked: false,
            battery: default_battery(),
            render_model_name: String::new(),
        }
    }
}

/// Plain snapshot of the device runtime.
///
/// Hosts without a live runtime (tests, the simulator, engine shims fed by
/// their own input layer) write into this and hand it to the controller.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct DeviceState {
    #[serde(default)]
    pub right: ControllerStatus,
    #[serde(default)]
    pub left: ControllerStatus,
    #[serde(default = "default_runtime_version")]
    pub runtime_version: u32,
    #[serde(default)]
    pub focus_captured_by_system: bool,
    #[serde(default)]
    pub interaction_mode: InteractionMode,
}

fn default_runtime_version() -> u32 {
    2
}

impl Default for DeviceState {
    fn default() -> Self {
        Self {
            right: ControllerStatus::default(),
            left: ControllerStatus::default(),
            runtime_version: default_runtime_version(),
            focus_captured_by_system: false,
            interaction_mode: InteractionMode::Controller,
        }
    }
}

impl DeviceState {
    pub fn controller(&self, side: Side) -> &ControllerStatus {
        match side {
            Side::Right => &self.right,
            Side::Left => &self.left,
        }
    }

    pub fn controller_mut(&mut self, side: Side) -> &mut ControllerStatus {
        match side {
            Side::Right => &mut self.right,
            Side::Left => &mut self.left,
        }
    }

    fn by_device(&self, device: DeviceType) -> &ControllerStatus {
        match device {
            DeviceType::ControllerRight => &self.right,
            DeviceType::ControllerLeft => &self.left,
        }
    }
}

impl DeviceLayer for DeviceState {
    fn is_connected(&self, side: Side) -> bool {
        self.controller(side).connected
    }

    fn is_tracked(&self, side: Side) -> bool {
        self.controller(side).tracked
    }

    fn battery_level(&self, device: DeviceType) -> f32 {
        self.by_device(device).battery
    }

    fn current_render_model_name(&self, device: DeviceType) -> String {
        self.by_device(device).render_model_name.clone()
    }

    fn runtime_version(&self) -> u32 {
        self.runtime_version
    }

    fn input_focus_captured_by_system(&self) -> bool {
        self.focus_captured_by_system
    }

    fn current_interaction_mode(&self) -> InteractionMode {
        self.interaction_mode
    }
}
