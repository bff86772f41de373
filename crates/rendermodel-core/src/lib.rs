//! Render Model Core - Controller render model lifecycle, independent of any engine
//!
//! This crate provides:
//! - The per-side `Controller` loading state machine and its lifecycle hooks
//! - A resumable, cancellable build pipeline turning a parsed model into scene nodes
//! - The resource provider contract plus a file-backed `ModelStore`
//! - Visibility, battery indicator and disconnect watchdog policies
//! - The `SceneBackend` seam and a headless backend for tools and tests

pub mod battery;
pub mod builder;
pub mod component;
pub mod config;
pub mod controller;
pub mod device;
pub mod error;
pub mod events;
pub mod headless;
pub mod resource;
pub mod scene;
pub mod store;
pub mod visibility;
pub mod watchdog;

pub use battery::{BatteryIndicatorUpdater, BatteryPolicy};
pub use builder::{ModelBuilder, ModelSlot, SectionRole};
pub use component::{ChildSet, ComponentHandle};
pub use config::{load_config, save_config, ControllerConfig};
pub use controller::{Controller, HostContext, LoadingState};
pub use device::{DeviceLayer, DeviceState, DeviceType, InteractionMode, Side};
pub use error::{ConfigError, RenderModelError};
pub use events::{ModelEvent, ModelEventReceiver, ModelEvents};
pub use headless::HeadlessScene;
pub use resource::{ModelData, ModelKey, ModelResource, ResourceProvider};
pub use scene::{BuiltinPrefab, MaterialId, NodeId, PrefabSource, SceneBackend, TextureId};
pub use store::{JsonModelSource, ModelSource, ModelStore, StaticModelSource};
