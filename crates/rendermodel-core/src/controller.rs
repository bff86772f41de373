//! Controller render model lifecycle
//!
//! `Controller` is the per-side orchestrator. Hosts call its lifecycle
//! methods (`enable`, `disable`, `pause`, `tick`, `advance_watchdog`) from
//! whatever their engine offers and pass the device layer, resource
//! provider and scene backend in a `HostContext` on every call. All work
//! happens on the caller's thread; the build pipeline only advances inside
//! `tick`.

use std::collections::HashSet;
use std::sync::Arc;
use std::time::Duration;
use tracing::{debug, info, warn};

use crate::battery::{BatteryIndicatorUpdater, BatteryPolicy};
use crate::builder::{BuildAbort, ModelBuilder, ModelSlot, StepOutcome};
use crate::component::ChildSet;
use crate::config::ControllerConfig;
use crate::device::{DeviceLayer, Side};
use crate::events::{ModelEvent, ModelEventReceiver, ModelEvents};
use crate::resource::{ModelKey, ResourceProvider};
use crate::scene::{BuiltinPrefab, MaterialId, NodeId, PrefabSource, SceneBackend};
use crate::visibility::{ShowTransition, VisibilityInputs, VisibilityPolicy};
use crate::watchdog::Watchdog;

/// Focus3 controller model names with dedicated built-in fallbacks
pub const FOCUS3_LEFT_MODEL: &str = "WVR_CR_Left_001";
pub const FOCUS3_RIGHT_MODEL: &str = "WVR_CR_Right_001";

/// Yaw correction applied around built-in Focus3 fallbacks
pub const FOCUS3_YAW_DEGREES: f32 = 180.0;

/// Frames between periodic status log lines
const STATUS_LOG_FRAMES: u32 = 300;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum LoadingState {
    #[default]
    NotLoaded,
    Loading,
    Loaded,
}

/// Host services borrowed for the duration of one call
pub struct HostContext<'a> {
    pub devices: &'a dyn DeviceLayer,
    pub provider: &'a mut dyn ResourceProvider,
    pub scene: &'a mut dyn SceneBackend,
}

/// Built-in prefab for a model name the provider could not supply
pub fn builtin_fallback(render_model_name: &str) -> (PrefabSource, Option<f32>) {
    match render_model_name {
        FOCUS3_LEFT_MODEL => (PrefabSource::Builtin(BuiltinPrefab::Focus3Left), Some(FOCUS3_YAW_DEGREES)),
        FOCUS3_RIGHT_MODEL => (PrefabSource::Builtin(BuiltinPrefab::Focus3Right), Some(FOCUS3_YAW_DEGREES)),
        _ => (PrefabSource::Builtin(BuiltinPrefab::WaveFinch), None),
    }
}

pub struct Controller {
    side: Side,
    config: ControllerConfig,
    state: LoadingState,
    connected: bool,
    tracked: bool,
    render_model_name: String,
    model: ModelSlot,
    builder: Option<ModelBuilder>,
    spawned: Option<NodeId>,
    material: Option<MaterialId>,
    visibility: VisibilityPolicy,
    battery: BatteryIndicatorUpdater,
    watchdog: Watchdog,
    events: ModelEvents,
    broken_models: HashSet<ModelKey>,
    log_frame: u32,
}

impl Controller {
    pub fn new(side: Side, config: ControllerConfig) -> Self {
        let mut battery = BatteryIndicatorUpdater::new(config.battery_refresh_frames);
        battery.apply_policy(None, config.direct_preview);
        Self {
            side,
            visibility: VisibilityPolicy::new(config.check_interaction_mode),
            watchdog: Watchdog::new(config.watchdog_period()),
            battery,
            config,
            state: LoadingState::NotLoaded,
            connected: false,
            tracked: false,
            render_model_name: String::new(),
            model: ModelSlot::default(),
            builder: None,
            spawned: None,
            material: None,
            events: ModelEvents::default(),
            broken_models: HashSet::new(),
            log_frame: 0,
        }
    }

    pub fn side(&self) -> Side {
        self.side
    }

    pub fn state(&self) -> LoadingState {
        self.state
    }

    pub fn config(&self) -> &ControllerConfig {
        &self.config
    }

    /// Render model name of the current (or last attempted) load
    pub fn render_model_name(&self) -> &str {
        &self.render_model_name
    }

    /// Whether the whole model is currently shown
    pub fn is_shown(&self) -> bool {
        self.visibility.is_shown()
    }

    pub fn children(&self) -> Option<&ChildSet> {
        self.model.children.as_ref()
    }

    pub fn model(&self) -> &ModelSlot {
        &self.model
    }

    /// Root node of a spawned fallback prefab
    pub fn spawned_prefab(&self) -> Option<NodeId> {
        self.spawned
    }

    pub fn is_building(&self) -> bool {
        self.builder.is_some()
    }

    pub fn battery_indicator_enabled(&self) -> bool {
        self.battery.is_enabled()
    }

    /// Receive `Ready`/`Removed` notifications for this side
    pub fn subscribe(&self) -> ModelEventReceiver {
        self.events.subscribe()
    }

    /// Replace the configuration. Takes effect for the next load; call
    /// `reapply_settings` to rebuild immediately.
    pub fn set_config(&mut self, config: ControllerConfig) {
        self.visibility.set_check_interaction_mode(config.check_interaction_mode);
        self.battery = BatteryIndicatorUpdater::new(config.battery_refresh_frames);
        self.watchdog = Watchdog::new(config.watchdog_period());
        self.config = config;
        self.battery.apply_policy(None, self.config.direct_preview);
    }

    /// Re-read the system battery policy
    pub fn on_oem_config_changed(&mut self, policy: Option<BatteryPolicy>) {
        self.battery.apply_policy(policy, self.config.direct_preview);
        debug!(side = %self.side, show_battery = self.battery.is_enabled(), "Battery policy updated");
    }

    pub fn enable(&mut self, cx: &mut HostContext<'_>) {
        debug!(side = %self.side, "Enable");
        if self.material.is_none() {
            self.material = Some(cx.scene.create_unlit_material());
        }
        self.watchdog.reset();

        if self.state == LoadingState::Loading {
            self.destroy_render_model(cx.scene, "model was still loading when enabled");
        }

        self.connected = cx.devices.is_connected(self.side);
        if !self.connected {
            return;
        }

        if self.state == LoadingState::Loaded {
            if self.is_render_model_name_same(cx.devices) {
                debug!(side = %self.side, "Controller connected, model was loaded");
                return;
            }
            self.destroy_render_model(cx.scene, "render model changed while disabled");
        }
        self.load_controller(cx);
    }

    pub fn disable(&mut self, cx: &mut HostContext<'_>) {
        debug!(side = %self.side, "Disable");
        if let Some(material) = self.material.take() {
            cx.scene.release_material(material);
        }
        if self.state == LoadingState::Loading {
            self.destroy_render_model(cx.scene, "meshes were not complete before disable");
        }
    }

    /// Application pause/resume. A build interrupted by a pause is
    /// discarded, never resumed.
    pub fn pause(&mut self, cx: &mut HostContext<'_>, paused: bool) {
        if !paused {
            debug!(side = %self.side, "Resume");
            return;
        }
        info!(side = %self.side, "Pause, checking loading state");
        if self.state == LoadingState::Loading {
            self.destroy_render_model(cx.scene, "spawn was not complete and the app is pausing");
        }
    }

    /// Per-frame update. Also the frame boundary at which a suspended
    /// build resumes.
    pub fn tick(&mut self, cx: &mut HostContext<'_>) {
        self.log_frame = (self.log_frame + 1) % STATUS_LOG_FRAMES;

        self.connected = cx.devices.is_connected(self.side);
        self.tracked = cx.devices.is_tracked(self.side);

        if self.state == LoadingState::NotLoaded && self.tracked {
            debug!(side = %self.side, "Spawn render model");
            self.load_controller(cx);
        }

        if self.state == LoadingState::Loaded {
            self.update_show_state(cx);
        }

        self.drive_build(cx);

        if self.log_frame == 0 {
            debug!(
                side = %self.side,
                connected = self.connected,
                tracked = self.tracked,
                children = self.model.live_component_count(),
                show_battery = self.battery.is_enabled(),
                battery_ready = self.model.battery.ready,
                shown = self.visibility.is_shown(),
                state = ?self.state,
                "Render model status"
            );
        }
    }

    /// Advance the disconnect watchdog by host time
    pub fn advance_watchdog(&mut self, cx: &mut HostContext<'_>, delta: Duration) {
        if !self.config.update_dynamically {
            return;
        }
        if self.watchdog.advance(delta) {
            self.disconnect_watchdog(cx);
        }
    }

    /// Tear down a loaded model whose controller disconnected or whose
    /// reported render model changed
    pub fn disconnect_watchdog(&mut self, cx: &mut HostContext<'_>) {
        if self.state != LoadingState::Loaded {
            return;
        }

        if cx.devices.is_connected(self.side) {
            let device = self.side.device_type();
            let current = cx.devices.current_render_model_name(device);
            if current != self.render_model_name {
                info!(side = %self.side, previous = %self.render_model_name, %current, "Render model changed");
                self.destroy_render_model(cx.scene, "render model is different");
            }
        } else {
            self.connected = false;
            self.destroy_render_model(cx.scene, "controller disconnected");
        }
    }

    /// Unconditional teardown and reload after a setting change. Models
    /// that failed before are retried.
    pub fn reapply_settings(&mut self, cx: &mut HostContext<'_>) {
        self.broken_models.clear();
        self.destroy_render_model(cx.scene, "setting is changed");
        self.load_controller(cx);
    }

    /// Force the show state of every section and of a fallback prefab
    pub fn set_controller_mode_visible(&mut self, scene: &mut dyn SceneBackend, visible: bool) {
        if let Some(children) = self.model.children.as_mut() {
            children.set_show_state_all(scene, visible);
        }
        if let Some(node) = self.spawned {
            scene.set_active(node, visible);
        }
    }

    fn is_render_model_name_same(&self, devices: &dyn DeviceLayer) -> bool {
        if !self.connected {
            return false;
        }
        let current = devices.current_render_model_name(self.side.device_type());
        debug!(side = %self.side, previous = %self.render_model_name, %current, "Comparing render model names");
        current == self.render_model_name
    }

    fn update_show_state(&mut self, cx: &mut HostContext<'_>) {
        let inputs = VisibilityInputs::sample(cx.devices, self.side);
        match self.visibility.evaluate(&inputs) {
            Some(ShowTransition::Show) => {
                debug!(side = %self.side, "Show render model to previous state");
                if let Some(children) = self.model.children.as_mut() {
                    children.set_show_state_all(cx.scene, true);
                    self.refresh_battery(cx);
                }
            }
            Some(ShowTransition::Hide) => {
                debug!(side = %self.side, "Hide render model, keeping section state");
                if let Some(children) = self.model.children.as_mut() {
                    children.set_show_state_all(cx.scene, false);
                }
            }
            None => {}
        }

        if self.visibility.is_shown() && self.battery.frame_due() {
            self.refresh_battery(cx);
        }
    }

    fn refresh_battery(&mut self, cx: &mut HostContext<'_>) {
        let Some(children) = self.model.children.as_mut() else {
            return;
        };
        self.battery.refresh(
            self.side,
            cx.scene,
            cx.devices,
            children,
            self.model.battery,
            self.model.resource.as_deref(),
            self.visibility.is_shown(),
        );
    }

    fn drive_build(&mut self, cx: &mut HostContext<'_>) {
        if self.builder.is_none() {
            return;
        }

        // The provider drops resources that fail to parse
        let stale = self.model.resource.as_ref().and_then(|held| match cx.provider.get_model(held.key()) {
            Some(current) if Arc::ptr_eq(&current, held) => None,
            current => Some((held.key().clone(), current.is_none())),
        });
        if let Some((key, dropped)) = stale {
            if dropped {
                warn!(side = %self.side, model = %key, "Model resource dropped by provider, falling back next load");
                self.broken_models.insert(key);
            } else {
                debug!(side = %self.side, model = %key, "Model resource replaced during build");
            }
            self.model.resource = None;
        }

        let Some(builder) = self.builder.as_mut() else {
            return;
        };
        match builder.resume(&mut self.model, self.material, cx.scene) {
            StepOutcome::Yield => {}
            StepOutcome::Complete => {
                self.builder = None;
                info!(side = %self.side, model = %self.render_model_name, "Render model ready");
                self.events.emit(ModelEvent::Ready(self.side));
                self.state = LoadingState::Loaded;
            }
            StepOutcome::Aborted(BuildAbort::ResourceMissing) => {
                self.destroy_render_model(cx.scene, "model resource is gone");
            }
            StepOutcome::Aborted(BuildAbort::Failed(e)) => {
                if let Some(key) = self.model.resource.as_ref().map(|r| r.key().clone()) {
                    if self.broken_models.insert(key) {
                        warn!(side = %self.side, model = %self.render_model_name, error = %e, "Model unusable, falling back next load");
                    }
                }
                self.destroy_render_model(cx.scene, "build failed");
            }
        }
    }

    fn load_controller(&mut self, cx: &mut HostContext<'_>) {
        self.state = LoadingState::Loading;
        let device = self.side.device_type();
        debug!(
            side = %self.side,
            merge_to_one_bone = self.config.merge_to_one_bone,
            %device,
            "Load controller"
        );

        if cx.devices.runtime_version() < self.config.min_runtime_version && !self.config.direct_preview {
            info!(side = %self.side, version = cx.devices.runtime_version(), "Runtime cannot provide render models");
            let prefab = self.configured_or(BuiltinPrefab::WaveFinch);
            self.spawn_fallback(cx.scene, prefab, None);
            self.state = LoadingState::Loaded;
            return;
        }

        self.render_model_name = cx.devices.current_render_model_name(device);
        if self.render_model_name.is_empty() {
            info!(side = %self.side, %device, "No render model reported");
            let prefab = self.configured_or(BuiltinPrefab::WaveFinch);
            self.spawn_fallback(cx.scene, prefab, None);
            self.state = LoadingState::Loaded;
            return;
        }

        let key = ModelKey::new(self.render_model_name.clone(), self.side, self.config.merge_to_one_bone);
        if cx.provider.register_model(&key) {
            debug!(side = %self.side, model = %key, "Model registered");
        }
        let mut resource = cx.provider.get_model(&key);

        if self.config.direct_preview {
            resource = None;
        }
        if resource.is_some() && self.broken_models.contains(&key) {
            debug!(side = %self.side, model = %key, "Model previously failed to build");
            resource = None;
        }

        match resource {
            Some(resource) => {
                info!(side = %self.side, model = %key, "Starting to load model");
                self.model.resource = Some(resource);
                self.builder = Some(ModelBuilder::new(self.side));
            }
            None => {
                info!(side = %self.side, model = %key, "Model resource unavailable");
                let (prefab, yaw) = match &self.config.default_model {
                    Some(path) => (PrefabSource::Configured(path.clone()), None),
                    None => builtin_fallback(&self.render_model_name),
                };
                self.spawn_fallback(cx.scene, prefab, yaw);
                self.state = LoadingState::Loaded;
            }
        }
    }

    fn configured_or(&self, builtin: BuiltinPrefab) -> PrefabSource {
        match &self.config.default_model {
            Some(path) => PrefabSource::Configured(path.clone()),
            None => PrefabSource::Builtin(builtin),
        }
    }

    fn spawn_fallback(&mut self, scene: &mut dyn SceneBackend, prefab: PrefabSource, yaw: Option<f32>) {
        self.destroy_spawned(scene);
        self.spawned = scene.spawn_prefab(&prefab, yaw);
        match self.spawned {
            Some(_) => info!(side = %self.side, prefab = prefab.asset_path(), "Fallback model spawned"),
            None => warn!(side = %self.side, prefab = prefab.asset_path(), "Fallback model asset is missing"),
        }
    }

    fn destroy_spawned(&mut self, scene: &mut dyn SceneBackend) {
        if let Some(node) = self.spawned.take() {
            scene.despawn(node);
        }
    }

    fn destroy_render_model(&mut self, scene: &mut dyn SceneBackend, reason: &str) {
        info!(side = %self.side, reason, "Destroy render model");
        self.builder = None;
        self.model.clear(scene);
        self.destroy_spawned(scene);
        self.visibility.reset();
        self.state = LoadingState::NotLoaded;
        self.events.emit(ModelEvent::Removed(self.side));
    }
}
