//! Render Model Scene - Bevy integration for controller render models
//!
//! Spawn an entity with a `ControllerRenderModel` component per hand and
//! add `RenderModelPlugin`. The plugin enables controllers, drives them
//! every frame, runs their disconnect watchdogs, pauses them on app
//! suspension and forwards ready/removed notifications as Bevy messages.
//! The XR layer keeps the `XrDevices` resource up to date.

pub mod backend;

use bevy::prelude::*;
use bevy::window::AppLifecycle;
use std::path::PathBuf;

use rendermodel_core::battery::BatteryPolicy;
use rendermodel_core::config::ControllerConfig;
use rendermodel_core::controller::{Controller, HostContext};
use rendermodel_core::device::{DeviceState, Side};
use rendermodel_core::events::{ModelEvent, ModelEventReceiver};
use rendermodel_core::store::ModelStore;

pub use backend::{
    BatteryMaterials, BevyScene, RenderModelPrefab, RenderModelSection, SceneAssets, SceneRegistry,
};

/// Device layer snapshot, written by the XR integration
#[derive(Resource, Default)]
pub struct XrDevices(pub DeviceState);

/// Model resource cache shared by all controllers
#[derive(Resource)]
pub struct RenderModelStore(pub ModelStore);

/// System battery indicator policy
#[derive(Resource, Default)]
pub struct BatteryPolicySetting(pub Option<BatteryPolicy>);

/// Controller-mode visibility override, applied to every controller on change
#[derive(Resource)]
pub struct ControllerModeVisible(pub bool);

impl Default for ControllerModeVisible {
    fn default() -> Self {
        Self(true)
    }
}

/// Message sent when a controller finished building its model
#[derive(Message)]
pub struct RenderModelReady {
    pub entity: Entity,
    pub side: Side,
}

/// Message sent when a controller's model was torn down
#[derive(Message)]
pub struct RenderModelRemoved {
    pub entity: Entity,
    pub side: Side,
}

/// Controller render model attached to a hand entity
#[derive(Component)]
pub struct ControllerRenderModel {
    controller: Controller,
    events: ModelEventReceiver,
    /// Desired enabled state; the plugin calls enable/disable on change
    pub enabled: bool,
    active: bool,
    reapply: bool,
}

impl ControllerRenderModel {
    pub fn new(side: Side, config: ControllerConfig) -> Self {
        let controller = Controller::new(side, config);
        let events = controller.subscribe();
        Self {
            controller,
            events,
            enabled: true,
            active: false,
            reapply: false,
        }
    }

    pub fn controller(&self) -> &Controller {
        &self.controller
    }

    /// Replace the configuration and rebuild on the next frame
    pub fn apply_config(&mut self, config: ControllerConfig) {
        self.controller.set_config(config);
        self.reapply = true;
    }
}

/// Plugin that drives every `ControllerRenderModel`
pub struct RenderModelPlugin {
    /// Directory holding `<model name>.json` descriptions
    pub models_dir: PathBuf,
}

impl Default for RenderModelPlugin {
    fn default() -> Self {
        Self {
            models_dir: PathBuf::from("assets/render_models"),
        }
    }
}

impl Plugin for RenderModelPlugin {
    fn build(&self, app: &mut App) {
        app.insert_resource(RenderModelStore(ModelStore::from_dir(&self.models_dir)))
            .init_resource::<XrDevices>()
            .init_resource::<BatteryPolicySetting>()
            .init_resource::<ControllerModeVisible>()
            .init_resource::<SceneRegistry>()
            .init_resource::<BatteryMaterials>()
            .add_message::<RenderModelReady>()
            .add_message::<RenderModelRemoved>()
            .add_systems(Startup, setup_battery_materials)
            .add_systems(
                Update,
                (
                    handle_app_lifecycle,
                    sync_enabled,
                    apply_battery_policy,
                    process_model_store,
                    tick_controllers,
                    run_watchdogs,
                    apply_controller_mode_visibility,
                    forward_model_events,
                )
                    .chain(),
            );
    }
}

fn setup_battery_materials(
    mut battery: ResMut<BatteryMaterials>,
    mut materials: ResMut<Assets<StandardMaterial>>,
) {
    battery.ensure_defaults(&mut materials);
}

/// Call enable/disable when the desired state changes
fn sync_enabled(
    mut query: Query<(Entity, &mut ControllerRenderModel)>,
    devices: Res<XrDevices>,
    mut store: ResMut<RenderModelStore>,
    mut scene: SceneAssets,
) {
    for (entity, mut model) in &mut query {
        let model = &mut *model;
        if model.enabled == model.active {
            continue;
        }
        let mut backend = scene.for_entity(entity);
        let mut cx = HostContext {
            devices: &devices.0,
            provider: &mut store.0,
            scene: &mut backend,
        };
        if model.enabled {
            model.controller.enable(&mut cx);
        } else {
            model.controller.disable(&mut cx);
        }
        model.active = model.enabled;
    }
}

fn handle_app_lifecycle(
    mut lifecycle: MessageReader<AppLifecycle>,
    mut query: Query<(Entity, &mut ControllerRenderModel)>,
    devices: Res<XrDevices>,
    mut store: ResMut<RenderModelStore>,
    mut scene: SceneAssets,
) {
    for event in lifecycle.read() {
        let paused = match event {
            AppLifecycle::WillSuspend | AppLifecycle::Suspended => true,
            AppLifecycle::WillResume | AppLifecycle::Running => false,
            _ => continue,
        };
        tracing::info!("App lifecycle {:?}, paused = {}", event, paused);
        for (entity, mut model) in &mut query {
            let mut backend = scene.for_entity(entity);
            let mut cx = HostContext {
                devices: &devices.0,
                provider: &mut store.0,
                scene: &mut backend,
            };
            model.controller.pause(&mut cx, paused);
        }
    }
}

fn apply_battery_policy(setting: Res<BatteryPolicySetting>, mut query: Query<&mut ControllerRenderModel>) {
    if !setting.is_changed() {
        return;
    }
    for mut model in &mut query {
        model.controller.on_oem_config_changed(setting.0);
    }
}

/// Parse one queued model per frame
fn process_model_store(mut store: ResMut<RenderModelStore>) {
    store.0.process_pending();
}

fn tick_controllers(
    mut query: Query<(Entity, &mut ControllerRenderModel)>,
    devices: Res<XrDevices>,
    mut store: ResMut<RenderModelStore>,
    mut scene: SceneAssets,
) {
    for (entity, mut model) in &mut query {
        let model = &mut *model;
        if !model.active {
            continue;
        }
        let mut backend = scene.for_entity(entity);
        let mut cx = HostContext {
            devices: &devices.0,
            provider: &mut store.0,
            scene: &mut backend,
        };
        if std::mem::take(&mut model.reapply) {
            model.controller.reapply_settings(&mut cx);
        }
        model.controller.tick(&mut cx);
    }
}

fn run_watchdogs(
    time: Res<Time>,
    mut query: Query<(Entity, &mut ControllerRenderModel)>,
    devices: Res<XrDevices>,
    mut store: ResMut<RenderModelStore>,
    mut scene: SceneAssets,
) {
    for (entity, mut model) in &mut query {
        if !model.active {
            continue;
        }
        let mut backend = scene.for_entity(entity);
        let mut cx = HostContext {
            devices: &devices.0,
            provider: &mut store.0,
            scene: &mut backend,
        };
        model.controller.advance_watchdog(&mut cx, time.delta());
    }
}

fn apply_controller_mode_visibility(
    visible: Res<ControllerModeVisible>,
    mut query: Query<(Entity, &mut ControllerRenderModel)>,
    mut scene: SceneAssets,
) {
    if !visible.is_changed() {
        return;
    }
    for (entity, mut model) in &mut query {
        let mut backend = scene.for_entity(entity);
        model.controller.set_controller_mode_visible(&mut backend, visible.0);
    }
}

fn forward_model_events(
    mut query: Query<(Entity, &mut ControllerRenderModel)>,
    mut ready: MessageWriter<RenderModelReady>,
    mut removed: MessageWriter<RenderModelRemoved>,
) {
    for (entity, mut model) in &mut query {
        while let Ok(event) = model.events.try_recv() {
            match event {
                ModelEvent::Ready(side) => {
                    ready.write(RenderModelReady { entity, side });
                }
                ModelEvent::Removed(side) => {
                    removed.write(RenderModelRemoved { entity, side });
                }
            }
        }
    }
}
