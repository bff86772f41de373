//! Scene backend contract
//!
//! The controller never touches engine objects directly. Everything it
//! creates or mutates goes through `SceneBackend`, addressed by opaque ids.
//! Textures and materials are backend-owned assets that outlive the nodes
//! referencing them; despawning a node never frees a texture.

use glam::{EulerRot, Mat4, Quat, Vec3};
use serde::{Deserialize, Serialize};

use crate::device::Side;
use crate::error::RenderModelError;
use crate::resource::{MeshSection, TextureInfo};

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct NodeId(pub u64);

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct TextureId(pub u64);

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct MaterialId(pub u64);

/// Local transform of a spawned mesh section
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct SectionTransform {
    pub translation: Vec3,
    pub rotation: Quat,
    pub scale: Vec3,
}

impl SectionTransform {
    pub const IDENTITY: Self = Self {
        translation: Vec3::ZERO,
        rotation: Quat::IDENTITY,
        scale: Vec3::ONE,
    };

    /// Convert a runtime rigid-transform matrix into engine space.
    ///
    /// The runtime is right-handed; the engine is left-handed. Position Z
    /// and the X euler angle (Y-X-Z order) are negated.
    pub fn from_runtime_matrix(matrix: &[f32; 16]) -> Self {
        let (scale, rotation, translation) = Mat4::from_cols_array(matrix).to_scale_rotation_translation();
        let (yaw, pitch, roll) = rotation.to_euler(EulerRot::YXZ);
        Self {
            translation: Vec3::new(translation.x, translation.y, -translation.z),
            rotation: Quat::from_euler(EulerRot::YXZ, yaw, -pitch, roll),
            scale,
        }
    }
}

/// Everything a backend needs to build one mesh section
#[derive(Debug)]
pub struct SectionBuild<'a> {
    pub index: usize,
    pub name: &'a str,
    pub section: &'a MeshSection,
    pub transform: SectionTransform,
    pub material: Option<MaterialId>,
    pub texture: Option<TextureId>,
}

/// Prefabs shipped with the SDK, used when no model resource is usable
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum BuiltinPrefab {
    WaveFinch,
    Focus3Left,
    Focus3Right,
}

impl BuiltinPrefab {
    pub fn asset_path(self) -> &'static str {
        match self {
            BuiltinPrefab::WaveFinch => "DefaultController/WaveFinchController",
            BuiltinPrefab::Focus3Left => "DefaultController/Focus3ControllerModel/Focus3_Left",
            BuiltinPrefab::Focus3Right => "DefaultController/Focus3ControllerModel/Focus3_Right",
        }
    }
}

/// Per-hand battery material asset
pub fn battery_material_asset(side: Side) -> &'static str {
    match side {
        Side::Right => "Materials/WaveBatteryMatR",
        Side::Left => "Materials/WaveBatteryMatL",
    }
}

/// A prefab to instantiate under the controller node
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum PrefabSource {
    /// User supplied default model
    Configured(String),
    Builtin(BuiltinPrefab),
}

impl PrefabSource {
    pub fn asset_path(&self) -> &str {
        match self {
            PrefabSource::Configured(path) => path,
            PrefabSource::Builtin(builtin) => builtin.asset_path(),
        }
    }
}

/// Engine operations used by the controller.
pub trait SceneBackend {
    /// Decode raw RGBA32 pixels into a texture asset
    fn create_texture(&mut self, name: &str, info: &TextureInfo) -> Result<TextureId, RenderModelError>;

    /// Shared unlit textured material
    fn create_unlit_material(&mut self) -> MaterialId;

    /// Per-hand battery material variant, `None` when the asset is missing
    fn create_battery_material(&mut self, side: Side) -> Option<MaterialId>;

    fn release_material(&mut self, material: MaterialId);

    /// Build a mesh node with a renderer. The renderer starts disabled.
    fn spawn_section(&mut self, build: &SectionBuild<'_>) -> Result<NodeId, RenderModelError>;

    fn set_material(&mut self, node: NodeId, material: MaterialId);

    fn set_main_texture(&mut self, node: NodeId, texture: TextureId);

    fn set_renderer_enabled(&mut self, node: NodeId, enabled: bool);

    /// Instantiate a prefab, optionally under a wrapper node rotated about
    /// the up axis. Returns the root node (the wrapper when one is used),
    /// or `None` when the prefab asset does not exist.
    fn spawn_prefab(&mut self, prefab: &PrefabSource, yaw_degrees: Option<f32>) -> Option<NodeId>;

    fn set_active(&mut self, node: NodeId, active: bool);

    /// Destroy a node and its children
    fn despawn(&mut self, node: NodeId);
}
