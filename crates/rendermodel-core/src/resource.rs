//! Parsed controller model resources and the provider contract
//!
//! A `ModelResource` is created by a provider the moment a model is
//! registered and is shared (`Arc`) between every build attempt for the
//! same `ModelKey`. Its payload is published exactly once; publishing is
//! what opens the parser-ready gate. Textures inside the payload carry a
//! write-once slot for the scene texture built from them, so a texture is
//! decoded once and survives any number of teardowns and rebuilds.

use serde::{Deserialize, Serialize};
use std::fmt;
use std::sync::{Arc, OnceLock};

use crate::device::Side;
use crate::scene::TextureId;

/// Identity of a cached model resource
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct ModelKey {
    pub name: String,
    pub side: Side,
    pub merge_to_one_bone: bool,
}

impl ModelKey {
    pub fn new(name: impl Into<String>, side: Side, merge_to_one_bone: bool) -> Self {
        Self {
            name: name.into(),
            side,
            merge_to_one_bone,
        }
    }
}

impl fmt::Display for ModelKey {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}[{}{}]", self.name, self.side, if self.merge_to_one_bone { ",merged" } else { "" })
    }
}

/// Raw RGBA32 pixels plus the scene texture built from them
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct TextureInfo {
    pub width: u32,
    pub height: u32,
    #[serde(default)]
    pub data: Vec<u8>,
    #[serde(skip)]
    materialized: OnceLock<TextureId>,
}

impl TextureInfo {
    pub fn new(width: u32, height: u32, data: Vec<u8>) -> Self {
        Self {
            width,
            height,
            data,
            materialized: OnceLock::new(),
        }
    }

    /// Scene texture built from this slot, if any
    pub fn texture(&self) -> Option<TextureId> {
        self.materialized.get().copied()
    }

    pub fn is_materialized(&self) -> bool {
        self.materialized.get().is_some()
    }

    /// Return the existing texture or build one with `create`.
    ///
    /// `create` runs at most once per slot over the slot's lifetime.
    pub fn materialize<E>(
        &self,
        create: impl FnOnce(&TextureInfo) -> Result<TextureId, E>,
    ) -> Result<TextureId, E> {
        if let Some(id) = self.materialized.get() {
            return Ok(*id);
        }
        let id = create(self)?;
        Ok(*self.materialized.get_or_init(|| id))
    }

    pub fn expected_len(&self) -> usize {
        self.width as usize * self.height as usize * 4
    }
}

fn identity_matrix() -> [f32; 16] {
    glam::Mat4::IDENTITY.to_cols_array()
}

fn default_true() -> bool {
    true
}

/// One mesh section of a controller model
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct MeshSection {
    pub mesh_name: String,
    pub vertices: Vec<[f32; 3]>,
    #[serde(default)]
    pub normals: Vec<[f32; 3]>,
    #[serde(default)]
    pub uvs: Vec<[f32; 2]>,
    pub indices: Vec<u32>,
    /// Whether the section is shown by default
    #[serde(default = "default_true")]
    pub active: bool,
    /// Rigid transform, column-major, in the runtime's coordinate system
    #[serde(default = "identity_matrix")]
    pub matrix: [f32; 16],
}

/// Battery level interval and the texture shown for it
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct BatteryIndicator {
    /// Lower bound in percent (0-100)
    pub min: f32,
    /// Upper bound in percent (0-100)
    pub max: f32,
    pub level: i32,
    pub texture: TextureInfo,
}

impl BatteryIndicator {
    /// Whether a 0.0..=1.0 battery level falls inside this interval (inclusive)
    pub fn contains(&self, level: f32) -> bool {
        level >= self.min / 100.0 && level <= self.max / 100.0
    }
}

/// Parsed payload of a model resource
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct ModelData {
    pub sections: Vec<MeshSection>,
    #[serde(default)]
    pub textures: Vec<TextureInfo>,
    /// Whether the model declares battery indicator support
    #[serde(default)]
    pub battery_setting: bool,
    #[serde(default)]
    pub battery_indicators: Option<Vec<BatteryIndicator>>,
}

impl ModelData {
    pub fn section_count(&self) -> usize {
        self.sections.len()
    }

    pub fn texture_count(&self) -> usize {
        self.textures.len()
    }

    /// Battery indicators, present only when the model supports them
    pub fn battery_list(&self) -> Option<&[BatteryIndicator]> {
        if !self.battery_setting {
            return None;
        }
        self.battery_indicators
            .as_deref()
            .filter(|list| !list.is_empty())
    }
}

/// A provider-owned model resource
#[derive(Debug)]
pub struct ModelResource {
    key: ModelKey,
    data: OnceLock<ModelData>,
}

impl ModelResource {
    /// Create a resource whose data has not been parsed yet
    pub fn pending(key: ModelKey) -> Self {
        Self {
            key,
            data: OnceLock::new(),
        }
    }

    /// Create a resource that is already parsed
    pub fn ready(key: ModelKey, data: ModelData) -> Self {
        let resource = Self::pending(key);
        resource.publish(data);
        resource
    }

    pub fn key(&self) -> &ModelKey {
        &self.key
    }

    pub fn name(&self) -> &str {
        &self.key.name
    }

    pub fn side(&self) -> Side {
        self.key.side
    }

    /// The parser-ready gate
    pub fn is_parser_ready(&self) -> bool {
        self.data.get().is_some()
    }

    /// Publish parsed data and open the gate. Returns false if data was
    /// already published; published data never changes.
    pub fn publish(&self, data: ModelData) -> bool {
        self.data.set(data).is_ok()
    }

    pub fn data(&self) -> Option<&ModelData> {
        self.data.get()
    }

    pub fn section_count(&self) -> usize {
        self.data().map(ModelData::section_count).unwrap_or(0)
    }

    pub fn texture_count(&self) -> usize {
        self.data().map(ModelData::texture_count).unwrap_or(0)
    }
}

/// Contract the controller expects from the model resource cache.
pub trait ResourceProvider {
    /// Register (and start parsing) a model. Registering an already
    /// registered key is a successful no-op.
    fn register_model(&mut self, key: &ModelKey) -> bool;

    /// Handle to a registered model, `None` when absent or failed
    fn get_model(&self, key: &ModelKey) -> Option<Arc<ModelResource>>;
}

#[cfg(test)]
mod tests {
    use super::*;

    fn indicator(min: f32, max: f32, level: i32) -> BatteryIndicator {
        BatteryIndicator {
            min,
            max,
            level,
            texture: TextureInfo::new(1, 1, vec![0; 4]),
        }
    }

    #[test]
    fn test_parser_ready_gate() {
        let resource = ModelResource::pending(ModelKey::new("WVR_CR_Left_001", Side::Left, false));
        assert!(!resource.is_parser_ready());
        assert_eq!(resource.section_count(), 0);

        assert!(resource.publish(ModelData::default()));
        assert!(resource.is_parser_ready());
        assert!(!resource.publish(ModelData::default()));
    }

    #[test]
    fn test_texture_materialized_once() {
        let texture = TextureInfo::new(2, 2, vec![255; 16]);
        let mut calls = 0;

        let first = texture
            .materialize(|_| {
                calls += 1;
                Ok::<_, ()>(TextureId(7))
            })
            .unwrap();
        let second = texture
            .materialize(|_| {
                calls += 1;
                Ok::<_, ()>(TextureId(8))
            })
            .unwrap();

        assert_eq!(first, TextureId(7));
        assert_eq!(second, TextureId(7));
        assert_eq!(calls, 1);
    }

    #[test]
    fn test_battery_interval_bounds_inclusive() {
        let high = indicator(60.0, 100.0, 3);
        assert!(high.contains(1.0));
        assert!(high.contains(0.6));
        assert!(!high.contains(0.59));
    }

    #[test]
    fn test_battery_list_requires_setting() {
        let mut data = ModelData {
            battery_indicators: Some(vec![indicator(0.0, 100.0, 1)]),
            ..Default::default()
        };
        assert!(data.battery_list().is_none());

        data.battery_setting = true;
        assert_eq!(data.battery_list().map(|l| l.len()), Some(1));

        data.battery_indicators = Some(Vec::new());
        assert!(data.battery_list().is_none());
    }
}
