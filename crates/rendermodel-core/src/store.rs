//! In-memory model resource cache with deferred parsing
//!
//! `ModelStore` implements `ResourceProvider`. Registering a key creates
//! an un-ready `ModelResource` immediately and queues the parse; each call
//! to `process_pending` parses one queued model from the configured
//! `ModelSource` and publishes it, opening its parser-ready gate. Handles
//! are cached by `ModelKey`, so repeated registration never duplicates
//! storage.

use std::collections::{HashMap, VecDeque};
use std::path::{Path, PathBuf};
use std::sync::Arc;
use tracing::{debug, info, warn};

use crate::error::ConfigError;
use crate::resource::{ModelData, ModelKey, ModelResource, ResourceProvider};

/// Where raw model data comes from
pub trait ModelSource {
    /// Whether the source knows a model with this name
    fn contains(&self, name: &str) -> bool;

    /// Parse the model for a key. `Ok(None)` means the model is unknown.
    fn load(&self, key: &ModelKey) -> Result<Option<ModelData>, ConfigError>;
}

/// Reads `<dir>/<name>.json` model descriptions
#[derive(Debug, Clone)]
pub struct JsonModelSource {
    pub dir: PathBuf,
}

impl JsonModelSource {
    pub fn new(dir: impl Into<PathBuf>) -> Self {
        Self { dir: dir.into() }
    }

    /// Path where a model description should be stored
    pub fn model_path(&self, name: &str) -> PathBuf {
        self.dir.join(format!("{}.json", name))
    }

    /// Write a model description, creating the directory if needed
    pub fn store(&self, name: &str, data: &ModelData) -> Result<PathBuf, ConfigError> {
        std::fs::create_dir_all(&self.dir)?;
        let path = self.model_path(name);
        std::fs::write(&path, serde_json::to_string_pretty(data)?)?;
        Ok(path)
    }
}

impl ModelSource for JsonModelSource {
    fn contains(&self, name: &str) -> bool {
        !name.is_empty() && self.model_path(name).exists()
    }

    fn load(&self, key: &ModelKey) -> Result<Option<ModelData>, ConfigError> {
        let path = self.model_path(&key.name);
        if !path.exists() {
            return Ok(None);
        }
        let content = std::fs::read_to_string(&path)?;
        let data: ModelData = serde_json::from_str(&content)?;
        Ok(Some(data))
    }
}

/// Models kept in memory, keyed by name
#[derive(Debug, Clone, Default)]
pub struct StaticModelSource {
    pub models: HashMap<String, ModelData>,
}

impl StaticModelSource {
    pub fn with_model(mut self, name: impl Into<String>, data: ModelData) -> Self {
        self.models.insert(name.into(), data);
        self
    }
}

impl ModelSource for StaticModelSource {
    fn contains(&self, name: &str) -> bool {
        self.models.contains_key(name)
    }

    fn load(&self, key: &ModelKey) -> Result<Option<ModelData>, ConfigError> {
        Ok(self.models.get(&key.name).cloned())
    }
}

/// Resource cache shared by every controller
pub struct ModelStore {
    source: Box<dyn ModelSource + Send + Sync>,
    resources: HashMap<ModelKey, Arc<ModelResource>>,
    pending: VecDeque<ModelKey>,
}

impl ModelStore {
    pub fn new(source: impl ModelSource + Send + Sync + 'static) -> Self {
        Self {
            source: Box::new(source),
            resources: HashMap::new(),
            pending: VecDeque::new(),
        }
    }

    /// Store backed by JSON files in a directory
    pub fn from_dir(dir: &Path) -> Self {
        Self::new(JsonModelSource::new(dir))
    }

    /// Number of cached resources
    pub fn len(&self) -> usize {
        self.resources.len()
    }

    pub fn is_empty(&self) -> bool {
        self.resources.is_empty()
    }

    pub fn pending_count(&self) -> usize {
        self.pending.len()
    }

    /// Parse one queued model. Returns false when nothing was queued.
    ///
    /// A model that fails to parse is dropped from the cache, so
    /// `get_model` returns `None` for it afterwards.
    pub fn process_pending(&mut self) -> bool {
        let Some(key) = self.pending.pop_front() else {
            return false;
        };

        match self.source.load(&key) {
            Ok(Some(data)) => {
                if let Some(resource) = self.resources.get(&key) {
                    info!(
                        model = %key,
                        sections = data.section_count(),
                        textures = data.texture_count(),
                        "Model parsed"
                    );
                    resource.publish(data);
                }
            }
            Ok(None) => {
                warn!(model = %key, "Model disappeared from source before parsing");
                self.resources.remove(&key);
            }
            Err(e) => {
                warn!(model = %key, error = %e, "Failed to parse model");
                self.resources.remove(&key);
            }
        }
        true
    }

    /// Parse everything queued
    pub fn process_all(&mut self) {
        while self.process_pending() {}
    }

    /// Drop a cached resource. Controllers still holding the handle keep it
    /// alive; the next registration parses a fresh copy.
    pub fn evict(&mut self, key: &ModelKey) -> bool {
        self.pending.retain(|k| k != key);
        self.resources.remove(key).is_some()
    }
}

impl ResourceProvider for ModelStore {
    fn register_model(&mut self, key: &ModelKey) -> bool {
        if self.resources.contains_key(key) {
            return true;
        }
        if !self.source.contains(&key.name) {
            debug!(model = %key, "Model not available from source");
            return false;
        }

        debug!(model = %key, "Registering model");
        self.resources
            .insert(key.clone(), Arc::new(ModelResource::pending(key.clone())));
        self.pending.push_back(key.clone());
        true
    }

    fn get_model(&self, key: &ModelKey) -> Option<Arc<ModelResource>> {
        self.resources.get(key).cloned()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::device::Side;
    use crate::resource::{MeshSection, TextureInfo};
    use tempfile::TempDir;

    fn sample_model() -> ModelData {
        ModelData {
            sections: vec![MeshSection {
                mesh_name: "__CM__Body".to_string(),
                vertices: vec![[0.0, 0.0, 0.0], [1.0, 0.0, 0.0], [0.0, 1.0, 0.0]],
                normals: Vec::new(),
                uvs: Vec::new(),
                indices: vec![0, 1, 2],
                active: true,
                matrix: glam::Mat4::IDENTITY.to_cols_array(),
            }],
            textures: vec![TextureInfo::new(1, 1, vec![255, 0, 0, 255])],
            battery_setting: false,
            battery_indicators: None,
        }
    }

    #[test]
    fn test_register_is_idempotent() {
        let source = StaticModelSource::default().with_model("WVR_CR_Left_001", sample_model());
        let mut store = ModelStore::new(source);
        let key = ModelKey::new("WVR_CR_Left_001", Side::Left, false);

        assert!(store.register_model(&key));
        let first = store.get_model(&key).unwrap();
        assert!(!first.is_parser_ready());

        assert!(store.register_model(&key));
        assert!(store.register_model(&key));
        assert_eq!(store.len(), 1);
        assert_eq!(store.pending_count(), 1);

        store.process_all();
        let second = store.get_model(&key).unwrap();
        assert!(Arc::ptr_eq(&first, &second));
        assert!(second.is_parser_ready());
        assert_eq!(second.section_count(), 1);
    }

    #[test]
    fn test_keys_differ_by_side_and_merge() {
        let source = StaticModelSource::default().with_model("WVR_CR_Left_001", sample_model());
        let mut store = ModelStore::new(source);

        assert!(store.register_model(&ModelKey::new("WVR_CR_Left_001", Side::Left, false)));
        assert!(store.register_model(&ModelKey::new("WVR_CR_Left_001", Side::Left, true)));
        assert!(store.register_model(&ModelKey::new("WVR_CR_Left_001", Side::Right, false)));
        assert_eq!(store.len(), 3);
    }

    #[test]
    fn test_unknown_model() {
        let mut store = ModelStore::new(StaticModelSource::default());
        let key = ModelKey::new("missing", Side::Right, false);

        assert!(!store.register_model(&key));
        assert!(store.get_model(&key).is_none());
        assert!(!store.process_pending());
    }

    #[test]
    fn test_json_source_roundtrip_through_store() {
        let temp_dir = TempDir::new().unwrap();
        let source = JsonModelSource::new(temp_dir.path());
        source.store("WVR_CR_Right_001", &sample_model()).unwrap();

        let mut store = ModelStore::from_dir(temp_dir.path());
        let key = ModelKey::new("WVR_CR_Right_001", Side::Right, false);
        assert!(store.register_model(&key));
        store.process_all();

        let resource = store.get_model(&key).unwrap();
        let data = resource.data().unwrap();
        assert_eq!(data.sections[0].mesh_name, "__CM__Body");
        assert!(!data.textures[0].is_materialized());
    }

    #[test]
    fn test_evict_reparses_on_next_registration() {
        let source = StaticModelSource::default().with_model("WVR_CR_Left_001", sample_model());
        let mut store = ModelStore::new(source);
        let key = ModelKey::new("WVR_CR_Left_001", Side::Left, false);

        store.register_model(&key);
        store.process_all();
        let held = store.get_model(&key).unwrap();

        assert!(store.evict(&key));
        assert!(store.get_model(&key).is_none());
        assert!(held.is_parser_ready());

        store.register_model(&key);
        let fresh = store.get_model(&key).unwrap();
        assert!(!Arc::ptr_eq(&held, &fresh));
        assert!(!fresh.is_parser_ready());
    }

    #[test]
    fn test_corrupt_json_is_dropped() {
        let temp_dir = TempDir::new().unwrap();
        std::fs::write(temp_dir.path().join("broken.json"), "{ not json").unwrap();

        let mut store = ModelStore::from_dir(temp_dir.path());
        let key = ModelKey::new("broken", Side::Right, false);
        assert!(store.register_model(&key));
        store.process_all();

        assert!(store.get_model(&key).is_none());
    }
}
