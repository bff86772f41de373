//! Headless scene backend
//!
//! Keeps every node, texture and material in plain maps so hosts without a
//! renderer (the simulator, tests) can drive a controller and inspect what
//! it built.

use std::collections::{HashMap, HashSet};
use tracing::trace;

use crate::device::Side;
use crate::error::RenderModelError;
use crate::resource::TextureInfo;
use crate::scene::{
    battery_material_asset, MaterialId, NodeId, PrefabSource, SceneBackend, SectionBuild,
    SectionTransform, TextureId,
};

#[derive(Debug, Clone, PartialEq)]
pub enum NodeKind {
    Section { index: usize, vertex_count: usize },
    Prefab { asset: String },
    /// Rotation wrapper around a prefab
    Wrapper { yaw_degrees: f32 },
}

#[derive(Debug, Clone)]
pub struct HeadlessNode {
    pub name: String,
    pub kind: NodeKind,
    pub parent: Option<NodeId>,
    pub transform: SectionTransform,
    pub renderer_enabled: bool,
    pub active: bool,
    pub material: Option<MaterialId>,
    pub main_texture: Option<TextureId>,
}

#[derive(Debug, Clone)]
pub struct HeadlessTexture {
    pub name: String,
    pub width: u32,
    pub height: u32,
}

#[derive(Debug, Default)]
pub struct HeadlessScene {
    next_id: u64,
    nodes: HashMap<NodeId, HeadlessNode>,
    textures: HashMap<TextureId, HeadlessTexture>,
    materials: HashSet<MaterialId>,
    battery_materials: HashMap<MaterialId, &'static str>,
    /// Prefab asset paths that fail to load
    pub missing_prefabs: HashSet<String>,
    /// Whether battery materials are available
    pub battery_material_missing: bool,
    /// Total nodes ever spawned
    pub spawned_total: usize,
}

impl HeadlessScene {
    pub fn new() -> Self {
        Self::default()
    }

    fn next(&mut self) -> u64 {
        self.next_id += 1;
        self.next_id
    }

    pub fn node(&self, id: NodeId) -> Option<&HeadlessNode> {
        self.nodes.get(&id)
    }

    pub fn live_node_count(&self) -> usize {
        self.nodes.len()
    }

    /// Live section nodes ordered by section index
    pub fn section_nodes(&self) -> Vec<(NodeId, &HeadlessNode)> {
        let mut sections: Vec<_> = self
            .nodes
            .iter()
            .filter(|(_, n)| matches!(n.kind, NodeKind::Section { .. }))
            .map(|(id, n)| (*id, n))
            .collect();
        sections.sort_by_key(|(_, n)| match n.kind {
            NodeKind::Section { index, .. } => index,
            _ => usize::MAX,
        });
        sections
    }

    /// Live section node by mesh name
    pub fn find_section(&self, name: &str) -> Option<(NodeId, &HeadlessNode)> {
        self.section_nodes().into_iter().find(|(_, n)| n.name == name)
    }

    /// Live prefab nodes
    pub fn prefab_nodes(&self) -> Vec<&HeadlessNode> {
        self.nodes
            .values()
            .filter(|n| matches!(n.kind, NodeKind::Prefab { .. }))
            .collect()
    }

    pub fn is_renderer_enabled(&self, node: NodeId) -> bool {
        self.nodes.get(&node).map(|n| n.renderer_enabled).unwrap_or(false)
    }

    pub fn texture(&self, id: TextureId) -> Option<&HeadlessTexture> {
        self.textures.get(&id)
    }

    pub fn texture_count(&self) -> usize {
        self.textures.len()
    }

    pub fn material_count(&self) -> usize {
        self.materials.len()
    }

    /// Asset a battery material was created from
    pub fn battery_material_asset(&self, id: MaterialId) -> Option<&'static str> {
        self.battery_materials.get(&id).copied()
    }

    fn insert(&mut self, node: HeadlessNode) -> NodeId {
        let id = NodeId(self.next());
        self.spawned_total += 1;
        self.nodes.insert(id, node);
        id
    }
}

impl SceneBackend for HeadlessScene {
    fn create_texture(&mut self, name: &str, info: &TextureInfo) -> Result<TextureId, RenderModelError> {
        if info.data.len() != info.expected_len() {
            return Err(RenderModelError::TextureDecode {
                name: name.to_string(),
                width: info.width,
                height: info.height,
                expected: info.expected_len(),
                actual: info.data.len(),
            });
        }
        let id = TextureId(self.next());
        self.textures.insert(
            id,
            HeadlessTexture {
                name: name.to_string(),
                width: info.width,
                height: info.height,
            },
        );
        trace!(texture = name, "Texture created");
        Ok(id)
    }

    fn create_unlit_material(&mut self) -> MaterialId {
        let id = MaterialId(self.next());
        self.materials.insert(id);
        id
    }

    fn create_battery_material(&mut self, side: Side) -> Option<MaterialId> {
        if self.battery_material_missing {
            return None;
        }
        let id = self.create_unlit_material();
        self.battery_materials.insert(id, battery_material_asset(side));
        Some(id)
    }

    fn release_material(&mut self, material: MaterialId) {
        self.materials.remove(&material);
        self.battery_materials.remove(&material);
    }

    fn spawn_section(&mut self, build: &SectionBuild<'_>) -> Result<NodeId, RenderModelError> {
        Ok(self.insert(HeadlessNode {
            name: build.name.to_string(),
            kind: NodeKind::Section {
                index: build.index,
                vertex_count: build.section.vertices.len(),
            },
            parent: None,
            transform: build.transform,
            renderer_enabled: false,
            active: true,
            material: build.material,
            main_texture: build.texture,
        }))
    }

    fn set_material(&mut self, node: NodeId, material: MaterialId) {
        if let Some(n) = self.nodes.get_mut(&node) {
            n.material = Some(material);
        }
    }

    fn set_main_texture(&mut self, node: NodeId, texture: TextureId) {
        if let Some(n) = self.nodes.get_mut(&node) {
            n.main_texture = Some(texture);
        }
    }

    fn set_renderer_enabled(&mut self, node: NodeId, enabled: bool) {
        if let Some(n) = self.nodes.get_mut(&node) {
            n.renderer_enabled = enabled;
        }
    }

    fn spawn_prefab(&mut self, prefab: &PrefabSource, yaw_degrees: Option<f32>) -> Option<NodeId> {
        let asset = prefab.asset_path().to_string();
        if self.missing_prefabs.contains(&asset) {
            return None;
        }

        let wrapper = yaw_degrees.map(|yaw| {
            self.insert(HeadlessNode {
                name: "rot180".to_string(),
                kind: NodeKind::Wrapper { yaw_degrees: yaw },
                parent: None,
                transform: SectionTransform {
                    rotation: glam::Quat::from_rotation_y(yaw.to_radians()),
                    ..SectionTransform::IDENTITY
                },
                renderer_enabled: false,
                active: true,
                material: None,
                main_texture: None,
            })
        });

        let instance = self.insert(HeadlessNode {
            name: asset.rsplit('/').next().unwrap_or(&asset).to_string(),
            kind: NodeKind::Prefab { asset },
            parent: wrapper,
            transform: SectionTransform::IDENTITY,
            renderer_enabled: true,
            active: true,
            material: None,
            main_texture: None,
        });

        Some(wrapper.unwrap_or(instance))
    }

    fn set_active(&mut self, node: NodeId, active: bool) {
        if let Some(n) = self.nodes.get_mut(&node) {
            n.active = active;
        }
    }

    fn despawn(&mut self, node: NodeId) {
        let children: Vec<NodeId> = self
            .nodes
            .iter()
            .filter(|(_, n)| n.parent == Some(node))
            .map(|(id, _)| *id)
            .collect();
        for child in children {
            self.despawn(child);
        }
        self.nodes.remove(&node);
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::scene::BuiltinPrefab;

    #[test]
    fn test_texture_size_checked() {
        let mut scene = HeadlessScene::new();
        let bad = TextureInfo::new(2, 2, vec![0; 3]);
        assert!(matches!(
            scene.create_texture("bad", &bad),
            Err(RenderModelError::TextureDecode { expected: 16, actual: 3, .. })
        ));

        let good = TextureInfo::new(2, 2, vec![0; 16]);
        let id = scene.create_texture("good", &good).unwrap();
        assert_eq!(scene.texture(id).unwrap().width, 2);
    }

    #[test]
    fn test_wrapper_despawns_with_prefab() {
        let mut scene = HeadlessScene::new();
        let prefab = PrefabSource::Builtin(BuiltinPrefab::Focus3Left);
        let root = scene.spawn_prefab(&prefab, Some(180.0)).unwrap();

        assert_eq!(scene.live_node_count(), 2);
        assert!(matches!(scene.node(root).unwrap().kind, NodeKind::Wrapper { .. }));

        scene.despawn(root);
        assert_eq!(scene.live_node_count(), 0);
    }

    #[test]
    fn test_battery_material_per_hand() {
        let mut scene = HeadlessScene::new();
        let right = scene.create_battery_material(Side::Right).unwrap();
        let left = scene.create_battery_material(Side::Left).unwrap();
        assert_eq!(scene.battery_material_asset(right), Some("Materials/WaveBatteryMatR"));
        assert_eq!(scene.battery_material_asset(left), Some("Materials/WaveBatteryMatL"));

        scene.release_material(right);
        assert_eq!(scene.battery_material_asset(right), None);
        assert_eq!(scene.material_count(), 1);
    }

    #[test]
    fn test_missing_prefab() {
        let mut scene = HeadlessScene::new();
        scene
            .missing_prefabs
            .insert(BuiltinPrefab::WaveFinch.asset_path().to_string());
        assert!(scene
            .spawn_prefab(&PrefabSource::Builtin(BuiltinPrefab::WaveFinch), None)
            .is_none());
    }
}
