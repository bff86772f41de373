//! `SceneBackend` over Bevy commands and asset stores
//!
//! Core ids are mapped to entities and asset handles in `SceneRegistry`.
//! Section entities are parented to the controller entity that owns them,
//! so a controller's transform moves its whole model.

use bevy::asset::RenderAssetUsages;
use bevy::ecs::system::SystemParam;
use bevy::mesh::Indices;
use bevy::prelude::*;
use bevy::render::render_resource::{Extent3d, PrimitiveTopology, TextureDimension, TextureFormat};
use std::collections::HashMap;

use rendermodel_core::device::Side;
use rendermodel_core::error::RenderModelError;
use rendermodel_core::resource::{MeshSection, TextureInfo};
use rendermodel_core::scene::{
    battery_material_asset, MaterialId, NodeId, PrefabSource, SceneBackend, SectionBuild,
    SectionTransform, TextureId,
};

/// Marker for a spawned mesh section
#[derive(Component)]
pub struct RenderModelSection {
    pub index: usize,
}

/// Marker for a spawned fallback prefab (or its rotation wrapper)
#[derive(Component)]
pub struct RenderModelPrefab;

/// Mapping from core ids to Bevy entities and asset handles
#[derive(Resource, Default)]
pub struct SceneRegistry {
    next_id: u64,
    nodes: HashMap<NodeId, Entity>,
    node_materials: HashMap<NodeId, Handle<StandardMaterial>>,
    textures: HashMap<TextureId, Handle<Image>>,
    materials: HashMap<MaterialId, Handle<StandardMaterial>>,
}

impl SceneRegistry {
    fn next(&mut self) -> u64 {
        self.next_id += 1;
        self.next_id
    }

    pub fn entity(&self, node: NodeId) -> Option<Entity> {
        self.nodes.get(&node).copied()
    }
}

/// Battery material template per hand. Apps may replace either entry;
/// a hand without one gets no battery material.
#[derive(Resource, Default)]
pub struct BatteryMaterials {
    templates: HashMap<Side, Handle<StandardMaterial>>,
}

impl BatteryMaterials {
    pub fn insert(&mut self, side: Side, material: Handle<StandardMaterial>) {
        self.templates.insert(side, material);
    }

    pub fn get(&self, side: Side) -> Option<&Handle<StandardMaterial>> {
        self.templates.get(&side)
    }

    pub fn remove(&mut self, side: Side) -> Option<Handle<StandardMaterial>> {
        self.templates.remove(&side)
    }

    /// Add the built-in template for every hand that has none
    pub fn ensure_defaults(&mut self, materials: &mut Assets<StandardMaterial>) {
        for side in [Side::Right, Side::Left] {
            self.templates.entry(side).or_insert_with(|| {
                tracing::debug!("Loaded {}", battery_material_asset(side));
                materials.add(battery_template())
            });
        }
    }
}

fn battery_template() -> StandardMaterial {
    StandardMaterial {
        unlit: true,
        alpha_mode: AlphaMode::Blend,
        ..default()
    }
}

/// Asset path of a prefab. Built-in prefabs ship as binary glTF.
pub fn prefab_asset_path(prefab: &PrefabSource) -> String {
    match prefab {
        PrefabSource::Configured(path) => path.clone(),
        PrefabSource::Builtin(builtin) => format!("{}.glb", builtin.asset_path()),
    }
}

fn to_transform(transform: &SectionTransform) -> Transform {
    Transform {
        translation: Vec3::from_array(transform.translation.to_array()),
        rotation: Quat::from_array(transform.rotation.to_array()),
        scale: Vec3::from_array(transform.scale.to_array()),
    }
}

fn section_mesh(section: &MeshSection) -> Mesh {
    let mut mesh = Mesh::new(PrimitiveTopology::TriangleList, RenderAssetUsages::default())
        .with_inserted_attribute(Mesh::ATTRIBUTE_POSITION, section.vertices.clone())
        .with_inserted_indices(Indices::U32(section.indices.clone()));

    if !section.normals.is_empty() {
        mesh.insert_attribute(Mesh::ATTRIBUTE_NORMAL, section.normals.clone());
    } else {
        mesh.compute_smooth_normals();
    }
    if !section.uvs.is_empty() {
        mesh.insert_attribute(Mesh::ATTRIBUTE_UV_0, section.uvs.clone());
    }
    mesh
}

/// Everything a controller needs to touch the Bevy world
#[derive(SystemParam)]
pub struct SceneAssets<'w, 's> {
    commands: Commands<'w, 's>,
    meshes: ResMut<'w, Assets<Mesh>>,
    images: ResMut<'w, Assets<Image>>,
    materials: ResMut<'w, Assets<StandardMaterial>>,
    asset_server: Res<'w, AssetServer>,
    registry: ResMut<'w, SceneRegistry>,
    battery_materials: Res<'w, BatteryMaterials>,
}

impl<'w, 's> SceneAssets<'w, 's> {
    /// Backend that parents new nodes to `root`
    pub fn for_entity(&mut self, root: Entity) -> BevyScene<'_, 'w, 's> {
        BevyScene { assets: self, root }
    }
}

pub struct BevyScene<'a, 'w, 's> {
    assets: &'a mut SceneAssets<'w, 's>,
    root: Entity,
}

impl BevyScene<'_, '_, '_> {
    fn visibility(visible: bool) -> Visibility {
        if visible {
            Visibility::Inherited
        } else {
            Visibility::Hidden
        }
    }

    fn insert_node(&mut self, entity: Entity) -> NodeId {
        let id = NodeId(self.assets.registry.next());
        self.assets.registry.nodes.insert(id, entity);
        id
    }
}

impl SceneBackend for BevyScene<'_, '_, '_> {
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

        let image = Image::new(
            Extent3d {
                width: info.width,
                height: info.height,
                depth_or_array_layers: 1,
            },
            TextureDimension::D2,
            info.data.clone(),
            TextureFormat::Rgba8UnormSrgb,
            RenderAssetUsages::default(),
        );
        let handle = self.assets.images.add(image);
        let id = TextureId(self.assets.registry.next());
        self.assets.registry.textures.insert(id, handle);
        tracing::debug!("Texture {} uploaded ({}x{})", name, info.width, info.height);
        Ok(id)
    }

    fn create_unlit_material(&mut self) -> MaterialId {
        let handle = self.assets.materials.add(StandardMaterial {
            unlit: true,
            ..default()
        });
        let id = MaterialId(self.assets.registry.next());
        self.assets.registry.materials.insert(id, handle);
        id
    }

    fn create_battery_material(&mut self, side: Side) -> Option<MaterialId> {
        // Each build gets its own instance of the hand's template
        let template = self
            .assets
            .battery_materials
            .get(side)
            .and_then(|handle| self.assets.materials.get(handle))
            .cloned()?;
        let handle = self.assets.materials.add(template);
        let id = MaterialId(self.assets.registry.next());
        self.assets.registry.materials.insert(id, handle);
        tracing::debug!("Battery material {} instanced", battery_material_asset(side));
        Some(id)
    }

    fn release_material(&mut self, material: MaterialId) {
        if let Some(handle) = self.assets.registry.materials.remove(&material) {
            self.assets.materials.remove(&handle);
        }
    }

    fn spawn_section(&mut self, build: &SectionBuild<'_>) -> Result<NodeId, RenderModelError> {
        if build.section.indices.len() % 3 != 0 {
            return Err(RenderModelError::Scene(format!(
                "section {} has {} indices, not a triangle list",
                build.name,
                build.section.indices.len()
            )));
        }
        let mesh = self.assets.meshes.add(section_mesh(build.section));

        // Each section gets its own material instance so its texture can change alone
        let mut material = build
            .material
            .and_then(|id| self.assets.registry.materials.get(&id))
            .and_then(|handle| self.assets.materials.get(handle))
            .cloned()
            .unwrap_or_else(|| StandardMaterial {
                unlit: true,
                ..default()
            });
        material.base_color_texture = build
            .texture
            .and_then(|id| self.assets.registry.textures.get(&id))
            .cloned();
        let material = self.assets.materials.add(material);

        let entity = self
            .assets
            .commands
            .spawn((
                Name::new(build.name.to_string()),
                Mesh3d(mesh),
                MeshMaterial3d(material.clone()),
                to_transform(&build.transform),
                Visibility::Hidden,
                RenderModelSection { index: build.index },
            ))
            .id();
        self.assets.commands.entity(self.root).add_child(entity);

        let node = self.insert_node(entity);
        self.assets.registry.node_materials.insert(node, material);
        Ok(node)
    }

    fn set_material(&mut self, node: NodeId, material: MaterialId) {
        let (Some(entity), Some(handle)) = (
            self.assets.registry.entity(node),
            self.assets.registry.materials.get(&material).cloned(),
        ) else {
            return;
        };
        self.assets
            .commands
            .entity(entity)
            .try_insert(MeshMaterial3d(handle.clone()));
        self.assets.registry.node_materials.insert(node, handle);
    }

    fn set_main_texture(&mut self, node: NodeId, texture: TextureId) {
        let Some(image) = self.assets.registry.textures.get(&texture).cloned() else {
            return;
        };
        let Some(handle) = self.assets.registry.node_materials.get(&node) else {
            return;
        };
        if let Some(material) = self.assets.materials.get_mut(handle) {
            material.base_color_texture = Some(image);
        }
    }

    fn set_renderer_enabled(&mut self, node: NodeId, enabled: bool) {
        if let Some(entity) = self.assets.registry.entity(node) {
            self.assets
                .commands
                .entity(entity)
                .try_insert(Self::visibility(enabled));
        }
    }

    fn spawn_prefab(&mut self, prefab: &PrefabSource, yaw_degrees: Option<f32>) -> Option<NodeId> {
        let path = prefab_asset_path(prefab);
        tracing::info!("Spawning fallback model from {}", path);
        let scene: Handle<Scene> = self
            .assets
            .asset_server
            .load(GltfAssetLabel::Scene(0).from_asset(path));

        let instance = self
            .assets
            .commands
            .spawn((
                SceneRoot(scene),
                Transform::default(),
                Visibility::default(),
                RenderModelPrefab,
            ))
            .id();

        let root = match yaw_degrees {
            Some(yaw) => {
                let wrapper = self
                    .assets
                    .commands
                    .spawn((
                        Name::new("rot180"),
                        Transform::from_rotation(Quat::from_rotation_y(yaw.to_radians())),
                        Visibility::default(),
                        RenderModelPrefab,
                    ))
                    .id();
                self.assets.commands.entity(wrapper).add_child(instance);
                wrapper
            }
            None => instance,
        };
        self.assets.commands.entity(self.root).add_child(root);
        Some(self.insert_node(root))
    }

    fn set_active(&mut self, node: NodeId, active: bool) {
        self.set_renderer_enabled(node, active);
    }

    fn despawn(&mut self, node: NodeId) {
        self.assets.registry.node_materials.remove(&node);
        if let Some(entity) = self.assets.registry.nodes.remove(&node) {
            if let Ok(mut entity) = self.assets.commands.get_entity(entity) {
                entity.despawn();
            }
        }
    }
}
