//! Incremental render model construction
//!
//! The build is an explicit step machine. The host calls `resume` once per
//! frame boundary; each call runs until the next suspension point:
//!
//! 1. waiting for the resource's parser-ready gate (re-polled every call),
//! 2. after each texture decoded,
//! 3. after each mesh section spawned.
//!
//! The builder holds no engine objects itself. Everything it creates goes
//! into the caller's `ModelSlot`, so dropping the builder is a complete
//! cancellation: whoever owns the slot destroys the partial build.

use std::sync::Arc;
use tracing::{debug, info, warn};

use crate::battery::BatterySlot;
use crate::component::ChildSet;
use crate::device::Side;
use crate::error::RenderModelError;
use crate::resource::{MeshSection, ModelData, ModelResource};
use crate::scene::{MaterialId, NodeId, SceneBackend, SectionBuild, SectionTransform};

pub const EMITTER_MESH: &str = "__CM__Emitter";
pub const BATTERY_MESH: &str = "__CM__Battery";
pub const TOUCH_MESH: &str = "__CM__TouchPad_Touch";

/// Visibility policy of a mesh section, chosen by its name
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum SectionRole {
    /// Always visible
    Emitter,
    /// Hidden until a battery level is known
    Battery,
    /// Hidden until touched
    Touch,
    /// Visible according to the section's active flag
    Regular,
}

impl SectionRole {
    pub fn classify(mesh_name: &str) -> Self {
        match mesh_name {
            EMITTER_MESH => SectionRole::Emitter,
            BATTERY_MESH => SectionRole::Battery,
            TOUCH_MESH => SectionRole::Touch,
            _ => SectionRole::Regular,
        }
    }

    pub fn initial_visibility(self, section: &MeshSection) -> bool {
        match self {
            SectionRole::Emitter => true,
            SectionRole::Battery | SectionRole::Touch => false,
            SectionRole::Regular => section.active,
        }
    }
}

/// Everything a build produces, owned by the controller
#[derive(Debug, Default)]
pub struct ModelSlot {
    pub resource: Option<Arc<ModelResource>>,
    pub children: Option<ChildSet>,
    pub battery: BatterySlot,
    /// Per-hand battery material created for the battery mesh
    pub battery_material: Option<MaterialId>,
}

impl ModelSlot {
    /// Destroy every node built into this slot and drop the resource handle.
    /// Provider-owned textures are left alone.
    pub fn clear(&mut self, scene: &mut dyn SceneBackend) {
        if let Some(mut children) = self.children.take() {
            children.clear(scene);
        }
        if let Some(material) = self.battery_material.take() {
            scene.release_material(material);
        }
        self.battery = BatterySlot::default();
        self.resource = None;
    }

    pub fn live_component_count(&self) -> usize {
        self.children.as_ref().map(ChildSet::live_count).unwrap_or(0)
    }
}

/// Where the build currently stands
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum BuildStep {
    AwaitParser,
    DecodeTextures { next: usize },
    PrepareChildren,
    BuildSections { next: usize },
    Finished,
}

#[derive(Debug)]
pub enum BuildAbort {
    /// The resource handle went away while the build was suspended
    ResourceMissing,
    /// The resource or backend could not produce a usable model
    Failed(RenderModelError),
}

#[derive(Debug)]
pub enum StepOutcome {
    /// Suspended; resume at the next frame boundary
    Yield,
    /// All sections built
    Complete,
    Aborted(BuildAbort),
}

#[derive(Debug, Clone)]
pub struct ModelBuilder {
    side: Side,
    step: BuildStep,
}

impl ModelBuilder {
    pub fn new(side: Side) -> Self {
        Self {
            side,
            step: BuildStep::AwaitParser,
        }
    }

    pub fn step(&self) -> BuildStep {
        self.step
    }

    /// Run until the next suspension point
    pub fn resume(
        &mut self,
        slot: &mut ModelSlot,
        material: Option<MaterialId>,
        scene: &mut dyn SceneBackend,
    ) -> StepOutcome {
        let Some(resource) = slot.resource.clone() else {
            debug!(side = %self.side, "Model resource is gone, abandoning build");
            return StepOutcome::Aborted(BuildAbort::ResourceMissing);
        };

        loop {
            match self.step {
                BuildStep::AwaitParser => {
                    if !resource.is_parser_ready() {
                        debug!(side = %self.side, model = resource.name(), "Waiting for model parser");
                        return StepOutcome::Yield;
                    }
                    info!(side = %self.side, model = resource.name(), "Start to spawn all meshes");
                    self.step = BuildStep::DecodeTextures { next: 0 };
                }
                BuildStep::DecodeTextures { next } => {
                    let Some(data) = resource.data() else {
                        return StepOutcome::Aborted(BuildAbort::ResourceMissing);
                    };
                    if data.textures.is_empty() {
                        return self.fail(RenderModelError::incomplete(resource.name(), "model has no texture"));
                    }
                    let Some(texture) = data.textures.get(next) else {
                        self.step = BuildStep::PrepareChildren;
                        continue;
                    };
                    self.step = BuildStep::DecodeTextures { next: next + 1 };
                    if texture.is_materialized() {
                        continue;
                    }
                    let name = format!("{}#{}", resource.name(), next);
                    match texture.materialize(|info| scene.create_texture(&name, info)) {
                        Ok(id) => {
                            debug!(side = %self.side, texture = %name, id = id.0, "Texture created");
                            return StepOutcome::Yield;
                        }
                        Err(e) => return self.fail(e),
                    }
                }
                BuildStep::PrepareChildren => {
                    let count = resource.section_count();
                    match slot.children.as_ref().map(ChildSet::len) {
                        Some(len) if len == count => {}
                        Some(len) => {
                            debug!(side = %self.side, old = len, new = count, "Reallocating child set");
                            if let Some(mut old) = slot.children.take() {
                                old.clear(scene);
                            }
                            slot.children = Some(ChildSet::with_len(count));
                        }
                        None => {
                            debug!(side = %self.side, count, "Allocating child set");
                            slot.children = Some(ChildSet::with_len(count));
                        }
                    }
                    self.step = BuildStep::BuildSections { next: 0 };
                }
                BuildStep::BuildSections { next } => {
                    let Some(data) = resource.data() else {
                        return StepOutcome::Aborted(BuildAbort::ResourceMissing);
                    };
                    if next >= data.section_count() {
                        self.step = BuildStep::Finished;
                        continue;
                    }
                    self.step = BuildStep::BuildSections { next: next + 1 };

                    let section = &data.sections[next];
                    if data.sections[..next].iter().any(|s| s.mesh_name == section.mesh_name) {
                        debug!(side = %self.side, mesh = %section.mesh_name, "Mesh already created, skip");
                        continue;
                    }

                    if let Err(e) = self.build_section(&resource, data, next, slot, material, scene) {
                        return self.fail(e);
                    }
                    return StepOutcome::Yield;
                }
                BuildStep::Finished => return StepOutcome::Complete,
            }
        }
    }

    fn fail(&mut self, error: RenderModelError) -> StepOutcome {
        warn!(side = %self.side, error = %error, "Render model build aborted");
        StepOutcome::Aborted(BuildAbort::Failed(error))
    }

    fn build_section(
        &self,
        resource: &ModelResource,
        data: &ModelData,
        index: usize,
        slot: &mut ModelSlot,
        material: Option<MaterialId>,
        scene: &mut dyn SceneBackend,
    ) -> Result<(), RenderModelError> {
        let section = &data.sections[index];
        validate_section(resource.name(), section)?;

        let transform = SectionTransform::from_runtime_matrix(&section.matrix);
        let node = scene.spawn_section(&SectionBuild {
            index,
            name: &section.mesh_name,
            section,
            transform,
            material,
            texture: data.textures.first().and_then(|t| t.texture()),
        })?;

        let role = SectionRole::classify(&section.mesh_name);
        if role == SectionRole::Battery {
            if let Err(e) = self.bind_battery(resource, data, node, slot, scene) {
                scene.despawn(node);
                return Err(e);
            }
            slot.battery.index = Some(index);
        }

        let visible = role.initial_visibility(section);
        debug!(
            side = %self.side,
            index,
            mesh = %section.mesh_name,
            visible,
            position = ?transform.translation,
            "Mesh section created"
        );

        match slot.children.as_mut() {
            Some(children) => children.put(scene, index, node, visible),
            None => scene.despawn(node),
        }
        Ok(())
    }

    fn bind_battery(
        &self,
        resource: &ModelResource,
        data: &ModelData,
        node: NodeId,
        slot: &mut ModelSlot,
        scene: &mut dyn SceneBackend,
    ) -> Result<(), RenderModelError> {
        slot.battery.ready = false;
        let Some(indicators) = data.battery_list() else {
            return Ok(());
        };

        if let Some(material) = scene.create_battery_material(self.side) {
            if let Some(old) = slot.battery_material.replace(material) {
                scene.release_material(old);
            }
            scene.set_material(node, material);
        } else {
            warn!(side = %self.side, "Battery material is missing");
        }

        for (i, indicator) in indicators.iter().enumerate() {
            let name = format!("{}#battery{}", resource.name(), i);
            indicator
                .texture
                .materialize(|info| scene.create_texture(&name, info))?;
            debug!(
                side = %self.side,
                min = indicator.min,
                max = indicator.max,
                level = indicator.level,
                "Battery texture loaded"
            );
        }

        if let Some(first) = indicators[0].texture.texture() {
            scene.set_main_texture(node, first);
        }
        slot.battery.ready = true;
        Ok(())
    }
}

/// Check that a section's arrays are consistent before building it
pub fn validate_section(model: &str, section: &MeshSection) -> Result<(), RenderModelError> {
    let vertex_count = section.vertices.len();
    if vertex_count == 0 {
        return Err(RenderModelError::incomplete(
            model,
            format!("section {} has no vertices", section.mesh_name),
        ));
    }
    if let Some(bad) = section.indices.iter().find(|&&i| i as usize >= vertex_count) {
        return Err(RenderModelError::incomplete(
            model,
            format!("section {} index {} out of {} vertices", section.mesh_name, bad, vertex_count),
        ));
    }
    if !section.normals.is_empty() && section.normals.len() != vertex_count {
        return Err(RenderModelError::incomplete(
            model,
            format!("section {} has {} normals for {} vertices", section.mesh_name, section.normals.len(), vertex_count),
        ));
    }
    if !section.uvs.is_empty() && section.uvs.len() != vertex_count {
        return Err(RenderModelError::incomplete(
            model,
            format!("section {} has {} uvs for {} vertices", section.mesh_name, section.uvs.len(), vertex_count),
        ));
    }
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::headless::HeadlessScene;
    use crate::resource::{BatteryIndicator, ModelKey, TextureInfo};

    fn section(name: &str) -> MeshSection {
        MeshSection {
            mesh_name: name.to_string(),
            vertices: vec![[0.0, 0.0, 0.0], [1.0, 0.0, 0.0], [0.0, 1.0, 0.0]],
            normals: vec![[0.0, 0.0, 1.0]; 3],
            uvs: vec![[0.0, 0.0], [1.0, 0.0], [0.0, 1.0]],
            indices: vec![0, 1, 2],
            active: true,
            matrix: glam::Mat4::IDENTITY.to_cols_array(),
        }
    }

    fn model(names: &[&str], textures: usize) -> ModelData {
        ModelData {
            sections: names.iter().map(|n| section(n)).collect(),
            textures: (0..textures).map(|_| TextureInfo::new(1, 1, vec![9; 4])).collect(),
            battery_setting: false,
            battery_indicators: None,
        }
    }

    fn slot_for(data: ModelData) -> ModelSlot {
        ModelSlot {
            resource: Some(Arc::new(ModelResource::ready(
                ModelKey::new("WVR_CR_Right_001", Side::Right, false),
                data,
            ))),
            ..Default::default()
        }
    }

    fn run(builder: &mut ModelBuilder, slot: &mut ModelSlot, scene: &mut HeadlessScene) -> (usize, StepOutcome) {
        let mut yields = 0;
        loop {
            match builder.resume(slot, None, scene) {
                StepOutcome::Yield => yields += 1,
                other => return (yields, other),
            }
        }
    }

    #[test]
    fn test_waits_for_parser() {
        let key = ModelKey::new("WVR_CR_Right_001", Side::Right, false);
        let resource = Arc::new(ModelResource::pending(key));
        let mut slot = ModelSlot {
            resource: Some(resource.clone()),
            ..Default::default()
        };
        let mut scene = HeadlessScene::new();
        let mut builder = ModelBuilder::new(Side::Right);

        for _ in 0..3 {
            assert!(matches!(builder.resume(&mut slot, None, &mut scene), StepOutcome::Yield));
            assert_eq!(builder.step(), BuildStep::AwaitParser);
        }

        resource.publish(model(&["__CM__Body"], 1));
        let (_, outcome) = run(&mut builder, &mut slot, &mut scene);
        assert!(matches!(outcome, StepOutcome::Complete));
        assert_eq!(slot.live_component_count(), 1);
    }

    #[test]
    fn test_yields_per_texture_and_section() {
        let mut slot = slot_for(model(&["a", "b", "c"], 2));
        let mut scene = HeadlessScene::new();
        let mut builder = ModelBuilder::new(Side::Right);

        let (yields, outcome) = run(&mut builder, &mut slot, &mut scene);
        assert!(matches!(outcome, StepOutcome::Complete));
        assert_eq!(yields, 2 + 3);
        assert_eq!(scene.texture_count(), 2);
    }

    #[test]
    fn test_dedup_against_all_earlier_sections() {
        let names = ["__CM__Body", "b", "__CM__Body", "c", "d", "__CM__Body"];
        let mut slot = slot_for(model(&names, 1));
        let mut scene = HeadlessScene::new();
        let mut builder = ModelBuilder::new(Side::Right);

        let (_, outcome) = run(&mut builder, &mut slot, &mut scene);
        assert!(matches!(outcome, StepOutcome::Complete));

        let children = slot.children.as_ref().unwrap();
        assert_eq!(children.len(), 6);
        assert!(children.get(0).is_some());
        assert!(children.get(2).is_none());
        assert!(children.get(5).is_none());
        assert_eq!(children.live_count(), 4);

        let bodies = scene
            .section_nodes()
            .into_iter()
            .filter(|(_, n)| n.name == "__CM__Body")
            .count();
        assert_eq!(bodies, 1);
    }

    #[test]
    fn test_section_roles() {
        let mut data = model(&[EMITTER_MESH, TOUCH_MESH, "hidden", "shown"], 1);
        data.sections[0].active = false;
        data.sections[2].active = false;
        let mut slot = slot_for(data);
        let mut scene = HeadlessScene::new();
        let mut builder = ModelBuilder::new(Side::Right);
        run(&mut builder, &mut slot, &mut scene);

        let children = slot.children.as_ref().unwrap();
        let visible: Vec<bool> = (0..4)
            .map(|i| children.get(i).unwrap().is_content_visible())
            .collect();
        assert_eq!(visible, vec![true, false, false, true]);
        assert!(scene.section_nodes().iter().all(|(_, n)| !n.renderer_enabled));
    }

    #[test]
    fn test_battery_binding() {
        let mut data = model(&["__CM__Body", BATTERY_MESH], 1);
        data.battery_setting = true;
        data.battery_indicators = Some(vec![
            BatteryIndicator {
                min: 0.0,
                max: 50.0,
                level: 0,
                texture: TextureInfo::new(1, 1, vec![1; 4]),
            },
            BatteryIndicator {
                min: 50.0,
                max: 100.0,
                level: 1,
                texture: TextureInfo::new(1, 1, vec![2; 4]),
            },
        ]);
        let mut slot = slot_for(data);
        let mut scene = HeadlessScene::new();
        let mut builder = ModelBuilder::new(Side::Left);
        run(&mut builder, &mut slot, &mut scene);

        assert_eq!(slot.battery.index, Some(1));
        assert!(slot.battery.ready);
        assert_eq!(
            scene.battery_material_asset(slot.battery_material.unwrap()),
            Some("Materials/WaveBatteryMatL")
        );
        assert!(!slot.children.as_ref().unwrap().get(1).unwrap().is_content_visible());

        let resource = slot.resource.clone().unwrap();
        let indicators = resource.data().unwrap().battery_list().unwrap();
        let (_, battery) = scene.find_section(BATTERY_MESH).unwrap();
        assert_eq!(battery.main_texture, indicators[0].texture.texture());
        assert!(indicators.iter().all(|bi| bi.texture.is_materialized()));
    }

    #[test]
    fn test_battery_without_setting_not_ready() {
        let mut slot = slot_for(model(&[BATTERY_MESH], 1));
        let mut scene = HeadlessScene::new();
        let mut builder = ModelBuilder::new(Side::Left);
        run(&mut builder, &mut slot, &mut scene);

        assert_eq!(slot.battery.index, Some(0));
        assert!(!slot.battery.ready);
        assert!(slot.battery_material.is_none());
    }

    #[test]
    fn test_textures_reused_across_builds() {
        let mut slot = slot_for(model(&["a", "b"], 2));
        let resource = slot.resource.clone().unwrap();
        let mut scene = HeadlessScene::new();

        let mut first = ModelBuilder::new(Side::Right);
        run(&mut first, &mut slot, &mut scene);
        slot.clear(&mut scene);
        assert_eq!(scene.live_node_count(), 0);
        assert_eq!(scene.texture_count(), 2);

        slot.resource = Some(resource);
        let mut second = ModelBuilder::new(Side::Right);
        let (yields, outcome) = run(&mut second, &mut slot, &mut scene);
        assert!(matches!(outcome, StepOutcome::Complete));
        assert_eq!(yields, 2);
        assert_eq!(scene.texture_count(), 2);
    }

    #[test]
    fn test_child_set_reallocated_on_count_change() {
        let mut slot = slot_for(model(&["a", "b", "c"], 1));
        let mut scene = HeadlessScene::new();
        let mut first = ModelBuilder::new(Side::Right);
        run(&mut first, &mut slot, &mut scene);

        let stale: Vec<NodeId> = slot.children.as_ref().unwrap().handles().map(|h| h.node()).collect();
        assert_eq!(stale.len(), 3);

        slot.resource = slot_for(model(&["x", "y"], 1)).resource;
        let mut second = ModelBuilder::new(Side::Right);
        let (_, outcome) = run(&mut second, &mut slot, &mut scene);
        assert!(matches!(outcome, StepOutcome::Complete));

        let children = slot.children.as_ref().unwrap();
        assert_eq!(children.len(), 2);
        assert_eq!(children.live_count(), 2);
        assert!(stale.iter().all(|node| scene.node(*node).is_none()));
        assert_eq!(scene.live_node_count(), 2);
    }

    #[test]
    fn test_abort_when_resource_cleared() {
        let key = ModelKey::new("WVR_CR_Right_001", Side::Right, false);
        let mut slot = ModelSlot {
            resource: Some(Arc::new(ModelResource::pending(key))),
            ..Default::default()
        };
        let mut scene = HeadlessScene::new();
        let mut builder = ModelBuilder::new(Side::Right);
        assert!(matches!(builder.resume(&mut slot, None, &mut scene), StepOutcome::Yield));

        slot.resource = None;
        assert!(matches!(
            builder.resume(&mut slot, None, &mut scene),
            StepOutcome::Aborted(BuildAbort::ResourceMissing)
        ));
        assert_eq!(scene.spawned_total, 0);
    }

    #[test]
    fn test_incomplete_section_aborts() {
        let mut data = model(&["a", "b"], 1);
        data.sections[1].indices = vec![0, 1, 7];
        let mut slot = slot_for(data);
        let mut scene = HeadlessScene::new();
        let mut builder = ModelBuilder::new(Side::Right);

        let (_, outcome) = run(&mut builder, &mut slot, &mut scene);
        assert!(matches!(
            outcome,
            StepOutcome::Aborted(BuildAbort::Failed(RenderModelError::ResourceIncomplete { .. }))
        ));
        assert_eq!(slot.live_component_count(), 1);

        slot.clear(&mut scene);
        assert_eq!(scene.live_node_count(), 0);
    }

    #[test]
    fn test_no_texture_is_incomplete() {
        let mut slot = slot_for(model(&["a"], 0));
        let mut scene = HeadlessScene::new();
        let mut builder = ModelBuilder::new(Side::Right);
        assert!(matches!(
            builder.resume(&mut slot, None, &mut scene),
            StepOutcome::Aborted(BuildAbort::Failed(_))
        ));
    }
}
