//! Spawned mesh sections and their two-axis visibility

use tracing::debug;

use crate::scene::{NodeId, SceneBackend};

/// One spawned mesh section.
///
/// Visibility has two independent inputs: whether the section should be
/// seen when the model is shown (`content_visible`), and whether the model
/// is shown at all (`show_state`). The renderer is enabled exactly when
/// both are true, and every setter pushes that to the backend immediately.
#[derive(Debug)]
pub struct ComponentHandle {
    node: NodeId,
    content_visible: bool,
    show_state: bool,
}

impl ComponentHandle {
    /// Take ownership of a freshly spawned node. Its renderer starts disabled.
    pub fn new(node: NodeId, content_visible: bool) -> Self {
        Self {
            node,
            content_visible,
            show_state: false,
        }
    }

    /// Replace the owned node, destroying the previous one first
    pub fn update(&mut self, scene: &mut dyn SceneBackend, node: NodeId, content_visible: bool) {
        if self.node != node {
            scene.despawn(self.node);
        }
        self.node = node;
        self.content_visible = content_visible;
        self.apply(scene);
    }

    /// Destroy the owned node
    pub fn clear(self, scene: &mut dyn SceneBackend) {
        debug!(node = self.node.0, "Clearing component");
        scene.despawn(self.node);
    }

    pub fn set_content_visible(&mut self, scene: &mut dyn SceneBackend, visible: bool) {
        self.content_visible = visible;
        self.apply(scene);
    }

    pub fn set_show_state(&mut self, scene: &mut dyn SceneBackend, show: bool) {
        self.show_state = show;
        self.apply(scene);
    }

    pub fn node(&self) -> NodeId {
        self.node
    }

    pub fn is_content_visible(&self) -> bool {
        self.content_visible
    }

    pub fn show_state(&self) -> bool {
        self.show_state
    }

    pub fn is_effectively_visible(&self) -> bool {
        self.content_visible && self.show_state
    }

    fn apply(&self, scene: &mut dyn SceneBackend) {
        scene.set_renderer_enabled(self.node, self.is_effectively_visible());
    }
}

/// Component handles indexed by mesh section
#[derive(Debug, Default)]
pub struct ChildSet {
    slots: Vec<Option<ComponentHandle>>,
}

impl ChildSet {
    pub fn with_len(len: usize) -> Self {
        let mut slots = Vec::with_capacity(len);
        slots.resize_with(len, || None);
        Self { slots }
    }

    pub fn len(&self) -> usize {
        self.slots.len()
    }

    pub fn is_empty(&self) -> bool {
        self.slots.is_empty()
    }

    pub fn get(&self, index: usize) -> Option<&ComponentHandle> {
        self.slots.get(index).and_then(Option::as_ref)
    }

    pub fn get_mut(&mut self, index: usize) -> Option<&mut ComponentHandle> {
        self.slots.get_mut(index).and_then(Option::as_mut)
    }

    /// Create the handle at `index`, or move the existing one onto `node`
    pub fn put(&mut self, scene: &mut dyn SceneBackend, index: usize, node: NodeId, content_visible: bool) {
        let Some(slot) = self.slots.get_mut(index) else {
            // Out-of-range slots are rejected before a node is spawned
            scene.despawn(node);
            return;
        };
        match slot {
            Some(handle) => handle.update(scene, node, content_visible),
            None => *slot = Some(ComponentHandle::new(node, content_visible)),
        }
    }

    /// Number of slots holding a handle
    pub fn live_count(&self) -> usize {
        self.slots.iter().filter(|s| s.is_some()).count()
    }

    pub fn handles(&self) -> impl Iterator<Item = &ComponentHandle> {
        self.slots.iter().flatten()
    }

    pub fn set_show_state_all(&mut self, scene: &mut dyn SceneBackend, show: bool) {
        for handle in self.slots.iter_mut().flatten() {
            handle.set_show_state(scene, show);
        }
    }

    /// Destroy every handle's node and empty the set
    pub fn clear(&mut self, scene: &mut dyn SceneBackend) {
        debug!(count = self.slots.len(), "Deleting children");
        for handle in self.slots.drain(..).flatten() {
            handle.clear(scene);
        }
    }
}
