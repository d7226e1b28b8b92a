use crate::mesh::Mesh;
use crate::resource::Id;

use super::{Layer, SortKey};

/// One placement of a mesh in the scene.
#[derive(Debug, Clone, PartialEq)]
pub struct Instance {
    pub key: SortKey,
    pub mesh: Id<Mesh>,
    pub visible: bool,
}

/// Mesh instances drawn by the `"scene"` generator.
///
/// Draw order is layer then insertion order. The order buffer is rebuilt
/// lazily and reused, so a static scene costs no allocation per frame.
#[derive(Debug, Default)]
pub struct Scene {
    instances: Vec<Instance>,
    next_order: u32,

    sorted_indices: Vec<usize>,
    sorted_dirty: bool,
}

impl Scene {
    #[inline]
    pub fn new() -> Self {
        Self::default()
    }

    /// Removes every instance. Keeps allocated capacity for reuse.
    #[inline]
    pub fn clear(&mut self) {
        self.instances.clear();
        self.next_order = 0;
        self.sorted_indices.clear();
        self.sorted_dirty = true;
    }

    #[inline]
    pub fn len(&self) -> usize {
        self.instances.len()
    }

    #[inline]
    pub fn is_empty(&self) -> bool {
        self.instances.is_empty()
    }

    /// Instances in insertion order.
    #[inline]
    pub fn instances(&self) -> &[Instance] {
        &self.instances
    }

    /// Adds `mesh` on `layer`; returns the instance's index.
    pub fn add(&mut self, layer: Layer, mesh: Id<Mesh>) -> usize {
        let order = self.next_order;
        self.next_order = self.next_order.wrapping_add(1);

        self.instances.push(Instance {
            key: SortKey::new(layer, order),
            mesh,
            visible: true,
        });
        self.sorted_dirty = true;
        self.instances.len() - 1
    }

    /// Shows or hides an instance. Out-of-range indices are ignored.
    pub fn set_visible(&mut self, index: usize, visible: bool) {
        if let Some(inst) = self.instances.get_mut(index) {
            inst.visible = visible;
        }
    }

    /// Drops every instance of `mesh`.
    pub fn remove_mesh(&mut self, mesh: Id<Mesh>) {
        let before = self.instances.len();
        self.instances.retain(|i| i.mesh != mesh);
        if self.instances.len() != before {
            self.sorted_dirty = true;
        }
    }

    /// Rebuilds the draw order if instances changed.
    pub(crate) fn prepare(&mut self) {
        if !self.sorted_dirty {
            return;
        }
        self.sorted_indices.clear();
        self.sorted_indices.extend(0..self.instances.len());
        self.sorted_indices
            .sort_by(|&a, &b| self.instances[a].key.cmp(&self.instances[b].key));
        self.sorted_dirty = false;
    }

    /// Visible instances in draw order, as of the last `prepare`.
    pub fn draw_order(&self) -> impl Iterator<Item = &Instance> {
        debug_assert!(!self.sorted_dirty, "scene draw order read before prepare");
        self.sorted_indices
            .iter()
            .filter_map(|&i| self.instances.get(i))
            .filter(|inst| inst.visible)
    }
}
