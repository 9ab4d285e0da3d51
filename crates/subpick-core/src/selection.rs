//! Selection store: which draw ranges, on which meshes, are selected.
//!
//! The store is the single source of truth for selection. Meshes never see it;
//! every mutation pushes the resulting highlight state into the affected
//! meshes before returning, so the visual state never lags the logical one.

use std::collections::{HashMap, HashSet};

use crate::draw_range::RangeId;
use crate::registry::{MeshId, Registry};

/// Snapshot of the selection: mesh -> selected range ids.
pub type SelectionSnapshot = HashMap<MeshId, HashSet<RangeId>>;

/// Mesh -> selected range ids, kept in sync with mesh highlight groups.
#[derive(Debug, Default)]
pub struct SelectionStore {
    entries: HashMap<MeshId, HashSet<RangeId>>,
}

impl SelectionStore {
    pub fn new() -> Self {
        Self::default()
    }

    /// Adds a range to the selection. Returns `false` if the mesh or range is unknown.
    pub fn add_selected_object(
        &mut self,
        meshes: &mut Registry,
        mesh: MeshId,
        range_id: &str,
    ) -> bool {
        let Some(target) = meshes.mesh_mut(mesh) else {
            log::debug!("select: {mesh} is not registered");
            return false;
        };
        if !target.draw_ranges().contains_key(range_id) {
            log::debug!("select: {mesh} has no draw range '{range_id}'");
            return false;
        }

        let set = self.entries.entry(mesh).or_default();
        set.insert(range_id.to_string());
        target.update_selection_groups(set.iter());
        true
    }

    /// Removes a range from the selection. Returns `false` if it was not selected.
    ///
    /// Removing a mesh's last range drops its entry and clears its highlight.
    pub fn remove_selected_object(
        &mut self,
        meshes: &mut Registry,
        mesh: MeshId,
        range_id: &str,
    ) -> bool {
        let Some(set) = self.entries.get_mut(&mesh) else {
            return false;
        };
        if !set.remove(range_id) {
            return false;
        }

        let now_empty = set.is_empty();
        if let Some(target) = meshes.mesh_mut(mesh) {
            if now_empty {
                target.clear_selection_groups();
            } else {
                target.update_selection_groups(set.iter());
            }
        }
        if now_empty {
            self.entries.remove(&mesh);
        }
        true
    }

    /// Adds the range if absent, removes it if present. Returns whether it is now selected.
    pub fn toggle_selected_object(
        &mut self,
        meshes: &mut Registry,
        mesh: MeshId,
        range_id: &str,
    ) -> bool {
        if self.is_selected(mesh, range_id) {
            self.remove_selected_object(meshes, mesh, range_id);
            false
        } else {
            self.add_selected_object(meshes, mesh, range_id)
        }
    }

    /// Empties the selection and clears every mesh's highlight.
    pub fn clear_selected_objects(&mut self, meshes: &mut Registry) {
        for (mesh, _) in self.entries.drain() {
            if let Some(target) = meshes.mesh_mut(mesh) {
                target.clear_selection_groups();
            }
        }
    }

    /// Adds many `(mesh, range)` pairs, refreshing each affected mesh once.
    ///
    /// Returns the number of pairs that were accepted.
    pub fn add_batch_of_meshes<I>(&mut self, meshes: &mut Registry, pairs: I) -> usize
    where
        I: IntoIterator<Item = (MeshId, RangeId)>,
    {
        let mut touched = HashSet::new();
        let mut accepted = 0;
        for (mesh, range_id) in pairs {
            let known = meshes
                .mesh(mesh)
                .is_some_and(|m| m.draw_ranges().contains_key(&range_id));
            if !known {
                log::debug!("batch select: skipping {mesh}/'{range_id}'");
                continue;
            }
            self.entries.entry(mesh).or_default().insert(range_id);
            touched.insert(mesh);
            accepted += 1;
        }

        for mesh in touched {
            if let (Some(target), Some(set)) = (meshes.mesh_mut(mesh), self.entries.get(&mesh)) {
                target.update_selection_groups(set.iter());
            }
        }
        accepted
    }

    /// Replaces the whole selection with a single range.
    pub fn select_only(&mut self, meshes: &mut Registry, mesh: MeshId, range_id: &str) -> bool {
        self.clear_selected_objects(meshes);
        self.add_selected_object(meshes, mesh, range_id)
    }

    /// Drops a mesh's entry, e.g. before the mesh is unloaded.
    pub fn remove_mesh(&mut self, meshes: &mut Registry, mesh: MeshId) {
        if self.entries.remove(&mesh).is_some() {
            if let Some(target) = meshes.mesh_mut(mesh) {
                target.clear_selection_groups();
            }
        }
    }

    /// Hides every selected range, then clears the selection.
    pub fn hide_selected(&mut self, meshes: &mut Registry) {
        for (mesh, set) in self.entries.drain() {
            if let Some(target) = meshes.mesh_mut(mesh) {
                target.clear_selection_groups();
                for range_id in &set {
                    target.hide_draw_range(range_id);
                }
            }
        }
    }

    /// Unhides every range of every mesh. Selection is untouched.
    pub fn unhide_all(&mut self, meshes: &mut Registry) {
        let ids: Vec<MeshId> = meshes.meshes().map(|(id, _)| id).collect();
        for id in ids {
            if let Some(target) = meshes.mesh_mut(id) {
                target.unhide_all_draw_ranges();
            }
        }
    }

    /// Selected ranges of one mesh.
    pub fn selection(&self, mesh: MeshId) -> Option<&HashSet<RangeId>> {
        self.entries.get(&mesh)
    }

    pub fn is_selected(&self, mesh: MeshId, range_id: &str) -> bool {
        self.entries.get(&mesh).is_some_and(|s| s.contains(range_id))
    }

    /// Read-only copy of the current selection.
    pub fn snapshot(&self) -> SelectionSnapshot {
        self.entries.clone()
    }

    /// Iterates over `(mesh, range)` pairs.
    pub fn iter(&self) -> impl Iterator<Item = (MeshId, &str)> {
        self.entries
            .iter()
            .flat_map(|(mesh, set)| set.iter().map(move |r| (*mesh, r.as_str())))
    }

    /// Total number of selected ranges.
    pub fn len(&self) -> usize {
        self.entries.values().map(HashSet::len).sum()
    }

    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }
}
