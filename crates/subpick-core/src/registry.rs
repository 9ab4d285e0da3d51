//! Registry of pickable objects in a scene.

use std::collections::BTreeMap;
use std::fmt;

use crate::batched_mesh::BatchedPickableMesh;
use crate::point_cloud::PointCloud;

/// Handle of a batched mesh in a [`Registry`].
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash)]
pub struct MeshId(pub u32);

/// Handle of a point cloud in a [`Registry`].
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash)]
pub struct PointsId(pub u32);

impl fmt::Display for MeshId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "mesh#{}", self.0)
    }
}

impl fmt::Display for PointsId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "points#{}", self.0)
    }
}

/// Owns every batched mesh and point cloud of a scene.
///
/// Objects are addressed by handle; handles are never reused.
#[derive(Debug, Default)]
pub struct Registry {
    meshes: BTreeMap<MeshId, BatchedPickableMesh>,
    points: BTreeMap<PointsId, PointCloud>,
    next_id: u32,
}

impl Registry {
    /// Creates a new empty registry.
    pub fn new() -> Self {
        Self::default()
    }

    fn next(&mut self) -> u32 {
        self.next_id += 1;
        self.next_id
    }

    /// Registers a batched mesh.
    pub fn add_mesh(&mut self, mesh: BatchedPickableMesh) -> MeshId {
        let id = MeshId(self.next());
        log::debug!("registered {id} '{}'", mesh.name());
        self.meshes.insert(id, mesh);
        id
    }

    /// Registers a point cloud.
    pub fn add_points(&mut self, points: PointCloud) -> PointsId {
        let id = PointsId(self.next());
        log::debug!("registered {id} '{}'", points.name());
        self.points.insert(id, points);
        id
    }

    pub fn mesh(&self, id: MeshId) -> Option<&BatchedPickableMesh> {
        self.meshes.get(&id)
    }

    pub fn mesh_mut(&mut self, id: MeshId) -> Option<&mut BatchedPickableMesh> {
        self.meshes.get_mut(&id)
    }

    pub fn points(&self, id: PointsId) -> Option<&PointCloud> {
        self.points.get(&id)
    }

    pub fn points_mut(&mut self, id: PointsId) -> Option<&mut PointCloud> {
        self.points.get_mut(&id)
    }

    /// Finds a mesh by model key and mesh name.
    pub fn find_mesh(&self, model_key: &str, name: &str) -> Option<MeshId> {
        self.meshes
            .iter()
            .find(|(_, m)| m.model_key() == Some(model_key) && m.name() == name)
            .map(|(id, _)| *id)
    }

    pub fn remove_mesh(&mut self, id: MeshId) -> Option<BatchedPickableMesh> {
        self.meshes.remove(&id)
    }

    pub fn remove_points(&mut self, id: PointsId) -> Option<PointCloud> {
        self.points.remove(&id)
    }

    /// Handles of every mesh belonging to a model.
    pub fn meshes_of_model(&self, model_key: &str) -> Vec<MeshId> {
        self.meshes
            .iter()
            .filter(|(_, m)| m.model_key() == Some(model_key))
            .map(|(id, _)| *id)
            .collect()
    }

    /// Handles of every point cloud belonging to a model.
    pub fn points_of_model(&self, model_key: &str) -> Vec<PointsId> {
        self.points
            .iter()
            .filter(|(_, p)| p.model_key() == Some(model_key))
            .map(|(id, _)| *id)
            .collect()
    }

    /// Returns an iterator over all meshes.
    pub fn meshes(&self) -> impl Iterator<Item = (MeshId, &BatchedPickableMesh)> {
        self.meshes.iter().map(|(id, m)| (*id, m))
    }

    /// Returns an iterator over all point clouds.
    pub fn point_clouds(&self) -> impl Iterator<Item = (PointsId, &PointCloud)> {
        self.points.iter().map(|(id, p)| (*id, p))
    }

    /// Returns the total number of registered objects.
    pub fn len(&self) -> usize {
        self.meshes.len() + self.points.len()
    }

    /// Returns true if the registry is empty.
    pub fn is_empty(&self) -> bool {
        self.meshes.is_empty() && self.points.is_empty()
    }

    /// Removes all objects. Handles are still not reused afterwards.
    pub fn clear(&mut self) {
        self.meshes.clear();
        self.points.clear();
    }
}
