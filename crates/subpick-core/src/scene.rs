//! Scene state: pickable objects plus the selection that refers to them.

use glam::Vec3;

use crate::batched_mesh::{BatchedPickableMesh, Material};
use crate::draw_range::DrawRangeMap;
use crate::options::Options;
use crate::point_cloud::PointCloud;
use crate::registry::{MeshId, PointsId, Registry};
use crate::selection::SelectionStore;

/// Owns the objects of one scene and the selection over them.
///
/// Created empty at scene init and torn down with [`Scene::clear`].
#[derive(Debug, Default)]
pub struct Scene {
    /// The object registry.
    pub registry: Registry,

    /// The selection store.
    pub selection: SelectionStore,

    /// Scene options.
    pub options: Options,
}

impl Scene {
    pub fn new(options: Options) -> Self {
        Self {
            registry: Registry::new(),
            selection: SelectionStore::new(),
            options,
        }
    }

    /// Adds a mesh, recoloring its highlight slot with the scene's highlight color.
    pub fn add_mesh(&mut self, mut mesh: BatchedPickableMesh) -> MeshId {
        mesh.set_highlight_color(self.options.highlight_color);
        self.registry.add_mesh(mesh)
    }

    /// Builds a batched mesh in the scene's base and highlight colors.
    pub fn batch_mesh(
        &self,
        name: &str,
        positions: Vec<Vec3>,
        indices: Vec<u32>,
        draw_ranges: DrawRangeMap,
    ) -> BatchedPickableMesh {
        BatchedPickableMesh::new(
            name,
            positions,
            indices,
            draw_ranges,
            Material::new(name, self.options.base_color),
            self.options.highlight_color,
        )
    }

    /// Adds a point cloud, applying the configured CPU pick threshold.
    pub fn add_points(&mut self, mut points: PointCloud) -> PointsId {
        points.set_pick_threshold(self.options.point_pick_threshold);
        self.registry.add_points(points)
    }

    /// Removes every object of a model and drops its selection entries.
    pub fn unload_model(&mut self, model_key: &str) -> (Vec<MeshId>, Vec<PointsId>) {
        let meshes = self.registry.meshes_of_model(model_key);
        for &id in &meshes {
            self.selection.remove_mesh(&mut self.registry, id);
            self.registry.remove_mesh(id);
        }
        let points = self.registry.points_of_model(model_key);
        for &id in &points {
            self.registry.remove_points(id);
        }
        log::info!(
            "unloaded model '{model_key}' ({} meshes, {} point clouds)",
            meshes.len(),
            points.len()
        );
        (meshes, points)
    }

    /// Clears selection and objects.
    pub fn clear(&mut self) {
        self.selection.clear_selected_objects(&mut self.registry);
        self.registry.clear();
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::batched_mesh::MaterialSlot;
    use crate::draw_range::Span;
    use glam::Vec4;

    #[test]
    fn test_unload_model_drops_selection() {
        let mut scene = Scene::new(Options::default());
        let ranges = DrawRangeMap::from([("A".to_string(), Span::new(0, 3))]);
        let mesh = BatchedPickableMesh::new(
            "beam_0",
            vec![Vec3::ZERO, Vec3::X, Vec3::Y],
            vec![0, 1, 2],
            ranges,
            Material::new("m", Vec4::ONE),
            Vec4::ONE,
        )
        .with_model_key("m1");
        let id = scene.add_mesh(mesh);
        scene.add_points(PointCloud::new("nodes", vec![Vec3::ZERO]).with_model_key("m1"));
        scene.selection.add_selected_object(&mut scene.registry, id, "A");

        let (meshes, points) = scene.unload_model("m1");
        assert_eq!((meshes.len(), points.len()), (1, 1));
        assert!(scene.selection.is_empty());
        assert!(scene.registry.is_empty());
    }

    #[test]
    fn test_meshes_take_scene_colors() {
        let options = Options {
            base_color: Vec4::new(0.2, 0.2, 0.2, 1.0),
            highlight_color: Vec4::new(0.0, 0.8, 1.0, 1.0),
            ..Options::default()
        };
        let mut scene = Scene::new(options.clone());
        let ranges = DrawRangeMap::from([("A".to_string(), Span::new(0, 3))]);
        let triangle = vec![Vec3::ZERO, Vec3::X, Vec3::Y];
        let built = scene.batch_mesh("plate", triangle.clone(), vec![0, 1, 2], ranges);
        assert_eq!(built.materials()[MaterialSlot::Base.index()].color, options.base_color);

        let foreign = BatchedPickableMesh::new(
            "beam_0",
            triangle,
            vec![0, 1, 2],
            DrawRangeMap::new(),
            Material::new("steel", Vec4::ONE),
            Vec4::new(1.0, 0.0, 0.0, 1.0),
        );
        let id = scene.add_mesh(foreign);
        let mesh = scene.registry.mesh(id).unwrap();
        let highlight = &mesh.materials()[MaterialSlot::Highlight.index()];
        assert_eq!(highlight.color, options.highlight_color);
        assert_eq!(mesh.materials()[MaterialSlot::Base.index()].color, Vec4::ONE);
    }
}
