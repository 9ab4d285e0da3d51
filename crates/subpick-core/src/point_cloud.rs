//! Point cloud geometry with morph targets and a pick-id attribute.

use glam::{Mat4, Vec3, Vec4};

use crate::pick::{Intersection, PickElementType, Pickable, Ray};

/// A deformation basis: per-vertex displacement relative to the base position.
#[derive(Debug, Clone, PartialEq)]
pub struct MorphTarget {
    pub name: String,
    pub displacements: Vec<Vec3>,
}

/// Visual sizing of a point cloud, mirrored by the picking pass.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct PointMaterial {
    /// Point size: pixels, or world units scaled by distance when attenuated.
    pub size: f32,
    /// Whether the on-screen size shrinks with distance.
    pub size_attenuation: bool,
    pub color: Vec4,
}

impl Default for PointMaterial {
    fn default() -> Self {
        Self {
            size: 4.0,
            size_attenuation: false,
            color: Vec4::new(0.2, 0.5, 0.8, 1.0),
        }
    }
}

/// A point cloud structure.
#[derive(Debug, Clone)]
pub struct PointCloud {
    name: String,
    model_key: Option<String>,
    positions: Vec<Vec3>,
    morph_targets: Vec<MorphTarget>,
    morph_influences: Vec<f32>,
    transform: Mat4,
    material: PointMaterial,
    pick_threshold: f32,
    pick_colors: Option<Vec<[u8; 3]>>,
}

impl PointCloud {
    /// Creates a new point cloud.
    pub fn new(name: impl Into<String>, positions: Vec<Vec3>) -> Self {
        Self {
            name: name.into(),
            model_key: None,
            positions,
            morph_targets: Vec::new(),
            morph_influences: Vec::new(),
            transform: Mat4::IDENTITY,
            material: PointMaterial::default(),
            pick_threshold: 0.01,
            pick_colors: None,
        }
    }

    #[must_use]
    pub fn with_model_key(mut self, key: impl Into<String>) -> Self {
        self.model_key = Some(key.into());
        self
    }

    #[must_use]
    pub fn with_material(mut self, material: PointMaterial) -> Self {
        self.material = material;
        self
    }

    #[must_use]
    pub fn with_transform(mut self, transform: Mat4) -> Self {
        self.transform = transform;
        self
    }

    pub fn name(&self) -> &str {
        &self.name
    }

    pub fn model_key(&self) -> Option<&str> {
        self.model_key.as_deref()
    }

    /// Returns the number of points.
    #[must_use]
    pub fn num_points(&self) -> usize {
        self.positions.len()
    }

    /// Returns the base (unmorphed) positions.
    #[must_use]
    pub fn positions(&self) -> &[Vec3] {
        &self.positions
    }

    /// Replaces the point positions. Drops the pick-id attribute if the count changes.
    pub fn update_points(&mut self, positions: Vec<Vec3>) {
        if positions.len() != self.positions.len() {
            self.pick_colors = None;
        }
        self.positions = positions;
    }

    pub fn transform(&self) -> Mat4 {
        self.transform
    }

    pub fn set_transform(&mut self, transform: Mat4) {
        self.transform = transform;
    }

    pub fn material(&self) -> PointMaterial {
        self.material
    }

    pub fn set_material(&mut self, material: PointMaterial) {
        self.material = material;
    }

    /// Sets the world-space radius used by the CPU ray test.
    pub fn set_pick_threshold(&mut self, threshold: f32) {
        self.pick_threshold = threshold;
    }

    /// Adds a morph target with zero influence.
    pub fn add_morph_target(&mut self, name: impl Into<String>, displacements: Vec<Vec3>) {
        self.morph_targets.push(MorphTarget {
            name: name.into(),
            displacements,
        });
        self.morph_influences.push(0.0);
    }

    pub fn morph_targets(&self) -> &[MorphTarget] {
        &self.morph_targets
    }

    /// Sets the influence of a morph target. Unknown indices are ignored.
    pub fn set_morph_influence(&mut self, target: usize, influence: f32) {
        if let Some(weight) = self.morph_influences.get_mut(target) {
            *weight = influence;
        }
    }

    pub fn morph_influences(&self) -> &[f32] {
        &self.morph_influences
    }

    /// Local position of a vertex with active morph influences blended in.
    #[must_use]
    pub fn morphed_position(&self, index: usize) -> Option<Vec3> {
        let base = *self.positions.get(index)?;
        let offset = self
            .morph_targets
            .iter()
            .zip(&self.morph_influences)
            .filter(|(_, w)| **w != 0.0)
            .filter_map(|(target, w)| target.displacements.get(index).map(|d| *d * *w))
            .fold(Vec3::ZERO, |acc, d| acc + d);
        Some(base + offset)
    }

    /// World position of a vertex, morphs included.
    #[must_use]
    pub fn world_position(&self, index: usize) -> Option<Vec3> {
        self.morphed_position(index)
            .map(|p| self.transform.transform_point3(p))
    }

    /// Local positions of every vertex with morphs applied.
    #[must_use]
    pub fn morphed_positions(&self) -> Vec<Vec3> {
        if self.morph_influences.iter().all(|w| *w == 0.0) {
            return self.positions.clone();
        }
        (0..self.positions.len())
            .filter_map(|i| self.morphed_position(i))
            .collect()
    }

    /// Per-vertex pick-id colors, if assigned.
    pub fn pick_colors(&self) -> Option<&[[u8; 3]]> {
        self.pick_colors.as_deref()
    }

    pub fn set_pick_colors(&mut self, colors: Vec<[u8; 3]>) {
        self.pick_colors = Some(colors);
    }
}

impl Pickable for PointCloud {
    /// Hits every point whose distance to the ray is below the pick threshold.
    fn raycast(&self, ray: &Ray) -> Vec<Intersection> {
        let threshold_sq = self.pick_threshold * self.pick_threshold;
        let mut hits: Vec<Intersection> = (0..self.positions.len())
            .filter_map(|i| {
                let point = self.world_position(i)?;
                let t = (point - ray.origin).dot(ray.direction);
                if t < 0.0 || !ray.accepts(t) {
                    return None;
                }
                if point.distance_squared(ray.at(t)) > threshold_sq {
                    return None;
                }
                Some(Intersection {
                    distance: t,
                    point,
                    index: u32::try_from(i).ok()?,
                    element_type: PickElementType::Point,
                    barycentric: None,
                    uv: None,
                })
            })
            .collect();
        hits.sort_by(|a, b| a.distance.total_cmp(&b.distance));
        hits
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn cloud() -> PointCloud {
        PointCloud::new(
            "nodes",
            vec![Vec3::ZERO, Vec3::new(1.0, 0.0, 0.0), Vec3::new(1.0, 0.0, -3.0)],
        )
    }

    #[test]
    fn test_morph_blending() {
        let mut pc = cloud();
        pc.add_morph_target("mode_1", vec![Vec3::Y; 3]);
        pc.add_morph_target("mode_2", vec![Vec3::Z; 3]);
        assert_eq!(pc.morphed_position(1), Some(Vec3::new(1.0, 0.0, 0.0)));

        pc.set_morph_influence(0, 0.5);
        pc.set_morph_influence(1, 2.0);
        assert_eq!(pc.morphed_position(1), Some(Vec3::new(1.0, 0.5, 2.0)));
        assert_eq!(pc.morphed_positions()[0], Vec3::new(0.0, 0.5, 2.0));
        assert_eq!(pc.morphed_position(3), None);
    }

    #[test]
    fn test_world_position_applies_transform() {
        let pc = cloud().with_transform(Mat4::from_translation(Vec3::new(0.0, 10.0, 0.0)));
        assert_eq!(pc.world_position(0), Some(Vec3::new(0.0, 10.0, 0.0)));
    }

    #[test]
    fn test_raycast_nearest_first() {
        let mut pc = cloud();
        pc.set_pick_threshold(0.1);
        let ray = Ray::new(Vec3::new(1.0, 0.05, 5.0), Vec3::NEG_Z);
        let hits = pc.raycast(&ray);
        assert_eq!(hits.len(), 2);
        assert_eq!(hits[0].index, 1);
        assert_eq!(hits[1].index, 2);
        assert!((hits[0].distance - 5.0).abs() < 1e-5);
    }

    #[test]
    fn test_resize_drops_pick_colors() {
        let mut pc = cloud();
        pc.set_pick_colors(vec![[0, 0, 1]; 3]);
        pc.update_points(vec![Vec3::ZERO; 3]);
        assert!(pc.pick_colors().is_some());
        pc.update_points(vec![Vec3::ZERO; 4]);
        assert!(pc.pick_colors().is_none());
    }
}
