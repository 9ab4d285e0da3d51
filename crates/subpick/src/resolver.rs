//! Hit resolvers: turn a pointer position into the nearest primitive under it.
//!
//! Meshes and point clouds are hit-tested differently. Each strategy sits
//! behind [`HitResolver`] so the coordinator only ever compares hits.

use glam::{Vec2, Vec3};
use subpick_core::{MeshId, Pickable, PointsId, Ray, Scene};
use subpick_render::{Camera, GpuPointPicker};

/// What a hit landed on.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum HitTarget {
    Mesh(MeshId),
    Points(PointsId),
}

/// A resolved render hit.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct Hit {
    pub target: HitTarget,
    /// Face index for meshes, vertex index for point clouds.
    pub index: u32,
    /// World-space hit position.
    pub world_position: Vec3,
    /// Distance from the camera, used to pick between resolvers.
    pub distance: f32,
}

/// One click, in the terms every resolver needs.
#[derive(Debug, Clone)]
pub struct PickQuery<'a> {
    pub camera: &'a Camera,
    /// Pointer position in physical pixels from the top-left corner.
    pub position: Vec2,
    /// Viewport size in physical pixels.
    pub viewport: (u32, u32),
    /// World-space ray under the pointer, if the viewport is non-empty.
    pub ray: Option<Ray>,
}

impl<'a> PickQuery<'a> {
    pub fn new(camera: &'a Camera, position: Vec2, viewport: (u32, u32)) -> Self {
        Self {
            camera,
            position,
            viewport,
            ray: camera.screen_ray(position, viewport.0, viewport.1),
        }
    }
}

/// A hit-testing strategy over the scene.
pub trait HitResolver {
    /// Registers scene objects for picking. Called before every click.
    fn prepare(&mut self, _scene: &mut Scene) {}

    /// Returns the nearest hit this strategy can see.
    fn resolve(&mut self, scene: &Scene, query: &PickQuery<'_>) -> Option<Hit>;
}

/// CPU ray intersection against meshes and, optionally, point clouds.
#[derive(Debug, Clone, Copy)]
pub struct RaycastResolver {
    include_points: bool,
}

impl RaycastResolver {
    /// Tests meshes and point clouds.
    pub fn new() -> Self {
        Self {
            include_points: true,
        }
    }

    /// Tests meshes only; point clouds are left to another resolver.
    pub fn meshes_only() -> Self {
        Self {
            include_points: false,
        }
    }
}

impl Default for RaycastResolver {
    fn default() -> Self {
        Self::new()
    }
}

impl HitResolver for RaycastResolver {
    fn resolve(&mut self, scene: &Scene, query: &PickQuery<'_>) -> Option<Hit> {
        let ray = query.ray.as_ref()?;

        let meshes = scene.registry.meshes().filter_map(|(id, mesh)| {
            mesh.raycast_first(ray).map(|hit| Hit {
                target: HitTarget::Mesh(id),
                index: hit.index,
                world_position: hit.point,
                distance: hit.distance,
            })
        });

        let points = scene
            .registry
            .point_clouds()
            .filter(|_| self.include_points)
            .filter_map(|(id, cloud)| {
                cloud.raycast_first(ray).map(|hit| Hit {
                    target: HitTarget::Points(id),
                    index: hit.index,
                    world_position: hit.point,
                    distance: hit.distance,
                })
            });

        meshes
            .chain(points)
            .min_by(|a, b| a.distance.total_cmp(&b.distance))
    }
}

/// Point clouds resolved by the GPU id pass.
pub struct GpuPointResolver {
    picker: GpuPointPicker,
}

impl GpuPointResolver {
    pub fn new(picker: GpuPointPicker) -> Self {
        Self { picker }
    }

    pub fn picker(&self) -> &GpuPointPicker {
        &self.picker
    }
}

impl HitResolver for GpuPointResolver {
    fn prepare(&mut self, scene: &mut Scene) {
        self.picker.sync(&mut scene.registry);
    }

    fn resolve(&mut self, scene: &Scene, query: &PickQuery<'_>) -> Option<Hit> {
        let pick = self.picker.pick_at_position(
            query.camera,
            &scene.registry,
            query.viewport,
            query.position,
        )?;
        Some(Hit {
            target: HitTarget::Points(pick.points),
            index: pick.index,
            world_position: pick.world_position,
            distance: query.camera.position.distance(pick.world_position),
        })
    }
}
