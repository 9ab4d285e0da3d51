//! Picking primitives: rays, intersections and pick-id color encoding.
//!
//! The GPU id pass renders every pickable point with a unique color encoding
//! its id. When the user clicks, the pixel under the cursor is read back and
//! decoded with [`color_to_index`]. Id 0 is the cleared background.

use std::collections::HashMap;

use glam::{Vec2, Vec3};

/// Largest id representable in a 24-bit RGB color.
pub const MAX_PICK_ID: u32 = 0x00FF_FFFF;

/// Element type for pick results.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum PickElementType {
    /// No element type (background or unknown).
    #[default]
    None,
    /// A triangle of a mesh.
    Face,
    /// A point of a point cloud.
    Point,
}

/// A world-space ray with distance bounds.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct Ray {
    pub origin: Vec3,
    /// Unit direction.
    pub direction: Vec3,
    /// Hits closer than this are ignored.
    pub near: f32,
    /// Hits farther than this are ignored.
    pub far: f32,
}

impl Ray {
    /// Creates an unbounded ray. The direction is normalized.
    pub fn new(origin: Vec3, direction: Vec3) -> Self {
        Self {
            origin,
            direction: direction.normalize_or_zero(),
            near: 0.0,
            far: f32::INFINITY,
        }
    }

    /// Sets the near/far distance bounds.
    #[must_use]
    pub fn with_bounds(mut self, near: f32, far: f32) -> Self {
        self.near = near;
        self.far = far;
        self
    }

    /// Point at distance `t` along the ray.
    #[must_use]
    pub fn at(&self, t: f32) -> Vec3 {
        self.origin + self.direction * t
    }

    /// Returns whether a hit distance lies within the ray bounds.
    #[must_use]
    pub fn accepts(&self, distance: f32) -> bool {
        distance >= self.near && distance <= self.far
    }
}

/// Double-sided Möller–Trumbore test.
///
/// Returns `(t, u, v)` where `t` is the distance along `direction` (in units of
/// its length) and `(u, v)` are the barycentric weights of `v1` and `v2`.
pub fn intersect_triangle(
    origin: Vec3,
    direction: Vec3,
    v0: Vec3,
    v1: Vec3,
    v2: Vec3,
) -> Option<(f32, f32, f32)> {
    let eps = 1e-7;
    let edge1 = v1 - v0;
    let edge2 = v2 - v0;
    let h = direction.cross(edge2);
    let a = edge1.dot(h);
    if a.abs() < eps {
        return None;
    }
    let f = 1.0 / a;
    let s = origin - v0;
    let u = f * s.dot(h);
    if !(0.0..=1.0).contains(&u) {
        return None;
    }
    let q = s.cross(edge1);
    let v = f * direction.dot(q);
    if v < 0.0 || u + v > 1.0 {
        return None;
    }
    let t = f * edge2.dot(q);
    (t > eps).then_some((t, u, v))
}

/// Slab test of a ray against an axis-aligned box.
pub fn intersects_aabb(origin: Vec3, direction: Vec3, min: Vec3, max: Vec3) -> bool {
    let inv = direction.recip();
    let t0 = (min - origin) * inv;
    let t1 = (max - origin) * inv;
    let t_min = t0.min(t1).max_element();
    let t_max = t0.max(t1).min_element();
    // NaN from 0 * inf falls through as "no reject"
    !(t_max < 0.0 || t_min > t_max)
}

/// A single ray hit on a pickable object.
#[derive(Debug, Clone, PartialEq)]
pub struct Intersection {
    /// World-space distance from the ray origin.
    pub distance: f32,
    /// World-space hit point.
    pub point: Vec3,
    /// Face index for meshes, point index for point clouds.
    pub index: u32,
    pub element_type: PickElementType,
    /// Barycentric weights of the hit triangle's corners.
    pub barycentric: Option<Vec3>,
    /// Interpolated texture coordinate, when the geometry carries one.
    pub uv: Option<Vec2>,
}

/// Objects that can be hit-tested against a world-space ray.
pub trait Pickable {
    /// Returns every hit along the ray, nearest first.
    fn raycast(&self, ray: &Ray) -> Vec<Intersection>;

    /// Returns the nearest hit.
    fn raycast_first(&self, ray: &Ray) -> Option<Intersection> {
        self.raycast(ray).into_iter().next()
    }
}

/// Decodes a pick color back to an index.
///
/// The color is encoded as RGB where:
/// - R contains bits 16-23
/// - G contains bits 8-15
/// - B contains bits 0-7
#[must_use]
pub fn color_to_index(r: u8, g: u8, b: u8) -> u32 {
    (u32::from(r) << 16) | (u32::from(g) << 8) | u32::from(b)
}

/// Encodes an index as a pick color.
#[must_use]
pub fn index_to_color(index: u32) -> [u8; 3] {
    [
        ((index >> 16) & 0xFF) as u8,
        ((index >> 8) & 0xFF) as u8,
        (index & 0xFF) as u8,
    ]
}

/// A contiguous block of pick ids owned by one registered object.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct IdBlock {
    /// First id of the block (never 0).
    pub start: u32,
    /// Number of ids, one per vertex.
    pub count: u32,
}

impl IdBlock {
    /// Returns the vertex index for an id inside this block.
    #[must_use]
    pub fn local_index(&self, id: u32) -> Option<u32> {
        (id >= self.start && id - self.start < self.count).then(|| id - self.start)
    }
}

/// Hands out pick ids in `[1, MAX_PICK_ID]` and maps them back to objects.
///
/// Each object receives one contiguous block, placed in the lowest gap that
/// fits, so ids released by unregistered objects are handed out again.
/// Re-registering an object whose vertex count is unchanged keeps its block.
#[derive(Debug, Clone)]
pub struct PickIdAllocator<K> {
    blocks: HashMap<K, IdBlock>,
}

impl<K> Default for PickIdAllocator<K> {
    fn default() -> Self {
        Self {
            blocks: HashMap::new(),
        }
    }
}

impl<K: Copy + Eq + std::hash::Hash> PickIdAllocator<K> {
    pub fn new() -> Self {
        Self::default()
    }

    /// Allocates (or returns the existing) block for `key`.
    ///
    /// A block of a different size replaces the previous one. Returns `None`
    /// when no gap of `count` ids is left; the previous block is kept then.
    pub fn allocate(&mut self, key: K, count: u32) -> Option<IdBlock> {
        let previous = self.blocks.remove(&key);
        if let Some(block) = previous.filter(|block| block.count == count) {
            self.blocks.insert(key, block);
            return Some(block);
        }

        let Some(start) = self.first_fit(count) else {
            log::error!(
                "pick id space exhausted ({count} ids requested, {} objects registered)",
                self.blocks.len()
            );
            if let Some(block) = previous {
                self.blocks.insert(key, block);
            }
            return None;
        };

        let block = IdBlock { start, count };
        self.blocks.insert(key, block);
        Some(block)
    }

    /// Lowest start id with `count` free ids after it.
    fn first_fit(&self, count: u32) -> Option<u32> {
        let mut taken: Vec<IdBlock> = self.blocks.values().copied().collect();
        taken.sort_unstable_by_key(|block| block.start);

        let mut cursor = 1u64;
        for block in taken {
            let start = u64::from(block.start);
            if start.saturating_sub(cursor) >= u64::from(count) {
                break;
            }
            cursor = cursor.max(start + u64::from(block.count));
        }
        if cursor + u64::from(count) > u64::from(MAX_PICK_ID) + 1 {
            return None;
        }
        u32::try_from(cursor).ok()
    }

    /// Releases the block of `key`, making its ids available again.
    pub fn release(&mut self, key: &K) -> Option<IdBlock> {
        self.blocks.remove(key)
    }

    /// Returns the block assigned to `key`.
    pub fn block(&self, key: &K) -> Option<IdBlock> {
        self.blocks.get(key).copied()
    }

    /// Decodes a global id into `(object, vertex index)`. Id 0 is no hit.
    pub fn resolve(&self, id: u32) -> Option<(K, u32)> {
        if id == 0 {
            return None;
        }
        self.blocks
            .iter()
            .find_map(|(key, block)| block.local_index(id).map(|i| (*key, i)))
    }

    /// Iterates over all registered blocks.
    pub fn iter(&self) -> impl Iterator<Item = (&K, &IdBlock)> {
        self.blocks.iter()
    }

    pub fn len(&self) -> usize {
        self.blocks.len()
    }

    pub fn is_empty(&self) -> bool {
        self.blocks.is_empty()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_color_index_roundtrip() {
        for index in [0, 1, 255, 256, 65535, 65536, 0xFFFFFF, 12345678 & 0xFFFFFF] {
            let color = index_to_color(index);
            let decoded = color_to_index(color[0], color[1], color[2]);
            assert_eq!(decoded, index & 0xFFFFFF, "Roundtrip failed for index {index}");
        }
    }

    #[test]
    fn test_specific_colors() {
        assert_eq!(index_to_color(0), [0, 0, 0]);
        assert_eq!(index_to_color(1), [0, 0, 1]);
        assert_eq!(index_to_color(256), [0, 1, 0]);
        assert_eq!(index_to_color(0xFF0000), [255, 0, 0]);
    }

    #[test]
    fn test_allocator_blocks_are_disjoint() {
        let mut ids = PickIdAllocator::new();
        let a = ids.allocate(1u32, 10).unwrap();
        let b = ids.allocate(2u32, 5).unwrap();
        assert_eq!(a, IdBlock { start: 1, count: 10 });
        assert_eq!(b, IdBlock { start: 11, count: 5 });
        assert_eq!(ids.resolve(0), None);
        assert_eq!(ids.resolve(1), Some((1, 0)));
        assert_eq!(ids.resolve(10), Some((1, 9)));
        assert_eq!(ids.resolve(11), Some((2, 0)));
        assert_eq!(ids.resolve(16), None);
    }

    #[test]
    fn test_allocator_is_stable_for_same_count() {
        let mut ids = PickIdAllocator::new();
        let first = ids.allocate(7u32, 100).unwrap();
        let again = ids.allocate(7u32, 100).unwrap();
        assert_eq!(first, again);

        let resized = ids.allocate(7u32, 120).unwrap();
        assert_eq!(resized, IdBlock { start: 1, count: 120 });
        assert_eq!(ids.len(), 1);
    }

    #[test]
    fn test_released_ids_are_reused() {
        let mut ids = PickIdAllocator::new();
        for cycle in 0..40 {
            let block = ids.allocate(1u32, 1_000_000);
            assert_eq!(block.map(|b| b.start), Some(1), "cycle {cycle}");
            ids.release(&1);
        }
        assert!(ids.is_empty());
    }

    #[test]
    fn test_allocator_fills_lowest_gap() {
        let mut ids = PickIdAllocator::new();
        ids.allocate(1u32, 10).unwrap();
        ids.allocate(2u32, 10).unwrap();
        ids.allocate(3u32, 10).unwrap();
        ids.release(&2);

        // too big for the hole left by 2
        assert_eq!(ids.allocate(4u32, 11).unwrap().start, 31);
        assert_eq!(ids.allocate(5u32, 4).unwrap().start, 11);
        assert_eq!(ids.allocate(6u32, 6).unwrap().start, 15);
        assert_eq!(ids.allocate(7u32, 1).unwrap().start, 42);
        assert_eq!(ids.resolve(15), Some((6, 0)));
    }

    #[test]
    fn test_failed_resize_keeps_previous_block() {
        let mut ids = PickIdAllocator::new();
        let small = ids.allocate(1u32, 10).unwrap();
        ids.allocate(2u32, MAX_PICK_ID - 20).unwrap();
        assert!(ids.allocate(1u32, 30).is_none());
        assert_eq!(ids.block(&1), Some(small));
    }

    #[test]
    fn test_allocator_exhaustion() {
        let mut ids = PickIdAllocator::new();
        assert!(ids.allocate(1u32, MAX_PICK_ID).is_some());
        assert!(ids.allocate(2u32, 1).is_none());
    }

    #[test]
    fn test_triangle_hit_and_miss() {
        let (v0, v1, v2) = (Vec3::ZERO, Vec3::X, Vec3::Y);
        let hit = intersect_triangle(Vec3::new(0.25, 0.25, 1.0), Vec3::NEG_Z, v0, v1, v2);
        let (t, u, v) = hit.unwrap();
        assert!((t - 1.0).abs() < 1e-6);
        assert!((u - 0.25).abs() < 1e-6 && (v - 0.25).abs() < 1e-6);

        // back side is hit too
        assert!(intersect_triangle(Vec3::new(0.25, 0.25, -1.0), Vec3::Z, v0, v1, v2).is_some());
        assert!(intersect_triangle(Vec3::new(2.0, 2.0, 1.0), Vec3::NEG_Z, v0, v1, v2).is_none());
    }

    #[test]
    fn test_aabb() {
        let (min, max) = (Vec3::splat(-1.0), Vec3::splat(1.0));
        assert!(intersects_aabb(Vec3::new(0.0, 0.0, 5.0), Vec3::NEG_Z, min, max));
        assert!(!intersects_aabb(Vec3::new(3.0, 0.0, 5.0), Vec3::NEG_Z, min, max));
        assert!(!intersects_aabb(Vec3::new(0.0, 0.0, 5.0), Vec3::Z, min, max));
    }
}
