//! Batched pickable mesh.
//!
//! One merged geometry drawn with a handful of render groups, while still
//! letting every original sub-element (draw range) be highlighted, hidden and
//! picked on its own. Groups are derived state: any change to the selected or
//! hidden sets triggers a full rebuild from the sorted draw ranges.

use std::collections::HashSet;

use glam::{Mat4, Vec2, Vec3, Vec4};

use crate::draw_range::{self, DrawRange, DrawRangeMap, RangeId};
use crate::pick::{self, Intersection, PickElementType, Pickable, Ray};

/// Material slot of a render group.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum MaterialSlot {
    /// Default appearance, also used for untracked gaps.
    Base,
    /// Selected ranges.
    Highlight,
    /// Hidden ranges: neither rendered nor picked.
    Hidden,
}

impl MaterialSlot {
    /// Index of the slot in the mesh's material list.
    #[must_use]
    pub fn index(self) -> usize {
        match self {
            MaterialSlot::Base => 0,
            MaterialSlot::Highlight => 1,
            MaterialSlot::Hidden => 2,
        }
    }
}

/// Appearance of one material slot.
#[derive(Debug, Clone, PartialEq)]
pub struct Material {
    pub name: String,
    pub color: Vec4,
    pub visible: bool,
}

impl Material {
    pub fn new(name: impl Into<String>, color: Vec4) -> Self {
        Self {
            name: name.into(),
            color,
            visible: true,
        }
    }

    /// An invisible variant of this material.
    #[must_use]
    pub fn invisible(&self) -> Self {
        Self {
            name: format!("{} (hidden)", self.name),
            color: self.color,
            visible: false,
        }
    }
}

/// One draw call: a span of the index buffer and the material it uses.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub struct RenderGroup {
    pub start: u32,
    pub count: u32,
    /// Index into the mesh's material list.
    pub material_index: usize,
}

impl RenderGroup {
    fn new(start: u64, count: u64, slot: MaterialSlot) -> Self {
        Self {
            start: u32::try_from(start).unwrap_or(u32::MAX),
            count: u32::try_from(count).unwrap_or(u32::MAX),
            material_index: slot.index(),
        }
    }

    fn end(&self) -> u64 {
        u64::from(self.start) + u64::from(self.count)
    }
}

/// A merged mesh whose draw ranges can be highlighted, hidden and picked.
///
/// The mesh keeps no reference to any selection bookkeeping. Callers own the
/// selection and push it in through [`update_selection_groups`].
///
/// [`update_selection_groups`]: BatchedPickableMesh::update_selection_groups
#[derive(Debug, Clone)]
pub struct BatchedPickableMesh {
    name: String,
    model_key: Option<String>,
    positions: Vec<Vec3>,
    indices: Vec<u32>,
    uvs: Option<Vec<Vec2>>,
    transform: Mat4,
    bounds: Option<(Vec3, Vec3)>,
    materials: Vec<Material>,
    draw_ranges: DrawRangeMap,
    selected: HashSet<RangeId>,
    hidden: HashSet<RangeId>,
    groups: Vec<RenderGroup>,
}

impl BatchedPickableMesh {
    /// Creates a batched mesh over an indexed triangle list.
    pub fn new(
        name: impl Into<String>,
        positions: Vec<Vec3>,
        indices: Vec<u32>,
        draw_ranges: DrawRangeMap,
        base_material: Material,
        highlight_color: Vec4,
    ) -> Self {
        let name = name.into();
        if let Err(e) = draw_range::validate_disjoint(&name, &draw_ranges) {
            log::warn!("{e}; later ranges are clipped");
        }
        let highlight =
            Material::new(format!("{} (selected)", base_material.name), highlight_color);
        let hidden = base_material.invisible();
        let bounds = local_bounds(&positions);
        let mut mesh = Self {
            name,
            model_key: None,
            positions,
            indices,
            uvs: None,
            transform: Mat4::IDENTITY,
            bounds,
            materials: vec![base_material, highlight, hidden],
            draw_ranges,
            selected: HashSet::new(),
            hidden: HashSet::new(),
            groups: Vec::new(),
        };
        mesh.rebuild_groups();
        mesh
    }

    /// Tags the mesh with the cache key of the model it was loaded from.
    #[must_use]
    pub fn with_model_key(mut self, key: impl Into<String>) -> Self {
        self.model_key = Some(key.into());
        self
    }

    /// Attaches a per-vertex texture coordinate attribute.
    #[must_use]
    pub fn with_uvs(mut self, uvs: Vec<Vec2>) -> Self {
        self.uvs = Some(uvs);
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

    pub fn positions(&self) -> &[Vec3] {
        &self.positions
    }

    pub fn indices(&self) -> &[u32] {
        &self.indices
    }

    pub fn transform(&self) -> Mat4 {
        self.transform
    }

    pub fn set_transform(&mut self, transform: Mat4) {
        self.transform = transform;
    }

    pub fn materials(&self) -> &[Material] {
        &self.materials
    }

    pub fn draw_ranges(&self) -> &DrawRangeMap {
        &self.draw_ranges
    }

    /// Current render groups, ordered by start offset.
    pub fn groups(&self) -> &[RenderGroup] {
        &self.groups
    }

    pub fn selected_ranges(&self) -> &HashSet<RangeId> {
        &self.selected
    }

    pub fn hidden_ranges(&self) -> &HashSet<RangeId> {
        &self.hidden
    }

    pub fn is_hidden(&self, range_id: &str) -> bool {
        self.hidden.contains(range_id)
    }

    /// Recolors the highlight slot.
    pub fn set_highlight_color(&mut self, color: Vec4) {
        if let Some(material) = self.materials.get_mut(MaterialSlot::Highlight.index()) {
            material.color = color;
        }
    }

    /// Returns the material used by a group, if its slot resolves.
    pub fn material_of(&self, group: &RenderGroup) -> Option<&Material> {
        self.materials.get(group.material_index)
    }

    /// Mesh-local lookup of the draw range containing a triangle.
    pub fn draw_range_at_face(&self, face_index: u32) -> Option<DrawRange> {
        draw_range::find_containing(&self.draw_ranges, draw_range::face_offset(face_index))
    }

    /// Highlights exactly `range_ids`, dropping any previous highlight.
    ///
    /// Ids without a draw range on this mesh are ignored.
    pub fn update_selection_groups<'a, I>(&mut self, range_ids: I)
    where
        I: IntoIterator<Item = &'a RangeId>,
    {
        self.selected.clear();
        for id in range_ids {
            if self.draw_ranges.contains_key(id) {
                self.selected.insert(id.clone());
            } else {
                log::debug!("mesh '{}' has no draw range '{id}'", self.name);
            }
        }
        self.rebuild_groups();
    }

    /// Removes all highlight. Hidden ranges stay hidden.
    pub fn clear_selection_groups(&mut self) {
        self.selected.clear();
        self.rebuild_groups();
    }

    /// Hides a draw range from rendering and picking.
    pub fn hide_draw_range(&mut self, range_id: &str) {
        if !self.draw_ranges.contains_key(range_id) {
            log::debug!("mesh '{}' has no draw range '{range_id}' to hide", self.name);
            return;
        }
        self.hidden.insert(range_id.to_string());
        self.rebuild_groups();
    }

    /// Makes every hidden range visible again.
    pub fn unhide_all_draw_ranges(&mut self) {
        self.hidden.clear();
        self.rebuild_groups();
    }

    fn slot_for(&self, range_id: &str) -> MaterialSlot {
        if self.hidden.contains(range_id) {
            MaterialSlot::Hidden
        } else if self.selected.contains(range_id) {
            MaterialSlot::Highlight
        } else {
            MaterialSlot::Base
        }
    }

    /// Recomputes render groups so each index-buffer offset is covered once.
    ///
    /// A range overlapping an earlier one only keeps the part past it.
    fn rebuild_groups(&mut self) {
        let total = self.indices.len() as u64;
        let mut groups = Vec::with_capacity(self.draw_ranges.len() * 2 + 1);
        let mut cursor = 0u64;

        for (id, span) in draw_range::sorted_by_start(&self.draw_ranges) {
            if span.count == 0 {
                continue;
            }
            let start = u64::from(span.start);
            if start > cursor {
                groups.push(RenderGroup::new(cursor, start - cursor, MaterialSlot::Base));
            }
            let start = start.max(cursor);
            if span.end() <= start {
                continue;
            }
            groups.push(RenderGroup::new(start, span.end() - start, self.slot_for(id)));
            cursor = span.end();
        }

        if cursor < total {
            groups.push(RenderGroup::new(cursor, total - cursor, MaterialSlot::Base));
        }

        self.groups = groups;
    }

    fn triangle(&self, first: usize) -> Option<(Vec3, Vec3, Vec3)> {
        let corner = |k: usize| {
            let index = *self.indices.get(first + k)? as usize;
            self.positions.get(index).copied()
        };
        Some((corner(0)?, corner(1)?, corner(2)?))
    }

    fn interpolate_uv(&self, first: usize, weights: Vec3) -> Option<Vec2> {
        let uvs = self.uvs.as_ref()?;
        let uv = |k: usize| uvs.get(*self.indices.get(first + k)? as usize).copied();
        Some(uv(0)? * weights.x + uv(1)? * weights.y + uv(2)? * weights.z)
    }
}

impl Pickable for BatchedPickableMesh {
    /// Tests the ray against visible groups only, in the mesh's local space.
    fn raycast(&self, ray: &Ray) -> Vec<Intersection> {
        let inverse = self.transform.inverse();
        let origin = inverse.transform_point3(ray.origin);
        let direction = inverse.transform_vector3(ray.direction);

        if let Some((min, max)) = self.bounds {
            if !pick::intersects_aabb(origin, direction, min, max) {
                return Vec::new();
            }
        }

        let mut hits = Vec::new();
        let mut skipped = 0usize;
        for group in &self.groups {
            let Some(material) = self.material_of(group) else {
                continue;
            };
            if !material.visible {
                continue;
            }

            let end = group.end().min(self.indices.len() as u64) as usize;
            let mut first = group.start as usize;
            while first + 3 <= end {
                let Some((v0, v1, v2)) = self.triangle(first) else {
                    skipped += 1;
                    first += 3;
                    continue;
                };
                if let Some((t, u, v)) = pick::intersect_triangle(origin, direction, v0, v1, v2) {
                    let point = self.transform.transform_point3(origin + direction * t);
                    let distance = ray.origin.distance(point);
                    if ray.accepts(distance) {
                        let weights = Vec3::new(1.0 - u - v, u, v);
                        hits.push(Intersection {
                            distance,
                            point,
                            index: u32::try_from(first / 3).unwrap_or(u32::MAX),
                            element_type: PickElementType::Face,
                            barycentric: Some(weights),
                            uv: self.interpolate_uv(first, weights),
                        });
                    }
                }
                first += 3;
            }
        }

        if skipped > 0 {
            log::warn!(
                "mesh '{}': skipped {skipped} triangles referencing missing vertices",
                self.name
            );
        }

        hits.sort_by(|a, b| a.distance.total_cmp(&b.distance));
        hits
    }
}

fn local_bounds(positions: &[Vec3]) -> Option<(Vec3, Vec3)> {
    if positions.is_empty() {
        return None;
    }
    let mut min = Vec3::splat(f32::MAX);
    let mut max = Vec3::splat(f32::MIN);
    for p in positions {
        min = min.min(*p);
        max = max.max(*p);
    }
    Some((min, max))
}
