//! Id bookkeeping for the GPU point pick pass.
//!
//! Every registered point cloud owns a contiguous block of 24-bit ids. The
//! pick pass draws each vertex with the color encoding `block.start + index`;
//! reading a pixel back and decoding its color recovers the cloud and vertex.

use std::collections::HashMap;

use glam::Mat4;
use subpick_core::pick::{index_to_color, IdBlock};
use subpick_core::{PickIdAllocator, PointCloud, PointsId};

/// Uniforms for the point pick shader (must match `PickUniforms` in `pick_points.wgsl`).
#[repr(C)]
#[derive(Debug, Clone, Copy, bytemuck::Pod, bytemuck::Zeroable)]
pub struct PointPickUniforms {
    pub view: [[f32; 4]; 4],
    pub proj: [[f32; 4]; 4],
    pub model: [[f32; 4]; 4],
    /// Viewport size in pixels.
    pub viewport: [f32; 2],
    /// Point size in pixels (or world-scaled when attenuated).
    pub point_size: f32,
    /// Non-zero when the point size shrinks with distance.
    pub size_attenuation: u32,
    /// Width of the id texture, used to address texels by vertex index.
    pub id_texture_width: u32,
    pub _padding: [u32; 3],
}

impl Default for PointPickUniforms {
    fn default() -> Self {
        Self {
            view: Mat4::IDENTITY.to_cols_array_2d(),
            proj: Mat4::IDENTITY.to_cols_array_2d(),
            model: Mat4::IDENTITY.to_cols_array_2d(),
            viewport: [1.0, 1.0],
            point_size: 1.0,
            size_attenuation: 0,
            id_texture_width: 1,
            _padding: [0; 3],
        }
    }
}

/// Size of the 2D texture holding `count` id colors, one texel per vertex.
///
/// The width is capped at `max_dimension`; rows fill left to right. Returns
/// `None` for empty clouds and clouds too large for a single texture.
#[must_use]
pub fn id_texture_extent(count: u32, max_dimension: u32) -> Option<(u32, u32)> {
    if count == 0 || max_dimension == 0 {
        return None;
    }
    let width = count.min(max_dimension);
    let height = count.div_ceil(width);
    (height <= max_dimension).then_some((width, height))
}

/// Texel data (RGBA8) for an id block laid out in a `width`-wide texture.
#[must_use]
pub fn id_texture_data(block: IdBlock, width: u32, height: u32) -> Vec<u8> {
    let texels = (width as usize) * (height as usize);
    let mut data = vec![0u8; texels * 4];
    for (i, texel) in data.chunks_exact_mut(4).take(block.count as usize).enumerate() {
        let [r, g, b] = index_to_color(block.start + i as u32);
        texel.copy_from_slice(&[r, g, b, 255]);
    }
    data
}

/// Tracks which point clouds take part in GPU picking and the ids they own.
#[derive(Debug, Default)]
pub struct PointIdRegistry {
    allocator: PickIdAllocator<PointsId>,
    generations: HashMap<PointsId, u64>,
    next_generation: u64,
}

impl PointIdRegistry {
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Registers a cloud and attaches its per-vertex id colors.
    ///
    /// Idempotent while the vertex count is unchanged. When the count changes
    /// the block is reallocated and the colors are regenerated.
    pub fn register(&mut self, id: PointsId, cloud: &mut PointCloud) -> Option<IdBlock> {
        let Ok(count) = u32::try_from(cloud.num_points()) else {
            log::error!("{id}: too many points for GPU picking");
            return None;
        };
        let previous = self.allocator.block(&id);
        let block = self.allocator.allocate(id, count)?;

        let colors_current = cloud.pick_colors().is_some_and(|colors| {
            colors.len() == count as usize
                && colors.first().copied() == (count > 0).then(|| index_to_color(block.start))
        });
        if previous == Some(block) && colors_current {
            return Some(block);
        }

        let colors = (0..count).map(|i| index_to_color(block.start + i)).collect();
        cloud.set_pick_colors(colors);
        self.generations.insert(id, self.next_generation);
        self.next_generation += 1;
        log::debug!("{id}: pick ids {}..{}", block.start, block.start + count);
        Some(block)
    }

    /// Stops picking a cloud. Its ids go back to the allocator.
    pub fn unregister(&mut self, id: PointsId) -> Option<IdBlock> {
        self.generations.remove(&id);
        self.allocator.release(&id)
    }

    pub fn block(&self, id: PointsId) -> Option<IdBlock> {
        self.allocator.block(&id)
    }

    /// Counter that changes whenever a cloud's id block is (re)assigned.
    pub fn generation(&self, id: PointsId) -> Option<u64> {
        self.generations.get(&id).copied()
    }

    /// Decodes a global id into `(cloud, vertex index)`.
    pub fn resolve(&self, global_id: u32) -> Option<(PointsId, u32)> {
        self.allocator.resolve(global_id)
    }

    /// Registered clouds and their blocks.
    pub fn iter(&self) -> impl Iterator<Item = (PointsId, IdBlock)> + '_ {
        self.allocator.iter().map(|(id, block)| (*id, *block))
    }

    pub fn is_empty(&self) -> bool {
        self.allocator.is_empty()
    }
}
