//! subpick: sub-element picking and selection for batched model rendering.
//!
//! Large CAD/FEM models are drawn as a few merged meshes, each covering many
//! named elements through *draw ranges* (spans of the index buffer). This
//! crate lets a click on such a batch select, highlight, hide and name one
//! element without splitting the geometry.
//!
//! # Quick Start
//!
//! ```no_run
//! use subpick::*;
//!
//! fn main() -> Result<()> {
//!     init_logging();
//!
//!     let options = Options::default();
//!     let index = DrawRangeIndex::from_options(&options)?;
//!     let mut coordinator = SelectionCoordinator::new(Scene::new(options), index, (800, 600));
//!
//!     // Register meshes on coordinator.scene_mut() and model metadata with
//!     // coordinator.register_model(..), then forward clicks:
//!     coordinator.handle_click(&PointerEvent::shift_click(400.0, 300.0));
//!
//!     // Once per frame, apply whatever the index worker has answered
//!     coordinator.poll();
//!     Ok(())
//! }
//! ```
//!
//! # Architecture
//!
//! - [`Scene`] owns the meshes, point clouds and the [`SelectionStore`]
//! - [`DrawRangeIndex`] hosts the model cache on a worker thread
//! - [`HitResolver`]s turn a pointer position into a hit
//! - [`SelectionCoordinator`] ties them together and notifies [`SelectionListener`]s,
//!   picking up index answers from [`SelectionCoordinator::poll`]

// Viewport sizes are converted to float aspect ratios
#![allow(clippy::cast_precision_loss)]
#![allow(clippy::missing_errors_doc)]
#![allow(clippy::must_use_candidate)]

pub mod coordinator;
pub mod index;
pub mod resolver;

pub use coordinator::{ObjectInfo, PointerEvent, SelectionCoordinator, SelectionListener};
pub use index::{DrawRangeIndex, Pending};
pub use resolver::{GpuPointResolver, Hit, HitResolver, HitTarget, PickQuery, RaycastResolver};

// Re-export core types
pub use subpick_core::{
    BatchedPickableMesh, CacheBackend, DrawRange, DrawRangeMap, Hierarchy, HierarchyEntry,
    JsonDirBackend, Mat4, Material, MaterialSlot, MemoryBackend, MeshDrawRanges, MeshId,
    ModelCacheEntry, Options, PickError, Pickable, PointCloud, PointMaterial, PointsId, RangeId,
    Ray, Registry, Result, Scene, SelectionSnapshot, SelectionStore, Span, TreeNode, Vec2, Vec3,
    Vec4,
};

// Re-export render types
pub use subpick_render::{Camera, GpuContext, GpuPointPicker, PointPick, ProjectionMode};

/// Installs `env_logger`, reading the level from `RUST_LOG`.
///
/// Safe to call more than once; later calls are no-ops.
pub fn init_logging() {
    if env_logger::try_init().is_ok() {
        log::debug!("logging initialized");
    }
}

/// Creates a headless GPU point picker, or `None` when no adapter is available.
pub fn headless_point_picker() -> Option<GpuPointPicker> {
    use pollster::FutureExt;

    match GpuContext::new_headless().block_on() {
        Ok(gpu) => Some(GpuPointPicker::new(&gpu.device, &gpu.queue)),
        Err(e) => {
            log::warn!("GPU point picking unavailable: {e}");
            None
        }
    }
}
