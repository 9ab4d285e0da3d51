//! Core data model for subpick.
//!
//! This crate provides the CPU side of sub-element picking and selection:
//! - [`BatchedPickableMesh`] for merged geometry with per-range highlight and hide
//! - Draw ranges and the element [`hierarchy`] that name them
//! - The [`SelectionStore`] and the [`Scene`] that owns it
//! - The [`ModelCache`] of hierarchy/draw-range data with durable storage
//! - Point clouds, rays and pick-id encoding

// Documentation lints - internal functions don't need exhaustive panic/error docs
#![allow(clippy::missing_panics_doc)]
#![allow(clippy::missing_errors_doc)]
// Builder patterns return Self which doesn't need must_use
#![allow(clippy::must_use_candidate)]
// Index buffers are u32; lengths are converted at the edges
#![allow(clippy::cast_possible_truncation)]
#![allow(clippy::cast_precision_loss)]

pub mod batched_mesh;
pub mod cache;
pub mod draw_range;
pub mod error;
pub mod hierarchy;
pub mod options;
pub mod pick;
pub mod point_cloud;
pub mod registry;
pub mod scene;
pub mod selection;

pub use batched_mesh::{BatchedPickableMesh, Material, MaterialSlot, RenderGroup};
pub use cache::{CacheBackend, JsonDirBackend, MemoryBackend, ModelCache, ModelCacheEntry};
pub use draw_range::{DrawRange, DrawRangeMap, MeshDrawRanges, RangeId, Span};
pub use error::{PickError, Result};
pub use hierarchy::{ElementId, Hierarchy, HierarchyEntry, TreeIter, TreeNode, ROOT_SENTINEL};
pub use options::Options;
pub use pick::{Intersection, PickElementType, PickIdAllocator, Pickable, Ray};
pub use point_cloud::{MorphTarget, PointCloud, PointMaterial};
pub use registry::{MeshId, PointsId, Registry};
pub use scene::Scene;
pub use selection::{SelectionSnapshot, SelectionStore};

// Re-export glam types for convenience
pub use glam::{Mat4, Vec2, Vec3, Vec4};
