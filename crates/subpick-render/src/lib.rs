//! GPU side of subpick.
//!
//! This crate provides:
//! - The [`Camera`] and screen-ray construction for CPU raycasts
//! - The [`GpuPointPicker`], which resolves point clicks by rendering an id buffer
//! - A headless [`GpuContext`] for offscreen picking and tests

// Pixel coordinates and texture sizes are converted at the edges
#![allow(clippy::cast_possible_truncation)]
#![allow(clippy::cast_precision_loss)]
#![allow(clippy::cast_sign_loss)]
#![allow(clippy::missing_errors_doc)]
#![allow(clippy::must_use_candidate)]

pub mod camera;
pub mod error;
pub mod gpu;
pub mod pick;
pub mod point_picker;

pub use camera::{Camera, ProjectionMode};
pub use error::{RenderError, RenderResult};
pub use gpu::GpuContext;
pub use pick::{id_texture_extent, PointIdRegistry, PointPickUniforms};
pub use point_picker::{GpuPointPicker, PointPick};
