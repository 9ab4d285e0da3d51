//! Rendering error types.

use thiserror::Error;

/// Errors that can occur during rendering operations.
#[derive(Error, Debug)]
pub enum RenderError {
    /// Failed to create wgpu adapter.
    #[error("failed to create graphics adapter")]
    AdapterCreationFailed,

    /// Failed to create wgpu device.
    #[error("failed to create graphics device: {0}")]
    DeviceCreationFailed(#[from] wgpu::RequestDeviceError),

    /// The requested target does not fit the device limits.
    #[error("pick target {width}x{height} exceeds the device limit of {max}")]
    TargetTooLarge { width: u32, height: u32, max: u32 },

    /// Reading the pick buffer back from the GPU failed.
    #[error("pick readback failed: {0}")]
    ReadbackFailed(String),
}

/// A specialized Result type for rendering operations.
pub type RenderResult<T> = std::result::Result<T, RenderError>;
