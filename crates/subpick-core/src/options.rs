//! Configuration options for picking and selection.

use std::path::{Path, PathBuf};

use glam::{Vec3, Vec4};
use serde::{Deserialize, Serialize};

use crate::error::Result;

/// Configuration options shared by the index, the picker and the coordinator.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct Options {
    /// Whether point-cloud hits are resolved through the GPU id pass.
    pub gpu_point_picking: bool,

    /// World-space radius of the CPU point test used when GPU picking is off.
    pub point_pick_threshold: f32,

    /// Timeout applied to every draw range index request (0 = wait indefinitely).
    pub index_request_timeout_ms: u64,

    /// Directory of the durable model cache. `None` keeps the cache in memory only.
    pub cache_dir: Option<PathBuf>,

    /// Color of the highlight material slot.
    pub highlight_color: Vec4,

    /// Color of the base material slot.
    pub base_color: Vec4,

    /// Global translation subtracted from models at load time.
    pub model_offset: Vec3,
}

impl Default for Options {
    fn default() -> Self {
        Self {
            gpu_point_picking: true,
            point_pick_threshold: 0.01,
            index_request_timeout_ms: 5000,
            cache_dir: None,
            highlight_color: Vec4::new(1.0, 0.55, 0.0, 1.0),
            base_color: Vec4::new(0.7, 0.7, 0.72, 1.0),
            model_offset: Vec3::ZERO,
        }
    }
}

impl Options {
    /// Parses options from a JSON document. Missing fields take their defaults.
    pub fn from_json_str(json: &str) -> Result<Self> {
        Ok(serde_json::from_str(json)?)
    }

    /// Loads options from a JSON file.
    pub fn load(path: impl AsRef<Path>) -> Result<Self> {
        let text = std::fs::read_to_string(path)?;
        Self::from_json_str(&text)
    }

    /// Writes options to a JSON file.
    pub fn save(&self, path: impl AsRef<Path>) -> Result<()> {
        let text = serde_json::to_string_pretty(self)?;
        std::fs::write(path, text)?;
        Ok(())
    }

    /// Returns the request timeout, or `None` when requests wait indefinitely.
    #[must_use]
    pub fn index_request_timeout(&self) -> Option<std::time::Duration> {
        (self.index_request_timeout_ms > 0)
            .then(|| std::time::Duration::from_millis(self.index_request_timeout_ms))
    }
}
