/// Timeline configuration
///
/// Layout metrics, lazy-loading limits and worker pool settings. Stored as
/// JSON next to the other per-user settings so the magic numbers of the
/// thumbnail pipeline can be tuned without a rebuild.
use serde::{Deserialize, Serialize};
use std::path::{Path, PathBuf};
use std::time::Duration;

use crate::error::{Result, TimelineError};

/// Worker pool bounds. Fewer than two stalls the grid behind one slow video,
/// more than four starves the UI thread of CPU.
const MIN_WORKERS: usize = 2;
const MAX_WORKERS: usize = 4;

#[derive(Serialize, Deserialize, Debug, Clone, PartialEq)]
#[serde(default)]
pub struct TimelineConfig {
    // ========== Grid layout ==========
    /// Edge length of a grid thumbnail in pixels (also the decode size)
    pub thumb_size: u32,
    /// Gap between thumbnails and between rows
    pub spacing: f32,
    /// Total horizontal (and vertical) padding around a group's grid
    pub margins: f32,
    /// Height of the date header above each group
    pub header_height: f32,
    pub min_columns: usize,
    pub max_columns: usize,

    // ========== Virtualization ==========
    /// Groups rendered immediately on load; later ones start as placeholders
    pub eager_groups: usize,
    /// Items submitted unconditionally on load; the rest wait in the lazy queue
    pub initial_load_limit: usize,
    /// Pending items examined per settled scroll
    pub scan_cap: usize,
    /// Quiet period before a scroll burst counts as settled
    pub debounce_ms: u64,
    /// Extra pixels above and below the viewport that still count as visible
    /// when materializing groups
    pub overscan: f32,

    // ========== Decoding ==========
    pub workers: usize,
    pub shutdown_timeout_ms: u64,
    /// Emit a "broken photo" placeholder when a photo cannot be decoded
    pub photo_failure_placeholder: bool,

    // ========== Lightbox ==========
    pub preview_size: u32,
    pub preview_cache_capacity: usize,
    /// Records prefetched on each side of the one being viewed
    pub preview_neighbors: usize,
}

impl Default for TimelineConfig {
    fn default() -> Self {
        Self {
            thumb_size: 200,
            spacing: 2.0,
            margins: 40.0,
            header_height: 40.0,
            min_columns: 2,
            max_columns: 8,
            eager_groups: 5,
            initial_load_limit: 50,
            scan_cap: 200,
            debounce_ms: 150,
            overscan: 0.0,
            workers: 3,
            shutdown_timeout_ms: 2000,
            photo_failure_placeholder: true,
            preview_size: 1280,
            preview_cache_capacity: 5,
            preview_neighbors: 1,
        }
    }
}

impl TimelineConfig {
    /// Convert to JSON string for storage
    pub fn to_json(&self) -> std::result::Result<String, serde_json::Error> {
        serde_json::to_string_pretty(self)
    }

    /// Parse from JSON string; missing fields fall back to defaults
    pub fn from_json(json: &str) -> std::result::Result<Self, serde_json::Error> {
        serde_json::from_str(json)
    }

    /// Default location of the configuration file
    /// - Linux: ~/.config/photo-timeline/timeline.json
    pub fn default_path() -> PathBuf {
        let mut path = dirs::config_dir()
            .or_else(dirs::home_dir)
            .unwrap_or_else(|| PathBuf::from("."));
        path.push("photo-timeline");
        path.push("timeline.json");
        path
    }

    /// Load the configuration file, or defaults when it does not exist yet
    pub fn load(path: &Path) -> Result<Self> {
        if !path.exists() {
            log::info!("No config at {}, using defaults", path.display());
            return Ok(Self::default());
        }
        let json = std::fs::read_to_string(path)?;
        let config = Self::from_json(&json)?;
        config.validate()
    }

    pub fn save(&self, path: &Path) -> Result<()> {
        if let Some(parent) = path.parent() {
            std::fs::create_dir_all(parent)?;
        }
        std::fs::write(path, self.to_json()?)?;
        Ok(())
    }

    /// Reject values the layout math cannot work with and clamp the pool size
    pub fn validate(mut self) -> Result<Self> {
        if self.thumb_size == 0 {
            return Err(invalid("thumb_size", "must be positive"));
        }
        if self.preview_size == 0 {
            return Err(invalid("preview_size", "must be positive"));
        }
        if self.min_columns == 0 || self.min_columns > self.max_columns {
            return Err(invalid(
                "min_columns",
                format!("must be in 1..={}", self.max_columns),
            ));
        }
        if self.spacing < 0.0 || self.margins < 0.0 || self.header_height < 0.0 {
            return Err(invalid("spacing", "layout metrics cannot be negative"));
        }
        if self.preview_cache_capacity == 0 {
            return Err(invalid("preview_cache_capacity", "must be positive"));
        }

        let workers = self.workers.clamp(MIN_WORKERS, MAX_WORKERS);
        if workers != self.workers {
            log::warn!("workers = {} out of range, using {}", self.workers, workers);
            self.workers = workers;
        }
        Ok(self)
    }

    pub fn debounce(&self) -> Duration {
        Duration::from_millis(self.debounce_ms)
    }

    pub fn shutdown_timeout(&self) -> Duration {
        Duration::from_millis(self.shutdown_timeout_ms)
    }
}

fn invalid(field: &'static str, reason: impl Into<String>) -> TimelineError {
    TimelineError::InvalidConfig {
        field,
        reason: reason.into(),
    }
}
