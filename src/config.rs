//! Capture configuration.
//!
//! Resolution order:
//! 1. Built-in defaults
//! 2. `capture.json` in the platform config dir
//!    (`~/.config/case-capture/capture.json`, macOS:
//!    `~/Library/Application Support/case-capture/capture.json`)
//! 3. `CAPTURE_*` environment variables (`.env.local` / `.env` are loaded at init)

use serde::{Deserialize, Serialize};
use std::time::Duration;

use crate::transform::{FrameCapability, FrameExtent, FrameScaling};

const CONFIG_FILE: &str = "capture.json";

/// Minimum selection edge in CSS pixels.
pub const DEFAULT_MIN_SELECTION_SIZE: f64 = 10.0;

/// Inactivity watchdog for an open selection overlay.
pub const DEFAULT_SELECTION_TIMEOUT_SECS: u64 = 180;

/// Largest output edge we are willing to allocate (mirrors browser canvas limits).
pub const DEFAULT_MAX_OUTPUT_DIMENSION: u32 = 16_384;

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase", default)]
pub struct CaptureConfig {
    pub min_selection_size: f64,
    pub selection_timeout_secs: u64,
    pub capability: FrameCapability,
    /// Allowed scroll drift between the before/after metadata snapshots.
    pub metadata_tolerance_px: f64,
    pub max_output_dimension: u32,
    /// RGBA fill behind the crop.
    pub background: [u8; 4],
}

impl Default for CaptureConfig {
    fn default() -> Self {
        Self {
            min_selection_size: DEFAULT_MIN_SELECTION_SIZE,
            selection_timeout_secs: DEFAULT_SELECTION_TIMEOUT_SECS,
            capability: FrameCapability::default(),
            metadata_tolerance_px: 1.0,
            max_output_dimension: DEFAULT_MAX_OUTPUT_DIMENSION,
            background: [255, 255, 255, 255],
        }
    }
}

impl CaptureConfig {
    pub fn selection_timeout(&self) -> Duration {
        Duration::from_secs(self.selection_timeout_secs)
    }

    /// Defaults → config file → environment.
    pub fn load() -> Self {
        let mut config = load_file().unwrap_or_default();
        config.apply_env();
        log::info!(
            "[CONFIG] min_selection={}px timeout={}s extent={:?} scaling={:?}",
            config.min_selection_size,
            config.selection_timeout_secs,
            config.capability.extent,
            config.capability.scaling
        );
        config
    }

    /// Apply `CAPTURE_*` overrides from the process environment.
    pub fn apply_env(&mut self) {
        self.apply_overrides(|key| std::env::var(key).ok());
    }

    /// Apply overrides from any key lookup. Invalid values are logged and skipped.
    pub fn apply_overrides<F>(&mut self, lookup: F)
    where
        F: Fn(&str) -> Option<String>,
    {
        if let Some(v) = lookup("CAPTURE_MIN_SELECTION_PX") {
            match v.trim().parse::<f64>() {
                Ok(n) if n.is_finite() && n >= 0.0 => self.min_selection_size = n,
                _ => log::warn!("[CONFIG] Ignoring CAPTURE_MIN_SELECTION_PX={:?}", v),
            }
        }
        if let Some(v) = lookup("CAPTURE_SELECTION_TIMEOUT_SECS") {
            match v.trim().parse::<u64>() {
                Ok(n) if n > 0 => self.selection_timeout_secs = n,
                _ => log::warn!("[CONFIG] Ignoring CAPTURE_SELECTION_TIMEOUT_SECS={:?}", v),
            }
        }
        if let Some(v) = lookup("CAPTURE_FRAME_EXTENT") {
            match v.trim().to_lowercase().as_str() {
                "viewport" => self.capability.extent = FrameExtent::Viewport,
                "page" | "full_page" | "fullpage" => self.capability.extent = FrameExtent::FullPage,
                _ => log::warn!("[CONFIG] Ignoring CAPTURE_FRAME_EXTENT={:?}", v),
            }
        }
        if let Some(v) = lookup("CAPTURE_FRAME_SCALING") {
            match v.trim().to_lowercase().as_str() {
                "device" | "device_scaled" => self.capability.scaling = FrameScaling::DeviceScaled,
                "measured" => self.capability.scaling = FrameScaling::Measured,
                "css" | "css_pixels" => self.capability.scaling = FrameScaling::CssPixels,
                _ => log::warn!("[CONFIG] Ignoring CAPTURE_FRAME_SCALING={:?}", v),
            }
        }
        if let Some(v) = lookup("CAPTURE_METADATA_TOLERANCE_PX") {
            match v.trim().parse::<f64>() {
                Ok(n) if n.is_finite() && n >= 0.0 => self.metadata_tolerance_px = n,
                _ => log::warn!("[CONFIG] Ignoring CAPTURE_METADATA_TOLERANCE_PX={:?}", v),
            }
        }
    }
}

fn config_path() -> Option<std::path::PathBuf> {
    dirs::config_dir().map(|c| c.join("case-capture").join(CONFIG_FILE))
}

/// Read the config file. Returns `None` when it is absent or unreadable.
fn load_file() -> Option<CaptureConfig> {
    let path = config_path()?;
    let json = std::fs::read_to_string(&path).ok()?;
    match serde_json::from_str(&json) {
        Ok(config) => {
            log::info!("[CONFIG] Loaded {}", path.display());
            Some(config)
        }
        Err(e) => {
            log::warn!("[CONFIG] Failed to parse {}: {}", path.display(), e);
            None
        }
    }
}
