//! Coordinate model — rectangles in CSS and device pixel space.
//!
//! Three spaces are in play during a region capture:
//! - viewport CSS pixels: what the overlay reports for pointer events
//! - page CSS pixels: viewport space shifted by the scroll offset
//! - device pixels: indices into the captured raster
//!
//! `Rect` carries CSS-space values (sub-pixel allowed while dragging),
//! `PixelRect` carries integer device-space values ready for cropping.

use image::RgbaImage;
use serde::{Deserialize, Serialize};
use std::time::SystemTime;

use crate::error::CaptureError;

/// A pointer position in viewport CSS pixels.
#[derive(Debug, Clone, Copy, PartialEq, Default, Serialize, Deserialize)]
pub struct Point {
    pub x: f64,
    pub y: f64,
}

impl Point {
    pub fn new(x: f64, y: f64) -> Self {
        Self { x, y }
    }
}

/// Axis-aligned rectangle in CSS pixels.
///
/// Width and height are never negative. A rectangle with zero width or
/// height is the "no selection" value. Deserialization goes through
/// [`Rect::new`]; writing the fields directly is unchecked.
#[derive(Debug, Clone, Copy, PartialEq, Default, Serialize, Deserialize)]
#[serde(from = "RectFields")]
pub struct Rect {
    pub x: f64,
    pub y: f64,
    pub width: f64,
    pub height: f64,
}

#[derive(Deserialize)]
struct RectFields {
    x: f64,
    y: f64,
    width: f64,
    height: f64,
}

impl From<RectFields> for Rect {
    fn from(f: RectFields) -> Self {
        Rect::new(f.x, f.y, f.width, f.height)
    }
}

impl Rect {
    pub fn new(x: f64, y: f64, width: f64, height: f64) -> Self {
        Self {
            x,
            y,
            width: width.max(0.0),
            height: height.max(0.0),
        }
    }

    /// Bounding box of two corner points, in any drag direction.
    pub fn from_corners(a: Point, b: Point) -> Self {
        Self {
            x: a.x.min(b.x),
            y: a.y.min(b.y),
            width: (b.x - a.x).abs(),
            height: (b.y - a.y).abs(),
        }
    }

    pub fn is_null(&self) -> bool {
        self.width <= 0.0 || self.height <= 0.0
    }

    pub fn right(&self) -> f64 {
        self.x + self.width
    }

    pub fn bottom(&self) -> f64 {
        self.y + self.height
    }

    /// Snap every component to the nearest integer. Applied once, at commit.
    pub fn rounded(&self) -> Self {
        Self {
            x: self.x.round(),
            y: self.y.round(),
            width: self.width.round(),
            height: self.height.round(),
        }
    }

    /// Shift by a scroll offset: viewport space → page space.
    pub fn offset(&self, dx: f64, dy: f64) -> Self {
        Self {
            x: self.x + dx,
            y: self.y + dy,
            ..*self
        }
    }

    /// CSS-pixel size the crop is rendered at.
    pub fn logical_size(&self) -> LogicalSize {
        LogicalSize {
            width: self.width.round().max(0.0) as u32,
            height: self.height.round().max(0.0) as u32,
        }
    }
}

/// Integer rectangle in device pixels of the captured raster.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
pub struct PixelRect {
    pub x: u32,
    pub y: u32,
    pub width: u32,
    pub height: u32,
}

impl PixelRect {
    pub fn new(x: u32, y: u32, width: u32, height: u32) -> Self {
        Self {
            x,
            y,
            width,
            height,
        }
    }

    pub fn right(&self) -> u64 {
        self.x as u64 + self.width as u64
    }

    pub fn bottom(&self) -> u64 {
        self.y as u64 + self.height as u64
    }

    /// True if the rectangle lies entirely inside a `width × height` raster.
    pub fn fits_within(&self, width: u32, height: u32) -> bool {
        self.right() <= width as u64 && self.bottom() <= height as u64
    }
}

/// Output size of a crop, in CSS pixels.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct LogicalSize {
    pub width: u32,
    pub height: u32,
}

/// Snapshot of the page's viewport at the moment a frame was captured.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ViewportMetadata {
    pub device_pixel_ratio: f64,
    #[serde(default = "default_zoom")]
    pub zoom_level: f64,
    pub viewport_width: u32,
    pub viewport_height: u32,
    #[serde(default)]
    pub scroll_x: i32,
    #[serde(default)]
    pub scroll_y: i32,
    /// Milliseconds since the Unix epoch.
    #[serde(default)]
    pub capture_timestamp_ms: u64,
}

fn default_zoom() -> f64 {
    1.0
}

impl ViewportMetadata {
    /// Build a snapshot stamped with the current wall-clock time.
    ///
    /// Non-positive or non-finite ratios fall back to 1.0, which is what the
    /// page reports when it cannot measure them.
    pub fn new(
        device_pixel_ratio: f64,
        zoom_level: f64,
        viewport_width: u32,
        viewport_height: u32,
        scroll_x: i32,
        scroll_y: i32,
    ) -> Self {
        let capture_timestamp_ms = SystemTime::now()
            .duration_since(SystemTime::UNIX_EPOCH)
            .map(|d| d.as_millis() as u64)
            .unwrap_or_default();
        Self {
            device_pixel_ratio: positive_or_one(device_pixel_ratio),
            zoom_level: positive_or_one(zoom_level),
            viewport_width,
            viewport_height,
            scroll_x,
            scroll_y,
            capture_timestamp_ms,
        }
    }

    /// Combined CSS → device scale factor.
    pub fn scale(&self) -> f64 {
        positive_or_one(self.device_pixel_ratio) * positive_or_one(self.zoom_level)
    }

    /// Whether two snapshots describe the same layout.
    ///
    /// Ratios and viewport size must match exactly (within float noise);
    /// scroll offsets may drift by up to `tolerance_px`.
    pub fn is_consistent_with(&self, other: &ViewportMetadata, tolerance_px: f64) -> bool {
        const RATIO_EPSILON: f64 = 1e-3;
        (self.device_pixel_ratio - other.device_pixel_ratio).abs() < RATIO_EPSILON
            && (self.zoom_level - other.zoom_level).abs() < RATIO_EPSILON
            && self.viewport_width == other.viewport_width
            && self.viewport_height == other.viewport_height
            && ((self.scroll_x - other.scroll_x) as f64).abs() <= tolerance_px
            && ((self.scroll_y - other.scroll_y) as f64).abs() <= tolerance_px
    }
}

fn positive_or_one(v: f64) -> f64 {
    if v.is_finite() && v > 0.0 {
        v
    } else {
        1.0
    }
}

/// A full-frame raster as returned by the capture provider.
///
/// `width_px`/`height_px` are the device-pixel dimensions actually captured,
/// which may differ from `viewport_width * device_pixel_ratio` when the
/// provider applies its own scaling.
#[derive(Debug, Clone)]
pub struct CapturedFrame {
    pub raster: RgbaImage,
    pub width_px: u32,
    pub height_px: u32,
}

impl CapturedFrame {
    pub fn from_image(raster: RgbaImage) -> Self {
        let (width_px, height_px) = raster.dimensions();
        Self {
            raster,
            width_px,
            height_px,
        }
    }

    /// Decode an encoded raster (PNG, or anything `image` can sniff).
    pub fn from_png_bytes(bytes: &[u8]) -> Result<Self, CaptureError> {
        let decoded = image::load_from_memory(bytes).map_err(|e| {
            CaptureError::RenderingUnavailable(format!("could not decode captured frame: {}", e))
        })?;
        Ok(Self::from_image(decoded.to_rgba8()))
    }
}
