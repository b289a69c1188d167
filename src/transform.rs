//! Coordinate transformer — viewport CSS rectangle → device-pixel crop box.
//!
//! What the raster actually contains is a property of the capture provider,
//! so it is described once by a `FrameCapability` instead of guessed per call:
//! - `extent`: does the raster show the visible viewport or the whole page?
//! - `scaling`: how CSS pixels map to raster pixels.
//!
//! There is exactly one transform, driven by that capability.

use serde::{Deserialize, Serialize};

use crate::error::CaptureError;
use crate::geometry::{PixelRect, Rect, ViewportMetadata};

/// Which part of the page the captured raster covers.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub enum FrameExtent {
    /// Exactly the visible viewport. Scroll offsets are ignored.
    #[default]
    Viewport,
    /// The whole page from its origin. Scroll offsets are added before scaling.
    FullPage,
}

/// How CSS pixels relate to raster pixels.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub enum FrameScaling {
    /// Raster is at device resolution: `scale = devicePixelRatio * zoomLevel`.
    #[default]
    DeviceScaled,
    /// Provider applies its own scaling; derive it from raster size / viewport size.
    Measured,
    /// Raster is already in CSS pixels.
    CssPixels,
}

/// Declared semantics of a frame capture provider.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct FrameCapability {
    #[serde(default)]
    pub extent: FrameExtent,
    #[serde(default)]
    pub scaling: FrameScaling,
}

impl FrameCapability {
    pub fn new(extent: FrameExtent, scaling: FrameScaling) -> Self {
        Self { extent, scaling }
    }

    /// Per-axis CSS → raster scale factors.
    pub fn scale_factors(
        &self,
        meta: &ViewportMetadata,
        raster_width: u32,
        raster_height: u32,
    ) -> (f64, f64) {
        match self.scaling {
            FrameScaling::DeviceScaled => {
                let s = meta.scale();
                (s, s)
            }
            FrameScaling::CssPixels => (1.0, 1.0),
            FrameScaling::Measured => {
                let sx = measured(raster_width, meta.viewport_width).unwrap_or_else(|| meta.scale());
                let sy = match self.extent {
                    // A full-page raster is taller than the viewport; only width is comparable.
                    FrameExtent::FullPage => sx,
                    FrameExtent::Viewport => {
                        measured(raster_height, meta.viewport_height).unwrap_or(sx)
                    }
                };
                (sx, sy)
            }
        }
    }
}

fn measured(raster: u32, viewport: u32) -> Option<f64> {
    if raster == 0 || viewport == 0 {
        None
    } else {
        Some(raster as f64 / viewport as f64)
    }
}

/// Where a selection lands in device pixels.
///
/// `rect` is the clamped block that can actually be read from the raster.
/// `full_width × full_height` is the scaled selection before any trimming, and
/// `trim_x`/`trim_y` count device pixels cut off its left/top edge. Together
/// they tell the cropper which part of the logical canvas the block covers.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct DevicePlacement {
    pub rect: PixelRect,
    pub full_width: u32,
    pub full_height: u32,
    pub trim_x: u32,
    pub trim_y: u32,
}

impl DevicePlacement {
    /// A block that covers the whole selection.
    pub fn whole(rect: PixelRect) -> Self {
        Self {
            rect,
            full_width: rect.width,
            full_height: rect.height,
            trim_x: 0,
            trim_y: 0,
        }
    }

    pub fn is_clipped(&self) -> bool {
        self.trim_x > 0
            || self.trim_y > 0
            || self.rect.width < self.full_width
            || self.rect.height < self.full_height
    }
}

/// Map a committed viewport-space selection to a device-pixel rectangle of
/// a `raster_width × raster_height` frame.
///
/// Components are scaled and rounded to the nearest integer. A width or
/// height that rounds to zero becomes 1. The result is then clamped to the
/// raster by shrinking width/height, never by moving the origin. An origin
/// that lands outside the raster is an error, not a 1×1 crop.
pub fn to_device_pixel_rect(
    rect: &Rect,
    meta: &ViewportMetadata,
    capability: FrameCapability,
    raster_width: u32,
    raster_height: u32,
) -> Result<PixelRect, CaptureError> {
    map_to_device(rect, meta, capability, raster_width, raster_height).map(|p| p.rect)
}

/// Same mapping as [`to_device_pixel_rect`], keeping what clamping cut off.
pub fn map_to_device(
    rect: &Rect,
    meta: &ViewportMetadata,
    capability: FrameCapability,
    raster_width: u32,
    raster_height: u32,
) -> Result<DevicePlacement, CaptureError> {
    if ![rect.x, rect.y, rect.width, rect.height]
        .iter()
        .all(|v| v.is_finite())
    {
        return Err(CaptureError::CoordinateOutOfBounds(format!(
            "non-finite selection {:?}",
            rect
        )));
    }

    let source = match capability.extent {
        FrameExtent::Viewport => *rect,
        FrameExtent::FullPage => rect.offset(meta.scroll_x as f64, meta.scroll_y as f64),
    };
    let (sx, sy) = capability.scale_factors(meta, raster_width, raster_height);

    let mut x = (source.x * sx).round() as i64;
    let mut y = (source.y * sy).round() as i64;
    let full_width = ((source.width * sx).round() as i64).max(1);
    let full_height = ((source.height * sy).round() as i64).max(1);
    let mut width = full_width;
    let mut height = full_height;
    let mut trim_x = 0;
    let mut trim_y = 0;

    // Negative page origins only arise from overscroll; trim rather than shift.
    if x < 0 {
        trim_x = -x;
        width += x;
        x = 0;
    }
    if y < 0 {
        trim_y = -y;
        height += y;
        y = 0;
    }

    if width <= 0 || height <= 0 || x >= raster_width as i64 || y >= raster_height as i64 {
        return Err(CaptureError::CoordinateOutOfBounds(format!(
            "selection ({}, {}) {}×{} css maps to ({}, {}) outside {}×{} frame",
            rect.x, rect.y, rect.width, rect.height, x, y, raster_width, raster_height
        )));
    }

    let to_u32 = |v: i64| v.min(u32::MAX as i64) as u32;
    let scaled = PixelRect::new(x as u32, y as u32, to_u32(width), to_u32(height));
    let clamped = clamp_to_bounds(scaled, raster_width, raster_height)?;

    log::debug!(
        "[TRANSFORM] css {:?} scale=({:.3}, {:.3}) {:?} → {:?}",
        rect,
        sx,
        sy,
        capability.extent,
        clamped
    );
    if clamped != scaled || trim_x > 0 || trim_y > 0 {
        log::info!(
            "[TRANSFORM] Clamped {}×{} to {}×{} at frame edge",
            full_width,
            full_height,
            clamped.width,
            clamped.height
        );
    }

    Ok(DevicePlacement {
        rect: clamped,
        full_width: to_u32(full_width),
        full_height: to_u32(full_height),
        trim_x: to_u32(trim_x),
        trim_y: to_u32(trim_y),
    })
}

/// Shrink `rect` so it lies inside a `raster_width × raster_height` raster.
///
/// The origin is never moved. Idempotent.
pub fn clamp_to_bounds(
    rect: PixelRect,
    raster_width: u32,
    raster_height: u32,
) -> Result<PixelRect, CaptureError> {
    if rect.x >= raster_width || rect.y >= raster_height || rect.width == 0 || rect.height == 0 {
        return Err(CaptureError::CoordinateOutOfBounds(format!(
            "{:?} does not intersect {}×{} frame",
            rect, raster_width, raster_height
        )));
    }
    Ok(PixelRect {
        width: rect.width.min(raster_width - rect.x),
        height: rect.height.min(raster_height - rect.y),
        ..rect
    })
}
