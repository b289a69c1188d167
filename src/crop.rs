//! Cropper — cut a device-pixel block out of the frame and re-render it at
//! the selection's logical (CSS-pixel) size.
//!
//! Downstream preview and upload code expects "as seen" dimensions, so a
//! 200×100 device block selected at DPR 2 comes out as a 100×50 image.

use image::imageops::{self, FilterType};
use image::{ImageFormat, Rgba, RgbaImage};
use serde::Serialize;

use crate::config::{CaptureConfig, DEFAULT_MAX_OUTPUT_DIMENSION};
use crate::error::CaptureError;
use crate::geometry::{CapturedFrame, LogicalSize, PixelRect};
use crate::transform::{clamp_to_bounds, DevicePlacement};

/// A cropped region at logical size.
#[derive(Debug, Clone)]
pub struct CropResult {
    pub raster: RgbaImage,
    pub logical_width: u32,
    pub logical_height: u32,
    /// Device-pixel block the crop was sampled from.
    pub source_rect: PixelRect,
}

/// Size/provenance summary of a crop, for logs and consumer payloads.
#[derive(Debug, Clone, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct CropSummary {
    pub logical_width: u32,
    pub logical_height: u32,
    pub source_rect: PixelRect,
}

impl CropResult {
    pub fn summary(&self) -> CropSummary {
        CropSummary {
            logical_width: self.logical_width,
            logical_height: self.logical_height,
            source_rect: self.source_rect,
        }
    }

    /// Encode to PNG in memory.
    pub fn to_png_bytes(&self) -> Result<Vec<u8>, CaptureError> {
        let mut png_bytes = Vec::new();
        self.raster
            .write_to(&mut std::io::Cursor::new(&mut png_bytes), ImageFormat::Png)
            .map_err(|e| CaptureError::RenderingUnavailable(format!("PNG encode failed: {}", e)))?;
        Ok(png_bytes)
    }

    /// Base64 PNG, the shape message-passing consumers want.
    pub fn to_base64_png(&self) -> Result<String, CaptureError> {
        let png_bytes = self.to_png_bytes()?;
        Ok(base64::Engine::encode(
            &base64::engine::general_purpose::STANDARD,
            &png_bytes,
        ))
    }
}

/// Rendering parameters for crops.
#[derive(Debug, Clone, Copy)]
pub struct Cropper {
    pub background: Rgba<u8>,
    pub max_output_dimension: u32,
    pub filter: FilterType,
}

impl Default for Cropper {
    fn default() -> Self {
        Self {
            background: Rgba([255, 255, 255, 255]),
            max_output_dimension: DEFAULT_MAX_OUTPUT_DIMENSION,
            filter: FilterType::Triangle,
        }
    }
}

impl Cropper {
    pub fn from_config(config: &CaptureConfig) -> Self {
        Self {
            background: Rgba(config.background),
            max_output_dimension: config.max_output_dimension,
            ..Self::default()
        }
    }

    /// Render `device_rect` of `frame` into a `target`-sized opaque canvas.
    ///
    /// `device_rect` is taken as the whole selection, so the block is
    /// resampled once to fill the canvas exactly.
    pub fn crop(
        &self,
        frame: &CapturedFrame,
        device_rect: PixelRect,
        target: LogicalSize,
    ) -> Result<CropResult, CaptureError> {
        self.crop_placed(frame, DevicePlacement::whole(device_rect), target)
    }

    /// Render a placed device block into a `target`-sized opaque canvas.
    ///
    /// The canvas is filled with the background first. The readable block is
    /// resampled at the selection's scale into the part of the canvas it
    /// covers, so any area that fell outside the frame stays background.
    /// Transparent source pixels show the background, never a hole.
    pub fn crop_placed(
        &self,
        frame: &CapturedFrame,
        placement: DevicePlacement,
        target: LogicalSize,
    ) -> Result<CropResult, CaptureError> {
        let start = std::time::Instant::now();

        if target.width == 0 || target.height == 0 {
            return Err(CaptureError::RenderingUnavailable(format!(
                "cannot allocate a {}×{} canvas",
                target.width, target.height
            )));
        }
        if target.width > self.max_output_dimension || target.height > self.max_output_dimension {
            return Err(CaptureError::RenderingUnavailable(format!(
                "{}×{} exceeds the {} px canvas limit",
                target.width, target.height, self.max_output_dimension
            )));
        }
        if frame.raster.dimensions() != (frame.width_px, frame.height_px) {
            return Err(CaptureError::RenderingUnavailable(format!(
                "raster is {:?} but frame declares {}×{}",
                frame.raster.dimensions(),
                frame.width_px,
                frame.height_px
            )));
        }

        let source_rect = clamp_to_bounds(placement.rect, frame.width_px, frame.height_px)?;
        let (dest_x, dest_width) = span(
            placement.trim_x,
            source_rect.width,
            placement.full_width,
            target.width,
        );
        let (dest_y, dest_height) = span(
            placement.trim_y,
            source_rect.height,
            placement.full_height,
            target.height,
        );

        let block = imageops::crop_imm(
            &frame.raster,
            source_rect.x,
            source_rect.y,
            source_rect.width,
            source_rect.height,
        )
        .to_image();

        let resampled = if block.dimensions() == (dest_width, dest_height) {
            block
        } else {
            imageops::resize(&block, dest_width, dest_height, self.filter)
        };

        let mut canvas = RgbaImage::from_pixel(target.width, target.height, self.background);
        for (x, y, src) in resampled.enumerate_pixels() {
            composite_over(canvas.get_pixel_mut(dest_x + x, dest_y + y), *src);
        }

        log::info!(
            "[CROP] {}×{} device block at ({},{}) → {}×{} at ({},{}) of {}×{} logical in {}ms",
            source_rect.width,
            source_rect.height,
            source_rect.x,
            source_rect.y,
            dest_width,
            dest_height,
            dest_x,
            dest_y,
            target.width,
            target.height,
            start.elapsed().as_millis()
        );

        Ok(CropResult {
            raster: canvas,
            logical_width: target.width,
            logical_height: target.height,
            source_rect,
        })
    }
}

/// Canvas offset and length covered by `len` device pixels that start `trim`
/// pixels into a `full`-pixel selection rendered at `target` logical pixels.
fn span(trim: u32, len: u32, full: u32, target: u32) -> (u32, u32) {
    let full = full.max(1) as f64;
    let to_canvas = |device: u64| ((device as f64 * target as f64 / full).round() as u32).min(target);
    let start = to_canvas(trim as u64).min(target - 1);
    let end = if trim as u64 + len as u64 >= full as u64 {
        target
    } else {
        to_canvas(trim as u64 + len as u64)
    };
    (start, end.saturating_sub(start).max(1))
}

/// Source-over blend of `src` onto `dst`, rounded to nearest.
fn composite_over(dst: &mut Rgba<u8>, src: Rgba<u8>) {
    let a = src[3] as u32;
    match a {
        255 => *dst = src,
        0 => {}
        _ => {
            let inv = 255 - a;
            for c in 0..3 {
                dst[c] = ((src[c] as u32 * a + dst[c] as u32 * inv + 127) / 255) as u8;
            }
            dst[3] = (a + (dst[3] as u32 * inv + 127) / 255) as u8;
        }
    }
}

/// Crop with the default white background.
pub fn crop(
    frame: &CapturedFrame,
    device_rect: PixelRect,
    target: LogicalSize,
) -> Result<CropResult, CaptureError> {
    Cropper::default().crop(frame, device_rect, target)
}
