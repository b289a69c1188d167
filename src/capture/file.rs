use std::path::PathBuf;

use super::FrameProvider;
use crate::error::ProviderError;
use crate::geometry::{CapturedFrame, ViewportMetadata};
use crate::transform::FrameCapability;

/// Serves a previously saved screenshot as if it were a live capture.
pub struct FileFrameProvider {
    path: PathBuf,
    metadata: ViewportMetadata,
    capability: Option<FrameCapability>,
}

impl FileFrameProvider {
    pub fn new(path: impl Into<PathBuf>, metadata: ViewportMetadata) -> Self {
        Self {
            path: path.into(),
            metadata,
            capability: None,
        }
    }

    pub fn with_capability(mut self, capability: FrameCapability) -> Self {
        self.capability = Some(capability);
        self
    }
}

impl FrameProvider for FileFrameProvider {
    fn snapshot_metadata(&self) -> ViewportMetadata {
        self.metadata.clone()
    }

    async fn capture_visible_frame(&self) -> Result<CapturedFrame, ProviderError> {
        let bytes = tokio::fs::read(&self.path).await.map_err(|e| match e.kind() {
            std::io::ErrorKind::PermissionDenied => ProviderError::PermissionDenied,
            _ => ProviderError::Failed(format!("failed to read {}: {}", self.path.display(), e)),
        })?;
        let decoded = image::load_from_memory(&bytes).map_err(|e| {
            ProviderError::Failed(format!("failed to decode {}: {}", self.path.display(), e))
        })?;
        log::info!(
            "[CAPTURE] Loaded {}×{} frame from {}",
            decoded.width(),
            decoded.height(),
            self.path.display()
        );
        Ok(CapturedFrame::from_image(decoded.to_rgba8()))
    }

    fn capability(&self) -> Option<FrameCapability> {
        self.capability
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[tokio::test]
    async fn missing_file_fails_without_panicking() {
        let meta = ViewportMetadata::new(1.0, 1.0, 100, 100, 0, 0);
        let provider = FileFrameProvider::new("/definitely/not/here.png", meta);
        let err = provider.capture_visible_frame().await.unwrap_err();
        assert!(matches!(err, ProviderError::Failed(_)));
    }

    #[tokio::test]
    async fn loads_png_from_disk() {
        let path = std::env::temp_dir().join(format!("case-capture-frame-{}.png", std::process::id()));
        image::RgbaImage::from_pixel(8, 6, image::Rgba([1, 2, 3, 255]))
            .save(&path)
            .unwrap();
        let meta = ViewportMetadata::new(1.0, 1.0, 8, 6, 0, 0);
        let frame = FileFrameProvider::new(&path, meta)
            .capture_visible_frame()
            .await
            .unwrap();
        assert_eq!((frame.width_px, frame.height_px), (8, 6));
        let _ = std::fs::remove_file(&path);
    }
}
