//! Frame capture domain — public API.
//!
//! The privileged capture call lives in the host. This module only defines
//! the seam the orchestrator drives, plus a file-backed provider for replays
//! and tests.

mod file;

pub use file::FileFrameProvider;

use crate::error::ProviderError;
use crate::geometry::{CapturedFrame, ViewportMetadata};
use crate::transform::FrameCapability;

/// Source of full-frame rasters and the viewport metadata that goes with them.
///
/// `snapshot_metadata` must be cheap and synchronous: the orchestrator calls
/// it immediately before and after `capture_visible_frame` to detect layout
/// changes (scroll, resize) during the capture.
#[allow(async_fn_in_trait)]
pub trait FrameProvider {
    fn snapshot_metadata(&self) -> ViewportMetadata;

    async fn capture_visible_frame(&self) -> Result<CapturedFrame, ProviderError>;

    /// What the returned raster contains. `None` defers to configuration.
    fn capability(&self) -> Option<FrameCapability> {
        None
    }
}
