//! Error taxonomy for a capture operation.
//!
//! Every failure reaches the orchestrator's caller as one of these kinds.
//! `UserCancelled` is a normal abort path, not a fault.

use serde::{Deserialize, Serialize};
use thiserror::Error;

/// Terminal (or, for `SelectionTooSmall`, recoverable) outcome of a capture.
#[derive(Debug, Clone, PartialEq, Error)]
pub enum CaptureError {
    /// The frame provider could not produce a raster.
    #[error("screen capture unavailable: {0}")]
    CaptureUnavailable(String),

    /// Escape, explicit cancel, supersession, or the inactivity watchdog.
    #[error("capture cancelled: {0}")]
    UserCancelled(String),

    #[error("selection too small: {width}×{height} (minimum {min} px per side)")]
    SelectionTooSmall { width: f64, height: f64, min: f64 },

    /// The selection maps to no pixel of the captured raster. Usually stale
    /// metadata; retrying the capture fixes it.
    #[error("selection falls outside the captured frame: {0}")]
    CoordinateOutOfBounds(String),

    #[error("could not render crop: {0}")]
    RenderingUnavailable(String),
}

/// Serializable tag for `CaptureError`, sent to consumers.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub enum ErrorKind {
    CaptureUnavailable,
    UserCancelled,
    SelectionTooSmall,
    CoordinateOutOfBounds,
    RenderingUnavailable,
}

impl CaptureError {
    pub fn kind(&self) -> ErrorKind {
        match self {
            CaptureError::CaptureUnavailable(_) => ErrorKind::CaptureUnavailable,
            CaptureError::UserCancelled(_) => ErrorKind::UserCancelled,
            CaptureError::SelectionTooSmall { .. } => ErrorKind::SelectionTooSmall,
            CaptureError::CoordinateOutOfBounds(_) => ErrorKind::CoordinateOutOfBounds,
            CaptureError::RenderingUnavailable(_) => ErrorKind::RenderingUnavailable,
        }
    }

    /// True for aborts the user asked for. Callers should not log these as failures.
    pub fn is_user_abort(&self) -> bool {
        matches!(self, CaptureError::UserCancelled(_))
    }
}

/// Failure payload delivered to the selection consumer.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct CaptureFailure {
    pub error_kind: ErrorKind,
    pub message: String,
}

impl From<&CaptureError> for CaptureFailure {
    fn from(err: &CaptureError) -> Self {
        Self {
            error_kind: err.kind(),
            message: err.to_string(),
        }
    }
}

/// Errors raised by a frame capture provider.
#[derive(Debug, Clone, PartialEq, Error)]
pub enum ProviderError {
    #[error("permission to capture this tab was denied")]
    PermissionDenied,

    #[error("capture is not allowed on this page: {0}")]
    RestrictedPage(String),

    #[error("{0}")]
    Failed(String),
}

impl From<ProviderError> for CaptureError {
    fn from(err: ProviderError) -> Self {
        CaptureError::CaptureUnavailable(err.to_string())
    }
}
