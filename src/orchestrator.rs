//! Capture orchestrator — sequences one region capture end to end.
//!
//! Idle → CapturingFrame → AwaitingSelection → Cropping → Done | Failed
//!
//! - capture: full-frame raster + metadata snapshots before and after
//! - selection: a `SelectionSession` attached to the host overlay
//! - crop: transform the committed rectangle, then crop
//!
//! At most one capture is active. Starting a new one cancels the previous
//! capture and detaches its overlay before the new overlay attaches. Results
//! for a capture that is no longer current are discarded.

use serde::Serialize;
use std::sync::{Arc, Mutex, MutexGuard, PoisonError};
use std::time::Instant;

use crate::capture::FrameProvider;
use crate::config::CaptureConfig;
use crate::crop::{CropResult, CropSummary, Cropper};
use crate::error::{CaptureError, CaptureFailure, ErrorKind};
use crate::geometry::{CapturedFrame, PixelRect, Rect, ViewportMetadata};
use crate::selection::{
    CancelReason, OverlayView, SelectionInput, SelectionSession, SelectionUpdate,
};
use crate::transform::{self, FrameCapability};

/// Identifies one capture operation. Overlay events carry it so that
/// events from a torn-down overlay can be recognized and dropped.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize)]
pub struct SessionId(pub u64);

impl std::fmt::Display for SessionId {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "#{}", self.0)
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "camelCase")]
pub enum OrchestratorState {
    Idle,
    CapturingFrame,
    AwaitingSelection,
    Cropping,
    Done,
    Failed(ErrorKind),
}

/// Successful capture, with provenance.
#[derive(Debug, Clone)]
pub struct CaptureSuccess {
    pub crop: CropResult,
    /// Committed selection in viewport CSS pixels, before scaling.
    pub rectangle: Rect,
    pub metadata: ViewportMetadata,
    pub device_rect: PixelRect,
}

/// JSON-friendly view of a `CaptureSuccess` (no pixels).
#[derive(Debug, Clone, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct CaptureSummary {
    pub crop: CropSummary,
    pub rectangle: Rect,
    pub metadata: ViewportMetadata,
}

impl CaptureSuccess {
    pub fn summary(&self) -> CaptureSummary {
        CaptureSummary {
            crop: self.crop.summary(),
            rectangle: self.rectangle,
            metadata: self.metadata.clone(),
        }
    }
}

pub type CaptureOutcome = Result<CaptureSuccess, CaptureFailure>;

/// Host rendering surface for the selection overlay.
///
/// After `detach` the host must remove every listener it installed for that
/// session and hide its visuals.
pub trait OverlaySurface {
    fn attach(&mut self, session: SessionId, view: &OverlayView);
    fn render(&mut self, session: SessionId, view: &OverlayView);
    fn detach(&mut self, session: SessionId);
}

/// Surface for headless runs. Logs instead of drawing.
#[derive(Debug, Default)]
pub struct HeadlessSurface;

impl OverlaySurface for HeadlessSurface {
    fn attach(&mut self, session: SessionId, _view: &OverlayView) {
        log::debug!("[OVERLAY] attach {}", session);
    }

    fn render(&mut self, session: SessionId, view: &OverlayView) {
        log::debug!("[OVERLAY] render {} {:?}", session, view.selection_box);
    }

    fn detach(&mut self, session: SessionId) {
        log::debug!("[OVERLAY] detach {}", session);
    }
}

/// Receives the terminal result of every capture.
pub trait SelectionConsumer {
    fn deliver(&mut self, session: SessionId, outcome: CaptureOutcome);
}

impl SelectionConsumer for tokio::sync::mpsc::UnboundedSender<(SessionId, CaptureOutcome)> {
    fn deliver(&mut self, session: SessionId, outcome: CaptureOutcome) {
        if self.send((session, outcome)).is_err() {
            log::warn!("[CAPTURE] Consumer for {} went away; result dropped", session);
        }
    }
}

/// What an overlay event led to.
#[derive(Debug, Clone, PartialEq)]
pub enum EventOutcome {
    /// The event belongs to a session that is no longer current.
    Stale,
    Ignored,
    /// Overlay re-rendered (hover or live rectangle).
    Updated,
    /// The host should call `preventDefault` on the context menu event.
    SuppressContextMenu,
    /// Selection too small; the overlay stays up for another try.
    Rejected(CaptureError),
    Completed,
    Failed(CaptureError),
}

struct ActiveCapture {
    id: SessionId,
    frame: CapturedFrame,
    metadata: ViewportMetadata,
    capability: FrameCapability,
    selection: SelectionSession,
}

impl ActiveCapture {
    fn view(&self) -> OverlayView {
        self.selection.view(
            self.metadata.viewport_width as f64,
            self.metadata.viewport_height as f64,
        )
    }
}

struct Inner<S, C> {
    generation: u64,
    state: OrchestratorState,
    /// Capture whose frame request is in flight.
    pending: Option<SessionId>,
    active: Option<ActiveCapture>,
    surface: S,
    consumer: C,
}

impl<S: OverlaySurface, C: SelectionConsumer> Inner<S, C> {
    /// Cancel whatever is in progress. The overlay is detached before the
    /// consumer hears about it.
    fn cancel_current(&mut self, reason: CancelReason) -> Option<SessionId> {
        if let Some(id) = self.pending.take() {
            self.finish(id, Err(CaptureError::UserCancelled(reason.to_string())));
            return Some(id);
        }
        let mut active = self.active.take()?;
        active.selection.cancel(reason);
        self.surface.detach(active.id);
        self.finish(active.id, Err(CaptureError::UserCancelled(reason.to_string())));
        Some(active.id)
    }

    fn finish(&mut self, id: SessionId, result: Result<CaptureSuccess, CaptureError>) {
        match &result {
            Ok(success) => {
                self.state = OrchestratorState::Done;
                log::info!(
                    "[CAPTURE] {} done: {}×{} crop",
                    id,
                    success.crop.logical_width,
                    success.crop.logical_height
                );
            }
            Err(err) => {
                self.state = OrchestratorState::Failed(err.kind());
                if err.is_user_abort() {
                    log::info!("[CAPTURE] {} ended: {}", id, err);
                } else {
                    log::error!("[CAPTURE] {} failed: {}", id, err);
                }
            }
        }
        self.consumer
            .deliver(id, result.map_err(|e| CaptureFailure::from(&e)));
    }
}

pub struct CaptureOrchestrator<P, S, C> {
    provider: P,
    config: CaptureConfig,
    cropper: Cropper,
    inner: Mutex<Inner<S, C>>,
}

impl<P, S, C> CaptureOrchestrator<P, S, C>
where
    P: FrameProvider,
    S: OverlaySurface,
    C: SelectionConsumer,
{
    pub fn new(provider: P, surface: S, consumer: C, config: CaptureConfig) -> Self {
        Self {
            provider,
            cropper: Cropper::from_config(&config),
            config,
            inner: Mutex::new(Inner {
                generation: 0,
                state: OrchestratorState::Idle,
                pending: None,
                active: None,
                surface,
                consumer,
            }),
        }
    }

    fn lock(&self) -> MutexGuard<'_, Inner<S, C>> {
        self.inner.lock().unwrap_or_else(PoisonError::into_inner)
    }

    pub fn config(&self) -> &CaptureConfig {
        &self.config
    }

    pub fn state(&self) -> OrchestratorState {
        self.lock().state
    }

    /// Session whose overlay is currently attached.
    pub fn active_session(&self) -> Option<SessionId> {
        self.lock().active.as_ref().map(|a| a.id)
    }

    pub fn current_view(&self) -> Option<OverlayView> {
        self.lock().active.as_ref().map(ActiveCapture::view)
    }

    /// Inspect the surface (hosts and tests).
    pub fn with_surface<R>(&self, f: impl FnOnce(&S) -> R) -> R {
        f(&self.lock().surface)
    }

    /// Begin a capture: take the frame, then attach a selection overlay.
    ///
    /// Supersedes any capture in progress. Returns once the overlay is
    /// attached; the final result goes to the consumer.
    ///
    /// The inactivity timeout only fires while something drives
    /// [`watch_session`](Self::watch_session) for the returned id. Use
    /// [`start_watched`](Self::start_watched) to have that spawned.
    pub async fn start(&self) -> Result<SessionId, CaptureError> {
        let id = {
            let mut inner = self.lock();
            if let Some(prev) = inner.cancel_current(CancelReason::Superseded) {
                log::info!("[CAPTURE] Superseding {}", prev);
            }
            inner.generation += 1;
            let id = SessionId(inner.generation);
            inner.pending = Some(id);
            inner.state = OrchestratorState::CapturingFrame;
            id
        };

        let start = Instant::now();
        let before = self.provider.snapshot_metadata();
        let captured = self.provider.capture_visible_frame().await;
        let after = self.provider.snapshot_metadata();

        let mut inner = self.lock();
        if inner.pending != Some(id) {
            log::info!("[CAPTURE] Discarding frame for {}: no longer current", id);
            return Err(CaptureError::UserCancelled(format!(
                "capture {} was cancelled before its frame arrived",
                id
            )));
        }
        inner.pending = None;

        let frame = match captured {
            Ok(frame) => frame,
            Err(e) => {
                let err = CaptureError::from(e);
                inner.finish(id, Err(err.clone()));
                return Err(err);
            }
        };
        if !before.is_consistent_with(&after, self.config.metadata_tolerance_px) {
            let err = CaptureError::CaptureUnavailable(
                "page layout changed while the frame was being captured".to_string(),
            );
            log::warn!("[CAPTURE] Metadata drift: {:?} → {:?}", before, after);
            inner.finish(id, Err(err.clone()));
            return Err(err);
        }

        log::info!(
            "[CAPTURE] {} frame {}×{} in {}ms (dpr={}, zoom={}, viewport={}×{})",
            id,
            frame.width_px,
            frame.height_px,
            start.elapsed().as_millis(),
            before.device_pixel_ratio,
            before.zoom_level,
            before.viewport_width,
            before.viewport_height
        );

        let active = ActiveCapture {
            id,
            frame,
            metadata: before,
            capability: self.provider.capability().unwrap_or(self.config.capability),
            selection: SelectionSession::new(
                self.config.min_selection_size,
                self.config.selection_timeout(),
                Instant::now(),
            ),
        };
        let view = active.view();
        inner.surface.attach(id, &view);
        inner.active = Some(active);
        inner.state = OrchestratorState::AwaitingSelection;
        Ok(id)
    }

    /// [`start`](Self::start), then spawn the session's watchdog on the
    /// current runtime so an abandoned overlay is torn down on timeout.
    pub async fn start_watched(self: &Arc<Self>) -> Result<SessionId, CaptureError>
    where
        P: Send + Sync + 'static,
        S: Send + 'static,
        C: Send + 'static,
    {
        let id = self.start().await?;
        let this = Arc::clone(self);
        tokio::spawn(async move { this.watch_session(id).await });
        log::debug!("[CAPTURE] Watchdog armed for {}", id);
        Ok(id)
    }

    /// Route an overlay event, stamped with the current time.
    pub fn handle_event(&self, session: SessionId, input: SelectionInput) -> EventOutcome {
        self.handle_event_at(session, input, Instant::now())
    }

    pub fn handle_event_at(
        &self,
        session: SessionId,
        input: SelectionInput,
        now: Instant,
    ) -> EventOutcome {
        let mut guard = self.lock();
        let inner = &mut *guard;
        let active = match inner.active.as_mut() {
            Some(active) if active.id == session => active,
            _ => {
                log::debug!("[CAPTURE] Dropping {:?} for stale session {}", input, session);
                return EventOutcome::Stale;
            }
        };

        match active.selection.handle(input, now) {
            SelectionUpdate::Ignored => EventOutcome::Ignored,
            SelectionUpdate::SuppressContextMenu => EventOutcome::SuppressContextMenu,
            SelectionUpdate::Hover(_) | SelectionUpdate::Live(_) => {
                let view = active.view();
                inner.surface.render(session, &view);
                EventOutcome::Updated
            }
            SelectionUpdate::TooSmall(err) => {
                let view = active.view();
                inner.surface.render(session, &view);
                EventOutcome::Rejected(err)
            }
            SelectionUpdate::Cancelled(reason) => {
                inner.active = None;
                inner.surface.detach(session);
                let err = CaptureError::UserCancelled(reason.to_string());
                inner.finish(session, Err(err.clone()));
                EventOutcome::Failed(err)
            }
            SelectionUpdate::Committed(rect) => {
                let Some(active) = inner.active.take() else {
                    return EventOutcome::Stale;
                };
                inner.surface.detach(session);
                inner.state = OrchestratorState::Cropping;
                let result = self.crop_selection(&active, rect);
                let outcome = match &result {
                    Ok(_) => EventOutcome::Completed,
                    Err(err) => EventOutcome::Failed(err.clone()),
                };
                inner.finish(session, result);
                outcome
            }
        }
    }

    /// Transform + crop for a committed rectangle.
    fn crop_selection(
        &self,
        active: &ActiveCapture,
        rect: Rect,
    ) -> Result<CaptureSuccess, CaptureError> {
        let placement = transform::map_to_device(
            &rect,
            &active.metadata,
            active.capability,
            active.frame.width_px,
            active.frame.height_px,
        )?;
        let crop = self
            .cropper
            .crop_placed(&active.frame, placement, rect.logical_size())?;
        Ok(CaptureSuccess {
            crop,
            rectangle: rect,
            metadata: active.metadata.clone(),
            device_rect: placement.rect,
        })
    }

    /// Cancel the current capture, if any.
    pub fn cancel(&self) -> Option<SessionId> {
        self.lock().cancel_current(CancelReason::Requested)
    }

    /// Expire `session` if its inactivity deadline has passed by `now`.
    pub fn expire(&self, session: SessionId, now: Instant) -> bool {
        let mut guard = self.lock();
        let inner = &mut *guard;
        let Some(active) = inner.active.as_mut().filter(|a| a.id == session) else {
            return false;
        };
        if active.selection.expire(now).is_none() {
            return false;
        }
        inner.active = None;
        inner.surface.detach(session);
        inner.finish(
            session,
            Err(CaptureError::UserCancelled(CancelReason::Timeout.to_string())),
        );
        true
    }

    /// Watchdog: sleep until the session's deadline and expire it if it is
    /// still waiting for a selection. Returns once the session is gone.
    pub async fn watch_session(&self, session: SessionId) {
        loop {
            let deadline = {
                let inner = self.lock();
                match inner.active.as_ref() {
                    Some(active) if active.id == session => active.selection.deadline(),
                    _ => return,
                }
            };
            tokio::time::sleep_until(tokio::time::Instant::from_std(deadline)).await;
            if self.expire(session, deadline) {
                log::info!("[CAPTURE] Watchdog expired {}", session);
                return;
            }
        }
    }
}
