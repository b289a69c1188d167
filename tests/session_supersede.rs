//! At-most-one-session behavior: supersession, stale frames, watchdog.

use std::cell::Cell;
use std::sync::{Arc, Mutex};
use std::time::Duration;

use case_capture_lib::config::CaptureConfig;
use case_capture_lib::error::{CaptureError, ErrorKind, ProviderError};
use case_capture_lib::geometry::{CapturedFrame, ViewportMetadata};
use case_capture_lib::orchestrator::{
    CaptureOrchestrator, CaptureOutcome, EventOutcome, OrchestratorState, OverlaySurface,
    SelectionConsumer, SessionId,
};
use case_capture_lib::selection::{OverlayView, PointerButton, SelectionInput};
use case_capture_lib::FrameProvider;
use image::RgbaImage;

#[derive(Debug, Clone, PartialEq)]
enum SurfaceEvent {
    Attach(SessionId),
    Render(SessionId),
    Detach(SessionId),
}

/// Records overlay calls into a shared log.
#[derive(Clone, Default)]
struct RecordingSurface(Arc<Mutex<Vec<SurfaceEvent>>>);

impl RecordingSurface {
    fn events(&self) -> Vec<SurfaceEvent> {
        self.0.lock().unwrap().clone()
    }
}

impl OverlaySurface for RecordingSurface {
    fn attach(&mut self, session: SessionId, _view: &OverlayView) {
        self.0.lock().unwrap().push(SurfaceEvent::Attach(session));
    }

    fn render(&mut self, session: SessionId, _view: &OverlayView) {
        self.0.lock().unwrap().push(SurfaceEvent::Render(session));
    }

    fn detach(&mut self, session: SessionId) {
        self.0.lock().unwrap().push(SurfaceEvent::Detach(session));
    }
}

#[derive(Clone, Default)]
struct RecordingConsumer(Arc<Mutex<Vec<(SessionId, Result<(u32, u32), ErrorKind>)>>>);

impl RecordingConsumer {
    fn results(&self) -> Vec<(SessionId, Result<(u32, u32), ErrorKind>)> {
        self.0.lock().unwrap().clone()
    }
}

impl SelectionConsumer for RecordingConsumer {
    fn deliver(&mut self, session: SessionId, outcome: CaptureOutcome) {
        self.0.lock().unwrap().push((
            session,
            outcome
                .map(|s| (s.crop.logical_width, s.crop.logical_height))
                .map_err(|f| f.error_kind),
        ));
    }
}

/// Yields once inside the capture so two starts can interleave.
struct YieldingProvider {
    meta: ViewportMetadata,
}

impl FrameProvider for YieldingProvider {
    fn snapshot_metadata(&self) -> ViewportMetadata {
        self.meta.clone()
    }

    async fn capture_visible_frame(&self) -> Result<CapturedFrame, ProviderError> {
        tokio::task::yield_now().await;
        Ok(CapturedFrame::from_image(RgbaImage::new(800, 600)))
    }
}

/// Scrolls the page between the before and after snapshots.
struct ScrollingProvider {
    calls: Cell<i32>,
}

impl FrameProvider for ScrollingProvider {
    fn snapshot_metadata(&self) -> ViewportMetadata {
        let n = self.calls.get();
        self.calls.set(n + 1);
        ViewportMetadata::new(1.0, 1.0, 800, 600, 0, n * 250)
    }

    async fn capture_visible_frame(&self) -> Result<CapturedFrame, ProviderError> {
        Ok(CapturedFrame::from_image(RgbaImage::new(800, 600)))
    }
}

fn setup() -> (
    CaptureOrchestrator<YieldingProvider, RecordingSurface, RecordingConsumer>,
    RecordingSurface,
    RecordingConsumer,
) {
    let surface = RecordingSurface::default();
    let consumer = RecordingConsumer::default();
    let o = CaptureOrchestrator::new(
        YieldingProvider {
            meta: ViewportMetadata::new(1.0, 1.0, 800, 600, 0, 0),
        },
        surface.clone(),
        consumer.clone(),
        CaptureConfig::default(),
    );
    (o, surface, consumer)
}

fn down(x: f64, y: f64) -> SelectionInput {
    SelectionInput::PointerDown { x, y, button: PointerButton::Primary }
}

#[tokio::test]
async fn new_session_tears_down_previous_overlay_first() {
    let (o, surface, consumer) = setup();

    let a = o.start().await.unwrap();
    o.handle_event(a, down(10.0, 10.0));
    let b = o.start().await.unwrap();
    assert_ne!(a, b);

    assert_eq!(
        surface.events(),
        vec![
            SurfaceEvent::Attach(a),
            SurfaceEvent::Render(a),
            SurfaceEvent::Detach(a),
            SurfaceEvent::Attach(b),
        ]
    );
    assert_eq!(consumer.results(), vec![(a, Err(ErrorKind::UserCancelled))]);

    // A's overlay is gone: its events are dropped, B is untouched.
    assert_eq!(o.handle_event(a, SelectionInput::PointerUp { x: 200.0, y: 200.0 }), EventOutcome::Stale);
    assert_eq!(o.active_session(), Some(b));
    assert_eq!(surface.events().len(), 4);

    o.handle_event(b, down(0.0, 0.0));
    assert_eq!(o.handle_event(b, SelectionInput::PointerUp { x: 50.0, y: 40.0 }), EventOutcome::Completed);
    assert_eq!(consumer.results()[1], (b, Ok((50, 40))));
}

#[tokio::test]
async fn frame_arriving_after_supersession_is_discarded() {
    let (o, surface, consumer) = setup();

    let (first, second) = tokio::join!(o.start(), o.start());

    assert!(matches!(first, Err(CaptureError::UserCancelled(_))));
    let b = second.unwrap();
    assert_eq!(o.active_session(), Some(b));
    // The first capture never attached an overlay.
    assert_eq!(surface.events(), vec![SurfaceEvent::Attach(b)]);
    assert_eq!(consumer.results(), vec![(SessionId(1), Err(ErrorKind::UserCancelled))]);
    assert_eq!(o.state(), OrchestratorState::AwaitingSelection);
}

#[tokio::test]
async fn cancel_during_capture_discards_frame() {
    let (o, surface, consumer) = setup();

    let (started, cancelled) = tokio::join!(o.start(), async { o.cancel() });

    assert!(matches!(started, Err(CaptureError::UserCancelled(_))));
    assert_eq!(cancelled, Some(SessionId(1)));
    assert!(surface.events().is_empty());
    assert_eq!(consumer.results(), vec![(SessionId(1), Err(ErrorKind::UserCancelled))]);
    assert_eq!(o.active_session(), None);
}

#[tokio::test]
async fn escape_then_pending_pointer_up_emits_nothing() {
    let (o, surface, consumer) = setup();
    let a = o.start().await.unwrap();
    o.handle_event(a, down(10.0, 10.0));
    o.handle_event(a, SelectionInput::PointerMove { x: 300.0, y: 300.0 });
    o.handle_event(a, SelectionInput::Escape);
    assert_eq!(o.handle_event(a, SelectionInput::PointerUp { x: 300.0, y: 300.0 }), EventOutcome::Stale);

    assert_eq!(consumer.results(), vec![(a, Err(ErrorKind::UserCancelled))]);
    assert_eq!(surface.events().last(), Some(&SurfaceEvent::Detach(a)));
}

#[tokio::test]
async fn layout_change_during_capture_aborts() {
    let consumer = RecordingConsumer::default();
    let surface = RecordingSurface::default();
    let o = CaptureOrchestrator::new(
        ScrollingProvider { calls: Cell::new(0) },
        surface.clone(),
        consumer.clone(),
        CaptureConfig::default(),
    );
    let err = o.start().await.unwrap_err();
    assert_eq!(err.kind(), ErrorKind::CaptureUnavailable);
    assert!(surface.events().is_empty());
    assert_eq!(consumer.results(), vec![(SessionId(1), Err(ErrorKind::CaptureUnavailable))]);
}

#[tokio::test(start_paused = true)]
async fn watchdog_cancels_abandoned_session() {
    let (o, surface, consumer) = setup();
    let config_timeout = o.config().selection_timeout();
    let a = o.start().await.unwrap();

    let started = tokio::time::Instant::now();
    o.watch_session(a).await;

    assert!(started.elapsed() >= config_timeout - Duration::from_secs(1));
    assert_eq!(o.active_session(), None);
    assert_eq!(surface.events().last(), Some(&SurfaceEvent::Detach(a)));
    assert_eq!(consumer.results(), vec![(a, Err(ErrorKind::UserCancelled))]);
}

#[tokio::test]
async fn watchdog_returns_immediately_for_finished_session() {
    let (o, _surface, _consumer) = setup();
    let a = o.start().await.unwrap();
    o.handle_event(a, SelectionInput::Escape);
    tokio::time::timeout(Duration::from_secs(1), o.watch_session(a))
        .await
        .expect("watchdog should not wait on a finished session");
}

#[tokio::test(start_paused = true)]
async fn start_watched_tears_down_abandoned_overlay_on_its_own() {
    let (o, surface, consumer) = setup();
    let o = Arc::new(o);
    let a = o.start_watched().await.unwrap();
    assert_eq!(o.active_session(), Some(a));

    tokio::time::sleep(o.config().selection_timeout() + Duration::from_secs(1)).await;

    assert_eq!(o.active_session(), None);
    assert_eq!(o.state(), OrchestratorState::Failed(ErrorKind::UserCancelled));
    assert_eq!(surface.events(), vec![SurfaceEvent::Attach(a), SurfaceEvent::Detach(a)]);
    assert_eq!(consumer.results(), vec![(a, Err(ErrorKind::UserCancelled))]);
}

#[tokio::test(start_paused = true)]
async fn start_watched_leaves_completed_session_alone() {
    let (o, _surface, consumer) = setup();
    let o = Arc::new(o);
    let a = o.start_watched().await.unwrap();
    o.handle_event(a, down(10.0, 10.0));
    o.handle_event(a, SelectionInput::PointerUp { x: 60.0, y: 50.0 });

    tokio::time::sleep(o.config().selection_timeout() * 2).await;
    assert_eq!(consumer.results(), vec![(a, Ok((50, 40)))]);
}
