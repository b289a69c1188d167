//! Replay a recorded region selection against a saved screenshot.
//!
//! Usage:
//!   snip-replay <frame.png> <script.json> <out.png>
//!
//! The script holds the metadata snapshot and the overlay events:
//!
//! ```json
//! {
//!   "metadata": { "devicePixelRatio": 2, "viewportWidth": 960, "viewportHeight": 540 },
//!   "capability": { "extent": "viewport", "scaling": "deviceScaled" },
//!   "events": [
//!     { "type": "pointerDown", "x": 10, "y": 10, "button": "primary" },
//!     { "type": "pointerMove", "x": 80, "y": 40 },
//!     { "type": "pointerUp", "x": 110, "y": 60 }
//!   ]
//! }
//! ```
//!
//! Writes the crop to `<out.png>` and a JSON summary to stdout.

use std::path::Path;
use std::sync::Arc;

use case_capture_lib::capture::FileFrameProvider;
use case_capture_lib::geometry::ViewportMetadata;
use case_capture_lib::orchestrator::{
    CaptureOrchestrator, CaptureOutcome, EventOutcome, HeadlessSurface, SessionId,
};
use case_capture_lib::selection::SelectionInput;
use case_capture_lib::transform::FrameCapability;
use case_capture_lib::CaptureConfig;
use serde::Deserialize;

#[derive(Deserialize)]
struct Script {
    metadata: ViewportMetadata,
    #[serde(default)]
    capability: Option<FrameCapability>,
    events: Vec<SelectionInput>,
}

fn main() {
    case_capture_lib::init();

    let args: Vec<String> = std::env::args().collect();
    if args.len() < 4 {
        eprintln!("Usage:");
        eprintln!("  snip-replay <frame.png> <script.json> <out.png>");
        std::process::exit(1);
    }

    let runtime = match tokio::runtime::Builder::new_current_thread()
        .enable_time()
        .build()
    {
        Ok(rt) => rt,
        Err(e) => {
            eprintln!("Failed to start runtime: {}", e);
            std::process::exit(1);
        }
    };

    let code = match runtime.block_on(replay(
        Path::new(&args[1]),
        Path::new(&args[2]),
        Path::new(&args[3]),
    )) {
        Ok(summary) => {
            println!("{}", summary);
            0
        }
        Err(e) => {
            eprintln!("{}", e);
            2
        }
    };
    std::process::exit(code);
}

async fn replay(frame: &Path, script: &Path, out: &Path) -> Result<String, String> {
    let json = std::fs::read_to_string(script)
        .map_err(|e| format!("Failed to read {}: {}", script.display(), e))?;
    let script: Script =
        serde_json::from_str(&json).map_err(|e| format!("Bad script {}: {}", script.display(), e))?;

    let mut provider = FileFrameProvider::new(frame, script.metadata);
    if let Some(capability) = script.capability {
        provider = provider.with_capability(capability);
    }

    let (tx, mut rx) = tokio::sync::mpsc::unbounded_channel::<(SessionId, CaptureOutcome)>();
    let orchestrator = Arc::new(CaptureOrchestrator::new(
        provider,
        HeadlessSurface,
        tx,
        CaptureConfig::load(),
    ));

    let session = orchestrator.start_watched().await.map_err(|e| e.to_string())?;
    for event in script.events {
        match orchestrator.handle_event(session, event) {
            EventOutcome::Rejected(e) => log::info!("[REPLAY] {}", e),
            EventOutcome::Completed | EventOutcome::Failed(_) => break,
            _ => {}
        }
    }
    if orchestrator.active_session() == Some(session) {
        orchestrator.cancel();
    }

    let (_, outcome) = rx
        .recv()
        .await
        .ok_or_else(|| "No result delivered".to_string())?;
    let success = outcome.map_err(|f| {
        serde_json::to_string_pretty(&f).unwrap_or_else(|_| f.message.clone())
    })?;

    let png_bytes = success.crop.to_png_bytes().map_err(|e| e.to_string())?;
    std::fs::write(out, &png_bytes)
        .map_err(|e| format!("Failed to write {}: {}", out.display(), e))?;
    log::info!("[REPLAY] Wrote {} ({} bytes)", out.display(), png_bytes.len());

    serde_json::to_string_pretty(&success.summary()).map_err(|e| e.to_string())
}
