//! Case Capture — region capture core.
//!
//! Turns a drag gesture over a captured page into an exact crop of the
//! captured raster, accounting for device pixel ratio, browser zoom and
//! scroll offsets. Everything around it (capture API, overlay rendering,
//! upload, auth) belongs to the host and is reached through traits.
//!
//! Modules, leaf to root:
//!   - geometry      — rectangles, viewport metadata, captured frames
//!   - selection     — drag selection state machine + overlay view model
//!   - transform     — CSS rectangle → device-pixel crop box
//!   - crop          — resample the crop at logical size
//!   - orchestrator  — capture → select → transform → crop, one session at a time
//!   - capture       — frame provider seam
//!   - config, error — ambient plumbing

pub mod capture;
pub mod config;
pub mod crop;
pub mod error;
pub mod geometry;
pub mod orchestrator;
pub mod selection;
pub mod transform;

pub use capture::FrameProvider;
pub use config::CaptureConfig;
pub use error::{CaptureError, ErrorKind};
pub use orchestrator::CaptureOrchestrator;

/// Process-level setup: load `.env.local` → `.env`, then start logging.
///
/// Looks in the working directory first, then next to the crate manifest.
pub fn init() {
    let manifest_dir = std::path::Path::new(env!("CARGO_MANIFEST_DIR"));
    let roots = [std::path::PathBuf::from("."), manifest_dir.to_path_buf()];

    'env_load: for root in &roots {
        for env_file in [".env.local", ".env"] {
            let path = root.join(env_file);
            if path.exists() {
                match dotenvy::from_path(&path) {
                    Ok(_) => eprintln!("[STARTUP] Loaded {}", path.display()),
                    Err(e) => eprintln!("[STARTUP] Failed to load {}: {}", path.display(), e),
                }
                break 'env_load;
            }
        }
    }

    // Tests and embedding hosts may have installed a logger already.
    if let Err(e) = env_logger::try_init() {
        eprintln!("[STARTUP] Keeping existing logger: {}", e);
    }
}
