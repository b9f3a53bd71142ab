//! idcapture: auto-capture decision engine for guided ID-document photography
//!
//! Turns a live camera stream into three verified stills of an ID-1 card:
//! the front face, a hologram (OVD) proof shot under torch light, and the
//! back face with its machine-readable zone. The engine decides *when* to
//! shoot; cameras, text recognition, torch, motion sensing and upload are
//! supplied by the host through the traits in [`platform`].
//!
//! # Features
//! - Per-frame quality metrics (sharpness, coverage, aspect, glare, rainbow)
//! - Hysteresis readiness scoring with a coverage-dependent sharpness floor
//! - Baseline-relative hologram detection with dwell and hold counters
//! - Lightweight MRZ presence probing on the back face
//! - A single-flight capture flow driven by tokio
//!
//! # Usage
//! ```rust,ignore
//! use idcapture::{FlowRunner, IdCaptureConfig};
//!
//! let (handle, mut events) = FlowRunner::spawn(IdCaptureConfig::load_or_default(), devices);
//! handle.submit_frame(frame)?;
//! while let Some(event) = events.recv().await {
//!     // drive the UI
//! }
//! ```
#[macro_use]
pub mod invariant_ppt;

pub mod config;
pub mod errors;
pub mod flow;
pub mod motion;
pub mod mrz;
pub mod ovd;
pub mod platform;
pub mod quality;
pub mod readiness;
pub mod shot;
pub mod timing;
pub mod types;

// Testing utilities - synthetic frames and scripted collaborators
pub mod testing;

// Re-exports for convenience
pub use config::IdCaptureConfig;
pub use errors::CaptureError;
pub use flow::{
    EventStream, FlowEvent, FlowHandle, FlowInput, FlowMachine, FlowResult, FlowRunner, Guidance,
    Phase,
};
pub use motion::StabilityTracker;
pub use mrz::{MrzProbe, MrzSignals};
pub use ovd::{OvdDetector, OvdOutcome};
pub use platform::Collaborators;
pub use quality::MetricsExtractor;
pub use readiness::{ReadinessOutcome, ReadinessScorer};
pub use shot::ShotPreparer;
pub use timing::FlowClock;
pub use types::{
    CaptureStep, Frame, FrameMetrics, MotionSample, Quadrilateral, Rect, Shot,
    VerificationOutcome,
};

/// Initialize logging for the capture engine
pub fn init_logging() {
    if std::env::var("RUST_LOG").is_err() {
        std::env::set_var("RUST_LOG", "idcapture=info");
    }
    let _ = env_logger::try_init();
}

/// Version information
pub const VERSION: &str = env!("CARGO_PKG_VERSION");
pub const NAME: &str = env!("CARGO_PKG_NAME");
pub const DESCRIPTION: &str = env!("CARGO_PKG_DESCRIPTION");

/// Get crate information
pub fn get_info() -> CrateInfo {
    CrateInfo {
        name: NAME.to_string(),
        version: VERSION.to_string(),
        description: DESCRIPTION.to_string(),
        steps: vec![CaptureStep::Front, CaptureStep::Ovd, CaptureStep::Back],
    }
}

/// Crate information structure
#[derive(Debug, Clone, serde::Serialize, serde::Deserialize)]
pub struct CrateInfo {
    pub name: String,
    pub version: String,
    pub description: String,
    pub steps: Vec<CaptureStep>,
}
