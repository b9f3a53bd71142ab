//! Device and vision collaborators
//!
//! The capture engine never talks to a camera stack directly. Each capability
//! it needs is a narrow synchronous trait; a target platform provides one
//! implementation of each, and `crate::testing` provides scripted fakes.
//! The flow runner calls them from `spawn_blocking`, so implementations may
//! block.

use crate::config::DetectorConfig;
use crate::errors::CaptureError;
use crate::types::{
    CaptureStep, Frame, MotionSample, Quadrilateral, RecognitionSpeed, Rect, Shot,
    VerificationOutcome,
};
use std::sync::Arc;
use tokio::sync::mpsc;

/// Filters applied by the rectangle detector before it reports a quad.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct RectangleQuery {
    pub min_aspect: f32,
    pub max_aspect: f32,
    /// Minimum size relative to the searched region
    pub min_size: f32,
    /// Allowed deviation from 90 degrees at each corner
    pub quadrature_tolerance: f32,
    pub min_confidence: f32,
}

impl From<&DetectorConfig> for RectangleQuery {
    fn from(config: &DetectorConfig) -> Self {
        Self {
            min_aspect: config.min_aspect,
            max_aspect: 1.0,
            min_size: config.min_size,
            quadrature_tolerance: config.quadrature_tolerance,
            min_confidence: config.min_confidence,
        }
    }
}

impl Default for RectangleQuery {
    fn default() -> Self {
        Self::from(&DetectorConfig::default())
    }
}

/// Finds the most prominent document-like quadrilateral.
pub trait RectangleDetector: Send + Sync {
    /// Corners are in full-frame pixel coordinates even when `roi` is given.
    fn detect(
        &self,
        frame: &Frame,
        roi: Option<Rect>,
        query: &RectangleQuery,
    ) -> Result<Option<Quadrilateral>, CaptureError>;
}

/// On-device text recognition.
pub trait TextRecognizer: Send + Sync {
    /// Recognised lines inside `roi`, best candidate per line.
    fn recognize(
        &self,
        frame: &Frame,
        roi: Rect,
        speed: RecognitionSpeed,
    ) -> Result<Vec<String>, CaptureError>;
}

/// Full-resolution still capture.
pub trait PhotoCapture: Send + Sync {
    fn request_photo(&self) -> Result<Frame, CaptureError>;
}

/// Upload and OCR verification of one shot.
pub trait Verifier: Send + Sync {
    fn verify(&self, step: CaptureStep, shot: &Shot) -> Result<VerificationOutcome, CaptureError>;
}

/// Camera torch control.
pub trait Torch: Send + Sync {
    fn set_torch(&self, on: bool, level: f32) -> Result<(), CaptureError>;
}

/// Device-motion updates pushed into a channel at a fixed interval.
pub trait MotionSensor: Send + Sync {
    fn start(
        &self,
        interval_secs: f64,
        sink: mpsc::UnboundedSender<MotionSample>,
    ) -> Result<(), CaptureError>;
    fn stop(&self);
}

/// Every collaborator a capture flow needs.
#[derive(Clone)]
pub struct Collaborators {
    pub detector: Arc<dyn RectangleDetector>,
    pub recognizer: Arc<dyn TextRecognizer>,
    pub photo: Arc<dyn PhotoCapture>,
    pub verifier: Arc<dyn Verifier>,
    pub torch: Arc<dyn Torch>,
    pub motion: Arc<dyn MotionSensor>,
}

/// Torch held on for as long as the lease lives.
pub struct TorchLease {
    torch: Arc<dyn Torch>,
    level: f32,
}

impl TorchLease {
    pub fn acquire(torch: Arc<dyn Torch>, level: f32) -> Result<Self, CaptureError> {
        torch.set_torch(true, level)?;
        log::debug!("Torch on at level {:.2}", level);
        Ok(Self { torch, level })
    }

    pub fn level(&self) -> f32 {
        self.level
    }
}

impl Drop for TorchLease {
    fn drop(&mut self) {
        if let Err(e) = self.torch.set_torch(false, 0.0) {
            log::warn!("Failed to switch torch off: {}", e);
        } else {
            log::debug!("Torch off");
        }
    }
}

/// Motion updates flow into the sink until the lease is dropped.
pub struct MotionLease {
    sensor: Arc<dyn MotionSensor>,
}

impl MotionLease {
    pub fn acquire(
        sensor: Arc<dyn MotionSensor>,
        interval_secs: f64,
        sink: mpsc::UnboundedSender<MotionSample>,
    ) -> Result<Self, CaptureError> {
        sensor.start(interval_secs, sink)?;
        log::debug!("Motion updates started every {:.4}s", interval_secs);
        Ok(Self { sensor })
    }
}

impl Drop for MotionLease {
    fn drop(&mut self) {
        self.sensor.stop();
        log::debug!("Motion updates stopped");
    }
}
