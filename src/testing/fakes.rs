//! Scripted stand-ins for every device collaborator
//!
//! Each fake records how it was called and replays queued responses, so a
//! whole capture flow can run under `#[tokio::test]` without a camera.

use crate::errors::CaptureError;
use crate::platform::{
    Collaborators, MotionSensor, PhotoCapture, RectangleDetector, RectangleQuery, TextRecognizer,
    Torch, Verifier,
};
use crate::testing::synthetic_data::{card_frame, card_rect, still_sample};
use crate::types::{
    CaptureStep, Frame, MotionSample, Quadrilateral, RecognitionSpeed, Rect, Shot,
    VerificationOutcome,
};
use std::collections::VecDeque;
use std::sync::atomic::{AtomicBool, AtomicUsize, Ordering};
use std::sync::{Arc, Mutex, MutexGuard};
use std::time::Duration;
use tokio::sync::mpsc;

fn lock<T>(mutex: &Mutex<T>) -> MutexGuard<'_, T> {
    mutex.lock().unwrap_or_else(|e| e.into_inner())
}

/// What the scripted detector reports.
#[derive(Debug, Clone, Copy, PartialEq)]
pub enum DetectorMode {
    /// Never finds a rectangle.
    None,
    /// Always the same quad, regardless of region.
    Fixed(Quadrilateral),
    /// A quad filling the searched region, shrunk by `inset` on each side.
    FillRegion { inset: f32 },
}

pub struct ScriptedDetector {
    mode: Mutex<DetectorMode>,
    calls: AtomicUsize,
}

impl ScriptedDetector {
    pub fn new(mode: DetectorMode) -> Self {
        Self {
            mode: Mutex::new(mode),
            calls: AtomicUsize::new(0),
        }
    }

    pub fn set_mode(&self, mode: DetectorMode) {
        *lock(&self.mode) = mode;
    }

    pub fn calls(&self) -> usize {
        self.calls.load(Ordering::SeqCst)
    }
}

impl RectangleDetector for ScriptedDetector {
    fn detect(
        &self,
        frame: &Frame,
        roi: Option<Rect>,
        _query: &RectangleQuery,
    ) -> Result<Option<Quadrilateral>, CaptureError> {
        self.calls.fetch_add(1, Ordering::SeqCst);
        let quad = match *lock(&self.mode) {
            DetectorMode::None => None,
            DetectorMode::Fixed(quad) => Some(quad),
            DetectorMode::FillRegion { inset } => {
                let region = roi.unwrap_or_else(|| frame.bounds());
                let rect = Rect::new(
                    region.x + inset,
                    region.y + inset,
                    (region.width - 2.0 * inset).max(0.0),
                    (region.height - 2.0 * inset).max(0.0),
                );
                Some(Quadrilateral::from_rect(rect, 0.9))
            }
        };
        Ok(quad)
    }
}

/// Replays queued line sets, then a default.
pub struct ScriptedRecognizer {
    responses: Mutex<VecDeque<Result<Vec<String>, CaptureError>>>,
    default: Vec<String>,
    calls: AtomicUsize,
}

impl ScriptedRecognizer {
    pub fn new(default: Vec<String>) -> Self {
        Self {
            responses: Mutex::new(VecDeque::new()),
            default,
            calls: AtomicUsize::new(0),
        }
    }

    /// Two TD1-style lines full of filler chevrons.
    pub fn mrz() -> Self {
        Self::new(vec![
            "I<TURA12B34567<8<<<<<<<<<<<<<<<".to_string(),
            "9001013M3001012TUR<<<<<<<<<<<6".to_string(),
        ])
    }

    pub fn silent() -> Self {
        Self::new(Vec::new())
    }

    pub fn push(&self, response: Result<Vec<String>, CaptureError>) {
        lock(&self.responses).push_back(response);
    }

    pub fn calls(&self) -> usize {
        self.calls.load(Ordering::SeqCst)
    }
}

impl TextRecognizer for ScriptedRecognizer {
    fn recognize(
        &self,
        _frame: &Frame,
        _roi: Rect,
        _speed: RecognitionSpeed,
    ) -> Result<Vec<String>, CaptureError> {
        self.calls.fetch_add(1, Ordering::SeqCst);
        lock(&self.responses)
            .pop_front()
            .unwrap_or_else(|| Ok(self.default.clone()))
    }
}

/// Returns a fixed still, or queued failures first.
pub struct FakePhotoCapture {
    frame: Frame,
    failures: Mutex<VecDeque<CaptureError>>,
    calls: AtomicUsize,
}

impl FakePhotoCapture {
    pub fn new(frame: Frame) -> Self {
        Self {
            frame,
            failures: Mutex::new(VecDeque::new()),
            calls: AtomicUsize::new(0),
        }
    }

    pub fn fail_next(&self, error: CaptureError) {
        lock(&self.failures).push_back(error);
    }

    pub fn calls(&self) -> usize {
        self.calls.load(Ordering::SeqCst)
    }
}

impl PhotoCapture for FakePhotoCapture {
    fn request_photo(&self) -> Result<Frame, CaptureError> {
        self.calls.fetch_add(1, Ordering::SeqCst);
        match lock(&self.failures).pop_front() {
            Some(error) => Err(error),
            None => Ok(self.frame.clone()),
        }
    }
}

/// Replays queued outcomes, accepting once the queue is empty.
pub struct ScriptedVerifier {
    outcomes: Mutex<VecDeque<Result<VerificationOutcome, CaptureError>>>,
    delay: Option<Duration>,
    steps: Mutex<Vec<CaptureStep>>,
}

impl ScriptedVerifier {
    pub fn new() -> Self {
        Self {
            outcomes: Mutex::new(VecDeque::new()),
            delay: None,
            steps: Mutex::new(Vec::new()),
        }
    }

    /// Block each verification for `delay`, like a network round trip.
    pub fn with_delay(mut self, delay: Duration) -> Self {
        self.delay = Some(delay);
        self
    }

    pub fn push(&self, outcome: Result<VerificationOutcome, CaptureError>) {
        lock(&self.outcomes).push_back(outcome);
    }

    /// Steps verified so far, in order.
    pub fn steps(&self) -> Vec<CaptureStep> {
        lock(&self.steps).clone()
    }
}

impl Default for ScriptedVerifier {
    fn default() -> Self {
        Self::new()
    }
}

impl Verifier for ScriptedVerifier {
    fn verify(&self, step: CaptureStep, _shot: &Shot) -> Result<VerificationOutcome, CaptureError> {
        if let Some(delay) = self.delay {
            std::thread::sleep(delay);
        }
        lock(&self.steps).push(step);
        lock(&self.outcomes)
            .pop_front()
            .unwrap_or_else(|| Ok(VerificationOutcome::accepted()))
    }
}

/// Torch that remembers every request.
pub struct FakeTorch {
    available: bool,
    on: AtomicBool,
    calls: Mutex<Vec<(bool, f32)>>,
}

impl FakeTorch {
    pub fn new(available: bool) -> Self {
        Self {
            available,
            on: AtomicBool::new(false),
            calls: Mutex::new(Vec::new()),
        }
    }

    pub fn is_on(&self) -> bool {
        self.on.load(Ordering::SeqCst)
    }

    pub fn calls(&self) -> Vec<(bool, f32)> {
        lock(&self.calls).clone()
    }
}

impl Torch for FakeTorch {
    fn set_torch(&self, on: bool, level: f32) -> Result<(), CaptureError> {
        if !self.available {
            return Err(CaptureError::TorchUnavailable(
                "device has no torch".to_string(),
            ));
        }
        lock(&self.calls).push((on, level));
        self.on.store(on, Ordering::SeqCst);
        Ok(())
    }
}

/// Motion sensor fed by the test; `start` primes the sink with still samples.
pub struct FakeMotionSensor {
    available: bool,
    prefill: usize,
    sink: Mutex<Option<mpsc::UnboundedSender<MotionSample>>>,
    starts: AtomicUsize,
}

impl FakeMotionSensor {
    pub fn new(available: bool, prefill: usize) -> Self {
        Self {
            available,
            prefill,
            sink: Mutex::new(None),
            starts: AtomicUsize::new(0),
        }
    }

    /// Deliver a sample if updates are running.
    pub fn push(&self, sample: MotionSample) -> bool {
        match lock(&self.sink).as_ref() {
            Some(sink) => sink.send(sample).is_ok(),
            None => false,
        }
    }

    pub fn is_running(&self) -> bool {
        lock(&self.sink).is_some()
    }

    pub fn starts(&self) -> usize {
        self.starts.load(Ordering::SeqCst)
    }
}

impl MotionSensor for FakeMotionSensor {
    fn start(
        &self,
        _interval_secs: f64,
        sink: mpsc::UnboundedSender<MotionSample>,
    ) -> Result<(), CaptureError> {
        if !self.available {
            return Err(CaptureError::MotionUnavailable(
                "no device motion".to_string(),
            ));
        }
        self.starts.fetch_add(1, Ordering::SeqCst);
        for _ in 0..self.prefill {
            let _ = sink.send(still_sample());
        }
        *lock(&self.sink) = Some(sink);
        Ok(())
    }

    fn stop(&self) {
        lock(&self.sink).take();
    }
}

/// A full set of fakes, each kept as its concrete type for inspection.
#[derive(Clone)]
pub struct FakeDevices {
    pub detector: Arc<ScriptedDetector>,
    pub recognizer: Arc<ScriptedRecognizer>,
    pub photo: Arc<FakePhotoCapture>,
    pub verifier: Arc<ScriptedVerifier>,
    pub torch: Arc<FakeTorch>,
    pub motion: Arc<FakeMotionSensor>,
}

impl FakeDevices {
    /// A cooperative device: fills the guide with a card, reads an MRZ,
    /// has a torch and a motion sensor, and accepts every shot.
    pub fn new() -> Self {
        let still = card_frame(1280, 720, card_rect(1280, 720, 0.8), 0.0);
        Self {
            detector: Arc::new(ScriptedDetector::new(DetectorMode::FillRegion { inset: 4.0 })),
            recognizer: Arc::new(ScriptedRecognizer::mrz()),
            photo: Arc::new(FakePhotoCapture::new(still)),
            verifier: Arc::new(ScriptedVerifier::new()),
            torch: Arc::new(FakeTorch::new(true)),
            motion: Arc::new(FakeMotionSensor::new(true, 60)),
        }
    }

    pub fn with_detector(mut self, detector: ScriptedDetector) -> Self {
        self.detector = Arc::new(detector);
        self
    }

    pub fn with_recognizer(mut self, recognizer: ScriptedRecognizer) -> Self {
        self.recognizer = Arc::new(recognizer);
        self
    }

    pub fn with_verifier(mut self, verifier: ScriptedVerifier) -> Self {
        self.verifier = Arc::new(verifier);
        self
    }

    pub fn with_torch(mut self, torch: FakeTorch) -> Self {
        self.torch = Arc::new(torch);
        self
    }

    pub fn with_motion(mut self, motion: FakeMotionSensor) -> Self {
        self.motion = Arc::new(motion);
        self
    }

    pub fn collaborators(&self) -> Collaborators {
        Collaborators {
            detector: self.detector.clone(),
            recognizer: self.recognizer.clone(),
            photo: self.photo.clone(),
            verifier: self.verifier.clone(),
            torch: self.torch.clone(),
            motion: self.motion.clone(),
        }
    }
}

impl Default for FakeDevices {
    fn default() -> Self {
        Self::new()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_fill_region_detector_tracks_roi() {
        let detector = ScriptedDetector::new(DetectorMode::FillRegion { inset: 2.0 });
        let frame = card_frame(200, 100, card_rect(200, 100, 0.5), 0.0);
        let roi = Rect::new(10.0, 10.0, 100.0, 60.0);
        let quad = detector
            .detect(&frame, Some(roi), &RectangleQuery::default())
            .unwrap()
            .unwrap();
        let bb = quad.bounding_box();
        assert_eq!(bb.x, 12.0);
        assert_eq!(bb.width, 96.0);
        assert_eq!(detector.calls(), 1);
    }

    #[test]
    fn test_verifier_replays_then_accepts() {
        let verifier = ScriptedVerifier::new();
        verifier.push(Ok(VerificationOutcome::rejected("blurry")));
        let shot = Shot {
            step: CaptureStep::Front,
            frame: card_frame(8, 8, Rect::new(0.0, 0.0, 8.0, 8.0), 0.0),
            jpeg: bytes::Bytes::new(),
            rectified: false,
            rotated: false,
        };
        assert_eq!(
            verifier.verify(CaptureStep::Front, &shot).unwrap(),
            VerificationOutcome::rejected("blurry")
        );
        assert_eq!(
            verifier.verify(CaptureStep::Front, &shot).unwrap(),
            VerificationOutcome::accepted()
        );
        assert_eq!(verifier.steps(), vec![CaptureStep::Front, CaptureStep::Front]);
    }

    #[test]
    fn test_unavailable_torch_errors() {
        let torch = FakeTorch::new(false);
        assert!(matches!(
            torch.set_torch(true, 0.5),
            Err(CaptureError::TorchUnavailable(_))
        ));
        assert!(!torch.is_on());
    }

    #[test]
    fn test_motion_prefill_and_stop() {
        let sensor = FakeMotionSensor::new(true, 3);
        let (tx, mut rx) = mpsc::unbounded_channel();
        sensor.start(0.05, tx).unwrap();
        let mut received = 0;
        while rx.try_recv().is_ok() {
            received += 1;
        }
        assert_eq!(received, 3);
        assert!(sensor.push(still_sample()));
        sensor.stop();
        assert!(!sensor.is_running());
        assert!(!sensor.push(still_sample()));
    }
}
