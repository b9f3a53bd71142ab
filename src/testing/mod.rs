//! Testing utilities
//!
//! Synthetic frames plus scripted collaborators so the scorers and the
//! whole capture flow can be exercised offline.

pub mod fakes;
pub mod synthetic_data;

pub use fakes::{
    DetectorMode, FakeDevices, FakeMotionSensor, FakePhotoCapture, FakeTorch, ScriptedDetector,
    ScriptedRecognizer, ScriptedVerifier,
};
pub use synthetic_data::{
    blank_frame, card_back_frame, card_frame, card_rect, empty_metrics, glint_frame,
    ovd_baseline_metrics, ovd_glint_metrics, ovd_white_out_metrics, ready_metrics,
    shaking_sample, still_sample, white_out_frame,
};
