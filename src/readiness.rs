//! Readiness scoring for the front and back steps
//!
//! Per-frame pass/fail is noisy (autofocus hunting, hand tremor), so passes
//! are integrated into a bounded counter per step. A frame fires only once the
//! counter reaches the fire threshold, the step's cooldown has elapsed and,
//! on the back face, the MRZ probe has seen machine-readable text.

use crate::assert_invariant;
use crate::config::ReadinessConfig;
use crate::invariant_ppt::invariants;
use crate::types::{CaptureStep, FrameMetrics};
use serde::Serialize;
use std::collections::HashMap;

/// Minimum sharpness for a given guide coverage.
///
/// Loosely framed cards must be sharper; the floor relaxes linearly until
/// coverage reaches the knee.
pub fn dynamic_sharpness_floor(coverage: f32, config: &ReadinessConfig) -> f32 {
    let coverage = if coverage.is_finite() {
        coverage.clamp(0.0, 1.0)
    } else {
        0.0
    };
    let missing = config.sharpness_knee - coverage.min(config.sharpness_knee);
    config
        .sharpness_base
        .max(config.sharpness_base + config.sharpness_slope * missing)
}

/// Everything the scorer needs for one analysed frame.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct ReadinessInput {
    pub step: CaptureStep,
    pub metrics: FrameMetrics,
    pub stable_duration: f64,
    pub mrz_present: bool,
    /// Flow time of the frame, seconds
    pub now: f64,
    /// No photo request and no verification outstanding
    pub capture_idle: bool,
}

/// Individual gate results for one frame, kept for guidance and logging.
#[derive(Debug, Clone, Copy, PartialEq, Default, Serialize)]
pub struct ReadinessGates {
    pub rectangle: bool,
    pub aspect: bool,
    pub coverage: bool,
    pub sharpness: bool,
    pub stable: bool,
    pub white_out: bool,
    pub mrz: bool,
    pub sharpness_floor: f32,
}

#[derive(Debug, Clone, Copy, PartialEq, Default, Serialize)]
pub struct ReadinessOutcome {
    /// The frame satisfied every per-frame gate
    pub pass: bool,
    pub fire: bool,
    pub score: u32,
    pub gates: ReadinessGates,
}

/// Per-step hysteresis state.
#[derive(Debug, Clone, Copy, PartialEq, Default)]
pub struct ReadinessState {
    pub score: u32,
    pub last_fire: Option<f64>,
}

#[derive(Debug, Clone)]
pub struct ReadinessScorer {
    config: ReadinessConfig,
    states: HashMap<CaptureStep, ReadinessState>,
}

impl ReadinessScorer {
    pub fn new(config: ReadinessConfig) -> Self {
        Self {
            config,
            states: HashMap::new(),
        }
    }

    pub fn config(&self) -> &ReadinessConfig {
        &self.config
    }

    pub fn state(&self, step: CaptureStep) -> ReadinessState {
        self.states.get(&step).copied().unwrap_or_default()
    }

    /// Return a step to its first-entry state.
    pub fn reset(&mut self, step: CaptureStep) {
        self.states.remove(&step);
    }

    /// Drop the accumulated score for another attempt at the same step. The
    /// last fire time survives, so the cooldown still spans the retry.
    pub fn restart(&mut self, step: CaptureStep) {
        if let Some(state) = self.states.get_mut(&step) {
            state.score = 0;
        }
    }

    fn gates(&self, input: &ReadinessInput) -> ReadinessGates {
        let c = &self.config;
        let m = &input.metrics;
        let floor = dynamic_sharpness_floor(m.coverage, c);
        ReadinessGates {
            rectangle: m.rectangle_present,
            aspect: m.aspect_ratio >= c.aspect_min && m.aspect_ratio <= c.aspect_max,
            coverage: m.coverage >= c.coverage_min && m.coverage <= c.coverage_max,
            sharpness: m.sharpness >= floor,
            stable: input.stable_duration >= c.required_stable_secs,
            white_out: m.white_out,
            mrz: input.mrz_present,
            sharpness_floor: floor,
        }
    }

    /// Score one frame. The OVD step has its own detector and is ignored here.
    pub fn evaluate(&mut self, input: ReadinessInput) -> ReadinessOutcome {
        if input.step == CaptureStep::Ovd {
            return ReadinessOutcome {
                score: self.state(input.step).score,
                ..ReadinessOutcome::default()
            };
        }

        let gates = self.gates(&input);
        let pass = gates.rectangle
            && gates.aspect
            && gates.coverage
            && gates.sharpness
            && gates.stable
            && !gates.white_out;

        let c = &self.config;
        let state = self.states.entry(input.step).or_default();
        let previous = state.score;

        state.score = if pass {
            (state.score + 1).min(c.score_max)
        } else {
            state.score.saturating_sub(1)
        };
        let bonus = input.step == CaptureStep::Back && input.mrz_present;
        if bonus {
            state.score = (state.score + c.mrz_bonus).min(c.score_max);
        }

        assert_invariant!(state.score <= c.score_max, invariants::SCORE_BOUNDED, "readiness");
        let max_step = 1 + if bonus { c.mrz_bonus } else { 0 };
        assert_invariant!(
            state.score.abs_diff(previous) <= max_step,
            invariants::SCORE_STEP,
            "readiness"
        );

        let mrz_gate = input.step != CaptureStep::Back || input.mrz_present;
        let cooled = match state.last_fire {
            Some(last) => input.now - last > c.cooldown_secs,
            None => true,
        };
        let fire = mrz_gate && state.score >= c.fire_threshold && cooled && input.capture_idle;

        if fire {
            assert_invariant!(mrz_gate, invariants::BACK_REQUIRES_MRZ, "readiness");
            assert_invariant!(cooled, invariants::FIRE_COOLDOWN, "readiness");
            state.last_fire = Some(input.now);
            state.score = 0;
        }

        log::debug!(
            "why[{}]: rect={} aspect={} cov={} shp={} stb={} mrz={} white={} floor={:.4} ratio={:.3} coverage={:.2} score={} fire={}",
            input.step,
            gates.rectangle as u8,
            gates.aspect as u8,
            gates.coverage as u8,
            gates.sharpness as u8,
            gates.stable as u8,
            gates.mrz as u8,
            gates.white_out as u8,
            gates.sharpness_floor,
            input.metrics.aspect_ratio,
            input.metrics.coverage,
            state.score,
            fire
        );

        ReadinessOutcome {
            pass,
            fire,
            score: state.score,
            gates,
        }
    }
}

impl Default for ReadinessScorer {
    fn default() -> Self {
        Self::new(ReadinessConfig::default())
    }
}
