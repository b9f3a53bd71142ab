//! Device-motion stability tracking
//!
//! Two independent signals come out of the sample stream: how long the
//! device has been continuously still (gates front/back capture) and a
//! bounded movement score (informational for the hologram step, which wants
//! the card tilted).

use crate::assert_invariant;
use crate::config::MotionConfig;
use crate::invariant_ppt::invariants;
use crate::types::MotionSample;

#[derive(Debug, Clone)]
pub struct StabilityTracker {
    config: MotionConfig,
    stable_duration: f64,
    movement_score: u32,
    samples: u64,
}

impl StabilityTracker {
    pub fn new(config: MotionConfig) -> Self {
        Self {
            config,
            stable_duration: 0.0,
            movement_score: 0,
            samples: 0,
        }
    }

    /// Fold one sample taken `sample_interval_secs` after the previous one.
    pub fn push(&mut self, sample: MotionSample) {
        let rotation = sample.rotation_magnitude();
        let acceleration = sample.acceleration_magnitude();
        self.samples += 1;

        if rotation < self.config.still_rotation && acceleration < self.config.still_acceleration {
            self.stable_duration += self.config.sample_interval_secs;
        } else {
            self.stable_duration = 0.0;
        }

        if rotation > self.config.moving_rotation || acceleration > self.config.moving_acceleration {
            self.movement_score = (self.movement_score + 1).min(self.config.movement_max);
        } else {
            self.movement_score = self.movement_score.saturating_sub(1);
        }

        assert_invariant!(
            self.movement_score <= self.config.movement_max,
            invariants::MOVEMENT_BOUNDED,
            "motion"
        );
    }

    /// Seconds the device has been continuously below the jitter threshold.
    pub fn stable_duration(&self) -> f64 {
        self.stable_duration
    }

    pub fn movement_score(&self) -> u32 {
        self.movement_score
    }

    pub fn is_moving(&self) -> bool {
        self.movement_score >= self.config.moving_score
    }

    pub fn sample_count(&self) -> u64 {
        self.samples
    }

    pub fn reset(&mut self) {
        self.stable_duration = 0.0;
        self.movement_score = 0;
        self.samples = 0;
    }
}

impl Default for StabilityTracker {
    fn default() -> Self {
        Self::new(MotionConfig::default())
    }
}
