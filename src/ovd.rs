//! Hologram (OVD) detection
//!
//! While the user tilts the card under the torch, every frame is tested for
//! a multi-hue glint. A frame passes when it is not blown out, shows enough
//! distinct hues, and both its chroma and rainbow score clear either an
//! absolute floor or a rise over the attempt's baseline. Passes feed a
//! bounded hold counter; a hit needs a full hold and a minimum dwell since
//! the attempt started, because the first frames after the torch comes on
//! are transiently over-bright.

use crate::assert_invariant;
use crate::config::OvdConfig;
use crate::invariant_ppt::invariants;
use crate::types::FrameMetrics;
use serde::Serialize;

/// Measurements of the first frame of an attempt.
#[derive(Debug, Clone, Copy, PartialEq, Default, Serialize)]
pub struct OvdBaseline {
    pub rainbow: f32,
    pub glare: f32,
    pub chroma: f32,
}

impl OvdBaseline {
    pub fn from_metrics(metrics: &FrameMetrics) -> Self {
        Self {
            rainbow: metrics.rainbow_score,
            glare: metrics.glare,
            chroma: metrics.chroma,
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Default, Serialize)]
pub struct OvdOutcome {
    pub pass: bool,
    pub hold: u32,
    /// Capture should fire; true at most once per attempt
    pub hit: bool,
    pub dwell: f64,
    pub rainbow_delta: f32,
    pub chroma_delta: f32,
    pub glare_delta: f32,
}

#[derive(Debug, Clone)]
pub struct OvdDetector {
    config: OvdConfig,
    baseline: Option<OvdBaseline>,
    hold: u32,
    started_at: Option<f64>,
    triggered: bool,
}

impl OvdDetector {
    pub fn new(config: OvdConfig) -> Self {
        Self {
            config,
            baseline: None,
            hold: 0,
            started_at: None,
            triggered: false,
        }
    }

    /// Start an attempt at flow time `now`.
    pub fn begin(&mut self, now: f64) {
        self.baseline = None;
        self.hold = 0;
        self.triggered = false;
        self.started_at = Some(now);
        log::debug!("OVD attempt started at {:.3}s", now);
    }

    /// Discard the attempt's baseline, hold and dwell and start over.
    pub fn reset(&mut self, now: f64) {
        self.begin(now);
    }

    /// Forget everything, including the attempt start.
    pub fn clear(&mut self) {
        self.baseline = None;
        self.hold = 0;
        self.triggered = false;
        self.started_at = None;
    }

    pub fn baseline(&self) -> Option<OvdBaseline> {
        self.baseline
    }

    pub fn hold(&self) -> u32 {
        self.hold
    }

    pub fn started_at(&self) -> Option<f64> {
        self.started_at
    }

    pub fn is_triggered(&self) -> bool {
        self.triggered
    }

    /// Pass predicate against a given baseline.
    pub fn passes(&self, metrics: &FrameMetrics, baseline: &OvdBaseline) -> bool {
        let c = &self.config;
        let chroma_ok = metrics.chroma > c.chroma_abs_floor
            || metrics.chroma - baseline.chroma >= c.chroma_rise_floor;
        let rainbow_ok = metrics.rainbow_score >= c.rainbow_abs_floor
            || metrics.rainbow_score - baseline.rainbow >= c.rainbow_rise_floor;
        !metrics.white_out && metrics.hue_bins_present >= c.min_bins && chroma_ok && rainbow_ok
    }

    pub fn evaluate(&mut self, metrics: &FrameMetrics, now: f64) -> OvdOutcome {
        let started_at = *self.started_at.get_or_insert(now);
        let baseline = *self
            .baseline
            .get_or_insert_with(|| OvdBaseline::from_metrics(metrics));

        let pass = self.passes(metrics, &baseline);
        assert_invariant!(!(pass && metrics.white_out), invariants::OVD_WHITE_OUT, "ovd");

        self.hold = if pass {
            (self.hold + self.config.hold_step).min(self.config.hold_max)
        } else {
            self.hold.saturating_sub(1)
        };
        assert_invariant!(self.hold <= self.config.hold_max, invariants::HOLD_BOUNDED, "ovd");

        let dwell = (now - started_at).max(0.0);
        let ready = dwell > self.config.min_dwell_secs && self.hold >= self.config.hold_fire;
        let hit = ready && !self.triggered;
        if hit {
            assert_invariant!(
                dwell > self.config.min_dwell_secs,
                invariants::OVD_DWELL,
                "ovd"
            );
            self.triggered = true;
        }

        let outcome = OvdOutcome {
            pass,
            hold: self.hold,
            hit,
            dwell,
            rainbow_delta: metrics.rainbow_score - baseline.rainbow,
            chroma_delta: metrics.chroma - baseline.chroma,
            glare_delta: (metrics.glare - baseline.glare).max(0.0),
        };

        log::debug!(
            "ovd: rainbow={:.3} (+{:.3}) bins={} chroma={:.3} (+{:.3}) white={} glare+{:.3} pass={} hold={} dwell={:.2}s hit={}",
            metrics.rainbow_score,
            outcome.rainbow_delta,
            metrics.hue_bins_present,
            metrics.chroma,
            outcome.chroma_delta,
            metrics.white_out,
            outcome.glare_delta,
            pass,
            self.hold,
            dwell,
            hit
        );

        outcome
    }
}

impl Default for OvdDetector {
    fn default() -> Self {
        Self::new(OvdConfig::default())
    }
}
