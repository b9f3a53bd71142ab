//! Readiness scorer properties and scenarios
//!
//! Hysteresis must stay bounded, fires must respect the cooldown, and the
//! back face must never fire without machine-readable text in view.

use idcapture::config::ReadinessConfig;
use idcapture::readiness::{dynamic_sharpness_floor, ReadinessInput, ReadinessScorer};
use idcapture::testing::{empty_metrics, ready_metrics};
use idcapture::types::{CaptureStep, FrameMetrics};
use proptest::prelude::*;

fn input(step: CaptureStep, metrics: FrameMetrics, now: f64, mrz_present: bool) -> ReadinessInput {
    ReadinessInput {
        step,
        metrics,
        stable_duration: 1.0,
        mrz_present,
        now,
        capture_idle: true,
    }
}

/// Arbitrary frames: roughly half pass every gate.
fn frame_strategy() -> impl Strategy<Value = (bool, f32, f32, f32, bool)> {
    (
        any::<bool>(),
        0.0f32..1.2,
        0.0f32..1.0,
        0.0f32..0.05,
        prop::bool::weighted(0.1),
    )
}

fn metrics_from(rect: bool, coverage: f32, aspect: f32, sharpness: f32, white: bool) -> FrameMetrics {
    FrameMetrics {
        rectangle_present: rect,
        coverage,
        aspect_ratio: aspect,
        sharpness,
        white_out: white,
        ..ready_metrics()
    }
}

// ═══════════════════════════════════════════════════════════════════════════
// PROPERTIES
// ═══════════════════════════════════════════════════════════════════════════

proptest! {
    #![proptest_config(ProptestConfig::with_cases(64))]

    /// INVARIANT: score never leaves [0, score_max] and moves at most one step
    /// plus the MRZ bonus per frame
    #[test]
    fn score_stays_bounded(
        frames in prop::collection::vec((frame_strategy(), any::<bool>()), 1..80),
        back in any::<bool>(),
    ) {
        let config = ReadinessConfig::default();
        let mut scorer = ReadinessScorer::new(config.clone());
        let step = if back { CaptureStep::Back } else { CaptureStep::Front };
        let mut previous = 0u32;
        for (i, ((rect, cov, aspect, sharp, white), mrz)) in frames.into_iter().enumerate() {
            let outcome = scorer.evaluate(input(step, metrics_from(rect, cov, aspect, sharp, white), i as f64 * 0.05, mrz));
            prop_assert!(outcome.score <= config.score_max);
            if !outcome.fire {
                let bonus = if back && mrz { config.mrz_bonus } else { 0 };
                prop_assert!(outcome.score.abs_diff(previous) <= 1 + bonus);
            } else {
                prop_assert_eq!(outcome.score, 0);
            }
            previous = outcome.score;
        }
    }

    /// INVARIANT: consecutive fires of one step are more than the cooldown apart
    #[test]
    fn fires_respect_cooldown(
        gaps in prop::collection::vec(0.01f64..0.4, 1..120),
    ) {
        let config = ReadinessConfig::default();
        let mut scorer = ReadinessScorer::new(config.clone());
        let mut now = 0.0;
        let mut last_fire: Option<f64> = None;
        for gap in gaps {
            now += gap;
            let outcome = scorer.evaluate(input(CaptureStep::Front, ready_metrics(), now, false));
            if outcome.fire {
                if let Some(last) = last_fire {
                    prop_assert!(now - last > config.cooldown_secs);
                }
                last_fire = Some(now);
            }
        }
    }

    /// INVARIANT: same-step restarts never shorten the cooldown
    #[test]
    fn restarts_keep_cooldown(
        frames in prop::collection::vec((0.01f64..0.4, any::<bool>()), 1..120),
    ) {
        let config = ReadinessConfig::default();
        let mut scorer = ReadinessScorer::new(config.clone());
        let mut now = 0.0;
        let mut last_fire: Option<f64> = None;
        for (gap, restart) in frames {
            now += gap;
            if restart {
                scorer.restart(CaptureStep::Back);
            }
            let outcome = scorer.evaluate(input(CaptureStep::Back, ready_metrics(), now, true));
            if outcome.fire {
                if let Some(last) = last_fire {
                    prop_assert!(now - last > config.cooldown_secs);
                }
                last_fire = Some(now);
            }
        }
    }

    /// INVARIANT: the back step never fires while MRZ presence is false
    #[test]
    fn back_requires_mrz(
        frames in prop::collection::vec(frame_strategy(), 1..60),
    ) {
        let mut scorer = ReadinessScorer::default();
        for (i, (rect, cov, aspect, sharp, white)) in frames.into_iter().enumerate() {
            let outcome = scorer.evaluate(input(CaptureStep::Back, metrics_from(rect, cov, aspect, sharp, white), i as f64 * 0.2, false));
            prop_assert!(!outcome.fire);
        }
    }

    /// The sharpness floor never drops below the base and never rises as
    /// coverage grows
    #[test]
    fn sharpness_floor_is_monotone(a in -1.0f32..2.0, b in -1.0f32..2.0) {
        let config = ReadinessConfig::default();
        let (lo, hi) = if a <= b { (a, b) } else { (b, a) };
        let floor_lo = dynamic_sharpness_floor(lo, &config);
        let floor_hi = dynamic_sharpness_floor(hi, &config);
        prop_assert!(floor_hi <= floor_lo + 1e-7);
        prop_assert!(floor_hi >= config.sharpness_base);
    }

    /// Reset returns a step to its first-entry state regardless of history
    #[test]
    fn reset_restores_initial_state(passes in 0usize..30) {
        let mut scorer = ReadinessScorer::default();
        for i in 0..passes {
            scorer.evaluate(input(CaptureStep::Front, ready_metrics(), i as f64 * 0.5, false));
        }
        scorer.reset(CaptureStep::Front);
        let state = scorer.state(CaptureStep::Front);
        prop_assert_eq!(state.score, 0);
        prop_assert_eq!(state.last_fire, None);
    }
}

// ═══════════════════════════════════════════════════════════════════════════
// SCENARIOS
// ═══════════════════════════════════════════════════════════════════════════

#[test]
fn test_fires_once_within_cooldown_window() {
    let mut scorer = ReadinessScorer::default();
    let fires: Vec<usize> = (1..=16)
        .filter(|&i| {
            scorer
                .evaluate(input(CaptureStep::Front, ready_metrics(), 0.125 * i as f64, false))
                .fire
        })
        .collect();
    // Score rebuilds by frame 16 (t=2.0), exactly one cooldown after the
    // first fire at t=1.0, which is not enough.
    assert_eq!(fires, vec![8]);
}

#[test]
fn test_refires_after_cooldown() {
    let mut scorer = ReadinessScorer::default();
    let fires: Vec<usize> = (1..=20)
        .filter(|&i| {
            scorer
                .evaluate(input(CaptureStep::Front, ready_metrics(), 0.125 * i as f64, false))
                .fire
        })
        .collect();
    assert_eq!(fires, vec![8, 17]);
}

#[test]
fn test_busy_pipeline_accumulates_without_firing() {
    let mut scorer = ReadinessScorer::default();
    for i in 1..=12 {
        let outcome = scorer.evaluate(ReadinessInput {
            capture_idle: false,
            ..input(CaptureStep::Front, ready_metrics(), 0.1 * i as f64, false)
        });
        assert!(!outcome.fire);
    }
    assert_eq!(scorer.state(CaptureStep::Front).score, 12);
    let outcome = scorer.evaluate(input(CaptureStep::Front, ready_metrics(), 1.3, false));
    assert!(outcome.fire);
}

#[test]
fn test_mrz_bonus_speeds_up_back() {
    let mut scorer = ReadinessScorer::default();
    let fired_at = (1..=10)
        .find(|&i| {
            scorer
                .evaluate(input(CaptureStep::Back, ready_metrics(), 0.1 * i as f64, true))
                .fire
        })
        .expect("back fires");
    assert_eq!(fired_at, 3);
}

#[test]
fn test_failed_frames_decay_score() {
    let mut scorer = ReadinessScorer::default();
    for i in 1..=5 {
        scorer.evaluate(input(CaptureStep::Front, ready_metrics(), 0.1 * i as f64, false));
    }
    assert_eq!(scorer.state(CaptureStep::Front).score, 5);
    for i in 6..=7 {
        scorer.evaluate(input(CaptureStep::Front, empty_metrics(), 0.1 * i as f64, false));
    }
    assert_eq!(scorer.state(CaptureStep::Front).score, 3);
}

#[test]
fn test_individual_gates() {
    let mut scorer = ReadinessScorer::default();
    let cases = [
        FrameMetrics { aspect_ratio: 0.9, ..ready_metrics() },
        FrameMetrics { aspect_ratio: 0.3, ..ready_metrics() },
        FrameMetrics { coverage: 0.2, ..ready_metrics() },
        FrameMetrics { coverage: 1.2, ..ready_metrics() },
        FrameMetrics { sharpness: 0.001, ..ready_metrics() },
        FrameMetrics { white_out: true, ..ready_metrics() },
        FrameMetrics { rectangle_present: false, ..ready_metrics() },
    ];
    for metrics in cases {
        let outcome = scorer.evaluate(input(CaptureStep::Front, metrics, 0.0, false));
        assert!(!outcome.pass, "{:?}", metrics);
    }

    let unstable = scorer.evaluate(ReadinessInput {
        stable_duration: 0.2,
        ..input(CaptureStep::Front, ready_metrics(), 0.0, false)
    });
    assert!(!unstable.pass);
    assert!(!unstable.gates.stable);
}

#[test]
fn test_loose_framing_demands_more_sharpness() {
    let config = ReadinessConfig::default();
    let tight = dynamic_sharpness_floor(0.95, &config);
    let loose = dynamic_sharpness_floor(0.45, &config);
    assert_eq!(tight, config.sharpness_base);
    assert!((loose - (config.sharpness_base + config.sharpness_slope * 0.35)).abs() < 1e-7);
    assert_eq!(dynamic_sharpness_floor(f32::NAN, &config), dynamic_sharpness_floor(0.0, &config));
}

#[test]
fn test_ovd_step_is_not_scored() {
    let mut scorer = ReadinessScorer::default();
    for i in 0..20 {
        let outcome = scorer.evaluate(input(CaptureStep::Ovd, ready_metrics(), i as f64, true));
        assert!(!outcome.fire);
        assert_eq!(outcome.score, 0);
    }
}
