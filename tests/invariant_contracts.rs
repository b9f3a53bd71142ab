//! Contract tests: each scenario must actually exercise the invariants it
//! claims to cover, not merely finish without panicking.

use bytes::Bytes;
use idcapture::config::IdCaptureConfig;
use idcapture::flow::{Command, FlowInput, FlowMachine, Phase};
use idcapture::invariant_ppt::{clear_invariant_log, contract_test, invariants, was_checked};
use idcapture::motion::StabilityTracker;
use idcapture::ovd::OvdDetector;
use idcapture::readiness::{ReadinessInput, ReadinessScorer};
use idcapture::testing::{
    blank_frame, ovd_baseline_metrics, ovd_glint_metrics, ovd_white_out_metrics, ready_metrics,
    shaking_sample, still_sample,
};
use idcapture::types::{CaptureStep, Shot, VerificationOutcome};

fn shot(step: CaptureStep) -> Shot {
    Shot {
        step,
        frame: blank_frame(8, 5, [90, 90, 90], 0.0),
        jpeg: Bytes::from_static(&[0xFF, 0xD8, 0xFF, 0xD9]),
        rectified: false,
        rotated: false,
    }
}

fn photo_requested(commands: &[Command]) -> bool {
    commands
        .iter()
        .any(|c| matches!(c, Command::RequestPhoto { .. }))
}

fn settle(commands: &[Command]) -> Option<u64> {
    commands.iter().find_map(|c| match c {
        Command::ScheduleSettle { generation, .. } => Some(*generation),
        _ => None,
    })
}

// ═══════════════════════════════════════════════════════════════════════════
// SCORERS
// ═══════════════════════════════════════════════════════════════════════════

#[test]
fn contract_readiness_scorer() {
    clear_invariant_log();
    let mut scorer = ReadinessScorer::default();
    let mut fired = 0;
    for i in 1..=30 {
        let outcome = scorer.evaluate(ReadinessInput {
            step: CaptureStep::Back,
            metrics: ready_metrics(),
            stable_duration: 1.0,
            mrz_present: true,
            now: 0.2 * i as f64,
            capture_idle: true,
        });
        if outcome.fire {
            fired += 1;
        }
    }
    assert!(fired >= 2);
    contract_test(
        "readiness scorer",
        &[
            invariants::SCORE_BOUNDED,
            invariants::SCORE_STEP,
            invariants::FIRE_COOLDOWN,
            invariants::BACK_REQUIRES_MRZ,
        ],
    );
}

#[test]
fn contract_ovd_detector() {
    clear_invariant_log();
    let mut detector = OvdDetector::default();
    detector.begin(0.0);
    detector.evaluate(&ovd_baseline_metrics(), 0.5);
    detector.evaluate(&ovd_white_out_metrics(), 0.6);
    let hit = (1..=10).any(|i| detector.evaluate(&ovd_glint_metrics(), 0.8 + 0.05 * i as f64).hit);
    assert!(hit);
    contract_test(
        "ovd detector",
        &[
            invariants::HOLD_BOUNDED,
            invariants::OVD_DWELL,
            invariants::OVD_WHITE_OUT,
        ],
    );
}

#[test]
fn contract_stability_tracker() {
    clear_invariant_log();
    let mut tracker = StabilityTracker::default();
    for _ in 0..20 {
        tracker.push(shaking_sample());
    }
    tracker.push(still_sample());
    assert!(tracker.movement_score() <= 10);
    contract_test("stability tracker", &[invariants::MOVEMENT_BOUNDED]);
}

// ═══════════════════════════════════════════════════════════════════════════
// FLOW
// ═══════════════════════════════════════════════════════════════════════════

#[test]
fn contract_full_flow() {
    clear_invariant_log();
    let mut machine = FlowMachine::new(IdCaptureConfig::default());
    machine.handle(FlowInput::Start { now: 0.0 });
    for _ in 0..60 {
        machine.handle(FlowInput::Motion(still_sample()));
    }

    let mut now = 0.0;
    let run_step = |machine: &mut FlowMachine, step: CaptureStep, now: &mut f64| {
        let mut fired = false;
        for _ in 0..60 {
            *now += 0.1;
            let metrics = match step {
                CaptureStep::Ovd if !fired => ovd_glint_metrics(),
                _ => ready_metrics(),
            };
            if photo_requested(&machine.handle(FlowInput::FrameAnalyzed {
                step,
                metrics,
                now: *now,
            })) {
                fired = true;
                break;
            }
        }
        assert!(fired, "{} never fired", step);
        machine.handle(FlowInput::PhotoCaptured {
            step,
            result: Ok(shot(step)),
            now: *now,
        });
        let commands = machine.handle(FlowInput::Verified {
            step,
            result: Ok(VerificationOutcome::accepted()),
            now: *now,
        });
        if let Some(generation) = settle(&commands) {
            machine.handle(FlowInput::SettleElapsed { generation });
        }
    };

    run_step(&mut machine, CaptureStep::Front, &mut now);
    assert_eq!(machine.step(), CaptureStep::Ovd);
    run_step(&mut machine, CaptureStep::Ovd, &mut now);
    assert_eq!(machine.step(), CaptureStep::Back);
    let attempt = machine.attempt();
    machine.handle(FlowInput::MrzProbed {
        step: CaptureStep::Back,
        attempt,
        present: true,
    });
    run_step(&mut machine, CaptureStep::Back, &mut now);
    assert_eq!(machine.phase(), Phase::Done);

    assert!(was_checked(invariants::SINGLE_FLIGHT));
    contract_test(
        "full flow",
        &[
            invariants::SINGLE_FLIGHT,
            invariants::SCORE_BOUNDED,
            invariants::FIRE_COOLDOWN,
            invariants::BACK_REQUIRES_MRZ,
            invariants::HOLD_BOUNDED,
            invariants::OVD_DWELL,
            invariants::MOVEMENT_BOUNDED,
        ],
    );
}
