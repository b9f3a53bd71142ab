//! Capture flow state machine
//!
//! `FlowMachine` is the single transition table for a capture session. It
//! consumes [`FlowInput`] messages (frame analyses, motion samples, photo and
//! verification results, timer expiries, device failures) and answers with
//! [`Command`]s for the driver to execute. It never performs I/O itself,
//! so every ordering of asynchronous results can be replayed in a test.
//!
//! Steps run `Front -> [Ovd] -> Back -> Done`. Within a step the phase moves
//! `Scanning -> Capturing -> Verifying` and then either advances or retries
//! the same step.

use crate::assert_invariant;
use crate::config::IdCaptureConfig;
use crate::errors::CaptureError;
use crate::flow::timer::TimerGeneration;
use crate::invariant_ppt::invariants;
use crate::motion::StabilityTracker;
use crate::ovd::{OvdDetector, OvdOutcome};
use crate::readiness::{ReadinessInput, ReadinessOutcome, ReadinessScorer};
use crate::types::{CaptureStep, FrameMetrics, MotionSample, Shot, VerificationOutcome};
use chrono::{DateTime, Utc};
use serde::Serialize;
use std::collections::BTreeMap;
use std::fmt;
use uuid::Uuid;

/// Sub-state within the current step.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "lowercase")]
pub enum Phase {
    /// Created but not started
    Idle,
    Scanning,
    /// Photo request in flight
    Capturing,
    /// Verification in flight
    Verifying,
    Done,
    Failed,
    Abandoned,
}

impl Phase {
    /// No further input changes anything.
    pub fn is_terminal(&self) -> bool {
        matches!(self, Phase::Done | Phase::Failed | Phase::Abandoned)
    }
}

/// Short prompt for the user, emitted when it changes.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum Guidance {
    AlignInGuide,
    MoveCloser,
    MrzNotVisible,
    HoldSteady,
    Capturing,
    TiltCard,
    TooBright,
    HologramCaught,
}

impl fmt::Display for Guidance {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let text = match self {
            Guidance::AlignInGuide => "Align the card inside the guide",
            Guidance::MoveCloser => "Move the card closer",
            Guidance::MrzNotVisible => "Show the back with the MRZ lines at the bottom",
            Guidance::HoldSteady => "Hold steady",
            Guidance::Capturing => "Capturing",
            Guidance::TiltCard => "Slowly tilt the card under the light",
            Guidance::TooBright => "Too much glare, change the angle",
            Guidance::HologramCaught => "Hologram detected",
        };
        f.write_str(text)
    }
}

/// Non-fatal device degradation.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum DeviceWarning {
    /// The hologram step runs on ambient light
    TorchUnavailable,
    /// Stillness gating is disabled
    MotionUnavailable,
}

/// Counters for one session.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize)]
pub struct FlowStats {
    pub frames_received: u64,
    pub frames_analyzed: u64,
    pub frames_dropped: u64,
    pub photos_requested: u64,
    pub photo_failures: u64,
    pub verifications: u64,
    pub verification_failures: u64,
    pub stale_inputs: u64,
}

/// Terminal result of a completed flow.
#[derive(Debug, Clone)]
pub struct FlowResult {
    pub session_id: Uuid,
    pub completed_at: DateTime<Utc>,
    /// In step order; two shots when the hologram step is disabled
    pub shots: Vec<Shot>,
    pub fields: BTreeMap<String, String>,
    pub torch_used: bool,
    pub stats: FlowStats,
}

impl FlowResult {
    pub fn shot(&self, step: CaptureStep) -> Option<&Shot> {
        self.shots.iter().find(|s| s.step == step)
    }
}

/// Events exposed to the surrounding application.
#[derive(Debug, Clone)]
pub enum FlowEvent {
    StepChanged(CaptureStep),
    /// Live ready/not-ready indicator
    Ready(bool),
    Guidance(Guidance),
    Captured(CaptureStep),
    VerificationFailed { step: CaptureStep, reason: String },
    Warning(DeviceWarning),
    Completed(Box<FlowResult>),
    Failed(CaptureError),
    Abandoned,
}

/// Messages consumed by the machine.
#[derive(Debug, Clone)]
pub enum FlowInput {
    Start { now: f64 },
    /// A camera frame arrived; `analysis_busy` when an analysis is outstanding
    FrameArrived { now: f64, analysis_busy: bool },
    FrameAnalyzed { step: CaptureStep, metrics: FrameMetrics, now: f64 },
    Motion(MotionSample),
    /// Recognizer verdict for the attempt that requested it
    MrzProbed { step: CaptureStep, attempt: u64, present: bool },
    PhotoCaptured { step: CaptureStep, result: Result<Shot, CaptureError>, now: f64 },
    Verified { step: CaptureStep, result: Result<VerificationOutcome, CaptureError>, now: f64 },
    SettleElapsed { generation: u64 },
    TorchFailed(CaptureError),
    MotionFailed(CaptureError),
    /// Failure reported by the camera session itself
    DeviceFailed(CaptureError),
    Abandon,
}

/// Work for the driver.
#[derive(Debug, Clone)]
pub enum Command {
    /// Measure the frame that triggered this command
    Analyze { step: CaptureStep },
    /// Look for MRZ text in the last analysed frame, tagged with the attempt
    ProbeMrz { attempt: u64 },
    RequestPhoto { step: CaptureStep },
    Verify { step: CaptureStep, shot: Shot },
    SetTorch { on: bool, level: f32 },
    StartMotion,
    StopMotion,
    ScheduleSettle { generation: u64, delay_secs: f64 },
    Emit(FlowEvent),
}

pub struct FlowMachine {
    config: IdCaptureConfig,
    session_id: Uuid,
    step: CaptureStep,
    phase: Phase,
    readiness: ReadinessScorer,
    ovd: OvdDetector,
    stability: StabilityTracker,
    mrz_present: bool,
    capturing: bool,
    verifying: bool,
    settle: TimerGeneration,
    /// Bumped on every step entry and retry
    attempt: u64,
    last_analysis: Option<f64>,
    pending_shot: Option<Shot>,
    shots: BTreeMap<CaptureStep, Shot>,
    fields: BTreeMap<String, String>,
    torch_on: bool,
    torch_available: bool,
    torch_used: bool,
    motion_available: bool,
    last_ready: Option<bool>,
    last_guidance: Option<Guidance>,
    stats: FlowStats,
}

impl FlowMachine {
    pub fn new(config: IdCaptureConfig) -> Self {
        Self {
            readiness: ReadinessScorer::new(config.readiness.clone()),
            ovd: OvdDetector::new(config.ovd.clone()),
            stability: StabilityTracker::new(config.motion.clone()),
            config,
            session_id: Uuid::new_v4(),
            step: CaptureStep::Front,
            phase: Phase::Idle,
            mrz_present: false,
            capturing: false,
            verifying: false,
            settle: TimerGeneration::new(),
            attempt: 0,
            last_analysis: None,
            pending_shot: None,
            shots: BTreeMap::new(),
            fields: BTreeMap::new(),
            torch_on: false,
            torch_available: true,
            torch_used: false,
            motion_available: true,
            last_ready: None,
            last_guidance: None,
            stats: FlowStats::default(),
        }
    }

    pub fn session_id(&self) -> Uuid {
        self.session_id
    }

    pub fn step(&self) -> CaptureStep {
        self.step
    }

    pub fn phase(&self) -> Phase {
        self.phase
    }

    pub fn is_capturing(&self) -> bool {
        self.capturing
    }

    pub fn is_verifying(&self) -> bool {
        self.verifying
    }

    pub fn mrz_present(&self) -> bool {
        self.mrz_present
    }

    pub fn readiness(&self) -> &ReadinessScorer {
        &self.readiness
    }

    pub fn ovd(&self) -> &OvdDetector {
        &self.ovd
    }

    pub fn stability(&self) -> &StabilityTracker {
        &self.stability
    }

    pub fn stats(&self) -> FlowStats {
        self.stats
    }

    pub fn torch_on(&self) -> bool {
        self.torch_on
    }

    pub fn settle_generation(&self) -> u64 {
        self.settle.current()
    }

    pub fn attempt(&self) -> u64 {
        self.attempt
    }

    pub fn config(&self) -> &IdCaptureConfig {
        &self.config
    }

    fn capture_idle(&self) -> bool {
        self.phase == Phase::Scanning && !self.capturing && !self.verifying
    }

    /// Feed one input and collect the driver's work.
    pub fn handle(&mut self, input: FlowInput) -> Vec<Command> {
        let mut out = Vec::new();
        if self.phase.is_terminal() {
            log::trace!("Ignoring {} after flow ended", input_name(&input));
            return out;
        }

        match input {
            FlowInput::Start { now } => self.on_start(now, &mut out),
            FlowInput::FrameArrived { now, analysis_busy } => {
                self.on_frame_arrived(now, analysis_busy, &mut out)
            }
            FlowInput::FrameAnalyzed { step, metrics, now } => {
                self.on_frame_analyzed(step, metrics, now, &mut out)
            }
            FlowInput::Motion(sample) => {
                if self.motion_available {
                    self.stability.push(sample);
                }
            }
            FlowInput::MrzProbed { step, attempt, present } => {
                self.on_mrz_probed(step, attempt, present)
            }
            FlowInput::PhotoCaptured { step, result, now } => {
                self.on_photo_captured(step, result, now, &mut out)
            }
            FlowInput::Verified { step, result, now } => {
                self.on_verified(step, result, now, &mut out)
            }
            FlowInput::SettleElapsed { generation } => self.on_settle_elapsed(generation),
            FlowInput::TorchFailed(error) => self.on_torch_failed(error, &mut out),
            FlowInput::MotionFailed(error) => {
                if self.motion_available {
                    log::warn!("Motion sensor unavailable, stillness gating disabled: {}", error);
                    self.motion_available = false;
                    out.push(Command::Emit(FlowEvent::Warning(
                        DeviceWarning::MotionUnavailable,
                    )));
                }
            }
            FlowInput::DeviceFailed(error) => {
                if error.is_fatal() {
                    self.fail(error, &mut out);
                } else {
                    log::warn!("Transient device error ignored: {}", error);
                }
            }
            FlowInput::Abandon => {
                log::info!("Capture flow {} abandoned during {}", self.session_id, self.step);
                self.shutdown(Phase::Abandoned, &mut out);
                out.push(Command::Emit(FlowEvent::Abandoned));
            }
        }
        out
    }

    fn on_start(&mut self, now: f64, out: &mut Vec<Command>) {
        if self.phase != Phase::Idle {
            return;
        }
        log::info!("Capture flow {} started", self.session_id);
        out.push(Command::StartMotion);
        self.enter_step(CaptureStep::Front, now, out);
    }

    fn on_frame_arrived(&mut self, now: f64, analysis_busy: bool, out: &mut Vec<Command>) {
        self.stats.frames_received += 1;
        if self.phase == Phase::Idle {
            return;
        }
        if analysis_busy {
            self.stats.frames_dropped += 1;
            return;
        }
        if self.step != CaptureStep::Ovd {
            if let Some(last) = self.last_analysis {
                if now - last < self.config.flow.analysis_interval_secs {
                    self.stats.frames_dropped += 1;
                    return;
                }
            }
        }
        self.last_analysis = Some(now);
        out.push(Command::Analyze { step: self.step });
    }

    fn on_frame_analyzed(
        &mut self,
        step: CaptureStep,
        metrics: FrameMetrics,
        now: f64,
        out: &mut Vec<Command>,
    ) {
        if step != self.step {
            self.stats.stale_inputs += 1;
            return;
        }
        self.stats.frames_analyzed += 1;

        match step {
            CaptureStep::Front | CaptureStep::Back => {
                let outcome = self.readiness.evaluate(ReadinessInput {
                    step,
                    metrics,
                    stable_duration: self.stable_duration(),
                    mrz_present: self.mrz_present,
                    now,
                    capture_idle: self.capture_idle(),
                });
                self.set_ready(outcome.pass, out);

                if step == CaptureStep::Back && metrics.rectangle_present && !self.mrz_present {
                    out.push(Command::ProbeMrz {
                        attempt: self.attempt,
                    });
                }

                if outcome.fire {
                    self.begin_capture(out);
                } else if self.phase == Phase::Scanning {
                    let guidance = self.readiness_guidance(&metrics, &outcome);
                    self.set_guidance(guidance, out);
                }
            }
            CaptureStep::Ovd => {
                // Frames during capture, verification or the settle period are not scored.
                if !self.capture_idle() {
                    return;
                }
                let outcome = self.ovd.evaluate(&metrics, now);
                self.set_ready(outcome.pass, out);
                if outcome.hit {
                    log::info!(
                        "Hologram detected after {:.2}s (hold={})",
                        outcome.dwell,
                        outcome.hold
                    );
                    self.set_guidance(Guidance::HologramCaught, out);
                    self.begin_capture(out);
                } else {
                    self.set_guidance(ovd_guidance(&metrics, &outcome), out);
                }
            }
        }
    }

    /// MRZ presence latches for the rest of the attempt; a later miss does
    /// not clear it.
    fn on_mrz_probed(&mut self, step: CaptureStep, attempt: u64, present: bool) {
        if step != CaptureStep::Back
            || self.step != CaptureStep::Back
            || attempt != self.attempt
        {
            log::trace!("Stale MRZ result for {} attempt {} ignored", step, attempt);
            self.stats.stale_inputs += 1;
            return;
        }
        if present && !self.mrz_present {
            log::debug!("MRZ text seen on attempt {}", attempt);
            self.mrz_present = true;
        }
    }

    fn stable_duration(&self) -> f64 {
        if self.motion_available {
            self.stability.stable_duration()
        } else {
            f64::INFINITY
        }
    }

    fn begin_capture(&mut self, out: &mut Vec<Command>) {
        assert_invariant!(
            !self.capturing && !self.verifying,
            invariants::SINGLE_FLIGHT,
            "flow"
        );
        self.capturing = true;
        self.phase = Phase::Capturing;
        self.stats.photos_requested += 1;
        log::info!("Auto-capture fired for {}", self.step);
        self.set_guidance(Guidance::Capturing, out);
        out.push(Command::RequestPhoto { step: self.step });
    }

    fn on_photo_captured(
        &mut self,
        step: CaptureStep,
        result: Result<Shot, CaptureError>,
        now: f64,
        out: &mut Vec<Command>,
    ) {
        if step != self.step || self.phase != Phase::Capturing {
            self.stats.stale_inputs += 1;
            return;
        }
        self.capturing = false;

        match result {
            Ok(shot) => {
                assert_invariant!(!self.verifying, invariants::SINGLE_FLIGHT, "flow");
                self.verifying = true;
                self.phase = Phase::Verifying;
                self.stats.verifications += 1;
                log::info!("Captured {} shot, verifying", step);
                self.pending_shot = Some(shot.clone());
                out.push(Command::Emit(FlowEvent::Captured(step)));
                out.push(Command::Verify { step, shot });
            }
            Err(error) if error.is_fatal() => self.fail(error, out),
            Err(error) => {
                log::warn!("Photo for {} failed, scanning again: {}", step, error);
                self.stats.photo_failures += 1;
                self.retry_step(now, out);
            }
        }
    }

    fn on_verified(
        &mut self,
        step: CaptureStep,
        result: Result<VerificationOutcome, CaptureError>,
        now: f64,
        out: &mut Vec<Command>,
    ) {
        if step != self.step || self.phase != Phase::Verifying {
            self.stats.stale_inputs += 1;
            return;
        }

        match result {
            Ok(VerificationOutcome::Accepted { fields }) => {
                log::info!("{} shot accepted ({} fields)", step, fields.len());
                self.fields.extend(fields);
                if let Some(shot) = self.pending_shot.take() {
                    self.shots.insert(step, shot);
                }
                match step.next(self.config.ovd.enabled) {
                    Some(next) => {
                        self.enter_step(next, now, out);
                        self.hold_for_settle(out);
                    }
                    None => self.complete(out),
                }
            }
            Ok(VerificationOutcome::Rejected { reason }) => {
                self.reject(step, reason, now, out);
            }
            Err(error) if error.is_fatal() => self.fail(error, out),
            Err(error) => self.reject(step, error.to_string(), now, out),
        }
    }

    fn reject(&mut self, step: CaptureStep, reason: String, now: f64, out: &mut Vec<Command>) {
        log::info!("{} shot rejected: {}", step, reason);
        self.stats.verification_failures += 1;
        self.pending_shot = None;
        out.push(Command::Emit(FlowEvent::VerificationFailed { step, reason }));
        self.retry_step(now, out);
        self.hold_for_settle(out);
    }

    /// Keep the verification flag set until the settle timer of the current
    /// generation expires.
    fn hold_for_settle(&mut self, out: &mut Vec<Command>) {
        self.verifying = true;
        let generation = self.settle.bump();
        out.push(Command::ScheduleSettle {
            generation,
            delay_secs: self.config.flow.settle_delay_secs,
        });
    }

    fn on_settle_elapsed(&mut self, generation: u64) {
        if !self.settle.is_current(generation) {
            log::trace!("Stale settle timer {} ignored", generation);
            self.stats.stale_inputs += 1;
            return;
        }
        if self.phase == Phase::Scanning {
            self.verifying = false;
            log::debug!("Settle period over, auto-capture re-armed for {}", self.step);
        }
    }

    fn on_torch_failed(&mut self, error: CaptureError, out: &mut Vec<Command>) {
        if !self.torch_available {
            return;
        }
        log::warn!("Torch unavailable, hologram step runs on ambient light: {}", error);
        self.torch_available = false;
        self.torch_on = false;
        self.torch_used = false;
        out.push(Command::Emit(FlowEvent::Warning(DeviceWarning::TorchUnavailable)));
    }

    /// Reset every transient for `step` and start scanning it.
    fn enter_step(&mut self, step: CaptureStep, now: f64, out: &mut Vec<Command>) {
        self.settle.bump();
        self.attempt += 1;
        self.step = step;
        self.phase = Phase::Scanning;
        self.capturing = false;
        self.verifying = false;
        self.pending_shot = None;
        self.last_analysis = None;
        self.mrz_present = false;
        self.readiness.reset(step);
        self.last_ready = None;
        self.last_guidance = None;

        if step == CaptureStep::Ovd {
            self.ovd.begin(now);
            self.torch(true, out);
        } else {
            self.ovd.clear();
            self.torch(false, out);
        }

        log::info!("Step changed to {}", step);
        out.push(Command::Emit(FlowEvent::StepChanged(step)));
    }

    /// Same-step retry. Transients reset, but the fire cooldown carries over.
    fn retry_step(&mut self, now: f64, out: &mut Vec<Command>) {
        self.settle.bump();
        self.attempt += 1;
        self.phase = Phase::Scanning;
        self.capturing = false;
        self.verifying = false;
        self.last_analysis = None;
        self.mrz_present = false;
        self.readiness.restart(self.step);
        self.last_ready = None;
        self.last_guidance = None;
        if self.step == CaptureStep::Ovd {
            self.ovd.reset(now);
            self.torch(true, out);
        }
        log::info!("Retrying {}", self.step);
    }

    fn torch(&mut self, on: bool, out: &mut Vec<Command>) {
        if on {
            if !self.torch_available {
                return;
            }
            self.torch_on = true;
            self.torch_used = true;
            out.push(Command::SetTorch {
                on: true,
                level: self.config.ovd.torch_level,
            });
        } else if self.torch_on {
            self.torch_on = false;
            out.push(Command::SetTorch { on: false, level: 0.0 });
        }
    }

    fn complete(&mut self, out: &mut Vec<Command>) {
        self.shutdown(Phase::Done, out);
        let result = FlowResult {
            session_id: self.session_id,
            completed_at: Utc::now(),
            shots: std::mem::take(&mut self.shots).into_values().collect(),
            fields: std::mem::take(&mut self.fields),
            torch_used: self.torch_used,
            stats: self.stats,
        };
        log::info!(
            "Capture flow {} complete with {} shots",
            self.session_id,
            result.shots.len()
        );
        out.push(Command::Emit(FlowEvent::Completed(Box::new(result))));
    }

    fn fail(&mut self, error: CaptureError, out: &mut Vec<Command>) {
        log::error!("Capture flow {} failed: {}", self.session_id, error);
        self.shutdown(Phase::Failed, out);
        out.push(Command::Emit(FlowEvent::Failed(error)));
    }

    /// Make the machine inert and release devices.
    fn shutdown(&mut self, phase: Phase, out: &mut Vec<Command>) {
        self.settle.bump();
        self.phase = phase;
        self.capturing = false;
        self.verifying = false;
        self.pending_shot = None;
        self.torch(false, out);
        out.push(Command::StopMotion);
    }

    fn set_ready(&mut self, ready: bool, out: &mut Vec<Command>) {
        if self.last_ready != Some(ready) {
            self.last_ready = Some(ready);
            out.push(Command::Emit(FlowEvent::Ready(ready)));
        }
    }

    fn set_guidance(&mut self, guidance: Guidance, out: &mut Vec<Command>) {
        if self.last_guidance != Some(guidance) {
            self.last_guidance = Some(guidance);
            out.push(Command::Emit(FlowEvent::Guidance(guidance)));
        }
    }

    fn readiness_guidance(&self, metrics: &FrameMetrics, outcome: &ReadinessOutcome) -> Guidance {
        let gates = &outcome.gates;
        if gates.white_out {
            Guidance::TooBright
        } else if !gates.rectangle {
            Guidance::AlignInGuide
        } else if metrics.coverage < self.config.readiness.coverage_min {
            Guidance::MoveCloser
        } else if !gates.aspect || !gates.coverage {
            Guidance::AlignInGuide
        } else if self.step == CaptureStep::Back && !self.mrz_present {
            Guidance::MrzNotVisible
        } else {
            Guidance::HoldSteady
        }
    }
}

fn ovd_guidance(metrics: &FrameMetrics, outcome: &OvdOutcome) -> Guidance {
    if metrics.white_out {
        Guidance::TooBright
    } else if outcome.pass {
        Guidance::HoldSteady
    } else {
        Guidance::TiltCard
    }
}

fn input_name(input: &FlowInput) -> &'static str {
    match input {
        FlowInput::Start { .. } => "start",
        FlowInput::FrameArrived { .. } => "frame-arrived",
        FlowInput::FrameAnalyzed { .. } => "frame-analyzed",
        FlowInput::Motion(_) => "motion",
        FlowInput::MrzProbed { .. } => "mrz-probed",
        FlowInput::PhotoCaptured { .. } => "photo-captured",
        FlowInput::Verified { .. } => "verified",
        FlowInput::SettleElapsed { .. } => "settle-elapsed",
        FlowInput::TorchFailed(_) => "torch-failed",
        FlowInput::MotionFailed(_) => "motion-failed",
        FlowInput::DeviceFailed(_) => "device-failed",
        FlowInput::Abandon => "abandon",
    }
}
