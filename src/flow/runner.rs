//! Tokio driver for the capture flow
//!
//! One task owns the [`FlowMachine`]. Frames and control messages arrive from
//! a [`FlowHandle`]; collaborator calls run under `spawn_blocking`, each
//! holding the [`FlightGuard`] of its gate, and post their results back to
//! the task as machine inputs. Torch and motion are held as leases and are
//! released on every way out of the task.

use super::single_flight::{FlightGuard, SingleFlight};
use super::state::{Command, FlowEvent, FlowInput, FlowMachine};
use super::timer::{self, TimerHandle};
use crate::config::IdCaptureConfig;
use crate::errors::CaptureError;
use crate::mrz::MrzProbe;
use crate::platform::{Collaborators, MotionLease, TorchLease};
use crate::quality::{guide_roi, ovd_roi, MetricsExtractor};
use crate::shot::ShotPreparer;
use crate::timing::FlowClock;
use crate::types::{CaptureStep, Frame, FrameMetrics, Rect, Shot};
use std::collections::VecDeque;
use std::sync::Arc;
use std::time::Duration;
use tokio::sync::mpsc;
use tokio::task::JoinHandle;
use uuid::Uuid;

/// Receiving end of the flow's public events.
pub type EventStream = mpsc::UnboundedReceiver<FlowEvent>;

enum HandleMsg {
    Frame(Frame),
    DeviceFailed(CaptureError),
    Abandon,
}

enum Internal {
    Input(FlowInput),
    Analyzed {
        step: CaptureStep,
        frame: Arc<Frame>,
        roi: Rect,
        metrics: FrameMetrics,
    },
}

/// Caller-side handle of a running flow. Dropping every clone abandons it.
#[derive(Clone)]
pub struct FlowHandle {
    tx: mpsc::UnboundedSender<HandleMsg>,
    clock: FlowClock,
    session_id: Uuid,
}

impl FlowHandle {
    /// Stamp `frame` with the flow clock and submit it.
    pub fn submit_frame(&self, mut frame: Frame) -> Result<(), CaptureError> {
        frame.timestamp = self.clock.now();
        self.submit_frame_at(frame)
    }

    /// Submit a frame whose timestamp is already in flow time.
    pub fn submit_frame_at(&self, frame: Frame) -> Result<(), CaptureError> {
        self.tx
            .send(HandleMsg::Frame(frame))
            .map_err(|_| CaptureError::FlowClosed)
    }

    /// Report a camera-session error; fatal errors end the flow.
    pub fn report_device_failure(&self, error: CaptureError) -> Result<(), CaptureError> {
        self.tx
            .send(HandleMsg::DeviceFailed(error))
            .map_err(|_| CaptureError::FlowClosed)
    }

    pub fn abandon(&self) -> Result<(), CaptureError> {
        self.tx
            .send(HandleMsg::Abandon)
            .map_err(|_| CaptureError::FlowClosed)
    }

    pub fn is_closed(&self) -> bool {
        self.tx.is_closed()
    }

    pub fn clock(&self) -> &FlowClock {
        &self.clock
    }

    pub fn session_id(&self) -> Uuid {
        self.session_id
    }
}

pub struct FlowRunner;

impl FlowRunner {
    /// Start a capture flow on the current tokio runtime.
    pub fn spawn(config: IdCaptureConfig, collaborators: Collaborators) -> (FlowHandle, EventStream) {
        let (handle_tx, handle_rx) = mpsc::unbounded_channel();
        let (event_tx, event_rx) = mpsc::unbounded_channel();
        let (internal_tx, internal_rx) = mpsc::unbounded_channel();

        let clock = FlowClock::new();
        let machine = FlowMachine::new(config.clone());
        let session_id = machine.session_id();

        let driver = Driver {
            extractor: MetricsExtractor::new(collaborators.detector.clone(), &config.detector),
            preparer: ShotPreparer::new(
                collaborators.detector.clone(),
                collaborators.recognizer.clone(),
                config.clone(),
            ),
            mrz: MrzProbe::new(config.mrz.clone()),
            analysis: SingleFlight::new("analysis"),
            photo: SingleFlight::new("photo"),
            verification: SingleFlight::new("verification"),
            machine,
            collaborators,
            config,
            clock: clock.clone(),
            internal: internal_tx,
            events: event_tx,
            torch: None,
            motion: None,
            motion_forwarder: None,
            settle_timer: None,
            last_analyzed: None,
        };
        tokio::spawn(driver.run(handle_rx, internal_rx));

        (
            FlowHandle {
                tx: handle_tx,
                clock,
                session_id,
            },
            event_rx,
        )
    }
}

struct AnalysisJob {
    frame: Frame,
    guard: FlightGuard,
}

struct Driver {
    machine: FlowMachine,
    collaborators: Collaborators,
    config: IdCaptureConfig,
    extractor: MetricsExtractor,
    preparer: ShotPreparer,
    mrz: MrzProbe,
    analysis: SingleFlight,
    photo: SingleFlight,
    verification: SingleFlight,
    clock: FlowClock,
    internal: mpsc::UnboundedSender<Internal>,
    events: mpsc::UnboundedSender<FlowEvent>,
    torch: Option<TorchLease>,
    motion: Option<MotionLease>,
    motion_forwarder: Option<JoinHandle<()>>,
    settle_timer: Option<TimerHandle>,
    last_analyzed: Option<(Arc<Frame>, Rect)>,
}

impl Driver {
    async fn run(
        mut self,
        mut handle_rx: mpsc::UnboundedReceiver<HandleMsg>,
        mut internal_rx: mpsc::UnboundedReceiver<Internal>,
    ) {
        let now = self.clock.now();
        self.dispatch(FlowInput::Start { now }, None);

        while !self.machine.phase().is_terminal() {
            tokio::select! {
                msg = handle_rx.recv() => match msg {
                    Some(HandleMsg::Frame(frame)) => self.on_frame(frame),
                    Some(HandleMsg::DeviceFailed(error)) => {
                        self.dispatch(FlowInput::DeviceFailed(error), None)
                    }
                    Some(HandleMsg::Abandon) | None => self.dispatch(FlowInput::Abandon, None),
                },
                Some(msg) = internal_rx.recv() => match msg {
                    Internal::Input(input) => self.dispatch(input, None),
                    Internal::Analyzed { step, frame, roi, metrics } => {
                        let now = frame.timestamp;
                        self.last_analyzed = Some((frame, roi));
                        self.dispatch(FlowInput::FrameAnalyzed { step, metrics, now }, None);
                    }
                },
            }
        }

        self.release();
        log::info!(
            "Flow driver for {} stopped ({:?}, {:?})",
            self.machine.session_id(),
            self.machine.phase(),
            self.machine.stats()
        );
    }

    fn on_frame(&mut self, frame: Frame) {
        if !frame.is_valid() {
            log::debug!(
                "Skipping degenerate frame {}x{} ({} bytes)",
                frame.width,
                frame.height,
                frame.data.len()
            );
            return;
        }
        let now = frame.timestamp;
        let guard = self.analysis.try_begin();
        let analysis_busy = guard.is_none();
        let job = guard.map(|guard| AnalysisJob { frame, guard });
        self.dispatch(FlowInput::FrameArrived { now, analysis_busy }, job);
    }

    /// Feed `input` and every follow-up input produced while executing commands.
    fn dispatch(&mut self, input: FlowInput, mut job: Option<AnalysisJob>) {
        let mut queue = VecDeque::from([input]);
        while let Some(input) = queue.pop_front() {
            for command in self.machine.handle(input) {
                if let Some(followup) = self.execute(command, &mut job) {
                    queue.push_back(followup);
                }
            }
        }
    }

    fn execute(&mut self, command: Command, job: &mut Option<AnalysisJob>) -> Option<FlowInput> {
        match command {
            Command::Analyze { step } => {
                if let Some(job) = job.take() {
                    self.spawn_analysis(step, job);
                }
                None
            }
            Command::ProbeMrz { attempt } => {
                self.spawn_mrz_probe(attempt);
                None
            }
            Command::RequestPhoto { step } => {
                self.spawn_photo(step);
                None
            }
            Command::Verify { step, shot } => {
                self.spawn_verification(step, shot);
                None
            }
            Command::SetTorch { on: true, level } => {
                if self.torch.is_some() {
                    return None;
                }
                match TorchLease::acquire(self.collaborators.torch.clone(), level) {
                    Ok(lease) => {
                        self.torch = Some(lease);
                        None
                    }
                    Err(e) => Some(FlowInput::TorchFailed(e)),
                }
            }
            Command::SetTorch { on: false, .. } => {
                self.torch = None;
                None
            }
            Command::StartMotion => self.start_motion(),
            Command::StopMotion => {
                self.stop_motion();
                None
            }
            Command::ScheduleSettle {
                generation,
                delay_secs,
            } => {
                if let Some(previous) = self.settle_timer.take() {
                    previous.cancel();
                }
                self.settle_timer = Some(timer::schedule(
                    Duration::from_secs_f64(delay_secs.max(0.0)),
                    generation,
                    self.internal.clone(),
                    |generation| Internal::Input(FlowInput::SettleElapsed { generation }),
                ));
                None
            }
            Command::Emit(event) => {
                if self.events.send(event).is_err() {
                    log::trace!("Event receiver dropped");
                }
                None
            }
        }
    }

    fn spawn_analysis(&self, step: CaptureStep, job: AnalysisJob) {
        let AnalysisJob { frame, guard } = job;
        let roi = match step {
            CaptureStep::Ovd => ovd_roi(frame.width, frame.height),
            _ => guide_roi(frame.width, frame.height, &self.config.guide),
        };
        let frame = Arc::new(frame);
        let extractor = self.extractor.clone();
        let tx = self.internal.clone();

        tokio::spawn(async move {
            let input = Arc::clone(&frame);
            let measured = tokio::task::spawn_blocking(move || {
                let _guard = guard;
                match step {
                    CaptureStep::Ovd => extractor.measure_ovd(&input),
                    _ => extractor.measure(&input, roi),
                }
            })
            .await;
            match measured {
                Ok(metrics) => {
                    let _ = tx.send(Internal::Analyzed {
                        step,
                        frame,
                        roi,
                        metrics,
                    });
                }
                Err(e) => log::error!("Frame analysis task failed: {}", e),
            }
        });
    }

    fn spawn_mrz_probe(&self, attempt: u64) {
        let Some((frame, roi)) = self.last_analyzed.clone() else {
            return;
        };
        let Some(guard) = self.mrz.try_begin() else {
            return;
        };
        let probe = self.mrz.clone();
        let recognizer = self.collaborators.recognizer.clone();
        let tx = self.internal.clone();

        tokio::spawn(async move {
            let probed = tokio::task::spawn_blocking(move || {
                let _guard = guard;
                probe.run(&frame, roi, recognizer.as_ref())
            })
            .await;
            let present = match probed {
                Ok(Ok(signals)) => signals.mrz_like,
                Ok(Err(e)) => {
                    log::debug!("MRZ probe failed: {}", e);
                    false
                }
                Err(e) => {
                    log::error!("MRZ probe task failed: {}", e);
                    false
                }
            };
            let _ = tx.send(Internal::Input(FlowInput::MrzProbed {
                step: CaptureStep::Back,
                attempt,
                present,
            }));
        });
    }

    fn spawn_photo(&self, step: CaptureStep) {
        let tx = self.internal.clone();
        let clock = self.clock.clone();
        let Some(guard) = self.photo.try_begin() else {
            log::warn!("Photo request for {} while another is in flight", step);
            let _ = tx.send(Internal::Input(FlowInput::PhotoCaptured {
                step,
                result: Err(CaptureError::PhotoUnavailable(
                    "photo request already in flight".to_string(),
                )),
                now: clock.now(),
            }));
            return;
        };
        let photo = self.collaborators.photo.clone();
        let preparer = self.preparer.clone();

        tokio::spawn(async move {
            let captured = tokio::task::spawn_blocking(move || {
                let _guard = guard;
                let raw = photo.request_photo()?;
                preparer.prepare(step, &raw)
            })
            .await;
            let result = captured.unwrap_or_else(|e| {
                Err(CaptureError::PhotoUnavailable(format!("photo task failed: {}", e)))
            });
            let _ = tx.send(Internal::Input(FlowInput::PhotoCaptured {
                step,
                result,
                now: clock.now(),
            }));
        });
    }

    fn spawn_verification(&self, step: CaptureStep, shot: Shot) {
        let tx = self.internal.clone();
        let clock = self.clock.clone();
        let Some(guard) = self.verification.try_begin() else {
            log::warn!("Verification for {} while another is in flight", step);
            let _ = tx.send(Internal::Input(FlowInput::Verified {
                step,
                result: Err(CaptureError::Verification(
                    "verification already in flight".to_string(),
                )),
                now: clock.now(),
            }));
            return;
        };
        let verifier = self.collaborators.verifier.clone();

        tokio::spawn(async move {
            let verified = tokio::task::spawn_blocking(move || {
                let _guard = guard;
                verifier.verify(step, &shot)
            })
            .await;
            let result = verified.unwrap_or_else(|e| {
                Err(CaptureError::Verification(format!("verification task failed: {}", e)))
            });
            let _ = tx.send(Internal::Input(FlowInput::Verified {
                step,
                result,
                now: clock.now(),
            }));
        });
    }

    fn start_motion(&mut self) -> Option<FlowInput> {
        if self.motion.is_some() {
            return None;
        }
        let (sample_tx, mut sample_rx) = mpsc::unbounded_channel();
        match MotionLease::acquire(
            self.collaborators.motion.clone(),
            self.config.motion.sample_interval_secs,
            sample_tx,
        ) {
            Ok(lease) => {
                self.motion = Some(lease);
                let tx = self.internal.clone();
                self.motion_forwarder = Some(tokio::spawn(async move {
                    while let Some(sample) = sample_rx.recv().await {
                        if tx.send(Internal::Input(FlowInput::Motion(sample))).is_err() {
                            break;
                        }
                    }
                }));
                None
            }
            Err(e) => Some(FlowInput::MotionFailed(e)),
        }
    }

    fn stop_motion(&mut self) {
        self.motion = None;
        if let Some(forwarder) = self.motion_forwarder.take() {
            forwarder.abort();
        }
    }

    fn release(&mut self) {
        if let Some(timer) = self.settle_timer.take() {
            timer.cancel();
        }
        self.torch = None;
        self.stop_motion();
    }
}
