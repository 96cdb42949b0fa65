//! In-process simulated collaborators for CI/CD testing without a robot.
//!
//! The stubs record every command they receive and return plausible state,
//! so complete task runs can execute headless in tests and in the CLI's
//! simulation mode.
//!
//! | Stub | Stands in for |
//! |---|---|
//! | [`SimMotionController`] | Robot controller; logs requests, sleeps a fixed step time |
//! | [`SimForceSensor`] | Flange force feed; samples are injected by tests or by contact profiles |
//! | [`SimRecorder`] | Data recorder; counts start/stop calls |
//! | [`ScriptedPrompt`] | Operator dialog; answers from a script |
//!
//! # Example
//!
//! ```rust
//! use rivet_hal::sim::{SimForceSensor, SimMotionController};
//!
//! let sensor = SimForceSensor::new("flange_force");
//! let controller = SimMotionController::new("lbr_iiwa_14_r820")
//!     .with_force_sensor(sensor.clone())
//!     // The next compliant motion "touches" something.
//!     .with_contact(vec![3.0, 7.0, 12.0]);
//! assert!(controller.commands().is_empty());
//! ```

use std::collections::{HashMap, VecDeque};
use std::sync::atomic::{AtomicBool, AtomicUsize, Ordering};
use std::sync::{Arc, Mutex, MutexGuard, PoisonError};
use std::time::{Duration, Instant};

use rivet_types::{
    Acknowledgment, ArtifactLocation, Completion, ForceSample, Frame, JointPosition, MotionFault,
    MotionRequest, MotionSegment, RecordingChannel, RivetError, SessionConfig,
};
use tokio::sync::broadcast;
use tracing::{debug, info};

use crate::controller::{AsyncMotionHandle, InFlightMotion, MotionController};
use crate::operator::OperatorPrompt;
use crate::recorder::Recorder;
use crate::sensor::{ForceSensor, TelemetrySource};

fn lock<T>(mutex: &Mutex<T>) -> MutexGuard<'_, T> {
    mutex.lock().unwrap_or_else(PoisonError::into_inner)
}

// ────────────────────────────────────────────────────────────────────────────
// Force sensor
// ────────────────────────────────────────────────────────────────────────────

/// A simulated force feed. Clones share the same channel.
#[derive(Clone)]
pub struct SimForceSensor {
    id: String,
    sender: broadcast::Sender<ForceSample>,
    last: Arc<Mutex<Option<f64>>>,
}

impl SimForceSensor {
    pub fn new(id: impl Into<String>) -> Self {
        Self::with_capacity(id, 256)
    }

    /// A feed whose subscribers lag once more than `capacity` samples are
    /// buffered.
    pub fn with_capacity(id: impl Into<String>, capacity: usize) -> Self {
        let (sender, _) = broadcast::channel(capacity);
        Self {
            id: id.into(),
            sender,
            last: Arc::new(Mutex::new(None)),
        }
    }

    /// Publish a sample with the given magnitude. Returns the number of
    /// subscribers that received it.
    pub fn inject(&self, magnitude: f64) -> usize {
        self.inject_sample(ForceSample::now(magnitude))
    }

    pub fn inject_sample(&self, sample: ForceSample) -> usize {
        *lock(&self.last) = Some(sample.magnitude);
        self.sender.send(sample).unwrap_or(0)
    }

    /// Last injected magnitude; `0.0` before the first sample.
    pub fn last_magnitude(&self) -> f64 {
        lock(&self.last).unwrap_or(0.0)
    }
}

impl ForceSensor for SimForceSensor {
    fn id(&self) -> &str {
        &self.id
    }

    fn subscribe(&self) -> broadcast::Receiver<ForceSample> {
        self.sender.subscribe()
    }

    fn latest(&self) -> Option<f64> {
        *lock(&self.last)
    }
}

// ────────────────────────────────────────────────────────────────────────────
// Motion controller
// ────────────────────────────────────────────────────────────────────────────

#[derive(Default)]
struct SimState {
    log: Mutex<Vec<MotionRequest>>,
    pose: Mutex<Frame>,
    joints: Mutex<Option<JointPosition>>,
    faults: Mutex<HashMap<String, MotionFault>>,
    contacts: Mutex<VecDeque<Vec<f64>>>,
    stopped: AtomicBool,
    active: AtomicUsize,
    peak_active: AtomicUsize,
    cancels: AtomicUsize,
}

/// Decrements the active-command count when a simulated execution ends.
struct ActiveGuard<'a>(&'a SimState);

impl<'a> ActiveGuard<'a> {
    fn enter(state: &'a SimState) -> Self {
        let now = state.active.fetch_add(1, Ordering::SeqCst) + 1;
        state.peak_active.fetch_max(now, Ordering::SeqCst);
        Self(state)
    }
}

impl Drop for ActiveGuard<'_> {
    fn drop(&mut self) {
        self.0.active.fetch_sub(1, Ordering::SeqCst);
    }
}

/// A simulated manipulator controller.
///
/// Each blocking motion is logged, optionally fails with an injected fault,
/// replays one queued contact profile into the attached force sensor when the
/// motion is compliant, then sleeps for the configured step time. Spline
/// motions move the simulated flange to their last frame.
///
/// Only hold segments are accepted by
/// [`execute_async`](MotionController::execute_async).
#[derive(Clone)]
pub struct SimMotionController {
    id: String,
    step_time: Duration,
    sensor: Option<SimForceSensor>,
    state: Arc<SimState>,
}

impl SimMotionController {
    pub fn new(id: impl Into<String>) -> Self {
        let state = SimState::default();
        *lock(&state.pose) = Frame::new(-90.0, 0.0, 600.0, std::f64::consts::PI, 0.0, std::f64::consts::PI);
        Self {
            id: id.into(),
            step_time: Duration::from_millis(5),
            sensor: None,
            state: Arc::new(state),
        }
    }

    /// Wall-clock time each blocking motion takes.
    pub fn with_step_time(mut self, step_time: Duration) -> Self {
        self.step_time = step_time;
        self
    }

    pub fn with_force_sensor(mut self, sensor: SimForceSensor) -> Self {
        self.sensor = Some(sensor);
        self
    }

    pub fn with_pose(self, pose: Frame) -> Self {
        *lock(&self.state.pose) = pose;
        self
    }

    /// Queue a force profile replayed during the next compliant motion.
    pub fn with_contact(self, magnitudes: Vec<f64>) -> Self {
        lock(&self.state.contacts).push_back(magnitudes);
        self
    }

    /// Make the next motion labelled `label` fail with `fault`.
    pub fn fail_on(self, label: impl Into<String>, fault: MotionFault) -> Self {
        lock(&self.state.faults).insert(label.into(), fault);
        self
    }

    /// Every request received so far, in arrival order.
    pub fn commands(&self) -> Vec<MotionRequest> {
        lock(&self.state.log).clone()
    }

    pub fn labels(&self) -> Vec<String> {
        lock(&self.state.log).iter().map(|r| r.label.clone()).collect()
    }

    /// Number of asynchronous motions cancelled by their owner.
    pub fn cancel_count(&self) -> usize {
        self.state.cancels.load(Ordering::SeqCst)
    }

    /// Highest number of motions that were ever executing at once.
    pub fn peak_concurrency(&self) -> usize {
        self.state.peak_active.load(Ordering::SeqCst)
    }

    pub fn joints(&self) -> Option<JointPosition> {
        *lock(&self.state.joints)
    }

    /// Clear a previous external stop.
    pub fn reset(&self) {
        self.state.stopped.store(false, Ordering::SeqCst);
    }

    fn replay_contact(&self, request: &MotionRequest) {
        if !request.is_compliant() || matches!(request.segment, MotionSegment::Hold) {
            return;
        }
        let Some(sensor) = &self.sensor else {
            return;
        };
        if let Some(profile) = lock(&self.state.contacts).pop_front() {
            debug!(label = %request.label, samples = profile.len(), "replaying contact profile");
            for magnitude in profile {
                sensor.inject(magnitude);
            }
        }
    }

    fn aborted(&self, request: &MotionRequest) -> MotionFault {
        MotionFault::ExternalAbort(format!("'{}' interrupted by external stop", request.label))
    }
}

impl MotionController for SimMotionController {
    fn id(&self) -> &str {
        &self.id
    }

    fn execute(&self, request: &MotionRequest) -> Result<Completion, MotionFault> {
        let _active = ActiveGuard::enter(&self.state);
        let started = Instant::now();
        lock(&self.state.log).push(request.clone());

        if self.state.stopped.load(Ordering::SeqCst) {
            return Err(self.aborted(request));
        }
        if let Some(fault) = lock(&self.state.faults).remove(&request.label) {
            return Err(fault);
        }
        if let MotionSegment::Spline(frames) = &request.segment {
            if let Some(frame) = frames.iter().find(|f| f.z < 0.0) {
                return Err(MotionFault::Unreachable(format!(
                    "frame at z={} is below the mounting plane",
                    frame.z
                )));
            }
        }

        self.replay_contact(request);

        let deadline = started + self.step_time;
        while Instant::now() < deadline {
            if self.state.stopped.load(Ordering::SeqCst) {
                return Err(self.aborted(request));
            }
            let remaining = deadline.saturating_duration_since(Instant::now());
            std::thread::sleep(remaining.min(Duration::from_millis(5)));
        }

        match &request.segment {
            MotionSegment::Joint(waypoint) => *lock(&self.state.joints) = Some(*waypoint.joints()),
            MotionSegment::Spline(frames) => {
                if let Some(last) = frames.last() {
                    *lock(&self.state.pose) = *last;
                }
            }
            MotionSegment::Hold => {}
        }

        Ok(Completion {
            request_id: request.id,
            elapsed_ms: started.elapsed().as_millis() as u64,
        })
    }

    fn execute_async(&self, request: &MotionRequest) -> Result<AsyncMotionHandle, MotionFault> {
        if !matches!(request.segment, MotionSegment::Hold) {
            return Err(MotionFault::Unreachable(format!(
                "simulated controller only runs hold motions asynchronously, got {}",
                request.segment.kind()
            )));
        }
        lock(&self.state.log).push(request.clone());
        if self.state.stopped.load(Ordering::SeqCst) {
            return Err(self.aborted(request));
        }
        debug!(label = %request.label, "simulated hold running");
        Ok(AsyncMotionHandle::new(
            request,
            Box::new(SimHold {
                state: Arc::clone(&self.state),
                cancelled: false,
            }),
        ))
    }

    fn current_pose(&self) -> Result<Frame, MotionFault> {
        Ok(*lock(&self.state.pose))
    }

    fn external_stop(&self) {
        info!(controller = %self.id, "external stop");
        self.state.stopped.store(true, Ordering::SeqCst);
    }
}

impl TelemetrySource for SimMotionController {
    fn read(&self, channel: RecordingChannel) -> Option<Vec<f64>> {
        let pose = *lock(&self.state.pose);
        let force = self.sensor.as_ref().map_or(0.0, SimForceSensor::last_magnitude);
        Some(match channel {
            RecordingChannel::CartesianForce => vec![0.0, 0.0, force],
            RecordingChannel::CartesianTorque => vec![0.0; 3],
            RecordingChannel::CommandedPose | RecordingChannel::MeasuredPose => {
                vec![pose.x, pose.y, pose.z]
            }
            RecordingChannel::InternalJointTorque | RecordingChannel::ExternalJointTorque => {
                vec![0.0; rivet_types::JOINT_COUNT]
            }
        })
    }
}

struct SimHold {
    state: Arc<SimState>,
    cancelled: bool,
}

impl InFlightMotion for SimHold {
    fn cancel(&mut self) {
        self.cancelled = true;
        self.state.cancels.fetch_add(1, Ordering::SeqCst);
    }

    fn is_finished(&self) -> bool {
        self.cancelled || self.state.stopped.load(Ordering::SeqCst)
    }
}

// ────────────────────────────────────────────────────────────────────────────
// Recorder
// ────────────────────────────────────────────────────────────────────────────

/// One call received by a [`SimRecorder`].
#[derive(Debug, Clone, PartialEq)]
pub enum RecorderCall {
    Start(String),
    Stop(String),
}

/// A recorder that persists nothing and remembers every call.
#[derive(Clone, Default)]
pub struct SimRecorder {
    calls: Arc<Mutex<Vec<RecorderCall>>>,
    open: Arc<Mutex<Option<String>>>,
    fail_start: Arc<AtomicBool>,
}

impl SimRecorder {
    pub fn new() -> Self {
        Self::default()
    }

    /// Make every `start` fail.
    pub fn failing_start(self) -> Self {
        self.fail_start.store(true, Ordering::SeqCst);
        self
    }

    pub fn calls(&self) -> Vec<RecorderCall> {
        lock(&self.calls).clone()
    }

    pub fn start_count(&self) -> usize {
        self.calls()
            .iter()
            .filter(|c| matches!(c, RecorderCall::Start(_)))
            .count()
    }

    pub fn stop_count(&self) -> usize {
        self.calls()
            .iter()
            .filter(|c| matches!(c, RecorderCall::Stop(_)))
            .count()
    }
}

impl Recorder for SimRecorder {
    fn start(&self, config: &SessionConfig) -> Result<(), RivetError> {
        if self.fail_start.load(Ordering::SeqCst) {
            return Err(RivetError::Recorder(format!(
                "simulated recorder refused '{}'",
                config.name
            )));
        }
        let mut open = lock(&self.open);
        if let Some(name) = open.as_ref() {
            return Err(RivetError::Recorder(format!("capture '{name}' already open")));
        }
        *open = Some(config.name.clone());
        lock(&self.calls).push(RecorderCall::Start(config.name.clone()));
        Ok(())
    }

    fn stop(&self) -> Result<ArtifactLocation, RivetError> {
        let name = lock(&self.open)
            .take()
            .ok_or_else(|| RivetError::Recorder("no capture open".to_string()))?;
        lock(&self.calls).push(RecorderCall::Stop(name.clone()));
        Ok(ArtifactLocation(format!("sim://recordings/{name}")))
    }
}

// ────────────────────────────────────────────────────────────────────────────
// Operator prompt
// ────────────────────────────────────────────────────────────────────────────

/// A scripted answer for [`ScriptedPrompt`].
#[derive(Debug, Clone)]
pub enum PromptScript {
    Answer(Acknowledgment),
    Fail(String),
    Panic,
}

/// An operator that answers from a script and then keeps confirming.
#[derive(Clone, Default)]
pub struct ScriptedPrompt {
    script: Arc<Mutex<VecDeque<PromptScript>>>,
    seen: Arc<Mutex<Vec<String>>>,
}

impl ScriptedPrompt {
    pub fn confirming() -> Self {
        Self::default()
    }

    pub fn then(self, step: PromptScript) -> Self {
        lock(&self.script).push_back(step);
        self
    }

    /// Messages shown so far.
    pub fn messages(&self) -> Vec<String> {
        lock(&self.seen).clone()
    }
}

impl OperatorPrompt for ScriptedPrompt {
    fn prompt_modal(&self, message: &str) -> Result<Acknowledgment, RivetError> {
        lock(&self.seen).push(message.to_string());
        let next = lock(&self.script).pop_front();
        match next {
            None => Ok(Acknowledgment::Confirmed),
            Some(PromptScript::Answer(ack)) => Ok(ack),
            Some(PromptScript::Fail(reason)) => Err(RivetError::Operator(reason)),
            Some(PromptScript::Panic) => panic!("scripted prompt panic"),
        }
    }
}

// ────────────────────────────────────────────────────────────────────────────
// Tests
// ────────────────────────────────────────────────────────────────────────────
