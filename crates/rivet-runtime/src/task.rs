//! Task lifetime: one scope per run, one runner per task.
//!
//! [`TaskScope`] owns everything a run starts: force observers and the
//! recording session. Closing it disarms every observer and stops an active
//! recording, in that order. It is closed explicitly by
//! [`TaskRunner::run`] and, as a backstop, on drop, so a panicking step
//! still leaves the cell with no observer armed and no capture open.
//!
//! [`TaskRunner`] is the `initialize` / `run` pair a task program exposes:
//! `initialize` resolves every waypoint and builds the plan once, `run`
//! executes it inside a fresh scope.

use std::collections::BTreeMap;
use std::sync::Arc;

use rivet_hal::{ForceSensor, MotionController, OperatorPrompt, Recorder};
use rivet_kernel::{ActuatorGate, BusyPolicy, SegmentVerifier};
use rivet_middleware::EventBus;
use rivet_recorder::{RecordingSession, SessionTransition};
use rivet_types::{
    ArtifactLocation, EventPayload, ObserverState, RivetError, SessionConfig,
};
use tokio::runtime::Handle;
use tracing::{debug, info, instrument, warn};

use crate::force_observer::{ForceHandler, ForceThresholdObserver};
use crate::profile::TaskProfile;
use crate::scenarios;
use crate::sequencer::{SequenceReport, Sequencer};
use crate::waypoints::WaypointTable;

/// The collaborators a task talks to.
#[derive(Clone)]
pub struct TaskDevices {
    pub controller: Arc<dyn MotionController>,
    pub sensor: Arc<dyn ForceSensor>,
    pub recorder: Arc<dyn Recorder>,
    pub prompt: Arc<dyn OperatorPrompt>,
}

// ────────────────────────────────────────────────────────────────────────────
// TaskScope
// ────────────────────────────────────────────────────────────────────────────

pub struct TaskScope {
    gate: Arc<ActuatorGate>,
    sensor: Arc<dyn ForceSensor>,
    recorder: Arc<dyn Recorder>,
    prompt: Arc<dyn OperatorPrompt>,
    runtime: Handle,
    bus: Option<EventBus>,
    observers: BTreeMap<String, ForceThresholdObserver>,
    session: Option<RecordingSession>,
    closed: bool,
}

impl TaskScope {
    pub fn new(devices: &TaskDevices, gate: Arc<ActuatorGate>, runtime: Handle) -> Self {
        Self {
            gate,
            sensor: Arc::clone(&devices.sensor),
            recorder: Arc::clone(&devices.recorder),
            prompt: Arc::clone(&devices.prompt),
            runtime,
            bus: None,
            observers: BTreeMap::new(),
            session: None,
            closed: false,
        }
    }

    pub fn with_bus(mut self, bus: EventBus) -> Self {
        self.bus = Some(bus);
        self
    }

    pub fn gate(&self) -> &ActuatorGate {
        &self.gate
    }

    pub fn prompt(&self) -> &dyn OperatorPrompt {
        self.prompt.as_ref()
    }

    pub fn publish(&self, payload: EventPayload) {
        if let Some(bus) = &self.bus {
            bus.publish("sequencer", payload);
        }
    }

    pub fn observer_state(&self, name: &str) -> Option<ObserverState> {
        self.observers.get(name).map(ForceThresholdObserver::state)
    }

    pub fn recording_active(&self) -> bool {
        self.session.as_ref().is_some_and(RecordingSession::is_active)
    }

    pub fn artifact(&self) -> Option<&ArtifactLocation> {
        self.session.as_ref().and_then(RecordingSession::artifact)
    }

    /// Arm `name`, creating the observer on first use.
    pub fn arm_observer(
        &mut self,
        name: &str,
        threshold: f64,
        handler: ForceHandler,
    ) -> Result<(), RivetError> {
        let observer = self.observers.entry(name.to_string()).or_insert_with(|| {
            let observer =
                ForceThresholdObserver::new(name, Arc::clone(&self.sensor), self.runtime.clone());
            match &self.bus {
                Some(bus) => observer.with_bus(bus.clone()),
                None => observer,
            }
        });
        observer.arm(threshold, handler)
    }

    /// Disarm `name`; unknown or disabled observers are left alone.
    pub fn disarm_observer(&mut self, name: &str) {
        match self.observers.get_mut(name) {
            Some(observer) => observer.disarm(),
            None => debug!(observer = name, "disarm of an observer never armed"),
        }
    }

    /// Open a recording session. `Ok(Some(_))` carries an ignored usage
    /// error: a session is already active.
    pub fn start_recording(
        &mut self,
        config: SessionConfig,
    ) -> Result<Option<RivetError>, RivetError> {
        if let Some(active) = self.session.as_mut().filter(|s| s.is_active()) {
            return match active.start(self.recorder.as_ref())? {
                SessionTransition::Ignored(e) => Ok(Some(e)),
                _ => Ok(None),
            };
        }
        let session = self.session.insert(RecordingSession::new(config));
        session.start(self.recorder.as_ref())?;
        let payload = EventPayload::RecordingStarted {
            session: session.id(),
            name: session.name().to_string(),
        };
        self.publish(payload);
        Ok(None)
    }

    /// Close the current session. `Ok(Some(_))` carries an ignored usage
    /// error: nothing was recording.
    pub fn stop_recording(&mut self) -> Result<Option<RivetError>, RivetError> {
        let Some(session) = self.session.as_mut() else {
            warn!("stop recording called before start");
            return Ok(Some(RivetError::SessionUsage(
                "stop called before start".to_string(),
            )));
        };
        match session.stop(self.recorder.as_ref())? {
            SessionTransition::Stopped(location) => {
                let payload = EventPayload::RecordingStopped {
                    session: session.id(),
                    location: location.to_string(),
                };
                self.publish(payload);
                Ok(None)
            }
            SessionTransition::Ignored(e) => Ok(Some(e)),
            SessionTransition::Started => Ok(None),
        }
    }

    /// Disarm every observer, then stop an active recording. Safe to call
    /// more than once. Returns the errors met on the way.
    pub fn teardown(&mut self) -> Vec<RivetError> {
        let mut errors = Vec::new();
        for observer in self.observers.values_mut() {
            observer.disarm();
        }
        if self.recording_active() {
            debug!("stopping recording left open by the task");
            if let Err(e) = self.stop_recording() {
                warn!(error = %e, "recording did not stop cleanly");
                errors.push(e);
            }
        }
        self.closed = true;
        errors
    }
}

impl Drop for TaskScope {
    fn drop(&mut self) {
        if !self.closed {
            warn!("task scope dropped without teardown; closing");
            for e in self.teardown() {
                warn!(error = %e, "teardown error");
            }
        }
    }
}

// ────────────────────────────────────────────────────────────────────────────
// TaskRunner
// ────────────────────────────────────────────────────────────────────────────

struct Prepared {
    gate: Arc<ActuatorGate>,
    sequencer: Sequencer,
}

/// One task program: a profile, the devices, and a plan built once.
pub struct TaskRunner {
    profile: TaskProfile,
    devices: TaskDevices,
    runtime: Handle,
    policy: BusyPolicy,
    bus: Option<EventBus>,
    prepared: Option<Prepared>,
}

impl TaskRunner {
    pub fn new(profile: TaskProfile, devices: TaskDevices, runtime: Handle) -> Self {
        Self {
            profile,
            devices,
            runtime,
            policy: BusyPolicy::default(),
            bus: None,
            prepared: None,
        }
    }

    pub fn with_policy(mut self, policy: BusyPolicy) -> Self {
        self.policy = policy;
        self
    }

    pub fn with_bus(mut self, bus: EventBus) -> Self {
        self.bus = Some(bus);
        self
    }

    pub fn profile(&self) -> &TaskProfile {
        &self.profile
    }

    /// The gate motions go through, once initialized.
    pub fn gate(&self) -> Option<Arc<ActuatorGate>> {
        self.prepared.as_ref().map(|p| Arc::clone(&p.gate))
    }

    pub fn is_initialized(&self) -> bool {
        self.prepared.is_some()
    }

    /// Validate the profile, resolve every waypoint, check the controller
    /// answers and build the plan. Runs once; later calls do nothing.
    ///
    /// # Errors
    ///
    /// Profile errors ([`RivetError::UnknownWaypoint`],
    /// [`RivetError::InvalidProfile`]) and controller faults. Nothing has
    /// moved when this fails.
    #[instrument(skip(self), fields(scenario = %self.profile.scenario))]
    pub fn initialize(&mut self) -> Result<(), RivetError> {
        if self.prepared.is_some() {
            debug!("already initialized");
            return Ok(());
        }
        self.profile.validate()?;
        let table = WaypointTable::from_profile(&self.profile)?;
        let gate = Arc::new(ActuatorGate::new(
            Arc::clone(&self.devices.controller),
            SegmentVerifier::standard(),
            self.policy,
        ));
        let pose = gate.current_pose()?;
        debug!(x = pose.x, y = pose.y, z = pose.z, "controller reachable");

        let steps = scenarios::build_plan(&self.profile, &table, &gate)?;
        info!(
            controller = %gate.controller_id(),
            sensor = %self.devices.sensor.id(),
            steps = steps.len(),
            waypoints = table.len(),
            policy = %self.policy,
            "task initialized"
        );
        self.prepared = Some(Prepared {
            gate,
            sequencer: Sequencer::new(self.profile.scenario.as_str(), steps),
        });
        Ok(())
    }

    /// Execute the plan in a fresh scope and close it.
    ///
    /// # Errors
    ///
    /// [`RivetError::Runtime`] when called before [`initialize`](Self::initialize).
    /// Step faults are not errors here; they are in the report.
    pub fn run(&self) -> Result<SequenceReport, RivetError> {
        let prepared = self
            .prepared
            .as_ref()
            .ok_or_else(|| RivetError::Runtime("run called before initialize".to_string()))?;

        let mut scope = TaskScope::new(&self.devices, Arc::clone(&prepared.gate), self.runtime.clone());
        if let Some(bus) = &self.bus {
            scope = scope.with_bus(bus.clone());
        }
        let mut report = prepared.sequencer.run(&mut scope);
        report.teardown_errors = scope.teardown();
        report.artifact = scope.artifact().cloned();
        if let Some(location) = &report.artifact {
            info!(%location, "recording saved");
        }
        Ok(report)
    }
}
