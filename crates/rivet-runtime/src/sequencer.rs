//! [`Sequencer`] – strictly ordered task steps.
//!
//! Steps run one after the other on the calling thread; a motion step
//! returns only when the controller reports completion, so step *n + 1*
//! never starts before step *n* has finished.
//!
//! | Outcome | When |
//! |---|---|
//! | `Completed` | The step did its work. |
//! | `Ignored` | A non-fatal usage error (double stop, …); the run continues. |
//! | `Failed` | A fatal error; later non-teardown steps are skipped. |
//! | `Skipped` | The run had already aborted. |
//!
//! Teardown steps (disarm, stop recording) run even after an abort.

use std::fmt;

use rivet_types::{
    ArtifactLocation, ComplianceProfile, EventPayload, FrameOverride, MotionRequest, MotionScale, RivetError,
    SessionConfig, Waypoint,
};
use tracing::{debug, error, info, warn};

use crate::force_observer::ForceHandler;
use crate::hold::hold_and_wait_for_ack;
use crate::task::TaskScope;

// ────────────────────────────────────────────────────────────────────────────
// Steps
// ────────────────────────────────────────────────────────────────────────────

/// Where a motion step goes.
#[derive(Debug, Clone)]
pub enum MotionTarget {
    Joint(Waypoint),
    /// Frames derived from the flange pose read when the step starts.
    Path {
        overrides: Vec<FrameOverride>,
        scale: MotionScale,
    },
}

impl MotionTarget {
    fn request(&self, label: &str, scope: &TaskScope) -> Result<MotionRequest, RivetError> {
        match self {
            MotionTarget::Joint(waypoint) => Ok(MotionRequest::joint(label, waypoint.clone())),
            MotionTarget::Path { overrides, scale } => {
                let reference = scope.gate().current_pose()?;
                let frames = overrides.iter().map(|o| o.apply(&reference)).collect();
                Ok(MotionRequest::spline(label, frames, *scale))
            }
        }
    }
}

#[derive(Clone)]
pub enum Step {
    Motion {
        label: String,
        target: MotionTarget,
    },
    CompliantMotion {
        label: String,
        target: MotionTarget,
        profile: ComplianceProfile,
    },
    ArmObserver {
        observer: String,
        threshold: f64,
        handler: ForceHandler,
    },
    DisarmObserver {
        observer: String,
    },
    StartRecording(SessionConfig),
    StopRecording,
    HoldAndWait {
        profile: ComplianceProfile,
        message: String,
    },
}

impl Step {
    pub fn motion(label: impl Into<String>, target: MotionTarget) -> Self {
        Step::Motion {
            label: label.into(),
            target,
        }
    }

    pub fn compliant(
        label: impl Into<String>,
        target: MotionTarget,
        profile: ComplianceProfile,
    ) -> Self {
        Step::CompliantMotion {
            label: label.into(),
            target,
            profile,
        }
    }

    pub fn arm(observer: impl Into<String>, threshold: f64, handler: ForceHandler) -> Self {
        Step::ArmObserver {
            observer: observer.into(),
            threshold,
            handler,
        }
    }

    pub fn disarm(observer: impl Into<String>) -> Self {
        Step::DisarmObserver {
            observer: observer.into(),
        }
    }

    pub fn hold(profile: ComplianceProfile, message: impl Into<String>) -> Self {
        Step::HoldAndWait {
            profile,
            message: message.into(),
        }
    }

    pub fn label(&self) -> String {
        match self {
            Step::Motion { label, .. } | Step::CompliantMotion { label, .. } => label.clone(),
            Step::ArmObserver {
                observer, threshold, ..
            } => format!("arm {observer} at {threshold} N"),
            Step::DisarmObserver { observer } => format!("disarm {observer}"),
            Step::StartRecording(config) => format!("start recording {}", config.name),
            Step::StopRecording => "stop recording".to_string(),
            Step::HoldAndWait { .. } => "hold for operator".to_string(),
        }
    }

    /// Runs even after the sequence has aborted.
    pub fn is_teardown(&self) -> bool {
        matches!(self, Step::DisarmObserver { .. } | Step::StopRecording)
    }
}

impl fmt::Debug for Step {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_tuple("Step").field(&self.label()).finish()
    }
}

// ────────────────────────────────────────────────────────────────────────────
// Report
// ────────────────────────────────────────────────────────────────────────────

#[derive(Debug, Clone, PartialEq)]
pub enum StepOutcome {
    Completed,
    Ignored(RivetError),
    Failed(RivetError),
    Skipped,
}

#[derive(Debug, Clone, PartialEq)]
pub struct StepRecord {
    pub index: usize,
    pub label: String,
    pub outcome: StepOutcome,
}

/// Per-step outcomes of one run.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct SequenceReport {
    pub task: String,
    pub steps: Vec<StepRecord>,
    /// The first fatal error, if the run aborted.
    pub fault: Option<RivetError>,
    /// Errors raised while tearing the task scope down.
    pub teardown_errors: Vec<RivetError>,
    /// Where the recording was persisted, if one was stopped.
    pub artifact: Option<ArtifactLocation>,
}

impl SequenceReport {
    pub fn succeeded(&self) -> bool {
        self.fault.is_none()
    }

    pub fn count(&self, wanted: fn(&StepOutcome) -> bool) -> usize {
        self.steps.iter().filter(|s| wanted(&s.outcome)).count()
    }

    pub fn completed(&self) -> usize {
        self.count(|o| matches!(o, StepOutcome::Completed))
    }

    pub fn skipped(&self) -> usize {
        self.count(|o| matches!(o, StepOutcome::Skipped))
    }

    /// `Err` with the abort fault, if any.
    pub fn result(&self) -> Result<(), RivetError> {
        match &self.fault {
            Some(fault) => Err(fault.clone()),
            None => Ok(()),
        }
    }
}

// ────────────────────────────────────────────────────────────────────────────
// Sequencer
// ────────────────────────────────────────────────────────────────────────────

/// A named, immutable list of steps.
#[derive(Debug, Clone)]
pub struct Sequencer {
    name: String,
    steps: Vec<Step>,
}

/// What a successful step did.
enum Effect {
    Done,
    Ignored(RivetError),
}

impl Sequencer {
    pub fn new(name: impl Into<String>, steps: Vec<Step>) -> Self {
        Self {
            name: name.into(),
            steps,
        }
    }

    pub fn name(&self) -> &str {
        &self.name
    }

    pub fn steps(&self) -> &[Step] {
        &self.steps
    }

    /// Run every step against `scope`. Never returns early: after a fatal
    /// error the remaining steps are skipped, except teardown steps.
    pub fn run(&self, scope: &mut TaskScope) -> SequenceReport {
        let mut report = SequenceReport {
            task: self.name.clone(),
            ..SequenceReport::default()
        };

        for (index, step) in self.steps.iter().enumerate() {
            let label = step.label();
            if report.fault.is_some() && !step.is_teardown() {
                debug!(step = index, %label, "skipped after abort");
                scope.publish(EventPayload::StepSkipped {
                    index,
                    label: label.clone(),
                });
                report.steps.push(StepRecord {
                    index,
                    label,
                    outcome: StepOutcome::Skipped,
                });
                continue;
            }

            info!(task = %self.name, step = index, "{label}");
            scope.publish(EventPayload::StepStarted {
                index,
                label: label.clone(),
            });

            let outcome = match execute(step, &label, scope) {
                Ok(Effect::Done) => {
                    scope.publish(EventPayload::StepCompleted {
                        index,
                        label: label.clone(),
                    });
                    StepOutcome::Completed
                }
                Ok(Effect::Ignored(e)) => StepOutcome::Ignored(e),
                Err(e) if !e.is_fatal() => {
                    warn!(step = index, %label, error = %e, "step error ignored");
                    StepOutcome::Ignored(e)
                }
                Err(e) => {
                    error!(step = index, %label, error = %e, "step failed");
                    scope.publish(EventPayload::StepFailed {
                        index,
                        label: label.clone(),
                        error: e.to_string(),
                    });
                    if report.fault.is_none() {
                        scope.publish(EventPayload::SequenceAborted {
                            task: self.name.clone(),
                            error: e.to_string(),
                        });
                        report.fault = Some(e.clone());
                    }
                    StepOutcome::Failed(e)
                }
            };
            report.steps.push(StepRecord {
                index,
                label,
                outcome,
            });
        }

        scope.publish(EventPayload::SequenceFinished {
            task: self.name.clone(),
            completed: report.completed(),
            skipped: report.skipped(),
        });
        match &report.fault {
            None => info!(task = %self.name, steps = report.steps.len(), "task finished"),
            Some(fault) => warn!(task = %self.name, %fault, skipped = report.skipped(), "task aborted"),
        }
        report
    }
}

fn execute(step: &Step, label: &str, scope: &mut TaskScope) -> Result<Effect, RivetError> {
    match step {
        Step::Motion { target, .. } => {
            let request = target.request(label, scope)?;
            scope.gate().dispatch(&request)?;
            Ok(Effect::Done)
        }
        Step::CompliantMotion {
            target, profile, ..
        } => {
            let request = target.request(label, scope)?.with_compliance(*profile);
            scope.gate().dispatch(&request)?;
            Ok(Effect::Done)
        }
        Step::ArmObserver {
            observer,
            threshold,
            handler,
        } => {
            scope.arm_observer(observer, *threshold, ForceHandler::clone(handler))?;
            Ok(Effect::Done)
        }
        Step::DisarmObserver { observer } => {
            scope.disarm_observer(observer);
            Ok(Effect::Done)
        }
        Step::StartRecording(config) => Ok(scope.start_recording(config.clone())?.into()),
        Step::StopRecording => Ok(scope.stop_recording()?.into()),
        Step::HoldAndWait { profile, message } => {
            hold_and_wait_for_ack(scope.gate(), scope.prompt(), *profile, message)?;
            Ok(Effect::Done)
        }
    }
}

impl From<Option<RivetError>> for Effect {
    fn from(ignored: Option<RivetError>) -> Self {
        match ignored {
            Some(e) => Effect::Ignored(e),
            None => Effect::Done,
        }
    }
}
