//! The four task programs, expressed as step lists.
//!
//! | Scenario | Plan |
//! |---|---|
//! | `compliance` | home → record → compliant line → stop |
//! | `straight-line` | record → home → compliant line → stop |
//! | `listener` | home → record → arm → compliant push → disarm → stop |
//! | `pick-and-place` | home → record → pick under operator hold → arm → compliant install → disarm → stop |

use std::sync::Arc;

use rivet_kernel::ActuatorGate;
use rivet_types::{MotionRequest, RivetError, Waypoint};
use tracing::info;

use crate::force_observer::{ForceHandler, TriggerContext};
use crate::profile::{ObserverSpec, ScenarioKind, TaskProfile, names};
use crate::sequencer::{MotionTarget, Step};
use crate::waypoints::WaypointTable;

/// Build the step list for `profile.scenario`.
///
/// # Errors
///
/// [`RivetError::UnknownWaypoint`] or [`RivetError::InvalidProfile`] when
/// the profile lacks something the plan needs.
pub fn build_plan(
    profile: &TaskProfile,
    table: &WaypointTable,
    gate: &Arc<ActuatorGate>,
) -> Result<Vec<Step>, RivetError> {
    match profile.scenario {
        ScenarioKind::Compliance => straight_line(profile, table, false),
        ScenarioKind::StraightLine => straight_line(profile, table, true),
        ScenarioKind::Listener => listener(profile, table, gate),
        ScenarioKind::PickAndPlace => pick_and_place(profile, table, gate),
    }
}

fn joint(table: &WaypointTable, name: &str) -> Result<MotionTarget, RivetError> {
    Ok(MotionTarget::Joint(table.get(name)?.clone()))
}

fn path(profile: &TaskProfile) -> Result<MotionTarget, RivetError> {
    let spline = profile.spline.as_ref().ok_or_else(|| {
        RivetError::InvalidProfile(format!("{}: no spline section", profile.scenario))
    })?;
    Ok(MotionTarget::Path {
        overrides: spline.path.clone(),
        scale: spline.scale(),
    })
}

fn observer(profile: &TaskProfile) -> Result<&ObserverSpec, RivetError> {
    profile.observer.as_ref().ok_or_else(|| {
        RivetError::InvalidProfile(format!("{}: no observer section", profile.scenario))
    })
}

/// A handler that drives the arm to `target` through the gate.
fn return_handler(
    gate: &Arc<ActuatorGate>,
    target: Waypoint,
    label: &'static str,
    announce: &'static str,
) -> ForceHandler {
    let gate = Arc::clone(gate);
    Arc::new(move |ctx: &TriggerContext| {
        info!(
            observer = %ctx.observer,
            magnitude = ctx.magnitude,
            missed = ctx.missed_samples,
            "{announce}"
        );
        gate.dispatch(&MotionRequest::joint(label, target.clone()))?;
        Ok(())
    })
}

fn straight_line(
    profile: &TaskProfile,
    table: &WaypointTable,
    record_first: bool,
) -> Result<Vec<Step>, RivetError> {
    let home = Step::motion("move to home", joint(table, names::HOME)?);
    let record = Step::StartRecording(profile.recording.session_config()?);
    let (first, second) = if record_first { (record, home) } else { (home, record) };
    Ok(vec![
        first,
        second,
        Step::compliant("straight line", path(profile)?, profile.stiffness.profile()?),
        Step::StopRecording,
    ])
}

fn listener(
    profile: &TaskProfile,
    table: &WaypointTable,
    gate: &Arc<ActuatorGate>,
) -> Result<Vec<Step>, RivetError> {
    let spec = observer(profile)?;
    let back = table.get(&spec.return_to)?.with_velocity_scale(spec.velocity_scale)?;
    Ok(vec![
        Step::motion("move to home", joint(table, names::HOME)?),
        Step::StartRecording(profile.recording.session_config()?),
        Step::arm(
            spec.name.clone(),
            spec.threshold,
            return_handler(gate, back, "return to home", "bubble popped, returning home"),
        ),
        Step::compliant("push", path(profile)?, profile.stiffness.profile()?),
        Step::disarm(spec.name.clone()),
        Step::StopRecording,
    ])
}

fn pick_and_place(
    profile: &TaskProfile,
    table: &WaypointTable,
    gate: &Arc<ActuatorGate>,
) -> Result<Vec<Step>, RivetError> {
    use names::*;

    let spec = observer(profile)?;
    let stiffness = profile.stiffness.profile()?;
    let back = table.get(&spec.return_to)?.with_velocity_scale(spec.velocity_scale)?;
    let message = profile.hold_message.clone().ok_or_else(|| {
        RivetError::InvalidProfile(format!("{}: no hold message", profile.scenario))
    })?;

    Ok(vec![
        Step::motion("move to home", joint(table, HOME)?),
        Step::StartRecording(profile.recording.session_config()?),
        Step::motion("on the way", joint(table, STOPOVER)?),
        Step::motion("approaching", joint(table, PICK_APPROACH)?),
        Step::motion("fetching rivet", joint(table, SUCTION)?),
        Step::hold(stiffness, message),
        Step::motion("lift rivet", joint(table, PICK_APPROACH)?),
        Step::arm(
            spec.name.clone(),
            spec.threshold,
            return_handler(gate, back, "back to place approach", "rivet successfully installed"),
        ),
        Step::motion("in transit", joint(table, STOPOVER)?),
        Step::compliant("getting close", joint(table, PLACE_APPROACH)?, stiffness),
        Step::compliant("closing in", joint(table, PLACE_APPROACH_CLOSER)?, stiffness),
        Step::compliant("install rivet", joint(table, PUSH_IN)?, stiffness),
        Step::disarm(spec.name.clone()),
        Step::StopRecording,
    ])
}
