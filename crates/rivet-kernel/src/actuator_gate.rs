//! [`ActuatorGate`] – single-writer front of the motion controller.
//!
//! The sequencer and observer handlers both issue motions, from different
//! threads. Every motion passes through [`ActuatorGate::dispatch`] or
//! [`ActuatorGate::dispatch_async`], which:
//!
//! 1. validates the request with the [`SegmentVerifier`];
//! 2. takes exclusive ownership of the actuator, or applies the
//!    [`BusyPolicy`] when another motion already holds it;
//! 3. forwards the request to the [`MotionController`].
//!
//! A blocking motion owns the actuator until it returns. An asynchronous
//! motion owns it until its [`AsyncMotionHandle`] is cancelled.
//!
//! # Example
//!
//! ```
//! use std::sync::Arc;
//! use rivet_hal::sim::SimMotionController;
//! use rivet_kernel::{ActuatorGate, BusyPolicy, SegmentVerifier};
//! use rivet_types::{JointPosition, MotionRequest, Waypoint};
//!
//! let controller = Arc::new(SimMotionController::new("lbr"));
//! let gate = ActuatorGate::new(controller.clone(), SegmentVerifier::standard(), BusyPolicy::Queue);
//!
//! let home = Waypoint::new("home", JointPosition([0.0; 7]), 0.3).unwrap();
//! gate.dispatch(&MotionRequest::joint("move to home", home)).unwrap();
//! assert_eq!(controller.labels(), vec!["move to home"]);
//! ```

use std::fmt;
use std::str::FromStr;
use std::sync::{Arc, Condvar, Mutex, MutexGuard, PoisonError};

use rivet_hal::{AsyncMotionHandle, MotionController};
use rivet_types::{Completion, Frame, MotionRequest, RivetError};
use serde::{Deserialize, Serialize};
use tracing::{debug, info, instrument, warn};

use crate::segment_verifier::SegmentVerifier;

/// What happens when a motion arrives while another one owns the actuator.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum BusyPolicy {
    /// Block the caller until the current motion releases the actuator.
    #[default]
    Queue,
    /// Fail immediately with [`RivetError::ActuatorBusy`].
    Reject,
}

impl fmt::Display for BusyPolicy {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            BusyPolicy::Queue => f.write_str("queue"),
            BusyPolicy::Reject => f.write_str("reject"),
        }
    }
}

impl FromStr for BusyPolicy {
    type Err = RivetError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.trim().to_ascii_lowercase().as_str() {
            "queue" => Ok(BusyPolicy::Queue),
            "reject" => Ok(BusyPolicy::Reject),
            other => Err(RivetError::Config(format!(
                "unknown busy policy '{other}' (expected 'queue' or 'reject')"
            ))),
        }
    }
}

// ────────────────────────────────────────────────────────────────────────────
// Ownership slot
// ────────────────────────────────────────────────────────────────────────────

#[derive(Default)]
struct OwnerSlot {
    holder: Mutex<Option<String>>,
    freed: Condvar,
}

impl OwnerSlot {
    fn lock(&self) -> MutexGuard<'_, Option<String>> {
        self.holder.lock().unwrap_or_else(PoisonError::into_inner)
    }
}

/// Exclusive ownership of the actuator; released on drop.
struct Lease {
    slot: Arc<OwnerSlot>,
}

impl Drop for Lease {
    fn drop(&mut self) {
        let released = self.slot.lock().take();
        debug!(holder = ?released, "actuator released");
        self.slot.freed.notify_all();
    }
}

// ────────────────────────────────────────────────────────────────────────────
// Gate
// ────────────────────────────────────────────────────────────────────────────

/// The only path from the runtime to the [`MotionController`].
pub struct ActuatorGate {
    controller: Arc<dyn MotionController>,
    verifier: SegmentVerifier,
    policy: BusyPolicy,
    slot: Arc<OwnerSlot>,
}

impl ActuatorGate {
    pub fn new(
        controller: Arc<dyn MotionController>,
        verifier: SegmentVerifier,
        policy: BusyPolicy,
    ) -> Self {
        Self {
            controller,
            verifier,
            policy,
            slot: Arc::new(OwnerSlot::default()),
        }
    }

    pub fn policy(&self) -> BusyPolicy {
        self.policy
    }

    pub fn controller_id(&self) -> &str {
        self.controller.id()
    }

    /// Label of the motion currently owning the actuator, if any.
    pub fn holder(&self) -> Option<String> {
        self.slot.lock().clone()
    }

    /// Verify, acquire the actuator and execute `request`, blocking until
    /// the controller reports completion or a fault.
    ///
    /// # Errors
    ///
    /// - [`RivetError::InvalidProfile`] / [`RivetError::Motion`] – a rule
    ///   rejected the request before dispatch.
    /// - [`RivetError::ActuatorBusy`] – [`BusyPolicy::Reject`] and another
    ///   motion owns the actuator.
    /// - [`RivetError::Motion`] – the controller reported a fault.
    #[instrument(
        skip(self, request),
        fields(label = %request.label, kind = request.segment.kind(), compliant = request.is_compliant())
    )]
    pub fn dispatch(&self, request: &MotionRequest) -> Result<Completion, RivetError> {
        self.verifier.verify(request)?;
        let _lease = self.acquire(request)?;
        let completion = self.controller.execute(request).map_err(|fault| {
            warn!(%fault, "motion failed");
            RivetError::Motion(fault)
        })?;
        debug!(elapsed_ms = completion.elapsed_ms, "motion complete");
        Ok(completion)
    }

    /// Verify, acquire the actuator and start `request` without waiting for
    /// it to finish. The actuator stays owned until the returned handle is
    /// cancelled or dropped.
    #[instrument(
        skip(self, request),
        fields(label = %request.label, kind = request.segment.kind())
    )]
    pub fn dispatch_async(&self, request: &MotionRequest) -> Result<AsyncMotionHandle, RivetError> {
        self.verifier.verify(request)?;
        let lease = self.acquire(request)?;
        let handle = self.controller.execute_async(request)?;
        debug!("async motion running");
        Ok(handle.on_release(move || drop(lease)))
    }

    /// Read the flange pose. Does not take ownership of the actuator.
    pub fn current_pose(&self) -> Result<Frame, RivetError> {
        Ok(self.controller.current_pose()?)
    }

    /// Forward an external stop to the controller, bypassing the queue.
    pub fn external_stop(&self) {
        info!(controller = %self.controller.id(), "external stop requested");
        self.controller.external_stop();
    }

    fn acquire(&self, request: &MotionRequest) -> Result<Lease, RivetError> {
        let mut holder = self.slot.lock();
        loop {
            let current = holder.clone();
            match current {
                None => break,
                Some(current) => match self.policy {
                    BusyPolicy::Reject => {
                        warn!(requested = %request.label, holder = %current, "actuator busy, rejecting");
                        return Err(RivetError::ActuatorBusy {
                            requested: request.label.clone(),
                            holder: current,
                        });
                    }
                    BusyPolicy::Queue => {
                        debug!(requested = %request.label, holder = %current, "actuator busy, queueing");
                        holder = self
                            .slot
                            .freed
                            .wait(holder)
                            .unwrap_or_else(PoisonError::into_inner);
                    }
                },
            }
        }
        *holder = Some(request.label.clone());
        Ok(Lease {
            slot: Arc::clone(&self.slot),
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use rivet_hal::sim::SimMotionController;
    use rivet_types::{ComplianceProfile, JointPosition, MotionFault, MotionScale, Waypoint};
    use std::thread;
    use std::time::Duration;

    fn home() -> Waypoint {
        Waypoint::new("home", JointPosition([0.0; 7]), 0.3).unwrap()
    }

    fn gate_with(policy: BusyPolicy, step: Duration) -> (Arc<SimMotionController>, Arc<ActuatorGate>) {
        let controller = Arc::new(SimMotionController::new("lbr").with_step_time(step));
        let gate = ActuatorGate::new(controller.clone(), SegmentVerifier::standard(), policy);
        (controller, Arc::new(gate))
    }

    #[test]
    fn queued_motions_never_overlap() {
        let (controller, gate) = gate_with(BusyPolicy::Queue, Duration::from_millis(30));

        let workers: Vec<_> = (0..3)
            .map(|i| {
                let gate = Arc::clone(&gate);
                thread::spawn(move || gate.dispatch(&MotionRequest::joint(format!("move {i}"), home())))
            })
            .collect();
        for w in workers {
            assert!(w.join().unwrap().is_ok());
        }

        assert_eq!(controller.commands().len(), 3);
        assert_eq!(controller.peak_concurrency(), 1);
        assert_eq!(gate.holder(), None);
    }

    #[test]
    fn reject_policy_surfaces_actuator_busy() {
        let (controller, gate) = gate_with(BusyPolicy::Reject, Duration::from_millis(1));
        let soft = ComplianceProfile::new(2500.0, 2500.0, 2500.0).unwrap();

        let mut hold = gate.dispatch_async(&MotionRequest::hold("hold", soft)).unwrap();
        assert_eq!(gate.holder().as_deref(), Some("hold"));

        let err = gate
            .dispatch(&MotionRequest::joint("return home", home()))
            .unwrap_err();
        assert_eq!(
            err,
            RivetError::ActuatorBusy {
                requested: "return home".into(),
                holder: "hold".into()
            }
        );

        hold.cancel();
        assert!(gate.dispatch(&MotionRequest::joint("return home", home())).is_ok());
        assert_eq!(controller.labels(), vec!["hold", "return home"]);
    }

    #[test]
    fn queue_waits_for_async_release() {
        let (controller, gate) = gate_with(BusyPolicy::Queue, Duration::from_millis(1));
        let soft = ComplianceProfile::new(2500.0, 2500.0, 2500.0).unwrap();
        let mut hold = gate.dispatch_async(&MotionRequest::hold("hold", soft)).unwrap();

        let g = Arc::clone(&gate);
        let waiter = thread::spawn(move || g.dispatch(&MotionRequest::joint("lift", home())));
        thread::sleep(Duration::from_millis(50));
        assert_eq!(controller.labels(), vec!["hold"], "lift must wait for the hold");

        hold.cancel();
        assert!(waiter.join().unwrap().is_ok());
        assert_eq!(controller.labels(), vec!["hold", "lift"]);
    }

    #[test]
    fn controller_fault_releases_the_actuator() {
        let controller = Arc::new(
            SimMotionController::new("lbr")
                .fail_on("push", MotionFault::Unreachable("outside workspace".into())),
        );
        let gate = ActuatorGate::new(controller.clone(), SegmentVerifier::standard(), BusyPolicy::Reject);

        let push = MotionRequest::spline("push", vec![Frame::default()], MotionScale::joint(0.4));
        assert!(matches!(
            gate.dispatch(&push),
            Err(RivetError::Motion(MotionFault::Unreachable(_)))
        ));
        assert_eq!(gate.holder(), None);
        assert!(gate.dispatch(&MotionRequest::joint("home", home())).is_ok());
    }

    #[test]
    fn rejected_request_never_reaches_controller() {
        let (controller, gate) = gate_with(BusyPolicy::Queue, Duration::from_millis(1));
        let wild = Waypoint::new("wild", JointPosition([0.0, 3.0, 0.0, 0.0, 0.0, 0.0, 0.0]), 0.3).unwrap();
        assert!(gate.dispatch(&MotionRequest::joint("wild", wild)).is_err());
        assert!(controller.commands().is_empty());
    }

    #[test]
    fn dispatched_profile_is_the_issued_profile() {
        let (controller, gate) = gate_with(BusyPolicy::Queue, Duration::from_millis(1));
        let profile = ComplianceProfile::new(1500.0, 700.0, 2500.0).unwrap();
        let request = MotionRequest::spline("line", vec![Frame::default()], MotionScale::joint(0.15))
            .with_compliance(profile);
        gate.dispatch(&request).unwrap();

        let seen = controller.commands();
        assert_eq!(seen[0].id, request.id);
        assert_eq!(seen[0].compliance, Some(profile));
    }

    #[test]
    fn busy_policy_parses_from_config_strings() {
        assert_eq!("Queue".parse::<BusyPolicy>().unwrap(), BusyPolicy::Queue);
        assert_eq!(" reject ".parse::<BusyPolicy>().unwrap(), BusyPolicy::Reject);
        assert!("drop".parse::<BusyPolicy>().is_err());
        assert_eq!(serde_json::to_string(&BusyPolicy::Reject).unwrap(), "\"reject\"");
    }
}
