//! Compliant position hold while the operator does something by hand.

use std::panic::{AssertUnwindSafe, catch_unwind, resume_unwind};

use rivet_hal::OperatorPrompt;
use rivet_kernel::ActuatorGate;
use rivet_types::{Acknowledgment, ComplianceProfile, MotionRequest, RivetError};
use tracing::{error, info, instrument, warn};

pub const HOLD_LABEL: &str = "hold position";

/// Start an impedance hold, show `message`, and cancel the hold once the
/// prompt returns.
///
/// The hold is cancelled exactly once whatever the prompt does: answer,
/// fail, or panic. A dismissed prompt is treated like a confirmation and
/// logged.
///
/// # Errors
///
/// - Whatever the gate reports if the hold cannot start; no prompt is shown.
/// - The prompt's own error, returned after the hold has been cancelled.
#[instrument(skip(gate, prompt, profile))]
pub fn hold_and_wait_for_ack(
    gate: &ActuatorGate,
    prompt: &dyn OperatorPrompt,
    profile: ComplianceProfile,
    message: &str,
) -> Result<Acknowledgment, RivetError> {
    let mut hold = gate.dispatch_async(&MotionRequest::hold(HOLD_LABEL, profile))?;
    info!("holding position for the operator");

    let answer = catch_unwind(AssertUnwindSafe(|| prompt.prompt_modal(message)));
    let cancelled = hold.cancel();
    if !cancelled {
        warn!("hold had already ended before the operator answered");
    }

    match answer {
        Ok(Ok(Acknowledgment::Confirmed)) => {
            info!("operator confirmed");
            Ok(Acknowledgment::Confirmed)
        }
        Ok(Ok(Acknowledgment::Dismissed)) => {
            warn!("prompt dismissed; continuing");
            Ok(Acknowledgment::Dismissed)
        }
        Ok(Err(e)) => {
            error!(error = %e, "operator prompt failed");
            Err(e)
        }
        Err(panic) => {
            error!("operator prompt panicked; hold released");
            resume_unwind(panic)
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use rivet_hal::sim::{PromptScript, ScriptedPrompt, SimMotionController};
    use rivet_kernel::{BusyPolicy, SegmentVerifier};
    use std::sync::Arc;

    fn setup(prompt: ScriptedPrompt) -> (Arc<SimMotionController>, ActuatorGate, ScriptedPrompt) {
        let controller = Arc::new(SimMotionController::new("lbr"));
        let gate = ActuatorGate::new(controller.clone(), SegmentVerifier::standard(), BusyPolicy::Reject);
        (controller, gate, prompt)
    }

    fn soft() -> ComplianceProfile {
        ComplianceProfile::new(2500.0, 2500.0, 2500.0).unwrap()
    }

    #[test]
    fn confirmed_prompt_cancels_hold_once() {
        let (controller, gate, prompt) = setup(ScriptedPrompt::confirming());
        let ack = hold_and_wait_for_ack(&gate, &prompt, soft(), "Press ok once rivet attached.").unwrap();

        assert_eq!(ack, Acknowledgment::Confirmed);
        assert_eq!(controller.cancel_count(), 1);
        assert_eq!(controller.labels(), vec![HOLD_LABEL]);
        assert_eq!(prompt.messages(), vec!["Press ok once rivet attached."]);
        assert_eq!(gate.holder(), None);
    }

    #[test]
    fn dismissed_prompt_continues() {
        let (controller, gate, prompt) =
            setup(ScriptedPrompt::confirming().then(PromptScript::Answer(Acknowledgment::Dismissed)));
        let ack = hold_and_wait_for_ack(&gate, &prompt, soft(), "ok?").unwrap();
        assert_eq!(ack, Acknowledgment::Dismissed);
        assert_eq!(controller.cancel_count(), 1);
    }

    #[test]
    fn failing_prompt_still_cancels_hold() {
        let (controller, gate, prompt) =
            setup(ScriptedPrompt::confirming().then(PromptScript::Fail("pendant lost".into())));
        let err = hold_and_wait_for_ack(&gate, &prompt, soft(), "ok?").unwrap_err();
        assert_eq!(err, RivetError::Operator("pendant lost".into()));
        assert_eq!(controller.cancel_count(), 1);
        assert_eq!(gate.holder(), None);
    }

    #[test]
    fn panicking_prompt_still_cancels_hold() {
        let (controller, gate, prompt) = setup(ScriptedPrompt::confirming().then(PromptScript::Panic));
        let result = catch_unwind(AssertUnwindSafe(|| {
            hold_and_wait_for_ack(&gate, &prompt, soft(), "ok?")
        }));
        assert!(result.is_err());
        assert_eq!(controller.cancel_count(), 1);
        assert_eq!(gate.holder(), None);
    }

    #[test]
    fn busy_actuator_means_no_prompt() {
        let (controller, gate, prompt) = setup(ScriptedPrompt::confirming());
        let mut other = gate.dispatch_async(&MotionRequest::hold("other", soft())).unwrap();
        assert!(matches!(
            hold_and_wait_for_ack(&gate, &prompt, soft(), "ok?"),
            Err(RivetError::ActuatorBusy { .. })
        ));
        assert!(prompt.messages().is_empty());
        other.cancel();
        assert_eq!(controller.cancel_count(), 1);
    }
}
