use serde::{Deserialize, Serialize};
use thiserror::Error;

/// Faults reported by the motion controller for a single command.
#[derive(Error, Debug, Clone, PartialEq, Serialize, Deserialize)]
pub enum MotionFault {
    #[error("Unreachable target: {0}")]
    Unreachable(String),

    #[error("Joint limit exceeded on A{joint}: {details}")]
    JointLimitExceeded { joint: usize, details: String },

    #[error("Motion aborted by external stop: {0}")]
    ExternalAbort(String),
}

/// Global error type for sequencing, recording and operator interaction.
#[derive(Error, Debug, Clone, PartialEq, Serialize, Deserialize)]
pub enum RivetError {
    #[error("Motion Fault: {0}")]
    Motion(#[from] MotionFault),

    #[error("Actuator busy: '{requested}' refused while '{holder}' is in flight")]
    ActuatorBusy { requested: String, holder: String },

    #[error("Recording session misuse: {0}")]
    SessionUsage(String),

    #[error("Observer '{observer}' missed {count} samples")]
    ObserverMissedSamples { observer: String, count: u64 },

    #[error("Observer '{0}' is already armed")]
    ObserverAlreadyArmed(String),

    #[error("Operator prompt failed: {0}")]
    Operator(String),

    #[error("Recorder Error: {0}")]
    Recorder(String),

    #[error("Unknown waypoint '{0}'")]
    UnknownWaypoint(String),

    #[error("Invalid profile: {0}")]
    InvalidProfile(String),

    #[error("Configuration Error: {0}")]
    Config(String),

    #[error("Runtime Error: {0}")]
    Runtime(String),
}

impl RivetError {
    /// Whether this error must abort the remaining steps of a sequence.
    ///
    /// Usage errors on the recording session, missed observer samples and a
    /// re-arm of an armed observer are reported and the sequence continues.
    pub fn is_fatal(&self) -> bool {
        !matches!(
            self,
            RivetError::SessionUsage(_)
                | RivetError::ObserverMissedSamples { .. }
                | RivetError::ObserverAlreadyArmed(_)
        )
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn motion_faults_are_fatal() {
        let err: RivetError = MotionFault::Unreachable("frame outside workspace".into()).into();
        assert!(err.is_fatal());
        assert!(err.to_string().contains("Unreachable"));

        let busy = RivetError::ActuatorBusy {
            requested: "return home".into(),
            holder: "push".into(),
        };
        assert!(busy.is_fatal());
    }

    #[test]
    fn usage_errors_are_not_fatal() {
        assert!(!RivetError::SessionUsage("double stop".into()).is_fatal());
        assert!(
            !RivetError::ObserverMissedSamples {
                observer: "push".into(),
                count: 3
            }
            .is_fatal()
        );
    }

    #[test]
    fn joint_limit_display_names_the_axis() {
        let fault = MotionFault::JointLimitExceeded {
            joint: 4,
            details: "125° beyond ±120°".into(),
        };
        assert!(fault.to_string().contains("A4"));
    }
}
