//! Motion requests as handed to the motion controller.

use serde::{Deserialize, Serialize};
use uuid::Uuid;

use crate::geometry::{Frame, Waypoint, check_velocity_scale};
use crate::RivetError;

// ────────────────────────────────────────────────────────────────────────────
// Compliance
// ────────────────────────────────────────────────────────────────────────────

/// Cartesian impedance stiffness along X, Y and Z (N/m).
///
/// Zero means free along that axis; values around 2000 and above behave
/// close to rigid. The profile is `Copy` and has no setters, so a request
/// always carries exactly the values it was built with.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
#[serde(try_from = "RawStiffness")]
pub struct ComplianceProfile {
    stiffness_x: f64,
    stiffness_y: f64,
    stiffness_z: f64,
}

#[derive(Deserialize)]
struct RawStiffness {
    stiffness_x: f64,
    stiffness_y: f64,
    stiffness_z: f64,
}

impl TryFrom<RawStiffness> for ComplianceProfile {
    type Error = RivetError;

    fn try_from(raw: RawStiffness) -> Result<Self, Self::Error> {
        ComplianceProfile::new(raw.stiffness_x, raw.stiffness_y, raw.stiffness_z)
    }
}

impl ComplianceProfile {
    /// # Errors
    ///
    /// [`RivetError::InvalidProfile`] when any stiffness is negative or not finite.
    pub fn new(x: f64, y: f64, z: f64) -> Result<Self, RivetError> {
        for (axis, value) in [("x", x), ("y", y), ("z", z)] {
            if !value.is_finite() || value < 0.0 {
                return Err(RivetError::InvalidProfile(format!(
                    "stiffness along {axis} must be a non-negative number, got {value}"
                )));
            }
        }
        Ok(Self {
            stiffness_x: x,
            stiffness_y: y,
            stiffness_z: z,
        })
    }

    pub fn stiffness_x(&self) -> f64 {
        self.stiffness_x
    }

    pub fn stiffness_y(&self) -> f64 {
        self.stiffness_y
    }

    pub fn stiffness_z(&self) -> f64 {
        self.stiffness_z
    }
}

// ────────────────────────────────────────────────────────────────────────────
// Segments and requests
// ────────────────────────────────────────────────────────────────────────────

/// Speed limits attached to a segment.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct MotionScale {
    /// Fraction of the maximum joint velocity, in `(0, 1]`.
    pub joint_velocity_rel: f64,
    /// Fraction of the maximum joint jerk, spline motions only.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub joint_jerk_rel: Option<f64>,
    /// Cartesian path velocity in mm/s, spline motions only.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub cart_velocity: Option<f64>,
}

impl MotionScale {
    pub fn joint(joint_velocity_rel: f64) -> Self {
        Self {
            joint_velocity_rel,
            joint_jerk_rel: None,
            cart_velocity: None,
        }
    }

    pub fn validate(&self, owner: &str) -> Result<(), RivetError> {
        check_velocity_scale(owner, self.joint_velocity_rel)?;
        if let Some(jerk) = self.joint_jerk_rel {
            check_velocity_scale(owner, jerk)?;
        }
        if let Some(v) = self.cart_velocity {
            if !v.is_finite() || v <= 0.0 {
                return Err(RivetError::InvalidProfile(format!(
                    "{owner}: cartesian velocity {v} must be positive"
                )));
            }
        }
        Ok(())
    }
}

impl Default for MotionScale {
    fn default() -> Self {
        Self::joint(1.0)
    }
}

/// What the controller is asked to do.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "kind", content = "target")]
pub enum MotionSegment {
    /// Point-to-point move in joint space.
    Joint(Waypoint),
    /// Cartesian spline through the listed flange frames, in order.
    Spline(Vec<Frame>),
    /// Stay in place; only meaningful together with a compliance profile.
    Hold,
}

impl MotionSegment {
    pub fn kind(&self) -> &'static str {
        match self {
            MotionSegment::Joint(_) => "joint",
            MotionSegment::Spline(_) => "spline",
            MotionSegment::Hold => "hold",
        }
    }
}

/// A fully resolved motion command.
///
/// Built by the sequencer immediately before dispatch and consumed by the
/// controller; the compliance profile is stored by value so it cannot change
/// between issuance and execution.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct MotionRequest {
    pub id: Uuid,
    /// Operator-facing description, e.g. `"move to home"`.
    pub label: String,
    pub segment: MotionSegment,
    pub compliance: Option<ComplianceProfile>,
    pub scale: MotionScale,
}

impl MotionRequest {
    /// Joint move at the waypoint's own velocity scale.
    pub fn joint(label: impl Into<String>, waypoint: Waypoint) -> Self {
        let scale = MotionScale::joint(waypoint.velocity_scale());
        Self::new(label, MotionSegment::Joint(waypoint), scale)
    }

    pub fn spline(label: impl Into<String>, frames: Vec<Frame>, scale: MotionScale) -> Self {
        Self::new(label, MotionSegment::Spline(frames), scale)
    }

    pub fn hold(label: impl Into<String>, profile: ComplianceProfile) -> Self {
        Self::new(label, MotionSegment::Hold, MotionScale::default()).with_compliance(profile)
    }

    fn new(label: impl Into<String>, segment: MotionSegment, scale: MotionScale) -> Self {
        Self {
            id: Uuid::new_v4(),
            label: label.into(),
            segment,
            compliance: None,
            scale,
        }
    }

    pub fn with_compliance(mut self, profile: ComplianceProfile) -> Self {
        self.compliance = Some(profile);
        self
    }

    pub fn is_compliant(&self) -> bool {
        self.compliance.is_some()
    }
}

/// Reported by the controller when a blocking motion finishes normally.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Completion {
    pub request_id: Uuid,
    pub elapsed_ms: u64,
}

/// How the operator resolved a modal prompt.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum Acknowledgment {
    Confirmed,
    Dismissed,
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::geometry::JointPosition;

    #[test]
    fn negative_stiffness_is_rejected() {
        assert!(ComplianceProfile::new(2500.0, 2500.0, 300.0).is_ok());
        assert!(ComplianceProfile::new(0.0, 0.0, 0.0).is_ok());
        let err = ComplianceProfile::new(2500.0, -1.0, 300.0).unwrap_err();
        assert!(err.to_string().contains("along y"));
        assert!(ComplianceProfile::new(f64::INFINITY, 0.0, 0.0).is_err());
    }

    #[test]
    fn stiffness_deserializes_through_validation() {
        let ok: ComplianceProfile =
            serde_json::from_str(r#"{"stiffness_x":1500,"stiffness_y":700,"stiffness_z":2500}"#)
                .unwrap();
        assert_eq!(ok.stiffness_y(), 700.0);
        let bad = serde_json::from_str::<ComplianceProfile>(
            r#"{"stiffness_x":-1,"stiffness_y":700,"stiffness_z":2500}"#,
        );
        assert!(bad.is_err());
    }

    #[test]
    fn joint_request_takes_waypoint_speed() {
        let wp = Waypoint::new("home", JointPosition([0.0; 7]), 0.3).unwrap();
        let req = MotionRequest::joint("move to home", wp);
        assert_eq!(req.scale.joint_velocity_rel, 0.3);
        assert!(!req.is_compliant());
        assert_eq!(req.segment.kind(), "joint");
    }

    #[test]
    fn scale_validation_covers_spline_fields() {
        let mut scale = MotionScale::joint(0.15);
        scale.joint_jerk_rel = Some(0.5);
        scale.cart_velocity = Some(250.0);
        assert!(scale.validate("line").is_ok());
        scale.cart_velocity = Some(0.0);
        assert!(scale.validate("line").is_err());
    }
}
