//! [`SegmentVerifier`] – pre-dispatch rule engine.
//!
//! Before a [`MotionRequest`] reaches the controller, pass it through
//! [`SegmentVerifier::verify`]. Every registered [`Rule`] is evaluated in
//! order; the first violation is returned and the request is **not**
//! dispatched.
//!
//! Built-in rules:
//! - [`MotionScaleRule`] – velocity, jerk and Cartesian speed are in range.
//! - [`JointLimitRule`] – joint targets stay inside the axis limits.
//! - [`SplinePathRule`] – a spline has at least one frame.
//! - [`HoldComplianceRule`] – a hold carries a compliance profile.

use rivet_types::{JOINT_COUNT, MotionFault, MotionRequest, MotionSegment, RivetError};

// ────────────────────────────────────────────────────────────────────────────
// Rule trait
// ────────────────────────────────────────────────────────────────────────────

/// A single invariant a motion request must satisfy.
pub trait Rule: Send + Sync {
    /// Human-readable name used in logs.
    fn name(&self) -> &str;

    fn check(&self, request: &MotionRequest) -> Result<(), RivetError>;
}

// ────────────────────────────────────────────────────────────────────────────
// SegmentVerifier
// ────────────────────────────────────────────────────────────────────────────

/// Rule engine that validates a [`MotionRequest`] against all registered
/// [`Rule`]s before it is dispatched.
///
/// # Example
///
/// ```
/// use rivet_kernel::SegmentVerifier;
/// use rivet_types::{JointPosition, MotionRequest, Waypoint};
///
/// let verifier = SegmentVerifier::standard();
///
/// let home = Waypoint::new(
///     "home",
///     JointPosition::from_degrees([0.0, 0.0, 0.0, -90.0, 0.0, 90.0, 0.0]),
///     0.3,
/// ).unwrap();
/// assert!(verifier.verify(&MotionRequest::joint("home", home)).is_ok());
///
/// let twisted = Waypoint::new(
///     "twisted",
///     JointPosition::from_degrees([0.0, 130.0, 0.0, 0.0, 0.0, 0.0, 0.0]),
///     0.3,
/// ).unwrap();
/// assert!(verifier.verify(&MotionRequest::joint("twisted", twisted)).is_err());
/// ```
#[derive(Default)]
pub struct SegmentVerifier {
    rules: Vec<Box<dyn Rule>>,
}

impl SegmentVerifier {
    /// Create an empty verifier with no rules.
    pub fn new() -> Self {
        Self::default()
    }

    /// Every built-in rule, with LBR iiwa 14 R820 joint limits.
    pub fn standard() -> Self {
        let mut verifier = Self::new();
        verifier.add_rule(Box::new(MotionScaleRule));
        verifier.add_rule(Box::new(SplinePathRule));
        verifier.add_rule(Box::new(HoldComplianceRule));
        verifier.add_rule(Box::new(JointLimitRule::lbr_iiwa_14()));
        verifier
    }

    /// Register a new [`Rule`]. Rules are evaluated in insertion order.
    pub fn add_rule(&mut self, rule: Box<dyn Rule>) {
        self.rules.push(rule);
    }

    pub fn rule_names(&self) -> Vec<&str> {
        self.rules.iter().map(|r| r.name()).collect()
    }

    /// Validate `request` against every registered rule.
    pub fn verify(&self, request: &MotionRequest) -> Result<(), RivetError> {
        for rule in &self.rules {
            rule.check(request)?;
        }
        Ok(())
    }
}

// ────────────────────────────────────────────────────────────────────────────
// Built-in rules
// ────────────────────────────────────────────────────────────────────────────

/// Relative velocity and jerk in `(0, 1]`, Cartesian velocity positive.
pub struct MotionScaleRule;

impl Rule for MotionScaleRule {
    fn name(&self) -> &str {
        "motion_scale"
    }

    fn check(&self, request: &MotionRequest) -> Result<(), RivetError> {
        request.scale.validate(&request.label)
    }
}

pub struct SplinePathRule;

impl Rule for SplinePathRule {
    fn name(&self) -> &str {
        "spline_path"
    }

    fn check(&self, request: &MotionRequest) -> Result<(), RivetError> {
        match &request.segment {
            MotionSegment::Spline(frames) if frames.is_empty() => Err(RivetError::InvalidProfile(
                format!("{}: spline has no frames", request.label),
            )),
            _ => Ok(()),
        }
    }
}

/// A hold without stiffness would just be a rigid stop.
pub struct HoldComplianceRule;

impl Rule for HoldComplianceRule {
    fn name(&self) -> &str {
        "hold_compliance"
    }

    fn check(&self, request: &MotionRequest) -> Result<(), RivetError> {
        if matches!(request.segment, MotionSegment::Hold) && !request.is_compliant() {
            return Err(RivetError::InvalidProfile(format!(
                "{}: hold motion needs a compliance profile",
                request.label
            )));
        }
        Ok(())
    }
}

/// Symmetric per-axis limits for joint-space targets.
pub struct JointLimitRule {
    /// Absolute limit per axis, radians.
    pub limits_rad: [f64; JOINT_COUNT],
}

impl JointLimitRule {
    /// ±170°, ±120°, ±170°, ±120°, ±170°, ±120°, ±175°.
    pub fn lbr_iiwa_14() -> Self {
        Self {
            limits_rad: [170.0, 120.0, 170.0, 120.0, 170.0, 120.0, 175.0].map(f64::to_radians),
        }
    }
}

impl Rule for JointLimitRule {
    fn name(&self) -> &str {
        "joint_limit"
    }

    fn check(&self, request: &MotionRequest) -> Result<(), RivetError> {
        let MotionSegment::Joint(waypoint) = &request.segment else {
            return Ok(());
        };
        for (axis, (angle, limit)) in waypoint
            .joints()
            .radians()
            .iter()
            .zip(self.limits_rad.iter())
            .enumerate()
        {
            if !angle.is_finite() || angle.abs() > *limit {
                return Err(MotionFault::JointLimitExceeded {
                    joint: axis + 1,
                    details: format!(
                        "waypoint '{}' asks for {:.2}° beyond ±{:.0}°",
                        waypoint.name(),
                        angle.to_degrees(),
                        limit.to_degrees()
                    ),
                }
                .into());
            }
        }
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use rivet_types::{ComplianceProfile, Frame, JointPosition, MotionScale, Waypoint};

    fn joint(degrees: [f64; 7]) -> MotionRequest {
        MotionRequest::joint(
            "move",
            Waypoint::new("target", JointPosition::from_degrees(degrees), 0.1).unwrap(),
        )
    }

    // ------------------------------------------------------------------ JointLimitRule

    #[test]
    fn pick_and_place_home_is_within_limits() {
        let v = SegmentVerifier::standard();
        assert!(v.verify(&joint([-90.0, 38.47, 0.0, -109.08, 0.0, -53.02, 142.93])).is_ok());
    }

    #[test]
    fn axis_beyond_limit_names_the_axis() {
        let v = SegmentVerifier::standard();
        let err = v.verify(&joint([0.0, 0.0, 0.0, -121.0, 0.0, 0.0, 0.0])).unwrap_err();
        assert!(matches!(
            err,
            RivetError::Motion(MotionFault::JointLimitExceeded { joint: 4, .. })
        ));
    }

    #[test]
    fn limit_is_inclusive() {
        let v = SegmentVerifier::standard();
        assert!(v.verify(&joint([170.0, 0.0, 0.0, 0.0, 0.0, 0.0, -175.0])).is_ok());
    }

    // ------------------------------------------------------------------ other rules

    #[test]
    fn empty_spline_is_rejected() {
        let v = SegmentVerifier::standard();
        let req = MotionRequest::spline("line", Vec::new(), MotionScale::joint(0.15));
        assert!(matches!(v.verify(&req), Err(RivetError::InvalidProfile(_))));
    }

    #[test]
    fn bad_jerk_is_rejected() {
        let v = SegmentVerifier::standard();
        let mut scale = MotionScale::joint(0.15);
        scale.joint_jerk_rel = Some(1.5);
        let req = MotionRequest::spline("line", vec![Frame::default()], scale);
        assert!(v.verify(&req).is_err());
    }

    #[test]
    fn hold_without_compliance_is_rejected() {
        let v = SegmentVerifier::standard();
        let mut req = MotionRequest::hold("hold", ComplianceProfile::new(1.0, 1.0, 1.0).unwrap());
        assert!(v.verify(&req).is_ok());
        req.compliance = None;
        assert!(v.verify(&req).is_err());
    }

    #[test]
    fn empty_verifier_accepts_everything() {
        let v = SegmentVerifier::new();
        assert!(v.rule_names().is_empty());
        assert!(v.verify(&joint([179.0; 7])).is_ok());
    }
}
