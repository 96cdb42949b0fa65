//! Joint-space and Cartesian positions.

use serde::{Deserialize, Serialize};

use crate::RivetError;

/// Number of joints on the manipulator (LBR iiwa 14 R820).
pub const JOINT_COUNT: usize = 7;

/// Seven joint angles in radians, ordered from base (A1) to flange (A7).
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct JointPosition(pub [f64; JOINT_COUNT]);

impl JointPosition {
    /// Build a position from angles given in degrees.
    pub fn from_degrees(degrees: [f64; JOINT_COUNT]) -> Self {
        Self(degrees.map(f64::to_radians))
    }

    /// The angles in degrees, mostly useful for logs and config files.
    pub fn to_degrees(&self) -> [f64; JOINT_COUNT] {
        self.0.map(f64::to_degrees)
    }

    pub fn radians(&self) -> &[f64; JOINT_COUNT] {
        &self.0
    }
}

/// A named joint-space target plus the relative joint velocity used to reach it.
///
/// The velocity scale is validated to lie in `(0, 1]` on construction and on
/// deserialization; joint angles are only checked against the arm's limits at
/// dispatch time.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(try_from = "RawWaypoint")]
pub struct Waypoint {
    name: String,
    joints: JointPosition,
    velocity_scale: f64,
}

#[derive(Deserialize)]
struct RawWaypoint {
    name: String,
    joints: JointPosition,
    velocity_scale: f64,
}

impl TryFrom<RawWaypoint> for Waypoint {
    type Error = RivetError;

    fn try_from(raw: RawWaypoint) -> Result<Self, Self::Error> {
        Waypoint::new(raw.name, raw.joints, raw.velocity_scale)
    }
}

impl Waypoint {
    /// Create a waypoint.
    ///
    /// # Errors
    ///
    /// [`RivetError::InvalidProfile`] when `velocity_scale` is not in `(0, 1]`.
    pub fn new(
        name: impl Into<String>,
        joints: JointPosition,
        velocity_scale: f64,
    ) -> Result<Self, RivetError> {
        let name = name.into();
        check_velocity_scale(&name, velocity_scale)?;
        Ok(Self {
            name,
            joints,
            velocity_scale,
        })
    }

    /// Same joint target, different approach speed.
    pub fn with_velocity_scale(&self, velocity_scale: f64) -> Result<Self, RivetError> {
        Self::new(self.name.clone(), self.joints, velocity_scale)
    }

    pub fn name(&self) -> &str {
        &self.name
    }

    pub fn joints(&self) -> &JointPosition {
        &self.joints
    }

    pub fn velocity_scale(&self) -> f64 {
        self.velocity_scale
    }
}

pub(crate) fn check_velocity_scale(owner: &str, scale: f64) -> Result<(), RivetError> {
    if scale > 0.0 && scale <= 1.0 {
        Ok(())
    } else {
        Err(RivetError::InvalidProfile(format!(
            "{owner}: velocity scale {scale} outside (0, 1]"
        )))
    }
}

/// Cartesian pose of the flange: position in millimetres, orientation as
/// A/B/C Euler angles in radians.
#[derive(Debug, Clone, Copy, PartialEq, Default, Serialize, Deserialize)]
pub struct Frame {
    pub x: f64,
    pub y: f64,
    pub z: f64,
    pub a: f64,
    pub b: f64,
    pub c: f64,
}

impl Frame {
    pub fn new(x: f64, y: f64, z: f64, a: f64, b: f64, c: f64) -> Self {
        Self { x, y, z, a, b, c }
    }
}

/// Absolute coordinate overrides applied to a reference frame.
///
/// Spline targets are expressed relative to the pose read at dispatch time:
/// the reference is copied and only the coordinates set here are replaced.
/// Orientation is always kept.
#[derive(Debug, Clone, Copy, PartialEq, Default, Serialize, Deserialize)]
pub struct FrameOverride {
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub x: Option<f64>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub y: Option<f64>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub z: Option<f64>,
}

impl FrameOverride {
    pub fn xyz(x: f64, y: f64, z: f64) -> Self {
        Self {
            x: Some(x),
            y: Some(y),
            z: Some(z),
        }
    }

    pub fn z_only(z: f64) -> Self {
        Self {
            z: Some(z),
            ..Self::default()
        }
    }

    pub fn apply(&self, reference: &Frame) -> Frame {
        Frame {
            x: self.x.unwrap_or(reference.x),
            y: self.y.unwrap_or(reference.y),
            z: self.z.unwrap_or(reference.z),
            ..*reference
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn degrees_convert_to_radians() {
        let home = JointPosition::from_degrees([0.0, 0.0, 0.0, -90.0, 0.0, 90.0, 0.0]);
        assert!((home.radians()[3] + std::f64::consts::FRAC_PI_2).abs() < 1e-12);
        assert!((home.to_degrees()[5] - 90.0).abs() < 1e-9);
    }

    #[test]
    fn velocity_scale_must_be_in_unit_interval() {
        let joints = JointPosition([0.0; JOINT_COUNT]);
        assert!(Waypoint::new("home", joints, 1.0).is_ok());
        assert!(Waypoint::new("home", joints, 0.1).is_ok());
        assert!(Waypoint::new("home", joints, 0.0).is_err());
        assert!(Waypoint::new("home", joints, 1.5).is_err());
        assert!(Waypoint::new("home", joints, f64::NAN).is_err());
    }

    #[test]
    fn deserializing_a_bad_waypoint_fails() {
        let json = r#"{"name":"home","joints":[0,0,0,0,0,0,0],"velocity_scale":2.0}"#;
        assert!(serde_json::from_str::<Waypoint>(json).is_err());
    }

    #[test]
    fn override_keeps_orientation_and_unset_axes() {
        let flange = Frame::new(-50.0, 10.0, 600.0, 0.1, 0.2, 0.3);
        let down = FrameOverride::z_only(250.0).apply(&flange);
        assert_eq!(down, Frame::new(-50.0, 10.0, 250.0, 0.1, 0.2, 0.3));

        let forward = FrameOverride::xyz(-300.0, 0.0, 250.0).apply(&flange);
        assert_eq!((forward.x, forward.y, forward.z), (-300.0, 0.0, 250.0));
        assert_eq!((forward.a, forward.b, forward.c), (0.1, 0.2, 0.3));
    }
}
