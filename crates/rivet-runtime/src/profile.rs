//! Task profiles: every constant a scenario needs, in one serde struct.
//!
//! [`TaskProfile::builtin`] carries the values the cell was commissioned
//! with. A TOML file can replace any scenario's profile wholesale:
//!
//! ```toml
//! [profiles.listener]
//! stiffness = { x = 2500.0, y = 2500.0, z = 2500.0 }
//!
//! [profiles.listener.waypoints.home]
//! joints_deg = [-90.0, 0.0, 0.0, -90.0, 0.0, 90.0, 0.0]
//! velocity_scale = 0.3
//! # ...
//! ```

use std::collections::BTreeMap;
use std::fmt;
use std::path::Path;
use std::str::FromStr;
use std::time::Duration;

use rivet_types::{
    ComplianceProfile, FrameOverride, MotionScale, RecordingChannel, RivetError, SessionConfig,
};
use serde::{Deserialize, Serialize};
use tracing::{debug, info};

/// Waypoint names the built-in scenarios refer to.
pub mod names {
    pub const HOME: &str = "home";
    pub const STOPOVER: &str = "stopover";
    pub const PICK_APPROACH: &str = "pick-approach";
    pub const SUCTION: &str = "suction";
    pub const PLACE_APPROACH: &str = "place-approach";
    pub const PLACE_APPROACH_CLOSER: &str = "place-approach-closer";
    pub const PUSH_IN: &str = "push-in";
}

// ────────────────────────────────────────────────────────────────────────────
// Scenario kind
// ────────────────────────────────────────────────────────────────────────────

/// The four task programs the cell knows how to run.
#[derive(
    Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Default, Serialize, Deserialize,
)]
#[serde(rename_all = "kebab-case")]
pub enum ScenarioKind {
    /// Home, then a compliant straight-line path while recording.
    #[default]
    Compliance,
    /// Same path shape with anisotropic stiffness and a richer recording.
    StraightLine,
    /// A compliant push with a force observer that sends the arm home.
    Listener,
    /// Pick a rivet under operator supervision and press it into place.
    PickAndPlace,
}

impl ScenarioKind {
    pub const ALL: [ScenarioKind; 4] = [
        ScenarioKind::Compliance,
        ScenarioKind::StraightLine,
        ScenarioKind::Listener,
        ScenarioKind::PickAndPlace,
    ];

    pub fn as_str(&self) -> &'static str {
        match self {
            ScenarioKind::Compliance => "compliance",
            ScenarioKind::StraightLine => "straight-line",
            ScenarioKind::Listener => "listener",
            ScenarioKind::PickAndPlace => "pick-and-place",
        }
    }

    pub fn summary(&self) -> &'static str {
        match self {
            ScenarioKind::Compliance => "soft-Z straight line, recorded",
            ScenarioKind::StraightLine => "anisotropic straight line, torques recorded",
            ScenarioKind::Listener => "compliant push; 10 N contact returns home",
            ScenarioKind::PickAndPlace => "rivet pick with operator ack, compliant install",
        }
    }
}

impl fmt::Display for ScenarioKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for ScenarioKind {
    type Err = RivetError;

    /// Accepts kebab-case, snake_case and the run-together form.
    fn from_str(s: &str) -> Result<Self, Self::Err> {
        let key: String = s
            .trim()
            .to_ascii_lowercase()
            .chars()
            .filter(|c| c.is_ascii_alphanumeric())
            .collect();
        match key.as_str() {
            "compliance" => Ok(ScenarioKind::Compliance),
            "straightline" => Ok(ScenarioKind::StraightLine),
            "listener" => Ok(ScenarioKind::Listener),
            "pickandplace" => Ok(ScenarioKind::PickAndPlace),
            _ => Err(RivetError::Config(format!("unknown scenario '{}'", s.trim()))),
        }
    }
}

// ────────────────────────────────────────────────────────────────────────────
// Profile sections
// ────────────────────────────────────────────────────────────────────────────

/// Cartesian stiffness in N/m, checked when the profile is validated.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct StiffnessSpec {
    pub x: f64,
    pub y: f64,
    pub z: f64,
}

impl StiffnessSpec {
    pub fn profile(&self) -> Result<ComplianceProfile, RivetError> {
        ComplianceProfile::new(self.x, self.y, self.z)
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct WaypointSpec {
    pub joints_deg: [f64; rivet_types::JOINT_COUNT],
    pub velocity_scale: f64,
}

impl WaypointSpec {
    fn new(joints_deg: [f64; rivet_types::JOINT_COUNT], velocity_scale: f64) -> Self {
        Self {
            joints_deg,
            velocity_scale,
        }
    }
}

/// A Cartesian path relative to the flange pose read when it starts.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct SplineSpec {
    pub path: Vec<FrameOverride>,
    pub joint_velocity_rel: f64,
    pub joint_jerk_rel: f64,
    /// mm/s
    pub cart_velocity: f64,
}

impl SplineSpec {
    pub fn scale(&self) -> MotionScale {
        MotionScale {
            joint_velocity_rel: self.joint_velocity_rel,
            joint_jerk_rel: Some(self.joint_jerk_rel),
            cart_velocity: Some(self.cart_velocity),
        }
    }
}

/// A force observer armed around the compliant push.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ObserverSpec {
    pub name: String,
    /// Newtons.
    pub threshold: f64,
    /// Waypoint the handler moves to.
    pub return_to: String,
    pub velocity_scale: f64,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct RecordingSpec {
    pub name: String,
    pub channels: Vec<RecordingChannel>,
    pub sample_interval_ms: u64,
    pub timeout_s: u64,
}

impl RecordingSpec {
    /// A fresh session config; every call gets a new id.
    pub fn session_config(&self) -> Result<SessionConfig, RivetError> {
        SessionConfig::new(
            self.name.clone(),
            self.channels.iter().copied(),
            Duration::from_millis(self.sample_interval_ms),
            Duration::from_secs(self.timeout_s),
        )
    }
}

// ────────────────────────────────────────────────────────────────────────────
// TaskProfile
// ────────────────────────────────────────────────────────────────────────────

/// Constants for one scenario.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct TaskProfile {
    /// Filled in from the table key when loaded from a file.
    #[serde(default)]
    pub scenario: ScenarioKind,
    pub stiffness: StiffnessSpec,
    pub waypoints: BTreeMap<String, WaypointSpec>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub spline: Option<SplineSpec>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub observer: Option<ObserverSpec>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub hold_message: Option<String>,
    pub recording: RecordingSpec,
}

const UPRIGHT: [f64; 7] = [0.0, 0.0, 0.0, -90.0, 0.0, 90.0, 0.0];
const UPRIGHT_TURNED: [f64; 7] = [-90.0, 0.0, 0.0, -90.0, 0.0, 90.0, 0.0];

fn recording(name: &str, channels: &[RecordingChannel]) -> RecordingSpec {
    RecordingSpec {
        name: name.to_string(),
        channels: channels.to_vec(),
        sample_interval_ms: 100,
        timeout_s: 45,
    }
}

fn spline(path: Vec<FrameOverride>, joint_velocity_rel: f64) -> SplineSpec {
    SplineSpec {
        path,
        joint_velocity_rel,
        joint_jerk_rel: 0.5,
        cart_velocity: 250.0,
    }
}

fn stiffness(x: f64, y: f64, z: f64) -> StiffnessSpec {
    StiffnessSpec { x, y, z }
}

impl TaskProfile {
    /// The commissioned constants for `kind`.
    pub fn builtin(kind: ScenarioKind) -> Self {
        use RecordingChannel::*;
        use names::*;

        match kind {
            ScenarioKind::Compliance => Self {
                scenario: kind,
                stiffness: stiffness(2500.0, 2500.0, 300.0),
                waypoints: BTreeMap::from([(HOME.to_string(), WaypointSpec::new(UPRIGHT, 0.3))]),
                spline: Some(spline(
                    vec![
                        FrameOverride::xyz(-120.0, 0.0, 275.0),
                        FrameOverride::xyz(-120.0, 0.0, 275.0),
                        FrameOverride::xyz(-300.0, 0.0, 275.0),
                    ],
                    0.15,
                )),
                observer: None,
                hold_message: None,
                recording: recording("28MayTest", &[CartesianForce, CommandedPose, MeasuredPose]),
            },
            ScenarioKind::StraightLine => Self {
                scenario: kind,
                stiffness: stiffness(1500.0, 700.0, 2500.0),
                waypoints: BTreeMap::from([(HOME.to_string(), WaypointSpec::new(UPRIGHT, 0.3))]),
                spline: Some(spline(
                    vec![
                        FrameOverride::z_only(250.0),
                        FrameOverride::z_only(250.0),
                        FrameOverride::xyz(-300.0, 0.0, 250.0),
                    ],
                    0.15,
                )),
                observer: None,
                hold_message: None,
                recording: recording(
                    "7MayCartesian",
                    &[
                        InternalJointTorque,
                        ExternalJointTorque,
                        CartesianForce,
                        CartesianTorque,
                        CommandedPose,
                        MeasuredPose,
                    ],
                ),
            },
            ScenarioKind::Listener => Self {
                scenario: kind,
                stiffness: stiffness(2500.0, 2500.0, 2500.0),
                waypoints: BTreeMap::from([(
                    HOME.to_string(),
                    WaypointSpec::new(UPRIGHT_TURNED, 0.3),
                )]),
                spline: Some(spline(vec![FrameOverride::xyz(-120.0, 20.0, 560.0)], 0.4)),
                observer: Some(ObserverSpec {
                    name: "push".to_string(),
                    threshold: 10.0,
                    return_to: HOME.to_string(),
                    velocity_scale: 0.25,
                }),
                hold_message: None,
                recording: recording("bubblePop", &[CartesianForce]),
            },
            ScenarioKind::PickAndPlace => Self {
                scenario: kind,
                stiffness: stiffness(2500.0, 2500.0, 2500.0),
                waypoints: BTreeMap::from([
                    (
                        HOME.to_string(),
                        WaypointSpec::new([-90.0, 38.47, 0.0, -109.08, 0.0, -53.02, 142.93], 0.1),
                    ),
                    (
                        STOPOVER.to_string(),
                        WaypointSpec::new([-142.11, 53.70, 30.87, -115.07, -55.18, -62.08, 104.74], 0.1),
                    ),
                    (
                        PICK_APPROACH.to_string(),
                        WaypointSpec::new([-162.65, 81.97, 36.51, -113.47, -66.78, -55.44, 101.0], 0.1),
                    ),
                    (
                        SUCTION.to_string(),
                        WaypointSpec::new([-162.65, 82.77, 37.34, -113.20, -66.22, -53.01, 100.92], 0.1),
                    ),
                    (
                        PLACE_APPROACH.to_string(),
                        WaypointSpec::new([-56.07, 69.07, 1.95, -119.99, -16.19, -106.64, 117.21], 0.1),
                    ),
                    (
                        PLACE_APPROACH_CLOSER.to_string(),
                        WaypointSpec::new([-57.46, 69.07, 4.75, -118.31, -14.74, -93.25, 115.96], 0.1),
                    ),
                    (
                        PUSH_IN.to_string(),
                        WaypointSpec::new([-57.5, 74.84, 3.39, -115.65, -18.53, -99.41, 115.85], 0.1),
                    ),
                ]),
                spline: None,
                observer: Some(ObserverSpec {
                    name: "rivet-seated".to_string(),
                    threshold: 10.0,
                    return_to: PLACE_APPROACH.to_string(),
                    velocity_scale: 0.1,
                }),
                hold_message: Some("Press ok once rivet attached.".to_string()),
                recording: recording("pickAndInstall", &[CartesianForce]),
            },
        }
    }

    /// Waypoints the scenario's plan refers to.
    pub fn required_waypoints(&self) -> Vec<&str> {
        use names::*;
        let mut required = match self.scenario {
            ScenarioKind::PickAndPlace => vec![
                HOME,
                STOPOVER,
                PICK_APPROACH,
                SUCTION,
                PLACE_APPROACH,
                PLACE_APPROACH_CLOSER,
                PUSH_IN,
            ],
            _ => vec![HOME],
        };
        if let Some(observer) = &self.observer {
            if !required.contains(&observer.return_to.as_str()) {
                required.push(observer.return_to.as_str());
            }
        }
        required
    }

    /// Check the profile can be turned into a plan.
    ///
    /// # Errors
    ///
    /// [`RivetError::UnknownWaypoint`] for a missing waypoint,
    /// [`RivetError::InvalidProfile`] for anything else.
    pub fn validate(&self) -> Result<(), RivetError> {
        self.stiffness.profile()?;
        for name in self.required_waypoints() {
            if !self.waypoints.contains_key(name) {
                return Err(RivetError::UnknownWaypoint(format!(
                    "{name} (needed by {})",
                    self.scenario
                )));
            }
        }

        let needs_spline = !matches!(self.scenario, ScenarioKind::PickAndPlace);
        match (&self.spline, needs_spline) {
            (None, true) => {
                return Err(self.invalid("scenario needs a spline section"));
            }
            (Some(s), true) if s.path.is_empty() => {
                return Err(self.invalid("spline path is empty"));
            }
            (Some(s), _) => s.scale().validate(&format!("{} spline", self.scenario))?,
            (None, false) => {}
        }

        let needs_observer = matches!(
            self.scenario,
            ScenarioKind::Listener | ScenarioKind::PickAndPlace
        );
        match (&self.observer, needs_observer) {
            (None, true) => return Err(self.invalid("scenario needs an observer section")),
            (Some(o), _) if !(o.threshold.is_finite() && o.threshold > 0.0) => {
                return Err(self.invalid(&format!(
                    "observer threshold must be positive, got {}",
                    o.threshold
                )));
            }
            _ => {}
        }

        if self.scenario == ScenarioKind::PickAndPlace
            && self.hold_message.as_deref().is_none_or(|m| m.trim().is_empty())
        {
            return Err(self.invalid("pick-and-place needs a hold message"));
        }

        self.recording.session_config()?;
        Ok(())
    }

    fn invalid(&self, what: &str) -> RivetError {
        RivetError::InvalidProfile(format!("{}: {what}", self.scenario))
    }
}

// ────────────────────────────────────────────────────────────────────────────
// ProfileSet
// ────────────────────────────────────────────────────────────────────────────

#[derive(Debug, Default, Serialize, Deserialize)]
struct ProfileFile {
    #[serde(default)]
    profiles: BTreeMap<String, TaskProfile>,
}

/// One profile per scenario.
#[derive(Debug, Clone, PartialEq)]
pub struct ProfileSet {
    profiles: BTreeMap<ScenarioKind, TaskProfile>,
}

impl Default for ProfileSet {
    fn default() -> Self {
        Self::builtin()
    }
}

impl ProfileSet {
    pub fn builtin() -> Self {
        Self {
            profiles: ScenarioKind::ALL
                .into_iter()
                .map(|k| (k, TaskProfile::builtin(k)))
                .collect(),
        }
    }

    /// Built-in profiles with every `[profiles.<scenario>]` table in `path`
    /// replacing its scenario's entry.
    ///
    /// # Errors
    ///
    /// [`RivetError::Config`] when the file cannot be read or parsed or
    /// names an unknown scenario; validation errors of an overriding
    /// profile are returned as-is.
    pub fn load_from(path: &Path) -> Result<Self, RivetError> {
        let text = std::fs::read_to_string(path)
            .map_err(|e| RivetError::Config(format!("cannot read {}: {e}", path.display())))?;
        let mut set = Self::builtin();
        set.apply_toml(&text)
            .map_err(|e| match e {
                RivetError::Config(msg) => RivetError::Config(format!("{}: {msg}", path.display())),
                other => other,
            })?;
        info!(path = %path.display(), "task profiles loaded");
        Ok(set)
    }

    /// Apply overrides from a TOML document.
    pub fn apply_toml(&mut self, text: &str) -> Result<(), RivetError> {
        let file: ProfileFile =
            toml::from_str(text).map_err(|e| RivetError::Config(format!("invalid profile file: {e}")))?;
        for (key, mut profile) in file.profiles {
            let kind: ScenarioKind = key.parse()?;
            profile.scenario = kind;
            profile.validate()?;
            debug!(scenario = %kind, "profile overridden");
            self.profiles.insert(kind, profile);
        }
        Ok(())
    }

    pub fn get(&self, kind: ScenarioKind) -> &TaskProfile {
        // Every kind is inserted by `builtin` and never removed.
        &self.profiles[&kind]
    }

    /// The whole set as a TOML document `load_from` accepts.
    pub fn to_toml(&self) -> Result<String, RivetError> {
        let file = ProfileFile {
            profiles: self
                .profiles
                .iter()
                .map(|(k, p)| (k.as_str().to_string(), p.clone()))
                .collect(),
        };
        toml::to_string_pretty(&file).map_err(|e| RivetError::Config(e.to_string()))
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn every_builtin_profile_validates() {
        for kind in ScenarioKind::ALL {
            let profile = TaskProfile::builtin(kind);
            assert_eq!(profile.scenario, kind);
            profile.validate().unwrap_or_else(|e| panic!("{kind}: {e}"));
        }
    }

    #[test]
    fn builtin_constants_match_the_cell() {
        let compliance = TaskProfile::builtin(ScenarioKind::Compliance);
        assert_eq!(compliance.stiffness.z, 300.0);
        assert_eq!(compliance.recording.name, "28MayTest");
        assert_eq!(compliance.recording.sample_interval_ms, 100);

        let line = TaskProfile::builtin(ScenarioKind::StraightLine);
        assert_eq!(line.stiffness.y, 700.0);
        assert_eq!(line.recording.channels.len(), 6);

        let listener = TaskProfile::builtin(ScenarioKind::Listener);
        let observer = listener.observer.as_ref().unwrap();
        assert_eq!((observer.threshold, observer.velocity_scale), (10.0, 0.25));
        assert_eq!(listener.spline.as_ref().unwrap().joint_velocity_rel, 0.4);

        let pick = TaskProfile::builtin(ScenarioKind::PickAndPlace);
        assert_eq!(pick.waypoints.len(), 7);
        assert!(pick.waypoints.values().all(|w| w.velocity_scale == 0.1));
        assert_eq!(pick.observer.as_ref().unwrap().return_to, names::PLACE_APPROACH);
    }

    #[test]
    fn scenario_names_parse_loosely() {
        assert_eq!("pick-and-place".parse::<ScenarioKind>().unwrap(), ScenarioKind::PickAndPlace);
        assert_eq!("straight_line".parse::<ScenarioKind>().unwrap(), ScenarioKind::StraightLine);
        assert_eq!(" Listener ".parse::<ScenarioKind>().unwrap(), ScenarioKind::Listener);
        assert!(matches!("dance".parse::<ScenarioKind>(), Err(RivetError::Config(_))));
        for kind in ScenarioKind::ALL {
            assert_eq!(kind.to_string().parse::<ScenarioKind>().unwrap(), kind);
        }
    }

    #[test]
    fn missing_waypoint_is_reported_by_name() {
        let mut profile = TaskProfile::builtin(ScenarioKind::PickAndPlace);
        profile.waypoints.remove(names::SUCTION);
        match profile.validate() {
            Err(RivetError::UnknownWaypoint(msg)) => assert!(msg.contains("suction")),
            other => panic!("expected UnknownWaypoint, got {other:?}"),
        }
    }

    #[test]
    fn observer_target_must_exist() {
        let mut profile = TaskProfile::builtin(ScenarioKind::Listener);
        profile.observer.as_mut().unwrap().return_to = "nowhere".into();
        assert!(matches!(profile.validate(), Err(RivetError::UnknownWaypoint(_))));
    }

    #[test]
    fn bad_threshold_and_empty_path_are_invalid() {
        let mut profile = TaskProfile::builtin(ScenarioKind::Listener);
        profile.observer.as_mut().unwrap().threshold = 0.0;
        assert!(matches!(profile.validate(), Err(RivetError::InvalidProfile(_))));

        let mut profile = TaskProfile::builtin(ScenarioKind::Compliance);
        profile.spline.as_mut().unwrap().path.clear();
        assert!(matches!(profile.validate(), Err(RivetError::InvalidProfile(_))));
    }

    #[test]
    fn toml_override_replaces_one_scenario() {
        let mut set = ProfileSet::builtin();
        let mut softer = TaskProfile::builtin(ScenarioKind::Compliance);
        softer.stiffness.z = 150.0;
        softer.recording.name = "softer".into();
        let doc = ProfileFile {
            profiles: BTreeMap::from([("compliance".to_string(), softer)]),
        };
        set.apply_toml(&toml::to_string(&doc).unwrap()).unwrap();

        let compliance = set.get(ScenarioKind::Compliance);
        assert_eq!(compliance.stiffness.z, 150.0);
        assert_eq!(compliance.recording.name, "softer");
        assert_eq!(
            set.get(ScenarioKind::Listener),
            &TaskProfile::builtin(ScenarioKind::Listener)
        );
    }

    #[test]
    fn load_from_reads_a_dumped_set() -> Result<(), Box<dyn std::error::Error>> {
        let dir = tempfile::tempdir()?;
        let path = dir.path().join("profiles.toml");
        std::fs::write(&path, ProfileSet::builtin().to_toml()?)?;
        assert_eq!(ProfileSet::load_from(&path)?, ProfileSet::builtin());
        Ok(())
    }

    #[test]
    fn unknown_scenario_table_is_a_config_error() {
        let mut set = ProfileSet::builtin();
        let doc = ProfileFile {
            profiles: BTreeMap::from([(
                "dance".to_string(),
                TaskProfile::builtin(ScenarioKind::Listener),
            )]),
        };
        let err = set.apply_toml(&toml::to_string(&doc).unwrap()).unwrap_err();
        assert!(matches!(err, RivetError::Config(msg) if msg.contains("dance")));
    }

    #[test]
    fn negative_stiffness_in_file_is_rejected() {
        let mut set = ProfileSet::builtin();
        let mut doc = set.to_toml().unwrap();
        doc = doc.replacen("z = 300.0", "z = -1.0", 1);
        assert!(matches!(set.apply_toml(&doc), Err(RivetError::InvalidProfile(_))));
    }
}
