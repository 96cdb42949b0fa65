//! Force samples, observer state and recording configuration.

use std::fmt;
use std::time::Duration;

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use uuid::Uuid;

use crate::RivetError;

/// One reading of the spatial force magnitude at the flange.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct ForceSample {
    /// Newtons.
    pub magnitude: f64,
    pub timestamp: DateTime<Utc>,
    /// Sampling intervals the sensor skipped before this reading.
    #[serde(default)]
    pub skipped_intervals: u32,
}

impl ForceSample {
    pub fn now(magnitude: f64) -> Self {
        Self {
            magnitude,
            timestamp: Utc::now(),
            skipped_intervals: 0,
        }
    }
}

/// A sample compared against a threshold.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct ForceThresholdEvent {
    pub magnitude: f64,
    pub threshold: f64,
}

impl ForceThresholdEvent {
    pub fn crossed(&self) -> bool {
        self.magnitude >= self.threshold
    }
}

/// Lifecycle of a force threshold observer.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
pub enum ObserverState {
    #[default]
    Disabled,
    Armed,
    /// A handler invocation is queued or running.
    Triggered,
}

/// Signals the recorder can capture.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum RecordingChannel {
    /// Force at the flange, X/Y/Z in N.
    CartesianForce,
    /// Torque at the flange, A/B/C in Nm.
    CartesianTorque,
    /// Commanded flange position X/Y/Z in the root frame.
    CommandedPose,
    /// Measured flange position X/Y/Z in the root frame.
    MeasuredPose,
    InternalJointTorque,
    ExternalJointTorque,
}

impl RecordingChannel {
    pub const ALL: [RecordingChannel; 6] = [
        RecordingChannel::CartesianForce,
        RecordingChannel::CartesianTorque,
        RecordingChannel::CommandedPose,
        RecordingChannel::MeasuredPose,
        RecordingChannel::InternalJointTorque,
        RecordingChannel::ExternalJointTorque,
    ];

    pub fn as_str(&self) -> &'static str {
        match self {
            RecordingChannel::CartesianForce => "cartesian_force",
            RecordingChannel::CartesianTorque => "cartesian_torque",
            RecordingChannel::CommandedPose => "commanded_pose",
            RecordingChannel::MeasuredPose => "measured_pose",
            RecordingChannel::InternalJointTorque => "internal_joint_torque",
            RecordingChannel::ExternalJointTorque => "external_joint_torque",
        }
    }

    pub fn parse(name: &str) -> Option<Self> {
        Self::ALL.into_iter().find(|c| c.as_str() == name)
    }
}

impl fmt::Display for RecordingChannel {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Everything a recorder needs to open a capture.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct SessionConfig {
    pub id: Uuid,
    pub name: String,
    channels: Vec<RecordingChannel>,
    pub sample_interval: Duration,
    /// Capture stops sampling after this long; `stop` is still required.
    pub max_duration: Duration,
}

impl SessionConfig {
    /// # Errors
    ///
    /// [`RivetError::InvalidProfile`] for an empty channel set or a zero
    /// sampling interval.
    pub fn new(
        name: impl Into<String>,
        channels: impl IntoIterator<Item = RecordingChannel>,
        sample_interval: Duration,
        max_duration: Duration,
    ) -> Result<Self, RivetError> {
        let name = name.into();
        let mut channels: Vec<RecordingChannel> = channels.into_iter().collect();
        channels.sort();
        channels.dedup();
        if channels.is_empty() {
            return Err(RivetError::InvalidProfile(format!(
                "recording '{name}' has no channels"
            )));
        }
        if sample_interval.is_zero() {
            return Err(RivetError::InvalidProfile(format!(
                "recording '{name}' has a zero sampling interval"
            )));
        }
        Ok(Self {
            id: Uuid::new_v4(),
            name,
            channels,
            sample_interval,
            max_duration,
        })
    }

    pub fn channels(&self) -> &[RecordingChannel] {
        &self.channels
    }
}

/// Where a stopped session was persisted.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ArtifactLocation(pub String);

impl fmt::Display for ArtifactLocation {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.0)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn crossing_is_inclusive() {
        let at = ForceThresholdEvent {
            magnitude: 10.0,
            threshold: 10.0,
        };
        let below = ForceThresholdEvent {
            magnitude: 9.99,
            threshold: 10.0,
        };
        assert!(at.crossed());
        assert!(!below.crossed());
    }

    #[test]
    fn session_requires_channels() {
        let err = SessionConfig::new("empty", Vec::new(), Duration::from_millis(100), Duration::from_secs(45));
        assert!(err.is_err());
    }

    #[test]
    fn session_channels_are_deduplicated() {
        let cfg = SessionConfig::new(
            "bubblePop",
            [
                RecordingChannel::MeasuredPose,
                RecordingChannel::CartesianForce,
                RecordingChannel::MeasuredPose,
            ],
            Duration::from_millis(100),
            Duration::from_secs(45),
        )
        .unwrap();
        assert_eq!(
            cfg.channels(),
            &[RecordingChannel::CartesianForce, RecordingChannel::MeasuredPose]
        );
    }

    #[test]
    fn channel_names_parse_back() {
        for channel in RecordingChannel::ALL {
            assert_eq!(RecordingChannel::parse(channel.as_str()), Some(channel));
        }
        assert_eq!(RecordingChannel::parse("lidar"), None);
    }
}
