//! Shared domain vocabulary for the rivet task sequencer.
//!
//! Every other crate in the workspace speaks in these types: the HAL traits
//! consume [`MotionRequest`]s and produce [`ForceSample`]s, the kernel gate
//! wraps [`MotionFault`]s into [`RivetError`]s, and the event bus carries
//! [`Event`]s.

pub mod error;
pub mod event;
pub mod geometry;
pub mod motion;
pub mod sensing;

pub use error::{MotionFault, RivetError};
pub use event::{Event, EventPayload};
pub use geometry::{Frame, FrameOverride, JOINT_COUNT, JointPosition, Waypoint};
pub use motion::{
    Acknowledgment, Completion, ComplianceProfile, MotionRequest, MotionScale, MotionSegment,
};
pub use sensing::{
    ArtifactLocation, ForceSample, ForceThresholdEvent, ObserverState, RecordingChannel,
    SessionConfig,
};
