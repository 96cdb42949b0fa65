//! `rivet-kernel` – the single writer in front of the actuator.
//!
//! It does not plan motions; it decides whether a motion may reach the
//! controller and makes sure only one does at a time.
//!
//! # Modules
//!
//! - [`segment_verifier`] – [`SegmentVerifier`][segment_verifier::SegmentVerifier]:
//!   a rule engine that validates every [`MotionRequest`][rivet_types::MotionRequest]
//!   (velocity scales, joint limits, hold compliance) before dispatch.
//! - [`actuator_gate`] – [`ActuatorGate`][actuator_gate::ActuatorGate]:
//!   the interception point every motion passes through. Verifies the
//!   request, takes exclusive ownership of the actuator according to the
//!   configured [`BusyPolicy`][actuator_gate::BusyPolicy], and forwards it to
//!   the [`MotionController`][rivet_hal::MotionController].

pub mod actuator_gate;
pub mod segment_verifier;

pub use actuator_gate::{ActuatorGate, BusyPolicy};
pub use segment_verifier::{
    HoldComplianceRule, JointLimitRule, MotionScaleRule, Rule, SegmentVerifier, SplinePathRule,
};
