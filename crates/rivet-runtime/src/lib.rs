//! `rivet-runtime` – the task sequencer and its event-driven helpers.
//!
//! # Modules
//!
//! - [`sequencer`] – [`Sequencer`][sequencer::Sequencer]: runs a step list
//!   strictly in order, skipping forward steps after a fatal fault while
//!   still running teardown steps.
//! - [`task`] – [`TaskScope`][task::TaskScope] (observers and recording
//!   owned by one run, closed on every exit path) and
//!   [`TaskRunner`][task::TaskRunner] (`initialize` once, `run`).
//! - [`force_observer`] – [`ForceThresholdObserver`][force_observer::ForceThresholdObserver]:
//!   rising-edge force trigger whose handler runs off the sequencer thread.
//! - [`hold`] – [`hold_and_wait_for_ack`][hold::hold_and_wait_for_ack]:
//!   compliant hold cancelled exactly once after the operator answers.
//! - [`scenarios`] – the four task programs as step lists.
//! - [`profile`] – [`TaskProfile`][profile::TaskProfile]: stiffness,
//!   waypoints, paths and recording settings, with TOML overrides.
//! - [`waypoints`] – [`WaypointTable`][waypoints::WaypointTable].
//! - [`telemetry`] – `tracing` subscriber and OTLP export set-up.

pub mod force_observer;
pub mod hold;
pub mod profile;
pub mod scenarios;
pub mod sequencer;
pub mod task;
pub mod telemetry;
pub mod waypoints;

pub use force_observer::{EdgeDetector, ForceHandler, ForceThresholdObserver, TriggerContext};
pub use hold::hold_and_wait_for_ack;
pub use profile::{ProfileSet, ScenarioKind, TaskProfile};
pub use sequencer::{MotionTarget, SequenceReport, Sequencer, Step, StepOutcome, StepRecord};
pub use task::{TaskDevices, TaskRunner, TaskScope};
pub use waypoints::WaypointTable;
