//! `rivet-hal` – the collaborator seams.
//!
//! The sequencing core never talks to a robot, a data recorder or a pendant
//! directly. It talks to the traits in this crate, so a real controller
//! binding and the in-process simulation in [`sim`] are interchangeable.
//!
//! | Trait | Collaborator |
//! |---|---|
//! | [`MotionController`] | Trajectory execution, blocking and asynchronous |
//! | [`ForceSensor`] | Periodic spatial force samples at the flange |
//! | [`TelemetrySource`] | Channel values polled by a recorder |
//! | [`Recorder`] | Sampled-channel capture with a persisted artifact |
//! | [`OperatorPrompt`] | Blocking modal dialog |

pub mod controller;
pub mod operator;
pub mod recorder;
pub mod sensor;
pub mod sim;

pub use controller::{AsyncMotionHandle, InFlightMotion, MotionController};
pub use operator::OperatorPrompt;
pub use recorder::Recorder;
pub use sensor::{ForceSensor, TelemetrySource};
