//! `rivet-recorder` – capture of sampled channels around a task window.
//!
//! # Modules
//!
//! - [`session`] – [`RecordingSession`][session::RecordingSession]: the
//!   start/stop lifecycle the sequencer owns. Misuse (double start, stop
//!   before start) is reported, never fatal.
//! - [`store`] – [`SqliteRecorder`][store::SqliteRecorder]: a
//!   [`Recorder`][rivet_hal::Recorder] that polls a
//!   [`TelemetrySource`][rivet_hal::TelemetrySource] on a background thread
//!   and flushes the capture to SQLite when stopped.

pub mod session;
pub mod store;

pub use session::{RecordingSession, SessionTransition};
pub use store::{RecordedSample, RecorderError, SessionSummary, SqliteRecorder};
