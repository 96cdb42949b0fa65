//! `rivet-middleware` – in-process notification plumbing.
//!
//! Carries task progress, observer transitions and recording lifecycle
//! events from the runtime to whoever is listening (the CLI status line,
//! tests, log shippers) without feeding anything back into the sequencer.
//!
//! # Modules
//!
//! - [`bus`] – Typed, topic-based publish/subscribe event bus built on Tokio
//!   broadcast channels.

pub mod bus;

pub use bus::{EventBus, Topic, TopicReceiver};
