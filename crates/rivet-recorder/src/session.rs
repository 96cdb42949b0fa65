//! Recording session lifecycle.
//!
//! A [`RecordingSession`] is single-use: `Idle → Active → Closed`. Calling
//! `start` on an active or closed session, or `stop` on one that is not
//! active, leaves it untouched and returns
//! [`SessionTransition::Ignored`] carrying a
//! [`RivetError::SessionUsage`]. Collaborator failures are returned as
//! errors.

use rivet_hal::Recorder;
use rivet_types::{ArtifactLocation, RecordingChannel, RivetError, SessionConfig};
use tracing::{info, warn};
use uuid::Uuid;

#[derive(Debug, Clone, PartialEq)]
enum Phase {
    Idle,
    Active,
    /// `None` when the recorder failed while stopping.
    Closed(Option<ArtifactLocation>),
}

/// What a `start` or `stop` call did.
#[derive(Debug, Clone, PartialEq)]
pub enum SessionTransition {
    Started,
    Stopped(ArtifactLocation),
    /// Usage error; the session state did not change.
    Ignored(RivetError),
}

#[derive(Debug)]
pub struct RecordingSession {
    config: SessionConfig,
    phase: Phase,
}

impl RecordingSession {
    pub fn new(config: SessionConfig) -> Self {
        Self {
            config,
            phase: Phase::Idle,
        }
    }

    pub fn id(&self) -> Uuid {
        self.config.id
    }

    pub fn name(&self) -> &str {
        &self.config.name
    }

    pub fn channels(&self) -> &[RecordingChannel] {
        self.config.channels()
    }

    pub fn is_active(&self) -> bool {
        self.phase == Phase::Active
    }

    /// Where the capture was persisted, once stopped.
    pub fn artifact(&self) -> Option<&ArtifactLocation> {
        match &self.phase {
            Phase::Closed(location) => location.as_ref(),
            _ => None,
        }
    }

    /// Open the capture on `recorder`.
    ///
    /// # Errors
    ///
    /// Whatever the recorder reports when it cannot start; the session stays
    /// idle in that case.
    pub fn start(&mut self, recorder: &dyn Recorder) -> Result<SessionTransition, RivetError> {
        match self.phase {
            Phase::Idle => {
                recorder.start(&self.config)?;
                self.phase = Phase::Active;
                info!(session = %self.config.name, id = %self.config.id, "recording started");
                Ok(SessionTransition::Started)
            }
            Phase::Active => Ok(self.ignore("start called on an active session")),
            Phase::Closed(_) => Ok(self.ignore("start called on a stopped session")),
        }
    }

    /// Close the capture. The recorder is asked to stop exactly once; the
    /// session is closed even if that call fails.
    pub fn stop(&mut self, recorder: &dyn Recorder) -> Result<SessionTransition, RivetError> {
        match self.phase {
            Phase::Active => match recorder.stop() {
                Ok(location) => {
                    info!(session = %self.config.name, %location, "recording stopped");
                    self.phase = Phase::Closed(Some(location.clone()));
                    Ok(SessionTransition::Stopped(location))
                }
                Err(e) => {
                    self.phase = Phase::Closed(None);
                    Err(e)
                }
            },
            Phase::Idle => Ok(self.ignore("stop called before start")),
            Phase::Closed(_) => Ok(self.ignore("stop called twice")),
        }
    }

    fn ignore(&self, what: &str) -> SessionTransition {
        warn!(session = %self.config.name, "{what}");
        SessionTransition::Ignored(RivetError::SessionUsage(format!(
            "'{}': {what}",
            self.config.name
        )))
    }
}
