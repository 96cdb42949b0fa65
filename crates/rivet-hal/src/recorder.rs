//! Recording collaborator seam.

use rivet_types::{ArtifactLocation, RivetError, SessionConfig};

/// A sampled-channel capture device.
///
/// One capture at a time. The lifecycle bookkeeping (double start, stop
/// before start) lives in the runtime's recording session; implementations
/// may still refuse a start while a capture is open.
pub trait Recorder: Send + Sync {
    /// Begin capturing the channels named in `config`.
    ///
    /// # Errors
    ///
    /// [`RivetError::Recorder`] when the capture cannot be opened.
    fn start(&self, config: &SessionConfig) -> Result<(), RivetError>;

    /// End the capture and return where it was persisted.
    ///
    /// Every sample taken is flushed before this returns.
    fn stop(&self) -> Result<ArtifactLocation, RivetError>;
}
