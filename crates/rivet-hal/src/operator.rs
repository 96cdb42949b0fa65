//! Operator interaction seam.

use rivet_types::{Acknowledgment, RivetError};

/// A blocking modal dialog, e.g. on the teach pendant or a console.
pub trait OperatorPrompt: Send + Sync {
    /// Show `message` and block until the operator responds.
    ///
    /// There is no timeout; the call returns only when the operator acts or
    /// the prompt itself fails.
    ///
    /// # Errors
    ///
    /// [`RivetError::Operator`] when the prompt cannot be shown or read.
    fn prompt_modal(&self, message: &str) -> Result<Acknowledgment, RivetError>;
}
