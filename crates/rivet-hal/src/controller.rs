//! Motion controller seam and the asynchronous motion handle.
//!
//! Drivers implement [`MotionController`]. The rest of the system only ever
//! talks to the trait (through the kernel's actuator gate), so a real
//! controller binding and the simulation can be swapped freely.

use rivet_types::{Completion, Frame, MotionFault, MotionRequest};
use tracing::{debug, warn};
use uuid::Uuid;

/// A trajectory-executing robot controller.
pub trait MotionController: Send + Sync {
    /// Stable identifier for this controller, e.g. `"lbr_iiwa_14_r820"`.
    fn id(&self) -> &str;

    /// Execute `request` and block until it completes.
    ///
    /// # Errors
    ///
    /// Any [`MotionFault`] reported while planning or executing the motion.
    fn execute(&self, request: &MotionRequest) -> Result<Completion, MotionFault>;

    /// Start `request` and return as soon as the controller reports it running.
    fn execute_async(&self, request: &MotionRequest) -> Result<AsyncMotionHandle, MotionFault>;

    /// Current flange pose in the root frame.
    fn current_pose(&self) -> Result<Frame, MotionFault>;

    /// Stop every motion immediately. In-flight and later commands fail with
    /// [`MotionFault::ExternalAbort`] until the controller is reset.
    fn external_stop(&self);
}

/// Driver-side view of a motion started with
/// [`MotionController::execute_async`].
pub trait InFlightMotion: Send {
    /// Ask the controller to end the motion.
    fn cancel(&mut self);

    /// `true` once the motion has ended on its own (or was aborted).
    fn is_finished(&self) -> bool;
}

/// Owner of a running asynchronous motion.
///
/// [`cancel`](Self::cancel) ends the motion the first time it is called and
/// does nothing afterwards. Dropping a handle that was never cancelled
/// cancels it, so the motion cannot outlive its owner.
pub struct AsyncMotionHandle {
    request_id: Uuid,
    label: String,
    motion: Option<Box<dyn InFlightMotion>>,
    on_release: Vec<Box<dyn FnOnce() + Send>>,
}

impl AsyncMotionHandle {
    pub fn new(request: &MotionRequest, motion: Box<dyn InFlightMotion>) -> Self {
        Self {
            request_id: request.id,
            label: request.label.clone(),
            motion: Some(motion),
            on_release: Vec::new(),
        }
    }

    /// Run `release` right after the motion is cancelled.
    pub fn on_release(mut self, release: impl FnOnce() + Send + 'static) -> Self {
        self.on_release.push(Box::new(release));
        self
    }

    pub fn request_id(&self) -> Uuid {
        self.request_id
    }

    pub fn label(&self) -> &str {
        &self.label
    }

    /// `false` once the handle has been cancelled.
    pub fn is_active(&self) -> bool {
        self.motion.is_some()
    }

    /// Cancel the motion.
    ///
    /// Returns `true` when this call released the motion, `false` when the
    /// handle had already been cancelled. A motion that already finished on
    /// its own is released without a controller round-trip.
    pub fn cancel(&mut self) -> bool {
        let Some(mut motion) = self.motion.take() else {
            debug!(label = %self.label, "cancel on released motion handle ignored");
            return false;
        };
        if motion.is_finished() {
            debug!(label = %self.label, "async motion already finished");
        } else {
            motion.cancel();
            debug!(label = %self.label, request = %self.request_id, "async motion cancelled");
        }
        for release in self.on_release.drain(..) {
            release();
        }
        true
    }
}

impl Drop for AsyncMotionHandle {
    fn drop(&mut self) {
        if self.motion.is_some() {
            warn!(label = %self.label, "async motion handle dropped while active; cancelling");
            self.cancel();
        }
    }
}

impl std::fmt::Debug for AsyncMotionHandle {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("AsyncMotionHandle")
            .field("request_id", &self.request_id)
            .field("label", &self.label)
            .field("active", &self.is_active())
            .finish()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use rivet_types::ComplianceProfile;
    use std::sync::Arc;
    use std::sync::atomic::{AtomicUsize, Ordering};

    /// Minimal in-flight motion used only for tests.
    struct CountingMotion {
        cancels: Arc<AtomicUsize>,
        finished: bool,
    }

    impl InFlightMotion for CountingMotion {
        fn cancel(&mut self) {
            self.cancels.fetch_add(1, Ordering::SeqCst);
            self.finished = true;
        }

        fn is_finished(&self) -> bool {
            self.finished
        }
    }

    fn hold_request() -> MotionRequest {
        MotionRequest::hold("hold", ComplianceProfile::new(2500.0, 2500.0, 2500.0).unwrap())
    }

    #[test]
    fn second_cancel_is_a_no_op() {
        let cancels = Arc::new(AtomicUsize::new(0));
        let releases = Arc::new(AtomicUsize::new(0));
        let r = Arc::clone(&releases);
        let mut handle = AsyncMotionHandle::new(
            &hold_request(),
            Box::new(CountingMotion {
                cancels: Arc::clone(&cancels),
                finished: false,
            }),
        )
        .on_release(move || {
            r.fetch_add(1, Ordering::SeqCst);
        });

        assert!(handle.cancel());
        assert!(!handle.cancel());
        drop(handle);
        assert_eq!(cancels.load(Ordering::SeqCst), 1);
        assert_eq!(releases.load(Ordering::SeqCst), 1);
    }

    #[test]
    fn drop_cancels_an_active_motion() {
        let cancels = Arc::new(AtomicUsize::new(0));
        let handle = AsyncMotionHandle::new(
            &hold_request(),
            Box::new(CountingMotion {
                cancels: Arc::clone(&cancels),
                finished: false,
            }),
        );
        assert!(handle.is_active());
        drop(handle);
        assert_eq!(cancels.load(Ordering::SeqCst), 1);
    }

    #[test]
    fn finished_motion_is_released_without_cancel() {
        let cancels = Arc::new(AtomicUsize::new(0));
        let mut handle = AsyncMotionHandle::new(
            &hold_request(),
            Box::new(CountingMotion {
                cancels: Arc::clone(&cancels),
                finished: true,
            }),
        );
        assert!(handle.cancel());
        assert!(!handle.is_active());
        assert_eq!(cancels.load(Ordering::SeqCst), 0);
    }
}
