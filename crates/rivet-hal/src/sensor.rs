//! Sensor seams: the force feed consumed by observers and the channel
//! source polled by recorders.

use rivet_types::{ForceSample, RecordingChannel};
use tokio::sync::broadcast;

/// A periodic spatial-force feed at the flange.
pub trait ForceSensor: Send + Sync {
    fn id(&self) -> &str;

    /// Open a new subscription. Only samples produced after this call are
    /// delivered; a receiver that falls behind sees
    /// [`broadcast::error::RecvError::Lagged`].
    fn subscribe(&self) -> broadcast::Receiver<ForceSample>;

    /// Magnitude of the most recent sample, `None` before the first one.
    fn latest(&self) -> Option<f64>;
}

/// Instantaneous values for recordable channels.
pub trait TelemetrySource: Send + Sync {
    /// Current value of `channel`, or `None` if this source does not provide it.
    fn read(&self, channel: RecordingChannel) -> Option<Vec<f64>>;
}
