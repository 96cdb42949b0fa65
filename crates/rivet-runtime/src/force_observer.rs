//! [`ForceThresholdObserver`] – rising-edge force trigger.
//!
//! While armed, a sampler task on the Tokio runtime compares every
//! [`ForceSample`] from the [`ForceSensor`] against the threshold. It fires
//! on the first sample at or above the threshold that follows a sample below
//! it. A sustained contact fires once; the trigger re-arms as soon as the
//! force drops below the threshold again.
//!
//! Handlers never run on the sampler task or on the sequencer thread. Each
//! edge is queued on a handler lane and run on Tokio's blocking pool, one at
//! a time, in firing order.
//!
//! | State | Meaning |
//! |---|---|
//! | `Disabled` | Not subscribed; samples are ignored. |
//! | `Armed` | Sampling, no handler outstanding. |
//! | `Triggered` | At least one handler queued or running. |
//!
//! Arming reads the sensor's latest magnitude as the baseline, so the first
//! sample after arming fires when the arm was free of contact. Contact
//! already present at arming does not fire until the force drops. A sensor
//! with no reading yet leaves the first sample as the baseline.
//!
//! # Example
//!
//! ```rust,no_run
//! use std::sync::Arc;
//! use rivet_hal::sim::SimForceSensor;
//! use rivet_runtime::force_observer::{ForceThresholdObserver, TriggerContext};
//!
//! let rt = tokio::runtime::Runtime::new().unwrap();
//! let sensor = SimForceSensor::new("flange_force");
//! let mut observer = ForceThresholdObserver::new("push", Arc::new(sensor.clone()), rt.handle().clone());
//!
//! observer.arm(10.0, Arc::new(|ctx: &TriggerContext| {
//!     println!("contact at {:.1} N", ctx.magnitude);
//!     Ok(())
//! })).unwrap();
//! for m in [2.0, 4.0, 11.0, 12.0, 3.0] {
//!     sensor.inject(m);
//! }
//! observer.disarm();
//! assert_eq!(observer.fire_count(), 1);
//! ```

use std::sync::{Arc, Mutex, MutexGuard, PoisonError, mpsc as std_mpsc};

use chrono::{DateTime, Utc};
use rivet_hal::ForceSensor;
use rivet_middleware::EventBus;
use rivet_types::{EventPayload, ForceSample, ForceThresholdEvent, ObserverState, RivetError};
use tokio::runtime::Handle;
use tokio::sync::broadcast::error::{RecvError, TryRecvError};
use tokio::sync::{broadcast, mpsc, oneshot};
use tracing::{debug, error, info, warn};

/// Work run when the observer fires. Errors and panics are logged and
/// published; they never reach the sequencer.
pub type ForceHandler = Arc<dyn Fn(&TriggerContext) -> Result<(), RivetError> + Send + Sync>;

/// What a handler is told about the edge that fired it.
#[derive(Debug, Clone, PartialEq)]
pub struct TriggerContext {
    pub observer: String,
    /// Magnitude of the first sample at or above the threshold.
    pub magnitude: f64,
    pub threshold: f64,
    pub fired_at: DateTime<Utc>,
    /// 1-based firing index since the observer was armed.
    pub fire_count: u64,
    /// Samples lost since arming, up to this edge. Non-zero means an
    /// earlier edge may have been masked.
    pub missed_samples: u64,
}

// ────────────────────────────────────────────────────────────────────────────
// Edge detection
// ────────────────────────────────────────────────────────────────────────────

/// Pure rising-edge detector.
#[derive(Debug, Clone)]
pub struct EdgeDetector {
    threshold: f64,
    last_below: Option<bool>,
}

impl EdgeDetector {
    pub fn new(threshold: f64) -> Self {
        Self {
            threshold,
            last_below: None,
        }
    }

    /// A detector whose baseline is the force at arming time, when known.
    pub fn primed(threshold: f64, current: Option<f64>) -> Self {
        let mut detector = Self::new(threshold);
        if let Some(magnitude) = current {
            detector.observe(magnitude);
        }
        detector
    }

    /// `true` when `magnitude` completes a below → at-or-above transition.
    /// Non-finite readings are dropped without moving the baseline.
    pub fn observe(&mut self, magnitude: f64) -> bool {
        if !magnitude.is_finite() {
            return false;
        }
        let crossed = ForceThresholdEvent {
            magnitude,
            threshold: self.threshold,
        }
        .crossed();
        let fire = crossed && self.last_below == Some(true);
        self.last_below = Some(!crossed);
        fire
    }
}

// ────────────────────────────────────────────────────────────────────────────
// Shared state
// ────────────────────────────────────────────────────────────────────────────

#[derive(Debug, Default)]
struct Counters {
    state: ObserverState,
    /// Handlers queued or running.
    pending: usize,
    fire_count: u64,
    missed: u64,
}

struct ObserverCore {
    name: String,
    counters: Mutex<Counters>,
    bus: Option<EventBus>,
}

impl ObserverCore {
    fn lock(&self) -> MutexGuard<'_, Counters> {
        self.counters.lock().unwrap_or_else(PoisonError::into_inner)
    }

    fn publish(&self, payload: EventPayload) {
        if let Some(bus) = &self.bus {
            bus.publish(&self.name, payload);
        }
    }

    fn transition(&self, counters: &mut Counters, to: ObserverState) {
        let from = counters.state;
        if from == to {
            return;
        }
        counters.state = to;
        debug!(observer = %self.name, ?from, ?to, "observer state changed");
        self.publish(EventPayload::ObserverStateChanged {
            observer: self.name.clone(),
            from,
            to,
        });
    }

    fn missed_error(&self, total: u64) -> RivetError {
        RivetError::ObserverMissedSamples {
            observer: self.name.clone(),
            count: total,
        }
    }

    fn note_missed(&self, count: u64) {
        let total = {
            let mut c = self.lock();
            c.missed += count;
            c.missed
        };
        let error = self.missed_error(total);
        warn!(observer = %self.name, missed = count, %error, "an edge may have been masked");
        self.publish(EventPayload::MissedSamples {
            observer: self.name.clone(),
            count,
        });
    }

    fn evaluate(
        &self,
        detector: &mut EdgeDetector,
        sample: ForceSample,
        lane: &mpsc::UnboundedSender<TriggerContext>,
    ) {
        if sample.skipped_intervals > 0 {
            self.note_missed(u64::from(sample.skipped_intervals));
        }
        if !detector.observe(sample.magnitude) {
            return;
        }
        let context = {
            let mut c = self.lock();
            c.fire_count += 1;
            c.pending += 1;
            self.transition(&mut c, ObserverState::Triggered);
            TriggerContext {
                observer: self.name.clone(),
                magnitude: sample.magnitude,
                threshold: detector.threshold,
                fired_at: sample.timestamp,
                fire_count: c.fire_count,
                missed_samples: c.missed,
            }
        };
        info!(
            observer = %self.name,
            magnitude = context.magnitude,
            threshold = context.threshold,
            fire_count = context.fire_count,
            "force threshold crossed"
        );
        self.publish(EventPayload::ObserverFired {
            observer: self.name.clone(),
            magnitude: context.magnitude,
            fire_count: context.fire_count,
        });
        if lane.send(context).is_err() {
            warn!(observer = %self.name, "handler lane closed; edge dropped");
            self.handler_done();
        }
    }

    fn handler_done(&self) {
        let mut c = self.lock();
        c.pending = c.pending.saturating_sub(1);
        if c.pending == 0 && c.state == ObserverState::Triggered {
            self.transition(&mut c, ObserverState::Armed);
        }
    }
}

// ────────────────────────────────────────────────────────────────────────────
// Observer
// ────────────────────────────────────────────────────────────────────────────

struct ArmedTask {
    stop: oneshot::Sender<()>,
    /// Closed by the sampler task once it and every handler have finished.
    done: std_mpsc::Receiver<()>,
}

/// A named force trigger bound to one sensor.
pub struct ForceThresholdObserver {
    core: Arc<ObserverCore>,
    sensor: Arc<dyn ForceSensor>,
    runtime: Handle,
    armed: Option<ArmedTask>,
}

impl ForceThresholdObserver {
    pub fn new(name: impl Into<String>, sensor: Arc<dyn ForceSensor>, runtime: Handle) -> Self {
        Self {
            core: Arc::new(ObserverCore {
                name: name.into(),
                counters: Mutex::new(Counters::default()),
                bus: None,
            }),
            sensor,
            runtime,
            armed: None,
        }
    }

    /// Publish transitions, firings and missed samples on `bus`.
    pub fn with_bus(mut self, bus: EventBus) -> Self {
        self.core = Arc::new(ObserverCore {
            name: self.core.name.clone(),
            counters: Mutex::new(Counters::default()),
            bus: Some(bus),
        });
        self
    }

    pub fn name(&self) -> &str {
        &self.core.name
    }

    pub fn state(&self) -> ObserverState {
        self.core.lock().state
    }

    /// Edges detected since the last `arm`.
    pub fn fire_count(&self) -> u64 {
        self.core.lock().fire_count
    }

    /// Samples lost since the last `arm`.
    pub fn missed_samples(&self) -> u64 {
        self.core.lock().missed
    }

    /// [`RivetError::ObserverMissedSamples`] with the total since the last
    /// `arm`, if any sample was lost. Never fatal.
    pub fn missed_samples_error(&self) -> Option<RivetError> {
        let missed = self.core.lock().missed;
        (missed > 0).then(|| self.core.missed_error(missed))
    }

    pub fn is_armed(&self) -> bool {
        self.armed.is_some()
    }

    /// Subscribe to the sensor and start watching for rising edges.
    ///
    /// The subscription is taken before this returns, so every sample
    /// published afterwards is evaluated.
    ///
    /// # Errors
    ///
    /// - [`RivetError::ObserverAlreadyArmed`] – disarm first.
    /// - [`RivetError::InvalidProfile`] – threshold not a positive number.
    pub fn arm(&mut self, threshold: f64, handler: ForceHandler) -> Result<(), RivetError> {
        if self.armed.is_some() {
            warn!(observer = %self.core.name, "arm called on an armed observer");
            return Err(RivetError::ObserverAlreadyArmed(self.core.name.clone()));
        }
        if !(threshold.is_finite() && threshold > 0.0) {
            return Err(RivetError::InvalidProfile(format!(
                "observer '{}': threshold must be positive, got {threshold}",
                self.core.name
            )));
        }

        // Read before subscribing: a sample landing in between is then
        // evaluated from the feed against the right baseline.
        let current = self.sensor.latest();
        let detector = EdgeDetector::primed(threshold, current);
        let feed = self.sensor.subscribe();
        {
            let mut c = self.core.lock();
            c.fire_count = 0;
            c.missed = 0;
            c.pending = 0;
            self.core.transition(&mut c, ObserverState::Armed);
        }

        let (stop_tx, stop_rx) = oneshot::channel();
        let (done_tx, done_rx) = std_mpsc::channel();
        self.runtime.spawn(sample_until_disarmed(
            Arc::clone(&self.core),
            feed,
            stop_rx,
            detector,
            handler,
            done_tx,
        ));
        self.armed = Some(ArmedTask {
            stop: stop_tx,
            done: done_rx,
        });
        info!(observer = %self.core.name, sensor = %self.sensor.id(), threshold, baseline = ?current, "observer armed");
        Ok(())
    }

    /// Stop sampling and wait for outstanding handlers. A no-op when the
    /// observer is not armed.
    ///
    /// Samples the sensor delivered before this call are still evaluated;
    /// none are compared after it returns. Blocks the calling thread, so it
    /// must not be called from a task on the observer's runtime.
    pub fn disarm(&mut self) {
        let Some(armed) = self.armed.take() else {
            debug!(observer = %self.core.name, "disarm on a disabled observer");
            return;
        };
        let _ = armed.stop.send(());
        if armed.done.recv().is_err() {
            error!(observer = %self.core.name, "observer task ended abnormally");
        }
        if let Some(error) = self.missed_samples_error() {
            warn!(%error, "observer lost samples while armed");
        }
        let mut c = self.core.lock();
        self.core.transition(&mut c, ObserverState::Disabled);
        info!(observer = %self.core.name, fired = c.fire_count, missed = c.missed, "observer disarmed");
    }
}

impl Drop for ForceThresholdObserver {
    fn drop(&mut self) {
        if let Some(armed) = self.armed.take() {
            let _ = armed.stop.send(());
        }
    }
}

// ────────────────────────────────────────────────────────────────────────────
// Tasks
// ────────────────────────────────────────────────────────────────────────────

async fn sample_until_disarmed(
    core: Arc<ObserverCore>,
    mut feed: broadcast::Receiver<ForceSample>,
    mut stop: oneshot::Receiver<()>,
    mut detector: EdgeDetector,
    handler: ForceHandler,
    done: std_mpsc::Sender<()>,
) {
    let (lane_tx, lane_rx) = mpsc::unbounded_channel();
    let lane = tokio::spawn(run_handlers(Arc::clone(&core), lane_rx, handler));

    loop {
        tokio::select! {
            biased;
            _ = &mut stop => break,
            received = feed.recv() => match received {
                Ok(sample) => core.evaluate(&mut detector, sample, &lane_tx),
                Err(RecvError::Lagged(n)) => core.note_missed(n),
                Err(RecvError::Closed) => {
                    warn!(observer = %core.name, "force feed closed");
                    break;
                }
            },
        }
    }

    // Whatever the sensor already delivered is still compared.
    loop {
        match feed.try_recv() {
            Ok(sample) => core.evaluate(&mut detector, sample, &lane_tx),
            Err(TryRecvError::Lagged(n)) => core.note_missed(n),
            Err(TryRecvError::Empty | TryRecvError::Closed) => break,
        }
    }

    drop(feed);
    drop(lane_tx);
    if let Err(e) = lane.await {
        error!(observer = %core.name, error = %e, "handler lane failed");
    }
    let _ = done.send(());
}

async fn run_handlers(
    core: Arc<ObserverCore>,
    mut lane: mpsc::UnboundedReceiver<TriggerContext>,
    handler: ForceHandler,
) {
    while let Some(context) = lane.recv().await {
        let handler = Arc::clone(&handler);
        let fire_count = context.fire_count;
        let outcome = tokio::task::spawn_blocking(move || handler(&context)).await;
        let failure = match outcome {
            Ok(Ok(())) => {
                debug!(observer = %core.name, fire_count, "handler finished");
                None
            }
            Ok(Err(e)) => Some(e.to_string()),
            Err(join) if join.is_panic() => Some("handler panicked".to_string()),
            Err(join) => Some(join.to_string()),
        };
        if let Some(reason) = failure {
            error!(observer = %core.name, fire_count, error = %reason, "observer handler failed");
            core.publish(EventPayload::HandlerFailed {
                observer: core.name.clone(),
                error: reason,
            });
        }
        core.handler_done();
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use rivet_hal::sim::SimForceSensor;
    use rivet_middleware::Topic;
    use std::sync::atomic::{AtomicUsize, Ordering};
    use std::thread::ThreadId;
    use std::time::{Duration, Instant};

    fn runtime() -> tokio::runtime::Runtime {
        tokio::runtime::Builder::new_multi_thread()
            .worker_threads(2)
            .enable_all()
            .build()
            .unwrap()
    }

    fn observer(rt: &tokio::runtime::Runtime, sensor: &SimForceSensor) -> ForceThresholdObserver {
        ForceThresholdObserver::new("push", Arc::new(sensor.clone()), rt.handle().clone())
    }

    fn wait_until(cond: impl Fn() -> bool) -> bool {
        let deadline = Instant::now() + Duration::from_secs(2);
        while Instant::now() < deadline {
            if cond() {
                return true;
            }
            std::thread::sleep(Duration::from_millis(2));
        }
        cond()
    }

    fn recording_handler() -> (ForceHandler, Arc<Mutex<Vec<f64>>>) {
        let seen = Arc::new(Mutex::new(Vec::new()));
        let sink = Arc::clone(&seen);
        let handler: ForceHandler = Arc::new(move |ctx: &TriggerContext| {
            sink.lock().unwrap().push(ctx.magnitude);
            Ok(())
        });
        (handler, seen)
    }

    // ------------------------------------------------------------------ edges

    #[test]
    fn detector_fires_on_each_rising_edge_only() {
        let mut d = EdgeDetector::new(10.0);
        let fired: Vec<f64> = [2.0, 4.0, 11.0, 12.0, 3.0, 9.0, 15.0]
            .into_iter()
            .filter(|m| d.observe(*m))
            .collect();
        assert_eq!(fired, vec![11.0, 15.0]);
    }

    #[test]
    fn unprimed_detector_needs_a_baseline_below_threshold() {
        let mut d = EdgeDetector::new(10.0);
        assert!(!d.observe(12.0));
        assert!(!d.observe(14.0));
        assert!(!d.observe(5.0));
        assert!(d.observe(10.0), "equal to the threshold counts as crossed");
    }

    #[test]
    fn detector_primed_below_threshold_fires_on_the_first_sample() {
        let mut d = EdgeDetector::primed(10.0, Some(0.0));
        assert!(d.observe(15.0));
        assert!(!d.observe(16.0));
    }

    #[test]
    fn detector_primed_in_contact_waits_for_a_drop() {
        let mut d = EdgeDetector::primed(10.0, Some(12.0));
        assert!(!d.observe(14.0));
        assert!(!d.observe(5.0));
        assert!(d.observe(11.0));

        let mut unknown = EdgeDetector::primed(10.0, None);
        assert!(!unknown.observe(15.0));
    }

    #[test]
    fn detector_skips_non_finite_readings() {
        let mut d = EdgeDetector::new(10.0);
        assert!(!d.observe(1.0));
        assert!(!d.observe(f64::NAN));
        assert!(d.observe(11.0));
    }

    // ------------------------------------------------------------------ observer

    #[test]
    fn armed_observer_fires_handler_per_edge() {
        let rt = runtime();
        let sensor = SimForceSensor::new("flange");
        let mut obs = observer(&rt, &sensor);
        let (handler, seen) = recording_handler();

        obs.arm(10.0, handler).unwrap();
        for m in [2.0, 4.0, 11.0, 12.0, 3.0, 9.0, 15.0] {
            sensor.inject(m);
        }
        obs.disarm();

        assert_eq!(*seen.lock().unwrap(), vec![11.0, 15.0]);
        assert_eq!(obs.fire_count(), 2);
        assert_eq!(obs.state(), ObserverState::Disabled);
    }

    #[test]
    fn arming_at_rest_fires_on_the_first_contact_sample() {
        let rt = runtime();
        let sensor = SimForceSensor::new("flange");
        let mut obs = observer(&rt, &sensor);
        let (handler, seen) = recording_handler();

        sensor.inject(0.0);
        obs.arm(10.0, handler).unwrap();
        sensor.inject(15.0);
        obs.disarm();

        assert_eq!(*seen.lock().unwrap(), vec![15.0]);
        assert_eq!(obs.fire_count(), 1);
    }

    #[test]
    fn arming_in_contact_fires_only_after_release() {
        let rt = runtime();
        let sensor = SimForceSensor::new("flange");
        let mut obs = observer(&rt, &sensor);
        let (handler, seen) = recording_handler();

        sensor.inject(12.0);
        obs.arm(10.0, handler).unwrap();
        for m in [14.0, 4.0, 11.0] {
            sensor.inject(m);
        }
        obs.disarm();

        assert_eq!(*seen.lock().unwrap(), vec![11.0]);
    }

    #[test]
    fn handler_runs_off_the_arming_thread() {
        let rt = runtime();
        let sensor = SimForceSensor::new("flange");
        let mut obs = observer(&rt, &sensor);
        let ran_on: Arc<Mutex<Option<ThreadId>>> = Arc::new(Mutex::new(None));
        let slot = Arc::clone(&ran_on);

        obs.arm(
            10.0,
            Arc::new(move |_: &TriggerContext| {
                *slot.lock().unwrap() = Some(std::thread::current().id());
                Ok(())
            }),
        )
        .unwrap();
        sensor.inject(0.0);
        sensor.inject(20.0);
        obs.disarm();

        let ran_on = ran_on.lock().unwrap().expect("handler ran");
        assert_ne!(ran_on, std::thread::current().id());
    }

    #[test]
    fn failing_handlers_do_not_stop_the_observer() {
        let rt = runtime();
        let sensor = SimForceSensor::new("flange");
        let bus = EventBus::default();
        let mut alerts = bus.subscribe_to(Topic::Alerts);
        let mut obs = observer(&rt, &sensor).with_bus(bus);
        let calls = Arc::new(AtomicUsize::new(0));
        let counter = Arc::clone(&calls);

        obs.arm(
            10.0,
            Arc::new(move |_: &TriggerContext| {
                match counter.fetch_add(1, Ordering::SeqCst) {
                    0 => panic!("gripper on fire"),
                    1 => Err(RivetError::Operator("pendant unplugged".into())),
                    _ => Ok(()),
                }
            }),
        )
        .unwrap();
        for m in [0.0, 12.0, 0.0, 12.0, 0.0, 12.0] {
            sensor.inject(m);
        }
        obs.disarm();

        assert_eq!(calls.load(Ordering::SeqCst), 3);
        let failures = alerts
            .drain()
            .into_iter()
            .filter(|e| matches!(e.payload, EventPayload::HandlerFailed { .. }))
            .count();
        assert_eq!(failures, 2);
    }

    #[test]
    fn nothing_is_compared_after_disarm() {
        let rt = runtime();
        let sensor = SimForceSensor::new("flange");
        let mut obs = observer(&rt, &sensor);
        let (handler, seen) = recording_handler();

        obs.arm(10.0, handler).unwrap();
        sensor.inject(0.0);
        obs.disarm();
        assert_eq!(sensor.inject(50.0), 0, "no subscriber once disarmed");
        obs.disarm();

        assert!(seen.lock().unwrap().is_empty());
        assert_eq!(obs.state(), ObserverState::Disabled);
    }

    #[test]
    fn arming_twice_is_rejected_but_rearming_works() {
        let rt = runtime();
        let sensor = SimForceSensor::new("flange");
        let mut obs = observer(&rt, &sensor);
        let (handler, seen) = recording_handler();

        obs.arm(10.0, Arc::clone(&handler)).unwrap();
        assert_eq!(
            obs.arm(10.0, Arc::clone(&handler)),
            Err(RivetError::ObserverAlreadyArmed("push".into()))
        );
        obs.disarm();

        obs.arm(5.0, handler).unwrap();
        sensor.inject(1.0);
        sensor.inject(6.0);
        obs.disarm();
        assert_eq!(*seen.lock().unwrap(), vec![6.0]);
        assert_eq!(obs.fire_count(), 1);
    }

    #[test]
    fn non_positive_threshold_is_rejected() {
        let rt = runtime();
        let sensor = SimForceSensor::new("flange");
        let mut obs = observer(&rt, &sensor);
        let (handler, _) = recording_handler();
        assert!(matches!(
            obs.arm(0.0, handler),
            Err(RivetError::InvalidProfile(_))
        ));
        assert!(!obs.is_armed());
    }

    #[test]
    fn skipped_intervals_are_reported_to_handlers() {
        let rt = runtime();
        let sensor = SimForceSensor::new("flange");
        let bus = EventBus::default();
        let mut alerts = bus.subscribe_to(Topic::Alerts);
        let mut obs = observer(&rt, &sensor).with_bus(bus);
        let missed_at_fire = Arc::new(Mutex::new(None));
        let slot = Arc::clone(&missed_at_fire);

        obs.arm(
            10.0,
            Arc::new(move |ctx: &TriggerContext| {
                *slot.lock().unwrap() = Some(ctx.missed_samples);
                Ok(())
            }),
        )
        .unwrap();
        sensor.inject(1.0);
        let mut gap = ForceSample::now(11.0);
        gap.skipped_intervals = 3;
        sensor.inject_sample(gap);
        obs.disarm();

        assert_eq!(obs.missed_samples(), 3);
        assert_eq!(
            obs.missed_samples_error(),
            Some(RivetError::ObserverMissedSamples {
                observer: "push".into(),
                count: 3
            })
        );
        assert!(!obs.missed_samples_error().unwrap().is_fatal());
        assert_eq!(*missed_at_fire.lock().unwrap(), Some(3));
        assert!(alerts.drain().iter().any(|e| matches!(
            e.payload,
            EventPayload::MissedSamples { count: 3, .. }
        )));
    }

    #[test]
    fn state_is_triggered_while_a_handler_runs() {
        let rt = runtime();
        let sensor = SimForceSensor::new("flange");
        let mut obs = observer(&rt, &sensor);
        let (release_tx, release_rx) = std_mpsc::channel::<()>();
        let release_rx = Mutex::new(release_rx);

        obs.arm(
            10.0,
            Arc::new(move |_: &TriggerContext| {
                let _ = release_rx.lock().unwrap().recv();
                Ok(())
            }),
        )
        .unwrap();
        assert_eq!(obs.state(), ObserverState::Armed);
        sensor.inject(0.0);
        sensor.inject(12.0);

        assert!(wait_until(|| obs.state() == ObserverState::Triggered));
        release_tx.send(()).unwrap();
        assert!(wait_until(|| obs.state() == ObserverState::Armed));
        obs.disarm();
        assert_eq!(obs.state(), ObserverState::Disabled);
    }
}
