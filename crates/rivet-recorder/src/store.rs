//! SQLite-backed recorder.
//!
//! `start` spawns a sampling thread that reads every configured channel from
//! a [`TelemetrySource`] once per sampling interval until `stop` is called or
//! the capture window elapses. Samples are buffered in memory and written in
//! a single transaction by `stop`, so the artifact is complete when `stop`
//! returns.
//!
//! # Storage layout
//!
//! | table | column | description |
//! |---|---|---|
//! | `sessions` | `id` | UUID v4 primary key |
//! | | `name` | Session name, e.g. `bubblePop` |
//! | | `channels` | Comma-separated channel names |
//! | | `sample_interval_ms` | Sampling interval |
//! | | `started_at` / `stopped_at` | RFC-3339 (UTC) |
//! | | `sample_count` | Rows written to `samples` |
//! | `samples` | `session_id` | Owning session |
//! | | `t_ms` | Milliseconds since start |
//! | | `channel` | Channel name |
//! | | `vals` | Little-endian f64 vector |
//!
//! # Example
//!
//! ```rust
//! use std::sync::Arc;
//! use std::time::Duration;
//! use rivet_hal::{Recorder, sim::SimMotionController};
//! use rivet_recorder::SqliteRecorder;
//! use rivet_types::{RecordingChannel, SessionConfig};
//!
//! let source = Arc::new(SimMotionController::new("lbr"));
//! let recorder = SqliteRecorder::open_in_memory(source).unwrap();
//!
//! let config = SessionConfig::new(
//!     "28MayTest",
//!     [RecordingChannel::MeasuredPose],
//!     Duration::from_millis(10),
//!     Duration::from_secs(45),
//! ).unwrap();
//! recorder.start(&config).unwrap();
//! let location = recorder.stop().unwrap();
//! assert!(location.to_string().contains(&config.id.to_string()));
//! assert!(!recorder.samples(config.id).unwrap().is_empty());
//! ```

use std::path::Path;
use std::sync::mpsc::{self, RecvTimeoutError};
use std::sync::{Arc, Mutex, MutexGuard, PoisonError};
use std::thread::{self, JoinHandle};
use std::time::Instant;

use chrono::{DateTime, Utc};
use rivet_hal::{Recorder, TelemetrySource};
use rivet_types::{ArtifactLocation, RecordingChannel, RivetError, SessionConfig};
use rusqlite::{Connection, params};
use serde::{Deserialize, Serialize};
use thiserror::Error;
use tracing::{debug, info, warn};
use uuid::Uuid;

// ─────────────────────────────────────────────────────────────────────────────
// Error type
// ─────────────────────────────────────────────────────────────────────────────

#[derive(Error, Debug)]
pub enum RecorderError {
    #[error("SQLite error: {0}")]
    Sqlite(#[from] rusqlite::Error),
    #[error("I/O error: {0}")]
    Io(#[from] std::io::Error),
    #[error("capture already open: {0}")]
    AlreadyOpen(String),
    #[error("no capture open")]
    NotOpen,
    #[error("sampling thread for '{0}' panicked")]
    SamplerPanicked(String),
    #[error("corrupt row: {0}")]
    Corrupt(String),
}

impl From<RecorderError> for RivetError {
    fn from(err: RecorderError) -> Self {
        RivetError::Recorder(err.to_string())
    }
}

// ─────────────────────────────────────────────────────────────────────────────
// Records
// ─────────────────────────────────────────────────────────────────────────────

/// One channel reading.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct RecordedSample {
    pub t_ms: u64,
    pub channel: RecordingChannel,
    pub values: Vec<f64>,
}

/// A persisted session, without its samples.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct SessionSummary {
    pub id: Uuid,
    pub name: String,
    pub channels: Vec<RecordingChannel>,
    pub sample_interval_ms: u64,
    pub started_at: DateTime<Utc>,
    pub stopped_at: DateTime<Utc>,
    pub sample_count: u64,
}

fn values_to_bytes(values: &[f64]) -> Vec<u8> {
    values.iter().flat_map(|v| v.to_le_bytes()).collect()
}

fn bytes_to_values(bytes: &[u8]) -> Vec<f64> {
    bytes
        .chunks_exact(8)
        .map(|c| f64::from_le_bytes([c[0], c[1], c[2], c[3], c[4], c[5], c[6], c[7]]))
        .collect()
}

fn lock<T>(mutex: &Mutex<T>) -> MutexGuard<'_, T> {
    mutex.lock().unwrap_or_else(PoisonError::into_inner)
}

// ─────────────────────────────────────────────────────────────────────────────
// Sampling thread
// ─────────────────────────────────────────────────────────────────────────────

struct Capture {
    config: SessionConfig,
    started_at: DateTime<Utc>,
    stop_tx: mpsc::Sender<()>,
    worker: JoinHandle<Vec<RecordedSample>>,
}

fn sample_until_stopped(
    config: &SessionConfig,
    source: &dyn TelemetrySource,
    stop_rx: &mpsc::Receiver<()>,
) -> Vec<RecordedSample> {
    let started = Instant::now();
    let mut samples = Vec::new();
    loop {
        let elapsed = started.elapsed();
        if elapsed >= config.max_duration {
            info!(session = %config.name, "capture window elapsed; waiting for stop");
            // Both a stop signal and a dropped sender end the capture.
            let _ = stop_rx.recv();
            break;
        }
        let t_ms = elapsed.as_millis() as u64;
        for channel in config.channels() {
            match source.read(*channel) {
                Some(values) => samples.push(RecordedSample {
                    t_ms,
                    channel: *channel,
                    values,
                }),
                None => debug!(%channel, "channel not provided by telemetry source"),
            }
        }
        match stop_rx.recv_timeout(config.sample_interval) {
            Err(RecvTimeoutError::Timeout) => continue,
            Ok(()) | Err(RecvTimeoutError::Disconnected) => break,
        }
    }
    samples
}

// ─────────────────────────────────────────────────────────────────────────────
// SqliteRecorder
// ─────────────────────────────────────────────────────────────────────────────

/// A [`Recorder`] persisting captures to SQLite.
pub struct SqliteRecorder {
    conn: Mutex<Connection>,
    location: String,
    source: Arc<dyn TelemetrySource>,
    capture: Mutex<Option<Capture>>,
}

impl SqliteRecorder {
    /// Open (or create) a persistent database at `path`.
    pub fn open(path: impl AsRef<Path>, source: Arc<dyn TelemetrySource>) -> Result<Self, RecorderError> {
        let path = path.as_ref();
        let conn = Connection::open(path)?;
        Self::with_connection(conn, path.display().to_string(), source)
    }

    /// Open a temporary in-memory database (useful for testing).
    pub fn open_in_memory(source: Arc<dyn TelemetrySource>) -> Result<Self, RecorderError> {
        Self::with_connection(Connection::open_in_memory()?, ":memory:".to_string(), source)
    }

    fn with_connection(
        conn: Connection,
        location: String,
        source: Arc<dyn TelemetrySource>,
    ) -> Result<Self, RecorderError> {
        conn.execute_batch(
            "CREATE TABLE IF NOT EXISTS sessions (
                id                 TEXT NOT NULL PRIMARY KEY,
                name               TEXT NOT NULL,
                channels           TEXT NOT NULL,
                sample_interval_ms INTEGER NOT NULL,
                started_at         TEXT NOT NULL,
                stopped_at         TEXT NOT NULL,
                sample_count       INTEGER NOT NULL
            );
            CREATE TABLE IF NOT EXISTS samples (
                session_id TEXT NOT NULL REFERENCES sessions(id),
                t_ms       INTEGER NOT NULL,
                channel    TEXT NOT NULL,
                vals       BLOB NOT NULL
            );
            CREATE INDEX IF NOT EXISTS samples_by_session ON samples(session_id, t_ms);",
        )?;
        Ok(Self {
            conn: Mutex::new(conn),
            location,
            source,
            capture: Mutex::new(None),
        })
    }

    pub fn is_capturing(&self) -> bool {
        lock(&self.capture).is_some()
    }

    /// Begin a capture. See [`Recorder::start`].
    pub fn begin(&self, config: &SessionConfig) -> Result<(), RecorderError> {
        let mut capture = lock(&self.capture);
        if let Some(open) = capture.as_ref() {
            return Err(RecorderError::AlreadyOpen(open.config.name.clone()));
        }
        let (stop_tx, stop_rx) = mpsc::channel();
        let source = Arc::clone(&self.source);
        let thread_config = config.clone();
        let worker = thread::Builder::new()
            .name(format!("rivet-recorder-{}", config.name))
            .spawn(move || sample_until_stopped(&thread_config, source.as_ref(), &stop_rx))?;
        *capture = Some(Capture {
            config: config.clone(),
            started_at: Utc::now(),
            stop_tx,
            worker,
        });
        info!(session = %config.name, id = %config.id, channels = config.channels().len(), "capture started");
        Ok(())
    }

    /// End the capture and persist it. See [`Recorder::stop`].
    pub fn finish(&self) -> Result<ArtifactLocation, RecorderError> {
        let capture = lock(&self.capture).take().ok_or(RecorderError::NotOpen)?;
        // The sampler may already have exited on its own.
        let _ = capture.stop_tx.send(());
        let samples = capture
            .worker
            .join()
            .map_err(|_| RecorderError::SamplerPanicked(capture.config.name.clone()))?;
        let stopped_at = Utc::now();
        self.persist(&capture.config, capture.started_at, stopped_at, &samples)?;
        let location = ArtifactLocation(format!(
            "sqlite://{}?session={}",
            self.location, capture.config.id
        ));
        info!(session = %capture.config.name, samples = samples.len(), %location, "capture flushed");
        Ok(location)
    }

    fn persist(
        &self,
        config: &SessionConfig,
        started_at: DateTime<Utc>,
        stopped_at: DateTime<Utc>,
        samples: &[RecordedSample],
    ) -> Result<(), RecorderError> {
        let mut conn = lock(&self.conn);
        let tx = conn.transaction()?;
        let channels: Vec<&str> = config.channels().iter().map(|c| c.as_str()).collect();
        tx.execute(
            "INSERT INTO sessions
                 (id, name, channels, sample_interval_ms, started_at, stopped_at, sample_count)
             VALUES (?1, ?2, ?3, ?4, ?5, ?6, ?7)",
            params![
                config.id.to_string(),
                config.name,
                channels.join(","),
                config.sample_interval.as_millis() as i64,
                started_at.to_rfc3339(),
                stopped_at.to_rfc3339(),
                samples.len() as i64,
            ],
        )?;
        {
            let mut stmt = tx.prepare(
                "INSERT INTO samples (session_id, t_ms, channel, vals) VALUES (?1, ?2, ?3, ?4)",
            )?;
            let id = config.id.to_string();
            for sample in samples {
                stmt.execute(params![
                    id,
                    sample.t_ms as i64,
                    sample.channel.as_str(),
                    values_to_bytes(&sample.values),
                ])?;
            }
        }
        tx.commit()?;
        Ok(())
    }

    /// All persisted sessions, oldest first.
    pub fn sessions(&self) -> Result<Vec<SessionSummary>, RecorderError> {
        let conn = lock(&self.conn);
        let mut stmt = conn.prepare(
            "SELECT id, name, channels, sample_interval_ms, started_at, stopped_at, sample_count
             FROM sessions
             ORDER BY started_at ASC",
        )?;
        let rows = stmt.query_map([], |row| {
            Ok((
                row.get::<_, String>(0)?,
                row.get::<_, String>(1)?,
                row.get::<_, String>(2)?,
                row.get::<_, i64>(3)?,
                row.get::<_, String>(4)?,
                row.get::<_, String>(5)?,
                row.get::<_, i64>(6)?,
            ))
        })?;

        let mut sessions = Vec::new();
        for row in rows {
            let (id, name, channels, interval, started, stopped, count) = row?;
            let channels = channels
                .split(',')
                .filter(|s| !s.is_empty())
                .map(|s| {
                    RecordingChannel::parse(s)
                        .ok_or_else(|| RecorderError::Corrupt(format!("unknown channel '{s}'")))
                })
                .collect::<Result<Vec<_>, _>>()?;
            sessions.push(SessionSummary {
                id: parse_uuid(&id)?,
                name,
                channels,
                sample_interval_ms: interval as u64,
                started_at: parse_time(&started)?,
                stopped_at: parse_time(&stopped)?,
                sample_count: count as u64,
            });
        }
        Ok(sessions)
    }

    /// Samples of one session in capture order.
    pub fn samples(&self, session: Uuid) -> Result<Vec<RecordedSample>, RecorderError> {
        let conn = lock(&self.conn);
        let mut stmt = conn.prepare(
            "SELECT t_ms, channel, vals FROM samples
             WHERE session_id = ?1
             ORDER BY rowid ASC",
        )?;
        let rows = stmt.query_map(params![session.to_string()], |row| {
            Ok((
                row.get::<_, i64>(0)?,
                row.get::<_, String>(1)?,
                row.get::<_, Vec<u8>>(2)?,
            ))
        })?;

        let mut samples = Vec::new();
        for row in rows {
            let (t_ms, channel, blob) = row?;
            let channel = RecordingChannel::parse(&channel)
                .ok_or_else(|| RecorderError::Corrupt(format!("unknown channel '{channel}'")))?;
            samples.push(RecordedSample {
                t_ms: t_ms as u64,
                channel,
                values: bytes_to_values(&blob),
            });
        }
        Ok(samples)
    }
}

fn parse_uuid(s: &str) -> Result<Uuid, RecorderError> {
    Uuid::parse_str(s).map_err(|e| RecorderError::Corrupt(format!("bad session id '{s}': {e}")))
}

fn parse_time(s: &str) -> Result<DateTime<Utc>, RecorderError> {
    DateTime::parse_from_rfc3339(s)
        .map(|t| t.with_timezone(&Utc))
        .map_err(|e| RecorderError::Corrupt(format!("bad timestamp '{s}': {e}")))
}

impl Recorder for SqliteRecorder {
    fn start(&self, config: &SessionConfig) -> Result<(), RivetError> {
        Ok(self.begin(config)?)
    }

    fn stop(&self) -> Result<ArtifactLocation, RivetError> {
        Ok(self.finish()?)
    }
}

impl Drop for SqliteRecorder {
    fn drop(&mut self) {
        if self.is_capturing() {
            warn!("recorder dropped with an open capture; flushing");
            if let Err(e) = self.finish() {
                warn!(error = %e, "flush on drop failed");
            }
        }
    }
}
