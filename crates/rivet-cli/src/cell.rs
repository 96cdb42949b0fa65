//! The simulated work cell `/run` drives.
//!
//! One fresh controller and force sensor per run; recordings go to the
//! shared SQLite store under the configured recordings directory.

use std::fs;
use std::sync::Arc;
use std::time::Duration;

use rivet_hal::OperatorPrompt;
use rivet_hal::sim::{SimForceSensor, SimMotionController};
use rivet_recorder::SqliteRecorder;
use rivet_runtime::{ScenarioKind, TaskDevices};
use rivet_types::RivetError;

use crate::config::Config;

pub const CONTROLLER_ID: &str = "lbr_iiwa_14_r820";
pub const SENSOR_ID: &str = "flange-ft";

/// Force profiles replayed, one per compliant motion, so that observers
/// have something to react to.
pub fn contact_script(kind: ScenarioKind) -> Vec<Vec<f64>> {
    let press = vec![1.5, 4.0, 7.5, 12.0, 9.0];
    match kind {
        ScenarioKind::Compliance | ScenarioKind::StraightLine => vec![vec![0.5, 1.0, 0.8]],
        ScenarioKind::Listener => vec![press],
        // Approach and closer moves stay below the install threshold.
        ScenarioKind::PickAndPlace => vec![vec![0.5, 1.0], vec![1.0, 3.0], press],
    }
}

pub struct SimCell {
    pub controller: Arc<SimMotionController>,
    pub recorder: Arc<SqliteRecorder>,
    pub devices: TaskDevices,
}

impl SimCell {
    /// Assemble the cell for one run of `kind`.
    ///
    /// # Errors
    ///
    /// [`RivetError::Recorder`] when the recording store cannot be opened.
    pub fn assemble(
        cfg: &Config,
        kind: ScenarioKind,
        prompt: Arc<dyn OperatorPrompt>,
    ) -> Result<Self, RivetError> {
        let sensor = SimForceSensor::new(SENSOR_ID);
        let controller = contact_script(kind).into_iter().fold(
            SimMotionController::new(CONTROLLER_ID)
                .with_step_time(Duration::from_millis(cfg.sim_step_ms))
                .with_force_sensor(sensor.clone()),
            SimMotionController::with_contact,
        );
        let controller = Arc::new(controller);

        fs::create_dir_all(&cfg.recordings_dir).map_err(|e| {
            RivetError::Recorder(format!("cannot create {}: {e}", cfg.recordings_dir.display()))
        })?;
        let recorder = Arc::new(SqliteRecorder::open(cfg.recordings_db(), controller.clone())?);

        let devices = TaskDevices {
            controller: controller.clone(),
            sensor: Arc::new(sensor),
            recorder: recorder.clone(),
            prompt,
        };
        Ok(Self {
            controller,
            recorder,
            devices,
        })
    }
}
