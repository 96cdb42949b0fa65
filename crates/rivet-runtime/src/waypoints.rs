//! Named joint targets for one task.

use std::collections::BTreeMap;

use rivet_types::{JointPosition, RivetError, Waypoint};

use crate::profile::TaskProfile;

/// Read-only after construction; built once when a task initializes.
#[derive(Debug, Clone, Default)]
pub struct WaypointTable {
    entries: BTreeMap<String, Waypoint>,
}

impl WaypointTable {
    pub fn new() -> Self {
        Self::default()
    }

    /// Convert every waypoint in `profile` from degrees.
    ///
    /// # Errors
    ///
    /// [`RivetError::InvalidProfile`] for a velocity scale outside `(0, 1]`.
    pub fn from_profile(profile: &TaskProfile) -> Result<Self, RivetError> {
        let mut table = Self::new();
        for (name, spec) in &profile.waypoints {
            table.insert(Waypoint::new(
                name.clone(),
                JointPosition::from_degrees(spec.joints_deg),
                spec.velocity_scale,
            )?);
        }
        Ok(table)
    }

    /// Insert or replace a waypoint under its own name.
    pub fn insert(&mut self, waypoint: Waypoint) {
        self.entries.insert(waypoint.name().to_string(), waypoint);
    }

    /// # Errors
    ///
    /// [`RivetError::UnknownWaypoint`] when `name` was never defined.
    pub fn get(&self, name: &str) -> Result<&Waypoint, RivetError> {
        self.entries
            .get(name)
            .ok_or_else(|| RivetError::UnknownWaypoint(name.to_string()))
    }

    pub fn names(&self) -> impl Iterator<Item = &str> {
        self.entries.keys().map(String::as_str)
    }

    pub fn len(&self) -> usize {
        self.entries.len()
    }

    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::profile::{ScenarioKind, names};

    #[test]
    fn pick_and_place_table_holds_every_waypoint() {
        let table = WaypointTable::from_profile(&TaskProfile::builtin(ScenarioKind::PickAndPlace)).unwrap();
        assert_eq!(table.len(), 7);
        let suction = table.get(names::SUCTION).unwrap();
        assert_eq!(suction.velocity_scale(), 0.1);
        let deg = suction.joints().to_degrees();
        assert!((deg[1] - 82.77).abs() < 1e-9);
    }

    #[test]
    fn unknown_name_is_an_error() {
        let table = WaypointTable::from_profile(&TaskProfile::builtin(ScenarioKind::Listener)).unwrap();
        assert_eq!(table.names().collect::<Vec<_>>(), vec!["home"]);
        assert_eq!(
            table.get("nowhere").unwrap_err(),
            RivetError::UnknownWaypoint("nowhere".into())
        );
    }

    #[test]
    fn bad_velocity_scale_fails_construction() {
        let mut profile = TaskProfile::builtin(ScenarioKind::Compliance);
        profile.waypoints.get_mut(names::HOME).unwrap().velocity_scale = 1.5;
        assert!(matches!(
            WaypointTable::from_profile(&profile),
            Err(RivetError::InvalidProfile(_))
        ));
    }
}
