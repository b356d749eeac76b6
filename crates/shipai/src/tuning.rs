use glam::DVec3;
use serde::{Deserialize, Serialize};

/// Behavioral constants shared by the commands, the planner and the flight
/// model. Every field has a default so partial config files are accepted.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default, deny_unknown_fields)]
pub struct AiTuning {
    /// FlyTo reports success inside this distance of its destination.
    pub arrival_tolerance: f64,
    /// A ship this close to a docking port completes the dock.
    pub docking_radius: f64,
    /// Plans are regenerated once their anchor body drifts this far.
    pub replan_distance: f64,
    /// Distance to the end of a plan at which the plan counts as flown.
    pub path_end_tolerance: f64,
    pub cruise_speed: f64,
    /// Tangential speed used while holding an orbit.
    pub orbit_speed: f64,
    pub loose_approach_offset: DVec3,
    pub loose_end_speed: f64,
    pub max_lead_time: f64,
    pub evade_distance: f64,
    pub evade_duration: f64,
    pub engagement_range: f64,
    pub ram_contact_margin: f64,
}

impl Default for AiTuning {
    fn default() -> Self {
        Self {
            arrival_tolerance: 25.0,
            docking_radius: 30.0,
            replan_distance: 200.0,
            path_end_tolerance: 50.0,
            cruise_speed: 300.0,
            orbit_speed: 150.0,
            loose_approach_offset: DVec3::new(0.0, 0.0, 500.0),
            loose_end_speed: 10.0,
            max_lead_time: 10.0,
            evade_distance: 150.0,
            evade_duration: 2.0,
            engagement_range: 1000.0,
            ram_contact_margin: 5.0,
        }
    }
}
