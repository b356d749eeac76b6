use glam::DVec3;
use tracing::warn;

use crate::identity::{IdentityTable, NULL_HANDLE};
use crate::stream::{Reader, StreamError, Writer};
use crate::world::{BodyId, World};

const MIN_PLAN_DURATION_SECONDS: f64 = 0.1;
// Peak speed of a smoothstep profile is 1.5x its average speed.
const SMOOTHSTEP_PEAK_FACTOR: f64 = 1.5;

/// A timed trajectory between two world positions, anchored to the body whose
/// frame it was planned in. `end_time == 0.0` means no plan exists yet.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct AiPath {
    pub start_time: f64,
    pub end_time: f64,
    pub start_position: DVec3,
    pub end_position: DVec3,
    pub frame: Option<BodyId>,
    pub frame_anchor: DVec3,
}

impl Default for AiPath {
    fn default() -> Self {
        Self::unplanned()
    }
}

impl AiPath {
    pub fn unplanned() -> Self {
        Self {
            start_time: 0.0,
            end_time: 0.0,
            start_position: DVec3::ZERO,
            end_position: DVec3::ZERO,
            frame: None,
            frame_anchor: DVec3::ZERO,
        }
    }

    pub fn needs_plan(&self) -> bool {
        self.end_time == 0.0
    }

    pub fn invalidate(&mut self) {
        *self = Self::unplanned();
    }

    pub fn is_complete(&self, now: f64) -> bool {
        !self.needs_plan() && now >= self.end_time
    }

    fn progress(&self, now: f64) -> f64 {
        let duration = self.end_time - self.start_time;
        if duration <= 0.0 {
            return 1.0;
        }
        ((now - self.start_time) / duration).clamp(0.0, 1.0)
    }

    pub fn position_at(&self, now: f64) -> DVec3 {
        let u = self.progress(now);
        let s = u * u * (3.0 - 2.0 * u);
        self.start_position + (self.end_position - self.start_position) * s
    }

    pub fn speed_at(&self, now: f64) -> f64 {
        let duration = self.end_time - self.start_time;
        if duration <= 0.0 {
            return 0.0;
        }
        let u = self.progress(now);
        let length = self.start_position.distance(self.end_position);
        length / duration * 6.0 * u * (1.0 - u)
    }

    /// True when the frame body vanished or drifted further than
    /// `replan_distance` from where it was at planning time.
    pub fn is_stale(&self, world: &World, replan_distance: f64) -> bool {
        let Some(frame) = self.frame else {
            return false;
        };
        match world.find_body(frame) {
            Some(body) => body.position.distance(self.frame_anchor) > replan_distance,
            None => true,
        }
    }

    /// Called when the frame body is removed from the world.
    pub fn on_deleted(&mut self, body: BodyId) {
        if self.frame == Some(body) {
            self.invalidate();
        }
    }

    pub fn save(&self, writer: &mut Writer, table: &IdentityTable) {
        writer.double(self.start_time);
        writer.double(self.end_time);
        writer.vector3d(self.start_position);
        writer.vector3d(self.end_position);
        writer.int32(table.lookup_handle(self.frame));
        writer.vector3d(self.frame_anchor);
    }

    pub fn load(reader: &mut Reader<'_>) -> Result<LoadedAiPath, StreamError> {
        Ok(LoadedAiPath {
            start_time: reader.double()?,
            end_time: reader.double()?,
            start_position: reader.vector3d()?,
            end_position: reader.vector3d()?,
            frame_handle: reader.int32()?,
            frame_anchor: reader.vector3d()?,
        })
    }
}

/// An `AiPath` fresh off the stream, still holding its frame as a raw handle.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct LoadedAiPath {
    pub start_time: f64,
    pub end_time: f64,
    pub start_position: DVec3,
    pub end_position: DVec3,
    pub frame_handle: i32,
    pub frame_anchor: DVec3,
}

impl LoadedAiPath {
    pub fn post_load_fixup(self, table: &IdentityTable) -> AiPath {
        let frame = table.lookup_body(self.frame_handle);
        if frame.is_none() && self.frame_handle != NULL_HANDLE {
            // The plan is meaningless without its frame; force a replan.
            warn!(handle = self.frame_handle, "path_frame_unresolved");
            return AiPath::unplanned();
        }
        AiPath {
            start_time: self.start_time,
            end_time: self.end_time,
            start_position: self.start_position,
            end_position: self.end_position,
            frame,
            frame_anchor: self.frame_anchor,
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq)]
pub struct PlanRequest {
    pub from: DVec3,
    pub to: DVec3,
    pub frame: Option<BodyId>,
    pub frame_anchor: DVec3,
    pub now: f64,
    pub max_speed: f64,
}

pub trait TrajectoryPlanner {
    fn plan(&self, request: &PlanRequest) -> AiPath;
}

/// Straight line with a smoothstep speed profile, timed so the peak speed
/// stays under both the cruise speed and the ship's limit.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct LinearPlanner {
    pub cruise_speed: f64,
}

impl LinearPlanner {
    pub fn new(cruise_speed: f64) -> Self {
        Self { cruise_speed }
    }
}

impl TrajectoryPlanner for LinearPlanner {
    fn plan(&self, request: &PlanRequest) -> AiPath {
        let speed = self.cruise_speed.min(request.max_speed).max(1e-3);
        let distance = request.from.distance(request.to);
        let duration = (distance / speed * SMOOTHSTEP_PEAK_FACTOR).max(MIN_PLAN_DURATION_SECONDS);
        AiPath {
            start_time: request.now,
            end_time: request.now + duration,
            start_position: request.from,
            end_position: request.to,
            frame: request.frame,
            frame_anchor: request.frame_anchor,
        }
    }
}
