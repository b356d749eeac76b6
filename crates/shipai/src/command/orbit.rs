use glam::DVec3;
use tracing::{debug, warn};

use super::{live_target, owner_kinematics, resolve_target_handle, CommandContext, CommandStatus, Step};
use crate::flight::FlightDirective;
use crate::identity::IdentityTable;
use crate::path::{AiPath, LoadedAiPath, PlanRequest};
use crate::stream::{Reader, StreamError, Writer};
use crate::world::BodyId;

/// Reaches a circular orbit `orbit_height` above the target's surface and
/// holds it until superseded or the target disappears.
#[derive(Debug, Clone, PartialEq)]
pub struct OrbitCommand {
    target: Option<BodyId>,
    path: AiPath,
    orbit_height: f64,
}

impl OrbitCommand {
    pub fn new(target: BodyId, orbit_height: f64) -> Self {
        Self {
            target: Some(target),
            path: AiPath::unplanned(),
            orbit_height,
        }
    }

    pub fn target(&self) -> Option<BodyId> {
        self.target
    }

    pub fn path(&self) -> &AiPath {
        &self.path
    }

    pub fn orbit_height(&self) -> f64 {
        self.orbit_height
    }

    pub(super) fn on_deleted(&mut self, body: BodyId) {
        if self.target == Some(body) {
            self.target = None;
        }
        self.path.on_deleted(body);
    }

    pub(super) fn update(&mut self, owner: BodyId, ctx: &mut CommandContext<'_>) -> Step {
        let Some(target) = live_target(&mut self.target, ctx.world) else {
            warn!(ship = owner.0, "orbit_target_lost");
            return Step::Status(CommandStatus::Aborted);
        };
        let target_id = target.id;
        let target_position = target.position;
        let radius = target.radius + self.orbit_height;
        let Some(ship) = owner_kinematics(ctx.world, owner) else {
            return Step::Status(CommandStatus::Aborted);
        };

        let now = ctx.world.time();
        if self.path.needs_plan() || self.path.is_stale(ctx.world, ctx.tuning.replan_distance) {
            let radial = (ship.position - target_position)
                .try_normalize()
                .unwrap_or(DVec3::X);
            self.path = ctx.planner.plan(&PlanRequest {
                from: ship.position,
                to: target_position + radial * radius,
                frame: Some(target_id),
                frame_anchor: target_position,
                now,
                max_speed: ship.max_speed,
            });
            debug!(
                ship = owner.0,
                target = target_id.0,
                radius,
                end_time = self.path.end_time,
                "orbit_path_planned"
            );
        }

        let inserted = self.path.is_complete(now)
            || ship.position.distance(self.path.end_position) <= ctx.tuning.path_end_tolerance;
        let directive = if inserted {
            FlightDirective::HoldOrbit {
                center: target_id,
                radius,
            }
        } else {
            let lookahead = now + ctx.dt;
            FlightDirective::FlyToward {
                point: self.path.position_at(lookahead),
                end_speed: self.path.speed_at(lookahead),
                frame_velocity: DVec3::ZERO,
            }
        };
        ctx.world.issue_directive(owner, directive);
        Step::Status(CommandStatus::InProgress)
    }

    pub(super) fn save(&self, writer: &mut Writer, table: &IdentityTable) {
        writer.int32(table.lookup_handle(self.target));
        self.path.save(writer, table);
        writer.double(self.orbit_height);
    }

    pub(super) fn load(reader: &mut Reader<'_>) -> Result<LoadedOrbit, StreamError> {
        Ok(LoadedOrbit {
            target_handle: reader.int32()?,
            path: AiPath::load(reader)?,
            orbit_height: reader.double()?,
        })
    }
}

#[derive(Debug, Clone, Copy, PartialEq)]
pub struct LoadedOrbit {
    pub target_handle: i32,
    pub path: LoadedAiPath,
    pub orbit_height: f64,
}

impl LoadedOrbit {
    pub(super) fn post_load_fixup(self, table: &IdentityTable) -> OrbitCommand {
        OrbitCommand {
            target: resolve_target_handle(table, self.target_handle),
            path: self.path.post_load_fixup(table),
            orbit_height: self.orbit_height,
        }
    }
}
