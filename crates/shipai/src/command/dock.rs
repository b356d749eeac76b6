use glam::DVec3;
use tracing::{debug, info, warn};

use super::{
    live_target, owner_kinematics, resolve_target_handle, Command, CommandContext, CommandStatus,
    Step,
};
use crate::flight::FlightDirective;
use crate::identity::IdentityTable;
use crate::path::{AiPath, LoadedAiPath, PlanRequest};
use crate::stream::{Reader, StreamError, Writer};
use crate::world::BodyId;

/// Flies to a station's approach point along a planned path, hands the final
/// approach to a precise FlyTo child, then docks.
#[derive(Debug, Clone, PartialEq)]
pub struct DockCommand {
    target: Option<BodyId>,
    path: AiPath,
}

impl DockCommand {
    pub fn new(station: BodyId) -> Self {
        Self {
            target: Some(station),
            path: AiPath::unplanned(),
        }
    }

    pub fn target(&self) -> Option<BodyId> {
        self.target
    }

    pub fn path(&self) -> &AiPath {
        &self.path
    }

    pub(super) fn on_deleted(&mut self, body: BodyId) {
        if self.target == Some(body) {
            self.target = None;
        }
        self.path.on_deleted(body);
    }

    pub(super) fn update(&mut self, owner: BodyId, ctx: &mut CommandContext<'_>) -> Step {
        let Some(station) = live_target(&mut self.target, ctx.world) else {
            warn!(ship = owner.0, "dock_target_lost");
            return Step::Status(CommandStatus::Aborted);
        };
        let (Some(port), Some(approach), Some(dock)) = (
            station.docking_port_position(),
            station.docking_approach_position(),
            station.docking,
        ) else {
            warn!(ship = owner.0, target = station.id.0, "dock_target_has_no_port");
            return Step::Status(CommandStatus::Aborted);
        };
        let station_id = station.id;
        let station_position = station.position;
        let Some(ship) = owner_kinematics(ctx.world, owner) else {
            return Step::Status(CommandStatus::Aborted);
        };

        if ship.position.distance(port) <= ctx.tuning.docking_radius {
            ctx.world
                .issue_directive(owner, FlightDirective::Dock { station: station_id });
            info!(ship = owner.0, station = station_id.0, "dock_complete");
            return Step::Status(CommandStatus::Succeeded);
        }

        let now = ctx.world.time();
        if self.path.needs_plan() || self.path.is_stale(ctx.world, ctx.tuning.replan_distance) {
            self.path = ctx.planner.plan(&PlanRequest {
                from: ship.position,
                to: approach,
                frame: Some(station_id),
                frame_anchor: station_position,
                now,
                max_speed: ship.max_speed,
            });
            debug!(
                ship = owner.0,
                station = station_id.0,
                end_time = self.path.end_time,
                "dock_path_planned"
            );
        }

        let at_path_end =
            ship.position.distance(self.path.end_position) <= ctx.tuning.path_end_tolerance;
        if self.path.is_complete(now) || at_path_end {
            return Step::Delegate(Command::fly_to_offset(owner, station_id, dock.offset, 0.0));
        }

        let lookahead = now + ctx.dt;
        ctx.world.issue_directive(
            owner,
            FlightDirective::FlyToward {
                point: self.path.position_at(lookahead),
                end_speed: self.path.speed_at(lookahead),
                frame_velocity: DVec3::ZERO,
            },
        );
        Step::Status(CommandStatus::InProgress)
    }

    pub(super) fn save(&self, writer: &mut Writer, table: &IdentityTable) {
        writer.int32(table.lookup_handle(self.target));
        self.path.save(writer, table);
    }

    pub(super) fn load(reader: &mut Reader<'_>) -> Result<LoadedDock, StreamError> {
        Ok(LoadedDock {
            target_handle: reader.int32()?,
            path: AiPath::load(reader)?,
        })
    }
}

#[derive(Debug, Clone, Copy, PartialEq)]
pub struct LoadedDock {
    pub target_handle: i32,
    pub path: LoadedAiPath,
}

impl LoadedDock {
    pub(super) fn post_load_fixup(self, table: &IdentityTable) -> DockCommand {
        DockCommand {
            target: resolve_target_handle(table, self.target_handle),
            path: self.path.post_load_fixup(table),
        }
    }
}
