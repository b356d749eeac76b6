use glam::DVec3;
use tracing::{debug, warn};

use super::{live_target, owner_kinematics, resolve_target_handle, CommandContext, CommandStatus, Step};
use crate::flight::FlightDirective;
use crate::identity::IdentityTable;
use crate::stream::{Reader, StreamError, Writer};
use crate::world::BodyId;

/// Point approach to `target` offset by `posoff` in the target's frame,
/// arriving at relative speed `endvel`.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct FlyToCommand {
    target: Option<BodyId>,
    posoff: DVec3,
    endvel: f64,
}

impl FlyToCommand {
    pub fn new(target: BodyId, posoff: DVec3, endvel: f64) -> Self {
        Self {
            target: Some(target),
            posoff,
            endvel,
        }
    }

    pub fn target(&self) -> Option<BodyId> {
        self.target
    }

    pub fn offset(&self) -> DVec3 {
        self.posoff
    }

    pub fn end_speed(&self) -> f64 {
        self.endvel
    }

    pub(super) fn on_deleted(&mut self, body: BodyId) {
        if self.target == Some(body) {
            self.target = None;
        }
    }

    pub(super) fn update(&mut self, owner: BodyId, ctx: &mut CommandContext<'_>) -> Step {
        let Some(target) = live_target(&mut self.target, ctx.world) else {
            warn!(ship = owner.0, "fly_to_target_lost");
            return Step::Status(CommandStatus::Aborted);
        };
        let destination = target.local_to_world(self.posoff);
        let frame_velocity = target.velocity;
        let Some(ship) = owner_kinematics(ctx.world, owner) else {
            return Step::Status(CommandStatus::Aborted);
        };

        let distance = ship.position.distance(destination);
        if distance <= ctx.tuning.arrival_tolerance {
            // Station-keep at the destination once there.
            ctx.world.issue_directive(
                owner,
                FlightDirective::FlyToward {
                    point: destination,
                    end_speed: 0.0,
                    frame_velocity,
                },
            );
            debug!(ship = owner.0, distance, "fly_to_arrived");
            return Step::Status(CommandStatus::Succeeded);
        }

        ctx.world.issue_directive(
            owner,
            FlightDirective::FlyToward {
                point: destination,
                end_speed: self.endvel,
                frame_velocity,
            },
        );
        Step::Status(CommandStatus::InProgress)
    }

    pub(super) fn save(&self, writer: &mut Writer, table: &IdentityTable) {
        writer.int32(table.lookup_handle(self.target));
        writer.vector3d(self.posoff);
        writer.double(self.endvel);
    }

    pub(super) fn load(reader: &mut Reader<'_>) -> Result<LoadedFlyTo, StreamError> {
        Ok(LoadedFlyTo {
            target_handle: reader.int32()?,
            posoff: reader.vector3d()?,
            endvel: reader.double()?,
        })
    }
}

#[derive(Debug, Clone, Copy, PartialEq)]
pub struct LoadedFlyTo {
    pub target_handle: i32,
    pub posoff: DVec3,
    pub endvel: f64,
}

impl LoadedFlyTo {
    pub(super) fn post_load_fixup(self, table: &IdentityTable) -> FlyToCommand {
        FlyToCommand {
            target: resolve_target_handle(table, self.target_handle),
            posoff: self.posoff,
            endvel: self.endvel,
        }
    }
}
