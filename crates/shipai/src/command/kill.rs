use glam::DVec3;
use tracing::{debug, warn};

use super::{live_target, owner_kinematics, resolve_target_handle, CommandContext, CommandStatus, Step};
use crate::flight::FlightDirective;
use crate::identity::IdentityTable;
use crate::stream::{Reader, StreamError, Writer};
use crate::world::{BodyId, World};

/// Rolling intercept estimates. Never persisted: a reload starts from the
/// neutral state and rebuilds it over the following ticks.
#[derive(Debug, Clone, Copy, Default, PartialEq)]
pub struct PursuitState {
    pub lead_time: f64,
    pub evade_time: f64,
    pub close_time: f64,
    pub lead_offset: DVec3,
    pub lead_drift: DVec3,
    pub last_vel: DVec3,
}

impl PursuitState {
    pub fn neutral(last_vel: DVec3) -> Self {
        Self {
            last_vel,
            ..Self::default()
        }
    }
}

/// Pursues a target with lead estimation and breaks away when too close.
/// Only ends when the target is gone.
#[derive(Debug, Clone, PartialEq)]
pub struct KillCommand {
    target: Option<BodyId>,
    pursuit: PursuitState,
}

impl KillCommand {
    pub fn new(target: BodyId, world: &World) -> Self {
        Self {
            target: Some(target),
            pursuit: PursuitState::neutral(sample_velocity(world, Some(target))),
        }
    }

    pub fn target(&self) -> Option<BodyId> {
        self.target
    }

    pub fn pursuit(&self) -> &PursuitState {
        &self.pursuit
    }

    pub fn pursuit_mut(&mut self) -> &mut PursuitState {
        &mut self.pursuit
    }

    pub(super) fn on_deleted(&mut self, body: BodyId) {
        if self.target == Some(body) {
            self.target = None;
        }
    }

    pub(super) fn update(&mut self, owner: BodyId, ctx: &mut CommandContext<'_>) -> Step {
        let Some(target) = live_target(&mut self.target, ctx.world) else {
            warn!(ship = owner.0, "kill_target_lost");
            return Step::Status(CommandStatus::Aborted);
        };
        let target_position = target.position;
        let target_velocity = target.velocity;
        let Some(ship) = owner_kinematics(ctx.world, owner) else {
            return Step::Status(CommandStatus::Aborted);
        };
        let tuning = ctx.tuning;
        let dt = ctx.dt.max(1e-9);
        let pursuit = &mut self.pursuit;

        let observed_accel = (target_velocity - pursuit.last_vel) / dt;
        pursuit.last_vel = target_velocity;

        let distance = ship.position.distance(target_position);
        let relative_velocity = target_velocity - ship.velocity;
        pursuit.lead_time = (distance / ship.max_speed.max(1e-3)).min(tuning.max_lead_time);
        pursuit.lead_offset = relative_velocity * pursuit.lead_time;
        pursuit.lead_drift = observed_accel * (0.5 * pursuit.lead_time * pursuit.lead_time);

        if distance > tuning.engagement_range {
            pursuit.close_time += dt;
        } else {
            pursuit.close_time = 0.0;
        }

        let directive = if pursuit.evade_time > 0.0 {
            pursuit.evade_time = (pursuit.evade_time - dt).max(0.0);
            FlightDirective::Evade {
                away_from: target_position,
            }
        } else if distance < tuning.evade_distance {
            pursuit.evade_time = tuning.evade_duration;
            debug!(ship = owner.0, distance, "kill_evade_started");
            FlightDirective::Evade {
                away_from: target_position,
            }
        } else {
            FlightDirective::Pursue {
                aim: target_position + pursuit.lead_offset + pursuit.lead_drift,
            }
        };
        ctx.world.issue_directive(owner, directive);
        Step::Status(CommandStatus::InProgress)
    }

    pub(super) fn save(&self, writer: &mut Writer, table: &IdentityTable) {
        writer.int32(table.lookup_handle(self.target));
    }

    pub(super) fn load(reader: &mut Reader<'_>) -> Result<LoadedKill, StreamError> {
        Ok(LoadedKill {
            target_handle: reader.int32()?,
        })
    }
}

fn sample_velocity(world: &World, target: Option<BodyId>) -> DVec3 {
    target
        .and_then(|id| world.find_body(id))
        .map(|body| body.velocity)
        .unwrap_or(DVec3::ZERO)
}

#[derive(Debug, Clone, Copy, PartialEq)]
pub struct LoadedKill {
    pub target_handle: i32,
}

impl LoadedKill {
    /// Resolves the target and re-samples its velocity from the live world.
    pub(super) fn post_load_fixup(self, table: &IdentityTable, world: &World) -> KillCommand {
        let target = resolve_target_handle(table, self.target_handle);
        KillCommand {
            target,
            pursuit: PursuitState::neutral(sample_velocity(world, target)),
        }
    }
}
