use std::path::Path;

use tracing::{debug, info};

use crate::command::{Command, CommandContext};
use crate::fleet::{CommandOutcome, Fleet};
use crate::flight::{FlightModel, RamContact};
use crate::path::{LinearPlanner, TrajectoryPlanner};
use crate::snapshot::{self, Snapshot, SnapshotError};
use crate::tuning::AiTuning;
use crate::world::{BodyDesc, BodyId, World};

/// What happened during one [`Simulation::step`].
#[derive(Debug, Clone, Default, PartialEq)]
pub struct StepReport {
    pub outcomes: Vec<CommandOutcome>,
    pub ram_contacts: Vec<RamContact>,
    pub removed: Vec<BodyId>,
}

pub struct Simulation {
    world: World,
    fleet: Fleet,
    planner: Box<dyn TrajectoryPlanner>,
    flight: FlightModel,
    tuning: AiTuning,
    tick_count: u64,
}

impl Simulation {
    pub fn new(tuning: AiTuning) -> Self {
        Self::from_parts(World::default(), Fleet::new(), tuning)
    }

    pub fn from_parts(world: World, fleet: Fleet, tuning: AiTuning) -> Self {
        Self {
            world,
            fleet,
            planner: Box::new(LinearPlanner::new(tuning.cruise_speed)),
            flight: FlightModel,
            tuning,
            tick_count: 0,
        }
    }

    pub fn with_planner(mut self, planner: Box<dyn TrajectoryPlanner>) -> Self {
        self.planner = planner;
        self
    }

    pub fn world(&self) -> &World {
        &self.world
    }

    pub fn world_mut(&mut self) -> &mut World {
        &mut self.world
    }

    pub fn fleet(&self) -> &Fleet {
        &self.fleet
    }

    pub fn fleet_mut(&mut self) -> &mut Fleet {
        &mut self.fleet
    }

    pub fn tuning(&self) -> &AiTuning {
        &self.tuning
    }

    pub fn tick_count(&self) -> u64 {
        self.tick_count
    }

    /// Spawns a body and makes it live immediately. Only valid between steps.
    pub fn spawn_now(&mut self, desc: BodyDesc) -> BodyId {
        let id = self.world.spawn(desc);
        for removed in self.world.apply_pending() {
            self.fleet.notify_deleted(removed);
        }
        id
    }

    pub fn give_command(&mut self, command: Command) -> Option<Command> {
        self.fleet.give_command(command)
    }

    /// Queues a removal; it takes effect at the next safe point of
    /// [`Simulation::step`].
    pub fn despawn(&mut self, body: BodyId) -> bool {
        self.world.despawn(body)
    }

    /// Commands first, then motion. Bodies removed this tick are announced to
    /// every command before the clock advances.
    pub fn step(&mut self, dt: f64) -> StepReport {
        let outcomes = {
            let mut ctx = CommandContext {
                world: &mut self.world,
                planner: &*self.planner,
                tuning: &self.tuning,
                dt,
            };
            self.fleet.tick(&mut ctx)
        };
        for outcome in &outcomes {
            debug!(
                ship = outcome.ship.0,
                kind = outcome.kind.name(),
                status = ?outcome.status,
                "command_finished"
            );
        }

        let ram_contacts = self.flight.step(&mut self.world, dt, &self.tuning);
        for contact in &ram_contacts {
            info!(ship = contact.ship.0, target = contact.target.0, "ram_contact");
            self.world.despawn(contact.ship);
            self.world.despawn(contact.target);
        }

        let removed = self.world.apply_pending();
        for body in &removed {
            self.fleet.notify_deleted(*body);
        }

        self.world.advance_time(dt);
        self.tick_count += 1;
        StepReport {
            outcomes,
            ram_contacts,
            removed,
        }
    }

    pub fn snapshot_bytes(&self) -> Vec<u8> {
        snapshot::encode_snapshot(&self.world, &self.fleet)
    }

    pub fn save_to(&self, path: &Path) -> Result<(), SnapshotError> {
        snapshot::write_snapshot(path, &self.world, &self.fleet)
    }

    /// Rebuilds a simulation from a snapshot file. Body ids are reissued in
    /// file order; the tick counter restarts at zero.
    pub fn load_from(path: &Path, tuning: AiTuning) -> Result<Self, SnapshotError> {
        let Snapshot { world, fleet } = snapshot::read_snapshot(path)?;
        Ok(Self::from_parts(world, fleet, tuning))
    }
}
