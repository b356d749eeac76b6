//! Autonomous ship commands.
//!
//! A [`Command`] is one multi-tick behavior owned by a ship. It may delegate to
//! a single child command; the child always runs first and the parent only
//! resumes once the child reports a terminal [`CommandStatus`].
//!
//! Persistence happens in two typed stages. [`Command::load`] produces a
//! [`LoadedCommand`] whose references are raw identity handles, because the
//! bodies they name may appear later in the same stream.
//! [`LoadedCommand::post_load_fixup`] runs once every body exists and turns the
//! handles back into [`BodyId`]s.

mod dock;
mod fly_to;
mod journey;
mod kamikaze;
mod kill;
mod orbit;
#[cfg(test)]
mod tests;

use glam::DVec3;
use thiserror::Error;
use tracing::{debug, info, warn};

use crate::identity::IdentityTable;
use crate::path::TrajectoryPlanner;
use crate::stream::{Reader, StreamError, Writer};
use crate::tuning::AiTuning;
use crate::world::{Body, BodyId, SystemPath, World};

pub use dock::{DockCommand, LoadedDock};
pub use fly_to::{FlyToCommand, LoadedFlyTo};
pub use journey::JourneyCommand;
pub use kamikaze::{KamikazeCommand, LoadedKamikaze};
pub use kill::{KillCommand, LoadedKill, PursuitState};
pub use orbit::{LoadedOrbit, OrbitCommand};

/// Tag written for an empty command slot or a command without a child.
pub const NONE_TAG: i32 = 0;
/// Nesting limit enforced while reading; real chains are a few levels deep.
pub const MAX_CHAIN_DEPTH: usize = 32;

/// On-disk discriminant of each command variant. The numeric values are part
/// of the save format and must never be reordered.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum CommandKind {
    Journey,
    Dock,
    Orbit,
    FlyTo,
    Kill,
    Kamikaze,
}

impl CommandKind {
    pub const ALL: [CommandKind; 6] = [
        Self::Journey,
        Self::Dock,
        Self::Orbit,
        Self::FlyTo,
        Self::Kill,
        Self::Kamikaze,
    ];

    pub fn tag(self) -> i32 {
        match self {
            Self::Journey => 1,
            Self::Dock => 2,
            Self::Orbit => 3,
            Self::FlyTo => 4,
            Self::Kill => 5,
            Self::Kamikaze => 6,
        }
    }

    pub fn from_tag(tag: i32) -> Option<Self> {
        Self::ALL.into_iter().find(|kind| kind.tag() == tag)
    }

    pub fn name(self) -> &'static str {
        match self {
            Self::Journey => "journey",
            Self::Dock => "dock",
            Self::Orbit => "orbit",
            Self::FlyTo => "fly_to",
            Self::Kill => "kill",
            Self::Kamikaze => "kamikaze",
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum CommandStatus {
    InProgress,
    Succeeded,
    Aborted,
}

impl CommandStatus {
    /// The owner clears its slot once this is true.
    pub fn is_done(self) -> bool {
        !matches!(self, Self::InProgress)
    }
}

#[derive(Debug, Error)]
pub enum CommandLoadError {
    #[error(transparent)]
    Stream(#[from] StreamError),
    #[error("unknown command kind tag {tag} at offset {offset}")]
    UnknownCommandKind { tag: i32, offset: usize },
    #[error("command chain deeper than {max} levels at offset {offset}")]
    ChainTooDeep { max: usize, offset: usize },
    #[error("command owner handle {handle} does not resolve to a live body")]
    MissingOwner { handle: i32 },
}

/// Everything a command may touch during one tick.
pub struct CommandContext<'a> {
    pub world: &'a mut World,
    pub planner: &'a dyn TrajectoryPlanner,
    pub tuning: &'a AiTuning,
    pub dt: f64,
}

/// What a variant's own logic decided this tick.
#[derive(Debug)]
pub(crate) enum Step {
    Status(CommandStatus),
    Delegate(Command),
}

#[derive(Debug, Clone, PartialEq)]
pub enum CommandState {
    Journey(JourneyCommand),
    Dock(DockCommand),
    Orbit(OrbitCommand),
    FlyTo(FlyToCommand),
    Kill(KillCommand),
    Kamikaze(KamikazeCommand),
}

impl CommandState {
    pub fn kind(&self) -> CommandKind {
        match self {
            Self::Journey(_) => CommandKind::Journey,
            Self::Dock(_) => CommandKind::Dock,
            Self::Orbit(_) => CommandKind::Orbit,
            Self::FlyTo(_) => CommandKind::FlyTo,
            Self::Kill(_) => CommandKind::Kill,
            Self::Kamikaze(_) => CommandKind::Kamikaze,
        }
    }

    pub fn target(&self) -> Option<BodyId> {
        match self {
            Self::Journey(_) => None,
            Self::Dock(cmd) => cmd.target(),
            Self::Orbit(cmd) => cmd.target(),
            Self::FlyTo(cmd) => cmd.target(),
            Self::Kill(cmd) => cmd.target(),
            Self::Kamikaze(cmd) => cmd.target(),
        }
    }
}

#[derive(Debug, Clone, PartialEq)]
pub struct Command {
    owner: BodyId,
    child: Option<Box<Command>>,
    state: CommandState,
}

impl Command {
    pub fn new(owner: BodyId, state: CommandState) -> Self {
        Self {
            owner,
            child: None,
            state,
        }
    }

    pub fn journey(owner: BodyId, dest: SystemPath) -> Self {
        Self::new(owner, CommandState::Journey(JourneyCommand::new(dest)))
    }

    pub fn dock(owner: BodyId, station: BodyId) -> Self {
        Self::new(owner, CommandState::Dock(DockCommand::new(station)))
    }

    pub fn orbit(owner: BodyId, target: BodyId, orbit_height: f64) -> Self {
        Self::new(
            owner,
            CommandState::Orbit(OrbitCommand::new(target, orbit_height)),
        )
    }

    /// Casual approach: stand off from the target and arrive still moving.
    pub fn fly_to(owner: BodyId, target: BodyId, tuning: &AiTuning) -> Self {
        Self::fly_to_offset(
            owner,
            target,
            tuning.loose_approach_offset,
            tuning.loose_end_speed,
        )
    }

    /// Exact positioning: no offset, come to rest relative to the target.
    pub fn fly_to_precise(owner: BodyId, target: BodyId) -> Self {
        Self::fly_to_offset(owner, target, DVec3::ZERO, 0.0)
    }

    pub fn fly_to_offset(owner: BodyId, target: BodyId, posoff: DVec3, endvel: f64) -> Self {
        Self::new(
            owner,
            CommandState::FlyTo(FlyToCommand::new(target, posoff, endvel)),
        )
    }

    /// Samples the target's current velocity to seed the pursuit estimator.
    pub fn kill(owner: BodyId, target: BodyId, world: &World) -> Self {
        Self::new(owner, CommandState::Kill(KillCommand::new(target, world)))
    }

    pub fn kamikaze(owner: BodyId, target: BodyId) -> Self {
        Self::new(owner, CommandState::Kamikaze(KamikazeCommand::new(target)))
    }

    pub fn kind(&self) -> CommandKind {
        self.state.kind()
    }

    pub fn owner(&self) -> BodyId {
        self.owner
    }

    pub fn state(&self) -> &CommandState {
        &self.state
    }

    pub fn target(&self) -> Option<BodyId> {
        self.state.target()
    }

    pub fn child(&self) -> Option<&Command> {
        self.child.as_deref()
    }

    /// This command followed by its child, grandchild and so on.
    pub fn chain(&self) -> impl Iterator<Item = &Command> {
        std::iter::successors(Some(self), |command| command.child())
    }

    pub fn chain_depth(&self) -> usize {
        self.chain().count()
    }

    /// Advances the command by one tick.
    pub fn time_step_update(&mut self, ctx: &mut CommandContext<'_>) -> CommandStatus {
        if !self.process_child(ctx) {
            return CommandStatus::InProgress;
        }

        let owner = self.owner;
        let step = match &mut self.state {
            CommandState::Journey(cmd) => cmd.update(owner, ctx),
            CommandState::Dock(cmd) => cmd.update(owner, ctx),
            CommandState::Orbit(cmd) => cmd.update(owner, ctx),
            CommandState::FlyTo(cmd) => cmd.update(owner, ctx),
            CommandState::Kill(cmd) => cmd.update(owner, ctx),
            CommandState::Kamikaze(cmd) => cmd.update(owner, ctx),
        };

        match step {
            Step::Delegate(child) => {
                debug!(
                    ship = owner.0,
                    parent = self.kind().name(),
                    child = child.kind().name(),
                    "command_delegated"
                );
                self.child = Some(Box::new(child));
                CommandStatus::InProgress
            }
            Step::Status(status) => {
                match status {
                    CommandStatus::InProgress => {}
                    CommandStatus::Succeeded => {
                        debug!(ship = owner.0, kind = self.kind().name(), "command_succeeded");
                    }
                    CommandStatus::Aborted => {
                        info!(ship = owner.0, kind = self.kind().name(), "command_aborted");
                    }
                }
                status
            }
        }
    }

    /// Runs the active child, if any. Returns false while the child is still
    /// working; returns true when there is no child or the child just finished
    /// (it is dropped before returning).
    pub fn process_child(&mut self, ctx: &mut CommandContext<'_>) -> bool {
        let Some(child) = self.child.as_mut() else {
            return true;
        };
        let status = child.time_step_update(ctx);
        if !status.is_done() {
            return false;
        }
        debug!(
            ship = self.owner.0,
            child = child.kind().name(),
            status = ?status,
            "child_finished"
        );
        self.child = None;
        true
    }

    /// Removal notification for `body`. Clears any matching reference and
    /// always forwards to the child.
    pub fn on_deleted(&mut self, body: BodyId) {
        match &mut self.state {
            CommandState::Journey(_) => {}
            CommandState::Dock(cmd) => cmd.on_deleted(body),
            CommandState::Orbit(cmd) => cmd.on_deleted(body),
            CommandState::FlyTo(cmd) => cmd.on_deleted(body),
            CommandState::Kill(cmd) => cmd.on_deleted(body),
            CommandState::Kamikaze(cmd) => cmd.on_deleted(body),
        }
        if let Some(child) = self.child.as_mut() {
            child.on_deleted(body);
        }
    }

    pub fn save(&self, writer: &mut Writer, table: &IdentityTable) {
        writer.int32(self.kind().tag());
        writer.int32(table.lookup_handle(Some(self.owner)));
        match &self.state {
            CommandState::Journey(cmd) => cmd.save(writer),
            CommandState::Dock(cmd) => cmd.save(writer, table),
            CommandState::Orbit(cmd) => cmd.save(writer, table),
            CommandState::FlyTo(cmd) => cmd.save(writer, table),
            CommandState::Kill(cmd) => cmd.save(writer, table),
            CommandState::Kamikaze(cmd) => cmd.save(writer, table),
        }
        Self::save_slot(self.child(), writer, table);
    }

    /// Writes an optional command; an empty slot is a lone [`NONE_TAG`].
    pub fn save_slot(command: Option<&Command>, writer: &mut Writer, table: &IdentityTable) {
        match command {
            Some(command) => command.save(writer, table),
            None => writer.int32(NONE_TAG),
        }
    }

    /// Reads one command slot. An empty slot yields `Ok(None)`.
    pub fn load(reader: &mut Reader<'_>) -> Result<Option<LoadedCommand>, CommandLoadError> {
        Self::load_at_depth(reader, 0)
    }

    fn load_at_depth(
        reader: &mut Reader<'_>,
        depth: usize,
    ) -> Result<Option<LoadedCommand>, CommandLoadError> {
        let offset = reader.position();
        let tag = reader.int32()?;
        if tag == NONE_TAG {
            return Ok(None);
        }
        if depth >= MAX_CHAIN_DEPTH {
            return Err(CommandLoadError::ChainTooDeep {
                max: MAX_CHAIN_DEPTH,
                offset,
            });
        }
        let kind = CommandKind::from_tag(tag)
            .ok_or(CommandLoadError::UnknownCommandKind { tag, offset })?;
        let owner_handle = reader.int32()?;
        let state = match kind {
            CommandKind::Journey => LoadedState::Journey(JourneyCommand::load(reader)?),
            CommandKind::Dock => LoadedState::Dock(DockCommand::load(reader)?),
            CommandKind::Orbit => LoadedState::Orbit(OrbitCommand::load(reader)?),
            CommandKind::FlyTo => LoadedState::FlyTo(FlyToCommand::load(reader)?),
            CommandKind::Kill => LoadedState::Kill(KillCommand::load(reader)?),
            CommandKind::Kamikaze => LoadedState::Kamikaze(KamikazeCommand::load(reader)?),
        };
        let child = Self::load_at_depth(reader, depth + 1)?.map(Box::new);
        Ok(Some(LoadedCommand {
            owner_handle,
            state,
            child,
        }))
    }
}

#[derive(Debug, Clone, PartialEq)]
pub enum LoadedState {
    Journey(JourneyCommand),
    Dock(LoadedDock),
    Orbit(LoadedOrbit),
    FlyTo(LoadedFlyTo),
    Kill(LoadedKill),
    Kamikaze(LoadedKamikaze),
}

impl LoadedState {
    pub fn kind(&self) -> CommandKind {
        match self {
            Self::Journey(_) => CommandKind::Journey,
            Self::Dock(_) => CommandKind::Dock,
            Self::Orbit(_) => CommandKind::Orbit,
            Self::FlyTo(_) => CommandKind::FlyTo,
            Self::Kill(_) => CommandKind::Kill,
            Self::Kamikaze(_) => CommandKind::Kamikaze,
        }
    }

    fn post_load_fixup(self, table: &IdentityTable, world: &World) -> CommandState {
        match self {
            Self::Journey(cmd) => CommandState::Journey(cmd),
            Self::Dock(loaded) => CommandState::Dock(loaded.post_load_fixup(table)),
            Self::Orbit(loaded) => CommandState::Orbit(loaded.post_load_fixup(table)),
            Self::FlyTo(loaded) => CommandState::FlyTo(loaded.post_load_fixup(table)),
            Self::Kill(loaded) => CommandState::Kill(loaded.post_load_fixup(table, world)),
            Self::Kamikaze(loaded) => CommandState::Kamikaze(loaded.post_load_fixup(table)),
        }
    }
}

/// A command read from a stream whose references are still raw handles.
#[derive(Debug, Clone, PartialEq)]
pub struct LoadedCommand {
    pub owner_handle: i32,
    pub state: LoadedState,
    pub child: Option<Box<LoadedCommand>>,
}

impl LoadedCommand {
    pub fn kind(&self) -> CommandKind {
        self.state.kind()
    }

    /// Resolves every handle in the chain. Must run after all bodies of the
    /// load pass exist in `world` and `table` was built from them.
    pub fn post_load_fixup(
        self,
        table: &IdentityTable,
        world: &World,
    ) -> Result<Command, CommandLoadError> {
        let owner = table
            .lookup_body(self.owner_handle)
            .filter(|id| world.contains(*id))
            .ok_or(CommandLoadError::MissingOwner {
                handle: self.owner_handle,
            })?;
        let state = self.state.post_load_fixup(table, world);
        let child = match self.child {
            Some(child) => Some(Box::new(child.post_load_fixup(table, world)?)),
            None => None,
        };
        Ok(Command {
            owner,
            child,
            state,
        })
    }
}

/// Resolves a target reference against the world. A reference that no longer
/// resolves is cleared on the spot so it can never be used again.
pub(crate) fn live_target<'w>(target: &mut Option<BodyId>, world: &'w World) -> Option<&'w Body> {
    let id = (*target)?;
    match world.find_body(id) {
        Some(body) => Some(body),
        None => {
            warn!(target = id.0, "command_target_vanished");
            *target = None;
            None
        }
    }
}

/// Resolves a stored handle; an unresolvable non-null handle is a lost target.
pub(crate) fn resolve_target_handle(table: &IdentityTable, handle: i32) -> Option<BodyId> {
    let resolved = table.lookup_body(handle);
    if resolved.is_none() && handle != crate::identity::NULL_HANDLE {
        warn!(handle, "command_target_unresolved");
    }
    resolved
}

#[derive(Debug, Clone, Copy, PartialEq)]
pub(crate) struct OwnerKinematics {
    pub position: DVec3,
    pub velocity: DVec3,
    pub max_speed: f64,
}

pub(crate) fn owner_kinematics(world: &World, owner: BodyId) -> Option<OwnerKinematics> {
    let body = world.find_body(owner)?;
    let ship = body.ship.as_ref()?;
    Some(OwnerKinematics {
        position: body.position,
        velocity: body.velocity,
        max_speed: ship.max_speed,
    })
}

#[cfg(test)]
thread_local! {
    pub(crate) static DROPPED_COMMANDS: std::cell::Cell<usize> = const { std::cell::Cell::new(0) };
}

#[cfg(test)]
impl Drop for Command {
    fn drop(&mut self) {
        DROPPED_COMMANDS.with(|count| count.set(count.get() + 1));
    }
}
