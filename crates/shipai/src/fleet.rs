use std::collections::BTreeMap;

use tracing::{debug, info};

use crate::command::{Command, CommandContext, CommandKind, CommandStatus};
use crate::world::BodyId;

/// A command that left its slot during [`Fleet::tick`].
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct CommandOutcome {
    pub ship: BodyId,
    pub kind: CommandKind,
    pub status: CommandStatus,
}

/// One command slot per ship, iterated in ship id order so ticks are
/// deterministic.
#[derive(Debug, Default)]
pub struct Fleet {
    commands: BTreeMap<BodyId, Command>,
}

impl Fleet {
    pub fn new() -> Self {
        Self::default()
    }

    /// Installs `command` in its owner's slot and returns the command it
    /// replaced, if any.
    pub fn give_command(&mut self, command: Command) -> Option<Command> {
        let ship = command.owner();
        let kind = command.kind();
        let replaced = self.commands.insert(ship, command);
        info!(
            ship = ship.0,
            kind = kind.name(),
            replaced = ?replaced.as_ref().map(|old| old.kind().name()),
            "command_installed"
        );
        replaced
    }

    pub fn cancel(&mut self, ship: BodyId) -> Option<Command> {
        let removed = self.commands.remove(&ship);
        if let Some(command) = removed.as_ref() {
            info!(ship = ship.0, kind = command.kind().name(), "command_cancelled");
        }
        removed
    }

    pub fn command_for(&self, ship: BodyId) -> Option<&Command> {
        self.commands.get(&ship)
    }

    pub fn command_for_mut(&mut self, ship: BodyId) -> Option<&mut Command> {
        self.commands.get_mut(&ship)
    }

    pub fn len(&self) -> usize {
        self.commands.len()
    }

    pub fn is_empty(&self) -> bool {
        self.commands.is_empty()
    }

    pub fn iter(&self) -> impl Iterator<Item = &Command> {
        self.commands.values()
    }

    pub fn clear(&mut self) {
        self.commands.clear();
    }

    /// Runs every command once. Commands that finish are removed from their
    /// slot and reported.
    pub fn tick(&mut self, ctx: &mut CommandContext<'_>) -> Vec<CommandOutcome> {
        let mut outcomes = Vec::new();
        self.commands.retain(|ship, command| {
            let status = command.time_step_update(ctx);
            if !status.is_done() {
                return true;
            }
            outcomes.push(CommandOutcome {
                ship: *ship,
                kind: command.kind(),
                status,
            });
            false
        });
        outcomes
    }

    /// Removal notification for `body`. The body's own slot is dropped and
    /// every remaining command gets to clear references to it.
    pub fn notify_deleted(&mut self, body: BodyId) {
        if let Some(command) = self.commands.remove(&body) {
            debug!(ship = body.0, kind = command.kind().name(), "command_owner_removed");
        }
        for command in self.commands.values_mut() {
            command.on_deleted(body);
        }
    }
}
