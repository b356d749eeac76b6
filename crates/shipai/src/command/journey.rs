use tracing::info;

use super::{CommandContext, CommandStatus, Step};
use crate::flight::FlightDirective;
use crate::stream::{Reader, StreamError, Writer};
use crate::world::{BodyId, SystemPath};

/// Hands the destination to the hyperdrive and finishes immediately; the
/// jump itself is carried out outside the command.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct JourneyCommand {
    dest: SystemPath,
}

impl JourneyCommand {
    pub fn new(dest: SystemPath) -> Self {
        Self { dest }
    }

    pub fn destination(&self) -> SystemPath {
        self.dest
    }

    pub(super) fn update(&mut self, owner: BodyId, ctx: &mut CommandContext<'_>) -> Step {
        let directive = FlightDirective::Hyperspace { dest: self.dest };
        if !ctx.world.issue_directive(owner, directive) {
            return Step::Status(CommandStatus::Aborted);
        }
        info!(
            ship = owner.0,
            sector_x = self.dest.sector_x,
            sector_y = self.dest.sector_y,
            sector_z = self.dest.sector_z,
            system = self.dest.system_index,
            body = self.dest.body_index,
            "journey_started"
        );
        Step::Status(CommandStatus::Succeeded)
    }

    pub(super) fn save(&self, writer: &mut Writer) {
        self.dest.save(writer);
    }

    pub(super) fn load(reader: &mut Reader<'_>) -> Result<Self, StreamError> {
        Ok(Self::new(SystemPath::load(reader)?))
    }
}
