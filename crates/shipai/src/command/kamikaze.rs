use tracing::warn;

use super::{live_target, resolve_target_handle, CommandContext, CommandStatus, Step};
use crate::flight::FlightDirective;
use crate::identity::IdentityTable;
use crate::stream::{Reader, StreamError, Writer};
use crate::world::BodyId;

#[derive(Debug, Clone, Copy, PartialEq)]
pub struct KamikazeCommand {
    target: Option<BodyId>,
}

impl KamikazeCommand {
    pub fn new(target: BodyId) -> Self {
        Self {
            target: Some(target),
        }
    }

    pub fn target(&self) -> Option<BodyId> {
        self.target
    }

    pub(super) fn on_deleted(&mut self, body: BodyId) {
        if self.target == Some(body) {
            self.target = None;
        }
    }

    pub(super) fn update(&mut self, owner: BodyId, ctx: &mut CommandContext<'_>) -> Step {
        let Some(target) = live_target(&mut self.target, ctx.world) else {
            warn!(ship = owner.0, "kamikaze_target_lost");
            return Step::Status(CommandStatus::Aborted);
        };
        let target_id = target.id;
        if !ctx
            .world
            .issue_directive(owner, FlightDirective::Ram { target: target_id })
        {
            return Step::Status(CommandStatus::Aborted);
        }
        Step::Status(CommandStatus::InProgress)
    }

    pub(super) fn save(&self, writer: &mut Writer, table: &IdentityTable) {
        writer.int32(table.lookup_handle(self.target));
    }

    pub(super) fn load(reader: &mut Reader<'_>) -> Result<LoadedKamikaze, StreamError> {
        Ok(LoadedKamikaze {
            target_handle: reader.int32()?,
        })
    }
}

#[derive(Debug, Clone, Copy, PartialEq)]
pub struct LoadedKamikaze {
    pub target_handle: i32,
}

impl LoadedKamikaze {
    pub(super) fn post_load_fixup(self, table: &IdentityTable) -> KamikazeCommand {
        KamikazeCommand {
            target: resolve_target_handle(table, self.target_handle),
        }
    }
}
