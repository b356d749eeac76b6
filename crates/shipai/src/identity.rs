use std::collections::HashMap;

use tracing::warn;

use crate::world::{BodyId, World};

/// Handle written for "no body" and returned for bodies the table does not know.
pub const NULL_HANDLE: i32 = 0;

/// Maps live bodies to stable 32-bit handles and back for one save or load
/// pass. Handles are 1-based positions in the world's body order at the time
/// the table is built, so a world reloaded in the same order yields the same
/// handles.
#[derive(Debug, Clone, Default)]
pub struct IdentityTable {
    handle_by_body: HashMap<BodyId, i32>,
    body_by_handle: Vec<BodyId>,
}

impl IdentityTable {
    pub fn from_world(world: &World) -> Self {
        Self::from_bodies(world.bodies().iter().map(|body| body.id))
    }

    pub fn from_bodies(bodies: impl IntoIterator<Item = BodyId>) -> Self {
        let mut table = Self::default();
        for id in bodies {
            table.body_by_handle.push(id);
            let handle = table.body_by_handle.len() as i32;
            table.handle_by_body.insert(id, handle);
        }
        table
    }

    pub fn len(&self) -> usize {
        self.body_by_handle.len()
    }

    pub fn is_empty(&self) -> bool {
        self.body_by_handle.is_empty()
    }

    pub fn lookup_handle(&self, body: Option<BodyId>) -> i32 {
        let Some(body) = body else {
            return NULL_HANDLE;
        };
        match self.handle_by_body.get(&body) {
            Some(handle) => *handle,
            None => {
                warn!(body = body.0, "identity_lookup_unregistered_body");
                NULL_HANDLE
            }
        }
    }

    pub fn lookup_body(&self, handle: i32) -> Option<BodyId> {
        if handle <= NULL_HANDLE {
            return None;
        }
        self.body_by_handle.get((handle - 1) as usize).copied()
    }
}
