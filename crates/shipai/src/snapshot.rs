//! Binary save files for a running simulation.
//!
//! Layout: `MAGIC`, format version (u16), body count (u32), payload length
//! (u32), SHA-256 of the payload, payload. The payload holds the clock and
//! then every body in registry order; each ship is followed by its command
//! slot. Commands may name bodies that appear later in the payload, so they
//! are only resolved once every body has been spawned.

use std::fs;
use std::io;
use std::path::{Path, PathBuf};

use sha2::{Digest, Sha256};
use thiserror::Error;
use tracing::{info, warn};

use crate::atomic_io::write_bytes_atomic;
use crate::command::{Command, CommandLoadError, LoadedCommand};
use crate::fleet::Fleet;
use crate::identity::{IdentityTable, NULL_HANDLE};
use crate::stream::{Reader, StreamError, Writer};
use crate::world::{BodyDesc, BodyId, BodyKind, DockingPort, ShipState, SystemPath, World};

const MAGIC: &[u8; 4] = b"SHAI";
pub const SNAPSHOT_FORMAT_VERSION: u16 = 1;
const HASH_LEN: usize = 32;

#[derive(Debug, Error)]
pub enum SnapshotError {
    #[error("failed to read/write snapshot {path}: {source}")]
    Io {
        path: PathBuf,
        #[source]
        source: io::Error,
    },
    #[error("snapshot at {path} has invalid format: {message}")]
    InvalidFormat { path: PathBuf, message: String },
    #[error("snapshot at {path} is truncated: {source}")]
    Stream {
        path: PathBuf,
        #[source]
        source: StreamError,
    },
    #[error("snapshot at {path} names unknown body kind {tag}")]
    UnknownBodyKind { path: PathBuf, tag: i32 },
    #[error("snapshot at {path} holds an unusable command: {source}")]
    Command {
        path: PathBuf,
        #[source]
        source: CommandLoadError,
    },
}

/// Everything restored from one snapshot.
#[derive(Debug)]
pub struct Snapshot {
    pub world: World,
    pub fleet: Fleet,
}

pub fn write_snapshot(path: &Path, world: &World, fleet: &Fleet) -> Result<(), SnapshotError> {
    let bytes = encode_snapshot(world, fleet);
    write_bytes_atomic(path, &bytes).map_err(|source| SnapshotError::Io {
        path: path.to_path_buf(),
        source,
    })?;
    info!(
        path = %path.display(),
        bodies = world.body_count(),
        commands = fleet.len(),
        bytes = bytes.len(),
        "snapshot_written"
    );
    Ok(())
}

pub fn read_snapshot(path: &Path) -> Result<Snapshot, SnapshotError> {
    let bytes = fs::read(path).map_err(|source| SnapshotError::Io {
        path: path.to_path_buf(),
        source,
    })?;
    let snapshot = decode_snapshot(&bytes, path)?;
    info!(
        path = %path.display(),
        bodies = snapshot.world.body_count(),
        commands = snapshot.fleet.len(),
        "snapshot_loaded"
    );
    Ok(snapshot)
}

pub fn encode_snapshot(world: &World, fleet: &Fleet) -> Vec<u8> {
    let table = IdentityTable::from_world(world);
    let mut payload = Writer::new();
    payload.double(world.time());
    for body in world.bodies() {
        payload.int32(body.kind.tag());
        payload.string(&body.label);
        payload.vector3d(body.position);
        payload.vector3d(body.velocity);
        payload.quaternion(body.orientation);
        payload.double(body.radius);
        payload.bool(body.docking.is_some());
        if let Some(port) = body.docking {
            payload.vector3d(port.offset);
            payload.double(port.approach_distance);
        }
        payload.bool(body.ship.is_some());
        if let Some(ship) = body.ship.as_ref() {
            payload.double(ship.max_speed);
            payload.double(ship.max_accel);
            payload.int32(table.lookup_handle(ship.docked_with));
            payload.bool(ship.pending_jump.is_some());
            if let Some(jump) = ship.pending_jump {
                jump.save(&mut payload);
            }
            Command::save_slot(fleet.command_for(body.id), &mut payload, &table);
        }
    }

    let orphaned = fleet
        .iter()
        .filter(|command| !world.find_body(command.owner()).is_some_and(|body| body.is_ship()))
        .count();
    if orphaned > 0 {
        warn!(orphaned, "snapshot_skipped_commands_without_ship");
    }

    frame_payload(world.body_count() as u32, payload.as_bytes())
}

fn frame_payload(body_count: u32, payload: &[u8]) -> Vec<u8> {
    let mut bytes = Vec::<u8>::with_capacity(payload.len() + 46);
    bytes.extend_from_slice(MAGIC);
    bytes.extend_from_slice(&SNAPSHOT_FORMAT_VERSION.to_le_bytes());
    bytes.extend_from_slice(&body_count.to_le_bytes());
    bytes.extend_from_slice(&(payload.len() as u32).to_le_bytes());
    bytes.extend_from_slice(&sha256_bytes(payload));
    bytes.extend_from_slice(payload);
    bytes
}

pub fn decode_snapshot(bytes: &[u8], path: &Path) -> Result<Snapshot, SnapshotError> {
    let mut cursor = 0usize;
    let magic = read_exact(bytes, &mut cursor, MAGIC.len(), path)?;
    if magic != MAGIC {
        return Err(invalid_format(path, "invalid magic"));
    }
    let version = u16::from_le_bytes(read_array(bytes, &mut cursor, path)?);
    if version != SNAPSHOT_FORMAT_VERSION {
        return Err(invalid_format(
            path,
            format!("unsupported format version {version}, expected {SNAPSHOT_FORMAT_VERSION}"),
        ));
    }
    let body_count = u32::from_le_bytes(read_array(bytes, &mut cursor, path)?) as usize;
    let payload_len = u32::from_le_bytes(read_array(bytes, &mut cursor, path)?) as usize;
    let expected_hash = read_exact(bytes, &mut cursor, HASH_LEN, path)?;
    let payload = read_exact(bytes, &mut cursor, payload_len, path)?;
    if cursor != bytes.len() {
        return Err(invalid_format(path, "unexpected trailing bytes"));
    }
    if expected_hash != sha256_bytes(payload) {
        return Err(invalid_format(path, "payload hash mismatch"));
    }

    decode_payload(payload, body_count, path)
}

struct PendingShip {
    id: BodyId,
    docked_handle: i32,
}

fn decode_payload(
    payload: &[u8],
    body_count: usize,
    path: &Path,
) -> Result<Snapshot, SnapshotError> {
    let stream_err = |source: StreamError| SnapshotError::Stream {
        path: path.to_path_buf(),
        source,
    };
    let command_err = |source: CommandLoadError| SnapshotError::Command {
        path: path.to_path_buf(),
        source,
    };

    let mut reader = Reader::new(payload);
    let mut world = World::default();
    world.set_time(reader.double().map_err(stream_err)?);

    // Pass one: materialize every body, keeping references as handles.
    let mut ships = Vec::<PendingShip>::new();
    let mut commands = Vec::<LoadedCommand>::new();
    for _ in 0..body_count {
        let (desc, docked_handle) = read_body(&mut reader).map_err(|error| match error {
            BodyReadError::Stream(source) => stream_err(source),
            BodyReadError::UnknownKind(tag) => SnapshotError::UnknownBodyKind {
                path: path.to_path_buf(),
                tag,
            },
        })?;
        let is_ship = desc.ship.is_some();
        let id = world.spawn(desc);
        if is_ship {
            ships.push(PendingShip { id, docked_handle });
            if let Some(command) = Command::load(&mut reader).map_err(command_err)? {
                commands.push(command);
            }
        }
    }
    if !reader.at_end() {
        return Err(invalid_format(path, "payload has unread bytes"));
    }
    world.apply_pending();

    // Pass two: every body exists, resolve the handles.
    let table = IdentityTable::from_world(&world);
    for ship in ships {
        let docked_with = table.lookup_body(ship.docked_handle);
        if let Some(state) = world.ship_state_mut(ship.id) {
            state.docked_with = docked_with;
        }
    }
    let mut fleet = Fleet::new();
    for loaded in commands {
        let command = loaded.post_load_fixup(&table, &world).map_err(command_err)?;
        fleet.give_command(command);
    }

    Ok(Snapshot { world, fleet })
}

enum BodyReadError {
    Stream(StreamError),
    UnknownKind(i32),
}

impl From<StreamError> for BodyReadError {
    fn from(error: StreamError) -> Self {
        Self::Stream(error)
    }
}

fn read_body(reader: &mut Reader<'_>) -> Result<(BodyDesc, i32), BodyReadError> {
    let tag = reader.int32()?;
    let kind = BodyKind::from_tag(tag).ok_or(BodyReadError::UnknownKind(tag))?;
    let label = reader.string()?;
    let mut desc = BodyDesc::new(kind, label, reader.vector3d()?)
        .with_velocity(reader.vector3d()?)
        .with_orientation(reader.quaternion()?)
        .with_radius(reader.double()?);
    if reader.bool()? {
        desc = desc.with_docking(DockingPort {
            offset: reader.vector3d()?,
            approach_distance: reader.double()?,
        });
    }
    let mut docked_handle = NULL_HANDLE;
    if reader.bool()? {
        let mut state = ShipState::new(reader.double()?, reader.double()?);
        docked_handle = reader.int32()?;
        if reader.bool()? {
            state.pending_jump = Some(SystemPath::load(reader)?);
        }
        desc = desc.with_ship(state);
    }
    Ok((desc, docked_handle))
}

fn sha256_bytes(bytes: &[u8]) -> [u8; HASH_LEN] {
    let mut hasher = Sha256::new();
    hasher.update(bytes);
    hasher.finalize().into()
}

fn read_exact<'a>(
    bytes: &'a [u8],
    cursor: &mut usize,
    len: usize,
    path: &Path,
) -> Result<&'a [u8], SnapshotError> {
    let end = cursor
        .checked_add(len)
        .filter(|end| *end <= bytes.len())
        .ok_or_else(|| invalid_format(path, format!("unexpected end of file at byte {cursor}")))?;
    let slice = &bytes[*cursor..end];
    *cursor = end;
    Ok(slice)
}

fn read_array<const N: usize>(
    bytes: &[u8],
    cursor: &mut usize,
    path: &Path,
) -> Result<[u8; N], SnapshotError> {
    let slice = read_exact(bytes, cursor, N, path)?;
    let mut array = [0u8; N];
    array.copy_from_slice(slice);
    Ok(array)
}

fn invalid_format(path: &Path, message: impl Into<String>) -> SnapshotError {
    SnapshotError::InvalidFormat {
        path: path.to_path_buf(),
        message: message.into(),
    }
}
