mod atomic_io;
pub mod command;
pub mod fleet;
pub mod flight;
pub mod identity;
pub mod path;
pub mod sim;
pub mod snapshot;
pub mod stream;
pub mod tuning;
pub mod world;

pub use command::{
    Command, CommandContext, CommandKind, CommandLoadError, CommandState, CommandStatus,
    DockCommand, FlyToCommand, JourneyCommand, KamikazeCommand, KillCommand, LoadedCommand,
    OrbitCommand, PursuitState, MAX_CHAIN_DEPTH, NONE_TAG,
};
pub use fleet::{CommandOutcome, Fleet};
pub use flight::{FlightDirective, FlightModel, RamContact};
pub use identity::{IdentityTable, NULL_HANDLE};
pub use path::{AiPath, LinearPlanner, PlanRequest, TrajectoryPlanner};
pub use sim::{Simulation, StepReport};
pub use snapshot::{
    decode_snapshot, encode_snapshot, read_snapshot, write_snapshot, Snapshot, SnapshotError,
    SNAPSHOT_FORMAT_VERSION,
};
pub use stream::{Reader, StreamError, Writer};
pub use tuning::AiTuning;
pub use world::{
    Body, BodyDesc, BodyId, BodyKind, DockingPort, ShipState, SystemPath, World,
};
