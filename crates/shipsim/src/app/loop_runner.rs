use std::process::ExitCode;

use shipai::{BodyId, CommandStatus, IdentityTable, Simulation, SnapshotError};
use thiserror::Error;
use tracing::{error, info};

use super::bootstrap::AppWiring;
use super::config::SimConfig;
use super::scenario::PatrolRoster;

#[derive(Debug, Error)]
pub(crate) enum RunError {
    #[error(transparent)]
    Snapshot(#[from] SnapshotError),
    #[error("snapshot reloaded at tick {tick} does not re-encode to the saved bytes")]
    ReloadMismatch { tick: u64 },
}

#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub(crate) struct RunSummary {
    pub(crate) ticks: u64,
    pub(crate) succeeded: u32,
    pub(crate) aborted: u32,
    pub(crate) removed: u32,
    pub(crate) reloaded: bool,
}

pub(crate) fn run(app: AppWiring) -> ExitCode {
    let AppWiring {
        config,
        sim,
        roster,
    } = app;
    match run_loop(&config, sim, roster) {
        Ok(summary) => {
            info!(
                ticks = summary.ticks,
                succeeded = summary.succeeded,
                aborted = summary.aborted,
                removed = summary.removed,
                reloaded = summary.reloaded,
                "run_finished"
            );
            ExitCode::SUCCESS
        }
        Err(err) => {
            error!(error = %err, "run_failed");
            ExitCode::FAILURE
        }
    }
}

pub(crate) fn run_loop(
    config: &SimConfig,
    mut sim: Simulation,
    roster: PatrolRoster,
) -> Result<RunSummary, RunError> {
    let dt = config.dt();
    let mut summary = RunSummary::default();
    let mut raider = Some(roster.raider);
    let mut drone = Some(roster.drone);

    for tick in 1..=config.tick_count {
        let report = sim.step(dt);
        for outcome in &report.outcomes {
            match outcome.status {
                CommandStatus::Succeeded => summary.succeeded += 1,
                CommandStatus::Aborted => summary.aborted += 1,
                CommandStatus::InProgress => {}
            }
            info!(
                tick,
                ship = outcome.ship.0,
                kind = outcome.kind.name(),
                status = ?outcome.status,
                "command_finished"
            );
        }
        summary.removed += report.removed.len() as u32;
        summary.ticks = tick;
        raider = raider.filter(|id| sim.world().contains(*id));
        drone = drone.filter(|id| sim.world().contains(*id));

        if tick % config.summary_interval_ticks == 0 {
            info!(
                tick,
                sim_time = sim.world().time(),
                bodies = sim.world().body_count(),
                commands = sim.fleet().len(),
                raider_alive = raider.is_some(),
                drone_alive = drone.is_some(),
                "tick_summary"
            );
        }

        if config.save_at_tick == Some(tick) {
            let before = IdentityTable::from_world(sim.world());
            sim = save_and_reload(config, sim, tick)?;
            let after = IdentityTable::from_world(sim.world());
            raider = remap(&before, &after, raider);
            drone = remap(&before, &after, drone);
            summary.reloaded = true;
        }
    }

    Ok(summary)
}

/// Round-trips the running simulation through a snapshot file and continues
/// from the reloaded copy. Body ids are reissued by the reload.
fn save_and_reload(config: &SimConfig, sim: Simulation, tick: u64) -> Result<Simulation, RunError> {
    let saved = sim.snapshot_bytes();
    sim.save_to(&config.snapshot_path)?;
    let reloaded = Simulation::load_from(&config.snapshot_path, config.tuning.clone())?;
    if reloaded.snapshot_bytes() != saved {
        return Err(RunError::ReloadMismatch { tick });
    }
    info!(
        tick,
        path = %config.snapshot_path.display(),
        bodies = reloaded.world().body_count(),
        commands = reloaded.fleet().len(),
        "snapshot_reloaded"
    );
    Ok(reloaded)
}

/// Follows a body across a reload through its handle.
fn remap(before: &IdentityTable, after: &IdentityTable, id: Option<BodyId>) -> Option<BodyId> {
    id.and_then(|id| after.lookup_body(before.lookup_handle(Some(id))))
}
