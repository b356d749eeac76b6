use std::process::ExitCode;

use shipai::Simulation;
use tracing::{error, info};
use tracing_subscriber::EnvFilter;

use super::config::{self, SimConfig, CONFIG_ENV_VAR};
use super::scenario::{self, PatrolRoster};

pub(crate) struct AppWiring {
    pub(crate) config: SimConfig,
    pub(crate) sim: Simulation,
    pub(crate) roster: PatrolRoster,
}

pub(crate) fn build_app() -> Result<AppWiring, ExitCode> {
    init_tracing();
    info!("=== shipsim startup ===");

    let config = config::load_from_env().map_err(|err| {
        error!(error = %err, env_var = CONFIG_ENV_VAR, "config_load_failed");
        ExitCode::FAILURE
    })?;
    info!(
        tick_rate_hz = config.tick_rate_hz,
        tick_count = config.tick_count,
        save_at_tick = ?config.save_at_tick,
        snapshot_path = %config.snapshot_path.display(),
        "config_loaded"
    );

    let (sim, roster) = scenario::build_patrol(config.tuning.clone());
    info!(
        station = roster.station.0,
        planet = roster.planet.0,
        raider = roster.raider.0,
        drone = roster.drone.0,
        "patrol_roster"
    );

    Ok(AppWiring {
        config,
        sim,
        roster,
    })
}

fn init_tracing() {
    let filter = EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("info"));
    tracing_subscriber::fmt()
        .with_env_filter(filter)
        .with_target(false)
        .with_thread_names(true)
        .compact()
        .init();
}
