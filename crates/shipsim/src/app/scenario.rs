use glam::DVec3;
use shipai::{
    AiTuning, BodyDesc, BodyId, Command, DockingPort, ShipState, Simulation, SystemPath,
};
use tracing::info;

/// Ids of the bodies the patrol scenario wires commands between.
#[derive(Debug, Clone, Copy)]
pub(crate) struct PatrolRoster {
    pub(crate) station: BodyId,
    pub(crate) planet: BodyId,
    pub(crate) raider: BodyId,
    pub(crate) drone: BodyId,
}

/// A station and a planet, one ship per command kind, and two hostiles.
pub(crate) fn build_patrol(tuning: AiTuning) -> (Simulation, PatrolRoster) {
    let mut sim = Simulation::new(tuning.clone());

    let station = sim.spawn_now(BodyDesc::station(
        "Coriolis",
        DVec3::ZERO,
        DockingPort {
            offset: DVec3::new(0.0, 0.0, 120.0),
            approach_distance: 250.0,
        },
    ));
    let planet = sim.spawn_now(BodyDesc::planet("Lave", DVec3::new(20_000.0, 0.0, 0.0), 6000.0));
    let raider = sim.spawn_now(
        BodyDesc::ship(
            "Krait",
            DVec3::new(-6000.0, 500.0, 0.0),
            ShipState::new(180.0, 40.0),
        )
        .with_velocity(DVec3::new(0.0, 0.0, 40.0)),
    );
    let drone = sim.spawn_now(BodyDesc::ship(
        "Drone",
        DVec3::new(1000.0, 0.0, -2000.0),
        ShipState::new(60.0, 10.0),
    ));

    let trader = spawn_ship(&mut sim, "Cobra", DVec3::new(2500.0, 0.0, 1500.0), 220.0, 60.0);
    let surveyor = spawn_ship(&mut sim, "Asp", DVec3::new(14_000.0, 0.0, 3000.0), 250.0, 70.0);
    let courier = spawn_ship(&mut sim, "Adder", DVec3::new(-500.0, 0.0, 0.0), 200.0, 50.0);
    let escort = spawn_ship(&mut sim, "Viper", DVec3::new(300.0, 0.0, -800.0), 300.0, 90.0);
    let hunter = spawn_ship(&mut sim, "Mamba", DVec3::new(-3000.0, 0.0, 0.0), 320.0, 110.0);
    let striker = spawn_ship(
        &mut sim,
        "Sidewinder",
        DVec3::new(1000.0, 0.0, -4000.0),
        280.0,
        100.0,
    );

    let fly_to = Command::fly_to(escort, station, &tuning);
    let kill = Command::kill(hunter, raider, sim.world());
    sim.give_command(Command::dock(trader, station));
    sim.give_command(Command::orbit(surveyor, planet, 800.0));
    sim.give_command(Command::journey(courier, SystemPath::new((0, 0, 1), 3, 0)));
    sim.give_command(fly_to);
    sim.give_command(kill);
    sim.give_command(Command::kamikaze(striker, drone));

    info!(
        bodies = sim.world().body_count(),
        commands = sim.fleet().len(),
        "scenario_built"
    );
    (
        sim,
        PatrolRoster {
            station,
            planet,
            raider,
            drone,
        },
    )
}

fn spawn_ship(
    sim: &mut Simulation,
    label: &str,
    position: DVec3,
    max_speed: f64,
    max_accel: f64,
) -> BodyId {
    sim.spawn_now(BodyDesc::ship(
        label,
        position,
        ShipState::new(max_speed, max_accel),
    ))
}
