use glam::DVec3;

use super::*;
use crate::flight::FlightDirective;
use crate::path::LinearPlanner;
use crate::world::{BodyDesc, DockingPort, ShipState};

struct Harness {
    world: World,
    planner: LinearPlanner,
    tuning: AiTuning,
}

impl Harness {
    fn new() -> Self {
        let tuning = AiTuning::default();
        Self {
            world: World::default(),
            planner: LinearPlanner::new(tuning.cruise_speed),
            tuning,
        }
    }

    fn ship(&mut self, label: &str, position: DVec3) -> BodyId {
        let id = self.world.spawn(BodyDesc::ship(
            label,
            position,
            ShipState::new(200.0, 50.0),
        ));
        self.world.apply_pending();
        id
    }

    fn station(&mut self, position: DVec3) -> BodyId {
        let id = self.world.spawn(BodyDesc::station(
            "Orbital",
            position,
            DockingPort {
                offset: DVec3::new(0.0, 0.0, 100.0),
                approach_distance: 200.0,
            },
        ));
        self.world.apply_pending();
        id
    }

    fn planet(&mut self, position: DVec3, radius: f64) -> BodyId {
        let id = self.world.spawn(BodyDesc::planet("Lave", position, radius));
        self.world.apply_pending();
        id
    }

    fn tick(&mut self, command: &mut Command, dt: f64) -> CommandStatus {
        let mut ctx = CommandContext {
            world: &mut self.world,
            planner: &self.planner,
            tuning: &self.tuning,
            dt,
        };
        command.time_step_update(&mut ctx)
    }

    fn process_child(&mut self, command: &mut Command) -> bool {
        let mut ctx = CommandContext {
            world: &mut self.world,
            planner: &self.planner,
            tuning: &self.tuning,
            dt: 0.1,
        };
        command.process_child(&mut ctx)
    }

    fn directive(&self, ship: BodyId) -> FlightDirective {
        self.world
            .find_body(ship)
            .and_then(|body| body.ship.as_ref())
            .map(|state| state.directive)
            .expect("ship state")
    }

    fn round_trip(&self, command: &Command) -> Command {
        let table = IdentityTable::from_world(&self.world);
        let mut writer = Writer::new();
        Command::save_slot(Some(command), &mut writer, &table);
        let bytes = writer.into_bytes();
        let mut reader = Reader::new(&bytes);
        let loaded = Command::load(&mut reader)
            .expect("load")
            .expect("non-empty slot");
        assert!(reader.at_end(), "{} bytes left over", reader.remaining());
        loaded
            .post_load_fixup(&table, &self.world)
            .expect("fixup")
    }
}

fn reset_drop_count() {
    DROPPED_COMMANDS.with(|count| count.set(0));
}

fn drop_count() -> usize {
    DROPPED_COMMANDS.with(|count| count.get())
}

#[test]
fn kind_tags_are_unique_and_skip_the_empty_tag() {
    for kind in CommandKind::ALL {
        assert_ne!(kind.tag(), NONE_TAG);
        assert_eq!(CommandKind::from_tag(kind.tag()), Some(kind));
    }
    assert_eq!(CommandKind::from_tag(NONE_TAG), None);
    assert_eq!(CommandKind::from_tag(7), None);
}

#[test]
fn every_variant_survives_save_and_reload() {
    let mut h = Harness::new();
    let station = h.station(DVec3::ZERO);
    let planet = h.planet(DVec3::new(10_000.0, 0.0, 0.0), 1000.0);
    let pirate = h.ship("Pirate", DVec3::new(-800.0, 0.0, 0.0));
    let ship = h.ship("Cobra", DVec3::new(0.0, 0.0, 320.0));

    let mut docking = Command::dock(ship, station);
    assert_eq!(h.tick(&mut docking, 0.1), CommandStatus::InProgress);
    assert_eq!(docking.chain_depth(), 2, "dock should hand off the final approach");

    let commands = [
        Command::journey(ship, SystemPath::new((1, -2, 3), 4, 5)),
        docking,
        Command::orbit(ship, planet, 250.0),
        Command::fly_to_offset(ship, station, DVec3::new(1.0, 2.0, 3.0), 7.5),
        Command::kill(ship, pirate, &h.world),
        Command::kamikaze(ship, pirate),
    ];
    for command in &commands {
        let reloaded = h.round_trip(command);
        assert_eq!(&reloaded, command, "{} differs after reload", command.kind().name());
    }
}

#[test]
fn reload_writes_identical_bytes() {
    let mut h = Harness::new();
    let station = h.station(DVec3::ZERO);
    let ship = h.ship("Cobra", DVec3::new(0.0, 0.0, 3000.0));
    let mut command = Command::dock(ship, station);
    h.tick(&mut command, 0.1);

    let table = IdentityTable::from_world(&h.world);
    let mut first = Writer::new();
    command.save(&mut first, &table);
    let reloaded = h.round_trip(&command);
    let mut second = Writer::new();
    reloaded.save(&mut second, &table);

    assert_eq!(first.as_bytes(), second.as_bytes());
}

#[test]
fn fly_to_keeps_offset_and_end_speed_across_reload() {
    let mut h = Harness::new();
    let station = h.station(DVec3::ZERO);
    let ship = h.ship("Cobra", DVec3::new(5000.0, 0.0, 0.0));
    let command = Command::fly_to_offset(ship, station, DVec3::new(0.0, 40.0, 0.0), 12.0);

    let reloaded = h.round_trip(&command);

    let CommandState::FlyTo(fly_to) = reloaded.state() else {
        panic!("expected fly_to, got {:?}", reloaded.kind());
    };
    assert_eq!(fly_to.offset(), DVec3::new(0.0, 40.0, 0.0));
    assert_eq!(fly_to.end_speed(), 12.0);
}

#[test]
fn kill_pursuit_state_resets_on_reload() {
    let mut h = Harness::new();
    let pirate = h.ship("Pirate", DVec3::new(2000.0, 0.0, 0.0));
    let ship = h.ship("Cobra", DVec3::ZERO);
    h.world.find_body_mut(pirate).expect("pirate").velocity = DVec3::new(0.0, 30.0, 0.0);
    let mut command = Command::kill(ship, pirate, &h.world);

    h.world.find_body_mut(pirate).expect("pirate").velocity = DVec3::new(0.0, 40.0, 0.0);
    h.tick(&mut command, 0.5);
    h.tick(&mut command, 0.5);
    let CommandState::Kill(before) = command.state() else {
        panic!("expected kill");
    };
    assert!(before.pursuit().close_time > 0.0);
    assert_ne!(before.pursuit().lead_offset, DVec3::ZERO);

    let reloaded = h.round_trip(&command);
    let CommandState::Kill(after) = reloaded.state() else {
        panic!("expected kill");
    };
    assert_eq!(after.target(), Some(pirate));
    assert_eq!(
        *after.pursuit(),
        PursuitState::neutral(DVec3::new(0.0, 40.0, 0.0))
    );
}

#[test]
fn kill_without_live_target_reloads_with_still_velocity() {
    let h = Harness::new();
    let loaded = LoadedKill { target_handle: 9 };
    let kill = loaded.post_load_fixup(&IdentityTable::default(), &h.world);
    assert_eq!(kill.target(), None);
    assert_eq!(*kill.pursuit(), PursuitState::neutral(DVec3::ZERO));
}

#[test]
fn kill_aims_at_stationary_target_and_evades_when_close() {
    let mut h = Harness::new();
    let pirate = h.ship("Pirate", DVec3::new(600.0, 0.0, 0.0));
    let ship = h.ship("Cobra", DVec3::ZERO);
    let mut command = Command::kill(ship, pirate, &h.world);

    assert_eq!(h.tick(&mut command, 0.1), CommandStatus::InProgress);
    assert_eq!(
        h.directive(ship),
        FlightDirective::Pursue {
            aim: DVec3::new(600.0, 0.0, 0.0)
        }
    );

    h.world.find_body_mut(ship).expect("ship").position = DVec3::new(550.0, 0.0, 0.0);
    h.tick(&mut command, 0.1);
    assert_eq!(
        h.directive(ship),
        FlightDirective::Evade {
            away_from: DVec3::new(600.0, 0.0, 0.0)
        }
    );
    let CommandState::Kill(kill) = command.state() else {
        panic!("expected kill");
    };
    assert_eq!(kill.pursuit().evade_time, h.tuning.evade_duration);
}

#[test]
fn journey_hands_off_to_hyperdrive_and_succeeds() {
    let mut h = Harness::new();
    let ship = h.ship("Cobra", DVec3::ZERO);
    let dest = SystemPath::new((0, 0, 1), 2, 0);
    let mut command = Command::journey(ship, dest);

    assert_eq!(h.tick(&mut command, 0.1), CommandStatus::Succeeded);
    assert_eq!(h.directive(ship), FlightDirective::Hyperspace { dest });
}

#[test]
fn journey_owned_by_a_non_ship_aborts() {
    let mut h = Harness::new();
    let station = h.station(DVec3::ZERO);
    let mut command = Command::journey(station, SystemPath::default());
    assert_eq!(h.tick(&mut command, 0.1), CommandStatus::Aborted);
}

#[test]
fn fly_to_succeeds_inside_arrival_tolerance() {
    let mut h = Harness::new();
    let planet = h.planet(DVec3::new(1000.0, 0.0, 0.0), 50.0);
    let ship = h.ship("Cobra", DVec3::new(1005.0, 0.0, 0.0));
    let mut command = Command::fly_to_precise(ship, planet);

    assert_eq!(h.tick(&mut command, 0.1), CommandStatus::Succeeded);
    assert_eq!(
        h.directive(ship),
        FlightDirective::FlyToward {
            point: DVec3::new(1000.0, 0.0, 0.0),
            end_speed: 0.0,
            frame_velocity: DVec3::ZERO,
        }
    );
}

#[test]
fn loose_fly_to_stands_off_from_target() {
    let mut h = Harness::new();
    let planet = h.planet(DVec3::ZERO, 50.0);
    let ship = h.ship("Cobra", DVec3::new(9000.0, 0.0, 0.0));
    let mut command = Command::fly_to(ship, planet, &h.tuning);

    assert_eq!(h.tick(&mut command, 0.1), CommandStatus::InProgress);
    assert_eq!(
        h.directive(ship),
        FlightDirective::FlyToward {
            point: h.tuning.loose_approach_offset,
            end_speed: h.tuning.loose_end_speed,
            frame_velocity: DVec3::ZERO,
        }
    );
}

#[test]
fn orbit_holds_once_insertion_point_is_reached() {
    let mut h = Harness::new();
    let planet = h.planet(DVec3::ZERO, 1000.0);
    let ship = h.ship("Cobra", DVec3::new(1210.0, 0.0, 0.0));
    let mut command = Command::orbit(ship, planet, 200.0);

    assert_eq!(h.tick(&mut command, 0.1), CommandStatus::InProgress);
    assert_eq!(
        h.directive(ship),
        FlightDirective::HoldOrbit {
            center: planet,
            radius: 1200.0,
        }
    );
}

#[test]
fn orbit_plans_toward_insertion_point_from_afar() {
    let mut h = Harness::new();
    let planet = h.planet(DVec3::ZERO, 1000.0);
    let ship = h.ship("Cobra", DVec3::new(8000.0, 0.0, 0.0));
    let mut command = Command::orbit(ship, planet, 200.0);

    h.tick(&mut command, 0.1);

    let CommandState::Orbit(orbit) = command.state() else {
        panic!("expected orbit");
    };
    assert_eq!(orbit.path().end_position, DVec3::new(1200.0, 0.0, 0.0));
    assert_eq!(orbit.path().frame, Some(planet));
    assert!(matches!(h.directive(ship), FlightDirective::FlyToward { .. }));
}

#[test]
fn kamikaze_rams_its_target() {
    let mut h = Harness::new();
    let pirate = h.ship("Pirate", DVec3::new(500.0, 0.0, 0.0));
    let ship = h.ship("Cobra", DVec3::ZERO);
    let mut command = Command::kamikaze(ship, pirate);

    assert_eq!(h.tick(&mut command, 0.1), CommandStatus::InProgress);
    assert_eq!(h.directive(ship), FlightDirective::Ram { target: pirate });
}

#[test]
fn dock_plans_before_issuing_any_directive() {
    let mut h = Harness::new();
    let station = h.station(DVec3::ZERO);
    let ship = h.ship("Cobra", DVec3::new(0.0, 0.0, 5000.0));
    let mut command = Command::dock(ship, station);
    assert_eq!(h.directive(ship), FlightDirective::Idle);

    assert_eq!(h.tick(&mut command, 0.1), CommandStatus::InProgress);

    let CommandState::Dock(dock) = command.state() else {
        panic!("expected dock");
    };
    assert!(!dock.path().needs_plan());
    assert_eq!(dock.path().end_position, DVec3::new(0.0, 0.0, 300.0));
    assert_eq!(dock.path().frame, Some(station));
    assert!(matches!(h.directive(ship), FlightDirective::FlyToward { .. }));
    assert!(command.child().is_none());
}

#[test]
fn dock_completes_next_to_the_port() {
    let mut h = Harness::new();
    let station = h.station(DVec3::ZERO);
    let ship = h.ship("Cobra", DVec3::new(0.0, 0.0, 110.0));
    let mut command = Command::dock(ship, station);

    assert_eq!(h.tick(&mut command, 0.1), CommandStatus::Succeeded);
    assert_eq!(h.directive(ship), FlightDirective::Dock { station });
}

#[test]
fn dock_aborts_after_station_is_removed() {
    let mut h = Harness::new();
    let station = h.station(DVec3::ZERO);
    let ship = h.ship("Cobra", DVec3::new(0.0, 0.0, 5000.0));
    let mut command = Command::dock(ship, station);
    h.tick(&mut command, 0.1);

    h.world.despawn(station);
    for removed in h.world.apply_pending() {
        command.on_deleted(removed);
    }

    assert_eq!(command.target(), None);
    assert_eq!(h.tick(&mut command, 0.1), CommandStatus::Aborted);
}

#[test]
fn vanished_target_aborts_even_without_notification() {
    let mut h = Harness::new();
    let pirate = h.ship("Pirate", DVec3::new(500.0, 0.0, 0.0));
    let ship = h.ship("Cobra", DVec3::ZERO);
    let mut command = Command::kamikaze(ship, pirate);

    h.world.despawn(pirate);
    h.world.apply_pending();

    assert_eq!(h.tick(&mut command, 0.1), CommandStatus::Aborted);
    assert_eq!(command.target(), None);
}

#[test]
fn on_deleted_is_idempotent_and_ignores_unrelated_bodies() {
    let mut h = Harness::new();
    let pirate = h.ship("Pirate", DVec3::new(500.0, 0.0, 0.0));
    let ship = h.ship("Cobra", DVec3::ZERO);
    let mut command = Command::kamikaze(ship, pirate);

    command.on_deleted(BodyId(999));
    assert_eq!(command.target(), Some(pirate));

    command.on_deleted(pirate);
    command.on_deleted(pirate);
    assert_eq!(command.target(), None);
    assert_eq!(h.tick(&mut command, 0.1), CommandStatus::Aborted);
}

#[test]
fn on_deleted_reaches_the_child() {
    let mut h = Harness::new();
    let station = h.station(DVec3::ZERO);
    let planet = h.planet(DVec3::new(4000.0, 0.0, 0.0), 100.0);
    let ship = h.ship("Cobra", DVec3::ZERO);
    let mut command = Command::dock(ship, station);
    command.child = Some(Box::new(Command::fly_to_precise(ship, planet)));

    command.on_deleted(planet);

    assert_eq!(command.target(), Some(station));
    let child = command.child().expect("child");
    assert_eq!(child.target(), None);
}

#[test]
fn running_child_defers_the_parent() {
    let mut h = Harness::new();
    let pirate = h.ship("Pirate", DVec3::new(500.0, 0.0, 0.0));
    let planet = h.planet(DVec3::new(0.0, 9000.0, 0.0), 100.0);
    let ship = h.ship("Cobra", DVec3::ZERO);
    let mut command = Command::kamikaze(ship, pirate);
    command.child = Some(Box::new(Command::fly_to_precise(ship, planet)));

    assert!(!h.process_child(&mut command));
    assert!(command.child().is_some());

    assert_eq!(h.tick(&mut command, 0.1), CommandStatus::InProgress);
    assert!(
        matches!(h.directive(ship), FlightDirective::FlyToward { .. }),
        "parent must not run while the child works"
    );
}

#[test]
fn finished_child_is_dropped_and_parent_resumes() {
    let mut h = Harness::new();
    let pirate = h.ship("Pirate", DVec3::new(500.0, 0.0, 0.0));
    let planet = h.planet(DVec3::new(0.0, 100.0, 0.0), 10.0);
    let ship = h.ship("Cobra", DVec3::new(0.0, 95.0, 0.0));
    let mut command = Command::kamikaze(ship, pirate);
    command.child = Some(Box::new(Command::fly_to_precise(ship, planet)));

    reset_drop_count();
    assert!(h.process_child(&mut command));
    assert_eq!(drop_count(), 1);
    assert!(command.child().is_none());

    assert!(h.process_child(&mut command), "no child means nothing to wait for");
    assert_eq!(h.tick(&mut command, 0.1), CommandStatus::InProgress);
    assert_eq!(h.directive(ship), FlightDirective::Ram { target: pirate });
}

#[test]
fn dropping_a_command_destroys_its_whole_chain() {
    let ship = BodyId(1);
    let target = BodyId(2);
    let mut middle = Command::fly_to_precise(ship, target);
    middle.child = Some(Box::new(Command::kamikaze(ship, target)));
    let mut root = Command::dock(ship, target);
    root.child = Some(Box::new(middle));
    assert_eq!(root.chain_depth(), 3);

    reset_drop_count();
    drop(root);
    assert_eq!(drop_count(), 3);
}

#[test]
fn empty_slot_loads_as_none() {
    let mut writer = Writer::new();
    Command::save_slot(None, &mut writer, &IdentityTable::default());
    let bytes = writer.into_bytes();
    let loaded = Command::load(&mut Reader::new(&bytes)).expect("load");
    assert!(loaded.is_none());
}

#[test]
fn unknown_tag_is_rejected_with_its_offset() {
    let mut writer = Writer::new();
    writer.int32(42);
    let bytes = writer.into_bytes();
    let err = Command::load(&mut Reader::new(&bytes)).expect_err("unknown tag");
    assert!(matches!(
        err,
        CommandLoadError::UnknownCommandKind { tag: 42, offset: 0 }
    ));
}

#[test]
fn truncated_command_is_a_stream_error() {
    let mut writer = Writer::new();
    writer.int32(CommandKind::Kill.tag());
    writer.int32(1);
    let bytes = writer.into_bytes();
    let err = Command::load(&mut Reader::new(&bytes)).expect_err("truncated");
    assert!(matches!(err, CommandLoadError::Stream(_)));
}

#[test]
fn chain_depth_limit_is_enforced() {
    let mut h = Harness::new();
    let ship = h.ship("Cobra", DVec3::ZERO);
    let pirate = h.ship("Pirate", DVec3::new(100.0, 0.0, 0.0));
    let table = IdentityTable::from_world(&h.world);
    let write_chain = |levels: usize| {
        let mut writer = Writer::new();
        for _ in 0..levels {
            writer.int32(CommandKind::Kamikaze.tag());
            writer.int32(table.lookup_handle(Some(ship)));
            writer.int32(table.lookup_handle(Some(pirate)));
        }
        writer.int32(NONE_TAG);
        writer.into_bytes()
    };

    let deepest = write_chain(MAX_CHAIN_DEPTH);
    let loaded = Command::load(&mut Reader::new(&deepest))
        .expect("load")
        .expect("command");
    let command = loaded.post_load_fixup(&table, &h.world).expect("fixup");
    assert_eq!(command.chain_depth(), MAX_CHAIN_DEPTH);

    let too_deep = write_chain(MAX_CHAIN_DEPTH + 1);
    let err = Command::load(&mut Reader::new(&too_deep)).expect_err("too deep");
    assert!(matches!(
        err,
        CommandLoadError::ChainTooDeep {
            max: MAX_CHAIN_DEPTH,
            ..
        }
    ));
}

#[test]
fn unresolved_owner_fails_fixup() {
    let mut h = Harness::new();
    let pirate = h.ship("Pirate", DVec3::new(500.0, 0.0, 0.0));
    let ship = h.ship("Cobra", DVec3::ZERO);
    let command = Command::kamikaze(ship, pirate);
    let table = IdentityTable::from_world(&h.world);
    let mut writer = Writer::new();
    command.save(&mut writer, &table);
    let bytes = writer.into_bytes();
    let loaded = Command::load(&mut Reader::new(&bytes))
        .expect("load")
        .expect("command");

    let err = loaded
        .post_load_fixup(&IdentityTable::default(), &h.world)
        .expect_err("owner missing");
    assert!(matches!(err, CommandLoadError::MissingOwner { handle: 2 }));
}

#[test]
fn target_outside_the_table_reloads_as_lost_and_aborts() {
    let mut h = Harness::new();
    let ship = h.ship("Cobra", DVec3::ZERO);
    let command = Command::kamikaze(ship, BodyId(777));

    let mut reloaded = h.round_trip(&command);

    assert_eq!(reloaded.target(), None);
    assert_eq!(h.tick(&mut reloaded, 0.1), CommandStatus::Aborted);
}
