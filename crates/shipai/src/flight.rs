use glam::DVec3;
use tracing::debug;

use crate::tuning::AiTuning;
use crate::world::{Body, BodyId, ShipState, SystemPath, World};

/// Motion directive a command issues to its owner ship. The flight model
/// turns it into velocity changes every tick.
#[derive(Debug, Clone, Copy, PartialEq)]
pub enum FlightDirective {
    Idle,
    FlyToward {
        point: DVec3,
        end_speed: f64,
        frame_velocity: DVec3,
    },
    HoldOrbit {
        center: BodyId,
        radius: f64,
    },
    Pursue {
        aim: DVec3,
    },
    Evade {
        away_from: DVec3,
    },
    Ram {
        target: BodyId,
    },
    Dock {
        station: BodyId,
    },
    Hyperspace {
        dest: SystemPath,
    },
}

impl FlightDirective {
    pub fn referenced_body(&self) -> Option<BodyId> {
        match *self {
            Self::HoldOrbit { center, .. } => Some(center),
            Self::Ram { target } => Some(target),
            Self::Dock { station } => Some(station),
            Self::Idle
            | Self::FlyToward { .. }
            | Self::Pursue { .. }
            | Self::Evade { .. }
            | Self::Hyperspace { .. } => None,
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct RamContact {
    pub ship: BodyId,
    pub target: BodyId,
}

#[derive(Debug, Clone, Copy, PartialEq)]
struct ShipUpdate {
    id: BodyId,
    velocity: DVec3,
    position: Option<DVec3>,
    docked_with: Option<BodyId>,
    pending_jump: Option<SystemPath>,
}

/// Kinematic stand-in for the real flight model: bounded acceleration toward
/// a desired velocity, no orientation dynamics.
#[derive(Debug, Default, Clone, Copy)]
pub struct FlightModel;

impl FlightModel {
    pub fn step(&self, world: &mut World, dt: f64, tuning: &AiTuning) -> Vec<RamContact> {
        let updates: Vec<ShipUpdate> = world
            .bodies()
            .iter()
            .filter_map(|body| {
                let ship = body.ship.as_ref()?;
                Some(steer(world, body, ship, dt, tuning))
            })
            .collect();

        for update in updates {
            let Some(body) = world.find_body_mut(update.id) else {
                continue;
            };
            body.velocity = update.velocity;
            if let Some(position) = update.position {
                body.position = position;
            }
            if let Some(ship) = body.ship.as_mut() {
                if ship.docked_with != update.docked_with {
                    debug!(ship = update.id.0, docked_with = ?update.docked_with.map(|id| id.0), "dock_state_changed");
                }
                ship.docked_with = update.docked_with;
                ship.pending_jump = update.pending_jump;
            }
        }

        for body in world.bodies_mut() {
            body.position += body.velocity * dt;
        }

        detect_ram_contacts(world, tuning)
    }
}

fn steer(world: &World, body: &Body, ship: &ShipState, dt: f64, tuning: &AiTuning) -> ShipUpdate {
    let max_delta_v = ship.max_accel * dt;
    let mut update = ShipUpdate {
        id: body.id,
        velocity: body.velocity,
        position: None,
        docked_with: ship.docked_with,
        pending_jump: ship.pending_jump,
    };

    match ship.directive {
        FlightDirective::Idle => {
            if let Some(station) = ship.docked_with.and_then(|id| world.find_body(id)) {
                update.velocity = station.velocity;
                update.position = station.docking_port_position();
            }
        }
        FlightDirective::FlyToward {
            point,
            end_speed,
            frame_velocity,
        } => {
            update.docked_with = None;
            let to_point = point - body.position;
            let distance = to_point.length();
            let desired = match to_point.try_normalize() {
                Some(direction) => {
                    let braking_speed =
                        (end_speed * end_speed + 2.0 * ship.max_accel * distance).sqrt();
                    let speed = braking_speed.min(ship.max_speed).min(distance / dt.max(1e-9));
                    frame_velocity + direction * speed
                }
                None => frame_velocity,
            };
            update.velocity = approach(body.velocity, desired, max_delta_v);
        }
        FlightDirective::HoldOrbit { center, radius } => {
            update.docked_with = None;
            if let Some(center) = world.find_body(center) {
                let radial = (body.position - center.position)
                    .try_normalize()
                    .unwrap_or(DVec3::X);
                let tangent = radial.cross(DVec3::Y).try_normalize().unwrap_or(DVec3::Z);
                update.position = Some(center.position + radial * radius);
                update.velocity = center.velocity + tangent * tuning.orbit_speed;
            }
        }
        FlightDirective::Pursue { aim } => {
            update.docked_with = None;
            let desired = (aim - body.position).try_normalize().unwrap_or(DVec3::ZERO)
                * ship.max_speed;
            update.velocity = approach(body.velocity, desired, max_delta_v);
        }
        FlightDirective::Evade { away_from } => {
            update.docked_with = None;
            let desired = (body.position - away_from)
                .try_normalize()
                .unwrap_or(DVec3::Y)
                * ship.max_speed;
            update.velocity = approach(body.velocity, desired, max_delta_v);
        }
        FlightDirective::Ram { target } => {
            update.docked_with = None;
            if let Some(target) = world.find_body(target) {
                let desired = (target.position - body.position)
                    .try_normalize()
                    .unwrap_or(DVec3::ZERO)
                    * ship.max_speed;
                update.velocity = approach(body.velocity, desired, max_delta_v);
            }
        }
        FlightDirective::Dock { station } => {
            if let Some(station_body) = world.find_body(station) {
                update.position = station_body.docking_port_position();
                update.velocity = station_body.velocity;
                update.docked_with = Some(station);
            }
        }
        FlightDirective::Hyperspace { dest } => {
            update.docked_with = None;
            update.pending_jump = Some(dest);
        }
    }
    update
}

fn approach(current: DVec3, desired: DVec3, max_delta: f64) -> DVec3 {
    let delta = desired - current;
    let length = delta.length();
    if length <= max_delta {
        desired
    } else {
        current + delta * (max_delta / length)
    }
}

fn detect_ram_contacts(world: &World, tuning: &AiTuning) -> Vec<RamContact> {
    let mut contacts = Vec::new();
    for body in world.bodies() {
        let Some(FlightDirective::Ram { target }) = body.ship.as_ref().map(|ship| ship.directive)
        else {
            continue;
        };
        let Some(target_body) = world.find_body(target) else {
            continue;
        };
        let reach = body.radius + target_body.radius + tuning.ram_contact_margin;
        if body.position.distance(target_body.position) <= reach {
            contacts.push(RamContact {
                ship: body.id,
                target,
            });
        }
    }
    contacts
}
