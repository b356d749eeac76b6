use glam::{DQuat, DVec3};

use crate::flight::FlightDirective;
use crate::stream::{Reader, StreamError, Writer};

#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash)]
pub struct BodyId(pub u64);

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum BodyKind {
    Star,
    Planet,
    Station,
    Ship,
}

impl BodyKind {
    pub fn tag(self) -> i32 {
        match self {
            Self::Star => 0,
            Self::Planet => 1,
            Self::Station => 2,
            Self::Ship => 3,
        }
    }

    pub fn from_tag(tag: i32) -> Option<Self> {
        match tag {
            0 => Some(Self::Star),
            1 => Some(Self::Planet),
            2 => Some(Self::Station),
            3 => Some(Self::Ship),
            _ => None,
        }
    }
}

/// Address of a body in another star system. Stored by value, so it needs no
/// fixup after a load.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Hash)]
pub struct SystemPath {
    pub sector_x: i32,
    pub sector_y: i32,
    pub sector_z: i32,
    pub system_index: i32,
    pub body_index: i32,
}

impl SystemPath {
    pub fn new(sector: (i32, i32, i32), system_index: i32, body_index: i32) -> Self {
        Self {
            sector_x: sector.0,
            sector_y: sector.1,
            sector_z: sector.2,
            system_index,
            body_index,
        }
    }

    pub fn save(&self, writer: &mut Writer) {
        writer.int32(self.sector_x);
        writer.int32(self.sector_y);
        writer.int32(self.sector_z);
        writer.int32(self.system_index);
        writer.int32(self.body_index);
    }

    pub fn load(reader: &mut Reader<'_>) -> Result<Self, StreamError> {
        Ok(Self {
            sector_x: reader.int32()?,
            sector_y: reader.int32()?,
            sector_z: reader.int32()?,
            system_index: reader.int32()?,
            body_index: reader.int32()?,
        })
    }
}

#[derive(Debug, Clone, PartialEq)]
pub struct ShipState {
    pub max_speed: f64,
    pub max_accel: f64,
    pub directive: FlightDirective,
    pub docked_with: Option<BodyId>,
    pub pending_jump: Option<SystemPath>,
}

impl ShipState {
    pub fn new(max_speed: f64, max_accel: f64) -> Self {
        Self {
            max_speed,
            max_accel,
            directive: FlightDirective::Idle,
            docked_with: None,
            pending_jump: None,
        }
    }
}

/// Docking port of a station, expressed in the station's local frame.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct DockingPort {
    pub offset: DVec3,
    pub approach_distance: f64,
}

#[derive(Debug, Clone, PartialEq)]
pub struct BodyDesc {
    pub kind: BodyKind,
    pub label: String,
    pub position: DVec3,
    pub velocity: DVec3,
    pub orientation: DQuat,
    pub radius: f64,
    pub ship: Option<ShipState>,
    pub docking: Option<DockingPort>,
}

impl BodyDesc {
    pub fn new(kind: BodyKind, label: impl Into<String>, position: DVec3) -> Self {
        Self {
            kind,
            label: label.into(),
            position,
            velocity: DVec3::ZERO,
            orientation: DQuat::IDENTITY,
            radius: 1.0,
            ship: None,
            docking: None,
        }
    }

    pub fn ship(label: impl Into<String>, position: DVec3, state: ShipState) -> Self {
        Self::new(BodyKind::Ship, label, position)
            .with_radius(10.0)
            .with_ship(state)
    }

    pub fn station(label: impl Into<String>, position: DVec3, port: DockingPort) -> Self {
        Self::new(BodyKind::Station, label, position)
            .with_radius(100.0)
            .with_docking(port)
    }

    pub fn planet(label: impl Into<String>, position: DVec3, radius: f64) -> Self {
        Self::new(BodyKind::Planet, label, position).with_radius(radius)
    }

    pub fn with_velocity(mut self, velocity: DVec3) -> Self {
        self.velocity = velocity;
        self
    }

    pub fn with_orientation(mut self, orientation: DQuat) -> Self {
        self.orientation = orientation;
        self
    }

    pub fn with_radius(mut self, radius: f64) -> Self {
        self.radius = radius;
        self
    }

    pub fn with_ship(mut self, state: ShipState) -> Self {
        self.ship = Some(state);
        self
    }

    pub fn with_docking(mut self, port: DockingPort) -> Self {
        self.docking = Some(port);
        self
    }
}

#[derive(Debug, Clone, PartialEq)]
pub struct Body {
    pub id: BodyId,
    pub kind: BodyKind,
    pub label: String,
    pub position: DVec3,
    pub velocity: DVec3,
    pub orientation: DQuat,
    pub radius: f64,
    pub ship: Option<ShipState>,
    pub docking: Option<DockingPort>,
}

impl Body {
    fn from_desc(id: BodyId, desc: BodyDesc) -> Self {
        Self {
            id,
            kind: desc.kind,
            label: desc.label,
            position: desc.position,
            velocity: desc.velocity,
            orientation: desc.orientation,
            radius: desc.radius,
            ship: desc.ship,
            docking: desc.docking,
        }
    }

    pub fn is_ship(&self) -> bool {
        self.ship.is_some()
    }

    pub fn can_dock(&self) -> bool {
        self.docking.is_some()
    }

    /// Maps an offset in this body's local frame to a world position.
    pub fn local_to_world(&self, offset: DVec3) -> DVec3 {
        self.position + self.orientation * offset
    }

    pub fn docking_port_position(&self) -> Option<DVec3> {
        self.docking.map(|port| self.local_to_world(port.offset))
    }

    /// Point on the port's outward axis at the approach distance.
    pub fn docking_approach_position(&self) -> Option<DVec3> {
        self.docking.map(|port| {
            let outward = port.offset.try_normalize().unwrap_or(DVec3::Z);
            self.local_to_world(port.offset + outward * port.approach_distance)
        })
    }
}

#[derive(Debug, Default)]
pub struct BodyIdAllocator {
    next: u64,
}

impl BodyIdAllocator {
    pub fn allocate(&mut self) -> BodyId {
        let id = BodyId(self.next);
        self.next = self.next.saturating_add(1);
        id
    }
}

#[derive(Debug, Default)]
pub struct World {
    allocator: BodyIdAllocator,
    bodies: Vec<Body>,
    pending_spawns: Vec<Body>,
    pending_despawns: Vec<BodyId>,
    time: f64,
}

impl World {
    pub fn spawn(&mut self, desc: BodyDesc) -> BodyId {
        let id = self.allocator.allocate();
        self.pending_spawns.push(Body::from_desc(id, desc));
        id
    }

    pub fn despawn(&mut self, id: BodyId) -> bool {
        let exists_now = self.bodies.iter().any(|body| body.id == id);
        let pending_spawn = self.pending_spawns.iter().any(|body| body.id == id);
        if !exists_now && !pending_spawn {
            return false;
        }
        self.pending_despawns.push(id);
        true
    }

    /// Applies queued spawns and despawns. Returns the ids of bodies that were
    /// removed so the caller can broadcast the removals. Ship state that
    /// pointed at a removed body is scrubbed here.
    pub fn apply_pending(&mut self) -> Vec<BodyId> {
        let mut removed = Vec::new();
        if !self.pending_despawns.is_empty() {
            self.pending_despawns.sort();
            self.pending_despawns.dedup();
            let pending = &self.pending_despawns;
            self.bodies.retain(|body| {
                let doomed = pending.binary_search(&body.id).is_ok();
                if doomed {
                    removed.push(body.id);
                }
                !doomed
            });
            self.pending_spawns
                .retain(|body| pending.binary_search(&body.id).is_err());
            self.pending_despawns.clear();
        }

        self.bodies.append(&mut self.pending_spawns);

        if !removed.is_empty() {
            for body in &mut self.bodies {
                if let Some(ship) = body.ship.as_mut() {
                    scrub_ship_references(ship, &removed);
                }
            }
        }
        removed
    }

    pub fn clear(&mut self) {
        self.bodies.clear();
        self.pending_spawns.clear();
        self.pending_despawns.clear();
        self.time = 0.0;
    }

    pub fn time(&self) -> f64 {
        self.time
    }

    pub fn set_time(&mut self, time: f64) {
        self.time = time;
    }

    pub fn advance_time(&mut self, dt: f64) {
        self.time += dt;
    }

    pub fn body_count(&self) -> usize {
        self.bodies.len()
    }

    pub fn bodies(&self) -> &[Body] {
        &self.bodies
    }

    pub fn bodies_mut(&mut self) -> &mut [Body] {
        &mut self.bodies
    }

    pub fn contains(&self, id: BodyId) -> bool {
        self.find_body(id).is_some()
    }

    pub fn find_body(&self, id: BodyId) -> Option<&Body> {
        self.bodies.iter().find(|body| body.id == id)
    }

    pub fn find_body_mut(&mut self, id: BodyId) -> Option<&mut Body> {
        self.bodies.iter_mut().find(|body| body.id == id)
    }

    pub fn ship_state_mut(&mut self, id: BodyId) -> Option<&mut ShipState> {
        self.find_body_mut(id).and_then(|body| body.ship.as_mut())
    }

    /// Replaces the owner's motion directive. Returns false when `ship` is not
    /// a live ship.
    pub fn issue_directive(&mut self, ship: BodyId, directive: FlightDirective) -> bool {
        match self.ship_state_mut(ship) {
            Some(state) => {
                state.directive = directive;
                true
            }
            None => false,
        }
    }
}

fn scrub_ship_references(ship: &mut ShipState, removed: &[BodyId]) {
    if let Some(docked) = ship.docked_with {
        if removed.binary_search(&docked).is_ok() {
            ship.docked_with = None;
        }
    }
    if let Some(referenced) = ship.directive.referenced_body() {
        if removed.binary_search(&referenced).is_ok() {
            ship.directive = FlightDirective::Idle;
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn spawn_ship(world: &mut World, label: &str, position: DVec3) -> BodyId {
        world.spawn(BodyDesc::ship(label, position, ShipState::new(200.0, 50.0)))
    }

    #[test]
    fn allocator_never_reuses_ids() {
        let mut allocator = BodyIdAllocator::default();
        let first = allocator.allocate();
        let second = allocator.allocate();
        let third = allocator.allocate();

        assert_eq!(first.0, 0);
        assert_eq!(second.0, 1);
        assert_eq!(third.0, 2);
    }

    #[test]
    fn spawn_is_deferred_until_apply_pending() {
        let mut world = World::default();
        let id = spawn_ship(&mut world, "Cobra", DVec3::ZERO);
        assert!(world.find_body(id).is_none());

        let removed = world.apply_pending();
        assert!(removed.is_empty());
        assert_eq!(world.body_count(), 1);
        assert_eq!(world.find_body(id).expect("ship").label, "Cobra");
    }

    #[test]
    fn duplicate_pending_despawns_are_idempotent_and_reported_once() {
        let mut world = World::default();
        let doomed = spawn_ship(&mut world, "doomed", DVec3::ZERO);
        let survivor = spawn_ship(&mut world, "survivor", DVec3::X);
        world.apply_pending();

        assert!(world.despawn(doomed));
        assert!(world.despawn(doomed));
        let removed = world.apply_pending();

        assert_eq!(removed, vec![doomed]);
        assert!(world.find_body(doomed).is_none());
        assert!(world.find_body(survivor).is_some());
        assert!(!world.despawn(doomed));
    }

    #[test]
    fn despawn_of_pending_spawn_never_materializes() {
        let mut world = World::default();
        let id = spawn_ship(&mut world, "ghost", DVec3::ZERO);
        assert!(world.despawn(id));
        let removed = world.apply_pending();
        assert!(removed.is_empty());
        assert_eq!(world.body_count(), 0);
    }

    #[test]
    fn removing_a_station_scrubs_docked_ships_and_directives() {
        let mut world = World::default();
        let station = world.spawn(BodyDesc::station(
            "Orbital",
            DVec3::ZERO,
            DockingPort {
                offset: DVec3::new(0.0, 0.0, 100.0),
                approach_distance: 500.0,
            },
        ));
        let ship = spawn_ship(&mut world, "Eagle", DVec3::ZERO);
        world.apply_pending();
        {
            let state = world.ship_state_mut(ship).expect("ship");
            state.docked_with = Some(station);
            state.directive = FlightDirective::Dock { station };
        }

        world.despawn(station);
        world.apply_pending();

        let state = world.find_body(ship).and_then(|b| b.ship.as_ref()).expect("ship");
        assert_eq!(state.docked_with, None);
        assert_eq!(state.directive, FlightDirective::Idle);
    }

    #[test]
    fn docking_port_follows_station_orientation() {
        let station = Body::from_desc(
            BodyId(9),
            BodyDesc::station(
                "Rotated",
                DVec3::new(10.0, 0.0, 0.0),
                DockingPort {
                    offset: DVec3::new(0.0, 0.0, 100.0),
                    approach_distance: 50.0,
                },
            )
            .with_orientation(DQuat::from_rotation_y(std::f64::consts::FRAC_PI_2)),
        );
        let port = station.docking_port_position().expect("port");
        assert!((port - DVec3::new(110.0, 0.0, 0.0)).length() < 1e-9);
        let approach = station.docking_approach_position().expect("approach");
        assert!((approach - DVec3::new(160.0, 0.0, 0.0)).length() < 1e-9);
    }

    #[test]
    fn issue_directive_rejects_non_ships() {
        let mut world = World::default();
        let planet = world.spawn(BodyDesc::planet("Lave", DVec3::ZERO, 6000.0));
        world.apply_pending();
        assert!(!world.issue_directive(planet, FlightDirective::Idle));
    }

    #[test]
    fn system_path_round_trips_by_value() {
        let path = SystemPath::new((1, -2, 3), 4, 5);
        let mut writer = Writer::new();
        path.save(&mut writer);
        let bytes = writer.into_bytes();
        let loaded = SystemPath::load(&mut Reader::new(&bytes)).expect("load");
        assert_eq!(loaded, path);
    }
}
