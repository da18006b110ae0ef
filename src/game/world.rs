//! Authoritative simulation
//!
//! Owns every ship and item, the zones and the per-tick ship grid, and one
//! [`GhostConnection`] per client. A tick runs in a fixed order:
//!
//! 1. rebuild the ship grid
//! 2. apply queued moves (`ServerControlFromClient`), acknowledging each
//! 3. step every ship once (`ServerMainLoop`, robots on the control path)
//! 4. detach released items, remove expired wrecks and respawn their owners
//! 5. recompute each connection's scope
//! 6. fan dirty bits out to every connection
//! 7. write one packet per connection, in parallel

use std::sync::Arc;

use hashbrown::HashMap;
use rayon::prelude::*;
use smallvec::SmallVec;
use tracing::{debug, info, trace};
use uuid::Uuid;

use crate::game::constants::{net::SCOPE_RADIUS, ship::NEUTRAL_TEAM};
use crate::game::effects::Effects;
use crate::game::handle::Registry;
use crate::game::input_buffer::{InputBuffer, InputBufferError, InputSender, MoveMessage};
use crate::game::items::{Item, ItemHandle, ItemKind};
use crate::game::loadout::{Loadout, LoadoutError};
use crate::game::modules::ShipModule;
use crate::game::rules::GameRules;
use crate::game::ship::{IdleOutcome, IdlePath, ShotFired, Ship, ShipHandle, TickContext};
use crate::game::spatial::{SpatialGrid, WorldView, ZoneMap, SHIP_GRID_CELL_SIZE};
use crate::game::systems::damage::{self, DamageInfo};
use crate::net::ghost::{ConnectionId, GhostConnection, OutgoingPacket};
use crate::net::mask::ChangeMask;
use crate::util::vec2::Vec2;

/// Everything the server knows about one client beyond its ghosts
#[derive(Debug)]
struct ClientSlot {
    ghost: GhostConnection,
    name: String,
    team: i32,
    /// Applied at the next spawn
    loadout: Loadout,
    last_heard_ms: u64,
}

/// A shot fired this tick, for whoever resolves hits
#[derive(Debug, Clone, Copy)]
pub struct ShotEvent {
    pub shooter: ShipHandle,
    pub shot: ShotFired,
}

/// What one tick did
#[derive(Debug, Default)]
pub struct TickReport {
    pub tick: u64,
    pub now_ms: u64,
    pub moves_applied: usize,
    pub kills: usize,
    pub removed: usize,
    pub respawned: usize,
    pub ships_alive: usize,
    pub shots: Vec<ShotEvent>,
    pub packets: Vec<(ConnectionId, OutgoingPacket)>,
}

impl TickReport {
    pub fn bytes_sent(&self) -> usize {
        self.packets.iter().map(|(_, p)| p.bytes.len()).sum()
    }

    pub fn ghost_updates(&self) -> usize {
        self.packets.iter().map(|(_, p)| p.ghost_updates).sum()
    }
}

pub struct World {
    ships: Registry<Ship>,
    items: Registry<Item>,
    zones: ZoneMap,
    grid: SpatialGrid,
    rules: Box<dyn GameRules>,
    effects: Arc<dyn Effects>,
    connections: HashMap<ConnectionId, ClientSlot>,
    inputs: InputBuffer,
    spawn_points: Vec<Vec2>,
    next_spawn: usize,
    team_count: i32,
    now_ms: u64,
    tick: u64,
}

impl World {
    pub fn new(rules: Box<dyn GameRules>, effects: Arc<dyn Effects>) -> Self {
        Self {
            ships: Registry::new(),
            items: Registry::new(),
            zones: ZoneMap::default(),
            grid: SpatialGrid::new(SHIP_GRID_CELL_SIZE),
            rules,
            effects,
            connections: HashMap::new(),
            inputs: InputBuffer::default(),
            spawn_points: Vec::new(),
            next_spawn: 0,
            team_count: 2,
            now_ms: 0,
            tick: 0,
        }
    }

    pub fn with_zones(mut self, zones: ZoneMap) -> Self {
        self.zones = zones;
        self
    }

    /// Teams are handed out round robin; 0 puts everyone on the neutral team
    pub fn with_team_count(mut self, team_count: i32) -> Self {
        self.team_count = team_count.max(0);
        self
    }

    pub fn add_spawn_point(&mut self, pos: Vec2) {
        self.spawn_points.push(pos);
    }

    // ========================================================================
    // Accessors
    // ========================================================================

    #[inline]
    pub fn now_ms(&self) -> u64 {
        self.now_ms
    }

    #[inline]
    pub fn tick_count(&self) -> u64 {
        self.tick
    }

    #[inline]
    pub fn ships(&self) -> &Registry<Ship> {
        &self.ships
    }

    #[inline]
    pub fn items(&self) -> &Registry<Item> {
        &self.items
    }

    #[inline]
    pub fn zones(&self) -> &ZoneMap {
        &self.zones
    }

    pub fn ship(&self, handle: ShipHandle) -> Option<&Ship> {
        self.ships.get(handle)
    }

    #[inline]
    pub fn connection_count(&self) -> usize {
        self.connections.len()
    }

    pub fn connection(&self, id: ConnectionId) -> Option<&GhostConnection> {
        self.connections.get(&id).map(|slot| &slot.ghost)
    }

    /// The ship `id` currently drives
    pub fn controlled_ship(&self, id: ConnectionId) -> Option<ShipHandle> {
        self.connections.get(&id).and_then(|slot| slot.ghost.control)
    }

    pub fn last_heard_ms(&self, id: ConnectionId) -> Option<u64> {
        self.connections.get(&id).map(|slot| slot.last_heard_ms)
    }

    /// Handle for pushing moves from a connection task
    pub fn input_sender(&self) -> InputSender {
        self.inputs.sender()
    }

    // ========================================================================
    // Connections
    // ========================================================================

    /// Accept a client and give it a ship.
    ///
    /// An unusable loadout text falls back to the default loadout.
    pub fn connect(&mut self, name: &str, loadout: Option<&str>) -> ConnectionId {
        let id = Uuid::new_v4();
        let team = if self.team_count > 0 {
            self.connections.len() as i32 % self.team_count
        } else {
            NEUTRAL_TEAM
        };
        let mut chosen = Loadout::default();
        if let Some(text) = loadout {
            // Other parse failures are logged by the loadout itself
            if let Err(LoadoutError::Empty) = Loadout::apply_str(&mut chosen, text) {
                debug!(name, "Empty loadout requested, using default");
            }
        }

        self.connections.insert(
            id,
            ClientSlot {
                ghost: GhostConnection::new(id),
                name: name.to_string(),
                team,
                loadout: chosen,
                last_heard_ms: self.now_ms,
            },
        );
        let handle = self.spawn_for(id);
        info!(connection = %id, name, team, ?handle, "Client connected");
        id
    }

    /// Drop a client and its ship. Other clients see the ship leave scope.
    pub fn disconnect(&mut self, id: ConnectionId) -> bool {
        let Some(slot) = self.connections.remove(&id) else {
            return false;
        };
        if let Some(handle) = slot.ghost.control {
            self.remove_ship(handle);
        }
        info!(connection = %id, name = %slot.name, "Client disconnected");
        true
    }

    /// Queue a move as a connection task would
    pub fn submit_move(&self, message: MoveMessage) -> Result<(), InputBufferError> {
        self.inputs.try_submit(message)
    }

    /// Choose the loadout for the next spawn; with `immediate` also equip it now
    pub fn request_loadout(&mut self, id: ConnectionId, text: &str, immediate: bool) -> Result<(), LoadoutError> {
        let loadout = Loadout::parse(text)?;
        let Some(slot) = self.connections.get_mut(&id) else {
            return Ok(());
        };
        slot.loadout = loadout;
        if immediate {
            if let Some(ship) = slot.ghost.control.and_then(|h| self.ships.get_mut(h)) {
                ship.set_loadout(loadout, false, &self.items);
            }
        }
        Ok(())
    }

    // ========================================================================
    // Ships and items
    // ========================================================================

    /// Add an uncontrolled ship that steps on its own current move
    pub fn spawn_robot(&mut self, name: &str, team: i32, pos: Vec2) -> ShipHandle {
        let mut ship = Ship::new(name, team, pos);
        ship.is_robot = true;
        ship.initialize(pos, self.now_ms);
        let handle = self.ships.insert(ship);
        if let Some(ship) = self.ships.get_mut(handle) {
            ship.handle = Some(handle);
        }
        debug!(?handle, name, "Robot spawned");
        handle
    }

    fn next_spawn_point(&mut self) -> Vec2 {
        if self.spawn_points.is_empty() {
            return Vec2::ZERO;
        }
        let pos = self.spawn_points[self.next_spawn % self.spawn_points.len()];
        self.next_spawn = self.next_spawn.wrapping_add(1);
        pos
    }

    fn spawn_for(&mut self, id: ConnectionId) -> Option<ShipHandle> {
        let pos = self.next_spawn_point();
        let slot = self.connections.get_mut(&id)?;

        let mut ship = Ship::new(slot.name.as_str(), slot.team, pos);
        ship.owner = Some(id);
        ship.controlled = true;
        ship.loadout = slot.loadout;
        ship.initialize(pos, self.now_ms);

        let handle = self.ships.insert(ship);
        if let Some(ship) = self.ships.get_mut(handle) {
            ship.handle = Some(handle);
        }
        slot.ghost.control = Some(handle);
        debug!(connection = %id, ?handle, x = pos.x, y = pos.y, "Ship spawned");
        Some(handle)
    }

    fn remove_ship(&mut self, handle: ShipHandle) -> Option<Ship> {
        let mut ship = self.ships.remove(handle)?;
        ship.release_all_mounts();
        let pos = ship.actual_pos();
        for item in ship.take_pending_dismounts() {
            if let Some(item) = self.items.get_mut(item) {
                if item.is_mounted_on(handle) {
                    item.dismount(pos);
                }
            }
        }
        Some(ship)
    }

    pub fn spawn_item(&mut self, item: Item) -> ItemHandle {
        self.items.insert(item)
    }

    pub fn remove_item(&mut self, handle: ItemHandle) -> Option<Item> {
        self.items.remove(handle)
    }

    /// Attach `item` to `ship`; false when either is gone, the ship is dead
    /// or the item is already carried
    pub fn mount_item(&mut self, ship: ShipHandle, item: ItemHandle) -> bool {
        let Some(carrier) = self.ships.get_mut(ship) else {
            return false;
        };
        let Some(it) = self.items.get_mut(item) else {
            return false;
        };
        if carrier.is_destroyed() || it.mount.is_some() {
            return false;
        }
        if it.kind == ItemKind::Resource && !carrier.has_module(ShipModule::Engineer) {
            return false;
        }
        it.mount = Some(ship);
        carrier.mount_item(item);
        true
    }

    /// Run a hit through the damage rules
    pub fn apply_damage(&mut self, ship: ShipHandle, info: &DamageInfo) -> bool {
        match self.ships.get_mut(ship) {
            Some(target) => damage::damage_object(target, info, self.rules.as_ref()),
            None => false,
        }
    }

    /// Gameplay relocation; observers see a teleport
    pub fn teleport(&mut self, ship: ShipHandle, pos: Vec2) -> bool {
        match self.ships.get_mut(ship) {
            Some(target) if !target.is_destroyed() => {
                target.set_actual_pos(pos, true);
                true
            }
            _ => false,
        }
    }

    // ========================================================================
    // Tick
    // ========================================================================

    /// Advance the world by `elapsed_ms` and write this tick's packets
    pub fn tick(&mut self, elapsed_ms: u32) -> TickReport {
        self.tick += 1;
        self.now_ms += elapsed_ms as u64;
        let mut report = TickReport {
            tick: self.tick,
            now_ms: self.now_ms,
            ..TickReport::default()
        };

        self.grid
            .rebuild(self.ships.iter().filter_map(|(_, ship)| ship.snapshot()));

        self.apply_moves(&mut report);
        self.step_ships(elapsed_ms, &mut report);
        self.detach_released_items();
        self.expire_wrecks(elapsed_ms, &mut report);
        self.refresh_scopes();
        self.fan_out(&mut report);

        let ships = &self.ships;
        let items = &self.items;
        let now_ms = self.now_ms;
        report.packets = self
            .connections
            .par_values_mut()
            .map(|slot| (slot.ghost.id, slot.ghost.write_packet(ships, items, now_ms)))
            .collect();

        report.ships_alive = self.ships.iter().filter(|(_, s)| !s.is_destroyed()).count();
        trace!(
            tick = report.tick,
            moves = report.moves_applied,
            packets = report.packets.len(),
            "Tick complete"
        );
        report
    }

    fn apply_moves(&mut self, report: &mut TickReport) {
        for message in self.inputs.drain() {
            let Some(slot) = self.connections.get_mut(&message.connection) else {
                continue;
            };
            slot.last_heard_ms = self.now_ms;
            slot.ghost.last_move_seq = Some(message.seq);

            let Some(handle) = slot.ghost.control else {
                continue;
            };
            let Some(ship) = self.ships.get_mut(handle) else {
                continue;
            };
            let mut mv = message.mv;
            mv.prepare();
            ship.set_current_move(mv);

            if let Some(outcome) = self.idle_ship(handle, IdlePath::ServerControlFromClient) {
                report.moves_applied += 1;
                self.settle_outcome(handle, outcome, report);
            }
        }
    }

    /// Robots drive themselves, so they take the full control path
    /// (shield countdown, energy, weapons) on every step
    fn step_ships(&mut self, elapsed_ms: u32, report: &mut TickReport) {
        for handle in self.ships.handles() {
            let Some(ship) = self.ships.get_mut(handle) else {
                continue;
            };
            ship.current_move.time = elapsed_ms;
            let path = if ship.is_robot {
                IdlePath::ServerControlFromClient
            } else {
                IdlePath::ServerMainLoop
            };
            if let Some(outcome) = self.idle_ship(handle, path) {
                self.settle_outcome(handle, outcome, report);
            }
        }
    }

    fn idle_ship(&mut self, handle: ShipHandle, path: IdlePath) -> Option<IdleOutcome> {
        let view = WorldView {
            zones: &self.zones,
            grid: &self.grid,
        };
        let ctx = TickContext {
            now_ms: self.now_ms,
            world: &view,
            rules: self.rules.as_ref(),
            effects: self.effects.as_ref(),
            lost_contact: false,
        };
        let ship = self.ships.get_mut(handle)?;
        Some(ship.idle(path, &ctx))
    }

    /// Queue the shots and hand out any healing
    fn settle_outcome(&mut self, handle: ShipHandle, outcome: IdleOutcome, report: &mut TickReport) {
        report
            .shots
            .extend(outcome.shots.into_iter().map(|shot| ShotEvent { shooter: handle, shot }));

        let Some(amount) = outcome.repair else {
            return;
        };
        let targets: SmallVec<[ShipHandle; 4]> = match self.ships.get(handle) {
            Some(healer) => healer.repair_targets.clone(),
            None => return,
        };
        let heal = DamageInfo::heal(amount);
        for target in targets {
            let Some(ship) = self.ships.get_mut(target) else {
                continue;
            };
            // Targets were picked from the grid; an earlier heal this tick may have topped them up
            if ship.is_destroyed() || ship.health >= 1.0 {
                continue;
            }
            damage::damage_object(ship, &heal, self.rules.as_ref());
            if let Some(snapshot) = ship.snapshot() {
                self.grid.refresh(snapshot);
            }
        }
    }

    fn detach_released_items(&mut self) {
        for (handle, ship) in self.ships.iter_mut() {
            let pos = ship.actual_pos();
            for item in ship.take_pending_dismounts() {
                if let Some(item) = self.items.get_mut(item) {
                    if item.is_mounted_on(handle) {
                        item.dismount(pos);
                    }
                }
            }
            ship.prune_mounts(&self.items);
        }
    }

    fn expire_wrecks(&mut self, elapsed_ms: u32, report: &mut TickReport) {
        let expired: Vec<ShipHandle> = self
            .ships
            .iter_mut()
            .filter_map(|(handle, ship)| ship.update_deletion(elapsed_ms).then_some(handle))
            .collect();

        for handle in expired {
            let Some(ship) = self.remove_ship(handle) else {
                continue;
            };
            report.removed += 1;
            debug!(?handle, name = %ship.name, "Wreck removed");

            let Some(owner) = ship.owner else {
                continue;
            };
            if let Some(slot) = self.connections.get_mut(&owner) {
                // The ship that died keeps whatever it last equipped
                if slot.ghost.control == Some(handle) {
                    slot.loadout = ship.loadout;
                    slot.ghost.control = None;
                }
            }
            if self.spawn_for(owner).is_some() {
                report.respawned += 1;
            }
        }
    }

    fn refresh_scopes(&mut self) {
        for slot in self.connections.values_mut() {
            let visible = visible_ships(&self.ships, &self.items, slot.ghost.control);
            slot.ghost.update_scope(&visible);
            slot.ghost.prune_items(&self.items);
        }
    }

    fn fan_out(&mut self, report: &mut TickReport) {
        for (handle, ship) in self.ships.iter_mut() {
            let bits = ship.take_dirty();
            if bits.is_empty() {
                continue;
            }
            if bits.contains(ChangeMask::EXPLOSION) {
                report.kills += 1;
            }
            for slot in self.connections.values_mut() {
                slot.ghost.mark(handle, bits);
            }
        }
    }
}

/// Ships a connection should be ghosting: its own ship always, then every
/// ship in range that is either visible or a teammate
fn visible_ships(ships: &Registry<Ship>, items: &Registry<Item>, own: Option<ShipHandle>) -> Vec<ShipHandle> {
    let viewer = own.and_then(|h| ships.get(h));
    let reach_sq = SCOPE_RADIUS * SCOPE_RADIUS;

    ships
        .iter()
        .filter(|&(handle, ship)| {
            if Some(handle) == own {
                return true;
            }
            match viewer {
                Some(viewer) => {
                    let teammate = viewer.team != NEUTRAL_TEAM && viewer.team == ship.team;
                    (ship.render_pos() - viewer.render_pos()).length_sq() <= reach_sq
                        && (teammate || ship.is_visible(items))
                }
                None => ship.is_visible(items),
            }
        })
        .map(|(handle, _)| handle)
        .collect()
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::game::constants::timing::{KILL_DELETE_DELAY, SPAWN_SHIELD_TIME};
    use crate::game::effects::RecordingEffects;
    use crate::game::modules::WeaponType;
    use crate::game::moves::MoveRecord;
    use crate::game::rules::OpenRules;
    use crate::game::systems::damage::DamageSource;
    use crate::net::client::ClientReplica;

    fn world() -> World {
        let mut world = World::new(Box::new(OpenRules::default()), Arc::new(RecordingEffects::new()));
        world.add_spawn_point(Vec2::new(0.0, 0.0));
        world.add_spawn_point(Vec2::new(200.0, 0.0));
        world
    }

    fn asteroid_hit(amount: f32) -> DamageInfo {
        DamageInfo::point(amount, DamageSource::Asteroid)
    }

    fn send(world: &World, id: ConnectionId, seq: u32, x: f32) {
        let mv = MoveRecord::new(x, 0.0, 0.0, 33);
        world
            .submit_move(MoveMessage { connection: id, seq, mv })
            .expect("queue");
    }

    #[test]
    fn test_connect_spawns_ship() {
        let mut world = world();
        let a = world.connect("Alpha", None);
        let b = world.connect("Bravo", Some("Sensor,Armor,Phaser,Burster,Mine"));

        let ship_a = world.controlled_ship(a).and_then(|h| world.ship(h)).expect("ship a");
        let ship_b = world.controlled_ship(b).and_then(|h| world.ship(h)).expect("ship b");
        assert_eq!(ship_a.team, 0);
        assert_eq!(ship_b.team, 1);
        assert_eq!(ship_b.render_pos(), Vec2::new(200.0, 0.0));
        assert!(ship_b.has_module(ShipModule::Armor));
        assert_eq!(ship_b.loadout.weapons[2], WeaponType::Mine);
    }

    #[test]
    fn test_bad_loadout_uses_default() {
        let mut world = world();
        let id = world.connect("Alpha", Some("Shield,Phaser"));
        let ship = world.controlled_ship(id).and_then(|h| world.ship(h)).expect("ship");
        assert_eq!(ship.loadout, Loadout::default());

        let empty = world.connect("Bravo", Some("  "));
        let ship = world.controlled_ship(empty).and_then(|h| world.ship(h)).expect("ship");
        assert_eq!(ship.loadout, Loadout::default());
    }

    #[test]
    fn test_first_tick_sends_initial_updates() {
        let mut world = world();
        let a = world.connect("Alpha", None);
        world.connect("Bravo", None);

        let report = world.tick(33);
        assert_eq!(report.packets.len(), 2);
        assert_eq!(report.ghost_updates(), 4);
        assert!(world.connection(a).is_some_and(|c| c.scope_len() == 2));

        // Controlled ships only resend their position
        let later = world.tick(33);
        assert_eq!(later.ghost_updates(), 4);
        assert!(later.bytes_sent() < report.bytes_sent());
    }

    #[test]
    fn test_moves_are_applied_and_acknowledged() {
        let mut world = world();
        let id = world.connect("Alpha", None);
        world.tick(33);

        for seq in 0..3 {
            send(&world, id, seq, 1.0);
        }
        let report = world.tick(33);
        assert_eq!(report.moves_applied, 3);
        assert_eq!(world.connection(id).and_then(|c| c.last_move_seq), Some(2));
        assert_eq!(world.last_heard_ms(id), Some(66));

        let ship = world.controlled_ship(id).and_then(|h| world.ship(h)).expect("ship");
        assert!(ship.actual_pos().x > 0.0);
        // Moving cancels the spawn shield
        assert!(!ship.spawn_shield.is_running());
    }

    #[test]
    fn test_moves_from_strangers_are_ignored() {
        let mut world = world();
        world.connect("Alpha", None);
        send(&world, Uuid::new_v4(), 0, 1.0);
        assert_eq!(world.tick(33).moves_applied, 0);
    }

    #[test]
    fn test_client_follows_server() {
        let mut world = world();
        let id = world.connect("Alpha", None);
        world.connect("Bravo", None);
        let mut client = ClientReplica::new(id, ZoneMap::default(), Arc::new(RecordingEffects::new()));

        let mut now = 0;
        for _ in 0..10 {
            let message = client.make_move(MoveRecord::new(1.0, 0.0, 0.0, 33), now);
            world.submit_move(message).expect("queue");
            let report = world.tick(33);
            now = report.now_ms;
            for (conn, packet) in &report.packets {
                if *conn == id {
                    client.handle_packet(&packet.bytes, now).expect("packet");
                }
            }
        }

        assert_eq!(client.ghost_count(), 2);
        assert_eq!(client.pending_moves(), 0);
        let server_ship = world.controlled_ship(id).and_then(|h| world.ship(h)).expect("ship");
        let replica = client.controlled_ship().expect("replica");
        assert!(replica.actual_pos().approx_eq(server_ship.actual_pos(), 1e-3));
    }

    #[test]
    fn test_kill_then_remove_then_respawn() {
        let mut world = world();
        let id = world.connect("Alpha", None);
        let watcher = world.connect("Bravo", None);
        world.tick(33);

        let first = world.controlled_ship(id).expect("ship");
        if let Some(ship) = world.ships.get_mut(first) {
            ship.spawn_shield.clear();
        }
        assert!(world.apply_damage(first, &asteroid_hit(2.0)));
        let report = world.tick(33);
        assert_eq!(report.kills, 1);
        assert!(world.ship(first).is_some_and(|s| s.exploded));

        let mut respawned = false;
        for _ in 0..(KILL_DELETE_DELAY / 33 + 2) {
            let report = world.tick(33);
            if report.respawned > 0 {
                respawned = true;
                assert_eq!(report.removed, 1);
                break;
            }
        }
        assert!(respawned);
        assert!(world.ship(first).is_none());

        let second = world.controlled_ship(id).expect("respawned ship");
        assert_ne!(first, second);
        assert!(world.connection(watcher).is_some_and(|c| c.in_scope(second) && !c.in_scope(first)));
        assert!(world.ship(second).is_some_and(|s| s.spawn_shield.is_running()));
    }

    #[test]
    fn test_disconnect_removes_ship_from_scopes() {
        let mut world = world();
        let a = world.connect("Alpha", None);
        let b = world.connect("Bravo", None);
        world.tick(33);
        let ship_a = world.controlled_ship(a).expect("ship");

        assert!(world.disconnect(a));
        assert!(!world.disconnect(a));
        let report = world.tick(33);
        assert!(world.ship(ship_a).is_none());
        assert!(world.connection(b).is_some_and(|c| !c.in_scope(ship_a)));
        let removals: usize = report.packets.iter().map(|(_, p)| p.removals).sum();
        assert_eq!(removals, 1);
    }

    #[test]
    fn test_scope_radius() {
        let mut world = world();
        let id = world.connect("Alpha", None);
        let far = world.spawn_robot("Far", 1, Vec2::new(SCOPE_RADIUS * 2.0, 0.0));
        let near = world.spawn_robot("Near", 1, Vec2::new(100.0, 0.0));
        world.tick(33);

        let conn = world.connection(id).expect("connection");
        assert!(conn.in_scope(near));
        assert!(!conn.in_scope(far));

        world.teleport(far, Vec2::new(50.0, 50.0));
        world.tick(33);
        assert!(world.connection(id).is_some_and(|c| c.in_scope(far)));
    }

    #[test]
    fn test_mounts_and_release_on_death() {
        let mut world = world();
        let id = world.connect("Alpha", None);
        let ship = world.controlled_ship(id).expect("ship");
        let flag = world.spawn_item(Item::new(ItemKind::Flag, Vec2::ZERO));
        let resource = world.spawn_item(Item::new(ItemKind::Resource, Vec2::ZERO));

        assert!(world.mount_item(ship, flag));
        assert!(!world.mount_item(ship, flag));
        // Default loadout has no engineer
        assert!(!world.mount_item(ship, resource));

        world.teleport(ship, Vec2::new(300.0, 0.0));
        if let Some(s) = world.ships.get_mut(ship) {
            s.spawn_shield.clear();
        }
        world.apply_damage(ship, &asteroid_hit(1.0));
        world.tick(33);

        let dropped = world.items().get(flag).expect("flag");
        assert_eq!(dropped.mount, None);
        assert_eq!(dropped.pos, Vec2::new(300.0, 0.0));
    }

    #[test]
    fn test_removed_item_is_pruned_from_mounts() {
        let mut world = world();
        let id = world.connect("Alpha", None);
        let ship = world.controlled_ship(id).expect("ship");
        let flag = world.spawn_item(Item::new(ItemKind::Flag, Vec2::ZERO));
        assert!(world.mount_item(ship, flag));
        assert!(world.ship(ship).is_some_and(|s| s.is_item_mounted(world.items())));

        assert!(world.remove_item(flag).is_some());
        assert!(world.ship(ship).is_some_and(|s| !s.is_item_mounted(world.items())));
        world.tick(33);
        assert!(world.ship(ship).is_some_and(|s| s.mounted_items(world.items()).count() == 0));
    }

    #[test]
    fn test_equipped_armor_mitigates_before_first_move() {
        let mut world = world();
        let id = world.connect("Alpha", Some("Armor,Shield,Phaser,Bouncer,Triple"));
        let ship = world.controlled_ship(id).expect("ship");
        if let Some(s) = world.ships.get_mut(ship) {
            s.spawn_shield.clear();
        }
        world.tick(33);

        assert!(world.ship(ship).is_some_and(|s| !s.is_module_active(ShipModule::Armor)));
        assert!(world.apply_damage(ship, &asteroid_hit(0.4)));
        let health = world.ship(ship).map(|s| s.health).unwrap_or_default();
        assert!((health - 0.8).abs() < 1e-6);
    }

    #[test]
    fn test_robot_spawn_shield_expires() {
        let mut world = world();
        let robot = world.spawn_robot("Bot", 1, Vec2::ZERO);
        world.tick(33);
        assert!(!world.apply_damage(robot, &asteroid_hit(0.3)));

        for _ in 0..(SPAWN_SHIELD_TIME / 33 + 2) {
            world.tick(33);
        }
        assert!(world.ship(robot).is_some_and(|s| !s.spawn_shield.is_running()));
        assert!(world.apply_damage(robot, &asteroid_hit(0.3)));
        let health = world.ship(robot).map(|s| s.health).unwrap_or_default();
        assert!((health - 0.7).abs() < 1e-6);
    }

    #[test]
    fn test_topped_up_target_leaves_repair_list() {
        let mut world = world().with_team_count(1);
        let first = world.connect("MedicA", Some("Repair,Shield,Phaser,Bouncer,Triple"));
        let second = world.connect("MedicB", Some("Repair,Shield,Phaser,Bouncer,Triple"));
        let patient = world.connect("Patient", None);
        let second_ship = world.controlled_ship(second).expect("medic b");
        let patient_ship = world.controlled_ship(patient).expect("patient");
        world.teleport(second_ship, Vec2::new(20.0, 0.0));
        world.teleport(patient_ship, Vec2::new(10.0, 0.0));
        world.tick(33);
        if let Some(s) = world.ships.get_mut(patient_ship) {
            s.health = 0.99;
        }

        for (seq, medic) in [first, second].into_iter().enumerate() {
            let mut mv = MoveRecord::new(0.0, 0.0, 0.0, 100);
            mv.module[0] = true;
            world
                .submit_move(MoveMessage { connection: medic, seq: seq as u32, mv })
                .expect("queue");
        }
        world.tick(33);

        assert_eq!(world.ship(patient_ship).map(|s| s.health), Some(1.0));
        let medic_b = world.ship(second_ship).expect("medic b");
        assert!(!medic_b.repair_targets.contains(&patient_ship));
        assert!(!medic_b.is_module_active(ShipModule::Repair));
    }

    #[test]
    fn test_request_loadout() {
        let mut world = world();
        let id = world.connect("Alpha", None);
        assert!(world.request_loadout(id, "Bogus", false).is_err());

        world
            .request_loadout(id, "Repair,Cloak,Phaser,Spybug,Mine", true)
            .expect("loadout");
        let ship = world.controlled_ship(id).and_then(|h| world.ship(h)).expect("ship");
        assert!(ship.has_module(ShipModule::Repair));
    }

    #[test]
    fn test_repair_heals_teammate() {
        let mut world = world().with_team_count(1);
        let medic = world.connect("Medic", Some("Repair,Shield,Phaser,Bouncer,Triple"));
        let patient = world.connect("Patient", None);
        let medic_ship = world.controlled_ship(medic).expect("medic");
        let patient_ship = world.controlled_ship(patient).expect("patient");
        world.teleport(patient_ship, Vec2::new(50.0, 0.0));
        if let Some(s) = world.ships.get_mut(patient_ship) {
            s.spawn_shield.clear();
        }
        world.apply_damage(patient_ship, &asteroid_hit(0.5));
        world.tick(33);

        let mut mv = MoveRecord::new(0.0, 0.0, 0.0, 100);
        mv.module[0] = true;
        world
            .submit_move(MoveMessage { connection: medic, seq: 0, mv })
            .expect("queue");
        world.tick(33);

        let health = world.ship(patient_ship).map(|s| s.health).unwrap_or_default();
        assert!(health > 0.5);
        assert!(world.ship(medic_ship).is_some_and(|s| s.repair_targets.contains(&patient_ship)));
    }
}
