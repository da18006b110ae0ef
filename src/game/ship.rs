//! The replicated ship entity
//!
//! A ship owns its motion snapshots, energy and health, loadout, timers and
//! a list of mounted item handles. Every remote-visible mutation goes through
//! [`Ship::set_mask_bits`] so the next flush carries it to each connection.

use serde::Serialize;
use smallvec::SmallVec;
use uuid::Uuid;

use crate::game::constants::{energy, prediction, ship as ship_consts, timing};
use crate::game::effects::{Effects, SoundEffect};
use crate::game::handle::{Handle, Registry};
use crate::game::items::{Item, ItemHandle, ItemKind};
use crate::game::loadout::Loadout;
use crate::game::modules::{ShipModule, WeaponType, SHIP_WEAPON_COUNT};
use crate::game::motion::{calc_thrust_components, MotionStateSet, StateSlot};
use crate::game::moves::MoveRecord;
use crate::game::rules::GameRules;
use crate::game::spatial::{ShipSnapshot, WorldQuery};
use crate::game::systems::{energy as energy_system, physics, repair, weapons};
use crate::net::mask::ChangeMask;
use crate::util::timer::Timer;
use crate::util::vec2::Vec2;

pub type ShipHandle = Handle<Ship>;

/// Which side is running the tick and why
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum IdlePath {
    /// Server, once per tick for every ship
    ServerMainLoop,
    /// Server, once per move received from the controlling client
    ServerControlFromClient,
    /// Client, its own ship, once per local tick
    ClientControlMain,
    /// Client, its own ship, re-running unacknowledged moves
    ClientControlReplay,
    /// Client, someone else's ship
    ClientMainRemote,
}

impl IdlePath {
    /// Paths that feed the control state and must agree bit for bit
    #[inline]
    pub fn quantizes(self) -> bool {
        matches!(
            self,
            IdlePath::ServerControlFromClient
                | IdlePath::ClientControlMain
                | IdlePath::ClientControlReplay
        )
    }

    /// Paths that run weapons and energy
    #[inline]
    pub fn is_controlling(self) -> bool {
        self.quantizes()
    }

    #[inline]
    pub fn is_server(self) -> bool {
        matches!(self, IdlePath::ServerMainLoop | IdlePath::ServerControlFromClient)
    }

    #[inline]
    pub fn is_client_main(self) -> bool {
        matches!(self, IdlePath::ClientControlMain | IdlePath::ClientMainRemote)
    }
}

/// Everything a tick may consult outside the ship itself
pub struct TickContext<'a> {
    pub now_ms: u64,
    pub world: &'a dyn WorldQuery,
    pub rules: &'a dyn GameRules,
    pub effects: &'a dyn Effects,
    /// The controlling connection has gone quiet
    pub lost_contact: bool,
}

/// A shot leaving the ship; projectiles themselves live elsewhere
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct ShotFired {
    pub weapon: WeaponType,
    pub pos: Vec2,
    pub vel: Vec2,
    pub dir: Vec2,
}

/// Side results of one idle call for the owner to act on
#[derive(Debug, Default)]
pub struct IdleOutcome {
    /// Healing owed to every entry of [`Ship::repair_targets`]
    pub repair: Option<f32>,
    pub shots: SmallVec<[ShotFired; 2]>,
    /// Nothing moved because the controller lost contact
    pub frozen: bool,
}

/// Where a ship is in its life
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum LifeState {
    Alive,
    Exploding,
    Removed,
}

/// Per-ship play statistics
#[derive(Debug, Clone, Default, Serialize)]
pub struct ShipStats {
    pub shots: [u32; WeaponType::COUNT],
    pub hits_taken: [u32; WeaponType::COUNT],
    pub module_use_ms: [u64; ShipModule::COUNT],
    pub play_time_ms: u64,
    pub asteroid_crashes: u32,
    pub loadout_changes: u32,
}

impl ShipStats {
    #[inline]
    pub fn count_shot(&mut self, weapon: WeaponType) {
        self.shots[weapon.index()] += 1;
    }

    #[inline]
    pub fn count_hit_by(&mut self, weapon: WeaponType) {
        self.hits_taken[weapon.index()] += 1;
    }

    #[inline]
    pub fn add_module_used(&mut self, module: ShipModule, ms: u32) {
        self.module_use_ms[module.index()] += ms as u64;
    }

    pub fn total_shots(&self) -> u32 {
        self.shots.iter().sum()
    }
}

#[derive(Debug, Clone)]
pub struct Ship {
    /// Registry handle, set once the ship is inserted
    pub handle: Option<ShipHandle>,
    /// Player that owns this ship, if any
    pub owner: Option<Uuid>,
    /// Decoded replica rather than the authoritative copy
    pub is_ghost: bool,
    pub is_robot: bool,
    /// A connection drives this ship with its own moves
    pub controlled: bool,

    pub name: String,
    pub authenticated: bool,
    pub team: i32,
    pub spawn_point: Vec2,

    pub motion: MotionStateSet,
    /// Accumulated push from area damage, applied at the next idle
    pub impulse: Vec2,
    pub current_move: MoveRecord,
    pub last_move: MoveRecord,

    pub health: f32,
    pub energy: i32,
    pub cooldown: bool,
    pub module_active: [bool; ShipModule::COUNT],
    pub loadout: Loadout,
    pub active_weapon: usize,
    /// Milliseconds until the next shot; negative while catching up
    pub fire_timer: i32,

    pub spawn_shield: Timer,
    pub weapon_fire_decloak: Timer,
    pub cloak_timer: Timer,
    pub sensor_zoom_timer: Timer,
    pub warp_in_timer: Timer,
    pub sensor_start_ms: u64,
    pub respawn_ms: u64,

    pub exploded: bool,
    /// Owner is tabbed out or in a menu
    pub busy: bool,
    pub collision_enabled: bool,
    delete_timer: Option<Timer>,

    mounted: SmallVec<[ItemHandle; 4]>,
    pending_dismounts: SmallVec<[ItemHandle; 4]>,
    pub repair_targets: SmallVec<[ShipHandle; 4]>,

    dirty: ChangeMask,
    pub stats: ShipStats,
}

impl Ship {
    pub fn new(name: impl Into<String>, team: i32, pos: Vec2) -> Self {
        let mut ship = Self {
            handle: None,
            owner: None,
            is_ghost: false,
            is_robot: false,
            controlled: false,
            name: name.into(),
            authenticated: false,
            team,
            spawn_point: pos,
            motion: MotionStateSet::new(pos),
            impulse: Vec2::ZERO,
            current_move: MoveRecord::default(),
            last_move: MoveRecord::default(),
            health: 1.0,
            energy: 0,
            cooldown: false,
            module_active: [false; ShipModule::COUNT],
            loadout: Loadout::default(),
            active_weapon: 0,
            fire_timer: 0,
            spawn_shield: Timer::default(),
            weapon_fire_decloak: Timer::default(),
            cloak_timer: Timer::default(),
            sensor_zoom_timer: Timer::default(),
            warp_in_timer: Timer::default(),
            sensor_start_ms: 0,
            respawn_ms: 0,
            exploded: false,
            busy: false,
            collision_enabled: true,
            delete_timer: None,
            mounted: SmallVec::new(),
            pending_dismounts: SmallVec::new(),
            repair_targets: SmallVec::new(),
            dirty: ChangeMask::NONE,
            stats: ShipStats::default(),
        };
        ship.initialize(pos, 0);
        ship
    }

    /// Empty replica waiting for its first update
    pub fn ghost() -> Self {
        let mut ship = Self::new(String::new(), ship_consts::NEUTRAL_TEAM, Vec2::ZERO);
        ship.is_ghost = true;
        ship.spawn_shield.clear();
        ship.dirty = ChangeMask::NONE;
        ship
    }

    /// Reset to a fresh spawn at `pos`
    pub fn initialize(&mut self, pos: Vec2, now_ms: u64) {
        self.respawn_ms = now_ms;
        self.spawn_point = pos;
        self.motion = MotionStateSet::new(pos);
        self.impulse = Vec2::ZERO;
        self.health = 1.0;
        self.exploded = false;
        self.collision_enabled = true;
        self.delete_timer = None;
        self.energy = (energy::MAX as f32 * energy::SPAWN_FRACTION) as i32;
        self.module_active = [false; ShipModule::COUNT];
        self.active_weapon = 0;
        self.fire_timer = 0;
        self.cooldown = false;
        self.spawn_shield.reset(timing::SPAWN_SHIELD_TIME);
        self.set_mask_bits(ChangeMask::RESPAWN | ChangeMask::SPAWN_SHIELD | ChangeMask::HEALTH);
    }

    // ========================================================================
    // Accessors
    // ========================================================================

    #[inline]
    pub fn actual_pos(&self) -> Vec2 {
        self.motion.actual().pos
    }

    #[inline]
    pub fn actual_vel(&self) -> Vec2 {
        self.motion.actual().vel
    }

    #[inline]
    pub fn render_pos(&self) -> Vec2 {
        self.motion.render().pos
    }

    #[inline]
    pub fn energy_fraction(&self) -> f32 {
        self.energy as f32 / energy::MAX as f32
    }

    #[inline]
    pub fn is_module_active(&self, module: ShipModule) -> bool {
        self.module_active[module.index()]
    }

    #[inline]
    pub fn has_module(&self, module: ShipModule) -> bool {
        self.loadout.has_module(module)
    }

    #[inline]
    pub fn selected_weapon(&self) -> WeaponType {
        self.loadout.weapons[self.active_weapon % SHIP_WEAPON_COUNT]
    }

    /// Exploded or already at zero health
    #[inline]
    pub fn is_destroyed(&self) -> bool {
        self.exploded || self.health <= 0.0
    }

    pub fn life_state(&self) -> LifeState {
        match (&self.delete_timer, self.exploded) {
            (Some(timer), _) if !timer.is_running() => LifeState::Removed,
            (_, true) => LifeState::Exploding,
            _ => LifeState::Alive,
        }
    }

    /// Unit vector along the facing angle
    #[inline]
    pub fn aim_vector(&self) -> Vec2 {
        self.motion.actual().facing()
    }

    /// Snapshot for the per-tick spatial grid
    pub fn snapshot(&self) -> Option<ShipSnapshot> {
        Some(ShipSnapshot {
            ship: self.handle?,
            pos: self.render_pos(),
            health: self.health,
            team: self.team,
            destroyed: self.is_destroyed(),
        })
    }

    // ========================================================================
    // Change tracking
    // ========================================================================

    #[inline]
    pub fn set_mask_bits(&mut self, bits: ChangeMask) {
        self.dirty |= bits;
    }

    #[inline]
    pub fn dirty(&self) -> ChangeMask {
        self.dirty
    }

    /// Hand the accumulated bits to the fan-out and start over
    #[inline]
    pub fn take_dirty(&mut self) -> ChangeMask {
        self.dirty.take()
    }

    // ========================================================================
    // Mutators
    // ========================================================================

    pub fn set_current_move(&mut self, mv: MoveRecord) {
        self.current_move = mv;
    }

    /// Place the ship; `warp` marks the jump as a teleport for observers
    pub fn set_actual_pos(&mut self, pos: Vec2, warp: bool) {
        self.motion.actual_mut().pos = pos;
        self.motion.render_mut().pos = pos;
        if warp {
            self.warp_in_timer.reset(timing::WARP_FADE_IN_TIME);
            self.set_mask_bits(ChangeMask::POSITION | ChangeMask::WARP_POSITION | ChangeMask::TELEPORT);
        } else {
            self.set_mask_bits(ChangeMask::POSITION);
        }
    }

    pub fn set_team(&mut self, team: i32) {
        if self.team != team {
            self.team = team;
            self.set_mask_bits(ChangeMask::CHANGE_TEAM);
        }
    }

    pub fn set_identity(&mut self, name: impl Into<String>, authenticated: bool) {
        self.name = name.into();
        self.authenticated = authenticated;
        self.set_mask_bits(ChangeMask::AUTHENTICATION);
    }

    /// Busy rides along with every update; the team bit makes sure one goes out
    pub fn set_busy(&mut self, busy: bool) {
        if self.busy != busy {
            self.busy = busy;
            self.set_mask_bits(ChangeMask::CHANGE_TEAM);
        }
    }

    /// Select a weapon slot; indices wrap around the slot count
    pub fn select_weapon(&mut self, index: usize) {
        self.active_weapon = index % SHIP_WEAPON_COUNT;
    }

    pub fn cycle_weapon(&mut self) {
        self.select_weapon(self.active_weapon + 1);
    }

    /// Equip a new loadout. Returns false when nothing changed.
    ///
    /// Unless `silent`, the ship keeps its current weapon if the new loadout
    /// still has it (else slot 0) and drops carried resources when it loses
    /// the engineer module.
    pub fn set_loadout(&mut self, loadout: Loadout, silent: bool, items: &Registry<Item>) -> bool {
        if self.loadout == loadout {
            return false;
        }

        self.stats.loadout_changes += 1;
        let current_weapon = self.selected_weapon();
        self.loadout = loadout;
        self.set_mask_bits(ChangeMask::LOADOUT);

        if silent {
            return true;
        }

        match self.loadout.weapons.iter().position(|&w| w == current_weapon) {
            Some(slot) => self.active_weapon = slot,
            None => self.select_weapon(0),
        }

        if !self.has_module(ShipModule::Engineer) {
            while self.unmount_item(ItemKind::Resource, items).is_some() {}
        }
        true
    }

    /// Spend energy on an engineered object; false when unable
    pub fn engineer_build_object(&mut self) -> bool {
        let cost = ShipModule::Engineer.info().per_use_cost;
        if !self.has_module(ShipModule::Engineer) || self.energy < cost {
            return false;
        }
        self.energy -= cost;
        true
    }

    // ========================================================================
    // Mounted items
    // ========================================================================

    fn mount_valid(&self, item: &Item) -> bool {
        self.handle.map_or(true, |me| item.is_mounted_on(me))
    }

    /// Record a mount; the item side is set by the caller
    pub fn mount_item(&mut self, item: ItemHandle) {
        if !self.mounted.contains(&item) {
            self.mounted.push(item);
        }
    }

    /// Drop handles whose item is gone or no longer points at us
    pub fn prune_mounts(&mut self, items: &Registry<Item>) {
        let mut mounted = std::mem::take(&mut self.mounted);
        mounted.retain(|h| items.get(*h).is_some_and(|item| self.mount_valid(item)));
        self.mounted = mounted;
    }

    /// Valid mounts in mount order
    pub fn mounted_items<'a>(
        &'a self,
        items: &'a Registry<Item>,
    ) -> impl Iterator<Item = (ItemHandle, &'a Item)> + 'a {
        self.mounted.iter().filter_map(move |&h| {
            items
                .get(h)
                .filter(|item| self.mount_valid(item))
                .map(|item| (h, item))
        })
    }

    pub fn is_item_mounted(&self, items: &Registry<Item>) -> bool {
        self.mounted_items(items).next().is_some()
    }

    pub fn is_carrying_item(&self, kind: ItemKind, items: &Registry<Item>) -> bool {
        self.mounted_items(items).any(|(_, item)| item.kind == kind)
    }

    /// Mount-list position of the first flag carried
    pub fn carrying_flag(&self, items: &Registry<Item>) -> Option<usize> {
        self.mounted.iter().position(|&h| {
            items
                .get(h)
                .is_some_and(|item| self.mount_valid(item) && item.kind.is_flag())
        })
    }

    pub fn flag_count(&self, items: &Registry<Item>) -> u32 {
        self.mounted_items(items)
            .filter(|(_, item)| item.kind.is_flag())
            .map(|(_, item)| match item.kind {
                ItemKind::FlagBundle => item.flag_count,
                _ => 1,
            })
            .sum()
    }

    /// Release the most recently mounted item of `kind`
    pub fn unmount_item(&mut self, kind: ItemKind, items: &Registry<Item>) -> Option<ItemHandle> {
        let slot = self.mounted.iter().rposition(|&h| {
            items
                .get(h)
                .is_some_and(|item| self.mount_valid(item) && item.kind == kind)
        })?;
        let handle = self.mounted.remove(slot);
        self.pending_dismounts.push(handle);
        Some(handle)
    }

    /// Release everything, as when the ship dies
    pub fn release_all_mounts(&mut self) {
        let mounted = std::mem::take(&mut self.mounted);
        self.pending_dismounts.extend(mounted.into_iter().rev());
    }

    /// Items the owner must detach from this ship
    pub fn take_pending_dismounts(&mut self) -> SmallVec<[ItemHandle; 4]> {
        std::mem::take(&mut self.pending_dismounts)
    }

    /// Cloaked ships are hidden unless they carry a revealing item
    pub fn is_visible(&self, items: &Registry<Item>) -> bool {
        !self.is_module_active(ShipModule::Cloak)
            || self
                .mounted_items(items)
                .any(|(_, item)| item.kind.reveals_carrier())
    }

    // ========================================================================
    // Lifecycle
    // ========================================================================

    /// Start the removal countdown after an explosion
    pub fn schedule_delete(&mut self, delay_ms: u32) {
        self.delete_timer = Some(Timer::new(delay_ms));
    }

    /// Count down the removal delay; true once the ship should be removed
    pub fn update_deletion(&mut self, elapsed_ms: u32) -> bool {
        match &mut self.delete_timer {
            Some(timer) => {
                timer.update(elapsed_ms);
                !timer.is_running()
            }
            None => false,
        }
    }

    // ========================================================================
    // Tick
    // ========================================================================

    /// Advance the ship by its current move along `path`
    pub fn idle(&mut self, path: IdlePath, ctx: &TickContext<'_>) -> IdleOutcome {
        let mut outcome = IdleOutcome::default();
        if self.exploded {
            return outcome;
        }

        let time = self.current_move.time;
        if path == IdlePath::ServerControlFromClient {
            self.stats.play_time_ms += time as u64;
        }

        if path == IdlePath::ServerMainLoop && self.controlled {
            // Project the render state ahead so others can lead this ship
            // between the controller's packets
            physics::process_move(self, StateSlot::Render, ctx.world);
            self.set_mask_bits(ChangeMask::POSITION);
        } else {
            if path.is_client_main() && ctx.lost_contact && self.actual_vel().length_sq() != 0.0 {
                outcome.frozen = true;
                return outcome;
            }

            let impulse = std::mem::take(&mut self.impulse);
            self.motion.actual_mut().vel += impulse;

            physics::process_move(self, StateSlot::Actual, ctx.world);
            physics::apply_speed_zone(self, ctx);

            if path.quantizes() {
                let actual = self.motion.actual_mut();
                actual.pos.scale_floor_div(ship_consts::NORMALIZE_MULTIPLIER, ship_consts::NORMALIZE_FRACTION);
                actual.vel.scale_floor_div(ship_consts::NORMALIZE_MULTIPLIER, ship_consts::NORMALIZE_FRACTION);
            }

            if path.is_server() {
                if self.motion.render() != self.motion.actual() {
                    self.set_mask_bits(ChangeMask::POSITION);
                }
                *self.motion.render_mut() = *self.motion.actual();
            } else if path.is_client_main() {
                let max = prediction::INTERP_MAX_VELOCITY;
                self.motion
                    .set_interpolating(self.actual_vel().length_sq() < max * max);
                self.motion.update_interpolation(time);
            }

            if path != IdlePath::ClientControlReplay {
                self.sensor_zoom_timer.update(time);
                self.cloak_timer.update(time);

                if path == IdlePath::ServerControlFromClient && self.spawn_shield.is_running() {
                    if self.current_move.has_intent() {
                        self.spawn_shield.clear();
                    } else {
                        self.spawn_shield.update(time);
                    }
                    if !self.spawn_shield.is_running() {
                        self.set_mask_bits(ChangeMask::SPAWN_SHIELD);
                    }
                }
            }
        }

        if path == IdlePath::ServerControlFromClient && !self.current_move.is_equal_move(&self.last_move) {
            self.set_mask_bits(ChangeMask::MOVE);
        }
        self.last_move = self.current_move;

        if path.is_controlling() {
            let modules_before = self.module_active;
            outcome.shots =
                weapons::process_weapon_fire(self, ctx, path == IdlePath::ClientControlMain);
            energy_system::process_energy(self, ctx);
            if path == IdlePath::ClientControlMain {
                self.play_module_edges(&modules_before, ctx.effects);
            }
        }

        if path == IdlePath::ClientMainRemote && self.is_module_active(ShipModule::Repair) {
            repair::find_repair_targets(self, ctx.world);
        }
        if path == IdlePath::ServerControlFromClient && self.is_module_active(ShipModule::Repair) {
            outcome.repair = Some(repair::repair_amount(time));
        }

        if path.is_client_main() {
            self.warp_in_timer.update(time);
            self.emit_movement_sparks(ctx.effects);
        }

        outcome
    }

    /// Sounds for modules that switched on or off since `before`
    pub fn play_module_edges(&self, before: &[bool; ShipModule::COUNT], effects: &dyn Effects) {
        for module in ShipModule::ALL {
            let now = self.is_module_active(module);
            if now != before[module.index()] {
                let sound = if now {
                    SoundEffect::ModuleOn(module)
                } else {
                    SoundEffect::ModuleOff(module)
                };
                effects.play_sound(sound, self.render_pos(), self.motion.render().vel);
            }
        }
    }

    fn emit_movement_sparks(&self, effects: &dyn Effects) {
        let thrusts = calc_thrust_components(
            &self.current_move,
            &self.motion,
            self.is_module_active(ShipModule::Boost),
        );
        let intensity: f32 = thrusts.iter().map(|t| t.max(0.0)).sum();
        if intensity > 0.1 {
            effects.emit_sparks(self.render_pos(), self.motion.render().vel, intensity);
        }
    }
}
