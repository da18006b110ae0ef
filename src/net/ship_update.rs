//! Ship replication wire format
//!
//! The stream is positional: [`write_ship_update`] and [`read_ship_update`]
//! are the only two places that know the field order and they must change
//! together. Field groups, in order:
//!
//! 1. initial only: mounted items as `flag, index` pairs ended by a false flag
//! 2. team/auth: team, then name and auth flag when auth changed
//! 3. loadout: module and weapon enums
//! 4. exploded flag; when alive the respawn/spawn-shield pair and health
//! 5. busy
//! 6. warp and teleport, never set on an initial update
//! 7. position, move and module flags; only ever set for observers
//!
//! The controlling connection gets its own ship's physics through the
//! separate control state instead.

use std::f32::consts::TAU;

use crate::game::constants::energy::MAX as ENERGY_MAX;
use crate::game::constants::net::{
    COMPRESSED_VELOCITY_MAX, GHOST_ID_BIT_SIZE, HEALTH_BITS, NEGATIVE_FIRE_DELAY, POINT_SCALE,
    VELOCITY_ANGLE_BITS,
};
use crate::game::constants::ship::{HOSTILE_TEAM, MAX_NAME_LEN, MAX_TEAMS};
use crate::game::constants::timing::RESPAWN_EFFECT_WINDOW;
use crate::game::loadout::Loadout;
use crate::game::modules::{max_fire_delay, ShipModule, WeaponType, SHIP_MODULE_COUNT, SHIP_WEAPON_COUNT};
use crate::game::moves::MoveRecord;
use crate::game::ship::Ship;
use crate::net::bitstream::{BitReader, BitStreamError, BitWriter};
use crate::net::mask::ChangeMask;
use crate::util::vec2::Vec2;

/// Who an update is for
#[derive(Debug, Clone, Copy)]
pub struct UpdateTarget<'a> {
    /// First update since the ship entered this connection's scope
    pub is_initial: bool,
    /// The connection controls this ship
    pub to_controller: bool,
    pub now_ms: u64,
    /// Connection-local indices of the ship's mounted items
    pub mount_indices: &'a [u32],
}

/// Respawn/spawn-shield pair
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct RespawnInfo {
    /// Respawned moments ago; play the arrival effect
    pub play_effect: bool,
    pub spawn_shield: bool,
}

/// Everything one update carried; `None` means the group was not sent
#[derive(Debug, Clone, Default, PartialEq)]
pub struct ShipUpdate {
    pub mounts: Option<Vec<u32>>,
    pub team: Option<i32>,
    pub identity: Option<(String, bool)>,
    pub loadout: Option<Loadout>,
    pub exploded: bool,
    pub respawn: Option<RespawnInfo>,
    pub health: Option<f32>,
    pub busy: bool,
    pub warped: bool,
    pub teleported: bool,
    /// Render position and velocity
    pub position: Option<(Vec2, Vec2)>,
    pub mv: Option<MoveRecord>,
    pub modules: Option<[bool; ShipModule::COUNT]>,
}

/// Controlling connection's view of its own ship
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct ControlState {
    pub pos: Vec2,
    pub vel: Vec2,
    pub energy: i32,
    pub cooldown: bool,
    pub fire_timer: i32,
    pub active_weapon: usize,
}

impl ControlState {
    pub fn capture(ship: &Ship) -> Self {
        Self {
            pos: ship.actual_pos(),
            vel: ship.actual_vel(),
            energy: ship.energy,
            cooldown: ship.cooldown,
            fire_timer: ship.fire_timer,
            active_weapon: ship.active_weapon,
        }
    }
}

// ============================================================================
// Ship update
// ============================================================================

pub fn write_ship_update(ship: &Ship, stream: &mut BitWriter, mask: ChangeMask, target: &UpdateTarget<'_>) {
    if target.is_initial {
        for &index in target.mount_indices {
            stream.write_flag(true);
            stream.write_int(index, GHOST_ID_BIT_SIZE);
        }
        stream.write_flag(false);
    }

    if stream.write_flag(mask.intersects(ChangeMask::CHANGE_TEAM | ChangeMask::AUTHENTICATION)) {
        write_team(stream, ship.team);
        if stream.write_flag(mask.contains(ChangeMask::AUTHENTICATION)) {
            let name: String = ship.name.chars().take(MAX_NAME_LEN).collect();
            stream.write_string(&name);
            stream.write_flag(ship.authenticated);
        }
    }

    if stream.write_flag(mask.contains(ChangeMask::LOADOUT)) {
        for module in ship.loadout.modules {
            stream.write_enum(module as u32, ShipModule::COUNT as u32);
        }
        for weapon in ship.loadout.weapons {
            stream.write_enum(weapon as u32, WeaponType::COUNT as u32);
        }
    }

    if !stream.write_flag(ship.exploded) {
        if stream.write_flag(mask.intersects(ChangeMask::RESPAWN | ChangeMask::SPAWN_SHIELD)) {
            let fresh = target.now_ms.saturating_sub(ship.respawn_ms) < RESPAWN_EFFECT_WINDOW;
            stream.write_flag(mask.contains(ChangeMask::RESPAWN) && fresh);
            stream.write_flag(ship.spawn_shield.is_running());
        }
        if stream.write_flag(mask.contains(ChangeMask::HEALTH)) {
            stream.write_float(ship.health, HEALTH_BITS);
        }
    }

    stream.write_flag(ship.busy);
    stream.write_flag(mask.contains(ChangeMask::WARP_POSITION) && !target.is_initial);
    stream.write_flag(mask.contains(ChangeMask::TELEPORT) && !target.is_initial);

    if target.is_initial || !target.to_controller {
        if stream.write_flag(mask.contains(ChangeMask::POSITION)) {
            let render = ship.motion.render();
            write_compressed_point(stream, render.pos);
            write_compressed_velocity(stream, render.vel, COMPRESSED_VELOCITY_MAX);
        }
        if stream.write_flag(mask.contains(ChangeMask::MOVE)) {
            ship.current_move.pack(stream);
        }
        if stream.write_flag(mask.contains(ChangeMask::MODULES)) {
            for active in ship.module_active {
                stream.write_flag(active);
            }
        }
    } else {
        stream.write_flag(false);
        stream.write_flag(false);
        stream.write_flag(false);
    }
}

pub fn read_ship_update(stream: &mut BitReader<'_>, is_initial: bool) -> Result<ShipUpdate, BitStreamError> {
    let mut update = ShipUpdate::default();

    if is_initial {
        let mut mounts = Vec::new();
        while stream.read_flag()? {
            mounts.push(stream.read_int(GHOST_ID_BIT_SIZE)?);
        }
        update.mounts = Some(mounts);
    }

    if stream.read_flag()? {
        update.team = Some(read_team(stream)?);
        if stream.read_flag()? {
            let name = stream.read_string()?;
            let authenticated = stream.read_flag()?;
            update.identity = Some((name, authenticated));
        }
    }

    if stream.read_flag()? {
        let mut loadout = Loadout::default();
        for slot in 0..SHIP_MODULE_COUNT {
            let value = stream.read_enum(ShipModule::COUNT as u32)?;
            loadout.modules[slot] = ShipModule::from_index(value).ok_or(BitStreamError::OutOfRange {
                value,
                max: ShipModule::COUNT as u32 - 1,
            })?;
        }
        for slot in 0..SHIP_WEAPON_COUNT {
            let value = stream.read_enum(WeaponType::COUNT as u32)?;
            loadout.weapons[slot] = WeaponType::from_index(value).ok_or(BitStreamError::OutOfRange {
                value,
                max: WeaponType::COUNT as u32 - 1,
            })?;
        }
        update.loadout = Some(loadout);
    }

    update.exploded = stream.read_flag()?;
    if !update.exploded {
        if stream.read_flag()? {
            let play_effect = stream.read_flag()?;
            let spawn_shield = stream.read_flag()?;
            update.respawn = Some(RespawnInfo {
                play_effect,
                spawn_shield,
            });
        }
        if stream.read_flag()? {
            update.health = Some(stream.read_float(HEALTH_BITS)?);
        }
    }

    update.busy = stream.read_flag()?;
    update.warped = stream.read_flag()?;
    update.teleported = stream.read_flag()?;

    if stream.read_flag()? {
        let pos = read_compressed_point(stream)?;
        let vel = read_compressed_velocity(stream, COMPRESSED_VELOCITY_MAX)?;
        update.position = Some((pos, vel));
    }
    if stream.read_flag()? {
        update.mv = Some(MoveRecord::unpack(stream)?);
    }
    if stream.read_flag()? {
        let mut modules = [false; ShipModule::COUNT];
        for active in modules.iter_mut() {
            *active = stream.read_flag()?;
        }
        update.modules = Some(modules);
    }

    Ok(update)
}

fn write_team(stream: &mut BitWriter, team: i32) {
    let biased = (team - HOSTILE_TEAM).clamp(0, MAX_TEAMS - HOSTILE_TEAM);
    stream.write_ranged_u32(biased as u32, 0, (MAX_TEAMS - HOSTILE_TEAM) as u32);
}

fn read_team(stream: &mut BitReader<'_>) -> Result<i32, BitStreamError> {
    let biased = stream.read_ranged_u32(0, (MAX_TEAMS - HOSTILE_TEAM) as u32)?;
    Ok(biased as i32 + HOSTILE_TEAM)
}

// ============================================================================
// Control state
// ============================================================================

/// Top of the fire timer's wire range; negative timers fold in above it
#[inline]
fn fire_timer_range() -> (u32, u32) {
    let max_delay = max_fire_delay();
    (max_delay, max_delay + NEGATIVE_FIRE_DELAY)
}

/// Fold a signed fire timer into the unsigned wire range.
///
/// Negative values land above the largest fire delay and are clamped at
/// `-NEGATIVE_FIRE_DELAY`; anything deeper is lost.
pub fn fold_fire_timer(timer: i32) -> u32 {
    let (max_delay, top) = fire_timer_range();
    if timer < 0 {
        max_delay + timer.unsigned_abs().min(NEGATIVE_FIRE_DELAY)
    } else {
        (timer as u32).min(top)
    }
}

pub fn unfold_fire_timer(value: u32) -> i32 {
    let (max_delay, _) = fire_timer_range();
    if value > max_delay {
        max_delay as i32 - value as i32
    } else {
        value as i32
    }
}

pub fn write_control_state(state: &ControlState, stream: &mut BitWriter) {
    stream.write_f32(state.pos.x);
    stream.write_f32(state.pos.y);
    stream.write_f32(state.vel.x);
    stream.write_f32(state.vel.y);
    stream.write_ranged_u32(state.energy.max(0) as u32, 0, ENERGY_MAX as u32);
    stream.write_flag(state.cooldown);
    stream.write_ranged_u32(fold_fire_timer(state.fire_timer), 0, fire_timer_range().1);
    stream.write_ranged_u32(state.active_weapon as u32, 0, WeaponType::COUNT as u32);
}

pub fn read_control_state(stream: &mut BitReader<'_>) -> Result<ControlState, BitStreamError> {
    let pos = Vec2::new(stream.read_f32()?, stream.read_f32()?);
    let vel = Vec2::new(stream.read_f32()?, stream.read_f32()?);
    let energy = stream.read_ranged_u32(0, ENERGY_MAX as u32)? as i32;
    let cooldown = stream.read_flag()?;
    let fire_timer = unfold_fire_timer(stream.read_ranged_u32(0, fire_timer_range().1)?);
    let active_weapon = stream.read_ranged_u32(0, WeaponType::COUNT as u32)? as usize;
    Ok(ControlState {
        pos,
        vel,
        energy,
        cooldown,
        fire_timer,
        active_weapon,
    })
}

// ============================================================================
// Compressed geometry
// ============================================================================

/// Position on a 1/16 grid in 16 bits per axis, or raw floats when out of reach
pub fn write_compressed_point(stream: &mut BitWriter, point: Vec2) {
    let qx = (point.x * POINT_SCALE).round();
    let qy = (point.y * POINT_SCALE).round();
    let fits = |q: f32| q >= i16::MIN as f32 && q <= i16::MAX as f32;

    if stream.write_flag(fits(qx) && fits(qy)) {
        stream.write_int(qx as i16 as u16 as u32, 16);
        stream.write_int(qy as i16 as u16 as u32, 16);
    } else {
        stream.write_f32(point.x);
        stream.write_f32(point.y);
    }
}

pub fn read_compressed_point(stream: &mut BitReader<'_>) -> Result<Vec2, BitStreamError> {
    if stream.read_flag()? {
        let x = stream.read_int(16)? as u16 as i16;
        let y = stream.read_int(16)? as u16 as i16;
        Ok(Vec2::new(x as f32 / POINT_SCALE, y as f32 / POINT_SCALE))
    } else {
        Ok(Vec2::new(stream.read_f32()?, stream.read_f32()?))
    }
}

/// Velocity as heading plus whole-unit speed; zero costs one bit and speeds
/// above `max` fall back to raw floats
pub fn write_compressed_velocity(stream: &mut BitWriter, vel: Vec2, max: u32) {
    let len = vel.length();
    if stream.write_flag(len == 0.0) {
        return;
    }
    if stream.write_flag(len > max as f32) {
        stream.write_f32(vel.x);
        stream.write_f32(vel.y);
    } else {
        stream.write_float(vel.angle().rem_euclid(TAU) / TAU, VELOCITY_ANGLE_BITS);
        stream.write_ranged_u32(len.round() as u32, 0, max);
    }
}

pub fn read_compressed_velocity(stream: &mut BitReader<'_>, max: u32) -> Result<Vec2, BitStreamError> {
    if stream.read_flag()? {
        return Ok(Vec2::ZERO);
    }
    if stream.read_flag()? {
        Ok(Vec2::new(stream.read_f32()?, stream.read_f32()?))
    } else {
        let angle = stream.read_float(VELOCITY_ANGLE_BITS)? * TAU;
        let len = stream.read_ranged_u32(0, max)? as f32;
        Ok(Vec2::from_angle(angle) * len)
    }
}
