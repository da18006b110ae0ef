use crate::game::constants::ship::{
    ACCELERATION, ARMOR_ACCEL_PENALTY_FACTOR, ARMOR_SPEED_PENALTY_FACTOR, BOOST_ACCELERATION,
    BOOST_MAX_VELOCITY, COLLISION_RADIUS, MAX_CONTROLLABLE_SPEED, MAX_VELOCITY,
};
use crate::game::effects::SoundEffect;
use crate::game::modules::ShipModule;
use crate::game::motion::StateSlot;
use crate::game::ship::{Ship, TickContext};
use crate::game::spatial::WorldQuery;
use crate::net::mask::ChangeMask;
use crate::util::vec2::Vec2;

/// Top speed right now: boosted while boost runs, scaled when armored
pub fn max_velocity(ship: &Ship) -> f32 {
    let base = if ship.is_module_active(ShipModule::Boost) {
        BOOST_MAX_VELOCITY
    } else {
        MAX_VELOCITY
    };
    let armor = if ship.has_module(ShipModule::Armor) {
        ARMOR_SPEED_PENALTY_FACTOR
    } else {
        1.0
    };
    base * armor
}

/// Acceleration budget per second, before the slip zone factor
pub fn max_acceleration(ship: &Ship) -> f32 {
    let base = if ship.is_module_active(ShipModule::Boost) {
        BOOST_ACCELERATION
    } else {
        ACCELERATION
    };
    let armor = if ship.has_module(ShipModule::Armor) {
        ARMOR_ACCEL_PENALTY_FACTOR
    } else {
        1.0
    };
    base * armor
}

/// Apply the ship's current move to one motion slot.
///
/// Velocity heads toward the requested velocity, limited by this tick's
/// acceleration budget; when the target is within budget velocity snaps to it
/// exactly. The angle is taken straight from the move. A ship already faster
/// than the controllable limit ignores input until it slows down.
pub fn process_move(ship: &mut Ship, slot: StateSlot, world: &dyn WorldQuery) {
    ship.motion.remember(slot);

    let mv = ship.current_move;
    let max_vel = max_velocity(ship);
    let seconds = mv.seconds();
    let max_accel = max_acceleration(ship) * seconds * world.slip_factor(ship.actual_pos());

    let state = &mut ship.motion[slot];

    let mut request = if state.vel.length() > MAX_CONTROLLABLE_SPEED {
        Vec2::ZERO
    } else {
        mv.intent()
    };
    request *= max_vel;
    let len = request.length();
    if len > max_vel {
        request *= max_vel / len;
    }

    let mut delta = request - state.vel;
    let accel_requested = delta.length();
    if accel_requested > max_accel {
        delta *= max_accel / accel_requested;
        state.vel += delta;
    } else {
        state.vel = request;
    }

    state.angle = mv.angle;
    state.advance(seconds);
}

/// Launch the ship if it sits on a speed zone
pub fn apply_speed_zone(ship: &mut Ship, ctx: &TickContext<'_>) -> bool {
    let Some(zone) = ctx.world.speed_zone_at(ship.actual_pos(), COLLISION_RADIUS) else {
        return false;
    };
    let launch = zone.launch_velocity();
    // Already flying along the zone at least as fast
    if ship.actual_vel().dot(zone.direction.normalize()) >= zone.speed {
        return false;
    }

    ship.motion.actual_mut().vel = launch;
    ship.set_mask_bits(ChangeMask::POSITION);
    if ship.is_ghost {
        ctx.effects
            .play_sound(SoundEffect::SpeedZone, ship.actual_pos(), launch);
    }
    true
}
