//! Weapon fire cadence

use smallvec::SmallVec;

use crate::game::constants::ship::COLLISION_RADIUS;
use crate::game::constants::timing::WEAPON_FIRE_DECLOAK_TIME;
use crate::game::effects::SoundEffect;
use crate::game::ship::{Ship, ShotFired, TickContext};
use crate::net::mask::ChangeMask;

/// Run the fire timer for this move and fire as many shots as it allows.
///
/// The timer may go negative within a long move; each shot adds the weapon's
/// delay back so a lagging client fires the same number of shots the server
/// does. Letting go of the trigger forgives any debt. Only the authoritative
/// side returns shots; a replica just pays for them, and plays the sound when
/// `audible`.
pub fn process_weapon_fire(
    ship: &mut Ship,
    ctx: &TickContext<'_>,
    audible: bool,
) -> SmallVec<[ShotFired; 2]> {
    let mut shots = SmallVec::new();
    let time = ship.current_move.time;

    if ship.fire_timer > 0 {
        ship.fire_timer -= time as i32;
    }
    if !ship.current_move.fire && ship.fire_timer < 0 {
        ship.fire_timer = 0;
    }
    ship.weapon_fire_decloak.update(time);

    if !ship.current_move.fire {
        return shots;
    }

    let weapon = ship.selected_weapon();
    let info = weapon.info();

    while ship.fire_timer <= 0 && ship.energy >= info.min_energy && ctx.rules.on_fire(ship) {
        ship.energy -= info.drain_energy;
        ship.fire_timer += info.fire_delay as i32;
        ship.weapon_fire_decloak.reset(WEAPON_FIRE_DECLOAK_TIME);
        ship.stats.count_shot(weapon);

        if ship.spawn_shield.is_running() {
            ship.spawn_shield.clear();
            ship.set_mask_bits(ChangeMask::SPAWN_SHIELD);
        }

        let dir = ship.aim_vector();
        let pos = ship.actual_pos() + dir * COLLISION_RADIUS;
        let vel = ship.actual_vel();

        if ship.is_ghost {
            if audible {
                ctx.effects.play_sound(SoundEffect::WeaponFire(weapon), pos, vel);
            }
        } else {
            shots.push(ShotFired { weapon, pos, vel, dir });
        }
    }

    shots
}
