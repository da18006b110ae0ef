//! Energy pool and module activation

use crate::game::constants::energy::{
    COOLDOWN_THRESHOLD, MAX, RECHARGE_RATE, RECHARGE_RATE_WHEN_IDLE, SENSOR_ACTIVATION_COST,
};
use crate::game::constants::timing::CLOAK_FADE_TIME;
use crate::game::modules::{ModuleUse, ShipModule};
use crate::game::ship::{Ship, TickContext};
use crate::game::systems::repair;
use crate::net::mask::ChangeMask;

/// Decide which modules run this tick and settle the energy bill.
///
/// Cooldown engages when nothing drained and energy sits at or below the
/// threshold, or when energy runs dry; it only lifts once energy is strictly
/// above the threshold again.
pub fn process_energy(ship: &mut Ship, ctx: &TickContext<'_>) {
    let was_active = ship.module_active;
    ship.module_active = [false; ShipModule::COUNT];

    if ship.energy > COOLDOWN_THRESHOLD {
        ship.cooldown = false;
    }

    let allowed = ctx.rules.ok_to_use_modules(ship);
    let mv = ship.current_move;

    for (slot, module) in ship.loadout.modules.into_iter().enumerate() {
        // Passive modules count as active for stats but never drain
        if module.info().use_type == ModuleUse::Passive {
            ship.module_active[module.index()] = true;
        } else if mv.module[slot] && !ship.cooldown && allowed {
            ship.module_active[module.index()] = true;
        }
    }

    if ship.is_module_active(ShipModule::Boost) && !mv.has_intent() {
        ship.module_active[ShipModule::Boost.index()] = false;
    }

    if ship.is_module_active(ShipModule::Repair) && !repair::find_repair_targets(ship, ctx.world) {
        ship.module_active[ShipModule::Repair.index()] = false;
    }

    if ship.is_module_active(ShipModule::Cloak) && ship.weapon_fire_decloak.is_running() {
        ship.module_active[ShipModule::Cloak.index()] = false;
    }

    let scale = mv.seconds();
    let mut any_draining = false;
    for module in ShipModule::ALL {
        if ship.is_module_active(module) {
            let used = (module.info().energy_drain * scale) as i32;
            ship.energy -= used;
            any_draining |= used != 0;
            ship.stats.add_module_used(module, mv.time);
        }
    }

    if !any_draining && ship.energy <= COOLDOWN_THRESHOLD {
        ship.cooldown = true;
    }

    if ship.energy < MAX {
        if !any_draining {
            let rate = if mv.has_intent() {
                RECHARGE_RATE
            } else {
                RECHARGE_RATE_WHEN_IDLE
            };
            ship.energy += (rate * scale) as i32;
        }

        if ship.energy <= 0 {
            ship.energy = 0;
            ship.module_active = [false; ShipModule::COUNT];
            ship.cooldown = true;
        }
    }
    ship.energy = ship.energy.min(MAX);

    for module in ShipModule::ALL {
        let now = ship.is_module_active(module);
        if now == was_active[module.index()] {
            continue;
        }
        match module {
            ShipModule::Sensor => {
                ship.sensor_start_ms = ctx.now_ms;
                if now {
                    // Tapping the sensor is not free
                    ship.energy -= SENSOR_ACTIVATION_COST;
                }
            }
            ShipModule::Cloak => {
                let remaining = ship.cloak_timer.current();
                ship.cloak_timer
                    .reset_with_period(CLOAK_FADE_TIME - remaining, CLOAK_FADE_TIME);
            }
            _ => {}
        }
        ship.set_mask_bits(ChangeMask::MODULES);
    }

    ship.energy = ship.energy.clamp(0, MAX);
}
