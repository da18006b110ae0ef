//! Damage, healing and death

use serde::{Deserialize, Serialize};
use tracing::debug;
use uuid::Uuid;

use crate::game::constants::timing::KILL_DELETE_DELAY;
use crate::game::modules::{ShipModule, WeaponType};
use crate::game::rules::GameRules;
use crate::game::ship::Ship;
use crate::net::mask::ChangeMask;
use crate::util::vec2::Vec2;

/// Armor divides incoming damage by this
const ARMOR_DAMAGE_DIVISOR: f32 = 2.0;
/// Bouncers were tuned against armor separately
const ARMOR_BOUNCER_DAMAGE_DIVISOR: f32 = 1.3333;

/// Where a hit came from
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub enum DamageSource {
    Projectile {
        weapon: WeaponType,
        owner: Option<Uuid>,
        team: i32,
    },
    Asteroid,
    Ship {
        owner: Option<Uuid>,
        team: i32,
    },
    /// Repair beams, hazards, scripted damage
    Environment,
}

impl DamageSource {
    pub fn owner(&self) -> Option<Uuid> {
        match self {
            DamageSource::Projectile { owner, .. } | DamageSource::Ship { owner, .. } => *owner,
            DamageSource::Asteroid | DamageSource::Environment => None,
        }
    }

    pub fn team(&self) -> Option<i32> {
        match self {
            DamageSource::Projectile { team, .. } | DamageSource::Ship { team, .. } => Some(*team),
            DamageSource::Asteroid | DamageSource::Environment => None,
        }
    }

    pub fn weapon(&self) -> Option<WeaponType> {
        match self {
            DamageSource::Projectile { weapon, .. } => Some(*weapon),
            _ => None,
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub enum DamageKind {
    Point,
    /// Blast that also shoves the victim
    Area { impulse: Vec2 },
}

/// One hit. Negative amounts heal.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct DamageInfo {
    pub amount: f32,
    pub kind: DamageKind,
    /// Scale applied when the victim's owner caused the hit
    pub self_multiplier: f32,
    pub source: DamageSource,
}

impl DamageInfo {
    pub fn point(amount: f32, source: DamageSource) -> Self {
        Self {
            amount,
            kind: DamageKind::Point,
            self_multiplier: 1.0,
            source,
        }
    }

    pub fn area(amount: f32, impulse: Vec2, source: DamageSource) -> Self {
        Self {
            kind: DamageKind::Area { impulse },
            ..Self::point(amount, source)
        }
    }

    pub fn heal(amount: f32) -> Self {
        Self::point(-amount, DamageSource::Environment)
    }

    pub fn with_self_multiplier(mut self, multiplier: f32) -> Self {
        self.self_multiplier = multiplier;
        self
    }

    fn is_self_inflicted(&self, victim: &Ship) -> bool {
        victim.owner.is_some() && self.source.owner() == victim.owner
    }
}

/// Apply a hit to `ship`. Returns true when health changed.
///
/// Dead ships ignore everything. Area impulse always lands, even when the
/// damage itself is blocked. Positive damage must get past the rules, an
/// active shield and the spawn shield; healing skips all three. Health is
/// kept within [0, 1] and reaching zero kills the ship.
pub fn damage_object(ship: &mut Ship, info: &DamageInfo, rules: &dyn GameRules) -> bool {
    if ship.health == 0.0 || ship.exploded {
        return false;
    }

    if let DamageKind::Area { impulse } = info.kind {
        ship.impulse += impulse;
    }

    let mut amount = info.amount;
    if amount == 0.0 {
        return false;
    }

    if amount > 0.0 {
        if !rules.can_damage(&info.source, ship) {
            return false;
        }
        if ship.is_module_active(ShipModule::Shield) || ship.spawn_shield.is_running() {
            return false;
        }
        // Armor works whenever it is equipped, active or not
        if ship.has_module(ShipModule::Armor) {
            amount /= match info.source.weapon() {
                Some(WeaponType::Bounce) => ARMOR_BOUNCER_DAMAGE_DIVISOR,
                _ => ARMOR_DAMAGE_DIVISOR,
            };
        }
        if let Some(weapon) = info.source.weapon() {
            ship.stats.count_hit_by(weapon);
        }
    }

    let scale = if info.is_self_inflicted(ship) {
        info.self_multiplier
    } else {
        1.0
    };
    ship.health -= amount * scale;
    ship.set_mask_bits(ChangeMask::HEALTH);

    if ship.health <= 0.0 {
        ship.health = 0.0;
        if info.source == DamageSource::Asteroid {
            ship.stats.asteroid_crashes += 1;
        }
        kill(ship, Some(&info.source), rules);
    } else if ship.health > 1.0 {
        ship.health = 1.0;
    }
    true
}

/// Blow the ship up. Authoritative side only; a second call does nothing.
pub fn kill(ship: &mut Ship, source: Option<&DamageSource>, rules: &dyn GameRules) {
    if ship.is_ghost || ship.exploded {
        return;
    }

    rules.on_ship_killed(ship, source);
    debug!(ship = %ship.name, ?source, "Ship destroyed");

    ship.schedule_delete(KILL_DELETE_DELAY);
    ship.exploded = true;
    ship.collision_enabled = false;
    ship.set_mask_bits(ChangeMask::EXPLOSION);
    ship.release_all_mounts();
}
