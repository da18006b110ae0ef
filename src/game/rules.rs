//! Game-mode policy consulted by the ship simulation

use std::sync::atomic::{AtomicU64, Ordering};

use tracing::debug;

use crate::game::ship::Ship;
use crate::game::systems::damage::DamageSource;

/// Policy hooks for the active game mode.
///
/// Denials are silent: a refused module simply stays off and a refused shot
/// simply isn't fired.
pub trait GameRules: Send + Sync {
    /// May this ship switch on active modules right now
    fn ok_to_use_modules(&self, _ship: &Ship) -> bool {
        true
    }

    /// May this ship fire its next shot
    fn on_fire(&self, _ship: &Ship) -> bool {
        true
    }

    /// May `source` hurt `victim`; healing is never asked about
    fn can_damage(&self, _source: &DamageSource, _victim: &Ship) -> bool {
        true
    }

    /// Called once per kill on the authoritative side
    fn on_ship_killed(&self, _victim: &Ship, _source: Option<&DamageSource>) {}
}

/// Everything allowed; the default free-for-all mode
#[derive(Debug, Default)]
pub struct OpenRules {
    kills: AtomicU64,
}

impl OpenRules {
    pub fn kills(&self) -> u64 {
        self.kills.load(Ordering::Relaxed)
    }
}

impl GameRules for OpenRules {
    fn on_ship_killed(&self, victim: &Ship, source: Option<&DamageSource>) {
        self.kills.fetch_add(1, Ordering::Relaxed);
        debug!(victim = %victim.name, ?source, "Ship killed");
    }
}

/// Team mode with switchable restrictions
#[derive(Debug, Clone)]
pub struct TeamRules {
    pub modules_allowed: bool,
    pub firing_allowed: bool,
    pub friendly_fire: bool,
}

impl Default for TeamRules {
    fn default() -> Self {
        Self {
            modules_allowed: true,
            firing_allowed: true,
            friendly_fire: false,
        }
    }
}

impl GameRules for TeamRules {
    fn ok_to_use_modules(&self, _ship: &Ship) -> bool {
        self.modules_allowed
    }

    fn on_fire(&self, _ship: &Ship) -> bool {
        self.firing_allowed
    }

    fn can_damage(&self, source: &DamageSource, victim: &Ship) -> bool {
        if self.friendly_fire {
            return true;
        }
        // Self damage is always allowed; teammates are spared
        let own = victim.owner.is_some() && source.owner() == victim.owner;
        own || source.team() != Some(victim.team)
    }
}
