//! Ship modules and weapons with their static tuning tables

use serde::{Deserialize, Serialize};

/// Number of module slots on a ship
pub const SHIP_MODULE_COUNT: usize = 2;
/// Number of weapon slots on a ship
pub const SHIP_WEAPON_COUNT: usize = 3;

/// How a module consumes energy
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ModuleUse {
    /// Always on while equipped, never drains
    Passive,
    /// Drains continuously while held
    Active,
}

/// Static description of a module
#[derive(Debug, Clone, Copy)]
pub struct ModuleInfo {
    pub name: &'static str,
    pub use_type: ModuleUse,
    /// Energy drained per second while active
    pub energy_drain: f32,
    /// Energy charged per discrete use (engineer builds)
    pub per_use_cost: i32,
}

/// Equippable ship module
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[repr(u8)]
pub enum ShipModule {
    Shield = 0,
    Boost = 1,
    Sensor = 2,
    Repair = 3,
    Engineer = 4,
    Cloak = 5,
    Armor = 6,
}

impl ShipModule {
    pub const COUNT: usize = 7;

    pub const ALL: [ShipModule; Self::COUNT] = [
        ShipModule::Shield,
        ShipModule::Boost,
        ShipModule::Sensor,
        ShipModule::Repair,
        ShipModule::Engineer,
        ShipModule::Cloak,
        ShipModule::Armor,
    ];

    #[inline]
    pub fn index(self) -> usize {
        self as usize
    }

    pub fn from_index(index: u32) -> Option<Self> {
        Self::ALL.get(index as usize).copied()
    }

    pub fn info(self) -> &'static ModuleInfo {
        &MODULE_INFO[self.index()]
    }

    pub fn name(self) -> &'static str {
        self.info().name
    }

    /// Case-insensitive lookup by display name
    pub fn from_name(name: &str) -> Option<Self> {
        Self::ALL
            .iter()
            .copied()
            .find(|m| m.name().eq_ignore_ascii_case(name))
    }
}

const MODULE_INFO: [ModuleInfo; ShipModule::COUNT] = [
    ModuleInfo { name: "Shield", use_type: ModuleUse::Active, energy_drain: 27_000.0, per_use_cost: 0 },
    ModuleInfo { name: "Turbo", use_type: ModuleUse::Active, energy_drain: 15_000.0, per_use_cost: 0 },
    ModuleInfo { name: "Sensor", use_type: ModuleUse::Active, energy_drain: 8_000.0, per_use_cost: 0 },
    ModuleInfo { name: "Repair", use_type: ModuleUse::Active, energy_drain: 15_000.0, per_use_cost: 0 },
    ModuleInfo { name: "Engineer", use_type: ModuleUse::Active, energy_drain: 0.0, per_use_cost: 75_000 },
    ModuleInfo { name: "Cloak", use_type: ModuleUse::Active, energy_drain: 8_000.0, per_use_cost: 0 },
    ModuleInfo { name: "Armor", use_type: ModuleUse::Passive, energy_drain: 0.0, per_use_cost: 0 },
];

/// Static description of a weapon
#[derive(Debug, Clone, Copy)]
pub struct WeaponInfo {
    pub name: &'static str,
    /// Milliseconds between shots
    pub fire_delay: u32,
    /// Energy required before a shot is allowed
    pub min_energy: i32,
    /// Energy consumed per shot
    pub drain_energy: i32,
}

/// Equippable weapon
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[repr(u8)]
pub enum WeaponType {
    Phaser = 0,
    Bounce = 1,
    Triple = 2,
    Burst = 3,
    Mine = 4,
    SpyBug = 5,
}

impl WeaponType {
    pub const COUNT: usize = 6;

    pub const ALL: [WeaponType; Self::COUNT] = [
        WeaponType::Phaser,
        WeaponType::Bounce,
        WeaponType::Triple,
        WeaponType::Burst,
        WeaponType::Mine,
        WeaponType::SpyBug,
    ];

    #[inline]
    pub fn index(self) -> usize {
        self as usize
    }

    pub fn from_index(index: u32) -> Option<Self> {
        Self::ALL.get(index as usize).copied()
    }

    pub fn info(self) -> &'static WeaponInfo {
        &WEAPON_INFO[self.index()]
    }

    pub fn name(self) -> &'static str {
        self.info().name
    }

    /// Case-insensitive lookup by display name
    pub fn from_name(name: &str) -> Option<Self> {
        Self::ALL
            .iter()
            .copied()
            .find(|w| w.name().eq_ignore_ascii_case(name))
    }
}

const WEAPON_INFO: [WeaponInfo; WeaponType::COUNT] = [
    WeaponInfo { name: "Phaser", fire_delay: 100, min_energy: 500, drain_energy: 500 },
    WeaponInfo { name: "Bouncer", fire_delay: 100, min_energy: 1_800, drain_energy: 1_800 },
    WeaponInfo { name: "Triple", fire_delay: 200, min_energy: 2_100, drain_energy: 2_100 },
    WeaponInfo { name: "Burster", fire_delay: 700, min_energy: 5_000, drain_energy: 5_000 },
    WeaponInfo { name: "Mine", fire_delay: 900, min_energy: 55_000, drain_energy: 55_000 },
    WeaponInfo { name: "Spybug", fire_delay: 800, min_energy: 50_000, drain_energy: 50_000 },
];

/// Longest fire delay of any weapon; bounds the fire timer on the wire
pub fn max_fire_delay() -> u32 {
    WEAPON_INFO.iter().map(|w| w.fire_delay).max().unwrap_or(0)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::game::constants::net::NEGATIVE_FIRE_DELAY;

    #[test]
    fn test_module_lookup_is_case_insensitive() {
        assert_eq!(ShipModule::from_name("turbo"), Some(ShipModule::Boost));
        assert_eq!(ShipModule::from_name("ARMOR"), Some(ShipModule::Armor));
        assert_eq!(ShipModule::from_name("Jetpack"), None);
    }

    #[test]
    fn test_weapon_lookup() {
        assert_eq!(WeaponType::from_name("bouncer"), Some(WeaponType::Bounce));
        assert_eq!(WeaponType::from_index(2), Some(WeaponType::Triple));
        assert_eq!(WeaponType::from_index(WeaponType::COUNT as u32), None);
    }

    #[test]
    fn test_only_armor_is_passive() {
        for module in ShipModule::ALL {
            let passive = module.info().use_type == ModuleUse::Passive;
            assert_eq!(passive, module == ShipModule::Armor);
        }
    }

    #[test]
    fn test_fire_timer_range_fills_ten_bits() {
        assert_eq!(max_fire_delay(), 900);
        assert_eq!(max_fire_delay() + NEGATIVE_FIRE_DELAY, 1023);
    }
}
