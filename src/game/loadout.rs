//! Ship loadout and its delimited text form

use serde::{Deserialize, Serialize};
use std::fmt;
use tracing::warn;

use crate::game::modules::{ShipModule, WeaponType, SHIP_MODULE_COUNT, SHIP_WEAPON_COUNT};

/// Total number of comma-separated tokens in a loadout string
pub const LOADOUT_TOKEN_COUNT: usize = SHIP_MODULE_COUNT + SHIP_WEAPON_COUNT;

/// Loadout parse failures
#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
pub enum LoadoutError {
    #[error("Loadout string is empty")]
    Empty,
    #[error("Expected {expected} loadout entries, found {found}")]
    WrongTokenCount { expected: usize, found: usize },
    #[error("Unknown module in loadout: {0}")]
    UnknownModule(String),
    #[error("Unknown weapon in loadout: {0}")]
    UnknownWeapon(String),
}

/// Equipped modules followed by equipped weapons
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct Loadout {
    pub modules: [ShipModule; SHIP_MODULE_COUNT],
    pub weapons: [WeaponType; SHIP_WEAPON_COUNT],
}

impl Default for Loadout {
    fn default() -> Self {
        Self {
            modules: [ShipModule::Boost, ShipModule::Shield],
            weapons: [WeaponType::Phaser, WeaponType::Bounce, WeaponType::Triple],
        }
    }
}

impl Loadout {
    pub fn new(
        modules: [ShipModule; SHIP_MODULE_COUNT],
        weapons: [WeaponType; SHIP_WEAPON_COUNT],
    ) -> Self {
        Self { modules, weapons }
    }

    #[inline]
    pub fn has_module(&self, module: ShipModule) -> bool {
        self.modules.contains(&module)
    }

    /// Parse a string such as `"Turbo,Shield,Phaser,Bouncer,Triple"`.
    ///
    /// Names are matched case-insensitively and surrounding whitespace is
    /// ignored. Failures are logged here so callers can simply keep their
    /// existing loadout.
    pub fn parse(text: &str) -> Result<Self, LoadoutError> {
        // An unset preset is expected and not worth a warning
        if text.trim().is_empty() {
            return Err(LoadoutError::Empty);
        }

        let words: Vec<&str> = text.split(',').map(str::trim).collect();
        if words.len() != LOADOUT_TOKEN_COUNT {
            warn!(
                found = words.len(),
                expected = LOADOUT_TOKEN_COUNT,
                "Misconfigured loadout preset"
            );
            return Err(LoadoutError::WrongTokenCount {
                expected: LOADOUT_TOKEN_COUNT,
                found: words.len(),
            });
        }

        let mut loadout = Loadout::default();
        for (slot, word) in loadout.modules.iter_mut().zip(&words[..SHIP_MODULE_COUNT]) {
            *slot = ShipModule::from_name(word).ok_or_else(|| {
                warn!(module = %word, "Unknown module found in loadout preset");
                LoadoutError::UnknownModule(word.to_string())
            })?;
        }
        for (slot, word) in loadout.weapons.iter_mut().zip(&words[SHIP_MODULE_COUNT..]) {
            *slot = WeaponType::from_name(word).ok_or_else(|| {
                warn!(weapon = %word, "Unknown weapon found in loadout preset");
                LoadoutError::UnknownWeapon(word.to_string())
            })?;
        }
        Ok(loadout)
    }

    /// Parse `text` into `target`, leaving `target` untouched on failure
    pub fn apply_str(target: &mut Loadout, text: &str) -> Result<(), LoadoutError> {
        *target = Self::parse(text)?;
        Ok(())
    }
}

impl fmt::Display for Loadout {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let names = self
            .modules
            .iter()
            .map(|m| m.name())
            .chain(self.weapons.iter().map(|w| w.name()));
        for (i, name) in names.enumerate() {
            if i > 0 {
                f.write_str(",")?;
            }
            f.write_str(name)?;
        }
        Ok(())
    }
}
