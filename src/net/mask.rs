//! Dirty bits for ship replication

use std::ops::{BitOr, BitOrAssign};

/// Set of remote-visible ship fields that changed since the last flush.
///
/// Each connection keeps its own copy per ghost; a bit is cleared only after
/// that connection's packet has been written.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Hash)]
pub struct ChangeMask(u32);

impl ChangeMask {
    pub const NONE: ChangeMask = ChangeMask(0);
    pub const POSITION: ChangeMask = ChangeMask(1 << 0);
    pub const MOVE: ChangeMask = ChangeMask(1 << 1);
    pub const MODULES: ChangeMask = ChangeMask(1 << 2);
    pub const LOADOUT: ChangeMask = ChangeMask(1 << 3);
    pub const CHANGE_TEAM: ChangeMask = ChangeMask(1 << 4);
    pub const AUTHENTICATION: ChangeMask = ChangeMask(1 << 5);
    pub const HEALTH: ChangeMask = ChangeMask(1 << 6);
    pub const RESPAWN: ChangeMask = ChangeMask(1 << 7);
    pub const SPAWN_SHIELD: ChangeMask = ChangeMask(1 << 8);
    pub const EXPLOSION: ChangeMask = ChangeMask(1 << 9);
    pub const WARP_POSITION: ChangeMask = ChangeMask(1 << 10);
    pub const TELEPORT: ChangeMask = ChangeMask(1 << 11);

    /// Every field; used when a ship enters a connection's scope
    pub const ALL: ChangeMask = ChangeMask((1 << 12) - 1);

    #[inline]
    pub const fn bits(self) -> u32 {
        self.0
    }

    #[inline]
    pub const fn from_bits(bits: u32) -> Self {
        ChangeMask(bits & Self::ALL.0)
    }

    #[inline]
    pub fn is_empty(self) -> bool {
        self.0 == 0
    }

    /// True when any bit of `other` is set here
    #[inline]
    pub fn intersects(self, other: ChangeMask) -> bool {
        self.0 & other.0 != 0
    }

    #[inline]
    pub fn contains(self, other: ChangeMask) -> bool {
        self.0 & other.0 == other.0
    }

    #[inline]
    pub fn insert(&mut self, other: ChangeMask) {
        self.0 |= other.0;
    }

    #[inline]
    pub fn remove(&mut self, other: ChangeMask) {
        self.0 &= !other.0;
    }

    /// Return the current bits and leave the mask empty
    #[inline]
    pub fn take(&mut self) -> ChangeMask {
        std::mem::take(self)
    }
}

impl BitOr for ChangeMask {
    type Output = ChangeMask;
    fn bitor(self, rhs: ChangeMask) -> ChangeMask {
        ChangeMask(self.0 | rhs.0)
    }
}

impl BitOrAssign for ChangeMask {
    fn bitor_assign(&mut self, rhs: ChangeMask) {
        self.0 |= rhs.0;
    }
}
