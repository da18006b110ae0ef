//! Items a ship can carry (flags, resources, balls)
//!
//! Items own their mount relation; ships only hold handles to them and
//! re-validate those handles against the registry on every query.

use serde::{Deserialize, Serialize};

use crate::game::handle::Handle;
use crate::game::ship::ShipHandle;
use crate::util::vec2::Vec2;

pub type ItemHandle = Handle<Item>;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[repr(u8)]
pub enum ItemKind {
    Flag = 0,
    /// Several flags carried as one item
    FlagBundle = 1,
    Resource = 2,
    Ball = 3,
}

impl ItemKind {
    pub const COUNT: u32 = 4;

    pub fn from_index(index: u32) -> Option<Self> {
        match index {
            0 => Some(ItemKind::Flag),
            1 => Some(ItemKind::FlagBundle),
            2 => Some(ItemKind::Resource),
            3 => Some(ItemKind::Ball),
            _ => None,
        }
    }

    #[inline]
    pub fn is_flag(self) -> bool {
        matches!(self, ItemKind::Flag | ItemKind::FlagBundle)
    }

    /// Carrying one of these shows the ship even while cloaked
    #[inline]
    pub fn reveals_carrier(self) -> bool {
        !matches!(self, ItemKind::Resource)
    }
}

#[derive(Debug, Clone)]
pub struct Item {
    pub kind: ItemKind,
    pub pos: Vec2,
    /// Flags represented by a bundle; 1 for everything else
    pub flag_count: u32,
    pub mount: Option<ShipHandle>,
}

impl Item {
    pub fn new(kind: ItemKind, pos: Vec2) -> Self {
        Self {
            kind,
            pos,
            flag_count: 1,
            mount: None,
        }
    }

    pub fn bundle(count: u32, pos: Vec2) -> Self {
        Self {
            flag_count: count,
            ..Self::new(ItemKind::FlagBundle, pos)
        }
    }

    #[inline]
    pub fn is_mounted_on(&self, ship: ShipHandle) -> bool {
        self.mount == Some(ship)
    }

    /// Drop the item where its carrier was
    pub fn dismount(&mut self, at: Vec2) {
        self.mount = None;
        self.pos = at;
    }
}
