//! Per-connection replication state
//!
//! Each connection keeps its own scope of ghosted ships, a connection-local
//! 10-bit index per ghost and a private dirty mask per ghost. Masks are only
//! cleared once a packet carrying them has been written, and dropping a
//! connection simply drops all of this without touching the ships.

use hashbrown::HashMap;
use tracing::{debug, trace, warn};
use uuid::Uuid;

use crate::game::constants::net::{GHOST_ID_BIT_SIZE, MAX_GHOST_COUNT};
use crate::game::handle::Registry;
use crate::game::items::{Item, ItemHandle};
use crate::game::ship::{Ship, ShipHandle};
use crate::net::bitstream::{BitReader, BitStreamError, BitWriter};
use crate::net::mask::ChangeMask;
use crate::net::ship_update::{
    read_control_state, read_ship_update, write_control_state, write_ship_update, ControlState,
    ShipUpdate, UpdateTarget,
};

pub type ConnectionId = Uuid;

/// Hands out connection-local indices, reusing freed ones first
#[derive(Debug, Default)]
struct IndexPool {
    next: u32,
    free: Vec<u32>,
}

impl IndexPool {
    fn allocate(&mut self) -> Option<u32> {
        if let Some(index) = self.free.pop() {
            return Some(index);
        }
        if self.next >= MAX_GHOST_COUNT {
            return None;
        }
        let index = self.next;
        self.next += 1;
        Some(index)
    }

    fn release(&mut self, index: u32) {
        self.free.push(index);
    }
}

#[derive(Debug, Clone, Copy)]
struct GhostRecord {
    index: u32,
    mask: ChangeMask,
    /// Nothing sent yet since the ship entered scope
    initial: bool,
}

/// Result of one packet write
#[derive(Debug, Default)]
pub struct OutgoingPacket {
    pub bytes: Vec<u8>,
    pub ghost_updates: usize,
    pub removals: usize,
}

/// A decoded server packet
#[derive(Debug, Default)]
pub struct IncomingPacket {
    /// Ghost index of the controlled ship and its control state
    pub control: Option<(u32, ControlState)>,
    /// Latest move sequence the server has processed
    pub ack: Option<u32>,
    /// `(ghost index, is_initial, update)` in index order
    pub updates: Vec<(u32, bool, ShipUpdate)>,
    pub removals: Vec<u32>,
}

/// Server-side replication state for one client
#[derive(Debug)]
pub struct GhostConnection {
    pub id: ConnectionId,
    /// Ship this connection drives, if any
    pub control: Option<ShipHandle>,
    /// Sequence of the last move applied from this connection
    pub last_move_seq: Option<u32>,
    ghosts: HashMap<ShipHandle, GhostRecord>,
    indices: IndexPool,
    removals: Vec<u32>,
    item_indices: HashMap<ItemHandle, u32>,
    item_pool: IndexPool,
}

impl GhostConnection {
    pub fn new(id: ConnectionId) -> Self {
        Self {
            id,
            control: None,
            last_move_seq: None,
            ghosts: HashMap::new(),
            indices: IndexPool::default(),
            removals: Vec::new(),
            item_indices: HashMap::new(),
            item_pool: IndexPool::default(),
        }
    }

    // ========================================================================
    // Scope
    // ========================================================================

    /// Start ghosting `ship`; its first update carries every field.
    /// Returns the ghost index, or `None` when the connection is out of indices.
    pub fn add_to_scope(&mut self, ship: ShipHandle) -> Option<u32> {
        if let Some(record) = self.ghosts.get(&ship) {
            return Some(record.index);
        }
        let Some(index) = self.indices.allocate() else {
            warn!(connection = %self.id, "Ghost indices exhausted");
            return None;
        };
        self.ghosts.insert(
            ship,
            GhostRecord {
                index,
                mask: ChangeMask::ALL,
                initial: true,
            },
        );
        debug!(connection = %self.id, ?ship, index, "Ship entered scope");
        Some(index)
    }

    /// Stop ghosting `ship`; the client is told in the next packet
    pub fn remove_from_scope(&mut self, ship: ShipHandle) -> bool {
        let Some(record) = self.ghosts.remove(&ship) else {
            return false;
        };
        self.indices.release(record.index);
        // Never announced, so nothing to take back
        if !record.initial {
            self.removals.push(record.index);
        }
        debug!(connection = %self.id, ?ship, index = record.index, "Ship left scope");
        true
    }

    /// Make the scope exactly `visible`
    pub fn update_scope(&mut self, visible: &[ShipHandle]) {
        let gone: Vec<ShipHandle> = self
            .ghosts
            .keys()
            .copied()
            .filter(|h| !visible.contains(h))
            .collect();
        for ship in gone {
            self.remove_from_scope(ship);
        }
        for &ship in visible {
            self.add_to_scope(ship);
        }
    }

    #[inline]
    pub fn in_scope(&self, ship: ShipHandle) -> bool {
        self.ghosts.contains_key(&ship)
    }

    pub fn ghost_index(&self, ship: ShipHandle) -> Option<u32> {
        self.ghosts.get(&ship).map(|r| r.index)
    }

    #[inline]
    pub fn scope_len(&self) -> usize {
        self.ghosts.len()
    }

    /// Bits still waiting to go out for `ship`
    pub fn pending_mask(&self, ship: ShipHandle) -> ChangeMask {
        self.ghosts.get(&ship).map_or(ChangeMask::NONE, |r| r.mask)
    }

    /// OR freshly dirtied bits into this connection's copy
    #[inline]
    pub fn mark(&mut self, ship: ShipHandle, bits: ChangeMask) {
        if let Some(record) = self.ghosts.get_mut(&ship) {
            record.mask |= bits;
        }
    }

    fn item_index(&mut self, item: ItemHandle) -> Option<u32> {
        if let Some(&index) = self.item_indices.get(&item) {
            return Some(index);
        }
        let index = self.item_pool.allocate()?;
        self.item_indices.insert(item, index);
        Some(index)
    }

    /// Forget indices of items that no longer exist
    pub fn prune_items(&mut self, items: &Registry<Item>) {
        let pool = &mut self.item_pool;
        self.item_indices.retain(|&handle, &mut index| {
            let keep = items.contains(handle);
            if !keep {
                pool.release(index);
            }
            keep
        });
    }

    // ========================================================================
    // Packets
    // ========================================================================

    /// Write everything pending for this connection and clear what was sent.
    ///
    /// Layout: control section, ghost updates ended by a false flag, then
    /// removals ended by a false flag. Ghosts whose ship has vanished from
    /// the registry are skipped; the world removes them from scope.
    pub fn write_packet(&mut self, ships: &Registry<Ship>, items: &Registry<Item>, now_ms: u64) -> OutgoingPacket {
        let mut stream = BitWriter::with_capacity(512);
        let mut packet = OutgoingPacket::default();

        let control = self
            .control
            .and_then(|h| Some((self.ghost_index(h)?, ships.get(h)?)));
        if let Some((index, ship)) = control {
            stream.write_flag(true);
            stream.write_int(index, GHOST_ID_BIT_SIZE);
            write_control_state(&ControlState::capture(ship), &mut stream);
        } else {
            stream.write_flag(false);
        }
        if let Some(seq) = self.last_move_seq {
            stream.write_flag(true);
            stream.write_int(seq, 32);
        } else {
            stream.write_flag(false);
        }

        let mut pending: Vec<(ShipHandle, GhostRecord)> = self
            .ghosts
            .iter()
            .filter(|(_, r)| r.initial || !r.mask.is_empty())
            .map(|(&h, &r)| (h, r))
            .collect();
        pending.sort_unstable_by_key(|(_, r)| r.index);

        for (handle, record) in pending {
            let Some(ship) = ships.get(handle) else {
                continue;
            };
            let mount_indices: Vec<u32> = if record.initial {
                let mounted: Vec<ItemHandle> = ship.mounted_items(items).map(|(h, _)| h).collect();
                mounted.into_iter().filter_map(|h| self.item_index(h)).collect()
            } else {
                Vec::new()
            };

            stream.write_flag(true);
            stream.write_int(record.index, GHOST_ID_BIT_SIZE);
            stream.write_flag(record.initial);
            let target = UpdateTarget {
                is_initial: record.initial,
                to_controller: self.control == Some(handle),
                now_ms,
                mount_indices: &mount_indices,
            };
            write_ship_update(ship, &mut stream, record.mask, &target);
            packet.ghost_updates += 1;

            if let Some(sent) = self.ghosts.get_mut(&handle) {
                sent.mask = ChangeMask::NONE;
                sent.initial = false;
            }
        }
        stream.write_flag(false);

        for index in self.removals.drain(..) {
            stream.write_flag(true);
            stream.write_int(index, GHOST_ID_BIT_SIZE);
            packet.removals += 1;
        }
        stream.write_flag(false);

        trace!(
            connection = %self.id,
            bits = stream.bit_len(),
            updates = packet.ghost_updates,
            "Packet written"
        );
        packet.bytes = stream.into_bytes();
        packet
    }
}

/// Decode a packet produced by [`GhostConnection::write_packet`]
pub fn read_packet(bytes: &[u8]) -> Result<IncomingPacket, BitStreamError> {
    let mut stream = BitReader::new(bytes);
    let mut packet = IncomingPacket::default();

    if stream.read_flag()? {
        let index = stream.read_int(GHOST_ID_BIT_SIZE)?;
        packet.control = Some((index, read_control_state(&mut stream)?));
    }
    if stream.read_flag()? {
        packet.ack = Some(stream.read_int(32)?);
    }

    while stream.read_flag()? {
        let index = stream.read_int(GHOST_ID_BIT_SIZE)?;
        let is_initial = stream.read_flag()?;
        let update = read_ship_update(&mut stream, is_initial)?;
        packet.updates.push((index, is_initial, update));
    }

    while stream.read_flag()? {
        packet.removals.push(stream.read_int(GHOST_ID_BIT_SIZE)?);
    }

    Ok(packet)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::game::items::ItemKind;
    use crate::util::vec2::Vec2;

    fn world_with(count: usize) -> (Registry<Ship>, Vec<ShipHandle>) {
        let mut ships = Registry::new();
        let handles = (0..count)
            .map(|i| {
                let h = ships.insert(Ship::new(format!("S{i}"), 0, Vec2::new(i as f32 * 10.0, 0.0)));
                if let Some(ship) = ships.get_mut(h) {
                    ship.handle = Some(h);
                }
                h
            })
            .collect();
        (ships, handles)
    }

    #[test]
    fn test_scope_entry_sends_initial_then_nothing() {
        let (ships, handles) = world_with(2);
        let items = Registry::new();
        let mut conn = GhostConnection::new(Uuid::new_v4());
        conn.update_scope(&handles);
        assert_eq!(conn.scope_len(), 2);
        assert_eq!(conn.pending_mask(handles[0]), ChangeMask::ALL);

        let packet = conn.write_packet(&ships, &items, 0);
        assert_eq!(packet.ghost_updates, 2);
        let read = read_packet(&packet.bytes).expect("packet");
        assert_eq!(read.updates.len(), 2);
        assert!(read.updates.iter().all(|(_, initial, u)| *initial && u.position.is_some()));
        assert!(read.control.is_none());

        // Nothing dirty: header only
        let quiet = conn.write_packet(&ships, &items, 33);
        assert_eq!(quiet.ghost_updates, 0);
        assert_eq!(conn.pending_mask(handles[0]), ChangeMask::NONE);
    }

    #[test]
    fn test_masks_are_private_per_connection() {
        let (ships, handles) = world_with(1);
        let items = Registry::new();
        let mut a = GhostConnection::new(Uuid::new_v4());
        let mut b = GhostConnection::new(Uuid::new_v4());
        a.add_to_scope(handles[0]);
        b.add_to_scope(handles[0]);
        a.write_packet(&ships, &items, 0);
        b.write_packet(&ships, &items, 0);

        a.mark(handles[0], ChangeMask::HEALTH);
        assert_eq!(a.pending_mask(handles[0]), ChangeMask::HEALTH);
        assert!(b.pending_mask(handles[0]).is_empty());

        let read = read_packet(&a.write_packet(&ships, &items, 0).bytes).expect("packet");
        let (_, initial, update) = &read.updates[0];
        assert!(!initial);
        assert!(update.health.is_some());
        assert!(update.position.is_none());
    }

    #[test]
    fn test_removal_frees_index() {
        let (ships, handles) = world_with(2);
        let items = Registry::new();
        let mut conn = GhostConnection::new(Uuid::new_v4());
        conn.update_scope(&handles);
        conn.write_packet(&ships, &items, 0);
        let freed = conn.ghost_index(handles[0]).expect("index");

        conn.update_scope(&handles[1..]);
        let read = read_packet(&conn.write_packet(&ships, &items, 0).bytes).expect("packet");
        assert_eq!(read.removals, vec![freed]);

        // A new arrival reuses it
        let (_, more) = world_with(3);
        assert_eq!(conn.add_to_scope(more[2]), Some(freed));
    }

    #[test]
    fn test_unannounced_ghost_leaves_quietly() {
        let (_, handles) = world_with(1);
        let mut conn = GhostConnection::new(Uuid::new_v4());
        conn.add_to_scope(handles[0]);
        assert!(conn.remove_from_scope(handles[0]));
        assert!(!conn.remove_from_scope(handles[0]));
        let packet = conn.write_packet(&Registry::new(), &Registry::new(), 0);
        assert_eq!(packet.removals, 0);
    }

    #[test]
    fn test_controller_gets_control_state_and_ack() {
        let (mut ships, handles) = world_with(1);
        let items = Registry::new();
        if let Some(ship) = ships.get_mut(handles[0]) {
            ship.energy = 12_345;
            ship.fire_timer = -20;
        }
        let mut conn = GhostConnection::new(Uuid::new_v4());
        conn.control = Some(handles[0]);
        conn.last_move_seq = Some(77);
        conn.add_to_scope(handles[0]);
        conn.write_packet(&ships, &items, 0);

        conn.mark(handles[0], ChangeMask::POSITION | ChangeMask::HEALTH);
        let read = read_packet(&conn.write_packet(&ships, &items, 0).bytes).expect("packet");
        let (index, state) = read.control.expect("control");
        assert_eq!(index, 0);
        assert_eq!(state.energy, 12_345);
        assert_eq!(state.fire_timer, -20);
        assert_eq!(read.ack, Some(77));
        // The controller already knows where it is
        assert!(read.updates[0].2.position.is_none());
    }

    #[test]
    fn test_initial_update_lists_mounts() {
        let (mut ships, handles) = world_with(1);
        let mut items = Registry::new();
        let mut flag = Item::new(ItemKind::Flag, Vec2::ZERO);
        flag.mount = Some(handles[0]);
        let item = items.insert(flag);
        if let Some(ship) = ships.get_mut(handles[0]) {
            ship.mount_item(item);
        }

        let mut conn = GhostConnection::new(Uuid::new_v4());
        conn.add_to_scope(handles[0]);
        let read = read_packet(&conn.write_packet(&ships, &items, 0).bytes).expect("packet");
        assert_eq!(read.updates[0].2.mounts, Some(vec![0]));

        items.remove(item);
        conn.prune_items(&items);
        assert!(conn.item_indices.is_empty());
    }

    #[test]
    fn test_index_pool_exhaustion() {
        let mut pool = IndexPool::default();
        for expected in 0..MAX_GHOST_COUNT {
            assert_eq!(pool.allocate(), Some(expected));
        }
        assert_eq!(pool.allocate(), None);
        pool.release(5);
        assert_eq!(pool.allocate(), Some(5));
    }
}
