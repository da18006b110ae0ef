//! Client-side replica of the server's ships
//!
//! Holds one decoded [`Ship`] per ghost index, predicts the controlled ship
//! from local moves and reconciles it whenever a control state arrives.

use std::collections::VecDeque;
use std::sync::Arc;

use rustc_hash::FxHashMap;
use tracing::{debug, trace};

use crate::game::effects::Effects;
use crate::game::input_buffer::MoveMessage;
use crate::game::moves::MoveRecord;
use crate::game::prediction::{self, Reconcile};
use crate::game::rules::{GameRules, OpenRules};
use crate::game::ship::{IdlePath, Ship, TickContext};
use crate::game::spatial::ZoneMap;
use crate::net::bitstream::BitStreamError;
use crate::net::ghost::{read_packet, ConnectionId};

/// A decoded ship plus what only the client tracks about it
#[derive(Debug)]
pub struct GhostShip {
    pub ship: Ship,
    /// Connection-local indices of mounted items
    pub mounts: Vec<u32>,
}

/// Counters for one replica
#[derive(Debug, Default, Clone, Copy)]
pub struct ReplicaStats {
    pub packets: u64,
    pub updates: u64,
    pub reconciliations: u64,
    pub warps: u64,
    pub interpolations: u64,
    pub replayed_moves: u64,
}

/// What one packet did
#[derive(Debug, Default, Clone, Copy)]
pub struct PacketSummary {
    pub updates: usize,
    pub removals: usize,
    pub reconcile: Option<Reconcile>,
}

pub struct ClientReplica {
    pub connection: ConnectionId,
    ghosts: FxHashMap<u32, GhostShip>,
    control_index: Option<u32>,
    /// Moves sent but not yet acknowledged, oldest first
    pending: VecDeque<(u32, MoveRecord)>,
    next_seq: u32,
    zones: ZoneMap,
    rules: Box<dyn GameRules>,
    effects: Arc<dyn Effects>,
    /// Estimated server-to-client delay used to lead observed ships
    pub one_way_ms: u32,
    lost_contact_ms: u64,
    last_packet_ms: u64,
    stats: ReplicaStats,
}

impl ClientReplica {
    pub fn new(connection: ConnectionId, zones: ZoneMap, effects: Arc<dyn Effects>) -> Self {
        Self {
            connection,
            ghosts: FxHashMap::default(),
            control_index: None,
            pending: VecDeque::new(),
            next_seq: 0,
            zones,
            rules: Box::new(OpenRules::default()),
            effects,
            one_way_ms: 0,
            lost_contact_ms: u64::MAX,
            last_packet_ms: 0,
            stats: ReplicaStats::default(),
        }
    }

    /// Freeze moving ships once the server has been silent this long
    pub fn with_lost_contact_after(mut self, ms: u64) -> Self {
        self.lost_contact_ms = ms;
        self
    }

    #[inline]
    pub fn stats(&self) -> ReplicaStats {
        self.stats
    }

    pub fn ghost(&self, index: u32) -> Option<&GhostShip> {
        self.ghosts.get(&index)
    }

    #[inline]
    pub fn ghost_count(&self) -> usize {
        self.ghosts.len()
    }

    pub fn ghosts(&self) -> impl Iterator<Item = (u32, &GhostShip)> {
        self.ghosts.iter().map(|(&i, g)| (i, g))
    }

    pub fn controlled_ship(&self) -> Option<&Ship> {
        self.control_index
            .and_then(|i| self.ghosts.get(&i))
            .map(|g| &g.ship)
    }

    #[inline]
    pub fn pending_moves(&self) -> usize {
        self.pending.len()
    }

    pub fn has_lost_contact(&self, now_ms: u64) -> bool {
        now_ms.saturating_sub(self.last_packet_ms) > self.lost_contact_ms
    }

    /// Record a local move, predict it at once, and return it for sending
    pub fn make_move(&mut self, mut mv: MoveRecord, now_ms: u64) -> MoveMessage {
        mv.prepare();
        let seq = self.next_seq;
        self.next_seq = self.next_seq.wrapping_add(1);
        self.pending.push_back((seq, mv));

        let lost_contact = self.has_lost_contact(now_ms);
        if let Some(ghost) = self.control_index.and_then(|i| self.ghosts.get_mut(&i)) {
            let ctx = TickContext {
                now_ms,
                world: &self.zones,
                rules: self.rules.as_ref(),
                effects: self.effects.as_ref(),
                lost_contact,
            };
            ghost.ship.set_current_move(mv);
            ghost.ship.idle(IdlePath::ClientControlMain, &ctx);
        }

        MoveMessage {
            connection: self.connection,
            seq,
            mv,
        }
    }

    /// Advance every observed ship by one local frame
    pub fn tick(&mut self, time_ms: u32, now_ms: u64) {
        let ctx = TickContext {
            now_ms,
            world: &self.zones,
            rules: self.rules.as_ref(),
            effects: self.effects.as_ref(),
            lost_contact: self.has_lost_contact(now_ms),
        };
        if ctx.lost_contact {
            trace!(connection = %self.connection, "Lost contact, holding ships");
        }
        for (&index, ghost) in self.ghosts.iter_mut() {
            if Some(index) == self.control_index {
                continue;
            }
            ghost.ship.current_move.time = time_ms;
            ghost.ship.idle(IdlePath::ClientMainRemote, &ctx);
        }
    }

    /// Decode and apply one server packet.
    ///
    /// Removals go first so an index freed and reused within the same packet
    /// lands on a fresh ghost.
    pub fn handle_packet(&mut self, bytes: &[u8], now_ms: u64) -> Result<PacketSummary, BitStreamError> {
        let packet = read_packet(bytes)?;
        self.last_packet_ms = now_ms;
        self.stats.packets += 1;

        let mut summary = PacketSummary {
            updates: packet.updates.len(),
            removals: packet.removals.len(),
            reconcile: None,
        };

        for index in &packet.removals {
            if self.ghosts.remove(index).is_some() {
                debug!(connection = %self.connection, index, "Ghost removed");
            }
            if self.control_index == Some(*index) {
                self.control_index = None;
            }
        }

        let ctx = TickContext {
            now_ms,
            world: &self.zones,
            rules: self.rules.as_ref(),
            effects: self.effects.as_ref(),
            lost_contact: false,
        };

        for (index, is_initial, update) in &packet.updates {
            let ghost = if *is_initial {
                self.ghosts.insert(
                    *index,
                    GhostShip {
                        ship: Ship::ghost(),
                        mounts: Vec::new(),
                    },
                );
                self.ghosts.get_mut(index)
            } else {
                self.ghosts.get_mut(index)
            };
            let Some(ghost) = ghost else {
                continue;
            };

            if let Some(mounts) = &update.mounts {
                ghost.mounts.clone_from(mounts);
            }
            let applied = prediction::apply_update(&mut ghost.ship, update, &ctx, self.one_way_ms, *is_initial);
            self.stats.updates += 1;
            if applied.warped {
                self.stats.warps += 1;
            } else if applied.position_changed {
                self.stats.interpolations += 1;
            }
        }

        if let Some((index, state)) = packet.control {
            self.control_index = Some(index);
            if let Some(ack) = packet.ack {
                while self.pending.front().is_some_and(|(seq, _)| !seq_after(*seq, ack)) {
                    self.pending.pop_front();
                }
            }

            if let Some(ghost) = self.ghosts.get_mut(&index) {
                let ship = &mut ghost.ship;
                ship.controlled = true;
                prediction::apply_control_state(ship, &state);

                for (_, mv) in &self.pending {
                    ship.set_current_move(*mv);
                    ship.idle(IdlePath::ClientControlReplay, &ctx);
                }
                self.stats.replayed_moves += self.pending.len() as u64;

                let reconcile = prediction::control_move_replay_complete(ship);
                self.stats.reconciliations += 1;
                if reconcile.is_interpolating() {
                    self.stats.interpolations += 1;
                }
                summary.reconcile = Some(reconcile);
            }
        }

        Ok(summary)
    }
}

/// `a` comes after `b` in wrapping sequence order
#[inline]
fn seq_after(a: u32, b: u32) -> bool {
    (a.wrapping_sub(b) as i32) > 0
}
