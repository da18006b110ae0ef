//! Lock-free queue of inbound moves
//!
//! Connection handlers push moves as they arrive; the simulation drains the
//! queue at the start of each tick so ship state is only ever touched from
//! the tick itself.

use crossbeam_channel::{bounded, Receiver, Sender, TrySendError};

use crate::game::constants::net::INPUT_BUFFER_SIZE;
use crate::game::moves::MoveRecord;
use crate::net::ghost::ConnectionId;

/// One move from a controlling connection
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct MoveMessage {
    pub connection: ConnectionId,
    /// Client-side sequence number, acknowledged in the control state
    pub seq: u32,
    pub mv: MoveRecord,
}

/// Input buffer errors
#[derive(Debug, Clone, Copy, PartialEq, Eq, thiserror::Error)]
pub enum InputBufferError {
    /// Buffer is full (backpressure)
    #[error("Input buffer full")]
    Full,
    /// The simulation is gone
    #[error("Input buffer disconnected")]
    Disconnected,
}

/// Bounded MPSC queue between connections and the tick
pub struct InputBuffer {
    sender: Sender<MoveMessage>,
    receiver: Receiver<MoveMessage>,
    capacity: usize,
}

impl InputBuffer {
    /// Capacity should cover every move that can arrive between two ticks
    pub fn new(capacity: usize) -> Self {
        let (sender, receiver) = bounded(capacity);
        Self {
            sender,
            receiver,
            capacity,
        }
    }

    /// Handle for one connection
    pub fn sender(&self) -> InputSender {
        InputSender {
            sender: self.sender.clone(),
        }
    }

    #[inline]
    pub fn try_submit(&self, message: MoveMessage) -> Result<(), InputBufferError> {
        send(&self.sender, message)
    }

    /// Everything queued since the last tick, in arrival order
    pub fn drain(&self) -> Vec<MoveMessage> {
        self.receiver.try_iter().collect()
    }

    #[inline]
    pub fn pending_count(&self) -> usize {
        self.receiver.len()
    }

    #[inline]
    pub fn is_empty(&self) -> bool {
        self.receiver.is_empty()
    }

    #[inline]
    pub fn capacity(&self) -> usize {
        self.capacity
    }
}

impl Default for InputBuffer {
    fn default() -> Self {
        Self::new(INPUT_BUFFER_SIZE)
    }
}

/// Clonable sender handle for connection handlers
#[derive(Clone)]
pub struct InputSender {
    sender: Sender<MoveMessage>,
}

impl InputSender {
    /// Submit a move without blocking
    #[inline]
    pub fn try_send(&self, message: MoveMessage) -> Result<(), InputBufferError> {
        send(&self.sender, message)
    }
}

fn send(sender: &Sender<MoveMessage>, message: MoveMessage) -> Result<(), InputBufferError> {
    sender.try_send(message).map_err(|e| match e {
        TrySendError::Full(_) => InputBufferError::Full,
        TrySendError::Disconnected(_) => InputBufferError::Disconnected,
    })
}

#[cfg(test)]
mod tests {
    use super::*;
    use uuid::Uuid;

    fn message(connection: ConnectionId, seq: u32) -> MoveMessage {
        MoveMessage {
            connection,
            seq,
            mv: MoveRecord::new(1.0, 0.0, 0.0, 33),
        }
    }

    #[test]
    fn test_input_buffer_submit_and_drain() {
        let buffer = InputBuffer::new(10);
        let connection = Uuid::new_v4();

        for seq in 1..=3 {
            assert!(buffer.try_submit(message(connection, seq)).is_ok());
        }
        assert_eq!(buffer.pending_count(), 3);

        let moves = buffer.drain();
        let seqs: Vec<u32> = moves.iter().map(|m| m.seq).collect();
        assert_eq!(seqs, vec![1, 2, 3]);
        assert!(buffer.is_empty());
    }

    #[test]
    fn test_input_buffer_backpressure() {
        let buffer = InputBuffer::new(2);
        let connection = Uuid::new_v4();

        assert!(buffer.try_submit(message(connection, 1)).is_ok());
        assert!(buffer.try_submit(message(connection, 2)).is_ok());
        assert_eq!(buffer.try_submit(message(connection, 3)), Err(InputBufferError::Full));

        buffer.drain();
        assert!(buffer.try_submit(message(connection, 3)).is_ok());
    }

    #[test]
    fn test_input_sender_clone() {
        let buffer = InputBuffer::new(10);
        let a = Uuid::new_v4();
        let b = Uuid::new_v4();

        let sender1 = buffer.sender();
        let sender2 = sender1.clone();
        assert!(sender1.try_send(message(a, 1)).is_ok());
        assert!(sender2.try_send(message(b, 1)).is_ok());

        let moves = buffer.drain();
        assert_eq!(moves[0].connection, a);
        assert_eq!(moves[1].connection, b);
    }

    #[test]
    fn test_sender_outliving_buffer() {
        let buffer = InputBuffer::new(4);
        let sender = buffer.sender();
        drop(buffer);
        assert_eq!(
            sender.try_send(message(Uuid::new_v4(), 1)),
            Err(InputBufferError::Disconnected)
        );
    }

    #[test]
    fn test_input_buffer_default() {
        assert_eq!(InputBuffer::default().capacity(), INPUT_BUFFER_SIZE);
    }
}
