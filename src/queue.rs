//! The bounded event queue carrying control-plane [`Event`](crate::event::Event)s
//! from the network front-end to the supervisor.
//!
//! Strict FIFO, a fixed capacity, a non-blocking `push` that reports
//! `full` rather than dropping silently, and a blocking `pop` with a
//! single consumer, implemented atop `crossbeam_channel::bounded`.

use crate::event::Event;
use crossbeam_channel::{Receiver, RecvError, Sender, TrySendError};

/// Outcome of a non-blocking [`EventQueue::push`].
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum PushOutcome {
    Ok,
    Full,
}

/// A bounded, multi-producer, single-consumer event queue.
///
/// Clone the handle to give each front-end connection its own producer
/// side; all clones share the same underlying bounded channel.
#[derive(Clone)]
pub struct EventQueue {
    tx: Sender<Event>,
    rx: Receiver<Event>,
}

impl EventQueue {
    pub fn new(capacity: usize) -> Self {
        let (tx, rx) = crossbeam_channel::bounded(capacity);
        Self { tx, rx }
    }

    /// Pushes an event without blocking. Returns [`PushOutcome::Full`]
    /// when the queue is at capacity instead of dropping the event — the
    /// caller (the `net` front-end) turns that into `ERR System Busy`.
    pub fn push(&self, event: Event) -> PushOutcome {
        match self.tx.try_send(event) {
            Ok(()) => PushOutcome::Ok,
            Err(TrySendError::Full(_)) => PushOutcome::Full,
            Err(TrySendError::Disconnected(_)) => PushOutcome::Full,
        }
    }

    /// Blocks until an event is available. Returns `Err` only once every
    /// producer handle (including the supervisor's own, if it holds one)
    /// has been dropped — in practice this only happens during shutdown
    /// teardown after the supervisor has already stopped consuming.
    pub fn pop(&self) -> Result<Event, RecvError> {
        self.rx.recv()
    }

    pub fn len(&self) -> usize {
        self.tx.len()
    }

    pub fn is_empty(&self) -> bool {
        self.tx.is_empty()
    }

    pub fn capacity(&self) -> Option<usize> {
        self.tx.capacity()
    }
}
