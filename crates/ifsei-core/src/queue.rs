// ── Command queue ──
//
// Unbounded FIFO between the entity facade and the dispatcher. Producers
// never block; the single consumer parks until a command is available.

use std::collections::VecDeque;
use std::sync::{Mutex, PoisonError};

use ifsei_api::Command;
use tokio::sync::Notify;
use tokio::time::Instant;

/// A command waiting for the wire, stamped with when it was submitted.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct QueuedCommand {
    pub command: Command,
    pub enqueued_at: Instant,
}

/// Ordered buffer of outgoing commands.
///
/// Strict FIFO: commands leave in submission order, except that a command
/// whose dispatch failed goes back to the front so it is retried first.
#[derive(Debug, Default)]
pub struct CommandQueue {
    items: Mutex<VecDeque<QueuedCommand>>,
    available: Notify,
}

impl CommandQueue {
    pub fn new() -> Self {
        Self::default()
    }

    /// Append a command. Never blocks and never rejects.
    pub fn submit(&self, command: Command) {
        let queued = QueuedCommand {
            command,
            enqueued_at: Instant::now(),
        };
        self.lock().push_back(queued);
        self.available.notify_one();
    }

    /// Put a command back at the head of the queue.
    pub fn requeue_front(&self, queued: QueuedCommand) {
        self.lock().push_front(queued);
        self.available.notify_one();
    }

    /// Take the oldest command, waiting for one if the queue is empty.
    ///
    /// Meant for a single consumer.
    pub async fn next(&self) -> QueuedCommand {
        loop {
            if let Some(queued) = self.try_next() {
                return queued;
            }
            self.available.notified().await;
        }
    }

    pub fn try_next(&self) -> Option<QueuedCommand> {
        self.lock().pop_front()
    }

    pub fn len(&self) -> usize {
        self.lock().len()
    }

    pub fn is_empty(&self) -> bool {
        self.lock().is_empty()
    }

    fn lock(&self) -> std::sync::MutexGuard<'_, VecDeque<QueuedCommand>> {
        // The critical sections cannot panic, so a poisoned lock still
        // holds a consistent queue.
        self.items.lock().unwrap_or_else(PoisonError::into_inner)
    }
}
