// Command queue: bounded FIFO between producers and the scheduler
//
// Producers (light front-end, command surface) push from any thread; the
// polling loop pops one entry per duty cycle. A full queue drops the newest
// command and never evicts older ones.

use parking_lot::Mutex;
use std::collections::VecDeque;
use std::sync::atomic::{AtomicUsize, Ordering};
use thiserror::Error;
use tracing::{trace, warn};

pub const DEFAULT_MAX_QUEUE_SIZE: usize = 100;

/// Start attempts an entry gets before it is dropped
pub const MAX_RETRIES: u8 = 3;

#[derive(Error, Debug, Clone, PartialEq, Eq)]
pub enum QueueError {
    #[error("Command queue full ({capacity} entries), dropped command for light {light_id}")]
    Full { capacity: usize, light_id: u16 },
}

/// A framed command waiting for the radio
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct QueueEntry {
    pub light_id: u16,
    /// Framed bytes, ready to embed in an advertisement
    pub data: Vec<u8>,
    /// Clock time of enqueue (ms)
    pub enqueued_at: u64,
    /// Failed start attempts so far
    pub retries: u8,
}

pub struct CommandQueue {
    entries: Mutex<VecDeque<QueueEntry>>,
    capacity: AtomicUsize,
}

impl CommandQueue {
    pub fn new(capacity: usize) -> Self {
        Self {
            entries: Mutex::new(VecDeque::new()),
            capacity: AtomicUsize::new(capacity),
        }
    }

    pub fn capacity(&self) -> usize {
        self.capacity.load(Ordering::Relaxed)
    }

    /// Change the bound. Entries already queued beyond it are kept.
    pub fn set_capacity(&self, capacity: usize) {
        self.capacity.store(capacity, Ordering::Relaxed);
    }

    pub fn enqueue(&self, light_id: u16, data: Vec<u8>, now: u64) -> Result<(), QueueError> {
        let capacity = self.capacity();
        let mut entries = self.entries.lock();

        if entries.len() >= capacity {
            warn!(
                "Command queue full (size={}), dropping command for light {}",
                entries.len(),
                light_id
            );
            return Err(QueueError::Full { capacity, light_id });
        }

        entries.push_back(QueueEntry {
            light_id,
            data,
            enqueued_at: now,
            retries: 0,
        });
        trace!("Command queued, queue size: {}", entries.len());
        Ok(())
    }

    pub fn dequeue(&self) -> Option<QueueEntry> {
        self.entries.lock().pop_front()
    }

    /// Put an entry whose transmission failed back at the head of the queue.
    /// Returns false once it has used up [`MAX_RETRIES`] and was dropped.
    pub fn retry(&self, mut entry: QueueEntry) -> bool {
        entry.retries += 1;
        if entry.retries >= MAX_RETRIES {
            warn!(
                "Dropping command for light {} after {} failed attempts",
                entry.light_id, entry.retries
            );
            return false;
        }
        self.entries.lock().push_front(entry);
        true
    }

    /// Discard everything pending; returns how many entries were dropped
    pub fn clear(&self) -> usize {
        let drained = std::mem::take(&mut *self.entries.lock());
        drained.len()
    }

    pub fn len(&self) -> usize {
        self.entries.lock().len()
    }

    pub fn is_empty(&self) -> bool {
        self.entries.lock().is_empty()
    }
}

impl Default for CommandQueue {
    fn default() -> Self {
        Self::new(DEFAULT_MAX_QUEUE_SIZE)
    }
}
