use crossbeam_channel::{bounded, unbounded, Receiver, Sender, TrySendError};
use serde::{Deserialize, Serialize};
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::Arc;
use std::time::Duration;

/// What a full queue does with a new item.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "kebab-case")]
pub enum BackpressurePolicy {
    /// Evict the oldest queued item and count the loss.
    #[default]
    DropOldest,
    /// Block the producer until the consumer makes room.
    Block,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct QueueConfig {
    /// `None` builds an unbounded queue.
    pub capacity: Option<usize>,
    pub policy: BackpressurePolicy,
}

impl Default for QueueConfig {
    fn default() -> Self {
        Self {
            capacity: Some(1024),
            policy: BackpressurePolicy::DropOldest,
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum PushOutcome {
    Enqueued,
    /// The item was queued after evicting the oldest one.
    DroppedOldest,
    Closed,
}

/// FIFO handoff between one producer and one consumer thread.
///
/// Handles are cheap clones of the same queue; push and pop need no external
/// locking.
pub struct HandoffQueue<T> {
    tx: Sender<T>,
    rx: Receiver<T>,
    policy: BackpressurePolicy,
    dropped: Arc<AtomicU64>,
}

impl<T> Clone for HandoffQueue<T> {
    fn clone(&self) -> Self {
        Self {
            tx: self.tx.clone(),
            rx: self.rx.clone(),
            policy: self.policy,
            dropped: Arc::clone(&self.dropped),
        }
    }
}

impl<T> HandoffQueue<T> {
    pub fn new(config: QueueConfig) -> Self {
        let (tx, rx) = match config.capacity {
            Some(capacity) => bounded(capacity.max(1)),
            None => unbounded(),
        };
        Self {
            tx,
            rx,
            policy: config.policy,
            dropped: Arc::new(AtomicU64::new(0)),
        }
    }

    pub fn unbounded() -> Self {
        Self::new(QueueConfig {
            capacity: None,
            policy: BackpressurePolicy::Block,
        })
    }

    pub fn push(&self, item: T) -> PushOutcome {
        match self.policy {
            BackpressurePolicy::Block => match self.tx.send(item) {
                Ok(()) => PushOutcome::Enqueued,
                Err(_) => PushOutcome::Closed,
            },
            BackpressurePolicy::DropOldest => {
                let mut item = item;
                let mut evicted = false;
                loop {
                    match self.tx.try_send(item) {
                        Ok(()) if evicted => return PushOutcome::DroppedOldest,
                        Ok(()) => return PushOutcome::Enqueued,
                        Err(TrySendError::Full(back)) => {
                            item = back;
                            if self.rx.try_recv().is_ok() {
                                self.dropped.fetch_add(1, Ordering::Relaxed);
                                evicted = true;
                            }
                        }
                        Err(TrySendError::Disconnected(_)) => return PushOutcome::Closed,
                    }
                }
            }
        }
    }

    /// Waits up to `timeout` for the next item.
    pub fn pop_timeout(&self, timeout: Duration) -> Option<T> {
        self.rx.recv_timeout(timeout).ok()
    }

    pub fn try_pop(&self) -> Option<T> {
        self.rx.try_recv().ok()
    }

    pub fn len(&self) -> usize {
        self.rx.len()
    }

    pub fn is_empty(&self) -> bool {
        self.rx.is_empty()
    }

    pub fn capacity(&self) -> Option<usize> {
        self.tx.capacity()
    }

    /// Items evicted under [`BackpressurePolicy::DropOldest`].
    pub fn dropped(&self) -> u64 {
        self.dropped.load(Ordering::Relaxed)
    }
}
