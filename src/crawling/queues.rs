//! # Queue Management System
//!
//! Bounded hand-off buffers between pipeline stages. A queue is closed by
//! exactly one owner; items buffered before closure are still delivered.
//!
//! Lifecycle: `Running` -> `Draining` (closed to producers, may still hold
//! items) -> `Closed` (a consumer observed it empty).

use serde::{Deserialize, Serialize};
use std::sync::atomic::{AtomicU8, AtomicU64, AtomicUsize, Ordering};
use std::sync::{Mutex, PoisonError};
use thiserror::Error;
use tokio::sync::{Mutex as AsyncMutex, mpsc};
use tracing::debug;

/// Queue related errors
#[derive(Error, Debug, Clone, Copy, PartialEq, Eq)]
pub enum QueueError {
    #[error("Queue is full")]
    Full,

    #[error("Queue is closed")]
    Closed,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum QueueState {
    Running,
    Draining,
    Closed,
}

impl QueueState {
    const fn as_u8(self) -> u8 {
        match self {
            Self::Running => 0,
            Self::Draining => 1,
            Self::Closed => 2,
        }
    }

    const fn from_u8(value: u8) -> Self {
        match value {
            0 => Self::Running,
            1 => Self::Draining,
            _ => Self::Closed,
        }
    }
}

/// Counters for one queue
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct QueueMetrics {
    pub enqueued: u64,
    pub dequeued: u64,
    pub rejected: u64,
}

/// Bounded multi-producer, multi-consumer queue
pub struct BoundedQueue<T> {
    name: &'static str,
    capacity: usize,
    sender: Mutex<Option<mpsc::Sender<T>>>,
    receiver: AsyncMutex<mpsc::Receiver<T>>,
    state: AtomicU8,
    len: AtomicUsize,
    enqueued: AtomicU64,
    dequeued: AtomicU64,
    rejected: AtomicU64,
}

impl<T: Send> BoundedQueue<T> {
    /// Creates a queue holding at most `capacity` items (at least one)
    #[must_use]
    pub fn new(name: &'static str, capacity: usize) -> Self {
        let capacity = capacity.max(1);
        let (sender, receiver) = mpsc::channel(capacity);

        Self {
            name,
            capacity,
            sender: Mutex::new(Some(sender)),
            receiver: AsyncMutex::new(receiver),
            state: AtomicU8::new(QueueState::Running.as_u8()),
            len: AtomicUsize::new(0),
            enqueued: AtomicU64::new(0),
            dequeued: AtomicU64::new(0),
            rejected: AtomicU64::new(0),
        }
    }

    fn current_sender(&self) -> Option<mpsc::Sender<T>> {
        self.sender
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .as_ref()
            .cloned()
    }

    // Counted once a buffer slot is held and before the item becomes visible,
    // so a racing consumer never sees a negative length and waiting
    // producers are never counted
    fn reserve_slot(&self) {
        self.len.fetch_add(1, Ordering::SeqCst);
    }

    fn release_slot(&self) {
        self.len.fetch_sub(1, Ordering::SeqCst);
    }

    /// Insert without waiting; a full queue rejects the item
    pub fn try_enqueue(&self, item: T) -> Result<(), QueueError> {
        let guard = self.sender.lock().unwrap_or_else(PoisonError::into_inner);
        let Some(sender) = guard.as_ref() else {
            return Err(QueueError::Closed);
        };

        match sender.try_reserve() {
            Ok(permit) => {
                self.reserve_slot();
                permit.send(item);
                self.enqueued.fetch_add(1, Ordering::Relaxed);
                Ok(())
            }
            Err(mpsc::error::TrySendError::Full(())) => {
                self.rejected.fetch_add(1, Ordering::Relaxed);
                Err(QueueError::Full)
            }
            Err(mpsc::error::TrySendError::Closed(())) => Err(QueueError::Closed),
        }
    }

    /// Insert, waiting for free space
    pub async fn enqueue(&self, item: T) -> Result<(), QueueError> {
        let sender = self.current_sender().ok_or(QueueError::Closed)?;
        let permit = sender.reserve().await.map_err(|_| QueueError::Closed)?;
        self.reserve_slot();
        permit.send(item);
        self.enqueued.fetch_add(1, Ordering::Relaxed);
        Ok(())
    }

    /// Take the next item, waiting while the queue is open and empty.
    /// `None` means the queue is closed and fully drained.
    pub async fn dequeue(&self) -> Option<T> {
        let mut receiver = self.receiver.lock().await;
        match receiver.recv().await {
            Some(item) => {
                self.release_slot();
                self.dequeued.fetch_add(1, Ordering::Relaxed);
                Some(item)
            }
            None => {
                if self.state.swap(QueueState::Closed.as_u8(), Ordering::SeqCst)
                    != QueueState::Closed.as_u8()
                {
                    debug!("Queue '{}' drained and closed", self.name);
                }
                None
            }
        }
    }

    /// Stop accepting items. Idempotent; returns `true` on the first call.
    pub fn close(&self) -> bool {
        let sender = self
            .sender
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .take();

        if sender.is_none() {
            return false;
        }
        let _ = self.state.compare_exchange(
            QueueState::Running.as_u8(),
            QueueState::Draining.as_u8(),
            Ordering::SeqCst,
            Ordering::SeqCst,
        );
        debug!("Queue '{}' closed to producers ({} buffered)", self.name, self.len());
        true
    }

    pub fn state(&self) -> QueueState {
        QueueState::from_u8(self.state.load(Ordering::SeqCst))
    }

    pub fn is_closed(&self) -> bool {
        self.state() != QueueState::Running
    }

    /// Items currently buffered; producers still waiting for space are not counted
    pub fn len(&self) -> usize {
        self.len.load(Ordering::SeqCst)
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }

    pub fn capacity(&self) -> usize {
        self.capacity
    }

    pub fn name(&self) -> &'static str {
        self.name
    }

    pub fn metrics(&self) -> QueueMetrics {
        QueueMetrics {
            enqueued: self.enqueued.load(Ordering::Relaxed),
            dequeued: self.dequeued.load(Ordering::Relaxed),
            rejected: self.rejected.load(Ordering::Relaxed),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::collections::HashSet;
    use std::sync::Arc;
    use std::time::Duration;

    #[tokio::test]
    async fn test_try_enqueue_rejects_when_full() {
        let queue = BoundedQueue::new("items", 2);
        assert_eq!(queue.try_enqueue(1), Ok(()));
        assert_eq!(queue.try_enqueue(2), Ok(()));
        assert_eq!(queue.try_enqueue(3), Err(QueueError::Full));
        assert_eq!(queue.len(), 2);
        assert_eq!(queue.metrics().rejected, 1);
    }

    #[tokio::test]
    async fn test_buffered_items_survive_close() {
        let queue = BoundedQueue::new("items", 4);
        queue.try_enqueue("a").unwrap();
        queue.try_enqueue("b").unwrap();

        assert!(queue.close());
        assert_eq!(queue.state(), QueueState::Draining);
        assert_eq!(queue.try_enqueue("c"), Err(QueueError::Closed));
        assert_eq!(queue.enqueue("d").await, Err(QueueError::Closed));

        assert_eq!(queue.dequeue().await, Some("a"));
        assert_eq!(queue.dequeue().await, Some("b"));
        assert_eq!(queue.state(), QueueState::Draining);
        assert_eq!(queue.dequeue().await, None);
        assert_eq!(queue.state(), QueueState::Closed);
        assert_eq!(queue.dequeue().await, None);
    }

    #[tokio::test]
    async fn test_close_is_idempotent() {
        let queue: BoundedQueue<u32> = BoundedQueue::new("items", 1);
        assert!(queue.close());
        assert!(!queue.close());
        assert!(queue.is_closed());
    }

    #[tokio::test]
    async fn test_blocking_enqueue_waits_for_space() {
        let queue = Arc::new(BoundedQueue::new("results", 1));
        queue.enqueue(1).await.unwrap();

        let producer = {
            let queue = Arc::clone(&queue);
            tokio::spawn(async move { queue.enqueue(2).await })
        };
        tokio::time::sleep(Duration::from_millis(20)).await;
        assert!(!producer.is_finished());

        assert_eq!(queue.dequeue().await, Some(1));
        producer.await.unwrap().unwrap();
        assert_eq!(queue.dequeue().await, Some(2));
    }

    #[tokio::test]
    async fn test_waiting_producers_are_not_counted_in_len() {
        let queue = Arc::new(BoundedQueue::new("results", 1));
        queue.enqueue(0).await.unwrap();

        let producers: Vec<_> = (1..=3)
            .map(|i| {
                let queue = Arc::clone(&queue);
                tokio::spawn(async move { queue.enqueue(i).await })
            })
            .collect();
        tokio::time::sleep(Duration::from_millis(20)).await;
        assert!(producers.iter().all(|p| !p.is_finished()));
        assert_eq!(queue.len(), 1);

        let mut seen = Vec::new();
        for _ in 0..4 {
            seen.push(queue.dequeue().await.unwrap());
            assert!(queue.len() <= queue.capacity());
        }
        for producer in producers {
            producer.await.unwrap().unwrap();
        }
        seen.sort_unstable();
        assert_eq!(seen, vec![0, 1, 2, 3]);
        assert!(queue.is_empty());
        assert_eq!(queue.metrics().enqueued, 4);
    }

    #[tokio::test(flavor = "multi_thread", worker_threads = 4)]
    async fn test_each_item_delivered_to_exactly_one_consumer() {
        let queue = Arc::new(BoundedQueue::new("items", 1000));
        for i in 0..500 {
            queue.try_enqueue(i).unwrap();
        }
        queue.close();

        let consumers: Vec<_> = (0..8)
            .map(|_| {
                let queue = Arc::clone(&queue);
                tokio::spawn(async move {
                    let mut seen = Vec::new();
                    while let Some(item) = queue.dequeue().await {
                        seen.push(item);
                    }
                    seen
                })
            })
            .collect();

        let mut all = Vec::new();
        for consumer in futures::future::join_all(consumers).await {
            all.extend(consumer.unwrap());
        }
        let unique: HashSet<_> = all.iter().copied().collect();
        assert_eq!(all.len(), 500);
        assert_eq!(unique.len(), 500);
        assert_eq!(queue.metrics().dequeued, 500);
        assert_eq!(queue.state(), QueueState::Closed);
    }
}
