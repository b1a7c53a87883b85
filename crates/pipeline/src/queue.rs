//! Bounded media frame queue
//!
//! Decouples the websocket receive loop from the pacer. There is exactly one
//! producer and one consumer per call; neither handle is `Clone`. Frames come
//! out in the order they went in.
//!
//! Closing is the stream-end signal: after `close()` the consumer keeps
//! receiving buffered frames and only sees [`Dequeued::Closed`] once the
//! queue is empty.

use std::collections::VecDeque;
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::Arc;
use std::time::Duration;

use call_bridge_config::OverflowPolicy;
use call_bridge_core::MediaFrame;
use parking_lot::Mutex;
use tokio::sync::Notify;
use tokio::time::Instant;

/// Result of a dequeue attempt
#[derive(Debug)]
pub enum Dequeued {
    /// Next frame in arrival order
    Frame(MediaFrame),
    /// No frame arrived within the timeout
    Empty,
    /// Queue closed and fully drained
    Closed,
}

/// Enqueue failure; the frame is handed back
#[derive(Debug)]
pub enum EnqueueError {
    /// Still full after the wait bound
    Full(MediaFrame),
    /// Queue was closed
    Closed(MediaFrame),
}

impl EnqueueError {
    pub fn into_frame(self) -> MediaFrame {
        match self {
            EnqueueError::Full(frame) | EnqueueError::Closed(frame) => frame,
        }
    }
}

/// Outcome of [`FrameProducer::enqueue_with_policy`]
#[derive(Debug)]
pub enum Enqueued {
    /// Frame buffered without loss
    Accepted,
    /// Frame buffered after evicting the oldest buffered frame
    EvictedOldest(MediaFrame),
    /// Incoming frame discarded
    DroppedNewest(MediaFrame),
}

/// Queue counters
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct QueueStats {
    pub enqueued: u64,
    pub dequeued: u64,
    pub dropped: u64,
    pub buffered: usize,
}

struct Inner {
    frames: VecDeque<MediaFrame>,
    closed: bool,
}

struct Shared {
    inner: Mutex<Inner>,
    capacity: usize,
    /// Signalled when a frame is pushed or the queue closes
    items: Notify,
    /// Signalled when a frame is popped or the queue closes
    space: Notify,
    enqueued: AtomicU64,
    dequeued: AtomicU64,
    dropped: AtomicU64,
}

impl Shared {
    fn close(&self) {
        let newly_closed = {
            let mut inner = self.inner.lock();
            !std::mem::replace(&mut inner.closed, true)
        };
        if newly_closed {
            self.items.notify_one();
            self.space.notify_one();
        }
    }

    fn stats(&self) -> QueueStats {
        QueueStats {
            enqueued: self.enqueued.load(Ordering::Relaxed),
            dequeued: self.dequeued.load(Ordering::Relaxed),
            dropped: self.dropped.load(Ordering::Relaxed),
            buffered: self.inner.lock().frames.len(),
        }
    }
}

/// Create a bounded queue
///
/// `capacity` is clamped to at least one frame.
pub fn media_queue(capacity: usize) -> (FrameProducer, FrameConsumer) {
    let capacity = capacity.max(1);
    let shared = Arc::new(Shared {
        inner: Mutex::new(Inner {
            frames: VecDeque::with_capacity(capacity),
            closed: false,
        }),
        capacity,
        items: Notify::new(),
        space: Notify::new(),
        enqueued: AtomicU64::new(0),
        dequeued: AtomicU64::new(0),
        dropped: AtomicU64::new(0),
    });

    (
        FrameProducer {
            shared: shared.clone(),
        },
        FrameConsumer { shared },
    )
}

/// Sending half, owned by the websocket receive loop
///
/// Dropping the producer closes the queue.
pub struct FrameProducer {
    shared: Arc<Shared>,
}

impl FrameProducer {
    /// Enqueue a frame, waiting at most `wait` for space
    pub async fn enqueue(&mut self, frame: MediaFrame, wait: Duration) -> Result<(), EnqueueError> {
        let deadline = Instant::now() + wait;
        let mut frame = frame;

        loop {
            let notified = self.shared.space.notified();
            tokio::pin!(notified);
            notified.as_mut().enable();

            match self.try_push(frame) {
                Ok(()) => return Ok(()),
                Err(EnqueueError::Full(f)) => frame = f,
                Err(closed) => return Err(closed),
            }

            if tokio::time::timeout_at(deadline, notified).await.is_err() {
                // One last attempt so a pop racing the deadline is not lost
                return self.try_push(frame);
            }
        }
    }

    /// Enqueue a frame, resolving overflow with `policy` after `wait`
    pub async fn enqueue_with_policy(
        &mut self,
        frame: MediaFrame,
        wait: Duration,
        policy: OverflowPolicy,
    ) -> Result<Enqueued, EnqueueError> {
        match self.enqueue(frame, wait).await {
            Ok(()) => Ok(Enqueued::Accepted),
            Err(EnqueueError::Full(frame)) => match policy {
                OverflowPolicy::DropOldest => self.push_evicting(frame),
                OverflowPolicy::DropNewest => {
                    self.shared.dropped.fetch_add(1, Ordering::Relaxed);
                    Ok(Enqueued::DroppedNewest(frame))
                }
            },
            Err(closed) => Err(closed),
        }
    }

    fn try_push(&self, frame: MediaFrame) -> Result<(), EnqueueError> {
        {
            let mut inner = self.shared.inner.lock();
            if inner.closed {
                return Err(EnqueueError::Closed(frame));
            }
            if inner.frames.len() >= self.shared.capacity {
                return Err(EnqueueError::Full(frame));
            }
            inner.frames.push_back(frame);
        }
        self.shared.enqueued.fetch_add(1, Ordering::Relaxed);
        self.shared.items.notify_one();
        Ok(())
    }

    /// Push, evicting the head when full
    fn push_evicting(&self, frame: MediaFrame) -> Result<Enqueued, EnqueueError> {
        let evicted = {
            let mut inner = self.shared.inner.lock();
            if inner.closed {
                return Err(EnqueueError::Closed(frame));
            }
            let evicted = if inner.frames.len() >= self.shared.capacity {
                inner.frames.pop_front()
            } else {
                None
            };
            inner.frames.push_back(frame);
            evicted
        };

        self.shared.enqueued.fetch_add(1, Ordering::Relaxed);
        self.shared.items.notify_one();

        Ok(match evicted {
            Some(old) => {
                self.shared.dropped.fetch_add(1, Ordering::Relaxed);
                Enqueued::EvictedOldest(old)
            }
            None => Enqueued::Accepted,
        })
    }

    /// Close the queue (idempotent)
    pub fn close(&self) {
        self.shared.close();
    }

    pub fn is_closed(&self) -> bool {
        self.shared.inner.lock().closed
    }

    pub fn len(&self) -> usize {
        self.shared.inner.lock().frames.len()
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }

    pub fn capacity(&self) -> usize {
        self.shared.capacity
    }

    pub fn stats(&self) -> QueueStats {
        self.shared.stats()
    }
}

impl Drop for FrameProducer {
    fn drop(&mut self) {
        self.shared.close();
    }
}

/// Receiving half, owned by the pacer
pub struct FrameConsumer {
    shared: Arc<Shared>,
}

impl FrameConsumer {
    /// Next frame, waiting at most `timeout`
    pub async fn dequeue(&mut self, timeout: Duration) -> Dequeued {
        let deadline = Instant::now() + timeout;

        loop {
            let notified = self.shared.items.notified();
            tokio::pin!(notified);
            notified.as_mut().enable();

            if let Some(result) = self.try_pop() {
                return result;
            }

            if tokio::time::timeout_at(deadline, notified).await.is_err() {
                return self.try_pop().unwrap_or(Dequeued::Empty);
            }
        }
    }

    /// `None` when open and empty
    fn try_pop(&self) -> Option<Dequeued> {
        let popped = {
            let mut inner = self.shared.inner.lock();
            match inner.frames.pop_front() {
                Some(frame) => Dequeued::Frame(frame),
                None if inner.closed => return Some(Dequeued::Closed),
                None => return None,
            }
        };
        self.shared.dequeued.fetch_add(1, Ordering::Relaxed);
        self.shared.space.notify_one();
        Some(popped)
    }

    /// Close from the consumer side; pending producers fail fast
    pub fn close(&self) {
        self.shared.close();
    }

    pub fn is_closed(&self) -> bool {
        self.shared.inner.lock().closed
    }

    pub fn stats(&self) -> QueueStats {
        self.shared.stats()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn frame(seq: u64) -> MediaFrame {
        MediaFrame::new(seq, vec![0u8; 160])
    }

    fn sequence(result: Dequeued) -> Option<u64> {
        match result {
            Dequeued::Frame(f) => Some(f.sequence),
            _ => None,
        }
    }

    #[tokio::test]
    async fn test_fifo_order() {
        let (mut tx, mut rx) = media_queue(8);
        for seq in 0..5 {
            tx.enqueue(frame(seq), Duration::from_millis(10)).await.unwrap();
        }

        for seq in 0..5 {
            assert_eq!(sequence(rx.dequeue(Duration::from_millis(10)).await), Some(seq));
        }
        assert!(matches!(rx.dequeue(Duration::from_millis(5)).await, Dequeued::Empty));
    }

    #[tokio::test(start_paused = true)]
    async fn test_full_queue_times_out_within_wait() {
        let (mut tx, _rx) = media_queue(2);
        tx.enqueue(frame(0), Duration::ZERO).await.unwrap();
        tx.enqueue(frame(1), Duration::ZERO).await.unwrap();

        let started = Instant::now();
        let err = tx.enqueue(frame(2), Duration::from_millis(50)).await.unwrap_err();
        assert!(started.elapsed() <= Duration::from_millis(60));
        assert!(matches!(err, EnqueueError::Full(ref f) if f.sequence == 2));
    }

    #[tokio::test]
    async fn test_waiting_producer_resumes_after_dequeue() {
        let (mut tx, mut rx) = media_queue(1);
        tx.enqueue(frame(0), Duration::ZERO).await.unwrap();

        let producer = tokio::spawn(async move {
            tx.enqueue(frame(1), Duration::from_secs(5)).await.map(|_| tx)
        });

        tokio::task::yield_now().await;
        assert_eq!(sequence(rx.dequeue(Duration::from_millis(10)).await), Some(0));

        assert!(producer.await.unwrap().is_ok());
        assert_eq!(sequence(rx.dequeue(Duration::from_secs(1)).await), Some(1));
    }

    #[tokio::test]
    async fn test_drop_oldest_evicts_head() {
        let (mut tx, mut rx) = media_queue(2);
        tx.enqueue(frame(0), Duration::ZERO).await.unwrap();
        tx.enqueue(frame(1), Duration::ZERO).await.unwrap();

        let outcome = tx
            .enqueue_with_policy(frame(2), Duration::ZERO, OverflowPolicy::DropOldest)
            .await
            .unwrap();
        assert!(matches!(outcome, Enqueued::EvictedOldest(ref f) if f.sequence == 0));

        assert_eq!(sequence(rx.dequeue(Duration::ZERO).await), Some(1));
        assert_eq!(sequence(rx.dequeue(Duration::ZERO).await), Some(2));
        assert_eq!(tx.stats().dropped, 1);
    }

    #[tokio::test]
    async fn test_drop_newest_keeps_buffer() {
        let (mut tx, mut rx) = media_queue(1);
        tx.enqueue(frame(0), Duration::ZERO).await.unwrap();

        let outcome = tx
            .enqueue_with_policy(frame(1), Duration::ZERO, OverflowPolicy::DropNewest)
            .await
            .unwrap();
        assert!(matches!(outcome, Enqueued::DroppedNewest(ref f) if f.sequence == 1));
        assert_eq!(sequence(rx.dequeue(Duration::ZERO).await), Some(0));
    }

    #[tokio::test]
    async fn test_closed_only_after_drain() {
        let (mut tx, mut rx) = media_queue(4);
        tx.enqueue(frame(0), Duration::ZERO).await.unwrap();
        tx.enqueue(frame(1), Duration::ZERO).await.unwrap();
        tx.close();
        tx.close();

        assert_eq!(sequence(rx.dequeue(Duration::ZERO).await), Some(0));
        assert_eq!(sequence(rx.dequeue(Duration::ZERO).await), Some(1));
        assert!(matches!(rx.dequeue(Duration::ZERO).await, Dequeued::Closed));
        assert!(matches!(rx.dequeue(Duration::ZERO).await, Dequeued::Closed));

        let err = tx.enqueue(frame(2), Duration::ZERO).await.unwrap_err();
        assert!(matches!(err, EnqueueError::Closed(_)));
    }

    #[tokio::test]
    async fn test_close_wakes_waiting_consumer() {
        let (tx, mut rx) = media_queue(4);
        let consumer = tokio::spawn(async move { rx.dequeue(Duration::from_secs(30)).await });

        tokio::task::yield_now().await;
        drop(tx);

        let result = tokio::time::timeout(Duration::from_secs(1), consumer)
            .await
            .unwrap()
            .unwrap();
        assert!(matches!(result, Dequeued::Closed));
    }

    #[tokio::test]
    async fn test_counters() {
        let (mut tx, mut rx) = media_queue(4);
        for seq in 0..3 {
            tx.enqueue(frame(seq), Duration::ZERO).await.unwrap();
        }
        rx.dequeue(Duration::ZERO).await;

        let stats = rx.stats();
        assert_eq!(stats.enqueued, 3);
        assert_eq!(stats.dequeued, 1);
        assert_eq!(stats.buffered, 2);
        assert_eq!(stats.dropped, 0);
    }
}
