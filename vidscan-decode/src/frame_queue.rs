//! Bounded frame queue between the producer and the worker pool
//!
//! Backpressure: `push` blocks while the queue holds `capacity` frames.
//! Fan-out: any number of workers may `pop`; each frame reaches exactly one.
//! Closing is a one-time signal; workers drain what is left and then see `None`.

use crate::cancel::CancelToken;
use crate::types::PooledFrame;
use crossbeam::channel::{self, Receiver, Sender};
use parking_lot::Mutex;
use std::sync::atomic::{AtomicU64, AtomicUsize, Ordering};

/// Why a frame could not be enqueued. The frame is handed back to the caller.
#[derive(Debug)]
pub enum PushError {
    Cancelled(PooledFrame),
    Closed(PooledFrame),
}

impl PushError {
    pub fn into_frame(self) -> PooledFrame {
        match self {
            PushError::Cancelled(frame) | PushError::Closed(frame) => frame,
        }
    }
}

/// Producer-side handles, dropped together on close
struct Senders {
    frames: Sender<PooledFrame>,
    // Never sent on; dropping it wakes pushes blocked on a full queue
    _closing: Sender<()>,
}

pub struct FrameQueue {
    tx: Mutex<Option<Senders>>,
    rx: Receiver<PooledFrame>,
    closed: Receiver<()>,
    capacity: usize,
    high_water: AtomicUsize,
    pushed: AtomicU64,
}

impl FrameQueue {
    /// Create a queue holding at most `capacity` frames (minimum 1)
    pub fn new(capacity: usize) -> Self {
        let capacity = capacity.max(1);
        let (tx, rx) = channel::bounded(capacity);
        let (closing, closed) = channel::bounded(0);
        Self {
            tx: Mutex::new(Some(Senders {
                frames: tx,
                _closing: closing,
            })),
            rx,
            closed,
            capacity,
            high_water: AtomicUsize::new(0),
            pushed: AtomicU64::new(0),
        }
    }

    /// Enqueue a frame, blocking while the queue is full.
    ///
    /// Wakes early if `cancel` fires or the queue is closed.
    pub fn push(&self, frame: PooledFrame, cancel: &CancelToken) -> Result<(), PushError> {
        if cancel.is_cancelled() {
            return Err(PushError::Cancelled(frame));
        }

        // Fast path runs under the lock so it cannot interleave with close()
        let (tx, frame) = {
            let senders = self.tx.lock();
            let Some(senders) = senders.as_ref() else {
                return Err(PushError::Closed(frame));
            };
            match senders.frames.try_send(frame) {
                Ok(()) => {
                    self.record_push();
                    return Ok(());
                }
                Err(channel::TrySendError::Full(frame)) => (senders.frames.clone(), frame),
                Err(channel::TrySendError::Disconnected(frame)) => {
                    return Err(PushError::Closed(frame))
                }
            }
        };

        log::trace!("frame queue full ({}), producer waiting", self.capacity);
        let mut sel = channel::Select::new();
        let send_op = sel.send(&tx);
        let cancel_op = sel.recv(cancel.signal());
        let close_op = sel.recv(&self.closed);
        let oper = sel.select();
        match oper.index() {
            i if i == send_op => match oper.send(&tx, frame) {
                Ok(()) => {
                    self.record_push();
                    Ok(())
                }
                Err(channel::SendError(frame)) => Err(PushError::Closed(frame)),
            },
            i if i == cancel_op => {
                let _ = oper.recv(cancel.signal());
                Err(PushError::Cancelled(frame))
            }
            i => {
                debug_assert_eq!(i, close_op);
                let _ = oper.recv(&self.closed);
                Err(PushError::Closed(frame))
            }
        }
    }

    fn record_push(&self) {
        self.pushed.fetch_add(1, Ordering::Relaxed);
        self.high_water.fetch_max(self.rx.len(), Ordering::Relaxed);
    }

    /// Dequeue the next frame, blocking while empty.
    ///
    /// Returns `None` once the queue is closed and drained.
    pub fn pop(&self) -> Option<PooledFrame> {
        self.rx.recv().ok()
    }

    /// Signal that no more frames will be pushed. Idempotent.
    pub fn close(&self) {
        if self.tx.lock().take().is_some() {
            log::debug!("frame queue closed after {} frames", self.pushed());
        }
    }

    pub fn is_closed(&self) -> bool {
        self.tx.lock().is_none()
    }

    /// Frames currently enqueued
    pub fn len(&self) -> usize {
        self.rx.len()
    }

    pub fn is_empty(&self) -> bool {
        self.rx.is_empty()
    }

    pub fn capacity(&self) -> usize {
        self.capacity
    }

    /// Largest queue length observed right after a push
    pub fn high_water(&self) -> usize {
        self.high_water.load(Ordering::Relaxed)
    }

    /// Frames successfully enqueued so far
    pub fn pushed(&self) -> u64 {
        self.pushed.load(Ordering::Relaxed)
    }
}

impl std::fmt::Debug for FrameQueue {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("FrameQueue")
            .field("len", &self.len())
            .field("capacity", &self.capacity)
            .field("closed", &self.is_closed())
            .finish()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::frame_pool::FramePool;
    use crate::types::{FrameGeometry, PixelLayout};
    use rand::Rng;
    use std::sync::Arc;
    use std::thread;
    use std::time::Duration;

    fn frame(pool: &Arc<FramePool>, index: u64) -> PooledFrame {
        let geometry = FrameGeometry::new(2, 2, PixelLayout::Rgba);
        PooledFrame::new(index, geometry, 0.0, pool.rent(geometry.frame_size()))
    }

    #[test]
    fn test_fifo_and_close_drains() {
        let pool = FramePool::new();
        let queue = FrameQueue::new(4);
        let cancel = CancelToken::new();

        for i in 0..3 {
            queue.push(frame(&pool, i), &cancel).unwrap();
        }
        queue.close();
        queue.close();
        assert!(queue.is_closed());

        let drained: Vec<u64> = std::iter::from_fn(|| queue.pop()).map(|f| f.index).collect();
        assert_eq!(drained, vec![0, 1, 2]);
        assert!(queue.pop().is_none());
        assert_eq!(pool.stats().outstanding, 0);
    }

    #[test]
    fn test_push_after_close_returns_frame() {
        let pool = FramePool::new();
        let queue = FrameQueue::new(2);
        queue.close();

        let err = queue.push(frame(&pool, 7), &CancelToken::new()).unwrap_err();
        assert!(matches!(err, PushError::Closed(_)));
        assert_eq!(err.into_frame().index, 7);
    }

    #[test]
    fn test_cancel_wakes_blocked_push() {
        let pool = FramePool::new();
        let queue = Arc::new(FrameQueue::new(1));
        let cancel = CancelToken::new();

        queue.push(frame(&pool, 0), &cancel).unwrap();

        let producer = {
            let queue = Arc::clone(&queue);
            let cancel = cancel.clone();
            let pool = Arc::clone(&pool);
            thread::spawn(move || queue.push(frame(&pool, 1), &cancel))
        };

        thread::sleep(Duration::from_millis(50));
        assert!(!producer.is_finished(), "push should block on a full queue");

        cancel.cancel();
        let result = producer.join().unwrap();
        match result {
            Err(PushError::Cancelled(frame)) => assert_eq!(frame.index, 1),
            other => panic!("expected cancellation, got {:?}", other.map(|_| ())),
        }
        assert_eq!(queue.len(), 1);
    }

    #[test]
    fn test_close_wakes_blocked_push() {
        let pool = FramePool::new();
        let queue = Arc::new(FrameQueue::new(1));
        let cancel = CancelToken::new();

        queue.push(frame(&pool, 0), &cancel).unwrap();

        let producer = {
            let queue = Arc::clone(&queue);
            let cancel = cancel.clone();
            let pool = Arc::clone(&pool);
            thread::spawn(move || queue.push(frame(&pool, 1), &cancel))
        };

        thread::sleep(Duration::from_millis(50));
        assert!(!producer.is_finished(), "push should block on a full queue");

        queue.close();
        match producer.join().unwrap() {
            Err(PushError::Closed(frame)) => assert_eq!(frame.index, 1),
            other => panic!("expected closed, got {:?}", other.map(|_| ())),
        }

        let drained: Vec<u64> = std::iter::from_fn(|| queue.pop()).map(|f| f.index).collect();
        assert_eq!(drained, vec![0]);
        assert_eq!(queue.pushed(), 1);
        assert_eq!(pool.stats().outstanding, 0);
    }

    #[test]
    fn test_capacity_never_exceeded_with_slow_consumers() {
        for capacity in [1usize, 2, 4, 7] {
            let pool = FramePool::new();
            let queue = FrameQueue::new(capacity);
            let cancel = CancelToken::new();
            let total = 60u64;

            thread::scope(|s| {
                for _ in 0..2 {
                    s.spawn(|| {
                        let mut rng = rand::thread_rng();
                        while let Some(frame) = queue.pop() {
                            assert!(queue.len() <= capacity);
                            thread::sleep(Duration::from_micros(rng.gen_range(50..400)));
                            drop(frame);
                        }
                    });
                }

                for i in 0..total {
                    queue.push(frame(&pool, i), &cancel).unwrap();
                    assert!(queue.len() <= capacity);
                }
                queue.close();
            });

            assert!(queue.high_water() <= capacity);
            assert_eq!(queue.pushed(), total);
            let stats = pool.stats();
            assert_eq!(stats.rented, stats.returned);
        }
    }
}
