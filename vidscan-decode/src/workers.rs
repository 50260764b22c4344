//! Worker pool (consumer side)
//!
//! A fixed set of scoped threads pops frames from the [`FrameQueue`] until it
//! is closed and drained. Each frame is handed to exactly one worker, passed
//! to the callback once and then returned to its pool, whether the callback
//! succeeded, failed or panicked.

use crate::frame_queue::FrameQueue;
use crate::types::PooledFrame;
use parking_lot::Mutex;
use std::any::Any;
use std::panic::{self, AssertUnwindSafe};
use std::thread;

/// Cores left for the decoder and the rest of the system
const WORKER_HEADROOM: usize = 2;

/// Available parallelism minus headroom, at least 1
pub fn default_worker_count() -> usize {
    thread::available_parallelism()
        .map(|n| n.get())
        .unwrap_or(1)
        .saturating_sub(WORKER_HEADROOM)
        .max(1)
}

/// A frame whose callback returned an error or panicked
#[derive(Debug, Clone)]
pub struct FrameFailure {
    pub index: u64,
    pub worker: usize,
    pub message: String,
}

#[derive(Debug, Clone, Default)]
pub struct WorkerReport {
    /// Frames delivered to a callback, failed ones included
    pub processed: u64,
    /// Frames delivered per worker id
    pub per_worker: Vec<u64>,
    pub failures: Vec<FrameFailure>,
}

impl WorkerReport {
    pub fn succeeded(&self) -> u64 {
        self.processed - self.failures.len() as u64
    }

    pub fn has_failures(&self) -> bool {
        !self.failures.is_empty()
    }
}

/// Run `count` workers over `queue` until it is closed and empty.
///
/// The callback receives the frame and the worker id (`0..count`). It runs on
/// several threads at once, so shared state it touches must be synchronized.
pub fn run_workers<F>(queue: &FrameQueue, count: usize, callback: F) -> WorkerReport
where
    F: Fn(&PooledFrame, usize) -> anyhow::Result<()> + Sync,
{
    let count = count.max(1);
    let failures = Mutex::new(Vec::new());
    let callback = &callback;
    let failed = &failures;

    log::debug!("starting {} workers", count);

    let per_worker: Vec<u64> = thread::scope(|s| {
        let mut handles = Vec::with_capacity(count);
        for id in 0..count {
            let spawned = thread::Builder::new()
                .name(format!("vidscan-worker-{}", id))
                .spawn_scoped(s, move || worker_loop(id, queue, callback, failed));
            match spawned {
                Ok(handle) => handles.push((id, handle)),
                Err(e) => log::error!("failed to spawn worker {}: {}", id, e),
            }
        }

        let mut per_worker = vec![0u64; count];
        if handles.is_empty() {
            // Nobody else will drain the queue
            log::warn!("no worker threads could be started, processing inline");
            per_worker[0] = worker_loop(0, queue, callback, failed);
        }
        for (id, handle) in handles {
            per_worker[id] = handle.join().unwrap_or_else(|_| {
                log::error!("worker {} panicked outside the frame callback", id);
                0
            });
        }
        per_worker
    });

    let failures = failures.into_inner();
    let processed = per_worker.iter().sum();
    log::info!(
        "workers finished: {} frames, {} failed",
        processed,
        failures.len()
    );

    WorkerReport {
        processed,
        per_worker,
        failures,
    }
}

fn worker_loop<F>(
    id: usize,
    queue: &FrameQueue,
    callback: &F,
    failures: &Mutex<Vec<FrameFailure>>,
) -> u64
where
    F: Fn(&PooledFrame, usize) -> anyhow::Result<()> + Sync,
{
    let mut processed = 0u64;

    while let Some(frame) = queue.pop() {
        let outcome = panic::catch_unwind(AssertUnwindSafe(|| callback(&frame, id)));
        let index = frame.index;
        frame.release();
        processed += 1;

        let message = match outcome {
            Ok(Ok(())) => continue,
            Ok(Err(e)) => format!("{:#}", e),
            Err(payload) => format!("panicked: {}", panic_message(payload.as_ref())),
        };
        log::warn!("worker {}: frame {} failed: {}", id, index, message);
        failures.lock().push(FrameFailure {
            index,
            worker: id,
            message,
        });
    }

    log::debug!("worker {} exiting after {} frames", id, processed);
    processed
}

fn panic_message(payload: &(dyn Any + Send)) -> String {
    if let Some(s) = payload.downcast_ref::<&str>() {
        s.to_string()
    } else if let Some(s) = payload.downcast_ref::<String>() {
        s.clone()
    } else {
        "unknown panic payload".to_string()
    }
}
