//! Reusable frame buffers to eliminate per-frame allocation churn
//!
//! Buffers are grouped into size classes (rounded up to a page) with one
//! lock-free free list per class. A rented [`FrameBuffer`] hands its allocation
//! back when dropped, so every exit path returns it exactly once and nothing
//! can touch the bytes afterwards.

use crossbeam_queue::SegQueue;
use parking_lot::RwLock;
use std::collections::HashMap;
use std::ops::{Deref, DerefMut};
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::Arc;

const SIZE_CLASS_GRANULARITY: usize = 4096;

fn size_class(size: usize) -> usize {
    size.max(1).div_ceil(SIZE_CLASS_GRANULARITY) * SIZE_CLASS_GRANULARITY
}

/// Run-scoped pool of byte buffers
#[derive(Default)]
pub struct FramePool {
    classes: RwLock<HashMap<usize, Arc<SegQueue<Vec<u8>>>>>,
    rented: AtomicU64,
    returned: AtomicU64,
    allocated: AtomicU64,
}

impl FramePool {
    pub fn new() -> Arc<Self> {
        Arc::new(Self::default())
    }

    /// Create a pool with `count` idle buffers able to hold `size` bytes
    pub fn with_preallocated(size: usize, count: usize) -> Arc<Self> {
        let pool = Self::new();
        let class = size_class(size);
        let free = pool.free_list(class);
        for _ in 0..count {
            free.push(vec![0u8; class]);
        }
        pool.allocated.fetch_add(count as u64, Ordering::Relaxed);
        pool
    }

    fn free_list(&self, class: usize) -> Arc<SegQueue<Vec<u8>>> {
        if let Some(list) = self.classes.read().get(&class) {
            return Arc::clone(list);
        }
        Arc::clone(self.classes.write().entry(class).or_default())
    }

    /// Rent a buffer of exactly `size` bytes.
    ///
    /// Reuses an idle allocation of the same size class when one exists.
    /// Contents of a reused buffer are unspecified.
    pub fn rent(self: &Arc<Self>, size: usize) -> FrameBuffer {
        let class = size_class(size);
        let mut data = match self.free_list(class).pop() {
            Some(data) => data,
            None => {
                self.allocated.fetch_add(1, Ordering::Relaxed);
                Vec::with_capacity(class)
            }
        };
        data.resize(size, 0);

        self.rented.fetch_add(1, Ordering::Relaxed);
        FrameBuffer {
            data,
            class,
            pool: Arc::clone(self),
        }
    }

    /// Return a buffer to the pool.
    ///
    /// Equivalent to dropping it; provided so release points read explicitly.
    pub fn release(&self, buffer: FrameBuffer) {
        debug_assert!(std::ptr::eq(self, Arc::as_ptr(&buffer.pool)));
        drop(buffer);
    }

    fn reclaim(&self, class: usize, data: Vec<u8>) {
        self.free_list(class).push(data);
        self.returned.fetch_add(1, Ordering::Relaxed);
    }

    /// Get pool statistics
    pub fn stats(&self) -> PoolStats {
        let rented = self.rented.load(Ordering::Relaxed);
        let returned = self.returned.load(Ordering::Relaxed);
        let idle = self.classes.read().values().map(|list| list.len()).sum();

        PoolStats {
            rented,
            returned,
            allocated: self.allocated.load(Ordering::Relaxed),
            outstanding: rented.saturating_sub(returned),
            idle,
        }
    }
}

impl std::fmt::Debug for FramePool {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("FramePool").field("stats", &self.stats()).finish()
    }
}

/// A buffer rented from a [`FramePool`]
pub struct FrameBuffer {
    data: Vec<u8>,
    class: usize,
    pool: Arc<FramePool>,
}

impl FrameBuffer {
    pub fn as_slice(&self) -> &[u8] {
        &self.data
    }

    pub fn as_mut_slice(&mut self) -> &mut [u8] {
        &mut self.data
    }
}

impl Deref for FrameBuffer {
    type Target = [u8];

    fn deref(&self) -> &[u8] {
        &self.data
    }
}

impl DerefMut for FrameBuffer {
    fn deref_mut(&mut self) -> &mut [u8] {
        &mut self.data
    }
}

impl Drop for FrameBuffer {
    fn drop(&mut self) {
        self.pool.reclaim(self.class, std::mem::take(&mut self.data));
    }
}

impl std::fmt::Debug for FrameBuffer {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("FrameBuffer")
            .field("len", &self.data.len())
            .field("class", &self.class)
            .finish()
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub struct PoolStats {
    /// Total `rent` calls
    pub rented: u64,
    /// Total buffers handed back
    pub returned: u64,
    /// Fresh allocations made by the pool
    pub allocated: u64,
    /// Rented and not yet returned
    pub outstanding: u64,
    /// Buffers sitting in free lists
    pub idle: usize,
}
