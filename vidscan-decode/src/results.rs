//! Per-frame result collection
//!
//! Workers finish frames out of order. Results are kept in index-keyed maps
//! split across a few shards so concurrent inserts rarely contend on one lock.

use parking_lot::Mutex;
use std::collections::BTreeMap;

const SHARDS: usize = 16;

pub struct FrameResults<T> {
    shards: Vec<Mutex<BTreeMap<u64, T>>>,
}

impl<T> FrameResults<T> {
    pub fn new() -> Self {
        Self {
            shards: (0..SHARDS).map(|_| Mutex::new(BTreeMap::new())).collect(),
        }
    }

    fn shard(&self, index: u64) -> &Mutex<BTreeMap<u64, T>> {
        &self.shards[(index % SHARDS as u64) as usize]
    }

    /// Store the result for frame `index`, returning any previous value
    pub fn insert(&self, index: u64, value: T) -> Option<T> {
        self.shard(index).lock().insert(index, value)
    }

    pub fn contains(&self, index: u64) -> bool {
        self.shard(index).lock().contains_key(&index)
    }

    pub fn len(&self) -> usize {
        self.shards.iter().map(|shard| shard.lock().len()).sum()
    }

    pub fn is_empty(&self) -> bool {
        self.shards.iter().all(|shard| shard.lock().is_empty())
    }

    /// All results ordered by frame index
    pub fn into_sorted(self) -> Vec<(u64, T)> {
        let mut merged = BTreeMap::new();
        for shard in self.shards {
            merged.append(&mut shard.into_inner());
        }
        merged.into_iter().collect()
    }
}

impl<T> Default for FrameResults<T> {
    fn default() -> Self {
        Self::new()
    }
}

impl<T> std::fmt::Debug for FrameResults<T> {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("FrameResults")
            .field("len", &self.len())
            .finish()
    }
}
