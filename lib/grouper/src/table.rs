//! Chained hash tables from key to count.
//!
//! [`LocalTable`] is owned by one worker; every node lives in the table's own
//! [`Arena`] and chains link nodes by [`NodeId`]. [`ShardedTable`] is the shared
//! variant: a fixed set of lock-striped `LocalTable`s, each with its own arena.

use crate::arena::{Arena, NodeId};
use crate::config::CountConfig;
use crate::error::{Error, Result};
use crate::key::{CountEntry, Key};
use crate::run::SortedRun;
use rayon::prelude::*;
use std::sync::{Mutex, MutexGuard};

/// DJB2 with xor mixing. Always applied to the canonical (truncated) key.
pub fn hash_key(bytes: &[u8]) -> u64 {
    bytes.iter().fold(5381u64, |h, &c| (h << 5).wrapping_add(h) ^ u64::from(c))
}

struct Node {
    key: Key,
    count: u64,
    next: Option<NodeId>,
}

pub struct LocalTable {
    buckets: Vec<Option<NodeId>>,
    mask: usize,
    // bits of the hash already consumed by shard selection
    shift: u32,
    arena: Arena<Node>,
    max_key_len: usize,
}

impl LocalTable {
    pub fn new(config: &CountConfig) -> Result<Self> {
        config.validate()?;
        Self::with_buckets(config.buckets, 0, config)
    }

    fn with_buckets(buckets: usize, shift: u32, config: &CountConfig) -> Result<Self> {
        let mut heads = Vec::new();
        heads
            .try_reserve_exact(buckets)
            .map_err(|_| Error::Allocation { what: "hash buckets", requested: buckets })?;
        heads.resize(buckets, None);
        Ok(Self {
            buckets: heads,
            mask: buckets - 1,
            shift,
            arena: Arena::new(config.arena_block),
            max_key_len: config.max_key_len,
        })
    }

    /// Count one occurrence of a raw record.
    pub fn insert(&mut self, raw: &[u8]) -> Result<()> {
        let key = Key::new(raw, self.max_key_len);
        self.insert_count(key, 1)
    }

    /// Add `count` occurrences of an already canonical key.
    pub fn insert_count(&mut self, key: Key, count: u64) -> Result<()> {
        let hash = hash_key(key.as_bytes());
        self.insert_hashed(key, hash, count)
    }

    fn insert_hashed(&mut self, key: Key, hash: u64, count: u64) -> Result<()> {
        let bucket = ((hash >> self.shift) as usize) & self.mask;
        let mut cursor = self.buckets[bucket];
        while let Some(id) = cursor {
            let node = self.arena.get_mut(id);
            if node.key == key {
                node.count += count;
                return Ok(());
            }
            cursor = node.next;
        }
        let id = self.arena.alloc(Node { key, count, next: self.buckets[bucket] })?;
        self.buckets[bucket] = Some(id);
        Ok(())
    }

    pub fn get(&self, raw: &[u8]) -> Option<u64> {
        let key = Key::new(raw, self.max_key_len);
        let bucket = ((hash_key(key.as_bytes()) >> self.shift) as usize) & self.mask;
        let mut cursor = self.buckets[bucket];
        while let Some(id) = cursor {
            let node = self.arena.get(id);
            if node.key == key {
                return Some(node.count);
            }
            cursor = node.next;
        }
        None
    }

    /// Distinct keys.
    pub fn len(&self) -> usize {
        self.arena.len()
    }

    pub fn is_empty(&self) -> bool {
        self.arena.is_empty()
    }

    pub fn entries(&self) -> impl Iterator<Item = CountEntry> + '_ {
        self.arena.iter().map(|n| CountEntry::new(n.key, n.count))
    }

    /// Flatten, sort by key and dedup. Consumes the table and releases its arena.
    pub fn into_run(self) -> SortedRun {
        let LocalTable { arena, .. } = self;
        SortedRun::from_unsorted(arena.into_iter_nodes().map(|n| CountEntry::new(n.key, n.count)).collect())
    }
}

/// One table shared by many threads. A key's shard is picked from the low hash bits;
/// the shard's lock is held across the whole lookup-then-insert-or-increment.
pub struct ShardedTable {
    shards: Vec<Mutex<LocalTable>>,
    shard_bits: u32,
    max_key_len: usize,
}

impl ShardedTable {
    pub fn new(config: &CountConfig) -> Result<Self> {
        config.validate()?;
        let shard_bits = config.shards.trailing_zeros();
        let per_shard = config.buckets / config.shards;
        let shards = (0..config.shards)
            .map(|_| LocalTable::with_buckets(per_shard, shard_bits, config).map(Mutex::new))
            .collect::<Result<Vec<_>>>()?;
        Ok(Self { shards, shard_bits, max_key_len: config.max_key_len })
    }

    pub fn insert(&self, raw: &[u8]) -> Result<()> {
        self.insert_count(Key::new(raw, self.max_key_len), 1)
    }

    pub fn insert_count(&self, key: Key, count: u64) -> Result<()> {
        let hash = hash_key(key.as_bytes());
        let mut shard = self.lock(hash);
        shard.insert_hashed(key, hash, count)
    }

    pub fn get(&self, raw: &[u8]) -> Option<u64> {
        let key = Key::new(raw, self.max_key_len);
        self.lock(hash_key(key.as_bytes())).get(key.as_bytes())
    }

    pub fn len(&self) -> usize {
        self.shards.iter().map(|s| lock_shard(s).len()).sum()
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }

    pub fn shard_count(&self) -> usize {
        self.shards.len()
    }

    /// One sorted run per shard, built in parallel. Shards hold disjoint keys.
    pub fn into_runs(self) -> Vec<SortedRun> {
        self.shards
            .into_par_iter()
            .map(|m| m.into_inner().unwrap_or_else(|poisoned| poisoned.into_inner()).into_run())
            .collect()
    }

    fn lock(&self, hash: u64) -> MutexGuard<'_, LocalTable> {
        let idx = (hash as usize) & ((1usize << self.shard_bits) - 1);
        lock_shard(&self.shards[idx])
    }
}

// Poisoning is ignored: each insert mutates a shard with a single add or a single prepend.
fn lock_shard(shard: &Mutex<LocalTable>) -> MutexGuard<'_, LocalTable> {
    shard.lock().unwrap_or_else(|poisoned| poisoned.into_inner())
}
