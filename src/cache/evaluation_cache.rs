//! Bounded, thread-safe store of position evaluations.
//!
//! Entries are keyed by `PositionKey` and evicted least-recently-used once
//! the configured capacity is exceeded. The three terminal sentinels (loss,
//! draw, win) live outside the LRU map, never count towards capacity and are
//! only reinstated, never dropped, by `clear_cache`.
//!
//! Every operation takes the same coarse lock; all of them are short, and
//! exclusive creation per key is what keeps two workers from evaluating the
//! same position twice.

use std::num::NonZeroUsize;
use std::sync::Arc;

use log::debug;
use lru::LruCache;
use parking_lot::Mutex;

use crate::cache::cache_value::{
    is_reserved_key, CacheKind, CacheValue, NodeBinding, PositionKey, DRAW_KEY, LOSS_KEY, WIN_KEY,
};
use crate::errors::{ChessError, ChessResult};

pub const DEFAULT_CACHE_CAPACITY: usize = 20_000;

/// Result of `claim`: the caller that gets `Created` must evaluate the entry.
#[derive(Debug, Clone)]
pub enum Claim {
    Created(Arc<CacheValue>),
    Existing(Arc<CacheValue>),
}

impl Claim {
    #[inline]
    pub fn is_created(&self) -> bool {
        matches!(self, Claim::Created(_))
    }

    #[inline]
    pub fn entry(&self) -> &Arc<CacheValue> {
        match self {
            Claim::Created(e) | Claim::Existing(e) => e,
        }
    }
}

#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct CacheStats {
    pub hits: u64,
    pub misses: u64,
    pub creations: u64,
    pub evictions: u64,
}

#[derive(Debug)]
struct CacheInner {
    entries: LruCache<PositionKey, Arc<CacheValue>>,
    loss: Arc<CacheValue>,
    draw: Arc<CacheValue>,
    win: Arc<CacheValue>,
    stats: CacheStats,
}

impl CacheInner {
    fn sentinel(&self, key: PositionKey) -> Option<&Arc<CacheValue>> {
        match key {
            LOSS_KEY => Some(&self.loss),
            DRAW_KEY => Some(&self.draw),
            WIN_KEY => Some(&self.win),
            _ => None,
        }
    }

    fn lookup(&mut self, key: PositionKey) -> Option<Arc<CacheValue>> {
        if let Some(sentinel) = self.sentinel(key) {
            return Some(Arc::clone(sentinel));
        }
        self.entries.get(&key).cloned()
    }

    fn contains(&self, key: PositionKey) -> bool {
        is_reserved_key(key) || self.entries.contains(&key)
    }

    fn insert(&mut self, key: PositionKey, label: &str, dirichlet: bool) -> Arc<CacheValue> {
        let entry = Arc::new(CacheValue::new(key, label, dirichlet));
        if let Some((evicted, _)) = self.entries.push(key, Arc::clone(&entry)) {
            debug!("evaluation cache evicted key {}", evicted);
            self.stats.evictions += 1;
        }
        self.stats.creations += 1;
        entry
    }
}

fn fill_entry(entry: &CacheValue, value: f32, logits: Vec<f32>) -> ChessResult<()> {
    if entry.kind() == CacheKind::Leaf {
        debug!("ignoring evaluator output for terminal entry {}", entry.label());
        return Ok(());
    }
    entry.fill(value, logits)
}

fn sentinels() -> (Arc<CacheValue>, Arc<CacheValue>, Arc<CacheValue>) {
    (
        Arc::new(CacheValue::sentinel(LOSS_KEY, "loss", -1.0)),
        Arc::new(CacheValue::sentinel(DRAW_KEY, "draw", 0.0)),
        Arc::new(CacheValue::sentinel(WIN_KEY, "win", 1.0)),
    )
}

#[derive(Debug)]
pub struct EvaluationCache {
    capacity: usize,
    inner: Mutex<CacheInner>,
}

impl EvaluationCache {
    pub fn new(capacity: usize) -> Self {
        let capacity = capacity.max(1);
        let (loss, draw, win) = sentinels();
        Self {
            capacity,
            inner: Mutex::new(CacheInner {
                entries: LruCache::new(NonZeroUsize::new(capacity).unwrap_or(NonZeroUsize::MIN)),
                loss,
                draw,
                win,
                stats: CacheStats::default(),
            }),
        }
    }

    #[inline]
    pub fn capacity(&self) -> usize {
        self.capacity
    }

    /// Evictable entries only; sentinels are not counted.
    pub fn len(&self) -> usize {
        self.inner.lock().entries.len()
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }

    pub fn contains_key(&self, key: PositionKey) -> bool {
        self.inner.lock().contains(key)
    }

    pub fn stats(&self) -> CacheStats {
        self.inner.lock().stats
    }

    /// Creates an uninitialized entry; fails if `key` is already present.
    pub fn create(
        &self,
        key: PositionKey,
        label: &str,
        dirichlet: bool,
    ) -> ChessResult<Arc<CacheValue>> {
        let mut inner = self.inner.lock();
        if inner.contains(key) {
            return Err(ChessError::DuplicateCacheKey {
                key,
                label: label.to_owned(),
            });
        }
        Ok(inner.insert(key, label, dirichlet))
    }

    /// Atomic get-or-create. Exactly one caller per key receives `Created`.
    pub fn claim(&self, key: PositionKey, label: &str, dirichlet: bool) -> Claim {
        let mut inner = self.inner.lock();
        if let Some(existing) = inner.lookup(key) {
            inner.stats.hits += 1;
            return Claim::Existing(existing);
        }
        inner.stats.misses += 1;
        Claim::Created(inner.insert(key, label, dirichlet))
    }

    pub fn get(&self, key: PositionKey) -> Option<Arc<CacheValue>> {
        let mut inner = self.inner.lock();
        let found = inner.lookup(key);
        if found.is_some() {
            inner.stats.hits += 1;
        } else {
            inner.stats.misses += 1;
        }
        found
    }

    /// Fills an entry with evaluator output. Normalizes immediately when the
    /// entry is already bound to a node.
    pub fn update_value_and_policies(
        &self,
        key: PositionKey,
        value: f32,
        logits: Vec<f32>,
    ) -> ChessResult<()> {
        let entry = self
            .inner
            .lock()
            .lookup(key)
            .ok_or(ChessError::MissingCacheKey(key))?;
        fill_entry(&entry, value, logits)
    }

    /// Fills an entry obtained from `claim`. The caller's handle stays valid
    /// even if the key was evicted while the evaluation was in flight.
    pub fn fill_claimed(&self, entry: &CacheValue, value: f32, logits: Vec<f32>) -> ChessResult<()> {
        if !self.inner.lock().entries.contains(&entry.key()) && !is_reserved_key(entry.key()) {
            debug!("key {} evicted before its evaluation arrived", entry.key());
        }
        fill_entry(entry, value, logits)
    }

    /// Binds an entry to its search node, normalizing if it is initialized.
    pub fn attach(&self, key: PositionKey, binding: NodeBinding) -> ChessResult<()> {
        let mut inner = self.inner.lock();
        let entry = inner.lookup(key).ok_or(ChessError::MissingCacheKey(key))?;
        entry.bind(binding)
    }

    /// Marks a former root as an ordinary interior entry.
    pub fn demote(&self, key: PositionKey) {
        let mut inner = self.inner.lock();
        if let Some(entry) = inner.lookup(key) {
            entry.set_kind(CacheKind::Intermediate);
        }
    }

    pub fn inc_propagate(&self, keys: &[PositionKey]) {
        let mut inner = self.inner.lock();
        for key in keys {
            if let Some(entry) = inner.lookup(*key) {
                entry.inc_propagate();
            }
        }
    }

    /// Propagate count of `key` without touching recency or statistics.
    pub fn propagate_count(&self, key: PositionKey) -> Option<u32> {
        let inner = self.inner.lock();
        match inner.sentinel(key) {
            Some(sentinel) => Some(sentinel.propagate_count()),
            None => inner.entries.peek(&key).map(|e| e.propagate_count()),
        }
    }

    pub fn reset_propagate(&self, key: PositionKey) -> ChessResult<()> {
        let mut inner = self.inner.lock();
        let entry = inner.lookup(key).ok_or(ChessError::MissingCacheKey(key))?;
        entry.reset_propagate();
        Ok(())
    }

    /// Drops every entry and reinstates fresh sentinels.
    pub fn clear_cache(&self) {
        let mut inner = self.inner.lock();
        inner.entries.clear();
        let (loss, draw, win) = sentinels();
        inner.loss = loss;
        inner.draw = draw;
        inner.win = win;
        debug!("evaluation cache cleared");
    }
}
