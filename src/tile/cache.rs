//! Cache of decoded tiles.
//!
//! Decoding an LZW tile costs far more than copying it, and rectangle reads
//! usually touch the same tiles repeatedly (neighbouring rectangles share
//! edge tiles). The cache keeps decoded tile bytes keyed by frame and block.
//!
//! # Size-Based Eviction
//!
//! The cache tracks the total size of cached tiles in bytes and evicts
//! least-recently-used entries when the capacity is exceeded. A capacity of
//! 0 disables caching.

use std::num::NonZeroUsize;
use std::sync::{Mutex, MutexGuard, PoisonError};

use bytes::Bytes;
use lru::LruCache;

/// Default cache capacity: 64MB of decoded tiles
pub const DEFAULT_TILE_CACHE_CAPACITY: usize = 64 * 1024 * 1024;

/// Default maximum number of entries (to bound LRU overhead)
const DEFAULT_MAX_ENTRIES: NonZeroUsize = match NonZeroUsize::new(4096) {
    Some(n) => n,
    None => NonZeroUsize::MIN,
};

// =============================================================================
// Cache Key
// =============================================================================

/// Cache key for decoded tiles of one store.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub struct TileCacheKey {
    /// Frame position in the chain
    pub frame: u32,

    /// Block number within the frame
    pub block: u32,
}

impl TileCacheKey {
    pub fn new(frame: u32, block: u32) -> Self {
        Self { frame, block }
    }
}

// =============================================================================
// Tile Cache
// =============================================================================

struct CacheState {
    entries: LruCache<TileCacheKey, Bytes>,
    current_size: usize,
}

/// LRU cache for decoded tiles with size-based capacity.
///
/// # Thread Safety
///
/// All methods take `&self`; the cache can be shared between threads.
///
/// # Example
///
/// ```
/// use tilestore::tile::{TileCache, TileCacheKey};
/// use bytes::Bytes;
///
/// let cache = TileCache::with_capacity(1024 * 1024);
/// let key = TileCacheKey::new(0, 3);
/// cache.put(key, Bytes::from(vec![7u8; 256]));
/// assert_eq!(cache.get(&key).map(|tile| tile.len()), Some(256));
/// ```
pub struct TileCache {
    state: Mutex<CacheState>,

    /// Maximum total size in bytes
    max_size: usize,
}

impl TileCache {
    /// Create a new tile cache with default capacity (64MB).
    pub fn new() -> Self {
        Self::with_capacity(DEFAULT_TILE_CACHE_CAPACITY)
    }

    /// Create a new tile cache with the specified capacity in bytes.
    pub fn with_capacity(max_size: usize) -> Self {
        Self::with_capacity_and_entries(max_size, DEFAULT_MAX_ENTRIES)
    }

    /// Create a new tile cache with specified capacity and maximum entries.
    pub fn with_capacity_and_entries(max_size: usize, max_entries: NonZeroUsize) -> Self {
        Self {
            state: Mutex::new(CacheState {
                entries: LruCache::new(max_entries),
                current_size: 0,
            }),
            max_size,
        }
    }

    fn lock(&self) -> MutexGuard<'_, CacheState> {
        self.state.lock().unwrap_or_else(PoisonError::into_inner)
    }

    /// Whether the cache stores anything at all.
    #[inline]
    pub fn is_enabled(&self) -> bool {
        self.max_size > 0
    }

    /// Get a tile from the cache, marking it as recently used.
    pub fn get(&self, key: &TileCacheKey) -> Option<Bytes> {
        self.lock().entries.get(key).cloned()
    }

    /// Check if a tile is in the cache without updating LRU order.
    pub fn contains(&self, key: &TileCacheKey) -> bool {
        self.lock().entries.contains(key)
    }

    /// Store a tile in the cache.
    ///
    /// Tiles larger than the whole capacity are not cached. If the cache is
    /// over capacity after insertion, least-recently-used entries are
    /// evicted until it fits again.
    pub fn put(&self, key: TileCacheKey, data: Bytes) {
        let data_size = data.len();
        if data_size > self.max_size {
            return;
        }

        let mut guard = self.lock();
        let state = &mut *guard;
        if let Some(old) = state.entries.peek(&key) {
            state.current_size = state.current_size.saturating_sub(old.len());
        }

        // An entry evicted by the entry bound no longer counts towards the size
        if let Some((evicted_key, evicted)) = state.entries.push(key, data) {
            if evicted_key != key {
                state.current_size = state.current_size.saturating_sub(evicted.len());
            }
        }
        state.current_size += data_size;

        while state.current_size > self.max_size {
            match state.entries.pop_lru() {
                Some((_, evicted)) => {
                    state.current_size = state.current_size.saturating_sub(evicted.len());
                }
                None => break,
            }
        }
    }

    /// Remove a tile from the cache.
    pub fn remove(&self, key: &TileCacheKey) -> Option<Bytes> {
        let mut state = self.lock();
        let data = state.entries.pop(key)?;
        state.current_size = state.current_size.saturating_sub(data.len());
        Some(data)
    }

    /// Clear all entries from the cache.
    pub fn clear(&self) {
        let mut state = self.lock();
        state.entries.clear();
        state.current_size = 0;
    }

    /// Number of cached tiles.
    pub fn len(&self) -> usize {
        self.lock().entries.len()
    }

    pub fn is_empty(&self) -> bool {
        self.lock().entries.is_empty()
    }

    /// Current total size of cached tiles in bytes.
    pub fn size(&self) -> usize {
        self.lock().current_size
    }

    /// Maximum capacity in bytes.
    pub fn capacity(&self) -> usize {
        self.max_size
    }
}

impl Default for TileCache {
    fn default() -> Self {
        Self::new()
    }
}

impl std::fmt::Debug for TileCache {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("TileCache")
            .field("len", &self.len())
            .field("size", &self.size())
            .field("max_size", &self.max_size)
            .finish()
    }
}

// =============================================================================
// Tests
// =============================================================================
