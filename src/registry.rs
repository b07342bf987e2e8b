//! Registry of open stores addressed by generation-checked handles.
//!
//! The registry provides:
//! - small copyable [`StoreHandle`]s for callers that cannot hold a
//!   [`TileService`] directly
//! - rejection of stale handles: closing a handle bumps the generation of its
//!   slot, so an old handle never reaches a store opened later in the same slot
//! - one writer per path: a second writable open of a path that is already
//!   open for writing fails with `WrongOpenMode`
//!
//! # Example
//!
//! ```no_run
//! use tilestore::format::tiff::OpenMode;
//! use tilestore::registry::StoreRegistry;
//!
//! let registry = StoreRegistry::new();
//! let handle = registry.open("scan.tif", OpenMode::Read)?;
//! let service = registry.get(handle)?;
//! println!("{} frames", service.store().frame_count()?);
//! registry.close(handle)?;
//! # Ok::<(), tilestore::TiffError>(())
//! ```

use std::path::{Path, PathBuf};
use std::sync::{Arc, Mutex, MutexGuard, PoisonError};

use tracing::{debug, info};

use crate::error::TiffError;
use crate::format::tiff::{OpenMode, TiffStore};
use crate::io::FileStorage;
use crate::tile::{TileService, DEFAULT_TILE_CACHE_CAPACITY};

// =============================================================================
// Handle
// =============================================================================

/// Handle to a store held by a [`StoreRegistry`].
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub struct StoreHandle {
    index: u32,
    generation: u32,
}

impl StoreHandle {
    /// Slot index of the handle.
    pub fn index(self) -> u32 {
        self.index
    }

    /// Generation of the slot when the handle was issued.
    pub fn generation(self) -> u32 {
        self.generation
    }
}

// =============================================================================
// Registry
// =============================================================================

struct OpenStore {
    path: PathBuf,
    writable: bool,
    service: Arc<TileService<FileStorage>>,
}

struct Slot {
    generation: u32,
    entry: Option<OpenStore>,
}

/// Arena of open file-backed stores.
pub struct StoreRegistry {
    slots: Mutex<Vec<Slot>>,
    cache_capacity: usize,
}

impl StoreRegistry {
    /// Create a registry whose services use the default tile cache size.
    pub fn new() -> Self {
        Self::with_cache_capacity(DEFAULT_TILE_CACHE_CAPACITY)
    }

    /// Create a registry whose services cache `capacity` bytes of decoded tiles each.
    pub fn with_cache_capacity(capacity: usize) -> Self {
        Self {
            slots: Mutex::new(Vec::new()),
            cache_capacity: capacity,
        }
    }

    fn lock(&self) -> MutexGuard<'_, Vec<Slot>> {
        self.slots.lock().unwrap_or_else(PoisonError::into_inner)
    }

    /// Open a file and register it.
    ///
    /// # Errors
    /// - `WrongOpenMode` if `mode` writes and the path is already open for writing
    /// - any error of [`TiffStore::open`]
    pub fn open(&self, path: impl AsRef<Path>, mode: OpenMode) -> Result<StoreHandle, TiffError> {
        let path = normalize(path.as_ref());
        let writable = mode.is_writable();

        // Hold the lock across the open so two writers cannot race on one path
        let mut slots = self.lock();
        if writable
            && slots
                .iter()
                .filter_map(|slot| slot.entry.as_ref())
                .any(|open| open.writable && open.path == path)
        {
            return Err(TiffError::WrongOpenMode);
        }

        let store = TiffStore::open(&path, mode)?;
        let service = Arc::new(TileService::with_cache_capacity(store, self.cache_capacity));
        let entry = OpenStore {
            path,
            writable,
            service,
        };

        let index = match slots.iter().position(|slot| slot.entry.is_none()) {
            Some(index) => index,
            None => {
                slots.push(Slot {
                    generation: 0,
                    entry: None,
                });
                slots.len() - 1
            }
        };
        let slot = &mut slots[index];
        slot.entry = Some(entry);

        let handle = StoreHandle {
            index: index as u32,
            generation: slot.generation,
        };
        debug!(index = handle.index, generation = handle.generation, writable, "Registered store");
        Ok(handle)
    }

    /// Service of an open handle.
    ///
    /// # Errors
    /// `InvalidHandle` if the handle was closed or never issued by this registry.
    pub fn get(&self, handle: StoreHandle) -> Result<Arc<TileService<FileStorage>>, TiffError> {
        let slots = self.lock();
        slots
            .get(handle.index as usize)
            .filter(|slot| slot.generation == handle.generation)
            .and_then(|slot| slot.entry.as_ref())
            .map(|open| Arc::clone(&open.service))
            .ok_or(TiffError::InvalidHandle)
    }

    /// Close a handle, flushing its store when it is writable.
    ///
    /// Every service obtained through [`StoreRegistry::get`] must be dropped
    /// first. While one is alive the handle stays open and keeps its path
    /// reserved.
    ///
    /// # Errors
    /// - `InvalidHandle` if the handle is stale
    /// - `StoreInUse` if the service is still shared
    /// - any error of [`TiffStore::close`]
    pub fn close(&self, handle: StoreHandle) -> Result<(), TiffError> {
        // Hold the lock across the close so the path cannot be reopened mid-flush
        let mut slots = self.lock();
        let slot = slots
            .get_mut(handle.index as usize)
            .filter(|slot| slot.generation == handle.generation)
            .ok_or(TiffError::InvalidHandle)?;
        let open = slot.entry.take().ok_or(TiffError::InvalidHandle)?;

        let service = match Arc::try_unwrap(open.service) {
            Ok(service) => service,
            Err(service) => {
                debug!(path = %open.path.display(), "Store still referenced, keeping it open");
                slot.entry = Some(OpenStore {
                    path: open.path,
                    writable: open.writable,
                    service,
                });
                return Err(TiffError::StoreInUse);
            }
        };
        slot.generation = slot.generation.wrapping_add(1);

        info!(path = %open.path.display(), "Closing store");
        service.into_store().close()?;
        Ok(())
    }

    /// Number of open stores.
    pub fn len(&self) -> usize {
        self.lock().iter().filter(|slot| slot.entry.is_some()).count()
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }

    /// Close every open store.
    ///
    /// Returns the first error after attempting all of them.
    pub fn close_all(&self) -> Result<(), TiffError> {
        let handles: Vec<StoreHandle> = self
            .lock()
            .iter()
            .enumerate()
            .filter(|(_, slot)| slot.entry.is_some())
            .map(|(index, slot)| StoreHandle {
                index: index as u32,
                generation: slot.generation,
            })
            .collect();

        let mut first_error = None;
        for handle in handles {
            if let Err(err) = self.close(handle) {
                first_error.get_or_insert(err);
            }
        }
        first_error.map_or(Ok(()), Err)
    }
}

impl Default for StoreRegistry {
    fn default() -> Self {
        Self::new()
    }
}

/// Canonical form of `path` when it exists, otherwise the path as given.
fn normalize(path: &Path) -> PathBuf {
    std::fs::canonicalize(path).unwrap_or_else(|_| path.to_path_buf())
}

// =============================================================================
// Tests
// =============================================================================
