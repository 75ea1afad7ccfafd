// Order persistence: whole-collection load/replace over a backing medium
pub mod json_file;
pub mod redis_store;

pub use json_file::JsonFileStore;
pub use redis_store::RedisOrderStore;

use crate::error::{Error, Result};
use crate::models::StopLossOrder;
use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::{Mutex, PoisonError};

/// Exclusive hold on a store, released when dropped
///
/// Stores shared between processes hand out a real lock; in-process stores
/// return an empty guard.
#[must_use = "the store is unlocked as soon as the guard is dropped"]
#[derive(Default)]
pub struct StoreLock {
    _held: Option<Box<dyn Send>>,
}

impl StoreLock {
    pub fn unlocked() -> Self {
        Self::default()
    }

    pub(crate) fn holding(guard: impl Send + 'static) -> Self {
        Self {
            _held: Some(Box::new(guard)),
        }
    }
}

/// Durable home of the order collection
///
/// `save` replaces the whole collection atomically: a concurrent or later
/// `load` sees either the previous snapshot or the new one, never a mix.
/// Read-modify-write callers hold [`OrderStore::lock`] across their `load`
/// and `save` so writers in other processes cannot interleave.
pub trait OrderStore: Send + Sync {
    /// Orders in insertion order. Nothing persisted yet is an empty vec.
    fn load(&self) -> Result<Vec<StopLossOrder>>;

    /// Replace the persisted collection with `orders`
    fn save(&self, orders: &[StopLossOrder]) -> Result<()>;

    /// Block until no other writer holds the store
    fn lock(&self) -> Result<StoreLock> {
        Ok(StoreLock::unlocked())
    }
}

impl<S: OrderStore + ?Sized> OrderStore for Box<S> {
    fn load(&self) -> Result<Vec<StopLossOrder>> {
        (**self).load()
    }

    fn save(&self, orders: &[StopLossOrder]) -> Result<()> {
        (**self).save(orders)
    }

    fn lock(&self) -> Result<StoreLock> {
        (**self).lock()
    }
}

/// Serialized form shared by every backend
///
/// Numbers are written in their canonical `f64` form, so a hand-written
/// `1900` comes back as `1900.0` on the first save and is stable after that.
pub fn encode(orders: &[StopLossOrder]) -> Result<String> {
    serde_json::to_string_pretty(orders).map_err(|e| Error::StorageUnavailable(Box::new(e)))
}

/// Blank content counts as an empty collection
pub fn decode(raw: &str) -> Result<Vec<StopLossOrder>> {
    if raw.trim().is_empty() {
        return Ok(Vec::new());
    }
    serde_json::from_str(raw).map_err(Error::CorruptData)
}

/// In-process store holding the encoded snapshot
///
/// Used for dry runs; counts saves so callers can check write volume.
#[derive(Debug, Default)]
pub struct MemoryStore {
    snapshot: Mutex<Option<String>>,
    saves: AtomicUsize,
}

impl MemoryStore {
    pub fn new() -> Self {
        Self::default()
    }

    /// Start from raw persisted content (may be invalid, for recovery tests)
    pub fn with_content(raw: impl Into<String>) -> Self {
        Self {
            snapshot: Mutex::new(Some(raw.into())),
            saves: AtomicUsize::new(0),
        }
    }

    /// Current persisted bytes, if anything was ever written
    pub fn raw(&self) -> Option<String> {
        self.snapshot
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .clone()
    }

    pub fn save_count(&self) -> usize {
        self.saves.load(Ordering::SeqCst)
    }
}

impl OrderStore for MemoryStore {
    fn load(&self) -> Result<Vec<StopLossOrder>> {
        match self.raw() {
            Some(raw) => decode(&raw),
            None => Ok(Vec::new()),
        }
    }

    fn save(&self, orders: &[StopLossOrder]) -> Result<()> {
        let encoded = encode(orders)?;
        *self.snapshot.lock().unwrap_or_else(PoisonError::into_inner) = Some(encoded);
        self.saves.fetch_add(1, Ordering::SeqCst);
        Ok(())
    }
}
