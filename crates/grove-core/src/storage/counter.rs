//! Persistence port for the completed-session counter.
//!
//! The engine reads the counter once when it is built and writes it back on
//! every natural completion. Nothing else about a session is persisted here.

use std::sync::{Arc, Mutex};

use tracing::warn;

use super::database::Database;
use crate::error::{DatabaseError, Result};

/// Key under which the counter lives in the kv table.
pub const COMPLETED_COUNT_KEY: &str = "completed_count";

pub trait CounterStore: Send {
    /// Stored counter, or 0 when nothing has been stored yet.
    fn load(&self) -> Result<u64>;

    fn save(&mut self, count: u64) -> Result<()>;
}

/// Counter kept in memory only. Clones share the same value.
#[derive(Debug, Clone, Default)]
pub struct MemoryCounterStore {
    value: Arc<Mutex<u64>>,
}

impl MemoryCounterStore {
    pub fn new(initial: u64) -> Self {
        Self {
            value: Arc::new(Mutex::new(initial)),
        }
    }

    pub fn get(&self) -> u64 {
        self.value.lock().map(|v| *v).unwrap_or_default()
    }
}

impl CounterStore for MemoryCounterStore {
    fn load(&self) -> Result<u64> {
        Ok(self.get())
    }

    fn save(&mut self, count: u64) -> Result<()> {
        let mut value = self.value.lock().map_err(|_| DatabaseError::Poisoned)?;
        *value = count;
        Ok(())
    }
}

/// Counter stored as a decimal string in the SQLite kv table.
#[derive(Clone)]
pub struct KvCounterStore {
    db: Arc<Mutex<Database>>,
}

impl KvCounterStore {
    pub fn new(db: Arc<Mutex<Database>>) -> Self {
        Self { db }
    }
}

impl CounterStore for KvCounterStore {
    fn load(&self) -> Result<u64> {
        let db = self.db.lock().map_err(|_| DatabaseError::Poisoned)?;
        let raw = db.kv_get(COMPLETED_COUNT_KEY)?;
        Ok(match raw {
            Some(value) => value.trim().parse::<u64>().unwrap_or_else(|e| {
                warn!(value = %value, error = %e, "Stored completed count is not a number, using 0");
                0
            }),
            None => 0,
        })
    }

    fn save(&mut self, count: u64) -> Result<()> {
        let db = self.db.lock().map_err(|_| DatabaseError::Poisoned)?;
        db.kv_set(COMPLETED_COUNT_KEY, &count.to_string())?;
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn kv_store() -> KvCounterStore {
        let db = Database::open_memory().unwrap();
        KvCounterStore::new(Arc::new(Mutex::new(db)))
    }

    #[test]
    fn memory_store_round_trips_and_shares_value() {
        let mut store = MemoryCounterStore::new(2);
        let observer = store.clone();
        store.save(3).unwrap();
        assert_eq!(observer.load().unwrap(), 3);
    }

    #[test]
    fn kv_store_defaults_to_zero() {
        let store = kv_store();
        assert_eq!(store.load().unwrap(), 0);
    }

    #[test]
    fn kv_store_persists_count() {
        let mut store = kv_store();
        store.save(41).unwrap();
        store.save(42).unwrap();
        assert_eq!(store.load().unwrap(), 42);
    }

    #[test]
    fn kv_store_treats_garbage_as_zero() {
        let store = kv_store();
        store
            .db
            .lock()
            .unwrap()
            .kv_set(COMPLETED_COUNT_KEY, "lots")
            .unwrap();
        assert_eq!(store.load().unwrap(), 0);
    }
}
