use std::collections::BTreeMap;
use std::sync::{Mutex, MutexGuard};

use time::OffsetDateTime;

use crate::{Key, Record, StoreError, GREETING_KIND};

/// Append-only persistence for guestbook records.
///
/// Implementations must never reuse a key and must return `query_recent`
/// results newest first, breaking `created_at` ties in a deterministic order.
pub trait RecordStore {
    /// Persist `content` under a fresh key, stamped with the current time.
    ///
    /// # Errors
    /// Returns `StoreUnavailable` when the write cannot be accepted.
    fn insert(&self, content: &[u8]) -> Result<Key, StoreError>;

    /// Fetch one record.
    ///
    /// # Errors
    /// Returns `NotFound` for unknown keys and `StoreUnavailable` on backend failure.
    fn get(&self, key: &Key) -> Result<Record, StoreError>;

    /// Up to `limit` records ordered by `created_at` descending.
    ///
    /// # Errors
    /// Returns `StoreUnavailable` on backend failure.
    fn query_recent(&self, limit: usize) -> Result<Vec<(Key, Record)>, StoreError>;
}

impl<S: RecordStore + ?Sized> RecordStore for &S {
    fn insert(&self, content: &[u8]) -> Result<Key, StoreError> {
        (**self).insert(content)
    }

    fn get(&self, key: &Key) -> Result<Record, StoreError> {
        (**self).get(key)
    }

    fn query_recent(&self, limit: usize) -> Result<Vec<(Key, Record)>, StoreError> {
        (**self).query_recent(limit)
    }
}

/// Process-local store. Ties in `created_at` are broken by descending id.
#[derive(Debug, Default)]
pub struct MemoryStore {
    state: Mutex<MemoryState>,
}

#[derive(Debug, Default)]
struct MemoryState {
    last_id: i64,
    records: BTreeMap<i64, Record>,
}

impl MemoryStore {
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Insert with an explicit timestamp instead of the current clock.
    ///
    /// # Errors
    /// Returns `StoreUnavailable` when the lock is poisoned or ids are exhausted.
    pub fn insert_at(&self, content: &[u8], created_at: OffsetDateTime) -> Result<Key, StoreError> {
        let mut state = self.lock()?;
        let id = state.last_id.checked_add(1).ok_or_else(|| {
            StoreError::StoreUnavailable("memory store key space exhausted".to_string())
        })?;
        let key = Key::greeting(id)?;
        state.last_id = id;
        state.records.insert(id, Record { content: content.to_vec(), created_at });
        Ok(key)
    }

    /// Number of stored records.
    ///
    /// # Errors
    /// Returns `StoreUnavailable` when the lock is poisoned.
    pub fn len(&self) -> Result<usize, StoreError> {
        Ok(self.lock()?.records.len())
    }

    /// # Errors
    /// Returns `StoreUnavailable` when the lock is poisoned.
    pub fn is_empty(&self) -> Result<bool, StoreError> {
        Ok(self.len()? == 0)
    }

    fn lock(&self) -> Result<MutexGuard<'_, MemoryState>, StoreError> {
        self.state
            .lock()
            .map_err(|_| StoreError::StoreUnavailable("memory store lock poisoned".to_string()))
    }
}

impl RecordStore for MemoryStore {
    fn insert(&self, content: &[u8]) -> Result<Key, StoreError> {
        self.insert_at(content, OffsetDateTime::now_utc())
    }

    fn get(&self, key: &Key) -> Result<Record, StoreError> {
        if key.kind() != GREETING_KIND {
            return Err(StoreError::NotFound(key.clone()));
        }
        let state = self.lock()?;
        state.records.get(&key.id()).cloned().ok_or_else(|| StoreError::NotFound(key.clone()))
    }

    fn query_recent(&self, limit: usize) -> Result<Vec<(Key, Record)>, StoreError> {
        let state = self.lock()?;
        let mut rows = state.records.iter().collect::<Vec<_>>();
        rows.sort_by(|(lhs_id, lhs), (rhs_id, rhs)| {
            rhs.created_at.cmp(&lhs.created_at).then_with(|| rhs_id.cmp(lhs_id))
        });

        rows.into_iter()
            .take(limit)
            .map(|(id, record)| Ok((Key::greeting(*id)?, record.clone())))
            .collect()
    }
}
