use crate::{Key, Record, RecordStore, StoreError, Summary};

/// Request-facing operations over a [`RecordStore`].
///
/// Holds no state of its own; construct once and share by reference.
#[derive(Debug, Clone)]
pub struct ListingService<S> {
    store: S,
}

impl<S: RecordStore> ListingService<S> {
    #[must_use]
    pub fn new(store: S) -> Self {
        Self { store }
    }

    #[must_use]
    pub fn store(&self) -> &S {
        &self.store
    }

    /// Append one submission.
    ///
    /// # Errors
    /// Returns `StoreUnavailable` when the store rejects the write.
    pub fn submit(&self, content: &[u8]) -> Result<Key, StoreError> {
        self.store.insert(content)
    }

    /// Newest `limit` records reduced to their device/result summary, in store order.
    ///
    /// # Errors
    /// Propagates the store's query failure; no partial listing is returned.
    pub fn list_summaries(&self, limit: usize) -> Result<Vec<Summary>, StoreError> {
        let rows = self.store.query_recent(limit)?;
        Ok(rows.into_iter().map(|(key, record)| Summary::from_record(key, &record)).collect())
    }

    /// Newest `limit` records with their full content.
    ///
    /// # Errors
    /// Propagates the store's query failure.
    pub fn list_full(&self, limit: usize) -> Result<Vec<(Key, Record)>, StoreError> {
        self.store.query_recent(limit)
    }

    /// Resolve a key token and fetch its record.
    ///
    /// # Errors
    /// Returns `InvalidKeyFormat` for malformed tokens, `NotFound` for unknown keys.
    pub fn get_one(&self, token: &str) -> Result<Record, StoreError> {
        let key = Key::decode(token)?;
        self.get(&key)
    }

    /// Fetch the record behind an already decoded key.
    ///
    /// # Errors
    /// Returns `NotFound` for unknown keys and `StoreUnavailable` on backend failure.
    pub fn get(&self, key: &Key) -> Result<Record, StoreError> {
        self.store.get(key)
    }
}
