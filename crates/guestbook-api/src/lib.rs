use std::path::PathBuf;

use anyhow::Result;
use guestbook_core::{Key, ListingService, Record, StoreError, Summary};
use guestbook_store_sqlite::{IntegrityReport, SchemaStatus, SqliteStore};
use serde::{Deserialize, Serialize};
use time::OffsetDateTime;
use tracing::debug;

pub const API_CONTRACT_VERSION: &str = "api.v1";
pub const DEFAULT_SUMMARY_LIMIT: usize = 50;
pub const DEFAULT_GUESTBOOK_LIMIT: usize = 10;

#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq)]
pub struct ListingLimits {
    pub summaries: usize,
    pub guestbook: usize,
}

impl Default for ListingLimits {
    fn default() -> Self {
        Self { summaries: DEFAULT_SUMMARY_LIMIT, guestbook: DEFAULT_GUESTBOOK_LIMIT }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
pub struct MigrateResult {
    pub dry_run: bool,
    pub current_version: i64,
    pub target_version: i64,
    pub would_apply_versions: Vec<i64>,
    pub after_version: Option<i64>,
    pub up_to_date: Option<bool>,
}

#[derive(Debug, Clone, Serialize, PartialEq, Eq)]
pub struct SignResult {
    pub key: Key,
}

/// A full guestbook entry; content is decoded lossily for display.
#[derive(Debug, Clone, Serialize, PartialEq, Eq)]
pub struct EntryView {
    pub key: Key,
    #[serde(with = "time::serde::rfc3339")]
    pub created_at: OffsetDateTime,
    pub content: String,
}

impl EntryView {
    #[must_use]
    pub fn new(key: Key, record: &Record) -> Self {
        Self {
            key,
            created_at: record.created_at,
            content: String::from_utf8_lossy(&record.content).into_owned(),
        }
    }
}

#[derive(Debug, Clone)]
pub struct GuestbookApi {
    db_path: PathBuf,
    limits: ListingLimits,
}

impl GuestbookApi {
    #[must_use]
    pub fn new(db_path: PathBuf) -> Self {
        Self::with_limits(db_path, ListingLimits::default())
    }

    #[must_use]
    pub fn with_limits(db_path: PathBuf, limits: ListingLimits) -> Self {
        Self { db_path, limits }
    }

    #[must_use]
    pub fn limits(&self) -> ListingLimits {
        self.limits
    }

    fn open_store(&self) -> Result<SqliteStore> {
        SqliteStore::open(&self.db_path)
    }

    fn open_listing(&self) -> Result<ListingService<SqliteStore>, StoreError> {
        let mut store = self.open_store().map_err(store_unavailable)?;
        store.migrate().map_err(store_unavailable)?;
        Ok(ListingService::new(store))
    }

    /// Inspect schema status without mutating data.
    ///
    /// # Errors
    /// Returns an error when the `SQLite` database cannot be opened or queried.
    pub fn schema_status(&self) -> Result<SchemaStatus> {
        let store = self.open_store()?;
        store.schema_status()
    }

    /// Apply pending migrations, or return planned versions for dry-run mode.
    ///
    /// # Errors
    /// Returns an error when migration planning or execution fails.
    pub fn migrate(&self, dry_run: bool) -> Result<MigrateResult> {
        let mut store = self.open_store()?;
        let before = store.schema_status()?;
        if dry_run {
            return Ok(MigrateResult {
                dry_run: true,
                current_version: before.current_version,
                target_version: before.target_version,
                would_apply_versions: before.pending_versions,
                after_version: None,
                up_to_date: None,
            });
        }

        let planned_versions = before.pending_versions;
        store.migrate()?;
        let after = store.schema_status()?;
        Ok(MigrateResult {
            dry_run: false,
            current_version: before.current_version,
            target_version: before.target_version,
            would_apply_versions: planned_versions,
            after_version: Some(after.current_version),
            up_to_date: Some(after.pending_versions.is_empty()),
        })
    }

    /// Run the store's integrity check.
    ///
    /// # Errors
    /// Returns an error when the database cannot be opened or checked.
    pub fn integrity_check(&self) -> Result<IntegrityReport> {
        let store = self.open_store()?;
        store.integrity_check()
    }

    /// Append one submission.
    ///
    /// # Errors
    /// Returns `StoreUnavailable` when the database cannot be opened, migrated or written.
    pub fn sign(&self, content: &[u8]) -> Result<SignResult, StoreError> {
        let key = self.open_listing()?.submit(content)?;
        debug!(key = %key, "signed guestbook");
        Ok(SignResult { key })
    }

    /// Newest summaries; `None` uses the configured summary limit.
    ///
    /// # Errors
    /// Returns `StoreUnavailable` on backend failure.
    pub fn list_summaries(&self, limit: Option<usize>) -> Result<Vec<Summary>, StoreError> {
        self.open_listing()?.list_summaries(limit.unwrap_or(self.limits.summaries))
    }

    /// Newest full entries; `None` uses the configured guestbook limit.
    ///
    /// # Errors
    /// Returns `StoreUnavailable` on backend failure.
    pub fn list_full(&self, limit: Option<usize>) -> Result<Vec<EntryView>, StoreError> {
        let rows = self.open_listing()?.list_full(limit.unwrap_or(self.limits.guestbook))?;
        Ok(rows.into_iter().map(|(key, record)| EntryView::new(key, &record)).collect())
    }

    /// Fetch one record by its key token.
    ///
    /// The token is decoded before the database is opened, so a malformed
    /// token is `InvalidKeyFormat` whatever state the store is in.
    ///
    /// # Errors
    /// Returns `InvalidKeyFormat`, `NotFound` or `StoreUnavailable`.
    pub fn get_item(&self, token: &str) -> Result<Record, StoreError> {
        let key = Key::decode(token)?;
        self.open_listing()?.get(&key)
    }
}

fn store_unavailable(err: anyhow::Error) -> StoreError {
    StoreError::StoreUnavailable(format!("{err:#}"))
}
