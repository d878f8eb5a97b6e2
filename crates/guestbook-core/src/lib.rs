//! Storage, key-encoding and listing core for the guestbook record service.
//!
//! Records are appended once and never mutated. Every record lives in the
//! `Greeting` collection and is addressed by a [`Key`] whose string form is
//! an opaque, URL-safe token.

mod extract;
mod key;
mod listing;
mod store;

pub use extract::{extract, ExtractedFields, RESULT_MARKER};
pub use key::{Key, GREETING_KIND};
pub use listing::ListingService;
pub use store::{MemoryStore, RecordStore};

use serde::Serialize;
use time::OffsetDateTime;

#[derive(Debug, Clone, thiserror::Error, Eq, PartialEq)]
pub enum StoreError {
    #[error("invalid key format: {0}")]
    InvalidKeyFormat(String),
    #[error("record not found: {0}")]
    NotFound(Key),
    #[error("store unavailable: {0}")]
    StoreUnavailable(String),
}

impl StoreError {
    #[must_use]
    pub fn is_invalid_key_format(&self) -> bool {
        matches!(self, Self::InvalidKeyFormat(_))
    }

    #[must_use]
    pub fn is_not_found(&self) -> bool {
        matches!(self, Self::NotFound(_))
    }

    #[must_use]
    pub fn is_store_unavailable(&self) -> bool {
        matches!(self, Self::StoreUnavailable(_))
    }
}

/// One stored submission. Content is kept byte-for-byte as submitted.
#[derive(Debug, Clone, Eq, PartialEq)]
pub struct Record {
    pub content: Vec<u8>,
    pub created_at: OffsetDateTime,
}

/// Listing entry derived from a record's content; never persisted.
#[derive(Debug, Clone, Serialize, Eq, PartialEq)]
pub struct Summary {
    pub key: Key,
    pub device: String,
    pub result: String,
}

impl Summary {
    #[must_use]
    pub fn from_record(key: Key, record: &Record) -> Self {
        let ExtractedFields { device, result } = extract(&record.content);
        Self { key, device, result }
    }
}
