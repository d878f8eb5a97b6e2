use std::path::Path;

use anyhow::{anyhow, Context, Result};
use guestbook_core::{Key, Record, RecordStore, StoreError, GREETING_KIND};
use rusqlite::{params, Connection, OptionalExtension};
use serde::{Deserialize, Serialize};
use time::OffsetDateTime;
use tracing::{debug, info};

const LATEST_SCHEMA_VERSION: i64 = 1;

const CREATE_SCHEMA_MIGRATIONS_SQL: &str = r"
CREATE TABLE IF NOT EXISTS schema_migrations (
  version INTEGER PRIMARY KEY,
  applied_at TEXT NOT NULL
);
";

// AUTOINCREMENT keeps SQLite from handing out the id of a vanished row again.
const MIGRATION_001_SQL: &str = r"
CREATE TABLE IF NOT EXISTS greetings (
  id INTEGER PRIMARY KEY AUTOINCREMENT,
  content BLOB NOT NULL,
  created_at_ns INTEGER NOT NULL
);

CREATE INDEX IF NOT EXISTS idx_greetings_created_at ON greetings(created_at_ns DESC, id DESC);
";

pub struct SqliteStore {
    conn: Connection,
}

#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
pub struct SchemaStatus {
    pub current_version: i64,
    pub target_version: i64,
    pub pending_versions: Vec<i64>,
}

#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
pub struct IntegrityReport {
    pub quick_check_ok: bool,
    pub quick_check_message: String,
    pub record_count: i64,
    pub schema_status: SchemaStatus,
}

impl SqliteStore {
    /// Open a SQLite-backed guestbook store and configure required runtime pragmas.
    ///
    /// # Errors
    /// Returns an error when the database cannot be opened or pragmas cannot be applied.
    pub fn open(path: &Path) -> Result<Self> {
        let conn = Connection::open(path)
            .with_context(|| format!("failed to open sqlite database at {}", path.display()))?;

        conn.execute_batch(
            "PRAGMA journal_mode = WAL;
             PRAGMA busy_timeout = 5000;",
        )
        .context("failed to configure sqlite pragmas")?;

        Ok(Self { conn })
    }

    /// Report current and target schema versions plus pending migrations.
    ///
    /// # Errors
    /// Returns an error when schema metadata cannot be read or initialized.
    pub fn schema_status(&self) -> Result<SchemaStatus> {
        self.conn
            .execute_batch(CREATE_SCHEMA_MIGRATIONS_SQL)
            .context("failed to apply schema_migrations table")?;
        let current_version = current_schema_version(&self.conn)?;
        let pending_versions = if current_version < LATEST_SCHEMA_VERSION {
            ((current_version + 1)..=LATEST_SCHEMA_VERSION).collect::<Vec<_>>()
        } else {
            Vec::new()
        };

        Ok(SchemaStatus { current_version, target_version: LATEST_SCHEMA_VERSION, pending_versions })
    }

    /// Apply all forward migrations up to the latest supported schema version.
    ///
    /// # Errors
    /// Returns an error when a migration step fails or the database is newer than this build.
    pub fn migrate(&mut self) -> Result<()> {
        self.conn
            .execute_batch(CREATE_SCHEMA_MIGRATIONS_SQL)
            .context("failed to apply schema_migrations table")?;

        let version = current_schema_version(&self.conn)?;
        if version > LATEST_SCHEMA_VERSION {
            return Err(anyhow!(
                "unsupported schema version {version}; expected {LATEST_SCHEMA_VERSION}"
            ));
        }

        if version < 1 {
            let tx = self.conn.transaction().context("failed to start migration v1 transaction")?;
            tx.execute_batch(MIGRATION_001_SQL).context("failed to create greetings table")?;
            record_schema_version(&tx, 1)?;
            tx.commit().context("failed to commit migration v1")?;
            info!(version = 1, "applied guestbook schema migration");
        }

        Ok(())
    }

    /// Run `PRAGMA quick_check` and summarize the store.
    ///
    /// # Errors
    /// Returns an error when the checks cannot be executed.
    pub fn integrity_check(&self) -> Result<IntegrityReport> {
        let quick_check_message: String = self
            .conn
            .query_row("PRAGMA quick_check", [], |row| row.get::<_, String>(0))
            .context("failed to run PRAGMA quick_check")?;

        let schema_status = self.schema_status()?;
        let record_count = if schema_status.current_version >= 1 {
            self.conn
                .query_row("SELECT COUNT(*) FROM greetings", [], |row| row.get::<_, i64>(0))
                .context("failed to count greetings")?
        } else {
            0
        };

        Ok(IntegrityReport {
            quick_check_ok: quick_check_message == "ok",
            quick_check_message,
            record_count,
            schema_status,
        })
    }

    /// Insert with an explicit timestamp instead of the current clock.
    ///
    /// # Errors
    /// Returns `StoreUnavailable` when the write fails or the timestamp cannot be stored.
    pub fn insert_at(&self, content: &[u8], created_at: OffsetDateTime) -> Result<Key, StoreError> {
        let created_at_ns = i64::try_from(created_at.unix_timestamp_nanos()).map_err(|_| {
            StoreError::StoreUnavailable(format!("timestamp out of storable range: {created_at}"))
        })?;

        self.conn
            .execute(
                "INSERT INTO greetings(content, created_at_ns) VALUES (?1, ?2)",
                params![content, created_at_ns],
            )
            .map_err(unavailable("failed to insert greeting"))?;

        let id = self.conn.last_insert_rowid();
        debug!(id, bytes = content.len(), "inserted greeting");
        Key::greeting(id)
    }
}

impl RecordStore for SqliteStore {
    fn insert(&self, content: &[u8]) -> Result<Key, StoreError> {
        self.insert_at(content, OffsetDateTime::now_utc())
    }

    fn get(&self, key: &Key) -> Result<Record, StoreError> {
        if key.kind() != GREETING_KIND {
            return Err(StoreError::NotFound(key.clone()));
        }

        let row = self
            .conn
            .query_row(
                "SELECT content, created_at_ns FROM greetings WHERE id = ?1",
                params![key.id()],
                |row| Ok((row.get::<_, Vec<u8>>(0)?, row.get::<_, i64>(1)?)),
            )
            .optional()
            .map_err(unavailable("failed to load greeting"))?;

        let Some((content, created_at_ns)) = row else {
            debug!(id = key.id(), "greeting not found");
            return Err(StoreError::NotFound(key.clone()));
        };

        Ok(Record { content, created_at: from_unix_nanos(created_at_ns)? })
    }

    fn query_recent(&self, limit: usize) -> Result<Vec<(Key, Record)>, StoreError> {
        let limit = i64::try_from(limit).unwrap_or(i64::MAX);
        let mut stmt = self
            .conn
            .prepare(
                "SELECT id, content, created_at_ns
                 FROM greetings
                 ORDER BY created_at_ns DESC, id DESC
                 LIMIT ?1",
            )
            .map_err(unavailable("failed to prepare recent greetings query"))?;

        let rows = stmt
            .query_map(params![limit], |row| {
                Ok((row.get::<_, i64>(0)?, row.get::<_, Vec<u8>>(1)?, row.get::<_, i64>(2)?))
            })
            .map_err(unavailable("failed to query recent greetings"))?;

        let mut records = Vec::new();
        for row in rows {
            let (id, content, created_at_ns) =
                row.map_err(unavailable("failed to read greeting row"))?;
            let record = Record { content, created_at: from_unix_nanos(created_at_ns)? };
            records.push((Key::greeting(id)?, record));
        }

        debug!(limit, returned = records.len(), "queried recent greetings");
        Ok(records)
    }
}

fn unavailable(context: &'static str) -> impl Fn(rusqlite::Error) -> StoreError {
    move |err| StoreError::StoreUnavailable(format!("{context}: {err}"))
}

fn from_unix_nanos(value: i64) -> Result<OffsetDateTime, StoreError> {
    OffsetDateTime::from_unix_timestamp_nanos(i128::from(value)).map_err(|err| {
        StoreError::StoreUnavailable(format!("stored timestamp {value} is invalid: {err}"))
    })
}

fn current_schema_version(conn: &Connection) -> Result<i64> {
    let version = conn
        .query_row("SELECT COALESCE(MAX(version), 0) FROM schema_migrations", [], |row| {
            row.get::<_, i64>(0)
        })
        .context("failed to read current schema version")?;
    Ok(version)
}

fn record_schema_version(conn: &Connection, version: i64) -> Result<()> {
    let now = now_rfc3339()?;
    conn.execute(
        "INSERT OR IGNORE INTO schema_migrations(version, applied_at) VALUES (?1, ?2)",
        params![version, now],
    )
    .with_context(|| format!("failed to record migration version {version}"))?;
    Ok(())
}

fn now_rfc3339() -> Result<String> {
    OffsetDateTime::now_utc()
        .format(&time::format_description::well_known::Rfc3339)
        .context("failed to format RFC3339 timestamp")
}
