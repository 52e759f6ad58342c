//! Durable ledger of forwarded orders.
//!
//! The ledger maps an accession number to the time its order was last forwarded. It exists
//! only to suppress duplicate sends within the retention window; it does not mirror order
//! state, and rows are never deleted, only superseded.
//!
//! ## Storage Layout
//!
//! A single SQLite table:
//!
//! ```text
//! SentOrders (
//!     AccessionNumber TEXT PRIMARY KEY,
//!     SendDateTime    TEXT             -- RFC 3339 UTC, e.g. 2025-06-01T08:30:00.000000Z
//! )
//! ```
//!
//! [`SqliteDedupStore`] opens a fresh connection for every operation and closes it before
//! returning, so no connection outlives a single read or write.

use crate::constants::SENT_ORDERS_TABLE;
use crate::error::{StorageError, StorageResult};
use chrono::{DateTime, SecondsFormat, Utc};
use orm_types::AccessionNumber;
use rusqlite::{params, Connection, OptionalExtension};
use std::path::{Path, PathBuf};

/// The ledger operations the pipeline depends on.
pub trait DedupStore {
    /// Create the ledger table if it does not exist. Safe to call on every startup.
    fn ensure_schema(&self) -> StorageResult<()>;

    /// True iff `accession` was recorded as sent at or after `window_start`.
    fn was_sent_recently(
        &self,
        accession: &AccessionNumber,
        window_start: DateTime<Utc>,
    ) -> StorageResult<bool>;

    /// Record `accession` as sent at `sent_at`, replacing any earlier record (last write wins).
    fn record_sent(&self, accession: &AccessionNumber, sent_at: DateTime<Utc>)
        -> StorageResult<()>;
}

/// Render a timestamp in the fixed-width form stored in the ledger.
pub fn format_timestamp(at: DateTime<Utc>) -> String {
    at.to_rfc3339_opts(SecondsFormat::Micros, true)
}

fn parse_timestamp(raw: &str) -> StorageResult<DateTime<Utc>> {
    DateTime::parse_from_rfc3339(raw.trim())
        .map(|at| at.with_timezone(&Utc))
        .map_err(|_| StorageError::InvalidTimestamp(raw.to_owned()))
}

/// SQLite-file implementation of [`DedupStore`].
#[derive(Clone, Debug)]
pub struct SqliteDedupStore {
    path: PathBuf,
}

impl SqliteDedupStore {
    /// Create a store backed by the SQLite file at `path`.
    ///
    /// Nothing is opened until the first operation; the file is created on first use.
    pub fn new(path: impl Into<PathBuf>) -> Self {
        Self { path: path.into() }
    }

    pub fn path(&self) -> &Path {
        &self.path
    }

    fn open(&self) -> StorageResult<Connection> {
        Connection::open(&self.path).map_err(|source| StorageError::Open {
            path: self.path.clone(),
            source,
        })
    }

    /// The recorded send time for `accession`, if any.
    ///
    /// # Errors
    ///
    /// Returns [`StorageError::InvalidTimestamp`] if the stored value is not RFC 3339.
    pub fn last_sent_at(&self, accession: &AccessionNumber) -> StorageResult<Option<DateTime<Utc>>> {
        let conn = self.open()?;
        let raw: Option<String> = conn
            .query_row(
                &format!(
                    "SELECT SendDateTime FROM {SENT_ORDERS_TABLE} WHERE AccessionNumber = ?1"
                ),
                params![accession.as_str()],
                |row| row.get(0),
            )
            .optional()
            .map_err(StorageError::Query)?;

        raw.as_deref().map(parse_timestamp).transpose()
    }

    /// Number of accession numbers in the ledger.
    pub fn record_count(&self) -> StorageResult<u64> {
        let conn = self.open()?;
        conn.query_row(
            &format!("SELECT COUNT(*) FROM {SENT_ORDERS_TABLE}"),
            [],
            |row| row.get::<_, i64>(0),
        )
        .map(|count| count.max(0) as u64)
        .map_err(StorageError::Query)
    }
}

impl DedupStore for SqliteDedupStore {
    fn ensure_schema(&self) -> StorageResult<()> {
        let conn = self.open()?;
        conn.execute_batch(&format!(
            "CREATE TABLE IF NOT EXISTS {SENT_ORDERS_TABLE} (
                AccessionNumber TEXT PRIMARY KEY,
                SendDateTime TEXT
            )"
        ))
        .map_err(StorageError::Schema)?;

        tracing::debug!("dedup schema ready at {}", self.path.display());
        Ok(())
    }

    fn was_sent_recently(
        &self,
        accession: &AccessionNumber,
        window_start: DateTime<Utc>,
    ) -> StorageResult<bool> {
        // Compare parsed instants rather than strings so rows written with a different
        // fractional-second precision still compare correctly.
        Ok(self
            .last_sent_at(accession)?
            .is_some_and(|sent_at| sent_at >= window_start))
    }

    fn record_sent(
        &self,
        accession: &AccessionNumber,
        sent_at: DateTime<Utc>,
    ) -> StorageResult<()> {
        let conn = self.open()?;
        conn.execute(
            &format!(
                "INSERT OR REPLACE INTO {SENT_ORDERS_TABLE} (AccessionNumber, SendDateTime)
                 VALUES (?1, ?2)"
            ),
            params![accession.as_str(), format_timestamp(sent_at)],
        )
        .map_err(StorageError::Write)?;

        tracing::debug!("recorded {} as sent at {}", accession, sent_at);
        Ok(())
    }
}
