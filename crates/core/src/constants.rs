//! Constants used throughout the forwarder core crate.
//!
//! This module contains the ledger schema names, DIMSE message IDs and defaults so they stay
//! consistent across the codebase.

/// Default SQLite ledger file when no explicit path is configured.
pub const DEFAULT_DB_PATH: &str = "sent_orders.db";

/// Ledger table holding one row per forwarded accession number.
pub const SENT_ORDERS_TABLE: &str = "SentOrders";

/// Default retention window in days.
pub const DEFAULT_RETENTION_DAYS: i64 = 7;

/// Longest accepted retention window in days (one hundred years).
pub const MAX_RETENTION_DAYS: i64 = 36_500;

/// Default connect, read and write timeout for DIMSE associations, in seconds.
pub const DEFAULT_NETWORK_TIMEOUT_SECS: u64 = 30;

/// Maximum AE title length (PS3.5 AE value representation).
pub const AE_TITLE_MAX_LEN: usize = 16;

/// Message ID of the worklist C-FIND request.
pub const QUERY_MESSAGE_ID: u16 = 1;

/// Message ID of every outbound order C-STORE request.
pub const OUTBOUND_MESSAGE_ID: u16 = 1;
