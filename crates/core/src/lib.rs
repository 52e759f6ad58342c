//! # Order Forwarder Core
//!
//! Core logic for forwarding scheduled worklist items to an order-management service exactly
//! once per retention window.
//!
//! This crate contains:
//! - The candidate fetcher (Modality Worklist C-FIND)
//! - The SQLite dedup ledger
//! - The outbound message builder
//! - The dispatcher (order delivery by C-STORE)
//! - The pipeline that drives them in order
//!
//! **No CLI concerns**: argument parsing, `.env` loading and logging setup belong in the
//! `order-orm` binary.

pub mod builder;
pub mod config;
pub mod constants;
pub mod dedup;
mod dimse;
pub mod dispatch;
pub mod error;
pub mod fetch;
pub mod pipeline;

#[cfg(test)]
mod testing;

pub use builder::MessageBuilder;
pub use config::{CoreConfig, Endpoint, WorklistFilter};
pub use dedup::{DedupStore, SqliteDedupStore};
pub use dispatch::{DimseSender, Dispatcher};
pub use error::{
    BuildError, ConfigError, DimseError, DispatchError, FetchError, PipelineError,
    PipelineResult, StorageError,
};
pub use fetch::{CandidateFetcher, DimseWorklist};
pub use pipeline::{Pipeline, RunReport};

pub use orm_types::{AccessionNumber, DicomDate, NonEmptyText};

/// The pipeline wired to its production adapters.
pub type DimsePipeline = Pipeline<SqliteDedupStore, DimseWorklist, DimseSender>;

impl DimsePipeline {
    /// Build the production pipeline from validated configuration.
    pub fn from_config(cfg: &CoreConfig) -> Self {
        Pipeline::new(
            SqliteDedupStore::new(cfg.db_path()),
            DimseWorklist::from_config(cfg),
            DimseSender::from_config(cfg),
            cfg.retention_window(),
        )
    }
}
