//! DICOM UID generation and validation.
//!
//! Every outbound order carries a SOP Instance UID that must be globally unique and must never
//! be reused, even when the same accession number is forwarded again after the retention window
//! has elapsed.
//!
//! This crate provides:
//! - A wrapper type ([`DicomUid`]) that *guarantees* a syntactically valid UID once constructed.
//! - Fresh UID allocation under the `2.25` root, which PS3.5 B.2 reserves for UIDs derived from
//!   a UUID rendered as a single unsigned decimal integer.
//! - Well-known SOP Class UIDs used by the order forwarder.
//!
//! ## UID syntax (PS3.5 section 9)
//! - At most 64 characters
//! - Components separated by `.`
//! - Each component is one or more digits `0-9`
//! - A component may not have a leading zero unless it is exactly `0`
//!
//! Example: `2.25.113059749145936325402354257176981405696`

mod service;

pub use service::{DicomUid, UID_MAX_LEN, UUID_DERIVED_ROOT};

/// Modality Worklist Information Model - FIND SOP Class.
pub const MODALITY_WORKLIST_FIND_SOP_CLASS: &str = "1.2.840.10008.5.1.4.31";

/// General Purpose Scheduled Procedure Step SOP Class.
pub const GP_SCHEDULED_PROCEDURE_STEP_SOP_CLASS: &str = "1.2.840.10008.5.1.4.32.2";

/// Error type for UID operations.
#[derive(Debug, thiserror::Error)]
pub enum UidError {
    /// Invalid input provided
    #[error("Invalid input: {0}")]
    InvalidInput(String),
}

/// Result type for UID operations.
pub type UidResult<T> = Result<T, UidError>;
