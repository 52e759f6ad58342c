//! DIMSE message support for the worklist-to-order forwarder.
//!
//! This crate provides the **message content** exchanged with the scheduling and
//! order-management services, built on the dicom-rs object model:
//! - [`command`] builds C-FIND and C-STORE request command sets and classifies response status
//! - [`codec`] encodes and decodes command sets and data sets for a negotiated transfer syntax
//! - [`WorkItem`] is the domain view of one worklist response identifier
//! - [`OutboundMessage`] is the domain view of one order sent downstream
//!
//! It performs no I/O; associations live in `orm-core`.

pub mod codec;
pub mod command;
pub mod order;
pub mod worklist;

pub use command::StatusClass;
pub use order::OutboundMessage;
pub use worklist::{worklist_query, WorkItem};

/// Errors returned by the `dicom-wire` boundary crate.
#[derive(Debug, thiserror::Error)]
pub enum WireError {
    #[error("unsupported transfer syntax: {0}")]
    UnsupportedTransferSyntax(String),

    #[error("failed to encode data set: {0}")]
    Encode(String),

    #[error("failed to decode data set: {0}")]
    Decode(String),

    #[error("command set has no {0}")]
    MissingAttribute(&'static str),
}

/// Type alias for Results that can fail with a [`WireError`].
pub type WireResult<T> = Result<T, WireError>;

/// Render an error together with its chain of sources on one line.
pub fn describe_error(err: &(dyn std::error::Error + 'static)) -> String {
    let mut message = err.to_string();
    let mut source = err.source();
    while let Some(cause) = source {
        message.push_str(": ");
        message.push_str(&cause.to_string());
        source = cause.source();
    }
    message
}
