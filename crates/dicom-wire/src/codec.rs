//! Byte encoding of command sets and data sets.
//!
//! Command sets always travel in Implicit VR Little Endian (PS3.7 6.3.1). Data sets use the
//! transfer syntax accepted for the presentation context they travel on.

use crate::{describe_error, WireError, WireResult};
use dicom_encoding::transfer_syntax::TransferSyntaxIndex;
use dicom_object::InMemDicomObject;
use dicom_transfer_syntax_registry::TransferSyntaxRegistry;

/// Implicit VR Little Endian, the transfer syntax of every command set.
pub const IMPLICIT_VR_LITTLE_ENDIAN: &str = "1.2.840.10008.1.2";

/// Encode a command set.
pub fn encode_command(command: &InMemDicomObject) -> WireResult<Vec<u8>> {
    encode_dataset(command, IMPLICIT_VR_LITTLE_ENDIAN)
}

/// Decode a command set.
pub fn decode_command(bytes: &[u8]) -> WireResult<InMemDicomObject> {
    decode_dataset(bytes, IMPLICIT_VR_LITTLE_ENDIAN)
}

/// Encode a data set in the transfer syntax identified by `transfer_syntax_uid`.
pub fn encode_dataset(
    dataset: &InMemDicomObject,
    transfer_syntax_uid: &str,
) -> WireResult<Vec<u8>> {
    let uid = normalise_uid(transfer_syntax_uid);
    let ts = TransferSyntaxRegistry
        .get(uid)
        .ok_or_else(|| WireError::UnsupportedTransferSyntax(uid.to_owned()))?;

    let mut bytes = Vec::with_capacity(256);
    dataset
        .write_dataset_with_ts(&mut bytes, ts)
        .map_err(|e| WireError::Encode(describe_error(&e)))?;
    Ok(bytes)
}

/// Decode a data set encoded in the transfer syntax identified by `transfer_syntax_uid`.
pub fn decode_dataset(bytes: &[u8], transfer_syntax_uid: &str) -> WireResult<InMemDicomObject> {
    let uid = normalise_uid(transfer_syntax_uid);
    let ts = TransferSyntaxRegistry
        .get(uid)
        .ok_or_else(|| WireError::UnsupportedTransferSyntax(uid.to_owned()))?;

    InMemDicomObject::read_dataset_with_ts(bytes, ts)
        .map_err(|e| WireError::Decode(describe_error(&e)))
}

// UIDs negotiated on the wire may carry a trailing NUL pad.
fn normalise_uid(uid: &str) -> &str {
    uid.trim_end_matches(|c: char| c == '\0' || c == ' ')
}
