//! Internal implementation of the UID wrapper type.

use crate::{UidError, UidResult};
use std::{fmt, str::FromStr};
use uuid::Uuid;

/// Maximum length of a DICOM UID in characters.
pub const UID_MAX_LEN: usize = 64;

/// Root under which UUID-derived UIDs are allocated.
pub const UUID_DERIVED_ROOT: &str = "2.25";

/// A syntactically valid DICOM UID.
///
/// # Construction
/// - [`DicomUid::generate`] allocates a fresh UID (for new SOP instances).
/// - [`DicomUid::parse`] validates an externally supplied UID.
///
/// Once you have a `DicomUid`, you can safely place it in a `UI` element without further checks.
#[derive(Clone, Debug, PartialEq, Eq, Hash)]
pub struct DicomUid(String);

impl DicomUid {
    /// Generates a new UID of the form `2.25.<uuid-as-decimal>`.
    ///
    /// The UUID is a random version 4 UUID, so two calls never return the same value in
    /// practice. The result is at most 44 characters long.
    pub fn generate() -> Self {
        Self(format!("{}.{}", UUID_DERIVED_ROOT, Uuid::new_v4().as_u128()))
    }

    /// Validates and wraps a UID string.
    ///
    /// Trailing NUL padding (as used on the wire for odd-length UIDs) is not accepted here;
    /// callers must strip it first.
    ///
    /// # Errors
    ///
    /// Returns [`UidError::InvalidInput`] if `input` is not a valid UID.
    pub fn parse(input: &str) -> UidResult<Self> {
        if Self::is_valid(input) {
            return Ok(Self(input.to_owned()));
        }
        Err(UidError::InvalidInput(format!(
            "UID must be at most {UID_MAX_LEN} characters of dot-separated numeric components without leading zeros, got: '{input}'"
        )))
    }

    /// Returns true if `input` is a syntactically valid UID.
    pub fn is_valid(input: &str) -> bool {
        if input.is_empty() || input.len() > UID_MAX_LEN {
            return false;
        }
        input.split('.').all(|component| {
            !component.is_empty()
                && component.bytes().all(|b| b.is_ascii_digit())
                && (component == "0" || !component.starts_with('0'))
        })
    }

    pub fn as_str(&self) -> &str {
        &self.0
    }
}

impl fmt::Display for DicomUid {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.0)
    }
}

impl FromStr for DicomUid {
    type Err = UidError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        DicomUid::parse(s)
    }
}

impl AsRef<str> for DicomUid {
    fn as_ref(&self) -> &str {
        &self.0
    }
}

#[cfg(feature = "serde")]
impl serde::Serialize for DicomUid {
    fn serialize<S>(&self, serializer: S) -> Result<S::Ok, S::Error>
    where
        S: serde::Serializer,
    {
        serializer.serialize_str(&self.0)
    }
}

#[cfg(feature = "serde")]
impl<'de> serde::Deserialize<'de> for DicomUid {
    fn deserialize<D>(deserializer: D) -> Result<Self, D::Error>
    where
        D: serde::Deserializer<'de>,
    {
        let s = String::deserialize(deserializer)?;
        DicomUid::parse(&s).map_err(serde::de::Error::custom)
    }
}
