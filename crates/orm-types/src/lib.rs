//! Validated text primitives shared across the order forwarder crates.

use chrono::NaiveDate;

/// Errors that can occur when creating validated text types.
#[derive(Debug, thiserror::Error, PartialEq, Eq)]
pub enum TextError {
    /// The input text was empty or contained only whitespace
    #[error("Text cannot be empty")]
    Empty,
    /// The input was not a calendar date in DICOM `YYYYMMDD` form
    #[error("Invalid DICOM date '{0}', expected YYYYMMDD")]
    InvalidDate(String),
}

/// A string type that guarantees non-empty content.
///
/// This type wraps a `String` and ensures it contains at least one non-whitespace character.
/// The input is automatically trimmed of leading and trailing whitespace during construction,
/// which also strips the space padding DICOM uses for even-length values.
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub struct NonEmptyText(String);

impl NonEmptyText {
    /// Creates a new `NonEmptyText` from the given input.
    ///
    /// # Errors
    ///
    /// Returns `Err(TextError::Empty)` if the trimmed input is empty.
    pub fn new(input: impl AsRef<str>) -> Result<Self, TextError> {
        let trimmed = input.as_ref().trim();
        if trimmed.is_empty() {
            return Err(TextError::Empty);
        }
        Ok(Self(trimmed.to_owned()))
    }

    /// Returns the inner string as a string slice.
    pub fn as_str(&self) -> &str {
        &self.0
    }
}

impl std::fmt::Display for NonEmptyText {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}", self.0)
    }
}

impl AsRef<str> for NonEmptyText {
    fn as_ref(&self) -> &str {
        &self.0
    }
}

impl serde::Serialize for NonEmptyText {
    fn serialize<S>(&self, serializer: S) -> Result<S::Ok, S::Error>
    where
        S: serde::Serializer,
    {
        serializer.serialize_str(&self.0)
    }
}

impl<'de> serde::Deserialize<'de> for NonEmptyText {
    fn deserialize<D>(deserializer: D) -> Result<Self, D::Error>
    where
        D: serde::Deserializer<'de>,
    {
        let s = String::deserialize(deserializer)?;
        NonEmptyText::new(&s).map_err(serde::de::Error::custom)
    }
}

/// The business key of a scheduled order.
///
/// Accession numbers are assigned by the scheduling system and are the only identifier used to
/// decide whether an order has already been forwarded.
#[derive(Debug, Clone, PartialEq, Eq, Hash, serde::Serialize, serde::Deserialize)]
#[serde(transparent)]
pub struct AccessionNumber(NonEmptyText);

impl AccessionNumber {
    pub fn new(input: impl AsRef<str>) -> Result<Self, TextError> {
        NonEmptyText::new(input).map(Self)
    }

    pub fn as_str(&self) -> &str {
        self.0.as_str()
    }
}

impl std::fmt::Display for AccessionNumber {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        self.0.fmt(f)
    }
}

impl AsRef<str> for AccessionNumber {
    fn as_ref(&self) -> &str {
        self.0.as_str()
    }
}

/// A calendar date in DICOM DA form (`YYYYMMDD`).
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash)]
pub struct DicomDate(NaiveDate);

impl DicomDate {
    const FORMAT: &'static str = "%Y%m%d";

    /// Parses a `YYYYMMDD` string.
    ///
    /// Exactly eight ASCII digits naming a real calendar date are accepted; separators and
    /// out-of-range days (for example `20250230`) are rejected.
    pub fn parse(input: &str) -> Result<Self, TextError> {
        let input = input.trim();
        if input.len() != 8 || !input.bytes().all(|b| b.is_ascii_digit()) {
            return Err(TextError::InvalidDate(input.to_owned()));
        }
        NaiveDate::parse_from_str(input, Self::FORMAT)
            .map(Self)
            .map_err(|_| TextError::InvalidDate(input.to_owned()))
    }
}

impl std::fmt::Display for DicomDate {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}", self.0.format(Self::FORMAT))
    }
}

impl std::str::FromStr for DicomDate {
    type Err = TextError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        Self::parse(s)
    }
}
