//! Implementation of [`ResourceUuid`].

use crate::{UuidError, UuidResult};
use std::{fmt, str::FromStr};

/// Re-exported for convenience.
pub use ::uuid::Uuid;

/// Prefix of the reference form of a resource identity.
pub const URN_UUID_PREFIX: &str = "urn:uuid:";

/// Identity of one resource inside a PIO document.
///
/// Once constructed, the wrapped value is a valid UUID. Construction accepts the hyphenated form
/// in either case; display is always lowercase and hyphenated.
///
/// # Construction
/// - [`ResourceUuid::new`] generates a fresh random identity.
/// - [`ResourceUuid::parse`] validates a bare identity.
/// - [`ResourceUuid::parse_reference`] validates an identity that may carry the `urn:uuid:` prefix.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct ResourceUuid(Uuid);

impl Default for ResourceUuid {
    fn default() -> Self {
        Self::new()
    }
}

impl ResourceUuid {
    /// Generates a new random (version 4) identity.
    pub fn new() -> Self {
        Self(Uuid::new_v4())
    }

    /// Validates and parses a bare hyphenated UUID.
    ///
    /// # Errors
    ///
    /// Returns [`UuidError::InvalidInput`] if `input` is not a 36-character hyphenated UUID.
    pub fn parse(input: &str) -> UuidResult<Self> {
        if !Self::is_valid(input) {
            return Err(UuidError::InvalidInput(format!(
                "UUID must be 36 hex characters in 8-4-4-4-12 groups, got: '{}'",
                input
            )));
        }
        Uuid::parse_str(input)
            .map(Self)
            .map_err(|e| UuidError::InvalidInput(format!("invalid UUID '{}': {}", input, e)))
    }

    /// Parses either the bare or the `urn:uuid:` reference form.
    ///
    /// # Errors
    ///
    /// Returns [`UuidError::InvalidInput`] if the remainder after the optional prefix is not a
    /// hyphenated UUID.
    pub fn parse_reference(input: &str) -> UuidResult<Self> {
        Self::parse(strip_reference_prefix(input))
    }

    /// Returns true if `input` is a syntactically valid hyphenated UUID.
    ///
    /// This is a purely syntactic check and is used to filter content-store keys.
    pub fn is_valid(input: &str) -> bool {
        let bytes = input.as_bytes();
        bytes.len() == 36
            && bytes.iter().enumerate().all(|(i, b)| match i {
                8 | 13 | 18 | 23 => *b == b'-',
                _ => b.is_ascii_hexdigit(),
            })
    }

    /// Returns the reference form, `urn:uuid:<uuid>`.
    pub fn to_reference(&self) -> String {
        format!("{}{}", URN_UUID_PREFIX, self)
    }

    /// Returns the inner `uuid::Uuid`.
    pub fn uuid(&self) -> Uuid {
        self.0
    }
}

/// Strips a leading `urn:uuid:` prefix if present.
pub(crate) fn strip_reference_prefix(input: &str) -> &str {
    input.strip_prefix(URN_UUID_PREFIX).unwrap_or(input)
}

impl fmt::Display for ResourceUuid {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.0.hyphenated())
    }
}

impl FromStr for ResourceUuid {
    type Err = UuidError;

    /// Equivalent to [`ResourceUuid::parse_reference`].
    fn from_str(s: &str) -> Result<Self, Self::Err> {
        ResourceUuid::parse_reference(s)
    }
}

#[cfg(feature = "serde")]
impl serde::Serialize for ResourceUuid {
    fn serialize<S>(&self, serializer: S) -> Result<S::Ok, S::Error>
    where
        S: serde::Serializer,
    {
        serializer.collect_str(self)
    }
}

#[cfg(feature = "serde")]
impl<'de> serde::Deserialize<'de> for ResourceUuid {
    fn deserialize<D>(deserializer: D) -> Result<Self, D::Error>
    where
        D: serde::Deserializer<'de>,
    {
        let s = String::deserialize(deserializer)?;
        ResourceUuid::parse_reference(&s).map_err(serde::de::Error::custom)
    }
}
