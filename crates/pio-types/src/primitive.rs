//! Primitive values stored at the leaves of a PIO document.
//!
//! Every leaf value flows through a string-parse/string-format cycle: the XML wire format carries
//! strings, the document model carries typed values. [`PrimitiveKind`] is the closed set of types a
//! schema path can declare; [`Primitive`] is the typed value itself. `Primitive::parse` followed by
//! `to_string` reproduces canonical input exactly.

use crate::temporal::{FhirDate, FhirDateTime, FhirTime};
use crate::{PrimitiveError, PrimitiveResult};
use base64::{engine::general_purpose::STANDARD, Engine as _};
use pio_uuid::ResourceUuid;
use rust_decimal::Decimal;
use std::fmt;
use std::str::FromStr;

/// The declared type of a schema path.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash)]
pub enum PrimitiveKind {
    String,
    Code,
    Uri,
    Uuid,
    Date,
    DateTime,
    Time,
    Boolean,
    Integer,
    UnsignedInt,
    PositiveInt,
    Decimal,
    Binary,
}

impl PrimitiveKind {
    /// Resolves a schema type name such as `StringPIO` or `Base64BinaryPIO`.
    ///
    /// Aliases collapse onto one kind: `UrlPIO` and `CanonicalPIO` are URIs, `Base64BinaryPIO`
    /// is binary, `MarkdownPIO` is a string and `InstantPIO` is a date-time.
    pub fn from_type_name(name: &str) -> Option<Self> {
        let kind = match name {
            "StringPIO" | "MarkdownPIO" => PrimitiveKind::String,
            "CodePIO" => PrimitiveKind::Code,
            "UriPIO" | "UrlPIO" | "CanonicalPIO" => PrimitiveKind::Uri,
            "UuidPIO" => PrimitiveKind::Uuid,
            "DatePIO" => PrimitiveKind::Date,
            "DateTimePIO" | "InstantPIO" => PrimitiveKind::DateTime,
            "TimePIO" => PrimitiveKind::Time,
            "BooleanPIO" => PrimitiveKind::Boolean,
            "IntegerPIO" => PrimitiveKind::Integer,
            "UnsignedIntegerPIO" => PrimitiveKind::UnsignedInt,
            "PositiveIntegerPIO" => PrimitiveKind::PositiveInt,
            "DecimalPIO" => PrimitiveKind::Decimal,
            "BinaryPIO" | "Base64BinaryPIO" => PrimitiveKind::Binary,
            _ => return None,
        };
        Some(kind)
    }

    /// The canonical schema type name of this kind.
    pub fn type_name(self) -> &'static str {
        match self {
            PrimitiveKind::String => "StringPIO",
            PrimitiveKind::Code => "CodePIO",
            PrimitiveKind::Uri => "UriPIO",
            PrimitiveKind::Uuid => "UuidPIO",
            PrimitiveKind::Date => "DatePIO",
            PrimitiveKind::DateTime => "DateTimePIO",
            PrimitiveKind::Time => "TimePIO",
            PrimitiveKind::Boolean => "BooleanPIO",
            PrimitiveKind::Integer => "IntegerPIO",
            PrimitiveKind::UnsignedInt => "UnsignedIntegerPIO",
            PrimitiveKind::PositiveInt => "PositiveIntegerPIO",
            PrimitiveKind::Decimal => "DecimalPIO",
            PrimitiveKind::Binary => "BinaryPIO",
        }
    }

    fn label(self) -> &'static str {
        match self {
            PrimitiveKind::String => "string",
            PrimitiveKind::Code => "code",
            PrimitiveKind::Uri => "uri",
            PrimitiveKind::Uuid => "uuid",
            PrimitiveKind::Date => "date",
            PrimitiveKind::DateTime => "dateTime",
            PrimitiveKind::Time => "time",
            PrimitiveKind::Boolean => "boolean",
            PrimitiveKind::Integer => "integer",
            PrimitiveKind::UnsignedInt => "unsignedInt",
            PrimitiveKind::PositiveInt => "positiveInt",
            PrimitiveKind::Decimal => "decimal",
            PrimitiveKind::Binary => "base64Binary",
        }
    }
}

impl fmt::Display for PrimitiveKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.type_name())
    }
}

/// A typed leaf value.
#[derive(Clone, Debug, PartialEq)]
pub enum Primitive {
    String(String),
    Code(String),
    Uri(String),
    Uuid(ResourceUuid),
    Date(FhirDate),
    DateTime(FhirDateTime),
    Time(FhirTime),
    Boolean(bool),
    Integer(i32),
    UnsignedInt(u32),
    PositiveInt(u32),
    Decimal(Decimal),
    Binary(Vec<u8>),
}

impl Primitive {
    /// Parses `raw` as a value of `kind`.
    ///
    /// # Errors
    ///
    /// Returns [`PrimitiveError::Parse`] when `raw` is not a valid lexical form of `kind`.
    pub fn parse(kind: PrimitiveKind, raw: &str) -> PrimitiveResult<Self> {
        let err = || PrimitiveError::Parse {
            kind: kind.label(),
            raw: raw.to_owned(),
        };

        let value = match kind {
            PrimitiveKind::String => Primitive::String(raw.to_owned()),
            PrimitiveKind::Code => {
                if raw.is_empty() || raw.trim() != raw {
                    return Err(err());
                }
                Primitive::Code(raw.to_owned())
            }
            PrimitiveKind::Uri => {
                if raw.is_empty() || raw.chars().any(char::is_whitespace) {
                    return Err(err());
                }
                Primitive::Uri(raw.to_owned())
            }
            PrimitiveKind::Uuid => {
                Primitive::Uuid(ResourceUuid::parse_reference(raw).map_err(|_| err())?)
            }
            PrimitiveKind::Date => Primitive::Date(FhirDate::parse(raw)?),
            PrimitiveKind::DateTime => Primitive::DateTime(FhirDateTime::parse(raw)?),
            PrimitiveKind::Time => Primitive::Time(FhirTime::parse(raw)?),
            PrimitiveKind::Boolean => match raw {
                "true" => Primitive::Boolean(true),
                "false" => Primitive::Boolean(false),
                _ => return Err(err()),
            },
            PrimitiveKind::Integer => Primitive::Integer(raw.parse().map_err(|_| err())?),
            PrimitiveKind::UnsignedInt => Primitive::UnsignedInt(raw.parse().map_err(|_| err())?),
            PrimitiveKind::PositiveInt => match raw.parse::<u32>() {
                Ok(n) if n > 0 => Primitive::PositiveInt(n),
                _ => return Err(err()),
            },
            PrimitiveKind::Decimal => Primitive::Decimal(Decimal::from_str(raw).map_err(|_| err())?),
            PrimitiveKind::Binary => Primitive::Binary(STANDARD.decode(raw).map_err(|_| err())?),
        };
        Ok(value)
    }

    /// The kind of this value.
    pub fn kind(&self) -> PrimitiveKind {
        match self {
            Primitive::String(_) => PrimitiveKind::String,
            Primitive::Code(_) => PrimitiveKind::Code,
            Primitive::Uri(_) => PrimitiveKind::Uri,
            Primitive::Uuid(_) => PrimitiveKind::Uuid,
            Primitive::Date(_) => PrimitiveKind::Date,
            Primitive::DateTime(_) => PrimitiveKind::DateTime,
            Primitive::Time(_) => PrimitiveKind::Time,
            Primitive::Boolean(_) => PrimitiveKind::Boolean,
            Primitive::Integer(_) => PrimitiveKind::Integer,
            Primitive::UnsignedInt(_) => PrimitiveKind::UnsignedInt,
            Primitive::PositiveInt(_) => PrimitiveKind::PositiveInt,
            Primitive::Decimal(_) => PrimitiveKind::Decimal,
            Primitive::Binary(_) => PrimitiveKind::Binary,
        }
    }

    pub fn string(value: impl Into<String>) -> Self {
        Primitive::String(value.into())
    }

    pub fn code(value: impl Into<String>) -> Self {
        Primitive::Code(value.into())
    }

    pub fn uri(value: impl Into<String>) -> Self {
        Primitive::Uri(value.into())
    }

    /// The value as text if it is one of the string-like kinds.
    pub fn as_text(&self) -> Option<&str> {
        match self {
            Primitive::String(s) | Primitive::Code(s) | Primitive::Uri(s) => Some(s),
            _ => None,
        }
    }
}

impl fmt::Display for Primitive {
    /// Formats the canonical wire form.
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Primitive::String(s) | Primitive::Code(s) | Primitive::Uri(s) => f.write_str(s),
            Primitive::Uuid(u) => f.write_str(&u.to_reference()),
            Primitive::Date(d) => write!(f, "{}", d),
            Primitive::DateTime(dt) => write!(f, "{}", dt),
            Primitive::Time(t) => write!(f, "{}", t),
            Primitive::Boolean(b) => write!(f, "{}", b),
            Primitive::Integer(n) => write!(f, "{}", n),
            Primitive::UnsignedInt(n) | Primitive::PositiveInt(n) => write!(f, "{}", n),
            Primitive::Decimal(d) => write!(f, "{}", d),
            Primitive::Binary(bytes) => f.write_str(&STANDARD.encode(bytes)),
        }
    }
}

impl From<ResourceUuid> for Primitive {
    fn from(value: ResourceUuid) -> Self {
        Primitive::Uuid(value)
    }
}

impl serde::Serialize for Primitive {
    fn serialize<S>(&self, serializer: S) -> Result<S::Ok, S::Error>
    where
        S: serde::Serializer,
    {
        serializer.collect_str(self)
    }
}
