//! Shared value types for the PIO document model.
//!
//! - [`PrimitiveKind`]: the closed set of leaf types a schema path can declare.
//! - [`Primitive`]: a typed leaf value with canonical parse/format.
//! - [`FhirDate`] / [`FhirDateTime`] / [`FhirTime`]: precision-preserving temporal values.

mod primitive;
mod temporal;

pub use primitive::{Primitive, PrimitiveKind};
pub use temporal::{FhirDate, FhirDateTime, FhirTime};

/// Errors that can occur when parsing primitive values.
#[derive(Debug, thiserror::Error)]
pub enum PrimitiveError {
    /// The raw string is not a valid lexical form of the requested kind.
    #[error("Could not parse '{raw}' as {kind}")]
    Parse { kind: &'static str, raw: String },
}

/// Result type for primitive parsing.
pub type PrimitiveResult<T> = Result<T, PrimitiveError>;
