//! Resource identity utilities.
//!
//! Every resource in a PIO document is addressed by a UUID. The UUID is the first segment of every
//! addressable path (`<uuid>.<ResourceType>.<field>...`) and the key under which the resource is
//! stored in the content store.
//!
//! Unlike storage identifiers elsewhere, PIO identities use the **hyphenated** RFC 4122 form,
//! because the same value is written verbatim into the XML wire format (`Bundle.entry.fullUrl`,
//! `Resource.id`, `Reference.reference`).
//!
//! This crate provides:
//! - [`ResourceUuid`], a wrapper that guarantees a syntactically valid UUID once constructed.
//! - Helpers for the `urn:uuid:` reference form used by FHIR references.
//!
//! ## Forms
//! - Bare: `e029b2b8-5dc6-4feb-990a-7471fb9b54e3`
//! - Reference: `urn:uuid:e029b2b8-5dc6-4feb-990a-7471fb9b54e3`
//!
//! Display always produces the bare, lowercase, hyphenated form.

mod resource;

pub use resource::{ResourceUuid, Uuid, URN_UUID_PREFIX};

/// Error type for UUID operations.
#[derive(Debug, thiserror::Error)]
pub enum UuidError {
    /// Invalid input provided
    #[error("Invalid input: {0}")]
    InvalidInput(String),
}

/// Result type for UUID operations.
pub type UuidResult<T> = Result<T, UuidError>;
