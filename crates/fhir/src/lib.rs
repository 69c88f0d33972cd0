//! FHIR XML boundary support for the PIO document model.
//!
//! This crate converts between FHIR XML text and a generic, order-preserving element tree:
//! - [`reader`]: XML text → [`XmlElement`], with an always-array allow-list and opaque XHTML
//!   narrative
//! - [`writer`]: [`XmlElement`] → compact XML, boolean fix-up, two-space pretty printing
//!
//! The crate knows nothing about PIO resource types or schema paths. Classification of leaves and
//! construction of bundle/composition structure live in `pio-core`.

pub mod reader;
pub mod tree;
pub mod writer;

pub use reader::{check_narrative, parse_document, ReadOptions};
pub use tree::{Narrative, XmlElement, XmlValue, ATTRIBUTE_PREFIX, TEXT_KEY};
pub use writer::{format_document, render_document};

/// FHIR XML namespace.
pub const FHIR_NS: &str = "http://hl7.org/fhir";

/// XHTML namespace used by narrative `div` elements.
pub const XHTML_NS: &str = "http://www.w3.org/1999/xhtml";

/// Errors returned by the `fhir` boundary crate.
#[derive(Debug, thiserror::Error)]
pub enum FhirError {
    #[error("invalid XML: {0}")]
    InvalidXml(#[from] roxmltree::Error),

    #[error("narrative markup does not stay inside its div: {0}")]
    InvalidNarrative(String),

    #[error("XML write error: {0}")]
    XmlWrite(#[from] quick_xml::Error),

    #[error("output is not UTF-8: {0}")]
    Utf8(#[from] std::string::FromUtf8Error),
}

/// Type alias for Results that can fail with a [`FhirError`].
pub type FhirResult<T> = Result<T, FhirError>;
