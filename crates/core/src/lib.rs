//! # PIO Core
//!
//! Document model and transform engine for PIO discharge letters.
//!
//! This crate contains pure, in-memory document operations:
//! - Schema Table loading and path lookup (`schema`)
//! - Path validation with an accumulated invalid-path set (`validator`)
//! - The Content Store keyed by UUID and field path (`content`) and the Header Store (`header`)
//! - XML import and export of whole bundles (`import`, `export`), including composition sections
//!   and regenerated summary resources (`sections`, `derived`)
//!
//! **No API concerns**: sessions, HTTP routing and authentication belong to the caller. The core
//! never reads environment variables; configuration is passed in as [`CoreConfig`].

pub mod config;
pub mod constants;
pub mod content;
pub mod derived;
pub mod document;
mod error;
pub mod export;
pub mod header;
pub mod import;
pub mod path;
pub mod schema;
pub mod sections;
pub mod validator;

pub use config::{resolve_schema_dir, CoreConfig};
pub use content::{ContentStore, Element, Resource};
pub use document::PioDocument;
pub use error::{PioError, PioResult};
pub use header::{GivenDeviceCategory, HeaderStore};
pub use import::{Exclusions, ImportIssue};
pub use schema::SchemaTable;
pub use validator::PathValidator;

pub use pio_types::{Primitive, PrimitiveKind};
pub use pio_uuid::ResourceUuid;

#[cfg(test)]
pub(crate) mod test_support {
    use crate::schema::SchemaTable;
    use std::sync::Arc;

    const FULL_TABLE: &str = include_str!("../../../schema/resource_lookup_table.json");
    const REDUCED_TABLE: &str = include_str!("../../../schema/pio_small_lookup_table.json");

    /// The schema tables shipped in the workspace `schema/` directory.
    pub(crate) fn fixture_schema() -> Arc<SchemaTable> {
        Arc::new(SchemaTable::from_json(FULL_TABLE, REDUCED_TABLE).expect("fixture schema"))
    }
}
