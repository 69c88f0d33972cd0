//! Core runtime configuration.
//!
//! Configuration is resolved once at process startup and then passed into the core. The core
//! never reads environment variables itself; binaries decide where overrides come from.

use crate::constants::{
    DEFAULT_ALWAYS_ARRAY, REDUCED_TABLE_FILENAME, RESOURCE_TABLE_FILENAME, SCHEMA_DIR,
};
use crate::{PioError, PioResult};
use std::path::{Path, PathBuf};

/// Core configuration resolved at startup.
#[derive(Clone, Debug)]
pub struct CoreConfig {
    schema_dir: PathBuf,
    resource_table_file: String,
    reduced_table_file: String,
    always_array: Vec<String>,
}

impl CoreConfig {
    /// Create a new `CoreConfig` using the default table filenames and always-array tags.
    pub fn new(schema_dir: PathBuf) -> PioResult<Self> {
        Self::with_tables(
            schema_dir,
            RESOURCE_TABLE_FILENAME.to_owned(),
            REDUCED_TABLE_FILENAME.to_owned(),
            DEFAULT_ALWAYS_ARRAY.iter().map(|t| (*t).to_owned()).collect(),
        )
    }

    /// Create a `CoreConfig` with explicit table filenames and always-array tags.
    pub fn with_tables(
        schema_dir: PathBuf,
        resource_table_file: String,
        reduced_table_file: String,
        always_array: Vec<String>,
    ) -> PioResult<Self> {
        if resource_table_file.trim().is_empty() || reduced_table_file.trim().is_empty() {
            return Err(PioError::InvalidInput(
                "schema table filenames cannot be empty".into(),
            ));
        }
        if always_array.iter().any(|t| t.trim().is_empty()) {
            return Err(PioError::InvalidInput(
                "always-array tag names cannot be empty".into(),
            ));
        }

        Ok(Self {
            schema_dir,
            resource_table_file,
            reduced_table_file,
            always_array,
        })
    }

    pub fn schema_dir(&self) -> &Path {
        &self.schema_dir
    }

    pub fn resource_table_path(&self) -> PathBuf {
        self.schema_dir.join(&self.resource_table_file)
    }

    pub fn reduced_table_path(&self) -> PathBuf {
        self.schema_dir.join(&self.reduced_table_file)
    }

    pub fn always_array(&self) -> &[String] {
        &self.always_array
    }
}

fn looks_like_schema_dir(path: &Path) -> bool {
    path.join(RESOURCE_TABLE_FILENAME).is_file() && path.join(REDUCED_TABLE_FILENAME).is_file()
}

/// Resolve the schema directory without reading environment variables.
///
/// If `override_dir` is provided, it must be a directory holding both schema tables.
/// Otherwise this searches for `schema/` relative to the current working directory and
/// then walks up from `CARGO_MANIFEST_DIR`.
pub fn resolve_schema_dir(override_dir: Option<PathBuf>) -> PioResult<PathBuf> {
    if let Some(schema_dir) = override_dir {
        if schema_dir.is_dir() && looks_like_schema_dir(&schema_dir) {
            return Ok(schema_dir);
        }
        return Err(PioError::InvalidInput(format!(
            "PIO_SCHEMA_DIR override is not a valid schema directory (must contain {RESOURCE_TABLE_FILENAME} and {REDUCED_TABLE_FILENAME})"
        )));
    }

    let cwd_relative = PathBuf::from(SCHEMA_DIR);
    if cwd_relative.is_dir() && looks_like_schema_dir(&cwd_relative) {
        return Ok(cwd_relative);
    }

    let manifest_dir = Path::new(env!("CARGO_MANIFEST_DIR"));
    for ancestor in manifest_dir.ancestors() {
        let candidate = ancestor.join(SCHEMA_DIR);
        if candidate.is_dir() && looks_like_schema_dir(&candidate) {
            return Ok(candidate);
        }
    }

    Err(PioError::InvalidInput(
        "could not locate schema/ directory with both look-up tables".into(),
    ))
}
