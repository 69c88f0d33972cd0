//! The Schema Table: valid field paths, declared types and defaults per resource type.
//!
//! Two JSON tables are loaded once at startup. The full table lists every path a resource may
//! carry; the reduced ("PIO Small") table lists the subset retained by the restricted export
//! profile and holds the fixed values that declare the composition section templates.
//!
//! Schema paths may carry a qualifier suffix (`identifier:pid`, `extension:religion`) that runtime
//! paths never carry. Lookups therefore go through [`normalize_schema_path`].

use crate::config::CoreConfig;
use crate::{PioError, PioResult};
use indexmap::IndexMap;
use pio_types::PrimitiveKind;
use serde::Deserialize;

/// Resource-level defaults used to rebuild a resource header on export.
#[derive(Clone, Debug, Deserialize, PartialEq, Eq)]
pub struct ResourceDefaults {
    pub profile: String,
    #[serde(default)]
    pub status: String,
    #[serde(rename = "fhir-resource-type")]
    pub fhir_resource_type: String,
}

#[derive(Debug, Deserialize)]
struct RawResource {
    #[serde(default)]
    resource: Option<ResourceDefaults>,
    #[serde(default)]
    paths: IndexMap<String, RawPath>,
}

#[derive(Debug, Deserialize)]
struct RawPath {
    #[serde(rename = "type", default)]
    declared_type: Option<String>,
    #[serde(rename = "fixedValue", default)]
    fixed_value: Option<String>,
}

/// One normalized schema path.
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct SchemaPath {
    /// Type name as written in the table, e.g. `StringPIO` or `CodeableConcept`.
    pub declared_type: String,
    /// Primitive kind of the declared type; `None` for structural types.
    pub kind: Option<PrimitiveKind>,
    /// Whether the path is part of the reduced table.
    pub reduced: bool,
}

/// Schema of one resource type.
#[derive(Clone, Debug)]
pub struct ResourceSchema {
    name: String,
    defaults: Option<ResourceDefaults>,
    paths: IndexMap<String, SchemaPath>,
    fixed_values: IndexMap<String, String>,
}

impl ResourceSchema {
    pub fn name(&self) -> &str {
        &self.name
    }

    pub fn defaults(&self) -> Option<&ResourceDefaults> {
        self.defaults.as_ref()
    }

    /// The FHIR resource tag, e.g. `Patient` for `KBV_PR_MIO_ULB_Patient`.
    pub fn fhir_resource_type(&self) -> Option<&str> {
        self.defaults
            .as_ref()
            .map(|d| d.fhir_resource_type.as_str())
    }

    /// Looks up a normalized searching path, e.g. `KBV_PR_MIO_ULB_Patient.name.family`.
    pub fn path(&self, searching_path: &str) -> Option<&SchemaPath> {
        self.paths.get(searching_path)
    }

    pub fn paths(&self) -> impl Iterator<Item = (&str, &SchemaPath)> {
        self.paths.iter().map(|(k, v)| (k.as_str(), v))
    }

    /// Fixed values keyed by the raw (qualified) schema path, in table order.
    pub fn fixed_values(&self) -> impl Iterator<Item = (&str, &str)> {
        self.fixed_values
            .iter()
            .map(|(k, v)| (k.as_str(), v.as_str()))
    }
}

/// The loaded schema tables.
#[derive(Clone, Debug, Default)]
pub struct SchemaTable {
    resources: IndexMap<String, ResourceSchema>,
}

impl SchemaTable {
    /// Reads both tables from the configured schema directory.
    pub fn load(config: &CoreConfig) -> PioResult<Self> {
        let full = std::fs::read_to_string(config.resource_table_path())
            .map_err(PioError::SchemaRead)?;
        let reduced = std::fs::read_to_string(config.reduced_table_path())
            .map_err(PioError::SchemaRead)?;
        let table = Self::from_json(&full, &reduced)?;
        tracing::info!(
            resources = table.resources.len(),
            dir = %config.schema_dir().display(),
            "schema tables loaded"
        );
        Ok(table)
    }

    /// Builds the table from the JSON text of the full and the reduced table.
    pub fn from_json(full: &str, reduced: &str) -> PioResult<Self> {
        let full: IndexMap<String, RawResource> =
            serde_json::from_str(full).map_err(PioError::SchemaParse)?;
        let reduced: IndexMap<String, RawResource> =
            serde_json::from_str(reduced).map_err(PioError::SchemaParse)?;

        let mut resources = IndexMap::with_capacity(full.len());
        for (name, raw) in full {
            let mut paths = IndexMap::with_capacity(raw.paths.len());
            let mut fixed_values = IndexMap::new();
            for (path, entry) in raw.paths {
                if let Some(fixed) = entry.fixed_value {
                    fixed_values.insert(path.clone(), fixed);
                }
                let declared_type = entry.declared_type.unwrap_or_default();
                // Qualified variants collapse onto one normalized path; the last one wins.
                paths.insert(
                    normalize_schema_path(&path),
                    SchemaPath {
                        kind: PrimitiveKind::from_type_name(&declared_type),
                        declared_type,
                        reduced: false,
                    },
                );
            }
            resources.insert(
                name.clone(),
                ResourceSchema {
                    name,
                    defaults: raw.resource,
                    paths,
                    fixed_values,
                },
            );
        }

        for (name, raw) in reduced {
            let Some(schema) = resources.get_mut(&name) else {
                tracing::warn!(resource = %name, "reduced table names a resource missing from the full table");
                continue;
            };
            for (path, entry) in raw.paths {
                if let Some(fixed) = entry.fixed_value {
                    schema.fixed_values.insert(path.clone(), fixed);
                }
                if let Some(found) = schema.paths.get_mut(&normalize_schema_path(&path)) {
                    found.reduced = true;
                }
            }
        }

        Ok(Self { resources })
    }

    pub fn resource(&self, name: &str) -> Option<&ResourceSchema> {
        self.resources.get(name)
    }

    pub fn contains(&self, name: &str) -> bool {
        self.resources.contains_key(name)
    }

    /// Looks up `searching_path` within the schema of `resource_name`.
    pub fn lookup(&self, resource_name: &str, searching_path: &str) -> Option<&SchemaPath> {
        self.resource(resource_name)
            .and_then(|schema| schema.path(searching_path))
    }

    pub fn resource_names(&self) -> impl Iterator<Item = &str> {
        self.resources.keys().map(String::as_str)
    }
}

/// Strips qualifier suffixes from every segment: `Patient.identifier:pid.value` becomes
/// `Patient.identifier.value`.
pub fn normalize_schema_path(path: &str) -> String {
    path.split('.')
        .map(|segment| segment.split(':').next().unwrap_or(segment))
        .collect::<Vec<_>>()
        .join(".")
}

/// Derives the internal resource-type name from a profile URL: last path segment, version
/// suffix removed.
pub fn resource_name_from_profile(profile: &str) -> &str {
    let last = profile.rsplit('/').next().unwrap_or(profile);
    last.split('|').next().unwrap_or(last)
}

#[cfg(test)]
mod tests {
    use super::*;

    const FULL: &str = r#"{
        "KBV_PR_MIO_ULB_Patient": {
            "resource": {
                "profile": "https://fhir.kbv.de/StructureDefinition/KBV_PR_MIO_ULB_Patient|1.0.0",
                "status": "extensions",
                "fhir-resource-type": "Patient"
            },
            "paths": {
                "KBV_PR_MIO_ULB_Patient.identifier:pid": { "type": "Identifier" },
                "KBV_PR_MIO_ULB_Patient.identifier:pid.value": { "type": "StringPIO" },
                "KBV_PR_MIO_ULB_Patient.gender": { "type": "CodePIO" },
                "KBV_PR_MIO_ULB_Patient.deceasedBoolean": { "type": "BooleanPIO" }
            }
        }
    }"#;

    const REDUCED: &str = r#"{
        "KBV_PR_MIO_ULB_Patient": {
            "paths": {
                "KBV_PR_MIO_ULB_Patient.identifier:pid.value": { "type": "StringPIO" },
                "KBV_PR_MIO_ULB_Patient.gender": { "type": "CodePIO", "fixedValue": "female" }
            }
        }
    }"#;

    #[test]
    fn qualifiers_are_stripped_from_schema_paths() {
        assert_eq!(
            normalize_schema_path("KBV_PR_MIO_ULB_Patient.identifier:pid.value"),
            "KBV_PR_MIO_ULB_Patient.identifier.value"
        );
        assert_eq!(normalize_schema_path("A.b.c"), "A.b.c");
    }

    #[test]
    fn lookup_uses_normalized_paths_and_kinds() {
        let table = SchemaTable::from_json(FULL, REDUCED).expect("tables");
        let value = table
            .lookup("KBV_PR_MIO_ULB_Patient", "KBV_PR_MIO_ULB_Patient.identifier.value")
            .expect("identifier value");
        assert_eq!(value.kind, Some(PrimitiveKind::String));
        assert!(value.reduced);

        let structural = table
            .lookup("KBV_PR_MIO_ULB_Patient", "KBV_PR_MIO_ULB_Patient.identifier")
            .expect("identifier");
        assert_eq!(structural.kind, None);
        assert_eq!(structural.declared_type, "Identifier");
    }

    #[test]
    fn paths_missing_from_reduced_table_are_flagged() {
        let table = SchemaTable::from_json(FULL, REDUCED).expect("tables");
        let deceased = table
            .lookup("KBV_PR_MIO_ULB_Patient", "KBV_PR_MIO_ULB_Patient.deceasedBoolean")
            .expect("deceased");
        assert!(!deceased.reduced);
    }

    #[test]
    fn defaults_and_fixed_values_are_kept() {
        let table = SchemaTable::from_json(FULL, REDUCED).expect("tables");
        let patient = table.resource("KBV_PR_MIO_ULB_Patient").expect("patient");
        assert_eq!(patient.fhir_resource_type(), Some("Patient"));
        assert_eq!(
            patient.defaults().map(|d| d.status.as_str()),
            Some("extensions")
        );
        let fixed: Vec<_> = patient.fixed_values().collect();
        assert_eq!(fixed, vec![("KBV_PR_MIO_ULB_Patient.gender", "female")]);
    }

    #[test]
    fn malformed_json_is_a_parse_error() {
        let err = SchemaTable::from_json("{", REDUCED).expect_err("malformed");
        assert!(matches!(err, PioError::SchemaParse(_)));
    }

    #[test]
    fn resource_name_is_taken_from_profile() {
        assert_eq!(
            resource_name_from_profile(
                "https://fhir.kbv.de/StructureDefinition/KBV_PR_MIO_ULB_Patient|1.0.0"
            ),
            "KBV_PR_MIO_ULB_Patient"
        );
        assert_eq!(resource_name_from_profile("Plain"), "Plain");
    }
}
