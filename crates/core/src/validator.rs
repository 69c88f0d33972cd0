//! Path validation against the Schema Table.
//!
//! Validity is advisory while a document is edited: every invalid path is recorded in a
//! session-scoped set, and only export turns a non-empty set into an error.

use crate::path::{HeaderField, Terminal};
use crate::schema::SchemaTable;
use indexmap::IndexSet;
use pio_uuid::ResourceUuid;
use std::sync::Arc;

/// Validates addressable paths and accumulates the invalid ones.
#[derive(Clone, Debug)]
pub struct PathValidator {
    schema: Arc<SchemaTable>,
    invalid: IndexSet<String>,
}

impl PathValidator {
    pub fn new(schema: Arc<SchemaTable>) -> Self {
        Self {
            schema,
            invalid: IndexSet::new(),
        }
    }

    pub fn schema(&self) -> &SchemaTable {
        &self.schema
    }

    /// Checks `path` without recording anything.
    ///
    /// A path is valid when its first segment is a UUID, its second names a resource type of the
    /// schema, and either it is a header marker path of exactly three segments, or its searching
    /// form (indices and terminal key removed) matches a normalized schema path.
    pub fn is_valid(&self, path: &str) -> bool {
        let segments: Vec<&str> = path.split('.').collect();
        if segments.len() < 2 || !ResourceUuid::is_valid(segments[0]) {
            return false;
        }
        let Some(resource) = self.schema.resource(segments[1]) else {
            return false;
        };
        if segments.len() == 3 && HeaderField::from_marker(segments[2]).is_some() {
            return true;
        }

        let mut searching: Vec<&str> = segments[1..]
            .iter()
            .map(|segment| segment.split('[').next().unwrap_or(segment))
            .collect();
        if searching.len() > 2
            && searching
                .last()
                .is_some_and(|last| Terminal::from_key(last).is_some())
        {
            searching.pop();
        }
        resource.path(&searching.join(".")).is_some()
    }

    /// Validates one path, recording it if invalid.
    pub fn validate_path(&mut self, path: &str) -> bool {
        let valid = self.is_valid(path);
        if !valid {
            tracing::debug!(%path, "invalid path recorded");
            self.invalid.insert(path.to_owned());
        }
        valid
    }

    /// Validates several paths and returns the invalid subset, in input order.
    pub fn validate_paths<I, S>(&mut self, paths: I) -> Vec<String>
    where
        I: IntoIterator<Item = S>,
        S: AsRef<str>,
    {
        paths
            .into_iter()
            .filter(|path| !self.validate_path(path.as_ref()))
            .map(|path| path.as_ref().to_owned())
            .collect()
    }

    /// All recorded invalid paths in the order they were first seen.
    pub fn invalid_paths(&self) -> Vec<&str> {
        self.invalid.iter().map(String::as_str).collect()
    }

    pub fn has_invalid_paths(&self) -> bool {
        !self.invalid.is_empty()
    }

    pub fn clear(&mut self) {
        self.invalid.clear();
    }

    /// Drops recorded paths equal to `prefix` or below it. Returns how many were dropped.
    pub fn forget_under(&mut self, prefix: &str) -> usize {
        let before = self.invalid.len();
        self.invalid.retain(|path| {
            let Some(rest) = path.strip_prefix(prefix) else {
                return true;
            };
            !(rest.is_empty() || rest.starts_with('.') || rest.starts_with('['))
        });
        before - self.invalid.len()
    }

    /// Follows the removal of item `removed` from the list at `list`: paths below that item are
    /// dropped and paths below later items move down by one index. Returns how many were dropped.
    pub fn remove_list_item(&mut self, list: &str, removed: usize) -> usize {
        let mut dropped = 0;
        self.invalid = std::mem::take(&mut self.invalid)
            .into_iter()
            .filter_map(|path| {
                let Some(rest) = path.strip_prefix(list) else {
                    return Some(path);
                };
                if rest.is_empty() || rest.starts_with('.') {
                    // unindexed paths address the first item
                    return if removed == 0 {
                        dropped += 1;
                        None
                    } else {
                        Some(path)
                    };
                }
                let Some((index, tail)) = rest
                    .strip_prefix('[')
                    .and_then(|r| r.split_once(']'))
                    .and_then(|(digits, tail)| Some((digits.parse::<usize>().ok()?, tail)))
                else {
                    return Some(path);
                };
                match index.cmp(&removed) {
                    std::cmp::Ordering::Less => Some(path),
                    std::cmp::Ordering::Equal => {
                        dropped += 1;
                        None
                    }
                    std::cmp::Ordering::Greater => Some(format!("{list}[{}]{tail}", index - 1)),
                }
            })
            .collect();
        dropped
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    const UUID: &str = "e029b2b8-5dc6-4feb-990a-7471fb9b54e3";

    fn validator() -> PathValidator {
        let full = r#"{
            "KBV_PR_MIO_ULB_Patient": {
                "resource": { "profile": "p", "status": "extensions", "fhir-resource-type": "Patient" },
                "paths": {
                    "KBV_PR_MIO_ULB_Patient.identifier:pid": { "type": "Identifier" },
                    "KBV_PR_MIO_ULB_Patient.identifier:pid.value": { "type": "StringPIO" },
                    "KBV_PR_MIO_ULB_Patient.name": { "type": "HumanName" },
                    "KBV_PR_MIO_ULB_Patient.name.family": { "type": "StringPIO" },
                    "KBV_PR_MIO_ULB_Patient.extension:religion": { "type": "UriPIO" },
                    "KBV_PR_MIO_ULB_Patient.gender": { "type": "CodePIO" }
                }
            }
        }"#;
        let schema = SchemaTable::from_json(full, "{}").expect("schema");
        PathValidator::new(Arc::new(schema))
    }

    #[test]
    fn index_and_qualifier_normalization() {
        let v = validator();
        assert!(v.is_valid(&format!("{UUID}.KBV_PR_MIO_ULB_Patient.name[0].family")));
        assert!(v.is_valid(&format!("{UUID}.KBV_PR_MIO_ULB_Patient.name[3].family")));
        assert!(v.is_valid(&format!("{UUID}.KBV_PR_MIO_ULB_Patient.identifier[0].value")));
        assert!(v.is_valid(&format!("{UUID}.KBV_PR_MIO_ULB_Patient.extension[1]")));
    }

    #[test]
    fn header_markers_are_valid_only_directly_below_type() {
        let v = validator();
        assert!(v.is_valid(&format!("{UUID}.KBV_PR_MIO_ULB_Patient.@profile@")));
        assert!(!v.is_valid(&format!("{UUID}.KBV_PR_MIO_ULB_Patient.@profile@.x")));
    }

    #[test]
    fn terminal_keys_are_ignored() {
        let v = validator();
        assert!(v.is_valid(&format!("{UUID}.KBV_PR_MIO_ULB_Patient.gender.__value")));
    }

    #[test]
    fn bad_uuid_unknown_type_and_unmapped_field() {
        let v = validator();
        assert!(!v.is_valid("not-a-uuid.KBV_PR_MIO_ULB_Patient.gender"));
        assert!(!v.is_valid(&format!("{UUID}.KBV_PR_MIO_ULB_Unknown.gender")));
        assert!(!v.is_valid(&format!("{UUID}.KBV_PR_MIO_ULB_Patient.disabled")));
        assert!(!v.is_valid(&format!("{UUID}.KBV_PR_MIO_ULB_Patient")));
    }

    #[test]
    fn invalid_paths_accumulate_without_duplicates() {
        let mut v = validator();
        let bad = format!("{UUID}.KBV_PR_MIO_ULB_Patient.disabled");
        let good = format!("{UUID}.KBV_PR_MIO_ULB_Patient.gender");

        let invalid = v.validate_paths([bad.as_str(), good.as_str(), bad.as_str()]);
        assert_eq!(invalid.len(), 2);
        assert_eq!(v.invalid_paths(), vec![bad.as_str()]);

        v.clear();
        assert!(!v.has_invalid_paths());
    }

    #[test]
    fn removing_a_list_item_shifts_later_items() {
        let mut v = validator();
        let telecom = format!("{UUID}.KBV_PR_MIO_ULB_Patient.telecom");
        v.validate_path(&format!("{telecom}[0].foo"));
        v.validate_path(&format!("{telecom}[1].bar"));
        v.validate_path(&format!("{telecom}[2].baz"));
        v.validate_path(&format!("{telecom}X[1].qux"));

        assert_eq!(v.remove_list_item(&telecom, 1), 1);
        assert_eq!(
            v.invalid_paths(),
            vec![
                format!("{telecom}[0].foo").as_str(),
                format!("{telecom}[1].baz").as_str(),
                format!("{telecom}X[1].qux").as_str(),
            ]
        );

        assert_eq!(v.remove_list_item(&telecom, 0), 1);
        assert_eq!(
            v.invalid_paths(),
            vec![
                format!("{telecom}[0].baz").as_str(),
                format!("{telecom}X[1].qux").as_str(),
            ]
        );
    }

    #[test]
    fn forget_under_matches_whole_segments() {
        let mut v = validator();
        v.validate_path(&format!("{UUID}.KBV_PR_MIO_ULB_Patient.name[0].given"));
        v.validate_path(&format!("{UUID}.KBV_PR_MIO_ULB_Patient.nameX"));

        let dropped = v.forget_under(&format!("{UUID}.KBV_PR_MIO_ULB_Patient.name"));
        assert_eq!(dropped, 1);
        assert_eq!(
            v.invalid_paths(),
            vec![format!("{UUID}.KBV_PR_MIO_ULB_Patient.nameX").as_str()]
        );
    }
}
