//! One PIO document: Content Store, Header Store and the records of its import.
//!
//! This is the surface the session layer works with. It owns the stores, delegates path access
//! and header edits to them, and runs the import and export transforms.

use crate::config::CoreConfig;
use crate::content::ContentStore;
use crate::export::export_bundle;
use crate::header::{GivenDeviceCategory, HeaderStore};
use crate::import::{import_bundle, Exclusions, ImportIssue};
use crate::schema::SchemaTable;
use crate::sections::SectionCatalog;
use crate::PioResult;
use fhir::ReadOptions;
use indexmap::IndexMap;
use pio_types::Primitive;
use pio_uuid::ResourceUuid;
use std::sync::Arc;

/// An editable PIO document.
#[derive(Clone, Debug)]
pub struct PioDocument {
    schema: Arc<SchemaTable>,
    catalog: SectionCatalog,
    content: ContentStore,
    header: HeaderStore,
    import_errors: Vec<ImportIssue>,
    exclusions: Exclusions,
}

impl PioDocument {
    /// Creates an empty document.
    pub fn new(schema: Arc<SchemaTable>) -> PioResult<Self> {
        Ok(Self {
            catalog: SectionCatalog::from_schema(&schema)?,
            content: ContentStore::new(schema.clone()),
            header: HeaderStore::new(),
            import_errors: Vec::new(),
            exclusions: Exclusions::default(),
            schema,
        })
    }

    /// Imports `xml` with the always-array tags of `config`.
    pub fn open(config: &CoreConfig, schema: Arc<SchemaTable>, xml: &str) -> PioResult<Self> {
        Self::open_with_options(
            schema,
            xml,
            &ReadOptions::with_always_array(config.always_array().iter().cloned()),
        )
    }

    /// Imports `xml`.
    ///
    /// # Errors
    ///
    /// Fails if `xml` is not well-formed, has no bundle, or holds no resources. Per-path problems
    /// do not fail the import; see [`Self::import_errors`] and [`Self::exclusions`].
    pub fn open_with_options(
        schema: Arc<SchemaTable>,
        xml: &str,
        options: &ReadOptions,
    ) -> PioResult<Self> {
        let root = fhir::parse_document(xml, options)?;
        let mut document = Self::new(schema)?;
        let outcome = import_bundle(
            &root,
            &document.schema,
            &mut document.content,
            &mut document.header,
        )?;
        document.import_errors = outcome.issues;
        document.exclusions = outcome.exclusions;
        Ok(document)
    }

    /// Exports the document as formatted FHIR XML.
    ///
    /// Summary resources are regenerated first, so a failed export may still have changed them.
    pub fn export_xml(&mut self) -> PioResult<String> {
        export_bundle(&self.schema, &self.catalog, &mut self.content, &mut self.header)
    }

    pub fn schema(&self) -> &SchemaTable {
        &self.schema
    }

    pub fn content(&self) -> &ContentStore {
        &self.content
    }

    pub fn header(&self) -> &HeaderStore {
        &self.header
    }

    pub fn header_mut(&mut self) -> &mut HeaderStore {
        &mut self.header
    }

    pub fn set_value(&mut self, path: &str, value: Primitive) -> PioResult<()> {
        self.content.set_value(path, value)
    }

    pub fn get_value(&self, path: &str) -> PioResult<&Primitive> {
        self.content.get_value(path)
    }

    pub fn delete_value(&mut self, path: &str) -> PioResult<()> {
        self.content.delete_value(path)
    }

    pub fn all_uuids(&self) -> IndexMap<ResourceUuid, &str> {
        self.content.all_uuids()
    }

    pub fn all_uuids_of_type(&self, resource_type: &str) -> Vec<ResourceUuid> {
        self.content.all_uuids_of_type(resource_type)
    }

    /// Validates `paths` and returns the invalid ones; they stay recorded for the export gate.
    pub fn validate_paths<I, S>(&mut self, paths: I) -> Vec<String>
    where
        I: IntoIterator<Item = S>,
        S: AsRef<str>,
    {
        self.content.validator_mut().validate_paths(paths)
    }

    pub fn invalid_paths(&self) -> Vec<&str> {
        self.content.validator().invalid_paths()
    }

    pub fn add_author(&mut self, uuid: ResourceUuid) {
        self.header.add_author(uuid);
    }

    pub fn delete_author(&mut self, uuid: &ResourceUuid) -> PioResult<()> {
        self.header.delete_author(uuid)
    }

    pub fn authors(&self) -> &[ResourceUuid] {
        self.header.authors()
    }

    pub fn set_receiving_institution(&mut self, uuid: ResourceUuid) {
        self.header.set_receiving_institution(uuid);
    }

    pub fn clear_receiving_institution(&mut self) {
        self.header.clear_receiving_institution();
    }

    pub fn receiving_institution(&self) -> PioResult<ResourceUuid> {
        self.header.receiving_institution()
    }

    pub fn add_given_device(&mut self, uuid: ResourceUuid, category: GivenDeviceCategory) {
        self.header.add_given_device(uuid, category);
    }

    pub fn delete_given_device(&mut self, uuid: &ResourceUuid, category: GivenDeviceCategory) {
        self.header.delete_given_device(uuid, category);
    }

    pub fn given_devices(&self, category: GivenDeviceCategory) -> &[ResourceUuid] {
        self.header.given_devices(category)
    }

    pub fn import_errors(&self) -> &[ImportIssue] {
        &self.import_errors
    }

    pub fn exclusions(&self) -> &Exclusions {
        &self.exclusions
    }

    pub fn exclusion_count(&self) -> usize {
        self.exclusions.count()
    }

    /// Drops all content, header data and import records.
    pub fn clear(&mut self) {
        self.content.clear();
        self.header.clear();
        self.import_errors.clear();
        self.exclusions = Exclusions::default();
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::constants::DEFAULT_ALWAYS_ARRAY;
    use crate::content::Resource;
    use crate::derived::SUMMARY_DEFINITIONS;
    use crate::test_support::fixture_schema;
    use crate::PioError;

    const SAMPLE: &str = include_str!("../testdata/discharge_letter.xml");
    const PATIENT: &str = "e029b2b8-5dc6-4feb-990a-7471fb9b54e3";
    const MEDICATION: &str = "5c3f1d6b-9c34-4f6e-9d0a-3a4d8c1f2e77";

    fn open(xml: &str) -> PioDocument {
        PioDocument::open_with_options(
            fixture_schema(),
            xml,
            &ReadOptions::with_always_array(DEFAULT_ALWAYS_ARRAY),
        )
        .expect("open")
    }

    fn snapshot(document: &PioDocument) -> Vec<(ResourceUuid, Resource)> {
        document
            .content()
            .resources()
            .map(|(uuid, resource)| (uuid, resource.clone()))
            .collect()
    }

    #[test]
    fn sample_imports_without_errors() {
        let document = open(SAMPLE);
        assert!(document.import_errors().is_empty(), "{:?}", document.import_errors());
        assert_eq!(document.exclusion_count(), 2);
        assert_eq!(document.all_uuids().len(), 5);
        assert_eq!(document.authors().len(), 2);
        assert_eq!(
            document.receiving_institution().expect("receiving").to_string(),
            "9d4b229e-40bf-4bca-8680-9657895363ea"
        );
        assert_eq!(
            document.given_devices(GivenDeviceCategory::Medication),
            &[ResourceUuid::parse(MEDICATION).expect("uuid")]
        );

        let religion = document
            .get_value(&format!(
                "{PATIENT}.KBV_PR_MIO_ULB_Patient.extension[0].valueString"
            ))
            .expect("religion");
        assert_eq!(religion, &Primitive::string("Buddhismus"));
        let interpreter = document
            .get_value(&format!(
                "{PATIENT}.KBV_PR_MIO_ULB_Patient.extension[1].valueBoolean"
            ))
            .expect("interpreter");
        assert_eq!(interpreter, &Primitive::Boolean(true));
        let suffix = document
            .get_value(&format!(
                "{PATIENT}.KBV_PR_MIO_ULB_Patient.name[0].family.extension[0].valueString"
            ))
            .expect("name suffix");
        assert_eq!(suffix, &Primitive::string("Graf"));
    }

    /// Stored resources minus the summary resources export regenerates.
    fn imported_resources(document: &PioDocument) -> Vec<(ResourceUuid, Resource)> {
        snapshot(document)
            .into_iter()
            .filter(|(_, resource)| {
                !SUMMARY_DEFINITIONS
                    .iter()
                    .any(|definition| definition.resource == resource.resource_type())
            })
            .collect()
    }

    fn assert_same_header(actual: &HeaderStore, expected: &HeaderStore) {
        assert_eq!(actual.authors(), expected.authors());
        assert_eq!(actual.patient(), expected.patient());
        assert_eq!(actual.bundle_uuid(), expected.bundle_uuid());
        assert_eq!(actual.bundle_identifier_uuid(), expected.bundle_identifier_uuid());
        assert_eq!(actual.composition_uuid(), expected.composition_uuid());
        assert_eq!(actual.bundle_timestamp(), expected.bundle_timestamp());
        assert_eq!(actual.composition_date(), expected.composition_date());
        assert_eq!(actual.all_given_devices(), expected.all_given_devices());
        assert_eq!(
            actual.receiving_institution().ok(),
            expected.receiving_institution().ok()
        );
    }

    #[test]
    fn export_then_import_reproduces_the_document() {
        let mut first = open(SAMPLE);
        let before = imported_resources(&first);
        assert_eq!(before.len(), 5);

        let exported = first.export_xml().expect("first export");
        let mut second = open(&exported);
        assert!(second.import_errors().is_empty(), "{:?}", second.import_errors());
        assert_eq!(second.exclusion_count(), 0);
        assert_eq!(imported_resources(&second), before);
        assert_same_header(second.header(), first.header());

        let imported = snapshot(&second);
        let reexported = second.export_xml().expect("second export");
        let third = open(&reexported);
        assert_eq!(snapshot(&third), imported);
        assert_same_header(third.header(), second.header());
    }

    #[test]
    fn export_keeps_imported_identifiers() {
        let mut document = open(SAMPLE);
        let xml = document.export_xml().expect("export");
        assert!(xml.contains(r#"<id value="702d1550-d289-40df-b477-9dc23a91b243"/>"#));
        assert!(xml.contains(
            r#"<value value="urn:uuid:9aa1e777-cc3e-419e-9395-382ab1374408"/>"#
        ));
        assert!(xml.contains(
            r#"<fullUrl value="urn:uuid:a1e1726e-b3ee-4584-8a7b-8ca53908f5e5"/>"#
        ));
        assert!(xml.contains("<h1><b>Sendende</b> Einrichtung</h1>"));
        assert!(!xml.contains("deceasedBoolean"));
    }

    #[test]
    fn deleted_resources_are_absent_from_export() {
        let mut document = open(SAMPLE);
        let care_level = "2a73739e-7df1-4a61-a79d-8d95ae45a563";
        document
            .delete_value(&format!(
                "{care_level}.KBV_PR_MIO_ULB_Observation_Care_Level"
            ))
            .expect("delete");
        assert!(document
            .all_uuids_of_type("KBV_PR_MIO_ULB_Observation_Care_Level")
            .is_empty());

        let xml = document.export_xml().expect("export");
        assert!(!xml.contains(care_level));
        assert!(!xml.contains("<title value=\"Pflegegrad\"/>"));
    }

    #[test]
    fn validated_paths_gate_the_export() {
        let mut document = open(SAMPLE);
        let invalid = document.validate_paths([
            format!("{PATIENT}.KBV_PR_MIO_ULB_Patient.gender"),
            format!("{PATIENT}.KBV_PR_MIO_ULB_Patient.favouriteColour"),
        ]);
        assert_eq!(invalid.len(), 1);
        assert_eq!(document.invalid_paths().len(), 1);
        assert!(matches!(
            document.export_xml(),
            Err(PioError::InvalidPaths(_))
        ));
    }

    #[test]
    fn malformed_input_is_rejected() {
        let err = PioDocument::open_with_options(fixture_schema(), "<Bundle>", &ReadOptions::default())
            .expect_err("malformed");
        assert!(matches!(err, PioError::Fhir(_)));
    }

    #[test]
    fn clear_resets_everything() {
        let mut document = open(SAMPLE);
        document.clear();
        assert!(document.all_uuids().is_empty());
        assert!(document.authors().is_empty());
        assert!(document.import_errors().is_empty());
        assert_eq!(document.exclusion_count(), 0);
        assert!(matches!(
            document.export_xml(),
            Err(PioError::MissingAuthor)
        ));
    }
}
