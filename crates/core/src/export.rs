//! Export transform: Content and Header stores → FHIR XML bundle.
//!
//! Export first checks its preconditions, regenerates the summary resources and refuses to write
//! anything while the validator holds invalid paths. The bundle is then assembled as an
//! [`XmlElement`] tree and rendered by the `fhir` crate.

use crate::constants::{
    BUNDLE_IDENTIFIER_SYSTEM, BUNDLE_PROFILE, BUNDLE_TYPE, COMPOSITION_NARRATIVE,
    COMPOSITION_PROFILE, COMPOSITION_STATUS, COMPOSITION_TEXT_STATUS, COMPOSITION_TITLE,
    COMPOSITION_TYPE_CODE, COMPOSITION_TYPE_DISPLAY, PATIENT_RESOURCE_NAME,
    RECEIVING_INSTITUTION_EXTENSION_URL, SNOMED_SYSTEM, SNOMED_VERSION,
};
use crate::content::{ContentStore, Element, FieldMap, Resource};
use crate::derived::generate_summary_resources;
use crate::header::HeaderStore;
use crate::path::{HeaderField, Terminal};
use crate::schema::SchemaTable;
use crate::sections::{Coding, SectionCatalog};
use crate::{PioError, PioResult};
use fhir::{Narrative, XmlElement, XmlValue, FHIR_NS, XHTML_NS};
use pio_types::{FhirDateTime, Primitive};
use pio_uuid::{ResourceUuid, URN_UUID_PREFIX};

/// Runs the full export and returns the formatted XML text.
///
/// # Errors
///
/// - [`PioError::MissingAuthor`] if no author is set.
/// - [`PioError::MissingPatient`] / [`PioError::DuplicatePatient`] unless exactly one patient
///   resource exists.
/// - [`PioError::InvalidPaths`] if the validator recorded invalid paths.
/// - [`PioError::UnknownResourceType`] if a stored resource type lacks schema defaults.
pub fn export_bundle(
    schema: &SchemaTable,
    catalog: &SectionCatalog,
    content: &mut ContentStore,
    header: &mut HeaderStore,
) -> PioResult<String> {
    content.prune_empty_resources();

    if header.authors().is_empty() {
        return Err(PioError::MissingAuthor);
    }
    let patient = match content.all_uuids_of_type(PATIENT_RESOURCE_NAME).as_slice() {
        [] => return Err(PioError::MissingPatient),
        [patient] => *patient,
        _ => return Err(PioError::DuplicatePatient),
    };
    header.set_patient(patient);
    header.ensure_identifiers();
    let now = FhirDateTime::now();
    header.set_bundle_timestamp(now);
    header.set_composition_date(now);

    generate_summary_resources(content, &patient)?;
    content.prune_empty_resources();

    let invalid = content.validator().invalid_paths();
    if !invalid.is_empty() {
        return Err(PioError::InvalidPaths(
            invalid.into_iter().map(str::to_owned).collect(),
        ));
    }

    let bundle = build_bundle(schema, catalog, content, header)?;
    let mut root = XmlElement::new();
    root.push_child("Bundle", bundle, false);
    let xml = fhir::render_document(&root)?;

    tracing::info!(
        resources = content.all_uuids().len(),
        authors = header.authors().len(),
        "bundle exported"
    );
    Ok(xml)
}

fn leaf(value: impl Into<String>) -> XmlElement {
    let mut el = XmlElement::new();
    el.set_attribute("value", value);
    el
}

fn reference(uuid: &ResourceUuid) -> XmlElement {
    let mut el = XmlElement::new();
    el.push_child("reference", leaf(uuid.to_reference()), false);
    el
}

fn coding(coding: &Coding) -> XmlElement {
    let mut el = XmlElement::new();
    el.push_child("system", leaf(&coding.system), false);
    el.push_child("version", leaf(&coding.version), false);
    el.push_child("code", leaf(&coding.code), false);
    el.push_child("display", leaf(&coding.display), false);
    el
}

fn codeable_concept(value: &Coding) -> XmlElement {
    let mut el = XmlElement::new();
    el.push_child("coding", coding(value), false);
    el
}

fn meta(profile: &str) -> XmlElement {
    let mut el = XmlElement::new();
    el.push_child("profile", leaf(profile), false);
    el
}

fn narrative(status: &str, markup: &str) -> XmlElement {
    let mut el = XmlElement::new();
    if !status.is_empty() {
        el.push_child("status", leaf(status), false);
    }
    el.insert(
        "div",
        XmlValue::Narrative(Narrative {
            namespace: XHTML_NS.to_owned(),
            markup: markup.to_owned(),
        }),
    );
    el
}

fn bundle_entry(uuid: &ResourceUuid, tag: &str, resource: XmlElement) -> XmlElement {
    let mut wrapper = XmlElement::new();
    wrapper.push_child(tag, resource, false);
    let mut entry = XmlElement::new();
    entry.push_child("fullUrl", leaf(uuid.to_reference()), false);
    entry.push_child("resource", wrapper, false);
    entry
}

fn build_bundle(
    schema: &SchemaTable,
    catalog: &SectionCatalog,
    content: &ContentStore,
    header: &HeaderStore,
) -> PioResult<XmlElement> {
    let (Some(bundle_uuid), Some(identifier_uuid), Some(composition_uuid)) = (
        header.bundle_uuid(),
        header.bundle_identifier_uuid(),
        header.composition_uuid(),
    ) else {
        return Err(PioError::InvalidInput("bundle identifiers are not set".into()));
    };

    let mut bundle = XmlElement::new();
    bundle.set_attribute("xmlns", FHIR_NS);
    bundle.push_child("id", leaf(bundle_uuid.to_string()), false);
    bundle.push_child("meta", meta(BUNDLE_PROFILE), false);
    let mut identifier = XmlElement::new();
    identifier.push_child("system", leaf(BUNDLE_IDENTIFIER_SYSTEM), false);
    identifier.push_child("value", leaf(identifier_uuid.to_reference()), false);
    bundle.push_child("identifier", identifier, false);
    bundle.push_child("type", leaf(BUNDLE_TYPE), false);
    if let Some(timestamp) = header.bundle_timestamp() {
        bundle.push_child("timestamp", leaf(timestamp.to_string()), false);
    }

    let composition = build_composition(composition_uuid, catalog, content, header);
    bundle.push_child(
        "entry",
        bundle_entry(&composition_uuid, "Composition", composition),
        true,
    );

    for (uuid, resource) in content.resources() {
        let resource_schema = schema
            .resource(resource.resource_type())
            .ok_or_else(|| PioError::UnknownResourceType(resource.resource_type().to_owned()))?;
        let defaults = resource_schema
            .defaults()
            .ok_or_else(|| PioError::UnknownResourceType(resource.resource_type().to_owned()))?;
        let element = build_resource(&uuid, resource, defaults)?;
        bundle.push_child(
            "entry",
            bundle_entry(&uuid, &defaults.fhir_resource_type, element),
            true,
        );
    }
    Ok(bundle)
}

fn build_composition(
    uuid: ResourceUuid,
    catalog: &SectionCatalog,
    content: &ContentStore,
    header: &HeaderStore,
) -> XmlElement {
    let mut composition = XmlElement::new();
    composition.push_child("id", leaf(uuid.to_string()), false);
    composition.push_child("meta", meta(COMPOSITION_PROFILE), false);
    composition.push_child(
        "text",
        narrative(COMPOSITION_TEXT_STATUS, COMPOSITION_NARRATIVE),
        false,
    );
    if let Ok(institution) = header.receiving_institution() {
        let mut value = XmlElement::new();
        value.push_child("reference", leaf(institution.to_reference()), false);
        let mut extension = XmlElement::new();
        extension.set_attribute("url", RECEIVING_INSTITUTION_EXTENSION_URL);
        extension.push_child("valueReference", value, false);
        composition.push_child("extension", extension, true);
    }
    composition.push_child("status", leaf(COMPOSITION_STATUS), false);
    composition.push_child(
        "type",
        codeable_concept(&Coding::new(
            SNOMED_SYSTEM,
            SNOMED_VERSION,
            COMPOSITION_TYPE_CODE,
            COMPOSITION_TYPE_DISPLAY,
        )),
        false,
    );
    if let Some(patient) = header.patient() {
        composition.push_child("subject", reference(&patient), false);
    }
    if let Some(date) = header.composition_date() {
        composition.push_child("date", leaf(date.to_string()), false);
    }
    for author in header.authors() {
        composition.push_child("author", reference(author), true);
    }
    composition.push_child("title", leaf(COMPOSITION_TITLE), false);

    for section in catalog.sections(content, header) {
        let mut el = XmlElement::new();
        el.push_child("title", leaf(&section.template.title), false);
        el.push_child("code", codeable_concept(&section.template.coding), false);
        for entry in &section.entries {
            el.push_child("entry", reference(entry), true);
        }
        composition.push_child("section", el, true);
    }
    composition
}

/// Rebuilds one resource: header from its markers or the schema defaults, then its fields.
fn build_resource(
    uuid: &ResourceUuid,
    resource: &Resource,
    defaults: &crate::schema::ResourceDefaults,
) -> PioResult<XmlElement> {
    let fields = resource.fields();
    let marker = |field: HeaderField| match fields.get(field.marker()) {
        Some(Element::Value(value)) => Some(value.to_string()),
        _ => None,
    };

    let mut element = XmlElement::new();
    element.push_child(
        "id",
        leaf(marker(HeaderField::Id).unwrap_or_else(|| uuid.to_string())),
        false,
    );
    element.push_child(
        "meta",
        meta(&marker(HeaderField::Profile).unwrap_or_else(|| defaults.profile.clone())),
        false,
    );
    let status = marker(HeaderField::Status).unwrap_or_else(|| defaults.status.clone());
    let div = marker(HeaderField::Div)
        .unwrap_or_else(|| format!("<h1>{}</h1>", defaults.fhir_resource_type));
    element.push_child("text", narrative(&status, &div), false);

    write_fields(&mut element, None, fields)?;
    Ok(element)
}

/// Writes `fields` into `element`, whose own tag is `name` (`None` for a resource root).
fn write_fields(element: &mut XmlElement, name: Option<&str>, fields: &FieldMap) -> PioResult<()> {
    for (key, value) in fields {
        if HeaderField::from_marker(key).is_some() {
            continue;
        }
        match (Terminal::from_key(key), value) {
            (Some(terminal), Element::Value(primitive)) => {
                element.set_attribute(attribute_name(terminal), stringify(name, primitive));
            }
            (None, Element::Node(map)) => {
                let mut child = XmlElement::new();
                write_fields(&mut child, Some(key), map)?;
                element.push_child(key, child, false);
            }
            (None, Element::List(items)) => {
                for item in items {
                    let mut child = XmlElement::new();
                    write_fields(&mut child, Some(key), item)?;
                    element.push_child(key, child, true);
                }
            }
            _ => {
                return Err(PioError::InvalidInput(format!(
                    "unexpected stored element under {key}"
                )))
            }
        }
    }
    Ok(())
}

fn attribute_name(terminal: Terminal) -> &'static str {
    match terminal {
        Terminal::Value => "value",
        Terminal::Url => "url",
    }
}

/// Wire form of a stored value. Bare UUIDs under `reference` get their `urn:uuid:` prefix back.
fn stringify(name: Option<&str>, primitive: &Primitive) -> String {
    match primitive {
        Primitive::String(value) if name == Some("reference") && ResourceUuid::is_valid(value) => {
            format!("{URN_UUID_PREFIX}{value}")
        }
        _ => primitive.to_string(),
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::test_support::fixture_schema;
    use std::sync::Arc;

    const PATIENT: &str = "e029b2b8-5dc6-4feb-990a-7471fb9b54e3";
    const AUTHOR: &str = "b4d930e3-796c-43b7-829d-3daa951e879c";

    struct Fixture {
        schema: Arc<SchemaTable>,
        catalog: SectionCatalog,
        content: ContentStore,
        header: HeaderStore,
    }

    impl Fixture {
        fn new() -> Self {
            let schema = fixture_schema();
            Self {
                catalog: SectionCatalog::from_schema(&schema).expect("catalog"),
                content: ContentStore::new(schema.clone()),
                header: HeaderStore::new(),
                schema,
            }
        }

        fn with_patient_and_author() -> Self {
            let mut fixture = Self::new();
            fixture.set(PATIENT, "KBV_PR_MIO_ULB_Patient.gender", Primitive::code("male"));
            fixture
                .header
                .add_author(ResourceUuid::parse(AUTHOR).expect("uuid"));
            fixture
        }

        fn set(&mut self, uuid: &str, path: &str, value: Primitive) {
            self.content
                .set_value(&format!("{uuid}.{path}"), value)
                .expect("set");
        }

        fn export(&mut self) -> PioResult<String> {
            export_bundle(&self.schema, &self.catalog, &mut self.content, &mut self.header)
        }
    }

    #[test]
    fn missing_author_is_fatal() {
        let mut fixture = Fixture::new();
        fixture.set(PATIENT, "KBV_PR_MIO_ULB_Patient.gender", Primitive::code("male"));
        assert!(matches!(fixture.export(), Err(PioError::MissingAuthor)));
    }

    #[test]
    fn patient_count_must_be_exactly_one() {
        let mut fixture = Fixture::new();
        fixture
            .header
            .add_author(ResourceUuid::parse(AUTHOR).expect("uuid"));
        assert!(matches!(fixture.export(), Err(PioError::MissingPatient)));

        fixture.set(PATIENT, "KBV_PR_MIO_ULB_Patient.gender", Primitive::code("male"));
        fixture.set(
            "2369c2fb-1b7b-45be-b001-8268e417ec5c",
            "KBV_PR_MIO_ULB_Patient.gender",
            Primitive::code("female"),
        );
        assert!(matches!(fixture.export(), Err(PioError::DuplicatePatient)));
    }

    #[test]
    fn invalid_paths_block_export() {
        let mut fixture = Fixture::with_patient_and_author();
        fixture.set(PATIENT, "KBV_PR_MIO_ULB_Patient.disabled", Primitive::Boolean(true));
        match fixture.export() {
            Err(PioError::InvalidPaths(paths)) => {
                assert_eq!(paths, vec![format!("{PATIENT}.KBV_PR_MIO_ULB_Patient.disabled")]);
            }
            other => panic!("expected invalid paths, got {other:?}"),
        }
        let message = fixture.export().expect_err("still invalid").to_string();
        assert!(message.starts_with("Xml generation failed. Invalid paths detected: \n"));
    }

    #[test]
    fn composition_comes_first_with_header_fields() {
        let mut fixture = Fixture::with_patient_and_author();
        let xml = fixture.export().expect("export");

        let composition = xml.find("<Composition>").expect("composition");
        let patient = xml.find("<Patient>").expect("patient");
        assert!(composition < patient);
        assert!(xml.starts_with("<Bundle xmlns=\"http://hl7.org/fhir\">"));
        assert!(xml.contains(&format!("<reference value=\"urn:uuid:{AUTHOR}\"/>")));
        assert!(xml.contains(&format!("<id value=\"{PATIENT}\"/>")));
        assert!(xml.contains("<title value=\"Überleitungsbogen\"/>"));
        assert!(xml.contains("<h1>Patient</h1>"));
        assert!(!xml.contains(RECEIVING_INSTITUTION_EXTENSION_URL));

        let header = &fixture.header;
        assert_eq!(header.patient().map(|p| p.to_string()).as_deref(), Some(PATIENT));
        assert!(header.bundle_uuid().is_some());
        assert!(header.composition_date().is_some());
    }

    #[test]
    fn summary_resources_and_sections_are_written() {
        let mut fixture = Fixture::with_patient_and_author();
        let xml = fixture.export().expect("export");
        assert!(xml.contains("<code value=\"420134006:363713009=2667000\"/>"));
        assert!(xml.contains("https://fhir.kbv.de/StructureDefinition/KBV_PR_MIO_ULB_Observation_Presence_Allergies"));

        fixture.set(
            "035596d1-2d72-450d-b4cc-7fead566c979",
            "KBV_PR_MIO_ULB_AllergyIntolerance.clinicalStatus.coding.code",
            Primitive::code("active"),
        );
        let xml = fixture.export().expect("export");
        assert!(xml.contains("<code value=\"420134006:363713009=52101004\"/>"));
        assert!(xml.contains("<title value=\"Allergien und Unverträglichkeiten\"/>"));
        assert!(xml.contains(
            "<reference value=\"urn:uuid:035596d1-2d72-450d-b4cc-7fead566c979\"/>"
        ));
    }

    #[test]
    fn receiving_institution_becomes_an_extension() {
        let mut fixture = Fixture::with_patient_and_author();
        let org = "9d4b229e-40bf-4bca-8680-9657895363ea";
        fixture.set(org, "KBV_PR_MIO_ULB_Organization.name", Primitive::string("Klinik"));
        fixture
            .header
            .set_receiving_institution(ResourceUuid::parse(org).expect("uuid"));
        let xml = fixture.export().expect("export");
        assert!(xml.contains(&format!(
            "<extension url=\"{RECEIVING_INSTITUTION_EXTENSION_URL}\">"
        )));
        assert!(xml.contains("<name value=\"Klinik\"/>"));
    }

    #[test]
    fn stored_header_markers_override_defaults() {
        let mut fixture = Fixture::with_patient_and_author();
        fixture.set(
            PATIENT,
            "KBV_PR_MIO_ULB_Patient.@div@",
            Primitive::string("<h1>Kleiner Patient</h1>"),
        );
        let xml = fixture.export().expect("export");
        assert!(xml.contains("<h1>Kleiner Patient</h1>"));
        assert!(!xml.contains("<h1>Patient</h1>"));
    }

    #[test]
    fn bare_uuid_references_are_written_with_prefix() {
        let mut fixture = Fixture::with_patient_and_author();
        let org = "9d4b229e-40bf-4bca-8680-9657895363ea";
        fixture.set(
            PATIENT,
            "KBV_PR_MIO_ULB_Patient.generalPractitioner.reference",
            Primitive::string(org),
        );
        fixture.set(PATIENT, "KBV_PR_MIO_ULB_Patient.name[0].family", Primitive::string(org));
        let xml = fixture.export().expect("export");
        assert!(xml.contains(&format!("<reference value=\"urn:uuid:{org}\"/>")));
        assert!(xml.contains(&format!("<family value=\"{org}\"/>")));
    }

    #[test]
    fn narrative_that_would_break_out_of_its_div_is_never_stored() {
        let mut fixture = Fixture::with_patient_and_author();
        let markup = r#"x</div></text><deceasedBoolean value="true"/><text><div xmlns="http://www.w3.org/1999/xhtml">y"#;
        let err = fixture
            .content
            .set_value(
                &format!("{PATIENT}.KBV_PR_MIO_ULB_Patient.@div@"),
                Primitive::string(markup),
            )
            .expect_err("narrative rejected");
        assert!(matches!(err, PioError::InvalidNarrative { .. }));

        let xml = fixture.export().expect("export");
        assert!(!xml.contains("deceasedBoolean"));
        assert!(xml.contains("<h1>Patient</h1>"));
    }
}
