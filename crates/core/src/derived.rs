//! Derived summary resources.
//!
//! Before every export a fixed roster of presence/summary resources is regenerated from the
//! current content: each one states whether any resource of its source types exists and links
//! to those resources. Regeneration replaces earlier instances and keeps their UUID, so running
//! it twice on unchanged content yields identical resources.

use crate::constants::{HAS_MEMBER_EXTENSION_URL, SNOMED_SYSTEM, SNOMED_VERSION};
use crate::content::ContentStore;
use crate::sections::Coding;
use crate::PioResult;
use pio_types::Primitive;
use pio_uuid::ResourceUuid;

/// Version written on every summary value coding.
const VALUE_SET_VERSION: &str = "1.0.0";

/// How a summary resource references its source resources.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum MemberLink {
    /// `hasMember.reference` to the first source only.
    FirstHasMember,
    /// `hasMember[i].reference`.
    HasMember,
    /// `result[i].reference`.
    Result,
    /// `extension[i]` with the has-member url and `valueReference.reference`.
    Extension,
}

/// Value coding of a summary, with its absent and present variants.
#[derive(Clone, Copy, Debug)]
pub struct PresenceValue {
    pub system: &'static str,
    pub absent: (&'static str, &'static str),
    pub present: (&'static str, &'static str),
}

/// Definition of one derived summary resource.
#[derive(Clone, Copy, Debug)]
pub struct SummaryDefinition {
    pub resource: &'static str,
    pub sources: &'static [&'static str],
    pub code: &'static str,
    pub display: &'static str,
    pub value: Option<PresenceValue>,
    pub link: MemberLink,
    /// Only emitted when at least one source exists.
    pub requires_sources: bool,
    /// An existing instance whose value code equals this is kept untouched.
    pub preserved_value_code: Option<&'static str>,
}

pub const DEGREE_OF_DISABILITY_UNKNOWN_CODE: &str =
    "404684003:363713009=373068000,47429007=(21134002:363713009=272520006)";

pub const SUMMARY_DEFINITIONS: [SummaryDefinition; 8] = [
    SummaryDefinition {
        resource: "KBV_PR_MIO_ULB_Observation_Degree_Of_Disability_Available",
        sources: &["KBV_PR_MIO_ULB_Observation_Degree_Of_Disability"],
        code: "363787002:704326004=(404684003:363713009=260411009,47429007=(21134002:363713009=272520006))",
        display: "Observable entity (observable entity) : Precondition (attribute) = ( Clinical finding (finding) : Has interpretation (attribute) = Presence findings (qualifier value) , Associated with (attribute) = ( Disability (finding) : Has interpretation (attribute) = Degree findings (qualifier value) ) )",
        value: Some(PresenceValue {
            system: "https://fhir.kbv.de/ValueSet/KBV_VS_MIO_ULB_Disability_Degree_Presence_Status",
            absent: (
                "404684003:363713009=2667000,47429007=(21134002:363713009=272520006)",
                "Clinical finding (finding) : Has interpretation (attribute) = Absent (qualifier value) , Associated with (attribute) = ( Disability (finding) : Has interpretation (attribute) = Degree findings (qualifier value) )",
            ),
            present: (
                "404684003:363713009=52101004,47429007=(21134002:363713009=272520006)",
                "Clinical finding (finding) : Has interpretation (attribute) = Present (qualifier value) , Associated with (attribute) = ( Disability (finding) : Has interpretation (attribute) = Degree findings (qualifier value) )",
            ),
        }),
        link: MemberLink::FirstHasMember,
        requires_sources: false,
        preserved_value_code: Some(DEGREE_OF_DISABILITY_UNKNOWN_CODE),
    },
    SummaryDefinition {
        resource: "KBV_PR_MIO_ULB_Observation_Presence_Allergies",
        sources: &["KBV_PR_MIO_ULB_AllergyIntolerance"],
        code: "363787002:704326004=420134006",
        display: "Observable entity (observable entity) : Precondition (attribute) = Propensity to adverse reaction (finding)",
        value: Some(PresenceValue {
            system: "https://fhir.kbv.de/ValueSet/KBV_VS_MIO_ULB_Allergies",
            absent: (
                "420134006:363713009=2667000",
                "Propensity to adverse reaction (finding) : Has interpretation (attribute) = Absent (qualifier value)",
            ),
            present: (
                "420134006:363713009=52101004",
                "Propensity to adverse reaction (finding) : Has interpretation (attribute) = Present (qualifier value)",
            ),
        }),
        link: MemberLink::Extension,
        requires_sources: false,
        preserved_value_code: None,
    },
    SummaryDefinition {
        resource: "KBV_PR_MIO_ULB_Observation_Presence_Functional_Assessment",
        sources: &[
            "KBV_PR_MIO_ULB_Observation_Total_Barthel_Index",
            "KBV_PR_MIO_ULB_ClinicalImpression_Individual_Functions_Barthel",
            "KBV_PR_MIO_ULB_Observation_Assessment_Free",
        ],
        code: "363787002:704326004=105719004",
        display: "Observable entity (observable entity) : Precondition (attribute) = Body disability AND/OR failure state (finding)",
        value: Some(PresenceValue {
            system: "https://fhir.kbv.de/ValueSet/KBV_VS_MIO_ULB_Allergies",
            absent: (
                "373572006:246090004=105719004",
                "Clinical finding absent (situation) : Associated finding (attribute) = Body disability AND/OR failure state (finding)",
            ),
            present: (
                "373573001:246090004=105719004",
                "Clinical finding present (situation) : Associated finding (attribute) = Body disability AND/OR failure state (finding)",
            ),
        }),
        link: MemberLink::Extension,
        requires_sources: false,
        preserved_value_code: None,
    },
    SummaryDefinition {
        resource: "KBV_PR_MIO_ULB_Observation_Presence_Problems",
        sources: &[
            "KBV_PR_MIO_ULB_Condition_Medical_Problem_Diagnosis",
            "KBV_PR_MIO_ULB_Condition_Care_Problem",
        ],
        code: "363787002:704326004=(404684003:47429007=55607006)",
        display: "Observable entity (observable entity) : Precondition (attribute) = ( Clinical finding (finding) : Associated with (attribute) = Problem (finding) )",
        value: Some(PresenceValue {
            system: "https://fhir.kbv.de/ValueSet/KBV_VS_MIO_ULB_Problem_Presence",
            absent: (
                "373572006:246090004=55607006",
                "Clinical finding absent (situation) : Associated finding (attribute) = Problem (finding)",
            ),
            present: (
                "373573001:246090004=55607006",
                "Clinical finding present (situation) : Associated finding (attribute) = Problem (finding)",
            ),
        }),
        link: MemberLink::Extension,
        requires_sources: false,
        preserved_value_code: None,
    },
    SummaryDefinition {
        resource: "KBV_PR_MIO_ULB_Observation_Presence_Risks",
        sources: &["KBV_PR_MIO_ULB_Observation_Risk"],
        code: "102485007",
        display: "Personal risk factor (observable entity)",
        value: Some(PresenceValue {
            system: "https://fhir.kbv.de/ValueSet/KBV_VS_MIO_ULB_Risk_Presence",
            absent: (
                "373572006:246090004=281694009",
                "Clinical finding absent (situation) : Associated finding (attribute) = Finding of at risk (finding)",
            ),
            present: (
                "373573001:246090004=281694009",
                "Clinical finding present (situation) : Associated finding (attribute) = Finding of at risk (finding)",
            ),
        }),
        link: MemberLink::HasMember,
        requires_sources: false,
        preserved_value_code: None,
    },
    SummaryDefinition {
        resource: "KBV_PR_MIO_ULB_Observation_Presence_Information_Nutrition",
        sources: &[
            "KBV_PR_MIO_ULB_Observation_Food_Type",
            "KBV_PR_MIO_ULB_Observation_Food_Administration_Form",
            "KBV_PR_MIO_ULB_Observation_Nutrition",
        ],
        code: "364393001:704321009=384760004",
        display: "Nutritional observable (observable entity) : Characterizes (attribute) = Feeding and dietary regime (regime/therapy)",
        value: Some(PresenceValue {
            system: "https://fhir.kbv.de/ValueSet/KBV_VS_MIO_ULB_Nutritional_Information",
            absent: (
                "373572006:246090004=300893006",
                "Clinical finding absent (situation) : Associated finding (attribute) = Nutritional finding (finding)",
            ),
            present: (
                "373573001:246090004=300893006",
                "Clinical finding present (situation) : Associated finding (attribute) = Nutritional finding (finding)",
            ),
        }),
        link: MemberLink::HasMember,
        requires_sources: false,
        preserved_value_code: None,
    },
    SummaryDefinition {
        resource: "KBV_PR_MIO_ULB_DiagnosticReport_Vital_Signs_and_Body_Measures",
        sources: &[
            "KBV_PR_MIO_ULB_Observation_Blood_Pressure",
            "KBV_PR_MIO_ULB_Observation_Body_Weight",
            "KBV_PR_MIO_ULB_Observation_Body_Height",
            "KBV_PR_MIO_ULB_Observation_Heart_Rate",
            "KBV_PR_MIO_ULB_Observation_Peripheral_Oxygen_Saturation",
            "KBV_PR_MIO_ULB_Observation_Respiratory_Rate",
            "KBV_PR_MIO_ULB_Observation_Body_Temperature",
            "KBV_PR_MIO_ULB_Observation_Glucose_Concentration",
            "KBV_PR_MIO_ULB_Observation_Assessment_Free",
        ],
        code: "1184593002",
        display: "Vital sign document section (record artifact)",
        value: None,
        link: MemberLink::Result,
        requires_sources: true,
        preserved_value_code: None,
    },
    SummaryDefinition {
        resource: "KBV_PR_MIO_ULB_Observation_Personal_Statements",
        sources: &["KBV_PR_MIO_ULB_Consent_Statement"],
        code: "363787002:704325000=371538006",
        display: "Observable entity (observable entity): Relative to (attribute) = Advance directive report (record artifact)",
        value: Some(PresenceValue {
            system: "https://fhir.kbv.de/ValueSet/KBV_VS_MIO_ULB_Advance_Directive_Status",
            absent: (
                "310301000:363713009=2667000",
                "Advance healthcare directive status (finding) : Has interpretation (attribute) = Absent (qualifier value)",
            ),
            present: (
                "310301000:363713009=52101004",
                "Advance healthcare directive status (finding) : Has interpretation (attribute) = Present (qualifier value)",
            ),
        }),
        link: MemberLink::Extension,
        requires_sources: false,
        preserved_value_code: None,
    },
];

/// Regenerates every summary resource. Returns how many were written.
///
/// # Errors
///
/// Propagates content-store write errors, e.g. when a summary UUID is already taken by a
/// resource of another type.
pub fn generate_summary_resources(
    content: &mut ContentStore,
    patient: &ResourceUuid,
) -> PioResult<usize> {
    let mut written = 0;
    for definition in &SUMMARY_DEFINITIONS {
        if generate_summary(content, patient, definition)? {
            written += 1;
        }
    }
    tracing::debug!(written, "summary resources regenerated");
    Ok(written)
}

fn generate_summary(
    content: &mut ContentStore,
    patient: &ResourceUuid,
    definition: &SummaryDefinition,
) -> PioResult<bool> {
    let existing = content.all_uuids_of_type(definition.resource);

    if let (Some(preserved), Some(first)) = (definition.preserved_value_code, existing.first()) {
        let path = format!(
            "{first}.{}.valueCodeableConcept.coding.code",
            definition.resource
        );
        let current = content.get_value(&path).ok().and_then(Primitive::as_text);
        if current == Some(preserved) {
            tracing::debug!(resource = definition.resource, "summary value preserved");
            return Ok(false);
        }
    }

    let sources: Vec<ResourceUuid> = definition
        .sources
        .iter()
        .flat_map(|source| content.all_uuids_of_type(source))
        .collect();

    content.delete_all_of_type(definition.resource);
    if definition.requires_sources && sources.is_empty() {
        return Ok(false);
    }

    let uuid = existing.first().copied().unwrap_or_default();
    let base = format!("{uuid}.{}", definition.resource);

    content.set_value(&format!("{base}.status"), Primitive::code("final"))?;
    write_coding(
        content,
        &format!("{base}.code.coding"),
        &Coding::new(SNOMED_SYSTEM, SNOMED_VERSION, definition.code, definition.display),
    )?;
    content.set_value(&format!("{base}.subject.reference"), Primitive::from(*patient))?;

    if let Some(value) = &definition.value {
        let (code, display) = if sources.is_empty() {
            value.absent
        } else {
            value.present
        };
        write_coding(
            content,
            &format!("{base}.valueCodeableConcept.coding"),
            &Coding::new(value.system, VALUE_SET_VERSION, code, display),
        )?;
    }

    match definition.link {
        MemberLink::FirstHasMember => {
            if let Some(first) = sources.first() {
                content.set_value(&format!("{base}.hasMember.reference"), Primitive::from(*first))?;
            }
        }
        MemberLink::HasMember => {
            for (i, source) in sources.iter().enumerate() {
                content.set_value(
                    &format!("{base}.hasMember[{i}].reference"),
                    Primitive::from(*source),
                )?;
            }
        }
        MemberLink::Result => {
            for (i, source) in sources.iter().enumerate() {
                content.set_value(
                    &format!("{base}.result[{i}].reference"),
                    Primitive::from(*source),
                )?;
            }
        }
        MemberLink::Extension => {
            for (i, source) in sources.iter().enumerate() {
                content.set_value(
                    &format!("{base}.extension[{i}]"),
                    Primitive::uri(HAS_MEMBER_EXTENSION_URL),
                )?;
                content.set_value(
                    &format!("{base}.extension[{i}].valueReference.reference"),
                    Primitive::from(*source),
                )?;
            }
        }
    }

    Ok(true)
}

/// Writes `coding` below `path` (which ends in `.coding`).
pub(crate) fn write_coding(content: &mut ContentStore, path: &str, coding: &Coding) -> PioResult<()> {
    content.set_value(&format!("{path}.system"), Primitive::uri(&coding.system))?;
    content.set_value(&format!("{path}.version"), Primitive::string(&coding.version))?;
    content.set_value(&format!("{path}.code"), Primitive::code(&coding.code))?;
    content.set_value(&format!("{path}.display"), Primitive::string(&coding.display))?;
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::test_support::fixture_schema;

    const PATIENT: &str = "e029b2b8-5dc6-4feb-990a-7471fb9b54e3";
    const ALLERGY: &str = "035596d1-2d72-450d-b4cc-7fead566c979";
    const WEIGHT: &str = "0d8bd5cd-cd71-4f48-a514-b28e648c541b";
    const ALLERGIES: &str = "KBV_PR_MIO_ULB_Observation_Presence_Allergies";
    const VITALS: &str = "KBV_PR_MIO_ULB_DiagnosticReport_Vital_Signs_and_Body_Measures";
    const DISABILITY: &str = "KBV_PR_MIO_ULB_Observation_Degree_Of_Disability_Available";

    fn patient() -> ResourceUuid {
        ResourceUuid::parse(PATIENT).expect("uuid")
    }

    fn value_code(content: &ContentStore, resource: &str) -> String {
        let uuid = content.all_uuids_of_type(resource)[0];
        content
            .get_value(&format!("{uuid}.{resource}.valueCodeableConcept.coding.code"))
            .expect("value code")
            .to_string()
    }

    #[test]
    fn allergy_presence_flips_from_absent_to_present() {
        let mut content = ContentStore::new(fixture_schema());
        generate_summary_resources(&mut content, &patient()).expect("generate");
        assert_eq!(content.all_uuids_of_type(ALLERGIES).len(), 1);
        assert_eq!(value_code(&content, ALLERGIES), "420134006:363713009=2667000");

        content
            .set_value(
                &format!("{ALLERGY}.KBV_PR_MIO_ULB_AllergyIntolerance.clinicalStatus.coding.code"),
                Primitive::code("active"),
            )
            .expect("allergy");
        generate_summary_resources(&mut content, &patient()).expect("regenerate");

        assert_eq!(content.all_uuids_of_type(ALLERGIES).len(), 1);
        assert_eq!(value_code(&content, ALLERGIES), "420134006:363713009=52101004");
        let summary = content.all_uuids_of_type(ALLERGIES)[0];
        let member = content
            .get_value(&format!(
                "{summary}.{ALLERGIES}.extension[0].valueReference.reference"
            ))
            .expect("member reference");
        assert_eq!(member.to_string(), format!("urn:uuid:{ALLERGY}"));
        let url = content
            .get_value(&format!("{summary}.{ALLERGIES}.extension[0]"))
            .expect("extension url");
        assert_eq!(url, &Primitive::uri(HAS_MEMBER_EXTENSION_URL));
    }

    #[test]
    fn regeneration_is_idempotent() {
        let mut content = ContentStore::new(fixture_schema());
        generate_summary_resources(&mut content, &patient()).expect("first");
        let first = content.all_uuids();
        let first: Vec<_> = first.iter().map(|(u, t)| (*u, t.to_string())).collect();
        let snapshot: Vec<_> = content.resources().map(|(u, r)| (u, r.clone())).collect();

        generate_summary_resources(&mut content, &patient()).expect("second");
        let second: Vec<_> = content.resources().map(|(u, r)| (u, r.clone())).collect();
        assert_eq!(snapshot, second);
        assert_eq!(first.len(), 7);
        assert!(!content.validator().has_invalid_paths());
    }

    #[test]
    fn vital_signs_report_needs_sources() {
        let mut content = ContentStore::new(fixture_schema());
        generate_summary_resources(&mut content, &patient()).expect("generate");
        assert!(content.all_uuids_of_type(VITALS).is_empty());

        content
            .set_value(
                &format!("{WEIGHT}.KBV_PR_MIO_ULB_Observation_Body_Weight.status"),
                Primitive::code("final"),
            )
            .expect("weight");
        generate_summary_resources(&mut content, &patient()).expect("regenerate");
        let report = content.all_uuids_of_type(VITALS)[0];
        let result = content
            .get_value(&format!("{report}.{VITALS}.result[0].reference"))
            .expect("result reference");
        assert_eq!(result.to_string(), format!("urn:uuid:{WEIGHT}"));
    }

    #[test]
    fn unknown_degree_of_disability_is_preserved() {
        let mut content = ContentStore::new(fixture_schema());
        generate_summary_resources(&mut content, &patient()).expect("generate");
        let uuid = content.all_uuids_of_type(DISABILITY)[0];
        content
            .set_value(
                &format!("{uuid}.{DISABILITY}.valueCodeableConcept.coding.code"),
                Primitive::code(DEGREE_OF_DISABILITY_UNKNOWN_CODE),
            )
            .expect("mark unknown");

        generate_summary_resources(&mut content, &patient()).expect("regenerate");
        assert_eq!(content.all_uuids_of_type(DISABILITY), vec![uuid]);
        assert_eq!(value_code(&content, DISABILITY), DEGREE_OF_DISABILITY_UNKNOWN_CODE);
    }
}
