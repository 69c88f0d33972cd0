//! Constants used throughout the PIO core crate.
//!
//! Fixed values of the PIO bundle and composition structure, the schema file layout, and the codes
//! that identify special composition sections.

/// Directory searched for the schema tables when no explicit directory is configured.
pub const SCHEMA_DIR: &str = "schema";

/// Filename of the full resource schema table.
pub const RESOURCE_TABLE_FILENAME: &str = "resource_lookup_table.json";

/// Filename of the reduced (PIO Small) schema table.
pub const REDUCED_TABLE_FILENAME: &str = "pio_small_lookup_table.json";

/// Tags always read as repeated elements, even when they occur once.
pub const DEFAULT_ALWAYS_ARRAY: [&str; 6] = [
    "extension",
    "name",
    "identifier",
    "address",
    "telecom",
    "communication",
];

/// Internal name of the mandatory patient resource.
pub const PATIENT_RESOURCE_NAME: &str = "KBV_PR_MIO_ULB_Patient";

/// Internal name of the composition profile; its reduced-table paths declare the section templates.
pub const COMPOSITION_RESOURCE_NAME: &str = "KBV_PR_MIO_ULB_Composition";

pub const BUNDLE_PROFILE: &str =
    "https://fhir.kbv.de/StructureDefinition/KBV_PR_MIO_ULB_Bundle|1.0.0";
pub const BUNDLE_IDENTIFIER_SYSTEM: &str = "urn:ietf:rfc:3986";
pub const BUNDLE_TYPE: &str = "document";

pub const COMPOSITION_PROFILE: &str =
    "https://fhir.kbv.de/StructureDefinition/KBV_PR_MIO_ULB_Composition|1.0.0";
pub const COMPOSITION_TEXT_STATUS: &str = "extensions";
pub const COMPOSITION_NARRATIVE: &str = "<h1>Composition</h1>";
pub const COMPOSITION_STATUS: &str = "final";
pub const COMPOSITION_TITLE: &str = "Überleitungsbogen";
pub const RECEIVING_INSTITUTION_EXTENSION_URL: &str =
    "https://fhir.kbv.de/StructureDefinition/KBV_EX_MIO_ULB_Reference_Receiving_Institution";

pub const SNOMED_SYSTEM: &str = "http://snomed.info/sct";
pub const SNOMED_VERSION: &str = "http://snomed.info/sct/900000000000207008/version/20220331";

pub const COMPOSITION_TYPE_CODE: &str = "721919000";
pub const COMPOSITION_TYPE_DISPLAY: &str = "Nurse discharge summary (record artifact)";

/// Section code of "given documents, medication, aids and items".
pub const GIVEN_THINGS_SECTION_CODE: &str =
    "363787002:704326004=(404684003:47429007=49062001,363713009=52101004)";

/// Section slice name whose entries come from the given-device categories.
pub const GIVEN_THINGS_SECTION_NAME: &str =
    "mitgegebeneDokumenteArzneimittelHilfsmittelGegenstaende";

/// Extension url linking a presence observation to its members.
pub const HAS_MEMBER_EXTENSION_URL: &str =
    "https://fhir.kbv.de/StructureDefinition/KBV_EX_MIO_ULB_Reference_Has_Member";

/// Recorded when an imported leaf has no schema entry.
pub const MESSAGE_PATH_NOT_IN_TABLE: &str =
    "Path could not be found in look-up table (path does not match pio specification)";

/// Recorded when an imported leaf cannot be parsed as its declared type.
pub const MESSAGE_PARSE_FAILED: &str = "Could not parse string-value to primitive data type";

/// Recorded when an imported attribute has no place in the document model.
pub const MESSAGE_UNSUPPORTED_ATTRIBUTE: &str =
    "Attribute is not supported (only value and url attributes are stored)";

/// Recorded when an imported header element has no header marker.
pub const MESSAGE_UNSUPPORTED_HEADER: &str =
    "Header element is not supported (only id, meta.profile, text.status and text.div are stored)";
