//! Composition section templates and their membership.
//!
//! Templates (title and coding) are declared as fixed values on the reduced schema's
//! `KBV_PR_MIO_ULB_Composition.section:<slice>...` paths. Which resource types a section collects
//! is a static table embedded in this crate.

use crate::constants::{COMPOSITION_RESOURCE_NAME, GIVEN_THINGS_SECTION_NAME};
use crate::content::ContentStore;
use crate::header::{GivenDeviceCategory, HeaderStore};
use crate::schema::SchemaTable;
use crate::{PioError, PioResult};
use indexmap::IndexMap;
use pio_uuid::ResourceUuid;

const SECTION_LOOKUP_TABLE: &str = include_str!("../assets/section_uuid_table.json");

/// A terminology coding.
#[derive(Clone, Debug, Default, PartialEq, Eq)]
pub struct Coding {
    pub system: String,
    pub version: String,
    pub code: String,
    pub display: String,
}

impl Coding {
    pub fn new(system: &str, version: &str, code: &str, display: &str) -> Self {
        Self {
            system: system.to_owned(),
            version: version.to_owned(),
            code: code.to_owned(),
            display: display.to_owned(),
        }
    }
}

/// Title and coding of one composition section.
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct SectionTemplate {
    /// Slice name, e.g. `pflegegrad`.
    pub slice: String,
    pub title: String,
    pub coding: Coding,
}

/// A section ready to be written.
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct Section<'a> {
    pub template: &'a SectionTemplate,
    pub entries: Vec<ResourceUuid>,
}

/// Section templates plus the resource types each section collects.
#[derive(Clone, Debug, Default)]
pub struct SectionCatalog {
    templates: Vec<SectionTemplate>,
    members: IndexMap<String, Vec<String>>,
}

impl SectionCatalog {
    /// Reads the templates from the composition's fixed values and loads the embedded
    /// membership table.
    ///
    /// # Errors
    ///
    /// Returns [`PioError::Schema`] if the embedded membership table is not valid JSON.
    pub fn from_schema(schema: &SchemaTable) -> PioResult<Self> {
        let members: IndexMap<String, Vec<String>> = serde_json::from_str(SECTION_LOOKUP_TABLE)
            .map_err(|e| PioError::Schema(format!("section look-up table: {e}")))?;
        let templates = schema
            .resource(COMPOSITION_RESOURCE_NAME)
            .map(|composition| templates_from_fixed_values(composition.fixed_values()))
            .unwrap_or_default();
        if templates.is_empty() {
            tracing::warn!("schema declares no composition section templates");
        }
        Ok(Self { templates, members })
    }

    pub fn templates(&self) -> &[SectionTemplate] {
        &self.templates
    }

    /// Resource types collected by the section `slice`.
    pub fn members(&self, slice: &str) -> &[String] {
        self.members
            .get(slice)
            .map(Vec::as_slice)
            .unwrap_or_default()
    }

    /// Builds every section that has at least one entry, in template order.
    ///
    /// The given-things section collects the header's given-device lists; every other section
    /// collects the resources of its member types.
    pub fn sections<'a>(&'a self, content: &ContentStore, header: &HeaderStore) -> Vec<Section<'a>> {
        self.templates
            .iter()
            .filter_map(|template| {
                let members = self.members(&template.slice);
                let entries: Vec<ResourceUuid> = if template.slice == GIVEN_THINGS_SECTION_NAME {
                    members
                        .iter()
                        .filter_map(|name| GivenDeviceCategory::from_resource_name(name))
                        .flat_map(|category| header.given_devices(category).iter().copied())
                        .collect()
                } else {
                    members
                        .iter()
                        .flat_map(|name| content.all_uuids_of_type(name))
                        .collect()
                };
                (!entries.is_empty()).then_some(Section { template, entries })
            })
            .collect()
    }
}

#[derive(Default)]
struct PartialTemplate {
    title: Option<String>,
    coding: Coding,
}

fn templates_from_fixed_values<'a>(
    fixed: impl Iterator<Item = (&'a str, &'a str)>,
) -> Vec<SectionTemplate> {
    let prefix = format!("{COMPOSITION_RESOURCE_NAME}.section:");
    let mut partial: IndexMap<String, PartialTemplate> = IndexMap::new();

    for (path, value) in fixed {
        let Some(rest) = path.strip_prefix(&prefix) else {
            continue;
        };
        let Some((slice, field)) = rest.split_once('.') else {
            continue;
        };
        let entry = partial.entry(slice.to_owned()).or_default();
        let value = value.to_owned();
        match field {
            "title" => entry.title = Some(value),
            "code.coding.system" => entry.coding.system = value,
            "code.coding.version" => entry.coding.version = value,
            "code.coding.code" => entry.coding.code = value,
            "code.coding.display" => entry.coding.display = value,
            _ => {}
        }
    }

    partial
        .into_iter()
        .filter_map(|(slice, p)| match p.title {
            Some(title) if !p.coding.code.is_empty() => Some(SectionTemplate {
                slice,
                title,
                coding: p.coding,
            }),
            _ => {
                tracing::warn!(%slice, "composition section template lacks title or code");
                None
            }
        })
        .collect()
}
