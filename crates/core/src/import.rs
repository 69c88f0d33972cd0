//! Import transform: parsed FHIR XML tree → Content and Header stores.
//!
//! Only a document without any `entry` or without a `Bundle` root aborts the import. Every per-path problem
//! is recorded as an [`ImportIssue`], and paths the reduced schema does not retain are recorded as
//! [`Exclusions`].

use crate::constants::{
    GIVEN_THINGS_SECTION_CODE, MESSAGE_PARSE_FAILED, MESSAGE_PATH_NOT_IN_TABLE,
    MESSAGE_UNSUPPORTED_ATTRIBUTE, MESSAGE_UNSUPPORTED_HEADER,
    RECEIVING_INSTITUTION_EXTENSION_URL,
};
use crate::content::ContentStore;
use crate::header::{GivenDeviceCategory, HeaderStore};
use crate::path::{HeaderField, Terminal};
use crate::schema::{resource_name_from_profile, SchemaTable};
use crate::{PioError, PioResult};
use fhir::{XmlElement, XmlValue, ATTRIBUTE_PREFIX};
use indexmap::{IndexMap, IndexSet};
use pio_types::{FhirDateTime, Primitive, PrimitiveKind};
use pio_uuid::{ResourceUuid, URN_UUID_PREFIX};
use serde::Serialize;
use std::collections::HashMap;

/// A recorded, non-fatal import problem.
#[derive(Clone, Debug, PartialEq, Eq, Serialize)]
pub struct ImportIssue {
    /// UUID of the affected resource; `None` for bundle and composition fields.
    pub uuid: Option<String>,
    pub path: String,
    pub message: String,
    pub data: String,
}

/// Paths known to the full schema but not retained by the reduced one.
///
/// Keyed resource name → UUID → path → raw value.
#[derive(Clone, Debug, Default, PartialEq, Eq, Serialize)]
#[serde(transparent)]
pub struct Exclusions(IndexMap<String, IndexMap<String, IndexMap<String, String>>>);

impl Exclusions {
    fn record(&mut self, resource: &str, uuid: &str, path: String, raw: String) {
        self.0
            .entry(resource.to_owned())
            .or_default()
            .entry(uuid.to_owned())
            .or_default()
            .insert(path, raw);
    }

    /// Total number of excluded paths.
    pub fn count(&self) -> usize {
        self.0
            .values()
            .flat_map(IndexMap::values)
            .map(IndexMap::len)
            .sum()
    }

    pub fn is_empty(&self) -> bool {
        self.0.is_empty()
    }

    /// Excluded paths of one resource.
    pub fn for_resource(&self, resource: &str, uuid: &str) -> Option<&IndexMap<String, String>> {
        self.0.get(resource).and_then(|by_uuid| by_uuid.get(uuid))
    }

    pub fn entries(&self) -> &IndexMap<String, IndexMap<String, IndexMap<String, String>>> {
        &self.0
    }
}

/// What an import recorded besides the stored data.
#[derive(Clone, Debug, Default, PartialEq, Eq)]
pub struct ImportOutcome {
    pub issues: Vec<ImportIssue>,
    pub exclusions: Exclusions,
}

impl ImportOutcome {
    fn issue(&mut self, uuid: Option<&str>, path: String, message: &str, data: &str) {
        tracing::debug!(%path, message, "import issue recorded");
        self.issues.push(ImportIssue {
            uuid: uuid.map(str::to_owned),
            path,
            message: message.to_owned(),
            data: data.to_owned(),
        });
    }
}

/// One entry of the bundle that is not the composition.
struct BundleEntry<'a> {
    uuid: Option<ResourceUuid>,
    tag: &'a str,
    resource: &'a XmlElement,
}

impl BundleEntry<'_> {
    fn profile(&self) -> Option<&str> {
        self.resource.value_at(&["meta", "profile"])
    }

    fn resource_name(&self) -> Option<&str> {
        self.profile().map(resource_name_from_profile)
    }
}

/// Populates `content` and `header` from the parsed document `root`.
///
/// # Errors
///
/// - [`PioError::NoResources`] if the document holds no `entry` element at all.
/// - [`PioError::NoBundle`] if it has entries but no `Bundle` root.
///
/// A bundle whose only entry is the composition imports without resources.
pub fn import_bundle(
    root: &XmlElement,
    schema: &SchemaTable,
    content: &mut ContentStore,
    header: &mut HeaderStore,
) -> PioResult<ImportOutcome> {
    if root.find("entry").is_none() {
        return Err(PioError::NoResources);
    }
    let bundle = root.child("Bundle").ok_or(PioError::NoBundle)?;

    let mut composition = None;
    let mut entries = Vec::new();
    for entry in bundle.children("entry") {
        let Some(wrapper) = entry.child("resource") else {
            continue;
        };
        let Some((tag, resource)) = wrapper
            .first_key()
            .and_then(|tag| wrapper.child(tag).map(|resource| (tag, resource)))
        else {
            continue;
        };
        if tag == "Composition" {
            composition = Some(resource);
            continue;
        }
        let uuid = entry
            .value_at(&["fullUrl"])
            .and_then(|url| ResourceUuid::parse_reference(url).ok())
            .or_else(|| {
                resource
                    .value_at(&["id"])
                    .and_then(|id| ResourceUuid::parse_reference(id).ok())
            });
        entries.push(BundleEntry {
            uuid,
            tag,
            resource,
        });
    }

    let mut outcome = ImportOutcome::default();
    read_bundle_header(bundle, header, &mut outcome);
    if let Some(composition) = composition {
        read_composition_header(composition, header, &mut outcome);
        read_given_things(composition, &entries, header);
    } else {
        tracing::warn!("bundle has no composition");
    }

    let mut imported = 0;
    for entry in &entries {
        let Some(uuid) = entry.uuid else {
            tracing::warn!(tag = entry.tag, "entry without a usable UUID skipped");
            continue;
        };
        let Some(name) = entry.resource_name() else {
            tracing::warn!(%uuid, tag = entry.tag, "entry without profile skipped");
            continue;
        };
        if !schema.contains(name) {
            tracing::warn!(%uuid, resource = name, "unknown profile, entry skipped");
            continue;
        }
        import_resource(schema, content, &mut outcome, uuid, name, entry.resource);
        imported += 1;
    }

    tracing::info!(
        resources = imported,
        issues = outcome.issues.len(),
        exclusions = outcome.exclusions.count(),
        "bundle imported"
    );
    Ok(outcome)
}

fn read_bundle_header(bundle: &XmlElement, header: &mut HeaderStore, outcome: &mut ImportOutcome) {
    if let Some(id) = bundle.value_at(&["id"]) {
        match ResourceUuid::parse_reference(id) {
            Ok(uuid) => header.set_bundle_uuid(uuid),
            Err(err) => outcome.issue(None, "Bundle.id".into(), &err.to_string(), id),
        }
    }
    if let Some(value) = bundle.value_at(&["identifier", "value"]) {
        match ResourceUuid::parse_reference(value) {
            Ok(uuid) => header.set_bundle_identifier_uuid(uuid),
            Err(err) => outcome.issue(None, "Bundle.identifier.value".into(), &err.to_string(), value),
        }
    }
    if let Some(timestamp) = bundle.value_at(&["timestamp"]) {
        match FhirDateTime::parse(timestamp) {
            Ok(ts) => header.set_bundle_timestamp(ts),
            Err(err) => outcome.issue(None, "Bundle.timestamp".into(), &err.to_string(), timestamp),
        }
    }
}

fn read_composition_header(
    composition: &XmlElement,
    header: &mut HeaderStore,
    outcome: &mut ImportOutcome,
) {
    let mut reference = |path: &str, raw: &str| match ResourceUuid::parse_reference(raw) {
        Ok(uuid) => Some(uuid),
        Err(err) => {
            outcome.issue(None, format!("Composition.{path}"), &err.to_string(), raw);
            None
        }
    };

    if let Some(uuid) = composition.value_at(&["id"]).and_then(|id| reference("id", id)) {
        header.set_composition_uuid(uuid);
    }
    if let Some(uuid) = composition
        .value_at(&["subject", "reference"])
        .and_then(|raw| reference("subject.reference", raw))
    {
        header.set_patient(uuid);
    }
    for author in composition.children("author") {
        if let Some(uuid) = author
            .value_at(&["reference"])
            .and_then(|raw| reference("author.reference", raw))
        {
            header.add_author(uuid);
        }
    }
    for extension in composition.children("extension") {
        if extension.attribute("url") != Some(RECEIVING_INSTITUTION_EXTENSION_URL) {
            continue;
        }
        if let Some(uuid) = extension
            .value_at(&["valueReference", "reference"])
            .and_then(|raw| reference("extension.valueReference.reference", raw))
        {
            header.set_receiving_institution(uuid);
        }
    }

    if let Some(date) = composition.value_at(&["date"]) {
        match FhirDateTime::parse(date) {
            Ok(date) => header.set_composition_date(date),
            Err(err) => outcome.issue(None, "Composition.date".into(), &err.to_string(), date),
        }
    }
}

/// Files the entries of the "given things" section under their device categories.
fn read_given_things(composition: &XmlElement, entries: &[BundleEntry<'_>], header: &mut HeaderStore) {
    let Some(section) = composition
        .children("section")
        .into_iter()
        .find(|s| s.value_at(&["code", "coding", "code"]) == Some(GIVEN_THINGS_SECTION_CODE))
    else {
        return;
    };
    let given: IndexSet<ResourceUuid> = section
        .children("entry")
        .into_iter()
        .filter_map(|e| e.value_at(&["reference"]))
        .filter_map(|raw| ResourceUuid::parse_reference(raw).ok())
        .collect();

    for entry in entries {
        let (Some(uuid), Some(category)) = (
            entry.uuid,
            entry
                .resource_name()
                .and_then(GivenDeviceCategory::from_resource_name),
        ) else {
            continue;
        };
        if given.contains(&uuid) {
            header.add_given_device(uuid, category);
        }
    }
}

/// How a leaf of the parsed resource is stored.
#[derive(Debug)]
enum LeafKind {
    Terminal(Terminal),
    Narrative,
    Unsupported,
}

/// A leaf of a parsed resource: its field segments (with indices) and raw string.
#[derive(Debug)]
struct Leaf {
    segments: Vec<String>,
    key: Option<String>,
    kind: LeafKind,
    raw: String,
}

impl Leaf {
    /// Relative path as read, including the attribute key.
    fn display_path(&self) -> String {
        match &self.key {
            Some(key) => {
                let mut parts = self.segments.clone();
                parts.push(key.clone());
                parts.join(".")
            }
            None => self.segments.join("."),
        }
    }

    fn searching_segments(&self) -> Vec<&str> {
        self.segments
            .iter()
            .map(|s| s.split('[').next().unwrap_or(s))
            .collect()
    }
}

fn collect_leaves(element: &XmlElement, prefix: &[String], out: &mut Vec<Leaf>) {
    for (key, value) in element.entries() {
        match value {
            XmlValue::Text(raw) => {
                if key.strip_prefix(ATTRIBUTE_PREFIX) == Some("xmlns") {
                    continue;
                }
                let kind = Terminal::from_key(key)
                    .map(LeafKind::Terminal)
                    .unwrap_or(LeafKind::Unsupported);
                out.push(Leaf {
                    segments: prefix.to_vec(),
                    key: Some(key.to_owned()),
                    kind,
                    raw: raw.clone(),
                });
            }
            XmlValue::Narrative(narrative) => {
                let mut segments = prefix.to_vec();
                segments.push(key.to_owned());
                out.push(Leaf {
                    segments,
                    key: None,
                    kind: LeafKind::Narrative,
                    raw: narrative.markup.clone(),
                });
            }
            XmlValue::Element(child) => {
                let mut segments = prefix.to_vec();
                segments.push(key.to_owned());
                collect_leaves(child, &segments, out);
            }
            XmlValue::Repeated(items) => {
                for (i, item) in items.iter().enumerate() {
                    let mut segments = prefix.to_vec();
                    segments.push(format!("{key}[{i}]"));
                    collect_leaves(item, &segments, out);
                }
            }
        }
    }
}

/// Resource header fields and the leaves they are read from.
fn header_field(searching: &[&str], kind: &LeafKind) -> Option<HeaderField> {
    match (searching, kind) {
        (["id"], LeafKind::Terminal(Terminal::Value)) => Some(HeaderField::Id),
        (["meta", "profile"], LeafKind::Terminal(Terminal::Value)) => Some(HeaderField::Profile),
        (["text", "status"], LeafKind::Terminal(Terminal::Value)) => Some(HeaderField::Status),
        (["text", "div"], LeafKind::Narrative) => Some(HeaderField::Div),
        _ => None,
    }
}

/// Assigns store indices to list items as they receive their first stored leaf, so items
/// whose leaves are all rejected or excluded leave no gap in the stored list.
#[derive(Debug, Default)]
struct ListIndices {
    /// Item path as read → index in the store.
    assigned: HashMap<String, usize>,
    /// List path in the store → stored item count.
    lengths: HashMap<String, usize>,
}

/// An item index handed out by [`ListIndices::resolve`], kept once its leaf is stored.
#[derive(Debug)]
struct NewItem {
    source: String,
    list: String,
    index: usize,
}

impl ListIndices {
    /// Store-side segments for `segments` and the item indices they newly claim.
    fn resolve(&self, segments: &[String]) -> (Vec<String>, Vec<NewItem>) {
        let mut source = String::new();
        let mut stored = String::new();
        let mut out = Vec::with_capacity(segments.len());
        let mut claimed = Vec::new();

        for segment in segments {
            source.push('.');
            source.push_str(segment);
            let Some((name, _)) = segment.strip_suffix(']').and_then(|s| s.split_once('[')) else {
                stored.push('.');
                stored.push_str(segment);
                out.push(segment.clone());
                continue;
            };
            let list = format!("{stored}.{name}");
            let index = match self.assigned.get(&source) {
                Some(index) => *index,
                None => {
                    let index = self.lengths.get(&list).copied().unwrap_or(0);
                    claimed.push(NewItem {
                        source: source.clone(),
                        list: list.clone(),
                        index,
                    });
                    index
                }
            };
            let segment = format!("{name}[{index}]");
            stored.push('.');
            stored.push_str(&segment);
            out.push(segment);
        }
        (out, claimed)
    }

    fn commit(&mut self, claimed: Vec<NewItem>) {
        for item in claimed {
            self.assigned.insert(item.source, item.index);
            self.lengths.insert(item.list, item.index + 1);
        }
    }
}

fn import_resource(
    schema: &SchemaTable,
    content: &mut ContentStore,
    outcome: &mut ImportOutcome,
    uuid: ResourceUuid,
    name: &str,
    resource: &XmlElement,
) {
    let uuid = uuid.to_string();
    let mut leaves = Vec::new();
    collect_leaves(resource, &[], &mut leaves);
    let mut indices = ListIndices::default();

    for leaf in leaves {
        let searching = leaf.searching_segments();
        let is_header = matches!(searching.first(), Some(&("id" | "meta" | "text")));

        if is_header {
            let Some(field) = header_field(&searching, &leaf.kind) else {
                outcome.issue(Some(&uuid), leaf.display_path(), MESSAGE_UNSUPPORTED_HEADER, &leaf.raw);
                continue;
            };
            let path = format!("{uuid}.{name}.{}", field.marker());
            if let Err(err) = content.set_value(&path, Primitive::string(leaf.raw.as_str())) {
                outcome.issue(Some(&uuid), path, &err.to_string(), &leaf.raw);
            }
            continue;
        }

        let terminal = match leaf.kind {
            LeafKind::Terminal(terminal) if !leaf.segments.is_empty() => terminal,
            LeafKind::Narrative => {
                outcome.issue(Some(&uuid), leaf.display_path(), MESSAGE_PATH_NOT_IN_TABLE, &leaf.raw);
                continue;
            }
            _ => {
                outcome.issue(
                    Some(&uuid),
                    leaf.display_path(),
                    MESSAGE_UNSUPPORTED_ATTRIBUTE,
                    &leaf.raw,
                );
                continue;
            }
        };

        let node_path = format!("{uuid}.{name}.{}", leaf.segments.join("."));
        let searching_path = format!("{name}.{}", searching.join("."));
        let Some(schema_path) = schema.lookup(name, &searching_path) else {
            outcome.issue(Some(&uuid), node_path, MESSAGE_PATH_NOT_IN_TABLE, &leaf.raw);
            continue;
        };
        if !schema_path.reduced {
            tracing::debug!(path = %node_path, "path excluded by reduced schema");
            outcome.exclusions.record(name, &uuid, node_path, leaf.raw.clone());
            continue;
        }

        let kind = match terminal {
            Terminal::Url => Some(PrimitiveKind::Uri),
            Terminal::Value => schema_path.kind,
        };
        // references are stored as bare UUIDs
        let raw = match kind {
            Some(PrimitiveKind::String) => {
                leaf.raw.strip_prefix(URN_UUID_PREFIX).unwrap_or(leaf.raw.as_str())
            }
            _ => leaf.raw.as_str(),
        };
        let Some(value) = kind.and_then(|kind| Primitive::parse(kind, raw).ok()) else {
            outcome.issue(Some(&uuid), node_path, MESSAGE_PARSE_FAILED, &leaf.raw);
            continue;
        };
        let (stored, claimed) = indices.resolve(&leaf.segments);
        let setting_path = format!("{uuid}.{name}.{}.{}", stored.join("."), terminal.key());
        match content.set_value(&setting_path, value) {
            Ok(()) => indices.commit(claimed),
            Err(err) => outcome.issue(Some(&uuid), node_path, &err.to_string(), &leaf.raw),
        }
    }
}
