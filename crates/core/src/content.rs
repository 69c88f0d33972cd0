//! The Content Store: resource data keyed by UUID and field path.
//!
//! Layout mirrors the wire format: each resource is a map of fields, a field is either a nested
//! node, a list of nodes (repeated element) or a primitive stored under a terminal key
//! (`__value`, `__url`) or a header marker (`@id@`, ...).
//!
//! Writes always succeed when the path is well-formed; schema validity is recorded by the
//! [`PathValidator`] and only enforced on export.

use crate::path::{canonical_path, canonical_uuid, HeaderField, PathTarget, Segment, SettingPath};
use crate::schema::SchemaTable;
use crate::validator::PathValidator;
use crate::{PioError, PioResult};
use indexmap::IndexMap;
use pio_types::Primitive;
use pio_uuid::ResourceUuid;
use std::sync::Arc;

/// Ordered field map of a resource or nested node.
pub type FieldMap = IndexMap<String, Element>;

/// One stored field.
#[derive(Clone, Debug, PartialEq)]
pub enum Element {
    Value(Primitive),
    Node(FieldMap),
    List(Vec<FieldMap>),
}

impl Element {
    fn leaf_count(&self) -> usize {
        match self {
            Element::Value(_) => 1,
            Element::Node(map) => count_leaves(map),
            Element::List(items) => items.iter().map(count_leaves).sum(),
        }
    }
}

fn count_leaves(map: &FieldMap) -> usize {
    map.values().map(Element::leaf_count).sum()
}

/// One stored resource.
#[derive(Clone, Debug, PartialEq)]
pub struct Resource {
    resource_type: String,
    fields: FieldMap,
}

impl Resource {
    fn new(resource_type: &str) -> Self {
        Self {
            resource_type: resource_type.to_owned(),
            fields: FieldMap::new(),
        }
    }

    /// Internal resource-type name, e.g. `KBV_PR_MIO_ULB_Patient`.
    pub fn resource_type(&self) -> &str {
        &self.resource_type
    }

    pub fn fields(&self) -> &FieldMap {
        &self.fields
    }

    pub fn leaf_count(&self) -> usize {
        count_leaves(&self.fields)
    }

    pub fn is_empty(&self) -> bool {
        self.leaf_count() == 0
    }
}

/// Authoritative store of all resource data of one document.
#[derive(Clone, Debug)]
pub struct ContentStore {
    resources: IndexMap<String, Resource>,
    validator: PathValidator,
}

impl ContentStore {
    pub fn new(schema: Arc<SchemaTable>) -> Self {
        Self {
            resources: IndexMap::new(),
            validator: PathValidator::new(schema),
        }
    }

    pub fn validator(&self) -> &PathValidator {
        &self.validator
    }

    pub fn validator_mut(&mut self) -> &mut PathValidator {
        &mut self.validator
    }

    /// Writes `value` at the setting path `path`.
    ///
    /// The path is recorded as invalid if the schema does not know it; the value is stored
    /// regardless.
    ///
    /// # Errors
    ///
    /// - [`PioError::MalformedPath`] if `path` cannot be parsed, runs through a stored value, or
    ///   indexes a list beyond its end.
    /// - [`PioError::ResourceTypeConflict`] if the UUID already holds a different resource type.
    /// - [`PioError::InvalidNarrative`] if an `@div@` value is not a well-formed XHTML fragment.
    pub fn set_value(&mut self, path: &str, value: Primitive) -> PioResult<()> {
        let parsed = SettingPath::parse(path)?;

        if parsed.target == PathTarget::Header(HeaderField::Div) {
            fhir::check_narrative(&value.to_string()).map_err(|err| PioError::InvalidNarrative {
                path: path.to_owned(),
                reason: err.to_string(),
            })?;
        }

        if let Some(existing) = self.resources.get(&parsed.uuid) {
            if existing.resource_type != parsed.resource_type {
                return Err(PioError::ResourceTypeConflict {
                    uuid: parsed.uuid,
                    existing: existing.resource_type.clone(),
                    requested: parsed.resource_type,
                });
            }
        }

        if let PathTarget::Field { segments, .. } = &parsed.target {
            let fields = self.resources.get(&parsed.uuid).map(|r| &r.fields);
            check_list_growth(fields, segments, path)?;
        }

        let resource = self
            .resources
            .entry(parsed.uuid.clone())
            .or_insert_with(|| Resource::new(&parsed.resource_type));

        let written = match &parsed.target {
            PathTarget::Header(field) => {
                resource
                    .fields
                    .insert(field.marker().to_owned(), Element::Value(value));
                Ok(())
            }
            PathTarget::Field { segments, terminal } => {
                segments
                    .iter()
                    .try_fold(&mut resource.fields, |map, segment| {
                        child_map_mut(map, segment, path)
                    })
                    .map(|node| {
                        node.insert(terminal.key().to_owned(), Element::Value(value));
                    })
            }
        };

        if let Err(err) = written {
            if resource.is_empty() {
                self.resources.shift_remove(&parsed.uuid);
            }
            return Err(err);
        }

        self.validator.validate_path(&canonical_path(path));
        Ok(())
    }

    /// Reads the primitive at `path`.
    ///
    /// # Errors
    ///
    /// - [`PioError::PathNotFound`] if nothing is stored at `path`.
    /// - [`PioError::NotPrimitive`] if `path` names a node without a primitive of its own.
    /// - [`PioError::MalformedPath`] if `path` cannot be parsed.
    pub fn get_value(&self, path: &str) -> PioResult<&Primitive> {
        let parsed = SettingPath::parse(path)?;
        let not_found = || PioError::PathNotFound(path.to_owned());

        let resource = self
            .resources
            .get(&parsed.uuid)
            .filter(|r| r.resource_type == parsed.resource_type)
            .ok_or_else(not_found)?;

        match &parsed.target {
            PathTarget::Header(field) => match resource.fields.get(field.marker()) {
                Some(Element::Value(value)) => Ok(value),
                _ => Err(not_found()),
            },
            PathTarget::Field { segments, terminal } => {
                let node = segments
                    .iter()
                    .try_fold(&resource.fields, |map, segment| child_map(map, segment))
                    .ok_or_else(not_found)?;
                match node.get(terminal.key()) {
                    Some(Element::Value(value)) => Ok(value),
                    _ => Err(PioError::NotPrimitive(path.to_owned())),
                }
            }
        }
    }

    /// Removes the leaf or subtree at `path`. A two-segment path (`<uuid>.<Type>`) removes the
    /// whole resource. A resource left without leaves is pruned.
    ///
    /// # Errors
    ///
    /// Returns [`PioError::PathNotFound`] if nothing is stored at `path`.
    pub fn delete_value(&mut self, path: &str) -> PioResult<()> {
        if let Some((uuid, resource_type)) = path.split_once('.') {
            if !resource_type.contains('.') {
                let uuid = canonical_uuid(uuid);
                if self.resource_type_of(&uuid) != Some(resource_type) {
                    return Err(PioError::PathNotFound(path.to_owned()));
                }
                return self.delete_resource(&uuid);
            }
        }

        let parsed = SettingPath::parse(path)?;
        let not_found = || PioError::PathNotFound(path.to_owned());
        let resource = self
            .resources
            .get_mut(&parsed.uuid)
            .filter(|r| r.resource_type == parsed.resource_type)
            .ok_or_else(not_found)?;

        match &parsed.target {
            PathTarget::Header(field) => {
                resource
                    .fields
                    .shift_remove(field.marker())
                    .ok_or_else(not_found)?;
            }
            PathTarget::Field { segments, .. } => {
                let Some((last, parents)) = segments.split_last() else {
                    return Err(not_found());
                };
                let parent = parents
                    .iter()
                    .try_fold(&mut resource.fields, |map, segment| {
                        existing_child_map_mut(map, segment)
                    })
                    .ok_or_else(not_found)?;
                remove_segment(parent, last).ok_or_else(not_found)?;
            }
        }

        if resource.is_empty() {
            self.resources.shift_remove(&parsed.uuid);
            self.validator.forget_under(&parsed.uuid);
        } else if let Some((list, index)) = parsed.list_item() {
            self.validator.remove_list_item(&list, index);
        } else {
            self.validator.forget_under(&parsed.node_path());
        }
        Ok(())
    }

    /// Removes the resource stored under `uuid`.
    ///
    /// # Errors
    ///
    /// Returns [`PioError::PathNotFound`] if no resource is stored under `uuid`.
    pub fn delete_resource(&mut self, uuid: &str) -> PioResult<()> {
        let key = canonical_uuid(uuid);
        self.resources
            .shift_remove(&*key)
            .ok_or_else(|| PioError::PathNotFound(uuid.to_owned()))?;
        self.validator.forget_under(&key);
        Ok(())
    }

    /// Removes every resource of `resource_type`. Returns how many were removed.
    pub fn delete_all_of_type(&mut self, resource_type: &str) -> usize {
        let doomed: Vec<String> = self
            .resources
            .iter()
            .filter(|(_, r)| r.resource_type == resource_type)
            .map(|(uuid, _)| uuid.clone())
            .collect();
        for uuid in &doomed {
            self.resources.shift_remove(uuid);
            self.validator.forget_under(uuid);
        }
        doomed.len()
    }

    /// UUIDs of all resources of `resource_type`, in insertion order.
    pub fn all_uuids_of_type(&self, resource_type: &str) -> Vec<ResourceUuid> {
        self.resources()
            .filter(|(_, r)| r.resource_type == resource_type)
            .map(|(uuid, _)| uuid)
            .collect()
    }

    /// Every resource UUID with its resource type.
    pub fn all_uuids(&self) -> IndexMap<ResourceUuid, &str> {
        self.resources()
            .map(|(uuid, r)| (uuid, r.resource_type.as_str()))
            .collect()
    }

    pub fn resource_type_of(&self, uuid: &str) -> Option<&str> {
        self.resources
            .get(&*canonical_uuid(uuid))
            .map(|r| r.resource_type.as_str())
    }

    pub fn resource(&self, uuid: &ResourceUuid) -> Option<&Resource> {
        self.resources.get(&uuid.to_string())
    }

    /// Resources whose key is a syntactically valid UUID, in insertion order.
    pub fn resources(&self) -> impl Iterator<Item = (ResourceUuid, &Resource)> {
        self.resources
            .iter()
            .filter_map(|(key, r)| ResourceUuid::parse(key).ok().map(|uuid| (uuid, r)))
    }

    /// Removes resources without any leaf. Returns how many were removed.
    pub fn prune_empty_resources(&mut self) -> usize {
        let before = self.resources.len();
        self.resources.retain(|_, r| !r.is_empty());
        let pruned = before - self.resources.len();
        if pruned > 0 {
            tracing::debug!(pruned, "empty resources pruned");
        }
        pruned
    }

    pub fn is_empty(&self) -> bool {
        self.resources.is_empty()
    }

    /// Drops all resources and recorded invalid paths.
    pub fn clear(&mut self) {
        self.resources.clear();
        self.validator.clear();
    }
}

/// Checks that writing below `segments` grows each list by at most one item.
///
/// `fields` is `None` for a resource that does not exist yet.
fn check_list_growth(
    mut fields: Option<&FieldMap>,
    segments: &[Segment],
    path: &str,
) -> PioResult<()> {
    for segment in segments {
        let len = match fields.and_then(|map| map.get(&segment.name)) {
            None => 0,
            Some(Element::Node(_)) => 1,
            Some(Element::List(items)) => items.len(),
            Some(Element::Value(_)) => return Err(PioError::MalformedPath(path.to_owned())),
        };
        if segment.index.unwrap_or(0) > len {
            return Err(PioError::MalformedPath(path.to_owned()));
        }
        fields = fields.and_then(|map| child_map(map, segment));
    }
    Ok(())
}

/// Resolves (creating as needed) the node addressed by `segment` below `map`.
///
/// An indexed segment turns a single node into a list; an index equal to the list length
/// appends an item. An unindexed segment into a list addresses its first item.
fn child_map_mut<'a>(
    map: &'a mut FieldMap,
    segment: &Segment,
    path: &str,
) -> PioResult<&'a mut FieldMap> {
    let slot = map
        .entry(segment.name.clone())
        .or_insert_with(|| match segment.index {
            Some(_) => Element::List(Vec::new()),
            None => Element::Node(FieldMap::new()),
        });

    if segment.index.is_some() && matches!(slot, Element::Node(_)) {
        if let Element::Node(first) = std::mem::replace(slot, Element::List(Vec::new())) {
            *slot = Element::List(vec![first]);
        }
    }

    match slot {
        Element::Node(node) => Ok(node),
        Element::List(items) => {
            let index = segment.index.unwrap_or(0);
            if index == items.len() {
                items.push(FieldMap::new());
            }
            items
                .get_mut(index)
                .ok_or_else(|| PioError::MalformedPath(path.to_owned()))
        }
        Element::Value(_) => Err(PioError::MalformedPath(path.to_owned())),
    }
}

fn child_map<'a>(map: &'a FieldMap, segment: &Segment) -> Option<&'a FieldMap> {
    match map.get(&segment.name)? {
        Element::Node(node) if segment.index.unwrap_or(0) == 0 => Some(node),
        Element::List(items) => items.get(segment.index.unwrap_or(0)),
        _ => None,
    }
}

fn existing_child_map_mut<'a>(map: &'a mut FieldMap, segment: &Segment) -> Option<&'a mut FieldMap> {
    match map.get_mut(&segment.name)? {
        Element::Node(node) if segment.index.unwrap_or(0) == 0 => Some(node),
        Element::List(items) => items.get_mut(segment.index.unwrap_or(0)),
        _ => None,
    }
}

fn remove_segment(parent: &mut FieldMap, segment: &Segment) -> Option<()> {
    let Some(index) = segment.index else {
        parent.shift_remove(&segment.name)?;
        return Some(());
    };
    match parent.get_mut(&segment.name)? {
        Element::List(items) if index < items.len() => {
            items.remove(index);
            if items.is_empty() {
                parent.shift_remove(&segment.name);
            }
            Some(())
        }
        Element::Node(_) if index == 0 => {
            parent.shift_remove(&segment.name);
            Some(())
        }
        _ => None,
    }
}
