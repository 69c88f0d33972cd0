//! Generic nested representation of a FHIR XML document.
//!
//! The reader and writer exchange documents through this tree rather than through typed resource
//! structs: the PIO schema is data, not code, so resources stay generic until the core classifies
//! their paths.
//!
//! Representation rules:
//! - Attributes are entries whose key starts with [`ATTRIBUTE_PREFIX`] (`value="x"` becomes
//!   `__value`), holding [`XmlValue::Text`].
//! - Non-whitespace text content is stored under [`TEXT_KEY`].
//! - Child elements are stored under their tag name. A tag that occurs more than once, or that is
//!   on the always-array allow-list, is stored as [`XmlValue::Repeated`].
//! - XHTML narrative (`<div xmlns="http://www.w3.org/1999/xhtml">`) is kept opaque as
//!   [`XmlValue::Narrative`] with its inner markup serialized compactly.
//!
//! Entry order is insertion order, which is document order on read and emission order on write.

use indexmap::IndexMap;

/// Prefix marking an entry as an XML attribute.
pub const ATTRIBUTE_PREFIX: &str = "__";

/// Key under which element text content is stored.
pub const TEXT_KEY: &str = "#text";

/// One value inside an [`XmlElement`].
#[derive(Clone, Debug, PartialEq)]
pub enum XmlValue {
    Text(String),
    Element(XmlElement),
    Repeated(Vec<XmlElement>),
    Narrative(Narrative),
}

impl XmlValue {
    /// The elements held by this value: one for `Element`, all of them for `Repeated`.
    pub fn elements(&self) -> Vec<&XmlElement> {
        match self {
            XmlValue::Element(e) => vec![e],
            XmlValue::Repeated(items) => items.iter().collect(),
            XmlValue::Text(_) | XmlValue::Narrative(_) => Vec::new(),
        }
    }

    pub fn as_element(&self) -> Option<&XmlElement> {
        match self {
            XmlValue::Element(e) => Some(e),
            XmlValue::Repeated(items) => items.first(),
            _ => None,
        }
    }

    pub fn as_text(&self) -> Option<&str> {
        match self {
            XmlValue::Text(t) => Some(t),
            _ => None,
        }
    }
}

/// Opaque XHTML narrative content.
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct Narrative {
    /// Namespace declared on the narrative element.
    pub namespace: String,
    /// Inner markup, compactly serialized (no insignificant whitespace between tags).
    pub markup: String,
}

/// An element: ordered attributes, text and children.
#[derive(Clone, Debug, Default, PartialEq)]
pub struct XmlElement {
    entries: IndexMap<String, XmlValue>,
}

impl XmlElement {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }

    pub fn get(&self, key: &str) -> Option<&XmlValue> {
        self.entries.get(key)
    }

    /// Iterates entries in order.
    pub fn entries(&self) -> impl Iterator<Item = (&str, &XmlValue)> {
        self.entries.iter().map(|(k, v)| (k.as_str(), v))
    }

    /// The key of the first entry; for a resource wrapper this is the resource tag.
    pub fn first_key(&self) -> Option<&str> {
        self.entries.keys().next().map(String::as_str)
    }

    /// Inserts or replaces an entry.
    pub fn insert(&mut self, key: impl Into<String>, value: XmlValue) {
        self.entries.insert(key.into(), value);
    }

    /// Sets attribute `name` (without prefix).
    pub fn set_attribute(&mut self, name: &str, value: impl Into<String>) {
        self.insert(
            format!("{ATTRIBUTE_PREFIX}{name}"),
            XmlValue::Text(value.into()),
        );
    }

    /// Reads attribute `name` (without prefix).
    pub fn attribute(&self, name: &str) -> Option<&str> {
        self.entries
            .get(&format!("{ATTRIBUTE_PREFIX}{name}"))
            .and_then(XmlValue::as_text)
    }

    /// Returns the first child element named `name`.
    pub fn child(&self, name: &str) -> Option<&XmlElement> {
        self.get(name).and_then(XmlValue::as_element)
    }

    /// Returns every child element named `name`.
    pub fn children(&self, name: &str) -> Vec<&XmlElement> {
        self.get(name).map(XmlValue::elements).unwrap_or_default()
    }

    /// Follows a chain of child names, taking the first element at each step.
    pub fn descend(&self, names: &[&str]) -> Option<&XmlElement> {
        names.iter().try_fold(self, |el, name| el.child(name))
    }

    /// Shorthand for the `value` attribute of a descendant.
    pub fn value_at(&self, names: &[&str]) -> Option<&str> {
        self.descend(names).and_then(|el| el.attribute("value"))
    }

    /// Appends a child element, promoting to [`XmlValue::Repeated`] on the second occurrence.
    ///
    /// With `always_array` set, the first occurrence is already stored as `Repeated`.
    pub fn push_child(&mut self, name: &str, child: XmlElement, always_array: bool) {
        match self.entries.get_mut(name) {
            Some(XmlValue::Repeated(items)) => items.push(child),
            Some(slot) => {
                *slot = match std::mem::replace(slot, XmlValue::Repeated(Vec::new())) {
                    XmlValue::Element(first) => XmlValue::Repeated(vec![first, child]),
                    _ => XmlValue::Element(child),
                };
            }
            None if always_array => {
                self.entries
                    .insert(name.to_owned(), XmlValue::Repeated(vec![child]));
            }
            None => {
                self.entries.insert(name.to_owned(), XmlValue::Element(child));
            }
        }
    }

    /// Depth-first search for the first entry named `key`, including this element's own entries.
    pub fn find(&self, key: &str) -> Option<&XmlValue> {
        if let Some(found) = self.entries.get(key) {
            return Some(found);
        }
        self.entries.values().find_map(|value| {
            value
                .elements()
                .into_iter()
                .find_map(|element| element.find(key))
        })
    }
}
