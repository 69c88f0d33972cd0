//! Addressable paths: `<uuid>.<ResourceType>.<field>[<index>].<field>...`.
//!
//! A setting path names one primitive leaf. It either addresses a resource header field through
//! one of the markers `@id@`, `@profile@`, `@status@`, `@div@` (always directly below the
//! resource type), or a nested field whose leaf lives under a terminal key: `__url` when the last
//! field is `extension`, `__value` otherwise. The terminal may also be spelled out explicitly.

use crate::{PioError, PioResult};
use pio_uuid::ResourceUuid;
use std::borrow::Cow;
use std::fmt;

/// Key holding a primitive value inside a field node.
pub const VALUE_KEY: &str = "__value";

/// Key holding the url of an extension node.
pub const URL_KEY: &str = "__url";

/// Resource header fields stored under synthetic markers.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash)]
pub enum HeaderField {
    Id,
    Profile,
    Status,
    Div,
}

impl HeaderField {
    pub const ALL: [HeaderField; 4] = [
        HeaderField::Id,
        HeaderField::Profile,
        HeaderField::Status,
        HeaderField::Div,
    ];

    /// The marker key, e.g. `@profile@`.
    pub fn marker(self) -> &'static str {
        match self {
            HeaderField::Id => "@id@",
            HeaderField::Profile => "@profile@",
            HeaderField::Status => "@status@",
            HeaderField::Div => "@div@",
        }
    }

    pub fn from_marker(marker: &str) -> Option<Self> {
        Self::ALL.into_iter().find(|f| f.marker() == marker)
    }

    /// Resolves the XML element name a header value is read from (`id`, `profile`, `status`,
    /// `div`).
    pub fn from_name(name: &str) -> Option<Self> {
        match name {
            "id" => Some(HeaderField::Id),
            "profile" => Some(HeaderField::Profile),
            "status" => Some(HeaderField::Status),
            "div" => Some(HeaderField::Div),
            _ => None,
        }
    }
}

/// Where a field path keeps its primitive.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum Terminal {
    Value,
    Url,
}

impl Terminal {
    pub fn key(self) -> &'static str {
        match self {
            Terminal::Value => VALUE_KEY,
            Terminal::Url => URL_KEY,
        }
    }

    pub fn from_key(key: &str) -> Option<Self> {
        match key {
            VALUE_KEY => Some(Terminal::Value),
            URL_KEY => Some(Terminal::Url),
            _ => None,
        }
    }

    /// Terminal implied by the last field name.
    fn implied_by(name: &str) -> Self {
        if name == "extension" {
            Terminal::Url
        } else {
            Terminal::Value
        }
    }
}

/// One field segment with its optional array index.
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct Segment {
    pub name: String,
    pub index: Option<usize>,
}

impl Segment {
    fn parse(raw: &str) -> Option<Self> {
        let Some((name, rest)) = raw.split_once('[') else {
            return (!raw.is_empty() && !raw.contains(']')).then(|| Segment {
                name: raw.to_owned(),
                index: None,
            });
        };
        let digits = rest.strip_suffix(']')?;
        if name.is_empty() || digits.is_empty() || !digits.bytes().all(|b| b.is_ascii_digit()) {
            return None;
        }
        Some(Segment {
            name: name.to_owned(),
            index: Some(digits.parse().ok()?),
        })
    }
}

impl fmt::Display for Segment {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self.index {
            Some(i) => write!(f, "{}[{}]", self.name, i),
            None => f.write_str(&self.name),
        }
    }
}

/// What a setting path points at inside its resource.
#[derive(Clone, Debug, PartialEq, Eq)]
pub enum PathTarget {
    Header(HeaderField),
    Field {
        segments: Vec<Segment>,
        terminal: Terminal,
    },
}

/// Storage key of a UUID segment: the lowercase form of a valid UUID, anything else verbatim.
pub fn canonical_uuid(raw: &str) -> Cow<'_, str> {
    match ResourceUuid::parse(raw) {
        Ok(uuid) if uuid.to_string() != raw => Cow::Owned(uuid.to_string()),
        _ => Cow::Borrowed(raw),
    }
}

/// `path` with its first segment replaced by [`canonical_uuid`].
pub fn canonical_path(path: &str) -> Cow<'_, str> {
    let Some((first, rest)) = path.split_once('.') else {
        return canonical_uuid(path);
    };
    match canonical_uuid(first) {
        Cow::Borrowed(_) => Cow::Borrowed(path),
        Cow::Owned(uuid) => Cow::Owned(format!("{uuid}.{rest}")),
    }
}

/// A parsed setting path.
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct SettingPath {
    /// First segment as storage key (see [`canonical_uuid`]). Syntactic UUID validity is checked
    /// by the validator, not here.
    pub uuid: String,
    pub resource_type: String,
    pub target: PathTarget,
}

impl SettingPath {
    /// Parses `path`.
    ///
    /// # Errors
    ///
    /// Returns [`PioError::MalformedPath`] if the path has fewer than three segments, an empty
    /// segment, a malformed index, a header marker anywhere but directly below the resource type,
    /// or a terminal key anywhere but at the end.
    pub fn parse(path: &str) -> PioResult<Self> {
        let malformed = || PioError::MalformedPath(path.to_owned());

        let raw: Vec<&str> = path.split('.').collect();
        if raw.len() < 3 || raw[0].is_empty() || raw[1].is_empty() {
            return Err(malformed());
        }
        let uuid = canonical_uuid(raw[0]).into_owned();
        let resource_type = raw[1].to_owned();
        let mut fields = &raw[2..];

        if let Some(field) = HeaderField::from_marker(fields[0]) {
            if fields.len() != 1 {
                return Err(malformed());
            }
            return Ok(Self {
                uuid,
                resource_type,
                target: PathTarget::Header(field),
            });
        }

        let mut explicit = None;
        if let Some((last, rest)) = fields.split_last() {
            if let Some(terminal) = Terminal::from_key(last) {
                explicit = Some(terminal);
                fields = rest;
            }
        }
        if fields.is_empty() {
            return Err(malformed());
        }

        let segments = fields
            .iter()
            .map(|raw| {
                if raw.starts_with('@') || Terminal::from_key(raw).is_some() {
                    return None;
                }
                Segment::parse(raw)
            })
            .collect::<Option<Vec<_>>>()
            .ok_or_else(malformed)?;

        let terminal = match (explicit, segments.last()) {
            (Some(terminal), _) => terminal,
            (None, Some(last)) => Terminal::implied_by(&last.name),
            (None, None) => return Err(malformed()),
        };

        Ok(Self {
            uuid,
            resource_type,
            target: PathTarget::Field { segments, terminal },
        })
    }

    /// Key under which the primitive is stored in its parent node.
    pub fn leaf_key(&self) -> &'static str {
        match &self.target {
            PathTarget::Header(field) => field.marker(),
            PathTarget::Field { terminal, .. } => terminal.key(),
        }
    }

    /// For a path ending in an indexed field, the list path without that index and the index,
    /// e.g. (`<uuid>.<Type>.name[0].given`, `2`) for `...name[0].given[2]`.
    pub fn list_item(&self) -> Option<(String, usize)> {
        let PathTarget::Field { segments, .. } = &self.target else {
            return None;
        };
        let (last, parents) = segments.split_last()?;
        let index = last.index?;
        let mut out = format!("{}.{}", self.uuid, self.resource_type);
        for segment in parents {
            out.push('.');
            out.push_str(&segment.to_string());
        }
        out.push('.');
        out.push_str(&last.name);
        Some((out, index))
    }

    /// The path without its terminal key, e.g. `<uuid>.<Type>.name[0].family`.
    pub fn node_path(&self) -> String {
        match &self.target {
            PathTarget::Header(field) => {
                format!("{}.{}.{}", self.uuid, self.resource_type, field.marker())
            }
            PathTarget::Field { segments, .. } => {
                let mut out = format!("{}.{}", self.uuid, self.resource_type);
                for segment in segments {
                    out.push('.');
                    out.push_str(&segment.to_string());
                }
                out
            }
        }
    }
}
