//! XML text → [`XmlElement`] tree.

use crate::tree::{Narrative, XmlElement, XmlValue, ATTRIBUTE_PREFIX, TEXT_KEY};
use crate::writer::write_inline;
use crate::{FhirError, FhirResult, XHTML_NS};
use roxmltree::{Document, Node};

/// Reader configuration.
#[derive(Clone, Debug, Default)]
pub struct ReadOptions {
    /// Tag names always stored as [`XmlValue::Repeated`], even when they occur once.
    pub always_array: Vec<String>,
}

impl ReadOptions {
    pub fn with_always_array<I, S>(tags: I) -> Self
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        Self {
            always_array: tags.into_iter().map(Into::into).collect(),
        }
    }

    fn is_always_array(&self, name: &str) -> bool {
        self.always_array.iter().any(|t| t == name)
    }
}

/// Parses `input` into a tree whose single entry is the document's root element.
///
/// For a FHIR bundle the result is `{ "Bundle": { "__xmlns": ..., "id": ..., "entry": [...] } }`.
///
/// # Errors
///
/// Returns [`crate::FhirError::InvalidXml`] if `input` is not well-formed XML.
pub fn parse_document(input: &str, options: &ReadOptions) -> FhirResult<XmlElement> {
    let doc = Document::parse(input)?;
    let root = doc.root_element();

    let mut wrapper = XmlElement::new();
    let name = root.tag_name().name();
    let value = read_node(&root, None, options)?;
    match value {
        XmlValue::Element(el) => wrapper.push_child(name, el, options.is_always_array(name)),
        other => wrapper.insert(name, other),
    }
    Ok(wrapper)
}

/// Checks that narrative `markup` is well-formed content for a single XHTML `div`.
///
/// Markup is written into the `div` as is on export, so it must not close the `div` or open
/// elements outside it.
///
/// # Errors
///
/// Returns [`FhirError::InvalidXml`] if the wrapped markup is not well-formed, and
/// [`FhirError::InvalidNarrative`] if it does not stay inside the `div`.
pub fn check_narrative(markup: &str) -> FhirResult<()> {
    let wrapped = format!(r#"<div xmlns="{XHTML_NS}">{markup}</div>"#);
    let doc = Document::parse(&wrapped)?;
    let root = doc.root_element();
    if root.tag_name().namespace() != Some(XHTML_NS) || root.range().end != wrapped.len() {
        return Err(FhirError::InvalidNarrative(markup.to_owned()));
    }
    Ok(())
}

fn read_node(
    node: &Node,
    parent_ns: Option<&str>,
    options: &ReadOptions,
) -> FhirResult<XmlValue> {
    let ns = node.tag_name().namespace();

    if ns == Some(XHTML_NS) {
        let mut markup = String::new();
        for child in node.children() {
            write_inline(&child, &mut markup)?;
        }
        return Ok(XmlValue::Narrative(Narrative {
            namespace: XHTML_NS.to_owned(),
            markup,
        }));
    }

    let mut element = XmlElement::new();
    if let Some(ns) = ns.filter(|ns| Some(*ns) != parent_ns) {
        element.set_attribute("xmlns", ns);
    }
    for attr in node.attributes() {
        element.insert(
            format!("{ATTRIBUTE_PREFIX}{}", attr.name()),
            XmlValue::Text(attr.value().to_owned()),
        );
    }

    let mut text = String::new();
    for child in node.children() {
        if child.is_element() {
            let name = child.tag_name().name();
            match read_node(&child, ns, options)? {
                XmlValue::Element(el) => {
                    element.push_child(name, el, options.is_always_array(name))
                }
                other => element.insert(name, other),
            }
        } else if child.is_text() {
            if let Some(t) = child.text().map(str::trim).filter(|t| !t.is_empty()) {
                text.push_str(t);
            }
        }
    }
    if !text.is_empty() {
        element.insert(TEXT_KEY, XmlValue::Text(text));
    }

    Ok(XmlValue::Element(element))
}

#[cfg(test)]
mod tests {
    use super::*;

    fn options() -> ReadOptions {
        ReadOptions::with_always_array(["name", "extension"])
    }

    const PATIENT: &str = r#"<Bundle xmlns="http://hl7.org/fhir">
  <entry>
    <fullUrl value="urn:uuid:e029b2b8-5dc6-4feb-990a-7471fb9b54e3"/>
    <resource>
      <Patient>
        <text>
          <status value="extensions"/>
          <div xmlns="http://www.w3.org/1999/xhtml">
            <h1><b>Kleiner</b> Patient</h1>
          </div>
        </text>
        <name>
          <given value="Peter"/>
          <given value="Paul"/>
        </name>
        <gender value="male"/>
      </Patient>
    </resource>
  </entry>
</Bundle>"#;

    #[test]
    fn root_is_wrapped_with_namespace_attribute() {
        let doc = parse_document(PATIENT, &options()).expect("parse");
        let bundle = doc.child("Bundle").expect("bundle");
        assert_eq!(bundle.attribute("xmlns"), Some("http://hl7.org/fhir"));
        // children share the namespace so do not repeat it
        let entry = bundle.child("entry").expect("entry");
        assert_eq!(entry.attribute("xmlns"), None);
    }

    #[test]
    fn attributes_and_repetition() {
        let doc = parse_document(PATIENT, &options()).expect("parse");
        let patient = doc
            .descend(&["Bundle", "entry", "resource", "Patient"])
            .expect("patient");

        assert_eq!(patient.value_at(&["gender"]), Some("male"));
        assert!(matches!(patient.get("name"), Some(XmlValue::Repeated(v)) if v.len() == 1));
        let name = patient.child("name").expect("name");
        assert!(matches!(name.get("given"), Some(XmlValue::Repeated(v)) if v.len() == 2));
    }

    #[test]
    fn narrative_is_kept_compact_and_opaque() {
        let doc = parse_document(PATIENT, &options()).expect("parse");
        let text = doc
            .descend(&["Bundle", "entry", "resource", "Patient", "text"])
            .expect("text");
        match text.get("div") {
            Some(XmlValue::Narrative(n)) => {
                assert_eq!(n.namespace, XHTML_NS);
                assert_eq!(n.markup, "<h1><b>Kleiner</b> Patient</h1>");
            }
            other => panic!("expected narrative, got {other:?}"),
        }
    }

    #[test]
    fn narrative_markup_must_stay_inside_its_div() {
        check_narrative("<h1><b>Kleiner</b> Patient</h1>").expect("fragment");
        check_narrative("Nur Text").expect("text only");

        for markup in [
            r#"x</div></text><deceasedBoolean value="true"/><text><div xmlns="http://www.w3.org/1999/xhtml">y"#,
            "<h1>offen",
            r#"a</div><div xmlns="http://www.w3.org/1999/xhtml">b"#,
        ] {
            assert!(check_narrative(markup).is_err(), "{markup}");
        }
    }

    #[test]
    fn malformed_xml_is_rejected() {
        let err = parse_document("<Bundle><entry></Bundle>", &options()).expect_err("malformed");
        assert!(matches!(err, crate::FhirError::InvalidXml(_)));
    }
}
