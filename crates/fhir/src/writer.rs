//! [`XmlElement`] tree → XML text, plus canonical pretty formatting.
//!
//! Output is produced in three stages:
//! 1. [`to_compact_string`] serializes the tree without insignificant whitespace, suppressing
//!    elements that carry neither attributes nor content.
//! 2. [`restore_boolean_values`] repairs boolean attributes that were emitted without a value.
//! 3. [`format_document`] re-parses the text and pretty-prints it with two-space indentation.
//!    Elements whose content includes text are kept on one line.

use crate::tree::{XmlElement, XmlValue, ATTRIBUTE_PREFIX, TEXT_KEY};
use crate::FhirResult;
use quick_xml::escape::partial_escape;
use quick_xml::events::{BytesEnd, BytesStart, BytesText, Event};
use quick_xml::Writer;
use roxmltree::{Document, Node};
use std::io::{Cursor, Write};

/// Serializes, repairs and formats a document tree in one call.
pub fn render_document(root: &XmlElement) -> FhirResult<String> {
    let compact = to_compact_string(root)?;
    format_document(&restore_boolean_values(&compact))
}

/// Serializes `root` (a wrapper whose entries are top-level elements) without indentation.
pub fn to_compact_string(root: &XmlElement) -> FhirResult<String> {
    let mut writer = Writer::new(Cursor::new(Vec::new()));
    for (name, value) in root.entries() {
        write_value(&mut writer, name, value)?;
    }
    Ok(String::from_utf8(writer.into_inner().into_inner())?)
}

/// Replaces `<valueBoolean value/>` with `<valueBoolean value="true"/>`.
///
/// Some serializers collapse a `true` attribute value to a bare attribute name; the result is
/// not well-formed XML and would be rejected by [`format_document`].
pub fn restore_boolean_values(xml: &str) -> String {
    xml.replace("<valueBoolean value/>", r#"<valueBoolean value="true"/>"#)
}

/// Pretty-prints well-formed XML with two-space indentation.
pub fn format_document(xml: &str) -> FhirResult<String> {
    let doc = Document::parse(xml)?;
    let mut writer = Writer::new_with_indent(Cursor::new(Vec::new()), b' ', 2);
    write_pretty(&mut writer, &doc.root_element(), None)?;
    Ok(String::from_utf8(writer.into_inner().into_inner())?)
}

fn write_value<W: Write>(writer: &mut Writer<W>, name: &str, value: &XmlValue) -> FhirResult<()> {
    match value {
        XmlValue::Element(el) => write_element(writer, name, el),
        XmlValue::Repeated(items) => {
            for el in items {
                write_element(writer, name, el)?;
            }
            Ok(())
        }
        XmlValue::Narrative(narrative) => {
            let mut start = BytesStart::new(name);
            start.push_attribute(("xmlns", narrative.namespace.as_str()));
            if narrative.markup.is_empty() {
                writer.write_event(Event::Empty(start))?;
            } else {
                writer.write_event(Event::Start(start))?;
                writer.write_event(Event::Text(BytesText::from_escaped(
                    narrative.markup.as_str(),
                )))?;
                writer.write_event(Event::End(BytesEnd::new(name)))?;
            }
            Ok(())
        }
        XmlValue::Text(text) => {
            writer.write_event(Event::Start(BytesStart::new(name)))?;
            writer.write_event(Event::Text(BytesText::new(text)))?;
            writer.write_event(Event::End(BytesEnd::new(name)))?;
            Ok(())
        }
    }
}

fn write_element<W: Write>(writer: &mut Writer<W>, name: &str, el: &XmlElement) -> FhirResult<()> {
    if is_blank(el) {
        return Ok(());
    }

    let mut start = BytesStart::new(name);
    let mut has_content = false;
    for (key, value) in el.entries() {
        match (key.strip_prefix(ATTRIBUTE_PREFIX), value) {
            (Some(attr), XmlValue::Text(text)) => start.push_attribute((attr, text.as_str())),
            _ => has_content |= !value_is_blank(value),
        }
    }

    if !has_content {
        writer.write_event(Event::Empty(start))?;
        return Ok(());
    }

    writer.write_event(Event::Start(start))?;
    for (key, value) in el.entries() {
        if key.starts_with(ATTRIBUTE_PREFIX) {
            continue;
        }
        match value {
            XmlValue::Text(text) if key == TEXT_KEY => {
                writer.write_event(Event::Text(BytesText::new(text)))?;
            }
            _ => write_value(writer, key, value)?,
        }
    }
    writer.write_event(Event::End(BytesEnd::new(name)))?;
    Ok(())
}

/// True if the element has no attributes and no non-blank content.
fn is_blank(el: &XmlElement) -> bool {
    el.entries().all(|(key, value)| {
        if key.starts_with(ATTRIBUTE_PREFIX) {
            false
        } else {
            value_is_blank(value)
        }
    })
}

fn value_is_blank(value: &XmlValue) -> bool {
    match value {
        XmlValue::Element(el) => is_blank(el),
        XmlValue::Repeated(items) => items.iter().all(is_blank),
        XmlValue::Narrative(_) => false,
        XmlValue::Text(text) => text.is_empty(),
    }
}

fn is_significant_text(node: &Node) -> bool {
    node.is_text() && node.text().is_some_and(|t| !t.trim().is_empty())
}

fn start_tag<'a>(node: &'a Node, parent_ns: Option<&str>) -> BytesStart<'a> {
    let mut start = BytesStart::new(node.tag_name().name());
    if let Some(ns) = node.tag_name().namespace().filter(|ns| Some(*ns) != parent_ns) {
        start.push_attribute(("xmlns", ns));
    }
    for attr in node.attributes() {
        start.push_attribute((attr.name(), attr.value()));
    }
    start
}

fn write_pretty<W: Write>(
    writer: &mut Writer<W>,
    node: &Node,
    parent_ns: Option<&str>,
) -> FhirResult<()> {
    let name = node.tag_name().name();
    let ns = node.tag_name().namespace();
    let start = start_tag(node, parent_ns);

    let mut children = node
        .children()
        .filter(|c| c.is_element() || is_significant_text(c))
        .peekable();
    if children.peek().is_none() {
        writer.write_event(Event::Empty(start))?;
        return Ok(());
    }

    writer.write_event(Event::Start(start))?;
    if node.children().any(|c| is_significant_text(&c)) {
        let mut inline = String::new();
        for child in node.children() {
            write_inline(&child, &mut inline)?;
        }
        writer.write_event(Event::Text(BytesText::from_escaped(inline)))?;
    } else {
        for child in children {
            write_pretty(writer, &child, ns)?;
        }
    }
    writer.write_event(Event::End(BytesEnd::new(name)))?;
    Ok(())
}

/// Appends `node` to `out` as compact markup, dropping whitespace-only text.
pub(crate) fn write_inline(node: &Node, out: &mut String) -> FhirResult<()> {
    let mut writer = Writer::new(Cursor::new(Vec::new()));
    write_inline_node(&mut writer, node)?;
    out.push_str(&String::from_utf8(writer.into_inner().into_inner())?);
    Ok(())
}

fn write_inline_node<W: Write>(writer: &mut Writer<W>, node: &Node) -> FhirResult<()> {
    if is_significant_text(node) {
        if let Some(text) = node.text() {
            writer.write_event(Event::Text(BytesText::from_escaped(partial_escape(text))))?;
        }
        return Ok(());
    }
    if !node.is_element() {
        return Ok(());
    }

    let name = node.tag_name().name();
    let mut start = BytesStart::new(name);
    for attr in node.attributes() {
        start.push_attribute((attr.name(), attr.value()));
    }

    if !node
        .children()
        .any(|c| c.is_element() || is_significant_text(&c))
    {
        writer.write_event(Event::Empty(start))?;
        return Ok(());
    }

    writer.write_event(Event::Start(start))?;
    for child in node.children() {
        write_inline_node(writer, &child)?;
    }
    writer.write_event(Event::End(BytesEnd::new(name)))?;
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::tree::Narrative;
    use crate::XHTML_NS;

    fn leaf(value: &str) -> XmlElement {
        let mut el = XmlElement::new();
        el.set_attribute("value", value);
        el
    }

    fn patient_tree() -> XmlElement {
        let mut text = XmlElement::new();
        text.push_child("status", leaf("extensions"), false);
        text.insert(
            "div",
            XmlValue::Narrative(Narrative {
                namespace: XHTML_NS.to_owned(),
                markup: "<h1>Patient</h1>".to_owned(),
            }),
        );

        let mut patient = XmlElement::new();
        patient.push_child("id", leaf("e029b2b8-5dc6-4feb-990a-7471fb9b54e3"), false);
        patient.push_child("text", text, false);
        patient.push_child("gender", leaf("female"), false);
        patient.push_child("address", XmlElement::new(), false);

        let mut root = XmlElement::new();
        root.push_child("Patient", patient, false);
        root
    }

    #[test]
    fn compact_output_suppresses_empty_elements() {
        let xml = to_compact_string(&patient_tree()).expect("serialize");
        assert!(xml.contains(r#"<gender value="female"/>"#));
        assert!(!xml.contains("address"));
        assert!(xml.contains(r#"<div xmlns="http://www.w3.org/1999/xhtml"><h1>Patient</h1></div>"#));
    }

    #[test]
    fn rendered_output_is_indented() {
        let xml = render_document(&patient_tree()).expect("render");
        let expected = r#"<Patient>
  <id value="e029b2b8-5dc6-4feb-990a-7471fb9b54e3"/>
  <text>
    <status value="extensions"/>
    <div xmlns="http://www.w3.org/1999/xhtml">
      <h1>Patient</h1>
    </div>
  </text>
  <gender value="female"/>
</Patient>"#;
        assert_eq!(xml.trim_end(), expected);
    }

    #[test]
    fn mixed_content_stays_inline() {
        let xml = format_document("<p><b>Kleiner</b> Patient<br/></p>").expect("format");
        assert_eq!(xml.trim_end(), "<p><b>Kleiner</b> Patient<br/></p>");
    }

    #[test]
    fn attribute_values_are_escaped() {
        let mut root = XmlElement::new();
        root.push_child("display", leaf("Blood & \"pressure\""), false);
        let xml = render_document(&root).expect("render");
        assert_eq!(
            xml.trim_end(),
            r#"<display value="Blood &amp; &quot;pressure&quot;"/>"#
        );
    }

    #[test]
    fn valueless_boolean_attribute_is_restored() {
        let repaired = restore_boolean_values("<extension><valueBoolean value/></extension>");
        assert_eq!(
            repaired,
            r#"<extension><valueBoolean value="true"/></extension>"#
        );
        assert!(format_document(&repaired).is_ok());
    }
}
