use std::io::Write;

use quick_xml::events::{BytesCData, BytesEnd, BytesStart, BytesText, Event};
use quick_xml::Writer;

use crate::{XmlContent, XmlError, XmlNode};

/// Serialize a tree exactly as it is held, whitespace included.
pub fn to_string(node: &XmlNode) -> Result<String, XmlError> {
    let mut writer = Writer::new(Vec::new());
    write_node(&mut writer, node, false)?;
    into_string(writer.into_inner())
}

/// Serialize a tree indented by two spaces per level. Whitespace-only text
/// is replaced by the indentation; other text is written as held.
pub fn to_string_pretty(node: &XmlNode) -> Result<String, XmlError> {
    let mut writer = Writer::new_with_indent(Vec::new(), b' ', 2);
    write_node(&mut writer, node, true)?;
    into_string(writer.into_inner())
}

fn write_node<W: Write>(
    writer: &mut Writer<W>,
    node: &XmlNode,
    pretty: bool,
) -> Result<(), XmlError> {
    if node.name.is_empty() {
        return Err(XmlError::Invalid("element with an empty name".into()));
    }
    let mut start = BytesStart::new(node.name.as_str());
    for (key, value) in &node.attributes {
        start.push_attribute((key.as_str(), value.as_str()));
    }
    let written: Vec<&XmlContent> = node
        .content
        .iter()
        .filter(|item| !matches!(item, XmlContent::Text(text) if text.is_empty()))
        .filter(|item| !(pretty && item.is_whitespace()))
        .collect();
    if written.is_empty() {
        return writer.write_event(Event::Empty(start)).map_err(write_err);
    }
    writer.write_event(Event::Start(start)).map_err(write_err)?;
    for item in written {
        let event = match item {
            XmlContent::Element(child) => {
                write_node(writer, child, pretty)?;
                continue;
            }
            XmlContent::Text(text) => Event::Text(BytesText::new(text)),
            XmlContent::CData(text) => Event::CData(BytesCData::new(text.as_str())),
            XmlContent::Comment(text) => Event::Comment(BytesText::from_escaped(text.as_str())),
        };
        writer.write_event(event).map_err(write_err)?;
    }
    writer
        .write_event(Event::End(BytesEnd::new(node.name.as_str())))
        .map_err(write_err)
}

fn write_err(err: quick_xml::Error) -> XmlError {
    XmlError::Xml(err.to_string())
}

fn into_string(bytes: Vec<u8>) -> Result<String, XmlError> {
    String::from_utf8(bytes).map_err(|err| XmlError::Xml(format!("invalid UTF-8: {err}")))
}
