use quick_xml::events::{BytesStart, Event};
use quick_xml::Reader;
use tracing::trace;

use crate::{XmlContent, XmlError, XmlNode};

/// Parse an XML document (or a standalone fragment with a single root
/// element) into an [`XmlNode`] tree.
///
/// Character data is kept untrimmed, whitespace between elements included.
pub fn parse_str(xml: &str) -> Result<XmlNode, XmlError> {
    let mut reader = Reader::from_str(xml);
    let mut buf = Vec::new();
    let mut stack: Vec<XmlNode> = Vec::new();
    let mut root: Option<XmlNode> = None;

    loop {
        match reader.read_event_into(&mut buf) {
            Ok(Event::Start(e)) => {
                stack.push(start_node(&e)?);
            }
            Ok(Event::Empty(e)) => {
                let node = start_node(&e)?;
                close_node(node, &mut stack, &mut root)?;
            }
            Ok(Event::End(e)) => {
                let node = stack.pop().ok_or_else(|| {
                    XmlError::Invalid(format!(
                        "unexpected end tag </{}>",
                        String::from_utf8_lossy(e.name().as_ref())
                    ))
                })?;
                close_node(node, &mut stack, &mut root)?;
            }
            Ok(Event::Text(e)) => {
                let text = e.unescape().map_err(|err| XmlError::Xml(err.to_string()))?;
                append_text(&mut stack, &text);
            }
            Ok(Event::CData(e)) => {
                let text = String::from_utf8_lossy(&e.into_inner()).into_owned();
                push_content(&mut stack, XmlContent::CData(text));
            }
            Ok(Event::Comment(e)) => {
                let text = String::from_utf8_lossy(&e.into_inner()).into_owned();
                push_content(&mut stack, XmlContent::Comment(text));
            }
            Ok(Event::Eof) => break,
            Err(err) => return Err(XmlError::Xml(err.to_string())),
            _ => {}
        }
        buf.clear();
    }

    if let Some(open) = stack.last() {
        return Err(XmlError::Invalid(format!("unclosed element <{}>", open.name)));
    }
    root.ok_or_else(|| XmlError::Invalid("document has no root element".into()))
}

fn start_node(event: &BytesStart<'_>) -> Result<XmlNode, XmlError> {
    let mut node = XmlNode::new(String::from_utf8_lossy(event.name().as_ref()).into_owned());
    for attr in event.attributes() {
        let attr = attr.map_err(|err| XmlError::Xml(err.to_string()))?;
        let key = String::from_utf8_lossy(attr.key.as_ref()).into_owned();
        let value = attr
            .unescape_value()
            .map_err(|err| XmlError::Xml(err.to_string()))?
            .into_owned();
        node.attributes.push((key, value));
    }
    Ok(node)
}

fn close_node(
    node: XmlNode,
    stack: &mut [XmlNode],
    root: &mut Option<XmlNode>,
) -> Result<(), XmlError> {
    match stack.last_mut() {
        Some(parent) => {
            parent.content.push(XmlContent::Element(node));
            Ok(())
        }
        None if root.is_some() => Err(XmlError::Invalid(format!(
            "multiple root elements (second is <{}>)",
            node.name
        ))),
        None => {
            *root = Some(node);
            Ok(())
        }
    }
}

fn append_text(stack: &mut [XmlNode], text: &str) {
    if let Some(XmlContent::Text(existing)) =
        stack.last_mut().and_then(|node| node.content.last_mut())
    {
        existing.push_str(text);
        return;
    }
    push_content(stack, XmlContent::Text(text.to_string()));
}

fn push_content(stack: &mut [XmlNode], item: XmlContent) {
    let Some(current) = stack.last_mut() else {
        trace!("ignoring content outside the root element");
        return;
    };
    current.content.push(item);
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::TagMatching;

    const FIXTURE: &str = r#"<?xml version="1.0" encoding="UTF-8"?>
        <!-- a data table -->
        <dataTable id="table1" system="knb">
            <entityName>Counts &amp; totals</entityName>
            <attributeList id="list1">
                <attribute>
                    <attributeName>site</attributeName>
                    <measurementScale><nominal/></measurementScale>
                </attribute>
            </attributeList>
            <additionalInfo><![CDATA[raw <text>]]></additionalInfo>
        </dataTable>
    "#;

    #[test]
    fn parse_nested_document() {
        let root = parse_str(FIXTURE).expect("parse fixture");
        assert_eq!(root.name, "dataTable");
        assert_eq!(
            root.attributes,
            vec![
                ("id".to_string(), "table1".to_string()),
                ("system".to_string(), "knb".to_string())
            ]
        );
        let children: Vec<&XmlNode> = root.elements().collect();
        assert_eq!(children.len(), 3);
        assert_eq!(children[0].text(), "Counts & totals");
        let scale = root
            .find(&|node| node.is_named("measurementScale", TagMatching::Exact))
            .expect("scale");
        assert_eq!(scale.content.len(), 1);
        let nominal = scale.element_at(0).expect("nominal");
        assert_eq!(nominal.name, "nominal");
        assert!(nominal.content.is_empty());
        assert_eq!(children[2].text(), "raw <text>");
        assert!(matches!(children[2].content[0], XmlContent::CData(_)));
    }

    #[test]
    fn mixed_content_and_comments_keep_their_places() {
        let para =
            parse_str("<para>Counted <emphasis>fish</emphasis> per site<!-- tally --></para>")
                .expect("parse");
        assert_eq!(para.content.len(), 4);
        assert_eq!(para.content[0], XmlContent::Text("Counted ".into()));
        assert_eq!(
            para.content[1].as_element().map(|node| node.text().into_owned()),
            Some("fish".to_string())
        );
        assert_eq!(para.content[2], XmlContent::Text(" per site".into()));
        assert_eq!(para.content[3], XmlContent::Comment(" tally ".into()));
    }

    #[test]
    fn reject_mismatched_and_unclosed() {
        assert!(parse_str("<a><b></a>").is_err());
        assert!(parse_str("<a><b>").is_err());
        let err = parse_str("<a/><b/>").unwrap_err();
        assert!(matches!(err, XmlError::Invalid(_)));
        let err = parse_str("   ").unwrap_err();
        assert!(matches!(err, XmlError::Invalid(_)));
    }
}
