use eml_dom::{TagMatching, XmlNode};
use tracing::{debug, trace};

use crate::config::SyncConfig;
use crate::schema::{FieldKind, FieldRule, SchemaRule};
use crate::value::{FieldMap, FieldValue};

/// Read the fields `schema` describes out of `node`.
///
/// A missing node is not an error: the result is an empty map and callers
/// fall back to defaults. Absent elements and attributes leave their field
/// out of the map.
pub fn parse(node: Option<&XmlNode>, schema: &SchemaRule, config: &SyncConfig) -> FieldMap {
    let Some(node) = node else {
        debug!(entity = schema.tag(), "no source subtree, fields left at defaults");
        return FieldMap::new();
    };
    let mut fields = FieldMap::new();
    for rule in schema.fields {
        if let Some(value) = read_field(node, schema, rule, config) {
            trace!(entity = schema.tag(), field = rule.name, "field read");
            fields.insert(rule.name, value);
        }
    }
    fields
}

fn read_field(
    node: &XmlNode,
    schema: &SchemaRule,
    rule: &FieldRule,
    config: &SyncConfig,
) -> Option<FieldValue> {
    let mode = config.tag_matching;
    match rule.kind {
        FieldKind::Text | FieldKind::Reference(_) => node.child(rule.tag, mode).map(element_text),
        FieldKind::TextList => {
            let items: Vec<FieldValue> = node
                .children_named(rule.tag, mode)
                .map(element_text)
                .collect();
            (!items.is_empty()).then_some(FieldValue::List(items))
        }
        FieldKind::Attribute => node.attribute(rule.tag, mode).map(FieldValue::from),
        FieldKind::ChildAttribute { child } => node
            .child(child, mode)
            .and_then(|child| child.attribute(rule.tag, mode))
            .map(FieldValue::from),
        FieldKind::OwnText => {
            let text = node.text();
            let text = text.trim();
            (!text.is_empty()).then(|| FieldValue::from(text))
        }
        FieldKind::ElementName => Some(FieldValue::from(element_name(node, schema, mode))),
        FieldKind::Nested(inner) => node
            .child(rule.tag, mode)
            .map(|child| FieldValue::Map(parse(Some(child), inner, config))),
        FieldKind::NestedList(inner) => {
            let items: Vec<FieldValue> = node
                .children_named(rule.tag, mode)
                .map(|child| FieldValue::Map(parse(Some(child), inner, config)))
                .collect();
            (!items.is_empty()).then_some(FieldValue::List(items))
        }
    }
}

fn element_text(node: &XmlNode) -> FieldValue {
    FieldValue::from(node.text().trim())
}

fn element_name<'a>(node: &'a XmlNode, schema: &SchemaRule, mode: TagMatching) -> &'a str {
    let local = node.local_name();
    match mode {
        TagMatching::CaseInsensitive => schema.known_tag(local).unwrap_or(local),
        TagMatching::Exact => local,
    }
}
