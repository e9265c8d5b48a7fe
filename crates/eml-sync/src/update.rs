//! Write field values back into a copy of an entity's source subtree.
//!
//! Only nodes bound to schema fields are touched. Existing nodes are
//! edited where they stand, and nodes whose value did not change keep their
//! whitespace. New nodes go after the closest earlier node in the schema's
//! canonical order. Everything the schema does not model keeps its position
//! and spelling.

use eml_dom::{TagMatching, XmlContent, XmlNode};
use tracing::{debug, trace};

use crate::binding;
use crate::config::SyncConfig;
use crate::schema::{FieldKind, FieldRule, SchemaRule};
use crate::value::{FieldMap, FieldValue};
use crate::SyncError;

/// Result of writing an entity back.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Serialized {
    /// The updated subtree, ready to splice into the owning document.
    Node(XmlNode),
    /// The entity has no content and should be left out of its parent.
    Omit,
}

impl Serialized {
    pub fn node(&self) -> Option<&XmlNode> {
        match self {
            Serialized::Node(node) => Some(node),
            Serialized::Omit => None,
        }
    }

    pub fn into_node(self) -> Option<XmlNode> {
        match self {
            Serialized::Node(node) => Some(node),
            Serialized::Omit => None,
        }
    }
}

/// Produce the subtree for `fields`, starting from a deep copy of `base`
/// when the entity was parsed from one.
///
/// `base` itself is never modified. On error nothing is returned, so a
/// failed write-back leaves the cached source as it was.
pub fn update_fields(
    schema: &SchemaRule,
    fields: &FieldMap,
    base: Option<&XmlNode>,
    config: &SyncConfig,
    entity: &str,
) -> Result<Serialized, SyncError> {
    let mut node = build(schema, fields, base, config, entity)?;
    if config.canonicalizes() {
        canonicalize(&mut node, schema);
    }
    if schema.omit_when_empty && is_hollow(&node) {
        debug!(entity, "entity has no content, omitting");
        return Ok(Serialized::Omit);
    }
    Ok(Serialized::Node(node))
}

/// True when some field other than the id, the element name or a value
/// equal to its default has content.
pub(crate) fn has_content(schema: &SchemaRule, fields: &FieldMap) -> bool {
    schema.fields.iter().any(|rule| {
        if is_identity(rule) || matches!(rule.kind, FieldKind::ElementName) {
            return false;
        }
        match fields.get(rule.name) {
            None => false,
            Some(FieldValue::Text(text)) => {
                let text = text.trim();
                !text.is_empty() && rule.default != Some(text)
            }
            Some(value) => !value.is_empty(),
        }
    })
}

fn build(
    schema: &SchemaRule,
    fields: &FieldMap,
    base: Option<&XmlNode>,
    config: &SyncConfig,
    entity: &str,
) -> Result<XmlNode, SyncError> {
    let mode = config.tag_matching;
    let mut node = match base {
        Some(source) => {
            if schema.accepts_root(source.local_name(), mode).is_none() {
                return Err(failure(
                    entity,
                    format!(
                        "cached source is <{}>, expected one of {:?}",
                        source.name, schema.root_tags
                    ),
                ));
            }
            source.clone()
        }
        None => XmlNode::new(new_root_name(schema, fields, mode)),
    };
    for rule in schema.fields {
        apply_field(&mut node, schema, rule, fields.get(rule.name), config, entity)?;
    }
    Ok(node)
}

fn new_root_name(schema: &SchemaRule, fields: &FieldMap, mode: TagMatching) -> &'static str {
    schema
        .fields
        .iter()
        .filter(|rule| matches!(rule.kind, FieldKind::ElementName))
        .filter_map(|rule| fields.text(rule.name))
        .find_map(|name| schema.accepts_root(name.trim(), mode))
        .unwrap_or_else(|| schema.tag())
}

fn apply_field(
    node: &mut XmlNode,
    schema: &SchemaRule,
    rule: &FieldRule,
    value: Option<&FieldValue>,
    config: &SyncConfig,
    entity: &str,
) -> Result<(), SyncError> {
    let mode = config.tag_matching;
    match rule.kind {
        FieldKind::ElementName => {
            let Some(name) = text_value(value, rule, entity)?.filter(|name| !name.is_empty())
            else {
                return Ok(());
            };
            let Some(root) = schema.accepts_root(name, mode) else {
                return Err(failure(
                    entity,
                    format!("`{name}` is not one of {:?}", schema.root_tags),
                ));
            };
            if node.name != root {
                debug!(entity, from = %node.name, to = root, "renaming root element");
                node.name = root.to_string();
            }
        }
        FieldKind::Attribute => {
            let text = text_value(value, rule, entity)?;
            set_attribute(node, rule, text, mode);
        }
        FieldKind::ChildAttribute { child } => {
            let text = text_value(value, rule, entity)?.filter(|text| !text.is_empty());
            match (node.child_mut(child, mode), text) {
                (Some(target), text) => set_attribute(target, rule, text, mode),
                (None, Some(_)) => {
                    return Err(failure(
                        entity,
                        format!("field `{}` needs a <{child}> element to hold it", rule.name),
                    ));
                }
                (None, None) => {}
            }
        }
        FieldKind::OwnText => {
            let text = text_value(value, rule, entity)?.filter(|text| !text.is_empty());
            if node.text().trim() != text.map(str::trim).unwrap_or("") {
                node.set_text(text.map(str::to_string));
            }
        }
        FieldKind::Text | FieldKind::Reference(_) => {
            let text = text_value(value, rule, entity)?.unwrap_or("");
            apply_text(node, schema, rule, text, mode);
        }
        FieldKind::TextList => {
            let mut texts = Vec::new();
            for item in list_items(value, rule, entity)? {
                match item {
                    FieldValue::Text(text) if text.trim().is_empty() => {}
                    FieldValue::Text(text) => texts.push(text.trim()),
                    other => return Err(shape_error(entity, rule, other)),
                }
            }
            let current: Vec<String> = node
                .children_named(rule.tag, mode)
                .map(|item| item.text().trim().to_string())
                .collect();
            if current.iter().map(String::as_str).eq(texts.iter().copied()) {
                return Ok(());
            }
            let items = texts
                .into_iter()
                .map(|text| XmlNode::with_text(rule.tag, text))
                .collect();
            replace_all(node, schema, rule.tag, items, mode);
        }
        FieldKind::Nested(inner) => {
            let map = match value {
                None => None,
                Some(FieldValue::Map(map)) => Some(map),
                Some(other) if other.is_empty() => None,
                Some(other) => return Err(shape_error(entity, rule, other)),
            };
            apply_nested(node, schema, rule, inner, map, config, entity)?;
        }
        FieldKind::NestedList(inner) => {
            let values = list_items(value, rule, entity)?;
            if nested_items_match(node, rule, inner, values, config) {
                return Ok(());
            }
            let mut items = Vec::new();
            for item in values {
                match item {
                    FieldValue::Map(map) => {
                        let child = build(inner, map, None, config, entity)?;
                        if !child.is_blank() {
                            items.push(child);
                        }
                    }
                    other if other.is_empty() => {}
                    other => return Err(shape_error(entity, rule, other)),
                }
            }
            replace_all(node, schema, rule.tag, items, mode);
        }
    }
    Ok(())
}

fn apply_text(
    node: &mut XmlNode,
    schema: &SchemaRule,
    rule: &FieldRule,
    text: &str,
    mode: TagMatching,
) {
    if text.trim().is_empty() {
        let removed = node.remove_children(rule.tag, mode);
        if removed > 0 {
            debug!(field = rule.name, removed, "removed emptied field node");
        }
        return;
    }
    if let Some(existing) = node.child_mut(rule.tag, mode) {
        if existing.text().trim() != text.trim() {
            existing.set_text(Some(text.to_string()));
        }
        return;
    }
    if rule.default == Some(text.trim()) {
        trace!(field = rule.name, "default value not written");
        return;
    }
    let index = insertion_index(node, schema, rule.tag, mode);
    debug!(field = rule.name, index, "inserting field node");
    node.insert_child(index, XmlNode::with_text(rule.tag, text));
}

fn apply_nested(
    node: &mut XmlNode,
    schema: &SchemaRule,
    rule: &FieldRule,
    inner: &SchemaRule,
    map: Option<&FieldMap>,
    config: &SyncConfig,
    entity: &str,
) -> Result<(), SyncError> {
    let mode = config.tag_matching;
    let existing = node.child_position(rule.tag, mode);
    let built = match map {
        Some(map) => {
            let base = existing.and_then(|index| node.element_at(index));
            Some(build(inner, map, base, config, entity)?)
        }
        None => None,
    };
    match (built.filter(|child| !child.is_blank()), existing) {
        (Some(child), Some(index)) => node.replace_at(index, child),
        (Some(child), None) => {
            let index = insertion_index(node, schema, rule.tag, mode);
            debug!(field = rule.name, index, "inserting nested node");
            node.insert_child(index, child);
        }
        (None, Some(index)) => {
            debug!(field = rule.name, "removed emptied nested node");
            node.remove_at(index);
        }
        (None, None) => {}
    }
    Ok(())
}

/// Remove every `tag` child and put `items` in their place: where the first
/// old node was, or at the schema position when there was none.
fn replace_all(
    node: &mut XmlNode,
    schema: &SchemaRule,
    tag: &str,
    items: Vec<XmlNode>,
    mode: TagMatching,
) {
    let anchor = node.child_position(tag, mode);
    let removed = node.remove_children(tag, mode);
    if items.is_empty() {
        if removed > 0 {
            debug!(tag, removed, "removed emptied list nodes");
        }
        return;
    }
    let start = anchor.unwrap_or_else(|| insertion_index(node, schema, tag, mode));
    trace!(tag, removed, added = items.len(), start, "rebuilt list nodes");
    for (offset, item) in items.into_iter().enumerate() {
        node.insert_child(start + offset, item);
    }
}

/// Position for a new `tag` child: after the last node of the nearest
/// earlier tag in canonical order, else before the first node of any later
/// tag, else at the end.
fn insertion_index(node: &XmlNode, schema: &SchemaRule, tag: &str, mode: TagMatching) -> usize {
    let Some(position) = schema.order.iter().position(|known| mode.matches(known, tag)) else {
        return node.content.len();
    };
    if let Some(index) = schema.order[..position]
        .iter()
        .rev()
        .find_map(|earlier| node.last_child_position(earlier, mode))
    {
        return index + 1;
    }
    schema.order[position + 1..]
        .iter()
        .filter_map(|later| node.child_position(later, mode))
        .min()
        .unwrap_or(node.content.len())
}

fn set_attribute(node: &mut XmlNode, rule: &FieldRule, text: Option<&str>, mode: TagMatching) {
    match text.filter(|text| !text.is_empty()) {
        Some(text) => {
            if node.attribute(rule.tag, mode).is_none() && rule.default == Some(text) {
                return;
            }
            node.set_attribute(rule.tag, text, mode);
        }
        None => {
            node.remove_attribute(rule.tag, mode);
        }
    }
}

fn text_value<'a>(
    value: Option<&'a FieldValue>,
    rule: &FieldRule,
    entity: &str,
) -> Result<Option<&'a str>, SyncError> {
    match value {
        None => Ok(None),
        Some(FieldValue::Text(text)) => Ok(Some(text.as_str())),
        Some(other) if other.is_empty() => Ok(None),
        Some(other) => Err(shape_error(entity, rule, other)),
    }
}

fn list_items<'a>(
    value: Option<&'a FieldValue>,
    rule: &FieldRule,
    entity: &str,
) -> Result<&'a [FieldValue], SyncError> {
    match value {
        None => Ok(&[]),
        Some(FieldValue::List(items)) => Ok(items),
        Some(other) if other.is_empty() => Ok(&[]),
        Some(other) => Err(shape_error(entity, rule, other)),
    }
}

fn is_identity(rule: &FieldRule) -> bool {
    matches!(rule.kind, FieldKind::Attribute) && rule.tag == "id"
}

/// True when the existing `tag` children already hold exactly `values`.
fn nested_items_match(
    node: &XmlNode,
    rule: &FieldRule,
    inner: &SchemaRule,
    values: &[FieldValue],
    config: &SyncConfig,
) -> bool {
    let mut current = node.children_named(rule.tag, config.tag_matching);
    let mut wanted = values.iter().filter(|value| !value.is_empty());
    loop {
        match (current.next(), wanted.next()) {
            (None, None) => return true,
            (Some(child), Some(FieldValue::Map(map))) => {
                if binding::parse(Some(child), inner, config) != *map {
                    return false;
                }
            }
            _ => return false,
        }
    }
}

fn is_hollow(node: &XmlNode) -> bool {
    node.content.iter().all(XmlContent::is_whitespace)
        && node.attributes.iter().all(|(key, _)| key == "id")
}

/// Restore the canonical spelling of the root and of the children bound to
/// fields. Other elements keep the name they were read with.
fn canonicalize(node: &mut XmlNode, schema: &SchemaRule) {
    if let Some(tag) = schema
        .root_tags
        .iter()
        .chain(schema.aliases)
        .find(|tag| tag.eq_ignore_ascii_case(&node.name))
    {
        node.name = tag.to_string();
    }
    canonicalize_fields(node, schema);
}

fn canonicalize_fields(node: &mut XmlNode, schema: &SchemaRule) {
    for element in node.elements_mut() {
        if element.name.contains(':') {
            continue;
        }
        let bound = schema.fields.iter().find_map(|rule| {
            let tag = match rule.kind {
                FieldKind::ChildAttribute { child } => child,
                kind if kind.is_element() => rule.tag,
                _ => return None,
            };
            tag.eq_ignore_ascii_case(&element.name).then_some((tag, rule.kind))
        });
        let Some((tag, kind)) = bound else {
            continue;
        };
        element.name = tag.to_string();
        if let FieldKind::Nested(inner) | FieldKind::NestedList(inner) = kind {
            canonicalize_fields(element, inner);
        }
    }
}

fn shape_error(entity: &str, rule: &FieldRule, value: &FieldValue) -> SyncError {
    failure(
        entity,
        format!(
            "field `{}` holds {} where {} is expected",
            rule.name,
            value.shape(),
            rule.kind.expects()
        ),
    )
}

fn failure(entity: &str, reason: String) -> SyncError {
    SyncError::Serialization {
        entity: entity.to_string(),
        reason,
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::binding::parse;
    use crate::schema::EntityType;
    use eml_dom::{parse_str, to_string};

    fn round_trip(ty: EntityType, xml: &str, edit: impl FnOnce(&mut FieldMap)) -> Serialized {
        let config = SyncConfig::default();
        let source = parse_str(xml).expect("fixture");
        let mut fields = parse(Some(&source), ty.schema(), &config);
        edit(&mut fields);
        update_fields(ty.schema(), &fields, Some(&source), &config, ty.name()).expect("update")
    }

    fn xml_of(serialized: Serialized) -> String {
        let node = serialized.into_node().expect("node expected");
        to_string(&node).expect("write")
    }

    #[test]
    fn untouched_round_trip_is_identical() {
        let xml = "<attribute id=\"a1\" system=\"knb\"><attributeName>site</attributeName>\
            <attributeDefinition>Sampling site</attributeDefinition>\
            <measurementScale><nominal/></measurementScale>\
            <missingValueCode><code>-999</code><codeExplanation>not sampled</codeExplanation></missingValueCode>\
            <annotation><propertyURI>x</propertyURI></annotation></attribute>";
        let out = round_trip(EntityType::Attribute, xml, |_| {});
        assert_eq!(xml_of(out), xml);
    }

    #[test]
    fn emptied_field_removes_its_node() {
        let out = round_trip(
            EntityType::Distribution,
            "<distribution><online><url>http://a</url></online></distribution>",
            |fields| {
                fields.set_path("online.url", "".into()).expect("clear url");
            },
        );
        assert_eq!(xml_of(out), "<distribution/>");
    }

    #[test]
    fn new_nodes_follow_schema_order() {
        let xml = "<attribute><attributeName>site</attributeName>\
            <measurementScale><nominal/></measurementScale><annotation/></attribute>";
        let out = round_trip(EntityType::Attribute, xml, |fields| {
            fields.insert("storageType", vec!["string"]);
            fields.insert("attributeDefinition", "Sampling site");
            fields.insert("attributeLabel", vec!["Site"]);
        });
        assert_eq!(
            xml_of(out),
            "<attribute><attributeName>site</attributeName><attributeLabel>Site</attributeLabel>\
             <attributeDefinition>Sampling site</attributeDefinition>\
             <storageType>string</storageType>\
             <measurementScale><nominal/></measurementScale><annotation/></attribute>"
        );
    }

    #[test]
    fn first_field_goes_before_later_nodes() {
        let out = round_trip(
            EntityType::DataTable,
            "<dataTable><physical/><attributeList/></dataTable>",
            |fields| {
                fields.insert("entityName", "counts.csv");
                fields.insert("numberOfRecords", "12");
            },
        );
        assert_eq!(
            xml_of(out),
            "<dataTable><entityName>counts.csv</entityName><physical/><attributeList/>\
             <numberOfRecords>12</numberOfRecords></dataTable>"
        );
    }

    #[test]
    fn edits_stay_in_place() {
        let out = round_trip(
            EntityType::Attribute,
            "<attribute><custom/><attributeDefinition>old</attributeDefinition><attributeName>x</attributeName></attribute>",
            |fields| {
                fields.insert("attributeDefinition", "new");
            },
        );
        assert_eq!(
            xml_of(out),
            "<attribute><custom/><attributeDefinition>new</attributeDefinition><attributeName>x</attributeName></attribute>"
        );
    }

    #[test]
    fn defaults_are_not_added_but_existing_nodes_are_honored() {
        let out = round_trip(
            EntityType::Filter,
            "<filter><field>title</field><value>soil</value></filter>",
            |fields| {
                fields.insert("operator", "AND");
                fields.insert("exclude", "true");
            },
        );
        assert_eq!(
            xml_of(out),
            "<filter><field>title</field><exclude>true</exclude><value>soil</value></filter>"
        );

        let out = round_trip(
            EntityType::Filter,
            "<filter><field>title</field><operator>OR</operator></filter>",
            |fields| {
                fields.insert("operator", "AND");
            },
        );
        assert_eq!(
            xml_of(out),
            "<filter><field>title</field><operator>AND</operator></filter>"
        );
    }

    #[test]
    fn lists_are_rebuilt_in_place() {
        let out = round_trip(
            EntityType::Attribute,
            "<attribute><attributeName>x</attributeName><attributeLabel note=\"keep?\">a</attributeLabel>\
             <attributeLabel>b</attributeLabel><attributeDefinition>d</attributeDefinition></attribute>",
            |fields| {
                fields.insert("attributeLabel", vec!["c"]);
            },
        );
        assert_eq!(
            xml_of(out),
            "<attribute><attributeName>x</attributeName><attributeLabel>c</attributeLabel>\
             <attributeDefinition>d</attributeDefinition></attribute>"
        );
    }

    #[test]
    fn child_attributes_and_new_nested_nodes() {
        let config = SyncConfig::default();
        let schema = EntityType::Distribution.schema();
        let mut fields = FieldMap::new();
        fields
            .set_path("online.url", "https://example.org/data.csv".into())
            .expect("url");
        fields
            .set_path("online.urlFunction", "download".into())
            .expect("function");
        let out = update_fields(schema, &fields, None, &config, "distribution").expect("update");
        assert_eq!(
            xml_of(out),
            "<distribution><online><url function=\"download\">https://example.org/data.csv</url>\
             </online></distribution>"
        );
    }

    #[test]
    fn lower_cased_tags_are_canonicalized() {
        let out = round_trip(
            EntityType::DateTimeDomain,
            "<datetime><formatstring>YYYY</formatstring><unknownchild/></datetime>",
            |fields| {
                fields.insert("dateTimePrecision", "day");
            },
        );
        assert_eq!(
            xml_of(out),
            "<dateTime><formatString>YYYY</formatString>\
             <dateTimePrecision>day</dateTimePrecision><unknownchild/></dateTime>"
        );
    }

    #[test]
    fn empty_entities_are_omitted() {
        let config = SyncConfig::default();
        let schema = EntityType::PortalImage.schema();
        let fields = FieldMap::new().with("label", "");
        let out = update_fields(schema, &fields, None, &config, "portalImage").expect("update");
        assert_eq!(out, Serialized::Omit);
        assert!(!has_content(schema, &fields));

        let list = parse_str("<attributeList id=\"l1\"/>").expect("fixture");
        let out = update_fields(
            EntityType::AttributeList.schema(),
            &FieldMap::new().with("id", "l1"),
            Some(&list),
            &config,
            "attributeList",
        )
        .expect("update");
        assert_eq!(out, Serialized::Omit);
    }

    #[test]
    fn malformed_values_fail_without_touching_source() {
        let config = SyncConfig::default();
        let source = parse_str("<attribute><attributeName>x</attributeName></attribute>")
            .expect("fixture");
        let before = source.clone();
        let fields = FieldMap::new().with("attributeName", FieldMap::new().with("a", "b"));
        let err = update_fields(
            EntityType::Attribute.schema(),
            &fields,
            Some(&source),
            &config,
            "attribute",
        )
        .unwrap_err();
        assert!(matches!(err, SyncError::Serialization { .. }));
        assert_eq!(source, before);

        let wrong_root = parse_str("<dataTable/>").expect("fixture");
        let err = update_fields(
            EntityType::Attribute.schema(),
            &FieldMap::new(),
            Some(&wrong_root),
            &config,
            "attribute",
        )
        .unwrap_err();
        assert!(matches!(err, SyncError::Serialization { .. }));
    }

    #[test]
    fn canonicalization_leaves_unbound_elements_alone() {
        let out = round_trip(
            EntityType::Attribute,
            "<Attribute><attributename>x</attributename>\
             <Methods><CODE>lm(y ~ x)</CODE><attributeNAME>kept</attributeNAME></Methods></Attribute>",
            |fields| {
                fields.insert("attributeDefinition", "d");
            },
        );
        assert_eq!(
            xml_of(out),
            "<attribute><attributeName>x</attributeName><attributeDefinition>d</attributeDefinition>\
             <Methods><CODE>lm(y ~ x)</CODE><attributeNAME>kept</attributeNAME></Methods></attribute>"
        );
    }

    const PRETTY: &str = "<attribute id=\"a1\">\n  <attributeName>site</attributeName>\n  \
        <attributeLabel>Site</attributeLabel>\n  <attributeDefinition>\n    Sampling site\n  \
        </attributeDefinition>\n  <measurementScale>\n    <nominal/>\n  </measurementScale>\n  \
        <missingValueCode>\n    <code>-999</code>\n    <codeExplanation>not sampled</codeExplanation>\n  \
        </missingValueCode>\n</attribute>";

    #[test]
    fn indented_source_survives_an_untouched_write() {
        let out = round_trip(EntityType::Attribute, PRETTY, |_| {});
        assert_eq!(xml_of(out), PRETTY);
    }

    #[test]
    fn only_changed_values_lose_their_whitespace() {
        let out = round_trip(EntityType::Attribute, PRETTY, |fields| {
            fields.insert("attributeName", "station");
        });
        let xml = xml_of(out);
        assert!(xml.contains("<attributeName>station</attributeName>"));
        assert!(xml.contains("<attributeDefinition>\n    Sampling site\n  </attributeDefinition>"));
        assert!(xml.contains("<code>-999</code>\n    <codeExplanation>"));
    }

    #[test]
    fn mixed_content_passes_through_verbatim() {
        let methods = "<methods><methodStep><description><para>Counted <emphasis>fish</emphasis> \
            at dawn<!-- tally sheet 3 --></para></description></methodStep></methods>";
        let xml = format!("<attribute><attributeName>x</attributeName>{methods}</attribute>");
        let untouched = round_trip(EntityType::Attribute, &xml, |_| {});
        assert_eq!(xml_of(untouched), xml);

        let edited = round_trip(EntityType::Attribute, &xml, |fields| {
            fields.insert("attributeDefinition", "Fish count");
        });
        assert!(xml_of(edited).contains(methods));
    }

    #[test]
    fn child_attribute_without_its_element_is_an_error() {
        let config = SyncConfig::default();
        let schema = EntityType::Distribution.schema();
        let source = parse_str("<distribution><online><onlineDescription>mirror</onlineDescription>\
             </online></distribution>")
        .expect("fixture");
        let mut fields = parse(Some(&source), schema, &config);
        fields
            .set_path("online.urlFunction", "download".into())
            .expect("function");
        let err = update_fields(schema, &fields, Some(&source), &config, "distribution")
            .unwrap_err();
        assert!(matches!(
            err,
            SyncError::Serialization { ref reason, .. } if reason.contains("urlFunction")
        ));
    }
}
