use eml_dom::XmlNode;

use crate::binding;
use crate::config::SyncConfig;
use crate::resolve::ReferenceLink;
use crate::schema::{EntityType, FieldKind, FieldRule, SchemaRule};
use crate::update::{self, Serialized};
use crate::validate::{self, ValidationErrors};
use crate::value::{FieldMap, FieldValue};
use crate::SyncError;

/// A typed entity: field values plus the subtree they were parsed from.
#[derive(Debug, Clone, PartialEq)]
pub struct Record {
    entity_type: EntityType,
    fields: FieldMap,
    source: Option<XmlNode>,
}

impl Record {
    /// A fresh entity with no source; write-back creates every node.
    pub fn new(entity_type: EntityType) -> Self {
        Record {
            entity_type,
            fields: FieldMap::new(),
            source: None,
        }
    }

    pub fn from_fields(entity_type: EntityType, fields: FieldMap) -> Self {
        Record {
            entity_type,
            fields,
            source: None,
        }
    }

    /// Bind `node` and keep a copy of it for update in place.
    pub fn parse(entity_type: EntityType, node: &XmlNode, config: &SyncConfig) -> Self {
        Record {
            entity_type,
            fields: binding::parse(Some(node), entity_type.schema(), config),
            source: Some(node.clone()),
        }
    }

    pub fn entity_type(&self) -> EntityType {
        self.entity_type
    }

    pub fn schema(&self) -> &'static SchemaRule {
        self.entity_type.schema()
    }

    pub fn fields(&self) -> &FieldMap {
        &self.fields
    }

    pub fn source(&self) -> Option<&XmlNode> {
        self.source.as_ref()
    }

    pub(crate) fn source_mut(&mut self) -> Option<&mut XmlNode> {
        self.source.as_mut()
    }

    /// Value at a dotted field path.
    pub fn get(&self, path: &str) -> Option<&FieldValue> {
        self.fields.get_path(path)
    }

    pub fn text(&self, path: &str) -> Option<&str> {
        self.get(path).and_then(FieldValue::as_text)
    }

    /// Assign a value at a dotted path whose first segment must be a field
    /// of this entity type. Returns whether anything changed.
    pub fn set(&mut self, path: &str, value: impl Into<FieldValue>) -> Result<bool, SyncError> {
        let value = value.into();
        let head = path.split('.').next().unwrap_or(path);
        let rule = self
            .schema()
            .field(head)
            .ok_or_else(|| SyncError::UnknownField {
                entity: self.entity_type.name().to_string(),
                field: head.to_string(),
            })?;
        if head == path && !accepts(rule, &value) {
            return Err(SyncError::FieldType {
                field: path.to_string(),
                expected: rule.kind.expects().to_string(),
            });
        }
        self.fields.set_path(path, value)
    }

    pub fn id(&self) -> Option<&str> {
        self.fields
            .text("id")
            .map(str::trim)
            .filter(|id| !id.is_empty())
    }

    /// True when no field beyond the id and element name has content.
    pub fn is_empty(&self) -> bool {
        !update::has_content(self.schema(), &self.fields)
    }

    /// Write the current field values back, starting from the cached source.
    pub fn update(&self, config: &SyncConfig) -> Result<Serialized, SyncError> {
        update::update_fields(
            self.schema(),
            &self.fields,
            self.source.as_ref(),
            config,
            self.entity_type.name(),
        )
    }

    /// Required-field and entity-rule checks on this record alone.
    pub fn validate(&self) -> ValidationErrors {
        if self.schema().omit_when_empty && self.is_empty() {
            return ValidationErrors::new();
        }
        validate::validate_fields(self.schema(), &self.fields)
    }

    /// Every non-empty reference field, keyed by its dotted path.
    pub fn links(&self) -> Vec<(String, ReferenceLink)> {
        let mut links = Vec::new();
        collect_links(self.schema(), &self.fields, "", &mut links);
        links
    }

    /// Replace the cached source, typically with the output of a save.
    /// `None` forgets it, as after a save that omitted the entity.
    pub fn rebase(&mut self, source: Option<XmlNode>) {
        self.source = source;
    }
}

fn accepts(rule: &FieldRule, value: &FieldValue) -> bool {
    match (rule.kind, value) {
        (_, FieldValue::Text(text)) if text.is_empty() => true,
        (FieldKind::TextList, FieldValue::List(items)) => {
            items.iter().all(|item| matches!(item, FieldValue::Text(_)))
        }
        (FieldKind::NestedList(_), FieldValue::List(items)) => {
            items.iter().all(|item| matches!(item, FieldValue::Map(_)))
        }
        (FieldKind::Nested(_), FieldValue::Map(_)) => true,
        (FieldKind::TextList | FieldKind::Nested(_) | FieldKind::NestedList(_), _) => false,
        (_, value) => matches!(value, FieldValue::Text(_)),
    }
}

fn collect_links(
    schema: &SchemaRule,
    fields: &FieldMap,
    prefix: &str,
    links: &mut Vec<(String, ReferenceLink)>,
) {
    for rule in schema.fields {
        match (rule.kind, fields.get(rule.name)) {
            (FieldKind::Reference(target), Some(FieldValue::Text(id))) if !id.trim().is_empty() => {
                links.push((
                    format!("{prefix}{}", rule.name),
                    ReferenceLink::new(id.trim(), target),
                ));
            }
            (FieldKind::Nested(inner), Some(FieldValue::Map(map))) => {
                collect_links(inner, map, &format!("{prefix}{}.", rule.name), links);
            }
            (FieldKind::NestedList(inner), Some(FieldValue::List(items))) => {
                for (index, item) in items.iter().enumerate() {
                    if let FieldValue::Map(map) = item {
                        collect_links(inner, map, &format!("{prefix}{}.{index}.", rule.name), links);
                    }
                }
            }
            _ => {}
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use eml_dom::parse_str;

    const ATTRIBUTE: &str = r#"<attribute id="att1">
        <attributeName>depth</attributeName>
        <attributeDefinition>Sample depth</attributeDefinition>
        <measurementScale><ratio/></measurementScale>
    </attribute>"#;

    #[test]
    fn set_checks_field_names_and_shapes() {
        let node = parse_str(ATTRIBUTE).expect("fixture");
        let mut record = Record::parse(EntityType::Attribute, &node, &SyncConfig::default());
        assert_eq!(record.id(), Some("att1"));
        assert!(record.set("attributeName", "depth_m").expect("rename"));
        assert!(!record.set("attributeName", "depth_m").expect("no change"));
        assert!(matches!(
            record.set("unit", "meter"),
            Err(SyncError::UnknownField { .. })
        ));
        assert!(matches!(
            record.set("attributeLabel", "single"),
            Err(SyncError::FieldType { .. })
        ));
        assert!(record
            .set("missingValueCode.0.code", "-999")
            .expect("nested path"));
        assert_eq!(record.text("missingValueCode.0.code"), Some("-999"));
    }

    #[test]
    fn validation_reports_nested_paths() {
        let mut record = Record::new(EntityType::Attribute);
        record.set("attributeName", "depth").expect("name");
        record
            .set("missingValueCode.0.code", "-999")
            .expect("code");
        let errors = record.validate();
        assert!(errors.get("attributeDefinition").is_some());
        assert!(errors.get("missingValueCode.0.codeExplanation").is_some());
        assert_eq!(errors.len(), 2);
    }

    #[test]
    fn empty_optional_entities_skip_validation() {
        let record = Record::new(EntityType::PortalImage);
        assert!(record.is_empty());
        assert!(record.validate().is_empty());
        assert_eq!(
            record.update(&SyncConfig::default()).expect("update"),
            Serialized::Omit
        );
    }

    #[test]
    fn links_include_nested_references() {
        let node = parse_str(
            "<ratio><numericDomain><references>nd1</references></numericDomain></ratio>",
        )
        .expect("fixture");
        let record = Record::parse(EntityType::NumericDomain, &node, &SyncConfig::default());
        let links = record.links();
        assert_eq!(links.len(), 1);
        assert_eq!(links[0].0, "numericDomain.references");
        assert_eq!(links[0].1, ReferenceLink::new("nd1", EntityType::NumericDomain));
    }
}
