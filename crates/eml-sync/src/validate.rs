use std::collections::{BTreeMap, HashSet};
use std::fmt;

use serde::{Deserialize, Serialize};
use tracing::debug;

use crate::record::Record;
use crate::resolve::Resolution;
use crate::schema::{EntityType, FieldKind, SchemaRule};
use crate::tree::{EntityId, EntityTree};
use crate::value::{FieldMap, FieldValue};
use crate::SyncError;

const MISSING_REFERENCE: &str = "The referenced element must exist in the document.";
const INVALID_REFERENCE: &str = "The referenced element is not valid.";
const INVALID_CHILD: &str = "Every element inside this one must be valid.";
const MIXED_ATTRIBUTE_LIST: &str =
    "An attribute list holds either attributes or a reference, not both.";

/// Field path to human-readable message.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(transparent)]
pub struct ValidationErrors(BTreeMap<String, String>);

impl ValidationErrors {
    pub fn new() -> Self {
        Self::default()
    }

    /// Record a message for `field` unless it already has one.
    pub fn add(&mut self, field: impl Into<String>, message: impl Into<String>) {
        self.0.entry(field.into()).or_insert_with(|| message.into());
    }

    pub fn get(&self, field: &str) -> Option<&str> {
        self.0.get(field).map(String::as_str)
    }

    pub fn is_empty(&self) -> bool {
        self.0.is_empty()
    }

    pub fn len(&self) -> usize {
        self.0.len()
    }

    pub fn iter(&self) -> impl Iterator<Item = (&str, &str)> {
        self.0
            .iter()
            .map(|(field, message)| (field.as_str(), message.as_str()))
    }

    fn merge_prefixed(&mut self, prefix: &str, other: ValidationErrors) {
        for (field, message) in other.0 {
            self.add(format!("{prefix}{field}"), message);
        }
    }
}

impl fmt::Display for ValidationErrors {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        for (index, (field, message)) in self.iter().enumerate() {
            if index > 0 {
                f.write_str("; ")?;
            }
            write!(f, "{field}: {message}")?;
        }
        Ok(())
    }
}

/// Required fields and entity rules, descending into non-empty nested
/// values with dotted prefixes (`unit.`, `bounds.0.`).
pub(crate) fn validate_fields(schema: &SchemaRule, fields: &FieldMap) -> ValidationErrors {
    let mut errors = ValidationErrors::new();
    check(schema, fields, "", &mut errors);
    errors
}

fn check(schema: &SchemaRule, fields: &FieldMap, prefix: &str, errors: &mut ValidationErrors) {
    for rule in schema.fields {
        let value = fields.get(rule.name);
        if let Some(message) = rule.required {
            if value.map_or(true, FieldValue::is_empty) {
                errors.add(format!("{prefix}{}", rule.name), message);
                continue;
            }
        }
        match (rule.kind, value) {
            (FieldKind::Nested(inner), Some(FieldValue::Map(map))) if !map.is_empty() => {
                check(inner, map, &format!("{prefix}{}.", rule.name), errors);
            }
            (FieldKind::NestedList(inner), Some(FieldValue::List(items))) => {
                for (index, item) in items.iter().enumerate() {
                    if let FieldValue::Map(map) = item {
                        if !map.is_empty() {
                            check(inner, map, &format!("{prefix}{}.{index}.", rule.name), errors);
                        }
                    }
                }
            }
            _ => {}
        }
    }
    if let Some(rules) = schema.rules {
        let mut local = ValidationErrors::new();
        rules(fields, &mut local);
        errors.merge_prefixed(prefix, local);
    }
}

impl EntityTree {
    /// Validate an entity together with the entities it contains and
    /// everything its references point at.
    ///
    /// A reference that resolves nowhere, or to an entity that is itself
    /// invalid, is reported on the reference field. An invalid child is
    /// reported under the child's role (`attributes`, `measurementScale`).
    pub fn validate(&self, id: EntityId) -> Result<ValidationErrors, SyncError> {
        let mut visiting = HashSet::new();
        self.validate_entity(id, &mut visiting)
    }

    /// Validate every entity, keeping only those with errors.
    pub fn validate_all(&self) -> Result<BTreeMap<EntityId, ValidationErrors>, SyncError> {
        let mut report = BTreeMap::new();
        for id in self.ids() {
            let errors = self.validate(id)?;
            if !errors.is_empty() {
                report.insert(id, errors);
            }
        }
        Ok(report)
    }

    fn validate_entity(
        &self,
        id: EntityId,
        visiting: &mut HashSet<EntityId>,
    ) -> Result<ValidationErrors, SyncError> {
        let record = self.record(id)?;
        let mut errors = record.validate();
        if record.entity_type() == EntityType::AttributeList {
            self.check_attribute_list(id, record, &mut errors);
        }
        if !visiting.insert(id) {
            return Ok(errors);
        }
        for child in self.children(id) {
            if !self.validate_entity(*child, visiting)?.is_empty() {
                debug!(entity = %id, child = %child, "contained element is invalid");
                errors.add(child_role(self.record(*child)?.entity_type()), INVALID_CHILD);
            }
        }
        for (path, link) in record.links() {
            let valid = match self.resolve(&link) {
                Resolution::NotFound => {
                    errors.add(path, MISSING_REFERENCE);
                    continue;
                }
                Resolution::Entity(target, _) if target == id => true,
                Resolution::Entity(target, _) => {
                    self.validate_entity(target, visiting)?.is_empty()
                }
                Resolution::Node(node) => {
                    let schema = link.target.schema();
                    schema
                        .accepts_root(node.local_name(), self.config.tag_matching)
                        .is_none()
                        || Record::parse(link.target, node, &self.config)
                            .validate()
                            .is_empty()
                }
            };
            if !valid {
                debug!(entity = %id, reference = %link.id, "referenced element is invalid");
                errors.add(path, INVALID_REFERENCE);
            }
        }
        Ok(errors)
    }

    fn check_attribute_list(&self, id: EntityId, record: &Record, errors: &mut ValidationErrors) {
        let referenced = record
            .text("references")
            .is_some_and(|text| !text.trim().is_empty());
        let has_attributes = self.children(id).iter().any(|child| {
            self.get(*child)
                .is_some_and(|child| child.entity_type() == EntityType::Attribute)
        });
        if referenced && has_attributes {
            errors.add("attributes", MIXED_ATTRIBUTE_LIST);
            errors.add("references", MIXED_ATTRIBUTE_LIST);
        }
    }
}

fn child_role(ty: EntityType) -> &'static str {
    match ty {
        EntityType::Attribute => "attributes",
        EntityType::NonNumericDomain | EntityType::NumericDomain | EntityType::DateTimeDomain => {
            "measurementScale"
        }
        other => other.name(),
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::config::SyncConfig;
    use crate::dirty::RootAggregate;
    use crate::resolve::ReferenceLink;
    use eml_dom::parse_str;

    const DOCUMENT: &str = r#"<dataset>
        <dataTable id="t1">
            <entityName>first.csv</entityName>
            <attributeList id="list1">
                <attribute id="a1">
                    <attributeName>site</attributeName>
                    <attributeDefinition>Sampling site</attributeDefinition>
                </attribute>
            </attributeList>
        </dataTable>
        <dataTable id="t2">
            <entityName>second.csv</entityName>
            <attributeList id="list2"><references>list1</references></attributeList>
        </dataTable>
    </dataset>"#;

    fn loaded() -> (EntityTree, EntityId, EntityId) {
        let mut tree = EntityTree::new(RootAggregate::new());
        let document = parse_str(DOCUMENT).expect("fixture");
        tree.load_document(document).expect("load");
        let find = |tree: &EntityTree, wanted: &str| {
            tree.of_type(EntityType::AttributeList)
                .find(|(_, record)| record.id() == Some(wanted))
                .map(|(id, _)| id)
                .expect("list loaded")
        };
        let first = find(&tree, "list1");
        let second = find(&tree, "list2");
        (tree, first, second)
    }

    #[test]
    fn removing_target_breaks_reference() {
        let (mut tree, first, second) = loaded();
        let link = ReferenceLink::new("list1", EntityType::AttributeList);
        assert!(matches!(tree.resolve(&link), Resolution::Entity(id, _) if id == first));
        assert!(tree.validate(second).expect("validate").is_empty());

        tree.remove(first).expect("remove");
        assert_eq!(tree.resolve(&link), Resolution::NotFound);
        let errors = tree.validate(second).expect("validate");
        assert_eq!(errors.get("references"), Some(MISSING_REFERENCE));
    }

    #[test]
    fn invalid_target_is_reported() {
        let (mut tree, first, second) = loaded();
        let attribute = tree.children(first)[0];
        tree.set_field(attribute, "attributeDefinition", "")
            .expect("clear definition");
        let errors = tree.validate(first).expect("first");
        assert_eq!(errors.get("attributes"), Some(INVALID_CHILD));
        assert!(errors.get("attributeDefinition").is_none());
        let table = tree.parent(first).expect("table");
        let errors = tree.validate(table).expect("table");
        assert_eq!(errors.get("attributeList"), Some(INVALID_CHILD));
        let errors = tree.validate(second).expect("validate");
        assert_eq!(errors.get("references"), Some(INVALID_REFERENCE));

        tree.set_field(attribute, "attributeDefinition", "Sampling site")
            .expect("restore definition");
        assert!(tree.validate(second).expect("valid again").is_empty());

        tree.set_field(first, "references", "list2").expect("mixed list");
        let errors = tree.validate(first).expect("validate first");
        assert_eq!(errors.get("attributes"), Some(MIXED_ATTRIBUTE_LIST));
        let errors = tree.validate(second).expect("validate second");
        assert_eq!(errors.get("references"), Some(INVALID_REFERENCE));
    }

    #[test]
    fn reference_cycles_terminate() {
        let mut tree = EntityTree::new(RootAggregate::new());
        let config = SyncConfig::default();
        let a = parse_str("<attributeList id=\"x\"><references>y</references></attributeList>")
            .expect("a");
        let b = parse_str("<attributeList id=\"y\"><references>x</references></attributeList>")
            .expect("b");
        let a = tree
            .attach(None, Record::parse(EntityType::AttributeList, &a, &config))
            .expect("attach a");
        tree.attach(None, Record::parse(EntityType::AttributeList, &b, &config))
            .expect("attach b");
        assert!(tree.validate(a).expect("validate").is_empty());
        assert!(tree.validate_all().expect("all").is_empty());
    }

    #[test]
    fn messages_render_in_field_order() {
        let mut errors = ValidationErrors::new();
        errors.add("b", "second");
        errors.add("a", "first");
        errors.add("a", "ignored");
        assert_eq!(errors.to_string(), "a: first; b: second");
        assert_eq!(
            serde_json::to_value(&errors).expect("json"),
            serde_json::json!({"a": "first", "b": "second"})
        );
    }
}
