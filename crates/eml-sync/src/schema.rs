//! Declarative schema rules: which fields an entity type has, where each
//! one lives in the XML, and the order its nodes are written in.

use std::fmt;
use std::str::FromStr;

use eml_dom::TagMatching;
use serde::{Deserialize, Serialize};

use crate::catalog;
use crate::validate::ValidationErrors;
use crate::value::FieldMap;
use crate::SyncError;

/// Entity-level check run after the per-field required checks.
pub type RuleCheck = fn(&FieldMap, &mut ValidationErrors);

/// How a field is read from and written to its element.
#[derive(Debug, Clone, Copy)]
pub enum FieldKind {
    /// Text of the first child element named by the field tag.
    Text,
    /// Text of every child element named by the field tag.
    TextList,
    /// Attribute on the entity's root element.
    Attribute,
    /// Attribute on the first child element named `child`.
    ChildAttribute { child: &'static str },
    /// Character data directly inside the root element.
    OwnText,
    /// Local name of the root element itself.
    ElementName,
    /// Id of another entity, held as child element text.
    Reference(EntityType),
    /// A single child element bound through another schema.
    Nested(&'static SchemaRule),
    /// Every child element named by the field tag, each bound through
    /// another schema.
    NestedList(&'static SchemaRule),
}

impl FieldKind {
    /// Describes the value shape the kind accepts.
    pub fn expects(&self) -> &'static str {
        match self {
            FieldKind::TextList => "a list of text values",
            FieldKind::Nested(_) => "a map of fields",
            FieldKind::NestedList(_) => "a list of field maps",
            _ => "a text value",
        }
    }

    /// True for kinds stored as child elements rather than attributes or
    /// root text.
    pub fn is_element(&self) -> bool {
        matches!(
            self,
            FieldKind::Text
                | FieldKind::TextList
                | FieldKind::Reference(_)
                | FieldKind::Nested(_)
                | FieldKind::NestedList(_)
        )
    }
}

#[derive(Debug, Clone, Copy)]
pub struct FieldRule {
    /// Key in the entity's field map.
    pub name: &'static str,
    /// Element or attribute name in the XML.
    pub tag: &'static str,
    pub kind: FieldKind,
    /// Value assumed when the node is absent. Never written for a node the
    /// source did not already have.
    pub default: Option<&'static str>,
    /// Message reported when the field is empty.
    pub required: Option<&'static str>,
}

impl FieldRule {
    const fn with_kind(name: &'static str, tag: &'static str, kind: FieldKind) -> Self {
        FieldRule {
            name,
            tag,
            kind,
            default: None,
            required: None,
        }
    }

    pub const fn text(name: &'static str) -> Self {
        Self::with_kind(name, name, FieldKind::Text)
    }

    pub const fn text_list(name: &'static str) -> Self {
        Self::with_kind(name, name, FieldKind::TextList)
    }

    pub const fn attribute(name: &'static str) -> Self {
        Self::with_kind(name, name, FieldKind::Attribute)
    }

    pub const fn child_attribute(
        name: &'static str,
        child: &'static str,
        attribute: &'static str,
    ) -> Self {
        Self::with_kind(name, attribute, FieldKind::ChildAttribute { child })
    }

    pub const fn own_text(name: &'static str) -> Self {
        Self::with_kind(name, name, FieldKind::OwnText)
    }

    pub const fn element_name(name: &'static str) -> Self {
        Self::with_kind(name, name, FieldKind::ElementName)
    }

    pub const fn reference(name: &'static str, target: EntityType) -> Self {
        Self::with_kind(name, name, FieldKind::Reference(target))
    }

    pub const fn nested(name: &'static str, schema: &'static SchemaRule) -> Self {
        Self::with_kind(name, name, FieldKind::Nested(schema))
    }

    pub const fn nested_list(name: &'static str, schema: &'static SchemaRule) -> Self {
        Self::with_kind(name, name, FieldKind::NestedList(schema))
    }

    pub const fn with_default(self, value: &'static str) -> Self {
        FieldRule {
            default: Some(value),
            ..self
        }
    }

    pub const fn required(self, message: &'static str) -> Self {
        FieldRule {
            required: Some(message),
            ..self
        }
    }
}

/// Schema of one entity type (or of a nested element inside one).
pub struct SchemaRule {
    /// Accepted root element names; the first is used for new elements.
    pub root_tags: &'static [&'static str],
    /// Fields in the order they are written.
    pub fields: &'static [FieldRule],
    /// Canonical order of child elements, unmodeled ones included.
    pub order: &'static [&'static str],
    /// Further tag spellings to restore when canonicalizing.
    pub aliases: &'static [&'static str],
    pub rules: Option<RuleCheck>,
    /// Write back nothing, and skip validation, when no field has content.
    pub omit_when_empty: bool,
}

impl SchemaRule {
    /// Element name used when creating a new root element.
    pub fn tag(&self) -> &'static str {
        self.root_tags.first().copied().unwrap_or("")
    }

    pub fn field(&self, name: &str) -> Option<&'static FieldRule> {
        self.fields.iter().find(|rule| rule.name == name)
    }

    /// Canonical spelling of `name` when it is an accepted root element name.
    pub fn accepts_root(&self, name: &str, mode: TagMatching) -> Option<&'static str> {
        self.root_tags
            .iter()
            .copied()
            .find(|tag| mode.matches(tag, name))
    }

    /// Canonical spelling of a tag this schema (or a nested schema) knows,
    /// matched ignoring ASCII case.
    pub fn known_tag(&self, name: &str) -> Option<&'static str> {
        if let Some(tag) = self
            .root_tags
            .iter()
            .chain(self.order)
            .chain(self.aliases)
            .copied()
            .find(|tag| tag.eq_ignore_ascii_case(name))
        {
            return Some(tag);
        }
        self.fields.iter().find_map(|rule| match rule.kind {
            _ if rule.kind.is_element() && rule.tag.eq_ignore_ascii_case(name) => Some(rule.tag),
            FieldKind::ChildAttribute { child } if child.eq_ignore_ascii_case(name) => Some(child),
            FieldKind::Nested(inner) | FieldKind::NestedList(inner) => inner.known_tag(name),
            _ => None,
        })
    }
}

impl fmt::Debug for SchemaRule {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("SchemaRule")
            .field("root_tags", &self.root_tags)
            .field(
                "fields",
                &self.fields.iter().map(|rule| rule.name).collect::<Vec<_>>(),
            )
            .field("order", &self.order)
            .field("omit_when_empty", &self.omit_when_empty)
            .finish()
    }
}

/// Every entity type the catalog models.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub enum EntityType {
    DataTable,
    AttributeList,
    Attribute,
    MissingValueCode,
    NonNumericDomain,
    NumericDomain,
    DateTimeDomain,
    Distribution,
    PortalImage,
    Filter,
    NumericFilter,
    DateFilter,
    BooleanFilter,
}

impl EntityType {
    pub const ALL: [EntityType; 13] = [
        EntityType::DataTable,
        EntityType::AttributeList,
        EntityType::Attribute,
        EntityType::MissingValueCode,
        EntityType::NonNumericDomain,
        EntityType::NumericDomain,
        EntityType::DateTimeDomain,
        EntityType::Distribution,
        EntityType::PortalImage,
        EntityType::Filter,
        EntityType::NumericFilter,
        EntityType::DateFilter,
        EntityType::BooleanFilter,
    ];

    pub fn schema(self) -> &'static SchemaRule {
        match self {
            EntityType::DataTable => &catalog::DATA_TABLE,
            EntityType::AttributeList => &catalog::ATTRIBUTE_LIST,
            EntityType::Attribute => &catalog::ATTRIBUTE,
            EntityType::MissingValueCode => &catalog::MISSING_VALUE_CODE,
            EntityType::NonNumericDomain => &catalog::NON_NUMERIC_DOMAIN,
            EntityType::NumericDomain => &catalog::NUMERIC_DOMAIN,
            EntityType::DateTimeDomain => &catalog::DATE_TIME_DOMAIN,
            EntityType::Distribution => &catalog::DISTRIBUTION,
            EntityType::PortalImage => &catalog::PORTAL_IMAGE,
            EntityType::Filter => &catalog::FILTER,
            EntityType::NumericFilter => &catalog::NUMERIC_FILTER,
            EntityType::DateFilter => &catalog::DATE_FILTER,
            EntityType::BooleanFilter => &catalog::BOOLEAN_FILTER,
        }
    }

    pub fn name(self) -> &'static str {
        match self {
            EntityType::DataTable => "dataTable",
            EntityType::AttributeList => "attributeList",
            EntityType::Attribute => "attribute",
            EntityType::MissingValueCode => "missingValueCode",
            EntityType::NonNumericDomain => "nonNumericDomain",
            EntityType::NumericDomain => "numericDomain",
            EntityType::DateTimeDomain => "dateTimeDomain",
            EntityType::Distribution => "distribution",
            EntityType::PortalImage => "portalImage",
            EntityType::Filter => "filter",
            EntityType::NumericFilter => "numericFilter",
            EntityType::DateFilter => "dateFilter",
            EntityType::BooleanFilter => "booleanFilter",
        }
    }

    /// Look up a type by its name, ignoring ASCII case.
    pub fn from_name(name: &str) -> Option<Self> {
        Self::ALL
            .into_iter()
            .find(|ty| ty.name().eq_ignore_ascii_case(name))
    }
}

impl fmt::Display for EntityType {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.name())
    }
}

impl FromStr for EntityType {
    type Err = SyncError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        Self::from_name(s).ok_or_else(|| SyncError::UnknownEntityType(s.to_string()))
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn entity_names_round_trip() {
        for ty in EntityType::ALL {
            assert_eq!(ty.name().parse::<EntityType>().expect("known name"), ty);
        }
        assert_eq!(
            EntityType::from_name("DATATABLE"),
            Some(EntityType::DataTable)
        );
        assert!(matches!(
            "table".parse::<EntityType>(),
            Err(SyncError::UnknownEntityType(_))
        ));
    }

    #[test]
    fn schema_order_covers_element_fields() {
        fn check(schema: &'static SchemaRule) {
            for rule in schema.fields.iter().filter(|rule| rule.kind.is_element()) {
                assert!(
                    schema.order.contains(&rule.tag),
                    "{} missing from order of {:?}",
                    rule.tag,
                    schema.root_tags
                );
                if let FieldKind::Nested(inner) | FieldKind::NestedList(inner) = rule.kind {
                    assert!(inner.root_tags.contains(&rule.tag));
                    check(inner);
                }
            }
        }
        for ty in EntityType::ALL {
            check(ty.schema());
        }
    }

    #[test]
    fn known_tags_restore_case() {
        let schema = EntityType::DateTimeDomain.schema();
        assert_eq!(schema.known_tag("formatstring"), Some("formatString"));
        assert_eq!(schema.known_tag("DATETIMEDOMAIN"), Some("dateTimeDomain"));
        assert_eq!(schema.known_tag("minimum"), Some("minimum"));
        assert_eq!(schema.known_tag("unit"), None);
        let numeric = EntityType::NumericDomain.schema();
        assert_eq!(numeric.accepts_root("Ratio", TagMatching::CaseInsensitive), Some("ratio"));
        assert_eq!(numeric.accepts_root("Ratio", TagMatching::Exact), None);
    }
}
