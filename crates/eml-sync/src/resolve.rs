use eml_dom::XmlNode;
use serde::Serialize;
use tracing::debug;

use crate::record::Record;
use crate::schema::EntityType;
use crate::tree::{EntityId, EntityTree};

/// An id-based cross-reference to another entity.
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize)]
pub struct ReferenceLink {
    pub id: String,
    pub target: EntityType,
}

impl ReferenceLink {
    pub fn new(id: impl Into<String>, target: EntityType) -> Self {
        ReferenceLink {
            id: id.into(),
            target,
        }
    }
}

/// What a [`ReferenceLink`] currently points at.
#[derive(Debug, Clone, Copy, PartialEq)]
pub enum Resolution<'a> {
    /// A live entity of the target type carries the id.
    Entity(EntityId, &'a Record),
    /// No live entity matched, but an element in the document has the id.
    Node(&'a XmlNode),
    NotFound,
}

impl Resolution<'_> {
    pub fn is_found(&self) -> bool {
        !matches!(self, Resolution::NotFound)
    }
}

impl EntityTree {
    /// Resolve a link against live entities first, then the raw document.
    pub fn resolve(&self, link: &ReferenceLink) -> Resolution<'_> {
        if let Some((id, record)) = self
            .of_type(link.target)
            .find(|(_, record)| record.id() == Some(link.id.as_str()))
        {
            debug!(reference = %link.id, entity = %id, "reference resolved to entity");
            return Resolution::Entity(id, record);
        }
        if let Some(node) = self.document().and_then(|doc| doc.find_by_id(&link.id)) {
            debug!(reference = %link.id, element = %node.name, "reference resolved to element");
            return Resolution::Node(node);
        }
        debug!(reference = %link.id, target = %link.target, "reference not found");
        Resolution::NotFound
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::config::SyncConfig;
    use crate::dirty::RootAggregate;
    use eml_dom::parse_str;

    #[test]
    fn entities_win_over_document_elements() {
        let config = SyncConfig::default();
        let mut tree = EntityTree::new(RootAggregate::new());
        let document = parse_str(
            "<dataset><attributeList id=\"list1\"/><otherEntity id=\"oe1\"/></dataset>",
        )
        .expect("fixture");
        tree.set_document(document.clone());
        let element = document.element_at(0).expect("list element");
        let list = tree
            .attach(None, Record::parse(EntityType::AttributeList, element, &config))
            .expect("attach");

        let link = ReferenceLink::new("list1", EntityType::AttributeList);
        assert!(matches!(tree.resolve(&link), Resolution::Entity(id, _) if id == list));

        let other = ReferenceLink::new("oe1", EntityType::AttributeList);
        assert!(matches!(tree.resolve(&other), Resolution::Node(node) if node.name == "otherEntity"));

        let wrong_type = ReferenceLink::new("list1", EntityType::Attribute);
        assert!(matches!(tree.resolve(&wrong_type), Resolution::Node(_)));

        let missing = ReferenceLink::new("nope", EntityType::AttributeList);
        assert!(!tree.resolve(&missing).is_found());
    }
}
