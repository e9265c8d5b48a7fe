use eml_dom::XmlNode;
use tracing::{info, warn};

use crate::record::Record;
use crate::schema::EntityType;
use crate::tree::{EntityId, EntityTree};
use crate::variant::MeasurementScale;
use crate::SyncError;

/// Element names attached as entities while walking a document.
const LOADED: [(&str, EntityType); 4] = [
    ("dataTable", EntityType::DataTable),
    ("attributeList", EntityType::AttributeList),
    ("attribute", EntityType::Attribute),
    ("distribution", EntityType::Distribution),
];

/// Outcome of [`EntityTree::load_document`].
#[derive(Debug, Default)]
pub struct LoadReport {
    /// Attached entities in document order.
    pub entities: Vec<EntityId>,
    /// Subtrees that could not be dispatched; the rest of the document
    /// still loads.
    pub errors: Vec<SyncError>,
}

impl EntityTree {
    /// Keep `document` as the raw mirror and attach its data tables,
    /// attribute lists, attributes, measurement scales and distributions,
    /// each under the closest attached ancestor.
    pub fn load_document(&mut self, document: XmlNode) -> Result<LoadReport, SyncError> {
        let mut report = LoadReport::default();
        self.visit(&document, None, &mut report)?;
        self.set_document(document);
        info!(
            entities = report.entities.len(),
            errors = report.errors.len(),
            "document loaded"
        );
        Ok(report)
    }

    fn visit(
        &mut self,
        node: &XmlNode,
        parent: Option<EntityId>,
        report: &mut LoadReport,
    ) -> Result<(), SyncError> {
        let mode = self.config.tag_matching;
        if node.is_named("measurementScale", mode) {
            match MeasurementScale::from_node(node, &self.config) {
                Ok(scale) => {
                    let id = self.attach(parent, scale.into_record())?;
                    report.entities.push(id);
                }
                Err(err) => {
                    warn!(error = %err, "skipping measurement scale");
                    report.errors.push(err);
                }
            }
            return Ok(());
        }
        let attached = match LOADED.iter().find(|(tag, _)| node.is_named(tag, mode)) {
            Some((_, ty)) => {
                let record = Record::parse(*ty, node, &self.config);
                let id = self.attach(parent, record)?;
                report.entities.push(id);
                Some(id)
            }
            None => None,
        };
        let parent = attached.or(parent);
        for child in node.elements() {
            self.visit(child, parent, report)?;
        }
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::dirty::RootAggregate;
    use eml_dom::parse_str;

    const EML: &str = r#"<eml:eml xmlns:eml="https://eml.ecoinformatics.org/eml-2.2.0" packageId="p1">
      <dataset>
        <title>Soil cores</title>
        <dataTable id="t1">
          <entityName>cores.csv</entityName>
          <physical>
            <objectName>cores.csv</objectName>
            <distribution><online><url>https://example.org/cores.csv</url></online></distribution>
          </physical>
          <attributeList id="list1">
            <attribute id="a1">
              <attributeName>depth</attributeName>
              <attributeDefinition>Core depth</attributeDefinition>
              <measurementScale><ratio><unit><standardUnit>meter</standardUnit></unit></ratio></measurementScale>
            </attribute>
            <attribute id="a2">
              <attributeName>taken</attributeName>
              <attributeDefinition>Sampling date</attributeDefinition>
              <measurementScale><dateTime><formatString>YYYY-MM-DD</formatString></dateTime></measurementScale>
            </attribute>
            <attribute id="a3">
              <attributeName>broken</attributeName>
              <attributeDefinition>Bad scale</attributeDefinition>
              <measurementScale><logarithmic/></measurementScale>
            </attribute>
          </attributeList>
        </dataTable>
      </dataset>
    </eml:eml>"#;

    #[test]
    fn attaches_entities_with_parents() {
        let root = RootAggregate::new();
        let mut tree = EntityTree::new(root.clone());
        let report = tree
            .load_document(parse_str(EML).expect("fixture"))
            .expect("load");
        assert_eq!(report.entities.len(), 8);
        assert_eq!(report.errors.len(), 1);
        assert!(matches!(
            report.errors[0],
            SyncError::UnrecognizedVariant { .. }
        ));
        assert!(!root.is_dirty());

        let table = report.entities[0];
        assert_eq!(
            tree.record(table).expect("table").text("entityName"),
            Some("cores.csv")
        );
        let kinds: Vec<EntityType> = tree
            .children(table)
            .iter()
            .map(|id| tree.record(*id).expect("child").entity_type())
            .collect();
        assert_eq!(kinds, vec![EntityType::Distribution, EntityType::AttributeList]);

        let (ratio, _) = tree
            .of_type(EntityType::NumericDomain)
            .next()
            .expect("ratio scale");
        let attribute = tree.parent(ratio).expect("attribute");
        assert_eq!(tree.record(attribute).expect("attribute").id(), Some("a1"));
        assert!(tree.document().is_some());
    }
}
