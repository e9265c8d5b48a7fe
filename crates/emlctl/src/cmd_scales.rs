use std::path::Path;

use anyhow::Result;
use eml_dom::XmlNode;
use eml_sync::{EntityType, MeasurementScale, SyncConfig};
use serde::Serialize;

use crate::common;

#[derive(Serialize)]
struct ScaleRow {
    attribute: Option<String>,
    scale: Option<String>,
    entity: Option<EntityType>,
    error: Option<String>,
}

/// Dispatch every measurement scale in a document.
pub fn run(file: &Path, config: &SyncConfig, json: bool) -> Result<()> {
    let document = common::read_document(file)?;
    let mut rows = Vec::new();
    collect(&document, None, config, &mut rows);

    if json {
        return common::print_json(&rows);
    }
    for row in &rows {
        let attribute = row.attribute.as_deref().unwrap_or("?");
        match (&row.scale, row.entity, &row.error) {
            (_, _, Some(error)) => println!("{attribute}: error: {error}"),
            (scale, Some(entity), None) => {
                println!("{attribute}: {} ({entity})", scale.as_deref().unwrap_or("?"))
            }
            _ => println!("{attribute}: unresolved"),
        }
    }
    Ok(())
}

fn collect(node: &XmlNode, attribute: Option<&str>, config: &SyncConfig, rows: &mut Vec<ScaleRow>) {
    let mode = config.tag_matching;
    if node.is_named("measurementScale", mode) {
        let row = match MeasurementScale::from_node(node, config) {
            Ok(scale) => ScaleRow {
                attribute: attribute.map(str::to_string),
                scale: scale.kind().map(|kind| kind.tag().to_string()),
                entity: Some(scale.record().entity_type()),
                error: None,
            },
            Err(err) => ScaleRow {
                attribute: attribute.map(str::to_string),
                scale: None,
                entity: None,
                error: Some(err.to_string()),
            },
        };
        rows.push(row);
        return;
    }
    let own_name = node
        .is_named("attribute", mode)
        .then(|| node.child("attributeName", mode))
        .flatten()
        .map(|name| name.text().trim().to_string());
    let name = own_name.as_deref().or(attribute);
    for child in node.elements() {
        collect(child, name, config, rows);
    }
}
