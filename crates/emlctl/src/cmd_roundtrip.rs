use std::path::Path;

use anyhow::{Context, Result};
use eml_sync::{EntityTree, EntityType, RootAggregate, Serialized, SyncConfig};
use serde::Serialize;
use tracing::info;

use crate::common;

#[derive(Serialize)]
struct RoundTrip {
    id: u32,
    entity: EntityType,
    parent: Option<u32>,
    xml: Option<String>,
}

/// Load every entity of a document and write each one back.
pub fn run(file: &Path, config: &SyncConfig, json: bool) -> Result<()> {
    let document = common::read_document(file)?;
    let mut tree = EntityTree::with_config(RootAggregate::new(), *config);
    let report = tree
        .load_document(document)
        .context("load entities from document")?;
    info!(entities = report.entities.len(), "round-tripping {}", file.display());

    let mut rows = Vec::with_capacity(report.entities.len());
    for id in &report.entities {
        let record = tree.record(*id)?;
        let serialized = tree
            .update(*id)
            .with_context(|| format!("write back {} {id}", record.entity_type()))?;
        let xml = match serialized {
            Serialized::Node(node) => Some(common::render_xml(&node)?),
            Serialized::Omit => None,
        };
        rows.push(RoundTrip {
            id: id.raw(),
            entity: record.entity_type(),
            parent: tree.parent(*id).map(|parent| parent.raw()),
            xml,
        });
    }

    if json {
        return common::print_json(&rows);
    }
    for row in &rows {
        println!("#{} {}", row.id, row.entity);
        match &row.xml {
            Some(xml) => println!("{xml}"),
            None => println!("(omitted: no content)"),
        }
    }
    for err in &report.errors {
        eprintln!("skipped: {err}");
    }
    Ok(())
}
