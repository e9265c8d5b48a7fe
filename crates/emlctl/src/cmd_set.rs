use std::path::Path;

use anyhow::{anyhow, Context, Result};
use eml_sync::{EntityId, EntityTree, RootAggregate, Serialized, SyncConfig};
use serde::Serialize;
use tracing::info;

use crate::common;

#[derive(Serialize)]
struct SetResult<'a> {
    entity: u32,
    path: &'a str,
    value: &'a str,
    changed: bool,
    dirty: bool,
    xml: Option<String>,
}

/// Load a document, change one field of one entity and print the entity
/// as it would be written back.
pub fn run(
    file: &Path,
    entity: u32,
    path: &str,
    value: &str,
    config: &SyncConfig,
    json: bool,
) -> Result<()> {
    let document = common::read_document(file)?;
    let root = RootAggregate::new();
    let mut tree = EntityTree::with_config(root.clone(), *config);
    tree.load_document(document)
        .context("load entities from document")?;

    let id = EntityId::from_raw(entity);
    if !tree.contains(id) {
        return Err(anyhow!("no entity {id}; run `emlctl roundtrip` to list ids"));
    }
    let changed = tree
        .set_field(id, path, value)
        .with_context(|| format!("set {path} on {id}"))?;
    info!(entity = %id, path, changed, "field set");
    let xml = match tree.update(id).with_context(|| format!("write back {id}"))? {
        Serialized::Node(node) => Some(common::render_xml(&node)?),
        Serialized::Omit => None,
    };

    if json {
        return common::print_json(&SetResult {
            entity,
            path,
            value,
            changed,
            dirty: root.is_dirty(),
            xml,
        });
    }
    println!(
        "{id} {path}: {}",
        if changed { "changed" } else { "unchanged" }
    );
    println!("{}", xml.as_deref().unwrap_or("(omitted: no content)"));
    Ok(())
}
