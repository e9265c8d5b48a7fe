use std::path::Path;

use anyhow::{bail, Context, Result};
use eml_sync::{EntityTree, EntityType, RootAggregate, SyncConfig, ValidationErrors};
use serde::Serialize;
use tracing::info;

use crate::common;

#[derive(Serialize)]
struct Invalid {
    id: u32,
    entity: EntityType,
    entity_id: Option<String>,
    errors: ValidationErrors,
}

/// Validate every loaded entity; fails when any entity has errors.
pub fn run(file: &Path, config: &SyncConfig, json: bool) -> Result<()> {
    let document = common::read_document(file)?;
    let mut tree = EntityTree::with_config(RootAggregate::new(), *config);
    let report = tree
        .load_document(document)
        .context("load entities from document")?;
    let failures = tree.validate_all().context("validate entities")?;
    info!(
        entities = report.entities.len(),
        invalid = failures.len(),
        "validated {}",
        file.display()
    );

    let mut rows = Vec::with_capacity(failures.len());
    for (id, errors) in failures {
        let record = tree.record(id)?;
        rows.push(Invalid {
            id: id.raw(),
            entity: record.entity_type(),
            entity_id: record.id().map(str::to_string),
            errors,
        });
    }

    if json {
        common::print_json(&rows)?;
    } else {
        for row in &rows {
            let label = row.entity_id.as_deref().unwrap_or("-");
            println!("#{} {} [{label}]", row.id, row.entity);
            for (field, message) in row.errors.iter() {
                println!("  {field}: {message}");
            }
        }
    }
    for err in &report.errors {
        eprintln!("skipped: {err}");
    }
    if !rows.is_empty() || !report.errors.is_empty() {
        bail!(
            "{} invalid entities, {} undispatchable subtrees",
            rows.len(),
            report.errors.len()
        );
    }
    if !json {
        println!("all {} entities valid", report.entities.len());
    }
    Ok(())
}
