use std::path::Path;

use anyhow::{bail, Context, Result};
use eml_sync::{EntityType, FieldMap, FieldValue, MeasurementScale, Record, SyncConfig, ValidationErrors};
use serde::Serialize;
use tracing::info;

use crate::common;

#[derive(Serialize)]
struct ParsedEntity<'a> {
    entity: EntityType,
    fields: &'a FieldMap,
    errors: ValidationErrors,
}

pub fn run(file: &Path, entity: Option<EntityType>, config: &SyncConfig, json: bool) -> Result<()> {
    let node = common::read_document(file)?;
    let record = match entity.or_else(|| common::infer_entity_type(&node, config.tag_matching)) {
        Some(ty) => Record::parse(ty, &node, config),
        None if node.is_named("measurementScale", config.tag_matching) => {
            MeasurementScale::from_node(&node, config)
                .context("dispatch measurement scale")?
                .into_record()
        }
        None => bail!(
            "cannot tell which entity <{}> holds; pass --entity",
            node.name
        ),
    };
    info!(entity = %record.entity_type(), "parsed {}", file.display());

    let errors = record.validate();
    if json {
        return common::print_json(&ParsedEntity {
            entity: record.entity_type(),
            fields: record.fields(),
            errors,
        });
    }
    println!("{}", record.entity_type());
    for (path, value) in flatten(record.fields()) {
        println!("  {path} = {value}");
    }
    for (field, message) in errors.iter() {
        println!("  ! {field}: {message}");
    }
    Ok(())
}

/// Leaf values keyed by dotted path, in field name order.
pub fn flatten(fields: &FieldMap) -> Vec<(String, String)> {
    let mut out = Vec::new();
    for (name, value) in fields.iter() {
        flatten_value(name.to_string(), value, &mut out);
    }
    out
}

fn flatten_value(path: String, value: &FieldValue, out: &mut Vec<(String, String)>) {
    match value {
        FieldValue::Text(text) => out.push((path, text.clone())),
        FieldValue::List(items) => {
            for (index, item) in items.iter().enumerate() {
                flatten_value(format!("{path}.{index}"), item, out);
            }
        }
        FieldValue::Map(map) => {
            for (name, item) in map.iter() {
                flatten_value(format!("{path}.{name}"), item, out);
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn flatten_uses_dotted_paths() {
        let fields = FieldMap::new()
            .with("formatString", "YYYY")
            .with(
                "dateTimeDomain",
                FieldMap::new().with(
                    "bounds",
                    vec![FieldValue::from(FieldMap::new().with("minimum", "2017"))],
                ),
            );
        assert_eq!(
            flatten(&fields),
            vec![
                ("dateTimeDomain.bounds.0.minimum".to_string(), "2017".to_string()),
                ("formatString".to_string(), "YYYY".to_string()),
            ]
        );
    }
}
