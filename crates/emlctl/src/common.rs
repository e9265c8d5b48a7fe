use std::fs;
use std::path::Path;

use anyhow::{Context, Result};
use eml_dom::XmlNode;
use eml_sync::{EntityType, SyncConfig, TagMatching};
use serde::Serialize;

/// Read and parse an XML file.
pub fn read_document(path: &Path) -> Result<XmlNode> {
    let text =
        fs::read_to_string(path).with_context(|| format!("read {}", path.display()))?;
    eml_dom::parse_str(&text).with_context(|| format!("parse {}", path.display()))
}

/// Engine options from the global command line flags.
pub fn sync_config(exact_tags: bool, no_canonicalize: bool) -> SyncConfig {
    let mut config = if exact_tags {
        SyncConfig::exact()
    } else {
        SyncConfig::default()
    };
    if no_canonicalize {
        config.canonicalize_tags = false;
    }
    config
}

/// Entity type whose schema accepts `node` as its root element.
pub fn infer_entity_type(node: &XmlNode, mode: TagMatching) -> Option<EntityType> {
    EntityType::ALL
        .into_iter()
        .find(|ty| ty.schema().accepts_root(node.local_name(), mode).is_some())
}

pub fn render_xml(node: &XmlNode) -> Result<String> {
    eml_dom::to_string_pretty(node).context("serialise XML output")
}

pub fn print_json<T: Serialize>(value: &T) -> Result<()> {
    let text = serde_json::to_string_pretty(value).context("serialise JSON output")?;
    println!("{text}");
    Ok(())
}
