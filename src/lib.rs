#![cfg_attr(docsrs, feature(doc_cfg))]
//! EML metadata sync facade that re-exports the workspace crates and provides
//! a convenience loader.
//!
//! ```rust
//! use emlsync::{EntityType, SyncError};
//!
//! # fn run() -> Result<(), SyncError> {
//! let (mut tree, report) = emlsync::load_str(
//!     "<attribute id=\"a1\"><attributeName>depth</attributeName></attribute>",
//!     emlsync::SyncConfig::default(),
//! )?;
//! let attribute = report.entities[0];
//! assert_eq!(tree.record(attribute)?.entity_type(), EntityType::Attribute);
//! tree.set_field(attribute, "attributeDefinition", "Core depth")?;
//! assert!(tree.root().is_dirty());
//! # Ok(())
//! # }
//! # run().expect("doc example");
//! ```

pub use eml_dom as dom;
pub use eml_sync as sync;

pub use eml_dom::{TagMatching, XmlError, XmlNode};
pub use eml_sync::{
    EntityId, EntityTree, EntityType, FieldMap, FieldValue, LoadReport, MeasurementScale,
    Record, ReferenceLink, Resolution, RootAggregate, ScaleKind, SearchFilter, Serialized,
    SyncConfig, SyncError, ValidationErrors,
};

/// Parse `xml` and load its entities into a fresh tree with its own root
/// aggregate.
pub fn load_str(xml: &str, config: SyncConfig) -> Result<(EntityTree, LoadReport), SyncError> {
    let document = eml_dom::parse_str(xml)?;
    let mut tree = EntityTree::with_config(RootAggregate::new(), config);
    let report = tree.load_document(document)?;
    Ok((tree, report))
}
