//! Synchronization engine binding typed EML entities to XML fragments.
//!
//! A [`Record`] is parsed from an [`XmlNode`] through its entity type's
//! [`SchemaRule`], edited through dotted field paths and written back by
//! [`Record::update`], which rewrites only the nodes the schema manages and
//! keeps everything else where it was. Records live in an [`EntityTree`]
//! that forwards every change to a shared [`RootAggregate`] and resolves
//! id-based references between entities.

mod binding;
pub mod catalog;
mod config;
mod dirty;
mod loader;
mod record;
mod resolve;
pub mod schema;
mod tree;
mod update;
mod validate;
mod value;
mod variant;

use thiserror::Error;

pub use binding::parse;
pub use config::SyncConfig;
pub use dirty::RootAggregate;
pub use eml_dom::{TagMatching, XmlError, XmlNode};
pub use loader::LoadReport;
pub use record::Record;
pub use resolve::{ReferenceLink, Resolution};
pub use schema::{EntityType, FieldKind, FieldRule, SchemaRule};
pub use tree::{EntityId, EntityTree};
pub use update::{update_fields, Serialized};
pub use validate::ValidationErrors;
pub use value::{FieldMap, FieldValue};
pub use variant::{
    resolve_variant, FilterKind, MeasurementScale, ScaleKind, ScaleSwitcher, SearchFilter,
    Variant, VariantGroup, MEASUREMENT_SCALE, SEARCH_FILTER,
};

/// Error type produced by synchronization operations.
#[derive(Debug, Error)]
pub enum SyncError {
    /// The XML layer rejected a document.
    #[error(transparent)]
    Xml(#[from] XmlError),
    /// No discriminator, or more than one, matched a variant group.
    #[error("unrecognized {group} variant (found: {found:?})")]
    UnrecognizedVariant { group: String, found: Vec<String> },
    /// An entity could not be written back to a consistent subtree.
    #[error("cannot serialize {entity}: {reason}")]
    Serialization { entity: String, reason: String },
    /// The entity id is not part of the tree.
    #[error("entity not found: {0}")]
    EntityNotFound(EntityId),
    /// The entity type has no field with this name.
    #[error("{entity} has no field `{field}`")]
    UnknownField { entity: String, field: String },
    /// A value of the wrong shape was assigned to a field.
    #[error("field `{field}` expects {expected}")]
    FieldType { field: String, expected: String },
    /// A dotted field path could not be followed.
    #[error("invalid field path `{path}`: {reason}")]
    InvalidPath { path: String, reason: String },
    /// The name does not denote a known entity type.
    #[error("unknown entity type: {0}")]
    UnknownEntityType(String),
}
