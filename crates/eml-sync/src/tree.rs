use std::collections::{BTreeMap, HashSet};
use std::fmt;
use std::rc::Rc;

use eml_dom::XmlNode;
use serde::Serialize;
use tracing::{debug, trace, warn};

use crate::config::SyncConfig;
use crate::dirty::RootAggregate;
use crate::record::Record;
use crate::schema::EntityType;
use crate::update::{self, Serialized};
use crate::value::FieldValue;
use crate::SyncError;

/// Handle of an entity inside an [`EntityTree`].
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize)]
pub struct EntityId(u32);

impl EntityId {
    pub fn from_raw(raw: u32) -> Self {
        EntityId(raw)
    }

    pub fn raw(self) -> u32 {
        self.0
    }
}

impl fmt::Display for EntityId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "#{}", self.0)
    }
}

#[derive(Debug)]
struct EntityNode {
    record: Record,
    parent: Option<EntityId>,
    children: Vec<EntityId>,
}

/// Arena of the entities bound to one document.
///
/// Parents own their children through the arena; a child only names its
/// parent by id. Field changes walk those ids up to the top and mark the
/// shared [`RootAggregate`] dirty.
#[derive(Debug)]
pub struct EntityTree {
    pub(crate) config: SyncConfig,
    root: Rc<RootAggregate>,
    pub(crate) document: Option<XmlNode>,
    entities: BTreeMap<EntityId, EntityNode>,
    next_id: u32,
}

impl EntityTree {
    pub fn new(root: Rc<RootAggregate>) -> Self {
        Self::with_config(root, SyncConfig::default())
    }

    pub fn with_config(root: Rc<RootAggregate>, config: SyncConfig) -> Self {
        EntityTree {
            config,
            root,
            document: None,
            entities: BTreeMap::new(),
            next_id: 0,
        }
    }

    pub fn config(&self) -> &SyncConfig {
        &self.config
    }

    pub fn root(&self) -> &Rc<RootAggregate> {
        &self.root
    }

    /// Raw document searched when a reference names no live entity.
    pub fn set_document(&mut self, document: XmlNode) {
        self.document = Some(document);
    }

    pub fn document(&self) -> Option<&XmlNode> {
        self.document.as_ref()
    }

    /// Add `record` under `parent` (or at the top). Attaching is not a
    /// change to the document and leaves the dirty flag alone.
    pub fn attach(
        &mut self,
        parent: Option<EntityId>,
        record: Record,
    ) -> Result<EntityId, SyncError> {
        if let Some(parent) = parent {
            if !self.entities.contains_key(&parent) {
                return Err(SyncError::EntityNotFound(parent));
            }
        }
        let id = EntityId(self.next_id);
        self.next_id += 1;
        trace!(entity = %id, kind = %record.entity_type(), "attached");
        self.entities.insert(
            id,
            EntityNode {
                record,
                parent,
                children: Vec::new(),
            },
        );
        if let Some(parent) = parent.and_then(|parent| self.entities.get_mut(&parent)) {
            parent.children.push(id);
        }
        Ok(id)
    }

    pub fn get(&self, id: EntityId) -> Option<&Record> {
        self.entities.get(&id).map(|node| &node.record)
    }

    pub fn record(&self, id: EntityId) -> Result<&Record, SyncError> {
        self.get(id).ok_or(SyncError::EntityNotFound(id))
    }

    pub fn parent(&self, id: EntityId) -> Option<EntityId> {
        self.entities.get(&id).and_then(|node| node.parent)
    }

    pub fn children(&self, id: EntityId) -> &[EntityId] {
        self.entities
            .get(&id)
            .map(|node| node.children.as_slice())
            .unwrap_or(&[])
    }

    pub fn contains(&self, id: EntityId) -> bool {
        self.entities.contains_key(&id)
    }

    pub fn len(&self) -> usize {
        self.entities.len()
    }

    pub fn is_empty(&self) -> bool {
        self.entities.is_empty()
    }

    pub fn ids(&self) -> impl Iterator<Item = EntityId> + '_ {
        self.entities.keys().copied()
    }

    /// Entities of one type, in attachment order.
    pub fn of_type(&self, ty: EntityType) -> impl Iterator<Item = (EntityId, &Record)> + '_ {
        self.entities
            .iter()
            .filter(move |(_, node)| node.record.entity_type() == ty)
            .map(|(id, node)| (*id, &node.record))
    }

    /// Set a field through a dotted path and report the change upward.
    pub fn set_field(
        &mut self,
        id: EntityId,
        path: &str,
        value: impl Into<FieldValue>,
    ) -> Result<bool, SyncError> {
        let node = self
            .entities
            .get_mut(&id)
            .ok_or(SyncError::EntityNotFound(id))?;
        let changed = node.record.set(path, value)?;
        if changed {
            debug!(entity = %id, field = path, "field changed");
            self.notify_change(id);
        }
        Ok(changed)
    }

    /// Swap the record of an entity, e.g. after switching its variant.
    pub fn replace(&mut self, id: EntityId, record: Record) -> Result<Record, SyncError> {
        let node = self
            .entities
            .get_mut(&id)
            .ok_or(SyncError::EntityNotFound(id))?;
        let previous = std::mem::replace(&mut node.record, record);
        if previous != node.record {
            self.notify_change(id);
        }
        Ok(previous)
    }

    /// Detach an entity and its descendants.
    ///
    /// The entity's source subtree is dropped from its ancestors' cached
    /// sources and from the document, so references to it stop resolving.
    pub fn remove(&mut self, id: EntityId) -> Result<Record, SyncError> {
        let node = self
            .entities
            .remove(&id)
            .ok_or(SyncError::EntityNotFound(id))?;
        for child in &node.children {
            self.drop_subtree(*child);
        }
        if let Some(parent) = node.parent.and_then(|parent| self.entities.get_mut(&parent)) {
            parent.children.retain(|child| *child != id);
        }
        if let Some(source) = node.record.source() {
            let mut cursor = node.parent;
            while let Some(ancestor) = cursor {
                let Some(entry) = self.entities.get_mut(&ancestor) else {
                    break;
                };
                if let Some(ancestor_source) = entry.record.source_mut() {
                    ancestor_source.remove_descendant(source);
                }
                cursor = entry.parent;
            }
            if let Some(document) = self.document.as_mut() {
                if document.remove_descendant(source) {
                    trace!(entity = %id, "removed source from document");
                }
            }
        }
        debug!(entity = %id, kind = %node.record.entity_type(), "entity removed");
        match node.parent {
            Some(parent) => self.notify_change(parent),
            None => {
                self.root.mark_dirty();
            }
        }
        Ok(node.record)
    }

    /// Write one entity back from its current fields.
    pub fn update(&self, id: EntityId) -> Result<Serialized, SyncError> {
        self.record(id)?.update(&self.config)
    }

    /// Rebase every entity on its written-back subtree and clear the dirty
    /// flag. Nothing is rebased if any entity fails to serialize.
    ///
    /// Entities are written deepest first. Each output replaces the old
    /// subtree inside every ancestor's source and the document, so later
    /// removals still find it there.
    pub fn mark_saved(&mut self) -> Result<(), SyncError> {
        let mut sources: BTreeMap<EntityId, Option<XmlNode>> = self
            .entities
            .iter()
            .map(|(id, node)| (*id, node.record.source().cloned()))
            .collect();
        let mut document = self.document.clone();
        for id in self.post_order() {
            let Some(node) = self.entities.get(&id) else {
                continue;
            };
            let previous = sources.get(&id).cloned().flatten();
            let written = match update::update_fields(
                node.record.schema(),
                node.record.fields(),
                previous.as_ref(),
                &self.config,
                node.record.entity_type().name(),
            )? {
                Serialized::Node(written) => Some(written),
                Serialized::Omit => None,
            };
            let changed = previous
                .as_ref()
                .filter(|old| Some(*old) != written.as_ref());
            if let Some(previous) = changed {
                let mut cursor = node.parent;
                while let Some(ancestor) = cursor {
                    if let Some(Some(source)) = sources.get_mut(&ancestor) {
                        source.replace_descendant(previous, written.clone());
                    }
                    cursor = self.parent(ancestor);
                }
                match document.as_mut() {
                    Some(document) if *document == *previous => {
                        if let Some(written) = written.as_ref() {
                            *document = written.clone();
                        }
                    }
                    Some(document) => {
                        if document.replace_descendant(previous, written.clone()) {
                            trace!(entity = %id, "document updated from saved entity");
                        }
                    }
                    None => {}
                }
            }
            sources.insert(id, written);
        }
        for (id, source) in sources {
            if let Some(node) = self.entities.get_mut(&id) {
                node.record.rebase(source);
            }
        }
        self.document = document;
        self.root.reset();
        Ok(())
    }

    /// Every entity with its descendants listed before it.
    fn post_order(&self) -> Vec<EntityId> {
        fn visit(
            tree: &EntityTree,
            id: EntityId,
            seen: &mut HashSet<EntityId>,
            out: &mut Vec<EntityId>,
        ) {
            if !seen.insert(id) {
                return;
            }
            for child in tree.children(id) {
                visit(tree, *child, seen, out);
            }
            out.push(id);
        }
        let mut seen = HashSet::new();
        let mut out = Vec::with_capacity(self.entities.len());
        for (id, node) in &self.entities {
            if node.parent.is_none() {
                visit(self, *id, &mut seen, &mut out);
            }
        }
        out
    }

    fn drop_subtree(&mut self, id: EntityId) {
        if let Some(node) = self.entities.remove(&id) {
            for child in node.children {
                self.drop_subtree(child);
            }
        }
    }

    /// Forward a change from `id` through its ancestors to the root.
    fn notify_change(&self, id: EntityId) {
        let mut visited = HashSet::new();
        let mut cursor = id;
        while visited.insert(cursor) {
            match self.parent(cursor) {
                Some(parent) => {
                    trace!(from = %cursor, to = %parent, "forwarding change");
                    cursor = parent;
                }
                None => {
                    if self.root.mark_dirty() {
                        debug!(entity = %id, "document now has unsaved changes");
                    }
                    return;
                }
            }
        }
        warn!(entity = %id, "parent links form a cycle");
        self.root.mark_dirty();
    }
}
