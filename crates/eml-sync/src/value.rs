use std::collections::BTreeMap;
use std::fmt;

use serde::{Deserialize, Serialize};

use crate::SyncError;

/// A field value: text, an ordered list, or a nested field map.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(untagged)]
pub enum FieldValue {
    Text(String),
    List(Vec<FieldValue>),
    Map(FieldMap),
}

impl FieldValue {
    /// True for blank text, and for lists and maps holding only empty values.
    pub fn is_empty(&self) -> bool {
        match self {
            FieldValue::Text(text) => text.trim().is_empty(),
            FieldValue::List(items) => items.iter().all(FieldValue::is_empty),
            FieldValue::Map(map) => map.is_empty(),
        }
    }

    pub fn as_text(&self) -> Option<&str> {
        match self {
            FieldValue::Text(text) => Some(text),
            _ => None,
        }
    }

    pub fn as_list(&self) -> Option<&[FieldValue]> {
        match self {
            FieldValue::List(items) => Some(items),
            _ => None,
        }
    }

    pub fn as_map(&self) -> Option<&FieldMap> {
        match self {
            FieldValue::Map(map) => Some(map),
            _ => None,
        }
    }

    /// Short name of the value's shape, used in error messages.
    pub fn shape(&self) -> &'static str {
        match self {
            FieldValue::Text(_) => "text",
            FieldValue::List(_) => "list",
            FieldValue::Map(_) => "map",
        }
    }
}

impl From<&str> for FieldValue {
    fn from(value: &str) -> Self {
        FieldValue::Text(value.to_string())
    }
}

impl From<String> for FieldValue {
    fn from(value: String) -> Self {
        FieldValue::Text(value)
    }
}

impl From<FieldMap> for FieldValue {
    fn from(value: FieldMap) -> Self {
        FieldValue::Map(value)
    }
}

impl From<Vec<FieldValue>> for FieldValue {
    fn from(value: Vec<FieldValue>) -> Self {
        FieldValue::List(value)
    }
}

impl From<Vec<&str>> for FieldValue {
    fn from(value: Vec<&str>) -> Self {
        FieldValue::List(value.into_iter().map(FieldValue::from).collect())
    }
}

impl fmt::Display for FieldValue {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            FieldValue::Text(text) => f.write_str(text),
            FieldValue::List(items) => {
                f.write_str("[")?;
                for (index, item) in items.iter().enumerate() {
                    if index > 0 {
                        f.write_str(", ")?;
                    }
                    write!(f, "{item}")?;
                }
                f.write_str("]")
            }
            FieldValue::Map(map) => write!(f, "{{{} fields}}", map.len()),
        }
    }
}

/// Field name to value, ordered by name.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(transparent)]
pub struct FieldMap(BTreeMap<String, FieldValue>);

impl FieldMap {
    pub fn new() -> Self {
        Self::default()
    }

    /// Builder-style insert.
    pub fn with(mut self, name: &str, value: impl Into<FieldValue>) -> Self {
        self.insert(name, value);
        self
    }

    pub fn get(&self, name: &str) -> Option<&FieldValue> {
        self.0.get(name)
    }

    /// Text value of a top-level field.
    pub fn text(&self, name: &str) -> Option<&str> {
        self.get(name).and_then(FieldValue::as_text)
    }

    pub fn insert(&mut self, name: &str, value: impl Into<FieldValue>) -> Option<FieldValue> {
        self.0.insert(name.to_string(), value.into())
    }

    pub fn remove(&mut self, name: &str) -> Option<FieldValue> {
        self.0.remove(name)
    }

    pub fn iter(&self) -> impl Iterator<Item = (&str, &FieldValue)> {
        self.0.iter().map(|(name, value)| (name.as_str(), value))
    }

    /// Number of stored entries, empty ones included.
    pub fn len(&self) -> usize {
        self.0.len()
    }

    /// True when no stored value has content.
    pub fn is_empty(&self) -> bool {
        self.0.values().all(FieldValue::is_empty)
    }

    /// Follow a dotted path such as `dateTimeDomain.bounds.0.minimum`.
    /// Numeric segments index into lists.
    pub fn get_path(&self, path: &str) -> Option<&FieldValue> {
        let mut segments = path.split('.');
        let mut current = self.get(segments.next()?)?;
        for segment in segments {
            current = match current {
                FieldValue::Map(map) => map.get(segment)?,
                FieldValue::List(items) => items.get(segment.parse::<usize>().ok()?)?,
                FieldValue::Text(_) => return None,
            };
        }
        Some(current)
    }

    /// Assign the value at a dotted path, creating intermediate maps and
    /// lists as needed. A list index equal to the list length appends.
    /// Returns whether the stored value changed.
    pub fn set_path(&mut self, path: &str, value: FieldValue) -> Result<bool, SyncError> {
        let segments: Vec<&str> = path.split('.').collect();
        if segments.iter().any(|segment| segment.is_empty()) {
            return Err(invalid_path(path, "empty path segment"));
        }
        set_in_map(self, &segments, value, path)
    }
}

fn set_in_map(
    map: &mut FieldMap,
    segments: &[&str],
    value: FieldValue,
    path: &str,
) -> Result<bool, SyncError> {
    let Some((head, rest)) = segments.split_first() else {
        return Err(invalid_path(path, "empty path"));
    };
    if rest.is_empty() {
        return Ok(match map.0.get_mut(*head) {
            Some(current) => replace_if_changed(current, value),
            None if value.is_empty() => false,
            None => {
                map.0.insert(head.to_string(), value);
                true
            }
        });
    }
    let slot = map
        .0
        .entry(head.to_string())
        .or_insert_with(|| container_for(rest[0]));
    set_in_value(slot, rest, value, path)
}

fn set_in_value(
    slot: &mut FieldValue,
    segments: &[&str],
    value: FieldValue,
    path: &str,
) -> Result<bool, SyncError> {
    match slot {
        FieldValue::Map(map) => set_in_map(map, segments, value, path),
        FieldValue::List(items) => {
            let Some((head, rest)) = segments.split_first() else {
                return Err(invalid_path(path, "empty path"));
            };
            let index: usize = head
                .parse()
                .map_err(|_| invalid_path(path, &format!("`{head}` is not a list index")))?;
            if index > items.len() {
                return Err(invalid_path(
                    path,
                    &format!("index {index} is past the end of a list of {}", items.len()),
                ));
            }
            if rest.is_empty() {
                return Ok(match items.get_mut(index) {
                    Some(current) => replace_if_changed(current, value),
                    None if value.is_empty() => false,
                    None => {
                        items.push(value);
                        true
                    }
                });
            }
            if index == items.len() {
                items.push(container_for(rest[0]));
            }
            set_in_value(&mut items[index], rest, value, path)
        }
        FieldValue::Text(_) => Err(invalid_path(path, "cannot descend into a text value")),
    }
}

fn replace_if_changed(current: &mut FieldValue, value: FieldValue) -> bool {
    if *current == value {
        return false;
    }
    *current = value;
    true
}

fn container_for(next_segment: &str) -> FieldValue {
    if next_segment.parse::<usize>().is_ok() {
        FieldValue::List(Vec::new())
    } else {
        FieldValue::Map(FieldMap::new())
    }
}

fn invalid_path(path: &str, reason: &str) -> SyncError {
    SyncError::InvalidPath {
        path: path.to_string(),
        reason: reason.to_string(),
    }
}
