use std::borrow::Cow;

use serde::{Deserialize, Serialize};

/// How element and attribute names are compared during lookups.
///
/// Some upstream producers run EML through an HTML parser that lower-cases
/// every tag, so lookups default to ASCII case-insensitive matching.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum TagMatching {
    /// Compare names byte for byte.
    Exact,
    /// Compare names ignoring ASCII case.
    #[default]
    CaseInsensitive,
}

impl TagMatching {
    /// Compare two names under this matching mode.
    pub fn matches(self, left: &str, right: &str) -> bool {
        match self {
            TagMatching::Exact => left == right,
            TagMatching::CaseInsensitive => left.eq_ignore_ascii_case(right),
        }
    }
}

/// One item of an element's content, in document order.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum XmlContent {
    Element(XmlNode),
    /// Character data, unescaped and untrimmed.
    Text(String),
    CData(String),
    Comment(String),
}

impl XmlContent {
    pub fn as_element(&self) -> Option<&XmlNode> {
        match self {
            XmlContent::Element(node) => Some(node),
            _ => None,
        }
    }

    pub fn as_element_mut(&mut self) -> Option<&mut XmlNode> {
        match self {
            XmlContent::Element(node) => Some(node),
            _ => None,
        }
    }

    /// Character data of a text or CDATA item.
    pub fn as_text(&self) -> Option<&str> {
        match self {
            XmlContent::Text(text) | XmlContent::CData(text) => Some(text),
            _ => None,
        }
    }

    /// True for a text item holding only whitespace (indentation).
    pub fn is_whitespace(&self) -> bool {
        matches!(self, XmlContent::Text(text) if text.trim().is_empty())
    }
}

/// An XML element with its attributes and mixed content.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct XmlNode {
    /// Qualified element name as it appeared in the source (`prefix:local`).
    pub name: String,
    /// Attributes in document order.
    pub attributes: Vec<(String, String)>,
    /// Child elements, text, CDATA sections and comments in document order.
    pub content: Vec<XmlContent>,
}

impl XmlNode {
    /// Create an element with no attributes or content.
    pub fn new(name: impl Into<String>) -> Self {
        XmlNode {
            name: name.into(),
            ..XmlNode::default()
        }
    }

    /// Create a leaf element holding `text`.
    pub fn with_text(name: impl Into<String>, text: impl Into<String>) -> Self {
        XmlNode::new(name).push(XmlContent::Text(text.into()))
    }

    /// Builder-style attribute setter.
    pub fn attr(mut self, name: impl Into<String>, value: impl Into<String>) -> Self {
        self.attributes.push((name.into(), value.into()));
        self
    }

    /// Builder-style child append.
    pub fn child_node(self, child: XmlNode) -> Self {
        self.push(XmlContent::Element(child))
    }

    /// Builder-style content append.
    pub fn push(mut self, item: XmlContent) -> Self {
        self.content.push(item);
        self
    }

    /// Element name without its namespace prefix.
    pub fn local_name(&self) -> &str {
        local_part(&self.name)
    }

    /// Whether this element's local name equals `name` under `mode`.
    pub fn is_named(&self, name: &str, mode: TagMatching) -> bool {
        mode.matches(self.local_name(), local_part(name))
    }

    /// Child elements in document order.
    pub fn elements(&self) -> impl Iterator<Item = &XmlNode> {
        self.content.iter().filter_map(XmlContent::as_element)
    }

    pub fn elements_mut(&mut self) -> impl Iterator<Item = &mut XmlNode> {
        self.content.iter_mut().filter_map(XmlContent::as_element_mut)
    }

    /// Character data directly inside this element, text and CDATA joined.
    pub fn text(&self) -> Cow<'_, str> {
        let mut chunks = self.content.iter().filter_map(XmlContent::as_text);
        let Some(first) = chunks.next() else {
            return Cow::Borrowed("");
        };
        match chunks.next() {
            None => Cow::Borrowed(first),
            Some(second) => {
                let mut joined = format!("{first}{second}");
                chunks.for_each(|chunk| joined.push_str(chunk));
                Cow::Owned(joined)
            }
        }
    }

    /// Replace the element's character data with a single text item where
    /// the first one stood. Child elements and comments keep their places.
    pub fn set_text(&mut self, text: Option<String>) {
        let first = self
            .content
            .iter()
            .position(|item| item.as_text().is_some());
        self.content.retain(|item| item.as_text().is_none());
        if let Some(text) = text {
            let index = first.unwrap_or(0).min(self.content.len());
            self.content.insert(index, XmlContent::Text(text));
        }
    }

    /// Look up an attribute value.
    pub fn attribute(&self, name: &str, mode: TagMatching) -> Option<&str> {
        self.attributes
            .iter()
            .find(|(key, _)| mode.matches(key, name))
            .map(|(_, value)| value.as_str())
    }

    /// Set an attribute, replacing an existing value in place so attribute
    /// order is stable across updates.
    pub fn set_attribute(&mut self, name: &str, value: impl Into<String>, mode: TagMatching) {
        let value = value.into();
        match self.attributes.iter_mut().find(|(key, _)| mode.matches(key, name)) {
            Some(slot) => {
                slot.0 = name.to_string();
                slot.1 = value;
            }
            None => self.attributes.push((name.to_string(), value)),
        }
    }

    /// Remove an attribute, returning its former value.
    pub fn remove_attribute(&mut self, name: &str, mode: TagMatching) -> Option<String> {
        let position = self
            .attributes
            .iter()
            .position(|(key, _)| mode.matches(key, name))?;
        Some(self.attributes.remove(position).1)
    }

    /// First child element with the given name.
    pub fn child(&self, name: &str, mode: TagMatching) -> Option<&XmlNode> {
        self.elements().find(|child| child.is_named(name, mode))
    }

    pub fn child_mut(&mut self, name: &str, mode: TagMatching) -> Option<&mut XmlNode> {
        self.elements_mut().find(|child| child.is_named(name, mode))
    }

    /// Content index of the first child element with the given name.
    pub fn child_position(&self, name: &str, mode: TagMatching) -> Option<usize> {
        self.content
            .iter()
            .position(|item| is_element_named(item, name, mode))
    }

    /// Content index of the last child element with the given name.
    pub fn last_child_position(&self, name: &str, mode: TagMatching) -> Option<usize> {
        self.content
            .iter()
            .rposition(|item| is_element_named(item, name, mode))
    }

    /// All child elements with the given name, in document order.
    pub fn children_named<'a>(
        &'a self,
        name: &'a str,
        mode: TagMatching,
    ) -> impl Iterator<Item = &'a XmlNode> + 'a {
        self.elements().filter(move |child| child.is_named(name, mode))
    }

    /// Child element at a content index.
    pub fn element_at(&self, index: usize) -> Option<&XmlNode> {
        self.content.get(index).and_then(XmlContent::as_element)
    }

    /// Replace the content item at `index` with `child`.
    pub fn replace_at(&mut self, index: usize, child: XmlNode) {
        if let Some(slot) = self.content.get_mut(index) {
            *slot = XmlContent::Element(child);
        }
    }

    pub fn remove_at(&mut self, index: usize) -> Option<XmlContent> {
        (index < self.content.len()).then(|| self.content.remove(index))
    }

    /// Remove every child element with the given name. Returns how many were
    /// removed.
    pub fn remove_children(&mut self, name: &str, mode: TagMatching) -> usize {
        let before = self.content.len();
        self.content
            .retain(|item| !is_element_named(item, name, mode));
        before - self.content.len()
    }

    /// Insert a child element at content index `index`, clamped to the
    /// current content length.
    pub fn insert_child(&mut self, index: usize, child: XmlNode) {
        let index = index.min(self.content.len());
        self.content.insert(index, XmlContent::Element(child));
    }

    /// True when the element carries no attributes and no content beyond
    /// whitespace.
    pub fn is_blank(&self) -> bool {
        self.attributes.is_empty() && self.content.iter().all(XmlContent::is_whitespace)
    }

    /// Depth-first search (this element included) for an element whose `id`
    /// attribute equals `id`.
    pub fn find_by_id(&self, id: &str) -> Option<&XmlNode> {
        if self
            .attributes
            .iter()
            .any(|(key, value)| key == "id" && value == id)
        {
            return Some(self);
        }
        self.elements().find_map(|child| child.find_by_id(id))
    }

    /// Depth-first search (this element included) for the first element
    /// satisfying `predicate`.
    pub fn find(&self, predicate: &dyn Fn(&XmlNode) -> bool) -> Option<&XmlNode> {
        if predicate(self) {
            return Some(self);
        }
        self.elements().find_map(|child| child.find(predicate))
    }

    /// Remove the first descendant structurally equal to `target`.
    pub fn remove_descendant(&mut self, target: &XmlNode) -> bool {
        self.replace_descendant(target, None)
    }

    /// Swap the first descendant structurally equal to `target` for
    /// `replacement`, or drop it when there is none.
    pub fn replace_descendant(&mut self, target: &XmlNode, replacement: Option<XmlNode>) -> bool {
        let mut replacement = replacement;
        self.splice_descendant(target, &mut replacement)
    }

    fn splice_descendant(&mut self, target: &XmlNode, replacement: &mut Option<XmlNode>) -> bool {
        if let Some(index) = self
            .content
            .iter()
            .position(|item| item.as_element() == Some(target))
        {
            match replacement.take() {
                Some(node) => self.content[index] = XmlContent::Element(node),
                None => {
                    self.content.remove(index);
                }
            }
            return true;
        }
        self.elements_mut()
            .any(|child| child.splice_descendant(target, replacement))
    }
}

fn is_element_named(item: &XmlContent, name: &str, mode: TagMatching) -> bool {
    item.as_element()
        .is_some_and(|child| child.is_named(name, mode))
}

fn local_part(name: &str) -> &str {
    match name.rsplit_once(':') {
        Some((_, local)) => local,
        None => name,
    }
}
