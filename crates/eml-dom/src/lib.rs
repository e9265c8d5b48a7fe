//! Load, inspect and write EML XML fragments as an owned element tree.
//!
//! Elements keep their attributes in order and their content as a sequence
//! of child elements, text, CDATA sections and comments, so mixed content
//! and whitespace survive a read and write. Processing instructions and the
//! document prolog are dropped on read.

mod node;
mod reader;
mod writer;

use thiserror::Error;

pub use node::{TagMatching, XmlContent, XmlNode};
pub use reader::parse_str;
pub use writer::{to_string, to_string_pretty};

#[derive(Debug, Error)]
pub enum XmlError {
    #[error("xml: {0}")]
    Xml(String),
    #[error("invalid document: {0}")]
    Invalid(String),
}
