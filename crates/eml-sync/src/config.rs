use eml_dom::TagMatching;
use serde::{Deserialize, Serialize};

/// Options shared by parsing and write-back.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct SyncConfig {
    /// How element and attribute names are matched against schema tags.
    pub tag_matching: TagMatching,
    /// Restore the canonical spelling of known tags on write-back when
    /// matching ignores case.
    pub canonicalize_tags: bool,
}

impl Default for SyncConfig {
    fn default() -> Self {
        SyncConfig {
            tag_matching: TagMatching::CaseInsensitive,
            canonicalize_tags: true,
        }
    }
}

impl SyncConfig {
    /// Configuration for input from a conformant XML parser.
    pub fn exact() -> Self {
        SyncConfig {
            tag_matching: TagMatching::Exact,
            canonicalize_tags: false,
        }
    }

    pub(crate) fn canonicalizes(&self) -> bool {
        self.canonicalize_tags && self.tag_matching == TagMatching::CaseInsensitive
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn partial_config_keeps_defaults() {
        let config: SyncConfig =
            serde_json::from_str(r#"{"tag_matching":"exact"}"#).expect("config");
        assert_eq!(config.tag_matching, TagMatching::Exact);
        assert!(config.canonicalize_tags);
        assert!(!config.canonicalizes());
        assert!(SyncConfig::default().canonicalizes());
    }
}
