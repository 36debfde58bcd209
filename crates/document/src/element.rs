//! Owned element tree: the normalized in-memory form every document format
//! reduces to before the patch model is built.

use serde::{Deserialize, Serialize};
use std::collections::HashMap;

/// One element: tag, attribute map, ordered children and text content.
///
/// Attribute keys are case-sensitive and unique; child order is significant.
/// `Clone` produces the deep copy multi-id expansion relies on.
#[derive(Clone, Debug, Default, PartialEq, Serialize, Deserialize)]
pub struct Element {
    /// Tag name.
    pub tag: String,
    /// Attribute values by name.
    pub attributes: HashMap<String, String>,
    /// Nested elements in document order.
    pub children: Vec<Element>,
    /// Concatenated own text content, untrimmed.
    pub text: String,
}

impl Element {
    pub fn new(tag: impl Into<String>) -> Self {
        Self {
            tag: tag.into(),
            ..Self::default()
        }
    }

    /// Attribute lookup.
    pub fn attr(&self, name: &str) -> Option<&str> {
        self.attributes.get(name).map(String::as_str)
    }

    /// Sets or replaces an attribute.
    pub fn set_attr(&mut self, name: &str, value: &str) {
        self.attributes
            .insert(name.to_string(), value.to_string());
    }

    /// Own text with surrounding whitespace removed.
    pub fn trimmed_text(&self) -> &str {
        self.text.trim()
    }

    /// True when the element has no child elements.
    pub fn is_leaf(&self) -> bool {
        self.children.is_empty()
    }
}
