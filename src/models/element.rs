//! Metadata element.

use std::fmt;
use std::hash::{Hash, Hasher};

use serde::{Deserialize, Serialize};

/// An immutable name/value metadata pair.
///
/// Two elements are equal when their `"name: value"` forms are equal. Names
/// are not unique within an entity; a record may carry several `dc:subject`
/// elements, for example.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Element {
    name: String,
    value: String,
}

impl Element {
    pub fn new(name: impl Into<String>, value: impl Into<String>) -> Self {
        Self {
            name: name.into(),
            value: value.into(),
        }
    }

    pub fn name(&self) -> &str {
        &self.name
    }

    pub fn value(&self) -> &str {
        &self.value
    }
}

impl fmt::Display for Element {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}: {}", self.name, self.value)
    }
}

impl PartialEq for Element {
    fn eq(&self, other: &Self) -> bool {
        self.to_string() == other.to_string()
    }
}

impl Eq for Element {}

impl Hash for Element {
    fn hash<H: Hasher>(&self, state: &mut H) {
        self.to_string().hash(state);
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_equality_by_string_form() {
        assert_eq!(Element::new("dc:title", "Maps"), Element::new("dc:title", "Maps"));
        assert_ne!(Element::new("dc:title", "Maps"), Element::new("dc:title", "maps"));
        // Only the rendered form matters.
        assert_eq!(Element::new("a: b", "c"), Element::new("a", "b: c"));
    }

    #[test]
    fn test_display() {
        assert_eq!(Element::new("dc:creator", "Smith").to_string(), "dc:creator: Smith");
    }
}
