//! Strategies turning metadata XML nodes into elements.

use crate::models::Element;

/// A leaf element inside a record's `<metadata>` or a set's
/// `<setDescription>`.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct XmlNode {
    /// Qualified name as written, e.g. `dc:title`
    pub name: String,
    /// Name without prefix, e.g. `title`
    pub local_name: String,
    /// Attributes by local name, in document order
    pub attributes: Vec<(String, String)>,
    /// Unescaped text content
    pub text: String,
}

impl XmlNode {
    pub fn attribute(&self, local_name: &str) -> Option<&str> {
        self.attributes
            .iter()
            .find(|(name, _)| name == local_name)
            .map(|(_, value)| value.as_str())
    }
}

/// Converts metadata nodes into elements. Returning `None` drops the node.
pub trait ElementTransformer: Send + Sync {
    fn transform(&self, node: &XmlNode) -> Option<Element>;
}

/// Element name plus trimmed text content, e.g. `dc:title: Maps`.
/// Nodes without text are dropped.
#[derive(Debug, Clone, Copy, Default)]
pub struct NameValueTransformer;

impl ElementTransformer for NameValueTransformer {
    fn transform(&self, node: &XmlNode) -> Option<Element> {
        let value = node.text.trim();
        if value.is_empty() {
            return None;
        }
        Some(Element::new(node.name.clone(), value))
    }
}

/// Builds the element name from attributes of the node itself, as in
/// DSpace's `dim` format:
///
/// ```xml
/// <dim:field mdschema="dc" element="title" qualifier="alternative">...</dim:field>
/// ```
///
/// becomes `dc:title:alternative`. Nodes missing the element attribute fall
/// back to [`NameValueTransformer`].
#[derive(Debug, Clone)]
pub struct QualifiedNameTransformer {
    schema_attribute: String,
    element_attribute: String,
    qualifier_attribute: String,
}

impl QualifiedNameTransformer {
    pub fn new(
        schema_attribute: impl Into<String>,
        element_attribute: impl Into<String>,
        qualifier_attribute: impl Into<String>,
    ) -> Self {
        Self {
            schema_attribute: schema_attribute.into(),
            element_attribute: element_attribute.into(),
            qualifier_attribute: qualifier_attribute.into(),
        }
    }
}

impl Default for QualifiedNameTransformer {
    fn default() -> Self {
        Self::new("mdschema", "element", "qualifier")
    }
}

impl ElementTransformer for QualifiedNameTransformer {
    fn transform(&self, node: &XmlNode) -> Option<Element> {
        let Some(element) = node.attribute(&self.element_attribute) else {
            return NameValueTransformer.transform(node);
        };
        let value = node.text.trim();
        if value.is_empty() {
            return None;
        }

        let mut name = match node.attribute(&self.schema_attribute) {
            Some(schema) if !schema.is_empty() => format!("{schema}:{element}"),
            _ => element.to_string(),
        };
        if let Some(qualifier) = node.attribute(&self.qualifier_attribute) {
            if !qualifier.is_empty() {
                name.push(':');
                name.push_str(qualifier);
            }
        }
        Some(Element::new(name, value))
    }
}
