//! Harvestable entities and their sink-facing item form.

use std::fmt;

use serde::{Deserialize, Serialize};

use crate::error::{AppError, Result};
use crate::models::Element;

/// Kind of thing a concrete entity describes.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize, Default)]
#[serde(rename_all = "snake_case")]
pub enum Variant {
    Book,
    Collection,
    DataSet,
    Entity,
    File,
    #[default]
    Item,
    NewspaperPage,
    Paper,
    Unknown,
}

impl fmt::Display for Variant {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let name = match self {
            Variant::Book => "book",
            Variant::Collection => "collection",
            Variant::DataSet => "data set",
            Variant::Entity => "entity",
            Variant::File => "file",
            Variant::Item => "item",
            Variant::NewspaperPage => "newspaper page",
            Variant::Paper => "paper",
            Variant::Unknown => "unknown",
        };
        f.write_str(name)
    }
}

/// One harvestable unit pulled from a source.
#[derive(Debug, Clone)]
pub enum Entity {
    /// A fully materialized record, ready for ingestion.
    Concrete(ConcreteEntity),
    /// A record the source could not materialize; counted as a failure.
    Placeholder(PlaceholderEntity),
}

/// A fully materialized entity.
#[derive(Debug, Clone, PartialEq)]
pub struct ConcreteEntity {
    service_key: String,
    source_id: String,
    source_uri: String,
    sink_id: String,
    variant: Variant,
    media_type: Option<String>,
    access_image_uri: Option<String>,
    elements: Vec<Element>,
}

impl ConcreteEntity {
    /// Create an entity. The sink id defaults to the escaped
    /// `<service key>-<source id>`.
    pub fn new(
        service_key: impl Into<String>,
        source_id: impl Into<String>,
        source_uri: impl Into<String>,
        variant: Variant,
    ) -> Result<Self> {
        let service_key = non_empty("service key", service_key.into())?;
        let source_id = non_empty("source id", source_id.into())?;
        let source_uri = non_empty("source URI", source_uri.into())?;
        let sink_id = escape_sink_id(&format!("{service_key}-{source_id}"));
        Ok(Self {
            service_key,
            source_id,
            source_uri,
            sink_id,
            variant,
            media_type: None,
            access_image_uri: None,
            elements: Vec::new(),
        })
    }

    pub fn service_key(&self) -> &str {
        &self.service_key
    }

    pub fn source_id(&self) -> &str {
        &self.source_id
    }

    pub fn source_uri(&self) -> &str {
        &self.source_uri
    }

    pub fn sink_id(&self) -> &str {
        &self.sink_id
    }

    pub fn variant(&self) -> Variant {
        self.variant
    }

    pub fn media_type(&self) -> Option<&str> {
        self.media_type.as_deref()
    }

    pub fn access_image_uri(&self) -> Option<&str> {
        self.access_image_uri.as_deref()
    }

    pub fn elements(&self) -> &[Element] {
        &self.elements
    }

    pub fn set_service_key(&mut self, key: impl Into<String>) -> Result<()> {
        self.service_key = non_empty("service key", key.into())?;
        Ok(())
    }

    pub fn set_source_id(&mut self, id: impl Into<String>) -> Result<()> {
        self.source_id = non_empty("source id", id.into())?;
        Ok(())
    }

    pub fn set_source_uri(&mut self, uri: impl Into<String>) -> Result<()> {
        self.source_uri = non_empty("source URI", uri.into())?;
        Ok(())
    }

    /// Set the sink id. Characters illegal in sink URIs are escaped.
    pub fn set_sink_id(&mut self, id: impl Into<String>) -> Result<()> {
        let id = non_empty("sink id", id.into())?;
        self.sink_id = escape_sink_id(&id);
        Ok(())
    }

    pub fn set_variant(&mut self, variant: Variant) {
        self.variant = variant;
    }

    pub fn set_media_type(&mut self, media_type: Option<String>) {
        self.media_type = media_type;
    }

    pub fn set_access_image_uri(&mut self, uri: Option<String>) {
        self.access_image_uri = uri;
    }

    /// Add an element unless an equal one is already present.
    pub fn add_element(&mut self, element: Element) {
        if !self.elements.contains(&element) {
            self.elements.push(element);
        }
    }

    pub fn to_item(&self) -> Item {
        Item::from(self)
    }
}

/// A record that failed to materialize on the source side.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct PlaceholderEntity {
    pub source_id: String,
    pub source_uri: String,
}

impl PlaceholderEntity {
    pub fn new(source_id: impl Into<String>, source_uri: impl Into<String>) -> Self {
        Self {
            source_id: source_id.into(),
            source_uri: source_uri.into(),
        }
    }
}

/// Sink-facing shape of a concrete entity.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Item {
    pub id: String,
    pub service_key: String,
    pub source_uri: String,
    pub variant: Variant,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub media_type: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub access_image_uri: Option<String>,
    pub elements: Vec<Element>,
}

impl From<&ConcreteEntity> for Item {
    fn from(entity: &ConcreteEntity) -> Self {
        Self {
            id: entity.sink_id.clone(),
            service_key: entity.service_key.clone(),
            source_uri: entity.source_uri.clone(),
            variant: entity.variant,
            media_type: entity.media_type.clone(),
            access_image_uri: entity.access_image_uri.clone(),
            elements: entity.elements.clone(),
        }
    }
}

fn non_empty(what: &str, value: String) -> Result<String> {
    if value.trim().is_empty() {
        return Err(AppError::validation(format!("{what} must not be empty")));
    }
    Ok(value)
}

/// Percent-encode every byte outside `[A-Za-z0-9._~-]`.
pub fn escape_sink_id(id: &str) -> String {
    urlencoding::encode(id).into_owned()
}
