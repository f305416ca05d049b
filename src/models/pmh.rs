//! Metadata-only entities produced by the OAI-PMH harvester.

use crate::models::Element;

/// One `<record>` from a `ListRecords` response.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct PmhRecord {
    pub identifier: String,
    pub datestamp: String,
    pub set_spec: Option<String>,
    /// `<header status="deleted">`; such records carry no metadata.
    pub deleted: bool,
    pub elements: Vec<Element>,
}

/// One `<set>` from a `ListSets` response.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct PmhSet {
    pub spec: String,
    pub name: String,
    pub elements: Vec<Element>,
}
