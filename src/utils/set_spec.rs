//! Mapping of OAI-PMH `setSpec` values onto repository handles.
//!
//! DSpace-style repositories name their sets after the handle of the
//! community (`com_`) or collection (`col_`) they expose, with the handle's
//! slash replaced by an underscore: `col_2142_5130` is handle `2142/5130`.
//! The prefix segment may be dotted, as in `col_10111.1_42`.

use std::sync::LazyLock;

use regex::Regex;

static SET_SPEC_PATTERN: LazyLock<Regex> =
    LazyLock::new(|| Regex::new(r"^(?:com|col)_(\d+(?:\.\d+)*)_(\d+)$").unwrap());

/// Fail-soft matcher from set specs to handles and URIs.
#[derive(Debug, Clone, Default)]
pub struct SetSpecMatcher {
    uri_template: Option<String>,
}

impl SetSpecMatcher {
    /// Create a matcher. `uri_template` may contain a `{handle}` placeholder.
    pub fn new(uri_template: Option<String>) -> Self {
        Self { uri_template }
    }

    /// The handle a set spec refers to, or `None` if it is not recognized.
    pub fn handle(&self, spec: &str) -> Option<String> {
        match SET_SPEC_PATTERN.captures(spec) {
            Some(caps) => Some(format!("{}/{}", &caps[1], &caps[2])),
            None => {
                log::debug!("Unrecognized setSpec: {}", spec);
                None
            }
        }
    }

    /// The URI a set spec refers to, if recognized and a template is set.
    pub fn uri(&self, spec: &str) -> Option<String> {
        let template = self.uri_template.as_ref()?;
        let handle = self.handle(spec)?;
        Some(template.replace("{handle}", &handle))
    }
}
