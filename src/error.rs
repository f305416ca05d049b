// src/error.rs

//! Unified error handling for the harvester.

use std::fmt;

use thiserror::Error;

/// Result type alias for harvester operations.
pub type Result<T> = std::result::Result<T, AppError>;

/// Unified application error type.
#[derive(Error, Debug)]
pub enum AppError {
    /// I/O operation failed
    #[error("I/O error: {0}")]
    Io(#[from] std::io::Error),

    /// HTTP request could not be sent or its body could not be read
    #[error("HTTP error: {0}")]
    Http(#[from] reqwest::Error),

    /// Remote service answered with an unexpected status
    #[error("{0}")]
    Transport(#[from] TransportError),

    /// JSON serialization/deserialization failed
    #[error("JSON error: {0}")]
    Json(#[from] serde_json::Error),

    /// TOML parsing failed
    #[error("TOML parse error: {0}")]
    Toml(#[from] toml::de::Error),

    /// URL parsing failed
    #[error("URL parse error: {0}")]
    Url(#[from] url::ParseError),

    /// XML document could not be read
    #[error("XML error: {0}")]
    Xml(#[from] quick_xml::Error),

    /// OAI-PMH `<error>` element in a response
    #[error("OAI-PMH error [{code}]: {message}")]
    Pmh { code: String, message: String },

    /// Configuration error
    #[error("Configuration error: {0}")]
    Config(String),

    /// Data validation error
    #[error("Validation error: {0}")]
    Validation(String),

    /// Operation not supported by a service
    #[error("Unsupported operation: {0}")]
    Unsupported(String),
}

impl AppError {
    /// Create a configuration error.
    pub fn config(message: impl Into<String>) -> Self {
        Self::Config(message.into())
    }

    /// Create a validation error.
    pub fn validation(message: impl Into<String>) -> Self {
        Self::Validation(message.into())
    }

    /// Create an unsupported-operation error.
    pub fn unsupported(message: impl Into<String>) -> Self {
        Self::Unsupported(message.into())
    }

    /// Create a protocol error from an OAI-PMH error code and message.
    pub fn pmh(code: impl Into<String>, message: impl fmt::Display) -> Self {
        Self::Pmh {
            code: code.into(),
            message: message.to_string(),
        }
    }
}

/// A failed exchange with a remote service.
///
/// Carries everything needed to diagnose the failure from a log line alone.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct TransportError {
    pub method: String,
    pub uri: String,
    pub status: Option<u16>,
    pub request_body: Option<String>,
    pub response_body: Option<String>,
}

impl fmt::Display for TransportError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{} {}", self.method, self.uri)?;
        match self.status {
            Some(status) => write!(f, " returned HTTP {status}")?,
            None => write!(f, " failed")?,
        }
        if let Some(body) = &self.request_body {
            write!(f, "\nRequest body: {body}")?;
        }
        if let Some(body) = &self.response_body {
            write!(f, "\nResponse body: {body}")?;
        }
        Ok(())
    }
}

impl std::error::Error for TransportError {}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_transport_error_display() {
        let err = TransportError {
            method: "PUT".into(),
            uri: "http://sink/items/a".into(),
            status: Some(500),
            request_body: Some("{}".into()),
            response_body: Some("boom".into()),
        };
        let text = err.to_string();
        assert!(text.starts_with("PUT http://sink/items/a returned HTTP 500"));
        assert!(text.contains("Request body: {}"));
        assert!(text.contains("Response body: boom"));
    }

    #[test]
    fn test_pmh_error_display() {
        let err = AppError::pmh("badArgument", "missing verb");
        assert_eq!(err.to_string(), "OAI-PMH error [badArgument]: missing verb");
    }
}
