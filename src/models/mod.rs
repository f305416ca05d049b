// src/models/mod.rs

//! Domain models for the harvester.
//!
//! This module contains the data structures shared by the orchestrator,
//! the OAI-PMH client and the connectors.

mod config;
mod element;
mod entity;
mod pmh;
mod status;

// Re-export all public types
pub use config::{Config, HarvesterConfig, HttpConfig, PmhFormat, PmhSourceConfig, SinkConfig};
pub use element::Element;
pub use entity::{ConcreteEntity, Entity, Item, PlaceholderEntity, Variant, escape_sink_id};
pub use pmh::{PmhRecord, PmhSet};
pub use status::{HarvestStatus, Lifecycle, MESSAGE_CAPACITY, StatusSnapshot, UNKNOWN_COUNT};
