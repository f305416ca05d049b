//! Service layer for the harvester.
//!
//! This module contains the collaborator contracts of a harvest:
//! - Entity sources (`SourceService`), such as `PmhSource`
//! - Entity sinks (`SinkService`), such as `HttpSink`
//! - Thread-safe pull iteration (`ConcurrentIterator`)

mod http_sink;
mod iterator;
mod pmh_source;

use std::collections::BTreeMap;
use std::sync::Arc;

use async_trait::async_trait;
use chrono::{DateTime, Utc};

use crate::error::{AppError, Result};
use crate::models::{ConcreteEntity, Config, Entity, HarvestStatus};

pub use http_sink::HttpSink;
pub use iterator::{ConcurrentIterator, Next};
pub use pmh_source::PmhSource;

/// A remote service exposing its content as entities.
#[async_trait]
pub trait SourceService: Send + Sync {
    /// Human-readable name.
    fn name(&self) -> &str;

    /// Unique key, also used as the service key of its entities.
    fn key(&self) -> &str;

    /// Self-reported entity count, or [`UNKNOWN_COUNT`](crate::models::UNKNOWN_COUNT).
    async fn num_entities(&self) -> Result<i64>;

    /// A fresh iterator over all entities, shared by every worker.
    async fn entities(&self) -> Result<Arc<dyn ConcurrentIterator<Entity>>>;

    /// Restrict subsequent harvests to entities modified since `at`.
    fn set_last_modified(&mut self, _at: DateTime<Utc>) -> Result<()> {
        Err(AppError::unsupported(format!(
            "{} does not support incremental harvesting",
            self.name()
        )))
    }

    /// Close open iterators and release network resources.
    async fn close(&self);
}

/// A destination service accepting entities.
#[async_trait]
pub trait SinkService: Send + Sync {
    fn name(&self) -> &str;

    fn key(&self) -> &str;

    /// Tell the sink how many entities to expect. Sinks may ignore this.
    fn set_num_entities_to_ingest(&self, _count: i64) {}

    async fn ingest(&self, entity: &ConcreteEntity) -> Result<()>;

    async fn update_status(&self, status: &HarvestStatus) -> Result<()>;

    async fn close(&self) {}
}

/// Sources built from configuration, keyed by source key.
pub struct ServiceRegistry {
    sources: BTreeMap<String, Box<dyn SourceService>>,
}

impl ServiceRegistry {
    /// Build one [`PmhSource`] per configured source.
    pub fn from_config(config: &Config, client: &reqwest::Client) -> Result<Self> {
        let mut sources: BTreeMap<String, Box<dyn SourceService>> = BTreeMap::new();
        for source in &config.sources {
            let pmh = PmhSource::new(source.clone(), client.clone())?;
            sources.insert(source.key.clone(), Box::new(pmh));
        }
        Ok(Self { sources })
    }

    /// Known source keys, in sorted order.
    pub fn keys(&self) -> Vec<&str> {
        self.sources.keys().map(String::as_str).collect()
    }

    pub fn contains(&self, key: &str) -> bool {
        self.sources.contains_key(key)
    }

    /// Remove and return the source with the given key.
    pub fn take(&mut self, key: &str) -> Option<Box<dyn SourceService>> {
        self.sources.remove(key)
    }

    /// Remove and return all sources.
    pub fn take_all(&mut self) -> Vec<Box<dyn SourceService>> {
        std::mem::take(&mut self.sources).into_values().collect()
    }
}
