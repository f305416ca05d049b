//! Generic source backed by an OAI-PMH endpoint.

use std::sync::Arc;

use async_trait::async_trait;
use chrono::{DateTime, Utc};
use reqwest::Client;
use tokio_util::sync::CancellationToken;
use url::Url;

use crate::error::Result;
use crate::models::{
    ConcreteEntity, Element, Entity, PlaceholderEntity, PmhFormat, PmhRecord, PmhSourceConfig,
    Variant,
};
use crate::pmh::{
    ElementTransformer, NameValueTransformer, PmhHarvester, PmhIterator, QualifiedNameTransformer,
};
use crate::services::{ConcurrentIterator, Next, SourceService};
use crate::utils::SetSpecMatcher;

/// Name of the element linking a record to the set it belongs to.
pub const PARENT_URI_ELEMENT: &str = "parent_uri";

/// A source whose entities are the records of one OAI-PMH endpoint.
pub struct PmhSource {
    config: PmhSourceConfig,
    harvester: PmhHarvester,
    mapper: RecordMapper,
    closed: CancellationToken,
}

impl PmhSource {
    pub fn new(config: PmhSourceConfig, client: Client) -> Result<Self> {
        let endpoint = Url::parse(&config.endpoint)?;
        let transformer: Arc<dyn ElementTransformer> = match config.format {
            PmhFormat::Simple => Arc::new(NameValueTransformer),
            PmhFormat::Qualified => Arc::new(QualifiedNameTransformer::default()),
        };
        let harvester = PmhHarvester::new(client, endpoint)
            .with_metadata_prefix(config.metadata_prefix.clone())
            .with_set(config.set.clone())
            .with_transformer(transformer)
            .with_max_page_failures(config.max_page_failures);
        let mapper = RecordMapper {
            service_key: config.key.clone(),
            variant: config.variant,
            harvester: harvester.clone(),
            set_specs: SetSpecMatcher::new(config.set_uri_template.clone()),
        };

        Ok(Self {
            config,
            harvester,
            mapper,
            closed: CancellationToken::new(),
        })
    }
}

#[async_trait]
impl SourceService for PmhSource {
    fn name(&self) -> &str {
        &self.config.name
    }

    fn key(&self) -> &str {
        &self.config.key
    }

    async fn num_entities(&self) -> Result<i64> {
        self.harvester.num_records().await
    }

    async fn entities(&self) -> Result<Arc<dyn ConcurrentIterator<Entity>>> {
        Ok(Arc::new(PmhEntities {
            records: self.harvester.records(self.closed.child_token()),
            mapper: self.mapper.clone(),
        }))
    }

    fn set_last_modified(&mut self, at: DateTime<Utc>) -> Result<()> {
        log::info!("{}: harvesting records modified since {}", self.config.key, at.format("%Y-%m-%d"));
        self.harvester = self.harvester.clone().with_from(Some(at));
        Ok(())
    }

    async fn close(&self) {
        self.closed.cancel();
    }
}

/// Turns harvested records into entities.
#[derive(Clone)]
struct RecordMapper {
    service_key: String,
    variant: Variant,
    harvester: PmhHarvester,
    set_specs: SetSpecMatcher,
}

impl RecordMapper {
    /// Deleted or unusable records become placeholders.
    fn to_entity(&self, record: PmhRecord) -> Entity {
        let source_uri = self.source_uri(&record);
        if record.deleted {
            log::debug!("{}: record {} is deleted", self.service_key, record.identifier);
            return Entity::Placeholder(PlaceholderEntity::new(record.identifier, source_uri));
        }

        let mut entity = match ConcreteEntity::new(
            self.service_key.as_str(),
            record.identifier.as_str(),
            source_uri.as_str(),
            self.variant,
        ) {
            Ok(entity) => entity,
            Err(e) => {
                log::warn!("{}: unusable record {:?}: {}", self.service_key, record.identifier, e);
                return Entity::Placeholder(PlaceholderEntity::new(record.identifier, source_uri));
            }
        };

        if let Some(parent) = record
            .set_spec
            .as_deref()
            .and_then(|spec| self.set_specs.uri(spec))
        {
            entity.add_element(Element::new(PARENT_URI_ELEMENT, parent));
        }
        for element in record.elements {
            entity.add_element(element);
        }
        Entity::Concrete(entity)
    }

    /// The record's own http(s) identifier if it has one, otherwise its
    /// `GetRecord` URL.
    fn source_uri(&self, record: &PmhRecord) -> String {
        record
            .elements
            .iter()
            .filter(|e| e.name().ends_with("identifier"))
            .map(|e| e.value())
            .find(|v| v.starts_with("http://") || v.starts_with("https://"))
            .map(str::to_string)
            .unwrap_or_else(|| self.harvester.record_url(&record.identifier).to_string())
    }
}

struct PmhEntities {
    records: PmhIterator<PmhRecord>,
    mapper: RecordMapper,
}

#[async_trait]
impl ConcurrentIterator<Entity> for PmhEntities {
    async fn next(&self) -> Result<Next<Entity>> {
        Ok(match self.records.next().await? {
            Next::Item(record) => Next::Item(self.mapper.to_entity(record)),
            Next::Exhausted => Next::Exhausted,
            Next::Closed => Next::Closed,
        })
    }
}
