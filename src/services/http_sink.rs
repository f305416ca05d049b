//! JSON-over-HTTP sink.
//!
//! Items are `PUT` to `{endpoint}/items/{sink id}` and harvest status to
//! `{endpoint}/harvests/{harvest id}`.

use std::sync::atomic::{AtomicI64, Ordering};

use async_trait::async_trait;
use reqwest::{Client, Method};
use serde::Serialize;
use url::Url;

use crate::error::Result;
use crate::models::{ConcreteEntity, HarvestStatus, SinkConfig, StatusSnapshot, UNKNOWN_COUNT, escape_sink_id};
use crate::services::SinkService;
use crate::utils::http::{BasicAuth, send_json};

pub struct HttpSink {
    endpoint: String,
    client: Client,
    auth: Option<BasicAuth>,
    expected: AtomicI64,
}

#[derive(Serialize)]
struct StatusPayload {
    #[serde(flatten)]
    status: StatusSnapshot,
    num_expected: i64,
}

impl HttpSink {
    pub fn new(config: SinkConfig, client: Client) -> Result<Self> {
        let endpoint = Url::parse(&config.endpoint)?;
        let auth = config.username.map(|username| BasicAuth {
            username,
            password: config.password,
        });
        Ok(Self {
            endpoint: endpoint.as_str().trim_end_matches('/').to_string(),
            client,
            auth,
            expected: AtomicI64::new(UNKNOWN_COUNT),
        })
    }

    /// Count announced by the last harvest, or [`UNKNOWN_COUNT`].
    pub fn num_entities_to_ingest(&self) -> i64 {
        self.expected.load(Ordering::SeqCst)
    }

    fn item_url(&self, entity: &ConcreteEntity) -> String {
        format!("{}/items/{}", self.endpoint, entity.sink_id())
    }

    fn status_url(&self, status: &HarvestStatus) -> String {
        format!("{}/harvests/{}", self.endpoint, escape_sink_id(status.id()))
    }
}

#[async_trait]
impl SinkService for HttpSink {
    fn name(&self) -> &str {
        "HTTP sink"
    }

    fn key(&self) -> &str {
        "http"
    }

    fn set_num_entities_to_ingest(&self, count: i64) {
        self.expected.store(count, Ordering::SeqCst);
    }

    async fn ingest(&self, entity: &ConcreteEntity) -> Result<()> {
        send_json(
            &self.client,
            Method::PUT,
            &self.item_url(entity),
            &entity.to_item(),
            self.auth.as_ref(),
        )
        .await
    }

    async fn update_status(&self, status: &HarvestStatus) -> Result<()> {
        let payload = StatusPayload {
            status: status.snapshot(),
            num_expected: self.num_entities_to_ingest(),
        };
        send_json(
            &self.client,
            Method::PUT,
            &self.status_url(status),
            &payload,
            self.auth.as_ref(),
        )
        .await
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::models::Variant;

    fn sink(endpoint: &str) -> HttpSink {
        let config = SinkConfig {
            endpoint: endpoint.to_string(),
            username: Some("harvester".into()),
            password: None,
        };
        HttpSink::new(config, Client::new()).unwrap()
    }

    #[test]
    fn test_urls() {
        let sink = sink("http://localhost:3000/api/v1/");
        let entity =
            ConcreteEntity::new("ideals", "oai:x:1", "http://x/1", Variant::Item).unwrap();
        assert_eq!(
            sink.item_url(&entity),
            "http://localhost:3000/api/v1/items/ideals-oai%3Ax%3A1"
        );

        let status = HarvestStatus::new("ideals");
        assert_eq!(
            sink.status_url(&status),
            format!("http://localhost:3000/api/v1/harvests/{}", status.id())
        );
    }

    #[test]
    fn test_expected_count() {
        let sink = sink("http://localhost:3000");
        assert_eq!(sink.num_entities_to_ingest(), UNKNOWN_COUNT);
        sink.set_num_entities_to_ingest(42);
        assert_eq!(sink.num_entities_to_ingest(), 42);
        assert_eq!(sink.auth.as_ref().unwrap().username, "harvester");
    }

    #[test]
    fn test_rejects_invalid_endpoint() {
        let config = SinkConfig {
            endpoint: "::".into(),
            ..SinkConfig::default()
        };
        assert!(HttpSink::new(config, Client::new()).is_err());
    }
}
