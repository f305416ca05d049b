//! OAI-PMH list client.

use std::collections::VecDeque;
use std::future::Future;
use std::pin::Pin;
use std::sync::Arc;

use async_trait::async_trait;
use chrono::{DateTime, Utc};
use reqwest::Client;
use tokio::sync::Mutex;
use tokio_util::sync::CancellationToken;
use url::Url;

use crate::error::Result;
use crate::models::{PmhRecord, PmhSet};
use crate::pmh::parser::{self, PmhPage};
use crate::pmh::transform::{ElementTransformer, NameValueTransformer};
use crate::services::{ConcurrentIterator, Next};
use crate::utils::http::fetch_bytes;

/// Default consecutive page failures tolerated by an iterator.
pub const DEFAULT_MAX_PAGE_FAILURES: u32 = 3;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum Verb {
    ListRecords,
    ListSets,
}

impl Verb {
    fn as_str(self) -> &'static str {
        match self {
            Verb::ListRecords => "ListRecords",
            Verb::ListSets => "ListSets",
        }
    }
}

/// Client for the `ListRecords` and `ListSets` verbs of one endpoint.
///
/// Cheap to clone; clones share the HTTP client and transformer.
#[derive(Clone)]
pub struct PmhHarvester {
    client: Client,
    endpoint: Url,
    metadata_prefix: String,
    set: Option<String>,
    from: Option<DateTime<Utc>>,
    transformer: Arc<dyn ElementTransformer>,
    max_page_failures: u32,
}

impl PmhHarvester {
    pub fn new(client: Client, endpoint: Url) -> Self {
        Self {
            client,
            endpoint,
            metadata_prefix: "oai_dc".to_string(),
            set: None,
            from: None,
            transformer: Arc::new(NameValueTransformer),
            max_page_failures: DEFAULT_MAX_PAGE_FAILURES,
        }
    }

    pub fn with_metadata_prefix(mut self, prefix: impl Into<String>) -> Self {
        self.metadata_prefix = prefix.into();
        self
    }

    /// Restrict record lists to one set.
    pub fn with_set(mut self, set: Option<String>) -> Self {
        self.set = set;
        self
    }

    /// Restrict record lists to records modified since `from`.
    pub fn with_from(mut self, from: Option<DateTime<Utc>>) -> Self {
        self.from = from;
        self
    }

    pub fn with_transformer(mut self, transformer: Arc<dyn ElementTransformer>) -> Self {
        self.transformer = transformer;
        self
    }

    pub fn with_max_page_failures(mut self, max: u32) -> Self {
        self.max_page_failures = max.max(1);
        self
    }

    pub fn endpoint(&self) -> &Url {
        &self.endpoint
    }

    pub fn metadata_prefix(&self) -> &str {
        &self.metadata_prefix
    }

    /// Declared size of the record list.
    pub async fn num_records(&self) -> Result<i64> {
        Ok(self.fetch_records(None).await?.list_size())
    }

    /// Declared size of the set list.
    pub async fn num_sets(&self) -> Result<i64> {
        Ok(self.fetch_sets(None).await?.list_size())
    }

    /// Iterate over all records, page by page.
    pub fn records(&self, closed: CancellationToken) -> PmhIterator<PmhRecord> {
        let harvester = self.clone();
        PmhIterator::new(
            closed,
            self.max_page_failures,
            Box::new(move |token: Option<String>| -> PageFuture<PmhRecord> {
                let harvester = harvester.clone();
                Box::pin(async move { harvester.fetch_records(token.as_deref()).await })
            }),
        )
    }

    /// Iterate over all sets, page by page.
    pub fn sets(&self, closed: CancellationToken) -> PmhIterator<PmhSet> {
        let harvester = self.clone();
        PmhIterator::new(
            closed,
            self.max_page_failures,
            Box::new(move |token: Option<String>| -> PageFuture<PmhSet> {
                let harvester = harvester.clone();
                Box::pin(async move { harvester.fetch_sets(token.as_deref()).await })
            }),
        )
    }

    async fn fetch_records(&self, token: Option<&str>) -> Result<PmhPage<PmhRecord>> {
        let url = self.list_url(Verb::ListRecords, token);
        let body = fetch_bytes(&self.client, url.as_str()).await?;
        parser::parse_records(&body, self.transformer.as_ref())
    }

    async fn fetch_sets(&self, token: Option<&str>) -> Result<PmhPage<PmhSet>> {
        let url = self.list_url(Verb::ListSets, token);
        let body = fetch_bytes(&self.client, url.as_str()).await?;
        parser::parse_sets(&body, self.transformer.as_ref())
    }

    /// Request URL for a list page. A resumption token is exclusive with
    /// every other argument.
    fn list_url(&self, verb: Verb, token: Option<&str>) -> Url {
        let mut url = self.endpoint.clone();
        {
            let mut query = url.query_pairs_mut();
            query.append_pair("verb", verb.as_str());
            match token {
                Some(token) => {
                    query.append_pair("resumptionToken", token);
                }
                None if verb == Verb::ListRecords => {
                    query.append_pair("metadataPrefix", &self.metadata_prefix);
                    if let Some(set) = &self.set {
                        query.append_pair("set", set);
                    }
                    if let Some(from) = &self.from {
                        query.append_pair("from", &from.format("%Y-%m-%d").to_string());
                    }
                }
                None => {}
            }
        }
        url
    }

    /// `GetRecord` URL of a single record.
    pub fn record_url(&self, identifier: &str) -> Url {
        let mut url = self.endpoint.clone();
        url.query_pairs_mut()
            .append_pair("verb", "GetRecord")
            .append_pair("identifier", identifier)
            .append_pair("metadataPrefix", &self.metadata_prefix);
        url
    }
}

type PageFuture<T> = Pin<Box<dyn Future<Output = Result<PmhPage<T>>> + Send>>;
type PageFetcher<T> = Box<dyn Fn(Option<String>) -> PageFuture<T> + Send + Sync>;

struct PageState<T> {
    buffer: VecDeque<T>,
    token: Option<String>,
    exhausted: bool,
}

/// Concurrent iterator over a paginated OAI-PMH list.
///
/// Items are served from a buffer; when it runs dry, the next page is
/// fetched while holding the buffer lock, so exactly one caller refills it.
pub struct PmhIterator<T> {
    fetch: PageFetcher<T>,
    state: Mutex<PageState<T>>,
    closed: CancellationToken,
    max_failures: u32,
}

impl<T: Send> PmhIterator<T> {
    fn new(closed: CancellationToken, max_failures: u32, fetch: PageFetcher<T>) -> Self {
        Self {
            fetch,
            state: Mutex::new(PageState {
                buffer: VecDeque::new(),
                token: None,
                exhausted: false,
            }),
            closed,
            max_failures,
        }
    }

    /// Stop fetching. Pending and later pulls return [`Next::Closed`].
    pub fn close(&self) {
        self.closed.cancel();
    }

    pub fn is_closed(&self) -> bool {
        self.closed.is_cancelled()
    }

    /// Fetch one page, retrying up to `max_failures` attempts in total.
    /// `None` if the iterator was closed between attempts.
    async fn fetch_page(&self, token: Option<String>) -> Result<Option<PmhPage<T>>> {
        let mut attempt = 1;
        loop {
            match (self.fetch)(token.clone()).await {
                Ok(page) => return Ok(Some(page)),
                Err(e) if attempt < self.max_failures => {
                    log::warn!(
                        "Page fetch failed (attempt {}/{}), retrying: {}",
                        attempt,
                        self.max_failures,
                        e
                    );
                }
                Err(e) => {
                    log::error!("Giving up after {} failed page fetches: {}", attempt, e);
                    return Err(e);
                }
            }
            if self.closed.is_cancelled() {
                return Ok(None);
            }
            attempt += 1;
        }
    }
}

#[async_trait]
impl<T: Send> ConcurrentIterator<T> for PmhIterator<T> {
    async fn next(&self) -> Result<Next<T>> {
        if self.closed.is_cancelled() {
            return Ok(Next::Closed);
        }

        let mut state = self.state.lock().await;
        loop {
            if self.closed.is_cancelled() {
                return Ok(Next::Closed);
            }
            if let Some(item) = state.buffer.pop_front() {
                return Ok(Next::Item(item));
            }
            if state.exhausted {
                return Ok(Next::Exhausted);
            }

            // Retries happen under the lock. A page that never arrives ends
            // the list with a single error.
            let page = match self.fetch_page(state.token.clone()).await {
                Ok(Some(page)) => page,
                Ok(None) => return Ok(Next::Closed),
                Err(e) => {
                    state.exhausted = true;
                    return Err(e);
                }
            };
            state.exhausted = page.resumption_token.is_none();
            state.token = page.resumption_token;
            state.buffer.extend(page.items);
        }
    }
}
