// src/pipeline/harvest.rs

//! Harvest orchestration.
//!
//! A [`Harvester`] pulls every entity of one source through a fixed pool of
//! workers into a sink, keeping a [`HarvestStatus`] up to date and pushing
//! it to the sink periodically and once at the end.

use std::sync::atomic::{AtomicI64, Ordering};
use std::sync::{Arc, OnceLock};

use tokio::task::JoinSet;
use tokio_util::sync::CancellationToken;

use crate::error::Result;
use crate::models::{Entity, HarvestStatus, HarvesterConfig, StatusSnapshot};
use crate::services::{ConcurrentIterator, Next, SinkService, SourceService};

/// Render `numerator / denominator` as a percentage with two decimals.
pub fn format_percent(numerator: i64, denominator: i64) -> String {
    if denominator <= 0 {
        return "unknown".to_string();
    }
    format!("{:.2}%", numerator as f64 / denominator as f64 * 100.0)
}

/// Why the workers stopped pulling.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum Termination {
    Exhausted,
    Closed,
}

/// Runs harvests with a fixed-size worker pool.
#[derive(Debug, Clone)]
pub struct Harvester {
    threads: usize,
    status_interval: i64,
    max_entities: Option<u64>,
}

impl Harvester {
    pub fn new(config: &HarvesterConfig) -> Self {
        Self {
            threads: config.threads.max(1),
            status_interval: config.status_interval.max(1) as i64,
            max_entities: config.max_entities,
        }
    }

    /// Harvest one source into a sink.
    ///
    /// Never fails: setup errors leave the returned status `FAILED`, and
    /// per-entity errors are counted as failures.
    pub async fn run(&self, source: &dyn SourceService, sink: Arc<dyn SinkService>) -> StatusSnapshot {
        let status = Arc::new(HarvestStatus::new(source.key()));
        status.start();
        if let Some(max) = self.max_entities.filter(|max| *max > 0) {
            status.set_max_count(max as i64);
        }
        log::info!(
            "Harvest {} started: {} -> {}",
            status.id(),
            source.name(),
            sink.name()
        );

        match Self::prepare(source).await {
            Ok((declared, entities)) => {
                status.set_declared_count(declared);
                sink.set_num_entities_to_ingest(status.canonical_count());
                self.harvest(source.key(), Arc::clone(&status), entities, Arc::clone(&sink))
                    .await;
            }
            Err(e) => {
                log::error!("Failed to start harvest of {}: {}", source.key(), e);
                status.fail(format!("Failed to start harvest: {e}"));
            }
        }

        if let Err(e) = sink.update_status(&status).await {
            log::error!("Final status update of {} failed: {}", status.id(), e);
        }

        let snapshot = status.snapshot();
        log::info!(
            "Harvest {} finished: {} ({} succeeded, {} failed)",
            snapshot.id,
            snapshot.lifecycle,
            snapshot.num_succeeded,
            snapshot.num_failed
        );
        snapshot
    }

    /// Harvest each source in turn, closing it afterwards.
    ///
    /// Cancelling `shutdown` closes the running source, which aborts its
    /// harvest, and skips the sources after it.
    pub async fn run_all(
        &self,
        sources: Vec<Box<dyn SourceService>>,
        sink: Arc<dyn SinkService>,
        shutdown: &CancellationToken,
    ) -> Vec<StatusSnapshot> {
        let mut snapshots = Vec::with_capacity(sources.len());
        for source in sources {
            if shutdown.is_cancelled() {
                log::warn!("Skipping {}: shutting down", source.key());
                source.close().await;
                continue;
            }

            let run = self.run(source.as_ref(), Arc::clone(&sink));
            tokio::pin!(run);
            let snapshot = tokio::select! {
                snapshot = &mut run => snapshot,
                _ = shutdown.cancelled() => {
                    log::warn!("Closing {}", source.key());
                    source.close().await;
                    run.await
                }
            };
            source.close().await;
            snapshots.push(snapshot);
        }
        snapshots
    }

    async fn prepare(
        source: &dyn SourceService,
    ) -> Result<(i64, Arc<dyn ConcurrentIterator<Entity>>)> {
        let declared = source.num_entities().await?;
        let entities = source.entities().await?;
        Ok((declared, entities))
    }

    async fn harvest(
        &self,
        source_key: &str,
        status: Arc<HarvestStatus>,
        entities: Arc<dyn ConcurrentIterator<Entity>>,
        sink: Arc<dyn SinkService>,
    ) {
        let pool = Arc::new(WorkerPool {
            source_key: source_key.to_string(),
            status: Arc::clone(&status),
            entities,
            sink,
            status_interval: self.status_interval,
            next_index: AtomicI64::new(0),
            termination: OnceLock::new(),
        });

        let mut workers = JoinSet::new();
        for _ in 0..self.threads {
            let pool = Arc::clone(&pool);
            workers.spawn(async move { pool.work().await });
        }
        while let Some(result) = workers.join_next().await {
            if let Err(e) = result {
                log::error!("Harvest worker of {} stopped abnormally: {}", source_key, e);
                status.add_message(format!("Worker stopped abnormally: {e}"));
            }
        }

        match pool.termination.get() {
            Some(Termination::Closed) => {
                if status.abort() {
                    log::warn!("Harvest {} was cancelled", status.id());
                }
            }
            _ => {
                status.end();
            }
        }
    }
}

/// State shared by the workers of one harvest.
struct WorkerPool {
    source_key: String,
    status: Arc<HarvestStatus>,
    entities: Arc<dyn ConcurrentIterator<Entity>>,
    sink: Arc<dyn SinkService>,
    status_interval: i64,
    next_index: AtomicI64,
    termination: OnceLock<Termination>,
}

impl WorkerPool {
    async fn work(&self) {
        while self.termination.get().is_none() {
            let index = self.next_index.fetch_add(1, Ordering::SeqCst);
            if let Some(max) = self.status.max_count() {
                if index >= max {
                    break;
                }
            }
            if index > 0 && index % self.status_interval == 0 {
                if let Err(e) = self.sink.update_status(&self.status).await {
                    log::warn!("Status update of {} failed: {}", self.status.id(), e);
                }
            }

            match self.entities.next().await {
                Ok(Next::Item(Entity::Concrete(entity))) => {
                    match self.sink.ingest(&entity).await {
                        Ok(()) => {
                            self.status.increment_succeeded();
                            let total = self.status.canonical_count();
                            log::info!(
                                "Ingested {}: source_id={} sink_id={} progress={}/{} ({})",
                                entity.variant(),
                                entity.source_id(),
                                entity.sink_id(),
                                index + 1,
                                total,
                                format_percent(index + 1, total)
                            );
                        }
                        Err(e) => {
                            let message = format!(
                                "Failed to ingest {} into {}: source={} source_id={} sink_id={}: {}",
                                entity.variant(),
                                self.sink.key(),
                                self.source_key,
                                entity.source_id(),
                                entity.sink_id(),
                                e
                            );
                            log::error!("{}", message);
                            self.status.add_message(message);
                            self.status.add_failed(1);
                        }
                    }
                }
                Ok(Next::Item(Entity::Placeholder(placeholder))) => {
                    let message = format!(
                        "Source failure: source={} source_id={} source_uri={}",
                        self.source_key, placeholder.source_id, placeholder.source_uri
                    );
                    log::warn!("{}", message);
                    self.status.add_message(message);
                    self.status.add_failed(1);
                }
                Ok(Next::Exhausted) => {
                    let _ = self.termination.set(Termination::Exhausted);
                    break;
                }
                Ok(Next::Closed) => {
                    let _ = self.termination.set(Termination::Closed);
                    break;
                }
                Err(e) => {
                    let message = format!(
                        "Source failure: source={} index={}: {}",
                        self.source_key, index, e
                    );
                    log::error!("{}", message);
                    self.status.add_message(message);
                    self.status.add_failed(1);
                }
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_format_percent() {
        assert_eq!(format_percent(1, 8), "12.50%");
        assert_eq!(format_percent(2, 3), "66.67%");
        assert_eq!(format_percent(5, 5), "100.00%");
        assert_eq!(format_percent(0, 10), "0.00%");
    }

    #[test]
    fn test_format_percent_unknown_denominator() {
        assert_eq!(format_percent(3, 0), "unknown");
        assert_eq!(format_percent(3, -1), "unknown");
    }

    #[test]
    fn test_new_clamps_to_one_worker() {
        let config = HarvesterConfig {
            threads: 0,
            status_interval: 0,
            max_entities: None,
        };
        let harvester = Harvester::new(&config);
        assert_eq!(harvester.threads, 1);
        assert_eq!(harvester.status_interval, 1);
    }
}
