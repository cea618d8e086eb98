//! Backfill worker
//!
//! Drains one backfill queue in prefetch-sized batches. Each task lists one
//! level of the storage hierarchy, republishes follow-up tasks for the level
//! below and sends the entity's own document into the river. Before every
//! batch the worker waits until the queue it feeds is below its high-water
//! mark.

use std::sync::Arc;

use tokio::sync::watch;
use tracing::{debug, error, info, warn};

use super::errors::BackfillError;
use super::highwater::{GateDecision, HighwaterGate, WaterSource};
use super::task::{BackfillTask, TaskError};
use super::verify::{VerifyReport, verify_document};
use crate::broker::{BrokerClient, BrokerError, ConsumeSummary, OutboundMessage};
use crate::config::{BackfillConfig, Config};
use crate::document::{EntityPath, EntityType, Headers, build_properties};
use crate::river::RiverPublisher;
use crate::search::SearchBackend;
use crate::storage::{StorageClient, StorageError};

/// Publish a task to the backfill exchange, routed by its entity type
pub async fn enqueue(broker: &BrokerClient, task: &BackfillTask) -> Result<(), BackfillError> {
    let body = task.to_json()?;
    let message = OutboundMessage::persistent(
        broker.config().backfill_exchange.as_str(),
        task.entity_type().as_str(),
        body,
    );
    broker.publish_direct(&message).await?;
    Ok(())
}

pub struct BackfillWorker {
    queue: EntityType,
    broker: BrokerClient,
    storage: Arc<dyn StorageClient>,
    search: Arc<dyn SearchBackend>,
    river: RiverPublisher,
    config: BackfillConfig,
    source: WaterSource,
    gate: HighwaterGate,
}

impl BackfillWorker {
    pub fn new(
        queue: EntityType,
        broker: BrokerClient,
        storage: Arc<dyn StorageClient>,
        search: Arc<dyn SearchBackend>,
        config: &Config,
    ) -> Self {
        let source = WaterSource::for_queue(queue);
        let level = source.level(&config.backfill.water_levels).clone();
        let river = RiverPublisher::new(broker.clone(), &config.index.search_index_name);
        Self {
            queue,
            broker,
            storage,
            search,
            river,
            config: config.backfill.clone(),
            source,
            gate: HighwaterGate::new(source, level),
        }
    }

    #[must_use]
    pub fn queue(&self) -> EntityType {
        self.queue
    }

    #[must_use]
    pub fn gate(&self) -> &HighwaterGate {
        &self.gate
    }

    /// Process batches until `stop` is set
    pub async fn run(&mut self, mut stop: watch::Receiver<bool>) {
        info!(queue = %self.queue, source = self.source.name(), "backfill worker started");
        let interval = self.gate.level().interval();

        loop {
            if *stop.borrow() {
                break;
            }

            let waited = tokio::select! {
                biased;
                _ = stop.changed() => break,
                waited = self.wait_for_water() => waited,
            };

            let outcome = match waited {
                Ok(()) => self.consume_batch().await,
                Err(e) => Err(e),
            };

            match outcome {
                Ok(summary) => debug!(
                    queue = %self.queue,
                    acked = summary.acked,
                    requeued = summary.requeued,
                    "batch finished"
                ),
                Err(e) => {
                    error!(queue = %self.queue, error = %e, "batch failed, retrying");
                    tokio::select! {
                        _ = stop.changed() => break,
                        () = tokio::time::sleep(interval) => {}
                    }
                }
            }
        }
        info!(queue = %self.queue, "backfill worker stopped");
    }

    /// One water-level wait followed by one consume batch
    pub async fn run_batch(&mut self) -> Result<ConsumeSummary, BrokerError> {
        self.wait_for_water().await?;
        self.consume_batch().await
    }

    /// Sleep until the watched queue allows another batch
    pub async fn wait_for_water(&mut self) -> Result<(), BrokerError> {
        let queue = self.source.queue_name(&self.broker);
        loop {
            let depth = self.broker.queue_size(&queue).await?;
            match self.gate.observe(depth.map(u64::from)) {
                GateDecision::Proceed => return Ok(()),
                GateDecision::Wait => tokio::time::sleep(self.gate.level().interval()).await,
            }
        }
    }

    async fn consume_batch(&self) -> Result<ConsumeSummary, BrokerError> {
        let prefetch = self.config.prefetch_for(self.queue);
        self.broker
            .consume(self.queue, prefetch, |body: Vec<u8>| async move {
                self.handle_message(&body).await
            })
            .await
    }

    /// Parse and execute one task body
    ///
    /// Malformed and unknown tasks are logged and dropped.
    pub async fn handle_message(&self, body: &[u8]) -> Result<(), BackfillError> {
        let task = match BackfillTask::from_json(body) {
            Ok(task) => task,
            Err(e @ TaskError::UnknownType(_)) => {
                error!(error = %e, body = %String::from_utf8_lossy(body), "invalid action");
                return Ok(());
            }
            Err(e) => {
                error!(error = %e, body = %String::from_utf8_lossy(body), "dropping malformed task");
                return Ok(());
            }
        };
        self.dispatch(&task).await
    }

    /// Execute a task, refreshing auth and retrying once on 401
    ///
    /// A 404 means the entity was removed after it was listed and is ignored.
    pub async fn dispatch(&self, task: &BackfillTask) -> Result<(), BackfillError> {
        let mut refreshed = false;
        loop {
            match self.execute(task).await {
                Ok(()) => return Ok(()),
                Err(BackfillError::Storage(StorageError::NotFound(what))) => {
                    debug!(task = task.type_name(), %what, "entity vanished, skipping");
                    return Ok(());
                }
                Err(BackfillError::Storage(StorageError::Unauthorized(_))) if !refreshed => {
                    warn!(task = task.type_name(), "storage token rejected, refreshing");
                    self.storage.refresh_auth().await?;
                    refreshed = true;
                }
                Err(e) => return Err(e),
            }
        }
    }

    async fn execute(&self, task: &BackfillTask) -> Result<(), BackfillError> {
        match task {
            BackfillTask::IndexAccount { account, verify } => {
                self.index_account(account, *verify).await
            }
            BackfillTask::IndexContainer {
                account,
                container,
                marker,
                verify,
            } => {
                self.index_container(account, container, marker.as_deref(), *verify)
                    .await
            }
            BackfillTask::IndexObject {
                account,
                container,
                object,
                verify,
            } => self.index_object(account, container, object, *verify).await,
        }
    }

    /// Schedule one `index_container` task per container in the account
    pub async fn index_account(&self, account: &str, verify: bool) -> Result<(), BackfillError> {
        debug!(account, "indexing account");
        let containers = self.storage.list_containers(account).await?;
        info!(account, count = containers.len(), "found containers");

        for container in containers {
            self.enqueue(&BackfillTask::IndexContainer {
                account: account.to_string(),
                container: container.name,
                marker: None,
                verify,
            })
            .await?;
        }
        Ok(())
    }

    /// Index one listing page of a container
    ///
    /// A full page schedules a continuation from its last name. The
    /// container's own document is (re)indexed on every page.
    pub async fn index_container(
        &self,
        account: &str,
        container: &str,
        marker: Option<&str>,
        verify: bool,
    ) -> Result<(), BackfillError> {
        debug!(account, container, marker, "indexing container");
        let page_size = self.config.container_listing_count;
        let listing = self
            .storage
            .list_objects(account, container, marker, page_size)
            .await?;
        info!(account, container, count = listing.objects.len(), "found objects");

        if listing.objects.len() == page_size {
            if let Some(last) = listing.objects.last() {
                self.enqueue(&BackfillTask::IndexContainer {
                    account: account.to_string(),
                    container: container.to_string(),
                    marker: Some(last.name.clone()),
                    verify,
                })
                .await?;
            }
        }

        let path = EntityPath::container(account, container);
        self.index_or_verify(&path, &listing.headers, verify).await?;

        for object in listing.objects {
            self.enqueue(&BackfillTask::IndexObject {
                account: account.to_string(),
                container: container.to_string(),
                object: object.name,
                verify,
            })
            .await?;
        }
        Ok(())
    }

    /// Read an object's headers and index its document
    pub async fn index_object(
        &self,
        account: &str,
        container: &str,
        object: &str,
        verify: bool,
    ) -> Result<(), BackfillError> {
        let path = EntityPath::object(account, container, object);
        let headers = self.storage.head(&path).await?;
        debug!(path = %path, "indexing object");
        self.index_or_verify(&path, &headers, verify).await
    }

    /// Compare the indexed document at `path` with one built from `headers`
    pub async fn verify_entity(
        &self,
        path: &EntityPath,
        headers: &Headers,
    ) -> Result<VerifyReport, BackfillError> {
        let (id, document) = build_properties(path, headers)?;
        verify_document(
            self.search.as_ref(),
            self.river.index_name(),
            id,
            &document,
        )
        .await
    }

    async fn index_or_verify(
        &self,
        path: &EntityPath,
        headers: &Headers,
        verify: bool,
    ) -> Result<(), BackfillError> {
        if verify {
            let report = self.verify_entity(path, headers).await?;
            if report.is_clean() {
                debug!(path = %path, "indexed document verified");
            }
            return Ok(());
        }
        let (id, document) = build_properties(path, headers)?;
        self.river.index_document(id, document, true).await?;
        Ok(())
    }

    async fn enqueue(&self, task: &BackfillTask) -> Result<(), BackfillError> {
        enqueue(&self.broker, task).await
    }
}
