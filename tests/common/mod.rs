//! Shared fixtures for the integration tests: an in-memory object store,
//! a recording search backend and a wired-up broker.

#![allow(dead_code)]

use std::collections::{BTreeMap, HashMap};
use std::sync::Arc;
use std::sync::atomic::{AtomicU32, Ordering};

use async_trait::async_trait;
use parking_lot::Mutex;
use search_river::backfill::{BackfillTask, BackfillWorker};
use search_river::config::{BackfillConfig, BrokerConfig, Config, WaterLevel, WaterLevels};
use search_river::search::{SearchHits, SearchResult};
use search_river::storage::{ContainerListing, ListingEntry};
use search_river::{
    BrokerClient, EntityPath, EntityType, Headers, InMemoryBroker, SearchBackend, StorageClient,
    StorageError,
};
use serde_json::{Map, Value};

#[derive(Debug, Clone, Default)]
struct FakeContainer {
    headers: Headers,
    objects: BTreeMap<String, Headers>,
}

#[derive(Default)]
struct StorageState {
    accounts: BTreeMap<String, BTreeMap<String, FakeContainer>>,
    unauthorized_remaining: u32,
}

/// Object store held in memory, with injectable 401s
#[derive(Default)]
pub struct FakeStorage {
    state: Mutex<StorageState>,
    refreshes: AtomicU32,
    calls: AtomicU32,
}

impl FakeStorage {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn add_container(&self, account: &str, container: &str, headers: &[(&str, &str)]) {
        let mut state = self.state.lock();
        let entry = state
            .accounts
            .entry(account.to_string())
            .or_default()
            .entry(container.to_string())
            .or_default();
        entry.headers = to_headers(headers);
    }

    pub fn add_object(&self, account: &str, container: &str, object: &str, headers: &[(&str, &str)]) {
        let mut state = self.state.lock();
        state
            .accounts
            .entry(account.to_string())
            .or_default()
            .entry(container.to_string())
            .or_default()
            .objects
            .insert(object.to_string(), to_headers(headers));
    }

    pub fn remove_object(&self, account: &str, container: &str, object: &str) {
        let mut state = self.state.lock();
        if let Some(c) = state
            .accounts
            .get_mut(account)
            .and_then(|a| a.get_mut(container))
        {
            c.objects.remove(object);
        }
    }

    /// Fail the next `count` calls with 401
    pub fn fail_unauthorized(&self, count: u32) {
        self.state.lock().unauthorized_remaining = count;
    }

    pub fn refreshes(&self) -> u32 {
        self.refreshes.load(Ordering::SeqCst)
    }

    pub fn calls(&self) -> u32 {
        self.calls.load(Ordering::SeqCst)
    }

    fn check_auth(&self, what: &str) -> Result<(), StorageError> {
        self.calls.fetch_add(1, Ordering::SeqCst);
        let mut state = self.state.lock();
        if state.unauthorized_remaining > 0 {
            state.unauthorized_remaining -= 1;
            return Err(StorageError::Unauthorized(what.to_string()));
        }
        Ok(())
    }
}

fn to_headers(pairs: &[(&str, &str)]) -> Headers {
    pairs
        .iter()
        .map(|(k, v)| ((*k).to_string(), (*v).to_string()))
        .collect()
}

#[async_trait]
impl StorageClient for FakeStorage {
    async fn list_containers(&self, account: &str) -> Result<Vec<ListingEntry>, StorageError> {
        self.check_auth(account)?;
        let state = self.state.lock();
        let containers = state
            .accounts
            .get(account)
            .ok_or_else(|| StorageError::NotFound(account.to_string()))?;
        Ok(containers.keys().map(ListingEntry::named).collect())
    }

    async fn list_objects(
        &self,
        account: &str,
        container: &str,
        marker: Option<&str>,
        limit: usize,
    ) -> Result<ContainerListing, StorageError> {
        self.check_auth(container)?;
        let state = self.state.lock();
        let found = state
            .accounts
            .get(account)
            .and_then(|a| a.get(container))
            .ok_or_else(|| StorageError::NotFound(format!("{account}/{container}")))?;
        let objects = found
            .objects
            .keys()
            .filter(|name| marker.is_none_or(|m| name.as_str() > m))
            .take(limit)
            .map(ListingEntry::named)
            .collect();
        Ok(ContainerListing {
            headers: found.headers.clone(),
            objects,
        })
    }

    async fn head(&self, path: &EntityPath) -> Result<Headers, StorageError> {
        self.check_auth(&path.to_string())?;
        let state = self.state.lock();
        let container = state
            .accounts
            .get(path.account_name())
            .and_then(|a| a.get(path.container_name().unwrap_or_default()));
        let headers = match path.object_name() {
            Some(object) => container.and_then(|c| c.objects.get(object)).cloned(),
            None => container.map(|c| c.headers.clone()),
        };
        headers.ok_or_else(|| StorageError::NotFound(path.to_string()))
    }

    async fn refresh_auth(&self) -> Result<(), StorageError> {
        self.refreshes.fetch_add(1, Ordering::SeqCst);
        Ok(())
    }
}

/// Search backend answering `ids` queries from stored documents
#[derive(Default)]
pub struct FakeSearch {
    documents: Mutex<HashMap<String, Vec<Map<String, Value>>>>,
    queries: Mutex<Vec<Value>>,
}

impl FakeSearch {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn store(&self, id: &str, fields: Map<String, Value>) {
        self.documents
            .lock()
            .entry(id.to_string())
            .or_default()
            .push(fields);
    }

    pub fn queries(&self) -> Vec<Value> {
        self.queries.lock().clone()
    }
}

#[async_trait]
impl SearchBackend for FakeSearch {
    async fn search(&self, _index: &str, body: &Value) -> SearchResult<SearchHits> {
        self.queries.lock().push(body.clone());
        let id = body
            .pointer("/query/ids/values/0")
            .and_then(Value::as_str)
            .unwrap_or_default();
        let hits = self.documents.lock().get(id).cloned().unwrap_or_default();
        Ok(SearchHits {
            total: hits.len() as u64,
            hits,
        })
    }
}

/// Config tuned for fast tests
pub fn test_config(page_size: usize) -> Config {
    let level = WaterLevel {
        highwater: 500_000,
        highwater_ok: 10_000,
        interval_secs: 0,
    };
    Config {
        broker: BrokerConfig {
            consume_idle_ms: 50,
            ..BrokerConfig::default()
        },
        backfill: BackfillConfig {
            container_listing_count: page_size,
            water_levels: WaterLevels {
                river: level.clone(),
                object: level.clone(),
                container: level,
            },
            ..BackfillConfig::default()
        },
        ..Config::default()
    }
}

/// A broker client on an in-memory broker with both topologies declared
pub async fn start_broker(config: &Config) -> (InMemoryBroker, BrokerClient) {
    let broker = InMemoryBroker::new();
    let client = BrokerClient::start(config.broker.clone(), broker.connector()).expect("client");
    client.setup_river().await.expect("river topology");
    client.setup_backfill().await.expect("backfill topology");
    (broker, client)
}

pub fn worker(
    queue: EntityType,
    client: &BrokerClient,
    storage: &Arc<FakeStorage>,
    search: &Arc<FakeSearch>,
    config: &Config,
) -> BackfillWorker {
    BackfillWorker::new(
        queue,
        client.clone(),
        Arc::clone(storage) as Arc<dyn StorageClient>,
        Arc::clone(search) as Arc<dyn SearchBackend>,
        config,
    )
}

/// Run account, container and object batches until every backfill queue is empty
pub async fn drain_backfill(
    broker: &InMemoryBroker,
    client: &BrokerClient,
    storage: &Arc<FakeStorage>,
    search: &Arc<FakeSearch>,
    config: &Config,
) {
    let mut workers: Vec<BackfillWorker> = EntityType::ALL
        .into_iter()
        .map(|queue| worker(queue, client, storage, search, config))
        .collect();

    for _ in 0..100 {
        let pending: usize = EntityType::ALL
            .into_iter()
            .map(|queue| broker.depth(&client.backfill_queue_name(queue)))
            .sum();
        if pending == 0 {
            client.flush().await;
            return;
        }
        for worker in &mut workers {
            worker.run_batch().await.expect("batch");
        }
    }
    panic!("backfill did not drain");
}

/// Decode every NDJSON command waiting on the river queue
pub fn river_commands(broker: &InMemoryBroker, client: &BrokerClient) -> Vec<(Value, Option<Value>)> {
    broker
        .queued(client.river_queue_name())
        .into_iter()
        .map(|body| {
            let text = String::from_utf8(body).expect("utf8");
            let mut lines = text.lines();
            let action = serde_json::from_str(lines.next().expect("action line")).expect("json");
            let document = lines.next().map(|l| serde_json::from_str(l).expect("json"));
            (action, document)
        })
        .collect()
}

/// Decoded task bodies waiting on a backfill queue
pub fn queued_tasks(
    broker: &InMemoryBroker,
    client: &BrokerClient,
    queue: EntityType,
) -> Vec<BackfillTask> {
    broker
        .queued(&client.backfill_queue_name(queue))
        .into_iter()
        .map(|body| BackfillTask::from_json(&body).expect("task json"))
        .collect()
}
