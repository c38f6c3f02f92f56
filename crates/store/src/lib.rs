//! In-memory reference collaborators for the coho engine.
//!
//! These back the integration tests and any embedding that keeps its caches
//! in RAM. A real deployment swaps `MemEntityCache::partial_resync` for an
//! actual fetch; everything else is production-shaped.

#![forbid(unsafe_code)]

use std::collections::HashMap;
use std::sync::Mutex;

use arc_swap::ArcSwap;
use chrono::{DateTime, Utc};
use metrics::counter;
use rustc_hash::FxHashMap;
use tokio::sync::broadcast;
use tracing::{debug, info};

use coho_core::{
    Broadcast, CohoResult, EntityKey, LoadOpt, ViewContext, WorkflowNodeRun, WorkflowRun,
};
use coho_engine::{
    BroadcastCache, ConflictNotice, EntityCache, IdentityOracle, Notifier, RunStream, ViewOracle,
};

/// One recorded partial-resync request, for observation by the fetch layer
/// (or by tests).
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ResyncRequest {
    pub key: String,
    pub opts: Vec<LoadOpt>,
}

#[derive(Debug, Clone)]
struct Entry {
    value: serde_json::Value,
    externally_modified: bool,
    touched: DateTime<Utc>,
}

/// Keyed snapshot cache for one entity family.
pub struct MemEntityCache {
    name: &'static str,
    inner: Mutex<FxHashMap<String, Entry>>,
    resyncs: Mutex<Vec<ResyncRequest>>,
}

impl MemEntityCache {
    pub fn new(name: &'static str) -> Self {
        Self { name, inner: Mutex::new(FxHashMap::default()), resyncs: Mutex::new(Vec::new()) }
    }

    /// Insert a fetched snapshot. First fetch happens outside the engine.
    pub fn put(&self, key: &EntityKey, value: serde_json::Value) {
        let entry = Entry { value, externally_modified: false, touched: Utc::now() };
        self.inner.lock().unwrap().insert(key.cache_key(), entry);
    }

    pub fn get(&self, key: &EntityKey) -> Option<serde_json::Value> {
        self.inner.lock().unwrap().get(&key.cache_key()).map(|e| e.value.clone())
    }

    pub fn len(&self) -> usize {
        self.inner.lock().unwrap().len()
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }

    pub fn is_externally_modified(&self, key: &EntityKey) -> bool {
        self.inner
            .lock()
            .unwrap()
            .get(&key.cache_key())
            .map(|e| e.externally_modified)
            .unwrap_or(false)
    }

    pub fn last_touched(&self, key: &EntityKey) -> Option<DateTime<Utc>> {
        self.inner.lock().unwrap().get(&key.cache_key()).map(|e| e.touched)
    }

    /// Resync requests issued so far, in order.
    pub fn resync_requests(&self) -> Vec<ResyncRequest> {
        self.resyncs.lock().unwrap().clone()
    }
}

#[async_trait::async_trait]
impl EntityCache for MemEntityCache {
    async fn contains(&self, key: &EntityKey) -> CohoResult<bool> {
        Ok(self.inner.lock().unwrap().contains_key(&key.cache_key()))
    }

    async fn evict(&self, key: &EntityKey) -> CohoResult<()> {
        let removed = self.inner.lock().unwrap().remove(&key.cache_key()).is_some();
        if removed {
            counter!("coho_store_evictions_total", 1, "cache" => self.name);
            debug!(cache = self.name, key = %key, "evicted");
        }
        Ok(())
    }

    async fn mark_externally_modified(&self, key: &EntityKey) -> CohoResult<()> {
        if let Some(entry) = self.inner.lock().unwrap().get_mut(&key.cache_key()) {
            entry.externally_modified = true;
        }
        Ok(())
    }

    async fn partial_resync(&self, key: &EntityKey, opts: &[LoadOpt]) -> CohoResult<()> {
        // A real fetch layer would refill the named slices here; the
        // in-memory cache records the request and refreshes the entry.
        self.resyncs
            .lock()
            .unwrap()
            .push(ResyncRequest { key: key.cache_key(), opts: opts.to_vec() });
        if let Some(entry) = self.inner.lock().unwrap().get_mut(&key.cache_key()) {
            entry.touched = Utc::now();
        }
        debug!(cache = self.name, key = %key, opts = opts.len(), "partial resync requested");
        Ok(())
    }
}

/// Global announcement cache keyed by broadcast id.
#[derive(Default)]
pub struct BroadcastStore {
    inner: Mutex<FxHashMap<i64, Broadcast>>,
}

impl BroadcastStore {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn get(&self, id: i64) -> Option<Broadcast> {
        self.inner.lock().unwrap().get(&id).cloned()
    }

    pub fn len(&self) -> usize {
        self.inner.lock().unwrap().len()
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }

    /// All broadcasts, newest first.
    pub fn all(&self) -> Vec<Broadcast> {
        let mut out: Vec<Broadcast> = self.inner.lock().unwrap().values().cloned().collect();
        out.sort_by(|a, b| b.updated.cmp(&a.updated).then(b.id.cmp(&a.id)));
        out
    }
}

#[async_trait::async_trait]
impl BroadcastCache for BroadcastStore {
    async fn upsert(&self, broadcast: Broadcast) -> CohoResult<()> {
        debug!(id = broadcast.id, "broadcast upsert");
        self.inner.lock().unwrap().insert(broadcast.id, broadcast);
        Ok(())
    }

    async fn evict(&self, id: i64) -> CohoResult<()> {
        self.inner.lock().unwrap().remove(&id);
        Ok(())
    }
}

fn stream_key(project_key: &str, workflow_name: &str) -> String {
    format!("{}|{}", project_key, workflow_name)
}

/// Fan-out hub for run telemetry. One broadcast channel per
/// project+workflow stream, created lazily on first publish or subscribe;
/// node-level snapshots share a single channel.
pub struct RunHub {
    capacity: usize,
    runs: Mutex<HashMap<String, broadcast::Sender<WorkflowRun>>>,
    node_tx: broadcast::Sender<WorkflowNodeRun>,
}

impl RunHub {
    pub fn new(capacity: usize) -> Self {
        let (node_tx, _) = broadcast::channel(capacity);
        Self { capacity, runs: Mutex::new(HashMap::new()), node_tx }
    }

    fn sender_for(&self, key: String) -> broadcast::Sender<WorkflowRun> {
        let mut map = self.runs.lock().unwrap();
        map.entry(key)
            .or_insert_with(|| broadcast::channel(self.capacity).0)
            .clone()
    }

    pub fn subscribe_runs(
        &self,
        project_key: &str,
        workflow_name: &str,
    ) -> broadcast::Receiver<WorkflowRun> {
        self.sender_for(stream_key(project_key, workflow_name)).subscribe()
    }

    pub fn subscribe_node_runs(&self) -> broadcast::Receiver<WorkflowNodeRun> {
        self.node_tx.subscribe()
    }
}

#[async_trait::async_trait]
impl RunStream for RunHub {
    async fn publish_run(&self, project_key: &str, workflow_name: &str, run: WorkflowRun) {
        counter!("coho_runs_published_total", 1);
        // send() errs only when nobody subscribes; that is fine for telemetry.
        let _ = self.sender_for(stream_key(project_key, workflow_name)).send(run);
    }

    async fn publish_node_run(&self, node_run: WorkflowNodeRun) {
        let _ = self.node_tx.send(node_run);
    }
}

/// Current navigation focus, swapped atomically as the user moves around.
#[derive(Default)]
pub struct ViewState {
    inner: ArcSwap<ViewContext>,
}

impl ViewState {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn set(&self, ctx: ViewContext) {
        self.inner.store(std::sync::Arc::new(ctx));
    }

    pub fn clear(&self) {
        self.set(ViewContext::default());
    }
}

impl ViewOracle for ViewState {
    fn current(&self) -> CohoResult<ViewContext> {
        Ok(ViewContext::clone(&self.inner.load()))
    }
}

/// Current signed-in user, if any.
#[derive(Default)]
pub struct SessionIdentity {
    inner: ArcSwap<Option<String>>,
}

impl SessionIdentity {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn sign_in(&self, actor: impl Into<String>) {
        self.inner.store(std::sync::Arc::new(Some(actor.into())));
    }

    pub fn sign_out(&self) {
        self.inner.store(std::sync::Arc::new(None));
    }
}

impl IdentityOracle for SessionIdentity {
    fn current_actor(&self) -> CohoResult<Option<String>> {
        Ok(Option::clone(&self.inner.load()))
    }
}

/// Conflict notices, kept for display and re-broadcast to live subscribers.
pub struct ConflictFeed {
    seen: Mutex<Vec<ConflictNotice>>,
    tx: broadcast::Sender<ConflictNotice>,
}

impl ConflictFeed {
    pub fn new(capacity: usize) -> Self {
        let (tx, _) = broadcast::channel(capacity);
        Self { seen: Mutex::new(Vec::new()), tx }
    }

    pub fn subscribe(&self) -> broadcast::Receiver<ConflictNotice> {
        self.tx.subscribe()
    }

    pub fn recent(&self) -> Vec<ConflictNotice> {
        self.seen.lock().unwrap().clone()
    }
}

#[async_trait::async_trait]
impl Notifier for ConflictFeed {
    async fn conflict(&self, notice: ConflictNotice) {
        info!(message = %notice.message(), "conflict");
        self.seen.lock().unwrap().push(notice.clone());
        let _ = self.tx.send(notice);
    }
}
