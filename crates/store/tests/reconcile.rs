#![forbid(unsafe_code)]

use std::sync::Arc;
use std::time::Duration;

use coho_core::{EntityKey, LoadOpt, RawEvent, ViewContext};
use coho_engine::{spawn_pipeline, EntityCaches, Reconciler};
use coho_store::{
    BroadcastStore, ConflictFeed, MemEntityCache, ResyncRequest, RunHub, SessionIdentity,
    ViewState,
};

struct World {
    projects: Arc<MemEntityCache>,
    applications: Arc<MemEntityCache>,
    pipelines: Arc<MemEntityCache>,
    workflows: Arc<MemEntityCache>,
    broadcasts: Arc<BroadcastStore>,
    runs: Arc<RunHub>,
    notifier: Arc<ConflictFeed>,
    view: Arc<ViewState>,
    identity: Arc<SessionIdentity>,
    reconciler: Arc<Reconciler>,
}

fn world() -> World {
    let _ = tracing_subscriber::fmt().with_env_filter("debug").try_init();
    let projects = Arc::new(MemEntityCache::new("project"));
    let applications = Arc::new(MemEntityCache::new("application"));
    let pipelines = Arc::new(MemEntityCache::new("pipeline"));
    let workflows = Arc::new(MemEntityCache::new("workflow"));
    let broadcasts = Arc::new(BroadcastStore::new());
    let runs = Arc::new(RunHub::new(64));
    let notifier = Arc::new(ConflictFeed::new(64));
    let view = Arc::new(ViewState::new());
    let identity = Arc::new(SessionIdentity::new());
    let reconciler = Arc::new(Reconciler::new(
        EntityCaches {
            projects: projects.clone(),
            applications: applications.clone(),
            pipelines: pipelines.clone(),
            workflows: workflows.clone(),
        },
        broadcasts.clone(),
        runs.clone(),
        notifier.clone(),
        view.clone(),
        identity.clone(),
    ));
    World {
        projects,
        applications,
        pipelines,
        workflows,
        broadcasts,
        runs,
        notifier,
        view,
        identity,
        reconciler,
    }
}

fn project_event(kind: &str, user: &str, project: &str) -> RawEvent {
    RawEvent {
        type_event: kind.into(),
        username: user.into(),
        project_key: project.into(),
        ..Default::default()
    }
}

fn payload(v: serde_json::Value) -> serde_json::Map<String, serde_json::Value> {
    v.as_object().cloned().unwrap_or_default()
}

// Resyncs are fired on a spawned task; give them a moment to land.
async fn settle() {
    tokio::time::sleep(Duration::from_millis(50)).await;
}

#[tokio::test(flavor = "multi_thread", worker_threads = 2)]
async fn self_authored_change_on_observed_project_resyncs_variables() {
    let w = world();
    let acme = EntityKey::project("acme");
    w.projects.put(&acme, serde_json::json!({"key": "acme"}));
    w.view.set(ViewContext { project: Some("acme".into()), ..Default::default() });
    w.identity.sign_in("alice");

    w.reconciler
        .handle(project_event("sdk.EventProjectVariableUpdate", "alice", "acme"))
        .await;
    settle().await;

    assert_eq!(
        w.projects.resync_requests(),
        vec![ResyncRequest { key: "acme".into(), opts: vec![LoadOpt::WITH_VARIABLES] }]
    );
    assert!(w.projects.get(&acme).is_some());
    assert!(w.notifier.recent().is_empty());
}

#[tokio::test(flavor = "multi_thread", worker_threads = 2)]
async fn foreign_change_on_observed_project_raises_a_conflict() {
    let w = world();
    let acme = EntityKey::project("acme");
    w.projects.put(&acme, serde_json::json!({"key": "acme"}));
    w.view.set(ViewContext { project: Some("acme".into()), ..Default::default() });
    w.identity.sign_in("alice");

    w.reconciler
        .handle(project_event("sdk.EventProjectVariableUpdate", "bob", "acme"))
        .await;
    settle().await;

    let notices = w.notifier.recent();
    assert_eq!(notices.len(), 1);
    assert_eq!(notices[0].actor, "bob");
    assert!(w.projects.is_externally_modified(&acme));
    // No resync for a foreign change; the human decides.
    assert!(w.projects.resync_requests().is_empty());
    assert!(w.projects.get(&acme).is_some());
}

#[tokio::test(flavor = "multi_thread", worker_threads = 2)]
async fn unobserved_project_is_evicted() {
    let w = world();
    let acme = EntityKey::project("acme");
    w.projects.put(&acme, serde_json::json!({"key": "acme"}));
    w.view.set(ViewContext { project: Some("other".into()), ..Default::default() });
    w.identity.sign_in("alice");

    w.reconciler
        .handle(project_event("sdk.EventProjectVariableUpdate", "alice", "acme"))
        .await;
    settle().await;

    assert!(w.projects.get(&acme).is_none());
    assert!(w.projects.resync_requests().is_empty());
    assert!(w.notifier.recent().is_empty());
}

#[tokio::test(flavor = "multi_thread", worker_threads = 2)]
async fn events_for_uncached_entities_are_ignored() {
    let w = world();
    w.view.set(ViewContext { project: Some("acme".into()), ..Default::default() });
    w.identity.sign_in("alice");

    w.reconciler
        .handle(project_event("sdk.EventProjectVariableUpdate", "bob", "acme"))
        .await;
    settle().await;

    assert!(w.projects.is_empty());
    assert!(w.projects.resync_requests().is_empty());
    assert!(w.notifier.recent().is_empty());
}

#[tokio::test(flavor = "multi_thread", worker_threads = 2)]
async fn delete_wins_even_when_observed_and_self_authored_and_is_idempotent() {
    let w = world();
    let acme = EntityKey::project("acme");
    w.projects.put(&acme, serde_json::json!({"key": "acme"}));
    w.view.set(ViewContext { project: Some("acme".into()), ..Default::default() });
    w.identity.sign_in("alice");

    let ev = project_event("sdk.EventProjectDelete", "alice", "acme");
    w.reconciler.handle(ev.clone()).await;
    assert!(w.projects.get(&acme).is_none());
    assert!(w.notifier.recent().is_empty());

    // At-least-once delivery: the duplicate is a no-op.
    w.reconciler.handle(ev).await;
    settle().await;
    assert!(w.projects.get(&acme).is_none());
    assert!(w.projects.resync_requests().is_empty());
}

#[tokio::test(flavor = "multi_thread", worker_threads = 2)]
async fn application_change_reconciles_project_and_application_caches() {
    let w = world();
    let acme = EntityKey::project("acme");
    let site = EntityKey::scoped("acme", "site");
    w.projects.put(&acme, serde_json::json!({"key": "acme"}));
    w.applications.put(&site, serde_json::json!({"name": "site"}));
    w.view.set(ViewContext {
        project: Some("acme".into()),
        application: Some("site".into()),
        ..Default::default()
    });
    w.identity.sign_in("alice");

    let mut ev = project_event("sdk.EventApplicationUpdate", "alice", "acme");
    ev.application_name = Some("site".into());
    w.reconciler.handle(ev).await;
    settle().await;

    assert_eq!(
        w.projects.resync_requests(),
        vec![ResyncRequest { key: "acme".into(), opts: vec![LoadOpt::WITH_APPLICATION_NAMES] }]
    );
    assert_eq!(
        w.applications.resync_requests(),
        vec![ResyncRequest { key: "acme-site".into(), opts: vec![] }]
    );
}

#[tokio::test(flavor = "multi_thread", worker_threads = 2)]
async fn application_delete_evicts_both_caches() {
    let w = world();
    let acme = EntityKey::project("acme");
    let site = EntityKey::scoped("acme", "site");
    w.projects.put(&acme, serde_json::json!({"key": "acme"}));
    w.applications.put(&site, serde_json::json!({"name": "site"}));
    // Viewing an unrelated project: the project entry gets evicted too.
    w.view.set(ViewContext { project: Some("other".into()), ..Default::default() });
    w.identity.sign_in("alice");

    let mut ev = project_event("sdk.EventApplicationDelete", "bob", "acme");
    ev.application_name = Some("site".into());
    w.reconciler.handle(ev).await;
    settle().await;

    assert!(w.applications.get(&site).is_none());
    assert!(w.projects.get(&acme).is_none());
}

#[tokio::test(flavor = "multi_thread", worker_threads = 2)]
async fn broadcast_add_update_delete_round_trip() {
    let w = world();

    let mut add = RawEvent { type_event: "sdk.EventBroadcastAdd".into(), ..Default::default() };
    add.payload = payload(serde_json::json!({
        "Broadcast": {"id": 5, "title": "maintenance", "content": "tonight", "level": "warning"}
    }));
    w.reconciler.handle(add).await;
    assert_eq!(w.broadcasts.get(5).unwrap().content, "tonight");

    let mut update = RawEvent { type_event: "sdk.EventBroadcastUpdate".into(), ..Default::default() };
    update.payload = payload(serde_json::json!({
        "NewBroadcast": {"id": 5, "title": "maintenance", "content": "postponed", "level": "info"}
    }));
    w.reconciler.handle(update).await;
    assert_eq!(w.broadcasts.len(), 1);
    assert_eq!(w.broadcasts.get(5).unwrap().content, "postponed");

    let mut del = RawEvent { type_event: "sdk.EventBroadcastDelete".into(), ..Default::default() };
    del.payload = payload(serde_json::json!({"BroadcastID": 5}));
    w.reconciler.handle(del).await;
    assert!(w.broadcasts.is_empty());

    // Deleting an unknown id is a no-op.
    let mut del9 = RawEvent { type_event: "sdk.EventBroadcastDelete".into(), ..Default::default() };
    del9.payload = payload(serde_json::json!({"BroadcastID": 9}));
    w.reconciler.handle(del9).await;
    assert!(w.broadcasts.is_empty());
}

#[tokio::test(flavor = "multi_thread", worker_threads = 2)]
async fn run_fan_out_ignores_cache_and_view_state() {
    let w = world();
    // Nothing cached, nothing viewed, nobody signed in.
    let mut rx = w.runs.subscribe_runs("acme", "release");
    let mut node_rx = w.runs.subscribe_node_runs();

    let mut ev = project_event("sdk.EventRunWorkflow", "", "acme");
    ev.workflow_name = Some("release".into());
    ev.payload = payload(serde_json::json!({"ID": 1, "Number": 42, "Status": "Building"}));
    w.reconciler.handle(ev).await;

    let run = rx.recv().await.unwrap();
    assert_eq!(run.num, 42);
    assert_eq!(run.status, "Building");

    let mut node = project_event("sdk.EventRunWorkflowNode", "", "acme");
    node.payload = payload(serde_json::json!({"ID": 9, "WorkflowRunID": 1, "Status": "Success"}));
    w.reconciler.handle(node).await;
    assert_eq!(node_rx.recv().await.unwrap().workflow_run_id, 1);
}

#[tokio::test(flavor = "multi_thread", worker_threads = 2)]
async fn malformed_events_are_dropped_without_halting_the_stream() {
    let w = world();
    let acme = EntityKey::project("acme");
    w.projects.put(&acme, serde_json::json!({"key": "acme"}));
    w.view.set(ViewContext { project: Some("acme".into()), ..Default::default() });
    w.identity.sign_in("alice");

    // Unknown kind, then a kind missing its key field, then a good event.
    w.reconciler
        .handle(RawEvent { type_event: "sdk.EventSomethingElse".into(), ..Default::default() })
        .await;
    w.reconciler
        .handle(RawEvent { type_event: "sdk.EventApplicationUpdate".into(), project_key: "acme".into(), ..Default::default() })
        .await;
    w.reconciler
        .handle(project_event("sdk.EventProjectVariableUpdate", "alice", "acme"))
        .await;
    settle().await;

    assert_eq!(w.projects.resync_requests().len(), 1);
    assert!(w.projects.get(&acme).is_some());
}

#[tokio::test(flavor = "multi_thread", worker_threads = 2)]
async fn pipeline_processes_events_in_delivery_order() {
    let w = world();
    let acme = EntityKey::project("acme");
    w.projects.put(&acme, serde_json::json!({"key": "acme"}));
    w.view.set(ViewContext { project: Some("acme".into()), ..Default::default() });
    w.identity.sign_in("alice");

    let (tx, rx) = tokio::sync::mpsc::channel(16);
    let handle = spawn_pipeline(w.reconciler.clone(), rx);

    tx.send(project_event("sdk.EventProjectVariableUpdate", "alice", "acme")).await.unwrap();
    tx.send(project_event("sdk.EventProjectKeyAdd", "alice", "acme")).await.unwrap();
    tx.send(project_event("sdk.EventProjectDelete", "alice", "acme")).await.unwrap();
    drop(tx);
    handle.await.unwrap();
    settle().await;

    // Resync execution is fire-and-forget, so only membership is stable.
    let requests = w.projects.resync_requests();
    assert_eq!(requests.len(), 2);
    assert!(requests.iter().any(|r| r.opts == vec![LoadOpt::WITH_VARIABLES]));
    assert!(requests.iter().any(|r| r.opts == vec![LoadOpt::WITH_KEYS]));
    assert!(w.projects.get(&acme).is_none());
}

mod degraded {
    use super::*;
    use coho_core::{CohoError, CohoResult};
    use coho_engine::EntityCache;
    use std::sync::Mutex;

    /// Cache whose lookups fail, recording any evictions it receives.
    struct FailingCache {
        evicted: Mutex<Vec<String>>,
    }

    #[async_trait::async_trait]
    impl EntityCache for FailingCache {
        async fn contains(&self, _key: &EntityKey) -> CohoResult<bool> {
            Err(CohoError::Collaborator("cache offline".into()))
        }
        async fn evict(&self, key: &EntityKey) -> CohoResult<()> {
            self.evicted.lock().unwrap().push(key.cache_key());
            Ok(())
        }
        async fn mark_externally_modified(&self, _key: &EntityKey) -> CohoResult<()> {
            Ok(())
        }
        async fn partial_resync(&self, _key: &EntityKey, _opts: &[LoadOpt]) -> CohoResult<()> {
            Ok(())
        }
    }

    #[tokio::test(flavor = "multi_thread", worker_threads = 2)]
    async fn collaborator_failure_degrades_to_evict() {
        let w = world();
        let failing = Arc::new(FailingCache { evicted: Mutex::new(Vec::new()) });
        let reconciler = Reconciler::new(
            EntityCaches {
                projects: failing.clone(),
                applications: w.applications.clone(),
                pipelines: w.pipelines.clone(),
                workflows: w.workflows.clone(),
            },
            w.broadcasts.clone(),
            w.runs.clone(),
            w.notifier.clone(),
            w.view.clone(),
            w.identity.clone(),
        );

        reconciler
            .handle(project_event("sdk.EventProjectVariableUpdate", "alice", "acme"))
            .await;

        assert_eq!(failing.evicted.lock().unwrap().as_slice(), ["acme"]);
        assert!(w.notifier.recent().is_empty());
    }
}
