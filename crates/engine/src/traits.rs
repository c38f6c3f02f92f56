//! Collaborator contracts consumed by the engine.
//!
//! The engine performs no I/O of its own; every effect goes through one of
//! these traits. Implementations may be in-memory (see `coho-store`) or
//! backed by a real fetch layer.

use std::sync::Arc;

use serde::Serialize;

use coho_core::{Broadcast, CohoResult, EntityKey, Family, LoadOpt, ViewContext, WorkflowNodeRun, WorkflowRun};

/// One keyed cache of server-owned entities. Operations must be atomic per
/// key; eviction of an absent key is a no-op.
#[async_trait::async_trait]
pub trait EntityCache: Send + Sync {
    async fn contains(&self, key: &EntityKey) -> CohoResult<bool>;
    async fn evict(&self, key: &EntityKey) -> CohoResult<()>;
    /// Flag the entry for conflict display without dropping its data.
    async fn mark_externally_modified(&self, key: &EntityKey) -> CohoResult<()>;
    /// Fetch only the named slices; an empty option list means the whole entity.
    async fn partial_resync(&self, key: &EntityKey, opts: &[LoadOpt]) -> CohoResult<()>;
}

/// Reports what the user is currently looking at.
pub trait ViewOracle: Send + Sync {
    fn current(&self) -> CohoResult<ViewContext>;
}

/// Reports who the local user is, if signed in.
pub trait IdentityOracle: Send + Sync {
    fn current_actor(&self) -> CohoResult<Option<String>>;
}

/// A foreign-authored change to the entity under observation.
#[derive(Debug, Clone, Serialize, PartialEq, Eq)]
pub struct ConflictNotice {
    pub family: Family,
    pub key: EntityKey,
    pub actor: String,
}

impl ConflictNotice {
    /// Human-readable form for display surfaces.
    pub fn message(&self) -> String {
        format!("{} {} was modified by {}", self.family.label(), self.key, self.actor)
    }
}

#[async_trait::async_trait]
pub trait Notifier: Send + Sync {
    async fn conflict(&self, notice: ConflictNotice);
}

/// Global announcement cache, keyed by broadcast id.
#[async_trait::async_trait]
pub trait BroadcastCache: Send + Sync {
    async fn upsert(&self, broadcast: Broadcast) -> CohoResult<()>;
    async fn evict(&self, id: i64) -> CohoResult<()>;
}

/// Fan-out sink for run telemetry. Publication is unconditional; runs have
/// no single owner whose view would gate them.
#[async_trait::async_trait]
pub trait RunStream: Send + Sync {
    async fn publish_run(&self, project_key: &str, workflow_name: &str, run: WorkflowRun);
    async fn publish_node_run(&self, node_run: WorkflowNodeRun);
}

/// The four snapshot caches, one per entity family.
#[derive(Clone)]
pub struct EntityCaches {
    pub projects: Arc<dyn EntityCache>,
    pub applications: Arc<dyn EntityCache>,
    pub pipelines: Arc<dyn EntityCache>,
    pub workflows: Arc<dyn EntityCache>,
}

impl EntityCaches {
    pub(crate) fn for_family(&self, family: Family) -> Option<&Arc<dyn EntityCache>> {
        match family {
            Family::Project => Some(&self.projects),
            Family::Application => Some(&self.applications),
            Family::Pipeline => Some(&self.pipelines),
            Family::Workflow => Some(&self.workflows),
            Family::WorkflowRun | Family::Broadcast => None,
        }
    }
}
