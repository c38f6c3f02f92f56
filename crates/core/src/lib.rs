//! Coho core types: event vocabulary, cache keys, view context and the
//! reconciliation decision model. No I/O lives here.

#![forbid(unsafe_code)]

use serde::{Deserialize, Serialize};

pub mod event;
pub mod model;

pub use event::{EventKind, Family, LoadOpt, RawEvent};
pub use model::{Broadcast, RunTag, WorkflowNodeRun, WorkflowRun};

/// Composite cache key: a project key plus, for sub-entities, the entity's
/// own name. The wire form is `"{project}-{name}"`.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq, Hash)]
pub struct EntityKey {
    pub project: String,
    pub name: Option<String>,
}

impl EntityKey {
    pub fn project(project: impl Into<String>) -> Self {
        Self { project: project.into(), name: None }
    }

    pub fn scoped(project: impl Into<String>, name: impl Into<String>) -> Self {
        Self { project: project.into(), name: Some(name.into()) }
    }

    /// Flat key used by the cache collaborators.
    pub fn cache_key(&self) -> String {
        match &self.name {
            Some(n) => format!("{}-{}", self.project, n),
            None => self.project.clone(),
        }
    }
}

impl std::fmt::Display for EntityKey {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(&self.cache_key())
    }
}

/// Current observation focus: which project, and which sub-entity inside it,
/// the user is presently looking at. One context exists at a time.
#[derive(Debug, Clone, Default, Serialize, Deserialize, PartialEq, Eq)]
pub struct ViewContext {
    pub project: Option<String>,
    pub application: Option<String>,
    pub pipeline: Option<String>,
    pub workflow: Option<String>,
}

impl ViewContext {
    /// True when the given key is the active subject for `family`.
    pub fn observes(&self, family: Family, key: &EntityKey) -> bool {
        if self.project.as_deref() != Some(key.project.as_str()) {
            return false;
        }
        let sub = match family {
            Family::Project => return true,
            Family::Application => self.application.as_deref(),
            Family::Pipeline => self.pipeline.as_deref(),
            Family::Workflow => self.workflow.as_deref(),
            // Runs and broadcasts have no single owner to observe.
            Family::WorkflowRun | Family::Broadcast => return false,
        };
        sub.is_some() && sub == key.name.as_deref()
    }
}

/// Outcome of reconciling one event against one cache.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Decision {
    /// Nothing to do (entity not cached).
    Ignore,
    /// Drop the cached entry; the next view triggers a fresh fetch.
    Evict(EntityKey),
    /// Re-fetch only the named slice of the entity.
    PartialResync(EntityKey, Vec<LoadOpt>),
    /// Foreign change to the entity under observation; surface it.
    ConflictNotify(EntityKey, String),
}

impl Decision {
    /// Stable label for logs and metrics.
    pub fn label(&self) -> &'static str {
        match self {
            Decision::Ignore => "ignore",
            Decision::Evict(_) => "evict",
            Decision::PartialResync(..) => "partial_resync",
            Decision::ConflictNotify(..) => "conflict_notify",
        }
    }
}

/// Errors suitable for transport across the engine boundary.
#[derive(Debug, thiserror::Error)]
pub enum CohoError {
    #[error("unrecognized event kind: {0}")]
    UnrecognizedEventKind(String),
    #[error("event {kind} is missing required field {field}")]
    MissingRequiredKey { kind: &'static str, field: &'static str },
    #[error("collaborator unavailable: {0}")]
    Collaborator(String),
}

pub type CohoResult<T> = Result<T, CohoError>;

pub mod prelude {
    pub use super::{
        CohoError, CohoResult, Decision, EntityKey, EventKind, Family, LoadOpt, RawEvent,
        ViewContext,
    };
}
