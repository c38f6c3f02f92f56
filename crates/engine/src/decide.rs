//! The reconciliation decision, as a pure function of its inputs.

use coho_core::{Decision, EntityKey, EventKind, Family, ViewContext};

/// Momentary snapshot of everything a decision depends on: cache presence,
/// the current view context and the current identity. Collected by the
/// caller so the decision itself stays deterministic and ambient-free.
#[derive(Debug, Clone)]
pub struct Observation {
    pub cached: bool,
    pub view: ViewContext,
    pub identity: Option<String>,
}

/// Decide what happens to the `family` cache entry at `key` for one event.
///
/// Order of checks is the policy:
/// 1. a delete always wins, even for the entity on screen;
/// 2. an uncached entity has nothing to reconcile;
/// 3. an unobserved entity is evicted rather than silently patched, so the
///    next view starts from a fresh fetch;
/// 4. a foreign change to the observed entity is a conflict, never a merge;
/// 5. a self-authored change to the observed entity resyncs just the slice
///    the event kind names.
pub fn decide(
    family: Family,
    kind: EventKind,
    key: EntityKey,
    actor: &str,
    obs: &Observation,
) -> Decision {
    if kind.is_delete_of(family) {
        return Decision::Evict(key);
    }
    if !obs.cached {
        return Decision::Ignore;
    }
    if !obs.view.observes(family, &key) {
        return Decision::Evict(key);
    }
    if obs.identity.as_deref() != Some(actor) {
        return Decision::ConflictNotify(key, actor.to_string());
    }
    let opts = match family {
        Family::Project => kind.project_load_opt().into_iter().collect(),
        // Sub-entities are small; self-authored changes refresh them whole.
        _ => Vec::new(),
    };
    Decision::PartialResync(key, opts)
}
