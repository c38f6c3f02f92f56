//! Coho reconciliation engine.
//!
//! Consumes change notifications from the authority and decides, per event
//! and per affected cache, whether the local copy is left alone, refreshed,
//! evicted, or flagged as a conflict for the person looking at it. All
//! effects go through the collaborator traits in [`traits`]; the decision
//! itself ([`decide::decide`]) is a pure function.

#![forbid(unsafe_code)]

use std::sync::Arc;

use metrics::counter;
use tracing::{debug, warn};

use coho_core::{Decision, Family, RawEvent};

pub mod classify;
pub mod decide;
pub mod pipeline;
mod streams;
pub mod traits;

pub use classify::{classify, Event};
pub use decide::{decide, Observation};
pub use pipeline::spawn_pipeline;
pub use traits::{
    BroadcastCache, ConflictNotice, EntityCache, EntityCaches, IdentityOracle, Notifier,
    RunStream, ViewOracle,
};

/// Dispatches classified events to the per-family reconcilers and the
/// stream handlers. One instance serves the whole event pipeline.
pub struct Reconciler {
    caches: EntityCaches,
    broadcasts: Arc<dyn BroadcastCache>,
    runs: Arc<dyn RunStream>,
    notifier: Arc<dyn Notifier>,
    view: Arc<dyn ViewOracle>,
    identity: Arc<dyn IdentityOracle>,
}

impl Reconciler {
    pub fn new(
        caches: EntityCaches,
        broadcasts: Arc<dyn BroadcastCache>,
        runs: Arc<dyn RunStream>,
        notifier: Arc<dyn Notifier>,
        view: Arc<dyn ViewOracle>,
        identity: Arc<dyn IdentityOracle>,
    ) -> Self {
        Self { caches, broadcasts, runs, notifier, view, identity }
    }

    /// Process one event. Never fails: malformed input is logged and
    /// dropped so one bad event cannot halt the stream.
    pub async fn handle(&self, raw: RawEvent) {
        counter!("coho_events_total", 1);
        let event = match classify(&raw) {
            Ok(event) => event,
            Err(err) => {
                warn!(kind = %raw.type_event, error = %err, "dropping event");
                counter!("coho_events_dropped_total", 1);
                return;
            }
        };
        // Structural changes to sub-entities invalidate the project's name
        // lists, so the project cache reconciles those events as well.
        if event.kind.touches_project() {
            self.reconcile(Family::Project, &event).await;
        }
        match event.kind.family() {
            Family::Project => {}
            family @ (Family::Application | Family::Pipeline | Family::Workflow) => {
                self.reconcile(family, &event).await;
            }
            Family::WorkflowRun => self.fan_out_run(&event).await,
            Family::Broadcast => self.apply_broadcast(&event).await,
        }
    }

    async fn reconcile(&self, family: Family, event: &Event) {
        let Some(cache) = self.caches.for_family(family) else { return };
        let Some(key) = event.subject_key(family) else {
            // classify() validated the name fields; reaching this is a bug.
            warn!(kind = %event.kind.as_str(), family = family.label(), "no subject key, dropping");
            debug_assert!(false, "classified event without subject key");
            return;
        };
        if event.kind.is_delete_of(family) {
            // Deletes win unconditionally, even for the entity on screen.
            debug!(family = family.label(), key = %key, "delete event, evicting");
            self.execute(family, cache, Decision::Evict(key)).await;
            return;
        }
        let obs = match self.observe(cache, &key).await {
            Ok(obs) => obs,
            Err(err) => {
                // Without the collaborators no decision can be made;
                // eviction is the safe degrade.
                warn!(family = family.label(), key = %key, error = %err, "collaborator unavailable, evicting");
                self.execute(family, cache, Decision::Evict(key)).await;
                return;
            }
        };
        let decision = decide(family, event.kind, key, &event.actor, &obs);
        debug!(family = family.label(), actor = %event.actor, decision = decision.label(), "reconciled");
        self.execute(family, cache, decision).await;
    }

    async fn observe(
        &self,
        cache: &Arc<dyn EntityCache>,
        key: &coho_core::EntityKey,
    ) -> coho_core::CohoResult<Observation> {
        let cached = cache.contains(key).await?;
        let view = self.view.current()?;
        let identity = self.identity.current_actor()?;
        Ok(Observation { cached, view, identity })
    }

    async fn execute(&self, family: Family, cache: &Arc<dyn EntityCache>, decision: Decision) {
        counter!("coho_decisions_total", 1, "decision" => decision.label());
        match decision {
            Decision::Ignore => {}
            Decision::Evict(key) => {
                if let Err(err) = cache.evict(&key).await {
                    warn!(key = %key, error = %err, "evict failed");
                }
            }
            Decision::PartialResync(key, opts) => {
                counter!("coho_resync_requests_total", 1);
                let cache = Arc::clone(cache);
                // Fire and forget: the pipeline never waits on a fetch.
                tokio::spawn(async move {
                    if let Err(err) = cache.partial_resync(&key, &opts).await {
                        warn!(key = %key, error = %err, "partial resync failed");
                    }
                });
            }
            Decision::ConflictNotify(key, actor) => {
                if let Err(err) = cache.mark_externally_modified(&key).await {
                    warn!(key = %key, error = %err, "failed to flag external modification");
                }
                self.notifier
                    .conflict(ConflictNotice { family, key, actor })
                    .await;
            }
        }
    }
}
