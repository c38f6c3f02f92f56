//! Stream-type events: run telemetry fan-out and broadcast upserts.
//!
//! Neither applies presence, view or identity checks. Run telemetry is
//! multi-viewer and append-only; broadcasts are global. Payload field names
//! (`Broadcast`, `NewBroadcast`, `BroadcastID`) are wire contract.

use serde::de::DeserializeOwned;
use tracing::{debug, warn};

use coho_core::{Broadcast, EventKind, WorkflowNodeRun, WorkflowRun};

use crate::classify::Event;
use crate::Reconciler;

fn parse_payload<T: DeserializeOwned>(
    payload: &serde_json::Map<String, serde_json::Value>,
) -> serde_json::Result<T> {
    serde_json::from_value(serde_json::Value::Object(payload.clone()))
}

impl Reconciler {
    pub(crate) async fn fan_out_run(&self, event: &Event) {
        match event.kind {
            EventKind::RunWorkflow => {
                let Some(workflow) = event.workflow_name.as_deref() else {
                    warn!(kind = %event.kind.as_str(), "run event without workflow name, dropping");
                    debug_assert!(false, "classified run event without workflow name");
                    return;
                };
                match parse_payload::<WorkflowRun>(&event.payload) {
                    Ok(run) => {
                        debug!(project = %event.project_key, workflow = %workflow, num = run.num, "publishing run");
                        self.runs.publish_run(&event.project_key, workflow, run).await;
                    }
                    Err(err) => warn!(error = %err, "malformed run payload, dropping"),
                }
            }
            EventKind::RunWorkflowNode => match parse_payload::<WorkflowNodeRun>(&event.payload) {
                Ok(node_run) => {
                    debug!(run_id = node_run.workflow_run_id, "publishing node run");
                    self.runs.publish_node_run(node_run).await;
                }
                Err(err) => warn!(error = %err, "malformed node run payload, dropping"),
            },
            other => debug!(kind = %other.as_str(), "not a run event"),
        }
    }

    pub(crate) async fn apply_broadcast(&self, event: &Event) {
        match event.kind {
            EventKind::BroadcastAdd => self.upsert_broadcast(event, "Broadcast").await,
            EventKind::BroadcastUpdate => self.upsert_broadcast(event, "NewBroadcast").await,
            EventKind::BroadcastDelete => {
                let Some(id) = event.payload.get("BroadcastID").and_then(|v| v.as_i64()) else {
                    warn!("broadcast delete without BroadcastID, dropping");
                    return;
                };
                if let Err(err) = self.broadcasts.evict(id).await {
                    warn!(id, error = %err, "broadcast evict failed");
                }
            }
            other => debug!(kind = %other.as_str(), "not a broadcast event"),
        }
    }

    async fn upsert_broadcast(&self, event: &Event, field: &'static str) {
        let Some(body) = event.payload.get(field) else {
            warn!(field, "broadcast event without body, dropping");
            return;
        };
        match serde_json::from_value::<Broadcast>(body.clone()) {
            Ok(broadcast) => {
                debug!(id = broadcast.id, "upserting broadcast");
                if let Err(err) = self.broadcasts.upsert(broadcast).await {
                    warn!(error = %err, "broadcast upsert failed");
                }
            }
            Err(err) => warn!(field, error = %err, "malformed broadcast body, dropping"),
        }
    }
}
