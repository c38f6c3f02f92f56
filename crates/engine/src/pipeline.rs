//! Sequential event pipeline: one event at a time, in delivery order.

use std::sync::Arc;

use tokio::sync::mpsc;
use tokio::task::JoinHandle;
use tracing::info;

use coho_core::RawEvent;

use crate::Reconciler;

/// Consume events until the sender side closes. Decisions are computed
/// inline; only resync execution is spawned, so ordering of decisions
/// follows delivery order.
pub fn spawn_pipeline(
    reconciler: Arc<Reconciler>,
    mut events: mpsc::Receiver<RawEvent>,
) -> JoinHandle<()> {
    tokio::spawn(async move {
        info!("event pipeline started");
        while let Some(raw) = events.recv().await {
            reconciler.handle(raw).await;
        }
        info!("event pipeline stopped");
    })
}
