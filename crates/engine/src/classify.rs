//! Event classification: raw transport records into typed, validated events.

use coho_core::{CohoError, CohoResult, EntityKey, EventKind, Family, RawEvent};

/// A classified event: kind resolved, key fields validated for its family.
#[derive(Debug, Clone)]
pub struct Event {
    pub kind: EventKind,
    pub actor: String,
    pub project_key: String,
    pub application_name: Option<String>,
    pub pipeline_name: Option<String>,
    pub workflow_name: Option<String>,
    pub payload: serde_json::Map<String, serde_json::Value>,
}

impl Event {
    /// Cache key of the entity this event addresses within `family`.
    /// `None` for stream families, which have no per-key cache entry here.
    pub fn subject_key(&self, family: Family) -> Option<EntityKey> {
        match family {
            Family::Project => Some(EntityKey::project(&self.project_key)),
            Family::Application => self
                .application_name
                .as_deref()
                .map(|n| EntityKey::scoped(&self.project_key, n)),
            Family::Pipeline => self
                .pipeline_name
                .as_deref()
                .map(|n| EntityKey::scoped(&self.project_key, n)),
            Family::Workflow => self
                .workflow_name
                .as_deref()
                .map(|n| EntityKey::scoped(&self.project_key, n)),
            Family::WorkflowRun | Family::Broadcast => None,
        }
    }
}

fn require<'a>(
    value: Option<&'a str>,
    kind: EventKind,
    field: &'static str,
) -> CohoResult<&'a str> {
    match value {
        Some(v) if !v.is_empty() => Ok(v),
        _ => Err(CohoError::MissingRequiredKey { kind: kind.as_str(), field }),
    }
}

/// Resolve the event kind and check the fields its family needs to build a
/// cache key. Total over the known vocabulary; anything else is
/// [`CohoError::UnrecognizedEventKind`].
pub fn classify(raw: &RawEvent) -> CohoResult<Event> {
    let kind = EventKind::parse(&raw.type_event)
        .ok_or_else(|| CohoError::UnrecognizedEventKind(raw.type_event.clone()))?;

    let family = kind.family();
    if family != Family::Broadcast {
        // Broadcasts are global; everything else is scoped to a project.
        require(Some(raw.project_key.as_str()), kind, "project_key")?;
    }
    match family {
        Family::Application => {
            require(raw.application_name.as_deref(), kind, "application_name")?;
        }
        Family::Pipeline => {
            require(raw.pipeline_name.as_deref(), kind, "pipeline_name")?;
        }
        Family::Workflow => {
            require(raw.workflow_name.as_deref(), kind, "workflow_name")?;
        }
        // Only the run-level event addresses a workflow stream; node-level
        // snapshots carry their run id in the payload.
        Family::WorkflowRun if kind == EventKind::RunWorkflow => {
            require(raw.workflow_name.as_deref(), kind, "workflow_name")?;
        }
        Family::Project | Family::WorkflowRun | Family::Broadcast => {}
    }

    Ok(Event {
        kind,
        actor: raw.username.clone(),
        project_key: raw.project_key.clone(),
        application_name: raw.application_name.clone(),
        pipeline_name: raw.pipeline_name.clone(),
        workflow_name: raw.workflow_name.clone(),
        payload: raw.payload.clone(),
    })
}
