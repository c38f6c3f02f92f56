//! Inbound event vocabulary.
//!
//! The producer tags every notification with an `sdk.Event*` string. That
//! open string space is closed here into [`EventKind`] so routing is an
//! exhaustive match instead of a prefix chain; an unknown string fails
//! classification instead of falling through silently.

use serde::{Deserialize, Serialize};

/// Routing family for an event kind. Families are mutually exclusive;
/// environment events fold into the project family because environments are
/// a project sub-resource with no cache of their own.
#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq, Hash)]
pub enum Family {
    Project,
    Application,
    Pipeline,
    Workflow,
    WorkflowRun,
    Broadcast,
}

impl Family {
    pub fn label(self) -> &'static str {
        match self {
            Family::Project => "project",
            Family::Application => "application",
            Family::Pipeline => "pipeline",
            Family::Workflow => "workflow",
            Family::WorkflowRun => "workflow-run",
            Family::Broadcast => "broadcast",
        }
    }
}

/// A named slice of an entity that can be re-fetched on its own.
/// `query_key` is the fetch option understood by the authority,
/// `field` the entity field it refills. Both are wire contract.
#[derive(Debug, Clone, Copy, Serialize, PartialEq, Eq)]
pub struct LoadOpt {
    pub query_key: &'static str,
    pub field: &'static str,
}

impl LoadOpt {
    pub const WITH_VARIABLES: LoadOpt = LoadOpt { query_key: "withVariables", field: "variables" };
    pub const WITH_GROUPS: LoadOpt = LoadOpt { query_key: "withGroups", field: "groups" };
    pub const WITH_KEYS: LoadOpt = LoadOpt { query_key: "withKeys", field: "keys" };
    pub const WITH_PLATFORMS: LoadOpt = LoadOpt { query_key: "withPlatforms", field: "platforms" };
    pub const WITH_APPLICATION_NAMES: LoadOpt =
        LoadOpt { query_key: "withApplicationNames", field: "application_names" };
    pub const WITH_PIPELINE_NAMES: LoadOpt =
        LoadOpt { query_key: "withPipelineNames", field: "pipeline_names" };
    pub const WITH_ENVIRONMENTS: LoadOpt =
        LoadOpt { query_key: "withEnvironments", field: "environments" };
    pub const WITH_WORKFLOW_NAMES: LoadOpt =
        LoadOpt { query_key: "withWorkflowNames", field: "workflow_names" };
}

macro_rules! event_kinds {
    ($( $variant:ident => $wire:literal ),+ $(,)?) => {
        /// Closed set of event kinds emitted by the authority.
        #[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq, Hash)]
        pub enum EventKind {
            $( $variant, )+
        }

        impl EventKind {
            /// Every known kind, for totality checks.
            pub const ALL: &'static [EventKind] = &[ $( EventKind::$variant, )+ ];

            /// Wire name as emitted by the authority.
            pub fn as_str(self) -> &'static str {
                match self {
                    $( EventKind::$variant => $wire, )+
                }
            }

            /// Exact inverse of [`EventKind::as_str`].
            pub fn parse(s: &str) -> Option<EventKind> {
                match s {
                    $( $wire => Some(EventKind::$variant), )+
                    _ => None,
                }
            }
        }
    };
}

event_kinds! {
    ProjectAdd => "sdk.EventProjectAdd",
    ProjectUpdate => "sdk.EventProjectUpdate",
    ProjectDelete => "sdk.EventProjectDelete",
    ProjectVariableAdd => "sdk.EventProjectVariableAdd",
    ProjectVariableUpdate => "sdk.EventProjectVariableUpdate",
    ProjectVariableDelete => "sdk.EventProjectVariableDelete",
    ProjectPermissionAdd => "sdk.EventProjectPermissionAdd",
    ProjectPermissionDelete => "sdk.EventProjectPermissionDelete",
    ProjectKeyAdd => "sdk.EventProjectKeyAdd",
    ProjectKeyDelete => "sdk.EventProjectKeyDelete",
    ProjectPlatformAdd => "sdk.EventProjectPlatformAdd",
    ProjectPlatformUpdate => "sdk.EventProjectPlatformUpdate",
    ProjectPlatformDelete => "sdk.EventProjectPlatformDelete",
    EnvironmentAdd => "sdk.EventEnvironmentAdd",
    EnvironmentUpdate => "sdk.EventEnvironmentUpdate",
    EnvironmentDelete => "sdk.EventEnvironmentDelete",
    EnvironmentVariableAdd => "sdk.EventEnvironmentVariableAdd",
    EnvironmentVariableUpdate => "sdk.EventEnvironmentVariableUpdate",
    EnvironmentVariableDelete => "sdk.EventEnvironmentVariableDelete",
    ApplicationAdd => "sdk.EventApplicationAdd",
    ApplicationUpdate => "sdk.EventApplicationUpdate",
    ApplicationDelete => "sdk.EventApplicationDelete",
    ApplicationVariableAdd => "sdk.EventApplicationVariableAdd",
    ApplicationVariableUpdate => "sdk.EventApplicationVariableUpdate",
    ApplicationVariableDelete => "sdk.EventApplicationVariableDelete",
    ApplicationKeyAdd => "sdk.EventApplicationKeyAdd",
    ApplicationKeyDelete => "sdk.EventApplicationKeyDelete",
    PipelineAdd => "sdk.EventPipelineAdd",
    PipelineUpdate => "sdk.EventPipelineUpdate",
    PipelineDelete => "sdk.EventPipelineDelete",
    PipelineParameterAdd => "sdk.EventPipelineParameterAdd",
    PipelineParameterUpdate => "sdk.EventPipelineParameterUpdate",
    PipelineParameterDelete => "sdk.EventPipelineParameterDelete",
    WorkflowAdd => "sdk.EventWorkflowAdd",
    WorkflowUpdate => "sdk.EventWorkflowUpdate",
    WorkflowDelete => "sdk.EventWorkflowDelete",
    RunWorkflow => "sdk.EventRunWorkflow",
    RunWorkflowNode => "sdk.EventRunWorkflowNode",
    BroadcastAdd => "sdk.EventBroadcastAdd",
    BroadcastUpdate => "sdk.EventBroadcastUpdate",
    BroadcastDelete => "sdk.EventBroadcastDelete",
}

impl EventKind {
    /// The one family this kind routes to.
    pub fn family(self) -> Family {
        use EventKind::*;
        match self {
            ProjectAdd | ProjectUpdate | ProjectDelete | ProjectVariableAdd
            | ProjectVariableUpdate | ProjectVariableDelete | ProjectPermissionAdd
            | ProjectPermissionDelete | ProjectKeyAdd | ProjectKeyDelete | ProjectPlatformAdd
            | ProjectPlatformUpdate | ProjectPlatformDelete | EnvironmentAdd | EnvironmentUpdate
            | EnvironmentDelete | EnvironmentVariableAdd | EnvironmentVariableUpdate
            | EnvironmentVariableDelete => Family::Project,
            ApplicationAdd | ApplicationUpdate | ApplicationDelete | ApplicationVariableAdd
            | ApplicationVariableUpdate | ApplicationVariableDelete | ApplicationKeyAdd
            | ApplicationKeyDelete => Family::Application,
            PipelineAdd | PipelineUpdate | PipelineDelete | PipelineParameterAdd
            | PipelineParameterUpdate | PipelineParameterDelete => Family::Pipeline,
            WorkflowAdd | WorkflowUpdate | WorkflowDelete => Family::Workflow,
            RunWorkflow | RunWorkflowNode => Family::WorkflowRun,
            BroadcastAdd | BroadcastUpdate | BroadcastDelete => Family::Broadcast,
        }
    }

    /// Whether the project cache must also reconcile this event. The project
    /// snapshot carries name lists for its sub-entities, so structural
    /// changes to applications, pipelines and workflows touch it too.
    pub fn touches_project(self) -> bool {
        use EventKind::*;
        match self.family() {
            Family::Project => true,
            Family::Application => matches!(self, ApplicationAdd | ApplicationUpdate | ApplicationDelete),
            Family::Pipeline => true,
            Family::Workflow => true,
            Family::WorkflowRun | Family::Broadcast => false,
        }
    }

    /// True when this kind deletes the root entity of `family`.
    pub fn is_delete_of(self, family: Family) -> bool {
        use EventKind::*;
        match family {
            Family::Project => self == ProjectDelete,
            Family::Application => self == ApplicationDelete,
            Family::Pipeline => self == PipelineDelete,
            Family::Workflow => self == WorkflowDelete,
            Family::WorkflowRun => false,
            Family::Broadcast => self == BroadcastDelete,
        }
    }

    /// Sub-resource slice of the project snapshot invalidated by this kind,
    /// or `None` for a full resync. One kind maps to at most one option.
    pub fn project_load_opt(self) -> Option<LoadOpt> {
        use EventKind::*;
        match self {
            ProjectVariableAdd | ProjectVariableUpdate | ProjectVariableDelete => {
                Some(LoadOpt::WITH_VARIABLES)
            }
            ProjectPermissionAdd | ProjectPermissionDelete => Some(LoadOpt::WITH_GROUPS),
            ProjectKeyAdd | ProjectKeyDelete => Some(LoadOpt::WITH_KEYS),
            ProjectPlatformAdd | ProjectPlatformUpdate | ProjectPlatformDelete => {
                Some(LoadOpt::WITH_PLATFORMS)
            }
            EnvironmentAdd | EnvironmentUpdate | EnvironmentDelete | EnvironmentVariableAdd
            | EnvironmentVariableUpdate | EnvironmentVariableDelete => {
                Some(LoadOpt::WITH_ENVIRONMENTS)
            }
            ApplicationAdd | ApplicationUpdate | ApplicationDelete => {
                Some(LoadOpt::WITH_APPLICATION_NAMES)
            }
            PipelineAdd | PipelineUpdate | PipelineDelete | PipelineParameterAdd
            | PipelineParameterUpdate | PipelineParameterDelete => {
                Some(LoadOpt::WITH_PIPELINE_NAMES)
            }
            WorkflowAdd | WorkflowUpdate | WorkflowDelete => Some(LoadOpt::WITH_WORKFLOW_NAMES),
            ProjectAdd | ProjectUpdate | ProjectDelete => None,
            ApplicationVariableAdd | ApplicationVariableUpdate | ApplicationVariableDelete
            | ApplicationKeyAdd | ApplicationKeyDelete => None,
            RunWorkflow | RunWorkflowNode | BroadcastAdd | BroadcastUpdate | BroadcastDelete => {
                None
            }
        }
    }
}

/// One notification as deserialized off the transport. Field names follow
/// the producer's JSON.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct RawEvent {
    pub type_event: String,
    #[serde(default)]
    pub username: String,
    #[serde(default)]
    pub project_key: String,
    #[serde(default)]
    pub application_name: Option<String>,
    #[serde(default)]
    pub pipeline_name: Option<String>,
    #[serde(default)]
    pub environment_name: Option<String>,
    #[serde(default)]
    pub workflow_name: Option<String>,
    #[serde(default)]
    pub payload: serde_json::Map<String, serde_json::Value>,
}
