//! Payload models for stream-type events.
//!
//! Run and broadcast events carry an opaque payload map; these types give it
//! shape. Field names mirror the producer's JSON exactly (PascalCase for run
//! snapshots, snake_case for broadcast bodies) and must not be renamed.

use serde::{Deserialize, Serialize};

#[derive(Debug, Clone, Default, Serialize, Deserialize, PartialEq, Eq)]
pub struct RunTag {
    #[serde(rename = "Tag", default)]
    pub tag: String,
    #[serde(rename = "Value", default)]
    pub value: String,
}

/// Top-level snapshot of one workflow run, as carried by a run event.
#[derive(Debug, Clone, Default, Serialize, Deserialize, PartialEq, Eq)]
pub struct WorkflowRun {
    #[serde(rename = "ID", default)]
    pub id: i64,
    #[serde(rename = "Number", default)]
    pub num: i64,
    #[serde(rename = "Status", default)]
    pub status: String,
    #[serde(rename = "Start", default)]
    pub start: i64,
    #[serde(rename = "LastModified", default)]
    pub last_modified: i64,
    #[serde(rename = "Tags", default)]
    pub tags: Vec<RunTag>,
}

/// Snapshot of one node execution inside a workflow run.
#[derive(Debug, Clone, Default, Serialize, Deserialize, PartialEq, Eq)]
pub struct WorkflowNodeRun {
    #[serde(rename = "ID", default)]
    pub id: i64,
    #[serde(rename = "Number", default)]
    pub num: i64,
    #[serde(rename = "SubNumber", default)]
    pub sub_num: i64,
    #[serde(rename = "Status", default)]
    pub status: String,
    #[serde(rename = "WorkflowRunID", default)]
    pub workflow_run_id: i64,
    #[serde(rename = "Start", default)]
    pub start: i64,
    #[serde(rename = "Done", default)]
    pub done: i64,
}

/// A global announcement. Identified by `id`; upserts replace by id.
#[derive(Debug, Clone, Default, Serialize, Deserialize, PartialEq, Eq)]
pub struct Broadcast {
    #[serde(default)]
    pub id: i64,
    #[serde(default)]
    pub title: String,
    #[serde(default)]
    pub content: String,
    #[serde(default)]
    pub level: String,
    #[serde(default)]
    pub project_key: Option<String>,
    #[serde(default)]
    pub created: i64,
    #[serde(default)]
    pub updated: i64,
    #[serde(default)]
    pub archived: bool,
}
