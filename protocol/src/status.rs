use schemars::JsonSchema;
use serde::Deserialize;
use serde::Serialize;
use ts_rs::TS;

use crate::diagnostic::DiagnosticEntry;

/// Query-time scope handed to every provider when its status stream is
/// requested. Only the global scope exists today.
#[derive(
    Debug, Clone, Copy, Default, PartialEq, Eq, Hash, Serialize, Deserialize, JsonSchema, TS,
)]
#[serde(rename_all = "snake_case")]
#[ts(rename_all = "snake_case")]
#[non_exhaustive]
pub enum CheckScope {
    #[default]
    Global,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize, JsonSchema, TS)]
#[serde(rename_all = "snake_case")]
#[ts(rename_all = "snake_case")]
pub enum StatusCompletion {
    InProgress,
    Completed,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize, JsonSchema, TS)]
#[serde(rename_all = "snake_case")]
#[ts(rename_all = "snake_case")]
pub enum StatusResult {
    Success,
    Failure,
    Error,
}

/// Progress of the unit of work a [`Status`] describes. A result only exists
/// once the work has completed.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize, JsonSchema, TS)]
#[serde(tag = "completion", rename_all = "snake_case")]
#[ts(tag = "completion", rename_all = "snake_case")]
pub enum StatusState {
    InProgress,
    Completed { result: StatusResult },
}

impl StatusState {
    pub fn completion(&self) -> StatusCompletion {
        match self {
            StatusState::InProgress => StatusCompletion::InProgress,
            StatusState::Completed { .. } => StatusCompletion::Completed,
        }
    }

    pub fn result(&self) -> Option<StatusResult> {
        match self {
            StatusState::InProgress => None,
            StatusState::Completed { result } => Some(*result),
        }
    }
}

/// Health or progress record published by a status provider.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize, JsonSchema, TS)]
pub struct Status {
    pub title: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    #[ts(optional)]
    pub description: Option<String>,
    pub state: StatusState,
    /// Diagnostics attached to this status. When the provider names a
    /// diagnostic collection the service fills this in from that collection.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    #[ts(optional)]
    pub diagnostics: Option<Vec<DiagnosticEntry>>,
    /// Join key into the diagnostics service. Never present on statuses
    /// handed out by the service.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    #[ts(optional)]
    pub diagnostic_collection_name: Option<String>,
}

impl Status {
    pub fn new(title: impl Into<String>, state: StatusState) -> Self {
        Self {
            title: title.into(),
            description: None,
            state,
            diagnostics: None,
            diagnostic_collection_name: None,
        }
    }

    pub fn in_progress(title: impl Into<String>) -> Self {
        Self::new(title, StatusState::InProgress)
    }

    pub fn completed(title: impl Into<String>, result: StatusResult) -> Self {
        Self::new(title, StatusState::Completed { result })
    }

    pub fn with_description(mut self, description: impl Into<String>) -> Self {
        self.description = Some(description.into());
        self
    }

    pub fn with_diagnostic_collection(mut self, name: impl Into<String>) -> Self {
        self.diagnostic_collection_name = Some(name.into());
        self
    }
}

/// A [`Status`] tagged with the registration name of the provider that
/// produced it. The name identifies the entry within a merged list.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize, JsonSchema, TS)]
pub struct WrappedStatus {
    pub name: String,
    pub status: Status,
}

impl WrappedStatus {
    pub fn new(name: impl Into<String>, status: Status) -> Self {
        Self {
            name: name.into(),
            status,
        }
    }
}
