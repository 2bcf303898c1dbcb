//! Audit entry types.
//!
//! Field names are camelCase on the wire so persisted lists and exports keep
//! the same shape as the logs produced by earlier clients.

use std::fmt;

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

use crate::Error;

/// Where the client is running, stamped onto every audit entry.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct PageContext {
    pub user_agent: String,
    pub url: String,
}

impl PageContext {
    pub fn new(user_agent: impl Into<String>, url: impl Into<String>) -> Self {
        Self { user_agent: user_agent.into(), url: url.into() }
    }
}

/// What happened to a detected version.
///
/// Serialized as its label. Labels this build does not know are kept verbatim
/// in `Other` so rewriting a list never loses them.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(from = "String", into = "String")]
pub enum UpdateAction {
    DetectedNotRefreshed,
    Refreshed,
    Other(String),
}

impl UpdateAction {
    pub fn as_str(&self) -> &str {
        match self {
            UpdateAction::DetectedNotRefreshed => "detected, not refreshed",
            UpdateAction::Refreshed => "refreshed",
            UpdateAction::Other(label) => label,
        }
    }
}

impl From<String> for UpdateAction {
    fn from(label: String) -> Self {
        match label.as_str() {
            "detected, not refreshed" => UpdateAction::DetectedNotRefreshed,
            "refreshed" => UpdateAction::Refreshed,
            _ => UpdateAction::Other(label),
        }
    }
}

impl From<UpdateAction> for String {
    fn from(action: UpdateAction) -> Self {
        match action {
            UpdateAction::Other(label) => label,
            known => known.as_str().to_string(),
        }
    }
}

impl fmt::Display for UpdateAction {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// One detected or handled update.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct UpdateEntry {
    pub timestamp: DateTime<Utc>,
    /// Empty for entries written without a version.
    #[serde(default)]
    pub version: String,
    pub action: UpdateAction,
    #[serde(default)]
    pub user_agent: String,
    #[serde(default)]
    pub url: String,
}

impl UpdateEntry {
    /// Entry stamped with the current time.
    pub fn new(version: impl Into<String>, action: UpdateAction, page: &PageContext) -> Self {
        Self::at(Utc::now(), version, action, page)
    }

    pub fn at(timestamp: DateTime<Utc>, version: impl Into<String>, action: UpdateAction, page: &PageContext) -> Self {
        Self {
            timestamp,
            version: version.into(),
            action,
            user_agent: page.user_agent.clone(),
            url: page.url.clone(),
        }
    }
}

/// One failure, tagged with the phase that failed.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ErrorEntry {
    pub timestamp: DateTime<Utc>,
    pub context: String,
    #[serde(alias = "error")]
    pub error_message: String,
    #[serde(default, alias = "stack", skip_serializing_if = "Option::is_none")]
    pub stack_trace: Option<String>,
    #[serde(default)]
    pub user_agent: String,
    #[serde(default)]
    pub url: String,
}

impl ErrorEntry {
    pub fn new(context: impl Into<String>, message: impl Into<String>, page: &PageContext) -> Self {
        Self {
            timestamp: Utc::now(),
            context: context.into(),
            error_message: message.into(),
            stack_trace: None,
            user_agent: page.user_agent.clone(),
            url: page.url.clone(),
        }
    }

    /// Entry for `err`, with its source chain as the stack trace.
    pub fn from_error(context: impl Into<String>, err: &Error, page: &PageContext) -> Self {
        Self { stack_trace: err.source_chain(), ..Self::new(context, err.to_string(), page) }
    }
}

/// Discriminant of [`AuditEntry`].
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum EntryKind {
    Update,
    Error,
}

/// Either kind of audit record.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(tag = "type", rename_all = "lowercase")]
pub enum AuditEntry {
    Update(UpdateEntry),
    Error(ErrorEntry),
}

impl AuditEntry {
    pub fn kind(&self) -> EntryKind {
        match self {
            AuditEntry::Update(_) => EntryKind::Update,
            AuditEntry::Error(_) => EntryKind::Error,
        }
    }

    pub fn timestamp(&self) -> DateTime<Utc> {
        match self {
            AuditEntry::Update(e) => e.timestamp,
            AuditEntry::Error(e) => e.timestamp,
        }
    }
}

impl From<UpdateEntry> for AuditEntry {
    fn from(entry: UpdateEntry) -> Self {
        AuditEntry::Update(entry)
    }
}

impl From<ErrorEntry> for AuditEntry {
    fn from(entry: ErrorEntry) -> Self {
        AuditEntry::Error(entry)
    }
}
