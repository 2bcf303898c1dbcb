//! Filtered views, statistics, export and clearing over the audit log.
//!
//! The viewer only depends on [`AuditLog`]; it shares nothing with the
//! detector except the entry format.

pub mod export;
pub mod stats;

pub use export::LogExport;
pub use stats::{LogStats, UpdateFrequency, error_rate, update_frequency};

use std::fmt;

use chrono::{DateTime, Local, Utc};
use serde::Serialize;

use crate::Error;
use crate::audit::{AuditLog, EntryKind, ErrorEntry, UpdateEntry};

/// Longest user agent shown before truncation.
pub const USER_AGENT_DISPLAY_LIMIT: usize = 100;

/// Which entry kinds are visible.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
pub struct LogFilter {
    pub show_updates: bool,
    pub show_errors: bool,
}

impl Default for LogFilter {
    fn default() -> Self {
        Self { show_updates: true, show_errors: true }
    }
}

/// One rendered log line.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct LogItem {
    pub kind: EntryKind,
    /// Local time, `YYYY-MM-DD HH:MM:SS`.
    pub timestamp: String,
    /// `"N/A"` for entries without a version.
    pub version: String,
    pub action: Option<String>,
    pub context: Option<String>,
    pub error: Option<String>,
    pub user_agent: Option<String>,
    pub url: Option<String>,
}

impl LogItem {
    fn from_update(entry: &UpdateEntry) -> Self {
        Self {
            kind: EntryKind::Update,
            timestamp: local_time(entry.timestamp),
            version: if entry.version.is_empty() { "N/A".to_string() } else { entry.version.clone() },
            action: Some(entry.action.to_string()),
            context: None,
            error: None,
            user_agent: non_empty(&entry.user_agent).map(truncate_user_agent),
            url: non_empty(&entry.url).map(str::to_string),
        }
    }

    fn from_error(entry: &ErrorEntry) -> Self {
        Self {
            kind: EntryKind::Error,
            timestamp: local_time(entry.timestamp),
            version: "N/A".to_string(),
            action: None,
            context: non_empty(&entry.context).map(str::to_string),
            error: non_empty(&entry.error_message).map(str::to_string),
            user_agent: non_empty(&entry.user_agent).map(truncate_user_agent),
            url: non_empty(&entry.url).map(str::to_string),
        }
    }
}

/// All items of one kind, newest first.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct LogSection {
    pub kind: EntryKind,
    pub items: Vec<LogItem>,
}

impl LogSection {
    pub fn title(&self) -> &'static str {
        match self.kind {
            EntryKind::Update => "Update records",
            EntryKind::Error => "Error records",
        }
    }

    /// Text shown in place of an empty section.
    pub fn placeholder(&self) -> &'static str {
        match self.kind {
            EntryKind::Update => "No update records",
            EntryKind::Error => "No error records",
        }
    }

    pub fn is_empty(&self) -> bool {
        self.items.is_empty()
    }
}

/// Rendered state of the viewer panel.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub enum LogView {
    /// Both toggles are off.
    NothingSelected,
    Sections(Vec<LogSection>),
}

impl LogView {
    pub fn sections(&self) -> &[LogSection] {
        match self {
            LogView::NothingSelected => &[],
            LogView::Sections(sections) => sections,
        }
    }
}

impl fmt::Display for LogView {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let sections = match self {
            LogView::NothingSelected => return writeln!(f, "Select at least one log type to display"),
            LogView::Sections(sections) => sections,
        };

        for section in sections {
            writeln!(f, "== {} ==", section.title())?;
            if section.is_empty() {
                writeln!(f, "  {}", section.placeholder())?;
                continue;
            }
            for item in &section.items {
                write_item(f, item)?;
            }
        }
        Ok(())
    }
}

fn write_item(f: &mut fmt::Formatter<'_>, item: &LogItem) -> fmt::Result {
    let marker = match item.kind {
        EntryKind::Update => "+",
        EntryKind::Error => "!",
    };
    writeln!(f, "{marker} {}  version: {}", item.timestamp, item.version)?;
    if let Some(action) = &item.action {
        writeln!(f, "    {action}")?;
    }
    if let Some(context) = &item.context {
        writeln!(f, "    context: {context}")?;
    }
    if let Some(error) = &item.error {
        writeln!(f, "    error: {error}")?;
    }
    if let Some(user_agent) = &item.user_agent {
        writeln!(f, "    user agent: {user_agent}")?;
    }
    if let Some(url) = &item.url {
        writeln!(f, "    url: {url}")?;
    }
    Ok(())
}

/// Explicit user confirmation before logs are destroyed.
#[async_trait::async_trait]
pub trait ClearPrompt: Send + Sync {
    async fn confirm_clear(&self) -> bool;
}

/// Result of [`LogViewer::clear`].
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum ClearOutcome {
    Cancelled,
    /// Logs were cleared; carries the re-rendered view.
    Cleared(LogView),
}

/// Read-side companion of the audit log.
#[derive(Debug, Clone)]
pub struct LogViewer {
    audit: AuditLog,
    filter: LogFilter,
}

impl LogViewer {
    pub fn new(audit: AuditLog) -> Self {
        Self { audit, filter: LogFilter::default() }
    }

    pub fn with_filter(mut self, filter: LogFilter) -> Self {
        self.filter = filter;
        self
    }

    pub fn filter(&self) -> LogFilter {
        self.filter
    }

    pub fn set_filter(&mut self, filter: LogFilter) {
        self.filter = filter;
    }

    /// Flip update visibility; returns the new value.
    pub fn toggle_updates(&mut self) -> bool {
        self.filter.show_updates = !self.filter.show_updates;
        self.filter.show_updates
    }

    /// Flip error visibility; returns the new value.
    pub fn toggle_errors(&mut self) -> bool {
        self.filter.show_errors = !self.filter.show_errors;
        self.filter.show_errors
    }

    pub async fn render(&self) -> LogView {
        if !self.filter.show_updates && !self.filter.show_errors {
            return LogView::NothingSelected;
        }

        let mut sections = Vec::with_capacity(2);
        if self.filter.show_updates {
            let updates = self.audit.list_updates().await;
            sections.push(LogSection {
                kind: EntryKind::Update,
                items: updates.iter().map(LogItem::from_update).collect(),
            });
        }
        if self.filter.show_errors {
            let errors = self.audit.list_errors().await;
            sections.push(LogSection { kind: EntryKind::Error, items: errors.iter().map(LogItem::from_error).collect() });
        }

        tracing::debug!(
            updates = sections.iter().filter(|s| s.kind == EntryKind::Update).map(|s| s.items.len()).sum::<usize>(),
            errors = sections.iter().filter(|s| s.kind == EntryKind::Error).map(|s| s.items.len()).sum::<usize>(),
            "rendered log view"
        );
        LogView::Sections(sections)
    }

    /// Statistics over both lists, regardless of the current filter.
    pub async fn stats(&self) -> LogStats {
        let updates = self.audit.list_updates().await;
        let errors = self.audit.list_errors().await;
        LogStats::compute(&updates, &errors)
    }

    /// Snapshot both lists exactly as the audit log returns them.
    pub async fn export(&self) -> LogExport {
        let export = LogExport::new(self.audit.list_updates().await, self.audit.list_errors().await);
        tracing::info!(
            updates = export.update_logs.len(),
            errors = export.error_logs.len(),
            file_name = %export.file_name(),
            "exported logs"
        );
        export
    }

    /// Clear both lists after `prompt` confirms, then re-render.
    pub async fn clear(&self, prompt: &dyn ClearPrompt) -> Result<ClearOutcome, Error> {
        if !prompt.confirm_clear().await {
            tracing::debug!("log clear cancelled");
            return Ok(ClearOutcome::Cancelled);
        }
        self.audit.clear_all().await?;
        Ok(ClearOutcome::Cleared(self.render().await))
    }
}

fn local_time(timestamp: DateTime<Utc>) -> String {
    timestamp.with_timezone(&Local).format("%Y-%m-%d %H:%M:%S").to_string()
}

fn non_empty(value: &str) -> Option<&str> {
    if value.is_empty() { None } else { Some(value) }
}

/// Cut to [`USER_AGENT_DISPLAY_LIMIT`] characters and append `...`.
pub fn truncate_user_agent(user_agent: &str) -> String {
    match user_agent.char_indices().nth(USER_AGENT_DISPLAY_LIMIT) {
        Some((cut, _)) => format!("{}...", &user_agent[..cut]),
        None => user_agent.to_string(),
    }
}
