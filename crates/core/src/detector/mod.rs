//! Update detection state machine.
//!
//! ```text
//! Idle ──tick/force──▶ Checking ──same version──▶ Idle
//!                         │
//!                         ├──new version──▶ AwaitingConfirmation ──decline──▶ Idle
//!                         │                        │
//!                         │              confirm / auto-refresh
//!                         │                        ▼
//!                         │                    Refreshing ──reload ok──▶ Idle
//!                         │                        │
//!                         └──────error─────────────┴──▶ Failed ──▶ Idle
//! ```
//!
//! At most one check runs at a time: a trigger arriving while a check is in
//! flight is dropped, not queued. Every failure is recorded in the audit log
//! and the machine returns to `Idle`, so the polling loop never stops on an
//! error.

pub mod ports;

pub use ports::{
    CacheStorage, Confirmation, NoCacheStorage, PageHost, RefreshChoice, UpdateSurface, VersionSource,
};

use std::fmt;
use std::sync::Arc;
use std::sync::atomic::{AtomicBool, Ordering};
use std::time::Duration;

use chrono::{DateTime, Utc};
use serde::Serialize;
use tokio::sync::watch;
use tokio::task::JoinHandle;
use tokio::time::{Instant, MissedTickBehavior};

use crate::audit::{AuditLog, ErrorEntry, PageContext, UpdateAction, UpdateEntry};
use crate::config::AppConfig;
use crate::error::ErrorCategory;
use crate::version::{UpdatePreference, VersionRecord, VersionStore, has_new_content};
use crate::Error;

/// Observable detector state.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
pub enum DetectorState {
    Idle,
    Checking,
    AwaitingConfirmation,
    Refreshing,
    Failed,
}

/// Stage of the flow an error came from. Its label is the audit `context`.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Phase {
    Check,
    HandleNewContent,
    ClearCache,
    Refresh,
}

impl Phase {
    pub fn label(self) -> &'static str {
        match self {
            Phase::Check => "check for updates",
            Phase::HandleNewContent => "handle new content",
            Phase::ClearCache => "clear cache",
            Phase::Refresh => "refresh content",
        }
    }
}

impl fmt::Display for Phase {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.label())
    }
}

/// How a check (or refresh retry) ended.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum CheckOutcome {
    /// Another check was already in progress.
    Skipped,
    UpToDate,
    /// New version stored without refreshing.
    Declined { version: String },
    Refreshed { version: String },
    Failed { phase: Phase, category: ErrorCategory },
}

impl CheckOutcome {
    pub fn found_new_content(&self) -> bool {
        matches!(self, CheckOutcome::Declined { .. } | CheckOutcome::Refreshed { .. })
    }
}

/// Stored version plus when the remote was last reached.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct VersionInfo {
    pub stored: Option<String>,
    pub last_checked: Option<DateTime<Utc>>,
}

/// Polling and audit settings.
#[derive(Debug, Clone)]
pub struct DetectorSettings {
    pub check_interval: Duration,
    pub check_on_startup: bool,
    pub page: PageContext,
}

impl Default for DetectorSettings {
    fn default() -> Self {
        Self { check_interval: Duration::from_secs(60), check_on_startup: true, page: PageContext::default() }
    }
}

impl DetectorSettings {
    pub fn from_config(config: &AppConfig) -> Self {
        Self {
            check_interval: config.check_interval(),
            check_on_startup: config.check_on_startup,
            page: PageContext::new(config.user_agent.clone(), config.page_url()),
        }
    }
}

/// External capabilities the detector drives.
#[derive(Clone)]
pub struct Collaborators {
    pub source: Arc<dyn VersionSource>,
    pub caches: Arc<dyn CacheStorage>,
    pub host: Arc<dyn PageHost>,
    pub surface: Arc<dyn UpdateSurface>,
}

/// Releases the in-flight flag when dropped, on every exit path.
struct CheckGuard<'a>(&'a AtomicBool);

impl<'a> CheckGuard<'a> {
    fn acquire(flag: &'a AtomicBool) -> Option<Self> {
        flag.compare_exchange(false, true, Ordering::AcqRel, Ordering::Acquire)
            .ok()
            .map(|_| Self(flag))
    }
}

impl Drop for CheckGuard<'_> {
    fn drop(&mut self) {
        self.0.store(false, Ordering::Release);
    }
}

/// Periodic freshness checker.
pub struct UpdateDetector {
    versions: VersionStore,
    audit: AuditLog,
    collaborators: Collaborators,
    settings: DetectorSettings,
    checking: AtomicBool,
    state: watch::Sender<DetectorState>,
}

impl UpdateDetector {
    pub fn new(
        versions: VersionStore, audit: AuditLog, collaborators: Collaborators, settings: DetectorSettings,
    ) -> Self {
        let (state, _) = watch::channel(DetectorState::Idle);
        Self { versions, audit, collaborators, settings, checking: AtomicBool::new(false), state }
    }

    pub fn state(&self) -> DetectorState {
        *self.state.borrow()
    }

    /// Receiver that observes every state transition.
    pub fn subscribe(&self) -> watch::Receiver<DetectorState> {
        self.state.subscribe()
    }

    pub fn is_checking(&self) -> bool {
        self.checking.load(Ordering::Acquire)
    }

    pub fn settings(&self) -> &DetectorSettings {
        &self.settings
    }

    /// Run one check now. Still a no-op while another check is in flight.
    pub async fn force_check(&self) -> CheckOutcome {
        tracing::info!("forced update check");
        self.check_for_updates().await
    }

    /// Fetch, compare and, on new content, run the notify/confirm/refresh flow.
    pub async fn check_for_updates(&self) -> CheckOutcome {
        let Some(_guard) = CheckGuard::acquire(&self.checking) else {
            tracing::debug!("check already in progress, skipping");
            return CheckOutcome::Skipped;
        };

        self.set_state(DetectorState::Checking);
        let outcome = self.run_check().await;
        self.set_state(DetectorState::Idle);
        outcome
    }

    /// Re-run the refresh sequence for `version`, e.g. from a retry button.
    pub async fn retry_refresh(&self, version: &str) -> CheckOutcome {
        let Some(_guard) = CheckGuard::acquire(&self.checking) else {
            tracing::debug!("check already in progress, skipping refresh retry");
            return CheckOutcome::Skipped;
        };

        let outcome = self.refresh(version).await;
        self.set_state(DetectorState::Idle);
        outcome
    }

    /// Delete every client-held cache bucket. Returns how many were removed.
    ///
    /// All buckets are attempted even if some deletions fail.
    pub async fn invalidate_caches(&self) -> Result<usize, Error> {
        let caches = &self.collaborators.caches;
        let names = caches.keys().await.map_err(as_cache_error)?;

        let mut cleared = 0;
        let mut failures = Vec::new();
        for name in &names {
            match caches.delete(name).await {
                Ok(true) => cleared += 1,
                Ok(false) => {}
                Err(e) => failures.push(format!("{name}: {e}")),
            }
        }

        if !failures.is_empty() {
            return Err(Error::CacheInvalidation(failures.join("; ")));
        }

        tracing::debug!(cleared, "caches invalidated");
        Ok(cleared)
    }

    pub async fn version_info(&self) -> Result<VersionInfo, Error> {
        Ok(VersionInfo {
            stored: self.versions.stored_version().await?,
            last_checked: self.versions.last_check().await?,
        })
    }

    /// Clear caches, forget the stored version and preference, and empty the audit log.
    pub async fn reset(&self) -> Result<(), Error> {
        tracing::info!("resetting detector");
        if let Err(e) = self.invalidate_caches().await {
            tracing::warn!(error = %e, "cache invalidation failed during reset");
        }
        self.versions.reset().await?;
        self.audit.clear_all().await
    }

    /// Start periodic checks on the tokio runtime.
    ///
    /// Each tick spawns its own check so a slow check overlaps the next tick
    /// and the in-flight guard drops it.
    pub fn start(self: &Arc<Self>) -> PollHandle {
        let detector = Arc::clone(self);
        let task = tokio::spawn(async move { detector.poll_loop().await });
        PollHandle { task }
    }

    async fn poll_loop(self: Arc<Self>) {
        let period = self.settings.check_interval;
        tracing::info!(interval_secs = period.as_secs(), "starting periodic update checks");

        if self.settings.check_on_startup {
            self.spawn_check();
        }

        let mut ticker = tokio::time::interval_at(Instant::now() + period, period);
        ticker.set_missed_tick_behavior(MissedTickBehavior::Delay);
        loop {
            ticker.tick().await;
            self.spawn_check();
        }
    }

    fn spawn_check(self: &Arc<Self>) {
        let detector = Arc::clone(self);
        tokio::spawn(async move {
            let outcome = detector.check_for_updates().await;
            tracing::debug!(?outcome, "scheduled check finished");
        });
    }

    async fn run_check(&self) -> CheckOutcome {
        let record = match self.collaborators.source.fetch().await {
            Ok(record) => record,
            Err(e) => return self.fail(Phase::Check, &e).await,
        };

        if let Err(e) = self.versions.set_last_check(Utc::now()).await {
            tracing::warn!(error = %e, "failed to persist last check time");
        }

        let stored = match self.versions.stored_version().await {
            Ok(stored) => stored,
            Err(e) => return self.fail(Phase::Check, &e).await,
        };

        if !has_new_content(&record.version, stored.as_deref()) {
            tracing::debug!(version = %record.version, "no new content");
            return CheckOutcome::UpToDate;
        }

        tracing::info!(remote = %record.version, local = ?stored, "new content detected");
        self.handle_new_content(record).await
    }

    async fn handle_new_content(&self, record: VersionRecord) -> CheckOutcome {
        self.set_state(DetectorState::AwaitingConfirmation);
        let surface = &self.collaborators.surface;
        surface.notify_update(&record).await;

        let preference = self.versions.preference().await.unwrap_or_else(|e| {
            tracing::warn!(error = %e, "failed to read refresh preference, asking instead");
            UpdatePreference::Unset
        });

        let refresh = if preference == UpdatePreference::AlwaysAutoRefresh {
            tracing::debug!("auto-refresh preference set, skipping confirmation");
            true
        } else {
            let confirmation = match surface.confirm_refresh(&record).await {
                Ok(confirmation) => confirmation,
                Err(e) => return self.fail(Phase::HandleNewContent, &e).await,
            };
            if let Some(preference) = confirmation.remembered_preference()
                && let Err(e) = self.versions.set_preference(preference).await
            {
                tracing::warn!(error = %e, "failed to persist refresh preference");
            }
            confirmation.wants_refresh()
        };

        if refresh { self.refresh(&record.version).await } else { self.decline(&record.version).await }
    }

    /// Deferring still stores the version so the same one is not offered again.
    async fn decline(&self, version: &str) -> CheckOutcome {
        if let Err(e) = self.versions.set_stored_version(version).await {
            return self.fail(Phase::HandleNewContent, &e).await;
        }
        self.record_update(version, UpdateAction::DetectedNotRefreshed).await;
        CheckOutcome::Declined { version: version.to_string() }
    }

    async fn refresh(&self, version: &str) -> CheckOutcome {
        self.set_state(DetectorState::Refreshing);
        let surface = &self.collaborators.surface;
        tracing::info!(version, "refreshing content");
        surface.show_refresh_indicator().await;

        // Best effort: the reload repopulates caches with current content anyway.
        if let Err(e) = self.invalidate_caches().await {
            self.record_error(Phase::ClearCache, &e).await;
        }

        if let Err(e) = self.collaborators.host.reload().await {
            surface.hide_refresh_indicator().await;
            surface.show_refresh_error(e.user_message()).await;
            return self.fail(Phase::Refresh, &e).await;
        }

        if let Err(e) = self.versions.set_stored_version(version).await {
            surface.hide_refresh_indicator().await;
            surface.show_refresh_error(e.user_message()).await;
            return self.fail(Phase::Refresh, &e).await;
        }

        self.record_update(version, UpdateAction::Refreshed).await;
        surface.hide_refresh_indicator().await;
        CheckOutcome::Refreshed { version: version.to_string() }
    }

    async fn fail(&self, phase: Phase, err: &Error) -> CheckOutcome {
        self.set_state(DetectorState::Failed);
        self.record_error(phase, err).await;
        CheckOutcome::Failed { phase, category: err.category() }
    }

    async fn record_update(&self, version: &str, action: UpdateAction) {
        let entry = UpdateEntry::new(version, action, &self.settings.page);
        if let Err(e) = self.audit.append_update(entry).await {
            tracing::warn!(error = %e, "dropping update log entry");
        }
    }

    async fn record_error(&self, phase: Phase, err: &Error) {
        let entry = ErrorEntry::from_error(phase.label(), err, &self.settings.page);
        if let Err(e) = self.audit.append_error(entry).await {
            tracing::warn!(error = %e, "dropping error log entry");
        }
    }

    fn set_state(&self, next: DetectorState) {
        let previous = self.state.send_replace(next);
        if previous != next {
            tracing::debug!(from = ?previous, to = ?next, "detector state changed");
        }
    }
}

impl fmt::Debug for UpdateDetector {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("UpdateDetector")
            .field("state", &self.state())
            .field("checking", &self.is_checking())
            .field("settings", &self.settings)
            .finish_non_exhaustive()
    }
}

fn as_cache_error(err: Error) -> Error {
    match err {
        Error::CacheInvalidation(_) => err,
        other => Error::CacheInvalidation(other.to_string()),
    }
}

/// Handle to the periodic loop started by [`UpdateDetector::start`].
#[derive(Debug)]
pub struct PollHandle {
    task: JoinHandle<()>,
}

impl PollHandle {
    /// Stop scheduling checks. A check already in flight runs to completion.
    pub fn stop(&self) {
        tracing::info!("stopping periodic update checks");
        self.task.abort();
    }

    pub fn is_running(&self) -> bool {
        !self.task.is_finished()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::store::{KeyValueStore, MemoryStore, keys};
    use std::sync::Mutex;
    use std::sync::atomic::AtomicUsize;
    use tokio::sync::Notify;

    enum Reply {
        Version(&'static str),
        NetworkDown,
        Status(u16),
    }

    #[derive(Default)]
    struct Gate {
        entered: Notify,
        release: Notify,
    }

    struct FakeSource {
        reply: Mutex<Reply>,
        calls: AtomicUsize,
        gate: Option<Arc<Gate>>,
    }

    impl FakeSource {
        fn new(reply: Reply) -> Self {
            Self { reply: Mutex::new(reply), calls: AtomicUsize::new(0), gate: None }
        }

        fn set(&self, reply: Reply) {
            *self.reply.lock().unwrap() = reply;
        }

        fn calls(&self) -> usize {
            self.calls.load(Ordering::SeqCst)
        }
    }

    #[async_trait::async_trait]
    impl VersionSource for FakeSource {
        async fn fetch(&self) -> Result<VersionRecord, Error> {
            self.calls.fetch_add(1, Ordering::SeqCst);
            if let Some(gate) = &self.gate {
                gate.entered.notify_one();
                gate.release.notified().await;
            }
            match &*self.reply.lock().unwrap() {
                Reply::Version(v) => Ok(VersionRecord::new(*v)),
                Reply::NetworkDown => Err(Error::Network("connection refused".into())),
                Reply::Status(status) => Err(Error::HttpStatus { status: *status }),
            }
        }
    }

    #[derive(Default)]
    struct FakeCaches {
        buckets: Mutex<Vec<String>>,
        fail_delete: bool,
    }

    impl FakeCaches {
        fn with(names: &[&str]) -> Self {
            Self { buckets: Mutex::new(names.iter().map(|s| s.to_string()).collect()), fail_delete: false }
        }

        fn remaining(&self) -> usize {
            self.buckets.lock().unwrap().len()
        }
    }

    #[async_trait::async_trait]
    impl CacheStorage for FakeCaches {
        async fn keys(&self) -> Result<Vec<String>, Error> {
            Ok(self.buckets.lock().unwrap().clone())
        }

        async fn delete(&self, name: &str) -> Result<bool, Error> {
            if self.fail_delete {
                return Err(Error::Storage("permission denied".into()));
            }
            let mut buckets = self.buckets.lock().unwrap();
            let before = buckets.len();
            buckets.retain(|b| b != name);
            Ok(buckets.len() != before)
        }
    }

    #[derive(Default)]
    struct FakeHost {
        reloads: AtomicUsize,
        fail: bool,
    }

    #[async_trait::async_trait]
    impl PageHost for FakeHost {
        async fn reload(&self) -> Result<(), Error> {
            if self.fail {
                return Err(Error::Reload("navigation blocked".into()));
            }
            self.reloads.fetch_add(1, Ordering::SeqCst);
            Ok(())
        }
    }

    struct FakeSurface {
        answer: Option<Confirmation>,
        events: Mutex<Vec<String>>,
    }

    impl FakeSurface {
        fn answering(answer: Option<Confirmation>) -> Self {
            Self { answer, events: Mutex::new(Vec::new()) }
        }

        fn events(&self) -> Vec<String> {
            self.events.lock().unwrap().clone()
        }

        fn push(&self, event: String) {
            self.events.lock().unwrap().push(event);
        }
    }

    #[async_trait::async_trait]
    impl UpdateSurface for FakeSurface {
        async fn notify_update(&self, record: &VersionRecord) {
            self.push(format!("notify:{}", record.version));
        }

        async fn confirm_refresh(&self, _record: &VersionRecord) -> Result<Confirmation, Error> {
            self.push("confirm".into());
            self.answer.ok_or_else(|| Error::InvalidInput("dialog closed".into()))
        }

        async fn show_refresh_indicator(&self) {
            self.push("indicator".into());
        }

        async fn hide_refresh_indicator(&self) {
            self.push("hide".into());
        }

        async fn show_refresh_error(&self, message: &str) {
            self.push(format!("error:{message}"));
        }
    }

    struct Harness {
        detector: Arc<UpdateDetector>,
        source: Arc<FakeSource>,
        caches: Arc<FakeCaches>,
        host: Arc<FakeHost>,
        surface: Arc<FakeSurface>,
        versions: VersionStore,
        audit: AuditLog,
    }

    struct HarnessBuilder {
        source: FakeSource,
        caches: FakeCaches,
        host: FakeHost,
        answer: Option<Confirmation>,
        settings: DetectorSettings,
        store: Arc<dyn KeyValueStore>,
    }

    impl HarnessBuilder {
        fn new(reply: Reply) -> Self {
            Self {
                source: FakeSource::new(reply),
                caches: FakeCaches::with(&["static-v1", "pages-v1"]),
                host: FakeHost::default(),
                answer: Some(Confirmation::new(RefreshChoice::Defer, false)),
                settings: DetectorSettings {
                    page: PageContext::new("test-agent", "https://example.com/"),
                    ..Default::default()
                },
                store: Arc::new(MemoryStore::new()),
            }
        }

        fn answer(mut self, answer: Option<Confirmation>) -> Self {
            self.answer = answer;
            self
        }

        fn gated(mut self, gate: Arc<Gate>) -> Self {
            self.source.gate = Some(gate);
            self
        }

        fn failing_reload(mut self) -> Self {
            self.host.fail = true;
            self
        }

        fn failing_cache_delete(mut self) -> Self {
            self.caches.fail_delete = true;
            self
        }

        fn settings(mut self, settings: DetectorSettings) -> Self {
            self.settings = settings;
            self
        }

        fn store(mut self, store: Arc<dyn KeyValueStore>) -> Self {
            self.store = store;
            self
        }

        fn build(self) -> Harness {
            let versions = VersionStore::new(Arc::clone(&self.store));
            let audit = AuditLog::new(self.store);
            let source = Arc::new(self.source);
            let caches = Arc::new(self.caches);
            let host = Arc::new(self.host);
            let surface = Arc::new(FakeSurface::answering(self.answer));
            let collaborators = Collaborators {
                source: source.clone(),
                caches: caches.clone(),
                host: host.clone(),
                surface: surface.clone(),
            };
            let detector =
                Arc::new(UpdateDetector::new(versions.clone(), audit.clone(), collaborators, self.settings));
            Harness { detector, source, caches, host, surface, versions, audit }
        }
    }

    #[tokio::test]
    async fn test_first_check_without_baseline_is_new() {
        let h = HarnessBuilder::new(Reply::Version("1.0")).build();

        let outcome = h.detector.check_for_updates().await;

        assert_eq!(outcome, CheckOutcome::Declined { version: "1.0".into() });
        assert_eq!(h.surface.events(), vec!["notify:1.0", "confirm"]);
    }

    #[tokio::test]
    async fn test_same_version_is_silent() {
        let h = HarnessBuilder::new(Reply::Version("1.0")).build();
        h.versions.set_stored_version("1.0").await.unwrap();

        let outcome = h.detector.check_for_updates().await;

        assert_eq!(outcome, CheckOutcome::UpToDate);
        assert!(h.surface.events().is_empty());
        assert!(h.audit.list_updates().await.is_empty());
        assert!(h.audit.list_errors().await.is_empty());
        assert_eq!(h.detector.state(), DetectorState::Idle);
        assert!(h.versions.last_check().await.unwrap().is_some());
    }

    #[tokio::test]
    async fn test_decline_stores_version_and_logs() {
        let h = HarnessBuilder::new(Reply::Version("1.1")).build();
        h.versions.set_stored_version("1.0").await.unwrap();
        let states = h.detector.subscribe();

        let outcome = h.detector.check_for_updates().await;

        assert_eq!(outcome, CheckOutcome::Declined { version: "1.1".into() });
        assert_eq!(h.versions.stored_version().await.unwrap().as_deref(), Some("1.1"));
        let updates = h.audit.list_updates().await;
        assert_eq!(updates.len(), 1);
        assert_eq!(updates[0].action, UpdateAction::DetectedNotRefreshed);
        assert_eq!(updates[0].version, "1.1");
        assert_eq!(updates[0].user_agent, "test-agent");
        assert_eq!(h.host.reloads.load(Ordering::SeqCst), 0);
        assert_eq!(h.caches.remaining(), 2);
        assert_eq!(h.detector.state(), DetectorState::Idle);
        assert!(states.has_changed().unwrap());

        let again = h.detector.check_for_updates().await;
        assert_eq!(again, CheckOutcome::UpToDate);
        assert_eq!(h.audit.list_updates().await.len(), 1);
    }

    #[tokio::test]
    async fn test_auto_refresh_preference_skips_confirmation() {
        let h = HarnessBuilder::new(Reply::Version("2.0")).answer(None).build();
        h.versions.set_stored_version("1.0").await.unwrap();
        h.versions.set_preference(UpdatePreference::AlwaysAutoRefresh).await.unwrap();

        let outcome = h.detector.check_for_updates().await;

        assert_eq!(outcome, CheckOutcome::Refreshed { version: "2.0".into() });
        assert_eq!(h.surface.events(), vec!["notify:2.0", "indicator", "hide"]);
        assert_eq!(h.caches.remaining(), 0);
        assert_eq!(h.host.reloads.load(Ordering::SeqCst), 1);
        assert_eq!(h.versions.stored_version().await.unwrap().as_deref(), Some("2.0"));
        let updates = h.audit.list_updates().await;
        assert_eq!(updates.len(), 1);
        assert_eq!(updates[0].action, UpdateAction::Refreshed);
        assert!(h.audit.list_errors().await.is_empty());
    }

    #[tokio::test]
    async fn test_always_manual_preference_still_asks() {
        let h = HarnessBuilder::new(Reply::Version("2.0")).build();
        h.versions.set_preference(UpdatePreference::AlwaysManual).await.unwrap();

        h.detector.check_for_updates().await;

        assert!(h.surface.events().contains(&"confirm".to_string()));
    }

    #[tokio::test]
    async fn test_confirm_refresh_now_and_remember() {
        let h = HarnessBuilder::new(Reply::Version("3"))
            .answer(Some(Confirmation::new(RefreshChoice::RefreshNow, true)))
            .build();

        let outcome = h.detector.check_for_updates().await;

        assert_eq!(outcome, CheckOutcome::Refreshed { version: "3".into() });
        assert_eq!(h.versions.preference().await.unwrap(), UpdatePreference::AlwaysManual);
    }

    #[tokio::test]
    async fn test_confirm_always_auto_refresh_remembered() {
        let h = HarnessBuilder::new(Reply::Version("3"))
            .answer(Some(Confirmation::new(RefreshChoice::AlwaysAutoRefresh, true)))
            .build();

        h.detector.check_for_updates().await;
        assert_eq!(h.versions.preference().await.unwrap(), UpdatePreference::AlwaysAutoRefresh);

        h.source.set(Reply::Version("4"));
        h.detector.check_for_updates().await;
        let confirms = h.surface.events().iter().filter(|e| *e == "confirm").count();
        assert_eq!(confirms, 1);
    }

    #[tokio::test]
    async fn test_unremembered_choice_leaves_preference_unset() {
        let h = HarnessBuilder::new(Reply::Version("3"))
            .answer(Some(Confirmation::new(RefreshChoice::AlwaysAutoRefresh, false)))
            .build();

        h.detector.check_for_updates().await;
        assert_eq!(h.versions.preference().await.unwrap(), UpdatePreference::Unset);
    }

    #[tokio::test]
    async fn test_network_failure_logged_with_check_context() {
        let h = HarnessBuilder::new(Reply::NetworkDown).build();
        h.versions.set_stored_version("1.0").await.unwrap();

        let outcome = h.detector.check_for_updates().await;

        assert_eq!(outcome, CheckOutcome::Failed { phase: Phase::Check, category: ErrorCategory::Network });
        let errors = h.audit.list_errors().await;
        assert_eq!(errors.len(), 1);
        assert_eq!(errors[0].context, "check for updates");
        assert!(errors[0].error_message.contains("connection refused"));
        assert_eq!(h.detector.state(), DetectorState::Idle);
        assert!(!h.detector.is_checking());
        assert!(h.surface.events().is_empty());
        assert_eq!(h.versions.stored_version().await.unwrap().as_deref(), Some("1.0"));
    }

    #[tokio::test]
    async fn test_http_status_failure_category() {
        let h = HarnessBuilder::new(Reply::Status(404)).build();
        let outcome = h.detector.check_for_updates().await;
        assert_eq!(outcome, CheckOutcome::Failed { phase: Phase::Check, category: ErrorCategory::NotFound });
    }

    #[tokio::test]
    async fn test_cache_failure_does_not_block_reload() {
        let h = HarnessBuilder::new(Reply::Version("5"))
            .answer(Some(Confirmation::new(RefreshChoice::RefreshNow, false)))
            .failing_cache_delete()
            .build();

        let outcome = h.detector.check_for_updates().await;

        assert_eq!(outcome, CheckOutcome::Refreshed { version: "5".into() });
        assert_eq!(h.host.reloads.load(Ordering::SeqCst), 1);
        let errors = h.audit.list_errors().await;
        assert_eq!(errors.len(), 1);
        assert_eq!(errors[0].context, "clear cache");
        assert!(errors[0].error_message.starts_with("CACHE_INVALIDATION_FAILED"));
        assert_eq!(h.audit.list_updates().await.len(), 1);
    }

    #[tokio::test]
    async fn test_reload_failure_surfaces_error_and_keeps_old_version() {
        let h = HarnessBuilder::new(Reply::Version("6"))
            .answer(Some(Confirmation::new(RefreshChoice::RefreshNow, false)))
            .failing_reload()
            .build();
        h.versions.set_stored_version("5").await.unwrap();

        let outcome = h.detector.check_for_updates().await;

        assert_eq!(outcome, CheckOutcome::Failed { phase: Phase::Refresh, category: ErrorCategory::Unknown });
        assert_eq!(h.versions.stored_version().await.unwrap().as_deref(), Some("5"));
        let errors = h.audit.list_errors().await;
        assert_eq!(errors.len(), 1);
        assert_eq!(errors[0].context, "refresh content");
        assert!(h.audit.list_updates().await.is_empty());
        let events = h.surface.events();
        assert_eq!(events.last().unwrap(), &format!("error:{}", ErrorCategory::Unknown.user_message()));
        assert_eq!(h.detector.state(), DetectorState::Idle);
    }

    /// Rejects writes of the stored version, everything else goes through.
    struct VersionWriteFails(MemoryStore);

    #[async_trait::async_trait]
    impl KeyValueStore for VersionWriteFails {
        async fn get(&self, key: &str) -> Result<Option<String>, Error> {
            self.0.get(key).await
        }

        async fn set(&self, key: &str, value: &str) -> Result<(), Error> {
            if key == keys::STORED_VERSION {
                return Err(Error::Storage("quota exceeded".into()));
            }
            self.0.set(key, value).await
        }

        async fn remove(&self, key: &str) -> Result<(), Error> {
            self.0.remove(key).await
        }
    }

    #[tokio::test]
    async fn test_version_write_failure_after_reload_surfaces_error() {
        let h = HarnessBuilder::new(Reply::Version("6"))
            .answer(Some(Confirmation::new(RefreshChoice::RefreshNow, false)))
            .store(Arc::new(VersionWriteFails(MemoryStore::new())))
            .build();

        let outcome = h.detector.check_for_updates().await;

        assert_eq!(outcome, CheckOutcome::Failed { phase: Phase::Refresh, category: ErrorCategory::Unknown });
        assert_eq!(h.host.reloads.load(Ordering::SeqCst), 1);
        assert_eq!(
            h.surface.events(),
            vec![
                "notify:6".to_string(),
                "confirm".to_string(),
                "indicator".to_string(),
                "hide".to_string(),
                format!("error:{}", ErrorCategory::Unknown.user_message()),
            ]
        );
        let errors = h.audit.list_errors().await;
        assert_eq!(errors.len(), 1);
        assert_eq!(errors[0].context, "refresh content");
        assert!(h.audit.list_updates().await.is_empty());
        assert_eq!(h.detector.state(), DetectorState::Idle);
    }

    #[tokio::test]
    async fn test_dialog_failure_logged_as_handle_new_content() {
        let h = HarnessBuilder::new(Reply::Version("7")).answer(None).build();

        let outcome = h.detector.check_for_updates().await;

        assert!(matches!(outcome, CheckOutcome::Failed { phase: Phase::HandleNewContent, .. }));
        assert!(h.versions.stored_version().await.unwrap().is_none());
        assert_eq!(h.audit.list_errors().await[0].context, "handle new content");
    }

    #[tokio::test]
    async fn test_overlapping_check_is_dropped() {
        let gate = Arc::new(Gate::default());
        let h = HarnessBuilder::new(Reply::Version("1.0")).gated(gate.clone()).build();
        h.versions.set_stored_version("1.0").await.unwrap();

        let detector = h.detector.clone();
        let first = tokio::spawn(async move { detector.check_for_updates().await });
        gate.entered.notified().await;

        assert!(h.detector.is_checking());
        assert_eq!(h.detector.state(), DetectorState::Checking);
        assert_eq!(h.detector.force_check().await, CheckOutcome::Skipped);
        assert_eq!(h.detector.retry_refresh("1.0").await, CheckOutcome::Skipped);

        gate.release.notify_one();
        assert_eq!(first.await.unwrap(), CheckOutcome::UpToDate);
        assert_eq!(h.source.calls(), 1);
        assert!(!h.detector.is_checking());
    }

    #[tokio::test]
    async fn test_retry_refresh() {
        let h = HarnessBuilder::new(Reply::Version("8")).build();

        let outcome = h.detector.retry_refresh("8").await;

        assert_eq!(outcome, CheckOutcome::Refreshed { version: "8".into() });
        assert_eq!(h.host.reloads.load(Ordering::SeqCst), 1);
        assert_eq!(h.source.calls(), 0);
    }

    #[tokio::test]
    async fn test_invalidate_caches_counts_buckets() {
        let h = HarnessBuilder::new(Reply::Version("1")).build();
        assert_eq!(h.detector.invalidate_caches().await.unwrap(), 2);
        assert_eq!(h.detector.invalidate_caches().await.unwrap(), 0);
    }

    #[tokio::test]
    async fn test_version_info_and_reset() {
        let h = HarnessBuilder::new(Reply::Version("1.0")).build();
        h.detector.check_for_updates().await;

        let info = h.detector.version_info().await.unwrap();
        assert_eq!(info.stored.as_deref(), Some("1.0"));
        assert!(info.last_checked.is_some());

        h.detector.reset().await.unwrap();

        let info = h.detector.version_info().await.unwrap();
        assert_eq!(info, VersionInfo { stored: None, last_checked: None });
        assert!(h.audit.list_updates().await.is_empty());
        assert_eq!(h.caches.remaining(), 0);
    }

    #[tokio::test(start_paused = true)]
    async fn test_polling_survives_failures() {
        let settings = DetectorSettings {
            check_interval: Duration::from_secs(60),
            check_on_startup: false,
            page: PageContext::default(),
        };
        let h = HarnessBuilder::new(Reply::NetworkDown).settings(settings).build();

        let handle = h.detector.start();
        tokio::time::sleep(Duration::from_secs(150)).await;

        assert_eq!(h.source.calls(), 2);
        assert_eq!(h.audit.list_errors().await.len(), 2);
        assert_eq!(h.detector.state(), DetectorState::Idle);
        assert!(handle.is_running());

        handle.stop();
        tokio::time::sleep(Duration::from_secs(120)).await;
        assert_eq!(h.source.calls(), 2);
    }

    #[tokio::test(start_paused = true)]
    async fn test_startup_check_runs_immediately() {
        let h = HarnessBuilder::new(Reply::Version("1.0")).build();
        h.versions.set_stored_version("1.0").await.unwrap();

        let handle = h.detector.start();
        tokio::time::sleep(Duration::from_secs(1)).await;

        assert_eq!(h.source.calls(), 1);
        handle.stop();
    }
}
