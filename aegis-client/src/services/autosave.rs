//! Debounced autosave
//!
//! Editor changes are collapsed into one write per quiet period. A value
//! moves through `Idle -> Dirty -> Saving -> Saved | Error`; an `Error`
//! keeps the value queued so the next flush retries it. The same machinery
//! saves a section body and the report name (`SaveTarget`).
//!
//! Writes for one target are serialized: a flush issued while a timer save
//! is on the wire waits for it, so the server always ends with the newest
//! value.

use crate::api::models::{ReportDocument, ReportSection};
use crate::config::{EMPTY_CONTENT_PATTERNS, LOCAL_ID_PREFIX};
use crate::error::Result;
use async_trait::async_trait;
use chrono::{DateTime, Utc};
use std::fmt;
use std::sync::{Arc, Mutex, MutexGuard, PoisonError, Weak};
use std::time::Duration;
use tokio::sync::{watch, Mutex as AsyncMutex};
use tokio::task::JoinHandle;

/// Server operations the report editor needs
#[async_trait]
pub trait ReportStore: Send + Sync {
    async fn load_report(&self, report_id: &str) -> Result<ReportDocument>;
    async fn put_report_name(&self, report_id: &str, name: &str) -> Result<()>;
    async fn put_section_content(&self, report_id: &str, section_id: &str, content: &str) -> Result<()>;
    async fn put_section_title(&self, report_id: &str, section_id: &str, title: &str) -> Result<()>;
    async fn put_section_order(&self, report_id: &str, section_id: &str, order: i64) -> Result<()>;
}

/// Collapse markup that renders as an empty editor to `""`.
///
/// Anything else is returned unchanged.
pub fn normalize_content(content: &str) -> String {
    let trimmed = content.trim();
    if trimmed.is_empty() {
        return String::new();
    }

    let compact: String = trimmed
        .chars()
        .filter(|c| !c.is_whitespace())
        .collect::<String>()
        .to_ascii_lowercase();

    if EMPTY_CONTENT_PATTERNS.contains(&compact.as_str()) {
        String::new()
    } else {
        content.to_string()
    }
}

/// Whether an id only exists on this client
pub fn is_local_id(id: &str) -> bool {
    id.starts_with(LOCAL_ID_PREFIX)
}

/// What an autosave writes
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum SaveTarget {
    /// Body of the section with this id
    SectionContent(String),
    /// Name of the report
    ReportName,
}

impl SaveTarget {
    /// The form sent to the server, or `None` when the value must not be
    /// saved (a blank report name).
    pub fn normalize(&self, raw: &str) -> Option<String> {
        match self {
            SaveTarget::SectionContent(_) => Some(normalize_content(raw)),
            SaveTarget::ReportName => {
                let name = raw.trim();
                (!name.is_empty()).then(|| name.to_string())
            }
        }
    }

    fn is_local(&self) -> bool {
        matches!(self, SaveTarget::SectionContent(id) if is_local_id(id))
    }

    async fn put(&self, store: &dyn ReportStore, report_id: &str, value: &str) -> Result<()> {
        match self {
            SaveTarget::SectionContent(section_id) => {
                store.put_section_content(report_id, section_id, value).await
            }
            SaveTarget::ReportName => store.put_report_name(report_id, value).await,
        }
    }
}

impl fmt::Display for SaveTarget {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            SaveTarget::SectionContent(id) => write!(f, "section {}", id),
            SaveTarget::ReportName => f.write_str("report name"),
        }
    }
}

/// Who produced an editor change
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ChangeSource {
    User,
    Api,
    Silent,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum SaveState {
    #[default]
    Idle,
    Dirty,
    Saving,
    Saved,
    Error,
}

/// What the editor shows next to the field
#[derive(Debug, Clone, PartialEq, Default)]
pub struct SaveStatus {
    pub state: SaveState,
    pub dirty: bool,
    pub last_saved_at: Option<DateTime<Utc>>,
}

struct Pending {
    /// Normalized value the server is known to hold
    last_saved: String,
    /// Newest value waiting to be written
    queued: Option<String>,
    /// Value currently on the wire
    in_flight: Option<String>,
    generation: u64,
    timer: Option<JoinHandle<()>>,
}

impl Pending {
    fn cancel_timer(&mut self) {
        self.generation += 1;
        if let Some(timer) = self.timer.take() {
            timer.abort();
        }
    }
}

struct AutosaveInner {
    store: Arc<dyn ReportStore>,
    report_id: String,
    target: SaveTarget,
    delay: Duration,
    pending: Mutex<Pending>,
    save_lock: AsyncMutex<()>,
    status: Arc<watch::Sender<SaveStatus>>,
}

impl Drop for AutosaveInner {
    fn drop(&mut self) {
        let pending = self.pending.get_mut().unwrap_or_else(PoisonError::into_inner);
        if let Some(timer) = pending.timer.take() {
            timer.abort();
        }
    }
}

/// Autosave of one editable value of a report
#[derive(Clone)]
pub struct Autosave {
    inner: Arc<AutosaveInner>,
}

impl Autosave {
    /// Track the body of `section`, whose current content is taken as saved.
    ///
    /// `status` is reset to `Idle` and then follows this section.
    pub fn section(
        store: Arc<dyn ReportStore>,
        report_id: &str,
        section: &ReportSection,
        delay: Duration,
        status: Arc<watch::Sender<SaveStatus>>,
    ) -> Self {
        Self::new(
            store,
            report_id,
            SaveTarget::SectionContent(section.id.clone()),
            normalize_content(&section.content),
            delay,
            status,
        )
    }

    /// Track the report name, `name` being what the server holds
    pub fn report_name(
        store: Arc<dyn ReportStore>,
        report_id: &str,
        name: &str,
        delay: Duration,
        status: Arc<watch::Sender<SaveStatus>>,
    ) -> Self {
        Self::new(
            store,
            report_id,
            SaveTarget::ReportName,
            name.trim().to_string(),
            delay,
            status,
        )
    }

    fn new(
        store: Arc<dyn ReportStore>,
        report_id: &str,
        target: SaveTarget,
        saved: String,
        delay: Duration,
        status: Arc<watch::Sender<SaveStatus>>,
    ) -> Self {
        status.send_replace(SaveStatus::default());

        Self {
            inner: Arc::new(AutosaveInner {
                store,
                report_id: report_id.to_string(),
                target,
                delay,
                pending: Mutex::new(Pending {
                    last_saved: saved,
                    queued: None,
                    in_flight: None,
                    generation: 0,
                    timer: None,
                }),
                save_lock: AsyncMutex::new(()),
                status,
            }),
        }
    }

    pub fn target(&self) -> &SaveTarget {
        &self.inner.target
    }

    pub fn status(&self) -> SaveStatus {
        self.inner.status.borrow().clone()
    }

    pub fn is_dirty(&self) -> bool {
        self.inner.status.borrow().dirty
    }

    /// Record an editor change. Only user edits are saved.
    ///
    /// Must be called inside a tokio runtime.
    pub fn on_change(&self, raw: &str, source: ChangeSource) {
        if source != ChangeSource::User {
            return;
        }

        let mut pending = self.inner.lock();

        let Some(normalized) = self.inner.target.normalize(raw) else {
            // Unsaveable edit: nothing to schedule, but the server copy is stale
            pending.cancel_timer();
            pending.queued = None;
            drop(pending);
            self.inner.status.send_modify(|status| {
                status.state = SaveState::Dirty;
                status.dirty = true;
            });
            return;
        };

        if normalized == pending.last_saved && pending.in_flight.is_none() {
            pending.cancel_timer();
            pending.queued = None;
            drop(pending);

            self.inner.status.send_modify(|status| {
                if matches!(status.state, SaveState::Dirty | SaveState::Error) {
                    status.state = if status.last_saved_at.is_some() {
                        SaveState::Saved
                    } else {
                        SaveState::Idle
                    };
                }
                status.dirty = false;
            });
            return;
        }

        pending.cancel_timer();
        pending.queued = Some(normalized);
        let generation = pending.generation;
        let weak = Arc::downgrade(&self.inner);
        let delay = self.inner.delay;
        pending.timer = Some(tokio::spawn(async move {
            tokio::time::sleep(delay).await;
            fire(weak, generation).await;
        }));
        drop(pending);

        self.inner.status.send_modify(|status| {
            status.state = SaveState::Dirty;
            status.dirty = true;
        });
    }

    /// Write the queued value now
    pub async fn flush(&self) -> Result<()> {
        self.flush_content(None).await
    }

    /// Cancel the timer and write immediately.
    ///
    /// Writes `raw` when given, else the queued value. A value equal to
    /// what the server already holds is not sent again, and a value the
    /// target refuses (blank name) is not sent at all.
    pub async fn flush_content(&self, raw: Option<&str>) -> Result<()> {
        let value = {
            let mut pending = self.inner.lock();
            pending.cancel_timer();
            let queued = pending.queued.take();
            match raw {
                Some(raw) => match self.inner.target.normalize(raw) {
                    Some(value) => Some(value),
                    None => {
                        tracing::debug!("Not saving blank {}", self.inner.target);
                        return Ok(());
                    }
                },
                None => queued,
            }
        };

        self.inner.write(value).await
    }
}

async fn fire(weak: Weak<AutosaveInner>, generation: u64) {
    let Some(inner) = weak.upgrade() else {
        return;
    };

    let value = {
        let mut pending = inner.lock();
        if pending.generation != generation {
            return;
        }
        // Past this point the save must not be aborted by a new edit
        pending.timer = None;
        pending.queued.take()
    };

    if value.is_some() {
        if let Err(e) = inner.write(value).await {
            tracing::error!("Autosave of {} failed: {}", inner.target, e);
        }
    }
}

impl AutosaveInner {
    fn lock(&self) -> MutexGuard<'_, Pending> {
        self.pending.lock().unwrap_or_else(PoisonError::into_inner)
    }

    /// Serialized write. `None` means "whatever was saved last".
    async fn write(&self, value: Option<String>) -> Result<()> {
        let _guard = self.save_lock.lock().await;

        let value = {
            let mut pending = self.lock();
            let value = value.unwrap_or_else(|| pending.last_saved.clone());

            if value == pending.last_saved {
                let still_queued = pending.queued.is_some();
                drop(pending);
                self.status.send_modify(|status| {
                    status.state = if still_queued {
                        SaveState::Dirty
                    } else {
                        SaveState::Saved
                    };
                    status.dirty = still_queued;
                });
                return Ok(());
            }

            pending.in_flight = Some(value.clone());
            value
        };

        if self.target.is_local() {
            tracing::debug!("{} is local only, keeping it client-side", self.target);
            self.record_saved(value);
            return Ok(());
        }

        self.status.send_modify(|status| status.state = SaveState::Saving);

        match self.target.put(self.store.as_ref(), &self.report_id, &value).await {
            Ok(()) => {
                tracing::debug!("Saved {} of report {}", self.target, self.report_id);
                self.record_saved(value);
                Ok(())
            }
            Err(e) => {
                tracing::warn!("Failed to save {}: {}", self.target, e);
                {
                    let mut pending = self.lock();
                    pending.in_flight = None;
                    if pending.queued.is_none() {
                        pending.queued = Some(value);
                    }
                }
                self.status.send_modify(|status| {
                    status.state = SaveState::Error;
                    status.dirty = true;
                });
                Err(e)
            }
        }
    }

    fn record_saved(&self, value: String) {
        let still_queued = {
            let mut pending = self.lock();
            // A retry queued by an earlier failure is satisfied by this write
            if pending.queued.as_deref() == Some(value.as_str()) {
                pending.queued = None;
            }
            pending.last_saved = value;
            pending.in_flight = None;
            pending.queued.is_some()
        };

        self.status.send_modify(|status| {
            status.state = if still_queued {
                SaveState::Dirty
            } else {
                SaveState::Saved
            };
            status.dirty = still_queued;
            status.last_saved_at = Some(Utc::now());
        });
    }
}
