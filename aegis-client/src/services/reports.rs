//! Report editor
//!
//! Holds the sections of one report, the autosave of the active section
//! and the autosave of the report name. Every navigation away from a
//! section (switching, reordering, reloading, export, leaving the editor)
//! flushes its pending edit first. Sections that only exist on this client
//! survive reloads from the server.

use super::autosave::{is_local_id, Autosave, ChangeSource, ReportStore, SaveStatus};
use crate::api::models::ReportSection;
use crate::config::{DEFAULT_SECTION_TITLE, LOCAL_ID_PREFIX};
use crate::error::{AppError, Result};
use std::sync::{Arc, Mutex, MutexGuard, PoisonError};
use std::time::Duration;
use tokio::sync::watch;
use uuid::Uuid;

#[derive(Default)]
struct EditorState {
    name: String,
    sections: Vec<ReportSection>,
    active: usize,
    autosave: Option<Autosave>,
    name_autosave: Option<Autosave>,
}

pub struct ReportEditor {
    store: Arc<dyn ReportStore>,
    report_id: String,
    delay: Duration,
    status: Arc<watch::Sender<SaveStatus>>,
    name_status: Arc<watch::Sender<SaveStatus>>,
    state: Mutex<EditorState>,
}

impl ReportEditor {
    pub fn new(store: Arc<dyn ReportStore>, report_id: &str, delay: Duration) -> Self {
        let (status, _) = watch::channel(SaveStatus::default());
        let (name_status, _) = watch::channel(SaveStatus::default());

        Self {
            store,
            report_id: report_id.to_string(),
            delay,
            status: Arc::new(status),
            name_status: Arc::new(name_status),
            state: Mutex::new(EditorState::default()),
        }
    }

    pub fn report_id(&self) -> &str {
        &self.report_id
    }

    /// Fetch the report, sections ordered by position.
    ///
    /// Pending edits are written before the server copy replaces them; if
    /// that fails nothing is reloaded. Client-only sections keep their
    /// place and the active section stays active when it still exists.
    pub async fn load(&self) -> Result<()> {
        self.flush_all().await?;

        let document = self.store.load_report(&self.report_id).await?;
        let mut sections = document.sections;
        sections.sort_by_key(|section| section.order);

        tracing::info!(
            "Loaded {} sections for report {}",
            sections.len(),
            self.report_id
        );

        let mut state = self.lock();
        let active_id = state
            .sections
            .get(state.active)
            .map(|section| section.id.clone());
        state.sections = merge_local_sections(sections, &state.sections);

        let active = active_id
            .and_then(|id| state.sections.iter().position(|s| s.id == id))
            .unwrap_or_else(|| state.active.min(state.sections.len().saturating_sub(1)));
        self.activate(&mut state, active);

        state.name_autosave = Some(Autosave::report_name(
            Arc::clone(&self.store),
            &self.report_id,
            &document.name,
            self.delay,
            Arc::clone(&self.name_status),
        ));
        state.name = document.name;
        Ok(())
    }

    pub fn report_name(&self) -> String {
        self.lock().name.clone()
    }

    pub fn sections(&self) -> Vec<ReportSection> {
        self.lock().sections.clone()
    }

    pub fn active_index(&self) -> usize {
        self.lock().active
    }

    pub fn active_section(&self) -> Option<ReportSection> {
        let state = self.lock();
        state.sections.get(state.active).cloned()
    }

    pub fn status(&self) -> SaveStatus {
        self.status.borrow().clone()
    }

    /// Follows whichever section is active
    pub fn watch_status(&self) -> watch::Receiver<SaveStatus> {
        self.status.subscribe()
    }

    pub fn name_status(&self) -> SaveStatus {
        self.name_status.borrow().clone()
    }

    pub fn watch_name_status(&self) -> watch::Receiver<SaveStatus> {
        self.name_status.subscribe()
    }

    /// Apply an editor change to the active section
    pub fn edit(&self, content: &str, source: ChangeSource) {
        let autosave = {
            let mut state = self.lock();
            let active = state.active;
            let Some(section) = state.sections.get_mut(active) else {
                tracing::debug!("Ignoring edit with no active section");
                return;
            };
            if source == ChangeSource::User {
                section.content = content.to_string();
            }
            state.autosave.clone()
        };

        if let Some(autosave) = autosave {
            autosave.on_change(content, source);
        }
    }

    /// Apply a change to the report name; saved after the quiet period
    pub fn edit_report_name(&self, name: &str) {
        let autosave = {
            let mut state = self.lock();
            state.name = name.to_string();
            state.name_autosave.clone()
        };

        match autosave {
            Some(autosave) => autosave.on_change(name, ChangeSource::User),
            None => tracing::debug!("Report {} not loaded, name kept locally", self.report_id),
        }
    }

    /// Write the report name now (the name field lost focus).
    ///
    /// A blank name is never sent.
    pub async fn flush_report_name(&self) -> Result<()> {
        let (autosave, name) = {
            let state = self.lock();
            (state.name_autosave.clone(), state.name.clone())
        };

        match autosave {
            Some(autosave) => autosave.flush_content(Some(&name)).await,
            None => Ok(()),
        }
    }

    /// Rename the section at `index`. Returns false when the title is
    /// blank or unchanged.
    ///
    /// The new title shows immediately and is reverted if the server
    /// rejects it. Client-only sections are renamed locally.
    pub async fn rename_section(&self, index: usize, title: &str) -> Result<bool> {
        let title = title.trim();
        let (section_id, previous) = {
            let mut state = self.lock();
            let Some(section) = state.sections.get_mut(index) else {
                return Err(AppError::Validation(format!("No section at index {}", index)));
            };
            if title.is_empty() || section.title == title {
                return Ok(false);
            }
            let previous = std::mem::replace(&mut section.title, title.to_string());
            (section.id.clone(), previous)
        };

        if is_local_id(&section_id) {
            return Ok(true);
        }

        if let Err(e) = self
            .store
            .put_section_title(&self.report_id, &section_id, title)
            .await
        {
            tracing::warn!("Failed to rename section {}: {}", section_id, e);
            let mut state = self.lock();
            if let Some(section) = state
                .sections
                .iter_mut()
                .find(|s| s.id == section_id && s.title == title)
            {
                section.title = previous;
            }
            return Err(e);
        }

        Ok(true)
    }

    /// Flush the active section, then activate `index`.
    ///
    /// A failed flush leaves the current section active so its edit can be
    /// retried.
    pub async fn switch_section(&self, index: usize) -> Result<()> {
        if index >= self.lock().sections.len() {
            return Err(AppError::Validation(format!("No section at index {}", index)));
        }

        self.save_now().await?;

        let mut state = self.lock();
        if index < state.sections.len() {
            self.activate(&mut state, index);
        }
        Ok(())
    }

    /// Write the active section's current content immediately
    pub async fn save_now(&self) -> Result<()> {
        let (autosave, content) = {
            let state = self.lock();
            let content = state
                .sections
                .get(state.active)
                .map(|section| section.content.clone());
            (state.autosave.clone(), content)
        };

        match autosave {
            Some(autosave) => autosave.flush_content(content.as_deref()).await,
            None => Ok(()),
        }
    }

    /// Flush before the backend renders the report
    pub async fn prepare_export(&self) -> Result<()> {
        tracing::debug!("Flushing report {} before export", self.report_id);
        self.flush_all().await
    }

    /// Flush and stop tracking the report
    pub async fn leave(&self) -> Result<()> {
        self.flush_all().await?;

        let mut state = self.lock();
        state.autosave = None;
        state.name_autosave = None;
        Ok(())
    }

    /// Insert a client-only section after the active one and activate it
    pub async fn add_local_section(&self, title: &str) -> Result<ReportSection> {
        self.save_now().await?;

        let title = match title.trim() {
            "" => DEFAULT_SECTION_TITLE,
            title => title,
        };

        let mut state = self.lock();
        let index = if state.sections.is_empty() {
            0
        } else {
            state.active + 1
        };

        let section = ReportSection {
            id: format!("{}{}", LOCAL_ID_PREFIX, Uuid::new_v4()),
            title: title.to_string(),
            content: String::new(),
            order: 0,
        };
        state.sections.insert(index, section);
        renumber(&mut state.sections);
        self.activate(&mut state, index);

        Ok(state.sections[index].clone())
    }

    /// Move a section and persist every position (1-based).
    ///
    /// When persisting fails the order is reloaded from the server, with
    /// client-only sections kept.
    pub async fn reorder(&self, from: usize, to: usize) -> Result<()> {
        {
            let len = self.lock().sections.len();
            if from >= len || to >= len {
                return Err(AppError::Validation(format!(
                    "Cannot move section {} to {} in a report of {}",
                    from, to, len
                )));
            }
        }
        if from == to {
            return Ok(());
        }

        self.save_now().await?;

        let ordered = {
            let mut state = self.lock();
            let section = state.sections.remove(from);
            state.sections.insert(to, section);
            state.active = follow_move(state.active, from, to);
            renumber(&mut state.sections);
            state.sections.clone()
        };

        for section in ordered.iter().filter(|s| !is_local_id(&s.id)) {
            if let Err(e) = self
                .store
                .put_section_order(&self.report_id, &section.id, section.order)
                .await
            {
                tracing::error!("Failed to persist order of report {}: {}", self.report_id, e);
                if let Err(reload) = self.load().await {
                    tracing::error!("Failed to reload report {}: {}", self.report_id, reload);
                }
                return Err(e);
            }
        }

        Ok(())
    }

    async fn flush_all(&self) -> Result<()> {
        self.save_now().await?;
        self.flush_report_name().await
    }

    fn activate(&self, state: &mut EditorState, index: usize) {
        state.active = index;
        state.autosave = state.sections.get(index).map(|section| {
            tracing::debug!("Activating section {} of report {}", section.id, self.report_id);
            Autosave::section(
                Arc::clone(&self.store),
                &self.report_id,
                section,
                self.delay,
                Arc::clone(&self.status),
            )
        });
    }

    fn lock(&self) -> MutexGuard<'_, EditorState> {
        self.state.lock().unwrap_or_else(PoisonError::into_inner)
    }
}

fn renumber(sections: &mut [ReportSection]) {
    for (position, section) in sections.iter_mut().enumerate() {
        section.order = i64::try_from(position + 1).unwrap_or(i64::MAX);
    }
}

/// Put client-only sections from `previous` back into a server list, at
/// their old positions.
fn merge_local_sections(
    mut sections: Vec<ReportSection>,
    previous: &[ReportSection],
) -> Vec<ReportSection> {
    let mut merged = false;

    for (index, section) in previous.iter().enumerate() {
        if is_local_id(&section.id) && !sections.iter().any(|s| s.id == section.id) {
            sections.insert(index.min(sections.len()), section.clone());
            merged = true;
        }
    }

    if merged {
        renumber(&mut sections);
    }
    sections
}

/// Where the active index ends up after moving `from` to `to`
fn follow_move(active: usize, from: usize, to: usize) -> usize {
    if active == from {
        to
    } else if from < active && active <= to {
        active - 1
    } else if to <= active && active < from {
        active + 1
    } else {
        active
    }
}
