//! Annotation threads
//!
//! The backend returns a thread's messages as one flat list where replies
//! point at their parent through `parent_message_id`. `build_message_tree`
//! turns that list into a forest in a single pass; the remaining helpers
//! patch the forest in place for optimistic updates.

use crate::api::models::{AnnotationThread, NewThreadMessage, Reaction, ThreadMessage};
use crate::config::LOCAL_ID_PREFIX;
use crate::error::{AppError, Result};
use crate::services::session::Session;
use async_trait::async_trait;
use chrono::{DateTime, Utc};
use std::collections::{HashMap, HashSet};
use std::sync::{Arc, Mutex, MutexGuard, PoisonError};
use uuid::Uuid;

/// Server operations a thread view needs
#[async_trait]
pub trait ThreadBackend: Send + Sync {
    async fn list_messages(&self, thread_id: &str) -> Result<Vec<ThreadMessage>>;
    async fn post_message(&self, thread_id: &str, message: &NewThreadMessage) -> Result<()>;
    async fn approve_message(&self, message_id: &str, approver_id: &str) -> Result<()>;
    async fn add_reaction(&self, message_id: &str, user_id: &str, reaction: &str) -> Result<()>;
}

/// Nest a flat message list.
///
/// A message becomes a reply only when its parent appears earlier in
/// `messages`; everything else is a root. Every input message appears
/// exactly once in the output and siblings keep their input order. When
/// ids repeat, replies attach to the first message carrying the id.
pub fn build_message_tree(messages: &[ThreadMessage]) -> Vec<ThreadMessage> {
    let mut first_index: HashMap<&str, usize> = HashMap::with_capacity(messages.len());
    let mut children: Vec<Vec<usize>> = vec![Vec::new(); messages.len()];
    let mut roots = Vec::new();

    for (index, message) in messages.iter().enumerate() {
        let parent = message
            .parent_message_id
            .as_deref()
            .and_then(|parent_id| first_index.get(parent_id).copied());

        match parent {
            Some(parent) => children[parent].push(index),
            None => {
                if let Some(parent_id) = &message.parent_message_id {
                    tracing::debug!(
                        "Parent {} of message {} not seen yet, keeping it at the root",
                        parent_id,
                        message.id
                    );
                }
                roots.push(index);
            }
        }

        first_index.entry(message.id.as_str()).or_insert(index);
    }

    // Children always sit after their parent, so walking backwards
    // finishes every subtree before its parent needs it.
    let mut finished: Vec<Option<ThreadMessage>> = vec![None; messages.len()];
    for index in (0..messages.len()).rev() {
        let mut node = messages[index].clone();
        node.replies = children[index]
            .iter()
            .filter_map(|&child| finished[child].take())
            .collect();
        finished[index] = Some(node);
    }

    roots
        .into_iter()
        .filter_map(|index| finished[index].take())
        .collect()
}

/// Depth-first search for a message anywhere in the forest
pub fn find_message_mut<'a>(
    forest: &'a mut [ThreadMessage],
    id: &str,
) -> Option<&'a mut ThreadMessage> {
    for message in forest.iter_mut() {
        if message.id == id {
            return Some(message);
        }
        if let Some(found) = find_message_mut(&mut message.replies, id) {
            return Some(found);
        }
    }
    None
}

/// Total number of messages in the forest
pub fn count_messages(forest: &[ThreadMessage]) -> usize {
    let mut count = 0;
    let mut stack: Vec<&ThreadMessage> = forest.iter().collect();

    while let Some(message) = stack.pop() {
        count += 1;
        stack.extend(message.replies.iter());
    }

    count
}

/// Distinct authors in pre-order
pub fn participants(forest: &[ThreadMessage]) -> Vec<String> {
    let mut seen = HashSet::new();
    let mut users = Vec::new();
    let mut stack: Vec<&ThreadMessage> = forest.iter().rev().collect();

    while let Some(message) = stack.pop() {
        if !message.user_id.is_empty() && seen.insert(message.user_id.as_str()) {
            users.push(message.user_id.clone());
        }
        stack.extend(message.replies.iter().rev());
    }

    users
}

/// Append `reply` under `parent_id`. Returns false if the parent is unknown.
pub fn add_nested_reply(forest: &mut [ThreadMessage], parent_id: &str, reply: ThreadMessage) -> bool {
    match find_message_mut(forest, parent_id) {
        Some(parent) => {
            parent.replies.push(reply);
            true
        }
        None => false,
    }
}

/// Record `user_id`'s reaction on a message, at most once per kind
pub fn apply_reaction(
    forest: &mut [ThreadMessage],
    message_id: &str,
    user_id: &str,
    reaction: &str,
) -> bool {
    let Some(message) = find_message_mut(forest, message_id) else {
        return false;
    };

    if message
        .reactions
        .iter()
        .any(|r| r.user_id == user_id && r.reaction == reaction)
    {
        return false;
    }

    message.reactions.push(Reaction {
        id: None,
        user_id: user_id.to_string(),
        reaction: reaction.to_string(),
        created_at: Some(Utc::now()),
    });
    true
}

pub fn mark_approved(
    forest: &mut [ThreadMessage],
    message_id: &str,
    approver_id: &str,
    at: DateTime<Utc>,
) -> bool {
    let Some(message) = find_message_mut(forest, message_id) else {
        return false;
    };

    message.is_approved = Some(true);
    message.approved_by = Some(approver_id.to_string());
    message.approved_at = Some(at);
    true
}

/// Reactions of one kind on a message
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ReactionSummary {
    pub kind: String,
    pub count: usize,
    pub users: Vec<String>,
}

/// Group reaction rows by kind, in first-seen order
pub fn summarize_reactions(reactions: &[Reaction]) -> Vec<ReactionSummary> {
    let mut summaries: Vec<ReactionSummary> = Vec::new();

    for reaction in reactions {
        match summaries.iter_mut().find(|s| s.kind == reaction.reaction) {
            Some(summary) => {
                summary.count += 1;
                if !summary.users.contains(&reaction.user_id) {
                    summary.users.push(reaction.user_id.clone());
                }
            }
            None => summaries.push(ReactionSummary {
                kind: reaction.reaction.clone(),
                count: 1,
                users: vec![reaction.user_id.clone()],
            }),
        }
    }

    summaries
}

/// Recompute the thread's counters from its message forest
pub fn reconcile_counts(thread: &mut AnnotationThread, forest: &[ThreadMessage]) {
    thread.message_count = count_messages(forest);
    thread.participant_count = participants(forest).len();
}

#[derive(Default)]
struct ViewState {
    thread: Option<AnnotationThread>,
    generation: u64,
    messages: Vec<ThreadMessage>,
}

impl ViewState {
    fn reconcile(&mut self) {
        if let Some(thread) = self.thread.as_mut() {
            reconcile_counts(thread, &self.messages);
        }
    }
}

/// Snapshot taken before an optimistic patch
struct Patched {
    thread_id: String,
    generation: u64,
    previous: Vec<ThreadMessage>,
}

/// The selected thread and its message forest
pub struct ThreadView {
    backend: Arc<dyn ThreadBackend>,
    session: Session,
    state: Mutex<ViewState>,
}

impl ThreadView {
    pub fn new(backend: Arc<dyn ThreadBackend>, session: Session) -> Self {
        Self {
            backend,
            session,
            state: Mutex::new(ViewState::default()),
        }
    }

    /// Make `thread` current. Responses still in flight for the previous
    /// selection will be discarded.
    pub fn select_thread(&self, thread: AnnotationThread) -> u64 {
        let mut state = self.lock();
        state.generation += 1;
        tracing::debug!("Selecting thread {} (generation {})", thread.id, state.generation);
        state.thread = Some(thread);
        state.messages.clear();
        state.generation
    }

    pub fn thread(&self) -> Option<AnnotationThread> {
        self.lock().thread.clone()
    }

    pub fn messages(&self) -> Vec<ThreadMessage> {
        self.lock().messages.clone()
    }

    /// Refetch the selected thread. Returns false when nothing is selected
    /// or the selection changed while the request was in flight.
    pub async fn refresh(&self) -> Result<bool> {
        let (thread_id, generation) = {
            let state = self.lock();
            match &state.thread {
                Some(thread) => (thread.id.clone(), state.generation),
                None => return Ok(false),
            }
        };

        let flat = self.backend.list_messages(&thread_id).await?;
        let forest = build_message_tree(&flat);

        let mut state = self.lock();
        if state.generation != generation {
            tracing::debug!(
                "Discarding messages of thread {} from generation {}",
                thread_id,
                generation
            );
            return Ok(false);
        }

        state.messages = forest;
        state.reconcile();
        Ok(true)
    }

    /// Post a message, or a reply when `parent_id` is set
    pub async fn send_message(
        &self,
        text: &str,
        parent_id: Option<&str>,
        mentions: Vec<String>,
    ) -> Result<()> {
        let text = text.trim();
        if text.is_empty() {
            return Err(AppError::Validation("Message cannot be empty".to_string()));
        }
        let user_id = self.session.user_id().ok_or(AppError::Unauthenticated)?;

        let outgoing = NewThreadMessage {
            user_id: user_id.clone(),
            message: text.to_string(),
            parent_message_id: parent_id.map(str::to_string),
            mentions,
        };

        let patched = self.patch(|thread_id, forest| {
            let local = ThreadMessage {
                id: format!("{}{}", LOCAL_ID_PREFIX, Uuid::new_v4()),
                thread_id: thread_id.to_string(),
                parent_message_id: outgoing.parent_message_id.clone(),
                user_id: user_id.clone(),
                message: outgoing.message.clone(),
                created_at: Some(Utc::now()),
                ..ThreadMessage::default()
            };

            match parent_id {
                Some(parent_id) => {
                    if !add_nested_reply(forest, parent_id, local.clone()) {
                        forest.push(local);
                    }
                }
                None => forest.push(local),
            }
        })?;

        let written = self
            .backend
            .post_message(&patched.thread_id, &outgoing)
            .await;
        self.settle(written, patched).await
    }

    pub async fn approve(&self, message_id: &str) -> Result<()> {
        let approver = self.session.user_id().ok_or(AppError::Unauthenticated)?;

        let patched = self.patch(|_, forest| {
            mark_approved(forest, message_id, &approver, Utc::now());
        })?;

        let written = self.backend.approve_message(message_id, &approver).await;
        self.settle(written, patched).await
    }

    pub async fn react(&self, message_id: &str, reaction: &str) -> Result<()> {
        let user_id = self.session.user_id().ok_or(AppError::Unauthenticated)?;

        let patched = self.patch(|_, forest| {
            apply_reaction(forest, message_id, &user_id, reaction);
        })?;

        let written = self
            .backend
            .add_reaction(message_id, &user_id, reaction)
            .await;
        self.settle(written, patched).await
    }

    fn patch<F>(&self, apply: F) -> Result<Patched>
    where
        F: FnOnce(&str, &mut Vec<ThreadMessage>),
    {
        let mut state = self.lock();
        let thread_id = state
            .thread
            .as_ref()
            .map(|thread| thread.id.clone())
            .ok_or_else(|| AppError::Validation("No thread selected".to_string()))?;

        let previous = state.messages.clone();
        apply(&thread_id, &mut state.messages);
        state.reconcile();

        Ok(Patched {
            thread_id,
            generation: state.generation,
            previous,
        })
    }

    /// Roll back a failed write, then resynchronize with the server
    async fn settle(&self, written: Result<()>, patched: Patched) -> Result<()> {
        if let Err(e) = &written {
            tracing::warn!("Thread {} write failed, rolling back: {}", patched.thread_id, e);
            let mut state = self.lock();
            if state.generation == patched.generation {
                state.messages = patched.previous;
                state.reconcile();
            }
        }

        if let Err(e) = self.refresh().await {
            tracing::warn!("Failed to resync thread {}: {}", patched.thread_id, e);
        }

        written
    }

    fn lock(&self) -> MutexGuard<'_, ViewState> {
        self.state.lock().unwrap_or_else(PoisonError::into_inner)
    }
}
