//! Wire models for the REST backend
//!
//! The backend is not consistent about field casing, so every field
//! accepts camelCase (canonical), snake_case and PascalCase spellings.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

/// A message in an annotation thread.
///
/// `replies` is never sent by the server; it is filled in by
/// `services::threads::build_message_tree`.
#[derive(Debug, Clone, PartialEq, Default, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ThreadMessage {
    #[serde(alias = "ID")]
    pub id: String,
    #[serde(default, alias = "thread_id", alias = "ThreadID")]
    pub thread_id: String,
    #[serde(default, alias = "parent_message_id", alias = "ParentMessageID")]
    pub parent_message_id: Option<String>,
    #[serde(default, alias = "user_id", alias = "UserID")]
    pub user_id: String,
    #[serde(default, alias = "Message")]
    pub message: String,
    #[serde(default, alias = "is_approved", alias = "IsApproved")]
    pub is_approved: Option<bool>,
    #[serde(default, alias = "approved_by", alias = "ApprovedBy")]
    pub approved_by: Option<String>,
    #[serde(default, alias = "approved_at", alias = "ApprovedAt")]
    pub approved_at: Option<DateTime<Utc>>,
    #[serde(default, alias = "created_at", alias = "CreatedAt")]
    pub created_at: Option<DateTime<Utc>>,
    #[serde(default, alias = "updated_at", alias = "UpdatedAt")]
    pub updated_at: Option<DateTime<Utc>>,
    #[serde(default, alias = "Mentions")]
    pub mentions: Vec<Mention>,
    #[serde(default, alias = "Reactions")]
    pub reactions: Vec<Reaction>,
    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    pub replies: Vec<ThreadMessage>,
}

/// A user mentioned in a message
#[derive(Debug, Clone, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Mention {
    #[serde(default, alias = "mentioned_user_id", alias = "MentionedUserID")]
    pub mentioned_user_id: String,
    #[serde(default, alias = "created_at", alias = "CreatedAt")]
    pub created_at: Option<DateTime<Utc>>,
}

/// One user's reaction to a message
#[derive(Debug, Clone, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Reaction {
    #[serde(default, alias = "ID")]
    pub id: Option<String>,
    #[serde(default, alias = "user_id", alias = "UserID")]
    pub user_id: String,
    #[serde(default, alias = "Reaction")]
    pub reaction: String,
    #[serde(default, alias = "created_at", alias = "CreatedAt")]
    pub created_at: Option<DateTime<Utc>>,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ThreadStatus {
    #[default]
    Open,
    Closed,
    Resolved,
    Archived,
    PendingApproval,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ThreadPriority {
    High,
    #[default]
    Medium,
    Low,
}

/// Discussion attached to an evidence file
#[derive(Debug, Clone, PartialEq, Default, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct AnnotationThread {
    pub id: String,
    #[serde(default)]
    pub title: String,
    #[serde(default, alias = "file_id")]
    pub file_id: String,
    #[serde(default, alias = "case_id")]
    pub case_id: String,
    #[serde(default)]
    pub status: ThreadStatus,
    #[serde(default)]
    pub priority: ThreadPriority,
    #[serde(default)]
    pub tags: Vec<String>,
    #[serde(default, alias = "message_count")]
    pub message_count: usize,
    #[serde(default, alias = "participant_count")]
    pub participant_count: usize,
}

/// A section of a report
#[derive(Debug, Clone, PartialEq, Default, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ReportSection {
    #[serde(alias = "ID", alias = "_id")]
    pub id: String,
    #[serde(default)]
    pub title: String,
    #[serde(default)]
    pub content: String,
    #[serde(default)]
    pub order: i64,
}

/// A report as returned by `GET /reports/{id}`
#[derive(Debug, Clone, PartialEq, Default, Serialize, Deserialize)]
pub struct ReportDocument {
    pub id: String,
    pub name: String,
    pub sections: Vec<ReportSection>,
}

/// A notification as listed by the backend
#[derive(Debug, Clone, PartialEq, Default, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Notification {
    /// Backends disagree on string or numeric ids
    #[serde(default, alias = "ID", alias = "_id")]
    pub id: serde_json::Value,
    #[serde(default, alias = "is_read", alias = "isRead")]
    pub read: Option<bool>,
    #[serde(default, alias = "is_archived", alias = "isArchived")]
    pub archived: Option<bool>,
}

impl Notification {
    /// Counts towards the badge: neither read nor archived
    pub fn is_unread(&self) -> bool {
        !self.read.unwrap_or(false) && !self.archived.unwrap_or(false)
    }
}

/// Body of `POST /threads/{id}/messages`
#[derive(Debug, Clone, Serialize)]
pub struct NewThreadMessage {
    pub user_id: String,
    pub message: String,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub parent_message_id: Option<String>,
    #[serde(skip_serializing_if = "Vec::is_empty")]
    pub mentions: Vec<String>,
}
