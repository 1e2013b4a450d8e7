//! Repository layer for REST operations
//!
//! Every request carries the session's bearer token; a missing token
//! short-circuits with `AppError::Unauthenticated` before any I/O.
//! Non-2xx responses become `AppError::Status`.

use super::models::{NewThreadMessage, ReportDocument, ThreadMessage};
use super::payload;
use crate::error::{AppError, Result};
use crate::services::autosave::ReportStore;
use crate::services::notifications::NotificationSource;
use crate::services::session::Session;
use crate::services::threads::ThreadBackend;
use async_trait::async_trait;
use reqwest::{Method, Response};
use serde::Serialize;
use serde_json::{json, Value};
use url::Url;

/// Repository for REST operations
#[derive(Clone)]
pub struct RemoteRepository {
    http: reqwest::Client,
    base_url: Url,
    session: Session,
}

impl RemoteRepository {
    pub fn new(http: reqwest::Client, base_url: Url, session: Session) -> Self {
        Self {
            http,
            base_url,
            session,
        }
    }

    /// Unread count for the notifications badge
    pub async fn fetch_unread_count(&self, token: &str) -> Result<i64> {
        let body = self.get_json(&["notifications"], token).await?;
        Ok(payload::unread_count(body))
    }

    /// All messages of a thread, flat
    pub async fn list_thread_messages(&self, thread_id: &str) -> Result<Vec<ThreadMessage>> {
        let token = self.bearer()?;
        let body = self
            .get_json(&["threads", thread_id, "messages"], &token)
            .await?;
        Ok(payload::normalize_list(body))
    }

    /// Post a message or reply to a thread
    pub async fn post_thread_message(
        &self,
        thread_id: &str,
        message: &NewThreadMessage,
    ) -> Result<()> {
        self.send_json(
            Method::POST,
            &["threads", thread_id, "messages"],
            message,
        )
        .await
    }

    pub async fn approve_message(&self, message_id: &str, approver_id: &str) -> Result<()> {
        self.send_json(
            Method::POST,
            &["messages", message_id, "approve"],
            &json!({ "approver_id": approver_id }),
        )
        .await
    }

    pub async fn add_reaction(&self, message_id: &str, user_id: &str, reaction: &str) -> Result<()> {
        self.send_json(
            Method::POST,
            &["messages", message_id, "reactions"],
            &json!({ "user_id": user_id, "reaction": reaction }),
        )
        .await
    }

    /// Report name and sections
    pub async fn get_report(&self, report_id: &str) -> Result<ReportDocument> {
        let token = self.bearer()?;
        let body = self.get_json(&["reports", report_id], &token).await?;
        Ok(payload::report_document(body))
    }

    pub async fn put_report_name(&self, report_id: &str, name: &str) -> Result<()> {
        self.send_json(
            Method::PUT,
            &["reports", report_id, "name"],
            &json!({ "name": name }),
        )
        .await
    }

    pub async fn put_section_content(
        &self,
        report_id: &str,
        section_id: &str,
        content: &str,
    ) -> Result<()> {
        self.send_json(
            Method::PUT,
            &["reports", report_id, "sections", section_id, "content"],
            &json!({ "content": content }),
        )
        .await
    }

    pub async fn put_section_title(&self, report_id: &str, section_id: &str, title: &str) -> Result<()> {
        self.send_json(
            Method::PUT,
            &["reports", report_id, "sections", section_id, "title"],
            &json!({ "title": title }),
        )
        .await
    }

    /// Persist a section position (1-based)
    pub async fn put_section_order(&self, report_id: &str, section_id: &str, order: i64) -> Result<()> {
        self.send_json(
            Method::PUT,
            &["reports", report_id, "sections", section_id, "reorder"],
            &json!({ "order": order }),
        )
        .await
    }

    fn bearer(&self) -> Result<String> {
        self.session
            .token()
            .filter(|token| !token.is_empty())
            .ok_or(AppError::Unauthenticated)
    }

    /// `{base}/api/v1/{segments...}`, each segment percent-encoded
    fn endpoint(&self, segments: &[&str]) -> Result<Url> {
        let mut url = self.base_url.clone();
        url.set_query(None);
        url.path_segments_mut()
            .map_err(|_| AppError::Generic(format!("Cannot use {} as an API base URL", self.base_url)))?
            .pop_if_empty()
            .extend(["api", "v1"])
            .extend(segments);
        Ok(url)
    }

    async fn get_json(&self, segments: &[&str], token: &str) -> Result<Value> {
        let url = self.endpoint(segments)?;
        tracing::debug!("GET {}", url);

        let response = self.http.get(url).bearer_auth(token).send().await?;
        let body = check_status(response)?.json::<Value>().await?;

        Ok(body)
    }

    async fn send_json<B: Serialize + ?Sized>(
        &self,
        method: Method,
        segments: &[&str],
        body: &B,
    ) -> Result<()> {
        let token = self.bearer()?;
        let url = self.endpoint(segments)?;
        tracing::debug!("{} {}", method, url);

        let response = self
            .http
            .request(method, url)
            .bearer_auth(token)
            .json(body)
            .send()
            .await?;
        check_status(response)?;

        Ok(())
    }
}

fn check_status(response: Response) -> Result<Response> {
    let status = response.status();
    if status.is_success() {
        Ok(response)
    } else {
        Err(AppError::Status {
            status: status.as_u16(),
            url: response.url().to_string(),
        })
    }
}

#[async_trait]
impl NotificationSource for RemoteRepository {
    async fn fetch_unread_count(&self, token: &str) -> Result<i64> {
        RemoteRepository::fetch_unread_count(self, token).await
    }
}

#[async_trait]
impl ThreadBackend for RemoteRepository {
    async fn list_messages(&self, thread_id: &str) -> Result<Vec<ThreadMessage>> {
        self.list_thread_messages(thread_id).await
    }

    async fn post_message(&self, thread_id: &str, message: &NewThreadMessage) -> Result<()> {
        self.post_thread_message(thread_id, message).await
    }

    async fn approve_message(&self, message_id: &str, approver_id: &str) -> Result<()> {
        RemoteRepository::approve_message(self, message_id, approver_id).await
    }

    async fn add_reaction(&self, message_id: &str, user_id: &str, reaction: &str) -> Result<()> {
        RemoteRepository::add_reaction(self, message_id, user_id, reaction).await
    }
}

#[async_trait]
impl ReportStore for RemoteRepository {
    async fn load_report(&self, report_id: &str) -> Result<ReportDocument> {
        self.get_report(report_id).await
    }

    async fn put_report_name(&self, report_id: &str, name: &str) -> Result<()> {
        RemoteRepository::put_report_name(self, report_id, name).await
    }

    async fn put_section_content(&self, report_id: &str, section_id: &str, content: &str) -> Result<()> {
        RemoteRepository::put_section_content(self, report_id, section_id, content).await
    }

    async fn put_section_title(&self, report_id: &str, section_id: &str, title: &str) -> Result<()> {
        RemoteRepository::put_section_title(self, report_id, section_id, title).await
    }

    async fn put_section_order(&self, report_id: &str, section_id: &str, order: i64) -> Result<()> {
        RemoteRepository::put_section_order(self, report_id, section_id, order).await
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::platform::Origin;
    use crate::services::session::SessionCredentials;

    async fn create_test_repository(base: &str) -> RemoteRepository {
        let tab = Origin::in_memory().open_tab();
        let session = Session::restore(&tab).await;
        RemoteRepository::new(reqwest::Client::new(), Url::parse(base).unwrap(), session)
    }

    #[tokio::test]
    async fn test_endpoint_keeps_base_path() {
        let repo = create_test_repository("http://localhost:8080/backend").await;

        assert_eq!(
            repo.endpoint(&["threads", "t1", "messages"]).unwrap().as_str(),
            "http://localhost:8080/backend/api/v1/threads/t1/messages"
        );

        let root = create_test_repository("http://localhost:8080/").await;
        assert_eq!(
            root.endpoint(&["notifications"]).unwrap().as_str(),
            "http://localhost:8080/api/v1/notifications"
        );
    }

    #[tokio::test]
    async fn test_endpoint_encodes_ids() {
        let repo = create_test_repository("http://localhost:8080/backend/").await;

        let url = repo
            .endpoint(&["reports", "r/1", "sections", "s?x#y", "content"])
            .unwrap();

        assert_eq!(
            url.as_str(),
            "http://localhost:8080/backend/api/v1/reports/r%2F1/sections/s%3Fx%23y/content"
        );
        assert_eq!(url.path_segments().unwrap().count(), 8);
    }

    #[tokio::test]
    async fn test_requests_without_token_are_skipped() {
        let repo = create_test_repository("http://127.0.0.1:9").await;

        let err = repo.list_thread_messages("t1").await.unwrap_err();
        assert!(err.is_unauthenticated());

        let err = repo
            .put_section_content("r1", "s1", "<p>x</p>")
            .await
            .unwrap_err();
        assert!(err.is_unauthenticated());
    }

    #[tokio::test]
    async fn test_bearer_uses_session_token() {
        let repo = create_test_repository("http://localhost:8080").await;
        repo.session
            .login(SessionCredentials::new("tok", "tenant"))
            .await
            .unwrap();

        assert_eq!(repo.bearer().unwrap(), "tok");
    }
}
