//! Notification provider
//!
//! Keeps the unread counter in step with the server while a session is
//! signed in. On mount, and again whenever the token or tenant changes, the
//! previous push connection is torn down and a new one is started:
//! 1. reconcile the count once from `GET /notifications`
//! 2. open the push socket for the tenant
//! 3. apply every frame to the counter until the socket closes
//!
//! There is no automatic reconnect. A lost connection stays lost until the
//! credentials change or the provider is mounted again.

use super::push::{classify, push_url, PushConnector, PushEvent};
use super::session::{Session, SessionCredentials};
use super::unread::UnreadCounter;
use crate::error::Result;
use async_trait::async_trait;
use futures::StreamExt;
use std::sync::Arc;
use tokio::sync::watch;
use tokio::task::JoinHandle;
use url::Url;

/// Where the reconciliation count comes from
#[async_trait]
pub trait NotificationSource: Send + Sync {
    async fn fetch_unread_count(&self, token: &str) -> Result<i64>;
}

struct Ingestion {
    counter: UnreadCounter,
    source: Arc<dyn NotificationSource>,
    connector: Arc<dyn PushConnector>,
    ws_base: Url,
}

/// Aborts the connection task when dropped
struct ConnectionGuard(JoinHandle<()>);

impl Drop for ConnectionGuard {
    fn drop(&mut self) {
        self.0.abort();
    }
}

/// Mounted notification provider
pub struct NotificationProvider {
    supervisor: JoinHandle<()>,
}

impl NotificationProvider {
    /// Start following `session`. Must be called inside a tokio runtime.
    pub fn mount(
        session: &Session,
        counter: UnreadCounter,
        source: Arc<dyn NotificationSource>,
        connector: Arc<dyn PushConnector>,
        ws_base: Url,
    ) -> Self {
        tracing::info!("Mounting notification provider for tab {}", session.tab().id());

        let ingestion = Arc::new(Ingestion {
            counter,
            source,
            connector,
            ws_base,
        });

        Self {
            supervisor: tokio::spawn(supervise(session.watch(), ingestion)),
        }
    }

    /// Close the connection and stop following the session
    pub fn unmount(self) {
        tracing::info!("Unmounting notification provider");
        // Drop aborts the supervisor, which drops the live connection
    }
}

impl Drop for NotificationProvider {
    fn drop(&mut self) {
        self.supervisor.abort();
    }
}

async fn supervise(mut credentials: watch::Receiver<SessionCredentials>, ingestion: Arc<Ingestion>) {
    let mut current: Option<(String, String)> = None;
    let mut _connection: Option<ConnectionGuard> = None;
    let mut first = true;

    loop {
        let next = credentials
            .borrow_and_update()
            .push_context()
            .map(|(token, tenant)| (token.to_string(), tenant.to_string()));

        if first || next != current {
            first = false;
            // Replacing the guard aborts the previous connection
            _connection = None;

            match &next {
                Some((token, tenant)) => {
                    let task = tokio::spawn(ingest(
                        Arc::clone(&ingestion),
                        token.clone(),
                        tenant.clone(),
                    ));
                    _connection = Some(ConnectionGuard(task));
                }
                None => tracing::debug!("No token or tenant in session, push connection skipped"),
            }
            current = next;
        }

        if credentials.changed().await.is_err() {
            // Session gone; keep the live connection until unmount
            std::future::pending::<()>().await;
        }
    }
}

async fn ingest(ingestion: Arc<Ingestion>, token: String, tenant_id: String) {
    match ingestion.source.fetch_unread_count(&token).await {
        Ok(unread) => {
            ingestion.counter.set(unread).await;
        }
        Err(e) if e.is_unauthenticated() => {
            tracing::debug!("Skipping unread reconciliation: {}", e);
        }
        Err(e) => {
            tracing::warn!("Unread reconciliation failed: {}", e);
        }
    }

    let url = match push_url(&ingestion.ws_base, &tenant_id, &token) {
        Ok(url) => url,
        Err(e) => {
            tracing::error!("Cannot build push URL: {}", e);
            return;
        }
    };

    let mut frames = match ingestion.connector.connect(&url).await {
        Ok(frames) => frames,
        Err(e) => {
            tracing::warn!("[WS] Connection for tenant {} failed: {}", tenant_id, e);
            return;
        }
    };

    tracing::info!("[WS] Notifications connected for tenant {}", tenant_id);

    while let Some(frame) = frames.next().await {
        match frame {
            Ok(text) => {
                apply_push_frame(&ingestion.counter, &text).await;
            }
            Err(e) => {
                tracing::warn!("[WS] Connection error: {}", e);
                break;
            }
        }
    }

    tracing::info!("[WS] Notifications closed for tenant {}", tenant_id);
}

/// Apply one push frame to the counter. Malformed frames are logged and
/// dropped; the classified event is returned otherwise.
pub async fn apply_push_frame(counter: &UnreadCounter, frame: &str) -> Option<PushEvent> {
    let event = match classify(frame) {
        Ok(event) => event,
        Err(e) => {
            tracing::warn!("[WS] Discarding frame: {}", e);
            return None;
        }
    };

    match &event {
        PushEvent::Notification => {
            counter.increment(1).await;
        }
        PushEvent::NotificationsRead { ids } if !ids.is_empty() => {
            counter.decrement(event.unread_delta().saturating_neg()).await;
        }
        PushEvent::NotificationsRead { .. } => {}
        PushEvent::Other(kind) => tracing::debug!("[WS] Ignoring {} frame", kind),
    }

    Some(event)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::error::AppError;
    use crate::platform::Origin;
    use crate::services::push::PushStream;
    use futures::channel::mpsc::{unbounded, UnboundedSender};
    use std::collections::VecDeque;
    use std::sync::Mutex;
    use std::time::Duration;

    struct FixedSource(i64);

    #[async_trait]
    impl NotificationSource for FixedSource {
        async fn fetch_unread_count(&self, _token: &str) -> Result<i64> {
            Ok(self.0)
        }
    }

    struct FailingSource;

    #[async_trait]
    impl NotificationSource for FailingSource {
        async fn fetch_unread_count(&self, _token: &str) -> Result<i64> {
            Err(AppError::Status {
                status: 500,
                url: "http://test/api/v1/notifications".into(),
            })
        }
    }

    #[derive(Default)]
    struct ScriptedConnector {
        urls: Mutex<Vec<Url>>,
        streams: Mutex<VecDeque<PushStream>>,
    }

    impl ScriptedConnector {
        /// Queue a connection; the returned sender feeds its frames
        fn queue(&self) -> UnboundedSender<Result<String>> {
            let (tx, rx) = unbounded();
            self.streams.lock().unwrap().push_back(rx.boxed());
            tx
        }

        fn urls(&self) -> Vec<String> {
            self.urls.lock().unwrap().iter().map(|u| u.to_string()).collect()
        }
    }

    #[async_trait]
    impl PushConnector for ScriptedConnector {
        async fn connect(&self, url: &Url) -> Result<PushStream> {
            self.urls.lock().unwrap().push(url.clone());
            self.streams
                .lock()
                .unwrap()
                .pop_front()
                .ok_or_else(|| AppError::Generic("connection refused".into()))
        }
    }

    async fn eventually<F: Fn() -> bool>(condition: F) {
        for _ in 0..200 {
            if condition() {
                return;
            }
            tokio::time::sleep(Duration::from_millis(5)).await;
        }
        panic!("condition not reached");
    }

    async fn eventually_count(counter: &UnreadCounter, expected: i64) {
        for _ in 0..200 {
            if counter.get().await == expected {
                return;
            }
            tokio::time::sleep(Duration::from_millis(5)).await;
        }
        assert_eq!(counter.get().await, expected);
    }

    fn ws_base() -> Url {
        Url::parse("ws://localhost:8080").unwrap()
    }

    #[tokio::test]
    async fn test_frames_drive_counter() {
        let tab = Origin::in_memory().open_tab();
        let session = Session::restore(&tab).await;
        session
            .login(SessionCredentials::new("tok", "tenant-1"))
            .await
            .unwrap();

        let counter = UnreadCounter::new(&tab);
        let connector = Arc::new(ScriptedConnector::default());
        let frames = connector.queue();

        let _provider = NotificationProvider::mount(
            &session,
            counter.clone(),
            Arc::new(FixedSource(0)),
            connector.clone(),
            ws_base(),
        );

        for _ in 0..3 {
            frames
                .unbounded_send(Ok(r#"{"type":"notification","payload":{}}"#.to_string()))
                .unwrap();
        }
        frames
            .unbounded_send(Ok(
                r#"{"type":"mark_notification_read","payload":{"notificationIds":["a","b"]}}"#
                    .to_string(),
            ))
            .unwrap();
        frames.unbounded_send(Ok("not json".to_string())).unwrap();

        eventually_count(&counter, 1).await;
        assert_eq!(
            connector.urls(),
            vec!["ws://localhost:8080/ws/cases/tenant-1?token=tok".to_string()]
        );
    }

    #[tokio::test]
    async fn test_reconciliation_sets_initial_count() {
        let tab = Origin::in_memory().open_tab();
        let session = Session::restore(&tab).await;
        session
            .login(SessionCredentials::new("tok", "tenant-1"))
            .await
            .unwrap();

        let counter = UnreadCounter::new(&tab);
        let connector = Arc::new(ScriptedConnector::default());
        let frames = connector.queue();

        let _provider = NotificationProvider::mount(
            &session,
            counter.clone(),
            Arc::new(FixedSource(5)),
            connector,
            ws_base(),
        );

        eventually_count(&counter, 5).await;

        frames
            .unbounded_send(Ok(r#"{"type":"EventNotification"}"#.to_string()))
            .unwrap();
        eventually_count(&counter, 6).await;
    }

    #[tokio::test]
    async fn test_failed_reconciliation_still_connects() {
        let tab = Origin::in_memory().open_tab();
        let session = Session::restore(&tab).await;
        session
            .login(SessionCredentials::new("tok", "tenant-1"))
            .await
            .unwrap();

        let counter = UnreadCounter::new(&tab);
        counter.set(2).await;
        let connector = Arc::new(ScriptedConnector::default());
        let frames = connector.queue();

        let _provider = NotificationProvider::mount(
            &session,
            counter.clone(),
            Arc::new(FailingSource),
            connector.clone(),
            ws_base(),
        );

        eventually(|| connector.urls().len() == 1).await;
        frames
            .unbounded_send(Ok(r#"{"type":"notification"}"#.to_string()))
            .unwrap();
        eventually_count(&counter, 3).await;
    }

    #[tokio::test]
    async fn test_no_credentials_no_connection() {
        let tab = Origin::in_memory().open_tab();
        let session = Session::restore(&tab).await;
        let connector = Arc::new(ScriptedConnector::default());

        let _provider = NotificationProvider::mount(
            &session,
            UnreadCounter::new(&tab),
            Arc::new(FixedSource(3)),
            connector.clone(),
            ws_base(),
        );

        tokio::time::sleep(Duration::from_millis(50)).await;
        assert!(connector.urls().is_empty());
    }

    #[tokio::test]
    async fn test_login_connects_and_credential_change_reconnects() {
        let tab = Origin::in_memory().open_tab();
        let session = Session::restore(&tab).await;
        let connector = Arc::new(ScriptedConnector::default());
        let first = connector.queue();
        let second = connector.queue();

        let _provider = NotificationProvider::mount(
            &session,
            UnreadCounter::new(&tab),
            Arc::new(FixedSource(0)),
            connector.clone(),
            ws_base(),
        );

        session
            .login(SessionCredentials::new("tok-1", "tenant-1"))
            .await
            .unwrap();
        eventually(|| connector.urls().len() == 1).await;

        // Same credentials again: no reconnect
        session
            .login(SessionCredentials::new("tok-1", "tenant-1"))
            .await
            .unwrap();
        tokio::time::sleep(Duration::from_millis(30)).await;
        assert_eq!(connector.urls().len(), 1);

        session
            .login(SessionCredentials::new("tok-2", "tenant-1"))
            .await
            .unwrap();
        eventually(|| connector.urls().len() == 2).await;
        eventually(|| first.is_closed()).await;
        assert!(!second.is_closed());

        session.logout().await.unwrap();
        eventually(|| second.is_closed()).await;
    }

    #[tokio::test]
    async fn test_unmount_closes_connection() {
        let tab = Origin::in_memory().open_tab();
        let session = Session::restore(&tab).await;
        session
            .login(SessionCredentials::new("tok", "tenant-1"))
            .await
            .unwrap();

        let connector = Arc::new(ScriptedConnector::default());
        let frames = connector.queue();

        let provider = NotificationProvider::mount(
            &session,
            UnreadCounter::new(&tab),
            Arc::new(FixedSource(0)),
            connector.clone(),
            ws_base(),
        );
        eventually(|| connector.urls().len() == 1).await;

        provider.unmount();
        eventually(|| frames.is_closed()).await;
    }

    #[tokio::test]
    async fn test_apply_push_frame_empty_read_is_noop() {
        let tab = Origin::in_memory().open_tab();
        let counter = UnreadCounter::new(&tab);
        counter.set(4).await;

        let event = apply_push_frame(
            &counter,
            r#"{"type":"mark_notification_read","payload":{"notificationIds":[]}}"#,
        )
        .await;

        assert_eq!(event, Some(PushEvent::NotificationsRead { ids: vec![] }));
        assert_eq!(counter.get().await, 4);
        assert_eq!(apply_push_frame(&counter, "{").await, None);
    }
}
