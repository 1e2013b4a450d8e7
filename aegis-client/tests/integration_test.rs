//! Integration tests for the AEGIS client
//!
//! These tests verify end-to-end functionality including:
//! - Client setup over a SQLite-backed origin
//! - Cross-tab unread propagation
//! - REST repository, thread view and report editor against a local server
//! - Notification provider reconciliation and push ingestion

use aegis_client::api::{create_http_client, RemoteRepository};
use aegis_client::app;
use aegis_client::error::{AppError, Result};
use aegis_client::platform::Origin;
use aegis_client::services::push::PushStream;
use aegis_client::services::{
    ChangeSource, NotificationProvider, PushConnector, ReportEditor, SaveState, Session,
    SessionCredentials, ThreadView, UnreadCounter,
};
use async_trait::async_trait;
use axum::extract::{Path, State};
use axum::http::{HeaderMap, StatusCode};
use axum::routing::{get, put};
use axum::{Json, Router};
use futures::channel::mpsc::{unbounded, UnboundedReceiver, UnboundedSender};
use futures::StreamExt;
use serde_json::{json, Value};
use std::sync::{Arc, Mutex};
use std::time::Duration;
use tempfile::TempDir;
use tokio::sync::mpsc;
use url::Url;

const TOKEN: &str = "test-token";

/// In-memory stand-in for the REST backend
#[derive(Default)]
struct Backend {
    messages: Mutex<Vec<Value>>,
    name_writes: Mutex<Vec<String>>,
    content_writes: Mutex<Vec<(String, String, String)>>,
    title_writes: Mutex<Vec<(String, String)>>,
    order_writes: Mutex<Vec<(String, i64)>>,
}

type Shared = Arc<Backend>;

fn authorized(headers: &HeaderMap) -> std::result::Result<(), StatusCode> {
    let expected = format!("Bearer {}", TOKEN);
    match headers.get("authorization").and_then(|v| v.to_str().ok()) {
        Some(value) if value == expected => Ok(()),
        _ => Err(StatusCode::UNAUTHORIZED),
    }
}

async fn list_notifications(headers: HeaderMap) -> std::result::Result<Json<Value>, StatusCode> {
    authorized(&headers)?;
    Ok(Json(json!({
        "data": [
            {"id": "n1", "read": false},
            {"id": "n2", "read": true},
            {"id": "n3", "read": false, "archived": true},
            {"id": "n4"}
        ]
    })))
}

async fn list_messages(
    State(backend): State<Shared>,
    Path(thread_id): Path<String>,
    headers: HeaderMap,
) -> std::result::Result<Json<Value>, StatusCode> {
    authorized(&headers)?;
    let messages: Vec<Value> = backend
        .messages
        .lock()
        .unwrap()
        .iter()
        .filter(|m| m["ThreadID"] == thread_id.as_str())
        .cloned()
        .collect();
    Ok(Json(json!({ "messages": messages })))
}

async fn post_message(
    State(backend): State<Shared>,
    Path(thread_id): Path<String>,
    headers: HeaderMap,
    Json(body): Json<Value>,
) -> std::result::Result<StatusCode, StatusCode> {
    authorized(&headers)?;
    let mut messages = backend.messages.lock().unwrap();
    let id = format!("m{}", messages.len() + 1);
    messages.push(json!({
        "ID": id,
        "ThreadID": thread_id,
        "ParentMessageID": body.get("parent_message_id").cloned().unwrap_or(Value::Null),
        "UserID": body["user_id"],
        "Message": body["message"],
        "CreatedAt": "2025-01-01T00:00:00Z"
    }));
    Ok(StatusCode::CREATED)
}

async fn get_report(
    Path(report_id): Path<String>,
    headers: HeaderMap,
) -> std::result::Result<Json<Value>, StatusCode> {
    authorized(&headers)?;
    Ok(Json(json!({
        "metadata": {"id": report_id, "name": "Incident 42"},
        "content": [
            {"_id": "s2", "title": "Timeline", "content": "<p>t</p>", "order": 2},
            {"_id": "s1", "title": "Summary", "content": "<p><br></p>", "order": 1}
        ]
    })))
}

async fn put_content(
    State(backend): State<Shared>,
    Path((report_id, section_id)): Path<(String, String)>,
    headers: HeaderMap,
    Json(body): Json<Value>,
) -> std::result::Result<StatusCode, StatusCode> {
    authorized(&headers)?;
    let content = body["content"].as_str().unwrap_or_default().to_string();
    backend
        .content_writes
        .lock()
        .unwrap()
        .push((report_id, section_id, content));
    Ok(StatusCode::OK)
}

async fn put_name(
    State(backend): State<Shared>,
    Path(_report_id): Path<String>,
    headers: HeaderMap,
    Json(body): Json<Value>,
) -> std::result::Result<StatusCode, StatusCode> {
    authorized(&headers)?;
    let name = body["name"].as_str().ok_or(StatusCode::BAD_REQUEST)?;
    backend.name_writes.lock().unwrap().push(name.to_string());
    Ok(StatusCode::OK)
}

async fn put_title(
    State(backend): State<Shared>,
    Path((_report_id, section_id)): Path<(String, String)>,
    headers: HeaderMap,
    Json(body): Json<Value>,
) -> std::result::Result<StatusCode, StatusCode> {
    authorized(&headers)?;
    let title = body["title"].as_str().ok_or(StatusCode::BAD_REQUEST)?;
    backend
        .title_writes
        .lock()
        .unwrap()
        .push((section_id, title.to_string()));
    Ok(StatusCode::OK)
}

async fn put_order(
    State(backend): State<Shared>,
    Path((_report_id, section_id)): Path<(String, String)>,
    headers: HeaderMap,
    Json(body): Json<Value>,
) -> std::result::Result<StatusCode, StatusCode> {
    authorized(&headers)?;
    let order = body["order"].as_i64().ok_or(StatusCode::BAD_REQUEST)?;
    backend.order_writes.lock().unwrap().push((section_id, order));
    Ok(StatusCode::OK)
}

/// Spawn the fake backend on a random port
async fn start_backend() -> (Shared, Url) {
    let backend: Shared = Arc::new(Backend::default());

    let app = Router::new()
        .route("/api/v1/notifications", get(list_notifications))
        .route(
            "/api/v1/threads/{id}/messages",
            get(list_messages).post(post_message),
        )
        .route("/api/v1/reports/{id}", get(get_report))
        .route("/api/v1/reports/{id}/name", put(put_name))
        .route(
            "/api/v1/reports/{rid}/sections/{sid}/title",
            put(put_title),
        )
        .route(
            "/api/v1/reports/{rid}/sections/{sid}/content",
            put(put_content),
        )
        .route("/api/v1/reports/{rid}/sections/{sid}/reorder", put(put_order))
        .with_state(backend.clone());

    let listener = tokio::net::TcpListener::bind("127.0.0.1:0")
        .await
        .expect("Failed to bind");
    let addr = listener.local_addr().expect("Failed to get addr");

    tokio::spawn(async move {
        axum::serve(listener, app).await.unwrap();
    });

    let base = Url::parse(&format!("http://{}", addr)).unwrap();
    (backend, base)
}

/// Helper to create a signed-in repository against `base`
async fn create_repository(base: Url, credentials: SessionCredentials) -> (Session, Arc<RemoteRepository>) {
    let tab = Origin::in_memory().open_tab();
    let session = Session::restore(&tab).await;
    session.login(credentials).await.unwrap();

    let http = create_http_client(Duration::from_secs(5)).unwrap();
    let repository = Arc::new(RemoteRepository::new(http, base, session.clone()));
    (session, repository)
}

#[tokio::test]
async fn test_setup_persists_unread_across_restarts() {
    let temp_dir = TempDir::new().unwrap();

    {
        let state = app::setup(temp_dir.path().to_path_buf()).await.unwrap();
        assert_eq!(state.unread.get().await, 0);
        state.unread.increment(3).await;
        assert!(temp_dir.path().join("settings.json").exists());
    }

    {
        let state = app::setup(temp_dir.path().to_path_buf()).await.unwrap();
        assert_eq!(state.unread.get().await, 3);
    }
}

#[tokio::test]
async fn test_unread_propagates_between_tabs() {
    let temp_dir = TempDir::new().unwrap();
    let state = app::setup(temp_dir.path().to_path_buf()).await.unwrap();

    let other_tab = state.origin.open_tab();
    let other = UnreadCounter::new(&other_tab);

    let (tx, mut rx) = mpsc::unbounded_channel();
    let subscription = other.subscribe(move |count| {
        let _ = tx.send(count);
    });

    state.unread.set(7).await;

    let seen = tokio::time::timeout(Duration::from_secs(2), rx.recv())
        .await
        .unwrap()
        .unwrap();
    assert_eq!(seen, 7);
    assert_eq!(other.get().await, 7);

    subscription.unsubscribe();
    assert_eq!(other_tab.events().listener_count("unread:changed"), 0);
}

#[tokio::test]
async fn test_repository_requires_valid_token() {
    let (_backend, base) = start_backend().await;
    let (_session, repository) =
        create_repository(base, SessionCredentials::new(TOKEN, "tenant-1")).await;

    assert_eq!(repository.fetch_unread_count(TOKEN).await.unwrap(), 2);

    let err = repository.fetch_unread_count("wrong").await.unwrap_err();
    assert!(matches!(err, AppError::Status { status: 401, .. }));
}

#[tokio::test]
async fn test_thread_view_against_backend() {
    let (backend, base) = start_backend().await;
    let (session, repository) = create_repository(
        base,
        SessionCredentials::new(TOKEN, "tenant-1").with_user("analyst"),
    )
    .await;

    backend.messages.lock().unwrap().extend([
        json!({"ID": "a", "ThreadID": "t1", "UserID": "lead", "Message": "Suspicious binary"}),
        json!({"ID": "b", "ThreadID": "t1", "ParentMessageID": "a", "UserID": "analyst", "Message": "Agreed"}),
        json!({"ID": "x", "ThreadID": "t2", "UserID": "lead", "Message": "Other thread"}),
    ]);

    let view = ThreadView::new(repository, session);
    view.select_thread(aegis_client::api::AnnotationThread {
        id: "t1".into(),
        ..Default::default()
    });
    assert!(view.refresh().await.unwrap());

    let messages = view.messages();
    assert_eq!(messages.len(), 1);
    assert_eq!(messages[0].replies[0].id, "b");

    view.send_message("Hash matches known malware", Some("b"), vec![])
        .await
        .unwrap();

    let messages = view.messages();
    let nested = &messages[0].replies[0].replies;
    assert_eq!(nested.len(), 1);
    assert_eq!(nested[0].id, "m4");
    assert_eq!(nested[0].user_id, "analyst");

    let thread = view.thread().unwrap();
    assert_eq!(thread.message_count, 3);
    assert_eq!(thread.participant_count, 2);
}

#[tokio::test]
async fn test_report_editor_against_backend() {
    let (backend, base) = start_backend().await;
    let (_session, repository) =
        create_repository(base, SessionCredentials::new(TOKEN, "tenant-1")).await;

    let editor = ReportEditor::new(repository, "r1", Duration::from_millis(100));
    editor.load().await.unwrap();

    assert_eq!(editor.report_name(), "Incident 42");
    let sections = editor.sections();
    assert_eq!(sections[0].id, "s1");
    assert_eq!(sections[1].id, "s2");

    // Empty markup against an empty section is not a change
    editor.edit("<p></p>", ChangeSource::User);
    editor.edit("<p>Initial access via phishing</p>", ChangeSource::User);
    editor.switch_section(1).await.unwrap();

    assert_eq!(
        *backend.content_writes.lock().unwrap(),
        vec![(
            "r1".to_string(),
            "s1".to_string(),
            "<p>Initial access via phishing</p>".to_string()
        )]
    );
    assert_eq!(editor.status().state, SaveState::Idle);

    editor.edit("<p>t2</p>", ChangeSource::User);
    tokio::time::sleep(Duration::from_millis(400)).await;
    assert_eq!(backend.content_writes.lock().unwrap().len(), 2);
    assert_eq!(editor.status().state, SaveState::Saved);

    editor.reorder(1, 0).await.unwrap();
    assert_eq!(
        *backend.order_writes.lock().unwrap(),
        vec![("s2".to_string(), 1), ("s1".to_string(), 2)]
    );

    assert!(editor.rename_section(0, "Attack timeline").await.unwrap());
    assert_eq!(
        *backend.title_writes.lock().unwrap(),
        vec![("s2".to_string(), "Attack timeline".to_string())]
    );

    editor.edit_report_name(" Incident 42 - phishing ");
    editor.leave().await.unwrap();
    assert_eq!(
        *backend.name_writes.lock().unwrap(),
        vec!["Incident 42 - phishing".to_string()]
    );
}

/// Push connector whose connections are fed by the test
struct ChannelConnector {
    connections: Mutex<Vec<UnboundedReceiver<Result<String>>>>,
    urls: Mutex<Vec<String>>,
}

impl ChannelConnector {
    fn with_connection() -> (Arc<Self>, UnboundedSender<Result<String>>) {
        let (tx, rx) = unbounded();
        let connector = Arc::new(Self {
            connections: Mutex::new(vec![rx]),
            urls: Mutex::new(Vec::new()),
        });
        (connector, tx)
    }
}

#[async_trait]
impl PushConnector for ChannelConnector {
    async fn connect(&self, url: &Url) -> Result<PushStream> {
        self.urls.lock().unwrap().push(url.to_string());
        self.connections
            .lock()
            .unwrap()
            .pop()
            .map(|rx| rx.boxed())
            .ok_or_else(|| AppError::Generic("no connection queued".into()))
    }
}

#[tokio::test]
async fn test_provider_reconciles_then_follows_push() {
    let (_backend, base) = start_backend().await;
    let (session, repository) =
        create_repository(base, SessionCredentials::new(TOKEN, "tenant-9")).await;
    let counter = UnreadCounter::new(session.tab());

    let (connector, frames) = ChannelConnector::with_connection();
    let provider = NotificationProvider::mount(
        &session,
        counter.clone(),
        repository,
        connector.clone(),
        Url::parse("ws://localhost:8080").unwrap(),
    );

    // Reconciliation: two unread in the backend payload
    let mut reconciled = false;
    for _ in 0..100 {
        if counter.get().await == 2 {
            reconciled = true;
            break;
        }
        tokio::time::sleep(Duration::from_millis(10)).await;
    }
    assert!(reconciled);

    for frame in [
        r#"{"type":"notification"}"#,
        r#"{"type":"EventNotification"}"#,
        r#"{"type":"mark_notification_read","payload":{"notificationIds":["n1","n4","n9"]}}"#,
        "garbage",
    ] {
        frames.unbounded_send(Ok(frame.to_string())).unwrap();
    }

    let mut settled = false;
    for _ in 0..100 {
        if counter.get().await == 1 {
            settled = true;
            break;
        }
        tokio::time::sleep(Duration::from_millis(10)).await;
    }
    assert!(settled);
    assert_eq!(
        *connector.urls.lock().unwrap(),
        vec![format!("ws://localhost:8080/ws/cases/tenant-9?token={}", TOKEN)]
    );

    provider.unmount();
}
