//! Push socket transport and frame classification
//!
//! The server pushes JSON text frames of the form `{"type": ..., "payload": ...}`.
//! Only two families matter to the client:
//! - `notification` / `EventNotification`: one new unread notification
//! - `mark_notification_read`: `payload.notificationIds` were read elsewhere

use crate::error::{AppError, Result};
use async_trait::async_trait;
use futures::stream::{BoxStream, StreamExt};
use serde_json::Value;
use tokio_tungstenite::tungstenite::Message;
use url::Url;

/// Text frames from an open push connection. The stream ends when the
/// connection closes.
pub type PushStream = BoxStream<'static, Result<String>>;

/// Opens push connections
#[async_trait]
pub trait PushConnector: Send + Sync {
    async fn connect(&self, url: &Url) -> Result<PushStream>;
}

/// WebSocket transport
#[derive(Debug, Clone, Copy, Default)]
pub struct WsConnector;

#[async_trait]
impl PushConnector for WsConnector {
    async fn connect(&self, url: &Url) -> Result<PushStream> {
        let (socket, response) = tokio_tungstenite::connect_async(url.as_str()).await?;
        tracing::debug!("[WS] Handshake completed with status {}", response.status());

        let frames = socket.filter_map(|message| async move {
            match message {
                Ok(Message::Text(text)) => Some(Ok(text)),
                Ok(Message::Binary(bytes)) => Some(Ok(String::from_utf8_lossy(&bytes).into_owned())),
                Ok(Message::Close(frame)) => {
                    tracing::debug!("[WS] Close frame received: {:?}", frame);
                    None
                }
                Ok(_) => None,
                Err(e) => Some(Err(AppError::from(e))),
            }
        });

        Ok(frames.boxed())
    }
}

/// A classified push frame
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum PushEvent {
    Notification,
    NotificationsRead { ids: Vec<String> },
    Other(String),
}

impl PushEvent {
    /// Effect of the event on the unread count
    pub fn unread_delta(&self) -> i64 {
        match self {
            PushEvent::Notification => 1,
            PushEvent::NotificationsRead { ids } => {
                -i64::try_from(ids.len()).unwrap_or(i64::MAX)
            }
            PushEvent::Other(_) => 0,
        }
    }
}

/// Classify one text frame
pub fn classify(frame: &str) -> Result<PushEvent> {
    let message: Value = serde_json::from_str(frame)
        .map_err(|e| AppError::MalformedPush(format!("not JSON: {}", e)))?;

    let kind = message
        .get("type")
        .and_then(Value::as_str)
        .ok_or_else(|| AppError::MalformedPush("missing type".to_string()))?;

    let event = match kind {
        "notification" | "EventNotification" => PushEvent::Notification,
        "mark_notification_read" => {
            let ids = message
                .get("payload")
                .and_then(|payload| {
                    payload
                        .get("notificationIds")
                        .or_else(|| payload.get("notification_ids"))
                })
                .and_then(Value::as_array)
                .map(|ids| ids.iter().map(id_string).collect())
                .unwrap_or_default();
            PushEvent::NotificationsRead { ids }
        }
        other => PushEvent::Other(other.to_string()),
    };

    Ok(event)
}

/// `{ws_base}/ws/cases/{tenant_id}?token={token}`
pub fn push_url(ws_base: &Url, tenant_id: &str, token: &str) -> Result<Url> {
    let mut url = ws_base.clone();
    url.set_query(None);

    url.path_segments_mut()
        .map_err(|_| AppError::Generic(format!("Cannot use {} as a push base URL", ws_base)))?
        .pop_if_empty()
        .extend(["ws", "cases", tenant_id]);

    url.query_pairs_mut().append_pair("token", token);

    Ok(url)
}

fn id_string(id: &Value) -> String {
    match id {
        Value::String(s) => s.clone(),
        other => other.to_string(),
    }
}
