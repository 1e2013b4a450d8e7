//! Session service
//!
//! Owns the signed-in identity of one tab. Credentials live in the tab's
//! session storage and are republished on a watch channel so long-lived
//! consumers (the notification provider) can react to login and logout.

use crate::config::{AUTH_EVENT, AUTH_TOKEN_KEY, TEAM_ID_KEY, TENANT_ID_KEY, USER_ID_KEY};
use crate::error::Result;
use crate::platform::Tab;
use serde_json::Value;
use std::sync::Arc;
use tokio::sync::watch;

/// Identity and context identifiers of the signed-in user
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct SessionCredentials {
    pub token: Option<String>,
    pub tenant_id: Option<String>,
    pub user_id: Option<String>,
    pub team_id: Option<String>,
}

impl SessionCredentials {
    pub fn new(token: impl Into<String>, tenant_id: impl Into<String>) -> Self {
        Self {
            token: Some(token.into()),
            tenant_id: Some(tenant_id.into()),
            ..Self::default()
        }
    }

    pub fn with_user(mut self, user_id: impl Into<String>) -> Self {
        self.user_id = Some(user_id.into());
        self
    }

    pub fn with_team(mut self, team_id: impl Into<String>) -> Self {
        self.team_id = Some(team_id.into());
        self
    }

    /// Token and tenant, when both are present and non-empty
    pub fn push_context(&self) -> Option<(&str, &str)> {
        match (self.token.as_deref(), self.tenant_id.as_deref()) {
            (Some(token), Some(tenant)) if !token.is_empty() && !tenant.is_empty() => {
                Some((token, tenant))
            }
            _ => None,
        }
    }

    fn entries(&self) -> [(&'static str, Option<&str>); 4] {
        [
            (AUTH_TOKEN_KEY, self.token.as_deref()),
            (TENANT_ID_KEY, self.tenant_id.as_deref()),
            (USER_ID_KEY, self.user_id.as_deref()),
            (TEAM_ID_KEY, self.team_id.as_deref()),
        ]
    }
}

/// Session of one tab
#[derive(Clone)]
pub struct Session {
    tab: Tab,
    tx: Arc<watch::Sender<SessionCredentials>>,
}

impl Session {
    /// Pick up whatever credentials the tab's session storage already holds
    pub async fn restore(tab: &Tab) -> Self {
        let storage = tab.session_storage();
        let read = |key: &'static str| async move {
            match storage.get_item(key).await {
                Ok(value) => value.filter(|v| !v.is_empty()),
                Err(e) => {
                    tracing::warn!("Failed to read session key {}: {}", key, e);
                    None
                }
            }
        };

        let credentials = SessionCredentials {
            token: read(AUTH_TOKEN_KEY).await,
            tenant_id: read(TENANT_ID_KEY).await,
            user_id: read(USER_ID_KEY).await,
            team_id: read(TEAM_ID_KEY).await,
        };

        tracing::debug!(
            "Session restored for tab {} (authenticated: {})",
            tab.id(),
            credentials.token.is_some()
        );

        let (tx, _) = watch::channel(credentials);
        Self {
            tab: tab.clone(),
            tx: Arc::new(tx),
        }
    }

    /// Store new credentials and announce them
    pub async fn login(&self, credentials: SessionCredentials) -> Result<()> {
        let storage = self.tab.session_storage();

        for (key, value) in credentials.entries() {
            match value {
                Some(value) => storage.set_item(key, value).await?,
                None => storage.remove_item(key).await?,
            }
        }

        tracing::info!("Session credentials updated for tab {}", self.tab.id());
        self.publish(credentials);
        Ok(())
    }

    /// Clear all credentials and announce it
    pub async fn logout(&self) -> Result<()> {
        let storage = self.tab.session_storage();

        for (key, _) in SessionCredentials::default().entries() {
            storage.remove_item(key).await?;
        }

        tracing::info!("Session cleared for tab {}", self.tab.id());
        self.publish(SessionCredentials::default());
        Ok(())
    }

    pub fn credentials(&self) -> SessionCredentials {
        self.tx.borrow().clone()
    }

    pub fn token(&self) -> Option<String> {
        self.tx.borrow().token.clone()
    }

    pub fn user_id(&self) -> Option<String> {
        self.tx.borrow().user_id.clone()
    }

    /// Receiver that wakes on every login/logout
    pub fn watch(&self) -> watch::Receiver<SessionCredentials> {
        self.tx.subscribe()
    }

    pub fn tab(&self) -> &Tab {
        &self.tab
    }

    fn publish(&self, credentials: SessionCredentials) {
        self.tx.send_replace(credentials);
        self.tab.events().dispatch(AUTH_EVENT, Value::Null);
    }
}
