//! Application state and initialization
//!
//! This module manages the central client state and lifecycle.
//! All services are initialized here and made available through AppState.

use crate::api::{create_http_client, RemoteRepository};
use crate::database::{create_pool, SqliteStore};
use crate::error::Result;
use crate::platform::{Origin, Tab};
use crate::services::{
    ClientSettings, NotificationProvider, ReportEditor, Session, SettingsService, ThreadView,
    UnreadCounter, WsConnector,
};
use std::path::PathBuf;
use std::sync::Arc;

/// Central client state holding all services
#[derive(Clone)]
pub struct AppState {
    pub app_data_dir: PathBuf,
    pub settings: ClientSettings,
    pub settings_service: SettingsService,
    pub origin: Origin,
    pub tab: Tab,
    pub session: Session,
    pub repository: Arc<RemoteRepository>,
    pub unread: UnreadCounter,
}

impl AppState {
    /// Start the push connection for this tab's session
    pub fn mount_notifications(&self) -> Result<NotificationProvider> {
        Ok(NotificationProvider::mount(
            &self.session,
            self.unread.clone(),
            self.repository.clone(),
            Arc::new(WsConnector),
            self.settings.ws_base_url()?,
        ))
    }

    pub fn thread_view(&self) -> ThreadView {
        ThreadView::new(self.repository.clone(), self.session.clone())
    }

    pub fn report_editor(&self, report_id: &str) -> ReportEditor {
        ReportEditor::new(
            self.repository.clone(),
            report_id,
            self.settings.auto_save_delay(),
        )
    }
}

/// Client setup - called once on startup
pub async fn setup(app_data_dir: PathBuf) -> Result<AppState> {
    tracing::info!("Initializing client");
    tracing::info!("App data directory: {:?}", app_data_dir);

    // Create necessary directories
    tokio::fs::create_dir_all(&app_data_dir).await?;

    let settings_service = SettingsService::new(app_data_dir.clone());
    let settings = settings_service.load().await?;

    // Local storage shared by every tab of this origin
    let pool = create_pool(&app_data_dir.join("aegis.db")).await?;
    let origin = Origin::new(Arc::new(SqliteStore::new(pool)));
    let tab = origin.open_tab();

    let session = Session::restore(&tab).await;
    let http = create_http_client(settings.http_timeout())?;
    let repository = Arc::new(RemoteRepository::new(
        http,
        settings.api_base_url()?,
        session.clone(),
    ));
    let unread = UnreadCounter::new(&tab);

    tracing::info!("Client initialized successfully");

    Ok(AppState {
        app_data_dir,
        settings,
        settings_service,
        origin,
        tab,
        session,
        repository,
        unread,
    })
}
