//! Services module
//!
//! Client behaviour that coordinates the platform primitives with the
//! REST repository and the push socket.

pub mod autosave;
pub mod notifications;
pub mod push;
pub mod reports;
pub mod session;
pub mod settings;
pub mod threads;
pub mod unread;

pub use autosave::{Autosave, ChangeSource, ReportStore, SaveState, SaveStatus, SaveTarget};
pub use notifications::{NotificationProvider, NotificationSource};
pub use push::{PushConnector, PushEvent, WsConnector};
pub use reports::ReportEditor;
pub use session::{Session, SessionCredentials};
pub use settings::{ClientSettings, SettingsService};
pub use threads::{build_message_tree, ThreadBackend, ThreadView};
pub use unread::{Adjustment, Subscription, UnreadCounter};
