//! Client configuration constants
//!
//! Central location for storage keys, channel names, resource limits
//! and validation boundaries used throughout the client.

// ===== Persisted Keys =====

/// Local-storage key holding the unread notification count as a string
pub const UNREAD_COUNT_KEY: &str = "aegis:unreadCount";

/// Session-storage key holding the bearer token
pub const AUTH_TOKEN_KEY: &str = "authToken";
/// Session-storage key holding the tenant (push context) identifier
pub const TENANT_ID_KEY: &str = "tenantId";
/// Session-storage key holding the signed-in user identifier
pub const USER_ID_KEY: &str = "userId";
/// Session-storage key holding the team identifier
pub const TEAM_ID_KEY: &str = "teamId";

// ===== Events and Channels =====

/// Same-tab event name and broadcast message type for unread changes
pub const UNREAD_EVENT: &str = "unread:changed";

/// Same-tab event dispatched after login/logout
pub const AUTH_EVENT: &str = "auth:updated";

/// Broadcast channel shared by every tab of the origin
pub const NOTIFICATIONS_CHANNEL: &str = "aegis-notifications";

/// Buffer size of each broadcast channel. Slow receivers skip what they missed.
pub const CHANNEL_CAPACITY: usize = 64;

/// Buffer size of the storage-event fan-out
pub const STORAGE_EVENT_CAPACITY: usize = 256;

// ===== Autosave Limits =====

/// Default quiet period before a section edit is written
pub const DEFAULT_AUTO_SAVE_DELAY_MS: u32 = 600;

/// Minimum auto-save delay in milliseconds.
/// Values below this turn every keystroke into a request.
pub const MIN_AUTO_SAVE_DELAY_MS: u32 = 100;

/// Maximum auto-save delay in milliseconds (5 minutes).
pub const MAX_AUTO_SAVE_DELAY_MS: u32 = 300_000;

/// Prefix of ids (sections, optimistic messages) that only exist on this client
pub const LOCAL_ID_PREFIX: &str = "local-";

/// Title of a section added without one
pub const DEFAULT_SECTION_TITLE: &str = "New Section";

/// Rich-text markup that renders as an empty editor
pub const EMPTY_CONTENT_PATTERNS: &[&str] = &["<p><br></p>", "<p></p>", "<p><br/></p>"];

// ===== Network =====

/// Default REST request timeout in seconds
pub const DEFAULT_HTTP_TIMEOUT_SECS: u64 = 30;

/// Default REST base URL
pub const DEFAULT_API_BASE_URL: &str = "http://localhost:8080";

/// Default push-socket base URL
pub const DEFAULT_WS_BASE_URL: &str = "ws://localhost:8080";
