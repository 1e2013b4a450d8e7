//! Response-shape normalization
//!
//! List endpoints answer with a bare array, or with the array wrapped in
//! one of several envelope keys, sometimes nested one level deeper
//! (`{"data": {"items": [...]}}`). Everything funnels through
//! `list_items`; an untolerated shape is an empty list.

use super::models::{Notification, ReportDocument, ReportSection};
use serde::de::DeserializeOwned;
use serde_json::Value;

/// Envelope keys that may hold a list, in lookup order
const LIST_KEYS: &[&str] = &[
    "data",
    "items",
    "results",
    "notifications",
    "messages",
    "sections",
    "content",
];

/// Keys that may hold a precomputed unread count
const COUNT_KEYS: &[&str] = &["count", "unreadCount", "unread_count"];

/// Extract the list carried by `payload`, if any
pub fn list_items(payload: Value) -> Option<Vec<Value>> {
    match payload {
        Value::Array(items) => Some(items),
        Value::Object(mut map) => {
            for key in LIST_KEYS {
                match map.remove(*key) {
                    Some(Value::Array(items)) => return Some(items),
                    Some(nested @ Value::Object(_)) => {
                        if let Some(items) = list_items(nested) {
                            return Some(items);
                        }
                    }
                    _ => {}
                }
            }
            None
        }
        _ => None,
    }
}

/// Deserialize every item of a list payload, skipping items that do not fit
pub fn normalize_list<T: DeserializeOwned>(payload: Value) -> Vec<T> {
    let Some(items) = list_items(payload) else {
        tracing::warn!("Unrecognized list payload, treating as empty");
        return Vec::new();
    };

    items
        .into_iter()
        .filter_map(|item| match serde_json::from_value(item) {
            Ok(parsed) => Some(parsed),
            Err(e) => {
                tracing::warn!("Skipping malformed list item: {}", e);
                None
            }
        })
        .collect()
}

/// Unread count from a notifications payload.
///
/// A list counts entries that are neither read nor archived; an object
/// without a list may carry the count directly. Anything else is 0.
pub fn unread_count(payload: Value) -> i64 {
    let count_field = COUNT_KEYS
        .iter()
        .find_map(|key| payload.get(*key).and_then(Value::as_i64));

    if let Some(items) = list_items(payload) {
        let unread = items
            .into_iter()
            .filter_map(|item| serde_json::from_value::<Notification>(item).ok())
            .filter(Notification::is_unread)
            .count();
        return i64::try_from(unread).unwrap_or(i64::MAX);
    }

    count_field.unwrap_or(0).max(0)
}

/// Report name and sections from `GET /reports/{id}`.
///
/// Report fields sit at the top level or under `metadata`; sections under
/// `content` or `sections`.
pub fn report_document(payload: Value) -> ReportDocument {
    let text = |key: &str| -> String {
        let meta = payload.get("metadata").unwrap_or(&payload);
        match meta.get(key).or_else(|| payload.get(key)) {
            Some(Value::String(s)) => s.clone(),
            Some(Value::Number(n)) => n.to_string(),
            _ => String::new(),
        }
    };
    let id = text("id");
    let name = text("name");

    let sections: Vec<ReportSection> = normalize_list(payload);
    ReportDocument { id, name, sections }
}
