//! Push notifications and notification clicks.

use chrono::Utc;
use reqwest::Url;
use serde::{Deserialize, Serialize};
use serde_json::Value;
use tracing::debug;

use super::WorkerContext;
use crate::config::NotificationDefaults;
use crate::error::WorkerResult;

pub const EXPLORE_ACTION: &str = "explore";
pub const CLOSE_ACTION: &str = "close";

const DEFAULT_PRIMARY_KEY: &str = "1";

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct NotificationAction {
    pub action: String,
    pub title: String,
    pub icon: String,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct NotificationData {
    /// Milliseconds since the Unix epoch.
    pub date_of_arrival: i64,
    pub primary_key: Value,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Notification {
    pub title: String,
    pub body: String,
    pub icon: String,
    pub badge: String,
    pub vibrate: Vec<u32>,
    pub data: NotificationData,
    pub actions: Vec<NotificationAction>,
}

#[derive(Debug, Default, Deserialize)]
#[serde(rename_all = "camelCase")]
struct PushPayload {
    title: Option<Value>,
    body: Option<Value>,
    primary_key: Option<Value>,
}

/// JavaScript truthiness, which decides whether a payload field wins over
/// its default.
fn is_truthy(value: &Value) -> bool {
    match value {
        Value::Null => false,
        Value::Bool(b) => *b,
        Value::Number(n) => n.as_f64().map(|f| f != 0.0 && !f.is_nan()).unwrap_or(true),
        Value::String(s) => !s.is_empty(),
        Value::Array(_) | Value::Object(_) => true,
    }
}

fn text_or(value: Option<Value>, default: &str) -> String {
    match value.filter(is_truthy) {
        Some(Value::String(s)) => s,
        Some(other) => other.to_string(),
        None => default.to_string(),
    }
}

/// Build the notification for a decoded push payload.
///
/// A payload that is valid JSON but not an object behaves like an empty
/// object: every field takes its default.
pub fn build_notification(defaults: &NotificationDefaults, payload: Value) -> Notification {
    let payload: PushPayload = if payload.is_object() {
        serde_json::from_value(payload).unwrap_or_default()
    } else {
        PushPayload::default()
    };

    Notification {
        title: text_or(payload.title, &defaults.title),
        body: text_or(payload.body, &defaults.body),
        icon: defaults.icon.clone(),
        badge: defaults.badge.clone(),
        vibrate: defaults.vibrate.clone(),
        data: NotificationData {
            date_of_arrival: Utc::now().timestamp_millis(),
            primary_key: payload
                .primary_key
                .filter(is_truthy)
                .unwrap_or_else(|| Value::String(DEFAULT_PRIMARY_KEY.to_string())),
        },
        actions: vec![
            NotificationAction {
                action: EXPLORE_ACTION.to_string(),
                title: "View Details".to_string(),
                icon: defaults.explore_icon.clone(),
            },
            NotificationAction {
                action: CLOSE_ACTION.to_string(),
                title: "Close".to_string(),
                icon: defaults.close_icon.clone(),
            },
        ],
    }
}

/// Show a notification for a push message. Pushes without data, or with
/// data that is not JSON, are ignored.
pub async fn handle_push(
    ctx: &WorkerContext,
    data: Option<&[u8]>,
) -> WorkerResult<Option<Notification>> {
    let Some(data) = data else {
        return Ok(None);
    };
    let payload: Value = match serde_json::from_slice(data) {
        Ok(Value::Null) => {
            debug!("Ignoring push with null payload");
            return Ok(None);
        }
        Ok(payload) => payload,
        Err(e) => {
            debug!(error = %e, "Ignoring push with malformed payload");
            return Ok(None);
        }
    };

    let notification = build_notification(&ctx.config.notification, payload);
    ctx.host.show_notification(notification.clone()).await?;
    Ok(Some(notification))
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum ClickRoute {
    Dismissed,
    Opened(Url),
}

/// Close the clicked notification, then open the app unless the user
/// picked the close action.
pub async fn handle_notification_click(
    ctx: &WorkerContext,
    notification: &Notification,
    action: Option<&str>,
) -> WorkerResult<ClickRoute> {
    ctx.host.close_notification(notification).await;

    if action == Some(CLOSE_ACTION) {
        return Ok(ClickRoute::Dismissed);
    }

    let url = ctx.config.resolve(&ctx.config.app_root)?;
    ctx.host.open_window(url.clone()).await?;
    Ok(ClickRoute::Opened(url))
}
