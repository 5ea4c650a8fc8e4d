//! Notification history, delivery and preferences.

use std::sync::Arc;
use std::time::Duration;

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use serde_json::Value;
use tokio::sync::watch;
use tokio::task::JoinHandle;
use tracing::debug;

use crate::api::{ApiClient, ApiError, ApiResult, Endpoint, Params, Transport};

const HISTORY: Endpoint = Endpoint::get("notifications", "/notifications/{user_id}");
const MARK_READ: Endpoint =
  Endpoint::post("notifications", "/notifications/{notification_id}/read");
const MARK_ALL_READ: Endpoint =
  Endpoint::post("notifications", "/notifications/{user_id}/read-all");
const SEND: Endpoint = Endpoint::post("notifications", "/send");
const GET_PREFERENCES: Endpoint = Endpoint::get("preferences", "/preferences/{user_id}").cached();
const UPDATE_PREFERENCES: Endpoint = Endpoint::put("preferences", "/preferences/{user_id}");

pub const DEFAULT_POLL_INTERVAL: Duration = Duration::from_secs(30);
/// Shortest interval `start_polling` will use.
pub const MIN_POLL_INTERVAL: Duration = Duration::from_secs(1);

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum NotificationType {
  DealCreated,
  DealAccepted,
  DealCompleted,
  PaymentReceived,
  DeliverableSubmitted,
  DeliverableApproved,
  DeliverableRejected,
  MessageReceived,
  CheckinReminder,
  ContentScheduled,
  MarketingCampaignUpdate,
  SystemAlert,
}

impl NotificationType {
  pub fn icon(self) -> &'static str {
    match self {
      Self::DealCreated => "🤝",
      Self::DealAccepted => "✅",
      Self::DealCompleted => "🎉",
      Self::PaymentReceived => "💰",
      Self::DeliverableSubmitted => "📤",
      Self::DeliverableApproved => "✔️",
      Self::DeliverableRejected => "❌",
      Self::MessageReceived => "💬",
      Self::CheckinReminder => "📍",
      Self::ContentScheduled => "📅",
      Self::MarketingCampaignUpdate => "📢",
      Self::SystemAlert => "⚠️",
    }
  }

  pub fn color(self) -> &'static str {
    match self {
      Self::DealCreated
      | Self::DealAccepted
      | Self::DealCompleted
      | Self::DeliverableApproved => "#4CAF50",
      Self::PaymentReceived | Self::MarketingCampaignUpdate => "#2196F3",
      Self::DeliverableSubmitted | Self::CheckinReminder | Self::ContentScheduled => "#FF9800",
      Self::DeliverableRejected => "#F44336",
      Self::MessageReceived => "#9C27B0",
      Self::SystemAlert => "#FF5722",
    }
  }
}

/// Icon and color for a raw type string; unknown types get a neutral bell.
pub fn type_badge(kind: &str) -> (&'static str, &'static str) {
  serde_json::from_value::<NotificationType>(Value::String(kind.to_string()))
    .map(|t| (t.icon(), t.color()))
    .unwrap_or(("🔔", "#757575"))
}

/// `Just now`, `5 minutes ago`, `2 days ago`, then a calendar date after a week.
pub fn format_relative_time(at: DateTime<Utc>, now: DateTime<Utc>) -> String {
  let elapsed = now.signed_duration_since(at);
  let plural = |n: i64, unit: &str| format!("{} {}{} ago", n, unit, if n == 1 { "" } else { "s" });
  match (elapsed.num_minutes(), elapsed.num_hours(), elapsed.num_days()) {
    (m, _, _) if m < 1 => "Just now".to_string(),
    (m, _, _) if m < 60 => plural(m, "minute"),
    (_, h, _) if h < 24 => plural(h, "hour"),
    (_, _, d) if d < 7 => plural(d, "day"),
    _ => at.format("%b %-d, %Y").to_string(),
  }
}

#[derive(Debug, Clone, PartialEq, Deserialize)]
pub struct Notification {
  pub id: u64,
  #[serde(default)]
  pub notification_type: Option<String>,
  #[serde(default)]
  pub title: String,
  #[serde(default)]
  pub message: String,
  #[serde(default)]
  pub is_read: bool,
  #[serde(default)]
  pub created_at: Option<DateTime<Utc>>,
}

#[derive(Debug, Clone, PartialEq, Deserialize)]
pub struct NotificationPage {
  #[serde(default)]
  pub notifications: Vec<Notification>,
  #[serde(default)]
  pub unread_count: u64,
}

#[derive(Debug, Clone, Copy)]
pub struct HistoryQuery {
  pub limit: u32,
  pub offset: u32,
  pub unread_only: bool,
}

impl Default for HistoryQuery {
  fn default() -> Self {
    Self {
      limit: 50,
      offset: 0,
      unread_only: false,
    }
  }
}

#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct OutgoingNotification {
  pub user_id: u64,
  pub notification_type: String,
  pub title: String,
  pub message: String,
  pub channels: Vec<String>,
  pub metadata: Option<Value>,
  pub scheduled_for: Option<DateTime<Utc>>,
}

impl OutgoingNotification {
  /// A push notification with no metadata, delivered immediately.
  pub fn push(user_id: u64, notification_type: &str, title: &str, message: &str) -> Self {
    Self {
      user_id,
      notification_type: notification_type.to_string(),
      title: title.to_string(),
      message: message.to_string(),
      channels: vec!["push".to_string()],
      metadata: None,
      scheduled_for: None,
    }
  }
}

/// Partial preference update; only the fields that are set are sent.
#[derive(Debug, Clone, Default, PartialEq, Serialize)]
pub struct PreferencesUpdate {
  #[serde(skip_serializing_if = "Option::is_none")]
  pub email_notifications: Option<bool>,
  #[serde(skip_serializing_if = "Option::is_none")]
  pub push_notifications: Option<bool>,
  #[serde(skip_serializing_if = "Option::is_none")]
  pub sms_notifications: Option<bool>,
  #[serde(skip_serializing_if = "Option::is_none")]
  pub notification_types: Option<Vec<String>>,
}

/// Client for the notification service.
///
/// The last known unread count is published on a watch channel so several
/// consumers can follow it.
pub struct NotificationService<T: Transport> {
  client: ApiClient<T>,
  unread: watch::Sender<u64>,
}

impl<T: Transport> NotificationService<T> {
  pub fn new(client: ApiClient<T>) -> Self {
    Self {
      client,
      unread: watch::Sender::new(0),
    }
  }

  pub fn client(&self) -> &ApiClient<T> {
    &self.client
  }

  pub fn unread_count(&self) -> u64 {
    *self.unread.borrow()
  }

  pub fn subscribe_unread(&self) -> watch::Receiver<u64> {
    self.unread.subscribe()
  }

  pub async fn get_notification_history(
    &self,
    user_id: u64,
    query: HistoryQuery,
  ) -> ApiResult<NotificationPage> {
    let params = Params::new()
      .path("user_id", user_id)
      .query("limit", query.limit)
      .query("offset", query.offset)
      .query("unread_only", query.unread_only);
    let page = self.client.request::<NotificationPage>(&HISTORY, &params, None).await?;
    self.unread.send_replace(page.data.unread_count);
    Ok(page)
  }

  pub async fn mark_as_read(&self, notification_id: u64) -> ApiResult<Value> {
    let params = Params::new().path("notification_id", notification_id);
    let result = self.client.request(&MARK_READ, &params, None).await?;
    self.unread.send_if_modified(|count| {
      let before = *count;
      *count = count.saturating_sub(1);
      before != *count
    });
    Ok(result)
  }

  pub async fn mark_all_as_read(&self, user_id: u64) -> ApiResult<Value> {
    let params = Params::new().path("user_id", user_id);
    let result = self.client.request(&MARK_ALL_READ, &params, None).await?;
    self.unread.send_replace(0);
    Ok(result)
  }

  pub async fn send_notification(&self, notification: &OutgoingNotification) -> ApiResult<Value> {
    let mut missing = Vec::new();
    if notification.notification_type.trim().is_empty() {
      missing.push("notification_type");
    }
    if notification.title.trim().is_empty() {
      missing.push("title");
    }
    if notification.message.trim().is_empty() {
      missing.push("message");
    }
    if !missing.is_empty() {
      return Err(ApiError::validation(format!(
        "Missing required fields: {}",
        missing.join(", ")
      )));
    }
    if notification.channels.is_empty() {
      return Err(ApiError::validation("At least one delivery channel is required"));
    }
    self.client.request_with(&SEND, &Params::new(), notification).await
  }

  pub async fn get_notification_preferences(&self, user_id: u64) -> ApiResult<Value> {
    let params = Params::new().path("user_id", user_id);
    self.client.request(&GET_PREFERENCES, &params, None).await
  }

  /// Updates preferences; the backend answers `{preferences: ...}`.
  pub async fn update_notification_preferences(
    &self,
    user_id: u64,
    update: &PreferencesUpdate,
  ) -> ApiResult<Value> {
    let params = Params::new().path("user_id", user_id);
    let result = self
      .client
      .request_with::<Value, _>(&UPDATE_PREFERENCES, &params, update)
      .await?;
    Ok(result.map(|mut envelope| {
      envelope
        .get_mut("preferences")
        .map(Value::take)
        .unwrap_or(envelope)
    }))
  }
}

impl<T: Transport> NotificationService<T> {
  /// Refresh the unread count every `every` until the handle is aborted.
  ///
  /// Intervals below [`MIN_POLL_INTERVAL`] are raised to it. Failures are
  /// logged by the client and the loop keeps going.
  pub fn start_polling(self: Arc<Self>, user_id: u64, every: Duration) -> JoinHandle<()> {
    let every = every.max(MIN_POLL_INTERVAL);
    tokio::spawn(async move {
      let mut ticker = tokio::time::interval(every);
      ticker.set_missed_tick_behavior(tokio::time::MissedTickBehavior::Delay);
      loop {
        ticker.tick().await;
        let query = HistoryQuery {
          limit: 1,
          ..Default::default()
        };
        if let Ok(page) = self.get_notification_history(user_id, query).await {
          debug!(user_id, unread = page.data.unread_count, "Polled notifications");
        }
      }
    })
  }
}
