//! Deliverable service: per-deal deliverables, review workflow, bulk edits.

use std::str::FromStr;

use chrono::{DateTime, NaiveDate, Utc};
use serde::{Deserialize, Serialize};
use serde_json::{json, Value};

use crate::api::{ApiClient, ApiError, ApiResult, Endpoint, Params, Transport};

use super::merge_fields;

const CREATE: Endpoint = Endpoint::post("deliverables", "/deals/{deal_id}/deliverables");
const LIST_FOR_DEAL: Endpoint =
  Endpoint::get("deliverables", "/deals/{deal_id}/deliverables").cached();
const GET: Endpoint = Endpoint::get("deliverables", "/deliverables/{deliverable_id}").cached();
const UPDATE: Endpoint = Endpoint::patch("deliverables", "/deliverables/{deliverable_id}");
const DELETE: Endpoint = Endpoint::delete("deliverables", "/deliverables/{deliverable_id}");
const SUBMIT: Endpoint = Endpoint::post("deliverables", "/deliverables/{deliverable_id}/submit");
const APPROVE: Endpoint = Endpoint::post("deliverables", "/deliverables/{deliverable_id}/approve");
const REJECT: Endpoint = Endpoint::post("deliverables", "/deliverables/{deliverable_id}/reject");
const REQUEST_REVISION: Endpoint =
  Endpoint::post("deliverables", "/deliverables/{deliverable_id}/request-revision");
const BULK_CREATE: Endpoint = Endpoint::post("deliverables", "/deals/{deal_id}/deliverables/bulk");
const BULK_UPDATE: Endpoint = Endpoint::patch("deliverables", "/deliverables/bulk-update");
const ANALYTICS: Endpoint =
  Endpoint::get("deliverables", "/deals/{deal_id}/deliverables/analytics");

/// Review state of a deliverable.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum DeliverableStatus {
  Pending,
  InProgress,
  Submitted,
  Approved,
  Rejected,
  RevisionRequested,
}

impl DeliverableStatus {
  pub const ALL: [Self; 6] = [
    Self::Pending,
    Self::InProgress,
    Self::Submitted,
    Self::Approved,
    Self::Rejected,
    Self::RevisionRequested,
  ];

  pub fn as_str(self) -> &'static str {
    match self {
      Self::Pending => "pending",
      Self::InProgress => "in_progress",
      Self::Submitted => "submitted",
      Self::Approved => "approved",
      Self::Rejected => "rejected",
      Self::RevisionRequested => "revision_requested",
    }
  }

  pub fn label(self) -> &'static str {
    match self {
      Self::Pending => "Pending",
      Self::InProgress => "In Progress",
      Self::Submitted => "Submitted",
      Self::Approved => "Approved",
      Self::Rejected => "Rejected",
      Self::RevisionRequested => "Revision Requested",
    }
  }

  /// Badge color as a hex string.
  pub fn color(self) -> &'static str {
    match self {
      Self::Pending => "#FFA726",
      Self::InProgress => "#29B6F6",
      Self::Submitted => "#9C27B0",
      Self::Approved => "#66BB6A",
      Self::Rejected => "#EF5350",
      Self::RevisionRequested => "#FF7043",
    }
  }
}

impl FromStr for DeliverableStatus {
  type Err = ApiError;

  fn from_str(s: &str) -> Result<Self, Self::Err> {
    Self::ALL
      .into_iter()
      .find(|status| status.as_str() == s)
      .ok_or_else(|| ApiError::validation(format!("Unknown deliverable status '{}'", s)))
  }
}

/// Human-readable label; unknown statuses are shown as-is.
pub fn status_label(status: &str) -> &str {
  match status.parse::<DeliverableStatus>() {
    Ok(known) => known.label(),
    Err(_) => status,
  }
}

/// Badge color; unknown statuses are grey.
pub fn status_color(status: &str) -> &'static str {
  status
    .parse::<DeliverableStatus>()
    .map(DeliverableStatus::color)
    .unwrap_or("#757575")
}

/// Kinds of work a deal can require.
pub const DELIVERABLE_TYPES: [&str; 10] = [
  "social_post",
  "video",
  "image",
  "blog_post",
  "event_appearance",
  "content_creation",
  "product_review",
  "livestream",
  "podcast",
  "checkin",
];

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Deliverable {
  pub id: u64,
  #[serde(default)]
  pub deal_id: Option<u64>,
  #[serde(default)]
  pub title: Option<String>,
  #[serde(default, rename = "type", alias = "deliverable_type")]
  pub kind: Option<String>,
  pub status: String,
  #[serde(default)]
  pub due_date: Option<String>,
}

impl Deliverable {
  pub fn status(&self) -> Option<DeliverableStatus> {
    self.status.parse().ok()
  }

  pub fn due(&self) -> Option<DateTime<Utc>> {
    self.due_date.as_deref().and_then(parse_due_date)
  }

  /// Past due and not yet approved.
  pub fn is_overdue(&self, now: DateTime<Utc>) -> bool {
    if self.status() == Some(DeliverableStatus::Approved) {
      return false;
    }
    self.due().is_some_and(|due| now > due)
  }
}

/// Accepts RFC 3339 timestamps or bare `YYYY-MM-DD` dates (midnight UTC).
pub fn parse_due_date(raw: &str) -> Option<DateTime<Utc>> {
  if let Ok(ts) = DateTime::parse_from_rfc3339(raw) {
    return Some(ts.with_timezone(&Utc));
  }
  NaiveDate::parse_from_str(raw, "%Y-%m-%d")
    .ok()
    .and_then(|date| date.and_hms_opt(0, 0, 0))
    .map(|naive| naive.and_utc())
}

/// Relative due-date text such as "Due tomorrow" or "Overdue by 3 days".
pub fn format_due_date(due: DateTime<Utc>, now: DateTime<Utc>) -> String {
  let diff_days = (due - now).num_milliseconds().div_euclid(86_400_000);

  match diff_days {
    d if d < 0 => {
      let n = d.abs();
      format!("Overdue by {} {}", n, if n == 1 { "day" } else { "days" })
    }
    0 => "Due today".to_string(),
    1 => "Due tomorrow".to_string(),
    d if d < 7 => format!("Due in {} days", d),
    _ => due.format("%b %-d, %Y").to_string(),
  }
}

/// Percentage of deliverables approved, rounded to the nearest whole number.
pub fn completion_percentage(deliverables: &[Deliverable]) -> u8 {
  if deliverables.is_empty() {
    return 0;
  }
  let approved = deliverables
    .iter()
    .filter(|d| d.status() == Some(DeliverableStatus::Approved))
    .count();
  ((approved as f64 / deliverables.len() as f64) * 100.0).round() as u8
}

/// Optional filters for listing a deal's deliverables.
#[derive(Debug, Clone, Default)]
pub struct DeliverableFilter {
  pub status: Option<DeliverableStatus>,
  pub kind: Option<String>,
}

/// Client for the deliverable service.
pub struct DeliverableService<T: Transport> {
  client: ApiClient<T>,
}

impl<T: Transport> DeliverableService<T> {
  pub fn new(client: ApiClient<T>) -> Self {
    Self { client }
  }

  pub fn client(&self) -> &ApiClient<T> {
    &self.client
  }

  pub async fn create_deliverable(&self, deal_id: u64, deliverable: &Value) -> ApiResult<Value> {
    let params = Params::new().path("deal_id", deal_id);
    self.client.request(&CREATE, &params, Some(deliverable)).await
  }

  pub async fn get_deliverables(
    &self,
    deal_id: u64,
    filter: &DeliverableFilter,
  ) -> ApiResult<Vec<Deliverable>> {
    let params = Params::new()
      .path("deal_id", deal_id)
      .query_opt("status", filter.status.map(DeliverableStatus::as_str))
      .query_opt("type", filter.kind.as_deref());
    self.client.request(&LIST_FOR_DEAL, &params, None).await
  }

  pub async fn get_deliverable(&self, deliverable_id: u64) -> ApiResult<Deliverable> {
    self
      .client
      .request(&GET, &by_id(deliverable_id), None)
      .await
  }

  pub async fn update_deliverable(&self, deliverable_id: u64, updates: &Value) -> ApiResult<Value> {
    self
      .client
      .request(&UPDATE, &by_id(deliverable_id), Some(updates))
      .await
  }

  pub async fn delete_deliverable(&self, deliverable_id: u64) -> ApiResult<Value> {
    self
      .client
      .request(&DELETE, &by_id(deliverable_id), None)
      .await
  }

  pub async fn submit_deliverable(
    &self,
    deliverable_id: u64,
    submission: &Value,
  ) -> ApiResult<Value> {
    self
      .client
      .request(&SUBMIT, &by_id(deliverable_id), Some(submission))
      .await
  }

  pub async fn approve_deliverable(
    &self,
    deliverable_id: u64,
    approval: &Value,
  ) -> ApiResult<Value> {
    self
      .client
      .request(&APPROVE, &by_id(deliverable_id), Some(approval))
      .await
  }

  pub async fn reject_deliverable(
    &self,
    deliverable_id: u64,
    reason: &str,
    details: &Value,
  ) -> ApiResult<Value> {
    if reason.trim().is_empty() {
      return Err(ApiError::validation("Rejection reason is required"));
    }
    let body = merge_fields(json!({ "reason": reason }), details);
    self
      .client
      .request(&REJECT, &by_id(deliverable_id), Some(&body))
      .await
  }

  pub async fn request_revision(&self, deliverable_id: u64, feedback: &str) -> ApiResult<Value> {
    if feedback.trim().is_empty() {
      return Err(ApiError::validation("Revision feedback is required"));
    }
    let body = json!({ "feedback": feedback });
    self
      .client
      .request(&REQUEST_REVISION, &by_id(deliverable_id), Some(&body))
      .await
  }

  pub async fn create_deliverables_in_bulk(
    &self,
    deal_id: u64,
    deliverables: &[Value],
  ) -> ApiResult<Value> {
    if deliverables.is_empty() {
      return Err(ApiError::validation("At least one deliverable is required"));
    }
    let params = Params::new().path("deal_id", deal_id);
    let body = json!({ "deliverables": deliverables });
    self.client.request(&BULK_CREATE, &params, Some(&body)).await
  }

  /// Each update is `{deliverable_id, updates}`.
  pub async fn update_deliverables_in_bulk(&self, updates: &[Value]) -> ApiResult<Value> {
    if updates.is_empty() {
      return Err(ApiError::validation("At least one update is required"));
    }
    let body = json!({ "updates": updates });
    self
      .client
      .request(&BULK_UPDATE, &Params::new(), Some(&body))
      .await
  }

  pub async fn get_deliverable_analytics(&self, deal_id: u64) -> ApiResult<Value> {
    let params = Params::new().path("deal_id", deal_id);
    self.client.request(&ANALYTICS, &params, None).await
  }

  pub async fn get_completion_percentage(&self, deal_id: u64) -> ApiResult<u8> {
    let result = self
      .get_deliverables(deal_id, &DeliverableFilter::default())
      .await?;
    Ok(result.map(|deliverables| completion_percentage(&deliverables)))
  }
}

fn by_id(deliverable_id: u64) -> Params {
  Params::new().path("deliverable_id", deliverable_id)
}
