//! Payment disputes and refunds.

use serde::{Deserialize, Serialize};
use serde_json::{json, Value};

use crate::api::{ApiClient, ApiError, ApiResult, Endpoint, Params, Transport};

const REASONS: Endpoint = Endpoint::get("dispute-reasons", "/disputes/reasons").cached();
const CREATE: Endpoint = Endpoint::post("disputes", "/disputes");
const LIST: Endpoint = Endpoint::get("disputes", "/disputes").cached();
const GET: Endpoint = Endpoint::get("disputes", "/disputes/{dispute_id}").cached();
const ADD_EVIDENCE: Endpoint = Endpoint::post("disputes", "/disputes/{dispute_id}/evidence");
const CANCEL: Endpoint = Endpoint::post("disputes", "/disputes/{dispute_id}/cancel");
const REQUEST_REFUND: Endpoint = Endpoint::post("refunds", "/refunds").invalidates(&["disputes"]);
const GET_REFUND: Endpoint = Endpoint::get("refunds", "/refunds/{refund_id}").cached();
const LIST_REFUNDS: Endpoint = Endpoint::get("refunds", "/refunds").cached();

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum DisputeCategory {
  NonDelivery,
  QualityIssue,
  Unauthorized,
  Duplicate,
  IncorrectAmount,
  ServiceNotRendered,
  Fraudulent,
  Other,
}

impl DisputeCategory {
  pub fn display_name(self) -> &'static str {
    match self {
      Self::NonDelivery => "Non-Delivery",
      Self::QualityIssue => "Quality Issue",
      Self::Unauthorized => "Unauthorized Transaction",
      Self::Duplicate => "Duplicate Charge",
      Self::IncorrectAmount => "Incorrect Amount",
      Self::ServiceNotRendered => "Service Not Rendered",
      Self::Fraudulent => "Fraudulent Transaction",
      Self::Other => "Other",
    }
  }

  pub fn description(self) -> &'static str {
    match self {
      Self::NonDelivery => "The deliverable was not provided as agreed",
      Self::QualityIssue => "The deliverable did not meet quality standards",
      Self::Unauthorized => "Payment was made without authorization",
      Self::Duplicate => "Multiple charges for the same deal",
      Self::IncorrectAmount => "Charged amount differs from agreement",
      Self::ServiceNotRendered => "Services outlined in the deal were not performed",
      Self::Fraudulent => "Suspected fraudulent transaction",
      Self::Other => "Other dispute reason",
    }
  }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum DisputeStatus {
  Pending,
  UnderReview,
  Resolved,
  Rejected,
  Cancelled,
}

impl DisputeStatus {
  pub fn label(self) -> &'static str {
    match self {
      Self::Pending => "Pending Review",
      Self::UnderReview => "Under Review",
      Self::Resolved => "Resolved",
      Self::Rejected => "Rejected",
      Self::Cancelled => "Cancelled",
    }
  }

  pub fn color(self) -> &'static str {
    match self {
      Self::Pending => "#FFA726",
      Self::UnderReview => "#2196F3",
      Self::Resolved => "#66BB6A",
      Self::Rejected => "#EF5350",
      Self::Cancelled => "#9E9E9E",
    }
  }

  pub fn can_cancel(self) -> bool {
    matches!(self, Self::Pending | Self::UnderReview)
  }

  pub fn can_add_evidence(self) -> bool {
    self == Self::UnderReview
  }
}

/// Input for opening a dispute.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct NewDispute {
  pub payment_id: String,
  pub user_id: u64,
  pub reason: String,
  pub category: DisputeCategory,
  pub description: String,
  pub evidence: Option<Value>,
  pub requested_amount: Option<f64>,
}

/// Input for a refund request.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct NewRefund {
  pub payment_id: String,
  pub user_id: u64,
  pub amount: Option<f64>,
  pub reason: String,
  pub full_refund: bool,
}

#[derive(Debug, Clone, Default)]
pub struct DisputeFilter {
  pub status: Option<DisputeStatus>,
  pub limit: Option<u32>,
  pub offset: Option<u32>,
}

/// Format a dollar amount as `$1,234.50`.
pub fn format_amount(amount: f64) -> String {
  let cents = (amount.abs() * 100.0).round() as u64;
  let dollars = (cents / 100).to_string();
  let mut grouped = String::with_capacity(dollars.len() + dollars.len() / 3);
  for (i, ch) in dollars.chars().enumerate() {
    if i > 0 && (dollars.len() - i) % 3 == 0 {
      grouped.push(',');
    }
    grouped.push(ch);
  }
  let sign = if amount < 0.0 && cents > 0 { "-" } else { "" };
  format!("{}${}.{:02}", sign, grouped, cents % 100)
}

/// Client for the dispute and refund endpoints of the payment service.
pub struct DisputeService<T: Transport> {
  client: ApiClient<T>,
}

impl<T: Transport> DisputeService<T> {
  pub fn new(client: ApiClient<T>) -> Self {
    Self { client }
  }

  pub fn client(&self) -> &ApiClient<T> {
    &self.client
  }

  pub async fn get_dispute_reasons(&self) -> ApiResult<Value> {
    self.client.request(&REASONS, &Params::new(), None).await
  }

  /// Opens a dispute; the backend wraps the record as `{dispute: ...}`.
  pub async fn create_dispute(&self, dispute: &NewDispute) -> ApiResult<Value> {
    let mut missing = Vec::new();
    if dispute.payment_id.trim().is_empty() {
      missing.push("payment_id");
    }
    if dispute.reason.trim().is_empty() {
      missing.push("reason");
    }
    if dispute.description.trim().is_empty() {
      missing.push("description");
    }
    if !missing.is_empty() {
      return Err(ApiError::validation(format!(
        "Missing required fields: {}",
        missing.join(", ")
      )));
    }

    let result = self
      .client
      .request_with::<Value, _>(&CREATE, &Params::new(), dispute)
      .await?;
    Ok(result.map(|mut envelope| envelope.get_mut("dispute").map(Value::take).unwrap_or(envelope)))
  }

  pub async fn get_disputes(&self, user_id: u64, filter: &DisputeFilter) -> ApiResult<Value> {
    let params = Params::new()
      .query("user_id", user_id)
      .query("limit", filter.limit.unwrap_or(50))
      .query("offset", filter.offset.unwrap_or(0))
      .query_opt("status", filter.status.map(status_param));
    self.client.request(&LIST, &params, None).await
  }

  pub async fn get_dispute(&self, dispute_id: u64) -> ApiResult<Value> {
    let params = Params::new().path("dispute_id", dispute_id);
    self.client.request(&GET, &params, None).await
  }

  pub async fn add_dispute_evidence(&self, dispute_id: u64, evidence: &Value) -> ApiResult<Value> {
    let params = Params::new().path("dispute_id", dispute_id);
    self.client.request(&ADD_EVIDENCE, &params, Some(evidence)).await
  }

  pub async fn cancel_dispute(&self, dispute_id: u64, reason: &str) -> ApiResult<Value> {
    if reason.trim().is_empty() {
      return Err(ApiError::validation("Cancellation reason is required"));
    }
    let params = Params::new().path("dispute_id", dispute_id);
    let body = json!({ "reason": reason });
    self.client.request(&CANCEL, &params, Some(&body)).await
  }

  pub async fn request_refund(&self, refund: &NewRefund) -> ApiResult<Value> {
    if refund.payment_id.trim().is_empty() {
      return Err(ApiError::validation("Payment ID is required"));
    }
    if !refund.full_refund && !refund.amount.is_some_and(|a| a.is_finite() && a > 0.0) {
      return Err(ApiError::validation(
        "Refund amount must be greater than 0 for partial refunds",
      ));
    }
    self
      .client
      .request_with(&REQUEST_REFUND, &Params::new(), refund)
      .await
  }

  pub async fn get_refund(&self, refund_id: u64) -> ApiResult<Value> {
    let params = Params::new().path("refund_id", refund_id);
    self.client.request(&GET_REFUND, &params, None).await
  }

  pub async fn get_refunds(&self, user_id: u64) -> ApiResult<Value> {
    let params = Params::new().query("user_id", user_id);
    self.client.request(&LIST_REFUNDS, &params, None).await
  }
}

fn status_param(status: DisputeStatus) -> String {
  serde_json::to_value(status)
    .ok()
    .and_then(|v| v.as_str().map(String::from))
    .unwrap_or_default()
}
