//! Payment service: tiers, payout calculation, payouts, compliance, accounts.

use serde::{Deserialize, Serialize};
use serde_json::{json, Value};

use crate::api::{ApiClient, ApiError, ApiResult, Endpoint, Params, Transport};

/// Smallest audience the tier programme accepts.
pub const MIN_FOLLOWERS: u64 = 500;

/// Share of the deal amount retained by the platform.
pub const PLATFORM_FEE_RATE: f64 = 0.20;
const STRIPE_FEE_RATE: f64 = 0.029;
const STRIPE_FEE_FIXED: f64 = 0.30;

const ALL_TIERS: Endpoint = Endpoint::get("tiers", "/tiers").cached();
const TIER_INFO: Endpoint = Endpoint::get("tiers", "/tiers/{tier_name}").cached();
const TIER_BY_FOLLOWERS: Endpoint = Endpoint::get("tiers", "/tiers/by-followers").cached();
const CALCULATE_PAYOUT: Endpoint = Endpoint::get("calculations", "/payouts/calculate").cached();
const CALCULATE_BY_TIER: Endpoint =
  Endpoint::get("calculations", "/payouts/calculate-by-tier").cached();
const PROCESS_PAYOUT: Endpoint = Endpoint::post("payouts", "/payouts").invalidates(&["earnings"]);
const PAYOUT_HISTORY: Endpoint =
  Endpoint::get("payouts", "/payouts/history/{influencer_id}").cached();
const CHECK_COMPLIANCE: Endpoint = Endpoint::post("compliance", "/compliance/check");
const VALIDATE_COMPLIANCE: Endpoint = Endpoint::post("compliance", "/compliance/validate-payout");
const SETUP_ACCOUNT: Endpoint = Endpoint::post("accounts", "/accounts");
const GET_ACCOUNT: Endpoint = Endpoint::get("accounts", "/accounts/{influencer_id}").cached();
const EARNINGS: Endpoint = Endpoint::get("earnings", "/earnings/{influencer_id}").cached();

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Tier {
  pub tier_name: String,
  pub multiplier: f64,
  pub min_followers: u64,
  #[serde(default)]
  pub max_followers: Option<u64>,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct TierList {
  pub tiers: Vec<Tier>,
  #[serde(default)]
  pub tier_count: usize,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct TierByFollowers {
  pub current_tier: String,
  pub multiplier: f64,
  #[serde(default)]
  pub follower_count: Option<u64>,
  #[serde(default)]
  pub followers_to_next_tier: Option<u64>,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct PayoutCalculation {
  pub deal_amount: f64,
  pub tier_name: String,
  #[serde(default, alias = "multiplier")]
  pub payout_multiplier: Option<f64>,
  #[serde(default)]
  pub calculated_payout: Option<f64>,
  #[serde(default)]
  pub service_fee: Option<f64>,
  pub net_payout: f64,
  #[serde(default)]
  pub breakdown: Option<Value>,
}

/// Fields the payout endpoint insists on.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct PayoutRequest {
  pub influencer_id: Option<u64>,
  pub payment_id: Option<String>,
  pub deal_id: Option<u64>,
  pub tier_name: Option<String>,
  pub base_amount: Option<f64>,
}

impl PayoutRequest {
  fn missing_fields(&self) -> Vec<&'static str> {
    let mut missing = Vec::new();
    if self.influencer_id.is_none() {
      missing.push("influencer_id");
    }
    if self.payment_id.as_deref().map_or(true, |s| s.trim().is_empty()) {
      missing.push("payment_id");
    }
    if self.deal_id.is_none() {
      missing.push("deal_id");
    }
    if self.tier_name.as_deref().map_or(true, |s| s.trim().is_empty()) {
      missing.push("tier_name");
    }
    if self.base_amount.is_none() {
      missing.push("base_amount");
    }
    missing
  }
}

/// Client-side payout figures used when the backend is unreachable.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct PayoutEstimate {
  pub payout: f64,
  pub platform_fee: f64,
}

/// Estimate an athlete payout locally.
///
/// The platform keeps 20% of the deal, the remainder is scaled by the tier
/// multiplier, and card processing (2.9% + $0.30) comes off the top. Both
/// figures are rounded to cents; the payout never goes negative.
pub fn estimate_payout(amount: f64, tier_multiplier: f64) -> PayoutEstimate {
  if !amount.is_finite() || amount <= 0.0 {
    return PayoutEstimate {
      payout: 0.0,
      platform_fee: 0.0,
    };
  }

  let platform_fee = amount * PLATFORM_FEE_RATE;
  let base_payout = (amount - platform_fee) * tier_multiplier;
  let stripe_fee = base_payout * STRIPE_FEE_RATE + STRIPE_FEE_FIXED;
  let payout = (base_payout - stripe_fee).max(0.0);

  PayoutEstimate {
    payout: round_cents(payout),
    platform_fee: round_cents(platform_fee),
  }
}

fn round_cents(value: f64) -> f64 {
  (value * 100.0).round() / 100.0
}

/// Client for the payment service.
pub struct PaymentService<T: Transport> {
  client: ApiClient<T>,
}

impl<T: Transport> PaymentService<T> {
  pub fn new(client: ApiClient<T>) -> Self {
    Self { client }
  }

  pub fn client(&self) -> &ApiClient<T> {
    &self.client
  }

  pub async fn get_all_tiers(&self) -> ApiResult<TierList> {
    self.client.request(&ALL_TIERS, &Params::new(), None).await
  }

  pub async fn get_tier_info(&self, tier_name: &str) -> ApiResult<Value> {
    let params = Params::new().path("tier_name", tier_name);
    self.client.request(&TIER_INFO, &params, None).await
  }

  pub async fn get_tier_by_followers(&self, follower_count: u64) -> ApiResult<TierByFollowers> {
    if follower_count < MIN_FOLLOWERS {
      return Err(ApiError::validation(format!(
        "Minimum {} followers required",
        MIN_FOLLOWERS
      )));
    }
    let params = Params::new().query("follower_count", follower_count);
    self.client.request(&TIER_BY_FOLLOWERS, &params, None).await
  }

  pub async fn calculate_payout(
    &self,
    deal_amount: f64,
    follower_count: u64,
  ) -> ApiResult<PayoutCalculation> {
    validate_amount(deal_amount)?;
    let params = Params::new()
      .query("deal_amount", deal_amount)
      .query("follower_count", follower_count);
    self.client.request(&CALCULATE_PAYOUT, &params, None).await
  }

  /// Calculation for an explicit tier; the response wraps it as `{success, calculation}`.
  pub async fn calculate_payout_by_tier(
    &self,
    deal_amount: f64,
    tier_name: &str,
  ) -> ApiResult<PayoutCalculation> {
    validate_amount(deal_amount)?;
    let params = Params::new()
      .query("deal_amount", deal_amount)
      .query("tier_name", tier_name);

    #[derive(Deserialize)]
    struct Envelope {
      calculation: PayoutCalculation,
    }

    let result = self
      .client
      .request::<Envelope>(&CALCULATE_BY_TIER, &params, None)
      .await?;
    Ok(result.map(|envelope| envelope.calculation))
  }

  pub async fn process_payout(&self, request: &PayoutRequest) -> ApiResult<Value> {
    let missing = request.missing_fields();
    if !missing.is_empty() {
      return Err(ApiError::validation(format!(
        "Missing required fields: {}",
        missing.join(", ")
      )));
    }
    self
      .client
      .request_with(&PROCESS_PAYOUT, &Params::new(), request)
      .await
  }

  pub async fn get_payout_history(
    &self,
    influencer_id: u64,
    limit: u32,
    offset: u32,
  ) -> ApiResult<Value> {
    let params = Params::new()
      .path("influencer_id", influencer_id)
      .query("limit", limit)
      .query("offset", offset);
    self.client.request(&PAYOUT_HISTORY, &params, None).await
  }

  pub async fn check_compliance(
    &self,
    influencer_id: u64,
    influencer_type: &str,
  ) -> ApiResult<Value> {
    let body = json!({
      "influencer_id": influencer_id,
      "influencer_type": influencer_type,
    });
    self
      .client
      .request(&CHECK_COMPLIANCE, &Params::new(), Some(&body))
      .await
  }

  pub async fn validate_payout_compliance(
    &self,
    influencer_id: u64,
    influencer_type: &str,
    new_payout: f64,
  ) -> ApiResult<Value> {
    validate_amount(new_payout)?;
    let body = json!({
      "influencer_id": influencer_id,
      "influencer_type": influencer_type,
      "new_payout": new_payout,
    });
    self
      .client
      .request(&VALIDATE_COMPLIANCE, &Params::new(), Some(&body))
      .await
  }

  pub async fn setup_payment_account(
    &self,
    influencer_id: u64,
    stripe_account_id: &str,
    payment_method: &str,
  ) -> ApiResult<Value> {
    if stripe_account_id.trim().is_empty() {
      return Err(ApiError::validation("Stripe account ID is required"));
    }
    let body = json!({
      "influencer_id": influencer_id,
      "stripe_account_id": stripe_account_id,
      "payment_method": payment_method,
    });
    self
      .client
      .request(&SETUP_ACCOUNT, &Params::new(), Some(&body))
      .await
  }

  pub async fn get_payment_account(&self, influencer_id: u64) -> ApiResult<Value> {
    let params = Params::new().path("influencer_id", influencer_id);
    self.client.request(&GET_ACCOUNT, &params, None).await
  }

  pub async fn get_earnings_summary(&self, influencer_id: u64) -> ApiResult<Value> {
    let params = Params::new().path("influencer_id", influencer_id);
    self.client.request(&EARNINGS, &params, None).await
  }
}

fn validate_amount(amount: f64) -> Result<(), ApiError> {
  if amount.is_finite() && amount > 0.0 {
    Ok(())
  } else {
    Err(ApiError::validation("Deal amount must be greater than 0"))
  }
}
