//! Social post and account verification.

use std::fmt;
use std::str::FromStr;
use std::time::Duration;

use serde::{Deserialize, Serialize};
use serde_json::{json, Value};
use url::Url;

use crate::api::{ApiClient, ApiError, ApiResult, Endpoint, Params, Transport};

/// Verification results change slowly; the service client is built with this TTL.
pub const SOCIAL_CACHE_TTL: Duration = Duration::from_secs(10 * 60);

const VERIFY_POST: Endpoint = Endpoint::post("verifications", "/verify-post")
  .lookup()
  .cached();
const VERIFY_BULK: Endpoint = Endpoint::post("verifications", "/verify-posts/bulk").lookup();
const POST_ANALYTICS: Endpoint = Endpoint::post("analytics", "/post-analytics").lookup();
const VERIFY_ACCOUNT: Endpoint = Endpoint::post("accounts", "/verify-account");
const ACCOUNT_METRICS: Endpoint = Endpoint::post("metrics", "/account-metrics").lookup();
const HISTORY: Endpoint = Endpoint::get("verifications", "/users/{user_id}/verifications").cached();
const GET_VERIFICATION: Endpoint =
  Endpoint::get("verifications", "/verifications/{verification_id}").cached();

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Platform {
  Instagram,
  TikTok,
  Twitter,
  YouTube,
  Facebook,
}

impl Platform {
  pub const ALL: [Platform; 5] = [
    Self::Instagram,
    Self::TikTok,
    Self::Twitter,
    Self::YouTube,
    Self::Facebook,
  ];

  pub fn as_str(self) -> &'static str {
    match self {
      Self::Instagram => "instagram",
      Self::TikTok => "tiktok",
      Self::Twitter => "twitter",
      Self::YouTube => "youtube",
      Self::Facebook => "facebook",
    }
  }

  pub fn color(self) -> &'static str {
    match self {
      Self::Instagram => "#E4405F",
      Self::TikTok => "#000000",
      Self::Twitter => "#1DA1F2",
      Self::YouTube => "#FF0000",
      Self::Facebook => "#1877F2",
    }
  }

  fn from_host(host: &str) -> Option<Self> {
    let host = host.to_ascii_lowercase();
    let on = |domain: &str| host == domain || host.ends_with(&format!(".{}", domain));
    if on("instagram.com") {
      Some(Self::Instagram)
    } else if on("tiktok.com") {
      Some(Self::TikTok)
    } else if on("twitter.com") || on("x.com") {
      Some(Self::Twitter)
    } else if on("youtube.com") || on("youtu.be") {
      Some(Self::YouTube)
    } else if on("facebook.com") || on("fb.com") {
      Some(Self::Facebook)
    } else {
      None
    }
  }
}

impl fmt::Display for Platform {
  fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
    f.write_str(self.as_str())
  }
}

impl FromStr for Platform {
  type Err = ApiError;

  fn from_str(s: &str) -> Result<Self, Self::Err> {
    let wanted = s.trim().to_ascii_lowercase();
    Self::ALL
      .into_iter()
      .find(|p| p.as_str() == wanted || (wanted == "x" && *p == Self::Twitter))
      .ok_or_else(|| ApiError::validation(format!("Platform {} is not supported", s)))
  }
}

/// Platform of a post URL, judged by its host.
pub fn detect_platform(url: &str) -> Option<Platform> {
  let parsed = Url::parse(url).ok()?;
  Platform::from_host(parsed.host_str()?)
}

/// Outcome of [`validate_social_url`].
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct UrlCheck {
  pub platform: Option<Platform>,
  pub errors: Vec<String>,
}

impl UrlCheck {
  pub fn is_valid(&self) -> bool {
    self.errors.is_empty()
  }

  fn into_result(self) -> Result<Platform, ApiError> {
    match self.platform {
      Some(platform) if self.errors.is_empty() => Ok(platform),
      _ => Err(ApiError::validation(self.errors.join(", "))),
    }
  }
}

pub fn validate_social_url(url: &str) -> UrlCheck {
  let invalid = |message: &str| UrlCheck {
    platform: None,
    errors: vec![message.to_string()],
  };

  if url.trim().is_empty() {
    return invalid("Invalid URL");
  }
  if Url::parse(url).is_err() {
    return invalid("Invalid URL format");
  }
  let Some(platform) = detect_platform(url) else {
    return invalid("URL is not from a supported platform");
  };

  let mut errors = Vec::new();
  match platform {
    Platform::Instagram if !url.contains("/p/") && !url.contains("/reel/") => {
      errors.push("Invalid Instagram post URL format".to_string());
    }
    Platform::TikTok if !url.contains("/video/") && !url.contains("/@") => {
      errors.push("Invalid TikTok video URL format".to_string());
    }
    Platform::Twitter if !url.contains("/status/") => {
      errors.push("Invalid Twitter post URL format".to_string());
    }
    _ => {}
  }

  UrlCheck {
    platform: Some(platform),
    errors,
  }
}

/// Post identifier embedded in the URL, where the platform has one.
pub fn extract_post_id(url: &str) -> Option<String> {
  let platform = detect_platform(url)?;
  let parsed = Url::parse(url).ok()?;
  let segments: Vec<&str> = parsed.path_segments()?.collect();
  let after = |markers: &[&str]| {
    segments
      .windows(2)
      .find(|pair| markers.iter().any(|m| *m == pair[0]) && !pair[1].is_empty())
      .map(|pair| pair[1].to_string())
  };
  let numeric = |id: String| id.chars().all(|c| c.is_ascii_digit()).then_some(id);

  match platform {
    Platform::Instagram => after(&["p", "reel"]),
    Platform::TikTok => after(&["video"]).and_then(numeric),
    Platform::Twitter => after(&["status"]).and_then(numeric),
    _ => None,
  }
}

fn prefixed(items: &[String], prefix: char) -> Vec<String> {
  items
    .iter()
    .map(|item| {
      if item.starts_with(prefix) {
        item.clone()
      } else {
        format!("{}{}", prefix, item)
      }
    })
    .collect()
}

pub fn format_hashtags(tags: &[String]) -> Vec<String> {
  prefixed(tags, '#')
}

pub fn format_mentions(mentions: &[String]) -> Vec<String> {
  prefixed(mentions, '@')
}

/// `1.2K`, `45.3M`, or the plain count under a thousand.
pub fn format_follower_count(count: u64) -> String {
  match count {
    0..=999 => count.to_string(),
    1_000..=999_999 => format!("{:.1}K", count as f64 / 1_000.0),
    _ => format!("{:.1}M", count as f64 / 1_000_000.0),
  }
}

/// Engagement rate given as a fraction, rendered as a percentage.
pub fn format_engagement_rate(rate: f64) -> String {
  format!("{:.2}%", rate * 100.0)
}

pub fn verification_status_label(status: &str) -> &str {
  match status {
    "verified" => "Verified",
    "pending" => "Pending...",
    "failed" => "Failed",
    "partial" => "Partially Verified",
    other => other,
  }
}

pub fn verification_status_color(status: &str) -> &'static str {
  match status {
    "verified" => "#4CAF50",
    "pending" => "#FF9800",
    "failed" => "#F44336",
    "partial" => "#FFC107",
    _ => "#757575",
  }
}

/// What a post must contain to satisfy a deal.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct PostRequirements {
  pub required_hashtags: Vec<String>,
  pub required_mentions: Vec<String>,
  pub deal_accepted_at: Option<String>,
  pub min_engagement: Option<f64>,
}

impl PostRequirements {
  fn body(&self, post_url: &str) -> Value {
    json!({
      "post_url": post_url,
      "required_hashtags": self.required_hashtags,
      "required_mentions": self.required_mentions,
      "deal_accepted_at": self.deal_accepted_at,
      "min_engagement": self.min_engagement,
    })
  }
}

#[derive(Debug, Clone, Default)]
pub struct HistoryFilter {
  pub platform: Option<Platform>,
  pub status: Option<String>,
  pub limit: Option<u32>,
  pub offset: Option<u32>,
}

/// Client for the social verification service.
pub struct SocialService<T: Transport> {
  client: ApiClient<T>,
}

impl<T: Transport> SocialService<T> {
  pub fn new(client: ApiClient<T>) -> Self {
    Self { client }
  }

  pub fn client(&self) -> &ApiClient<T> {
    &self.client
  }

  /// Checks a post against deal requirements.
  ///
  /// Identical URL and requirements are answered from cache for the client's TTL.
  pub async fn verify_post(
    &self,
    post_url: &str,
    requirements: &PostRequirements,
  ) -> ApiResult<Value> {
    validate_social_url(post_url).into_result()?;
    let body = requirements.body(post_url);
    self.client.request(&VERIFY_POST, &Params::new(), Some(&body)).await
  }

  pub async fn verify_multiple_posts(
    &self,
    posts: &[(String, PostRequirements)],
  ) -> ApiResult<Value> {
    if posts.is_empty() {
      return Err(ApiError::validation("At least one post is required"));
    }
    let posts: Vec<Value> = posts
      .iter()
      .map(|(url, requirements)| {
        let mut body = requirements.body(url);
        if let Some(fields) = body.as_object_mut() {
          fields.remove("min_engagement");
        }
        body
      })
      .collect();
    let body = json!({ "posts": posts });
    self.client.request(&VERIFY_BULK, &Params::new(), Some(&body)).await
  }

  pub async fn get_post_analytics(&self, post_url: &str) -> ApiResult<Value> {
    validate_social_url(post_url).into_result()?;
    let body = json!({ "post_url": post_url });
    self.client.request(&POST_ANALYTICS, &Params::new(), Some(&body)).await
  }

  pub async fn verify_account_ownership(
    &self,
    platform: &str,
    username: &str,
  ) -> ApiResult<Value> {
    let body = account_body(platform, username)?;
    self.client.request(&VERIFY_ACCOUNT, &Params::new(), Some(&body)).await
  }

  pub async fn get_account_metrics(&self, platform: &str, username: &str) -> ApiResult<Value> {
    let body = account_body(platform, username)?;
    self.client.request(&ACCOUNT_METRICS, &Params::new(), Some(&body)).await
  }

  pub async fn get_verification_history(
    &self,
    user_id: u64,
    filter: &HistoryFilter,
  ) -> ApiResult<Value> {
    let params = Params::new()
      .path("user_id", user_id)
      .query_opt("platform", filter.platform)
      .query_opt("status", filter.status.as_deref())
      .query_opt("limit", filter.limit)
      .query_opt("offset", filter.offset);
    self.client.request(&HISTORY, &params, None).await
  }

  pub async fn get_verification(&self, verification_id: u64) -> ApiResult<Value> {
    let params = Params::new().path("verification_id", verification_id);
    self.client.request(&GET_VERIFICATION, &params, None).await
  }
}

fn account_body(platform: &str, username: &str) -> Result<Value, ApiError> {
  let platform: Platform = platform.parse()?;
  if username.trim().is_empty() {
    return Err(ApiError::validation("Username is required"));
  }
  Ok(json!({ "platform": platform, "username": username.trim() }))
}

#[cfg(test)]
mod tests {
  use super::*;
  use crate::api::credentials::static_token;
  use crate::api::mock::MockTransport;
  use std::sync::Arc;

  const POST: &str = "https://www.instagram.com/p/Cx12ab/";

  fn service(transport: &Arc<MockTransport>) -> SocialService<MockTransport> {
    let client = ApiClient::builder("http://social.test", Arc::clone(transport))
      .cache_ttl(SOCIAL_CACHE_TTL)
      .credentials(static_token("tok"))
      .build()
      .unwrap();
    SocialService::new(client)
  }

  fn requirements() -> PostRequirements {
    PostRequirements {
      required_hashtags: vec!["#ad".into()],
      ..Default::default()
    }
  }

  #[test]
  fn test_detect_platform() {
    assert_eq!(detect_platform(POST), Some(Platform::Instagram));
    assert_eq!(
      detect_platform("https://x.com/nilbx/status/17"),
      Some(Platform::Twitter)
    );
    assert_eq!(detect_platform("https://youtu.be/abc"), Some(Platform::YouTube));
    assert_eq!(detect_platform("https://m.fb.com/post"), Some(Platform::Facebook));
    assert_eq!(detect_platform("https://example.com/p/1"), None);
    assert_eq!(detect_platform("not a url"), None);
  }

  #[test]
  fn test_validate_social_url() {
    assert!(validate_social_url(POST).is_valid());
    assert!(validate_social_url("https://www.tiktok.com/@nilbx").is_valid());

    let check = validate_social_url("https://www.instagram.com/nilbx");
    assert_eq!(check.platform, Some(Platform::Instagram));
    assert_eq!(check.errors, vec!["Invalid Instagram post URL format"]);

    let check = validate_social_url("https://twitter.com/nilbx");
    assert_eq!(check.errors, vec!["Invalid Twitter post URL format"]);

    assert_eq!(validate_social_url("").errors, vec!["Invalid URL"]);
    assert_eq!(validate_social_url("instagram").errors, vec!["Invalid URL format"]);
    assert_eq!(
      validate_social_url("https://example.com/").errors,
      vec!["URL is not from a supported platform"]
    );
  }

  #[test]
  fn test_extract_post_id() {
    assert_eq!(extract_post_id(POST).as_deref(), Some("Cx12ab"));
    assert_eq!(
      extract_post_id("https://www.tiktok.com/@nilbx/video/7301").as_deref(),
      Some("7301")
    );
    assert_eq!(extract_post_id("https://twitter.com/a/status/abc"), None);
    assert_eq!(extract_post_id("https://youtu.be/abc"), None);
  }

  #[test]
  fn test_formatting_helpers() {
    assert_eq!(format_follower_count(999), "999");
    assert_eq!(format_follower_count(1_240), "1.2K");
    assert_eq!(format_follower_count(45_300_000), "45.3M");
    assert_eq!(format_engagement_rate(0.0345), "3.45%");
    assert_eq!(format_hashtags(&["ad".into(), "#nil".into()]), vec!["#ad", "#nil"]);
    assert_eq!(format_mentions(&["nilbx".into()]), vec!["@nilbx"]);
    assert_eq!(verification_status_label("partial"), "Partially Verified");
    assert_eq!(verification_status_label("unknown"), "unknown");
    assert_eq!(verification_status_color("unknown"), "#757575");
    assert_eq!(Platform::Twitter.color(), "#1DA1F2");
  }

  #[tokio::test]
  async fn test_verify_post_is_cached_per_requirements() {
    let transport = MockTransport::new();
    transport
      .json(200, json!({"status": "verified"}))
      .json(200, json!({"status": "partial"}));
    let service = service(&transport);

    let first = service.verify_post(POST, &requirements()).await.unwrap();
    let again = service.verify_post(POST, &requirements()).await.unwrap();
    assert!(!first.from_cache_hit());
    assert!(again.from_cache_hit());
    assert_eq!(again.data, json!({"status": "verified"}));

    let body = transport.last_body();
    assert_eq!(body["post_url"], POST);
    assert_eq!(body["required_hashtags"], json!(["#ad"]));
    assert_eq!(body["min_engagement"], Value::Null);

    let other = PostRequirements {
      min_engagement: Some(0.02),
      ..requirements()
    };
    let third = service.verify_post(POST, &other).await.unwrap();
    assert_eq!(third.data, json!({"status": "partial"}));
    assert_eq!(transport.calls(), 2);
  }

  #[tokio::test]
  async fn test_verify_post_rejects_bad_url_without_sending() {
    let transport = MockTransport::new();
    let service = service(&transport);

    let err = service
      .verify_post("https://twitter.com/nilbx", &requirements())
      .await
      .unwrap_err();
    assert_eq!(err.to_string(), "validation: Invalid Twitter post URL format");
    assert_eq!(transport.calls(), 0);
  }

  #[tokio::test]
  async fn test_bulk_verification_body() {
    let transport = MockTransport::new();
    transport.json(200, json!({"results": []}));
    let service = service(&transport);

    let posts = vec![(POST.to_string(), requirements())];
    service.verify_multiple_posts(&posts).await.unwrap();
    let body = transport.last_body();
    assert_eq!(body["posts"][0]["post_url"], POST);
    assert!(body["posts"][0].get("min_engagement").is_none());

    let err = service.verify_multiple_posts(&[]).await.unwrap_err();
    assert!(err.to_string().starts_with("validation:"));
  }

  #[tokio::test]
  async fn test_account_platform_must_be_supported() {
    let transport = MockTransport::new();
    transport.json(200, json!({"verified": true}));
    let service = service(&transport);

    let err = service
      .verify_account_ownership("myspace", "tom")
      .await
      .unwrap_err();
    assert_eq!(err.to_string(), "validation: Platform myspace is not supported");
    assert_eq!(transport.calls(), 0);

    service.verify_account_ownership("Instagram", " nilbx ").await.unwrap();
    let body = transport.last_body();
    assert_eq!(body, json!({"platform": "instagram", "username": "nilbx"}));
  }

  #[tokio::test]
  async fn test_verification_history_query() {
    let transport = MockTransport::new();
    transport.json(200, json!({"verifications": []}));
    let service = service(&transport);

    let filter = HistoryFilter {
      platform: Some(Platform::TikTok),
      limit: Some(10),
      ..Default::default()
    };
    service.get_verification_history(4, &filter).await.unwrap();
    assert_eq!(
      transport.last_request().url.as_str(),
      "http://social.test/users/4/verifications?limit=10&platform=tiktok"
    );
  }
}
