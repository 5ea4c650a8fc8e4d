//! Generic per-domain API client.

use std::sync::{Arc, Mutex, MutexGuard, PoisonError};
use std::time::Duration;

use chrono::Utc;
use serde::de::DeserializeOwned;
use serde::Serialize;
use serde_json::Value;
use sha2::{Digest, Sha256};
use tracing::{debug, warn};
use url::Url;

use crate::cache::{Fetched, ResponseCache};

use super::credentials::{self, CredentialProvider};
use super::descriptor::{Endpoint, Params};
use super::error::ApiError;
use super::transport::{HttpRequest, HttpResponse, MultipartForm, RequestBody, Transport};

/// Outcome of every client and service call.
pub type ApiResult<T> = Result<Fetched<T>, ApiError>;

/// Default time-to-live for cached responses.
pub const DEFAULT_CACHE_TTL: Duration = Duration::from_secs(5 * 60);

/// Longest raw-text error body quoted in an error message.
const MAX_ERROR_TEXT: usize = 200;

/// Client for one backend domain.
///
/// Builds authenticated JSON requests against a base URL, keeps a private
/// TTL cache for cacheable reads, and reports every failure as an
/// [`ApiError`]. Clones are handles to the same client and share its cache.
pub struct ApiClient<T: Transport> {
  base_url: String,
  transport: Arc<T>,
  credentials: CredentialProvider,
  cache: Arc<Mutex<ResponseCache>>,
}

impl<T: Transport> Clone for ApiClient<T> {
  fn clone(&self) -> Self {
    Self {
      base_url: self.base_url.clone(),
      transport: Arc::clone(&self.transport),
      credentials: Arc::clone(&self.credentials),
      cache: Arc::clone(&self.cache),
    }
  }
}

impl<T: Transport> ApiClient<T> {
  pub fn builder(base_url: impl Into<String>, transport: Arc<T>) -> ApiClientBuilder<T> {
    ApiClientBuilder {
      base_url: base_url.into(),
      transport,
      cache_ttl: DEFAULT_CACHE_TTL,
      credentials: None,
    }
  }

  pub fn base_url(&self) -> &str {
    &self.base_url
  }

  pub fn cache_ttl(&self) -> Duration {
    self.lock_cache().ttl()
  }

  /// Number of entries currently held, fresh or not.
  pub fn cache_len(&self) -> usize {
    self.lock_cache().len()
  }

  /// Perform one operation and decode the JSON response into `R`.
  pub async fn request<R: DeserializeOwned>(
    &self,
    endpoint: &Endpoint,
    params: &Params,
    body: Option<&Value>,
  ) -> ApiResult<R> {
    self
      .execute(endpoint, params, body)
      .await
      .inspect_err(|err| {
        warn!(method = %endpoint.method, path = endpoint.path, error = %err, "request failed");
      })
  }

  /// Like [`request`](Self::request) but with a typed body.
  pub async fn request_with<R: DeserializeOwned, B: Serialize + ?Sized>(
    &self,
    endpoint: &Endpoint,
    params: &Params,
    body: &B,
  ) -> ApiResult<R> {
    let body = to_body(body)?;
    self.request(endpoint, params, Some(&body)).await
  }

  /// Send a `multipart/form-data` body. Uploads are never cached; a
  /// successful one evicts like any other mutation.
  pub async fn upload<R: DeserializeOwned>(
    &self,
    endpoint: &Endpoint,
    params: &Params,
    form: MultipartForm,
  ) -> ApiResult<R> {
    self
      .execute_upload(endpoint, params, form)
      .await
      .inspect_err(|err| {
        warn!(method = %endpoint.method, path = endpoint.path, error = %err, "upload failed");
      })
  }

  /// Drop every cached entry, or only those whose key contains `pattern`.
  pub fn invalidate(&self, pattern: Option<&str>) {
    let removed = self.lock_cache().invalidate(pattern);
    debug!(base_url = %self.base_url, pattern, removed, "cache invalidated");
  }

  /// Whether `key` holds an entry younger than the TTL.
  pub fn is_cache_fresh(&self, key: &str) -> bool {
    self.lock_cache().is_fresh(key, Utc::now())
  }

  /// Cache key for a read, as used by [`is_cache_fresh`](Self::is_cache_fresh).
  pub fn cache_key(
    endpoint: &Endpoint,
    params: &Params,
    body: Option<&Value>,
  ) -> Result<String, ApiError> {
    let path = endpoint.render_path(params)?;
    Ok(compose_key(endpoint, &path, params, body))
  }

  async fn execute<R: DeserializeOwned>(
    &self,
    endpoint: &Endpoint,
    params: &Params,
    body: Option<&Value>,
  ) -> ApiResult<R> {
    let path = endpoint.render_path(params)?;
    if body.is_some() && !endpoint.method.allows_body() {
      return Err(ApiError::validation(format!(
        "{} {} does not accept a request body",
        endpoint.method, endpoint.path
      )));
    }
    let url = self.resolve(&path, params)?;

    let cache_key = endpoint
      .is_cacheable_read()
      .then(|| compose_key(endpoint, &path, params, body));

    if let Some(key) = &cache_key {
      let hit = self.lock_cache().get(key, Utc::now());
      if let Some(value) = hit {
        match serde_json::from_value::<R>(value) {
          Ok(data) => {
            debug!(key = %key, "cache hit");
            return Ok(Fetched::from_cache(data));
          }
          Err(err) => {
            // Same key decoded as a different type; refetch and overwrite.
            debug!(key = %key, error = %err, "cached value did not decode");
          }
        }
      }
    }

    let payload = body
      .map(serde_json::to_vec)
      .transpose()
      .map_err(|err| ApiError::validation(format!("Failed to encode request body: {}", err)))?
      .map(RequestBody::Json);
    let value = self.send(endpoint, url, payload).await?;

    if endpoint.is_mutation() {
      self.evict_after(endpoint);
    }

    let data = match cache_key {
      Some(key) => {
        let data = decode::<R>(value.clone(), &path)?;
        self.lock_cache().insert(key, value, Utc::now());
        data
      }
      None => decode::<R>(value, &path)?,
    };

    Ok(Fetched::from_network(data))
  }

  async fn execute_upload<R: DeserializeOwned>(
    &self,
    endpoint: &Endpoint,
    params: &Params,
    form: MultipartForm,
  ) -> ApiResult<R> {
    let path = endpoint.render_path(params)?;
    if !endpoint.method.allows_body() {
      return Err(ApiError::validation(format!(
        "{} {} does not accept a request body",
        endpoint.method, endpoint.path
      )));
    }
    let url = self.resolve(&path, params)?;

    let value = self
      .send(endpoint, url, Some(RequestBody::Multipart(form)))
      .await?;
    if endpoint.is_mutation() {
      self.evict_after(endpoint);
    }
    Ok(Fetched::from_network(decode(value, &path)?))
  }

  async fn send(
    &self,
    endpoint: &Endpoint,
    url: Url,
    body: Option<RequestBody>,
  ) -> Result<Value, ApiError> {
    // reqwest sets the multipart content type, boundary included.
    let mut headers = Vec::new();
    if !matches!(body, Some(RequestBody::Multipart(_))) {
      headers.push(("Content-Type", "application/json".to_string()));
    }
    let mut fingerprint = None;
    if endpoint.auth {
      match (self.credentials)() {
        Some(credential) => {
          fingerprint = Some(credential.fingerprint());
          headers.push(("Authorization", credential.bearer()));
        }
        None => debug!(path = endpoint.path, "no credential available, sending unauthenticated"),
      }
    }

    debug!(method = %endpoint.method, %url, credential = fingerprint.as_deref(), "sending request");

    let response = self
      .transport
      .send(HttpRequest {
        method: endpoint.method,
        url,
        headers,
        body,
      })
      .await
      .map_err(|err| ApiError::transport(err.to_string()))?;

    debug!(
      method = %endpoint.method,
      path = endpoint.path,
      status = response.status,
      "received response"
    );

    if !response.is_success() {
      return Err(status_error(&response));
    }

    parse_body(&response.body)
  }

  fn resolve(&self, path: &str, params: &Params) -> Result<Url, ApiError> {
    let mut url = Url::parse(&format!("{}{}", self.base_url, path))
      .map_err(|err| ApiError::validation(format!("Invalid request URL for {}: {}", path, err)))?;
    if params.has_query() {
      url.query_pairs_mut().extend_pairs(params.query_pairs());
    }
    Ok(url)
  }

  fn evict_after(&self, endpoint: &Endpoint) {
    let mut cache = self.lock_cache();
    let removed: usize = std::iter::once(endpoint.resource)
      .chain(endpoint.invalidates.iter().copied())
      .map(|resource| cache.invalidate_prefix(&format!("{}:", resource)))
      .sum();
    debug!(resource = endpoint.resource, removed, "evicted after mutation");
  }

  fn lock_cache(&self) -> MutexGuard<'_, ResponseCache> {
    // The cache holds plain data; a panic elsewhere cannot leave it half-updated.
    self.cache.lock().unwrap_or_else(PoisonError::into_inner)
  }
}

/// Builder for [`ApiClient`].
pub struct ApiClientBuilder<T: Transport> {
  base_url: String,
  transport: Arc<T>,
  cache_ttl: Duration,
  credentials: Option<CredentialProvider>,
}

impl<T: Transport> ApiClientBuilder<T> {
  pub fn cache_ttl(mut self, ttl: Duration) -> Self {
    self.cache_ttl = ttl;
    self
  }

  pub fn credentials(mut self, provider: CredentialProvider) -> Self {
    self.credentials = Some(provider);
    self
  }

  pub fn build(self) -> Result<ApiClient<T>, ApiError> {
    let base_url = self.base_url.trim().trim_end_matches('/').to_string();
    let parsed = Url::parse(&base_url)
      .map_err(|err| ApiError::validation(format!("Invalid base URL '{}': {}", base_url, err)))?;
    if !matches!(parsed.scheme(), "http" | "https") {
      return Err(ApiError::validation(format!(
        "Unsupported base URL scheme '{}'",
        parsed.scheme()
      )));
    }

    Ok(ApiClient {
      base_url,
      transport: self.transport,
      credentials: self.credentials.unwrap_or_else(credentials::anonymous),
      cache: Arc::new(Mutex::new(ResponseCache::new(self.cache_ttl))),
    })
  }
}

/// Serialize a typed request body.
fn to_body<B: Serialize + ?Sized>(body: &B) -> Result<Value, ApiError> {
  serde_json::to_value(body)
    .map_err(|err| ApiError::validation(format!("Failed to encode request body: {}", err)))
}

/// `<resource>:<path>[?<query>][#<body digest>]`
fn compose_key(endpoint: &Endpoint, path: &str, params: &Params, body: Option<&Value>) -> String {
  let mut key = format!("{}:{}", endpoint.resource, path);
  if params.has_query() {
    key.push('?');
    key.push_str(&params.canonical_query());
  }
  if let Some(body) = body {
    // serde_json maps keep keys sorted, so equal bodies serialize identically.
    let digest = Sha256::digest(body.to_string().as_bytes());
    key.push('#');
    key.push_str(&hex::encode(&digest[..8]));
  }
  key
}

fn decode<R: DeserializeOwned>(value: Value, path: &str) -> Result<R, ApiError> {
  serde_json::from_value(value)
    .map_err(|err| ApiError::decode(format!("Unexpected response shape from {}: {}", path, err)))
}

fn parse_body(body: &[u8]) -> Result<Value, ApiError> {
  if body.iter().all(u8::is_ascii_whitespace) {
    return Ok(Value::Null);
  }
  serde_json::from_slice(body)
    .map_err(|err| ApiError::decode(format!("Failed to parse response body as JSON: {}", err)))
}

fn status_error(response: &HttpResponse) -> ApiError {
  let from_json = serde_json::from_slice::<Value>(&response.body)
    .ok()
    .and_then(|value| error_detail(&value));

  let message = from_json
    .or_else(|| {
      let text = String::from_utf8_lossy(&response.body);
      let text = text.trim();
      (!text.is_empty()).then(|| text.chars().take(MAX_ERROR_TEXT).collect())
    })
    .unwrap_or_else(|| {
      reqwest::StatusCode::from_u16(response.status)
        .ok()
        .and_then(|status| status.canonical_reason())
        .unwrap_or("Request failed")
        .to_string()
    });

  ApiError::Status {
    status: response.status,
    message,
  }
}

fn error_detail(value: &Value) -> Option<String> {
  ["detail", "error", "message"]
    .iter()
    .find_map(|key| match value.get(key)? {
      Value::Null => None,
      Value::String(text) => Some(text.clone()),
      other => Some(other.to_string()),
    })
}
