//! Static endpoint metadata and per-call parameters.

use std::collections::BTreeMap;
use std::fmt;

use url::form_urlencoded;

use super::error::ApiError;

/// HTTP verbs used by the backend services.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum HttpMethod {
  Get,
  Post,
  Put,
  Patch,
  Delete,
}

impl HttpMethod {
  pub fn as_str(self) -> &'static str {
    match self {
      Self::Get => "GET",
      Self::Post => "POST",
      Self::Put => "PUT",
      Self::Patch => "PATCH",
      Self::Delete => "DELETE",
    }
  }

  /// Whether requests with this verb may carry a JSON body.
  pub fn allows_body(self) -> bool {
    !matches!(self, Self::Get)
  }
}

impl fmt::Display for HttpMethod {
  fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
    f.write_str(self.as_str())
  }
}

impl From<HttpMethod> for reqwest::Method {
  fn from(method: HttpMethod) -> Self {
    match method {
      HttpMethod::Get => reqwest::Method::GET,
      HttpMethod::Post => reqwest::Method::POST,
      HttpMethod::Put => reqwest::Method::PUT,
      HttpMethod::Patch => reqwest::Method::PATCH,
      HttpMethod::Delete => reqwest::Method::DELETE,
    }
  }
}

/// Describes one backend operation.
///
/// Descriptors are declared as `const`s next to the service that uses them:
///
/// ```
/// use nilbx_client::api::Endpoint;
///
/// const GET_DELIVERABLE: Endpoint = Endpoint::get("deliverables", "/deliverables/{id}").cached();
/// assert!(GET_DELIVERABLE.is_cacheable_read());
/// ```
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct Endpoint {
  pub method: HttpMethod,
  /// Path template; a whole segment written as `{name}` is a placeholder.
  pub path: &'static str,
  /// Resource domain, used as the cache key prefix.
  pub resource: &'static str,
  pub cacheable: bool,
  /// Attach the bearer credential when one is available.
  pub auth: bool,
  /// A body-carrying verb used for a read-only query.
  pub lookup: bool,
  /// Additional resource domains evicted after a successful mutation.
  pub invalidates: &'static [&'static str],
}

impl Endpoint {
  pub const fn new(method: HttpMethod, resource: &'static str, path: &'static str) -> Self {
    Self {
      method,
      path,
      resource,
      cacheable: false,
      auth: true,
      lookup: false,
      invalidates: &[],
    }
  }

  pub const fn get(resource: &'static str, path: &'static str) -> Self {
    Self::new(HttpMethod::Get, resource, path)
  }

  pub const fn post(resource: &'static str, path: &'static str) -> Self {
    Self::new(HttpMethod::Post, resource, path)
  }

  pub const fn put(resource: &'static str, path: &'static str) -> Self {
    Self::new(HttpMethod::Put, resource, path)
  }

  pub const fn patch(resource: &'static str, path: &'static str) -> Self {
    Self::new(HttpMethod::Patch, resource, path)
  }

  pub const fn delete(resource: &'static str, path: &'static str) -> Self {
    Self::new(HttpMethod::Delete, resource, path)
  }

  /// Mark responses as eligible for the read-through cache.
  pub const fn cached(self) -> Self {
    Self {
      cacheable: true,
      ..self
    }
  }

  /// Never attach the credential (health probes, public catalogues).
  pub const fn public(self) -> Self {
    Self {
      auth: false,
      ..self
    }
  }

  /// Treat a POST as a query: it never evicts, and may be cached.
  pub const fn lookup(self) -> Self {
    Self {
      lookup: true,
      ..self
    }
  }

  pub const fn invalidates(self, resources: &'static [&'static str]) -> Self {
    Self {
      invalidates: resources,
      ..self
    }
  }

  pub fn is_read(&self) -> bool {
    self.method == HttpMethod::Get || self.lookup
  }

  pub fn is_cacheable_read(&self) -> bool {
    self.cacheable && self.is_read()
  }

  pub fn is_mutation(&self) -> bool {
    !self.is_read()
  }

  /// Placeholder names in template order.
  pub fn placeholders(&self) -> impl Iterator<Item = &'static str> {
    self.path.split('/').filter_map(placeholder)
  }

  /// Substitute path parameters into the template.
  ///
  /// Every placeholder must be supplied, and nothing else may be.
  pub fn render_path(&self, params: &Params) -> Result<String, ApiError> {
    if let Some(unexpected) = params
      .path
      .keys()
      .find(|name| !self.placeholders().any(|p| p == name.as_str()))
    {
      return Err(ApiError::validation(format!(
        "Unexpected path parameter '{}' for {}",
        unexpected, self.path
      )));
    }

    let mut rendered = String::with_capacity(self.path.len());
    for (i, segment) in self.path.split('/').enumerate() {
      if i > 0 {
        rendered.push('/');
      }
      match placeholder(segment) {
        Some(name) => {
          let value = params.path.get(name).ok_or_else(|| {
            ApiError::validation(format!("Missing required parameter '{}'", name))
          })?;
          if value.trim().is_empty() {
            return Err(ApiError::validation(format!(
              "Parameter '{}' must not be empty",
              name
            )));
          }
          if matches!(value.trim(), "." | "..") {
            return Err(ApiError::validation(format!(
              "Parameter '{}' must not be a relative path segment",
              name
            )));
          }
          if value.contains(['/', '\\', '?', '#', '%']) {
            return Err(ApiError::validation(format!(
              "Parameter '{}' contains reserved characters: {}",
              name, value
            )));
          }
          rendered.push_str(value);
        }
        None => rendered.push_str(segment),
      }
    }

    Ok(rendered)
  }
}

fn placeholder(segment: &str) -> Option<&str> {
  segment.strip_prefix('{')?.strip_suffix('}')
}

/// Path and query parameters for a single call.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct Params {
  path: BTreeMap<String, String>,
  query: BTreeMap<String, String>,
}

impl Params {
  pub fn new() -> Self {
    Self::default()
  }

  pub fn path(mut self, name: &str, value: impl ToString) -> Self {
    self.path.insert(name.to_string(), value.to_string());
    self
  }

  pub fn query(mut self, name: &str, value: impl ToString) -> Self {
    self.query.insert(name.to_string(), value.to_string());
    self
  }

  /// Add a query parameter only when a value is present.
  pub fn query_opt<V: ToString>(self, name: &str, value: Option<V>) -> Self {
    match value {
      Some(v) => self.query(name, v),
      None => self,
    }
  }

  pub fn query_pairs(&self) -> impl Iterator<Item = (&str, &str)> {
    self.query.iter().map(|(k, v)| (k.as_str(), v.as_str()))
  }

  pub fn has_query(&self) -> bool {
    !self.query.is_empty()
  }

  /// Form-encoded query sorted by key, so `&` and `=` inside values stay
  /// distinguishable from separators.
  pub fn canonical_query(&self) -> String {
    form_urlencoded::Serializer::new(String::new())
      .extend_pairs(self.query_pairs())
      .finish()
  }
}

#[cfg(test)]
mod tests {
  use super::*;

  const DEAL_DELIVERABLES: Endpoint =
    Endpoint::get("deliverables", "/deals/{deal_id}/deliverables");

  #[test]
  fn test_render_substitutes_placeholders() {
    let params = Params::new().path("deal_id", 7);
    assert_eq!(
      DEAL_DELIVERABLES.render_path(&params).unwrap(),
      "/deals/7/deliverables"
    );
  }

  #[test]
  fn test_missing_parameter_is_validation_error() {
    let err = DEAL_DELIVERABLES.render_path(&Params::new()).unwrap_err();
    assert_eq!(err, ApiError::validation("Missing required parameter 'deal_id'"));
  }

  #[test]
  fn test_unexpected_parameter_is_rejected() {
    let params = Params::new().path("deal_id", 7).path("deliverable_id", 1);
    let err = DEAL_DELIVERABLES.render_path(&params).unwrap_err();
    assert!(err.to_string().contains("Unexpected path parameter 'deliverable_id'"));
  }

  #[test]
  fn test_malformed_values_are_rejected() {
    for value in ["", "  ", "7/../admin", "7?x=1", ".", "..", " .. ", "7%2F8", "7\\admin"] {
      let params = Params::new().path("deal_id", value);
      let err = DEAL_DELIVERABLES.render_path(&params).unwrap_err();
      assert!(err.to_string().starts_with("validation:"), "{}", value);
    }
  }

  #[test]
  fn test_canonical_query_is_sorted() {
    let params = Params::new()
      .query("type", "video")
      .query("status", "pending")
      .query_opt::<&str>("missing", None);
    assert_eq!(params.canonical_query(), "status=pending&type=video");
  }

  #[test]
  fn test_canonical_query_escapes_separators() {
    let joined = Params::new().query("related_type", "deal&status=x");
    let split = Params::new().query("related_type", "deal").query("status", "x");
    assert_eq!(joined.canonical_query(), "related_type=deal%26status%3Dx");
    assert_ne!(joined.canonical_query(), split.canonical_query());
  }

  #[test]
  fn test_builder_flags() {
    const HEALTH: Endpoint = Endpoint::get("health", "/health").cached().public();
    assert!(HEALTH.is_cacheable_read());
    assert!(!HEALTH.auth);

    const APPROVE: Endpoint = Endpoint::post("deliverables", "/deliverables/{id}/approve")
      .cached()
      .invalidates(&["deals"]);
    assert!(!APPROVE.is_cacheable_read());
    assert!(APPROVE.is_mutation());
    assert_eq!(APPROVE.placeholders().collect::<Vec<_>>(), vec!["id"]);

    const VERIFY: Endpoint = Endpoint::post("verifications", "/verify-post").lookup().cached();
    assert!(VERIFY.is_cacheable_read());
    assert!(!VERIFY.is_mutation());
  }
}
