//! HTTP transport seam and its reqwest implementation.

use std::future::Future;
use std::time::Duration;

use reqwest::multipart::{Form, Part};
use reqwest::Client as ReqwestClient;
use thiserror::Error;
use tracing::debug;
use url::Url;

use super::descriptor::HttpMethod;

/// A fully built outgoing request.
#[derive(Debug, Clone)]
pub struct HttpRequest {
  pub method: HttpMethod,
  pub url: Url,
  pub headers: Vec<(&'static str, String)>,
  pub body: Option<RequestBody>,
}

#[derive(Debug, Clone, PartialEq)]
pub enum RequestBody {
  /// Serialized JSON document.
  Json(Vec<u8>),
  Multipart(MultipartForm),
}

impl RequestBody {
  pub fn as_json(&self) -> Option<&[u8]> {
    match self {
      Self::Json(bytes) => Some(bytes),
      Self::Multipart(_) => None,
    }
  }

  pub fn as_multipart(&self) -> Option<&MultipartForm> {
    match self {
      Self::Json(_) => None,
      Self::Multipart(form) => Some(form),
    }
  }
}

/// A `multipart/form-data` body: text fields plus file parts, in order.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct MultipartForm {
  pub fields: Vec<(String, String)>,
  pub files: Vec<FilePart>,
}

#[derive(Debug, Clone, PartialEq)]
pub struct FilePart {
  pub field: String,
  pub file_name: String,
  pub mime_type: String,
  pub bytes: Vec<u8>,
}

impl MultipartForm {
  pub fn new() -> Self {
    Self::default()
  }

  pub fn text(mut self, name: &str, value: impl ToString) -> Self {
    self.fields.push((name.to_string(), value.to_string()));
    self
  }

  pub fn text_opt<V: ToString>(self, name: &str, value: Option<V>) -> Self {
    match value {
      Some(v) => self.text(name, v),
      None => self,
    }
  }

  pub fn file(mut self, part: FilePart) -> Self {
    self.files.push(part);
    self
  }

  /// First text field called `name`.
  pub fn field(&self, name: &str) -> Option<&str> {
    self
      .fields
      .iter()
      .find(|(n, _)| n == name)
      .map(|(_, v)| v.as_str())
  }

  fn into_form(self) -> Result<Form, TransportError> {
    let mut form = Form::new();
    for (name, value) in self.fields {
      form = form.text(name, value);
    }
    for file in self.files {
      let FilePart {
        field,
        file_name,
        mime_type,
        bytes,
      } = file;
      let part = Part::bytes(bytes)
        .file_name(file_name)
        .mime_str(&mime_type)
        .map_err(|err| TransportError::new(format!("Invalid MIME type '{}': {}", mime_type, err)))?;
      form = form.part(field, part);
    }
    Ok(form)
  }
}

impl HttpRequest {
  /// Case-insensitive header lookup.
  pub fn header(&self, name: &str) -> Option<&str> {
    self
      .headers
      .iter()
      .find(|(n, _)| n.eq_ignore_ascii_case(name))
      .map(|(_, v)| v.as_str())
  }
}

/// Status and raw body of a completed exchange.
#[derive(Debug, Clone)]
pub struct HttpResponse {
  pub status: u16,
  pub body: Vec<u8>,
}

impl HttpResponse {
  pub fn is_success(&self) -> bool {
    (200..300).contains(&self.status)
  }
}

/// The exchange did not complete.
#[derive(Debug, Clone, Error)]
#[error("{message}")]
pub struct TransportError {
  message: String,
}

impl TransportError {
  pub fn new(message: impl Into<String>) -> Self {
    Self {
      message: message.into(),
    }
  }
}

/// Sends requests over the network.
///
/// Implementations report only failures to complete the exchange; any
/// status code, including 4xx/5xx, is a successful send.
pub trait Transport: Send + Sync + 'static {
  fn send(
    &self,
    request: HttpRequest,
  ) -> impl Future<Output = Result<HttpResponse, TransportError>> + Send;
}

/// reqwest-backed transport shared by every service client.
#[derive(Clone)]
pub struct ReqwestTransport {
  client: ReqwestClient,
}

impl ReqwestTransport {
  pub fn builder() -> ReqwestTransportBuilder {
    ReqwestTransportBuilder::default()
  }

  pub fn new() -> Result<Self, TransportError> {
    Self::builder().build()
  }
}

impl Transport for ReqwestTransport {
  async fn send(&self, request: HttpRequest) -> Result<HttpResponse, TransportError> {
    let HttpRequest {
      method,
      url,
      headers,
      body,
    } = request;

    let mut builder = self.client.request(method.into(), url.clone());
    for (name, value) in headers {
      builder = builder.header(name, value);
    }
    builder = match body {
      Some(RequestBody::Json(bytes)) => builder.body(bytes),
      Some(RequestBody::Multipart(form)) => builder.multipart(form.into_form()?),
      None => builder,
    };

    let response = builder.send().await.map_err(|err| {
      debug!(%method, %url, error = %err, "HTTP request failed");
      TransportError::new(describe(&err))
    })?;

    let status = response.status().as_u16();
    let body = response
      .bytes()
      .await
      .map_err(|err| TransportError::new(format!("Failed to read response body: {}", err)))?;

    Ok(HttpResponse {
      status,
      body: body.to_vec(),
    })
  }
}

fn describe(err: &reqwest::Error) -> String {
  if err.is_timeout() {
    format!("Request timed out: {}", err)
  } else if err.is_connect() {
    format!("Connection failed: {}", err)
  } else {
    err.to_string()
  }
}

/// Builder for [`ReqwestTransport`].
#[derive(Debug)]
pub struct ReqwestTransportBuilder {
  timeout: Duration,
  user_agent: Option<String>,
}

impl Default for ReqwestTransportBuilder {
  fn default() -> Self {
    Self {
      timeout: Duration::from_secs(30),
      user_agent: None,
    }
  }
}

impl ReqwestTransportBuilder {
  pub fn timeout(mut self, timeout: Duration) -> Self {
    self.timeout = timeout;
    self
  }

  pub fn user_agent(mut self, agent: impl Into<String>) -> Self {
    self.user_agent = Some(agent.into());
    self
  }

  pub fn build(self) -> Result<ReqwestTransport, TransportError> {
    let mut builder = ReqwestClient::builder().timeout(self.timeout);

    if let Some(agent) = self.user_agent {
      builder = builder.user_agent(agent);
    }

    let client = builder
      .build()
      .map_err(|err| TransportError::new(format!("Failed to create HTTP client: {}", err)))?;

    Ok(ReqwestTransport { client })
  }
}
