//! Scripted transport for unit tests.

use std::collections::VecDeque;
use std::sync::{Arc, Mutex};

use serde_json::Value;

use super::transport::{
  HttpRequest, HttpResponse, MultipartForm, RequestBody, Transport, TransportError,
};

enum Reply {
  Respond(HttpResponse),
  Fail(String),
}

/// Replays queued replies in order and records every request it sees.
#[derive(Default)]
pub struct MockTransport {
  replies: Mutex<VecDeque<Reply>>,
  requests: Mutex<Vec<HttpRequest>>,
}

impl MockTransport {
  pub fn new() -> Arc<Self> {
    Arc::new(Self::default())
  }

  pub fn json(&self, status: u16, body: Value) -> &Self {
    self.push(Reply::Respond(HttpResponse {
      status,
      body: serde_json::to_vec(&body).unwrap(),
    }))
  }

  pub fn text(&self, status: u16, body: &str) -> &Self {
    self.push(Reply::Respond(HttpResponse {
      status,
      body: body.as_bytes().to_vec(),
    }))
  }

  pub fn fail(&self, message: &str) -> &Self {
    self.push(Reply::Fail(message.to_string()))
  }

  pub fn calls(&self) -> usize {
    self.requests.lock().unwrap().len()
  }

  pub fn requests(&self) -> Vec<HttpRequest> {
    self.requests.lock().unwrap().clone()
  }

  pub fn last_request(&self) -> HttpRequest {
    self.requests.lock().unwrap().last().cloned().unwrap()
  }

  /// JSON body of the most recent request.
  pub fn last_body(&self) -> Value {
    let request = self.last_request();
    let bytes = request.body.as_ref().and_then(RequestBody::as_json);
    serde_json::from_slice(bytes.unwrap_or(&b"null"[..])).unwrap()
  }

  /// Multipart body of the most recent request.
  pub fn last_form(&self) -> MultipartForm {
    let request = self.last_request();
    request.body.as_ref().and_then(RequestBody::as_multipart).cloned().unwrap()
  }

  fn push(&self, reply: Reply) -> &Self {
    self.replies.lock().unwrap().push_back(reply);
    self
  }
}

impl Transport for MockTransport {
  async fn send(&self, request: HttpRequest) -> Result<HttpResponse, TransportError> {
    self.requests.lock().unwrap().push(request);
    let reply = self.replies.lock().unwrap().pop_front();
    match reply {
      Some(Reply::Respond(response)) => Ok(response),
      Some(Reply::Fail(message)) => Err(TransportError::new(message)),
      None => Err(TransportError::new("no mock reply queued")),
    }
  }
}
