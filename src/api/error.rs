//! Error taxonomy for the API-access layer.

use std::fmt;

use thiserror::Error;

/// The three ways a request can fail.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum ErrorKind {
  /// Caller-side problem detected before any network call.
  Validation,
  /// The network call itself failed (DNS, connect, timeout, abort).
  Transport,
  /// The server answered with a non-2xx status or an unparseable body.
  Http,
}

impl ErrorKind {
  pub fn as_str(self) -> &'static str {
    match self {
      Self::Validation => "validation",
      Self::Transport => "transport",
      Self::Http => "http",
    }
  }
}

impl fmt::Display for ErrorKind {
  fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
    f.write_str(self.as_str())
  }
}

/// Failure returned from every client and service call.
///
/// The `Display` output always starts with the kind so callers can
/// discriminate on the message alone.
#[derive(Debug, Clone, PartialEq, Error)]
pub enum ApiError {
  #[error("validation: {0}")]
  Validation(String),

  #[error("transport: {0}")]
  Transport(String),

  #[error("http {status}: {message}")]
  Status { status: u16, message: String },

  #[error("http: {0}")]
  Decode(String),
}

impl ApiError {
  pub fn validation(message: impl Into<String>) -> Self {
    Self::Validation(message.into())
  }

  pub fn transport(message: impl Into<String>) -> Self {
    Self::Transport(message.into())
  }

  pub fn decode(message: impl Into<String>) -> Self {
    Self::Decode(message.into())
  }

  pub fn kind(&self) -> ErrorKind {
    match self {
      Self::Validation(_) => ErrorKind::Validation,
      Self::Transport(_) => ErrorKind::Transport,
      Self::Status { .. } | Self::Decode(_) => ErrorKind::Http,
    }
  }

  /// HTTP status, when the server answered.
  pub fn status(&self) -> Option<u16> {
    match self {
      Self::Status { status, .. } => Some(*status),
      _ => None,
    }
  }

  /// The message without the kind prefix.
  pub fn message(&self) -> &str {
    match self {
      Self::Validation(m) | Self::Transport(m) | Self::Decode(m) => m,
      Self::Status { message, .. } => message,
    }
  }
}
