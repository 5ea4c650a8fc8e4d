//! Bearer credentials and the accessor the client reads them through.

use std::fmt;
use std::sync::Arc;

use sha2::{Digest, Sha256};

/// An opaque bearer token.
#[derive(Clone, PartialEq, Eq)]
pub struct Credential(String);

impl Credential {
  /// Wrap a raw token. Blank input yields `None`.
  pub fn parse(raw: &str) -> Option<Self> {
    let token = raw.trim();
    if token.is_empty() {
      None
    } else {
      Some(Self(token.to_string()))
    }
  }

  pub fn token(&self) -> &str {
    &self.0
  }

  /// Value for the `Authorization` header.
  pub fn bearer(&self) -> String {
    format!("Bearer {}", self.0)
  }

  /// Short SHA-256 prefix, safe to log.
  pub fn fingerprint(&self) -> String {
    let digest = Sha256::digest(self.0.as_bytes());
    hex::encode(&digest[..6])
  }
}

impl fmt::Debug for Credential {
  fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
    f.debug_tuple("Credential").field(&self.fingerprint()).finish()
  }
}

/// Zero-argument accessor consulted on every request.
pub type CredentialProvider = Arc<dyn Fn() -> Option<Credential> + Send + Sync>;

/// Provider that never yields a credential.
pub fn anonymous() -> CredentialProvider {
  Arc::new(|| None)
}

/// Provider that always yields the same token.
pub fn static_token(token: &str) -> CredentialProvider {
  let credential = Credential::parse(token);
  Arc::new(move || credential.clone())
}
