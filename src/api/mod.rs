//! HTTP access layer shared by every backend service.
//!
//! A service is an [`ApiClient`] configured with a base URL, a cache TTL and
//! a credential accessor, plus a set of [`Endpoint`] constants describing its
//! operations.

mod client;
pub mod credentials;
mod descriptor;
mod error;
mod transport;

#[cfg(test)]
pub(crate) mod mock;

pub use client::{ApiClient, ApiClientBuilder, ApiResult, DEFAULT_CACHE_TTL};
pub use credentials::{Credential, CredentialProvider};
pub use descriptor::{Endpoint, HttpMethod, Params};
pub use error::{ApiError, ErrorKind};
pub use transport::{
  FilePart, HttpRequest, HttpResponse, MultipartForm, RequestBody, ReqwestTransport,
  ReqwestTransportBuilder, Transport, TransportError,
};
