//! Result wrapper describing where response data came from.

/// Successful outcome of a client call.
#[derive(Debug, Clone, PartialEq)]
pub struct Fetched<T> {
  /// The decoded response
  pub data: T,
  /// Where the data came from
  pub source: CacheSource,
}

impl<T> Fetched<T> {
  /// Wrap data that was just received from the backend.
  pub fn from_network(data: T) -> Self {
    Self {
      data,
      source: CacheSource::Network,
    }
  }

  /// Wrap data served from a fresh cache entry.
  pub fn from_cache(data: T) -> Self {
    Self {
      data,
      source: CacheSource::Cache,
    }
  }

  pub fn from_cache_hit(&self) -> bool {
    self.source == CacheSource::Cache
  }

  /// Transform the payload, keeping the source.
  pub fn map<U>(self, f: impl FnOnce(T) -> U) -> Fetched<U> {
    Fetched {
      data: f(self.data),
      source: self.source,
    }
  }

  pub fn into_data(self) -> T {
    self.data
  }
}

/// Indicates where response data came from.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum CacheSource {
  /// Fresh data from network
  Network,
  /// Data from cache, younger than the TTL
  Cache,
}
