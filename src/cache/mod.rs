//! Response caching for the API clients.
//!
//! This module provides a transport-agnostic cache that:
//! - Stores decoded JSON bodies keyed by resource, path and query
//! - Expires entries lazily once they reach the owning client's TTL
//! - Supports substring and prefix eviction after mutating calls

mod layer;
mod traits;

pub use layer::{CacheEntry, ResponseCache};
pub use traits::{CacheSource, Fetched};
