//! In-memory TTL cache for JSON responses.

use std::collections::HashMap;
use std::time::Duration;

use chrono::{DateTime, Utc};
use serde_json::Value;

/// A cached response body and when it was stored.
#[derive(Debug, Clone, PartialEq)]
pub struct CacheEntry {
  pub value: Value,
  pub stored_at: DateTime<Utc>,
}

/// Response cache owned by a single client.
///
/// Entries are never served once their age reaches the TTL. Stale entries
/// are swept lazily when looked up; there is no background timer.
#[derive(Debug)]
pub struct ResponseCache {
  entries: HashMap<String, CacheEntry>,
  ttl: Duration,
}

impl ResponseCache {
  pub fn new(ttl: Duration) -> Self {
    Self {
      entries: HashMap::new(),
      ttl,
    }
  }

  pub fn ttl(&self) -> Duration {
    self.ttl
  }

  pub fn len(&self) -> usize {
    self.entries.len()
  }

  pub fn is_empty(&self) -> bool {
    self.entries.is_empty()
  }

  /// Check if an entry stored at `stored_at` may still be served at `now`.
  ///
  /// An entry stamped in the future (clock moved backwards) counts as stale.
  pub fn is_fresh_at(&self, stored_at: DateTime<Utc>, now: DateTime<Utc>) -> bool {
    match (now - stored_at).to_std() {
      Ok(age) => age < self.ttl,
      Err(_) => false,
    }
  }

  pub fn is_fresh(&self, key: &str, now: DateTime<Utc>) -> bool {
    self
      .entries
      .get(key)
      .is_some_and(|entry| self.is_fresh_at(entry.stored_at, now))
  }

  /// Look up a fresh value, dropping the entry if it has expired.
  pub fn get(&mut self, key: &str, now: DateTime<Utc>) -> Option<Value> {
    let stored_at = self.entries.get(key)?.stored_at;
    if self.is_fresh_at(stored_at, now) {
      self.entries.get(key).map(|entry| entry.value.clone())
    } else {
      self.entries.remove(key);
      None
    }
  }

  pub fn insert(&mut self, key: String, value: Value, now: DateTime<Utc>) {
    self.entries.insert(
      key,
      CacheEntry {
        value,
        stored_at: now,
      },
    );
  }

  /// Drop everything, or only keys containing `pattern`. Returns how many went.
  pub fn invalidate(&mut self, pattern: Option<&str>) -> usize {
    let before = self.entries.len();
    match pattern {
      Some(pattern) => self.entries.retain(|key, _| !key.contains(pattern)),
      None => self.entries.clear(),
    }
    before - self.entries.len()
  }

  /// Drop keys starting with `prefix`.
  pub fn invalidate_prefix(&mut self, prefix: &str) -> usize {
    let before = self.entries.len();
    self.entries.retain(|key, _| !key.starts_with(prefix));
    before - self.entries.len()
  }
}
