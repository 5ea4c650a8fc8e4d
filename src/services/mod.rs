//! Typed clients for the NILBx backend services.
//!
//! Each service owns one [`ApiClient`](crate::api::ApiClient), so caches and
//! TTLs are independent per backend.

pub mod deliverables;
pub mod disputes;
pub mod media;
pub mod notifications;
pub mod payments;
pub mod social;

use serde_json::Value;

pub use deliverables::DeliverableService;
pub use disputes::DisputeService;
pub use media::MediaService;
pub use notifications::NotificationService;
pub use payments::PaymentService;
pub use social::SocialService;

/// Copy the fields of `extra` into `base` when both are objects.
pub(crate) fn merge_fields(mut base: Value, extra: &Value) -> Value {
  if let (Some(target), Some(fields)) = (base.as_object_mut(), extra.as_object()) {
    for (key, value) in fields {
      target.entry(key.clone()).or_insert_with(|| value.clone());
    }
  }
  base
}

#[cfg(test)]
mod tests {
  use super::*;
  use serde_json::json;

  #[test]
  fn test_merge_keeps_base_fields() {
    let merged = merge_fields(
      json!({"reason": "blurry"}),
      &json!({"reason": "ignored", "notes": "reshoot"}),
    );
    assert_eq!(merged, json!({"reason": "blurry", "notes": "reshoot"}));
    assert_eq!(merge_fields(json!({"a": 1}), &Value::Null), json!({"a": 1}));
  }
}
