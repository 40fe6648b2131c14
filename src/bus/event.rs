//! Invalidation event schema.

use serde::{Deserialize, Serialize};
use uuid::Uuid;

/// Kind of mutation being announced.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum EventType {
    /// A key was written; peers drop their local copy and re-read on demand.
    Set,
    /// A key was deleted everywhere.
    Delete,
    /// A whole namespace was cleared.
    Clear,
}

/// A single cache mutation broadcast to peer nodes.
///
/// Transient: consumed once per subscriber, never persisted. `origin_node_id`
/// lets subscribers ignore their own events so a local mutation is never
/// applied twice, and `timestamp_ms` drives last-timestamp-wins resolution of
/// conflicting concurrent events.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct InvalidationEvent {
    pub event_id: Uuid,
    pub namespace: String,
    /// `None` only for [`EventType::Clear`].
    pub key: Option<String>,
    pub event_type: EventType,
    pub origin_node_id: Uuid,
    pub timestamp_ms: i64,
}

impl InvalidationEvent {
    /// Announces a write of `key`.
    pub fn set(namespace: &str, key: &str, origin: Uuid, timestamp_ms: i64) -> Self {
        Self::keyed(EventType::Set, namespace, key, origin, timestamp_ms)
    }

    /// Announces a delete of `key`.
    pub fn delete(namespace: &str, key: &str, origin: Uuid, timestamp_ms: i64) -> Self {
        Self::keyed(EventType::Delete, namespace, key, origin, timestamp_ms)
    }

    /// Announces a namespace-wide clear.
    pub fn clear(namespace: &str, origin: Uuid, timestamp_ms: i64) -> Self {
        Self {
            event_id: Uuid::new_v4(),
            namespace: namespace.to_string(),
            key: None,
            event_type: EventType::Clear,
            origin_node_id: origin,
            timestamp_ms,
        }
    }

    fn keyed(
        event_type: EventType,
        namespace: &str,
        key: &str,
        origin: Uuid,
        timestamp_ms: i64,
    ) -> Self {
        Self {
            event_id: Uuid::new_v4(),
            namespace: namespace.to_string(),
            key: Some(key.to_string()),
            event_type,
            origin_node_id: origin,
            timestamp_ms,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn events_serialize_with_screaming_types() {
        let ev = InvalidationEvent::delete("stock_quote", "stock_quote:AAPL", Uuid::new_v4(), 42);
        let json = serde_json::to_string(&ev).unwrap();
        assert!(json.contains("\"DELETE\""));

        let back: InvalidationEvent = serde_json::from_str(&json).unwrap();
        assert_eq!(back.event_type, EventType::Delete);
        assert_eq!(back.key.as_deref(), Some("stock_quote:AAPL"));
        assert_eq!(back.timestamp_ms, 42);
    }

    #[test]
    fn clear_has_no_key() {
        let ev = InvalidationEvent::clear("stock_quote", Uuid::new_v4(), 1);
        assert_eq!(ev.event_type, EventType::Clear);
        assert!(ev.key.is_none());
    }

    #[test]
    fn event_ids_are_unique() {
        let origin = Uuid::new_v4();
        let a = InvalidationEvent::set("q", "q:k", origin, 1);
        let b = InvalidationEvent::set("q", "q:k", origin, 1);
        assert_ne!(a.event_id, b.event_id);
    }
}
