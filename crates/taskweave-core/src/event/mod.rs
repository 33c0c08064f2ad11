//! Domain events: the immutable, per-aggregate versioned facts that every
//! mutation is recorded as.

pub mod data;
pub mod types;

use serde::Serialize;

pub use data::EventData;
pub use types::{AggregateType, EventType, UnknownEventType};

/// A persisted domain event.
///
/// `version` is unique and gap-free per `(aggregate_type, aggregate_id)`,
/// starting at 1. `timestamp` is assigned at append time.
#[derive(Debug, Clone, PartialEq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct DomainEvent {
    pub id: String,
    pub aggregate_type: AggregateType,
    pub aggregate_id: String,
    pub event_type: EventType,
    pub payload: EventData,
    pub timestamp: String,
    pub version: i64,
}

impl DomainEvent {
    /// Decode a stored event row.
    ///
    /// # Errors
    ///
    /// Returns [`crate::Error::UnknownEventType`] for a type outside the
    /// catalog and [`crate::Error::Payload`] for a payload that does not match
    /// its type's schema.
    pub fn from_stored(
        id: String,
        aggregate_id: String,
        event_type: &str,
        payload_json: &str,
        timestamp: String,
        version: i64,
    ) -> crate::Result<Self> {
        let event_type: EventType = event_type.parse()?;
        let payload = EventData::deserialize_for(event_type, payload_json)?;
        Ok(Self {
            id,
            aggregate_type: event_type.aggregate_type(),
            aggregate_id,
            event_type,
            payload,
            timestamp,
            version,
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::Error;

    #[test]
    fn from_stored_rejects_unknown_type() {
        let err = DomainEvent::from_stored(
            "e1".into(),
            "t1".into(),
            "TASK_ARCHIVED",
            "{}",
            "2024-01-01T00:00:00.000Z".into(),
            1,
        )
        .expect_err("unknown type");
        assert!(matches!(err, Error::UnknownEventType(ref e) if e.raw == "TASK_ARCHIVED"));
    }

    #[test]
    fn from_stored_derives_aggregate_type() {
        let event = DomainEvent::from_stored(
            "e1".into(),
            "p1".into(),
            "PROJECT_DELETED",
            r#"{"id":"p1"}"#,
            "2024-01-01T00:00:00.000Z".into(),
            3,
        )
        .expect("decode");
        assert_eq!(event.aggregate_type, AggregateType::Project);
        assert_eq!(event.version, 3);
    }
}
