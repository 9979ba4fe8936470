//! # Event Envelope
//!
//! Platform-wide event envelope for all inter-service communication.
//!
//! ## Design Principles
//!
//! 1. **Single Source of Truth**: one envelope struct for the entire platform
//! 2. **Versioning**: `eventVersion` bumps on breaking payload changes
//! 3. **Ordering**: `(producer, partitionKey, sequence)` gives per-partition
//!    monotonic ordering for consumer-side deduplication
//! 4. **Tracing**: `correlationId`/`causationId` link derived events
//!
//! Decoding accepts both enveloped and pre-envelope ("legacy") frames so that
//! producers can be upgraded incrementally; a blob without an `eventName`
//! field is parsed as the typed legacy payload for that event.

use chrono::{DateTime, Utc};
use serde::de::DeserializeOwned;
use serde::{Deserialize, Serialize};
use uuid::Uuid;

/// Standard event envelope wrapping every enveloped event on the bus.
///
/// # Type Parameter
///
/// * `T` - The event-specific payload type
///
/// # Examples
///
/// ```rust
/// use event_bus::{EventEnvelope, EventMetadata};
/// use serde::{Deserialize, Serialize};
///
/// #[derive(Debug, Serialize, Deserialize)]
/// struct PaymentSucceeded {
///     order_id: String,
/// }
///
/// let envelope = EventEnvelope::new(
///     "PaymentSucceeded",
///     1,
///     "payment-service",
///     "order-123",
///     1,
///     "contracts/events/payment/PaymentSucceeded.v1.payload.schema.json",
///     PaymentSucceeded { order_id: "order-123".to_string() },
///     EventMetadata::root(),
/// );
/// assert!(envelope.correlation_id.is_some());
/// ```
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
#[serde(rename_all = "camelCase")]
pub struct EventEnvelope<T> {
    /// Logical event type, e.g. `CartCheckedOut`
    pub event_name: String,

    /// Schema version; breaking changes bump it
    pub event_version: i32,

    /// Globally unique identifier of this emission
    pub event_id: Uuid,

    /// Propagated end-to-end across all derived events
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub correlation_id: Option<Uuid>,

    /// The eventId of the event that caused this one
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub causation_id: Option<Uuid>,

    /// Identity of the emitting service
    pub producer: String,

    /// Ordering/deduplication partition (usually the order id)
    pub partition_key: String,

    /// Monotonic within `(producer, partitionKey)`, assigned at publish time
    pub sequence: i64,

    /// Business event time
    pub occurred_at: DateTime<Utc>,

    /// Advisory path/identifier of the payload schema
    pub schema: String,

    /// Event-specific payload
    pub payload: T,
}

/// Correlation/causation context carried from a consumed event into the
/// events it produces.
#[derive(Debug, Clone, Copy, Default)]
pub struct EventMetadata {
    pub correlation_id: Option<Uuid>,
    pub causation_id: Option<Uuid>,
}

impl EventMetadata {
    /// Metadata for an event with no upstream trigger. The publisher mints a
    /// fresh correlation id.
    pub fn root() -> Self {
        Self::default()
    }

    /// Metadata for an event caused by `trigger`: the correlation id is
    /// propagated and the causation id is the trigger's event id.
    pub fn caused_by<T>(trigger: &EventEnvelope<T>) -> Self {
        Self {
            correlation_id: trigger.correlation_id,
            causation_id: Some(trigger.event_id),
        }
    }
}

impl<T> EventEnvelope<T> {
    /// Build an envelope for publication.
    ///
    /// `eventId` and `occurredAt` are generated; the correlation id falls
    /// back to a fresh UUID when the metadata carries none, so every emitted
    /// event is traceable.
    #[allow(clippy::too_many_arguments)]
    pub fn new(
        event_name: &str,
        event_version: i32,
        producer: &str,
        partition_key: &str,
        sequence: i64,
        schema: &str,
        payload: T,
        meta: EventMetadata,
    ) -> Self {
        Self {
            event_name: event_name.to_string(),
            event_version,
            event_id: Uuid::new_v4(),
            correlation_id: Some(meta.correlation_id.unwrap_or_else(Uuid::new_v4)),
            causation_id: meta.causation_id,
            producer: producer.to_string(),
            partition_key: partition_key.to_string(),
            sequence,
            occurred_at: Utc::now(),
            schema: schema.to_string(),
            payload,
        }
    }

    /// Ensure the envelope carries the expected event identity.
    pub fn validate(&self, expected_name: &str, expected_version: i32) -> Result<(), EnvelopeError> {
        if self.event_name != expected_name {
            return Err(EnvelopeError::Invalid(format!(
                "unexpected eventName {:?}",
                self.event_name
            )));
        }
        if self.event_version != expected_version {
            return Err(EnvelopeError::Invalid(format!(
                "unexpected eventVersion {}",
                self.event_version
            )));
        }
        if self.partition_key.is_empty() {
            return Err(EnvelopeError::Invalid("missing partitionKey".to_string()));
        }
        if self.sequence < 1 {
            return Err(EnvelopeError::Invalid(format!(
                "non-positive sequence {}",
                self.sequence
            )));
        }
        Ok(())
    }

    /// Serialize to the wire form.
    pub fn encode(&self) -> Result<Vec<u8>, EnvelopeError>
    where
        T: Serialize,
    {
        serde_json::to_vec(self).map_err(|e| EnvelopeError::Invalid(e.to_string()))
    }
}

/// Errors raised while decoding or validating an event frame
#[derive(Debug, thiserror::Error)]
pub enum EnvelopeError {
    #[error("malformed event body: {0}")]
    Malformed(#[source] serde_json::Error),

    #[error("invalid envelope: {0}")]
    Invalid(String),
}

/// Result of decoding an event frame: the enveloped form, or the typed
/// pre-envelope payload when the producer has not been upgraded yet.
#[derive(Debug, Clone, PartialEq)]
pub enum Decoded<T, L> {
    Enveloped(EventEnvelope<T>),
    Legacy(L),
}

/// Decode an event frame, accepting both enveloped and legacy forms.
///
/// A blob "looks enveloped" iff it carries a non-empty `eventName`. Enveloped
/// frames are validated against the expected identity; anything else is
/// parsed as the legacy payload `L`. Either parse failing is
/// [`EnvelopeError::Invalid`].
pub fn decode<T, L>(
    body: &[u8],
    expected_name: &str,
    expected_version: i32,
) -> Result<Decoded<T, L>, EnvelopeError>
where
    T: DeserializeOwned,
    L: DeserializeOwned,
{
    let value: serde_json::Value = serde_json::from_slice(body).map_err(EnvelopeError::Malformed)?;

    let looks_enveloped = value
        .get("eventName")
        .and_then(|v| v.as_str())
        .is_some_and(|name| !name.is_empty());

    if looks_enveloped {
        let envelope: EventEnvelope<T> = serde_json::from_value(value)
            .map_err(|e| EnvelopeError::Invalid(format!("envelope parse: {}", e)))?;
        envelope.validate(expected_name, expected_version)?;
        return Ok(Decoded::Enveloped(envelope));
    }

    let legacy: L = serde_json::from_value(value)
        .map_err(|e| EnvelopeError::Invalid(format!("legacy parse: {}", e)))?;
    Ok(Decoded::Legacy(legacy))
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    #[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
    #[serde(rename_all = "camelCase")]
    struct TestPayload {
        order_id: String,
        amount: i64,
    }

    #[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
    #[serde(rename_all = "camelCase")]
    struct LegacyTestPayload {
        event_type: String,
        order_id: String,
    }

    fn sample_envelope() -> EventEnvelope<TestPayload> {
        EventEnvelope::new(
            "TestHappened",
            1,
            "test-service",
            "order-1",
            7,
            "contracts/events/test/TestHappened.v1.payload.schema.json",
            TestPayload {
                order_id: "order-1".to_string(),
                amount: 42,
            },
            EventMetadata::root(),
        )
    }

    #[test]
    fn round_trips_through_the_wire_form() {
        let envelope = sample_envelope();
        let body = envelope.encode().unwrap();

        let decoded: Decoded<TestPayload, LegacyTestPayload> =
            decode(&body, "TestHappened", 1).unwrap();

        match decoded {
            Decoded::Enveloped(parsed) => assert_eq!(parsed, envelope),
            Decoded::Legacy(_) => panic!("expected enveloped frame"),
        }
    }

    #[test]
    fn wire_fields_are_camel_case() {
        let body = sample_envelope().encode().unwrap();
        let value: serde_json::Value = serde_json::from_slice(&body).unwrap();

        assert!(value.get("eventName").is_some());
        assert!(value.get("eventVersion").is_some());
        assert!(value.get("partitionKey").is_some());
        assert!(value.get("occurredAt").is_some());
        assert!(value.get("correlationId").is_some());
        // causation is absent for root events, not null
        assert!(value.get("causationId").is_none());
    }

    #[test]
    fn falls_back_to_legacy_payload() {
        let body = serde_json::to_vec(&json!({
            "eventType": "TestHappened",
            "orderId": "order-9"
        }))
        .unwrap();

        let decoded: Decoded<TestPayload, LegacyTestPayload> =
            decode(&body, "TestHappened", 1).unwrap();

        match decoded {
            Decoded::Legacy(legacy) => assert_eq!(legacy.order_id, "order-9"),
            Decoded::Enveloped(_) => panic!("expected legacy frame"),
        }
    }

    #[test]
    fn rejects_unexpected_event_name() {
        let body = sample_envelope().encode().unwrap();
        let result: Result<Decoded<TestPayload, LegacyTestPayload>, _> =
            decode(&body, "SomethingElse", 1);
        assert!(matches!(result, Err(EnvelopeError::Invalid(_))));
    }

    #[test]
    fn rejects_unexpected_event_version() {
        let body = sample_envelope().encode().unwrap();
        let result: Result<Decoded<TestPayload, LegacyTestPayload>, _> =
            decode(&body, "TestHappened", 2);
        assert!(matches!(result, Err(EnvelopeError::Invalid(_))));
    }

    #[test]
    fn rejects_empty_partition_key() {
        let mut envelope = sample_envelope();
        envelope.partition_key = String::new();
        let body = envelope.encode().unwrap();

        let result: Result<Decoded<TestPayload, LegacyTestPayload>, _> =
            decode(&body, "TestHappened", 1);
        assert!(matches!(result, Err(EnvelopeError::Invalid(_))));
    }

    #[test]
    fn rejects_missing_event_id() {
        let body = serde_json::to_vec(&json!({
            "eventName": "TestHappened",
            "eventVersion": 1,
            "producer": "test-service",
            "partitionKey": "order-1",
            "sequence": 1,
            "occurredAt": "2024-01-01T00:00:00Z",
            "schema": "s",
            "payload": {"orderId": "order-1", "amount": 1}
        }))
        .unwrap();

        let result: Result<Decoded<TestPayload, LegacyTestPayload>, _> =
            decode(&body, "TestHappened", 1);
        assert!(matches!(result, Err(EnvelopeError::Invalid(_))));
    }

    #[test]
    fn caused_by_propagates_correlation_and_sets_causation() {
        let trigger = sample_envelope();
        let meta = EventMetadata::caused_by(&trigger);

        let derived = EventEnvelope::new(
            "Derived",
            1,
            "test-service",
            "order-1",
            8,
            "schema",
            TestPayload {
                order_id: "order-1".to_string(),
                amount: 1,
            },
            meta,
        );

        assert_eq!(derived.correlation_id, trigger.correlation_id);
        assert_eq!(derived.causation_id, Some(trigger.event_id));
        assert_ne!(derived.event_id, trigger.event_id);
    }

    #[test]
    fn malformed_json_is_reported_as_malformed() {
        let result: Result<Decoded<TestPayload, LegacyTestPayload>, _> =
            decode(b"{not json", "TestHappened", 1);
        assert!(matches!(result, Err(EnvelopeError::Malformed(_))));
    }
}
