// Analytics Event Model
//
// Two event kinds exist: user identification and behavioral tracking.
// Events are immutable once created and carry no intrinsic ID; identity
// is the enqueue sequence assigned by the queue store.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

use crate::domain::error::{DomainError, Result};
use crate::domain::queue::{IDENTIFY_QUEUE, TRACK_QUEUE};

/// Event kind, one per dispatch queue
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum EventKind {
    Identify,
    Track,
}

impl EventKind {
    /// Name of the queue this kind is dispatched through
    pub fn queue_name(&self) -> &'static str {
        match self {
            EventKind::Identify => IDENTIFY_QUEUE,
            EventKind::Track => TRACK_QUEUE,
        }
    }

    /// All kinds, in queue-startup order
    pub fn all() -> [EventKind; 2] {
        [EventKind::Identify, EventKind::Track]
    }
}

impl std::fmt::Display for EventKind {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.queue_name())
    }
}

/// User traits attached to an identify event
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Traits {
    pub first_name: String,
    pub email: String,
    pub registered_at: DateTime<Utc>,
}

/// Payload of a user-identification event
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct IdentifyPayload {
    pub user_id: String,
    pub traits: Traits,
}

/// Payload of a behavioral-tracking event
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct TrackPayload {
    pub event: String,
    pub user_id: String,
    #[serde(default)]
    pub properties: serde_json::Value,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub anonymous_id: Option<String>,
}

/// One analytics event.
///
/// Serialized with an adjacent `kind`/`payload` tag for storage; the
/// delivery client sends the bare payload as the request body.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "kind", content = "payload", rename_all = "lowercase")]
pub enum Event {
    Identify(IdentifyPayload),
    Track(TrackPayload),
}

impl Event {
    pub fn kind(&self) -> EventKind {
        match self {
            Event::Identify(_) => EventKind::Identify,
            Event::Track(_) => EventKind::Track,
        }
    }

    /// Check the data-model constraints (non-empty identifiers).
    ///
    /// This is the only validation the system performs; anything beyond
    /// it is the remote endpoint's business.
    pub fn validate(&self) -> Result<()> {
        match self {
            Event::Identify(p) => {
                if p.user_id.is_empty() {
                    return Err(DomainError::ValidationError(
                        "identify event requires a non-empty userId".to_string(),
                    ));
                }
            }
            Event::Track(p) => {
                if p.event.is_empty() {
                    return Err(DomainError::ValidationError(
                        "track event requires a non-empty event name".to_string(),
                    ));
                }
            }
        }
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::TimeZone;
    use serde_json::json;

    fn identify_payload() -> IdentifyPayload {
        IdentifyPayload {
            user_id: "u1".to_string(),
            traits: Traits {
                first_name: "A".to_string(),
                email: "a@x.com".to_string(),
                registered_at: Utc.with_ymd_and_hms(2024, 1, 15, 12, 0, 0).unwrap(),
            },
        }
    }

    #[test]
    fn identify_payload_uses_camel_case_wire_names() {
        let body = serde_json::to_value(identify_payload()).unwrap();
        assert_eq!(body["userId"], "u1");
        assert_eq!(body["traits"]["firstName"], "A");
        assert_eq!(body["traits"]["email"], "a@x.com");
        assert!(body["traits"]["registeredAt"].is_string());
    }

    #[test]
    fn track_payload_omits_missing_anonymous_id() {
        let payload = TrackPayload {
            event: "dragon".to_string(),
            user_id: "test".to_string(),
            properties: json!({}),
            anonymous_id: None,
        };
        let body = serde_json::to_value(&payload).unwrap();
        assert_eq!(body["event"], "dragon");
        assert!(body.get("anonymousId").is_none());
    }

    #[test]
    fn event_storage_form_round_trips() {
        let event = Event::Identify(identify_payload());
        let stored = serde_json::to_string(&event).unwrap();
        assert!(stored.contains("\"kind\":\"identify\""));
        let back: Event = serde_json::from_str(&stored).unwrap();
        assert_eq!(back, event);
    }

    #[test]
    fn validate_rejects_empty_identifiers() {
        let mut p = identify_payload();
        p.user_id = String::new();
        assert!(Event::Identify(p).validate().is_err());

        let track = Event::Track(TrackPayload {
            event: String::new(),
            user_id: "u".to_string(),
            properties: json!({}),
            anonymous_id: None,
        });
        assert!(track.validate().is_err());
    }

    #[test]
    fn kind_maps_to_queue_name() {
        assert_eq!(EventKind::Identify.queue_name(), "identify");
        assert_eq!(EventKind::Track.queue_name(), "track");
    }
}
