use std::collections::BTreeMap;
use chrono::{DateTime, Utc};
use serde::{Serialize, Deserialize};
use serde_json::Value;
use crate::protocol::{HANDLE_MARKER, SEPARATOR};

/// A single message on the action bus.
/// This is the envelope every service publishes and the watchdog consumes.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Action {
    /// Namespaced action type, e.g. "@meta/PONG" or "@alpha/FETCH_SUCCESS"
    #[serde(rename = "type")]
    pub action_type: String,

    /// Opaque payload, decoded by whoever recognizes the type
    #[serde(default)]
    pub payload: Value,
}

impl Action {
    pub fn new(action_type: impl Into<String>, payload: Value) -> Self {
        Self {
            action_type: action_type.into(),
            payload,
        }
    }

    /// The handle segment of the type, e.g. "meta" for "@meta/PING"
    pub fn route_handle(&self) -> Option<&str> {
        let rest = self.action_type.strip_prefix(HANDLE_MARKER)?;
        rest.split(SEPARATOR).next().filter(|h| !h.is_empty())
    }
}

/// Payload of a heartbeat response
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct PongPayload {
    /// Milliseconds since the unix epoch, stamped by the responding service
    pub timestamp: i64,
    pub handle: String,
}

impl PongPayload {
    /// Decode the millisecond timestamp. None when out of range.
    pub fn emitted_at(&self) -> Option<DateTime<Utc>> {
        DateTime::from_timestamp_millis(self.timestamp)
    }
}

/// Self-description a service announces in its identity response
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Manifest {
    pub name: String,
    pub handle: String,
    pub version: String,
    pub description: String,
    pub started_at: DateTime<Utc>,
}

/// Point-in-time state of one watch group.
/// Unobserved timestamps serialize as null, never omitted.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct GroupReport {
    pub last_request: Option<DateTime<Utc>>,
    pub last_success: Option<DateTime<Utc>>,
    pub last_error: Option<DateTime<Utc>>,
    pub last_response: Option<DateTime<Utc>>,

    /// Microseconds between the latest request and its response,
    /// null until a request has been answered
    pub response_latency: Option<i64>,
}

/// Point-in-time state of one watched service
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ServiceReport {
    pub handle: String,

    /// None until the service has answered an identity probe
    pub manifest: Option<Manifest>,

    pub last_heartbeat: Option<DateTime<Utc>>,

    pub groups: BTreeMap<String, GroupReport>,
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    #[test]
    fn test_action_wire_format() {
        let action: Action = serde_json::from_value(json!({
            "type": "@meta/PONG",
            "payload": {"timestamp": 1000, "handle": "alpha"}
        }))
        .unwrap();

        assert_eq!(action.action_type, "@meta/PONG");
        assert_eq!(action.route_handle(), Some("meta"));

        let pong: PongPayload = serde_json::from_value(action.payload).unwrap();
        assert_eq!(pong.handle, "alpha");
        assert_eq!(pong.emitted_at().unwrap().timestamp_millis(), 1000);
    }

    #[test]
    fn test_action_without_payload() {
        let action: Action = serde_json::from_str(r#"{"type": "@alpha/TICK"}"#).unwrap();
        assert_eq!(action.payload, Value::Null);
    }

    #[test]
    fn test_route_handle_requires_marker() {
        assert_eq!(Action::new("meta/PING", Value::Null).route_handle(), None);
        assert_eq!(Action::new("@/PING", Value::Null).route_handle(), None);
        assert_eq!(Action::new("@alpha", Value::Null).route_handle(), Some("alpha"));
    }

    #[test]
    fn test_unobserved_fields_serialize_as_null() {
        let report = ServiceReport {
            handle: "alpha".to_string(),
            manifest: None,
            last_heartbeat: None,
            groups: BTreeMap::from([(
                "api".to_string(),
                GroupReport {
                    last_request: None,
                    last_success: None,
                    last_error: None,
                    last_response: None,
                    response_latency: None,
                },
            )]),
        };

        let value = serde_json::to_value(&report).unwrap();
        assert_eq!(value["manifest"], Value::Null);
        assert_eq!(value["last_heartbeat"], Value::Null);
        let group = value["groups"]["api"].as_object().unwrap();
        for key in ["last_request", "last_success", "last_error", "last_response", "response_latency"] {
            assert_eq!(group.get(key), Some(&Value::Null), "{} must be present", key);
        }
    }
}
