//! Platform wire envelopes.
//!
//! Field names and nesting are wire-compatibility constants:
//!
//! ```json
//! {"id":"…","version":"1.0","type":"thing.property.post",
//!  "metadata":{"modelId":"…","entityId":"…","source":[],"epochTime":1593274999806},
//!  "params":{"random_data":{"value":"42","time":1593274999806}}}
//! ```
//!
//! Replies are header-light: `{"id","version","code","data"}`.

use std::collections::BTreeMap;

use serde::{Deserialize, Serialize};
use serde_json::Value;

use crate::message::Params;

/// Envelope format version stamped on every outbound message.
pub const MESSAGE_VERSION: &str = "1.0";

/// `type` of every property envelope.
pub const PROPERTY_TYPE: &str = "thing.property.post";

const EVENT_TYPE_PREFIX: &str = "thing.event.";
const EVENT_TYPE_SUFFIX: &str = ".post";
const SERVICE_TYPE_PREFIX: &str = "thing.service.";
const SERVICE_TYPE_SUFFIX: &str = ".call";

/// `type` of an event envelope: `thing.event.{identifier}.post`.
pub fn event_type(identifier: &str) -> String {
    format!("{EVENT_TYPE_PREFIX}{identifier}{EVENT_TYPE_SUFFIX}")
}

/// `type` of a service-call envelope: `thing.service.{identifier}.call`.
pub fn service_type(identifier: &str) -> String {
    format!("{SERVICE_TYPE_PREFIX}{identifier}{SERVICE_TYPE_SUFFIX}")
}

pub(crate) fn is_event_type(kind: &str) -> bool {
    kind.starts_with(EVENT_TYPE_PREFIX) && kind.ends_with(EVENT_TYPE_SUFFIX)
}

pub(crate) fn is_service_type(kind: &str) -> bool {
    kind.starts_with(SERVICE_TYPE_PREFIX)
        && kind.ends_with(SERVICE_TYPE_SUFFIX)
}

// ---------------------------------------------------------------------------
// Metadata
// ---------------------------------------------------------------------------

/// Metadata on property and event envelopes.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ModelMetadata {
    pub model_id: String,
    pub entity_id: String,
    #[serde(default)]
    pub source: Vec<String>,
    /// Envelope creation time in Unix milliseconds.
    #[serde(default)]
    pub epoch_time: i64,
}

/// Metadata on service-call envelopes.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ServiceMetadata {
    pub model_id: String,
    pub entity_id: String,
}

// ---------------------------------------------------------------------------
// Envelopes
// ---------------------------------------------------------------------------

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct PropertyData {
    pub value: Value,
    pub time: i64,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct PropertyEnvelope {
    pub id: String,
    #[serde(default)]
    pub version: String,
    #[serde(rename = "type", default)]
    pub kind: String,
    #[serde(default)]
    pub metadata: Option<ModelMetadata>,
    /// Keyed by property identifier.
    pub params: BTreeMap<String, PropertyData>,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct EventData {
    #[serde(default)]
    pub value: Params,
    #[serde(default)]
    pub message: String,
    #[serde(default)]
    pub level: String,
    pub time: i64,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct EventEnvelope {
    pub id: String,
    #[serde(default)]
    pub version: String,
    #[serde(rename = "type", default)]
    pub kind: String,
    #[serde(default)]
    pub metadata: Option<ModelMetadata>,
    pub params: EventData,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ServiceCallEnvelope {
    pub id: String,
    #[serde(default)]
    pub version: String,
    #[serde(rename = "type", default)]
    pub kind: String,
    #[serde(default)]
    pub metadata: Option<ServiceMetadata>,
    #[serde(default)]
    pub params: Params,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ServiceReplyEnvelope {
    pub id: String,
    #[serde(default)]
    pub version: String,
    /// Missing on the wire means 0.
    #[serde(default)]
    pub code: i32,
    #[serde(default)]
    pub data: Params,
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    #[test]
    fn test_type_templates() {
        assert_eq!(event_type("data_event"), "thing.event.data_event.post");
        assert_eq!(
            service_type("setTemperature"),
            "thing.service.setTemperature.call"
        );
        assert!(is_event_type("thing.event.x.post"));
        assert!(!is_event_type("thing.service.x.call"));
        assert!(is_service_type("thing.service.x.call"));
        assert!(!is_service_type(PROPERTY_TYPE));
    }

    #[test]
    fn test_reply_envelope_has_no_type_or_metadata() {
        let envelope = ServiceReplyEnvelope {
            id: "M1".into(),
            version: MESSAGE_VERSION.into(),
            code: 200,
            data: Params::new(),
        };
        let value = serde_json::to_value(&envelope).unwrap();
        assert_eq!(
            value,
            json!({"id": "M1", "version": "1.0", "code": 200, "data": {}})
        );
    }

    #[test]
    fn test_event_envelope_field_names() {
        let envelope = EventEnvelope {
            id: "e1".into(),
            version: MESSAGE_VERSION.into(),
            kind: event_type("alarm"),
            metadata: Some(ModelMetadata {
                model_id: "iott-X".into(),
                entity_id: "iotd-Y".into(),
                source: Vec::new(),
                epoch_time: 10,
            }),
            params: EventData {
                value: Params::new(),
                message: String::new(),
                level: String::new(),
                time: 7,
            },
        };
        let value = serde_json::to_value(&envelope).unwrap();
        assert_eq!(value["type"], "thing.event.alarm.post");
        assert_eq!(value["metadata"]["entityId"], "iotd-Y");
        assert_eq!(value["metadata"]["epochTime"], 10);
        assert_eq!(value["params"]["time"], 7);
    }

    #[test]
    fn test_property_envelope_requires_params() {
        let result: Result<PropertyEnvelope, _> =
            serde_json::from_str(r#"{"id":"x","version":"1.0"}"#);
        assert!(result.is_err());
    }
}
