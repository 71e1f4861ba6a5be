//! Neutral message types: the shapes the application sees.
//!
//! These are independent of the platform wire format. The codec maps them
//! to and from wire envelopes; the application only ever builds or reads
//! these structures (or their JSON encoding).
//!
//! JSON field names are camelCase, so a property list looks like:
//!
//! ```json
//! [{"identifier":"random_data","timestamp":1593274999806,"value":"42"}]
//! ```

use std::fmt;

use serde::{Deserialize, Serialize};
use serde_json::{Map, Value};

use crate::ProtocolError;

/// Free-form parameter map carried by events, service calls and replies.
pub type Params = Map<String, Value>;

// ---------------------------------------------------------------------------
// MessageKind
// ---------------------------------------------------------------------------

/// The four thing-model message kinds.
///
/// Combined with a [`Direction`](crate::Direction) this yields one of the
/// eight [`TopicRole`](crate::TopicRole)s.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub enum MessageKind {
    /// Property report or property control.
    Property,
    /// Event post or event control.
    Event,
    /// Remote service invocation.
    ServiceCall,
    /// Answer to a service invocation.
    ServiceReply,
}

impl fmt::Display for MessageKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let name = match self {
            Self::Property => "property",
            Self::Event => "event",
            Self::ServiceCall => "service call",
            Self::ServiceReply => "service reply",
        };
        f.write_str(name)
    }
}

// ---------------------------------------------------------------------------
// Payload records
// ---------------------------------------------------------------------------

/// One property sample.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct PropertyValue {
    /// Property identifier from the thing model.
    pub identifier: String,
    /// Sample time in Unix milliseconds.
    pub timestamp: i64,
    /// Any JSON value.
    pub value: Value,
}

impl PropertyValue {
    /// Creates a property sample.
    pub fn new(
        identifier: impl Into<String>,
        timestamp: i64,
        value: impl Into<Value>,
    ) -> Self {
        Self {
            identifier: identifier.into(),
            timestamp,
            value: value.into(),
        }
    }
}

/// An event occurrence.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct EventRecord {
    /// Event identifier; also becomes the event segment of the topic.
    pub identifier: String,
    /// Occurrence time in Unix milliseconds.
    pub timestamp: i64,
    #[serde(default)]
    pub params: Params,
}

/// A service invocation.
///
/// `message_id` is the correlation key. It may be left empty on outbound
/// calls; [`ThingCodec`](crate::ThingCodec) and the session layer fill it
/// in with a fresh token.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ServiceCall {
    #[serde(default)]
    pub message_id: String,
    /// Service identifier from the thing model.
    pub identifier: String,
    #[serde(default)]
    pub params: Params,
}

impl ServiceCall {
    /// Creates a call with no message id and no parameters.
    pub fn new(identifier: impl Into<String>) -> Self {
        Self {
            message_id: String::new(),
            identifier: identifier.into(),
            params: Params::new(),
        }
    }

    /// Adds one parameter (builder style).
    pub fn with_param(
        mut self,
        key: impl Into<String>,
        value: impl Into<Value>,
    ) -> Self {
        self.params.insert(key.into(), value.into());
        self
    }

    /// Builds the reply to this call, echoing its message id.
    pub fn reply(&self, code: i32, params: Params) -> ServiceReply {
        ServiceReply {
            message_id: self.message_id.clone(),
            identifier: self.identifier.clone(),
            code,
            params,
        }
    }
}

/// The answer to a [`ServiceCall`]. Its `message_id` must equal the call's.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ServiceReply {
    pub message_id: String,
    pub identifier: String,
    /// Application status code (200 for success by convention).
    pub code: i32,
    #[serde(default)]
    pub params: Params,
}

// ---------------------------------------------------------------------------
// Body
// ---------------------------------------------------------------------------

/// A typed neutral payload, one variant per [`MessageKind`].
#[derive(Debug, Clone, PartialEq)]
pub enum Body {
    Property(Vec<PropertyValue>),
    Event(EventRecord),
    ServiceCall(ServiceCall),
    ServiceReply(ServiceReply),
}

impl Body {
    /// Returns the kind this body belongs to.
    pub fn kind(&self) -> MessageKind {
        match self {
            Self::Property(_) => MessageKind::Property,
            Self::Event(_) => MessageKind::Event,
            Self::ServiceCall(_) => MessageKind::ServiceCall,
            Self::ServiceReply(_) => MessageKind::ServiceReply,
        }
    }

    /// Parses the neutral JSON encoding of a payload of the given kind.
    ///
    /// # Errors
    /// Returns [`ProtocolError::Decode`] if the bytes are not the JSON
    /// shape expected for `kind`.
    pub fn from_slice(
        kind: MessageKind,
        payload: &[u8],
    ) -> Result<Self, ProtocolError> {
        let body = match kind {
            MessageKind::Property => {
                Self::Property(from_json(payload)?)
            }
            MessageKind::Event => Self::Event(from_json(payload)?),
            MessageKind::ServiceCall => {
                Self::ServiceCall(from_json(payload)?)
            }
            MessageKind::ServiceReply => {
                Self::ServiceReply(from_json(payload)?)
            }
        };
        Ok(body)
    }

    /// Serializes the body to its neutral JSON encoding.
    pub fn to_vec(&self) -> Result<Vec<u8>, ProtocolError> {
        let bytes = match self {
            Self::Property(props) => serde_json::to_vec(props),
            Self::Event(event) => serde_json::to_vec(event),
            Self::ServiceCall(call) => serde_json::to_vec(call),
            Self::ServiceReply(reply) => serde_json::to_vec(reply),
        };
        bytes.map_err(ProtocolError::Encode)
    }
}

fn from_json<T: serde::de::DeserializeOwned>(
    payload: &[u8],
) -> Result<T, ProtocolError> {
    serde_json::from_slice(payload).map_err(ProtocolError::Decode)
}

// ---------------------------------------------------------------------------
// Message
// ---------------------------------------------------------------------------

/// A neutral message as delivered to (or accepted from) the application.
///
/// `payload` holds the neutral JSON for `kind`; use [`Message::body`] to
/// get the typed form.
#[derive(Debug, Clone, PartialEq)]
pub struct Message {
    pub kind: MessageKind,
    pub model_id: String,
    pub device_id: String,
    pub payload: Vec<u8>,
}

impl Message {
    /// Parses `payload` according to `kind`.
    pub fn body(&self) -> Result<Body, ProtocolError> {
        Body::from_slice(self.kind, &self.payload)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    #[test]
    fn test_property_list_json_shape() {
        let props = vec![
            PropertyValue::new("id_prop_01", 1593274999806, "aaaaaa"),
            PropertyValue::new("id_prop_02", 1593274999806, "bbbbbb"),
        ];
        let json = serde_json::to_string(&props).unwrap();
        assert_eq!(
            json,
            r#"[{"identifier":"id_prop_01","timestamp":1593274999806,"value":"aaaaaa"},{"identifier":"id_prop_02","timestamp":1593274999806,"value":"bbbbbb"}]"#
        );
    }

    #[test]
    fn test_service_call_uses_camel_case_message_id() {
        let call = ServiceCall {
            message_id: "40682013".into(),
            identifier: "test_service_001".into(),
            params: Params::new(),
        };
        let value = serde_json::to_value(&call).unwrap();
        assert_eq!(
            value,
            json!({
                "messageId": "40682013",
                "identifier": "test_service_001",
                "params": {}
            })
        );
    }

    #[test]
    fn test_service_call_missing_message_id_defaults_empty() {
        let call: ServiceCall =
            serde_json::from_str(r#"{"identifier":"setTemperature"}"#)
                .unwrap();
        assert!(call.message_id.is_empty());
        assert!(call.params.is_empty());
    }

    #[test]
    fn test_service_call_reply_echoes_message_id() {
        let call = ServiceCall::new("test_app_call")
            .with_param("temperature", 35);
        let call = ServiceCall {
            message_id: "M1".into(),
            ..call
        };
        let reply = call.reply(200, call.params.clone());
        assert_eq!(reply.message_id, "M1");
        assert_eq!(reply.identifier, "test_app_call");
        assert_eq!(reply.params["temperature"], json!(35));
    }

    #[test]
    fn test_body_from_slice_wrong_shape_fails() {
        // An event record is not a property list.
        let payload = br#"{"identifier":"e","timestamp":1,"params":{}}"#;
        let result = Body::from_slice(MessageKind::Property, payload);
        assert!(matches!(result, Err(ProtocolError::Decode(_))));
    }

    #[test]
    fn test_message_body_parses_by_kind() {
        let msg = Message {
            kind: MessageKind::Event,
            model_id: "iott-X".into(),
            device_id: "iotd-Y".into(),
            payload: br#"{"identifier":"data_event","timestamp":5,"params":{"event_value":"80"}}"#.to_vec(),
        };
        match msg.body().unwrap() {
            Body::Event(event) => {
                assert_eq!(event.identifier, "data_event");
                assert_eq!(event.params["event_value"], json!("80"));
            }
            other => panic!("expected event body, got {other:?}"),
        }
    }
}
