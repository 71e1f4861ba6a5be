//! Wire message mapper: neutral [`Body`] values to wire envelopes and back.
//!
//! Encoding stamps a fresh envelope id and the current time on property,
//! event and (id-less) service-call messages. A service reply always keeps
//! the message id of the call it answers, since that id is the
//! correlation key.
//!
//! Decoding takes the identifier out-of-band, because for events and
//! services it travels in the topic rather than in the envelope.

use std::collections::BTreeMap;

use crate::message::{
    Body, EventRecord, MessageKind, PropertyValue, ServiceCall, ServiceReply,
};
use crate::wire::{
    self, EventData, EventEnvelope, ModelMetadata, PropertyData,
    PropertyEnvelope, ServiceCallEnvelope, ServiceMetadata,
    ServiceReplyEnvelope, MESSAGE_VERSION, PROPERTY_TYPE,
};
use crate::ProtocolError;

/// The entity an outbound envelope describes in its metadata.
#[derive(Debug, Clone, Copy)]
pub struct Entity<'a> {
    pub model_id: &'a str,
    pub entity_id: &'a str,
}

/// A decoded body plus the entity id announced in the envelope metadata,
/// if there was a non-empty one.
#[derive(Debug, Clone, PartialEq)]
pub struct Mapped {
    pub body: Body,
    pub entity_id: Option<String>,
}

/// Generates a fresh envelope / message id.
pub fn new_message_id() -> String {
    uuid::Uuid::new_v4().to_string()
}

fn now_millis() -> i64 {
    chrono::Utc::now().timestamp_millis()
}

/// The identifier a body contributes to its topic (`None` for properties).
pub fn topic_identifier(body: &Body) -> Option<&str> {
    match body {
        Body::Property(_) => None,
        Body::Event(event) => Some(&event.identifier),
        Body::ServiceCall(call) => Some(&call.identifier),
        Body::ServiceReply(reply) => Some(&reply.identifier),
    }
}

// ---------------------------------------------------------------------------
// Encode
// ---------------------------------------------------------------------------

/// Encodes a body into wire bytes.
///
/// # Errors
/// [`ProtocolError::InvalidArgument`] for an empty or duplicated property
/// list, an empty identifier, or a reply with no message id.
pub fn encode(body: &Body, entity: &Entity<'_>) -> Result<Vec<u8>, ProtocolError> {
    match body {
        Body::Property(props) => encode_property(props, entity),
        Body::Event(event) => encode_event(event, entity),
        Body::ServiceCall(call) => encode_service_call(call, entity),
        Body::ServiceReply(reply) => encode_service_reply(reply),
    }
}

fn model_metadata(entity: &Entity<'_>) -> ModelMetadata {
    ModelMetadata {
        model_id: entity.model_id.to_string(),
        entity_id: entity.entity_id.to_string(),
        source: Vec::new(),
        epoch_time: now_millis(),
    }
}

fn require_identifier(
    kind: MessageKind,
    identifier: &str,
) -> Result<(), ProtocolError> {
    if identifier.is_empty() {
        return Err(ProtocolError::InvalidArgument(format!(
            "{kind} identifier is empty"
        )));
    }
    Ok(())
}

fn encode_property(
    props: &[PropertyValue],
    entity: &Entity<'_>,
) -> Result<Vec<u8>, ProtocolError> {
    if props.is_empty() {
        return Err(ProtocolError::InvalidArgument(
            "property list is empty".into(),
        ));
    }
    let mut params = BTreeMap::new();
    for prop in props {
        require_identifier(MessageKind::Property, &prop.identifier)?;
        let data = PropertyData {
            value: prop.value.clone(),
            time: prop.timestamp,
        };
        if params.insert(prop.identifier.clone(), data).is_some() {
            return Err(ProtocolError::InvalidArgument(format!(
                "property {:?} appears more than once",
                prop.identifier
            )));
        }
    }
    let envelope = PropertyEnvelope {
        id: new_message_id(),
        version: MESSAGE_VERSION.to_string(),
        kind: PROPERTY_TYPE.to_string(),
        metadata: Some(model_metadata(entity)),
        params,
    };
    serde_json::to_vec(&envelope).map_err(ProtocolError::Encode)
}

fn encode_event(
    event: &EventRecord,
    entity: &Entity<'_>,
) -> Result<Vec<u8>, ProtocolError> {
    require_identifier(MessageKind::Event, &event.identifier)?;
    let envelope = EventEnvelope {
        id: new_message_id(),
        version: MESSAGE_VERSION.to_string(),
        kind: wire::event_type(&event.identifier),
        metadata: Some(model_metadata(entity)),
        params: EventData {
            value: event.params.clone(),
            message: String::new(),
            level: String::new(),
            time: event.timestamp,
        },
    };
    serde_json::to_vec(&envelope).map_err(ProtocolError::Encode)
}

fn encode_service_call(
    call: &ServiceCall,
    entity: &Entity<'_>,
) -> Result<Vec<u8>, ProtocolError> {
    require_identifier(MessageKind::ServiceCall, &call.identifier)?;
    let id = if call.message_id.is_empty() {
        new_message_id()
    } else {
        call.message_id.clone()
    };
    let envelope = ServiceCallEnvelope {
        id,
        version: MESSAGE_VERSION.to_string(),
        kind: wire::service_type(&call.identifier),
        metadata: Some(ServiceMetadata {
            model_id: entity.model_id.to_string(),
            entity_id: entity.entity_id.to_string(),
        }),
        params: call.params.clone(),
    };
    serde_json::to_vec(&envelope).map_err(ProtocolError::Encode)
}

fn encode_service_reply(reply: &ServiceReply) -> Result<Vec<u8>, ProtocolError> {
    require_identifier(MessageKind::ServiceReply, &reply.identifier)?;
    if reply.message_id.is_empty() {
        return Err(ProtocolError::InvalidArgument(
            "service reply must carry the call's message id".into(),
        ));
    }
    let envelope = ServiceReplyEnvelope {
        id: reply.message_id.clone(),
        version: MESSAGE_VERSION.to_string(),
        code: reply.code,
        data: reply.params.clone(),
    };
    serde_json::to_vec(&envelope).map_err(ProtocolError::Encode)
}

// ---------------------------------------------------------------------------
// Decode
// ---------------------------------------------------------------------------

/// Decodes wire bytes of the given kind.
///
/// `identifier` is the event/service identifier recovered from the topic;
/// it is required for every kind except properties.
///
/// # Errors
/// - [`ProtocolError::Decode`] for malformed JSON or a schema mismatch.
/// - [`ProtocolError::InvalidMessage`] when the envelope `type` names a
///   different kind.
/// - [`ProtocolError::InvalidArgument`] when a required identifier is
///   missing.
pub fn decode(
    kind: MessageKind,
    identifier: Option<&str>,
    payload: &[u8],
) -> Result<Mapped, ProtocolError> {
    match kind {
        MessageKind::Property => decode_property(payload),
        MessageKind::Event => {
            decode_event(topic_identifier_for(kind, identifier)?, payload)
        }
        MessageKind::ServiceCall => decode_service_call(
            topic_identifier_for(kind, identifier)?,
            payload,
        ),
        MessageKind::ServiceReply => decode_service_reply(
            topic_identifier_for(kind, identifier)?,
            payload,
        ),
    }
}

fn topic_identifier_for(
    kind: MessageKind,
    identifier: Option<&str>,
) -> Result<&str, ProtocolError> {
    match identifier {
        Some(id) if !id.is_empty() => Ok(id),
        _ => Err(ProtocolError::InvalidArgument(format!(
            "{kind} decode requires the topic identifier"
        ))),
    }
}

fn check_type(
    kind: MessageKind,
    found: &str,
    accepts: impl Fn(&str) -> bool,
) -> Result<(), ProtocolError> {
    // Older peers omit `type`; only a present, foreign type is an error.
    if found.is_empty() || accepts(found) {
        Ok(())
    } else {
        Err(ProtocolError::InvalidMessage(format!(
            "envelope type {found:?} is not a {kind} type"
        )))
    }
}

fn non_empty(entity_id: String) -> Option<String> {
    Some(entity_id).filter(|id| !id.is_empty())
}

fn decode_property(payload: &[u8]) -> Result<Mapped, ProtocolError> {
    let envelope: PropertyEnvelope =
        serde_json::from_slice(payload).map_err(ProtocolError::Decode)?;
    check_type(MessageKind::Property, &envelope.kind, |t| {
        t == PROPERTY_TYPE
    })?;
    let props = envelope
        .params
        .into_iter()
        .map(|(identifier, data)| PropertyValue {
            identifier,
            timestamp: data.time,
            value: data.value,
        })
        .collect();
    Ok(Mapped {
        body: Body::Property(props),
        entity_id: envelope.metadata.and_then(|m| non_empty(m.entity_id)),
    })
}

fn decode_event(
    identifier: &str,
    payload: &[u8],
) -> Result<Mapped, ProtocolError> {
    let envelope: EventEnvelope =
        serde_json::from_slice(payload).map_err(ProtocolError::Decode)?;
    check_type(MessageKind::Event, &envelope.kind, wire::is_event_type)?;
    Ok(Mapped {
        body: Body::Event(EventRecord {
            identifier: identifier.to_string(),
            timestamp: envelope.params.time,
            params: envelope.params.value,
        }),
        entity_id: envelope.metadata.and_then(|m| non_empty(m.entity_id)),
    })
}

fn decode_service_call(
    identifier: &str,
    payload: &[u8],
) -> Result<Mapped, ProtocolError> {
    let envelope: ServiceCallEnvelope =
        serde_json::from_slice(payload).map_err(ProtocolError::Decode)?;
    check_type(
        MessageKind::ServiceCall,
        &envelope.kind,
        wire::is_service_type,
    )?;
    Ok(Mapped {
        body: Body::ServiceCall(ServiceCall {
            message_id: envelope.id,
            identifier: identifier.to_string(),
            params: envelope.params,
        }),
        entity_id: envelope.metadata.and_then(|m| non_empty(m.entity_id)),
    })
}

fn decode_service_reply(
    identifier: &str,
    payload: &[u8],
) -> Result<Mapped, ProtocolError> {
    let envelope: ServiceReplyEnvelope =
        serde_json::from_slice(payload).map_err(ProtocolError::Decode)?;
    Ok(Mapped {
        body: Body::ServiceReply(ServiceReply {
            message_id: envelope.id,
            identifier: identifier.to_string(),
            code: envelope.code,
            params: envelope.data,
        }),
        entity_id: None,
    })
}
