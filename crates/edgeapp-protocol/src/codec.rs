//! The thing-model codec: topic grammar plus wire mapper behind two entry
//! points.
//!
//! ```text
//! encode(role, model, device, neutral bytes) → (topic, wire bytes)
//! decode(topic, wire bytes)                  → (role, model, device, neutral body)
//! ```
//!
//! A [`ThingCodec`] holds the running application's [`Identity`] and is
//! immutable after construction, so it can be shared freely across tasks.

use crate::mapper::{self, Entity};
use crate::message::{Body, Message};
use crate::topic::{
    self, AddressingMode, ParsedTopic, TopicParams, TopicRole, TopicScope,
};
use crate::ProtocolError;

/// Static identity of the running application and the edge device it runs on.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Identity {
    pub application_id: String,
    pub device_id: String,
    pub model_id: String,
    pub mode: AddressingMode,
}

/// Output of [`ThingCodec::encode`].
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Encoded {
    pub topic: String,
    pub payload: Vec<u8>,
}

/// Output of [`ThingCodec::decode`].
#[derive(Debug, Clone, PartialEq)]
pub struct Decoded {
    pub role: TopicRole,
    pub model_id: String,
    pub device_id: String,
    pub body: Body,
}

impl Decoded {
    /// Converts into the neutral [`Message`] handed to the application.
    pub fn into_message(self) -> Result<Message, ProtocolError> {
        Ok(Message {
            kind: self.role.kind(),
            payload: self.body.to_vec()?,
            model_id: self.model_id,
            device_id: self.device_id,
        })
    }
}

/// Bidirectional translator between neutral messages and the wire.
#[derive(Debug, Clone)]
pub struct ThingCodec {
    identity: Identity,
}

impl ThingCodec {
    pub fn new(identity: Identity) -> Self {
        Self { identity }
    }

    pub fn identity(&self) -> &Identity {
        &self.identity
    }

    pub fn mode(&self) -> AddressingMode {
        self.identity.mode
    }

    /// Builds the topic for `role` addressed to `(model_id, device_id)`.
    ///
    /// Inbound roles accept `+` in any value to form a subscription filter.
    pub fn topic(
        &self,
        role: TopicRole,
        identifier: &str,
        model_id: &str,
        device_id: &str,
    ) -> Result<String, ProtocolError> {
        topic::build(
            self.identity.mode,
            role,
            &TopicParams {
                application_id: &self.identity.application_id,
                model_id,
                device_id,
                identifier,
            },
        )
    }

    /// Parses a topic under this codec's addressing mode.
    pub fn parse_topic(&self, topic: &str) -> Result<ParsedTopic, ProtocolError> {
        topic::parse(self.identity.mode, topic)
    }

    /// Encodes a neutral JSON payload for `role`.
    ///
    /// # Errors
    /// [`ProtocolError::Decode`] if `payload` is not the neutral shape for
    /// the role's kind, plus every error of [`encode_body`](Self::encode_body).
    pub fn encode(
        &self,
        role: TopicRole,
        model_id: &str,
        device_id: &str,
        payload: &[u8],
    ) -> Result<Encoded, ProtocolError> {
        let body = Body::from_slice(role.kind(), payload)?;
        self.encode_body(role, model_id, device_id, &body)
    }

    /// Encodes a typed body for `role`.
    ///
    /// The envelope metadata names `(model_id, device_id)` as the entity.
    /// The topic identifier is taken from the body itself, so the event or
    /// service name always matches between topic and envelope.
    pub fn encode_body(
        &self,
        role: TopicRole,
        model_id: &str,
        device_id: &str,
        body: &Body,
    ) -> Result<Encoded, ProtocolError> {
        if body.kind() != role.kind() {
            return Err(ProtocolError::InvalidArgument(format!(
                "{} payload cannot be sent as {role}",
                body.kind()
            )));
        }
        let payload = mapper::encode(
            body,
            &Entity {
                model_id,
                entity_id: device_id,
            },
        )?;
        let identifier = mapper::topic_identifier(body).unwrap_or_default();
        let topic = self.topic(role, identifier, model_id, device_id)?;
        Ok(Encoded { topic, payload })
    }

    /// Decodes an inbound message using only the topic for addressing.
    ///
    /// Edge-rooted topics carry no model/device segments; for those the
    /// codec's own identity is reported.
    pub fn decode(
        &self,
        topic: &str,
        payload: &[u8],
    ) -> Result<Decoded, ProtocolError> {
        self.decode_inner(topic, payload).map(|(decoded, _)| decoded)
    }

    /// Like [`decode`](Self::decode), but a non-empty `entityId` in the
    /// envelope metadata replaces the device id.
    ///
    /// This follows the platform's view of entity identity, which may
    /// differ from the topic's device segment for sub-device traffic.
    pub fn decode_resolving_entity(
        &self,
        topic: &str,
        payload: &[u8],
    ) -> Result<Decoded, ProtocolError> {
        let (mut decoded, entity_id) = self.decode_inner(topic, payload)?;
        if let Some(entity_id) = entity_id {
            decoded.device_id = entity_id;
        }
        Ok(decoded)
    }

    fn decode_inner(
        &self,
        topic: &str,
        payload: &[u8],
    ) -> Result<(Decoded, Option<String>), ProtocolError> {
        let parsed = self.parse_topic(topic)?;
        let mapped = mapper::decode(
            parsed.role.kind(),
            parsed.identifier.as_deref(),
            payload,
        )?;
        let (model_id, device_id) = match parsed.scope {
            TopicScope::Device {
                model_id,
                device_id,
            } => (model_id, device_id),
            TopicScope::Application { .. } => (
                self.identity.model_id.clone(),
                self.identity.device_id.clone(),
            ),
        };
        let decoded = Decoded {
            role: parsed.role,
            model_id,
            device_id,
            body: mapped.body,
        };
        Ok((decoded, mapped.entity_id))
    }
}
