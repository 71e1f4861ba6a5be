//! Topic grammar: topic roles, addressing modes, and the exact topic
//! templates of both modes.
//!
//! The platform parses topics by position, so segment counts and literal
//! keywords are a compatibility surface. Two root layouts exist:
//!
//! ```text
//! edge-rooted (7 segments): /edge/{applicationId}/thing/{noun}/{slot}/{verb}
//! sys-rooted  (8 segments): /sys/{modelId}/{deviceId}/thing/{noun}/{slot}/{verb}
//! ```
//!
//! `noun` is `property`, `event` or `service`; `slot` is the literal `base`
//! for property traffic and the event/service identifier otherwise; `verb`
//! is `post`, `control`, `call` or `call_reply`.
//!
//! Which role maps to which layout is decided by [`AddressingMode`], as an
//! exhaustive `match` over `(mode, role)`.

use std::fmt;
use std::str::FromStr;

use serde::{Deserialize, Serialize};

use crate::{MessageKind, ProtocolError};

// ---------------------------------------------------------------------------
// Direction and TopicRole
// ---------------------------------------------------------------------------

/// Whether a topic is one we listen on or one we send to.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum Direction {
    /// Inbound traffic.
    Subscribe,
    /// Outbound traffic.
    Publish,
}

/// A message kind paired with a direction.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum TopicRole {
    SubscribeProperty,
    PublishProperty,
    SubscribeEvent,
    PublishEvent,
    SubscribeService,
    PublishService,
    /// Exists only in [`AddressingMode::Direct`].
    SubscribeServiceReply,
    PublishServiceReply,
}

impl TopicRole {
    /// Every role, inbound roles first.
    ///
    /// [`parse`] resolves a topic to the first role in this order whose
    /// template matches, so topics shared by both directions parse as
    /// inbound.
    pub const ALL: [TopicRole; 8] = [
        TopicRole::SubscribeProperty,
        TopicRole::SubscribeEvent,
        TopicRole::SubscribeService,
        TopicRole::SubscribeServiceReply,
        TopicRole::PublishProperty,
        TopicRole::PublishEvent,
        TopicRole::PublishService,
        TopicRole::PublishServiceReply,
    ];

    /// Builds the role for a kind and direction.
    pub fn new(kind: MessageKind, direction: Direction) -> Self {
        use Direction::{Publish, Subscribe};
        match (kind, direction) {
            (MessageKind::Property, Subscribe) => Self::SubscribeProperty,
            (MessageKind::Property, Publish) => Self::PublishProperty,
            (MessageKind::Event, Subscribe) => Self::SubscribeEvent,
            (MessageKind::Event, Publish) => Self::PublishEvent,
            (MessageKind::ServiceCall, Subscribe) => Self::SubscribeService,
            (MessageKind::ServiceCall, Publish) => Self::PublishService,
            (MessageKind::ServiceReply, Subscribe) => {
                Self::SubscribeServiceReply
            }
            (MessageKind::ServiceReply, Publish) => Self::PublishServiceReply,
        }
    }

    pub fn kind(self) -> MessageKind {
        match self {
            Self::SubscribeProperty | Self::PublishProperty => {
                MessageKind::Property
            }
            Self::SubscribeEvent | Self::PublishEvent => MessageKind::Event,
            Self::SubscribeService | Self::PublishService => {
                MessageKind::ServiceCall
            }
            Self::SubscribeServiceReply | Self::PublishServiceReply => {
                MessageKind::ServiceReply
            }
        }
    }

    pub fn direction(self) -> Direction {
        match self {
            Self::SubscribeProperty
            | Self::SubscribeEvent
            | Self::SubscribeService
            | Self::SubscribeServiceReply => Direction::Subscribe,
            Self::PublishProperty
            | Self::PublishEvent
            | Self::PublishService
            | Self::PublishServiceReply => Direction::Publish,
        }
    }

    /// Everything except bare property traffic carries an identifier.
    pub fn requires_identifier(self) -> bool {
        self.kind() != MessageKind::Property
    }
}

impl fmt::Display for TopicRole {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        fmt::Debug::fmt(self, f)
    }
}

// ---------------------------------------------------------------------------
// AddressingMode
// ---------------------------------------------------------------------------

/// Selects the template family (and wire-format generation).
#[derive(
    Debug, Clone, Copy, PartialEq, Eq, Hash, Default, Serialize, Deserialize,
)]
#[serde(rename_all = "lowercase")]
pub enum AddressingMode {
    /// Application traffic goes through an edge-side broker using
    /// application-scoped topics.
    Proxied,
    /// Model/device-scoped topics with no intermediary.
    #[default]
    Direct,
}

impl AddressingMode {
    /// The template for `role`, or `None` if the mode has no such role.
    fn template(self, role: TopicRole) -> Option<Template> {
        use Noun::{Event, Property, Service};
        use Root::{Edge, Sys};
        use TopicRole::*;
        use Verb::{Call, CallReply, Control, Post};

        let (root, noun, verb) = match self {
            Self::Proxied => match role {
                SubscribeProperty => (Edge, Property, Post),
                PublishProperty => (Edge, Property, Control),
                SubscribeEvent => (Edge, Event, Post),
                PublishEvent => (Edge, Event, Control),
                PublishService => (Edge, Service, Call),
                SubscribeService => (Sys, Service, Call),
                PublishServiceReply => (Sys, Service, CallReply),
                SubscribeServiceReply => return None,
            },
            Self::Direct => match role {
                SubscribeProperty | PublishProperty => (Sys, Property, Post),
                SubscribeEvent | PublishEvent => (Sys, Event, Post),
                SubscribeService | PublishService => (Sys, Service, Call),
                SubscribeServiceReply | PublishServiceReply => {
                    (Sys, Service, CallReply)
                }
            },
        };
        Some(Template { root, noun, verb })
    }

    /// Returns `true` if `role` has a template in this mode.
    pub fn supports(self, role: TopicRole) -> bool {
        self.template(role).is_some()
    }
}

impl fmt::Display for AddressingMode {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Proxied => f.write_str("proxied"),
            Self::Direct => f.write_str("direct"),
        }
    }
}

impl FromStr for AddressingMode {
    type Err = ProtocolError;

    /// Accepts `proxy`/`proxied` and `direct`/`normal` (any case).
    /// An empty string selects the default, [`AddressingMode::Direct`].
    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.trim().to_ascii_lowercase().as_str() {
            "proxy" | "proxied" => Ok(Self::Proxied),
            "" | "direct" | "normal" => Ok(Self::Direct),
            other => Err(ProtocolError::InvalidArgument(format!(
                "unknown addressing mode {other:?}"
            ))),
        }
    }
}

// ---------------------------------------------------------------------------
// Templates
// ---------------------------------------------------------------------------

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum Root {
    Edge,
    Sys,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum Noun {
    Property,
    Event,
    Service,
}

impl Noun {
    fn as_str(self) -> &'static str {
        match self {
            Self::Property => "property",
            Self::Event => "event",
            Self::Service => "service",
        }
    }

    fn parse(s: &str) -> Option<Self> {
        match s {
            "property" => Some(Self::Property),
            "event" => Some(Self::Event),
            "service" => Some(Self::Service),
            _ => None,
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum Verb {
    Post,
    Control,
    Call,
    CallReply,
}

impl Verb {
    fn as_str(self) -> &'static str {
        match self {
            Self::Post => "post",
            Self::Control => "control",
            Self::Call => "call",
            Self::CallReply => "call_reply",
        }
    }

    fn parse(s: &str) -> Option<Self> {
        match s {
            "post" => Some(Self::Post),
            "control" => Some(Self::Control),
            "call" => Some(Self::Call),
            "call_reply" => Some(Self::CallReply),
            _ => None,
        }
    }
}

/// Slot value of every property topic.
const PROPERTY_SLOT: &str = "base";

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
struct Template {
    root: Root,
    noun: Noun,
    verb: Verb,
}

// ---------------------------------------------------------------------------
// Build
// ---------------------------------------------------------------------------

/// The values substituted into a template.
///
/// Edge-rooted templates read only `application_id`; sys-rooted ones read
/// `model_id` and `device_id`. `identifier` is ignored for property roles.
#[derive(Debug, Clone, Copy)]
pub struct TopicParams<'a> {
    pub application_id: &'a str,
    pub model_id: &'a str,
    pub device_id: &'a str,
    pub identifier: &'a str,
}

/// Builds the topic for `role` in `mode`.
///
/// For inbound roles any substituted value may be an MQTT wildcard (`+`,
/// `#`); it is placed verbatim to form a subscription filter. Outbound
/// topics must be concrete.
///
/// # Errors
/// - [`ProtocolError::UnsupportedRole`] if the mode has no template.
/// - [`ProtocolError::InvalidArgument`] if a required value is empty,
///   contains `/`, or is a wildcard in an outbound topic.
pub fn build(
    mode: AddressingMode,
    role: TopicRole,
    params: &TopicParams<'_>,
) -> Result<String, ProtocolError> {
    let template = mode
        .template(role)
        .ok_or(ProtocolError::UnsupportedRole { role, mode })?;
    let direction = role.direction();

    let slot = if template.noun == Noun::Property {
        PROPERTY_SLOT
    } else {
        check_value(role, "identifier", params.identifier, direction)?
    };
    let noun = template.noun.as_str();
    let verb = template.verb.as_str();

    let topic = match template.root {
        Root::Edge => {
            let app = check_value(
                role,
                "application id",
                params.application_id,
                direction,
            )?;
            format!("/edge/{app}/thing/{noun}/{slot}/{verb}")
        }
        Root::Sys => {
            let model =
                check_value(role, "model id", params.model_id, direction)?;
            let device =
                check_value(role, "device id", params.device_id, direction)?;
            format!("/sys/{model}/{device}/thing/{noun}/{slot}/{verb}")
        }
    };
    Ok(topic)
}

fn check_value<'a>(
    role: TopicRole,
    name: &str,
    value: &'a str,
    direction: Direction,
) -> Result<&'a str, ProtocolError> {
    if value.is_empty() {
        return Err(ProtocolError::InvalidArgument(format!(
            "{role} requires a non-empty {name}"
        )));
    }
    if value.contains('/') {
        return Err(ProtocolError::InvalidArgument(format!(
            "{name} {value:?} must not contain '/'"
        )));
    }
    if direction == Direction::Publish && value.contains(['+', '#']) {
        return Err(ProtocolError::InvalidArgument(format!(
            "{name} {value:?} is a wildcard, not allowed in {role} topics"
        )));
    }
    Ok(value)
}

// ---------------------------------------------------------------------------
// Parse
// ---------------------------------------------------------------------------

/// Who a parsed topic addresses.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum TopicScope {
    /// An edge-rooted topic.
    Application { application_id: String },
    /// A sys-rooted topic.
    Device { model_id: String, device_id: String },
}

/// The result of [`parse`].
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ParsedTopic {
    pub role: TopicRole,
    pub scope: TopicScope,
    /// `None` for property topics.
    pub identifier: Option<String>,
}

/// Parses a topic under `mode`'s grammar.
///
/// Strict: the segment count, every literal segment, and every variable
/// segment are verified. Nothing partial is ever returned.
///
/// # Errors
/// Returns [`ProtocolError::InvalidTopic`] on any mismatch.
pub fn parse(
    mode: AddressingMode,
    topic: &str,
) -> Result<ParsedTopic, ProtocolError> {
    let invalid = |why: &str| {
        ProtocolError::InvalidTopic(format!("{topic:?}: {why}"))
    };

    let segments: Vec<&str> = topic.split('/').collect();
    let (root, scope, noun, slot, verb) = match segments.as_slice() {
        ["", "edge", app, "thing", noun, slot, verb] => {
            if app.is_empty() {
                return Err(invalid("empty application id"));
            }
            let scope = TopicScope::Application {
                application_id: (*app).to_string(),
            };
            (Root::Edge, scope, *noun, *slot, *verb)
        }
        ["", "sys", model, device, "thing", noun, slot, verb] => {
            if model.is_empty() || device.is_empty() {
                return Err(invalid("empty model or device id"));
            }
            let scope = TopicScope::Device {
                model_id: (*model).to_string(),
                device_id: (*device).to_string(),
            };
            (Root::Sys, scope, *noun, *slot, *verb)
        }
        _ => return Err(invalid("unrecognized layout")),
    };

    let noun = Noun::parse(noun).ok_or_else(|| invalid("unknown noun"))?;
    let verb = Verb::parse(verb).ok_or_else(|| invalid("unknown verb"))?;

    let identifier = match noun {
        Noun::Property if slot == PROPERTY_SLOT => None,
        Noun::Property => return Err(invalid("property slot must be base")),
        _ if slot.is_empty() => return Err(invalid("empty identifier")),
        _ => Some(slot.to_string()),
    };

    let template = Template { root, noun, verb };
    let role = TopicRole::ALL
        .into_iter()
        .find(|role| mode.template(*role) == Some(template))
        .ok_or_else(|| invalid("no role matches in this mode"))?;

    Ok(ParsedTopic {
        role,
        scope,
        identifier,
    })
}
