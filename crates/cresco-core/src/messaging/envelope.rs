//! Message envelope sent over the control-plane socket.
//!
//! ```text
//! {
//!   "message_info": {
//!     "message_type": "global_agent_msgevent",
//!     "message_event_type": "EXEC",
//!     "dst_region": "...",
//!     "dst_agent": "...",
//!     "is_rpc": true
//!   },
//!   "message_payload": { "action": "...", ... }
//! }
//! ```
//!
//! The message type decides which `dst_*` fields are present:
//!
//! | message_type                 | destination fields                  |
//! |------------------------------|-------------------------------------|
//! | `global_controller_msgevent` | none                                |
//! | `global_agent_msgevent`      | dst_region, dst_agent               |
//! | `plugin_msgevent`            | dst_plugin                          |
//! | `global_plugin_msgevent`     | dst_region, dst_agent, dst_plugin   |

use super::payload::Payload;
use crate::error::{CrescoError, Result};
use serde::ser::SerializeMap;
use serde::{Deserialize, Serialize, Serializer};
use serde_json::Value;

const DST_REGION: &str = "dst_region";
const DST_AGENT: &str = "dst_agent";
const DST_PLUGIN: &str = "dst_plugin";

/// The four logical message types.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum MessageType {
    #[serde(rename = "global_controller_msgevent")]
    GlobalController,
    #[serde(rename = "global_agent_msgevent")]
    GlobalAgent,
    #[serde(rename = "plugin_msgevent")]
    Plugin,
    #[serde(rename = "global_plugin_msgevent")]
    GlobalPlugin,
}

impl MessageType {
    pub fn as_str(&self) -> &'static str {
        match self {
            MessageType::GlobalController => "global_controller_msgevent",
            MessageType::GlobalAgent => "global_agent_msgevent",
            MessageType::Plugin => "plugin_msgevent",
            MessageType::GlobalPlugin => "global_plugin_msgevent",
        }
    }

    /// Parse the wire name of a message type.
    pub fn parse(name: &str) -> Option<Self> {
        match name {
            "global_controller_msgevent" => Some(MessageType::GlobalController),
            "global_agent_msgevent" => Some(MessageType::GlobalAgent),
            "plugin_msgevent" => Some(MessageType::Plugin),
            "global_plugin_msgevent" => Some(MessageType::GlobalPlugin),
            _ => None,
        }
    }

    /// Destination fields this message type requires, in wire order.
    pub fn destination_fields(&self) -> &'static [&'static str] {
        match self {
            MessageType::GlobalController => &[],
            MessageType::GlobalAgent => &[DST_REGION, DST_AGENT],
            MessageType::Plugin => &[DST_PLUGIN],
            MessageType::GlobalPlugin => &[DST_REGION, DST_AGENT, DST_PLUGIN],
        }
    }
}

impl std::fmt::Display for MessageType {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Remote entity a message is addressed to.
///
/// Built through the validating constructors, so every field is non-empty.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Destination {
    Controller,
    Agent {
        region: String,
        agent: String,
    },
    Plugin {
        plugin: String,
    },
    PluginAt {
        region: String,
        agent: String,
        plugin: String,
    },
}

impl Destination {
    pub fn controller() -> Self {
        Destination::Controller
    }

    pub fn agent(region: impl Into<String>, agent: impl Into<String>) -> Result<Self> {
        Ok(Destination::Agent {
            region: require(DST_REGION, region)?,
            agent: require(DST_AGENT, agent)?,
        })
    }

    /// A plugin on the agent this client is attached to.
    pub fn plugin(plugin: impl Into<String>) -> Result<Self> {
        Ok(Destination::Plugin {
            plugin: require(DST_PLUGIN, plugin)?,
        })
    }

    pub fn plugin_at(
        region: impl Into<String>,
        agent: impl Into<String>,
        plugin: impl Into<String>,
    ) -> Result<Self> {
        Ok(Destination::PluginAt {
            region: require(DST_REGION, region)?,
            agent: require(DST_AGENT, agent)?,
            plugin: require(DST_PLUGIN, plugin)?,
        })
    }

    pub fn message_type(&self) -> MessageType {
        match self {
            Destination::Controller => MessageType::GlobalController,
            Destination::Agent { .. } => MessageType::GlobalAgent,
            Destination::Plugin { .. } => MessageType::Plugin,
            Destination::PluginAt { .. } => MessageType::GlobalPlugin,
        }
    }

    /// Destination fields as `(wire name, value)` pairs.
    pub fn fields(&self) -> Vec<(&'static str, &str)> {
        match self {
            Destination::Controller => Vec::new(),
            Destination::Agent { region, agent } => {
                vec![(DST_REGION, region.as_str()), (DST_AGENT, agent.as_str())]
            }
            Destination::Plugin { plugin } => vec![(DST_PLUGIN, plugin.as_str())],
            Destination::PluginAt {
                region,
                agent,
                plugin,
            } => vec![
                (DST_REGION, region.as_str()),
                (DST_AGENT, agent.as_str()),
                (DST_PLUGIN, plugin.as_str()),
            ],
        }
    }
}

impl std::fmt::Display for Destination {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            Destination::Controller => write!(f, "controller"),
            Destination::Agent { region, agent } => write!(f, "{}/{}", region, agent),
            Destination::Plugin { plugin } => write!(f, "plugin {}", plugin),
            Destination::PluginAt {
                region,
                agent,
                plugin,
            } => write!(f, "{}/{}/{}", region, agent, plugin),
        }
    }
}

fn require(field: &str, value: impl Into<String>) -> Result<String> {
    let value = value.into();
    if value.trim().is_empty() {
        return Err(CrescoError::invalid_destination(field, "must not be empty"));
    }
    Ok(value)
}

/// Routing metadata of an envelope.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct MessageInfo {
    destination: Destination,
    event_type: String,
    is_rpc: bool,
}

impl MessageInfo {
    pub fn new(destination: Destination, event_type: impl Into<String>, is_rpc: bool) -> Result<Self> {
        let event_type = event_type.into();
        if event_type.trim().is_empty() {
            return Err(CrescoError::InvalidEnvelope {
                message: "message_event_type must not be empty".to_string(),
            });
        }
        Ok(Self {
            destination,
            event_type,
            is_rpc,
        })
    }

    pub fn message_type(&self) -> MessageType {
        self.destination.message_type()
    }

    pub fn destination(&self) -> &Destination {
        &self.destination
    }

    pub fn event_type(&self) -> &str {
        &self.event_type
    }

    pub fn is_rpc(&self) -> bool {
        self.is_rpc
    }

    /// Parse and validate a `message_info` object.
    ///
    /// The destination fields must match the message type exactly; missing,
    /// extra and unknown keys are rejected.
    pub fn from_value(value: &Value) -> Result<Self> {
        let object = value.as_object().ok_or_else(|| invalid("message_info is not an object"))?;

        let message_type = object
            .get("message_type")
            .and_then(Value::as_str)
            .and_then(MessageType::parse)
            .ok_or_else(|| invalid("missing or unknown message_type"))?;

        let allowed = message_type.destination_fields();
        for key in object.keys() {
            let known = matches!(key.as_str(), "message_type" | "message_event_type" | "is_rpc")
                || allowed.contains(&key.as_str());
            if !known {
                return Err(invalid(format!("unexpected field {} for {}", key, message_type)));
            }
        }

        let field = |name: &str| -> Result<String> {
            object
                .get(name)
                .and_then(Value::as_str)
                .map(str::to_string)
                .ok_or_else(|| invalid(format!("{} requires {}", message_type, name)))
        };

        let destination = match message_type {
            MessageType::GlobalController => Destination::controller(),
            MessageType::GlobalAgent => Destination::agent(field(DST_REGION)?, field(DST_AGENT)?)?,
            MessageType::Plugin => Destination::plugin(field(DST_PLUGIN)?)?,
            MessageType::GlobalPlugin => Destination::plugin_at(
                field(DST_REGION)?,
                field(DST_AGENT)?,
                field(DST_PLUGIN)?,
            )?,
        };

        let is_rpc = object
            .get("is_rpc")
            .and_then(Value::as_bool)
            .ok_or_else(|| invalid("missing is_rpc"))?;

        Self::new(destination, field("message_event_type")?, is_rpc)
    }
}

impl Serialize for MessageInfo {
    fn serialize<S: Serializer>(&self, serializer: S) -> std::result::Result<S::Ok, S::Error> {
        let fields = self.destination.fields();
        let mut map = serializer.serialize_map(Some(3 + fields.len()))?;
        map.serialize_entry("message_type", self.message_type().as_str())?;
        map.serialize_entry("message_event_type", &self.event_type)?;
        for (name, value) in fields {
            map.serialize_entry(name, value)?;
        }
        map.serialize_entry("is_rpc", &self.is_rpc)?;
        map.end()
    }
}

fn invalid(message: impl Into<String>) -> CrescoError {
    CrescoError::InvalidEnvelope {
        message: message.into(),
    }
}

/// A complete message: routing metadata plus payload.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct Envelope {
    message_info: MessageInfo,
    message_payload: Payload,
}

impl Envelope {
    pub fn new(info: MessageInfo, payload: Payload) -> Self {
        Self {
            message_info: info,
            message_payload: payload,
        }
    }

    pub fn info(&self) -> &MessageInfo {
        &self.message_info
    }

    pub fn payload(&self) -> &Payload {
        &self.message_payload
    }

    pub fn to_json(&self) -> Result<String> {
        Ok(serde_json::to_string(self)?)
    }

    /// Parse and validate a serialized envelope.
    pub fn from_json(raw: &str) -> Result<Self> {
        let value: Value = serde_json::from_str(raw)?;
        let info = value
            .get("message_info")
            .ok_or_else(|| invalid("missing message_info"))
            .and_then(MessageInfo::from_value)?;
        let payload = value
            .get("message_payload")
            .cloned()
            .ok_or_else(|| invalid("missing message_payload"))
            .and_then(Payload::try_from)?;
        Ok(Self::new(info, payload))
    }
}
