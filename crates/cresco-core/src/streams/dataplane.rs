//! Data-plane stream.
//!
//! After the handshake the subscription is sent as the first text frame;
//! from then on the server pushes matching messages to the callbacks.

use super::callbacks::StreamCallbacks;
use super::channel::{ChannelSettings, StreamChannel};
use super::SideChannel;
use crate::config::{ClientConfig, StreamConfig};
use crate::error::{CrescoError, Result};
use serde_json::{Map, Value};

/// What a data-plane stream listens to.
#[derive(Debug, Clone, PartialEq)]
pub enum Subscription {
    /// Message selector, e.g. `"stream_name='abc'"`.
    Filter(String),
    /// Structured identity/config, e.g. `ident_key`, `ident_id`, `io_type_key`.
    Config(Map<String, Value>),
}

impl Subscription {
    pub fn filter(expression: impl Into<String>) -> Self {
        Subscription::Filter(expression.into())
    }

    /// Build a config subscription from a JSON object.
    pub fn config(value: Value) -> Result<Self> {
        match value {
            Value::Object(map) => Ok(Subscription::Config(map)),
            _ => Err(CrescoError::Config {
                message: "data-plane config subscription must be a JSON object".to_string(),
            }),
        }
    }

    /// Text of the first frame sent on the stream.
    pub fn to_frame(&self) -> Result<String> {
        match self {
            Subscription::Filter(expression) => {
                if expression.trim().is_empty() {
                    return Err(CrescoError::Config {
                        message: "data-plane filter must not be empty".to_string(),
                    });
                }
                Ok(expression.clone())
            }
            Subscription::Config(map) => Ok(serde_json::to_string(map)?),
        }
    }
}

impl From<&str> for Subscription {
    fn from(expression: &str) -> Self {
        Subscription::filter(expression)
    }
}

impl From<String> for Subscription {
    fn from(expression: String) -> Self {
        Subscription::Filter(expression)
    }
}

pub struct DataPlane {
    channel: StreamChannel,
    subscription: Subscription,
}

impl DataPlane {
    /// Create an unconnected data-plane stream for the endpoint in `config`.
    pub fn new(
        config: &ClientConfig,
        subscription: Subscription,
        callbacks: StreamCallbacks,
    ) -> Result<Self> {
        // Reject a bad subscription before any connection attempt
        subscription.to_frame()?;

        let settings = ChannelSettings {
            name: "dataplane",
            url: config.endpoint(StreamConfig::DATAPLANE_PATH)?,
            service_key: config.service_key.clone(),
            tls: config.tls,
            connect_timeout: config.connect_timeout,
            send_timeout: config.stream_timeout,
        };

        Ok(Self {
            channel: StreamChannel::new(settings, callbacks),
            subscription,
        })
    }

    pub fn subscription(&self) -> &Subscription {
        &self.subscription
    }

    /// Open the stream and register the subscription.
    pub fn connect(&self) -> Result<()> {
        let frame = self.subscription.to_frame()?;
        self.channel.connect(Some(frame))
    }

    pub fn send(&self, text: impl Into<String>) -> Result<()> {
        self.channel.send_text(text.into())
    }

    pub fn send_binary(&self, data: impl Into<Vec<u8>>) -> Result<()> {
        self.channel.send_binary(data.into())
    }

    pub fn is_open(&self) -> bool {
        self.channel.is_open()
    }

    pub fn is_closed(&self) -> bool {
        self.channel.is_closed()
    }

    pub fn close(&self) {
        self.channel.close();
    }
}

impl SideChannel for DataPlane {
    fn kind(&self) -> &'static str {
        self.channel.name()
    }

    fn is_open(&self) -> bool {
        DataPlane::is_open(self)
    }

    fn is_closed(&self) -> bool {
        DataPlane::is_closed(self)
    }

    fn close(&self) {
        DataPlane::close(self);
    }

    fn describe(&self) -> String {
        format!("{} {}", self.channel.url(), self.subscription.to_frame().unwrap_or_default())
    }
}

impl std::fmt::Debug for DataPlane {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("DataPlane")
            .field("url", &self.channel.url().as_str())
            .field("subscription", &self.subscription)
            .field("open", &self.is_open())
            .finish()
    }
}
