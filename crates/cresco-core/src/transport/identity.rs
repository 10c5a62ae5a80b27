//! Connection identity resolved during the websocket handshake.

use crate::config::ConnectionConfig;
use serde::Serialize;
use tokio_tungstenite::tungstenite::http::HeaderMap;
use tracing::warn;

/// Region, agent and plugin names of the endpoint we are attached to.
///
/// Resolved once per connect and immutable afterwards.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize)]
pub struct ConnectionIdentity {
    pub region: String,
    pub agent: String,
    pub plugin: String,
}

impl ConnectionIdentity {
    pub fn new(
        region: impl Into<String>,
        agent: impl Into<String>,
        plugin: impl Into<String>,
    ) -> Self {
        Self {
            region: region.into(),
            agent: agent.into(),
            plugin: plugin.into(),
        }
    }

    /// Read the identity headers from a handshake response.
    ///
    /// Missing headers leave the field empty; see [`Self::is_resolved`].
    pub(crate) fn from_headers(headers: &HeaderMap) -> Self {
        let read = |name: &str| {
            headers
                .get(name)
                .and_then(|value| value.to_str().ok())
                .map(|value| value.trim().to_string())
                .unwrap_or_default()
        };

        let identity = Self {
            region: read(ConnectionConfig::REGION_HEADER),
            agent: read(ConnectionConfig::AGENT_HEADER),
            plugin: read(ConnectionConfig::PLUGIN_HEADER),
        };

        if !identity.is_resolved() {
            warn!("Handshake did not carry a complete identity: {}", identity);
        }
        identity
    }

    /// True when region, agent and plugin are all known.
    pub fn is_resolved(&self) -> bool {
        !self.region.is_empty() && !self.agent.is_empty() && !self.plugin.is_empty()
    }
}

impl std::fmt::Display for ConnectionIdentity {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}/{}/{}", self.region, self.agent, self.plugin)
    }
}
