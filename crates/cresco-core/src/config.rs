//! Centralized configuration for the Cresco client.
//!
//! Protocol constants live on associated-constant structs; per-client settings
//! live on [`ClientConfig`].

use crate::error::{CrescoError, Result};
use std::time::Duration;
use url::Url;

/// Control-plane connection constants.
pub struct ConnectionConfig;

impl ConnectionConfig {
    /// Default bound for a single facade call.
    pub const DEFAULT_RPC_TIMEOUT: Duration = Duration::from_secs(8);
    pub const CONNECT_TIMEOUT: Duration = Duration::from_secs(10);
    pub const CLOSE_TIMEOUT: Duration = Duration::from_secs(2);

    pub const API_SOCKET_PATH: &'static str = "/api/apisocket";
    pub const SERVICE_KEY_HEADER: &'static str = "cresco_service_key";

    // Identity headers returned by the handshake response
    pub const REGION_HEADER: &'static str = "cresco_region";
    pub const AGENT_HEADER: &'static str = "cresco_agent";
    pub const PLUGIN_HEADER: &'static str = "cresco_plugin";

    /// Characters of a malformed reply kept in the error log.
    pub const REPLY_PREVIEW_CHARS: usize = 200;
}

/// Side-channel stream constants.
pub struct StreamConfig;

impl StreamConfig {
    pub const DATAPLANE_PATH: &'static str = "/api/dataplane";
    pub const LOGSTREAMER_PATH: &'static str = "/api/logstreamer";
    pub const SEND_TIMEOUT: Duration = Duration::from_secs(8);
    pub const DEFAULT_LOG_CLASS: &'static str = "default";
}

/// How the websocket endpoint is secured.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum TlsMode {
    /// Plain `ws://`, no TLS.
    Plain,
    /// `wss://` with certificate and hostname verification.
    Verified,
    /// `wss://` accepting any certificate.
    #[default]
    Unverified,
}

impl TlsMode {
    pub fn scheme(&self) -> &'static str {
        match self {
            TlsMode::Plain => "ws",
            TlsMode::Verified | TlsMode::Unverified => "wss",
        }
    }
}

/// Per-client connection settings.
#[derive(Debug, Clone)]
pub struct ClientConfig {
    pub host: String,
    pub port: u16,
    pub service_key: String,
    pub tls: TlsMode,
    /// Default timeout for facade calls that don't pass one.
    pub rpc_timeout: Duration,
    pub connect_timeout: Duration,
    /// Bound on a side-channel write being accepted.
    pub stream_timeout: Duration,
}

impl ClientConfig {
    pub fn new(host: impl Into<String>, port: u16, service_key: impl Into<String>) -> Self {
        Self {
            host: host.into(),
            port,
            service_key: service_key.into(),
            tls: TlsMode::default(),
            rpc_timeout: ConnectionConfig::DEFAULT_RPC_TIMEOUT,
            connect_timeout: ConnectionConfig::CONNECT_TIMEOUT,
            stream_timeout: StreamConfig::SEND_TIMEOUT,
        }
    }

    pub fn with_tls(mut self, tls: TlsMode) -> Self {
        self.tls = tls;
        self
    }

    pub fn with_rpc_timeout(mut self, timeout: Duration) -> Self {
        self.rpc_timeout = timeout;
        self
    }

    pub fn with_connect_timeout(mut self, timeout: Duration) -> Self {
        self.connect_timeout = timeout;
        self
    }

    pub fn with_stream_timeout(mut self, timeout: Duration) -> Self {
        self.stream_timeout = timeout;
        self
    }

    /// Check the settings before any connection attempt.
    pub fn validate(&self) -> Result<()> {
        if self.host.trim().is_empty() {
            return Err(CrescoError::Config {
                message: "host must not be empty".to_string(),
            });
        }
        if self.port == 0 {
            return Err(CrescoError::Config {
                message: "port must not be zero".to_string(),
            });
        }
        if self.rpc_timeout.is_zero() || self.connect_timeout.is_zero() {
            return Err(CrescoError::Config {
                message: "timeouts must be non-zero".to_string(),
            });
        }
        Ok(())
    }

    /// URL of the main RPC socket.
    pub fn api_url(&self) -> Result<Url> {
        self.endpoint(ConnectionConfig::API_SOCKET_PATH)
    }

    /// URL for an endpoint path on the same host.
    pub fn endpoint(&self, path: &str) -> Result<Url> {
        let raw = format!("{}://{}:{}{}", self.tls.scheme(), self.host, self.port, path);
        Url::parse(&raw).map_err(|e| CrescoError::Config {
            message: format!("Invalid endpoint {}: {}", raw, e),
        })
    }
}
