//! Builder for configuring CrescoClient initialization.

use parking_lot::{Mutex, RwLock};
use std::sync::Arc;
use std::time::Duration;
use tracing::info;

use crate::config::{ClientConfig, TlsMode};
use crate::error::Result;
use crate::event_loop::EventLoop;
use crate::messaging::Messaging;
use crate::transport::TransportHandle;
use crate::CrescoClient;

/// Builder for configuring CrescoClient initialization.
///
/// # Example
///
/// ```rust,ignore
/// use cresco_core::{CrescoClient, TlsMode};
/// use std::time::Duration;
///
/// let client = CrescoClient::builder("10.0.0.5", 8282, "service-key")
///     .tls(TlsMode::Verified)
///     .rpc_timeout(Duration::from_secs(30))
///     .build()?;
/// ```
pub struct CrescoClientBuilder {
    config: ClientConfig,
    loop_name: String,
}

impl CrescoClientBuilder {
    pub fn new(host: impl Into<String>, port: u16, service_key: impl Into<String>) -> Self {
        Self::from_config(ClientConfig::new(host, port, service_key))
    }

    pub fn from_config(config: ClientConfig) -> Self {
        Self {
            config,
            loop_name: "cresco-rpc".to_string(),
        }
    }

    /// Transport security.
    ///
    /// Default: [`TlsMode::Unverified`]
    pub fn tls(mut self, tls: TlsMode) -> Self {
        self.config.tls = tls;
        self
    }

    /// Timeout for facade calls made without an explicit one.
    ///
    /// Default: 8 seconds
    pub fn rpc_timeout(mut self, timeout: Duration) -> Self {
        self.config.rpc_timeout = timeout;
        self
    }

    pub fn connect_timeout(mut self, timeout: Duration) -> Self {
        self.config.connect_timeout = timeout;
        self
    }

    /// Bound on side-channel writes.
    pub fn stream_timeout(mut self, timeout: Duration) -> Self {
        self.config.stream_timeout = timeout;
        self
    }

    /// Name of the carrier thread.
    pub fn loop_name(mut self, name: impl Into<String>) -> Self {
        self.loop_name = name.into();
        self
    }

    /// Validate the settings and start the carrier thread. Does not connect.
    pub fn build(self) -> Result<CrescoClient> {
        self.config.validate()?;

        let event_loop = Arc::new(EventLoop::start(self.loop_name)?);
        let transport = TransportHandle::new(event_loop.clone());
        let messaging = Messaging::with_timeout(transport.clone(), self.config.rpc_timeout);

        info!(
            "Client initialized for {}:{}",
            self.config.host, self.config.port
        );

        Ok(CrescoClient {
            config: self.config,
            event_loop,
            transport,
            messaging,
            global_info: RwLock::new(None),
            streams: Mutex::new(Vec::new()),
        })
    }
}
