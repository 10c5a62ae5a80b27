//! Cresco Core - Client library for the Cresco control plane.
//!
//! A [`CrescoClient`] holds one websocket to a Cresco agent and lets ordinary
//! threads make blocking calls against the global controller, agents and
//! plugins through the [`Messaging`] facade. The socket is owned by a
//! background event loop; callers never block on it directly, and every call
//! is bounded by a timeout.
//!
//! Side-channel streams (data plane, log stream) are created through the
//! client and closed with it.
//!
//! # Example
//!
//! ```rust,ignore
//! use cresco_core::messaging::Payload;
//! use cresco_core::CrescoClient;
//!
//! fn main() -> cresco_core::Result<()> {
//!     let client = CrescoClient::new("localhost", 8282, "service-key")?;
//!     let session = client.connection()?;
//!
//!     let reply = session.messaging().to_controller(
//!         true,
//!         "EXEC",
//!         Payload::for_action("listregions"),
//!         None,
//!     )?;
//!     println!("{}", reply.body());
//!
//!     Ok(())
//! }
//! ```

pub mod codec;
pub mod config;
pub mod error;
pub mod event_loop;
pub mod messaging;
pub mod streams;
pub mod transport;

mod api;

// Re-export commonly used types
pub use api::{ConnectionGuard, CrescoClientBuilder, GlobalInfo};
pub use codec::{compress_param, decompress_param};
pub use config::{ClientConfig, TlsMode};
pub use error::{CrescoError, Result};
pub use event_loop::EventLoop;
pub use messaging::{Destination, Messaging, Outcome, Payload, Reply};
pub use streams::{DataPlane, LogLevel, LogStreamer, SideChannel, StreamCallbacks, Subscription};
pub use transport::{ConnectionIdentity, TransportHandle};

use parking_lot::{Mutex, RwLock};
use std::sync::Arc;

/// Main entry point for talking to a Cresco agent.
///
/// The client is `Sync`: share it across threads behind an `Arc` and call the
/// facade concurrently.
pub struct CrescoClient {
    config: ClientConfig,
    /// Carrier thread owning the RPC socket
    event_loop: Arc<EventLoop>,
    transport: TransportHandle,
    messaging: Messaging,
    global_info: RwLock<Option<GlobalInfo>>,
    /// Streams created through this client, closed on `close()`
    streams: Mutex<Vec<Arc<dyn SideChannel>>>,
}

impl CrescoClient {
    /// Create a client with default settings. Does not connect.
    pub fn new(host: impl Into<String>, port: u16, service_key: impl Into<String>) -> Result<Self> {
        Self::builder(host, port, service_key).build()
    }

    /// Create a builder for non-default settings.
    pub fn builder(
        host: impl Into<String>,
        port: u16,
        service_key: impl Into<String>,
    ) -> CrescoClientBuilder {
        CrescoClientBuilder::new(host, port, service_key)
    }

    pub fn config(&self) -> &ClientConfig {
        &self.config
    }

    /// The synchronous messaging facade.
    pub fn messaging(&self) -> &Messaging {
        &self.messaging
    }

    pub fn transport(&self) -> &TransportHandle {
        &self.transport
    }

    /// Identity of the agent we are attached to, once connected.
    pub fn identity(&self) -> Option<ConnectionIdentity> {
        self.transport.identity()
    }

    pub fn api_region_name(&self) -> Option<String> {
        self.identity().map(|identity| identity.region)
    }

    pub fn api_agent_name(&self) -> Option<String> {
        self.identity().map(|identity| identity.agent)
    }

    pub fn api_plugin_name(&self) -> Option<String> {
        self.identity().map(|identity| identity.plugin)
    }
}

impl std::fmt::Debug for CrescoClient {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("CrescoClient")
            .field("host", &self.config.host)
            .field("port", &self.config.port)
            .field("tls", &self.config.tls)
            .field("messaging", &self.messaging)
            .field("streams", &self.streams.lock().len())
            .finish()
    }
}
