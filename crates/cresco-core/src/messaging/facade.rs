//! Synchronous messaging facade.
//!
//! [`Messaging`] lets ordinary threads make blocking calls against the
//! control plane. Each call builds an envelope, hands it to the
//! [`TransportHandle`] and waits at most `timeout` for the outcome.
//!
//! # Failure handling
//!
//! - Bad destinations and envelopes are returned as errors before any I/O.
//! - Transport failures trip the [`ConnectionLatch`] and come back as an
//!   empty [`Reply`] tagged with the failure.
//! - Once the latch is set every call returns [`Outcome::Suppressed`]
//!   immediately, without touching the transport, until [`Messaging::reset`].
//!
//! # Ordering
//!
//! A reentrant lock is held from envelope construction until the outcome is
//! known, so calls through one facade are sent in order and each reply goes
//! to the caller that sent the request.

use super::envelope::{Destination, Envelope, MessageInfo};
use super::latch::ConnectionLatch;
use super::payload::Payload;
use super::reply::{Outcome, Reply};
use crate::config::ConnectionConfig;
use crate::error::Result;
use crate::transport::TransportHandle;
use parking_lot::ReentrantMutex;
use std::time::Duration;
use tracing::{debug, error, info, warn};

pub struct Messaging {
    transport: TransportHandle,
    latch: ConnectionLatch,
    lock: ReentrantMutex<()>,
    default_timeout: Duration,
}

impl Messaging {
    pub fn new(transport: TransportHandle) -> Self {
        Self::with_timeout(transport, ConnectionConfig::DEFAULT_RPC_TIMEOUT)
    }

    /// Create a facade whose calls default to `timeout`.
    pub fn with_timeout(transport: TransportHandle, timeout: Duration) -> Self {
        Self {
            transport,
            latch: ConnectionLatch::new(),
            lock: ReentrantMutex::new(()),
            default_timeout: timeout,
        }
    }

    pub fn transport(&self) -> &TransportHandle {
        &self.transport
    }

    pub fn default_timeout(&self) -> Duration {
        self.default_timeout
    }

    /// Send to the global controller.
    pub fn to_controller(
        &self,
        is_rpc: bool,
        event_type: &str,
        payload: Payload,
        timeout: Option<Duration>,
    ) -> Result<Reply> {
        self.send(Destination::controller(), is_rpc, event_type, payload, timeout)
    }

    /// Send to an agent.
    pub fn to_agent(
        &self,
        is_rpc: bool,
        event_type: &str,
        payload: Payload,
        dst_region: &str,
        dst_agent: &str,
        timeout: Option<Duration>,
    ) -> Result<Reply> {
        let destination = Destination::agent(dst_region, dst_agent)?;
        self.send(destination, is_rpc, event_type, payload, timeout)
    }

    /// Send to a plugin on the agent this client is attached to.
    pub fn to_plugin_by_name(
        &self,
        is_rpc: bool,
        event_type: &str,
        payload: Payload,
        plugin_name: &str,
        timeout: Option<Duration>,
    ) -> Result<Reply> {
        let destination = Destination::plugin(plugin_name)?;
        self.send(destination, is_rpc, event_type, payload, timeout)
    }

    /// Send to a plugin on a specific agent.
    #[allow(clippy::too_many_arguments)]
    pub fn to_plugin_at(
        &self,
        is_rpc: bool,
        event_type: &str,
        payload: Payload,
        dst_region: &str,
        dst_agent: &str,
        dst_plugin: &str,
        timeout: Option<Duration>,
    ) -> Result<Reply> {
        let destination = Destination::plugin_at(dst_region, dst_agent, dst_plugin)?;
        self.send(destination, is_rpc, event_type, payload, timeout)
    }

    /// Send to any destination.
    ///
    /// Only caller errors are returned as `Err`; every transport outcome is a
    /// [`Reply`].
    pub fn send(
        &self,
        destination: Destination,
        is_rpc: bool,
        event_type: &str,
        payload: Payload,
        timeout: Option<Duration>,
    ) -> Result<Reply> {
        let info = MessageInfo::new(destination, event_type, is_rpc)?;

        if self.latch.is_tripped() {
            return Ok(self.suppress(&info));
        }

        let timeout = timeout.unwrap_or(self.default_timeout);
        let _guard = self.lock.lock();

        // The call holding the lock before us may have tripped the latch
        if self.latch.is_tripped() {
            return Ok(self.suppress(&info));
        }

        info!(
            "Sending {}/{} to {} (RPC: {})",
            info.message_type(),
            info.event_type(),
            info.destination(),
            is_rpc
        );
        if let Some(action) = payload.action() {
            info!("Action: {}", action);
        }

        let envelope = Envelope::new(info, payload);
        let json = envelope.to_json()?;

        if is_rpc {
            match self.transport.send(json, timeout) {
                Ok(raw) => {
                    debug!("Received reply of {} bytes", raw.len());
                    let reply = Reply::parse(&raw);
                    if let Some(code) = reply.status_code() {
                        info!("Reply status code: {}", code);
                    }
                    Ok(reply)
                }
                Err(e) if e.is_caller_error() => Err(e),
                Err(e) => {
                    error!(
                        "{}/{} failed: {}",
                        envelope.info().message_type(),
                        envelope.info().event_type(),
                        e
                    );
                    self.latch.trip(&e);
                    Ok(Reply::from_failure(&e))
                }
            }
        } else {
            match self.transport.send_async(json, timeout) {
                Ok(()) => Ok(Reply::dispatched()),
                Err(e) if e.is_caller_error() => Err(e),
                Err(e) => {
                    error!(
                        "Dispatch of {}/{} failed: {}",
                        envelope.info().message_type(),
                        envelope.info().event_type(),
                        e
                    );
                    self.latch.trip(&e);
                    Ok(Reply::from_failure(&e))
                }
            }
        }
    }

    fn suppress(&self, info: &MessageInfo) -> Reply {
        warn!(
            "Connection marked as failed, skipping {}/{} to {}",
            info.message_type(),
            info.event_type(),
            info.destination()
        );
        Reply::suppressed()
    }

    /// Clear the failure latch.
    ///
    /// Reconnect the transport first; resetting over a dead link only trips
    /// the latch again on the next call.
    pub fn reset(&self) {
        self.latch.reset();
    }

    /// True once a transport failure has tripped the latch.
    pub fn is_failed(&self) -> bool {
        self.latch.is_tripped()
    }

    pub fn latch(&self) -> &ConnectionLatch {
        &self.latch
    }
}

impl std::fmt::Debug for Messaging {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Messaging")
            .field("transport", &self.transport)
            .field("failed", &self.is_failed())
            .field("default_timeout", &self.default_timeout)
            .finish()
    }
}
