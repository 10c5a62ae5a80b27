//! Connect and teardown.

use std::ops::Deref;
use tracing::{info, warn};

use crate::error::{CrescoError, Result};
use crate::CrescoClient;

impl CrescoClient {
    /// Connect to the RPC socket and resolve the connection identity.
    ///
    /// Clears the failure latch first, so a successful reconnect restores
    /// normal calls. Any previous connection is replaced.
    pub fn connect(&self) -> Result<()> {
        self.messaging.reset();
        *self.global_info.write() = None;

        let url = self.config.api_url()?;
        self.transport.connect(
            &url,
            &self.config.service_key,
            self.config.tls,
            self.config.connect_timeout,
        )?;

        if !self.transport.connected() {
            warn!("Connection reported success but verification failed");
            return Err(CrescoError::connection(format!(
                "Connection to {} dropped during setup",
                url
            )));
        }

        info!("Connection verified successfully");
        Ok(())
    }

    /// Non-blocking liveness check of the RPC socket.
    pub fn connected(&self) -> bool {
        self.transport.connected()
    }

    /// Close every tracked stream, then the RPC socket. Idempotent.
    pub fn close(&self) {
        let streams = std::mem::take(&mut *self.streams.lock());
        if !streams.is_empty() {
            info!("Closing {} tracked streams", streams.len());
        }
        for stream in streams {
            stream.close();
        }

        self.transport.close();
    }

    /// Connect and return a guard that closes the client when dropped.
    pub fn connection(&self) -> Result<ConnectionGuard<'_>> {
        self.connect()?;
        Ok(ConnectionGuard { client: self })
    }
}

impl Drop for CrescoClient {
    fn drop(&mut self) {
        self.close();
        self.event_loop.shutdown();
    }
}

/// Scoped connection returned by [`CrescoClient::connection`].
#[must_use = "the connection is closed as soon as the guard is dropped"]
pub struct ConnectionGuard<'a> {
    client: &'a CrescoClient,
}

impl Deref for ConnectionGuard<'_> {
    type Target = CrescoClient;

    fn deref(&self) -> &CrescoClient {
        self.client
    }
}

impl Drop for ConnectionGuard<'_> {
    fn drop(&mut self) {
        self.client.close();
    }
}
