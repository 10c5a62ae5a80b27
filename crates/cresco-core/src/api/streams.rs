//! Side-channel stream factory methods.

use std::sync::Arc;
use tracing::debug;

use crate::error::Result;
use crate::streams::{DataPlane, LogStreamer, SideChannel, StreamCallbacks, Subscription};
use crate::CrescoClient;

impl CrescoClient {
    /// Create a data-plane stream on this client's endpoint.
    ///
    /// The stream is tracked and closed by [`CrescoClient::close`]. Call
    /// `connect()` on it to start receiving.
    pub fn get_dataplane(
        &self,
        subscription: impl Into<Subscription>,
        callbacks: StreamCallbacks,
    ) -> Result<Arc<DataPlane>> {
        let dataplane = Arc::new(DataPlane::new(&self.config, subscription.into(), callbacks)?);
        debug!("Created dataplane {:?}", dataplane.subscription());
        self.track(dataplane.clone());
        Ok(dataplane)
    }

    /// Create a log stream on this client's endpoint. Tracked like data-plane streams.
    pub fn get_logstreamer(&self, callbacks: StreamCallbacks) -> Result<Arc<LogStreamer>> {
        let streamer = Arc::new(LogStreamer::new(&self.config, callbacks)?);
        debug!("Created logstreamer");
        self.track(streamer.clone());
        Ok(streamer)
    }

    /// Track `stream`, forgetting any the caller already closed.
    fn track(&self, stream: Arc<dyn SideChannel>) {
        let mut streams = self.streams.lock();
        streams.retain(|tracked| !tracked.is_closed());
        streams.push(stream);
    }

    /// Number of streams currently tracked.
    pub fn tracked_streams(&self) -> usize {
        self.streams.lock().len()
    }
}
