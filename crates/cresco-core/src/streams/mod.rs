//! Side-channel streams.
//!
//! Streams reuse the client's endpoint and service key but run on their own
//! connection and event loop, independent of the RPC transport. Inbound
//! frames are pushed to [`StreamCallbacks`] in arrival order.

mod callbacks;
mod channel;
mod dataplane;
mod logstreamer;

pub use callbacks::StreamCallbacks;
pub use dataplane::{DataPlane, Subscription};
pub use logstreamer::{LogLevel, LogStreamer};

/// Common lifecycle of a stream tracked by the client.
pub trait SideChannel: Send + Sync {
    /// Short stream kind, e.g. `dataplane`.
    fn kind(&self) -> &'static str;

    fn is_open(&self) -> bool;

    /// True once the stream was closed for good.
    fn is_closed(&self) -> bool;

    /// Tear the stream down. Idempotent.
    fn close(&self);

    /// Human-readable endpoint description for logs.
    fn describe(&self) -> String;
}
