//! Control-plane transport.
//!
//! A [`TransportHandle`] owns the single websocket to the control plane. The
//! socket itself lives on an [`EventLoop`](crate::EventLoop) task; the handle
//! is safe to share across threads.

mod handle;
mod identity;
pub(crate) mod socket;

pub use handle::TransportHandle;
pub use identity::ConnectionIdentity;
