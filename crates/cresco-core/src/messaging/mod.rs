//! Envelope protocol and the synchronous messaging facade.

mod envelope;
mod facade;
mod latch;
mod payload;
mod reply;

pub use envelope::{Destination, Envelope, MessageInfo, MessageType};
pub use facade::Messaging;
pub use latch::ConnectionLatch;
pub use payload::Payload;
pub use reply::{Outcome, Reply};
