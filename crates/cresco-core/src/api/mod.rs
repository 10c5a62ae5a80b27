//! CrescoClient method implementations, split by concern.

mod builder;
mod global;
mod lifecycle;
mod streams;

pub use builder::CrescoClientBuilder;
pub use global::GlobalInfo;
pub use lifecycle::ConnectionGuard;
