//! User callbacks for inbound side-channel frames.

use std::panic::{catch_unwind, AssertUnwindSafe};
use std::sync::Arc;
use tracing::{debug, error};

type TextCallback = Arc<dyn Fn(&str) + Send + Sync>;
type BinaryCallback = Arc<dyn Fn(&[u8]) + Send + Sync>;

/// Callbacks invoked on the stream's own loop thread, in arrival order.
///
/// Frames of a kind with no callback registered are dropped.
#[derive(Clone, Default)]
pub struct StreamCallbacks {
    text: Option<TextCallback>,
    binary: Option<BinaryCallback>,
}

impl StreamCallbacks {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn on_text<F>(mut self, callback: F) -> Self
    where
        F: Fn(&str) + Send + Sync + 'static,
    {
        self.text = Some(Arc::new(callback));
        self
    }

    pub fn on_binary<F>(mut self, callback: F) -> Self
    where
        F: Fn(&[u8]) + Send + Sync + 'static,
    {
        self.binary = Some(Arc::new(callback));
        self
    }

    pub(crate) fn deliver_text(&self, channel: &str, text: &str) {
        match &self.text {
            Some(callback) => {
                if catch_unwind(AssertUnwindSafe(|| callback(text))).is_err() {
                    error!("{} text callback panicked", channel);
                }
            }
            None => debug!("{}: no text callback, dropping {} bytes", channel, text.len()),
        }
    }

    pub(crate) fn deliver_binary(&self, channel: &str, data: &[u8]) {
        match &self.binary {
            Some(callback) => {
                if catch_unwind(AssertUnwindSafe(|| callback(data))).is_err() {
                    error!("{} binary callback panicked", channel);
                }
            }
            None => debug!("{}: no binary callback, dropping {} bytes", channel, data.len()),
        }
    }
}

impl std::fmt::Debug for StreamCallbacks {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("StreamCallbacks")
            .field("text", &self.text.is_some())
            .field("binary", &self.binary.is_some())
            .finish()
    }
}
