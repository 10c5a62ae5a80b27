//! Tagged result of a facade call.
//!
//! Every failure carries the empty-mapping body, so code that only looks at
//! keys behaves the same for "nothing came back" and "garbage came back". The
//! [`Outcome`] tag tells the two apart for callers that care.

use crate::config::ConnectionConfig;
use crate::error::CrescoError;
use serde_json::{Map, Value};
use tracing::{debug, error};

/// How a facade call ended.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Outcome {
    /// RPC reply received and decoded.
    Replied,
    /// Fire-and-forget frame accepted by the transport.
    Dispatched,
    /// Not attempted; the failure latch is set.
    Suppressed,
    TimedOut,
    ConnectionFailed,
    /// Reply received but not a JSON object.
    Malformed,
}

impl Outcome {
    pub fn is_success(&self) -> bool {
        matches!(self, Outcome::Replied | Outcome::Dispatched)
    }
}

impl std::fmt::Display for Outcome {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        let name = match self {
            Outcome::Replied => "replied",
            Outcome::Dispatched => "dispatched",
            Outcome::Suppressed => "suppressed",
            Outcome::TimedOut => "timed out",
            Outcome::ConnectionFailed => "connection failed",
            Outcome::Malformed => "malformed",
        };
        f.write_str(name)
    }
}

/// Reply body plus outcome tag.
#[derive(Debug, Clone, PartialEq)]
pub struct Reply {
    body: Value,
    outcome: Outcome,
}

impl Reply {
    pub(crate) fn replied(body: Value) -> Self {
        Self {
            body,
            outcome: Outcome::Replied,
        }
    }

    pub(crate) fn dispatched() -> Self {
        Self::empty(Outcome::Dispatched)
    }

    pub(crate) fn suppressed() -> Self {
        Self::empty(Outcome::Suppressed)
    }

    /// Empty reply for a transport failure.
    pub(crate) fn from_failure(err: &CrescoError) -> Self {
        match err {
            CrescoError::Timeout(_) => Self::empty(Outcome::TimedOut),
            _ => Self::empty(Outcome::ConnectionFailed),
        }
    }

    fn empty(outcome: Outcome) -> Self {
        Self {
            body: Value::Object(Map::new()),
            outcome,
        }
    }

    /// Decode a raw reply frame. Never fails; bad input yields [`Outcome::Malformed`].
    pub fn parse(raw: &str) -> Self {
        match serde_json::from_str::<Value>(raw) {
            Ok(body @ Value::Object(_)) => {
                debug!("Reply with {} keys", body.as_object().map_or(0, Map::len));
                Self::replied(body)
            }
            Ok(other) => {
                error!(
                    "Reply is not a JSON object: {}",
                    preview(raw, ConnectionConfig::REPLY_PREVIEW_CHARS)
                );
                debug!("Discarded reply of type {}", json_kind(&other));
                Self::empty(Outcome::Malformed)
            }
            Err(e) => {
                error!(
                    "Invalid JSON reply ({}): {}",
                    e,
                    preview(raw, ConnectionConfig::REPLY_PREVIEW_CHARS)
                );
                Self::empty(Outcome::Malformed)
            }
        }
    }

    pub fn outcome(&self) -> Outcome {
        self.outcome
    }

    pub fn is_success(&self) -> bool {
        self.outcome.is_success()
    }

    pub fn body(&self) -> &Value {
        &self.body
    }

    pub fn into_body(self) -> Value {
        self.body
    }

    /// True when the body has no keys (the failure sentinel).
    pub fn is_empty(&self) -> bool {
        self.body.as_object().map_or(true, Map::is_empty)
    }

    pub fn get(&self, key: &str) -> Option<&Value> {
        self.body.get(key)
    }

    pub fn get_str(&self, key: &str) -> Option<&str> {
        self.get(key).and_then(Value::as_str)
    }

    /// The `status_code` field, sent either as a number or as a numeric string.
    pub fn status_code(&self) -> Option<i64> {
        match self.get("status_code")? {
            Value::Number(n) => n.as_i64(),
            Value::String(s) => s.trim().parse().ok(),
            _ => None,
        }
    }
}

fn json_kind(value: &Value) -> &'static str {
    match value {
        Value::Null => "null",
        Value::Bool(_) => "bool",
        Value::Number(_) => "number",
        Value::String(_) => "string",
        Value::Array(_) => "array",
        Value::Object(_) => "object",
    }
}

fn preview(raw: &str, max_chars: usize) -> String {
    let mut chars = raw.chars();
    let head: String = chars.by_ref().take(max_chars).collect();
    if chars.next().is_some() {
        format!("{}...", head)
    } else {
        head
    }
}
