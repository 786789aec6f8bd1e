//! Correlation keys and frame classification rules.

use serde::{Deserialize, Serialize};
use std::fmt;

/// Body prefix of a diagnostics message that echoes a healthcheck id.
pub const HEALTHCHECK_PREFIX: &str = "healthcheck";

/// Signatures the daemon uses when the upstream service rate limits a send.
const RATE_LIMIT_SIGNATURES: [&str; 2] = ["413", "Rate limit"];

/// Kind of request awaiting a correlated response.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum CallbackKind {
    Verify,
    Trust,
    Send,
    Healthcheck,
    Version,
}

impl CallbackKind {
    pub fn as_str(&self) -> &'static str {
        match self {
            CallbackKind::Verify => "verify",
            CallbackKind::Trust => "trust",
            CallbackKind::Send => "send",
            CallbackKind::Healthcheck => "healthcheck",
            CallbackKind::Version => "version",
        }
    }
}

impl fmt::Display for CallbackKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Key under which an outstanding request waits for its response.
///
/// The meaning of `id` depends on the kind: a generated request id for sends
/// and version queries, the account phone number for verification, the
/// fingerprint for trust requests and the healthcheck id for healthchecks.
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub struct CorrelationKey {
    pub kind: CallbackKind,
    pub id: String,
}

impl CorrelationKey {
    pub fn new(kind: CallbackKind, id: impl Into<String>) -> Self {
        Self {
            kind,
            id: id.into(),
        }
    }
}

impl fmt::Display for CorrelationKey {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}:{}", self.kind, self.id)
    }
}

/// Generate a fresh request id.
pub fn new_request_id() -> String {
    uuid::Uuid::new_v4().to_string()
}

/// Whether an `unexpected_error` message reports a rate limit.
///
/// Matches the daemon's wording; it has no structured code for this case.
pub fn is_rate_limit_message(message: &str) -> bool {
    RATE_LIMIT_SIGNATURES
        .iter()
        .any(|signature| message.contains(signature))
}

/// Message body echoing a healthcheck: `healthcheck <id>`.
pub fn healthcheck_body(id: &str) -> String {
    format!("{} {}", HEALTHCHECK_PREFIX, id)
}

/// Extract the healthcheck id from a message body, if it is an echo.
pub fn parse_healthcheck_body(body: &str) -> Option<&str> {
    let rest = body.trim().strip_prefix(HEALTHCHECK_PREFIX)?;
    let id = rest.strip_prefix(' ')?.trim();
    if id.is_empty() || id.contains(char::is_whitespace) {
        None
    } else {
        Some(id)
    }
}
