use std::fmt;
use thiserror::Error;

/// Whether a failed call is worth repeating.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ApiErrorKind {
    /// Timeouts, connection resets, 429/5xx, rate-limit and complexity messages.
    Transient,
    /// Everything else: bad queries, auth failures, unknown items.
    Permanent,
}

/// Phrases in an error message that mark it as transient.
const TRANSIENT_PHRASES: &[&str] = &[
    "rate limit",
    "ratelimit",
    "too many requests",
    "complexity",
    "timeout",
    "timed out",
    "econnreset",
    "connection reset",
    "connection closed",
    "socket hang up",
    "temporarily unavailable",
];

const TRANSIENT_STATUS: &[u16] = &[429, 500, 502, 503, 504];

#[derive(Debug, Error)]
pub struct ApiError {
    pub kind: ApiErrorKind,
    pub status: Option<u16>,
    pub message: String,
}

impl fmt::Display for ApiError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self.status {
            Some(code) => write!(f, "API error (HTTP {code}): {}", self.message),
            None => write!(f, "API error: {}", self.message),
        }
    }
}

impl ApiError {
    pub fn transient(message: impl Into<String>) -> Self {
        Self {
            kind: ApiErrorKind::Transient,
            status: None,
            message: message.into(),
        }
    }

    pub fn permanent(message: impl Into<String>) -> Self {
        Self {
            kind: ApiErrorKind::Permanent,
            status: None,
            message: message.into(),
        }
    }

    /// Classify a failure from its HTTP status (if any) and message.
    pub fn classify(status: Option<u16>, message: impl Into<String>) -> Self {
        let message = message.into();
        let lowered = message.to_lowercase();
        let transient = status.is_some_and(|s| TRANSIENT_STATUS.contains(&s))
            || TRANSIENT_PHRASES.iter().any(|p| lowered.contains(p));
        Self {
            kind: if transient {
                ApiErrorKind::Transient
            } else {
                ApiErrorKind::Permanent
            },
            status,
            message,
        }
    }

    pub fn is_transient(&self) -> bool {
        self.kind == ApiErrorKind::Transient
    }
}

/// `err` followed by each of its sources, joined with `": "`.
fn error_chain(err: &(dyn std::error::Error + 'static)) -> String {
    let mut message = err.to_string();
    let mut source = err.source();
    while let Some(cause) = source {
        let text = cause.to_string();
        if !message.contains(&text) {
            message.push_str(": ");
            message.push_str(&text);
        }
        source = cause.source();
    }
    message
}

impl From<reqwest::Error> for ApiError {
    fn from(err: reqwest::Error) -> Self {
        let status = err.status().map(|s| s.as_u16());
        let message = error_chain(&err);
        // Resets and connections closed mid-request surface as request errors.
        if err.is_timeout() || err.is_connect() || err.is_request() {
            return Self {
                kind: ApiErrorKind::Transient,
                status,
                message,
            };
        }
        Self::classify(status, message)
    }
}
