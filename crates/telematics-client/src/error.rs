//! Telematics Error Types

use thiserror::Error;

/// Maximum number of characters of an offending payload kept in an error
const MAX_EXCERPT_CHARS: usize = 200;

/// Errors returned by upstream telematics operations
#[derive(Debug, Clone, Error, PartialEq, Eq)]
pub enum TelematicsError {
    /// Upstream rejected the call because of its per-identity rate limit
    #[error("Rate limited by upstream")]
    RateLimited,

    /// Network-level failure
    #[error("Transport error: {0}")]
    Transport(String),

    /// No response within the per-call limit
    #[error("Upstream call timed out after {0}ms")]
    Timeout(u64),

    /// Malformed or unexpected response shape
    #[error("Unexpected response for {context}: {excerpt}")]
    Protocol { context: String, excerpt: String },

    /// The session was closed and has not been re-established
    #[error("Upstream session is closed")]
    SessionClosed,
}

impl TelematicsError {
    /// Build a protocol error carrying a truncated excerpt of the payload
    pub fn protocol(context: impl Into<String>, payload: &serde_json::Value) -> Self {
        let rendered = payload.to_string();
        let excerpt = if rendered.chars().count() <= MAX_EXCERPT_CHARS {
            rendered
        } else {
            let head: String = rendered.chars().take(MAX_EXCERPT_CHARS).collect();
            format!("{}... (truncated, {} total bytes)", head, rendered.len())
        };
        TelematicsError::Protocol {
            context: context.into(),
            excerpt,
        }
    }

    pub fn is_rate_limited(&self) -> bool {
        matches!(self, TelematicsError::RateLimited)
    }

    /// Whether the failure happened below the response level (network,
    /// timeout, closed session)
    pub fn is_transport(&self) -> bool {
        matches!(
            self,
            TelematicsError::Transport(_) | TelematicsError::Timeout(_) | TelematicsError::SessionClosed
        )
    }
}
