use std::time::Duration;

/// Terminal failures of a ranking run.
///
/// Rate limits never show up here directly: the query client waits them out and only
/// escalates to [`RankError::UpstreamUnavailable`] once the configured ceiling is spent.
#[derive(Debug, thiserror::Error)]
pub enum RankError {
    /// The token was missing, invalid or revoked. Never retried.
    #[error("authentication failed: {message}")]
    Authentication { message: String },

    /// Rate-limit suspension for one stream exceeded `max_rate_limit_wait`.
    #[error("upstream unavailable for location {location}: rate limited for {waited:?}")]
    UpstreamUnavailable { location: String, waited: Duration },

    /// Retries exhausted, or the upstream rejected the query outright.
    #[error("query failed for location {location} after {attempts} attempt(s): {reason}")]
    LocationQueryFailed {
        location: String,
        attempts: u32,
        reason: String,
    },

    /// The stream was stopped because a sibling stream failed first.
    #[error("query for location {location} was cancelled")]
    Cancelled { location: String },

    #[error("runtime failure: {0}")]
    Runtime(String),
}

impl RankError {
    /// Location label the error is attributed to, if any.
    pub fn location(&self) -> Option<&str> {
        match self {
            RankError::UpstreamUnavailable { location, .. }
            | RankError::LocationQueryFailed { location, .. }
            | RankError::Cancelled { location } => Some(location),
            RankError::Authentication { .. } | RankError::Runtime(_) => None,
        }
    }

    pub(crate) fn is_cancelled(&self) -> bool {
        matches!(self, RankError::Cancelled { .. })
    }
}
