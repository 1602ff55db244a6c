use thiserror::Error;

/// Errors returned by session operations.
#[derive(Error, Debug)]
pub enum SessionError {
    /// The backend returned a non-success HTTP status.
    #[error("Backend returned HTTP {status}: {body}")]
    Http { status: u16, body: String },

    /// The response from the backend was missing expected fields.
    #[error("{0}")]
    InvalidResponse(String),

    /// Network-level request failure with context.
    #[error("{context}: {source}")]
    Network {
        context: String,
        source: reqwest::Error,
    },

    /// JSON serialization/deserialization error.
    #[error("JSON error: {0}")]
    Json(#[from] serde_json::Error),

    /// The plan does not permit generating this many items at once.
    #[error("Generation limit exceeded: requested {requested}, {remaining} remaining")]
    LimitExceeded { requested: u32, remaining: u32 },

    /// Bulk generation is not available on the current plan.
    #[error("Bulk generation is not available on this plan")]
    BulkNotAllowed,

    /// An operation required an in-flight job but none is tracked.
    #[error("No active generation job")]
    NoActiveJob,
}

impl SessionError {
    /// Collapse to the single displayable string shown by the UI layer.
    ///
    /// The session surface is deliberately flat: all failures reduce to one
    /// user-facing message, with the structured variant available for logging.
    pub fn display_message(&self) -> String {
        match self {
            SessionError::LimitExceeded { remaining, .. } => {
                format!("Generation limit reached ({} remaining)", remaining)
            }
            SessionError::BulkNotAllowed => {
                "Bulk generation is not available on this plan".to_string()
            }
            _ => "Generation failed. Please try again.".to_string(),
        }
    }
}

/// Convenience alias.
pub type Result<T> = std::result::Result<T, SessionError>;
