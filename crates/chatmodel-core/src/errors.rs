/// Core error type for the chat-model middleware.
///
/// Adapter crates map their transport and payload failures into this type so
/// the message handler can turn any failure into one user-facing apology.
#[derive(Debug, thiserror::Error)]
pub enum Error {
    #[error("config error: {0}")]
    Config(String),

    #[error("the model did not answer within {0} seconds")]
    Timeout(u64),

    #[error("the model provider is rate limiting requests, please slow down")]
    RateLimited,

    #[error("the model provider rejected the API key: {0}")]
    Unauthorized(String),

    #[error("the model provider quota is exhausted: {0}")]
    QuotaExceeded(String),

    #[error("the model provider returned an unexpected response: {0}")]
    InvalidResponse(String),

    #[error("model provider error: {0}")]
    Provider(String),

    #[error("storage error: {0}")]
    Storage(String),

    #[error("messaging error: {0}")]
    Messaging(String),

    #[error("i/o error: {0}")]
    Io(#[from] std::io::Error),

    #[error("json error: {0}")]
    Json(#[from] serde_json::Error),
}

impl Error {
    /// Failures that come from the model provider rather than from us.
    pub fn is_provider_failure(&self) -> bool {
        matches!(
            self,
            Error::Timeout(_)
                | Error::RateLimited
                | Error::Unauthorized(_)
                | Error::QuotaExceeded(_)
                | Error::InvalidResponse(_)
                | Error::Provider(_)
        )
    }
}

pub type Result<T> = std::result::Result<T, Error>;
