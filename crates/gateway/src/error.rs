use thiserror::Error;

/// Errors surfaced by gateway implementations.
///
/// Variants with a wire counterpart map one-to-one to the structured `code`
/// field of API error bodies; transport and decoding failures carry their
/// cause as a string so the error stays `Clone` across shared in-flight
/// futures.
#[derive(Debug, Error, Clone, PartialEq, Eq)]
#[non_exhaustive]
pub enum GatewayError {
    #[error("attempt limit reached ({max_attempts} attempts allowed)")]
    AttemptLimitExceeded { max_attempts: u32 },

    #[error("test is not active")]
    TestInactive,

    #[error("test not found")]
    TestNotFound,

    #[error("attempt not found")]
    AttemptNotFound,

    #[error("the time limit for this attempt has passed")]
    DeadlineExceeded,

    #[error("attempt belongs to a different test-taker")]
    Forbidden,

    #[error("server rejected the request ({code}): {message}")]
    Server { code: String, message: String },

    #[error("network error: {0}")]
    Network(String),

    #[error("malformed response: {0}")]
    Decode(String),

    #[error("internal error: {0}")]
    Internal(String),
}

impl From<reqwest::Error> for GatewayError {
    fn from(err: reqwest::Error) -> Self {
        Self::Network(err.to_string())
    }
}
