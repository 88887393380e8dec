use thiserror::Error;

use crate::user::UserId;

/// The model reply did not contain a parseable JSON object.
#[derive(Error, Debug, Clone, PartialEq, Eq)]
pub enum ExtractionError {
    #[error("no JSON object could be located in the model response")]
    MalformedResponse,
}

/// Failure reported by a [`MealAnalyzer`](crate::analyzer::MealAnalyzer) implementation.
#[derive(Error, Debug, Clone, PartialEq, Eq)]
pub enum ServiceError {
    /// The bounded deadline elapsed before the service answered.
    #[error("AI service did not answer in time")]
    Timeout,

    #[error("could not reach AI service: {0}")]
    Transport(String),

    /// Quota or rate limit hit; the message is safe to show to the user.
    #[error("{0}")]
    RateLimited(String),

    #[error("AI service error ({status}): {message}")]
    Api { status: u16, message: String },

    #[error("AI service returned no text")]
    EmptyReply,
}

/// Errors surfaced by the meal ingestion pipeline.
///
/// The user's log is untouched whenever one of these is returned.
#[derive(Error, Debug)]
pub enum IngestionError {
    #[error("AI service unavailable: {0}")]
    ServiceUnavailable(#[from] ServiceError),

    #[error("AI response could not be used: {0}")]
    InvalidResponse(#[from] ExtractionError),

    #[error("failed to store meal entry: {0:#}")]
    Storage(anyhow::Error),

    /// The session and the store were opened for different users.
    #[error("session for {session} cannot write to the log of {store}")]
    WrongUser { session: UserId, store: UserId },
}

/// Missing configuration that AI-dependent operations cannot run without.
#[derive(Error, Debug, Clone, PartialEq, Eq)]
pub enum ConfigError {
    #[error("{var} is not set; AI meal logging is unavailable")]
    MissingCredential { var: &'static str },
}
