//! Error types for FitCoach.
//!
//! One enum per subsystem, folded into [`Error`] for the handler boundary.
//! Handlers catch the kinds they have a user-facing reply for; anything that
//! reaches the dispatcher gets the generic apology.

use std::time::Duration;

#[derive(Debug, thiserror::Error)]
pub enum Error {
    #[error("config: {0}")]
    Config(#[from] ConfigError),

    #[error("store: {0}")]
    Database(#[from] DatabaseError),

    #[error("channel: {0}")]
    Channel(#[from] ChannelError),

    #[error("completion: {0}")]
    Llm(#[from] LlmError),
}

/// Startup configuration problems. All of these are fatal.
#[derive(Debug, thiserror::Error)]
pub enum ConfigError {
    #[error("{0} must be set")]
    MissingEnvVar(String),

    #[error("{key} is invalid: {message}")]
    InvalidValue { key: String, message: String },
}

/// Profile store failures.
#[derive(Debug, thiserror::Error)]
pub enum DatabaseError {
    /// Opening the database or a connection to it.
    #[error("cannot open database: {0}")]
    Pool(String),

    #[error("statement failed: {0}")]
    Query(String),

    #[error("schema upgrade failed: {0}")]
    Migration(String),

    /// A stored value could not be decoded.
    #[error("corrupt row: {0}")]
    Serialization(String),

    #[error("no profile store configured")]
    Unconfigured,
}

/// Messaging transport failures.
#[derive(Debug, thiserror::Error)]
pub enum ChannelError {
    #[error("{name} could not start: {reason}")]
    StartupFailed { name: String, reason: String },

    #[error("{name} could not deliver reply: {reason}")]
    SendFailed { name: String, reason: String },

    #[error("no channel registered as {0}")]
    UnknownChannel(String),
}

/// Completion service failures.
#[derive(Debug, thiserror::Error)]
pub enum LlmError {
    #[error("{provider} request failed: {reason}")]
    RequestFailed { provider: String, reason: String },

    #[error("{provider} is throttling requests (retry after {retry_after:?})")]
    RateLimited {
        provider: String,
        retry_after: Option<Duration>,
    },

    #[error("{provider} sent an unusable response: {reason}")]
    InvalidResponse { provider: String, reason: String },

    #[error("{provider} rejected the API key")]
    AuthFailed { provider: String },

    #[error("malformed completion body: {0}")]
    Json(#[from] serde_json::Error),
}

pub type Result<T> = std::result::Result<T, Error>;
