//! Error types for Parcel Intel.

use std::time::Duration;

/// Top-level error type for the crate.
#[derive(Debug, thiserror::Error)]
pub enum Error {
    #[error("Configuration error: {0}")]
    Config(#[from] ConfigError),

    #[error("Database error: {0}")]
    Database(#[from] DatabaseError),

    #[error("LLM error: {0}")]
    Llm(#[from] LlmError),

    #[error("Secondary extractor error: {0}")]
    Secondary(#[from] SecondaryError),

    #[error("Pipeline error: {0}")]
    Pipeline(#[from] PipelineError),

    #[error("Sync error: {0}")]
    Sync(#[from] SyncError),
}

/// Configuration-related errors.
#[derive(Debug, thiserror::Error)]
pub enum ConfigError {
    #[error("Invalid configuration value for {key}: {message}")]
    InvalidValue { key: String, message: String },
}

/// Database-related errors.
#[derive(Debug, thiserror::Error)]
pub enum DatabaseError {
    #[error("Connection pool error: {0}")]
    Pool(String),

    #[error("Query failed: {0}")]
    Query(String),

    #[error("Entity not found: {entity} with id {id}")]
    NotFound { entity: String, id: String },

    #[error("Constraint violation: {0}")]
    Constraint(String),

    #[error("Migration failed: {0}")]
    Migration(String),
}

/// LLM provider errors.
#[derive(Debug, thiserror::Error)]
pub enum LlmError {
    #[error("Provider {provider} request failed: {reason}")]
    RequestFailed { provider: String, reason: String },

    #[error("Invalid response from {provider}: {reason}")]
    InvalidResponse { provider: String, reason: String },
}

/// Errors raised by a secondary (NLP/LLM) extractor.
///
/// None of these are fatal to the pipeline: the hybrid parser logs them and
/// keeps the rule-based result.
#[derive(Debug, thiserror::Error)]
pub enum SecondaryError {
    #[error("Secondary extractor {name} is disabled")]
    Disabled { name: String },

    #[error("Secondary extractor timed out after {after:?}")]
    Timeout { after: Duration },

    #[error("HTTP error: {0}")]
    Http(String),

    #[error("Invalid response: {0}")]
    InvalidResponse(String),

    #[error("LLM error: {0}")]
    Llm(#[from] LlmError),
}

/// Pipeline-related errors.
#[derive(Debug, thiserror::Error)]
pub enum PipelineError {
    #[error("Malformed input: {0}")]
    MalformedInput(String),

    #[error("Batch enrichment failed: {0}")]
    Enrichment(String),

    #[error("Database error: {0}")]
    Database(#[from] DatabaseError),
}

/// Mailbox synchronisation errors.
#[derive(Debug, thiserror::Error)]
pub enum SyncError {
    #[error("Mailbox {mailbox} needs to be reconnected")]
    NeedsReconnect { mailbox: String },

    #[error("Fetch failed for mailbox {mailbox}: {reason}")]
    Fetch { mailbox: String, reason: String },

    #[error("Mailbox {0} not found")]
    MailboxNotFound(String),

    #[error("Database error: {0}")]
    Database(#[from] DatabaseError),

    #[error("Pipeline error: {0}")]
    Pipeline(#[from] PipelineError),
}

/// Result type alias for the crate.
pub type Result<T> = std::result::Result<T, Error>;
