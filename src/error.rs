//! Error types for devmind.
//!
//! Store and AI failures are never fatal: the session turns every one of
//! them into a status line or an inline error reply.

use thiserror::Error;

/// Errors raised by the snippet store and its backing file.
#[derive(Error, Debug, Clone, PartialEq, Eq)]
pub enum StoreError {
    /// The data file exists but could not be read or parsed.
    #[error("failed to load snippets: {0}")]
    Load(String),

    /// The data file could not be written.
    #[error("failed to save snippets: {0}")]
    Save(String),

    /// A required field was empty.
    #[error("{0}")]
    Validation(String),
}

impl StoreError {
    pub fn validation(msg: impl Into<String>) -> Self {
        Self::Validation(msg.into())
    }

    /// Short text for the status line.
    pub fn status_text(&self) -> String {
        match self {
            StoreError::Load(_) => "Error loading data".to_string(),
            StoreError::Save(_) => "Failed to save data".to_string(),
            StoreError::Validation(msg) => msg.clone(),
        }
    }
}

/// Errors raised while talking to the AI provider.
#[derive(Error, Debug, Clone, PartialEq, Eq)]
pub enum AiError {
    /// The request never got a response.
    #[error("network error: {0}")]
    Network(String),

    /// The provider answered with a non-success status.
    #[error("provider returned {status}: {message}")]
    Upstream { status: u16, message: String },

    /// The reply carried no usable choice/content.
    #[error("malformed response: {0}")]
    MalformedResponse(String),
}

/// Errors raised by session-level operations.
#[derive(Error, Debug, Clone, PartialEq, Eq)]
pub enum SessionError {
    /// An AI request is already in flight.
    #[error("an AI request is already in progress")]
    AiBusy,

    /// Apply was requested with no AI exchange pending.
    #[error("no AI response to apply")]
    NoPendingExchange,

    #[error(transparent)]
    Store(#[from] StoreError),
}
