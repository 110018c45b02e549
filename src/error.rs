//! Error types for the prediction pipeline
//!
//! Validation failures carry a structured [`ErrorCode`] and are folded into
//! `{success:false, error:{code,message,details}}` at the dispatch boundary.
//! Only infrastructure failures (storage, HTTP, config) surface as hard
//! errors past a handler, and the dispatcher converts even those into an
//! `INTERNAL` API error rather than panicking the transport.

use serde::{Deserialize, Serialize};
use thiserror::Error;

pub type Result<T> = std::result::Result<T, PipelineError>;

/// Machine-readable validation codes returned through the command surface.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum ErrorCode {
    MissingId,
    MissingUniverseId,
    MissingTargetId,
    MissingReason,
    NotFound,
    InvalidData,
    InvalidSymbols,
    InvalidDecision,
    InvalidType,
    InvalidTier,
    UnsupportedAction,
    Internal,
}

impl ErrorCode {
    pub fn as_str(&self) -> &'static str {
        match self {
            ErrorCode::MissingId => "MISSING_ID",
            ErrorCode::MissingUniverseId => "MISSING_UNIVERSE_ID",
            ErrorCode::MissingTargetId => "MISSING_TARGET_ID",
            ErrorCode::MissingReason => "MISSING_REASON",
            ErrorCode::NotFound => "NOT_FOUND",
            ErrorCode::InvalidData => "INVALID_DATA",
            ErrorCode::InvalidSymbols => "INVALID_SYMBOLS",
            ErrorCode::InvalidDecision => "INVALID_DECISION",
            ErrorCode::InvalidType => "INVALID_TYPE",
            ErrorCode::InvalidTier => "INVALID_TIER",
            ErrorCode::UnsupportedAction => "UNSUPPORTED_ACTION",
            ErrorCode::Internal => "INTERNAL",
        }
    }
}

#[derive(Debug, Error)]
pub enum PipelineError {
    /// Recoverable validation failure, returned as structured content.
    #[error("{code:?}: {message}")]
    Validation {
        code: ErrorCode,
        message: String,
        details: Option<serde_json::Value>,
    },

    #[error("Database error: {0}")]
    Database(#[from] sqlx::Error),

    #[error("HTTP error: {0}")]
    Http(#[from] reqwest::Error),

    #[error("LLM error: {0}")]
    Llm(String),

    #[error("Config error: {0}")]
    Config(#[from] config::ConfigError),

    #[error("Serialization error: {0}")]
    Serde(#[from] serde_json::Error),
}

impl PipelineError {
    pub fn validation(code: ErrorCode, message: impl Into<String>) -> Self {
        PipelineError::Validation {
            code,
            message: message.into(),
            details: None,
        }
    }

    pub fn validation_with(
        code: ErrorCode,
        message: impl Into<String>,
        details: serde_json::Value,
    ) -> Self {
        PipelineError::Validation {
            code,
            message: message.into(),
            details: Some(details),
        }
    }

    pub fn missing_id(what: &str) -> Self {
        Self::validation(ErrorCode::MissingId, format!("{} id is required", what))
    }

    pub fn not_found(what: &str, id: &str) -> Self {
        Self::validation(ErrorCode::NotFound, format!("{} not found: {}", what, id))
    }

    pub fn invalid_data(message: impl Into<String>) -> Self {
        Self::validation(ErrorCode::InvalidData, message)
    }

    /// Code reported through the API surface for this error.
    pub fn code(&self) -> ErrorCode {
        match self {
            PipelineError::Validation { code, .. } => *code,
            _ => ErrorCode::Internal,
        }
    }

    pub fn details(&self) -> Option<serde_json::Value> {
        match self {
            PipelineError::Validation { details, .. } => details.clone(),
            _ => None,
        }
    }
}
