//! Structured error types for Rah-Yab
//!
//! Malformed packets and unknown phases never surface here; the decoder
//! absorbs them and counts them in its diagnostics.

use std::time::Duration;
use thiserror::Error;

/// Terminal failure of an analysis attempt or run
#[derive(Error, Debug, Clone, PartialEq)]
pub enum RahyabError {
    /// The provider refused to produce content
    #[error("response blocked: {reason}")]
    StreamBlocked { reason: String },

    /// The stream ended without a usable final report
    #[error("final report not received or could not be recovered")]
    ReportMissing,

    /// One attempt exceeded its deadline
    #[error("attempt timed out after {0:?}")]
    Timeout(Duration),

    /// Every attempt failed
    #[error("all {attempts} attempts failed. Last error: {last_error}")]
    RetriesExhausted { attempts: u32, last_error: String },

    /// The caller cancelled the run
    #[error("operation cancelled")]
    Cancelled,

    /// Network or provider failure
    #[error("transport error: {0}")]
    Transport(String),
}

impl RahyabError {
    /// Whether the orchestrator may start another attempt after this error.
    pub fn is_retryable(&self) -> bool {
        !matches!(self, Self::Cancelled | Self::RetriesExhausted { .. })
    }

    /// Get a user-friendly error message
    pub fn user_message(&self) -> String {
        match self {
            Self::StreamBlocked { reason } => {
                format!("The model refused to answer ({}). Try rephrasing the query.", reason)
            }
            Self::ReportMissing => {
                "The model finished without producing a report. Please try again.".to_string()
            }
            Self::Cancelled => "Operation cancelled.".to_string(),
            _ => self.to_string(),
        }
    }
}

/// Convert transport failures into RahyabError
impl From<anyhow::Error> for RahyabError {
    fn from(err: anyhow::Error) -> Self {
        if let Some(inner) = err.downcast_ref::<RahyabError>() {
            return inner.clone();
        }
        Self::Transport(format!("{:#}", err))
    }
}

/// Result type alias using RahyabError
pub type Result<T> = std::result::Result<T, RahyabError>;
