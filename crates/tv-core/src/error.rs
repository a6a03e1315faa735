//! Errors raised by the coordination core

use thiserror::Error;

/// Errors that can occur in range coordination
#[derive(Error, Debug)]
pub enum CoreError {
    #[error("Cannot parse {field} value '{input}' as an integer timestamp")]
    Parse { field: &'static str, input: String },

    #[error("No active session to apply the selection to")]
    NoActiveSession,

    #[error("Settings error: {0}")]
    Settings(String),

    #[error("I/O error: {0}")]
    Io(#[from] std::io::Error),

    #[error("JSON error: {0}")]
    Json(#[from] serde_json::Error),
}

impl CoreError {
    pub(crate) fn parse(field: &'static str, input: impl Into<String>) -> Self {
        CoreError::Parse {
            field,
            input: input.into(),
        }
    }
}

pub type Result<T> = std::result::Result<T, CoreError>;
