use serde::{Deserialize, Serialize};
use std::fmt;

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub enum AppError {
    /// Caller input was malformed. Always reported with a 400.
    Validation(String),
    /// The uploaded file's shape could not be inferred.
    Format(String),
    /// The geocoding backend answered with a non-2xx status, or could not be
    /// reached at all (`status` is `None`, `message` holds a diagnostic code).
    Upstream { status: Option<u16>, message: String },
    Internal(String),
    Io(String),
}

impl AppError {
    pub fn validation(msg: impl Into<String>) -> Self {
        AppError::Validation(msg.into())
    }

    pub fn status_code(&self) -> u16 {
        match self {
            AppError::Validation(_) | AppError::Format(_) => 400,
            AppError::Upstream {
                status: Some(status),
                ..
            } => *status,
            AppError::Upstream { status: None, .. } => 500,
            AppError::Internal(_) | AppError::Io(_) => 500,
        }
    }

    /// Message safe to hand back to a client.
    pub fn public_message(&self) -> String {
        match self {
            AppError::Validation(msg) | AppError::Format(msg) => msg.clone(),
            AppError::Upstream {
                status: Some(status),
                message,
            } if *status != 500 => message.clone(),
            AppError::Upstream { status: None, message } => {
                format!("Unexpected error: {}", message)
            }
            _ => "An unexpected error has occurred".to_string(),
        }
    }
}

impl fmt::Display for AppError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            AppError::Validation(msg) => write!(f, "Validation error: {}", msg),
            AppError::Format(msg) => write!(f, "Format error: {}", msg),
            AppError::Upstream {
                status: Some(status),
                message,
            } => write!(f, "Upstream error ({}): {}", status, message),
            AppError::Upstream {
                status: None,
                message,
            } => write!(f, "Upstream unreachable: {}", message),
            AppError::Internal(msg) => write!(f, "Internal error: {}", msg),
            AppError::Io(msg) => write!(f, "IO error: {}", msg),
        }
    }
}

impl std::error::Error for AppError {}

impl From<std::io::Error> for AppError {
    fn from(err: std::io::Error) -> Self {
        AppError::Io(err.to_string())
    }
}

impl From<csv::Error> for AppError {
    fn from(err: csv::Error) -> Self {
        AppError::Format(format!("Malformed CSV content: {}", err))
    }
}

pub type Result<T> = std::result::Result<T, AppError>;
