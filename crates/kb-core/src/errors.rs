use std::time::Duration;

/// Core error type.
///
/// Adapter crates should map their specific errors into this type so the
/// pipeline can decide between "degrade to a default" and "surface to caller".
#[derive(Debug, thiserror::Error)]
pub enum Error {
    #[error("config error: {0}")]
    Config(String),

    #[error("i/o error: {0}")]
    Io(#[from] std::io::Error),

    #[error("json error: {0}")]
    Json(#[from] serde_json::Error),

    #[error("invalid {field}: {message}")]
    Validation { field: String, message: String },

    #[error("rate limited (retry after {}s)", retry_after.as_secs())]
    RateLimited { retry_after: Duration },

    #[error("external error: {0}")]
    External(String),
}

impl Error {
    pub fn validation(field: impl Into<String>, message: impl Into<String>) -> Self {
        Self::Validation {
            field: field.into(),
            message: message.into(),
        }
    }
}

pub type Result<T> = std::result::Result<T, Error>;
