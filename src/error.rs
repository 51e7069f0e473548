use thiserror::Error;

/// Failure kinds surfaced by the classroom engine.
#[derive(Debug, Error)]
pub enum CoreError {
    #[error("{0} not found")]
    NotFound(&'static str),

    #[error("forbidden: {0}")]
    Forbidden(String),

    #[error("{0}")]
    InvalidArgument(String),

    #[error("{0}")]
    ResourceExhausted(String),

    #[error("{0}")]
    Conflict(String),

    #[error("database error: {0}")]
    Storage(#[from] rusqlite::Error),
}

impl CoreError {
    pub fn forbidden(msg: impl Into<String>) -> Self {
        Self::Forbidden(msg.into())
    }

    pub fn invalid(msg: impl Into<String>) -> Self {
        Self::InvalidArgument(msg.into())
    }

    /// Stable IPC error code.
    pub fn code(&self) -> &'static str {
        match self {
            Self::NotFound(_) => "not_found",
            Self::Forbidden(_) => "forbidden",
            Self::InvalidArgument(_) => "invalid_argument",
            Self::ResourceExhausted(_) => "resource_exhausted",
            Self::Conflict(_) => "conflict",
            Self::Storage(_) => "db_error",
        }
    }
}

pub type CoreResult<T> = std::result::Result<T, CoreError>;
