use thiserror::Error;

/// Why a single report was rejected. Neither kind is fatal to the service.
#[derive(Debug, Clone, Error, PartialEq, Eq)]
pub enum IngestError {
    /// The body is not a parseable report, or its coordinates are unusable.
    #[error("malformed input: {reason}")]
    MalformedInput { reason: String },

    /// The identity is missing or empty.
    #[error("invalid identity: a non-empty identity is required")]
    InvalidIdentity,
}

impl IngestError {
    pub fn malformed(reason: impl Into<String>) -> Self {
        IngestError::MalformedInput {
            reason: reason.into(),
        }
    }

    /// Short error code string sent to reporters in rejection bodies.
    pub fn code(&self) -> &'static str {
        match self {
            IngestError::MalformedInput { .. } => "MALFORMED_INPUT",
            IngestError::InvalidIdentity => "INVALID_IDENTITY",
        }
    }
}

pub type Result<T> = std::result::Result<T, IngestError>;
