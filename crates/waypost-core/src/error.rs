use thiserror::Error;

#[derive(Debug, Error)]
pub enum WaypostError {
    #[error("Configuration error: {0}")]
    Config(String),

    #[error("Failed to bind {addr}: {source}")]
    Bind {
        addr: String,
        #[source]
        source: std::io::Error,
    },

    #[error("Serialization error: {0}")]
    Serialization(#[from] serde_json::Error),
}

impl WaypostError {
    /// Short error code string for logs and error bodies.
    pub fn code(&self) -> &'static str {
        match self {
            WaypostError::Config(_) => "CONFIG_ERROR",
            WaypostError::Bind { .. } => "BIND_ERROR",
            WaypostError::Serialization(_) => "SERIALIZATION_ERROR",
        }
    }
}

pub type Result<T> = std::result::Result<T, WaypostError>;
