//! Error types for autorip.

/// Result type alias using our Error type.
pub type Result<T> = std::result::Result<T, Error>;

/// Errors surfaced by the process supervisor, the report parser and the
/// main feature detection.
#[derive(Debug, thiserror::Error)]
pub enum Error {
    /// A required external tool could not be located.
    #[error("tool not found: {tool}")]
    ToolNotFound { tool: String },

    /// An external tool exited with a non-zero status.
    #[error("{tool} exited with status {code}: {stderr}")]
    ToolFailed {
        tool: String,
        code: i32,
        stderr: String,
    },

    /// The disc report (or a value inside it) did not have the expected shape.
    #[error("failed to parse disc report: {message}")]
    Parse { message: String },

    /// A spawn was attempted while spawning is locked.
    #[error("process spawning is locked")]
    SpawnLocked,

    /// Filtering removed every title on the disc.
    #[error("no titles survived filtering")]
    NoTitlesSurvived,

    /// The main feature was requested before it was detected.
    #[error("no main feature was detected")]
    NoFeatureDetected,

    /// An operation was requested from a session state that does not allow it.
    #[error("invalid session state: {0}")]
    InvalidState(String),

    /// The configuration file is missing, unreadable or inconsistent.
    #[error("configuration error: {0}")]
    Config(String),

    /// An I/O error occurred.
    #[error("I/O error: {0}")]
    Io(#[from] std::io::Error),
}

impl Error {
    /// Create a tool not found error.
    pub fn tool_not_found(tool: impl Into<String>) -> Self {
        Self::ToolNotFound { tool: tool.into() }
    }

    /// Create a tool execution failed error.
    pub fn tool_failed(tool: impl Into<String>, code: i32, stderr: impl Into<String>) -> Self {
        Self::ToolFailed {
            tool: tool.into(),
            code,
            stderr: stderr.into(),
        }
    }

    /// Create a parse error.
    pub fn parse_error(message: impl Into<String>) -> Self {
        Self::Parse {
            message: message.into(),
        }
    }

    /// Whether a session hitting this error can no longer make progress.
    pub fn is_unrecoverable(&self) -> bool {
        !matches!(self, Self::InvalidState(_) | Self::NoFeatureDetected)
    }
}
