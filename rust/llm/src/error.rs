use serde::ser::SerializeMap;

/// Errors from the LLM gateway and the prompt catalog.
#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
pub enum LlmError {
    /// The request never produced a response (connect, DNS, timeout).
    #[error("transport error: {message}")]
    Transport { message: String },

    /// The provider rejected the credentials.
    #[error("unauthorized: {message}")]
    Unauthorized { message: String },

    /// The provider rate limit was exceeded.
    #[error("rate limited: {message}")]
    RateLimited { message: String },

    /// The provider returned an unusable response.
    #[error("bad response: {message}")]
    BadResponse { message: String },

    /// No prompt is stored for the requested agent and version.
    #[error("prompt not found: {agent}/{version}")]
    PromptNotFound { agent: String, version: String },

    /// An I/O error occurred (prompt catalog storage).
    #[error("io error: {message}")]
    Io { message: String },
}

impl LlmError {
    /// Whether a whole-operation retry by the caller could plausibly
    /// succeed. The gateway itself never retries.
    #[must_use]
    pub fn is_retryable(&self) -> bool {
        match self {
            Self::Transport { .. } | Self::RateLimited { .. } => true,
            Self::Unauthorized { .. }
            | Self::BadResponse { .. }
            | Self::PromptNotFound { .. }
            | Self::Io { .. } => false,
        }
    }

    /// A unique error code string for this variant.
    #[must_use]
    pub fn code(&self) -> &'static str {
        match self {
            Self::Transport { .. } => "TRANSPORT",
            Self::Unauthorized { .. } => "UNAUTHORIZED",
            Self::RateLimited { .. } => "RATE_LIMITED",
            Self::BadResponse { .. } => "BAD_RESPONSE",
            Self::PromptNotFound { .. } => "PROMPT_NOT_FOUND",
            Self::Io { .. } => "IO_ERROR",
        }
    }
}

impl From<std::io::Error> for LlmError {
    fn from(err: std::io::Error) -> Self {
        Self::Io {
            message: err.to_string(),
        }
    }
}

impl serde::Serialize for LlmError {
    fn serialize<S: serde::Serializer>(&self, serializer: S) -> Result<S::Ok, S::Error> {
        let mut map = serializer.serialize_map(Some(2))?;
        map.serialize_entry("code", self.code())?;
        map.serialize_entry("message", &self.to_string())?;
        map.end()
    }
}

/// A `Result` type alias using [`LlmError`].
pub type LlmResult<T> = Result<T, LlmError>;
