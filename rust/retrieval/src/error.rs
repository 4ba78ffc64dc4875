use serde::ser::SerializeMap;

/// Errors raised while ingesting or querying manual corpora.
#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
pub enum RetrievalError {
    /// The document's file type has no registered extractor.
    #[error("unsupported format: {extension}")]
    UnsupportedFormat { extension: String },

    /// Text extraction failed for one source document.
    #[error("extraction failed for {doc_source}: {message}")]
    ExtractFailed { doc_source: String, message: String },

    /// The extracted corpus content is empty or too short to index.
    #[error("corpus content is empty or too short")]
    EmptyContent,

    /// The corpus has not been built, so it cannot be loaded or queried.
    #[error("corpus not ready: {corpus}")]
    NotReady { corpus: String },

    /// A persisted index was produced by a different embedder.
    #[error("embedder mismatch: index built with {found}, loaded with {expected}")]
    EmbedderMismatch { expected: String, found: String },

    /// An I/O error occurred.
    #[error("io error: {message}")]
    Io { message: String },

    /// A JSON serialization/deserialization error occurred.
    #[error("json error: {message}")]
    Json { message: String },
}

impl RetrievalError {
    /// A unique error code string for this variant.
    #[must_use]
    pub fn code(&self) -> &'static str {
        match self {
            Self::UnsupportedFormat { .. } => "UNSUPPORTED_FORMAT",
            Self::ExtractFailed { .. } => "EXTRACT_FAILED",
            Self::EmptyContent => "EMPTY_CONTENT",
            Self::NotReady { .. } => "NOT_READY",
            Self::EmbedderMismatch { .. } => "EMBEDDER_MISMATCH",
            Self::Io { .. } => "IO_ERROR",
            Self::Json { .. } => "JSON_ERROR",
        }
    }
}

impl From<std::io::Error> for RetrievalError {
    fn from(err: std::io::Error) -> Self {
        Self::Io {
            message: err.to_string(),
        }
    }
}

impl From<serde_json::Error> for RetrievalError {
    fn from(err: serde_json::Error) -> Self {
        Self::Json {
            message: err.to_string(),
        }
    }
}

impl serde::Serialize for RetrievalError {
    fn serialize<S: serde::Serializer>(&self, serializer: S) -> Result<S::Ok, S::Error> {
        let mut map = serializer.serialize_map(Some(2))?;
        map.serialize_entry("code", self.code())?;
        map.serialize_entry("message", &self.to_string())?;
        map.end()
    }
}

/// A `Result` type alias using [`RetrievalError`].
pub type RetrievalResult<T> = Result<T, RetrievalError>;
