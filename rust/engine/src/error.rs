use serde::ser::SerializeMap;
use stagewright_llm::LlmError;
use stagewright_retrieval::RetrievalError;

use crate::input::InputRejection;

/// The kinds of entity an operation can fail to find.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, serde::Serialize, serde::Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum Entity {
    Project,
    Stage,
    GeneratedCode,
    SafetyManual,
    VersionEntry,
}

impl Entity {
    /// Return the canonical lowercase name.
    #[must_use]
    pub fn as_str(self) -> &'static str {
        match self {
            Self::Project => "project",
            Self::Stage => "stage",
            Self::GeneratedCode => "generated_code",
            Self::SafetyManual => "safety_manual",
            Self::VersionEntry => "version_entry",
        }
    }
}

impl std::fmt::Display for Entity {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.as_str())
    }
}

/// The typed error surface of the pipeline engine.
///
/// Every public operation either returns a typed result or fails with one
/// of these values; the transport layer maps them to HTTP statuses. The
/// engine itself never speaks HTTP.
#[derive(Debug, Clone, PartialEq, thiserror::Error)]
pub enum EngineError {
    // -- Input --
    /// The raw control-logic text failed the input gate.
    #[error("invalid input: {rejection}")]
    InputInvalid { rejection: InputRejection },

    // -- Preconditions --
    /// An entity referenced by the operation does not exist.
    #[error("{entity} not found: {id}")]
    NotFound { entity: Entity, id: String },

    /// The caller does not own the targeted project.
    #[error("not authorized")]
    Forbidden,

    /// Code generation requires every stage in the project to be validated.
    #[error("stages not validated: {}", stage_ids.join(", "))]
    StagesNotValidated { stage_ids: Vec<String> },

    /// The stage must be validated before this operation.
    #[error("stage not validated: {stage_id}")]
    NotValidated { stage_id: String },

    // -- Pipeline --
    /// Code generation produced no usable output for a stage.
    #[error("generation failed for stage {stage_id}: {reason}")]
    GenerationFailed { stage_id: String, reason: String },

    /// The structured-output parser found no recognizable block.
    #[error("parse failed near: {snippet}")]
    ParseFailed { snippet: String },

    // -- Collaborators --
    /// A required corpus has not been built or loaded.
    #[error("retrieval corpus not ready: {corpus}")]
    RetrievalNotReady { corpus: String },

    /// A retrieval failure other than a missing corpus.
    #[error("retrieval error: {message}")]
    Retrieval { message: String },

    /// The LLM gateway failed.
    #[error("llm error: {0}")]
    Llm(#[from] LlmError),

    // -- Wrappers --
    /// An I/O error occurred.
    #[error("io error: {message}")]
    Io { message: String },

    /// A JSON serialization/deserialization error occurred.
    #[error("json error: {message}")]
    Json { message: String },
}

impl EngineError {
    /// Whether the error was observable before any side effect, so the
    /// caller may retry the whole operation without cleanup.
    #[must_use]
    pub fn is_precondition(&self) -> bool {
        match self {
            Self::InputInvalid { .. }
            | Self::NotFound { .. }
            | Self::Forbidden
            | Self::StagesNotValidated { .. }
            | Self::NotValidated { .. } => true,

            Self::GenerationFailed { .. }
            | Self::ParseFailed { .. }
            | Self::RetrievalNotReady { .. }
            | Self::Retrieval { .. }
            | Self::Llm(_)
            | Self::Io { .. }
            | Self::Json { .. } => false,
        }
    }

    /// A unique error code string for this variant.
    #[must_use]
    pub fn code(&self) -> &'static str {
        match self {
            Self::InputInvalid { .. } => "INPUT_INVALID",
            Self::NotFound { .. } => "NOT_FOUND",
            Self::Forbidden => "FORBIDDEN",
            Self::StagesNotValidated { .. } => "STAGES_NOT_VALIDATED",
            Self::NotValidated { .. } => "NOT_VALIDATED",
            Self::GenerationFailed { .. } => "GENERATION_FAILED",
            Self::ParseFailed { .. } => "PARSE_FAILED",
            Self::RetrievalNotReady { .. } => "RETRIEVAL_NOT_READY",
            Self::Retrieval { .. } => "RETRIEVAL_ERROR",
            Self::Llm(_) => "LLM_ERROR",
            Self::Io { .. } => "IO_ERROR",
            Self::Json { .. } => "JSON_ERROR",
        }
    }
}

impl From<RetrievalError> for EngineError {
    fn from(err: RetrievalError) -> Self {
        match err {
            RetrievalError::NotReady { corpus } => Self::RetrievalNotReady { corpus },
            other => Self::Retrieval {
                message: other.to_string(),
            },
        }
    }
}

impl From<std::io::Error> for EngineError {
    fn from(err: std::io::Error) -> Self {
        Self::Io {
            message: err.to_string(),
        }
    }
}

impl From<serde_json::Error> for EngineError {
    fn from(err: serde_json::Error) -> Self {
        Self::Json {
            message: err.to_string(),
        }
    }
}

impl serde::Serialize for EngineError {
    fn serialize<S: serde::Serializer>(&self, serializer: S) -> Result<S::Ok, S::Error> {
        let mut map = serializer.serialize_map(Some(2))?;
        map.serialize_entry("code", self.code())?;
        map.serialize_entry("message", &self.to_string())?;
        map.end()
    }
}

/// A `Result` type alias using [`EngineError`].
pub type EngineResult<T> = Result<T, EngineError>;
