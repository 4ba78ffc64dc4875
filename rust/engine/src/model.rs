//! Engine data model: projects, stages, labels, generated code, and
//! version-ledger entries.

use chrono::{DateTime, Utc};
use indexmap::IndexMap;
use semver::Version;
use serde::{Deserialize, Serialize};
use serde_json::Value;

use crate::types::{ExecutionType, ProjectStatus, StageType, VersionAction, VersionLevel};

/// Return a fresh v4 entity id.
#[must_use]
pub fn new_id() -> String {
    uuid::Uuid::new_v4().to_string()
}

/// The initial semantic version of every stage.
#[must_use]
pub fn initial_version() -> Version {
    Version::new(1, 0, 0)
}

/// A user-owned control project aggregating stages, generated code, and
/// history.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Project {
    pub id: String,
    pub name: String,
    pub description: String,
    pub owner_id: String,
    pub status: ProjectStatus,
    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
}

impl Project {
    /// Create an active project owned by `owner_id`.
    #[must_use]
    pub fn new(
        name: impl Into<String>,
        description: impl Into<String>,
        owner_id: impl Into<String>,
    ) -> Self {
        let now = Utc::now();
        Self {
            id: new_id(),
            name: name.into(),
            description: description.into(),
            owner_id: owner_id.into(),
            status: ProjectStatus::Active,
            created_at: now,
            updated_at: now,
        }
    }
}

/// One ordered partition of a control process.
///
/// `original_logic` is immutable after creation; user edits land in
/// `edited_logic`. Per project, `stage_number` forms the contiguous
/// sequence `0..N-1` with stage 0 idle and stage 1 safety.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Stage {
    pub id: String,
    pub project_id: String,
    pub stage_number: u32,
    pub stage_name: String,
    pub stage_type: StageType,
    pub description: String,
    pub original_logic: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub edited_logic: Option<String>,
    pub is_validated: bool,
    pub is_finalized: bool,
    pub version_number: Version,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub last_action: Option<VersionAction>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub last_action_timestamp: Option<DateTime<Utc>>,
    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
}

impl Stage {
    /// The logic to validate and generate from: the user's edit when one
    /// exists, the original text otherwise.
    #[must_use]
    pub fn effective_logic(&self) -> &str {
        match &self.edited_logic {
            Some(edited) if !edited.trim().is_empty() => edited,
            _ => &self.original_logic,
        }
    }
}

/// A transition between two stage numbers of the same project.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct StageDependency {
    pub from_stage: u32,
    pub to_stage: u32,
    #[serde(default)]
    pub condition: String,
}

/// A symbolic variable in a global or local label table.
///
/// Optional columns are empty strings rather than `Option`s so rows
/// survive the lossy pipe-table round trip unchanged.
#[derive(Debug, Clone, PartialEq, Eq, Default, Serialize, Deserialize)]
pub struct Label {
    pub name: String,
    pub data_type: String,
    pub class: String,
    #[serde(default, skip_serializing_if = "String::is_empty")]
    pub device: String,
    #[serde(default, skip_serializing_if = "String::is_empty")]
    pub initial_value: String,
    #[serde(default)]
    pub constant: bool,
    #[serde(default, skip_serializing_if = "String::is_empty")]
    pub comment: String,
    #[serde(default, skip_serializing_if = "String::is_empty")]
    pub remark: String,
}

impl Label {
    /// The identity used for project-wide de-duplication: the device
    /// assignment when present, the label name otherwise.
    #[must_use]
    pub fn identity(&self) -> &str {
        if self.device.is_empty() {
            &self.name
        } else {
            &self.device
        }
    }
}

/// A named program block with its own local labels and ST body.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ProgramBlock {
    /// The `Stage: N - Name` metadata propagated from generation.
    pub stage: String,
    pub name: String,
    pub execution_type: ExecutionType,
    pub local_labels: Vec<Label>,
    pub code: String,
}

/// A named function with a result type.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct StFunction {
    pub stage: String,
    pub name: String,
    pub with_en: bool,
    pub result_type: String,
    pub local_labels: Vec<Label>,
    pub code: String,
}

/// A named function block (subroutine or macro type).
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct FunctionBlock {
    pub stage: String,
    pub name: String,
    pub fb_type: String,
    pub with_en: bool,
    pub local_labels: Vec<Label>,
    pub code: String,
}

/// The current generated-code row for one stage.
///
/// At most one row exists per stage; regeneration replaces it (the prior
/// text survives in the version ledger). After unification, every row of a
/// project holds an identical `global_labels` list.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct GeneratedCode {
    pub id: String,
    pub project_id: String,
    pub stage_id: String,
    pub global_labels: Vec<Label>,
    pub local_labels: Vec<Label>,
    pub program_body: String,
    pub program_blocks: Vec<ProgramBlock>,
    pub functions: Vec<StFunction>,
    pub function_blocks: Vec<FunctionBlock>,
    pub program_name: String,
    pub execution_type: ExecutionType,
    #[serde(default)]
    pub metadata: IndexMap<String, Value>,
    pub created_at: DateTime<Utc>,
}

/// One append-only version-ledger entry.
///
/// Entries are never updated nor deleted; `version_number` is the stage's
/// version after the recorded action was applied.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct VersionEntry {
    pub id: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub code_id: Option<String>,
    pub stage_id: String,
    pub user_id: String,
    pub level: VersionLevel,
    pub version_number: Version,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub old_code: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub new_code: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub diff: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub session_id: Option<String>,
    pub timestamp: DateTime<Utc>,
    #[serde(default)]
    pub metadata: IndexMap<String, Value>,
}

/// A safety manual uploaded for one project.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct SafetyManual {
    pub id: String,
    pub project_id: String,
    pub file_name: String,
    pub stored_path: String,
    pub uploaded_at: DateTime<Utc>,
}

/// A document or audio file uploaded as project input.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct UploadedFile {
    pub id: String,
    pub project_id: String,
    pub file_name: String,
    pub content_type: String,
    pub stored_path: String,
    pub uploaded_at: DateTime<Utc>,
}
