//! Append-only version ledger with semantic-version increments.
//!
//! Every engine mutation appends one entry and advances the stage's
//! version: `validate` and `generate_code` bump the minor version (patch
//! resets to zero), everything else bumps the patch. Entries snapshot the
//! before/after text and a unified diff where the action has a text field.

use std::sync::Arc;

use chrono::Utc;
use indexmap::IndexMap;
use semver::Version;
use serde::{Deserialize, Serialize};
use serde_json::Value;
use similar::TextDiff;
use tracing::debug;

use crate::error::{EngineError, EngineResult, Entity};
use crate::model::{VersionEntry, new_id};
use crate::repo::{StageRepo, VersionHistoryRepo};
use crate::types::{VersionAction, VersionLevel};

/// Number of context lines around each diff hunk.
const DIFF_CONTEXT: usize = 3;

/// Apply the bump table for `action` to `version`.
#[must_use]
pub fn bump_version(version: &Version, action: VersionAction) -> Version {
    let mut next = version.clone();
    if action.bumps_minor() {
        next.minor += 1;
        next.patch = 0;
    } else {
        next.patch += 1;
    }
    next
}

/// Produce a unified diff (3 context lines) between two texts.
///
/// Returns an empty string when both sides are empty.
#[must_use]
pub fn unified_diff(old: &str, new: &str) -> String {
    if old.is_empty() && new.is_empty() {
        return String::new();
    }
    TextDiff::from_lines(old, new)
        .unified_diff()
        .context_radius(DIFF_CONTEXT)
        .to_string()
}

/// One recorded change, before the ledger fills in versioning fields.
#[derive(Debug, Clone, Default)]
pub struct ChangeRecord {
    pub code_id: Option<String>,
    pub user_id: String,
    pub old_text: Option<String>,
    pub new_text: Option<String>,
    pub metadata: IndexMap<String, Value>,
}

/// Condensed view of a stage's versioning state.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct VersionSummary {
    pub current_version: Version,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub last_action: Option<VersionAction>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub last_updated: Option<chrono::DateTime<Utc>>,
    pub total_versions: usize,
    /// The most recent entries, newest first (at most ten).
    pub recent: Vec<SummaryEntry>,
}

/// One line of the version summary.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct SummaryEntry {
    pub version: Version,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub action: Option<String>,
    pub timestamp: chrono::DateTime<Utc>,
}

/// Writes and reads the append-only history.
pub struct VersionLedger {
    history: Arc<dyn VersionHistoryRepo>,
    stages: Arc<dyn StageRepo>,
}

impl VersionLedger {
    /// Create a ledger over the given repositories.
    #[must_use]
    pub fn new(history: Arc<dyn VersionHistoryRepo>, stages: Arc<dyn StageRepo>) -> Self {
        Self { history, stages }
    }

    /// Append an entry for `action` on `stage_id` and advance the stage's
    /// version. Returns the appended entry.
    pub async fn record(
        &self,
        stage_id: &str,
        action: VersionAction,
        change: ChangeRecord,
    ) -> EngineResult<VersionEntry> {
        let stage = self
            .stages
            .get_by_id(stage_id)
            .await?
            .ok_or_else(|| EngineError::NotFound {
                entity: Entity::Stage,
                id: stage_id.to_string(),
            })?;

        let previous = stage.version_number.clone();
        let next = bump_version(&previous, action);
        let timestamp = Utc::now();

        let diff = match action {
            VersionAction::EditLogic | VersionAction::GenerateCode => {
                let old = change.old_text.as_deref().unwrap_or_default();
                let new = change.new_text.as_deref().unwrap_or_default();
                let text = unified_diff(old, new);
                (!text.is_empty()).then_some(text)
            }
            VersionAction::EditCode | VersionAction::Validate | VersionAction::SafetyCheck => None,
        };

        let mut metadata = IndexMap::new();
        metadata.insert("action".to_string(), Value::from(action.as_str()));
        metadata.insert(
            "previous_version".to_string(),
            Value::from(previous.to_string()),
        );
        metadata.insert("new_version".to_string(), Value::from(next.to_string()));
        metadata.extend(change.metadata);

        let entry = VersionEntry {
            id: new_id(),
            code_id: change.code_id,
            stage_id: stage_id.to_string(),
            user_id: change.user_id,
            level: VersionLevel::Event,
            version_number: next.clone(),
            old_code: change.old_text,
            new_code: change.new_text,
            diff,
            session_id: None,
            timestamp,
            metadata,
        };

        self.history.append(entry.clone()).await?;
        self.stages
            .update_version_metadata(stage_id, next.clone(), action, timestamp)
            .await?;

        debug!(stage = stage_id, action = %action, version = %next, "ledger entry appended");
        Ok(entry)
    }

    /// All entries for a stage, newest first.
    pub async fn history(&self, stage_id: &str) -> EngineResult<Vec<VersionEntry>> {
        self.history.list_by_stage(stage_id).await
    }

    /// The unique entry carrying `version` for a stage.
    pub async fn by_version(&self, stage_id: &str, version: &Version) -> EngineResult<VersionEntry> {
        self.history
            .by_version(stage_id, version)
            .await?
            .ok_or_else(|| EngineError::NotFound {
                entity: Entity::VersionEntry,
                id: format!("{stage_id}@{version}"),
            })
    }

    /// Current version, last action, and the ten most recent entries.
    pub async fn summary(&self, stage_id: &str) -> EngineResult<VersionSummary> {
        let stage = self
            .stages
            .get_by_id(stage_id)
            .await?
            .ok_or_else(|| EngineError::NotFound {
                entity: Entity::Stage,
                id: stage_id.to_string(),
            })?;
        let entries = self.history.list_by_stage(stage_id).await?;

        Ok(VersionSummary {
            current_version: stage.version_number,
            last_action: stage.last_action,
            last_updated: stage.last_action_timestamp,
            total_versions: entries.len(),
            recent: entries
                .iter()
                .take(10)
                .map(|entry| SummaryEntry {
                    version: entry.version_number.clone(),
                    action: entry
                        .metadata
                        .get("action")
                        .and_then(Value::as_str)
                        .map(str::to_string),
                    timestamp: entry.timestamp,
                })
                .collect(),
        })
    }
}
