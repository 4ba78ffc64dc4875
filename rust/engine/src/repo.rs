//! Repository contracts and in-memory implementations.
//!
//! The engine only depends on these traits; a persistent store is an
//! external implementation. The in-memory repositories back the test
//! suites and lightweight embeddings of the engine. They preserve
//! insertion order and recover from poisoned locks, so a panicked caller
//! cannot wedge unrelated operations.

use std::sync::RwLock;

use async_trait::async_trait;
use chrono::{DateTime, Utc};
use indexmap::IndexMap;
use semver::Version;

use crate::error::{EngineError, EngineResult, Entity};
use crate::model::{GeneratedCode, Label, Project, SafetyManual, Stage, UploadedFile, VersionEntry};
use crate::types::VersionAction;

// ---------------------------------------------------------------------------
// Contracts
// ---------------------------------------------------------------------------

/// Storage for projects.
#[async_trait]
pub trait ProjectRepo: Send + Sync {
    async fn create(&self, project: Project) -> EngineResult<()>;
    async fn get_by_id(&self, id: &str) -> EngineResult<Option<Project>>;
    async fn list_for_user(&self, owner_id: &str) -> EngineResult<Vec<Project>>;
    async fn list_all(&self) -> EngineResult<Vec<Project>>;
    async fn hard_delete(&self, id: &str) -> EngineResult<()>;
}

/// Storage for stages.
#[async_trait]
pub trait StageRepo: Send + Sync {
    async fn create(&self, stage: Stage) -> EngineResult<()>;
    async fn get_by_id(&self, id: &str) -> EngineResult<Option<Stage>>;
    /// All stages of a project, ordered by stage number.
    async fn list_by_project(&self, project_id: &str) -> EngineResult<Vec<Stage>>;
    async fn update_logic(&self, stage_id: &str, edited_logic: String) -> EngineResult<()>;
    async fn mark_validated(&self, stage_id: &str) -> EngineResult<()>;
    async fn mark_finalized(&self, stage_id: &str) -> EngineResult<()>;
    async fn delete_project_stages(&self, project_id: &str) -> EngineResult<()>;
    /// Advance the stage's version and last-action bookkeeping.
    async fn update_version_metadata(
        &self,
        stage_id: &str,
        version: Version,
        action: VersionAction,
        timestamp: DateTime<Utc>,
    ) -> EngineResult<()>;
}

/// Storage for generated-code rows (at most one per stage).
#[async_trait]
pub trait CodeRepo: Send + Sync {
    async fn create(&self, code: GeneratedCode) -> EngineResult<()>;
    async fn get_by_stage(&self, stage_id: &str) -> EngineResult<Option<GeneratedCode>>;
    async fn list_by_project(&self, project_id: &str) -> EngineResult<Vec<GeneratedCode>>;
    async fn delete_by_stage(&self, stage_id: &str) -> EngineResult<()>;
    /// Replace the row for the code's stage.
    async fn update(&self, code: GeneratedCode) -> EngineResult<()>;
    /// Write the unified global-label set into every row of the project.
    /// Returns the number of rows written; commits exactly once.
    async fn update_global_labels(
        &self,
        project_id: &str,
        labels: &[Label],
    ) -> EngineResult<usize>;
    async fn delete_by_project(&self, project_id: &str) -> EngineResult<()>;
}

/// Storage for the append-only version history.
#[async_trait]
pub trait VersionHistoryRepo: Send + Sync {
    async fn append(&self, entry: VersionEntry) -> EngineResult<()>;
    /// Entries for a stage, newest first.
    async fn list_by_stage(&self, stage_id: &str) -> EngineResult<Vec<VersionEntry>>;
    async fn by_version(
        &self,
        stage_id: &str,
        version: &Version,
    ) -> EngineResult<Option<VersionEntry>>;
    /// Cascade path for project hard-deletion; entries are otherwise
    /// never removed.
    async fn delete_by_project_stages(&self, stage_ids: &[String]) -> EngineResult<()>;
}

/// Storage for per-project safety manuals.
#[async_trait]
pub trait SafetyManualRepo: Send + Sync {
    async fn save(&self, manual: SafetyManual) -> EngineResult<()>;
    async fn get_by_project(&self, project_id: &str) -> EngineResult<Option<SafetyManual>>;
    async fn delete_by_project(&self, project_id: &str) -> EngineResult<()>;
}

/// Storage for uploaded input files.
#[async_trait]
pub trait FileRepo: Send + Sync {
    async fn save(&self, file: UploadedFile) -> EngineResult<()>;
    async fn list_by_project(&self, project_id: &str) -> EngineResult<Vec<UploadedFile>>;
    async fn delete_by_project(&self, project_id: &str) -> EngineResult<()>;
}

// ---------------------------------------------------------------------------
// In-memory implementations
// ---------------------------------------------------------------------------

fn read_rows<T>(lock: &RwLock<T>) -> std::sync::RwLockReadGuard<'_, T> {
    lock.read().unwrap_or_else(std::sync::PoisonError::into_inner)
}

fn write_rows<T>(lock: &RwLock<T>) -> std::sync::RwLockWriteGuard<'_, T> {
    lock.write()
        .unwrap_or_else(std::sync::PoisonError::into_inner)
}

fn stage_not_found(stage_id: &str) -> EngineError {
    EngineError::NotFound {
        entity: Entity::Stage,
        id: stage_id.to_string(),
    }
}

/// In-memory [`ProjectRepo`].
#[derive(Debug, Default)]
pub struct InMemoryProjectRepo {
    rows: RwLock<IndexMap<String, Project>>,
}

#[async_trait]
impl ProjectRepo for InMemoryProjectRepo {
    async fn create(&self, project: Project) -> EngineResult<()> {
        write_rows(&self.rows).insert(project.id.clone(), project);
        Ok(())
    }

    async fn get_by_id(&self, id: &str) -> EngineResult<Option<Project>> {
        Ok(read_rows(&self.rows).get(id).cloned())
    }

    async fn list_for_user(&self, owner_id: &str) -> EngineResult<Vec<Project>> {
        Ok(read_rows(&self.rows)
            .values()
            .filter(|p| p.owner_id == owner_id)
            .cloned()
            .collect())
    }

    async fn list_all(&self) -> EngineResult<Vec<Project>> {
        Ok(read_rows(&self.rows).values().cloned().collect())
    }

    async fn hard_delete(&self, id: &str) -> EngineResult<()> {
        write_rows(&self.rows).shift_remove(id);
        Ok(())
    }
}

/// In-memory [`StageRepo`].
#[derive(Debug, Default)]
pub struct InMemoryStageRepo {
    rows: RwLock<IndexMap<String, Stage>>,
}

impl InMemoryStageRepo {
    fn with_stage<R>(
        &self,
        stage_id: &str,
        mutate: impl FnOnce(&mut Stage) -> R,
    ) -> EngineResult<R> {
        let mut rows = write_rows(&self.rows);
        let stage = rows.get_mut(stage_id).ok_or_else(|| stage_not_found(stage_id))?;
        let result = mutate(stage);
        stage.updated_at = Utc::now();
        Ok(result)
    }
}

#[async_trait]
impl StageRepo for InMemoryStageRepo {
    async fn create(&self, stage: Stage) -> EngineResult<()> {
        write_rows(&self.rows).insert(stage.id.clone(), stage);
        Ok(())
    }

    async fn get_by_id(&self, id: &str) -> EngineResult<Option<Stage>> {
        Ok(read_rows(&self.rows).get(id).cloned())
    }

    async fn list_by_project(&self, project_id: &str) -> EngineResult<Vec<Stage>> {
        let mut stages: Vec<Stage> = read_rows(&self.rows)
            .values()
            .filter(|s| s.project_id == project_id)
            .cloned()
            .collect();
        stages.sort_by_key(|s| s.stage_number);
        Ok(stages)
    }

    async fn update_logic(&self, stage_id: &str, edited_logic: String) -> EngineResult<()> {
        self.with_stage(stage_id, |stage| {
            stage.edited_logic = Some(edited_logic);
        })
    }

    async fn mark_validated(&self, stage_id: &str) -> EngineResult<()> {
        self.with_stage(stage_id, |stage| {
            stage.is_validated = true;
        })
    }

    async fn mark_finalized(&self, stage_id: &str) -> EngineResult<()> {
        self.with_stage(stage_id, |stage| {
            stage.is_finalized = true;
        })
    }

    async fn delete_project_stages(&self, project_id: &str) -> EngineResult<()> {
        write_rows(&self.rows).retain(|_, stage| stage.project_id != project_id);
        Ok(())
    }

    async fn update_version_metadata(
        &self,
        stage_id: &str,
        version: Version,
        action: VersionAction,
        timestamp: DateTime<Utc>,
    ) -> EngineResult<()> {
        self.with_stage(stage_id, |stage| {
            stage.version_number = version;
            stage.last_action = Some(action);
            stage.last_action_timestamp = Some(timestamp);
        })
    }
}

/// In-memory [`CodeRepo`].
#[derive(Debug, Default)]
pub struct InMemoryCodeRepo {
    rows: RwLock<IndexMap<String, GeneratedCode>>,
}

#[async_trait]
impl CodeRepo for InMemoryCodeRepo {
    async fn create(&self, code: GeneratedCode) -> EngineResult<()> {
        write_rows(&self.rows).insert(code.id.clone(), code);
        Ok(())
    }

    async fn get_by_stage(&self, stage_id: &str) -> EngineResult<Option<GeneratedCode>> {
        Ok(read_rows(&self.rows)
            .values()
            .find(|c| c.stage_id == stage_id)
            .cloned())
    }

    async fn list_by_project(&self, project_id: &str) -> EngineResult<Vec<GeneratedCode>> {
        Ok(read_rows(&self.rows)
            .values()
            .filter(|c| c.project_id == project_id)
            .cloned()
            .collect())
    }

    async fn delete_by_stage(&self, stage_id: &str) -> EngineResult<()> {
        write_rows(&self.rows).retain(|_, code| code.stage_id != stage_id);
        Ok(())
    }

    async fn update(&self, code: GeneratedCode) -> EngineResult<()> {
        let mut rows = write_rows(&self.rows);
        if !rows.contains_key(&code.id) {
            return Err(EngineError::NotFound {
                entity: Entity::GeneratedCode,
                id: code.id.clone(),
            });
        }
        rows.insert(code.id.clone(), code);
        Ok(())
    }

    async fn update_global_labels(
        &self,
        project_id: &str,
        labels: &[Label],
    ) -> EngineResult<usize> {
        let mut rows = write_rows(&self.rows);
        let mut updated = 0;
        for code in rows.values_mut().filter(|c| c.project_id == project_id) {
            code.global_labels = labels.to_vec();
            updated += 1;
        }
        Ok(updated)
    }

    async fn delete_by_project(&self, project_id: &str) -> EngineResult<()> {
        write_rows(&self.rows).retain(|_, code| code.project_id != project_id);
        Ok(())
    }
}

/// In-memory [`VersionHistoryRepo`].
#[derive(Debug, Default)]
pub struct InMemoryVersionHistoryRepo {
    rows: RwLock<Vec<VersionEntry>>,
}

#[async_trait]
impl VersionHistoryRepo for InMemoryVersionHistoryRepo {
    async fn append(&self, entry: VersionEntry) -> EngineResult<()> {
        write_rows(&self.rows).push(entry);
        Ok(())
    }

    async fn list_by_stage(&self, stage_id: &str) -> EngineResult<Vec<VersionEntry>> {
        let mut entries: Vec<VersionEntry> = read_rows(&self.rows)
            .iter()
            .filter(|e| e.stage_id == stage_id)
            .cloned()
            .collect();
        // Newest first; entries appended later win timestamp ties.
        entries.reverse();
        entries.sort_by(|a, b| b.timestamp.cmp(&a.timestamp));
        Ok(entries)
    }

    async fn by_version(
        &self,
        stage_id: &str,
        version: &Version,
    ) -> EngineResult<Option<VersionEntry>> {
        Ok(read_rows(&self.rows)
            .iter()
            .find(|e| e.stage_id == stage_id && e.version_number == *version)
            .cloned())
    }

    async fn delete_by_project_stages(&self, stage_ids: &[String]) -> EngineResult<()> {
        write_rows(&self.rows).retain(|entry| !stage_ids.contains(&entry.stage_id));
        Ok(())
    }
}

/// In-memory [`SafetyManualRepo`].
#[derive(Debug, Default)]
pub struct InMemorySafetyManualRepo {
    rows: RwLock<IndexMap<String, SafetyManual>>,
}

#[async_trait]
impl SafetyManualRepo for InMemorySafetyManualRepo {
    async fn save(&self, manual: SafetyManual) -> EngineResult<()> {
        write_rows(&self.rows).insert(manual.id.clone(), manual);
        Ok(())
    }

    async fn get_by_project(&self, project_id: &str) -> EngineResult<Option<SafetyManual>> {
        Ok(read_rows(&self.rows)
            .values()
            .find(|m| m.project_id == project_id)
            .cloned())
    }

    async fn delete_by_project(&self, project_id: &str) -> EngineResult<()> {
        write_rows(&self.rows).retain(|_, manual| manual.project_id != project_id);
        Ok(())
    }
}

/// In-memory [`FileRepo`].
#[derive(Debug, Default)]
pub struct InMemoryFileRepo {
    rows: RwLock<IndexMap<String, UploadedFile>>,
}

#[async_trait]
impl FileRepo for InMemoryFileRepo {
    async fn save(&self, file: UploadedFile) -> EngineResult<()> {
        write_rows(&self.rows).insert(file.id.clone(), file);
        Ok(())
    }

    async fn list_by_project(&self, project_id: &str) -> EngineResult<Vec<UploadedFile>> {
        Ok(read_rows(&self.rows)
            .values()
            .filter(|f| f.project_id == project_id)
            .cloned()
            .collect())
    }

    async fn delete_by_project(&self, project_id: &str) -> EngineResult<()> {
        write_rows(&self.rows).retain(|_, file| file.project_id != project_id);
        Ok(())
    }
}
