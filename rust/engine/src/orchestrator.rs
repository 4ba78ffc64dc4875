//! The pipeline orchestrator: public engine operations over injected
//! collaborators.
//!
//! Writes to one project's stages, code, and history are serialized behind
//! a per-project mutex held for the duration of the operation; operations
//! on different projects run in parallel. Every operation does all of its
//! LLM and retrieval work first and commits afterwards, so a failure (or a
//! cancellation mid-call) leaves persisted state unchanged.

use std::collections::HashMap;
use std::sync::Arc;

use chrono::Utc;
use indexmap::IndexMap;
use semver::Version;
use serde::{Deserialize, Serialize};
use serde_json::Value;
use stagewright_llm::ChatClient;
use stagewright_retrieval::CorpusStore;
use tokio::sync::Mutex;
use tracing::{info, instrument};

use crate::analyzer::{self, FlowAnalysis};
use crate::dependencies::{self, DependencyReport, TransitionGraph};
use crate::error::{EngineError, EngineResult, Entity};
use crate::generate::{CodeGenerator, StageCodeDraft};
use crate::input;
use crate::labels;
use crate::ledger::{ChangeRecord, VersionLedger, VersionSummary};
use crate::model::{
    GeneratedCode, Label, Project, Stage, StageDependency, VersionEntry, initial_version, new_id,
};
use crate::repo::{
    CodeRepo, FileRepo, InMemoryCodeRepo, InMemoryFileRepo, InMemoryProjectRepo,
    InMemorySafetyManualRepo, InMemoryStageRepo, InMemoryVersionHistoryRepo, ProjectRepo,
    SafetyManualRepo, StageRepo, VersionHistoryRepo,
};
use crate::safety::{SafetyAssessment, SafetyInterrogator};
use crate::segregate::StageSegregator;
use crate::types::VersionAction;
use crate::validate::{StageValidation, StageValidator};

/// The repository set the engine operates over.
#[derive(Clone)]
pub struct Repositories {
    pub projects: Arc<dyn ProjectRepo>,
    pub stages: Arc<dyn StageRepo>,
    pub codes: Arc<dyn CodeRepo>,
    pub history: Arc<dyn VersionHistoryRepo>,
    pub safety_manuals: Arc<dyn SafetyManualRepo>,
    pub files: Arc<dyn FileRepo>,
}

impl Repositories {
    /// A fully in-memory repository set (tests, embedded use).
    #[must_use]
    pub fn in_memory() -> Self {
        Self {
            projects: Arc::new(InMemoryProjectRepo::default()),
            stages: Arc::new(InMemoryStageRepo::default()),
            codes: Arc::new(InMemoryCodeRepo::default()),
            history: Arc::new(InMemoryVersionHistoryRepo::default()),
            safety_manuals: Arc::new(InMemorySafetyManualRepo::default()),
            files: Arc::new(InMemoryFileRepo::default()),
        }
    }
}

/// The result of ingesting raw control logic.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct PlanResult {
    pub analysis: FlowAnalysis,
    pub stages: Vec<Stage>,
    pub dependencies: Vec<StageDependency>,
    pub dependency_validation: DependencyReport,
    pub transition_graph: TransitionGraph,
    pub total_stages: usize,
}

/// The pipeline engine.
pub struct Engine {
    repos: Repositories,
    segregator: StageSegregator,
    validator: StageValidator,
    generator: CodeGenerator,
    interrogator: SafetyInterrogator,
    ledger: VersionLedger,
    project_locks: Mutex<HashMap<String, Arc<Mutex<()>>>>,
}

impl Engine {
    /// Assemble an engine from its collaborators.
    ///
    /// `conversational` serves segregation, the assistant, and safety
    /// interrogation; `codegen` (independent, higher-quota credentials)
    /// serves stage validation and code generation.
    #[must_use]
    pub fn new(
        repos: Repositories,
        corpus: Arc<CorpusStore>,
        conversational: Arc<dyn ChatClient>,
        codegen: Arc<dyn ChatClient>,
    ) -> Self {
        let ledger = VersionLedger::new(repos.history.clone(), repos.stages.clone());
        Self {
            segregator: StageSegregator::new(conversational.clone(), corpus.clone()),
            validator: StageValidator::new(codegen.clone(), corpus.clone()),
            generator: CodeGenerator::new(codegen, corpus.clone()),
            interrogator: SafetyInterrogator::new(conversational, corpus),
            ledger,
            repos,
            project_locks: Mutex::new(HashMap::new()),
        }
    }

    /// The repositories this engine operates over.
    #[must_use]
    pub fn repositories(&self) -> &Repositories {
        &self.repos
    }

    async fn project_lock(&self, project_id: &str) -> Arc<Mutex<()>> {
        let mut locks = self.project_locks.lock().await;
        locks.entry(project_id.to_string()).or_default().clone()
    }

    async fn owned_project(&self, project_id: &str, user_id: &str) -> EngineResult<Project> {
        let project = self
            .repos
            .projects
            .get_by_id(project_id)
            .await?
            .ok_or_else(|| EngineError::NotFound {
                entity: Entity::Project,
                id: project_id.to_string(),
            })?;
        if project.owner_id != user_id {
            return Err(EngineError::Forbidden);
        }
        Ok(project)
    }

    async fn owned_stage(&self, stage_id: &str, user_id: &str) -> EngineResult<(Stage, Project)> {
        let stage = self
            .repos
            .stages
            .get_by_id(stage_id)
            .await?
            .ok_or_else(|| EngineError::NotFound {
                entity: Entity::Stage,
                id: stage_id.to_string(),
            })?;
        let project = self.owned_project(&stage.project_id, user_id).await?;
        Ok((stage, project))
    }

    // -----------------------------------------------------------------
    // Projects
    // -----------------------------------------------------------------

    /// Create a project owned by `user_id`.
    pub async fn create_project(
        &self,
        name: &str,
        description: &str,
        user_id: &str,
    ) -> EngineResult<Project> {
        let project = Project::new(name, description, user_id);
        self.repos.projects.create(project.clone()).await?;
        info!(project = %project.id, "project created");
        Ok(project)
    }

    /// Hard-delete a project and everything it owns.
    pub async fn delete_project(&self, project_id: &str, user_id: &str) -> EngineResult<()> {
        self.owned_project(project_id, user_id).await?;
        let lock = self.project_lock(project_id).await;
        let _guard = lock.lock().await;

        let stage_ids: Vec<String> = self
            .repos
            .stages
            .list_by_project(project_id)
            .await?
            .into_iter()
            .map(|stage| stage.id)
            .collect();

        self.repos
            .history
            .delete_by_project_stages(&stage_ids)
            .await?;
        self.repos.codes.delete_by_project(project_id).await?;
        self.repos.stages.delete_project_stages(project_id).await?;
        self.repos.safety_manuals.delete_by_project(project_id).await?;
        self.repos.files.delete_by_project(project_id).await?;
        self.repos.projects.hard_delete(project_id).await?;
        info!(project = project_id, "project deleted");
        Ok(())
    }

    // -----------------------------------------------------------------
    // Planning
    // -----------------------------------------------------------------

    /// Validate, analyze, and segregate raw control logic, replacing all
    /// stages of the project with the new plan.
    #[instrument(skip(self, text), fields(project = project_id))]
    pub async fn ingest_logic(
        &self,
        project_id: &str,
        user_id: &str,
        text: &str,
    ) -> EngineResult<PlanResult> {
        self.owned_project(project_id, user_id).await?;
        let lock = self.project_lock(project_id).await;
        let _guard = lock.lock().await;

        let report = input::validate(text);
        if let Some(rejection) = report.rejection {
            return Err(EngineError::InputInvalid { rejection });
        }

        let analysis = analyzer::analyze(text);
        let plan = self.segregator.segregate(text, &analysis).await?;
        let dependency_validation =
            dependencies::validate_dependencies(&plan.stages, &plan.dependencies);
        let transition_graph = dependencies::transition_graph(&plan.stages, &plan.dependencies);

        // All model work succeeded; now replace the project's stages.
        self.repos.stages.delete_project_stages(project_id).await?;
        let now = Utc::now();
        let mut stages = Vec::with_capacity(plan.stages.len());
        for planned in &plan.stages {
            let stage = Stage {
                id: new_id(),
                project_id: project_id.to_string(),
                stage_number: planned.stage_number,
                stage_name: planned.stage_name.clone(),
                stage_type: planned.stage_type,
                description: planned.description.clone(),
                original_logic: planned.original_logic.clone(),
                edited_logic: None,
                is_validated: false,
                is_finalized: false,
                version_number: initial_version(),
                last_action: None,
                last_action_timestamp: None,
                created_at: now,
                updated_at: now,
            };
            self.repos.stages.create(stage.clone()).await?;
            stages.push(stage);
        }

        info!(stages = stages.len(), "plan persisted");
        Ok(PlanResult {
            analysis,
            total_stages: stages.len(),
            stages,
            dependencies: plan.dependencies,
            dependency_validation,
            transition_graph,
        })
    }

    // -----------------------------------------------------------------
    // Stage lifecycle
    // -----------------------------------------------------------------

    /// Record a user edit of the stage's logic.
    pub async fn edit_stage_logic(
        &self,
        stage_id: &str,
        user_id: &str,
        text: &str,
    ) -> EngineResult<VersionEntry> {
        let (stage, project) = self.owned_stage(stage_id, user_id).await?;
        let lock = self.project_lock(&project.id).await;
        let _guard = lock.lock().await;

        let old_logic = stage.effective_logic().to_string();
        self.repos
            .stages
            .update_logic(stage_id, text.to_string())
            .await?;

        let code_id = self
            .repos
            .codes
            .get_by_stage(stage_id)
            .await?
            .map(|code| code.id);

        let mut metadata = IndexMap::new();
        metadata.insert(
            "description".to_string(),
            Value::from("stage logic edited"),
        );
        self.ledger
            .record(
                stage_id,
                VersionAction::EditLogic,
                ChangeRecord {
                    code_id,
                    user_id: user_id.to_string(),
                    old_text: Some(old_logic),
                    new_text: Some(text.to_string()),
                    metadata,
                },
            )
            .await
    }

    /// Run the semantic/logical/safety triage for a stage; on pass, mark
    /// it validated and record the ledger event.
    pub async fn validate_stage(
        &self,
        stage_id: &str,
        user_id: &str,
    ) -> EngineResult<StageValidation> {
        let (stage, project) = self.owned_stage(stage_id, user_id).await?;
        let lock = self.project_lock(&project.id).await;
        let _guard = lock.lock().await;

        let result = self.validator.validate_stage(&stage).await?;

        if result.valid {
            self.repos.stages.mark_validated(stage_id).await?;

            let code_id = self
                .repos
                .codes
                .get_by_stage(stage_id)
                .await?
                .map(|code| code.id);
            let mut metadata = IndexMap::new();
            metadata.insert("description".to_string(), Value::from("stage validated"));
            metadata.insert(
                "validation_status".to_string(),
                Value::from(result.status.clone()),
            );
            metadata.insert("passed".to_string(), Value::from(result.valid));
            self.ledger
                .record(
                    stage_id,
                    VersionAction::Validate,
                    ChangeRecord {
                        code_id,
                        user_id: user_id.to_string(),
                        metadata,
                        ..ChangeRecord::default()
                    },
                )
                .await?;
        }

        Ok(result)
    }

    /// Lock a validated stage against further edits.
    pub async fn finalize_stage(&self, stage_id: &str, user_id: &str) -> EngineResult<()> {
        let (stage, project) = self.owned_stage(stage_id, user_id).await?;
        let lock = self.project_lock(&project.id).await;
        let _guard = lock.lock().await;

        if !stage.is_validated {
            return Err(EngineError::NotValidated {
                stage_id: stage_id.to_string(),
            });
        }
        self.repos.stages.mark_finalized(stage_id).await
    }

    // -----------------------------------------------------------------
    // Code generation
    // -----------------------------------------------------------------

    /// Generate code for every stage of the requested stage's project,
    /// unify global labels across the results, and persist the new rows.
    ///
    /// All-or-nothing: any stage failing to generate leaves every
    /// previously persisted code row untouched. Returns the row for the
    /// requested stage.
    #[instrument(skip(self), fields(stage = stage_id))]
    pub async fn generate_project_code(
        &self,
        stage_id: &str,
        user_id: &str,
    ) -> EngineResult<GeneratedCode> {
        let (_, project) = self.owned_stage(stage_id, user_id).await?;
        let lock = self.project_lock(&project.id).await;
        let _guard = lock.lock().await;

        let all_stages = self.repos.stages.list_by_project(&project.id).await?;
        let unvalidated: Vec<String> = all_stages
            .iter()
            .filter(|stage| !stage.is_validated)
            .map(|stage| stage.id.clone())
            .collect();
        if !unvalidated.is_empty() {
            return Err(EngineError::StagesNotValidated {
                stage_ids: unvalidated,
            });
        }

        // Phase 1: all model work, no persistence. A failure here aborts
        // the whole operation with prior rows intact.
        let mut drafts: Vec<(Stage, StageCodeDraft)> = Vec::with_capacity(all_stages.len());
        for stage in all_stages {
            let draft = self.generator.generate_stage(&stage, None).await?;
            if !draft.parsed.has_program_blocks() {
                return Err(EngineError::GenerationFailed {
                    stage_id: stage.id.clone(),
                    reason: "no program blocks recognized in generation output".to_string(),
                });
            }
            drafts.push((stage, draft));
        }

        let unified = labels::unify(
            drafts
                .iter()
                .map(|(_, draft)| draft.parsed.global_labels.as_slice()),
        );

        // Phase 2: replace the project's code rows and record the ledger
        // events, every row carrying the unified global labels.
        for (stage, draft) in &drafts {
            let old_body = self
                .repos
                .codes
                .get_by_stage(&stage.id)
                .await?
                .map(|code| code.program_body)
                .unwrap_or_default();
            self.repos.codes.delete_by_stage(&stage.id).await?;

            let mut metadata = IndexMap::new();
            metadata.insert(
                "program_name".to_string(),
                Value::from(draft.program_name.clone()),
            );
            metadata.insert(
                "execution_type".to_string(),
                Value::from(draft.execution_type.as_str()),
            );

            let code = GeneratedCode {
                id: new_id(),
                project_id: project.id.clone(),
                stage_id: stage.id.clone(),
                global_labels: unified.clone(),
                local_labels: draft.parsed.local_labels.clone(),
                program_body: draft.parsed.program_body.clone(),
                program_blocks: draft.parsed.program_blocks.clone(),
                functions: draft.parsed.functions.clone(),
                function_blocks: draft.parsed.function_blocks.clone(),
                program_name: draft.program_name.clone(),
                execution_type: draft.execution_type,
                metadata,
                created_at: Utc::now(),
            };
            self.repos.codes.create(code.clone()).await?;

            let mut entry_metadata = IndexMap::new();
            entry_metadata.insert(
                "description".to_string(),
                Value::from("code generated for all stages"),
            );
            entry_metadata.insert(
                "program_name".to_string(),
                Value::from(draft.program_name.clone()),
            );
            entry_metadata.insert(
                "global_labels_count".to_string(),
                Value::from(unified.len()),
            );
            entry_metadata.insert(
                "local_labels_count".to_string(),
                Value::from(draft.parsed.local_labels.len()),
            );
            entry_metadata.insert(
                "program_blocks_count".to_string(),
                Value::from(draft.parsed.program_blocks.len()),
            );
            entry_metadata.insert(
                "functions_count".to_string(),
                Value::from(draft.parsed.functions.len()),
            );
            entry_metadata.insert(
                "function_blocks_count".to_string(),
                Value::from(draft.parsed.function_blocks.len()),
            );
            self.ledger
                .record(
                    &stage.id,
                    VersionAction::GenerateCode,
                    ChangeRecord {
                        code_id: Some(code.id.clone()),
                        user_id: user_id.to_string(),
                        old_text: Some(old_body),
                        new_text: Some(code.program_body.clone()),
                        metadata: entry_metadata,
                    },
                )
                .await?;
        }

        info!(project = %project.id, stages = drafts.len(), "project code generated");

        self.repos
            .codes
            .get_by_stage(stage_id)
            .await?
            .ok_or_else(|| EngineError::NotFound {
                entity: Entity::GeneratedCode,
                id: stage_id.to_string(),
            })
    }

    /// Overwrite a stage's generated code with a manual edit.
    pub async fn update_generated_code(
        &self,
        stage_id: &str,
        user_id: &str,
        program_body: &str,
        global_labels: Option<Vec<Label>>,
        local_labels: Option<Vec<Label>>,
    ) -> EngineResult<()> {
        let (_, project) = self.owned_stage(stage_id, user_id).await?;
        let lock = self.project_lock(&project.id).await;
        let _guard = lock.lock().await;

        let mut code = self
            .repos
            .codes
            .get_by_stage(stage_id)
            .await?
            .ok_or_else(|| EngineError::NotFound {
                entity: Entity::GeneratedCode,
                id: stage_id.to_string(),
            })?;

        code.program_body = program_body.to_string();
        if let Some(globals) = global_labels {
            code.global_labels = globals;
        }
        if let Some(locals) = local_labels {
            code.local_labels = locals;
        }
        self.repos.codes.update(code.clone()).await?;

        let mut metadata = IndexMap::new();
        metadata.insert(
            "description".to_string(),
            Value::from("code manually edited"),
        );
        metadata.insert(
            "global_labels_count".to_string(),
            Value::from(code.global_labels.len()),
        );
        metadata.insert(
            "local_labels_count".to_string(),
            Value::from(code.local_labels.len()),
        );
        self.ledger
            .record(
                stage_id,
                VersionAction::EditCode,
                ChangeRecord {
                    code_id: Some(code.id),
                    user_id: user_id.to_string(),
                    metadata,
                    ..ChangeRecord::default()
                },
            )
            .await?;
        Ok(())
    }

    // -----------------------------------------------------------------
    // Safety
    // -----------------------------------------------------------------

    /// Interrogate a stage's generated code against the project's safety
    /// manual (or the default corpus) and record the ledger event.
    pub async fn safety_check(
        &self,
        stage_id: &str,
        user_id: &str,
        require_project_manual: bool,
    ) -> EngineResult<SafetyAssessment> {
        let (_, project) = self.owned_stage(stage_id, user_id).await?;
        let lock = self.project_lock(&project.id).await;
        let _guard = lock.lock().await;

        let code = self
            .repos
            .codes
            .get_by_stage(stage_id)
            .await?
            .ok_or_else(|| EngineError::NotFound {
                entity: Entity::GeneratedCode,
                id: stage_id.to_string(),
            })?;

        let assessment = self
            .interrogator
            .interrogate(&project.id, &code, require_project_manual)
            .await?;

        let mut metadata = IndexMap::new();
        metadata.insert("description".to_string(), Value::from("safety check"));
        metadata.insert("status".to_string(), Value::from(assessment.status.clone()));
        metadata.insert(
            "risk_level".to_string(),
            Value::from(assessment.risk_level.clone()),
        );
        metadata.insert("passed".to_string(), Value::from(assessment.passed));
        self.ledger
            .record(
                stage_id,
                VersionAction::SafetyCheck,
                ChangeRecord {
                    code_id: Some(code.id),
                    user_id: user_id.to_string(),
                    metadata,
                    ..ChangeRecord::default()
                },
            )
            .await?;

        Ok(assessment)
    }

    // -----------------------------------------------------------------
    // Reads
    // -----------------------------------------------------------------

    /// Full version history for a stage, newest first.
    pub async fn stage_version_history(
        &self,
        stage_id: &str,
        user_id: &str,
    ) -> EngineResult<Vec<VersionEntry>> {
        self.owned_stage(stage_id, user_id).await?;
        self.ledger.history(stage_id).await
    }

    /// The unique history entry carrying `version` for a stage.
    pub async fn stage_version_by_number(
        &self,
        stage_id: &str,
        user_id: &str,
        version: &Version,
    ) -> EngineResult<VersionEntry> {
        self.owned_stage(stage_id, user_id).await?;
        self.ledger.by_version(stage_id, version).await
    }

    /// Condensed versioning view for a stage.
    pub async fn stage_version_summary(
        &self,
        stage_id: &str,
        user_id: &str,
    ) -> EngineResult<VersionSummary> {
        self.owned_stage(stage_id, user_id).await?;
        self.ledger.summary(stage_id).await
    }

    /// The deduplicated global labels across all of a project's code rows.
    pub async fn project_global_labels(
        &self,
        project_id: &str,
        user_id: &str,
    ) -> EngineResult<Vec<Label>> {
        self.owned_project(project_id, user_id).await?;
        let codes = self.repos.codes.list_by_project(project_id).await?;
        Ok(labels::unify(
            codes.iter().map(|code| code.global_labels.as_slice()),
        ))
    }

    /// Re-unify global labels across the project and write the union back
    /// into every code row, in one commit. Returns the unified set.
    pub async fn ensure_common_global_labels(
        &self,
        project_id: &str,
        user_id: &str,
    ) -> EngineResult<Vec<Label>> {
        self.owned_project(project_id, user_id).await?;
        let lock = self.project_lock(project_id).await;
        let _guard = lock.lock().await;

        let codes = self.repos.codes.list_by_project(project_id).await?;
        let unified = labels::unify(codes.iter().map(|code| code.global_labels.as_slice()));
        let updated = self
            .repos
            .codes
            .update_global_labels(project_id, &unified)
            .await?;
        info!(project = project_id, rows = updated, "global labels unified");
        Ok(unified)
    }
}
