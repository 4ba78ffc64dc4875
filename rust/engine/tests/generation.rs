//! Project-wide code generation: validation gating, global-label
//! unification, and the all-or-nothing guarantee.

mod common;

use common::{generation_output, harness, seed_stage};
use pretty_assertions::assert_eq;
use stagewright_engine::repo::CodeRepo;
use stagewright_engine::{EngineError, StageType};
use stagewright_llm::LlmError;

#[tokio::test]
async fn generation_requires_every_stage_validated() {
    let h = harness();
    let project = h
        .engine
        .create_project("Gate", "", "user-1")
        .await
        .expect("project");
    let repos = h.engine.repositories();

    let s0 = seed_stage(repos, &project.id, 0, StageType::Idle, true).await;
    let s1 = seed_stage(repos, &project.id, 1, StageType::Safety, false).await;

    let err = h
        .engine
        .generate_project_code(&s0.id, "user-1")
        .await
        .expect_err("should be gated");
    assert_eq!(
        err,
        EngineError::StagesNotValidated {
            stage_ids: vec![s1.id.clone()]
        }
    );
    // No model call was made and nothing was persisted.
    assert!(h.codegen.requests().is_empty());
    assert!(
        repos
            .codes
            .list_by_project(&project.id)
            .await
            .expect("codes")
            .is_empty()
    );
}

#[tokio::test]
async fn global_labels_unify_across_all_stages() {
    let h = harness();
    let project = h
        .engine
        .create_project("Merge", "", "user-1")
        .await
        .expect("project");
    let repos = h.engine.repositories();

    let s0 = seed_stage(repos, &project.id, 0, StageType::Idle, true).await;
    let s1 = seed_stage(repos, &project.id, 1, StageType::Safety, true).await;

    // Stage A emits Start_Button; stage B re-emits it plus Sensor1.
    h.codegen
        .push_response(generation_output(0, "Idle", &[("Start_Button", "X0")]));
    h.codegen.push_response(generation_output(
        1,
        "Safety",
        &[("Start_Button", "X0"), ("Sensor1", "X1")],
    ));

    let code = h
        .engine
        .generate_project_code(&s0.id, "user-1")
        .await
        .expect("generate");

    let devices: Vec<&str> = code
        .global_labels
        .iter()
        .map(|l| l.device.as_str())
        .collect();
    assert_eq!(devices, vec!["X0", "X1"]);

    // Every row in the project carries the identical unified set.
    let code_a = repos.codes.get_by_stage(&s0.id).await.expect("a").expect("a row");
    let code_b = repos.codes.get_by_stage(&s1.id).await.expect("b").expect("b row");
    assert_eq!(code_a.global_labels, code_b.global_labels);
    assert_eq!(code_a.global_labels.len(), 2);

    // Execution types follow the stage types.
    assert_eq!(code_a.execution_type.as_str(), "Initial");
    assert_eq!(code_b.execution_type.as_str(), "Scan");
    assert_eq!(code_a.program_name, "STAGE_0");
}

#[tokio::test]
async fn failed_stage_rolls_back_the_whole_batch() {
    let h = harness();
    let project = h
        .engine
        .create_project("Atomic", "", "user-1")
        .await
        .expect("project");
    let repos = h.engine.repositories();

    let mut stages = Vec::new();
    for number in 0..5 {
        let stage_type = match number {
            0 => StageType::Idle,
            1 => StageType::Safety,
            _ => StageType::Operation,
        };
        stages.push(seed_stage(repos, &project.id, number, stage_type, true).await);
    }

    // First generation succeeds for all five stages.
    for stage in &stages {
        h.codegen.push_response(generation_output(
            stage.stage_number,
            &stage.stage_name,
            &[("Start_Button", "X0")],
        ));
    }
    h.engine
        .generate_project_code(&stages[0].id, "user-1")
        .await
        .expect("first generation");

    let before = repos
        .codes
        .list_by_project(&project.id)
        .await
        .expect("codes before");
    assert_eq!(before.len(), 5);

    // Second run: the third stage's model call fails.
    h.codegen
        .push_response(generation_output(0, "Stage 0", &[("Start_Button", "X0")]));
    h.codegen
        .push_response(generation_output(1, "Stage 1", &[("Start_Button", "X0")]));
    h.codegen.push_error(LlmError::RateLimited {
        message: "quota exhausted".to_string(),
    });

    let err = h
        .engine
        .generate_project_code(&stages[0].id, "user-1")
        .await
        .expect_err("should fail");
    assert_eq!(err.code(), "LLM_ERROR");

    // The code rows are exactly the pre-operation contents.
    let after = repos
        .codes
        .list_by_project(&project.id)
        .await
        .expect("codes after");
    assert_eq!(before, after);

    // No second batch of generation ledger entries exists.
    for stage in &stages {
        let history = h
            .engine
            .stage_version_history(&stage.id, "user-1")
            .await
            .expect("history");
        let generate_entries = history
            .iter()
            .filter(|e| {
                e.metadata.get("action").and_then(serde_json::Value::as_str)
                    == Some("generate_code")
            })
            .count();
        assert_eq!(generate_entries, 1, "stage {}", stage.stage_number);
    }
}

#[tokio::test]
async fn unparseable_generation_output_fails_the_stage() {
    let h = harness();
    let project = h
        .engine
        .create_project("Parse", "", "user-1")
        .await
        .expect("project");
    let repos = h.engine.repositories();

    let s0 = seed_stage(repos, &project.id, 0, StageType::Idle, true).await;

    h.codegen
        .push_response("I am unable to produce code in that format.");

    let err = h
        .engine
        .generate_project_code(&s0.id, "user-1")
        .await
        .expect_err("should fail");
    match err {
        EngineError::GenerationFailed { stage_id, .. } => assert_eq!(stage_id, s0.id),
        other => panic!("expected GenerationFailed, got {other:?}"),
    }
    assert!(
        repos
            .codes
            .list_by_project(&project.id)
            .await
            .expect("codes")
            .is_empty()
    );
}

#[tokio::test]
async fn regeneration_replaces_rows_and_keeps_a_single_current_row() {
    let h = harness();
    let project = h
        .engine
        .create_project("Regen", "", "user-1")
        .await
        .expect("project");
    let repos = h.engine.repositories();

    let s0 = seed_stage(repos, &project.id, 0, StageType::Idle, true).await;

    h.codegen
        .push_response(generation_output(0, "Idle", &[("Start_Button", "X0")]));
    let first = h
        .engine
        .generate_project_code(&s0.id, "user-1")
        .await
        .expect("first");

    h.codegen
        .push_response(generation_output(0, "Idle", &[("Start_Button", "X0")]));
    let second = h
        .engine
        .generate_project_code(&s0.id, "user-1")
        .await
        .expect("second");

    assert_ne!(first.id, second.id);
    let rows = repos
        .codes
        .list_by_project(&project.id)
        .await
        .expect("rows");
    assert_eq!(rows.len(), 1);
    assert_eq!(rows[0].id, second.id);
}

#[tokio::test]
async fn manual_label_edits_resynchronize_across_the_project() {
    let h = harness();
    let project = h
        .engine
        .create_project("Sync", "", "user-1")
        .await
        .expect("project");
    let repos = h.engine.repositories();

    let s0 = seed_stage(repos, &project.id, 0, StageType::Idle, true).await;
    let s1 = seed_stage(repos, &project.id, 1, StageType::Safety, true).await;

    h.codegen
        .push_response(generation_output(0, "Idle", &[("Start_Button", "X0")]));
    h.codegen
        .push_response(generation_output(1, "Safety", &[("Start_Button", "X0")]));
    h.engine
        .generate_project_code(&s0.id, "user-1")
        .await
        .expect("generate");

    // Hand-edit stage 0's globals to add a new device.
    let mut globals = repos
        .codes
        .get_by_stage(&s0.id)
        .await
        .expect("get")
        .expect("row")
        .global_labels;
    globals.push(stagewright_engine::Label {
        name: "Reset_Button".to_string(),
        data_type: "Bit".to_string(),
        class: "VAR_GLOBAL".to_string(),
        device: "X2".to_string(),
        ..stagewright_engine::Label::default()
    });
    h.engine
        .update_generated_code(&s0.id, "user-1", "Idle := TRUE;", Some(globals), None)
        .await
        .expect("update");

    let unified = h
        .engine
        .ensure_common_global_labels(&project.id, "user-1")
        .await
        .expect("unify");
    assert_eq!(unified.len(), 2);

    let row_b = repos
        .codes
        .get_by_stage(&s1.id)
        .await
        .expect("get")
        .expect("row");
    assert!(row_b.global_labels.iter().any(|l| l.device == "X2"));
}

#[tokio::test]
async fn updating_code_overwrites_the_row() {
    let h = harness();
    let project = h
        .engine
        .create_project("Edit", "", "user-1")
        .await
        .expect("project");
    let repos = h.engine.repositories();

    let s0 = seed_stage(repos, &project.id, 0, StageType::Idle, true).await;
    h.codegen
        .push_response(generation_output(0, "Idle", &[("Start_Button", "X0")]));
    h.engine
        .generate_project_code(&s0.id, "user-1")
        .await
        .expect("generate");

    h.engine
        .update_generated_code(&s0.id, "user-1", "Motor := FALSE;", None, Some(Vec::new()))
        .await
        .expect("update");

    let row = repos
        .codes
        .get_by_stage(&s0.id)
        .await
        .expect("get")
        .expect("row");
    assert_eq!(row.program_body, "Motor := FALSE;");
    // Explicit empty list clears the local labels.
    assert!(row.local_labels.is_empty());
    // Globals were not provided and stay untouched.
    assert_eq!(row.global_labels.len(), 1);
}
