//! Stage validation and finalization gates.

mod common;

use common::{harness, passing_validation, seed_stage};
use pretty_assertions::assert_eq;
use stagewright_engine::repo::StageRepo;
use stagewright_engine::types::IssueSeverity;
use stagewright_engine::{EngineError, StageType};
use stagewright_llm::LlmError;

#[tokio::test]
async fn passing_validation_marks_the_stage_and_bumps_minor() {
    let h = harness();
    let project = h
        .engine
        .create_project("Validate", "", "user-1")
        .await
        .expect("project");
    let repos = h.engine.repositories();
    let stage = seed_stage(repos, &project.id, 0, StageType::Idle, false).await;

    h.codegen.push_response(passing_validation());
    let result = h
        .engine
        .validate_stage(&stage.id, "user-1")
        .await
        .expect("validate");

    assert!(result.valid);
    assert_eq!(result.status, "PASS");
    assert_eq!(result.recommendations.len(), 1);

    let current = repos
        .stages
        .get_by_id(&stage.id)
        .await
        .expect("get")
        .expect("stage");
    assert!(current.is_validated);
    assert_eq!(current.version_number.to_string(), "1.1.0");
}

#[tokio::test]
async fn critical_issue_fails_validation_despite_a_literal_pass() {
    let h = harness();
    let project = h
        .engine
        .create_project("Critical", "", "user-1")
        .await
        .expect("project");
    let repos = h.engine.repositories();
    let stage = seed_stage(repos, &project.id, 0, StageType::Idle, false).await;

    h.codegen.push_response(
        "\
Status: PASS

==============================
CATEGORIZED ISSUES
==============================
[CRITICAL] No emergency stop handling
Description: The logic never references an emergency stop.
Recommended Logic:
Stop all outputs when the emergency stop input opens.
",
    );

    let result = h
        .engine
        .validate_stage(&stage.id, "user-1")
        .await
        .expect("validate");
    assert!(!result.valid);
    assert_eq!(result.status, "FAIL");
    assert_eq!(result.categorized_issues[0].severity, IssueSeverity::Critical);

    // The stage stays unvalidated and no ledger entry was written.
    let current = repos
        .stages
        .get_by_id(&stage.id)
        .await
        .expect("get")
        .expect("stage");
    assert!(!current.is_validated);
    assert_eq!(current.version_number.to_string(), "1.0.0");
    let history = h
        .engine
        .stage_version_history(&stage.id, "user-1")
        .await
        .expect("history");
    assert!(history.is_empty());
}

#[tokio::test]
async fn empty_validator_response_is_an_llm_error() {
    let h = harness();
    let project = h
        .engine
        .create_project("Empty", "", "user-1")
        .await
        .expect("project");
    let repos = h.engine.repositories();
    let stage = seed_stage(repos, &project.id, 0, StageType::Idle, false).await;

    h.codegen.push_response("   \n ");
    let err = h
        .engine
        .validate_stage(&stage.id, "user-1")
        .await
        .expect_err("should fail");
    assert_eq!(err.code(), "LLM_ERROR");
}

#[tokio::test]
async fn transport_failures_propagate_without_state_changes() {
    let h = harness();
    let project = h
        .engine
        .create_project("Down", "", "user-1")
        .await
        .expect("project");
    let repos = h.engine.repositories();
    let stage = seed_stage(repos, &project.id, 0, StageType::Idle, false).await;

    h.codegen.push_error(LlmError::Transport {
        message: "connection refused".to_string(),
    });
    let err = h
        .engine
        .validate_stage(&stage.id, "user-1")
        .await
        .expect_err("should fail");
    assert!(matches!(err, EngineError::Llm(LlmError::Transport { .. })));

    let current = repos
        .stages
        .get_by_id(&stage.id)
        .await
        .expect("get")
        .expect("stage");
    assert!(!current.is_validated);
}

#[tokio::test]
async fn finalize_requires_validation() {
    let h = harness();
    let project = h
        .engine
        .create_project("Finalize", "", "user-1")
        .await
        .expect("project");
    let repos = h.engine.repositories();
    let stage = seed_stage(repos, &project.id, 0, StageType::Idle, false).await;

    let err = h
        .engine
        .finalize_stage(&stage.id, "user-1")
        .await
        .expect_err("should be gated");
    assert_eq!(
        err,
        EngineError::NotValidated {
            stage_id: stage.id.clone()
        }
    );
    let current = repos
        .stages
        .get_by_id(&stage.id)
        .await
        .expect("get")
        .expect("stage");
    assert!(!current.is_finalized);

    // After validation, finalization succeeds.
    h.codegen.push_response(passing_validation());
    h.engine
        .validate_stage(&stage.id, "user-1")
        .await
        .expect("validate");
    h.engine
        .finalize_stage(&stage.id, "user-1")
        .await
        .expect("finalize");

    let current = repos
        .stages
        .get_by_id(&stage.id)
        .await
        .expect("get")
        .expect("stage");
    assert!(current.is_finalized);
}

#[tokio::test]
async fn edited_logic_is_what_gets_validated() {
    let h = harness();
    let project = h
        .engine
        .create_project("Edited", "", "user-1")
        .await
        .expect("project");
    let repos = h.engine.repositories();
    let stage = seed_stage(repos, &project.id, 0, StageType::Idle, false).await;

    h.engine
        .edit_stage_logic(&stage.id, "user-1", "Hold every actuator off while idle.")
        .await
        .expect("edit");

    h.codegen.push_response(passing_validation());
    h.engine
        .validate_stage(&stage.id, "user-1")
        .await
        .expect("validate");

    let requests = h.codegen.requests();
    let user_message = &requests[0][1];
    assert!(
        user_message
            .content
            .contains("Hold every actuator off while idle.")
    );
    assert!(!user_message.content.contains("Seeded logic for stage 0"));
}
