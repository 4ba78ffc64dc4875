//! Safety interrogation: corpus selection, assessment parsing, ledger
//! events.

mod common;

use common::{generation_output, harness, seed_stage};
use pretty_assertions::assert_eq;
use stagewright_engine::StageType;
use stagewright_retrieval::CorpusId;

const ASSESSMENT: &str = "\
==============================
SAFETY CHECK RESULT
==============================
Overall Status: WARNING
Risk Level: MEDIUM

==============================
SAFETY COMPLIANCE ANALYSIS
==============================
The stop circuit is present but not monitored.

==============================
MISSING SAFETY CHECKS
==============================
- Monitor the contactor feedback loop

==============================
REQUIRED CORRECTIONS
==============================
- Add feedback monitoring before restart

==============================
SAFETY RECOMMENDATIONS
==============================
- Document the restart procedure
";

async fn build_default_safety_corpus(h: &common::TestHarness) {
    let manual = h.tmp.path().join("site_safety.txt");
    let body = "All machine restarts require operator acknowledgement. ".repeat(30);
    std::fs::write(&manual, body).expect("write manual");
    h.corpus
        .build(&CorpusId::DefaultSafety, &[manual])
        .await
        .expect("build corpus");
}

/// Generate one code row for a fresh single-stage project.
async fn project_with_code(h: &common::TestHarness) -> (String, String) {
    let project = h
        .engine
        .create_project("Safety", "", "user-1")
        .await
        .expect("project");
    let stage = seed_stage(
        h.engine.repositories(),
        &project.id,
        0,
        StageType::Idle,
        true,
    )
    .await;
    h.codegen
        .push_response(generation_output(0, "Idle", &[("Start_Button", "X0")]));
    h.engine
        .generate_project_code(&stage.id, "user-1")
        .await
        .expect("generate");
    (project.id, stage.id)
}

#[tokio::test]
async fn safety_check_runs_against_the_default_corpus() {
    let h = harness();
    build_default_safety_corpus(&h).await;
    let (_, stage_id) = project_with_code(&h).await;

    h.conversational.push_response(ASSESSMENT);
    let assessment = h
        .engine
        .safety_check(&stage_id, "user-1", false)
        .await
        .expect("safety check");

    assert!(assessment.passed);
    assert_eq!(assessment.status, "WARNING");
    assert_eq!(assessment.risk_level, "MEDIUM");
    assert_eq!(assessment.missing_checks.len(), 1);
    assert_eq!(assessment.required_corrections.len(), 1);

    // The safety rules retrieved from the corpus rode along in the prompt.
    let requests = h.conversational.requests();
    let user_message = &requests[0][1];
    assert!(user_message.content.contains("operator acknowledgement"));

    // The ledger recorded a patch-level safety_check event.
    let history = h
        .engine
        .stage_version_history(&stage_id, "user-1")
        .await
        .expect("history");
    let newest = &history[0];
    assert_eq!(
        newest.metadata.get("action").and_then(|v| v.as_str()),
        Some("safety_check")
    );
    assert_eq!(newest.version_number.to_string(), "1.1.1");
}

#[tokio::test]
async fn project_manual_is_preferred_over_the_default_corpus() {
    let h = harness();
    build_default_safety_corpus(&h).await;
    let (project_id, stage_id) = project_with_code(&h).await;

    let manual = h.tmp.path().join("project_manual.txt");
    let body = "Zone gates must be interlocked with the conveyor drive. ".repeat(30);
    std::fs::write(&manual, body).expect("write manual");
    h.corpus
        .build(&CorpusId::ProjectSafety(project_id.clone()), &[manual])
        .await
        .expect("build project corpus");

    h.conversational.push_response(ASSESSMENT);
    h.engine
        .safety_check(&stage_id, "user-1", false)
        .await
        .expect("safety check");

    let requests = h.conversational.requests();
    let user_message = &requests[0][1];
    assert!(user_message.content.contains("Zone gates"));
    assert!(!user_message.content.contains("operator acknowledgement"));
}

#[tokio::test]
async fn requiring_a_missing_project_manual_is_not_found() {
    let h = harness();
    build_default_safety_corpus(&h).await;
    let (_, stage_id) = project_with_code(&h).await;

    let err = h
        .engine
        .safety_check(&stage_id, "user-1", true)
        .await
        .expect_err("should fail");
    assert_eq!(err.code(), "NOT_FOUND");
}

#[tokio::test]
async fn no_corpus_at_all_is_retrieval_not_ready() {
    let h = harness();
    let (_, stage_id) = project_with_code(&h).await;

    let err = h
        .engine
        .safety_check(&stage_id, "user-1", false)
        .await
        .expect_err("should fail");
    assert_eq!(err.code(), "RETRIEVAL_NOT_READY");
}

#[tokio::test]
async fn safety_check_without_code_is_not_found() {
    let h = harness();
    build_default_safety_corpus(&h).await;
    let project = h
        .engine
        .create_project("NoCode", "", "user-1")
        .await
        .expect("project");
    let stage = seed_stage(
        h.engine.repositories(),
        &project.id,
        0,
        StageType::Idle,
        true,
    )
    .await;

    let err = h
        .engine
        .safety_check(&stage.id, "user-1", false)
        .await
        .expect_err("should fail");
    assert_eq!(err.code(), "NOT_FOUND");
}
