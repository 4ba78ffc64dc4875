//! Shared fixtures: a scripted chat client and an engine wired to
//! in-memory repositories and a temporary corpus store.

// Each test binary uses a different subset of these fixtures.
#![allow(dead_code)]

use std::collections::VecDeque;
use std::sync::{Arc, Mutex};

use async_trait::async_trait;
use stagewright_engine::repo::StageRepo;
use stagewright_engine::{Engine, Repositories, Stage, StageType, initial_version, new_id};
use stagewright_llm::{ChatClient, ChatMessage, ChatOptions, LlmError, LlmResult};
use stagewright_retrieval::CorpusStore;

/// A chat client that replays a scripted queue of responses and records
/// every request it receives.
#[derive(Default)]
pub struct ScriptedChatClient {
    responses: Mutex<VecDeque<LlmResult<String>>>,
    requests: Mutex<Vec<Vec<ChatMessage>>>,
}

impl ScriptedChatClient {
    pub fn push_response(&self, text: impl Into<String>) {
        self.responses
            .lock()
            .expect("responses lock")
            .push_back(Ok(text.into()));
    }

    pub fn push_error(&self, error: LlmError) {
        self.responses
            .lock()
            .expect("responses lock")
            .push_back(Err(error));
    }

    pub fn requests(&self) -> Vec<Vec<ChatMessage>> {
        self.requests.lock().expect("requests lock").clone()
    }
}

#[async_trait]
impl ChatClient for ScriptedChatClient {
    async fn chat(&self, messages: &[ChatMessage], _options: ChatOptions) -> LlmResult<String> {
        self.requests
            .lock()
            .expect("requests lock")
            .push(messages.to_vec());
        self.responses
            .lock()
            .expect("responses lock")
            .pop_front()
            .unwrap_or_else(|| {
                Err(LlmError::BadResponse {
                    message: "scripted client exhausted".to_string(),
                })
            })
    }
}

/// An engine over in-memory repositories, scripted model clients, and a
/// corpus store rooted in a temporary directory.
pub struct TestHarness {
    pub engine: Engine,
    pub conversational: Arc<ScriptedChatClient>,
    pub codegen: Arc<ScriptedChatClient>,
    pub corpus: Arc<CorpusStore>,
    pub tmp: tempfile::TempDir,
}

#[must_use]
pub fn harness() -> TestHarness {
    let tmp = tempfile::tempdir().expect("tempdir");
    let corpus = Arc::new(CorpusStore::new(tmp.path().join("corpora")));
    let conversational = Arc::new(ScriptedChatClient::default());
    let codegen = Arc::new(ScriptedChatClient::default());
    let engine = Engine::new(
        Repositories::in_memory(),
        corpus.clone(),
        conversational.clone(),
        codegen.clone(),
    );
    TestHarness {
        engine,
        conversational,
        codegen,
        corpus,
        tmp,
    }
}

/// Insert a stage row directly, bypassing segregation.
pub async fn seed_stage(
    repos: &Repositories,
    project_id: &str,
    number: u32,
    stage_type: StageType,
    validated: bool,
) -> Stage {
    let now = chrono::Utc::now();
    let stage = Stage {
        id: new_id(),
        project_id: project_id.to_string(),
        stage_number: number,
        stage_name: format!("Stage {number}"),
        stage_type,
        description: format!("Seeded stage {number}"),
        original_logic: format!("Seeded logic for stage {number}"),
        edited_logic: None,
        is_validated: validated,
        is_finalized: false,
        version_number: initial_version(),
        last_action: None,
        last_action_timestamp: None,
        created_at: now,
        updated_at: now,
    };
    repos.stages.create(stage.clone()).await.expect("create stage");
    stage
}

/// A 60-word description used by the planning scenarios.
#[must_use]
pub fn conveyor_description() -> String {
    "The operator presses the start button to start the conveyor belt motor. \
     The conveyor runs continuously while material is present on the belt. \
     When the emergency stop button is pressed the conveyor must stop \
     immediately and stay stopped. The system may only restart after the \
     operator resets the emergency stop and presses the start button again \
     under safe conditions."
        .to_string()
}

/// The scripted segregation reply for the conveyor scenario: the two
/// mandatory stages plus one operation stage.
#[must_use]
pub fn conveyor_plan_json() -> String {
    r#"{
  "stages": [
    {
      "stage_number": 0,
      "stage_name": "Idle Stage",
      "stage_type": "idle",
      "description": "System idle, all outputs off",
      "original_logic": "Initial safe state"
    },
    {
      "stage_number": 1,
      "stage_name": "Safety Check Stage",
      "stage_type": "safety",
      "description": "Verify emergency stop and interlocks",
      "original_logic": "When the emergency stop button is pressed the conveyor must stop immediately and stay stopped."
    },
    {
      "stage_number": 2,
      "stage_name": "Conveyor Operation",
      "stage_type": "operation",
      "description": "Run the conveyor while material is present",
      "original_logic": "The operator presses the start button to start the conveyor belt motor. The conveyor runs continuously while material is present on the belt."
    }
  ],
  "dependencies": [
    {"from_stage": 0, "to_stage": 1, "condition": "System powered and ready"},
    {"from_stage": 1, "to_stage": 2, "condition": "Safety checks passed"}
  ]
}"#
    .to_string()
}

/// A generation reply conforming to the structured output grammar.
#[must_use]
pub fn generation_output(stage_number: u32, stage_name: &str, globals: &[(&str, &str)]) -> String {
    let mut out = String::from(
        "==============================\n\
         1) GLOBAL LABEL TABLE\n\
         ==============================\n\
         Label Name | Data Type | Class | Device Name | Initial Value | Constant | English | Remark\n",
    );
    for (name, device) in globals {
        out.push_str(&format!(
            "{name} | Bit | VAR_GLOBAL | {device} | FALSE | No | {name} signal | -\n"
        ));
    }
    out.push_str(&format!(
        "\n==============================\n\
         2) PROGRAM BLOCKS\n\
         ==============================\n\
         ----------------------\n\
         PROGRAM BLOCK\n\
         Stage: {stage_number} - {stage_name}\n\
         Program Name: STAGE_{stage_number}_MAIN\n\
         Execution Type: Scan\n\
         ----------------------\n\
         LOCAL LABEL TABLE:\n\
         Label Name | Data Type | Class | Initial Value | Constant | English\n\
         Seq_Step | Word | VAR | 0 | No | Sequence step\n\
         \n\
         STRUCTURED TEXT CODE:\n\
         IF Start_Button THEN\n\
         \x20   Running := TRUE;\n\
         END_IF;\n"
    ));
    out
}

/// A validation reply with no critical issues.
#[must_use]
pub fn passing_validation() -> String {
    "\
==============================
VALIDATION STATUS
==============================
Status: PASS

==============================
ISSUES
==============================
- None observed

==============================
RECOMMENDATIONS
==============================
- Consider adding a cycle counter

==============================
CATEGORIZED ISSUES
==============================

[OPTIONAL] Cycle counter
Description: A counter would aid diagnostics.

==============================
ANALYSIS SUMMARY
==============================
Semantic Analysis: Clear conditions and actions.
Logical Consistency: No contradictions.
Safety Compliance: Emergency stop present.
"
    .to_string()
}
