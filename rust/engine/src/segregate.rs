//! LLM-driven partition of raw control logic into ordered stages.

use std::sync::Arc;

use serde::{Deserialize, Serialize};
use stagewright_llm::{ChatClient, ChatMessage, ChatOptions};
use stagewright_retrieval::{CorpusId, CorpusStore};
use tracing::{info, warn};

use crate::analyzer::FlowAnalysis;
use crate::error::EngineResult;
use crate::grounding::context_for;
use crate::model::StageDependency;
use crate::types::StageType;

/// Retrieval query grounding the segregation prompt.
const CONTEXT_QUERY: &str = "PLC stage programming control flow stages";

const SEGREGATION_PROMPT: &str = "\
You are an expert PLC control system architect specializing in stage-based \
control flow design.

Your task is to analyze user-provided control logic and segregate it into \
clear operational stages.

MANDATORY STAGE STRUCTURE:
- Stage 0: Idle Stage (ALWAYS REQUIRED)
  Purpose: Safe baseline state, all outputs OFF, system ready

- Stage 1: Safety Check Stage (ALWAYS REQUIRED)
  Purpose: Verify interlocks, emergency conditions, system readiness

- Stage 2+: Process Stages (AS NEEDED)
  Purpose: Actual control operations, sequencing, automation

CRITICAL RULES:
1. NEVER add logic the user didn't provide
2. NEVER remove logic the user provided
3. NEVER change the meaning of user's logic
4. Extract and map user's exact words to appropriate stages
5. If user didn't mention idle/safety, create minimal placeholder stages
6. Each stage must have ONLY the logic relevant to it

OUTPUT FORMAT:
- JSON structure with stages array
- Each stage has: stage_number, stage_name, stage_type, description, original_logic
- Dependencies array showing stage transitions";

/// A stage as proposed by segregation, before persistence.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct PlannedStage {
    pub stage_number: u32,
    pub stage_name: String,
    pub stage_type: StageType,
    #[serde(default)]
    pub description: String,
    #[serde(default)]
    pub original_logic: String,
}

/// The segregation result: ordered stages plus their transitions.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct StagePlan {
    pub stages: Vec<PlannedStage>,
    #[serde(default)]
    pub dependencies: Vec<StageDependency>,
}

/// Partitions validated control logic into stages via the conversational
/// model, grounded in the primary manual corpus.
pub struct StageSegregator {
    chat: Arc<dyn ChatClient>,
    corpus: Arc<CorpusStore>,
}

impl StageSegregator {
    /// Create a segregator over the given model client and corpus store.
    #[must_use]
    pub fn new(chat: Arc<dyn ChatClient>, corpus: Arc<CorpusStore>) -> Self {
        Self { chat, corpus }
    }

    /// Segregate `control_logic` into a plan satisfying the mandatory
    /// stage structure.
    ///
    /// The model's JSON is recovered from the first `{ … }` block of its
    /// reply; an unusable reply falls back to the minimal two-stage plan.
    pub async fn segregate(
        &self,
        control_logic: &str,
        analysis: &FlowAnalysis,
    ) -> EngineResult<StagePlan> {
        let manual_context =
            context_for(&self.corpus, &CorpusId::Primary, CONTEXT_QUERY, 2).await?;

        let messages = [
            ChatMessage::system(format!(
                "{SEGREGATION_PROMPT}\n\n=== MANUAL CONTEXT ===\n{manual_context}"
            )),
            ChatMessage::user(user_request(control_logic, analysis)),
        ];

        let response = self
            .chat
            .chat(
                &messages,
                ChatOptions {
                    temperature: 0.2,
                    max_tokens: 3000,
                },
            )
            .await?;

        let plan = match recover_plan(&response) {
            Some(plan) => normalize(plan).unwrap_or_else(|| {
                warn!("segregation reply violated the mandatory stage structure; using fallback");
                fallback_plan()
            }),
            None => {
                warn!("segregation reply contained no parseable JSON; using fallback");
                fallback_plan()
            }
        };

        info!(stages = plan.stages.len(), "control logic segregated");
        Ok(plan)
    }
}

fn user_request(control_logic: &str, analysis: &FlowAnalysis) -> String {
    let actuators = analysis
        .detected_actuators
        .iter()
        .take(5)
        .cloned()
        .collect::<Vec<_>>()
        .join(", ");

    format!(
        r#"Analyze this control logic and segregate it into stages.

CONTROL LOGIC:
{control_logic}

ANALYSIS SUMMARY:
- Word count: {word_count}
- Complexity: {complexity}
- Has emergency logic: {has_emergency}
- Has safety logic: {has_safety}
- Detected actuators: {actuators}

Provide the stage segregation in the following JSON format:
{{
  "stages": [
    {{
      "stage_number": 0,
      "stage_name": "Idle Stage",
      "stage_type": "idle",
      "description": "Brief description",
      "original_logic": "Exact logic from user input for this stage"
    }},
    ...
  ],
  "dependencies": [
    {{
      "from_stage": 0,
      "to_stage": 1,
      "condition": "Description of transition condition"
    }}
  ]
}}

CRITICAL RULES:
1. Stage 0 MUST be Idle Stage
2. Stage 1 MUST be Safety Check Stage
3. Extract ONLY the logic user provided - do NOT add new logic
4. Preserve exact user wording in original_logic
5. Each stage must have clear purpose
"#,
        word_count = analysis.word_count,
        complexity = analysis.complexity_score,
        has_emergency = analysis.has_emergency_logic,
        has_safety = analysis.has_safety_logic,
    )
}

/// Recover the JSON plan from free-form model output by locating the
/// outermost `{ … }` block.
fn recover_plan(response: &str) -> Option<StagePlan> {
    let start = response.find('{')?;
    let end = response.rfind('}')?;
    if end <= start {
        return None;
    }
    serde_json::from_str(&response[start..=end]).ok()
}

/// Sort and renumber the stages to the contiguous sequence `0..N-1`,
/// remapping dependency endpoints, then require the mandatory structure
/// (stage 0 idle, stage 1 safety). Returns `None` when the plan cannot
/// satisfy it.
fn normalize(mut plan: StagePlan) -> Option<StagePlan> {
    if plan.stages.len() < 2 {
        return None;
    }

    plan.stages.sort_by_key(|s| s.stage_number);

    let remap: std::collections::HashMap<u32, u32> = plan
        .stages
        .iter()
        .enumerate()
        .map(|(index, stage)| {
            #[allow(clippy::cast_possible_truncation)]
            let index = index as u32;
            (stage.stage_number, index)
        })
        .collect();

    for (index, stage) in plan.stages.iter_mut().enumerate() {
        #[allow(clippy::cast_possible_truncation)]
        {
            stage.stage_number = index as u32;
        }
    }

    // Endpoints the plan never declared are left as-is for the dependency
    // validator to report.
    for dep in &mut plan.dependencies {
        if let Some(&mapped) = remap.get(&dep.from_stage) {
            dep.from_stage = mapped;
        }
        if let Some(&mapped) = remap.get(&dep.to_stage) {
            dep.to_stage = mapped;
        }
    }

    if plan.stages[0].stage_type != StageType::Idle
        || plan.stages[1].stage_type != StageType::Safety
    {
        return None;
    }

    Some(plan)
}

/// The minimal plan emitted when the model's reply is unusable: the two
/// mandatory stages and the single transition between them.
#[must_use]
pub fn fallback_plan() -> StagePlan {
    StagePlan {
        stages: vec![
            PlannedStage {
                stage_number: 0,
                stage_name: "Idle Stage".to_string(),
                stage_type: StageType::Idle,
                description: "System idle state with all outputs safe".to_string(),
                original_logic: "Initial safe state".to_string(),
            },
            PlannedStage {
                stage_number: 1,
                stage_name: "Safety Check Stage".to_string(),
                stage_type: StageType::Safety,
                description: "Verify safety conditions and interlocks".to_string(),
                original_logic: "Safety validation".to_string(),
            },
        ],
        dependencies: vec![StageDependency {
            from_stage: 0,
            to_stage: 1,
            condition: "System ready and no faults".to_string(),
        }],
    }
}
