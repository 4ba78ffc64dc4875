//! Safety interrogation of generated code against a safety-manual corpus.
//!
//! Prefers the project's uploaded manual; falls back to the shared default
//! safety corpus. The sectioned assessment is parsed with the same
//! tolerance as the stage validator: headers delimit sections, list items
//! begin with `-`, and anything unparseable degrades to empty values.

use std::sync::Arc;

use serde::{Deserialize, Serialize};
use stagewright_llm::{ChatClient, ChatMessage, ChatOptions};
use stagewright_retrieval::{CorpusId, CorpusStore, RetrievalError};
use tracing::info;

use crate::error::{EngineError, EngineResult, Entity};
use crate::model::{GeneratedCode, Label};

/// Chunks of safety context retrieved per interrogation.
const SAFETY_CHUNKS: usize = 5;

/// The structured outcome of a safety interrogation.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct SafetyAssessment {
    /// True when the overall status is PASS or WARNING.
    pub passed: bool,
    /// PASS, WARNING, or FAIL.
    pub status: String,
    /// LOW, MEDIUM, HIGH, CRITICAL, or UNKNOWN.
    pub risk_level: String,
    pub compliance_analysis: String,
    pub missing_checks: Vec<String>,
    pub violations: Vec<String>,
    pub hazards: Vec<String>,
    pub required_corrections: Vec<String>,
    pub recommendations: Vec<String>,
}

impl Default for SafetyAssessment {
    fn default() -> Self {
        Self {
            passed: false,
            status: "FAIL".to_string(),
            risk_level: "UNKNOWN".to_string(),
            compliance_analysis: String::new(),
            missing_checks: Vec::new(),
            violations: Vec::new(),
            hazards: Vec::new(),
            required_corrections: Vec::new(),
            recommendations: Vec::new(),
        }
    }
}

/// Interrogates generated code against safety manuals.
pub struct SafetyInterrogator {
    chat: Arc<dyn ChatClient>,
    corpus: Arc<CorpusStore>,
}

impl SafetyInterrogator {
    /// Create an interrogator over the given model client and corpus store.
    #[must_use]
    pub fn new(chat: Arc<dyn ChatClient>, corpus: Arc<CorpusStore>) -> Self {
        Self { chat, corpus }
    }

    /// Pick the corpus to interrogate against: the project manual when
    /// present, else the shared default corpus.
    ///
    /// With `require_project_manual`, a missing project corpus is a
    /// [`EngineError::NotFound`] for the safety manual instead of a
    /// fallback.
    async fn select_corpus(
        &self,
        project_id: &str,
        require_project_manual: bool,
    ) -> EngineResult<CorpusId> {
        let project_corpus = CorpusId::ProjectSafety(project_id.to_string());
        match self.corpus.ensure_loaded(&project_corpus).await {
            Ok(()) => return Ok(project_corpus),
            Err(RetrievalError::NotReady { .. }) if !require_project_manual => {}
            Err(RetrievalError::NotReady { .. }) => {
                return Err(EngineError::NotFound {
                    entity: Entity::SafetyManual,
                    id: project_id.to_string(),
                });
            }
            Err(err) => return Err(err.into()),
        }

        let default = CorpusId::DefaultSafety;
        self.corpus.ensure_loaded(&default).await?;
        Ok(default)
    }

    /// Run the safety interrogation for one generated-code row.
    pub async fn interrogate(
        &self,
        project_id: &str,
        code: &GeneratedCode,
        require_project_manual: bool,
    ) -> EngineResult<SafetyAssessment> {
        let corpus_id = self.select_corpus(project_id, require_project_manual).await?;

        let results = self
            .corpus
            .retrieve(&corpus_id, &code.program_body, SAFETY_CHUNKS)
            .await?;
        let safety_context = CorpusStore::format_context(&results);

        let messages = [
            ChatMessage::system(SAFETY_PROMPT.to_string()),
            ChatMessage::user(interrogation_request(code, &safety_context)),
        ];

        let response = self
            .chat
            .chat(
                &messages,
                ChatOptions {
                    temperature: 0.1,
                    max_tokens: 2500,
                },
            )
            .await?;

        let assessment = parse_assessment(&response);
        info!(
            project = project_id,
            corpus = %corpus_id,
            status = %assessment.status,
            risk = %assessment.risk_level,
            "safety interrogation complete"
        );
        Ok(assessment)
    }
}

const SAFETY_PROMPT: &str = "\
You are an Industrial Safety Expert specializing in PLC control systems and workplace safety standards.

Your task is to check generated PLC code against the applicable safety manual and identify potential safety violations, missing safety checks, and hazards.

Output your assessment in this EXACT format:

==============================
SAFETY CHECK RESULT
==============================
Overall Status: [PASS / WARNING / FAIL]
Risk Level: [LOW / MEDIUM / HIGH / CRITICAL]

==============================
SAFETY COMPLIANCE ANALYSIS
==============================
[Analysis of code compliance with the safety rules]

==============================
MISSING SAFETY CHECKS
==============================
[List missing safety implementations]
- Missing Check 1: [Description]
...

==============================
SAFETY VIOLATIONS
==============================
[List safety rule violations]
- Violation 1: [Rule + Explanation]
...

==============================
POTENTIAL HAZARDS
==============================
[List potential hazards]
- Hazard 1: [Description + Risk]
...

==============================
REQUIRED CORRECTIONS
==============================
[List mandatory safety corrections]
- Correction 1: [What must be fixed]
...

==============================
SAFETY RECOMMENDATIONS
==============================
[Additional safety improvements]
- Recommendation 1
...

Be thorough and focus on SAFETY-CRITICAL issues. If the code is safe, say so clearly.";

fn interrogation_request(code: &GeneratedCode, safety_context: &str) -> String {
    format!(
        "Perform a safety check on this PLC code against the safety manual.\n\n\
         === GENERATED CODE ===\n\
         Program Name: {}\n\
         Execution Type: {}\n\n\
         Global Labels:\n{}\n\n\
         Local Labels:\n{}\n\n\
         Program Body:\n{}\n\n\
         === RELEVANT SAFETY RULES ===\n{}\n\n\
         Perform a comprehensive safety check and identify ALL missing safety checks, \
         violations, and hazards.",
        code.program_name,
        code.execution_type,
        format_labels(&code.global_labels),
        format_labels(&code.local_labels),
        code.program_body,
        safety_context,
    )
}

/// Compact label listing for the prompt; the first ten entries suffice.
fn format_labels(labels: &[Label]) -> String {
    if labels.is_empty() {
        return "No labels".to_string();
    }

    let mut lines: Vec<String> = labels
        .iter()
        .take(10)
        .map(|label| format!("- {}: {}", label.name, label.data_type))
        .collect();
    if labels.len() > 10 {
        lines.push(format!("... and {} more", labels.len() - 10));
    }
    lines.join("\n")
}

/// Which assessment section the line scanner is inside.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum Section {
    None,
    Compliance,
    Missing,
    Violations,
    Hazards,
    Corrections,
    Recommendations,
}

/// Parse the interrogator's sectioned assessment.
#[must_use]
pub fn parse_assessment(text: &str) -> SafetyAssessment {
    let mut assessment = SafetyAssessment::default();

    if text.contains("Overall Status: PASS") {
        assessment.passed = true;
        assessment.status = "PASS".to_string();
    } else if text.contains("Overall Status: WARNING") {
        assessment.passed = true;
        assessment.status = "WARNING".to_string();
    }

    for level in ["LOW", "MEDIUM", "HIGH", "CRITICAL"] {
        if text.contains(&format!("Risk Level: {level}")) {
            assessment.risk_level = level.to_string();
            break;
        }
    }

    let mut section = Section::None;
    let mut compliance: Vec<&str> = Vec::new();

    for line in text.lines() {
        let trimmed = line.trim();
        if trimmed.chars().all(|c| c == '=') && !trimmed.is_empty() {
            continue;
        }

        if line.contains("COMPLIANCE") {
            section = Section::Compliance;
        } else if line.contains("MISSING SAFETY CHECKS") {
            section = Section::Missing;
        } else if line.contains("SAFETY VIOLATIONS") {
            section = Section::Violations;
        } else if line.contains("POTENTIAL HAZARDS") {
            section = Section::Hazards;
        } else if line.contains("REQUIRED CORRECTIONS") {
            section = Section::Corrections;
        } else if line.contains("RECOMMENDATIONS") {
            section = Section::Recommendations;
        } else if !trimmed.is_empty() {
            match section {
                Section::Compliance => compliance.push(trimmed),
                Section::Missing => push_item(&mut assessment.missing_checks, trimmed),
                Section::Violations => push_item(&mut assessment.violations, trimmed),
                Section::Hazards => push_item(&mut assessment.hazards, trimmed),
                Section::Corrections => push_item(&mut assessment.required_corrections, trimmed),
                Section::Recommendations => push_item(&mut assessment.recommendations, trimmed),
                Section::None => {}
            }
        }
    }

    assessment.compliance_analysis = compliance.join("\n");
    assessment
}

fn push_item(items: &mut Vec<String>, line: &str) {
    if let Some(item) = line.strip_prefix('-') {
        let item = item.trim();
        if !item.is_empty() {
            items.push(item.to_string());
        }
    }
}
