//! Per-stage semantic, logical, and safety validation.
//!
//! An LLM call grounded in the manual corpus produces a sectioned triage
//! report; [`parse_validation`] recovers it with best-effort tolerance.
//! The parsed categorized issues, not the model's literal `Status:` line,
//! decide validity: any `[CRITICAL]` issue fails the stage.

use std::sync::Arc;

use serde::{Deserialize, Serialize};
use stagewright_llm::{ChatClient, ChatMessage, ChatOptions, LlmError};
use stagewright_retrieval::{CorpusId, CorpusStore};
use tracing::info;

use crate::error::EngineResult;
use crate::grounding::contexts_for;
use crate::model::Stage;
use crate::types::IssueSeverity;

/// Retrieval queries grounding the validation prompt.
const VALIDATION_QUERIES: [&str; 3] = [
    "PLC safety requirements interlocks",
    "FX5U device constraints limits",
    "Structured Text programming rules",
];

/// A severity-tagged validator finding.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct CategorizedIssue {
    pub severity: IssueSeverity,
    pub title: String,
    #[serde(default)]
    pub description: String,
    #[serde(default)]
    pub recommended_logic: String,
}

/// The structured result of validating one stage.
#[derive(Debug, Clone, PartialEq, Eq, Default, Serialize, Deserialize)]
pub struct StageValidation {
    pub valid: bool,
    pub status: String,
    pub semantic_analysis: String,
    pub logical_consistency: String,
    pub safety_compliance: String,
    pub issues: Vec<String>,
    pub recommendations: Vec<String>,
    pub categorized_issues: Vec<CategorizedIssue>,
}

impl StageValidation {
    /// Number of critical categorized issues.
    #[must_use]
    pub fn critical_count(&self) -> usize {
        self.categorized_issues
            .iter()
            .filter(|issue| issue.severity == IssueSeverity::Critical)
            .count()
    }
}

/// Validates stage logic via the code-generation model client.
pub struct StageValidator {
    chat: Arc<dyn ChatClient>,
    corpus: Arc<CorpusStore>,
}

impl StageValidator {
    /// Create a validator over the given model client and corpus store.
    #[must_use]
    pub fn new(chat: Arc<dyn ChatClient>, corpus: Arc<CorpusStore>) -> Self {
        Self { chat, corpus }
    }

    /// Run the triage check for one stage.
    pub async fn validate_stage(&self, stage: &Stage) -> EngineResult<StageValidation> {
        let manual_context =
            contexts_for(&self.corpus, &CorpusId::Primary, &VALIDATION_QUERIES, 2).await?;

        let messages = [
            ChatMessage::system(system_prompt(&manual_context)),
            ChatMessage::user(user_request(stage)),
        ];

        let response = self
            .chat
            .chat(
                &messages,
                ChatOptions {
                    temperature: 0.1,
                    max_tokens: 2000,
                },
            )
            .await?;

        if response.trim().is_empty() {
            return Err(LlmError::BadResponse {
                message: "empty response from validation service".to_string(),
            }
            .into());
        }

        let result = parse_validation(&response);
        info!(
            stage = %stage.stage_name,
            status = %result.status,
            critical = result.critical_count(),
            "stage validated"
        );
        Ok(result)
    }
}

fn system_prompt(manual_context: &str) -> String {
    format!(
        r"You are an expert PLC safety and logic validator specializing in Mitsubishi FX5U PLCs.

Your task is to validate stage logic and provide comprehensive feedback in TWO sections:
1. Standard Issues & Recommendations (simple list format)
2. Categorized Issues with Severity Levels (detailed format)

CRITICAL INSTRUCTIONS FOR CONSISTENT VALIDATION:
1. **Be STRICT about CRITICAL issues** - Only mark as CRITICAL if:
   - Safety violation (emergency stop, safety interlocks missing)
   - Logical impossibility (contradictory conditions)
   - Missing mandatory PLC requirements

2. **Do NOT hallucinate or create new issues** - Only flag real problems you can clearly identify in the logic

3. **Recognize improvements** - If logic mentions safety features, interlocks, or proper sequencing, acknowledge it positively

4. **Be consistent** - If logic contains proper:
   - Emergency stop handling -> Do NOT flag missing emergency stop
   - Safety interlocks -> Do NOT flag missing safety
   - State management -> Do NOT flag missing state control
   - Alarm handling -> Do NOT flag missing alarms

5. **PASS the validation if**:
   - Logic describes clear conditions and actions
   - Basic safety considerations are present
   - No obvious contradictions or safety violations exist

6. **Only FAIL if truly critical issues exist** - Don't fail for minor improvements or suggestions

Output your validation in this EXACT format:

==============================
VALIDATION STATUS
==============================
Status: [PASS / FAIL]
(Use PASS if no CRITICAL issues, FAIL if CRITICAL issues exist)

==============================
ISSUES
==============================
- [List each issue as a simple bullet point]
- [Focus on what's wrong or missing]

==============================
RECOMMENDATIONS
==============================
- [List each recommendation as a simple bullet point]
- [Provide actionable suggestions]

==============================
CATEGORIZED ISSUES
==============================

For each categorized issue, use this format:

[CRITICAL] Issue Title
Description: Brief explanation of the problem
Recommended Logic:
<Provide ready-made control logic in plain words that user can copy/paste>

**USE MODERATE/OPTIONAL FOR**:
- Performance improvements
- Additional features
- Enhanced monitoring
- Optimization suggestions
- Better practices

**USE CRITICAL ONLY FOR**:
- Safety violations
- Logical contradictions
- Mandatory PLC requirements missing

==============================
ANALYSIS SUMMARY
==============================
Semantic Analysis: [Brief analysis of logic meaning and clarity]
Logical Consistency: [Check for contradictions, conflicts]
Safety Compliance: [Safety requirements assessment]

=== MANUAL REFERENCE ===
{manual_context}

Remember:
- Only CRITICAL issues cause validation to FAIL
- Provide complete, copy-paste ready control logic recommendations
- Use plain language, not code or device assignments
- Focus on what the system should DO, not how to configure it technically"
    )
}

fn user_request(stage: &Stage) -> String {
    format!(
        "Validate this stage logic:\n\n\
         STAGE INFORMATION:\n\
         - Stage Number: {}\n\
         - Stage Name: {}\n\
         - Stage Type: {}\n\n\
         LOGIC TO VALIDATE:\n{}\n\n\
         Perform complete validation and provide detailed analysis.",
        stage.stage_number,
        stage.stage_name,
        stage.stage_type,
        stage.effective_logic(),
    )
}

/// Which report section the line scanner is inside.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum Section {
    None,
    Status,
    Issues,
    Recommendations,
    Categorized,
    Analysis,
}

/// Parse the validator's sectioned report.
///
/// Best-effort: unparseable sections become empty strings and lists. The
/// final verdict comes from the categorized issues: no `[CRITICAL]` issue
/// means PASS, whatever the literal `Status:` line said.
#[must_use]
pub fn parse_validation(text: &str) -> StageValidation {
    let mut result = StageValidation {
        valid: text.contains("Status: PASS"),
        status: if text.contains("Status: PASS") {
            "PASS".to_string()
        } else {
            "FAIL".to_string()
        },
        ..StageValidation::default()
    };

    let mut section = Section::None;
    let mut current: Option<CategorizedIssue> = None;

    for line in text.lines() {
        let trimmed = line.trim();

        if trimmed.chars().all(|c| c == '=') && !trimmed.is_empty() {
            continue;
        }
        if line.contains("VALIDATION STATUS") {
            section = Section::Status;
            continue;
        }
        if line.contains("CATEGORIZED ISSUES") {
            section = Section::Categorized;
            continue;
        }
        if trimmed.starts_with("ISSUES") && !line.contains("CATEGORIZED") {
            section = Section::Issues;
            continue;
        }
        if line.contains("RECOMMENDATIONS") && section != Section::Categorized {
            section = Section::Recommendations;
            continue;
        }
        if line.contains("ANALYSIS SUMMARY") {
            if let Some(issue) = current.take() {
                result.categorized_issues.push(finish_issue(issue));
            }
            section = Section::Analysis;
            continue;
        }

        match section {
            Section::Issues => {
                if let Some(item) = trimmed.strip_prefix('-') {
                    let item = item.trim();
                    if !item.is_empty() {
                        result.issues.push(item.to_string());
                    }
                }
            }
            Section::Recommendations => {
                if let Some(item) = trimmed.strip_prefix('-') {
                    let item = item.trim();
                    if !item.is_empty() {
                        result.recommendations.push(item.to_string());
                    }
                }
            }
            Section::Categorized if !trimmed.is_empty() => {
                if let Some(severity) = IssueSeverity::from_tag(trimmed) {
                    if let Some(issue) = current.take() {
                        result.categorized_issues.push(finish_issue(issue));
                    }
                    let title = trimmed
                        .splitn(2, ']')
                        .nth(1)
                        .unwrap_or_default()
                        .trim()
                        .to_string();
                    current = Some(CategorizedIssue {
                        severity,
                        title,
                        description: String::new(),
                        recommended_logic: String::new(),
                    });
                } else if let Some(issue) = current.as_mut() {
                    if let Some(rest) = trimmed.strip_prefix("Description:") {
                        issue.description = rest.trim().to_string();
                    } else if trimmed.starts_with("Recommended Logic:") {
                        issue.recommended_logic.clear();
                    } else if !issue.description.is_empty() {
                        issue.recommended_logic.push_str(trimmed);
                        issue.recommended_logic.push(' ');
                    }
                }
            }
            Section::Analysis if !trimmed.is_empty() => {
                if let Some(rest) = trimmed.strip_prefix("Semantic Analysis:") {
                    result.semantic_analysis = rest.trim().to_string();
                } else if let Some(rest) = trimmed.strip_prefix("Logical Consistency:") {
                    result.logical_consistency = rest.trim().to_string();
                } else if let Some(rest) = trimmed.strip_prefix("Safety Compliance:") {
                    result.safety_compliance = rest.trim().to_string();
                }
            }
            _ => {}
        }
    }

    if let Some(issue) = current.take() {
        result.categorized_issues.push(finish_issue(issue));
    }

    // The categorized issues are authoritative over the literal status line.
    if result.critical_count() == 0 {
        result.valid = true;
        result.status = "PASS".to_string();
    } else {
        result.valid = false;
        result.status = "FAIL".to_string();
    }

    result
}

fn finish_issue(mut issue: CategorizedIssue) -> CategorizedIssue {
    issue.recommended_logic = issue.recommended_logic.trim().to_string();
    issue
}
