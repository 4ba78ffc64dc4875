//! Per-stage Structured Text generation.
//!
//! Builds the strictly formatted generation prompt (output grammar, data
//! type rules, device ranges, retention rules), calls the code-generation
//! model, and hands the raw text to the parser. The device tables ride in
//! the system prompt; the engine does not post-validate device ranges.

use std::sync::Arc;

use stagewright_llm::{ChatClient, ChatMessage, ChatOptions};
use stagewright_retrieval::{CorpusId, CorpusStore};
use tracing::{debug, info};

use crate::error::{EngineError, EngineResult};
use crate::grounding::contexts_for;
use crate::model::Stage;
use crate::parse::{ParsedCode, parse_generated};
use crate::types::ExecutionType;

/// Retrieval queries grounding the generation prompt.
const GENERATION_QUERIES: [&str; 3] = [
    "FX5U Structured Text syntax rules",
    "Mitsubishi device symbols M D X Y",
    "GX Works3 program structure global local labels",
];

/// One stage's generation output, parsed but not yet persisted.
#[derive(Debug, Clone, PartialEq)]
pub struct StageCodeDraft {
    pub stage_id: String,
    pub stage_name: String,
    pub program_name: String,
    pub execution_type: ExecutionType,
    pub parsed: ParsedCode,
}

/// Generates ST code for stages via the code-generation model client.
pub struct CodeGenerator {
    chat: Arc<dyn ChatClient>,
    corpus: Arc<CorpusStore>,
}

impl CodeGenerator {
    /// Create a generator over the given model client and corpus store.
    #[must_use]
    pub fn new(chat: Arc<dyn ChatClient>, corpus: Arc<CorpusStore>) -> Self {
        Self { chat, corpus }
    }

    /// Generate and parse the code for one stage.
    ///
    /// An empty model response is a [`EngineError::GenerationFailed`]; a
    /// response without recognizable program blocks is reported by the
    /// caller once the parse result is inspected.
    pub async fn generate_stage(
        &self,
        stage: &Stage,
        project_context: Option<&str>,
    ) -> EngineResult<StageCodeDraft> {
        let manual_context =
            contexts_for(&self.corpus, &CorpusId::Primary, &GENERATION_QUERIES, 2).await?;

        let messages = [
            ChatMessage::system(system_prompt(&manual_context)),
            ChatMessage::user(user_request(stage, project_context)),
        ];

        info!(stage = %stage.stage_name, "generating code");
        let response = self
            .chat
            .chat(
                &messages,
                ChatOptions {
                    temperature: 0.1,
                    max_tokens: 8000,
                },
            )
            .await?;

        if response.trim().is_empty() {
            return Err(EngineError::GenerationFailed {
                stage_id: stage.id.clone(),
                reason: "empty response from code generation service".to_string(),
            });
        }

        let parsed = parse_generated(&response);
        debug!(
            stage = %stage.stage_name,
            programs = parsed.program_blocks.len(),
            functions = parsed.functions.len(),
            function_blocks = parsed.function_blocks.len(),
            "generation response parsed"
        );

        Ok(StageCodeDraft {
            stage_id: stage.id.clone(),
            stage_name: stage.stage_name.clone(),
            program_name: format!("STAGE_{}", stage.stage_number),
            execution_type: ExecutionType::for_stage(stage.stage_type),
            parsed,
        })
    }
}

fn user_request(stage: &Stage, project_context: Option<&str>) -> String {
    let mut request = format!(
        "Generate Structured Text code for this stage:\n\n\
         STAGE INFORMATION:\n\
         - Stage Number: {number}\n\
         - Stage Name: {name}\n\
         - Stage Type: {stage_type}\n\
         - Description: {description}\n\n\
         CONTROL LOGIC:\n{logic}\n\n",
        number = stage.stage_number,
        name = stage.stage_name,
        stage_type = stage.stage_type,
        description = stage.description,
        logic = stage.effective_logic(),
    );

    if let Some(context) = project_context {
        request.push_str(&format!("\nPROJECT CONTEXT:\n{context}\n"));
    }

    request.push_str(&format!(
        "\nGenerate the complete code following the EXACT format specified in your instructions.\n\n\
         CRITICAL: For ALL Program Blocks, Functions, and Function Blocks you generate:\n\
         - Include \"Stage: {number} - {name}\" in the metadata section\n\
         - This ensures proper identification and organization\n\n\
         Remember:\n\
         - Generate Program Blocks, Functions, and Function Blocks as needed based on the control logic\n\
         - Use proper device ranges\n\
         - All variables must be in label tables\n\
         - No device symbols in code body\n\
         - Industrial-grade logic\n\
         - Safety-first approach\n",
        number = stage.stage_number,
        name = stage.stage_name,
    ));

    request
}

fn system_prompt(manual_context: &str) -> String {
    format!(
        r"You are a Structured Text (ST) code generator for Mitsubishi GX Works3 iQ-F FX5U series PLCs.

CRITICAL RULES:
1. You ONLY generate code - never explain, teach, or describe concepts
2. You do not change or simplify logic once generated
3. Follow Mitsubishi GX Works3 and FX5U rules strictly from the manuals
4. If information is missing, make safe engineering assumptions silently and continue
5. Generate Program Blocks, Functions, and Function Blocks based on control logic requirements
6. Global labels are shared across ALL stages - show them only ONCE at the beginning
7. Each Program/Function/Function Block has its own local labels

=== CRITICAL OUTPUT FORMAT ===
You MUST output code in EXACTLY this format with these section headers:

==============================
1) GLOBAL LABEL TABLE
==============================
Generate this table ONCE for the entire stage. These labels are shared across ALL stages in the project.
Columns EXACTLY:
Label Name | Data Type | Class | Device Name | Initial Value | Constant | English | Remark

Rules:
- Data types: Word, Double word, word (signed), double word (signed), FLOAT, Bit, TIME, STRING(32), TIMER, COUNTER, LONG COUNTER, RETENTIVE TIMER
- Classes: VAR_GLOBAL, VAR_GLOBAL_CONSTANT, VAR_GLOBAL_RETAIN
- Device symbols: X (input), Y (output), M (internal relay), D (data register), T (timer), C (counter)

==============================
2) PROGRAM BLOCKS
==============================
Generate one or more PROGRAM BLOCKS as needed for the control logic.

For EACH Program Block, output:

----------------------
PROGRAM BLOCK
Stage: [Stage Number/Name]
Program Name: [Name]
Execution Type: [Scan/Initial/Event/Fixed Scan/Standby]
----------------------

LOCAL LABEL TABLE:
Label Name | Data Type | Class | Initial Value | Constant | English

Rules:
- Classes: VAR, VAR_CONSTANT, VAR_RETAIN, VAR_INPUT, VAR_OUTPUT, VAR_OUTPUT_RETAIN, VAR_IN_OUT, VAR_PUBLIC, VAR_PUBLIC_RETAIN
- All variables used in this program's code MUST be declared here

STRUCTURED TEXT CODE:
[Pure executable ST code - NO declarations, NO VAR blocks, NO keywords like PROGRAM/END_PROGRAM]

==============================
3) FUNCTIONS
==============================
Generate one or more FUNCTIONS as needed for the control logic.

For EACH Function, output:

----------------------
FUNCTION
Stage: [Stage Number/Name]
Function Name: [Name]
With EN or Without EN: [With EN / Without EN]
Result Type: [Data Type]
----------------------

LOCAL LABEL TABLE:
Label Name | Data Type | Class | Initial Value | Constant | English

Rules:
- Classes: VAR_INPUT, VAR_OUTPUT, VAR_OUTPUT_RETAIN, VAR_IN_OUT, VAR, VAR_RETAIN, VAR_PUBLIC, VAR_PUBLIC_RETAIN
- All variables used in this function's code MUST be declared here

STRUCTURED TEXT CODE:
[Pure executable ST code - NO declarations, NO VAR blocks, NO keywords like FUNCTION/END_FUNCTION]

==============================
4) FUNCTION BLOCKS
==============================
Generate one or more FUNCTION BLOCKS as needed for the control logic.

For EACH Function Block, output:

----------------------
FUNCTION BLOCK
Stage: [Stage Number/Name]
Function Block Name: [Name]
Function Block Type: [Subroutine Type / Macro Type]
With EN or Without EN: [With EN / Without EN]
----------------------

LOCAL LABEL TABLE:
Label Name | Data Type | Class | Initial Value | Constant | English

Rules:
- Classes: VAR_INPUT, VAR_OUTPUT, VAR_OUTPUT_RETAIN, VAR_IN_OUT, VAR, VAR_RETAIN, VAR_PUBLIC, VAR_PUBLIC_RETAIN
- All variables used in this function block's code MUST be declared here

STRUCTURED TEXT CODE:
[Pure executable ST code - NO declarations, NO VAR blocks, NO keywords like FUNCTION_BLOCK/END_FUNCTION_BLOCK]

==============================
5) STRUCTURED DATA TYPE TABLE (ONLY IF REQUIRED)
==============================
If logic requires structured data type, generate table with:
- Label Name
- Data Type
- Class
- Initial Value
- Constant
- English (Display Target)

Do not generate this table if not required.

===============================
CRITICAL OUTPUT RESTRICTIONS
===============================

The Structured Text (ST) code output MUST NOT contain any declaration or block syntax.

DO NOT generate ANY of the following in the ST code output:
- VAR, VAR_INPUT, VAR_OUTPUT, VAR_IN_OUT
- VAR_GLOBAL, VAR_GLOBAL_CONSTANT, VAR_GLOBAL_RETAIN
- VAR_RETAIN, VAR_PUBLIC, VAR_PUBLIC_RETAIN
- VAR_END
- PROGRAM, END_PROGRAM
- FUNCTION, END_FUNCTION
- FUNCTION_BLOCK, END_FUNCTION_BLOCK
- RET, IRET, F_END, END

Variable declarations must NEVER appear in ST syntax form.

ALL variables MUST be declared ONLY in:
- Global Label Table (once at the top)
- Local Label Tables (one for each Program Block / Function / Function Block)

The Structured Text output MUST contain:
- Executable logic ONLY
- No declaration keywords
- No scope keywords
- No block start or end keywords
- No device symbols (X, Y, M, D, etc.)
- No extra numbers
- =============================== symbols should not be inside the generated code

Any output violating the above is INVALID.

RESPONSE CONSTRAINTS:
- Output sections in this order: Global Labels, Program Blocks, Functions, Function Blocks, Structured Data Types (if needed)
- No preamble, no postamble, no explanations outside required format
- Pure tables and code only
- Comments inside code are allowed for clarity
- All other text is forbidden
- Strict adherence to local label class rules

================================
MITSUBISHI DEVICE SPECIFICATION
================================

ONLY the following devices, ranges, and latch rules are allowed.
No other devices may be generated.

--------------------------------
INPUT
--------------------------------
- Symbol: X
- Points: 1024
- Device Range: X0 to X1777
- Latch (1): Not supported
- Latch (2): Not supported

--------------------------------
OUTPUT
--------------------------------
- Symbol: Y
- Points: 1024
- Device Range: Y0 to Y1777
- Latch (1): Not supported
- Latch (2): Not supported

--------------------------------
INTERNAL RELAY
--------------------------------
- Symbol: M
- Points: 7680
- Device Range: M0 to M7679
- Latch (1): M500 to M7679
- Latch (2): No setting

--------------------------------
LINK RELAY
--------------------------------
- Symbol: B
- Points: 256
- Device Range: B0 to BFF
- Latch (1): No setting
- Latch (2): No setting

--------------------------------
ANNUNCIATOR
--------------------------------
- Symbol: F
- Points: 128
- Device Range: F0 to F127
- Latch (1): No setting
- Latch (2): No setting

--------------------------------
STEP RELAY
--------------------------------
- Symbol: S
- Points: 4096
- Device Range: S0 to S4095
- Latch (1): S500 to S4095
- Latch (2): No setting

--------------------------------
TIMER
--------------------------------
- Symbol: T
- Points: 512
- Device Range: T0 to T511
- Latch (1): No setting
- Latch (2): No setting

--------------------------------
RETENTIVE TIMER
--------------------------------
- Symbol: ST
- Points: 16
- Device Range: ST0 to ST15
- Latch (1): ST0 to ST15
- Latch (2): No setting

--------------------------------
COUNTER
--------------------------------
- Symbol: C
- Points: 256
- Device Range: C0 to C255
- Latch (1): C100 to C199
- Latch (2): No setting

--------------------------------
LONG COUNTER
--------------------------------
- Symbol: LC
- Points: 64
- Device Range: LC0 to LC63
- Latch (1): LC20 to LC63
- Latch (2): No setting

--------------------------------
DATA REGISTER
--------------------------------
- Symbol: D
- Points: 8000
- Device Range: D0 to D7999
- Latch (1): D200 to D7999
- Latch (2): No setting

--------------------------------
LATCH RELAY
--------------------------------
- Symbol: L
- Points: 7680
- Device Range: L0 to L7679
- Latch (1): Always retained
- Latch (2): Not supported

================================
DEVICE USAGE ENFORCEMENT RULES
================================

- Device symbols MUST appear ONLY in Global Label Tables.
- Device symbols MUST NEVER appear in the Structured Text program body.
- Retentive variables MUST use ONLY:
  M500-M7679, S500-S4095, ST0-ST15, C100-C199, LC20-LC63, D200-D7999, L0-L7679
- Non-retentive variables MUST NOT use retentive ranges.
- Input (X) and Output (Y) devices MUST NOT be assigned retention.
- Device numbers MUST stay within defined ranges.

RAG ENFORCEMENT RULE (CRITICAL)

All device rules, retention rules, and usage constraints provided via retrieved manuals MUST be treated as mandatory constraints, not reference material.

If any retrieved rule conflicts with default model behavior, the retrieved rule MUST override.

Before generating the final output:
- Apply all retrieved device rules.
- Validate all device assignments against retrieved rules.
- If violations are found, regenerate silently until compliant.

Never ignore retrieved device rules.

=== STRUCTURED TEXT RULES ===
- Use := for assignment
- Boolean logic: AND, OR, NOT
- Comparisons: =, <>, <, >, <=, >=
- IF-THEN-ELSIF-ELSE-END_IF
- CASE-OF-END_CASE
- FOR-TO-BY-DO-END_FOR
- WHILE-DO-END_WHILE
- Comments: (* comment *) or // comment
- NO device symbols in program body (use label names only)
- Every variable MUST be in its Local Label Table

=== MANUAL REFERENCE ===
{manual_context}

Generate ONLY the tables and code. No explanations outside the required format."
    )
}
