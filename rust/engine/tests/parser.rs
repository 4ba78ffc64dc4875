//! Structured-output parsing: numbered headers, multiple blocks, and the
//! clean-code guarantees.

use pretty_assertions::assert_eq;
use stagewright_engine::parse::parse_generated;
use stagewright_engine::types::ExecutionType;

/// A response using numbered section variants, with two program blocks
/// under one group header, a function, and a function block.
const NUMBERED_DOCUMENT: &str = "\
==============================
1) GLOBAL LABEL TABLE
==============================
Label Name | Data Type | Class | Device Name | Initial Value | Constant | English | Remark
Start_Button | Bit | VAR_GLOBAL | X0 | FALSE | No | Start push button | -
Motor_Run | Bit | VAR_GLOBAL | Y0 | FALSE | No | Motor contactor | -
Max_Temp | Word | VAR_GLOBAL_CONSTANT | D200 | 80 | Yes | Temperature limit | -

==============================
2) PROGRAM BLOCKS
==============================
----------------------
PROGRAM BLOCK
Stage: 2 - Conveyor Operation
Program Name: CONVEYOR_MAIN
Execution Type: Scan
----------------------
LOCAL LABEL TABLE:
Label Name | Data Type | Class | Initial Value | Constant | English
Run_Latch | Bit | VAR | FALSE | No | Run latch

STRUCTURED TEXT CODE:
IF Start_Button AND NOT Fault THEN
    Run_Latch := TRUE;
END_IF;
Motor_Run := Run_Latch;

----------------------
PROGRAM BLOCK
Stage: 2 - Conveyor Operation
Program Name: CONVEYOR_ALARMS
Execution Type: Fixed Scan
----------------------
LOCAL LABEL TABLE:
Label Name | Data Type | Class | Initial Value | Constant | English
Alarm_Latch | Bit | VAR | FALSE | No | Alarm latch

STRUCTURED TEXT CODE:
STRUCTURED TEXT CODE:
IF Current_Temp > Max_Temp THEN
    Alarm_Latch := TRUE;
END_IF;

==============================
3) FUNCTIONS
==============================
----------------------
FUNCTION
Stage: 2 - Conveyor Operation
Function Name: SCALE_SPEED
With EN or Without EN: With EN
Result Type: Word
----------------------
LOCAL LABEL TABLE:
Label Name | Data Type | Class | Initial Value | Constant | English
Raw_Value | Word | VAR_INPUT | 0 | No | Raw speed input

STRUCTURED TEXT CODE:
SCALE_SPEED := Raw_Value * 10;

==============================
4) FUNCTION BLOCKS
==============================
----------------------
FUNCTION BLOCK
Stage: 2 - Conveyor Operation
Function Block Name: DEBOUNCE
Function Block Type: Macro Type
With EN or Without EN: Without EN
----------------------
LOCAL LABEL TABLE:
Label Name | Data Type | Class | Initial Value | Constant | English
In_Signal | Bit | VAR_INPUT | FALSE | No | Raw signal

STRUCTURED TEXT CODE:
Out_Signal := In_Signal;
";

/// Declaration keywords that must never appear in a parsed code body.
const FORBIDDEN_KEYWORDS: [&str; 10] = [
    "VAR",
    "VAR_INPUT",
    "VAR_OUTPUT",
    "VAR_GLOBAL",
    "PROGRAM",
    "END_PROGRAM",
    "FUNCTION",
    "END_FUNCTION",
    "FUNCTION_BLOCK",
    "END_FUNCTION_BLOCK",
];

/// Whether `word` looks like a bare device token such as `X0` or `M100`.
fn is_device_token(word: &str) -> bool {
    let mut chars = word.chars();
    let Some(first) = chars.next() else {
        return false;
    };
    let rest: String = chars.collect();
    "XYMDTCBLSF".contains(first) && !rest.is_empty() && rest.chars().all(|c| c.is_ascii_digit())
}

fn assert_clean_code(code: &str) {
    for word in code.split(|c: char| !c.is_alphanumeric() && c != '_') {
        assert!(
            !FORBIDDEN_KEYWORDS.contains(&word),
            "declaration keyword {word} in code: {code}"
        );
        assert!(!is_device_token(word), "device token {word} in code: {code}");
    }
}

#[test]
fn numbered_document_parses_into_typed_artifacts() {
    let parsed = parse_generated(NUMBERED_DOCUMENT);

    assert_eq!(parsed.global_labels.len(), 3);
    assert_eq!(parsed.program_blocks.len(), 2);
    assert_eq!(parsed.functions.len(), 1);
    assert_eq!(parsed.function_blocks.len(), 1);

    let first = &parsed.program_blocks[0];
    assert_eq!(first.name, "CONVEYOR_MAIN");
    assert_eq!(first.stage, "2 - Conveyor Operation");
    assert_eq!(first.execution_type, ExecutionType::Scan);
    assert_eq!(first.local_labels.len(), 1);
    assert!(first.code.contains("Run_Latch := TRUE;"));

    let second = &parsed.program_blocks[1];
    assert_eq!(second.name, "CONVEYOR_ALARMS");
    assert_eq!(second.execution_type, ExecutionType::FixedScan);
    // The duplicated header line was cleaned out of the code body.
    assert!(!second.code.to_lowercase().contains("structured text code"));
}

#[test]
fn global_labels_carry_device_and_constant_columns() {
    let parsed = parse_generated(NUMBERED_DOCUMENT);

    let start = &parsed.global_labels[0];
    assert_eq!(start.name, "Start_Button");
    assert_eq!(start.device, "X0");
    assert_eq!(start.class, "VAR_GLOBAL");
    assert!(!start.constant);

    let max_temp = &parsed.global_labels[2];
    assert_eq!(max_temp.class, "VAR_GLOBAL_CONSTANT");
    assert!(max_temp.constant);
    assert_eq!(max_temp.initial_value, "80");
}

#[test]
fn code_bodies_contain_no_declarations_or_device_tokens() {
    let parsed = parse_generated(NUMBERED_DOCUMENT);

    for block in &parsed.program_blocks {
        assert_clean_code(&block.code);
    }
    for function in &parsed.functions {
        assert_clean_code(&function.code);
    }
    for block in &parsed.function_blocks {
        assert_clean_code(&block.code);
    }
}

#[test]
fn function_metadata_is_parsed() {
    let parsed = parse_generated(NUMBERED_DOCUMENT);

    let function = &parsed.functions[0];
    assert_eq!(function.name, "SCALE_SPEED");
    assert!(function.with_en);
    assert_eq!(function.result_type, "Word");

    let block = &parsed.function_blocks[0];
    assert_eq!(block.name, "DEBOUNCE");
    assert_eq!(block.fb_type, "Macro Type");
    assert!(!block.with_en);
}

#[test]
fn legacy_fields_mirror_the_first_program_block() {
    let parsed = parse_generated(NUMBERED_DOCUMENT);
    assert_eq!(parsed.program_body, parsed.program_blocks[0].code);
    assert_eq!(parsed.local_labels, parsed.program_blocks[0].local_labels);
}

#[test]
fn unheadered_text_yields_empty_artifacts() {
    let parsed = parse_generated("Sorry, I cannot generate code for that request.");
    assert!(!parsed.has_program_blocks());
    assert!(parsed.global_labels.is_empty());
    assert!(parsed.program_body.is_empty());
}

#[test]
fn plain_headers_without_numbering_also_parse() {
    let document = "\
GLOBAL LABEL TABLE
Start_Button | Bit | VAR_GLOBAL | X0 | FALSE | No | Start | -

PROGRAM BLOCK
Stage: 0 - Idle
Program Name: IDLE_MAIN
Execution Type: Initial
LOCAL LABEL TABLE:
STRUCTURED TEXT CODE:
Outputs_Off := TRUE;
";
    let parsed = parse_generated(document);
    assert_eq!(parsed.global_labels.len(), 1);
    assert_eq!(parsed.program_blocks.len(), 1);
    assert_eq!(
        parsed.program_blocks[0].execution_type,
        ExecutionType::Initial
    );
    assert_eq!(parsed.program_blocks[0].code, "Outputs_Off := TRUE;");
}

#[test]
fn structured_data_type_section_is_consumed_without_leaking() {
    let document = "\
GLOBAL LABEL TABLE
Start_Button | Bit | VAR_GLOBAL | X0 | FALSE | No | Start | -

PROGRAM BLOCK
Stage: 0 - Idle
Program Name: IDLE_MAIN
Execution Type: Initial
STRUCTURED TEXT CODE:
Outputs_Off := TRUE;

5) STRUCTURED DATA TYPE TABLE
Recipe_Data | STRUCT | VAR_GLOBAL | - | No | Recipe record
";
    let parsed = parse_generated(document);
    assert_eq!(parsed.global_labels.len(), 1);
    assert_eq!(parsed.program_blocks.len(), 1);
    assert!(!parsed.program_blocks[0].code.contains("Recipe_Data"));
}
