//! Parser for the structured code-generation output format.
//!
//! A single left-to-right pass over the model's text with a section state
//! machine: anchored headers (tolerant of `N)` numbering and `===`/`---`
//! rules) open sections, and each section commits when the next top-level
//! header or end-of-input arrives. No recursive matching.

use serde::{Deserialize, Serialize};

use crate::model::{FunctionBlock, Label, ProgramBlock, StFunction};
use crate::types::ExecutionType;

/// Pipe-table header keywords; rows and code lines containing these are
/// table headers, not data.
const HEADER_KEYWORDS: [&str; 6] = [
    "label name",
    "data type",
    "class",
    "initial value",
    "constant",
    "english",
];

/// A first cell containing any of these marks a header row.
const HEADER_CELL_TOKENS: [&str; 4] = ["label name", "name", "column", "label"];

/// The typed artifacts recovered from one generation response.
#[derive(Debug, Clone, PartialEq, Default, Serialize, Deserialize)]
pub struct ParsedCode {
    pub global_labels: Vec<Label>,
    pub program_blocks: Vec<ProgramBlock>,
    pub functions: Vec<StFunction>,
    pub function_blocks: Vec<FunctionBlock>,
    /// Legacy mirror of the first program block's labels.
    pub local_labels: Vec<Label>,
    /// Legacy mirror of the first program block's code.
    pub program_body: String,
}

impl ParsedCode {
    /// Whether the parser recognized at least one program block.
    ///
    /// The orchestrator treats a response without program blocks as a
    /// failed generation for the stage.
    #[must_use]
    pub fn has_program_blocks(&self) -> bool {
        !self.program_blocks.is_empty()
    }
}

/// The top-level section the scanner is inside.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum Section {
    None,
    Global,
    Program,
    Function,
    FunctionBlock,
    Sdt,
}

/// What a line means at the top level.
enum LineKind {
    /// `===`/`---` rule; consumed as a separator.
    Rule,
    /// Opens a new section.
    Header(Section),
    /// Group headers ("PROGRAM BLOCKS", "FUNCTIONS", …) end the current
    /// section without opening a block.
    GroupHeader,
    /// Ordinary content belonging to the current section.
    Content,
}

fn classify(line: &str) -> LineKind {
    let trimmed = line.trim();
    if trimmed.len() >= 3
        && (trimmed.chars().all(|c| c == '=') || trimmed.chars().all(|c| c == '-'))
    {
        return LineKind::Rule;
    }

    let stripped = strip_number_prefix(trimmed);
    let upper = stripped.trim_end_matches(':').trim().to_uppercase();
    match upper.as_str() {
        "GLOBAL LABEL TABLE" => LineKind::Header(Section::Global),
        "PROGRAM BLOCK" => LineKind::Header(Section::Program),
        "FUNCTION" => LineKind::Header(Section::Function),
        "FUNCTION BLOCK" => LineKind::Header(Section::FunctionBlock),
        "PROGRAM BLOCKS" | "FUNCTIONS" | "FUNCTION BLOCKS" => LineKind::GroupHeader,
        _ if upper.starts_with("STRUCTURED DATA TYPE") => LineKind::Header(Section::Sdt),
        _ => LineKind::Content,
    }
}

/// Drop a numbered-section prefix such as `2)` from a header line.
fn strip_number_prefix(line: &str) -> &str {
    let rest = line.trim_start_matches(|c: char| c.is_ascii_digit());
    if rest.len() < line.len() {
        if let Some(after) = rest.strip_prefix(')') {
            return after.trim_start();
        }
    }
    line
}

/// Parse a full generation response into typed artifacts.
///
/// Never fails: unrecognizable input yields an empty [`ParsedCode`], which
/// callers treat as a failed generation rather than a parse panic.
#[must_use]
pub fn parse_generated(text: &str) -> ParsedCode {
    let mut result = ParsedCode::default();
    let mut section = Section::None;
    let mut buffer: Vec<&str> = Vec::new();

    for line in text.lines() {
        match classify(line) {
            LineKind::Rule => {}
            LineKind::Header(next) => {
                commit(section, &mut buffer, &mut result);
                section = next;
            }
            LineKind::GroupHeader => {
                commit(section, &mut buffer, &mut result);
                section = Section::None;
            }
            LineKind::Content => buffer.push(line),
        }
    }
    commit(section, &mut buffer, &mut result);

    if let Some(first) = result.program_blocks.first() {
        result.local_labels = first.local_labels.clone();
        result.program_body = first.code.clone();
    }

    result
}

/// Close the current section, turning its buffered lines into artifacts.
fn commit(section: Section, buffer: &mut Vec<&str>, result: &mut ParsedCode) {
    match section {
        Section::Global => {
            result.global_labels.extend(parse_label_table(buffer, true));
        }
        Section::Program => {
            if let Some(block) = parse_program_block(buffer) {
                result.program_blocks.push(block);
            }
        }
        Section::Function => {
            if let Some(function) = parse_function(buffer) {
                result.functions.push(function);
            }
        }
        Section::FunctionBlock => {
            if let Some(block) = parse_function_block(buffer) {
                result.function_blocks.push(block);
            }
        }
        // Structured data types are accepted in the grammar but carry no
        // engine artifact; the section is consumed so its rows do not
        // leak into a neighboring block.
        Section::Sdt | Section::None => {}
    }
    buffer.clear();
}

/// Split one block's lines into metadata, local-label rows, and code.
struct BlockParts<'a> {
    metadata: Vec<&'a str>,
    labels: Vec<&'a str>,
    code: Vec<&'a str>,
}

fn split_block<'a>(lines: &'a [&'a str]) -> BlockParts<'a> {
    let mut parts = BlockParts {
        metadata: Vec::new(),
        labels: Vec::new(),
        code: Vec::new(),
    };

    #[derive(PartialEq)]
    enum Zone {
        Metadata,
        Labels,
        Code,
    }
    let mut zone = Zone::Metadata;

    for &line in lines {
        let upper = line.trim().trim_end_matches(':').trim().to_uppercase();
        if zone != Zone::Code && upper == "LOCAL LABEL TABLE" {
            zone = Zone::Labels;
            continue;
        }
        if zone != Zone::Code && (upper == "STRUCTURED TEXT CODE" || upper == "STRUCTURED TEXT") {
            zone = Zone::Code;
            continue;
        }
        match zone {
            Zone::Metadata => parts.metadata.push(line),
            Zone::Labels => parts.labels.push(line),
            Zone::Code => parts.code.push(line),
        }
    }
    parts
}

/// Extract the value of a `Key:` metadata line, case-insensitively.
fn metadata_value(lines: &[&str], key: &str) -> Option<String> {
    let key_lower = key.to_lowercase();
    lines.iter().find_map(|line| {
        let trimmed = line.trim();
        let lower = trimmed.to_lowercase();
        lower.strip_prefix(&key_lower).and_then(|_| {
            trimmed
                .get(key.len()..)
                .map(|value| value.trim().to_string())
        })
    })
}

fn parse_with_en(lines: &[&str]) -> bool {
    metadata_value(lines, "With EN or Without EN:")
        .is_some_and(|value| value.to_lowercase().contains("with en"))
}

fn parse_program_block(lines: &[&str]) -> Option<ProgramBlock> {
    let parts = split_block(lines);
    let name = metadata_value(&parts.metadata, "Program Name:")?;
    if name.is_empty() {
        return None;
    }

    let execution_type = metadata_value(&parts.metadata, "Execution Type:")
        .map(|value| value.parse().unwrap_or_default())
        .unwrap_or(ExecutionType::Scan);

    Some(ProgramBlock {
        stage: metadata_value(&parts.metadata, "Stage:").unwrap_or_default(),
        name,
        execution_type,
        local_labels: parse_label_table(&parts.labels, false),
        code: clean_code(&parts.code),
    })
}

fn parse_function(lines: &[&str]) -> Option<StFunction> {
    let parts = split_block(lines);
    let name = metadata_value(&parts.metadata, "Function Name:")?;
    if name.is_empty() {
        return None;
    }

    Some(StFunction {
        stage: metadata_value(&parts.metadata, "Stage:").unwrap_or_default(),
        name,
        with_en: parse_with_en(&parts.metadata),
        result_type: metadata_value(&parts.metadata, "Result Type:")
            .filter(|value| !value.is_empty())
            .unwrap_or_else(|| "BOOL".to_string()),
        local_labels: parse_label_table(&parts.labels, false),
        code: clean_code(&parts.code),
    })
}

fn parse_function_block(lines: &[&str]) -> Option<FunctionBlock> {
    let parts = split_block(lines);
    let name = metadata_value(&parts.metadata, "Function Block Name:")?;
    if name.is_empty() {
        return None;
    }

    Some(FunctionBlock {
        stage: metadata_value(&parts.metadata, "Stage:").unwrap_or_default(),
        name,
        fb_type: metadata_value(&parts.metadata, "Function Block Type:")
            .filter(|value| !value.is_empty())
            .unwrap_or_else(|| "Subroutine Type".to_string()),
        with_en: parse_with_en(&parts.metadata),
        local_labels: parse_label_table(&parts.labels, false),
        code: clean_code(&parts.code),
    })
}

/// Parse pipe-separated label rows.
///
/// Global tables carry a device column
/// (`name | type | class | device | initial | constant | english | remark`);
/// local tables do not (`name | type | class | initial | constant | english`).
fn parse_label_table(lines: &[&str], has_device: bool) -> Vec<Label> {
    let mut labels = Vec::new();

    for line in lines {
        let trimmed = line.trim();
        if trimmed.is_empty()
            || trimmed.starts_with('=')
            || trimmed.starts_with('-')
            || !trimmed.contains('|')
        {
            continue;
        }

        let cells: Vec<&str> = trimmed
            .split('|')
            .map(str::trim)
            .filter(|cell| !cell.is_empty())
            .collect();
        if cells.len() < 3 {
            continue;
        }

        let first_lower = cells[0].to_lowercase();
        if HEADER_CELL_TOKENS
            .iter()
            .any(|token| first_lower.contains(token))
        {
            continue;
        }

        let cell = |index: usize| cells.get(index).copied().unwrap_or_default().to_string();
        let constant_index = if has_device { 5 } else { 4 };
        let constant = cells
            .get(constant_index)
            .is_some_and(|value| matches!(value.to_lowercase().as_str(), "yes" | "true" | "1"));

        let label = Label {
            name: cell(0),
            data_type: cell(1),
            class: cell(2),
            device: if has_device { cell(3) } else { String::new() },
            initial_value: if has_device { cell(4) } else { cell(3) },
            constant,
            comment: if has_device { cell(6) } else { cell(5) },
            remark: if has_device { cell(7) } else { String::new() },
        };

        if !label.name.is_empty() && label.name != "-" && label.name != "N/A" {
            labels.push(label);
        }
    }

    labels
}

/// Apply the code-region cleanup rules: drop stray section headers and
/// table-header rows, and collapse the blank line that follows a dropped
/// line.
fn clean_code(lines: &[&str]) -> String {
    let mut cleaned: Vec<&str> = Vec::new();
    let mut skip_next_empty = false;

    for &line in lines {
        let trimmed = line.trim();
        if trimmed.is_empty() {
            if !skip_next_empty {
                cleaned.push(line);
            }
            skip_next_empty = false;
            continue;
        }

        let lower = line.to_lowercase();
        if line.contains('|') && HEADER_KEYWORDS.iter().any(|kw| lower.contains(kw)) {
            skip_next_empty = true;
            continue;
        }
        if matches!(
            lower.trim(),
            "structured text code:" | "structured text code"
        ) {
            skip_next_empty = true;
            continue;
        }

        cleaned.push(line);
        skip_next_empty = false;
    }

    cleaned.join("\n").trim().to_string()
}
