//! Static keyword and structural analysis of raw control logic.
//!
//! Pure and deterministic: no I/O, no model calls. The record feeds the
//! stage segregator's prompt and is returned to callers for display.

use std::collections::BTreeSet;

use serde::{Deserialize, Serialize};

const START_KEYWORDS: &[&str] = &["start", "begin", "initialize", "init", "startup"];
const STOP_KEYWORDS: &[&str] = &["stop", "end", "shutdown", "halt", "terminate"];
const EMERGENCY_KEYWORDS: &[&str] = &["emergency", "e-stop", "estop", "abort", "panic"];
const SAFETY_KEYWORDS: &[&str] = &["safety", "interlock", "guard", "protect", "secure"];
const SENSOR_KEYWORDS: &[&str] = &["sensor", "detect", "check", "verify", "confirm"];
const ACTUATOR_KEYWORDS: &[&str] = &["motor", "valve", "cylinder", "conveyor", "pump", "heater"];
const CONDITION_KEYWORDS: &[&str] = &["if", "when", "while", "until", "after", "before"];
const SEQUENCE_KEYWORDS: &[&str] = &["then", "next", "after", "following", "subsequently"];

/// Maximum points each complexity factor contributes.
const COMPLEXITY_CAP: usize = 5;

/// Structural features of a control-logic description.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct FlowAnalysis {
    pub has_start_logic: bool,
    pub has_stop_logic: bool,
    pub has_emergency_logic: bool,
    pub has_safety_logic: bool,
    pub detected_sensors: Vec<String>,
    pub detected_actuators: Vec<String>,
    pub has_conditions: bool,
    pub has_sequence: bool,
    /// 0..=15: word volume + condition keywords + actuator mentions.
    pub complexity_score: usize,
    pub word_count: usize,
    pub line_count: usize,
}

/// Analyze raw control-logic text.
#[must_use]
pub fn analyze(text: &str) -> FlowAnalysis {
    let lower = text.to_lowercase();
    let word_count = text.split_whitespace().count();

    FlowAnalysis {
        has_start_logic: contains_any(&lower, START_KEYWORDS),
        has_stop_logic: contains_any(&lower, STOP_KEYWORDS),
        has_emergency_logic: contains_any(&lower, EMERGENCY_KEYWORDS),
        has_safety_logic: contains_any(&lower, SAFETY_KEYWORDS),
        detected_sensors: device_mentions(&lower, SENSOR_KEYWORDS),
        detected_actuators: device_mentions(&lower, ACTUATOR_KEYWORDS),
        has_conditions: contains_any(&lower, CONDITION_KEYWORDS),
        has_sequence: contains_any(&lower, SEQUENCE_KEYWORDS),
        complexity_score: complexity(&lower, word_count),
        word_count,
        line_count: text.lines().count(),
    }
}

fn contains_any(lower: &str, keywords: &[&str]) -> bool {
    keywords.iter().any(|kw| lower.contains(kw))
}

/// Collect whole words starting with any of the keywords ("valve",
/// "valves", "conveyor2"). Deduplicated and sorted for determinism.
fn device_mentions(lower: &str, keywords: &[&str]) -> Vec<String> {
    let mut mentions = BTreeSet::new();
    for word in lower.split(|c: char| !c.is_alphanumeric() && c != '-') {
        if word.is_empty() {
            continue;
        }
        if keywords.iter().any(|kw| word.starts_with(kw)) {
            mentions.insert(word.to_string());
        }
    }
    mentions.into_iter().collect()
}

fn complexity(lower: &str, word_count: usize) -> usize {
    let volume = (word_count / 50).min(COMPLEXITY_CAP);
    let conditions = CONDITION_KEYWORDS
        .iter()
        .filter(|kw| lower.contains(*kw))
        .count()
        .min(COMPLEXITY_CAP);
    let actuators = device_mentions(lower, ACTUATOR_KEYWORDS)
        .len()
        .min(COMPLEXITY_CAP);
    volume + conditions + actuators
}
