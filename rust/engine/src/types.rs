use std::fmt;
use std::str::FromStr;

use serde::{Deserialize, Serialize};

/// The operational role of a stage within a control process.
///
/// Stage 0 of every plan is `Idle` and stage 1 is `Safety`; the remaining
/// stages carry the actual process logic.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum StageType {
    Idle,
    Safety,
    Fault,
    Shutdown,
    Validation,
    #[serde(other)]
    Operation,
}

impl StageType {
    /// Return the canonical lowercase name.
    #[must_use]
    pub fn as_str(self) -> &'static str {
        match self {
            Self::Idle => "idle",
            Self::Safety => "safety",
            Self::Operation => "operation",
            Self::Fault => "fault",
            Self::Shutdown => "shutdown",
            Self::Validation => "validation",
        }
    }
}

impl fmt::Display for StageType {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for StageType {
    type Err = std::convert::Infallible;

    /// Unknown values map to `Operation`, mirroring the lenient handling
    /// of model-produced stage types.
    fn from_str(s: &str) -> Result<Self, Self::Err> {
        Ok(match s.trim().to_lowercase().as_str() {
            "idle" => Self::Idle,
            "safety" => Self::Safety,
            "fault" => Self::Fault,
            "shutdown" => Self::Shutdown,
            "validation" => Self::Validation,
            _ => Self::Operation,
        })
    }
}

/// How the target PLC schedules a program block.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum ExecutionType {
    Scan,
    Initial,
    Event,
    #[serde(rename = "Fixed Scan")]
    FixedScan,
    Standby,
}

impl ExecutionType {
    /// Return the vendor spelling used in label tables and exports.
    #[must_use]
    pub fn as_str(self) -> &'static str {
        match self {
            Self::Scan => "Scan",
            Self::Initial => "Initial",
            Self::Event => "Event",
            Self::FixedScan => "Fixed Scan",
            Self::Standby => "Standby",
        }
    }

    /// The execution type a stage's program runs under, derived statically
    /// from the stage type.
    #[must_use]
    pub fn for_stage(stage_type: StageType) -> Self {
        match stage_type {
            StageType::Idle => Self::Initial,
            StageType::Fault => Self::Event,
            StageType::Safety
            | StageType::Operation
            | StageType::Shutdown
            | StageType::Validation => Self::Scan,
        }
    }
}

impl Default for ExecutionType {
    fn default() -> Self {
        Self::Scan
    }
}

impl fmt::Display for ExecutionType {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for ExecutionType {
    type Err = std::convert::Infallible;

    /// Unknown values map to `Scan`, the default scheduling mode.
    fn from_str(s: &str) -> Result<Self, Self::Err> {
        Ok(match s.trim().to_lowercase().as_str() {
            "initial" => Self::Initial,
            "event" => Self::Event,
            "fixed scan" => Self::FixedScan,
            "standby" => Self::Standby,
            _ => Self::Scan,
        })
    }
}

/// The engine mutation recorded by a version-ledger entry.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum VersionAction {
    EditLogic,
    GenerateCode,
    EditCode,
    Validate,
    SafetyCheck,
}

impl VersionAction {
    /// Return the canonical `snake_case` name.
    #[must_use]
    pub fn as_str(self) -> &'static str {
        match self {
            Self::EditLogic => "edit_logic",
            Self::GenerateCode => "generate_code",
            Self::EditCode => "edit_code",
            Self::Validate => "validate",
            Self::SafetyCheck => "safety_check",
        }
    }

    /// Whether this action increments the minor version (and zeroes the
    /// patch). All other actions increment the patch only.
    #[must_use]
    pub fn bumps_minor(self) -> bool {
        matches!(self, Self::Validate | Self::GenerateCode)
    }
}

impl fmt::Display for VersionAction {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// The granularity of a version-ledger entry.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum VersionLevel {
    Event,
    Session,
    Checkpoint,
}

impl VersionLevel {
    /// Return the canonical lowercase name.
    #[must_use]
    pub fn as_str(self) -> &'static str {
        match self {
            Self::Event => "event",
            Self::Session => "session",
            Self::Checkpoint => "checkpoint",
        }
    }
}

/// Severity of a categorized stage-validation issue.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum IssueSeverity {
    Critical,
    Moderate,
    Optional,
}

impl IssueSeverity {
    /// Return the canonical lowercase name.
    #[must_use]
    pub fn as_str(self) -> &'static str {
        match self {
            Self::Critical => "critical",
            Self::Moderate => "moderate",
            Self::Optional => "optional",
        }
    }

    /// Parse the bracketed tag used in validator output, e.g. `[CRITICAL]`.
    #[must_use]
    pub fn from_tag(line: &str) -> Option<Self> {
        let upper = line.trim_start().to_uppercase();
        if upper.starts_with("[CRITICAL]") {
            Some(Self::Critical)
        } else if upper.starts_with("[MODERATE]") {
            Some(Self::Moderate)
        } else if upper.starts_with("[OPTIONAL]") {
            Some(Self::Optional)
        } else {
            None
        }
    }
}

impl fmt::Display for IssueSeverity {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Lifecycle status of a project.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum ProjectStatus {
    Active,
    Archived,
    Deleted,
}

impl Default for ProjectStatus {
    fn default() -> Self {
        Self::Active
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn stage_type_round_trips_and_defaults() {
        assert_eq!("idle".parse::<StageType>(), Ok(StageType::Idle));
        assert_eq!("SAFETY".parse::<StageType>(), Ok(StageType::Safety));
        assert_eq!("mystery".parse::<StageType>(), Ok(StageType::Operation));
    }

    #[test]
    fn execution_type_for_stage_matches_schedule_table() {
        assert_eq!(
            ExecutionType::for_stage(StageType::Idle),
            ExecutionType::Initial
        );
        assert_eq!(
            ExecutionType::for_stage(StageType::Fault),
            ExecutionType::Event
        );
        assert_eq!(
            ExecutionType::for_stage(StageType::Operation),
            ExecutionType::Scan
        );
        assert_eq!(
            ExecutionType::for_stage(StageType::Shutdown),
            ExecutionType::Scan
        );
    }

    #[test]
    fn fixed_scan_spelling_is_preserved() {
        assert_eq!(ExecutionType::FixedScan.as_str(), "Fixed Scan");
        assert_eq!(
            "fixed scan".parse::<ExecutionType>(),
            Ok(ExecutionType::FixedScan)
        );
    }

    #[test]
    fn severity_tags_parse_case_insensitively() {
        assert_eq!(
            IssueSeverity::from_tag("[CRITICAL] Missing e-stop"),
            Some(IssueSeverity::Critical)
        );
        assert_eq!(
            IssueSeverity::from_tag("  [moderate] Alarm detail"),
            Some(IssueSeverity::Moderate)
        );
        assert_eq!(IssueSeverity::from_tag("Description: x"), None);
    }
}
