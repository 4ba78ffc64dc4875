//! Graph checks over stage transitions.
//!
//! Pure pass over `(stages, dependencies)`. Missing endpoints are errors;
//! backward edges and unreachable stages are warnings. Run as a validation
//! report after segregation, not as a gate.

use std::collections::{HashSet, VecDeque};

use serde::{Deserialize, Serialize};

use crate::model::StageDependency;
use crate::segregate::PlannedStage;

/// The outcome of the dependency pass.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct DependencyReport {
    pub valid: bool,
    pub errors: Vec<String>,
    pub warnings: Vec<String>,
}

/// A node of the transition graph handed to visualization.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct GraphNode {
    pub id: u32,
    pub label: String,
    #[serde(rename = "type")]
    pub stage_type: String,
}

/// An edge of the transition graph.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct GraphEdge {
    pub from: u32,
    pub to: u32,
    pub label: String,
}

/// Stage transitions in a renderable shape.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct TransitionGraph {
    pub nodes: Vec<GraphNode>,
    pub edges: Vec<GraphEdge>,
}

/// Check dependency endpoints, direction, and reachability from stage 0.
#[must_use]
pub fn validate_dependencies(
    stages: &[PlannedStage],
    dependencies: &[StageDependency],
) -> DependencyReport {
    let stage_numbers: HashSet<u32> = stages.iter().map(|s| s.stage_number).collect();
    let mut errors = Vec::new();
    let mut warnings = Vec::new();

    for dep in dependencies {
        if !stage_numbers.contains(&dep.from_stage) {
            errors.push(format!(
                "dependency references non-existent stage: {}",
                dep.from_stage
            ));
        }
        if !stage_numbers.contains(&dep.to_stage) {
            errors.push(format!(
                "dependency references non-existent stage: {}",
                dep.to_stage
            ));
        }
        if dep.from_stage >= dep.to_stage {
            warnings.push(format!(
                "backwards dependency: stage {} -> {}",
                dep.from_stage, dep.to_stage
            ));
        }
    }

    // Breadth-first reachability from stage 0.
    let mut reachable: HashSet<u32> = HashSet::from([0]);
    let mut queue: VecDeque<u32> = VecDeque::from([0]);
    while let Some(current) = queue.pop_front() {
        for dep in dependencies {
            if dep.from_stage == current && reachable.insert(dep.to_stage) {
                queue.push_back(dep.to_stage);
            }
        }
    }

    for stage in stages {
        if stage.stage_number != 0 && !reachable.contains(&stage.stage_number) {
            warnings.push(format!("stage {} may be unreachable", stage.stage_number));
        }
    }

    DependencyReport {
        valid: errors.is_empty(),
        errors,
        warnings,
    }
}

/// Build the transition graph for downstream visualization.
#[must_use]
pub fn transition_graph(
    stages: &[PlannedStage],
    dependencies: &[StageDependency],
) -> TransitionGraph {
    TransitionGraph {
        nodes: stages
            .iter()
            .map(|stage| GraphNode {
                id: stage.stage_number,
                label: stage.stage_name.clone(),
                stage_type: stage.stage_type.as_str().to_string(),
            })
            .collect(),
        edges: dependencies
            .iter()
            .map(|dep| GraphEdge {
                from: dep.from_stage,
                to: dep.to_stage,
                label: dep.condition.clone(),
            })
            .collect(),
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::types::StageType;

    fn stage(number: u32, stage_type: StageType) -> PlannedStage {
        PlannedStage {
            stage_number: number,
            stage_name: format!("Stage {number}"),
            stage_type,
            description: String::new(),
            original_logic: String::new(),
        }
    }

    fn dep(from: u32, to: u32) -> StageDependency {
        StageDependency {
            from_stage: from,
            to_stage: to,
            condition: String::new(),
        }
    }

    #[test]
    fn missing_endpoint_is_an_error() {
        let stages = vec![stage(0, StageType::Idle), stage(1, StageType::Safety)];
        let report = validate_dependencies(&stages, &[dep(0, 1), dep(1, 7)]);
        assert!(!report.valid);
        assert_eq!(report.errors.len(), 1);
        assert!(report.errors[0].contains('7'));
    }

    #[test]
    fn backward_and_self_edges_warn_but_stay_valid() {
        let stages = vec![
            stage(0, StageType::Idle),
            stage(1, StageType::Safety),
            stage(2, StageType::Operation),
        ];
        let report = validate_dependencies(&stages, &[dep(0, 1), dep(1, 2), dep(2, 1), dep(1, 1)]);
        assert!(report.valid);
        assert_eq!(report.warnings.len(), 2);
    }

    #[test]
    fn reachability_follows_chains() {
        let stages = vec![
            stage(0, StageType::Idle),
            stage(1, StageType::Safety),
            stage(2, StageType::Operation),
            stage(3, StageType::Operation),
        ];
        // 3 is reachable only through the chain 0 -> 1 -> 2 -> 3.
        let report = validate_dependencies(&stages, &[dep(2, 3), dep(1, 2), dep(0, 1)]);
        assert!(report.valid);
        assert!(report.warnings.is_empty());

        // Remove the 1 -> 2 link: both 2 and 3 become unreachable.
        let report = validate_dependencies(&stages, &[dep(2, 3), dep(0, 1)]);
        assert_eq!(report.warnings.len(), 2);
    }

    #[test]
    fn graph_mirrors_stages_and_conditions() {
        let stages = vec![stage(0, StageType::Idle), stage(1, StageType::Safety)];
        let deps = vec![StageDependency {
            from_stage: 0,
            to_stage: 1,
            condition: "system ready".to_string(),
        }];
        let graph = transition_graph(&stages, &deps);
        assert_eq!(graph.nodes.len(), 2);
        assert_eq!(graph.nodes[0].stage_type, "idle");
        assert_eq!(graph.edges[0].label, "system ready");
    }
}
