//! Step graph and depth analysis.
//!
//! The graph maps each step key to its step record and the keys its conditions lead to.
//! Depth queries explore every directed path from an origin and report the shortest and
//! longest edge counts that reach a target. Cycles on an explored path are reported as
//! [`GraphError::Cycle`] instead of being followed.

use std::collections::{HashMap, HashSet};

use indexmap::IndexMap;
use serde::Serialize;
use stepform_types::{FormDefinition, Step};

use crate::error::GraphError;

/// Shortest and longest edge counts from an origin to a target.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
pub struct DepthRange {
    pub min: usize,
    pub max: usize,
}

impl DepthRange {
    fn single(depth: usize) -> Self {
        Self { min: depth, max: depth }
    }

    fn widen(self, other: DepthRange) -> Self {
        Self {
            min: self.min.min(other.min),
            max: self.max.max(other.max),
        }
    }

    fn step_back(self) -> Self {
        Self {
            min: self.min + 1,
            max: self.max + 1,
        }
    }
}

/// A step together with the keys of the steps its conditions target.
#[derive(Debug, Clone)]
pub struct StepNode {
    pub step: Step,
    /// Distinct targets in declared order.
    pub edges: Vec<String>,
}

/// Adjacency view of a form definition.
#[derive(Debug, Clone, Default)]
pub struct StepGraph {
    nodes: IndexMap<String, StepNode>,
}

impl StepGraph {
    pub fn from_definition(definition: &FormDefinition) -> Self {
        Self::from_steps(definition.steps.values().cloned())
    }

    pub fn from_steps(steps: impl IntoIterator<Item = Step>) -> Self {
        let nodes = steps
            .into_iter()
            .map(|step| {
                let mut edges: Vec<String> = Vec::new();
                for key in step.next_step_keys() {
                    if !key.is_empty() && !edges.iter().any(|edge| edge == key) {
                        edges.push(key.to_string());
                    }
                }
                (step.key.clone(), StepNode { step, edges })
            })
            .collect();
        Self { nodes }
    }

    pub fn node(&self, key: &str) -> Option<&StepNode> {
        self.nodes.get(key)
    }

    pub fn len(&self) -> usize {
        self.nodes.len()
    }

    pub fn is_empty(&self) -> bool {
        self.nodes.is_empty()
    }

    /// Key of the step flagged as the entry point.
    pub fn origin(&self) -> Option<&str> {
        self.nodes.values().find(|node| node.step.origin).map(|node| node.step.key.as_str())
    }

    /// Depth of `target` below `origin` and the depth of the whole form.
    ///
    /// `min` is the fewest edges on any path from `origin` that reaches `target`; `max` is
    /// the longest path from `origin` to any step, the denominator of branch-aware
    /// progress. When `origin` is `target` the range is `0..0`. Edges pointing at keys
    /// missing from the graph are treated as dead ends.
    pub fn recurse_depth(&self, origin: &str, target: &str) -> Result<DepthRange, GraphError> {
        self.require(origin)?;
        self.require(target)?;
        if origin == target {
            return Ok(DepthRange::single(0));
        }

        let mut search = DepthSearch {
            graph: self,
            target,
            memo: HashMap::new(),
            path: Vec::new(),
        };
        let reached = search.visit(origin)?.ok_or_else(|| GraphError::Unreachable {
            origin: origin.to_string(),
            target: target.to_string(),
        })?;
        let deepest = self.max_depths(origin)?.values().copied().max().unwrap_or(0);
        Ok(DepthRange {
            min: reached.min,
            max: deepest.max(reached.max),
        })
    }

    /// Returns the first cycle found, as a path that starts and ends at the same key.
    pub fn find_cycle(&self) -> Option<Vec<String>> {
        let mut finished: HashSet<&str> = HashSet::new();
        let mut path: Vec<&str> = Vec::new();
        for key in self.nodes.keys() {
            if let Some(cycle) = self.cycle_from(key, &mut path, &mut finished) {
                return Some(cycle);
            }
        }
        None
    }

    fn cycle_from<'a>(&'a self, key: &'a str, path: &mut Vec<&'a str>, finished: &mut HashSet<&'a str>) -> Option<Vec<String>> {
        if finished.contains(key) {
            return None;
        }
        if let Some(position) = path.iter().position(|entry| *entry == key) {
            let mut cycle: Vec<String> = path[position..].iter().map(|entry| entry.to_string()).collect();
            cycle.push(key.to_string());
            return Some(cycle);
        }
        let node = self.nodes.get(key)?;
        path.push(key);
        for edge in &node.edges {
            if let Some(cycle) = self.cycle_from(edge, path, finished) {
                return Some(cycle);
            }
        }
        path.pop();
        finished.insert(key);
        None
    }

    /// Longest path length from `origin` to every step reachable from it.
    pub fn max_depths(&self, origin: &str) -> Result<IndexMap<String, usize>, GraphError> {
        self.require(origin)?;
        if let Some(path) = self.find_cycle() {
            return Err(GraphError::Cycle { path });
        }
        let mut depths: IndexMap<String, usize> = IndexMap::new();
        depths.insert(origin.to_string(), 0);
        for key in self.topological_order(origin) {
            let Some(&depth) = depths.get(key) else { continue };
            let Some(node) = self.nodes.get(key) else { continue };
            for edge in node.edges.iter().filter(|edge| self.nodes.contains_key(edge.as_str())) {
                let entry = depths.entry(edge.clone()).or_insert(0);
                *entry = (*entry).max(depth + 1);
            }
        }
        Ok(depths)
    }

    /// Branch-aware progress: the longest path to `current` over the longest path in the
    /// form, as a rounded percentage.
    pub fn progress_percent(&self, origin: &str, current: &str) -> Result<u32, GraphError> {
        let depths = self.max_depths(origin)?;
        let Some(&depth) = depths.get(current) else {
            return Err(GraphError::Unreachable {
                origin: origin.to_string(),
                target: current.to_string(),
            });
        };
        let total = depths.values().copied().max().unwrap_or(0);
        if total == 0 {
            return Ok(0);
        }
        Ok(((depth as f64 / total as f64) * 100.0).round() as u32)
    }

    // Reverse post-order of the nodes reachable from `origin`; the graph must be acyclic.
    fn topological_order<'a>(&'a self, origin: &'a str) -> Vec<&'a str> {
        fn visit<'a>(graph: &'a StepGraph, key: &'a str, seen: &mut HashSet<&'a str>, order: &mut Vec<&'a str>) {
            if !seen.insert(key) {
                return;
            }
            if let Some(node) = graph.nodes.get(key) {
                for edge in &node.edges {
                    visit(graph, edge, seen, order);
                }
            }
            order.push(key);
        }

        let mut seen = HashSet::new();
        let mut order = Vec::new();
        visit(self, origin, &mut seen, &mut order);
        order.reverse();
        order
    }

    fn require(&self, key: &str) -> Result<(), GraphError> {
        if self.nodes.contains_key(key) {
            Ok(())
        } else {
            Err(GraphError::UnknownStep(key.to_string()))
        }
    }
}

/// Linear progress from a step's reported position: `round(step_number / total_steps * 100)`.
pub fn linear_progress_percent(step: &Step) -> Option<u32> {
    let (number, total) = (step.step_number?, step.total_steps?);
    if total == 0 {
        return None;
    }
    Some(((number as f64 / total as f64) * 100.0).round() as u32)
}

struct DepthSearch<'a> {
    graph: &'a StepGraph,
    target: &'a str,
    // Depth range from each finished node to the target; `None` when it cannot reach it.
    memo: HashMap<&'a str, Option<DepthRange>>,
    path: Vec<&'a str>,
}

impl<'a> DepthSearch<'a> {
    fn visit(&mut self, key: &'a str) -> Result<Option<DepthRange>, GraphError> {
        if key == self.target {
            return Ok(Some(DepthRange::single(0)));
        }
        if let Some(known) = self.memo.get(key) {
            return Ok(*known);
        }
        if let Some(position) = self.path.iter().position(|entry| *entry == key) {
            let mut path: Vec<String> = self.path[position..].iter().map(|entry| entry.to_string()).collect();
            path.push(key.to_string());
            return Err(GraphError::Cycle { path });
        }
        let graph = self.graph;
        let Some(node) = graph.nodes.get(key) else {
            return Ok(None);
        };

        self.path.push(key);
        let mut range: Option<DepthRange> = None;
        for edge in &node.edges {
            if let Some(found) = self.visit(edge)? {
                let found = found.step_back();
                range = Some(range.map_or(found, |current| current.widen(found)));
            }
        }
        self.path.pop();
        self.memo.insert(key, range);
        Ok(range)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use stepform_types::Condition;

    fn step(key: &str, next: &[&str]) -> Step {
        Step {
            key: key.into(),
            origin: key == "step1",
            next_conditions: next
                .iter()
                .map(|target| Condition {
                    next_step_key: target.to_string(),
                    ..Default::default()
                })
                .collect(),
            ..Default::default()
        }
    }

    #[test]
    fn origin_to_itself_is_zero() {
        let graph = StepGraph::from_steps([step("step1", &[])]);
        assert_eq!(graph.recurse_depth("step1", "step1"), Ok(DepthRange { min: 0, max: 0 }));
        assert_eq!(graph.origin(), Some("step1"));
    }

    #[test]
    fn linear_chain_has_equal_bounds() {
        let graph = StepGraph::from_steps([step("step1", &["step2"]), step("step2", &["step3"]), step("step3", &[])]);
        assert_eq!(graph.recurse_depth("step1", "step3"), Ok(DepthRange { min: 2, max: 2 }));
    }

    #[test]
    fn branches_report_min_and_max() {
        let graph = StepGraph::from_steps([step("step1", &["step2", "step3"]), step("step2", &["step3"]), step("step3", &[])]);
        assert_eq!(graph.recurse_depth("step1", "step3"), Ok(DepthRange { min: 1, max: 2 }));
    }

    #[test]
    fn max_is_the_deepest_path_of_the_form() {
        let graph = StepGraph::from_steps([
            step("step1", &["step2", "step3"]),
            step("step2", &[]),
            step("step3", &["step4"]),
            step("step4", &[]),
        ]);
        assert_eq!(graph.recurse_depth("step1", "step2"), Ok(DepthRange { min: 1, max: 2 }));
        assert_eq!(graph.recurse_depth("step1", "step4"), Ok(DepthRange { min: 2, max: 2 }));
        assert_eq!(graph.recurse_depth("step1", "step1"), Ok(DepthRange { min: 0, max: 0 }));
    }

    #[test]
    fn unreachable_and_unknown_targets_are_errors() {
        let graph = StepGraph::from_steps([step("step1", &["missing"]), step("step2", &[])]);
        assert_eq!(
            graph.recurse_depth("step1", "step2"),
            Err(GraphError::Unreachable {
                origin: "step1".into(),
                target: "step2".into()
            })
        );
        assert_eq!(graph.recurse_depth("step1", "nope"), Err(GraphError::UnknownStep("nope".into())));
    }

    #[test]
    fn cycles_are_reported_not_followed() {
        let graph = StepGraph::from_steps([step("step1", &["step2"]), step("step2", &["step1", "step3"]), step("step3", &[])]);
        assert_eq!(
            graph.recurse_depth("step1", "step3"),
            Err(GraphError::Cycle {
                path: vec!["step1".into(), "step2".into(), "step1".into()]
            })
        );
        assert_eq!(graph.find_cycle(), Some(vec!["step1".into(), "step2".into(), "step1".into()]));
        assert!(matches!(graph.progress_percent("step1", "step2"), Err(GraphError::Cycle { .. })));
    }

    #[test]
    fn progress_uses_longest_paths() {
        let graph = StepGraph::from_steps([
            step("step1", &["step2", "step4"]),
            step("step2", &["step3"]),
            step("step3", &["step4"]),
            step("step4", &[]),
        ]);
        assert_eq!(graph.find_cycle(), None);
        assert_eq!(graph.progress_percent("step1", "step1"), Ok(0));
        assert_eq!(graph.progress_percent("step1", "step2"), Ok(33));
        assert_eq!(graph.progress_percent("step1", "step4"), Ok(100));
    }

    #[test]
    fn linear_progress_rounds() {
        let step = Step {
            step_number: Some(1),
            total_steps: Some(3),
            ..Default::default()
        };
        assert_eq!(linear_progress_percent(&step), Some(33));
        assert_eq!(linear_progress_percent(&Step::default()), None);
    }
}
