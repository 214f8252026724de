//! Dependency Graph
//!
//! Derives the step dependency DAG from the `$stepK` references inside
//! step inputs and conditions, then plans execution:
//!
//! - **Levels**: Kahn levelling; level *i* holds the steps whose
//!   dependencies all lie in earlier levels, sorted by step number
//! - **Critical path**: longest dependency chain, ties toward the lower
//!   step number
//! - **Parallelization factor**: `1 - critical_path_len / total_steps`
//!
//! Building is a pure function of the definition. [`GraphBuilder`] caches
//! built graphs per `(id, version)` and a fingerprint of the steps, so a
//! definition replaced in place under the same version is planned again.

use std::collections::hash_map::DefaultHasher;
use std::collections::{BTreeMap, BTreeSet, HashMap};
use std::hash::{Hash, Hasher};
use std::sync::{Arc, Mutex};

use log::{debug, info, warn};
use serde::Serialize;

use crate::error::{ValidationError, ValidationIssue};
use crate::expression::VariableRef;

use super::model::{WorkflowDefinition, WorkflowStep};
use super::validator::validate_steps;

/// step -> steps it depends on
type Edges = BTreeMap<u32, BTreeSet<u32>>;

/// Validated, acyclic dependency graph with its execution plan.
#[derive(Debug, Clone, PartialEq)]
pub struct DependencyGraph {
    dependencies: Edges,
    dependents: Edges,
    execution_order: Vec<Vec<u32>>,
    critical_path: Vec<u32>,
}

impl DependencyGraph {
    fn from_edges(dependencies: Edges) -> Self {
        let mut dependents: Edges = dependencies.keys().map(|n| (*n, BTreeSet::new())).collect();
        for (step, deps) in &dependencies {
            for dep in deps {
                dependents.entry(*dep).or_default().insert(*step);
            }
        }

        let execution_order = levels(&dependencies);
        let critical_path = critical_path(&dependencies, &execution_order);

        Self {
            dependencies,
            dependents,
            execution_order,
            critical_path,
        }
    }

    /// Levels in execution order; each level sorted ascending.
    pub fn execution_order(&self) -> &[Vec<u32>] {
        &self.execution_order
    }

    pub fn critical_path(&self) -> &[u32] {
        &self.critical_path
    }

    pub fn total_steps(&self) -> usize {
        self.dependencies.len()
    }

    /// `1 - critical_path_len / total_steps`, 0 for an empty graph.
    pub fn parallelization_factor(&self) -> f64 {
        if self.dependencies.is_empty() {
            return 0.0;
        }
        1.0 - self.critical_path.len() as f64 / self.dependencies.len() as f64
    }

    /// Direct dependencies of `step`, ascending.
    pub fn dependencies_of(&self, step: u32) -> Vec<u32> {
        self.dependencies
            .get(&step)
            .map(|deps| deps.iter().copied().collect())
            .unwrap_or_default()
    }

    /// Steps that directly depend on `step`, ascending.
    pub fn dependents_of(&self, step: u32) -> Vec<u32> {
        self.dependents
            .get(&step)
            .map(|deps| deps.iter().copied().collect())
            .unwrap_or_default()
    }

    /// Zero-based level index of `step`.
    pub fn level_of(&self, step: u32) -> Option<usize> {
        self.execution_order
            .iter()
            .position(|level| level.contains(&step))
    }

    /// True iff neither step is a transitive dependency of the other.
    pub fn can_execute_in_parallel(&self, a: u32, b: u32) -> bool {
        if a == b || !self.dependencies.contains_key(&a) || !self.dependencies.contains_key(&b) {
            return false;
        }
        !self.ancestors(a).contains(&b) && !self.ancestors(b).contains(&a)
    }

    /// All transitive dependencies of `step`.
    pub fn ancestors(&self, step: u32) -> BTreeSet<u32> {
        let mut seen = BTreeSet::new();
        let mut stack = self.dependencies_of(step);
        while let Some(next) = stack.pop() {
            if seen.insert(next) {
                stack.extend(self.dependencies_of(next));
            }
        }
        seen
    }
}

/// Non-failing report over a definition, used by `--analyze` and tooling.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct GraphAnalysis {
    pub execution_order: Vec<Vec<u32>>,
    pub critical_path: Vec<u32>,
    pub parallelization_factor: f64,
    pub has_cycles: bool,
    pub cycles: Vec<Vec<u32>>,
    pub validation_errors: Vec<String>,
}

/// `(id, version, steps fingerprint)`
type CacheKey = (String, String, u64);

/// Hash of the serialized steps; `None` if they cannot be serialized.
fn fingerprint(steps: &[WorkflowStep]) -> Option<u64> {
    let bytes = serde_json::to_vec(steps).ok()?;
    let mut hasher = DefaultHasher::new();
    bytes.hash(&mut hasher);
    Some(hasher.finish())
}

/// Builds dependency graphs and caches them per definition version.
#[derive(Debug, Default)]
pub struct GraphBuilder {
    cache: Mutex<HashMap<CacheKey, Arc<DependencyGraph>>>,
}

impl GraphBuilder {
    pub fn new() -> Self {
        Self::default()
    }

    /// Validates `steps` and builds their graph.
    ///
    /// Fails with every structural issue found, including cycles.
    pub fn build(&self, steps: &[WorkflowStep]) -> Result<DependencyGraph, ValidationError> {
        let mut issues = validate_steps(steps);
        let edges = extract_edges(steps);

        for cycle in find_cycles(&edges) {
            warn!("Dependency cycle detected: {:?}", cycle);
            issues.push(ValidationIssue::Cycle(cycle));
        }

        if !issues.is_empty() {
            return Err(ValidationError::new(issues));
        }

        let graph = DependencyGraph::from_edges(edges);
        debug!(
            "Built graph: {} steps in {} levels, critical path {:?}",
            graph.total_steps(),
            graph.execution_order.len(),
            graph.critical_path
        );
        Ok(graph)
    }

    /// Builds the graph for `definition`, reusing a cached build of the
    /// same `(id, version)` with identical steps.
    pub fn build_for(&self, definition: &WorkflowDefinition) -> Result<Arc<DependencyGraph>, ValidationError> {
        let key = fingerprint(&definition.steps)
            .map(|hash| (definition.id.clone(), definition.version.clone(), hash));

        if let Some(graph) = key.as_ref().and_then(|k| self.lock().get(k).cloned()) {
            debug!("Graph cache hit for '{}' v{}", definition.id, definition.version);
            return Ok(graph);
        }

        let graph = Arc::new(self.build(&definition.steps)?);
        info!(
            "Planned '{}' v{}: {} levels, parallelization factor {:.2}",
            definition.id,
            definition.version,
            graph.execution_order.len(),
            graph.parallelization_factor()
        );
        if let Some(key) = key {
            self.lock().insert(key, Arc::clone(&graph));
        }
        Ok(graph)
    }

    /// Reports on `definition` without failing.
    pub fn analyze(&self, definition: &WorkflowDefinition) -> GraphAnalysis {
        let steps = &definition.steps;
        let issues = validate_steps(steps);
        let edges = extract_edges(steps);
        let cycles = find_cycles(&edges);

        let mut validation_errors: Vec<String> = issues.iter().map(|i| i.to_string()).collect();
        validation_errors.extend(cycles.iter().map(|c| ValidationIssue::Cycle(c.clone()).to_string()));

        if !cycles.is_empty() {
            return GraphAnalysis {
                execution_order: Vec::new(),
                critical_path: Vec::new(),
                parallelization_factor: 0.0,
                has_cycles: true,
                cycles,
                validation_errors,
            };
        }

        let graph = DependencyGraph::from_edges(edges);
        GraphAnalysis {
            parallelization_factor: graph.parallelization_factor(),
            execution_order: graph.execution_order,
            critical_path: graph.critical_path,
            has_cycles: false,
            cycles,
            validation_errors,
        }
    }

    /// Drops every cached graph.
    pub fn clear_cache(&self) {
        self.lock().clear();
    }

    fn lock(&self) -> std::sync::MutexGuard<'_, HashMap<CacheKey, Arc<DependencyGraph>>> {
        match self.cache.lock() {
            Ok(guard) => guard,
            Err(poisoned) => poisoned.into_inner(),
        }
    }
}

/// Collects an edge for every reference to an existing step, including
/// forward and self references so that cycle detection sees them.
fn extract_edges(steps: &[WorkflowStep]) -> Edges {
    let mut edges: Edges = steps.iter().map(|s| (s.step_number, BTreeSet::new())).collect();

    for step in steps {
        for raw in step.references() {
            let Some(target) = VariableRef::parse(&raw).and_then(|v| v.step()) else {
                continue;
            };
            if edges.contains_key(&target) {
                edges.entry(step.step_number).or_default().insert(target);
            }
        }
    }

    edges
}

#[derive(Clone, Copy, PartialEq)]
enum Color {
    White,
    Gray,
    Black,
}

/// DFS colouring. Each cycle is reported once as a closed path such as
/// `[1, 2, 1]`.
fn find_cycles(edges: &Edges) -> Vec<Vec<u32>> {
    let mut colors: HashMap<u32, Color> = edges.keys().map(|n| (*n, Color::White)).collect();
    let mut cycles = Vec::new();

    for start in edges.keys() {
        if colors.get(start) == Some(&Color::White) {
            let mut stack = Vec::new();
            visit(*start, edges, &mut colors, &mut stack, &mut cycles);
        }
    }

    cycles
}

fn visit(
    node: u32,
    edges: &Edges,
    colors: &mut HashMap<u32, Color>,
    stack: &mut Vec<u32>,
    cycles: &mut Vec<Vec<u32>>,
) {
    colors.insert(node, Color::Gray);
    stack.push(node);

    if let Some(deps) = edges.get(&node) {
        for dep in deps {
            match colors.get(dep).copied().unwrap_or(Color::Black) {
                Color::White => visit(*dep, edges, colors, stack, cycles),
                Color::Gray => {
                    if let Some(pos) = stack.iter().position(|n| n == dep) {
                        let mut cycle = stack[pos..].to_vec();
                        cycle.push(*dep);
                        cycles.push(cycle);
                    }
                }
                Color::Black => {}
            }
        }
    }

    stack.pop();
    colors.insert(node, Color::Black);
}

/// Kahn levelling over an acyclic edge set.
fn levels(edges: &Edges) -> Vec<Vec<u32>> {
    let mut placed = BTreeSet::new();
    let mut order = Vec::new();

    while placed.len() < edges.len() {
        let level: Vec<u32> = edges
            .iter()
            .filter(|(step, deps)| !placed.contains(*step) && deps.iter().all(|d| placed.contains(d)))
            .map(|(step, _)| *step)
            .collect();

        if level.is_empty() {
            break;
        }
        placed.extend(level.iter().copied());
        order.push(level);
    }

    order
}

/// Longest path through the DAG, walking levels in order.
fn critical_path(edges: &Edges, order: &[Vec<u32>]) -> Vec<u32> {
    let mut length: HashMap<u32, usize> = HashMap::new();
    let mut previous: HashMap<u32, u32> = HashMap::new();

    for step in order.iter().flatten() {
        // deps iterate ascending, so strict `>` keeps the lower step on ties
        let mut best: Option<(u32, usize)> = None;
        for dep in edges.get(step).into_iter().flatten() {
            let len = length.get(dep).copied().unwrap_or(0);
            if best.map_or(true, |(_, b)| len > b) {
                best = Some((*dep, len));
            }
        }

        match best {
            Some((dep, len)) => {
                length.insert(*step, len + 1);
                previous.insert(*step, dep);
            }
            None => {
                length.insert(*step, 1);
            }
        }
    }

    let mut end: Option<(u32, usize)> = None;
    for step in edges.keys() {
        let len = length.get(step).copied().unwrap_or(0);
        if end.map_or(true, |(_, b)| len > b) {
            end = Some((*step, len));
        }
    }

    let mut path = Vec::new();
    let mut cursor = end.map(|(step, _)| step);
    while let Some(step) = cursor {
        path.push(step);
        cursor = previous.get(&step).copied();
    }
    path.reverse();
    path
}
