//! State merging at join points.

use std::collections::{BTreeMap, BTreeSet};

use tracing::{debug, trace};
use z3::ast::{Ast, Bool};

use veriscan_ir::Program;
use veriscan_smt::Smt;

use crate::config::{Configuration, MergeStrategy};
use crate::context::{Context, State};

pub(crate) type MergePoint = (String, usize, usize);

/// Buffers contexts that reached a predeclared merge point and fuses
/// them once all expected predecessors have arrived, or when exploration
/// starves.
///
/// Merge points are keyed by `(scope, return label, vertex label)`, so
/// the same graph invoked at different call sites merges separately.
pub struct Merger<'ctx> {
    merge_points: BTreeSet<MergePoint>,
    expected: BTreeMap<MergePoint, usize>,
    pending: BTreeMap<MergePoint, Vec<Context<'ctx>>>,
}

impl<'ctx> Merger<'ctx> {
    /// Predeclare merge points per the configured strategy.
    pub fn new(config: &Configuration, program: &Program) -> Self {
        let mut merge_points = BTreeSet::new();
        let mut expected = BTreeMap::new();
        let main = program.main();
        match config.merge_strategy {
            MergeStrategy::OnlyAtCycleEnd => {
                let point = (main.name().to_string(), main.exit(), main.exit());
                expected.insert(point.clone(), predecessor_count(program, main, main.exit()));
                merge_points.insert(point);
            }
            MergeStrategy::AtAllJoinPoints => {
                collect_points(
                    program,
                    main,
                    main.name().to_string(),
                    main.exit(),
                    &mut merge_points,
                    &mut expected,
                );
            }
        }
        Self { merge_points, expected, pending: BTreeMap::new() }
    }

    /// A merger with no merge points. The baseline flavor explores every
    /// path separately, so nothing is ever buffered.
    pub fn disabled() -> Self {
        Self {
            merge_points: BTreeSet::new(),
            expected: BTreeMap::new(),
            pending: BTreeMap::new(),
        }
    }

    /// Whether any context is buffered.
    pub fn is_empty(&self) -> bool {
        self.pending.values().all(Vec::is_empty)
    }

    /// Whether `context` sits at one of the predeclared merge points.
    pub fn reached_merge_point(&self, context: &Context<'ctx>) -> bool {
        self.merge_points.contains(&point_of(context))
    }

    /// Buffer a context at its merge point.
    pub fn push(&mut self, context: Context<'ctx>) {
        let point = point_of(&context);
        trace!(scope = %point.0, label = point.2, "buffering context at merge point");
        self.pending.entry(point).or_default().push(context);
    }

    /// Fuse every merge point whose expected predecessors have all
    /// arrived. Returns the merged contexts, ready for exploration.
    pub fn merge_ready(&mut self, smt: &Smt<'ctx>) -> Vec<Context<'ctx>> {
        let ready: Vec<MergePoint> = self
            .pending
            .iter()
            .filter(|(point, contexts)| {
                !contexts.is_empty()
                    && contexts.len() >= self.expected.get(*point).copied().unwrap_or(usize::MAX)
            })
            .map(|(point, _)| point.clone())
            .collect();
        let mut merged = Vec::new();
        for point in ready {
            if let Some(contexts) = self.pending.remove(&point) {
                merged.extend(merge_groups(smt, contexts));
            }
        }
        merged
    }

    /// Starvation rule: fuse every pending merge point with whatever has
    /// arrived, because no more predecessors can. Called when the
    /// explorer runs empty.
    pub fn drain(&mut self, smt: &Smt<'ctx>) -> Vec<Context<'ctx>> {
        let mut merged = Vec::new();
        let pending = std::mem::take(&mut self.pending);
        for (point, contexts) in pending {
            if contexts.is_empty() {
                continue;
            }
            debug!(
                scope = %point.0,
                label = point.2,
                arrived = contexts.len(),
                "draining merge point"
            );
            merged.extend(merge_groups(smt, contexts));
        }
        merged
    }
}

fn point_of(context: &Context<'_>) -> MergePoint {
    let frame = context.frame();
    (
        frame.scope().to_string(),
        frame.return_label(),
        context.state().vertex().label,
    )
}

pub(crate) fn predecessor_count(
    _program: &Program,
    graph: &veriscan_ir::Graph,
    label: usize,
) -> usize {
    graph
        .instructions()
        .flat_map(|(_, instruction)| instruction.successors())
        .filter(|successor| *successor == label)
        .count()
        .max(1)
}

pub(crate) fn collect_points(
    program: &Program,
    graph: &veriscan_ir::Graph,
    scope: String,
    return_label: usize,
    merge_points: &mut BTreeSet<MergePoint>,
    expected: &mut BTreeMap<MergePoint, usize>,
) {
    for label in graph.join_labels() {
        let point = (scope.clone(), return_label, label);
        expected.insert(point.clone(), predecessor_count(program, graph, label));
        merge_points.insert(point);
    }
    for (_, instruction) in graph.instructions() {
        if let veriscan_ir::Instruction::Call { callee, goto_intraprocedural, .. } = instruction {
            if let (Ok(callee_graph), Some(path)) =
                (program.callee(graph, callee), callee.access_path())
            {
                collect_points(
                    program,
                    callee_graph,
                    format!("{}.{}", scope, path),
                    *goto_intraprocedural,
                    merge_points,
                    expected,
                );
            }
        }
    }
}

/// Merge contexts that share a call stack and a cycle; contexts that do
/// not are returned unmerged.
fn merge_groups<'ctx>(smt: &Smt<'ctx>, contexts: Vec<Context<'ctx>>) -> Vec<Context<'ctx>> {
    let mut groups: Vec<Vec<Context<'ctx>>> = Vec::new();
    for context in contexts {
        match groups.iter_mut().find(|members| {
            let representative = &members[0];
            representative.cycle() == context.cycle()
                && representative.call_stack() == context.call_stack()
        }) {
            Some(members) => members.push(context),
            None => groups.push(vec![context]),
        }
    }
    groups
        .into_iter()
        .map(|members| {
            let mut members = members.into_iter();
            let first = members.next().expect("groups are non-empty");
            members.fold(first, |merged, next| merge_pair(smt, merged, next))
        })
        .collect()
}

/// Fuse two contexts at the same vertex into one.
///
/// Each store entry present in both sides becomes an if-then-else over
/// the guards that distinguish the sides; the guards are the conjunction
/// of the path-constraint clauses past the common prefix. The concrete
/// store takes the left side's witness. The merged path constraint is
/// the common prefix plus the disjunction of the two guards.
fn merge_pair<'ctx>(smt: &Smt<'ctx>, left: Context<'ctx>, right: Context<'ctx>) -> Context<'ctx> {
    let cycle = left.cycle();
    let call_stack = left.call_stack().to_vec();
    let left_state = left.state();
    let right_state = right.state();

    let left_pc = left_state.path_constraint();
    let right_pc = right_state.path_constraint();
    let prefix_len = left_pc
        .iter()
        .zip(right_pc.iter())
        .take_while(|(a, b)| a == b)
        .count();
    let left_guard = smt.conjoin(&left_pc[prefix_len..]);
    let right_guard = smt.conjoin(&right_pc[prefix_len..]);

    let mut merged = State::new(left_state.vertex().clone());

    // Union of symbolic entries, phi-selected where the sides disagree.
    let mut names: BTreeSet<&String> = left_state.symbolic_entries().map(|(name, _)| name).collect();
    names.extend(right_state.symbolic_entries().map(|(name, _)| name));
    for name in names {
        let value = match (left_state.symbolic_value(name), right_state.symbolic_value(name)) {
            (Some(left_value), Some(right_value)) if left_value == right_value => {
                left_value.clone()
            }
            (Some(left_value), Some(right_value)) => {
                left_guard.ite(left_value, right_value).simplify()
            }
            (Some(value), None) | (None, Some(value)) => value.clone(),
            (None, None) => continue,
        };
        merged.set_symbolic(name.clone(), value);
    }

    // The concrete store is a witness, not a specification; the left
    // side's values win.
    let mut concrete_names: BTreeSet<&String> =
        left_state.concrete_entries().map(|(name, _)| name).collect();
    concrete_names.extend(right_state.concrete_entries().map(|(name, _)| name));
    for name in concrete_names {
        if let Some(value) = left_state
            .concrete_value(name)
            .or_else(|| right_state.concrete_value(name))
        {
            merged.set_concrete(name.clone(), value.clone());
        }
    }

    for clause in &left_pc[..prefix_len] {
        merged.push_path_constraint(clause.clone());
    }
    if prefix_len < left_pc.len() || prefix_len < right_pc.len() {
        let disjunction: Bool<'ctx> =
            smt.disjoin(&[left_guard, right_guard]).simplify();
        merged.push_path_constraint(disjunction);
    }

    // Version maps take the per-name maximum.
    let mut version_names: BTreeSet<String> = BTreeSet::new();
    for (name, _) in left_state.versions().chain(right_state.versions()) {
        version_names.insert(name.clone());
    }
    for flattened_name in version_names {
        let target = left_state.version(&flattened_name).max(right_state.version(&flattened_name));
        while merged.version(&flattened_name) < target {
            merged.bump_version(&flattened_name);
        }
    }

    debug!(vertex = %merged.vertex(), "merged two contexts");
    Context::new(cycle, merged, call_stack)
}
