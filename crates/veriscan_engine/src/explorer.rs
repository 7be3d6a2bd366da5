//! Worklist scheduling and coverage accounting.

use std::collections::btree_map::Entry as MapEntry;
use std::collections::{BTreeMap, BinaryHeap};

use veriscan_ir::{Instruction, Program};

use crate::config::{Configuration, ExplorationHeuristic};
use crate::context::{Context, Vertex};

/// Anything the explorer can schedule. Priorities are derived from how
/// far along execution an item is.
pub trait Prioritized {
    /// The item's cycle.
    fn cycle(&self) -> u32;
    /// The item's call-stack depth.
    fn depth(&self) -> usize;
    /// The item's current vertex.
    fn vertex(&self) -> &Vertex;
}

impl Prioritized for Context<'_> {
    fn cycle(&self) -> u32 {
        Context::cycle(self)
    }

    fn depth(&self) -> usize {
        Context::depth(self)
    }

    fn vertex(&self) -> &Vertex {
        self.state().vertex()
    }
}

struct Entry<T> {
    key: (i64, i64, i64, i64),
    item: T,
}

impl<T> PartialEq for Entry<T> {
    fn eq(&self, other: &Self) -> bool {
        self.key == other.key
    }
}

impl<T> Eq for Entry<T> {}

impl<T> PartialOrd for Entry<T> {
    fn partial_cmp(&self, other: &Self) -> Option<std::cmp::Ordering> {
        Some(self.cmp(other))
    }
}

impl<T> Ord for Entry<T> {
    fn cmp(&self, other: &Self) -> std::cmp::Ordering {
        self.key.cmp(&other.key)
    }
}

#[derive(Debug, Clone)]
struct BranchCoverage {
    then_target: usize,
    else_target: usize,
    then_counts: bool,
    else_counts: bool,
    then_reached: bool,
    else_reached: bool,
}

/// Priority-ordered worklist of exploration items plus statement and
/// branch coverage over the label universe.
///
/// Depth-first prefers the item latest in execution: higher cycle, then
/// deeper call stack, then higher label. Breadth-first is the inverse. A
/// monotone sequence number breaks every remaining tie, so the order is
/// total and no two items compare equal.
///
/// The coverage universe excludes labels and branch sides hinted
/// unreachable by a preceding analysis, so a fully explored pruned
/// program still reaches coverage 1.0.
pub struct Explorer<T> {
    heuristic: ExplorationHeuristic,
    queue: BinaryHeap<Entry<T>>,
    sequence: i64,
    statements: BTreeMap<(String, usize), bool>,
    branches: BTreeMap<(String, usize), BranchCoverage>,
}

impl<T: Prioritized> Explorer<T> {
    /// Create an explorer with coverage universes drawn from `program`,
    /// pruned by the configuration's reachability hints.
    pub fn new(config: &Configuration, program: &Program) -> Self {
        let mut statements = BTreeMap::new();
        let mut branches = BTreeMap::new();
        for graph in program.graphs() {
            for (label, instruction) in graph.instructions() {
                if config.is_label_unreachable(graph.name(), label) {
                    continue;
                }
                statements.insert((graph.name().to_string(), label), false);
                let (then_target, else_target) = match instruction {
                    Instruction::If { goto_then, goto_else, .. } => (*goto_then, *goto_else),
                    Instruction::While { goto_body, goto_exit, .. } => (*goto_body, *goto_exit),
                    _ => continue,
                };
                let (then_counts, else_counts) =
                    config.branch_feasibility(graph.name(), label);
                branches.insert(
                    (graph.name().to_string(), label),
                    BranchCoverage {
                        then_target,
                        else_target,
                        then_counts,
                        else_counts,
                        then_reached: false,
                        else_reached: false,
                    },
                );
            }
        }
        Self {
            heuristic: config.exploration_heuristic,
            queue: BinaryHeap::new(),
            sequence: 0,
            statements,
            branches,
        }
    }

    /// Whether the worklist is empty.
    pub fn is_empty(&self) -> bool {
        self.queue.is_empty()
    }

    /// The number of queued items.
    pub fn len(&self) -> usize {
        self.queue.len()
    }

    /// Queue an item.
    pub fn push(&mut self, item: T) {
        self.sequence += 1;
        let cycle = item.cycle() as i64;
        let depth = item.depth() as i64;
        let label = item.vertex().label as i64;
        let key = match self.heuristic {
            ExplorationHeuristic::DepthFirst => (cycle, depth, label, self.sequence),
            ExplorationHeuristic::BreadthFirst => (-cycle, -depth, -label, -self.sequence),
        };
        self.queue.push(Entry { key, item });
    }

    /// Pop the highest-priority item.
    pub fn pop(&mut self) -> Option<T> {
        self.queue.pop().map(|entry| entry.item)
    }

    /// Record that `origin` was executed and that control continued at
    /// `successor`. Returns whether a statement and whether a branch side
    /// was newly covered.
    pub fn update_coverage(&mut self, origin: &Vertex, successor: &Vertex) -> (bool, bool) {
        let key = (origin.graph.clone(), origin.label);
        let newly_covered_statement = match self.statements.entry(key.clone()) {
            MapEntry::Occupied(mut entry) => {
                let newly = !*entry.get();
                *entry.get_mut() = true;
                newly
            }
            MapEntry::Vacant(_) => false,
        };
        let mut newly_covered_branch = false;
        if let Some(branch) = self.branches.get_mut(&key) {
            if successor.label == branch.then_target && branch.then_counts {
                newly_covered_branch = !branch.then_reached;
                branch.then_reached = true;
            } else if successor.label == branch.else_target && branch.else_counts {
                newly_covered_branch = !branch.else_reached;
                branch.else_reached = true;
            }
        }
        (newly_covered_statement, newly_covered_branch)
    }

    /// The fraction of the statement universe reached so far. An empty
    /// universe counts as fully covered.
    pub fn statement_coverage(&self) -> f64 {
        if self.statements.is_empty() {
            return 1.0;
        }
        let covered = self.statements.values().filter(|reached| **reached).count();
        covered as f64 / self.statements.len() as f64
    }

    /// The fraction of counted branch sides reached so far. An empty
    /// universe counts as fully covered.
    pub fn branch_coverage(&self) -> f64 {
        let mut total = 0usize;
        let mut covered = 0usize;
        for branch in self.branches.values() {
            if branch.then_counts {
                total += 1;
                if branch.then_reached {
                    covered += 1;
                }
            }
            if branch.else_counts {
                total += 1;
                if branch.else_reached {
                    covered += 1;
                }
            }
        }
        if total == 0 {
            return 1.0;
        }
        covered as f64 / total as f64
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::collections::BTreeMap as Map;
    use veriscan_ir::{Expression, Graph, GraphKind, Instruction};

    struct Item {
        cycle: u32,
        depth: usize,
        vertex: Vertex,
    }

    impl Prioritized for Item {
        fn cycle(&self) -> u32 {
            self.cycle
        }

        fn depth(&self) -> usize {
            self.depth
        }

        fn vertex(&self) -> &Vertex {
            &self.vertex
        }
    }

    fn item(cycle: u32, depth: usize, label: usize) -> Item {
        Item { cycle, depth, vertex: Vertex::new("P", label) }
    }

    fn branchy_program() -> Program {
        let mut instructions = Map::new();
        instructions.insert(
            0,
            Instruction::If { condition: Expression::var("x"), goto_then: 1, goto_else: 2 },
        );
        instructions.insert(1, Instruction::Goto { next: 3 });
        instructions.insert(2, Instruction::Goto { next: 3 });
        let graph = Graph::new(
            "P",
            GraphKind::Program,
            vec![veriscan_ir::Variable::new(
                "x",
                veriscan_ir::DataType::Bool,
                veriscan_ir::StorageClass::Input,
            )],
            instructions,
            0,
            3,
        );
        Program::new(vec![graph]).unwrap()
    }

    #[test]
    fn depth_first_pops_latest_in_execution() {
        let program = branchy_program();
        let config = Configuration::default();
        let mut explorer: Explorer<Item> = Explorer::new(&config, &program);
        explorer.push(item(0, 1, 1));
        explorer.push(item(1, 1, 0));
        explorer.push(item(0, 2, 2));
        assert_eq!(explorer.pop().unwrap().cycle, 1);
        assert_eq!(explorer.pop().unwrap().depth, 2);
        assert_eq!(explorer.pop().unwrap().vertex.label, 1);
        assert!(explorer.is_empty());
    }

    #[test]
    fn breadth_first_is_the_inverse() {
        let program = branchy_program();
        let config = Configuration::default()
            .with_exploration_heuristic(ExplorationHeuristic::BreadthFirst);
        let mut explorer: Explorer<Item> = Explorer::new(&config, &program);
        explorer.push(item(1, 1, 0));
        explorer.push(item(0, 1, 1));
        explorer.push(item(0, 1, 2));
        assert_eq!(explorer.pop().unwrap().vertex.label, 1);
        assert_eq!(explorer.pop().unwrap().vertex.label, 2);
        assert_eq!(explorer.pop().unwrap().cycle, 1);
    }

    #[test]
    fn coverage_grows_monotonically() {
        let program = branchy_program();
        let config = Configuration::default();
        let mut explorer: Explorer<Item> = Explorer::new(&config, &program);
        assert_eq!(explorer.statement_coverage(), 0.0);

        let (new_statement, new_branch) =
            explorer.update_coverage(&Vertex::new("P", 0), &Vertex::new("P", 1));
        assert!(new_statement);
        assert!(new_branch);

        let (new_statement, new_branch) =
            explorer.update_coverage(&Vertex::new("P", 0), &Vertex::new("P", 1));
        assert!(!new_statement);
        assert!(!new_branch);
        assert_eq!(explorer.branch_coverage(), 0.5);

        explorer.update_coverage(&Vertex::new("P", 0), &Vertex::new("P", 2));
        assert_eq!(explorer.branch_coverage(), 1.0);
        assert!(explorer.statement_coverage() < 1.0);
    }

    #[test]
    fn hinted_branch_sides_leave_the_universe() {
        let program = branchy_program();
        let mut hints = Map::new();
        hints.insert(("P".to_string(), 0), (true, false));
        let config = Configuration::default().with_unreachable_branches(hints);
        let mut explorer: Explorer<Item> = Explorer::new(&config, &program);
        explorer.update_coverage(&Vertex::new("P", 0), &Vertex::new("P", 1));
        // The else side does not count, so the then side alone is full
        // branch coverage.
        assert_eq!(explorer.branch_coverage(), 1.0);
    }
}
