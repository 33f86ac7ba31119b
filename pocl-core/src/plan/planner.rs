use std::cmp::{Ordering as CmpOrdering, Reverse};
use std::collections::{BinaryHeap, HashSet};
use std::path::Path;
use std::sync::Arc;
use std::time::{Duration, Instant};

use serde::{Deserialize, Serialize};
use tracing::{debug, info, warn};

use crate::domain::Problem;
use crate::landmarks::{read_landmarks_file, LandmarkGraph, LandmarkIndex};

use super::flaws::{select_flaw, Flaw, FlawContext, FlawStrategy};
use super::heuristics::{Heuristic, HeuristicKind, Rank};
use super::models::{Plan, PlanSignature};
use super::refinements::{refinements, RefinementContext};
use super::{PlanError, PlanResult};

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct SearchFlags {
    pub flaw_strategy: FlawStrategy,
    pub early_linking: bool,
    pub duplicate_pruning: bool,
}

impl Default for SearchFlags {
    fn default() -> Self {
        Self {
            flaw_strategy: FlawStrategy::Lifo,
            early_linking: false,
            duplicate_pruning: true,
        }
    }
}

#[derive(Debug, Clone)]
pub struct PlannerConfig {
    pub heuristic: HeuristicKind,
    pub flags: SearchFlags,
    /// Maximum number of expanded plans.
    pub node_limit: Option<usize>,
    pub time_limit_ms: Option<u64>,
    /// 0 is quiet, 1 logs search start and end, 2 logs every expansion.
    pub verbosity: u8,
    pub max_ground_actions: usize,
}

impl Default for PlannerConfig {
    fn default() -> Self {
        Self {
            heuristic: HeuristicKind::Add,
            flags: SearchFlags::default(),
            node_limit: Some(10_000),
            time_limit_ms: None,
            verbosity: 0,
            max_ground_actions: 100_000,
        }
    }
}

#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize)]
pub struct SearchStats {
    pub generated: usize,
    pub expanded: usize,
    pub duplicates: usize,
    pub dead_ends: usize,
    /// Plans discarded because an open condition is unreachable.
    pub pruned: usize,
    pub elapsed_ms: u64,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum UnsolvableReason {
    /// The goal contradicts itself or the static part of the initial state.
    InconsistentGoal,
    /// Every plan was refined without reaching a complete one.
    FrontierExhausted,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "snake_case", tag = "kind", content = "value")]
pub enum SearchLimit {
    Nodes(usize),
    TimeMs(u64),
}

#[derive(Debug, Clone)]
pub enum SearchOutcome {
    Solved {
        plan: Arc<Plan>,
        stats: SearchStats,
    },
    Unsolvable {
        reason: UnsolvableReason,
        stats: SearchStats,
    },
    LimitReached {
        limit: SearchLimit,
        stats: SearchStats,
    },
}

impl SearchOutcome {
    pub fn plan(&self) -> Option<&Arc<Plan>> {
        match self {
            SearchOutcome::Solved { plan, .. } => Some(plan),
            _ => None,
        }
    }

    pub fn stats(&self) -> &SearchStats {
        match self {
            SearchOutcome::Solved { stats, .. }
            | SearchOutcome::Unsolvable { stats, .. }
            | SearchOutcome::LimitReached { stats, .. } => stats,
        }
    }

    pub fn is_solved(&self) -> bool {
        matches!(self, SearchOutcome::Solved { .. })
    }

    pub fn is_proven_unsolvable(&self) -> bool {
        matches!(self, SearchOutcome::Unsolvable { .. })
    }

    pub fn is_limit_reached(&self) -> bool {
        matches!(self, SearchOutcome::LimitReached { .. })
    }
}

struct FrontierEntry {
    rank: Rank,
    serial: u64,
    plan: Arc<Plan>,
}

impl PartialEq for FrontierEntry {
    fn eq(&self, other: &Self) -> bool {
        self.cmp(other) == CmpOrdering::Equal
    }
}

impl Eq for FrontierEntry {}

impl PartialOrd for FrontierEntry {
    fn partial_cmp(&self, other: &Self) -> Option<CmpOrdering> {
        Some(self.cmp(other))
    }
}

impl Ord for FrontierEntry {
    fn cmp(&self, other: &Self) -> CmpOrdering {
        (self.rank, self.serial).cmp(&(other.rank, other.serial))
    }
}

/// Best-first search over partial plans.
pub struct Planner<'a> {
    problem: &'a Problem,
    config: PlannerConfig,
    heuristic: Heuristic,
    landmarks: Option<LandmarkIndex>,
}

impl<'a> Planner<'a> {
    pub fn new(problem: &'a Problem, config: PlannerConfig) -> Self {
        let heuristic = Heuristic::new(config.heuristic, problem, config.max_ground_actions);
        Self {
            problem,
            config,
            heuristic,
            landmarks: None,
        }
    }

    pub fn with_landmarks(mut self, graph: &LandmarkGraph) -> Self {
        self.landmarks = Some(LandmarkIndex::new(graph));
        self
    }

    pub fn with_landmarks_file<P: AsRef<Path>>(self, path: P) -> PlanResult<Self> {
        let graph = read_landmarks_file(path, self.problem)?;
        Ok(self.with_landmarks(&graph))
    }

    pub fn config(&self) -> &PlannerConfig {
        &self.config
    }

    pub fn heuristic(&self) -> &Heuristic {
        &self.heuristic
    }

    pub fn run(&self) -> PlanResult<SearchOutcome> {
        if self.config.flags.flaw_strategy == FlawStrategy::LandmarkLayer && self.landmarks.is_none() {
            return Err(PlanError::MissingLandmarks);
        }
        Ok(self.search())
    }

    fn search(&self) -> SearchOutcome {
        let started = Instant::now();
        let deadline = self
            .config
            .time_limit_ms
            .map(|ms| started + Duration::from_millis(ms));
        let mut stats = SearchStats::default();
        let finish = |stats: &mut SearchStats| {
            stats.elapsed_ms = u64::try_from(started.elapsed().as_millis()).unwrap_or(u64::MAX);
            *stats
        };

        if self.config.verbosity >= 1 {
            info!(
                target: "planner",
                problem = %self.problem.name,
                heuristic = %self.heuristic.kind(),
                flaw_strategy = %self.config.flags.flaw_strategy,
                node_limit = ?self.config.node_limit,
                "search started"
            );
        }

        let Some(root) = Plan::initial(self.problem) else {
            let outcome = SearchOutcome::Unsolvable {
                reason: UnsolvableReason::InconsistentGoal,
                stats: finish(&mut stats),
            };
            self.report(&outcome);
            return outcome;
        };

        let flaw_context = FlawContext {
            problem: self.problem,
            heuristic: &self.heuristic,
            landmarks: self.landmarks.as_ref(),
        };
        let refinement_context = RefinementContext {
            problem: self.problem,
            early_linking: self.config.flags.early_linking,
        };

        let mut frontier: BinaryHeap<Reverse<FrontierEntry>> = BinaryHeap::new();
        let mut seen: HashSet<PlanSignature> = HashSet::new();
        let mut serial = 0u64;
        if self.config.flags.duplicate_pruning {
            seen.insert(root.signature());
        }
        match self.heuristic.rank(&root, self.problem) {
            Some(rank) => frontier.push(Reverse(FrontierEntry {
                rank,
                serial,
                plan: Arc::new(root.with_rank(rank)),
            })),
            None => stats.pruned += 1,
        }

        let outcome = loop {
            if frontier.is_empty() {
                break SearchOutcome::Unsolvable {
                    reason: UnsolvableReason::FrontierExhausted,
                    stats: finish(&mut stats),
                };
            }
            if let Some(limit) = self.config.node_limit {
                if stats.expanded >= limit {
                    break SearchOutcome::LimitReached {
                        limit: SearchLimit::Nodes(limit),
                        stats: finish(&mut stats),
                    };
                }
            }
            if let (Some(deadline), Some(ms)) = (deadline, self.config.time_limit_ms) {
                if Instant::now() >= deadline {
                    break SearchOutcome::LimitReached {
                        limit: SearchLimit::TimeMs(ms),
                        stats: finish(&mut stats),
                    };
                }
            }
            let Some(Reverse(entry)) = frontier.pop() else {
                continue;
            };
            let plan = entry.plan;
            if plan.is_complete() {
                break SearchOutcome::Solved {
                    plan,
                    stats: finish(&mut stats),
                };
            }

            stats.expanded += 1;
            let Some(flaw) = select_flaw(&plan, self.config.flags.flaw_strategy, &flaw_context) else {
                continue;
            };
            if self.config.verbosity >= 2 {
                debug!(
                    target: "planner",
                    expanded = stats.expanded,
                    depth = plan.depth(),
                    rank = ?plan.rank(),
                    steps = plan.num_action_steps(),
                    open_conds = plan.num_open_conds(),
                    unsafes = plan.num_unsafes(),
                    flaw = flaw_kind(&flaw),
                    "expanding plan"
                );
            }

            let children = refinements(&plan, &flaw, refinement_context);
            if children.is_empty() {
                stats.dead_ends += 1;
            }
            for child in children {
                stats.generated += 1;
                if self.config.flags.duplicate_pruning && !seen.insert(child.signature()) {
                    stats.duplicates += 1;
                    continue;
                }
                let Some(rank) = self.heuristic.rank(&child, self.problem) else {
                    stats.pruned += 1;
                    continue;
                };
                serial += 1;
                frontier.push(Reverse(FrontierEntry {
                    rank,
                    serial,
                    plan: Arc::new(child.with_rank(rank)),
                }));
            }
        };
        self.report(&outcome);
        outcome
    }

    fn report(&self, outcome: &SearchOutcome) {
        if self.config.verbosity == 0 {
            return;
        }
        let stats = outcome.stats();
        match outcome {
            SearchOutcome::Solved { plan, .. } => info!(
                target: "planner",
                steps = plan.num_action_steps(),
                expanded = stats.expanded,
                generated = stats.generated,
                elapsed_ms = stats.elapsed_ms,
                "plan found"
            ),
            SearchOutcome::Unsolvable { reason, .. } => info!(
                target: "planner",
                reason = ?reason,
                expanded = stats.expanded,
                generated = stats.generated,
                "problem is unsolvable"
            ),
            SearchOutcome::LimitReached { limit, .. } => warn!(
                target: "planner",
                limit = ?limit,
                expanded = stats.expanded,
                generated = stats.generated,
                "search limit reached"
            ),
        }
    }
}

fn flaw_kind(flaw: &Flaw) -> &'static str {
    match flaw {
        Flaw::Unsafe(_) => "unsafe",
        Flaw::OpenCondition(_) => "open_condition",
    }
}

/// Runs a search with default settings apart from the given knobs.
///
/// No landmark graph is available here, so `landmark_layer` selection falls
/// back to `hardest`; use [`Planner::with_landmarks`] to rank by layers.
pub fn plan_for(
    problem: &Problem,
    heuristic: HeuristicKind,
    flags: SearchFlags,
    node_limit: Option<usize>,
    verbosity: u8,
) -> SearchOutcome {
    let mut flags = flags;
    if flags.flaw_strategy == FlawStrategy::LandmarkLayer {
        warn!(target: "planner", "no landmark graph given, selecting the hardest open condition");
        flags.flaw_strategy = FlawStrategy::Hardest;
    }
    let config = PlannerConfig {
        heuristic,
        flags,
        node_limit,
        verbosity,
        ..PlannerConfig::default()
    };
    Planner::new(problem, config).search()
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::domain::parse_problem;

    const HOPS: &str = r#"
[domain]
name = "hops"
types = ["place"]
predicates = ["(at ?p - place)", "(link ?a ?b - place)"]

[[domain.actions]]
name = "hop"
parameters = "?a ?b - place"
precondition = "(and (at ?a) (link ?a ?b))"
effect = "(and (at ?b) (not (at ?a)))"

[problem]
name = "three"
objects = "a b c - place"
init = ["(at a)", "(link a b)", "(link b c)"]
goal = "(at c)"
"#;

    #[test]
    fn finds_two_hop_plan() {
        let problem = parse_problem(HOPS).unwrap();
        let outcome = plan_for(&problem, HeuristicKind::Add, SearchFlags::default(), Some(1_000), 0);
        let plan = outcome.plan().expect("plan");
        assert_eq!(plan.num_action_steps(), 2);
        let summary = plan.summary(&problem);
        let actions: Vec<&str> = summary.steps.iter().map(|s| s.action.as_str()).collect();
        assert_eq!(actions, vec!["(hop a b)", "(hop b c)"]);
        assert!(outcome.stats().expanded > 0);
    }

    #[test]
    fn landmark_strategy_requires_graph() {
        let problem = parse_problem(HOPS).unwrap();
        let config = PlannerConfig {
            flags: SearchFlags {
                flaw_strategy: FlawStrategy::LandmarkLayer,
                ..SearchFlags::default()
            },
            ..PlannerConfig::default()
        };
        let planner = Planner::new(&problem, config);
        assert!(matches!(planner.run(), Err(PlanError::MissingLandmarks)));

        let mut graph = LandmarkGraph::parse(
            "Landmark graph:\nLM 0 Atom at(b)\n    ->_gn LM 1\nLM 1 Atom at(c)\n    <-_gn LM 0\nLandmark graph end.\n",
            &problem,
        )
        .unwrap();
        graph.compute_landmark_layers();
        let outcome = planner.with_landmarks(&graph).run().unwrap();
        assert!(outcome.is_solved());
    }

    #[test]
    fn frontier_entries_order_by_rank_then_serial() {
        let problem = parse_problem(HOPS).unwrap();
        let plan = Arc::new(Plan::initial(&problem).unwrap());
        let entry = |primary, serial| {
            Reverse(FrontierEntry {
                rank: Rank {
                    primary,
                    ..Rank::default()
                },
                serial,
                plan: Arc::clone(&plan),
            })
        };
        let mut heap = BinaryHeap::new();
        heap.push(entry(3, 0));
        heap.push(entry(1, 2));
        heap.push(entry(1, 1));
        let order: Vec<(i64, u64)> = std::iter::from_fn(|| heap.pop())
            .map(|Reverse(e)| (e.rank.primary, e.serial))
            .collect();
        assert_eq!(order, vec![(1, 1), (1, 2), (3, 0)]);
    }
}
