use std::fmt;
use std::str::FromStr;
use std::sync::Arc;

use serde::{Deserialize, Serialize};
use tracing::{debug, enabled, Level};

use crate::domain::Problem;
use crate::landmarks::LandmarkIndex;

use super::heuristics::Heuristic;
use super::models::Plan;
use super::steps::{OpenCondition, Unsafe};

#[derive(Debug, Clone)]
pub enum Flaw {
    Unsafe(Arc<Unsafe>),
    OpenCondition(Arc<OpenCondition>),
}

/// How open conditions are chosen once no unsafe is left.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Default, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum FlawStrategy {
    /// Most recently added first.
    #[default]
    Lifo,
    /// Highest relaxed cost first.
    Hardest,
    /// Lowest landmark layer first, then highest cost.
    LandmarkLayer,
}

impl FlawStrategy {
    pub fn as_str(&self) -> &'static str {
        match self {
            FlawStrategy::Lifo => "lifo",
            FlawStrategy::Hardest => "hardest",
            FlawStrategy::LandmarkLayer => "landmark_layer",
        }
    }
}

impl fmt::Display for FlawStrategy {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for FlawStrategy {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.to_ascii_lowercase().replace('-', "_").as_str() {
            "lifo" => Ok(FlawStrategy::Lifo),
            "hardest" => Ok(FlawStrategy::Hardest),
            "landmark_layer" | "ll" => Ok(FlawStrategy::LandmarkLayer),
            other => Err(format!("unknown flaw strategy: {other}")),
        }
    }
}

/// Inputs the flaw strategies consult.
pub struct FlawContext<'a> {
    pub problem: &'a Problem,
    pub heuristic: &'a Heuristic,
    pub landmarks: Option<&'a LandmarkIndex>,
}

struct Candidate {
    condition: Arc<OpenCondition>,
    layer: Option<usize>,
    cost: i64,
}

/// Picks the flaw to repair next: the most recent unsafe if any, otherwise an
/// open condition chosen by `strategy`. Ties go to the most recently added
/// flaw.
pub fn select_flaw(plan: &Plan, strategy: FlawStrategy, context: &FlawContext<'_>) -> Option<Flaw> {
    if let Some(threat) = plan.unsafes().head() {
        return Some(Flaw::Unsafe(Arc::clone(threat)));
    }
    if strategy == FlawStrategy::Lifo && !enabled!(target: "planner.flaws", Level::DEBUG) {
        return plan.open_conds().head().cloned().map(Flaw::OpenCondition);
    }

    // most recent first
    let candidates: Vec<Candidate> = plan
        .open_conds()
        .iter()
        .map(|oc| {
            let layer = context.landmarks.and_then(|index| {
                let literal = plan.bindings().resolve_literal(&oc.literal()?);
                index.layer(&literal)
            });
            let cost = context
                .heuristic
                .condition_cost(&oc.condition, plan.bindings(), context.problem)
                .unwrap_or(i64::MAX);
            Candidate {
                condition: Arc::clone(oc),
                layer,
                cost,
            }
        })
        .collect();
    trace_candidates(plan, &candidates, context);

    let chosen = match strategy {
        FlawStrategy::Lifo => candidates.first().map(|c| Arc::clone(&c.condition)),
        FlawStrategy::Hardest => hardest(candidates.iter()),
        FlawStrategy::LandmarkLayer => match candidates.iter().filter_map(|c| c.layer).min() {
            Some(lowest) => hardest(candidates.iter().filter(|c| c.layer == Some(lowest))),
            None => hardest(candidates.iter()),
        },
    };
    chosen.map(Flaw::OpenCondition)
}

/// Highest cost wins; the earliest candidate wins ties.
fn hardest<'a>(pool: impl Iterator<Item = &'a Candidate>) -> Option<Arc<OpenCondition>> {
    let mut best: Option<&Candidate> = None;
    for candidate in pool {
        if best.map_or(true, |b| candidate.cost > b.cost) {
            best = Some(candidate);
        }
    }
    best.map(|c| Arc::clone(&c.condition))
}

fn trace_candidates(plan: &Plan, candidates: &[Candidate], context: &FlawContext<'_>) {
    if !enabled!(target: "planner.flaws", Level::DEBUG) {
        return;
    }
    for candidate in candidates {
        let condition = &candidate.condition;
        let text = match condition.literal() {
            Some(literal) => context
                .problem
                .format_literal(&plan.bindings().resolve_literal(&literal)),
            None => "(or ...)".to_string(),
        };
        let layer = candidate
            .layer
            .map_or_else(|| "X".to_string(), |layer| layer.to_string());
        let work = context
            .heuristic
            .add_work(&condition.condition, plan.bindings(), context.problem)
            .map_or_else(|| "X".to_string(), |work| work.to_string());
        debug!(
            target: "planner.flaws",
            "#<{}> LL: {} {} ADD_WORK: {}",
            condition.step_id,
            layer,
            text,
            work
        );
    }
}
