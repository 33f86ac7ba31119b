pub mod chain;
pub mod error;
pub mod flaws;
pub mod heuristics;
pub mod models;
pub mod orderings;
pub mod planner;
pub mod refinements;
pub mod steps;

pub use chain::Chain;
pub use error::{PlanError, PlanResult};
pub use flaws::{select_flaw, Flaw, FlawContext, FlawStrategy};
pub use heuristics::{CostGraph, Heuristic, HeuristicKind, Rank};
pub use models::{LinkSummary, Plan, PlanSignature, PlanSummary, StepSummary};
pub use orderings::Orderings;
pub use planner::{
    plan_for, Planner, PlannerConfig, SearchFlags, SearchLimit, SearchOutcome, SearchStats,
    UnsolvableReason,
};
pub use refinements::{
    handle_open_condition, handle_unsafe, refinements, threat_unifier, Establisher,
    RefinementContext,
};
pub use steps::{
    ActionInstance, Link, OpenCondition, Ordering, Reason, Step, Unsafe, GOAL_ID, INIT_ID,
};
