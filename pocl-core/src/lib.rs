//! Partial-order causal-link planning: a lifted plan-space search that
//! refines partial plans until no open condition or threatened link remains.

pub mod bindings;
pub mod config;
pub mod domain;
pub mod error;
pub mod landmarks;
pub mod plan;

pub use bindings::{Bindings, Unifier};
pub use config::{load_planner_settings, load_problem, PlannerSettings, SearchSection};
pub use domain::{parse_problem, DomainError, DomainResult, Problem};
pub use error::{ConfigError, Result};
pub use landmarks::{
    read_landmarks_file, LandmarkError, LandmarkGraph, LandmarkIndex, LandmarkResult,
    LandmarkSummary,
};
pub use plan::{
    plan_for, FlawStrategy, HeuristicKind, Plan, PlanError, PlanResult, PlanSummary, Planner,
    PlannerConfig, SearchFlags, SearchOutcome, SearchStats, UnsolvableReason,
};
