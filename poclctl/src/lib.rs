use std::path::{Path, PathBuf};

use clap::{Args, Parser, Subcommand, ValueEnum};
use pocl_core::plan::{Heuristic, SearchLimit, StepSummary, GOAL_ID, INIT_ID};
use pocl_core::{
    load_planner_settings, load_problem, read_landmarks_file, Bindings, FlawStrategy,
    HeuristicKind, LandmarkSummary, PlanSummary, Planner, PlannerSettings, Problem,
    SearchOutcome, SearchStats, UnsolvableReason,
};
use serde::Serialize;
use thiserror::Error;
use tracing::{debug, info};

pub const DEFAULT_SETTINGS: &str = "configs/planner.toml";

pub type Result<T> = std::result::Result<T, AppError>;

#[derive(Debug, Error)]
pub enum AppError {
    #[error("config error: {0}")]
    Config(#[from] pocl_core::ConfigError),
    #[error("planner error: {0}")]
    Plan(#[from] pocl_core::PlanError),
    #[error("landmark error: {0}")]
    Landmarks(#[from] pocl_core::LandmarkError),
    #[error("serialization error: {0}")]
    Serialize(#[from] serde_json::Error),
    #[error("no plan found: {0}")]
    NoPlan(String),
}

#[derive(Parser, Debug)]
#[command(author, version, about = "Partial-order causal-link planner", long_about = None)]
pub struct Cli {
    /// Planner settings file (defaults to configs/planner.toml when present)
    #[arg(long)]
    pub settings: Option<PathBuf>,
    /// Output format
    #[arg(long, value_enum, default_value_t = OutputFormat::Text)]
    pub format: OutputFormat,
    /// Raise log verbosity (-v info, -vv debug, -vvv trace)
    #[arg(short, long, action = clap::ArgAction::Count, global = true)]
    pub verbose: u8,
    #[command(subcommand)]
    pub command: Commands,
}

#[derive(Debug, Clone, Copy, ValueEnum)]
pub enum OutputFormat {
    Text,
    Json,
}

#[derive(Subcommand, Debug)]
pub enum Commands {
    /// Searches for a plan
    Solve(SolveArgs),
    /// Loads a problem and reports what the planner sees in it
    Check(CheckArgs),
    /// Reads a landmark graph dump and prints its layers
    Landmarks(LandmarksArgs),
}

#[derive(Args, Debug, Default)]
pub struct SolveArgs {
    /// Problem file
    pub problem: PathBuf,
    /// ucpop, add or max
    #[arg(long)]
    pub heuristic: Option<HeuristicKind>,
    /// lifo, hardest or landmark-layer
    #[arg(long)]
    pub flaw_strategy: Option<FlawStrategy>,
    /// Maximum number of expanded plans
    #[arg(long)]
    pub limit: Option<usize>,
    /// Search time limit in milliseconds
    #[arg(long)]
    pub time_limit: Option<u64>,
    /// Landmark graph dump, overrides the settings file
    #[arg(long)]
    pub landmarks: Option<PathBuf>,
    #[arg(long, default_value_t = false)]
    pub early_linking: bool,
    #[arg(long, default_value_t = false)]
    pub no_duplicate_pruning: bool,
}

#[derive(Args, Debug)]
pub struct CheckArgs {
    /// Problem file
    pub problem: PathBuf,
}

#[derive(Args, Debug)]
pub struct LandmarksArgs {
    /// Problem file the landmarks refer to
    pub problem: PathBuf,
    /// Landmark graph dump
    pub file: PathBuf,
}

pub fn run(cli: Cli) -> Result<()> {
    let context = AppContext::new(&cli)?;

    match &cli.command {
        Commands::Solve(args) => {
            let report = context.solve(args)?;
            render(&report, cli.format)?;
            if let Some(failure) = report.failure() {
                return Err(AppError::NoPlan(failure));
            }
        }
        Commands::Check(args) => {
            let report = context.check(args)?;
            render(&report, cli.format)?;
        }
        Commands::Landmarks(args) => {
            let report = context.landmarks(args)?;
            render(&report, cli.format)?;
        }
    }

    Ok(())
}

fn render<T>(value: &T, format: OutputFormat) -> Result<()>
where
    T: Serialize + DisplayFallback,
{
    match format {
        OutputFormat::Text => {
            println!("{}", value.display());
            Ok(())
        }
        OutputFormat::Json => {
            let json = serde_json::to_string_pretty(value)?;
            println!("{}", json);
            Ok(())
        }
    }
}

trait DisplayFallback {
    fn display(&self) -> String;
}

#[derive(Debug)]
struct AppContext {
    settings: PlannerSettings,
    verbose: u8,
}

impl AppContext {
    fn new(cli: &Cli) -> Result<Self> {
        let settings = match &cli.settings {
            Some(path) => load_planner_settings(path)?,
            None if Path::new(DEFAULT_SETTINGS).exists() => load_planner_settings(DEFAULT_SETTINGS)?,
            None => {
                debug!(target: "poclctl", "no settings file, using defaults");
                PlannerSettings::default()
            }
        };
        Ok(Self {
            settings,
            verbose: cli.verbose,
        })
    }

    fn solve(&self, args: &SolveArgs) -> Result<SolveReport> {
        let problem = load_problem(&args.problem)?;

        let mut config = self.settings.planner_config();
        if let Some(heuristic) = args.heuristic {
            config.heuristic = heuristic;
        }
        if let Some(strategy) = args.flaw_strategy {
            config.flags.flaw_strategy = strategy;
        }
        if args.limit.is_some() {
            config.node_limit = args.limit;
        }
        if args.time_limit.is_some() {
            config.time_limit_ms = args.time_limit;
        }
        if args.early_linking {
            config.flags.early_linking = true;
        }
        if args.no_duplicate_pruning {
            config.flags.duplicate_pruning = false;
        }
        config.verbosity = config.verbosity.max(self.verbose);

        let landmarks = args
            .landmarks
            .clone()
            .or_else(|| self.settings.landmarks.path.clone());
        let flaw_strategy = config.flags.flaw_strategy;

        let mut planner = Planner::new(&problem, config);
        if let Some(path) = landmarks {
            info!(target: "poclctl", path = %path.display(), "using landmark graph");
            planner = planner.with_landmarks_file(path)?;
        }
        let heuristic = planner.heuristic().kind();
        let outcome = planner.run()?;

        Ok(SolveReport::new(&problem, heuristic, flaw_strategy, &outcome))
    }

    fn check(&self, args: &CheckArgs) -> Result<CheckReport> {
        let problem = load_problem(&args.problem)?;
        let config = self.settings.planner_config();
        let heuristic = Heuristic::new(HeuristicKind::Add, &problem, config.max_ground_actions);
        let goal_cost = if heuristic.has_cost_graph() {
            heuristic.condition_cost(problem.goal(), &Bindings::empty(), &problem)
        } else {
            None
        };
        Ok(CheckReport::new(&problem, goal_cost, heuristic.has_cost_graph()))
    }

    fn landmarks(&self, args: &LandmarksArgs) -> Result<LandmarkReport> {
        let problem = load_problem(&args.problem)?;
        let graph = read_landmarks_file(&args.file, &problem)?;
        Ok(LandmarkReport {
            problem: problem.name.clone(),
            landmarks: graph.summaries(&problem),
        })
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum SolveStatus {
    Solved,
    Unsolvable,
    LimitReached,
}

#[derive(Debug, Serialize)]
pub struct SolveReport {
    pub domain: String,
    pub problem: String,
    pub heuristic: HeuristicKind,
    pub flaw_strategy: FlawStrategy,
    pub status: SolveStatus,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub reason: Option<UnsolvableReason>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub limit: Option<SearchLimit>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub plan: Option<PlanSummary>,
    pub stats: SearchStats,
}

impl SolveReport {
    fn new(
        problem: &Problem,
        heuristic: HeuristicKind,
        flaw_strategy: FlawStrategy,
        outcome: &SearchOutcome,
    ) -> Self {
        let (status, reason, limit) = match outcome {
            SearchOutcome::Solved { .. } => (SolveStatus::Solved, None, None),
            SearchOutcome::Unsolvable { reason, .. } => (SolveStatus::Unsolvable, Some(*reason), None),
            SearchOutcome::LimitReached { limit, .. } => {
                (SolveStatus::LimitReached, None, Some(*limit))
            }
        };
        Self {
            domain: problem.domain.name.clone(),
            problem: problem.name.clone(),
            heuristic,
            flaw_strategy,
            status,
            reason,
            limit,
            plan: outcome.plan().map(|plan| plan.summary(problem)),
            stats: *outcome.stats(),
        }
    }

    fn failure(&self) -> Option<String> {
        match self.status {
            SolveStatus::Solved => None,
            SolveStatus::Unsolvable => Some(match self.reason {
                Some(UnsolvableReason::InconsistentGoal) => "goal is inconsistent".to_string(),
                _ => "search space exhausted".to_string(),
            }),
            SolveStatus::LimitReached => Some(match self.limit {
                Some(SearchLimit::Nodes(n)) => format!("node limit {n} reached"),
                Some(SearchLimit::TimeMs(ms)) => format!("time limit {ms}ms reached"),
                None => "search limit reached".to_string(),
            }),
        }
    }
}

fn step_label(id: usize) -> String {
    match id {
        INIT_ID => "init".to_string(),
        GOAL_ID => "goal".to_string(),
        other => other.to_string(),
    }
}

impl DisplayFallback for SolveReport {
    fn display(&self) -> String {
        let status = match self.status {
            SolveStatus::Solved => "solved",
            SolveStatus::Unsolvable => "unsolvable",
            SolveStatus::LimitReached => "limit reached",
        };
        let mut lines = vec![format!(
            "{status}: {}/{} (heuristic={}, flaws={})",
            self.domain, self.problem, self.heuristic, self.flaw_strategy
        )];
        if let Some(failure) = self.failure() {
            lines.push(format!("  {failure}"));
        }
        if let Some(plan) = &self.plan {
            lines.push(format!("Steps ({}):", plan.steps.len()));
            for StepSummary { id, action } in &plan.steps {
                lines.push(format!("  {id:>3}: {action}"));
            }
            lines.push("Links:".to_string());
            for link in &plan.links {
                lines.push(format!(
                    "  {} -> {}: {}",
                    step_label(link.from),
                    step_label(link.to),
                    link.condition
                ));
            }
        }
        let stats = &self.stats;
        lines.push(format!(
            "generated={} expanded={} duplicates={} dead_ends={} pruned={} elapsed={}ms",
            stats.generated,
            stats.expanded,
            stats.duplicates,
            stats.dead_ends,
            stats.pruned,
            stats.elapsed_ms
        ));
        lines.join("\n")
    }
}

#[derive(Debug, Serialize)]
pub struct CheckReport {
    pub domain: String,
    pub problem: String,
    pub types: usize,
    pub objects: usize,
    pub predicates: Vec<String>,
    pub static_predicates: Vec<String>,
    pub actions: Vec<String>,
    pub init_atoms: usize,
    pub goal_consistent: bool,
    /// Relaxed additive cost of the goal; absent when unreachable or when
    /// the problem is too large to ground.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub goal_cost: Option<i64>,
    pub grounded: bool,
}

impl CheckReport {
    fn new(problem: &Problem, goal_cost: Option<i64>, grounded: bool) -> Self {
        let predicates = &problem.domain.predicates;
        let mut names = Vec::new();
        let mut statics = Vec::new();
        for index in 0..predicates.len() {
            let id = pocl_core::domain::PredicateId(index);
            let name = predicates.get(id).name.clone();
            if problem.domain.is_static(id) {
                statics.push(name.clone());
            }
            names.push(name);
        }
        Self {
            domain: problem.domain.name.clone(),
            problem: problem.name.clone(),
            types: problem.types().len(),
            objects: problem.objects.len(),
            predicates: names,
            static_predicates: statics,
            actions: problem.domain.actions.iter().map(|a| a.name.clone()).collect(),
            init_atoms: problem.init().len(),
            goal_consistent: problem.goal_is_consistent(),
            goal_cost,
            grounded,
        }
    }
}

impl DisplayFallback for CheckReport {
    fn display(&self) -> String {
        let mut lines = vec![
            format!("{}/{}", self.domain, self.problem),
            format!("  types: {}  objects: {}  init atoms: {}", self.types, self.objects, self.init_atoms),
            format!("  predicates: {}", self.predicates.join(", ")),
        ];
        if !self.static_predicates.is_empty() {
            lines.push(format!("  static: {}", self.static_predicates.join(", ")));
        }
        lines.push(format!("  actions: {}", self.actions.join(", ")));
        lines.push(format!("  goal consistent: {}", self.goal_consistent));
        let cost = match (self.grounded, self.goal_cost) {
            (false, _) => "not grounded".to_string(),
            (true, Some(cost)) => cost.to_string(),
            (true, None) => "unreachable".to_string(),
        };
        lines.push(format!("  relaxed goal cost: {cost}"));
        lines.join("\n")
    }
}

#[derive(Debug, Serialize)]
pub struct LandmarkReport {
    pub problem: String,
    pub landmarks: Vec<LandmarkSummary>,
}

impl DisplayFallback for LandmarkReport {
    fn display(&self) -> String {
        if self.landmarks.is_empty() {
            return format!("{}: no landmarks", self.problem);
        }
        let mut lines = vec![format!("{}: {} landmarks", self.problem, self.landmarks.len())];
        for landmark in &self.landmarks {
            let layer = landmark
                .layer
                .map(|v| v.to_string())
                .unwrap_or_else(|| "-".to_string());
            let mut flags = Vec::new();
            if landmark.initial_state {
                flags.push("init");
            }
            if landmark.goal_state {
                flags.push("goal");
            }
            let flags = if flags.is_empty() {
                String::new()
            } else {
                format!(" [{}]", flags.join(","))
            };
            lines.push(format!(
                "LM {} layer={} {}{}",
                landmark.id, layer, landmark.formula, flags
            ));
        }
        lines.join("\n")
    }
}
