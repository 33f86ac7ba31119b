use std::collections::HashSet;
use std::path::{Path, PathBuf};
use std::sync::Arc;

use pocl_core::domain::Atom;
use pocl_core::plan::{SearchLimit, Step, GOAL_ID, INIT_ID};
use pocl_core::{
    load_problem, parse_problem, plan_for, FlawStrategy, HeuristicKind, Plan, Planner,
    PlannerConfig, Problem, SearchFlags, SearchOutcome, UnsolvableReason,
};

fn fixture_path(name: &str) -> PathBuf {
    Path::new(env!("CARGO_MANIFEST_DIR")).join("../problems").join(name)
}

fn fixture(name: &str) -> Problem {
    load_problem(fixture_path(name)).expect("fixture problem should load")
}

fn action_name(problem: &Problem, step: &Step) -> Option<String> {
    let action = step.action.as_ref()?;
    Some(problem.domain.actions[action.schema].name.clone())
}

/// Action steps in an order consistent with the plan orderings.
fn linearize(plan: &Plan) -> Vec<Arc<Step>> {
    let mut steps: Vec<(usize, Arc<Step>)> = plan
        .steps()
        .iter()
        .filter(|step| step.is_action())
        .map(|step| {
            let predecessors = plan
                .steps()
                .iter()
                .filter(|other| other.is_action() && plan.orderings().before(other.id, step.id))
                .count();
            (predecessors, Arc::clone(step))
        })
        .collect();
    steps.sort_by_key(|(predecessors, step)| (*predecessors, step.id));
    steps.into_iter().map(|(_, step)| step).collect()
}

/// Executes the plan from the initial state and checks every precondition
/// and the goal.
fn assert_executes(plan: &Plan, problem: &Problem) {
    let mut state: HashSet<Atom> = problem.init().iter().cloned().collect();
    let holds = |state: &HashSet<Atom>, literal: &pocl_core::domain::Literal| {
        let literal = plan.bindings().resolve_literal(literal);
        assert!(literal.atom.is_ground(), "unbound literal {literal:?}");
        state.contains(&literal.atom) == literal.positive
    };
    for step in linearize(plan) {
        for literal in step.precondition.literals() {
            assert!(
                holds(&state, &literal),
                "precondition {} of step {} fails",
                problem.format_literal(&plan.bindings().resolve_literal(&literal)),
                step.id
            );
        }
        let effects: Vec<_> = step
            .effects
            .iter()
            .map(|effect| plan.bindings().resolve_literal(&effect.literal))
            .collect();
        for effect in effects.iter().filter(|e| !e.positive) {
            state.remove(&effect.atom);
        }
        for effect in effects.iter().filter(|e| e.positive) {
            state.insert(effect.atom.clone());
        }
    }
    for literal in problem.goal().literals() {
        assert!(holds(&state, &literal), "goal {} fails", problem.format_literal(&literal));
    }
}

#[test]
fn single_move_reaches_goal() {
    let problem = fixture("shuttle.toml");
    let outcome = plan_for(&problem, HeuristicKind::Add, SearchFlags::default(), Some(1_000), 0);
    let plan = outcome.plan().expect("shuttle is solvable");

    assert_eq!(plan.num_action_steps(), 1);
    let summary = plan.summary(&problem);
    assert_eq!(summary.steps[0].action, "(move a b)");
    let step = summary.steps[0].id;
    assert!(plan
        .links()
        .iter()
        .any(|link| link.from_id == step && link.to_id == GOAL_ID));
    assert!(plan
        .links()
        .iter()
        .any(|link| link.from_id == INIT_ID && link.to_id == step));
    assert_executes(plan, &problem);
}

#[test]
fn threatened_link_is_resolved_by_ordering() {
    let problem = fixture("threats.toml");
    for heuristic in [HeuristicKind::Ucpop, HeuristicKind::Add, HeuristicKind::Max] {
        let outcome = plan_for(&problem, heuristic, SearchFlags::default(), Some(1_000), 0);
        let plan = outcome.plan().expect("threats is solvable");
        assert_eq!(plan.num_unsafes(), 0);

        let id_of = |name: &str| {
            plan.steps()
                .iter()
                .find(|step| action_name(&problem, step).as_deref() == Some(name))
                .map(|step| step.id)
                .expect("step in plan")
        };
        assert!(plan.orderings().before(id_of("a2"), id_of("a1")), "{heuristic}");
        assert_executes(plan, &problem);
    }
}

#[test]
fn contradictory_static_goal_is_unsolvable() {
    let problem = parse_problem(
        r#"
[domain]
name = "roads"
predicates = ["(road ?a ?b)", "(at ?a)"]

[[domain.actions]]
name = "go"
parameters = "?a ?b"
precondition = "(and (at ?a) (road ?a ?b))"
effect = "(and (at ?b) (not (at ?a)))"

[problem]
name = "no-road"
objects = "x y"
init = ["(at x)", "(road x y)"]
goal = "(and (at y) (road y x))"
"#,
    )
    .unwrap();
    let outcome = plan_for(&problem, HeuristicKind::Add, SearchFlags::default(), None, 0);
    assert!(matches!(
        outcome,
        SearchOutcome::Unsolvable {
            reason: UnsolvableReason::InconsistentGoal,
            ..
        }
    ));
    assert_eq!(outcome.stats().expanded, 0);
}

#[test]
fn unreachable_precondition_exhausts_frontier() {
    let problem = parse_problem(
        r#"
[domain]
name = "roads"
predicates = ["(road ?a ?b)", "(at ?a)"]

[[domain.actions]]
name = "go"
parameters = "?a ?b"
precondition = "(and (at ?a) (road ?a ?b))"
effect = "(and (at ?b) (not (at ?a)))"

[problem]
name = "island"
objects = "x y z"
init = ["(at x)", "(road x y)"]
goal = "(at z)"
"#,
    )
    .unwrap();
    let outcome = plan_for(&problem, HeuristicKind::Ucpop, SearchFlags::default(), Some(1_000), 0);
    assert!(matches!(
        outcome,
        SearchOutcome::Unsolvable {
            reason: UnsolvableReason::FrontierExhausted,
            ..
        }
    ));
    assert!(outcome.is_proven_unsolvable());
}

#[test]
fn negative_precondition_avoids_initial_atom_through_either_argument() {
    let problem = parse_problem(
        r#"
[domain]
name = "gate"
predicates = ["(blocked ?a ?b)", "(done)"]

[[domain.actions]]
name = "pass"
parameters = "?a ?b"
precondition = "(not (blocked ?a ?b))"
effect = "(done)"

[problem]
name = "one-blocked-pair"
objects = "a b"
init = ["(blocked a b)"]
goal = "(done)"
"#,
    )
    .unwrap();
    for heuristic in [HeuristicKind::Ucpop, HeuristicKind::Add] {
        let outcome = plan_for(&problem, heuristic, SearchFlags::default(), Some(1_000), 0);
        let plan = outcome
            .plan()
            .unwrap_or_else(|| panic!("{heuristic}: {outcome:?}"));
        assert_eq!(plan.num_action_steps(), 1);
        assert!(plan.links().iter().any(|link| link.from_id == INIT_ID && !link.condition.positive));
        assert_eq!(plan.bindings().distinct_pairs().len(), 1, "{heuristic}");
    }
}

#[test]
fn zero_node_limit_stops_before_expanding() {
    let problem = fixture("shuttle.toml");
    let outcome = plan_for(&problem, HeuristicKind::Add, SearchFlags::default(), Some(0), 0);
    match outcome {
        SearchOutcome::LimitReached { limit, stats } => {
            assert_eq!(limit, SearchLimit::Nodes(0));
            assert_eq!(stats.expanded, 0);
        }
        other => panic!("expected node limit, got {other:?}"),
    }
}

#[test]
fn summaries_serialize_for_reports() {
    let problem = fixture("shuttle.toml");
    let outcome = plan_for(&problem, HeuristicKind::Add, SearchFlags::default(), Some(1_000), 0);
    let summary = outcome.plan().expect("solved").summary(&problem);
    let json = serde_json::to_value(&summary).unwrap();
    assert_eq!(json["complete"], true);
    assert_eq!(json["steps"][0]["action"], "(move a b)");
    assert_eq!(json["links"].as_array().map(Vec::len), Some(2));

    let limit = serde_json::to_value(SearchLimit::Nodes(5)).unwrap();
    assert_eq!(limit, serde_json::json!({"kind": "nodes", "value": 5}));
    let reason = serde_json::to_value(UnsolvableReason::FrontierExhausted).unwrap();
    assert_eq!(reason, "frontier_exhausted");
}

#[test]
fn delivery_with_landmarks() {
    let problem = fixture("delivery.toml");
    let config = PlannerConfig {
        flags: SearchFlags {
            flaw_strategy: FlawStrategy::LandmarkLayer,
            ..SearchFlags::default()
        },
        ..PlannerConfig::default()
    };
    let planner = Planner::new(&problem, config)
        .with_landmarks_file(fixture_path("delivery.landmarks"))
        .expect("landmarks load");
    let outcome = planner.run().expect("landmark graph present");
    let plan = outcome.plan().expect("delivery is solvable");

    assert!(plan.num_action_steps() >= 4);
    assert!(plan.summary(&problem).complete);
    assert_executes(plan, &problem);
}

#[test]
fn every_strategy_solves_delivery() {
    let problem = fixture("delivery.toml");
    for strategy in [FlawStrategy::Lifo, FlawStrategy::Hardest] {
        for early_linking in [false, true] {
            let flags = SearchFlags {
                flaw_strategy: strategy,
                early_linking,
                ..SearchFlags::default()
            };
            let outcome = plan_for(&problem, HeuristicKind::Add, flags, Some(10_000), 0);
            let plan = outcome
                .plan()
                .unwrap_or_else(|| panic!("{strategy} early_linking={early_linking}: {outcome:?}"));
            assert_executes(plan, &problem);
        }
    }
}
