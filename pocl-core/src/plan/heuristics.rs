//! Plan ranking. The `add` and `max` heuristics read relaxed literal costs
//! from a [`CostGraph`] built once per problem over the ground actions.

use std::collections::HashMap;
use std::fmt;
use std::str::FromStr;

use serde::{Deserialize, Serialize};
use tracing::{debug, warn};

use crate::bindings::Bindings;
use crate::domain::{Atom, Formula, Literal, ObjectId, PredicateId, Problem, Term};

use super::models::Plan;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Default, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum HeuristicKind {
    /// Steps plus open conditions plus unsafes.
    Ucpop,
    /// Steps plus the sum of relaxed open-condition costs.
    #[default]
    Add,
    /// Steps plus the largest relaxed open-condition cost.
    Max,
}

impl HeuristicKind {
    pub fn as_str(&self) -> &'static str {
        match self {
            HeuristicKind::Ucpop => "ucpop",
            HeuristicKind::Add => "add",
            HeuristicKind::Max => "max",
        }
    }
}

impl fmt::Display for HeuristicKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for HeuristicKind {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.to_ascii_lowercase().as_str() {
            "ucpop" => Ok(HeuristicKind::Ucpop),
            "add" => Ok(HeuristicKind::Add),
            "max" => Ok(HeuristicKind::Max),
            other => Err(format!("unknown heuristic: {other}")),
        }
    }
}

/// Lexicographic plan rank; lower is better.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Default, Serialize)]
pub struct Rank {
    pub primary: i64,
    pub secondary: i64,
    pub tertiary: i64,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum NodeKind {
    Literal,
    Action,
}

#[derive(Debug, Clone)]
struct CostNode {
    kind: NodeKind,
    /// Preconditions of an action, achieving actions of a literal.
    inputs: Vec<usize>,
    add_cost: Option<i64>,
    max_cost: Option<i64>,
}

/// Relaxed planning graph: literal nodes and action nodes, where an action
/// needs all of its precondition literals and a literal needs any one of its
/// achieving actions. Delete effects only show up as negative literals.
#[derive(Debug, Clone, Default)]
pub struct CostGraph {
    nodes: Vec<CostNode>,
    literals: HashMap<Literal, usize>,
    by_predicate: HashMap<(PredicateId, bool), Vec<(usize, Literal)>>,
}

impl CostGraph {
    pub fn new() -> Self {
        Self::default()
    }

    /// Node for a ground literal; `initial` literals cost nothing.
    pub fn make_literal_node(&mut self, literal: &Literal, initial: bool) -> usize {
        if let Some(&index) = self.literals.get(literal) {
            if initial {
                self.nodes[index].add_cost = Some(0);
                self.nodes[index].max_cost = Some(0);
            }
            return index;
        }
        let index = self.nodes.len();
        let cost = initial.then_some(0);
        self.nodes.push(CostNode {
            kind: NodeKind::Literal,
            inputs: Vec::new(),
            add_cost: cost,
            max_cost: cost,
        });
        self.literals.insert(literal.clone(), index);
        self.by_predicate
            .entry((literal.atom.predicate, literal.positive))
            .or_default()
            .push((index, literal.clone()));
        index
    }

    pub fn make_action_node(&mut self, preconditions: Vec<usize>, effects: &[usize]) -> usize {
        let index = self.nodes.len();
        self.nodes.push(CostNode {
            kind: NodeKind::Action,
            inputs: preconditions,
            add_cost: None,
            max_cost: None,
        });
        for &effect in effects {
            self.nodes[effect].inputs.push(index);
        }
        index
    }

    /// Computes additive and max costs to a fixpoint. Costs only decrease, so
    /// the loop terminates.
    pub fn propagate(&mut self) {
        let mut changed = true;
        let mut rounds = 0usize;
        while changed {
            changed = false;
            rounds += 1;
            for index in 0..self.nodes.len() {
                let (add, max) = match self.nodes[index].kind {
                    NodeKind::Action => self.action_cost(index),
                    NodeKind::Literal => self.literal_cost(index),
                };
                let node = &mut self.nodes[index];
                if improves(add, node.add_cost) {
                    node.add_cost = add;
                    changed = true;
                }
                if improves(max, node.max_cost) {
                    node.max_cost = max;
                    changed = true;
                }
            }
        }
        debug!(target: "planner.heuristic", nodes = self.nodes.len(), rounds, "cost graph propagated");
    }

    fn action_cost(&self, index: usize) -> (Option<i64>, Option<i64>) {
        let mut add = 1i64;
        let mut max = 0i64;
        for &input in &self.nodes[index].inputs {
            let node = &self.nodes[input];
            match (node.add_cost, node.max_cost) {
                (Some(a), Some(m)) => {
                    add = add.saturating_add(a);
                    max = max.max(m);
                }
                _ => return (None, None),
            }
        }
        (Some(add), Some(max + 1))
    }

    fn literal_cost(&self, index: usize) -> (Option<i64>, Option<i64>) {
        let node = &self.nodes[index];
        let best = |cost: fn(&CostNode) -> Option<i64>| {
            node.inputs
                .iter()
                .filter_map(|&a| cost(&self.nodes[a]))
                .min()
        };
        (best(|n| n.add_cost), best(|n| n.max_cost))
    }

    /// Cheapest ground literal matching a possibly lifted one. Variables
    /// match any object of their type.
    fn lookup(&self, literal: &Literal, problem: &Problem, additive: bool) -> Option<i64> {
        let cost = |index: usize| {
            let node = &self.nodes[index];
            if additive {
                node.add_cost
            } else {
                node.max_cost
            }
        };
        if literal.atom.is_ground() {
            return self.literals.get(literal).and_then(|&index| cost(index));
        }
        self.by_predicate
            .get(&(literal.atom.predicate, literal.positive))?
            .iter()
            .filter(|(_, ground)| matches_lifted(&literal.atom, &ground.atom, problem))
            .filter_map(|(index, _)| cost(*index))
            .min()
    }

    pub fn len(&self) -> usize {
        self.nodes.len()
    }

    pub fn is_empty(&self) -> bool {
        self.nodes.is_empty()
    }
}

fn improves(candidate: Option<i64>, current: Option<i64>) -> bool {
    match (candidate, current) {
        (Some(new), Some(old)) => new < old,
        (Some(_), None) => true,
        _ => false,
    }
}

fn matches_lifted(lifted: &Atom, ground: &Atom, problem: &Problem) -> bool {
    lifted.terms.iter().zip(&ground.terms).all(|(l, g)| match (l, g) {
        (Term::Object(a), Term::Object(b)) => a == b,
        (Term::Variable(var), Term::Object(object)) => problem
            .types()
            .subtype(problem.objects.type_of(*object), var.ty),
        _ => false,
    })
}

/// Ranks plans and estimates open-condition costs.
#[derive(Debug, Clone)]
pub struct Heuristic {
    kind: HeuristicKind,
    graph: Option<CostGraph>,
}

impl Heuristic {
    /// Builds the cost graph unless grounding the problem would produce more
    /// than `max_ground_actions` actions, in which case `add` and `max` fall
    /// back to `ucpop`.
    pub fn new(kind: HeuristicKind, problem: &Problem, max_ground_actions: usize) -> Self {
        let graph = build_cost_graph(problem, max_ground_actions);
        let kind = match (&graph, kind) {
            (None, HeuristicKind::Add | HeuristicKind::Max) => {
                warn!(
                    target: "planner.heuristic",
                    requested = %kind,
                    max_ground_actions,
                    "too many ground actions, falling back to ucpop"
                );
                HeuristicKind::Ucpop
            }
            _ => kind,
        };
        Self { kind, graph }
    }

    /// Heuristic actually in use.
    pub fn kind(&self) -> HeuristicKind {
        self.kind
    }

    pub fn has_cost_graph(&self) -> bool {
        self.graph.is_some()
    }

    /// Relaxed cost of an open condition under `bindings`; `None` when it is
    /// unreachable. Always zero under `ucpop`.
    pub fn condition_cost(
        &self,
        condition: &Formula,
        bindings: &Bindings,
        problem: &Problem,
    ) -> Option<i64> {
        match self.kind {
            HeuristicKind::Ucpop => Some(0),
            HeuristicKind::Add => self.formula_cost(condition, bindings, problem, true),
            HeuristicKind::Max => self.formula_cost(condition, bindings, problem, false),
        }
    }

    /// Additive cost estimate regardless of the ranking heuristic, for
    /// tracing flaw selection.
    pub fn add_work(&self, condition: &Formula, bindings: &Bindings, problem: &Problem) -> Option<i64> {
        self.graph.as_ref()?;
        self.formula_cost(condition, bindings, problem, true)
    }

    fn formula_cost(
        &self,
        condition: &Formula,
        bindings: &Bindings,
        problem: &Problem,
        additive: bool,
    ) -> Option<i64> {
        let Some(graph) = &self.graph else {
            return Some(0);
        };
        match condition {
            Formula::True => Some(0),
            Formula::False => None,
            Formula::Atom(_) | Formula::Negation(_) => {
                let literal = bindings.resolve_literal(&condition.as_literal()?);
                if !literal.positive {
                    // closed world: a negative literal over atoms absent from
                    // the initial state already holds
                    if !literal.atom.is_ground() || !problem.holds_initially(&literal.atom) {
                        return Some(0);
                    }
                }
                graph.lookup(&literal, problem, additive)
            }
            Formula::Conjunction(parts) => {
                let mut total = 0i64;
                for part in parts {
                    let cost = self.formula_cost(part, bindings, problem, additive)?;
                    total = if additive {
                        total.saturating_add(cost)
                    } else {
                        total.max(cost)
                    };
                }
                Some(total)
            }
            Formula::Disjunction(parts) => parts
                .iter()
                .filter_map(|part| self.formula_cost(part, bindings, problem, additive))
                .min(),
        }
    }

    /// Rank of `plan`, or `None` when one of its open conditions is
    /// unreachable and the plan can be pruned.
    pub fn rank(&self, plan: &Plan, problem: &Problem) -> Option<Rank> {
        let steps = plan.num_action_steps() as i64;
        let open = plan.num_open_conds() as i64;
        let primary = match self.kind {
            HeuristicKind::Ucpop => steps + open + plan.num_unsafes() as i64,
            HeuristicKind::Add => {
                let mut total = 0i64;
                for oc in plan.open_conds() {
                    let cost = self.condition_cost(&oc.condition, plan.bindings(), problem)?;
                    total = total.saturating_add(cost);
                }
                steps.saturating_add(total)
            }
            HeuristicKind::Max => {
                let mut worst = 0i64;
                for oc in plan.open_conds() {
                    let cost = self.condition_cost(&oc.condition, plan.bindings(), problem)?;
                    worst = worst.max(cost);
                }
                steps.saturating_add(worst)
            }
        };
        Some(Rank {
            primary,
            secondary: open,
            tertiary: steps,
        })
    }
}

/// Grounds every action schema over the problem objects and propagates
/// relaxed costs. `None` if there are more than `max_ground_actions` ground
/// actions.
fn build_cost_graph(problem: &Problem, max_ground_actions: usize) -> Option<CostGraph> {
    let types = problem.types();
    let mut domains: Vec<Vec<Vec<ObjectId>>> = Vec::new();
    let mut total = 0usize;
    for schema in &problem.domain.actions {
        let per_parameter: Vec<Vec<ObjectId>> = schema
            .parameters
            .iter()
            .map(|ty| problem.objects.of_type(*ty, types).collect())
            .collect();
        let count = per_parameter
            .iter()
            .try_fold(1usize, |acc, objects| acc.checked_mul(objects.len()))?;
        total = total.checked_add(count)?;
        if total > max_ground_actions {
            return None;
        }
        domains.push(per_parameter);
    }

    let mut graph = CostGraph::new();
    for atom in problem.init() {
        graph.make_literal_node(&Literal::positive(atom.clone()), true);
    }
    let mut ground_actions = 0usize;
    for (schema, per_parameter) in problem.domain.actions.iter().zip(&domains) {
        for assignment in assignments(per_parameter) {
            let substitute = |atom: &Atom| {
                atom.map_terms(|term| match term {
                    Term::Parameter { index, .. } => Term::Object(assignment[*index]),
                    other => *other,
                })
            };
            let precondition = simplify(&schema.precondition.map_atoms(&substitute), problem);
            if precondition == Formula::False {
                continue;
            }
            let mut inputs = Vec::new();
            for conjunct in precondition.conjuncts() {
                // disjunctive preconditions are dropped from the relaxation
                if let Some(literal) = conjunct.as_literal() {
                    let initial = literal.positive == problem.holds_initially(&literal.atom);
                    inputs.push(graph.make_literal_node(&literal, initial));
                }
            }
            let effects: Vec<usize> = schema
                .effects
                .iter()
                .map(|effect| {
                    let literal = Literal {
                        atom: substitute(&effect.literal.atom),
                        positive: effect.literal.positive,
                    };
                    let initial = literal.positive == problem.holds_initially(&literal.atom);
                    graph.make_literal_node(&literal, initial)
                })
                .collect();
            graph.make_action_node(inputs, &effects);
            ground_actions += 1;
        }
    }
    graph.propagate();
    debug!(target: "planner.heuristic", ground_actions, "cost graph built");
    Some(graph)
}

/// Replaces static ground literals by their truth value in the initial state.
fn simplify(formula: &Formula, problem: &Problem) -> Formula {
    let static_value = |atom: &Atom| {
        (atom.is_ground() && problem.domain.is_static(atom.predicate))
            .then(|| problem.holds_initially(atom))
    };
    match formula {
        Formula::Atom(atom) => match static_value(atom) {
            Some(true) => Formula::True,
            Some(false) => Formula::False,
            None => formula.clone(),
        },
        Formula::Negation(atom) => match static_value(atom) {
            Some(true) => Formula::False,
            Some(false) => Formula::True,
            None => formula.clone(),
        },
        Formula::Conjunction(parts) => {
            Formula::and(parts.iter().map(|p| simplify(p, problem)).collect())
        }
        Formula::Disjunction(parts) => {
            Formula::or(parts.iter().map(|p| simplify(p, problem)).collect())
        }
        Formula::True | Formula::False => formula.clone(),
    }
}

/// Cartesian product of the per-parameter object lists.
fn assignments(per_parameter: &[Vec<ObjectId>]) -> Vec<Vec<ObjectId>> {
    let mut out: Vec<Vec<ObjectId>> = vec![Vec::new()];
    for objects in per_parameter {
        out = out
            .into_iter()
            .flat_map(|prefix| {
                objects.iter().map(move |object| {
                    let mut next = prefix.clone();
                    next.push(*object);
                    next
                })
            })
            .collect();
    }
    out
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::domain::parse_problem;

    const CHAIN: &str = r#"
[domain]
name = "chain"
types = ["place"]
predicates = ["(at ?p - place)", "(road ?a ?b - place)"]

[[domain.actions]]
name = "go"
parameters = "?a ?b - place"
precondition = "(and (at ?a) (road ?a ?b))"
effect = "(and (at ?b) (not (at ?a)))"

[problem]
name = "line"
objects = "p1 p2 p3 p4 island - place"
init = ["(at p1)", "(road p1 p2)", "(road p2 p3)", "(road p3 p4)"]
goal = "(and (at p4) (at p3))"
"#;

    fn literal(problem: &Problem, text: &str) -> Literal {
        let object = problem.objects.find(text).unwrap();
        Literal::positive(Atom::new(
            problem.domain.predicates.find("at").unwrap(),
            vec![Term::Object(object)],
        ))
    }

    #[test]
    fn relaxed_costs_follow_roads() {
        let problem = parse_problem(CHAIN).unwrap();
        let heuristic = Heuristic::new(HeuristicKind::Add, &problem, 1_000);
        assert!(heuristic.has_cost_graph());
        let bindings = Bindings::empty();
        let cost = |name: &str| {
            heuristic.condition_cost(&literal(&problem, name).to_formula(), &bindings, &problem)
        };
        assert_eq!(cost("p1"), Some(0));
        assert_eq!(cost("p2"), Some(1));
        assert_eq!(cost("p4"), Some(3));
        assert_eq!(cost("island"), None);
        // deleting (at p1) takes the single move out of p1
        let not_at_p1 = literal(&problem, "p1").negate().to_formula();
        assert_eq!(heuristic.condition_cost(&not_at_p1, &bindings, &problem), Some(1));
    }

    #[test]
    fn plan_ranks_by_kind() {
        let problem = parse_problem(CHAIN).unwrap();
        let plan = Plan::initial(&problem).unwrap();
        let add = Heuristic::new(HeuristicKind::Add, &problem, 1_000).rank(&plan, &problem);
        let max = Heuristic::new(HeuristicKind::Max, &problem, 1_000).rank(&plan, &problem);
        let ucpop = Heuristic::new(HeuristicKind::Ucpop, &problem, 1_000).rank(&plan, &problem);
        assert_eq!(add.map(|r| r.primary), Some(5));
        assert_eq!(max.map(|r| r.primary), Some(3));
        assert_eq!(ucpop.map(|r| r.primary), Some(2));
        assert_eq!(add.map(|r| (r.secondary, r.tertiary)), Some((2, 0)));
    }

    #[test]
    fn grounding_limit_falls_back_to_ucpop() {
        let problem = parse_problem(CHAIN).unwrap();
        let heuristic = Heuristic::new(HeuristicKind::Max, &problem, 3);
        assert_eq!(heuristic.kind(), HeuristicKind::Ucpop);
        assert!(!heuristic.has_cost_graph());
    }

    #[test]
    fn parses_kind_names() {
        assert_eq!("ADD".parse::<HeuristicKind>(), Ok(HeuristicKind::Add));
        assert!("ff".parse::<HeuristicKind>().is_err());
        assert_eq!(HeuristicKind::Ucpop.to_string(), "ucpop");
    }
}
