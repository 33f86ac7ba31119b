use std::sync::{Arc, Weak};

use serde::Serialize;

use crate::bindings::{Bindings, Canonical};
use crate::domain::{Formula, Literal, Problem, StepId, Term};

use super::chain::Chain;
use super::heuristics::Rank;
use super::orderings::Orderings;
use super::steps::{Link, OpenCondition, Ordering, Reason, Step, Unsafe, GOAL_ID, INIT_ID};

/// A partial plan: a node of the search space.
///
/// Plans are immutable once built. Refinements start from a [`PlanDraft`]
/// of the parent, which shares every chain and the orderings with it.
#[derive(Debug, Clone)]
pub struct Plan {
    steps: Chain<Arc<Step>>,
    links: Chain<Arc<Link>>,
    unsafes: Chain<Arc<Unsafe>>,
    open_conds: Chain<Arc<OpenCondition>>,
    high_step_id: StepId,
    bindings: Bindings,
    orderings: Arc<Orderings>,
    parent: Option<Weak<Plan>>,
    depth: usize,
    rank: Rank,
}

impl Plan {
    /// Root plan with the initial and goal steps and one open condition per
    /// goal conjunct. `None` when the goal contradicts itself or the static
    /// part of the initial state.
    pub fn initial(problem: &Problem) -> Option<Plan> {
        if !problem.goal_is_consistent() {
            return None;
        }
        let mut draft = PlanDraft::default();
        draft.add_step(Step::initial(problem.init()));
        draft.add_step(Step::goal(problem.goal()));
        for condition in split_condition(problem.goal(), GOAL_ID, Reason::Goal)? {
            draft.add_open_condition(condition);
        }
        Some(draft.into_plan())
    }

    pub fn steps(&self) -> &Chain<Arc<Step>> {
        &self.steps
    }

    pub fn links(&self) -> &Chain<Arc<Link>> {
        &self.links
    }

    pub fn unsafes(&self) -> &Chain<Arc<Unsafe>> {
        &self.unsafes
    }

    pub fn open_conds(&self) -> &Chain<Arc<OpenCondition>> {
        &self.open_conds
    }

    pub fn num_steps(&self) -> usize {
        self.steps.len()
    }

    /// Steps other than the initial and goal steps.
    pub fn num_action_steps(&self) -> usize {
        self.steps.len().saturating_sub(2)
    }

    pub fn num_links(&self) -> usize {
        self.links.len()
    }

    pub fn num_unsafes(&self) -> usize {
        self.unsafes.len()
    }

    pub fn num_open_conds(&self) -> usize {
        self.open_conds.len()
    }

    pub fn high_step_id(&self) -> StepId {
        self.high_step_id
    }

    pub fn bindings(&self) -> &Bindings {
        &self.bindings
    }

    pub fn orderings(&self) -> &Orderings {
        &self.orderings
    }

    pub fn depth(&self) -> usize {
        self.depth
    }

    pub fn rank(&self) -> Rank {
        self.rank
    }

    pub fn parent(&self) -> Option<Arc<Plan>> {
        self.parent.as_ref().and_then(Weak::upgrade)
    }

    pub fn step(&self, id: StepId) -> Option<&Arc<Step>> {
        self.steps.iter().find(|step| step.id == id)
    }

    pub fn is_complete(&self) -> bool {
        self.unsafes.is_empty() && self.open_conds.is_empty()
    }

    pub fn with_rank(mut self, rank: Rank) -> Plan {
        self.rank = rank;
        self
    }

    /// Order-independent description used for duplicate detection.
    pub fn signature(&self) -> PlanSignature {
        let canonical = self.bindings.canonical();
        let mut steps: Vec<(StepId, Option<(usize, Vec<Term>)>)> = self
            .steps
            .iter()
            .map(|step| {
                let action = step.action.as_ref().map(|action| {
                    let terms = action.terms.iter().map(|t| canonical.term(t)).collect();
                    (action.schema, terms)
                });
                (step.id, action)
            })
            .collect();
        steps.sort();

        let mut links: Vec<(StepId, StepId, Literal)> = self
            .links
            .iter()
            .map(|link| (link.from_id, link.to_id, canonical_literal(&canonical, &link.condition)))
            .collect();
        links.sort();

        let mut open_conds: Vec<(StepId, Formula)> = self
            .open_conds
            .iter()
            .map(|oc| (oc.step_id, oc.condition.map_atoms(&|atom| canonical.atom(atom))))
            .collect();
        open_conds.sort();

        let mut unsafes: Vec<(StepId, StepId, StepId, Literal)> = self
            .unsafes
            .iter()
            .map(|u| {
                (
                    u.link.from_id,
                    u.link.to_id,
                    u.step_id,
                    canonical_literal(&canonical, &u.effect.literal),
                )
            })
            .collect();
        unsafes.sort();

        PlanSignature {
            steps,
            orderings: self.orderings.closure(),
            links,
            distinct: self.bindings.canonical_distinct(&canonical),
            open_conds,
            unsafes,
        }
    }

    pub fn equivalent(&self, other: &Plan) -> bool {
        self.num_steps() == other.num_steps()
            && self.num_links() == other.num_links()
            && self.num_open_conds() == other.num_open_conds()
            && self.num_unsafes() == other.num_unsafes()
            && self.signature() == other.signature()
    }

    /// Action steps in an order consistent with the plan orderings, with
    /// their causal links.
    pub fn summary(&self, problem: &Problem) -> PlanSummary {
        let mut actions: Vec<(usize, StepId, String)> = self
            .steps
            .iter()
            .filter_map(|step| {
                let action = step.action.as_ref()?;
                let terms: Vec<Term> =
                    action.terms.iter().map(|t| self.bindings.resolve(t)).collect();
                let predecessors = self
                    .steps
                    .iter()
                    .filter(|other| other.is_action() && self.orderings.before(other.id, step.id))
                    .count();
                Some((predecessors, step.id, problem.format_action(action.schema, &terms)))
            })
            .collect();
        actions.sort();

        let mut links: Vec<LinkSummary> = self
            .links
            .iter()
            .map(|link| LinkSummary {
                from: link.from_id,
                to: link.to_id,
                condition: problem
                    .format_literal(&self.bindings.resolve_literal(&link.condition)),
            })
            .collect();
        links.sort_by(|a, b| (a.to, a.from).cmp(&(b.to, b.from)));

        PlanSummary {
            steps: actions
                .into_iter()
                .map(|(_, id, action)| StepSummary { id, action })
                .collect(),
            links,
            depth: self.depth,
            complete: self.is_complete(),
        }
    }
}

fn canonical_literal(canonical: &Canonical, literal: &Literal) -> Literal {
    Literal {
        atom: canonical.atom(&literal.atom),
        positive: literal.positive,
    }
}

/// Splits a condition into open conditions for `step_id`, one per conjunct.
/// `None` when the condition is unsatisfiable.
pub(crate) fn split_condition(
    condition: &Formula,
    step_id: StepId,
    reason: Reason,
) -> Option<Vec<OpenCondition>> {
    let mut out = Vec::new();
    for conjunct in condition.conjuncts() {
        if conjunct == Formula::False {
            return None;
        }
        out.push(OpenCondition {
            condition: conjunct,
            step_id,
            reason,
        });
    }
    Some(out)
}

#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub struct PlanSignature {
    steps: Vec<(StepId, Option<(usize, Vec<Term>)>)>,
    orderings: Vec<(StepId, StepId)>,
    links: Vec<(StepId, StepId, Literal)>,
    distinct: Vec<(Term, Term)>,
    open_conds: Vec<(StepId, Formula)>,
    unsafes: Vec<(StepId, StepId, StepId, Literal)>,
}

#[derive(Debug, Clone, Serialize)]
pub struct PlanSummary {
    pub steps: Vec<StepSummary>,
    pub links: Vec<LinkSummary>,
    pub depth: usize,
    pub complete: bool,
}

#[derive(Debug, Clone, Serialize)]
pub struct StepSummary {
    pub id: StepId,
    pub action: String,
}

#[derive(Debug, Clone, Serialize)]
pub struct LinkSummary {
    pub from: StepId,
    pub to: StepId,
    pub condition: String,
}

/// Mutable builder for a child plan. Chains stay shared with the parent
/// until an element is removed from them.
#[derive(Debug, Clone, Default)]
pub(crate) struct PlanDraft {
    pub steps: Chain<Arc<Step>>,
    pub links: Chain<Arc<Link>>,
    pub unsafes: Chain<Arc<Unsafe>>,
    pub open_conds: Chain<Arc<OpenCondition>>,
    pub high_step_id: StepId,
    pub bindings: Bindings,
    pub orderings: Arc<Orderings>,
    parent: Option<Weak<Plan>>,
    depth: usize,
}

impl PlanDraft {
    pub fn from_parent(parent: &Arc<Plan>) -> Self {
        Self {
            steps: parent.steps.clone(),
            links: parent.links.clone(),
            unsafes: parent.unsafes.clone(),
            open_conds: parent.open_conds.clone(),
            high_step_id: parent.high_step_id,
            bindings: parent.bindings.clone(),
            orderings: Arc::clone(&parent.orderings),
            parent: Some(Arc::downgrade(parent)),
            depth: parent.depth + 1,
        }
    }

    pub fn add_step(&mut self, step: Step) -> Arc<Step> {
        if step.id != GOAL_ID && step.id != INIT_ID {
            self.high_step_id = self.high_step_id.max(step.id);
        }
        let step = Arc::new(step);
        self.steps = self.steps.cons(Arc::clone(&step));
        step
    }

    pub fn add_link(&mut self, link: Link) -> Arc<Link> {
        let link = Arc::new(link);
        self.links = self.links.cons(Arc::clone(&link));
        link
    }

    pub fn add_unsafe(&mut self, threat: Unsafe) {
        self.unsafes = self.unsafes.cons(Arc::new(threat));
    }

    pub fn remove_unsafe(&mut self, threat: &Arc<Unsafe>) {
        self.unsafes = self.unsafes.remove_first(|u| Arc::ptr_eq(u, threat));
    }

    pub fn add_open_condition(&mut self, condition: OpenCondition) {
        self.open_conds = self.open_conds.cons(Arc::new(condition));
    }

    pub fn remove_open_condition(&mut self, condition: &Arc<OpenCondition>) {
        self.open_conds = self.open_conds.remove_first(|oc| Arc::ptr_eq(oc, condition));
    }

    /// Adds `ordering` unless its reverse already holds.
    pub fn add_ordering(&mut self, ordering: Ordering) -> bool {
        if !self
            .orderings
            .possibly_before(ordering.before_id, ordering.after_id)
        {
            return false;
        }
        if !self.orderings.before(ordering.before_id, ordering.after_id) {
            self.orderings = Arc::new(self.orderings.refine(ordering));
        }
        true
    }

    pub fn into_plan(self) -> Plan {
        Plan {
            steps: self.steps,
            links: self.links,
            unsafes: self.unsafes,
            open_conds: self.open_conds,
            high_step_id: self.high_step_id,
            bindings: self.bindings,
            orderings: self.orderings,
            parent: self.parent,
            depth: self.depth,
            rank: Rank::default(),
        }
    }
}
