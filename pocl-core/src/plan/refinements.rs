//! Successor generation: every way of repairing one flaw of a plan.

use std::sync::Arc;

use tracing::trace;

use crate::bindings::{Bindings, Unifier};
use crate::domain::{Effect, Formula, Literal, Problem, StepId, Term};

use super::flaws::Flaw;
use super::models::{split_condition, Plan, PlanDraft};
use super::orderings::Orderings;
use super::steps::{Link, OpenCondition, Ordering, Reason, Step, Unsafe, INIT_ID};

#[derive(Debug, Clone, Copy)]
pub struct RefinementContext<'a> {
    pub problem: &'a Problem,
    /// After a step is added or reused, link every other open condition one
    /// of its effects already establishes.
    pub early_linking: bool,
}

/// One way to establish a literal open condition.
#[derive(Debug, Clone)]
pub enum Establisher {
    /// Link from an effect of a step already in the plan.
    Reuse {
        step: Arc<Step>,
        effect: usize,
        unifier: Unifier,
    },
    /// Negative literal that holds initially because no matching atom is in
    /// the initial state, given the inequalities.
    ClosedWorld { inequalities: Vec<(Term, Term)> },
    /// Link from a new instance of an action schema.
    NewStep {
        step: Step,
        effect: usize,
        unifier: Unifier,
    },
}

/// All plans obtained by repairing `flaw` in `plan`. Infeasible repairs are
/// left out; an empty result means the plan is a dead end.
pub fn refinements(plan: &Arc<Plan>, flaw: &Flaw, context: RefinementContext<'_>) -> Vec<Plan> {
    match flaw {
        Flaw::Unsafe(threat) => handle_unsafe(plan, threat, context),
        Flaw::OpenCondition(condition) => handle_open_condition(plan, condition, context),
    }
}

/// Unifier under which `effect` of step `step_id` clobbers `link`, if the
/// step can fall between the link's endpoints.
pub fn threat_unifier(
    orderings: &Orderings,
    bindings: &Bindings,
    link: &Link,
    step_id: StepId,
    effect: &Effect,
    problem: &Problem,
) -> Option<Unifier> {
    if step_id == link.from_id || step_id == link.to_id {
        return None;
    }
    if effect.literal.positive == link.condition.positive {
        return None;
    }
    if !orderings.possibly_after(step_id, link.from_id)
        || !orderings.possibly_before(step_id, link.to_id)
    {
        return None;
    }
    bindings.unify(&effect.literal.atom, &link.condition.atom, problem)
}

pub fn handle_unsafe(
    plan: &Arc<Plan>,
    threat: &Arc<Unsafe>,
    context: RefinementContext<'_>,
) -> Vec<Plan> {
    let mut base = PlanDraft::from_parent(plan);
    base.remove_unsafe(threat);

    let Some(unifier) = threat_unifier(
        plan.orderings(),
        plan.bindings(),
        &threat.link,
        threat.step_id,
        &threat.effect,
        context.problem,
    ) else {
        return vec![base.into_plan()];
    };

    let mut out = Vec::new();
    out.extend(separate(&base, &unifier, context.problem));
    out.extend(demote(&base, threat));
    out.extend(promote(&base, threat));
    trace!(
        target: "planner.refinements",
        step = threat.step_id,
        from = threat.link.from_id,
        to = threat.link.to_id,
        successors = out.len(),
        "unsafe handled"
    );
    out
}

/// One successor per unifier pair, each forcing the pair apart.
pub(crate) fn separate(base: &PlanDraft, unifier: &Unifier, problem: &Problem) -> Vec<Plan> {
    unifier
        .iter()
        .filter_map(|pair| {
            let bindings = base.bindings.add(&[], &[*pair], problem)?;
            let mut draft = base.clone();
            draft.bindings = bindings;
            Some(draft.into_plan())
        })
        .collect()
}

/// Orders the threatening step before the producer of the link.
pub(crate) fn demote(base: &PlanDraft, threat: &Unsafe) -> Option<Plan> {
    new_ordering(base, threat.step_id, threat.link.from_id, Reason::Demote)
}

/// Orders the threatening step after the consumer of the link.
pub(crate) fn promote(base: &PlanDraft, threat: &Unsafe) -> Option<Plan> {
    new_ordering(base, threat.link.to_id, threat.step_id, Reason::Promote)
}

fn new_ordering(base: &PlanDraft, before: StepId, after: StepId, reason: Reason) -> Option<Plan> {
    if !base.orderings.possibly_before(before, after) {
        return None;
    }
    let mut draft = base.clone();
    draft.add_ordering(Ordering::new(before, after, reason));
    Some(draft.into_plan())
}

pub fn handle_open_condition(
    plan: &Arc<Plan>,
    condition: &Arc<OpenCondition>,
    context: RefinementContext<'_>,
) -> Vec<Plan> {
    let mut base = PlanDraft::from_parent(plan);
    base.remove_open_condition(condition);
    match &condition.condition {
        Formula::Disjunction(disjuncts) => handle_disjunction(&base, condition, disjuncts),
        _ => {
            let Some(literal) = condition.literal() else {
                return Vec::new();
            };
            establishers(&base, &literal, condition.step_id, context.problem)
                .into_iter()
                .filter_map(|establisher| {
                    apply_establisher(base.clone(), &literal, condition, establisher, context)
                })
                .map(PlanDraft::into_plan)
                .collect()
        }
    }
}

/// One successor per satisfiable disjunct.
pub(crate) fn handle_disjunction(
    base: &PlanDraft,
    condition: &OpenCondition,
    disjuncts: &[Formula],
) -> Vec<Plan> {
    disjuncts
        .iter()
        .filter_map(|disjunct| {
            let conditions = split_condition(disjunct, condition.step_id, condition.reason)?;
            let mut draft = base.clone();
            for open in conditions {
                draft.add_open_condition(open);
            }
            Some(draft.into_plan())
        })
        .collect()
}

/// Every way to establish `literal` for step `consumer`: reused steps, the
/// closed-world assumption for negative literals, and new steps.
pub(crate) fn establishers(
    draft: &PlanDraft,
    literal: &Literal,
    consumer: StepId,
    problem: &Problem,
) -> Vec<Establisher> {
    let mut out = Vec::new();
    for step in &draft.steps {
        if step.id == consumer || !draft.orderings.possibly_before(step.id, consumer) {
            continue;
        }
        for (index, effect) in step.effects.iter().enumerate() {
            if effect.literal.positive != literal.positive {
                continue;
            }
            if let Some(unifier) = draft.bindings.unify(&effect.literal.atom, &literal.atom, problem) {
                out.push(Establisher::Reuse {
                    step: Arc::clone(step),
                    effect: index,
                    unifier,
                });
            }
        }
    }

    if !literal.positive {
        out.extend(
            closed_world_inequalities(&draft.bindings, literal, problem)
                .into_iter()
                .map(|inequalities| Establisher::ClosedWorld { inequalities }),
        );
    }

    let id = draft.high_step_id + 1;
    for achiever in problem.domain.achievers(literal) {
        let schema = &problem.domain.actions[achiever.action];
        if schema.precondition == Formula::False {
            continue;
        }
        let step = Step::from_schema(id, achiever.action, schema);
        let effect = &step.effects[achiever.effect];
        if let Some(unifier) = draft.bindings.unify(&effect.literal.atom, &literal.atom, problem) {
            out.push(Establisher::NewStep {
                step,
                effect: achiever.effect,
                unifier,
            });
        }
    }
    out
}

/// Alternative inequality sets, each keeping the atom of a negative literal
/// distinct from every initial atom. An initial atom that unifies through
/// several pairs is avoided by breaking any one of them, so the sets are the
/// product of those choices. Empty when some initial atom cannot be avoided.
fn closed_world_inequalities(
    bindings: &Bindings,
    literal: &Literal,
    problem: &Problem,
) -> Vec<Vec<(Term, Term)>> {
    let mut alternatives: Vec<Vec<(Term, Term)>> = vec![Vec::new()];
    for atom in problem.init() {
        if atom.predicate != literal.atom.predicate {
            continue;
        }
        let Some(unifier) = bindings.unify(atom, &literal.atom, problem) else {
            continue;
        };
        if unifier.is_empty() {
            return Vec::new();
        }
        alternatives = alternatives
            .iter()
            .flat_map(|chosen| {
                unifier.iter().map(move |pair| {
                    let mut next = chosen.clone();
                    next.push(*pair);
                    next
                })
            })
            .filter(|chosen| bindings.add(&[], chosen, problem).is_some())
            .collect();
        if alternatives.is_empty() {
            break;
        }
    }
    alternatives
}

/// Adds the link described by `establisher` to `draft`, along with its
/// ordering, bindings and the threats it creates. `condition` must already
/// be removed from the draft.
pub(crate) fn apply_establisher(
    mut draft: PlanDraft,
    literal: &Literal,
    condition: &OpenCondition,
    establisher: Establisher,
    context: RefinementContext<'_>,
) -> Option<PlanDraft> {
    let problem = context.problem;
    let consumer = condition.step_id;
    let (source, added) = match establisher {
        Establisher::Reuse { step, unifier, .. } => {
            draft.bindings = draft.bindings.add(&unifier, &[], problem)?;
            (Some(step), false)
        }
        Establisher::ClosedWorld { inequalities } => {
            draft.bindings = draft.bindings.add(&[], &inequalities, problem)?;
            (None, false)
        }
        Establisher::NewStep { step, unifier, .. } => {
            draft.bindings = draft.bindings.add(&unifier, &[], problem)?;
            let preconditions = split_condition(&step.precondition, step.id, Reason::Precondition)?;
            let step = draft.add_step(step);
            for open in preconditions {
                draft.add_open_condition(open);
            }
            (Some(step), true)
        }
    };
    let from_id = source.as_ref().map_or(INIT_ID, |step| step.id);

    if !draft.add_ordering(Ordering::new(from_id, consumer, Reason::Establish)) {
        return None;
    }
    let link = draft.add_link(Link {
        from_id,
        to_id: consumer,
        condition: literal.clone(),
        reason: Reason::Establish,
    });
    link_threats(&mut draft, &link, problem);
    if let Some(step) = source.filter(|step| step.id != INIT_ID) {
        if added {
            step_threats(&mut draft, &step, problem);
        }
        if context.early_linking {
            link_preconditions(&mut draft, &step, context);
        }
    }
    Some(draft)
}

/// Records every step effect that may clobber `link`.
pub(crate) fn link_threats(draft: &mut PlanDraft, link: &Arc<Link>, problem: &Problem) {
    let mut found = Vec::new();
    for step in &draft.steps {
        for effect in &step.effects {
            if threat_unifier(&draft.orderings, &draft.bindings, link, step.id, effect, problem).is_some() {
                found.push(Unsafe {
                    link: Arc::clone(link),
                    step_id: step.id,
                    effect: effect.clone(),
                    effect_add: effect.literal.atom.clone(),
                });
            }
        }
    }
    for threat in found {
        draft.add_unsafe(threat);
    }
}

/// Records every link that an effect of `step` may clobber.
pub(crate) fn step_threats(draft: &mut PlanDraft, step: &Step, problem: &Problem) {
    let mut found = Vec::new();
    for link in &draft.links {
        for effect in &step.effects {
            if threat_unifier(&draft.orderings, &draft.bindings, link, step.id, effect, problem).is_some() {
                found.push(Unsafe {
                    link: Arc::clone(link),
                    step_id: step.id,
                    effect: effect.clone(),
                    effect_add: effect.literal.atom.clone(),
                });
            }
        }
    }
    for threat in found {
        draft.add_unsafe(threat);
    }
}

/// Links every other literal open condition that an effect of `step`
/// already establishes under the current bindings. Conditions that would
/// need new bindings, or whose link turns out infeasible, stay open.
pub(crate) fn link_preconditions(
    draft: &mut PlanDraft,
    step: &Arc<Step>,
    context: RefinementContext<'_>,
) {
    let pending: Vec<Arc<OpenCondition>> = draft
        .open_conds
        .iter()
        .filter(|oc| oc.step_id != step.id)
        .cloned()
        .collect();
    let plain = RefinementContext {
        early_linking: false,
        ..context
    };
    for condition in pending {
        let Some(literal) = condition.literal() else {
            continue;
        };
        if !draft.orderings.possibly_before(step.id, condition.step_id) {
            continue;
        }
        let linked = step.effects.iter().enumerate().find_map(|(index, effect)| {
            if effect.literal.positive != literal.positive {
                return None;
            }
            let unifier = draft
                .bindings
                .unify(&effect.literal.atom, &literal.atom, context.problem)
                .filter(Vec::is_empty)?;
            let mut next = draft.clone();
            next.remove_open_condition(&condition);
            let establisher = Establisher::Reuse {
                step: Arc::clone(step),
                effect: index,
                unifier,
            };
            apply_establisher(next, &literal, &condition, establisher, plain)
        });
        if let Some(next) = linked {
            *draft = next;
            trace!(
                target: "planner.refinements",
                step = step.id,
                consumer = condition.step_id,
                "early link"
            );
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::domain::parse_problem;
    use crate::plan::steps::GOAL_ID;

    const SWITCH: &str = r#"
[domain]
name = "switch"
predicates = ["(on ?x)", "(seen ?x)"]

[[domain.actions]]
name = "toggle-on"
parameters = "?x"
effect = "(on ?x)"

[[domain.actions]]
name = "look"
parameters = "?x"
precondition = "(on ?x)"
effect = "(seen ?x)"

[problem]
name = "p"
objects = "lamp fan"
init = ["(on fan)"]
goal = "(and (seen lamp) (not (on fan)))"
"#;

    fn context(problem: &Problem) -> RefinementContext<'_> {
        RefinementContext {
            problem,
            early_linking: false,
        }
    }

    fn open_condition(plan: &Plan, positive: bool) -> Arc<OpenCondition> {
        plan.open_conds()
            .iter()
            .find(|oc| oc.literal().map(|l| l.positive) == Some(positive))
            .cloned()
            .unwrap()
    }

    #[test]
    fn positive_condition_gets_new_step_links() {
        let problem = parse_problem(SWITCH).unwrap();
        let root = Arc::new(Plan::initial(&problem).unwrap());
        let seen = open_condition(&root, true);
        let children = handle_open_condition(&root, &seen, context(&problem));
        // only `look` achieves (seen ?x); nothing to reuse
        assert_eq!(children.len(), 1);
        let child = &children[0];
        assert_eq!(child.num_action_steps(), 1);
        let link = child.links().head().unwrap();
        assert_eq!(link.to_id, GOAL_ID);
        assert_eq!(link.condition, seen.literal().unwrap());
        assert_eq!(child.num_open_conds(), 2);
        assert!(child.orderings().before(link.from_id, GOAL_ID));
        assert_eq!(child.high_step_id(), 1);
    }

    #[test]
    fn negative_condition_closed_world_needs_inequality() {
        let problem = parse_problem(SWITCH).unwrap();
        let root = Arc::new(Plan::initial(&problem).unwrap());
        let not_on = open_condition(&root, false);
        // (not (on fan)) with (on fan) initially: neither closed world nor an
        // achiever of a negative literal is available
        assert!(handle_open_condition(&root, &not_on, context(&problem)).is_empty());
    }

    const PAIR: &str = r#"
[domain]
name = "pair"
predicates = ["(g1)", "(g2)"]

[[domain.actions]]
name = "make"
effect = "(and (g1) (g2))"

[problem]
name = "both"
goal = "(and (g1) (g2))"
"#;

    #[test]
    fn early_linking_links_other_conditions_of_new_step() {
        let problem = parse_problem(PAIR).unwrap();
        let root = Arc::new(Plan::initial(&problem).unwrap());
        let first = Arc::clone(root.open_conds().head().unwrap());

        let plain = handle_open_condition(&root, &first, context(&problem));
        assert_eq!(plain.len(), 1);
        assert_eq!(plain[0].num_links(), 1);
        assert_eq!(plain[0].num_open_conds(), 1);

        let early = RefinementContext {
            problem: &problem,
            early_linking: true,
        };
        let linked = handle_open_condition(&root, &first, early);
        assert_eq!(linked.len(), 1);
        let child = &linked[0];
        assert_eq!(child.num_action_steps(), 1);
        assert_eq!(child.num_links(), 2);
        assert_eq!(child.num_open_conds(), 0);
        assert!(child
            .links()
            .iter()
            .all(|link| link.from_id == 1 && link.to_id == GOAL_ID));
    }

    const CHAIN: &str = r#"
[domain]
name = "chain"
predicates = ["(g1)", "(g2)", "(g3)"]

[[domain.actions]]
name = "make"
effect = "(and (g1) (g2))"

[[domain.actions]]
name = "use"
precondition = "(g2)"
effect = "(g3)"

[problem]
name = "all"
goal = "(and (g1) (g2) (g3))"
"#;

    fn condition_on(plan: &Plan, step_id: StepId, predicate: &str, problem: &Problem) -> Arc<OpenCondition> {
        plan.open_conds()
            .iter()
            .find(|oc| {
                oc.step_id == step_id
                    && oc.literal().is_some_and(|literal| {
                        problem.domain.predicates.get(literal.atom.predicate).name == predicate
                    })
            })
            .cloned()
            .unwrap()
    }

    #[test]
    fn early_linking_applies_to_reused_steps() {
        let problem = parse_problem(CHAIN).unwrap();
        let root = Arc::new(Plan::initial(&problem).unwrap());
        let g3 = condition_on(&root, GOAL_ID, "g3", &problem);
        let with_use = Arc::new(handle_open_condition(&root, &g3, context(&problem)).remove(0));
        let g1 = condition_on(&with_use, GOAL_ID, "g1", &problem);
        let with_make = Arc::new(handle_open_condition(&with_use, &g1, context(&problem)).remove(0));
        // use is step 1 and make is step 2; both still need (g2)
        assert_eq!(with_make.num_open_conds(), 2);

        let g2 = condition_on(&with_make, GOAL_ID, "g2", &problem);
        let reuse_make = |plans: Vec<Plan>| {
            plans
                .into_iter()
                .find(|plan| plan.num_action_steps() == 2)
                .expect("reusing make")
        };
        let plain = reuse_make(handle_open_condition(&with_make, &g2, context(&problem)));
        assert_eq!(plain.num_links(), 3);
        assert_eq!(plain.num_open_conds(), 1);

        let early = RefinementContext {
            problem: &problem,
            early_linking: true,
        };
        let linked = reuse_make(handle_open_condition(&with_make, &g2, early));
        assert_eq!(linked.num_links(), 4);
        assert_eq!(linked.num_open_conds(), 0);
        assert!(linked
            .links()
            .iter()
            .any(|link| link.from_id == 2 && link.to_id == 1));
    }

    const GUARD: &str = r#"
[domain]
name = "guard"
predicates = ["(on ?x)", "(seen ?x)", "(blocked ?a ?b)", "(done)"]

[[domain.actions]]
name = "watch"
parameters = "?x ?y"
precondition = "(not (on ?y))"
effect = "(seen ?x)"

[[domain.actions]]
name = "pass"
parameters = "?a ?b"
precondition = "(not (blocked ?a ?b))"
effect = "(done)"

[problem]
name = "p"
objects = "lamp fan"
init = ["(on fan)", "(blocked lamp fan)"]
goal = "(and (seen lamp) (done))"
"#;

    /// Adds the achiever of the goal built on `predicate` and returns the
    /// plan with the new step's negative precondition.
    fn with_step(problem: &Problem, predicate: &str) -> (Arc<Plan>, Arc<OpenCondition>) {
        let root = Arc::new(Plan::initial(problem).unwrap());
        let goal = root
            .open_conds()
            .iter()
            .find(|oc| {
                oc.literal().is_some_and(|literal| {
                    problem.domain.predicates.get(literal.atom.predicate).name == predicate
                })
            })
            .cloned()
            .unwrap();
        let child = Arc::new(handle_open_condition(&root, &goal, context(problem)).remove(0));
        let negative = child
            .open_conds()
            .iter()
            .find(|oc| oc.step_id == 1)
            .cloned()
            .unwrap();
        (child, negative)
    }

    #[test]
    fn closed_world_link_adds_inequality() {
        let problem = parse_problem(GUARD).unwrap();
        let fan = Term::Object(problem.objects.find("fan").unwrap());
        let (plan, not_on) = with_step(&problem, "seen");
        let y = not_on.literal().unwrap().atom.terms[0];
        assert!(matches!(y, Term::Variable(_)));

        let successors = handle_open_condition(&plan, &not_on, context(&problem));
        let closed = successors
            .iter()
            .find(|child| child.links().head().is_some_and(|link| link.from_id == INIT_ID))
            .expect("closed world link");
        assert_eq!(closed.bindings().distinct_pairs().len(), 1);
        assert!(closed.bindings().add(&[(y, fan)], &[], &problem).is_none());
        let lamp = Term::Object(problem.objects.find("lamp").unwrap());
        assert!(closed.bindings().add(&[(y, lamp)], &[], &problem).is_some());
    }

    #[test]
    fn closed_world_branches_on_each_unifier_pair() {
        let problem = parse_problem(GUARD).unwrap();
        let lamp = Term::Object(problem.objects.find("lamp").unwrap());
        let fan = Term::Object(problem.objects.find("fan").unwrap());
        let (plan, not_blocked) = with_step(&problem, "done");
        let terms = not_blocked.literal().unwrap().atom.terms;
        let (a, b) = (terms[0], terms[1]);

        let closed: Vec<Plan> = handle_open_condition(&plan, &not_blocked, context(&problem))
            .into_iter()
            .filter(|child| child.links().head().is_some_and(|link| link.from_id == INIT_ID))
            .collect();
        // (blocked lamp fan) is avoided by ?a != lamp or by ?b != fan
        assert_eq!(closed.len(), 2);
        let forbids = |child: &Plan, term: Term, object: Term| {
            child.bindings().add(&[(term, object)], &[], &problem).is_none()
        };
        assert!(closed.iter().any(|child| forbids(child, a, lamp) && !forbids(child, b, fan)));
        assert!(closed.iter().any(|child| forbids(child, b, fan) && !forbids(child, a, lamp)));
    }

    #[test]
    fn unsafe_without_threat_is_dropped() {
        let problem = parse_problem(SWITCH).unwrap();
        let root = Arc::new(Plan::initial(&problem).unwrap());
        let seen = open_condition(&root, true);
        let child = Arc::new(handle_open_condition(&root, &seen, context(&problem)).remove(0));
        let link = Arc::clone(child.links().head().unwrap());
        let threat = Arc::new(Unsafe {
            link,
            step_id: INIT_ID,
            effect: Effect::new(seen.literal().unwrap().negate()),
            effect_add: seen.literal().unwrap().atom,
        });
        let mut draft = PlanDraft::from_parent(&child);
        draft.add_unsafe((*threat).clone());
        let with_threat = Arc::new(draft.into_plan());
        let stored = Arc::clone(with_threat.unsafes().head().unwrap());
        let successors = handle_unsafe(&with_threat, &stored, context(&problem));
        assert_eq!(successors.len(), 1);
        assert_eq!(successors[0].num_unsafes(), 0);
    }
}
