use std::sync::Arc;

use serde::Serialize;

use crate::domain::{ActionSchema, Atom, Effect, Formula, Literal, StepId, Term};

/// Id of the step whose effects are the initial state.
pub const INIT_ID: StepId = 0;
/// Id of the step whose precondition is the goal.
pub const GOAL_ID: StepId = StepId::MAX;

/// Why a plan element was introduced.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum Reason {
    InitialState,
    Goal,
    Precondition,
    Establish,
    Demote,
    Promote,
    Separate,
}

#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub struct ActionInstance {
    pub schema: usize,
    pub terms: Vec<Term>,
}

#[derive(Debug, Clone)]
pub struct Step {
    pub id: StepId,
    pub action: Option<ActionInstance>,
    pub precondition: Formula,
    pub effects: Vec<Effect>,
    pub reason: Reason,
}

impl Step {
    pub fn initial(init: &[Atom]) -> Self {
        Self {
            id: INIT_ID,
            action: None,
            precondition: Formula::True,
            effects: init
                .iter()
                .map(|atom| Effect::new(Literal::positive(atom.clone())))
                .collect(),
            reason: Reason::InitialState,
        }
    }

    pub fn goal(goal: &Formula) -> Self {
        Self {
            id: GOAL_ID,
            action: None,
            precondition: goal.clone(),
            effects: Vec::new(),
            reason: Reason::Goal,
        }
    }

    /// Instance of `schema` (at index `schema_index`) with every parameter
    /// replaced by a variable scoped to `id`.
    pub fn from_schema(id: StepId, schema_index: usize, schema: &ActionSchema) -> Self {
        Self {
            id,
            action: Some(ActionInstance {
                schema: schema_index,
                terms: schema.instance_terms(id),
            }),
            precondition: schema.precondition.instantiate(id),
            effects: schema.effects.iter().map(|e| e.instantiate(id)).collect(),
            reason: Reason::Establish,
        }
    }

    pub fn is_action(&self) -> bool {
        self.action.is_some()
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub struct Ordering {
    pub before_id: StepId,
    pub after_id: StepId,
    pub reason: Reason,
}

impl Ordering {
    pub fn new(before_id: StepId, after_id: StepId, reason: Reason) -> Self {
        Self {
            before_id,
            after_id,
            reason,
        }
    }
}

/// Causal link: step `from_id` establishes `condition` for step `to_id`.
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub struct Link {
    pub from_id: StepId,
    pub to_id: StepId,
    pub condition: Literal,
    pub reason: Reason,
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct OpenCondition {
    /// A literal or a disjunction.
    pub condition: Formula,
    pub step_id: StepId,
    pub reason: Reason,
}

impl OpenCondition {
    pub fn literal(&self) -> Option<Literal> {
        self.condition.as_literal()
    }

    pub fn is_disjunction(&self) -> bool {
        matches!(self.condition, Formula::Disjunction(_))
    }
}

/// Step `step_id` has an effect that may clobber `link`.
#[derive(Debug, Clone)]
pub struct Unsafe {
    pub link: Arc<Link>,
    pub step_id: StepId,
    pub effect: Effect,
    pub effect_add: Atom,
}
