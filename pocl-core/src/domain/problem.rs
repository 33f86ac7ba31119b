use std::collections::{HashMap, HashSet};

use super::formula::{Atom, Effect, Formula, Literal, PredicateId, PredicateTable};
use super::terms::{ObjectTable, StepId, Term};
use super::types::{TypeId, TypeTable};

/// A parameterized action.
#[derive(Debug, Clone)]
pub struct ActionSchema {
    pub name: String,
    pub parameter_names: Vec<String>,
    pub parameters: Vec<TypeId>,
    pub precondition: Formula,
    pub effects: Vec<Effect>,
}

impl ActionSchema {
    /// Terms of the action instantiated as step `step`.
    pub fn instance_terms(&self, step: StepId) -> Vec<Term> {
        self.parameters
            .iter()
            .enumerate()
            .map(|(index, ty)| Term::Parameter { index, ty: *ty }.instantiate(step))
            .collect()
    }
}

/// Reference to one effect of one action schema.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub struct Achiever {
    pub action: usize,
    pub effect: usize,
}

#[derive(Debug, Clone)]
pub struct Domain {
    pub name: String,
    pub types: TypeTable,
    pub predicates: PredicateTable,
    pub constants: ObjectTable,
    pub actions: Vec<ActionSchema>,
    achievers: HashMap<(PredicateId, bool), Vec<Achiever>>,
}

impl Domain {
    pub fn new(
        name: impl Into<String>,
        types: TypeTable,
        predicates: PredicateTable,
        constants: ObjectTable,
        actions: Vec<ActionSchema>,
    ) -> Self {
        let mut achievers: HashMap<(PredicateId, bool), Vec<Achiever>> = HashMap::new();
        for (action_index, action) in actions.iter().enumerate() {
            for (effect_index, effect) in action.effects.iter().enumerate() {
                achievers
                    .entry((effect.literal.atom.predicate, effect.literal.positive))
                    .or_default()
                    .push(Achiever {
                        action: action_index,
                        effect: effect_index,
                    });
            }
        }
        Self {
            name: name.into(),
            types,
            predicates,
            constants,
            actions,
            achievers,
        }
    }

    /// Schema effects whose predicate and polarity match `literal`.
    pub fn achievers(&self, literal: &Literal) -> &[Achiever] {
        self.achievers
            .get(&(literal.atom.predicate, literal.positive))
            .map(Vec::as_slice)
            .unwrap_or(&[])
    }

    /// A predicate no action adds or deletes.
    pub fn is_static(&self, predicate: PredicateId) -> bool {
        !self.achievers.contains_key(&(predicate, true))
            && !self.achievers.contains_key(&(predicate, false))
    }
}

#[derive(Debug, Clone)]
pub struct Problem {
    pub name: String,
    pub domain: Domain,
    /// Domain constants followed by problem objects.
    pub objects: ObjectTable,
    init: Vec<Atom>,
    init_set: HashSet<Atom>,
    goal: Formula,
}

impl Problem {
    pub fn new(
        name: impl Into<String>,
        domain: Domain,
        objects: ObjectTable,
        init: Vec<Atom>,
        goal: Formula,
    ) -> Self {
        let init_set = init.iter().cloned().collect();
        Self {
            name: name.into(),
            domain,
            objects,
            init,
            init_set,
            goal,
        }
    }

    pub fn init(&self) -> &[Atom] {
        &self.init
    }

    pub fn goal(&self) -> &Formula {
        &self.goal
    }

    pub fn types(&self) -> &TypeTable {
        &self.domain.types
    }

    pub fn holds_initially(&self, atom: &Atom) -> bool {
        self.init_set.contains(atom)
    }

    pub fn term_type(&self, term: &Term) -> TypeId {
        match term {
            Term::Object(id) => self.objects.type_of(*id),
            Term::Parameter { ty, .. } => *ty,
            Term::Variable(var) => var.ty,
        }
    }

    /// Checks that a ground goal can be consistent with the initial state:
    /// not `False`, no literal together with its negation, and static literals
    /// agree with the initial state.
    pub fn goal_is_consistent(&self) -> bool {
        let conjuncts = self.goal.conjuncts();
        let mut literals = HashSet::new();
        for conjunct in &conjuncts {
            if *conjunct == Formula::False {
                return false;
            }
            let Some(literal) = conjunct.as_literal() else {
                continue;
            };
            if !literal.atom.is_ground() {
                continue;
            }
            if literals.contains(&literal.negate()) {
                return false;
            }
            if self.domain.is_static(literal.atom.predicate)
                && self.holds_initially(&literal.atom) != literal.positive
            {
                return false;
            }
            literals.insert(literal);
        }
        true
    }

    pub fn format_term(&self, term: &Term) -> String {
        match term {
            Term::Object(id) => self.objects.name(*id).to_string(),
            Term::Parameter { index, .. } => format!("?{index}"),
            Term::Variable(var) => format!("?v{}_{}", var.step, var.index),
        }
    }

    pub fn format_atom(&self, atom: &Atom) -> String {
        let name = &self.domain.predicates.get(atom.predicate).name;
        let terms: Vec<String> = atom.terms.iter().map(|t| self.format_term(t)).collect();
        format!("({name}{}{})", if terms.is_empty() { "" } else { " " }, terms.join(" "))
    }

    pub fn format_literal(&self, literal: &Literal) -> String {
        if literal.positive {
            self.format_atom(&literal.atom)
        } else {
            format!("(not {})", self.format_atom(&literal.atom))
        }
    }

    pub fn format_action(&self, action: usize, terms: &[Term]) -> String {
        let name = &self.domain.actions[action].name;
        let terms: Vec<String> = terms.iter().map(|t| self.format_term(t)).collect();
        format!("({name}{}{})", if terms.is_empty() { "" } else { " " }, terms.join(" "))
    }
}
