use std::collections::HashMap;

use serde::Serialize;

use super::error::{DomainError, DomainResult};
use super::terms::{StepId, Term};
use super::types::TypeId;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize)]
pub struct PredicateId(pub usize);

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Predicate {
    pub name: String,
    pub parameters: Vec<TypeId>,
}

#[derive(Debug, Clone, Default)]
pub struct PredicateTable {
    predicates: Vec<Predicate>,
    names: HashMap<String, PredicateId>,
}

impl PredicateTable {
    pub fn add(&mut self, name: &str, parameters: Vec<TypeId>) -> DomainResult<PredicateId> {
        if self.names.contains_key(name) {
            return Err(DomainError::Duplicate(name.to_string()));
        }
        let id = PredicateId(self.predicates.len());
        self.predicates.push(Predicate {
            name: name.to_string(),
            parameters,
        });
        self.names.insert(name.to_string(), id);
        Ok(id)
    }

    pub fn find(&self, name: &str) -> Option<PredicateId> {
        self.names.get(name).copied()
    }

    pub fn get(&self, id: PredicateId) -> &Predicate {
        &self.predicates[id.0]
    }

    pub fn len(&self) -> usize {
        self.predicates.len()
    }

    pub fn is_empty(&self) -> bool {
        self.predicates.is_empty()
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct Atom {
    pub predicate: PredicateId,
    pub terms: Vec<Term>,
}

impl Atom {
    pub fn new(predicate: PredicateId, terms: Vec<Term>) -> Self {
        Self { predicate, terms }
    }

    pub fn instantiate(&self, step: StepId) -> Atom {
        Atom {
            predicate: self.predicate,
            terms: self.terms.iter().map(|t| t.instantiate(step)).collect(),
        }
    }

    pub fn is_ground(&self) -> bool {
        self.terms.iter().all(Term::is_ground)
    }

    pub fn map_terms(&self, f: impl Fn(&Term) -> Term) -> Atom {
        Atom {
            predicate: self.predicate,
            terms: self.terms.iter().map(f).collect(),
        }
    }
}

/// An atom or its negation.
#[derive(Debug, Clone, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct Literal {
    pub atom: Atom,
    pub positive: bool,
}

impl Literal {
    pub fn positive(atom: Atom) -> Self {
        Self {
            atom,
            positive: true,
        }
    }

    pub fn negative(atom: Atom) -> Self {
        Self {
            atom,
            positive: false,
        }
    }

    pub fn negate(&self) -> Literal {
        Literal {
            atom: self.atom.clone(),
            positive: !self.positive,
        }
    }

    pub fn instantiate(&self, step: StepId) -> Literal {
        Literal {
            atom: self.atom.instantiate(step),
            positive: self.positive,
        }
    }

    pub fn to_formula(&self) -> Formula {
        if self.positive {
            Formula::Atom(self.atom.clone())
        } else {
            Formula::Negation(self.atom.clone())
        }
    }
}

/// Formulas are kept in negation normal form: negation applies to atoms only.
#[derive(Debug, Clone, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub enum Formula {
    True,
    False,
    Atom(Atom),
    Negation(Atom),
    Conjunction(Vec<Formula>),
    Disjunction(Vec<Formula>),
}

impl Formula {
    /// Conjunction with constant folding.
    pub fn and(parts: Vec<Formula>) -> Formula {
        let mut conjuncts = Vec::new();
        for part in parts {
            match part {
                Formula::True => {}
                Formula::False => return Formula::False,
                Formula::Conjunction(inner) => conjuncts.extend(inner),
                other => conjuncts.push(other),
            }
        }
        match conjuncts.len() {
            0 => Formula::True,
            1 => conjuncts.pop().unwrap_or(Formula::True),
            _ => Formula::Conjunction(conjuncts),
        }
    }

    /// Disjunction with constant folding.
    pub fn or(parts: Vec<Formula>) -> Formula {
        let mut disjuncts = Vec::new();
        for part in parts {
            match part {
                Formula::False => {}
                Formula::True => return Formula::True,
                Formula::Disjunction(inner) => disjuncts.extend(inner),
                other => disjuncts.push(other),
            }
        }
        match disjuncts.len() {
            0 => Formula::False,
            1 => disjuncts.pop().unwrap_or(Formula::False),
            _ => Formula::Disjunction(disjuncts),
        }
    }

    pub fn negate(&self) -> Formula {
        match self {
            Formula::True => Formula::False,
            Formula::False => Formula::True,
            Formula::Atom(atom) => Formula::Negation(atom.clone()),
            Formula::Negation(atom) => Formula::Atom(atom.clone()),
            Formula::Conjunction(parts) => Formula::or(parts.iter().map(Formula::negate).collect()),
            Formula::Disjunction(parts) => Formula::and(parts.iter().map(Formula::negate).collect()),
        }
    }

    pub fn instantiate(&self, step: StepId) -> Formula {
        match self {
            Formula::True => Formula::True,
            Formula::False => Formula::False,
            Formula::Atom(atom) => Formula::Atom(atom.instantiate(step)),
            Formula::Negation(atom) => Formula::Negation(atom.instantiate(step)),
            Formula::Conjunction(parts) => {
                Formula::Conjunction(parts.iter().map(|p| p.instantiate(step)).collect())
            }
            Formula::Disjunction(parts) => {
                Formula::Disjunction(parts.iter().map(|p| p.instantiate(step)).collect())
            }
        }
    }

    pub fn map_atoms(&self, f: &impl Fn(&Atom) -> Atom) -> Formula {
        match self {
            Formula::True => Formula::True,
            Formula::False => Formula::False,
            Formula::Atom(atom) => Formula::Atom(f(atom)),
            Formula::Negation(atom) => Formula::Negation(f(atom)),
            Formula::Conjunction(parts) => {
                Formula::Conjunction(parts.iter().map(|p| p.map_atoms(f)).collect())
            }
            Formula::Disjunction(parts) => {
                Formula::Disjunction(parts.iter().map(|p| p.map_atoms(f)).collect())
            }
        }
    }

    pub fn as_literal(&self) -> Option<Literal> {
        match self {
            Formula::Atom(atom) => Some(Literal::positive(atom.clone())),
            Formula::Negation(atom) => Some(Literal::negative(atom.clone())),
            _ => None,
        }
    }

    /// Top-level conjuncts, with `True` dropped. `False` is returned as a
    /// single conjunct so callers can detect it.
    pub fn conjuncts(&self) -> Vec<Formula> {
        match Formula::and(vec![self.clone()]) {
            Formula::True => Vec::new(),
            Formula::Conjunction(parts) => parts,
            other => vec![other],
        }
    }

    /// Every literal mentioned anywhere in the formula.
    pub fn literals(&self) -> Vec<Literal> {
        let mut out = Vec::new();
        self.collect_literals(&mut out);
        out
    }

    fn collect_literals(&self, out: &mut Vec<Literal>) {
        match self {
            Formula::True | Formula::False => {}
            Formula::Atom(_) | Formula::Negation(_) => {
                if let Some(literal) = self.as_literal() {
                    out.push(literal);
                }
            }
            Formula::Conjunction(parts) | Formula::Disjunction(parts) => {
                for part in parts {
                    part.collect_literals(out);
                }
            }
        }
    }
}

/// An unconditional action effect.
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub struct Effect {
    pub literal: Literal,
}

impl Effect {
    pub fn new(literal: Literal) -> Self {
        Self { literal }
    }

    pub fn instantiate(&self, step: StepId) -> Effect {
        Effect {
            literal: self.literal.instantiate(step),
        }
    }
}
