//! Persistent variable bindings: a union-find of equalities between
//! step-scoped variables and objects, plus a list of inequalities.
//!
//! `Bindings` values are immutable; `add` returns a new value and leaves the
//! receiver untouched, so plans can share their parent's bindings.

use std::collections::{BTreeMap, HashMap};
use std::sync::Arc;

use crate::domain::{Atom, Literal, Problem, Term, Variable};

/// Equality constraints produced by [`Bindings::unify`].
pub type Unifier = Vec<(Term, Term)>;

#[derive(Debug, Clone, Default)]
pub struct Bindings {
    inner: Arc<BindingsInner>,
}

#[derive(Debug, Clone, Default)]
struct BindingsInner {
    links: HashMap<Variable, Term>,
    /// Other members of each class whose root is a variable.
    classes: HashMap<Variable, Vec<Variable>>,
    distinct: Vec<(Term, Term)>,
}

impl Bindings {
    pub fn empty() -> Self {
        Self::default()
    }

    /// Representative of the equivalence class of `term`.
    pub fn resolve(&self, term: &Term) -> Term {
        self.inner.resolve(*term)
    }

    pub fn resolve_atom(&self, atom: &Atom) -> Atom {
        atom.map_terms(|t| self.resolve(t))
    }

    pub fn resolve_literal(&self, literal: &Literal) -> Literal {
        Literal {
            atom: self.resolve_atom(&literal.atom),
            positive: literal.positive,
        }
    }

    pub fn distinct_pairs(&self) -> &[(Term, Term)] {
        &self.inner.distinct
    }

    /// Most general unifier of two atoms under the current bindings, as the
    /// equalities still to be added. `None` when the atoms cannot be made
    /// equal without violating a constraint.
    pub fn unify(&self, a: &Atom, b: &Atom, problem: &Problem) -> Option<Unifier> {
        if a.predicate != b.predicate || a.terms.len() != b.terms.len() {
            return None;
        }
        let mut pending = Pending::new(&self.inner);
        let mut unifier = Vec::new();
        for (left, right) in a.terms.iter().zip(&b.terms) {
            let (l, r) = (pending.resolve(*left), pending.resolve(*right));
            if l == r {
                continue;
            }
            if !pending.bind(l, r, problem) {
                return None;
            }
            unifier.push((l, r));
        }
        pending.distinct_hold().then_some(unifier)
    }

    /// New bindings with the given equalities and inequalities, or `None` if
    /// they are inconsistent.
    pub fn add(
        &self,
        equalities: &[(Term, Term)],
        inequalities: &[(Term, Term)],
        problem: &Problem,
    ) -> Option<Bindings> {
        if equalities.is_empty() && inequalities.is_empty() {
            return Some(self.clone());
        }
        let mut pending = Pending::new(&self.inner);
        for (left, right) in equalities {
            if !pending.bind(*left, *right, problem) {
                return None;
            }
        }
        for (left, right) in inequalities {
            if pending.resolve(*left) == pending.resolve(*right) {
                return None;
            }
        }
        if !pending.distinct_hold() {
            return None;
        }
        let mut inner = pending.commit();
        inner.distinct.extend_from_slice(inequalities);
        Some(Bindings {
            inner: Arc::new(inner),
        })
    }

    /// Maps every term to a representative that does not depend on the order
    /// in which equalities were added: the bound object, or the smallest
    /// variable of the class.
    pub fn canonical(&self) -> Canonical {
        let mut smallest: BTreeMap<Term, Variable> = BTreeMap::new();
        for var in self.inner.links.keys() {
            let root = self.inner.resolve(Term::Variable(*var));
            if let Term::Variable(root_var) = root {
                let entry = smallest.entry(root).or_insert(root_var);
                if var < entry {
                    *entry = *var;
                }
            }
        }
        Canonical {
            bindings: self.clone(),
            smallest,
        }
    }

    /// Inequalities in canonical form, sorted and deduplicated.
    pub fn canonical_distinct(&self, canonical: &Canonical) -> Vec<(Term, Term)> {
        let mut pairs: Vec<(Term, Term)> = self
            .inner
            .distinct
            .iter()
            .map(|(a, b)| {
                let (a, b) = (canonical.term(a), canonical.term(b));
                if a <= b {
                    (a, b)
                } else {
                    (b, a)
                }
            })
            .collect();
        pairs.sort();
        pairs.dedup();
        pairs
    }
}

/// Order-independent renaming of terms, see [`Bindings::canonical`].
#[derive(Debug, Clone)]
pub struct Canonical {
    bindings: Bindings,
    smallest: BTreeMap<Term, Variable>,
}

impl Canonical {
    pub fn term(&self, term: &Term) -> Term {
        let root = self.bindings.resolve(term);
        match self.smallest.get(&root) {
            Some(var) => Term::Variable(*var),
            None => root,
        }
    }

    pub fn atom(&self, atom: &Atom) -> Atom {
        atom.map_terms(|t| self.term(t))
    }
}

impl BindingsInner {
    fn resolve(&self, mut term: Term) -> Term {
        while let Term::Variable(var) = term {
            match self.links.get(&var) {
                Some(next) => term = *next,
                None => break,
            }
        }
        term
    }
}

/// Equalities layered over shared bindings without copying them.
struct Pending<'a> {
    base: &'a BindingsInner,
    links: HashMap<Variable, Term>,
    classes: HashMap<Variable, Vec<Variable>>,
}

impl<'a> Pending<'a> {
    fn new(base: &'a BindingsInner) -> Self {
        Self {
            base,
            links: HashMap::new(),
            classes: HashMap::new(),
        }
    }

    fn resolve(&self, mut term: Term) -> Term {
        while let Term::Variable(var) = term {
            match self.links.get(&var).or_else(|| self.base.links.get(&var)) {
                Some(next) => term = *next,
                None => break,
            }
        }
        term
    }

    fn members(&self, root: Variable) -> &[Variable] {
        self.classes
            .get(&root)
            .or_else(|| self.base.classes.get(&root))
            .map(Vec::as_slice)
            .unwrap_or(&[])
    }

    fn bind(&mut self, left: Term, right: Term, problem: &Problem) -> bool {
        let (left, right) = (self.resolve(left), self.resolve(right));
        if left == right {
            return true;
        }
        let types = problem.types();
        match (left, right) {
            (Term::Object(_), Term::Object(_)) => false,
            (Term::Variable(var), Term::Object(object))
            | (Term::Object(object), Term::Variable(var)) => {
                let object_ty = problem.objects.type_of(object);
                // every member of the class must admit the object
                let fits = types.subtype(object_ty, var.ty)
                    && self
                        .members(var)
                        .iter()
                        .all(|member| types.subtype(object_ty, member.ty));
                if fits {
                    self.links.insert(var, Term::Object(object));
                }
                fits
            }
            (Term::Variable(a), Term::Variable(b)) => {
                if !types.compatible(a.ty, b.ty) {
                    return false;
                }
                // the more specific type stays the root
                let (child, root) = if types.subtype(b.ty, a.ty) { (a, b) } else { (b, a) };
                let mut merged = self.members(root).to_vec();
                merged.push(child);
                merged.extend_from_slice(self.members(child));
                self.classes.insert(root, merged);
                self.links.insert(child, Term::Variable(root));
                true
            }
            _ => false,
        }
    }

    fn distinct_hold(&self) -> bool {
        self.base
            .distinct
            .iter()
            .all(|(a, b)| self.resolve(*a) != self.resolve(*b))
    }

    fn commit(self) -> BindingsInner {
        let mut inner = self.base.clone();
        inner.classes.extend(self.classes);
        for (var, term) in self.links {
            // a linked variable is no longer the root of a class
            inner.classes.remove(&var);
            inner.links.insert(var, term);
        }
        inner
    }
}
