//! Planning domains and problems: types, objects, formulas and action
//! schemas, plus the TOML/s-expression problem file reader.

mod error;
mod formula;
mod parser;
mod problem;
mod terms;
mod types;

pub use error::{DomainError, DomainResult};
pub use formula::{Atom, Effect, Formula, Literal, Predicate, PredicateId, PredicateTable};
pub use parser::{
    parse_problem, ActionSection, DomainSection, ProblemFile, ProblemSection,
};
pub use problem::{Achiever, ActionSchema, Domain, Problem};
pub use terms::{Object, ObjectId, ObjectTable, StepId, Term, Variable};
pub use types::{Type, TypeId, TypeTable};
