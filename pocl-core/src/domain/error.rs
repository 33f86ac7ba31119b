use thiserror::Error;

#[derive(Debug, Error)]
pub enum DomainError {
    #[error("failed to parse problem file: {0}")]
    Toml(#[from] toml::de::Error),
    #[error("malformed expression `{text}`: {message}")]
    Syntax { text: String, message: String },
    #[error("unknown type {0}")]
    UnknownType(String),
    #[error("type {0} would become its own supertype")]
    TypeCycle(String),
    #[error("unknown predicate {0}")]
    UnknownPredicate(String),
    #[error("unknown object {0}")]
    UnknownObject(String),
    #[error("unknown parameter {parameter} in {context}")]
    UnknownParameter { parameter: String, context: String },
    #[error("duplicate declaration of {0}")]
    Duplicate(String),
    #[error("predicate {predicate} expects {expected} arguments, got {found}")]
    Arity {
        predicate: String,
        expected: usize,
        found: usize,
    },
    #[error("argument {argument} of {predicate} has type {found}, expected {expected}")]
    TypeMismatch {
        predicate: String,
        argument: String,
        expected: String,
        found: String,
    },
    #[error("effect of action {action} must be a conjunction of literals")]
    InvalidEffect { action: String },
    #[error("initial state entry must be a ground atom: {0}")]
    InvalidInitialAtom(String),
}

pub type DomainResult<T> = std::result::Result<T, DomainError>;
