use std::collections::{BTreeSet, HashMap};
use std::fmt;

use serde::Serialize;

use super::error::{DomainError, DomainResult};

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize)]
pub struct TypeId(pub usize);

/// A type is either a named simple type with a supertype, or the union of
/// several simple types (`(either a b)`).
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Type {
    Simple { name: String, supertype: TypeId },
    Union { members: BTreeSet<TypeId> },
}

/// Type lattice rooted at `object`.
#[derive(Debug, Clone)]
pub struct TypeTable {
    types: Vec<Type>,
    names: HashMap<String, TypeId>,
}

impl Default for TypeTable {
    fn default() -> Self {
        Self::new()
    }
}

impl TypeTable {
    pub const OBJECT: TypeId = TypeId(0);

    pub fn new() -> Self {
        let mut names = HashMap::new();
        names.insert("object".to_string(), Self::OBJECT);
        Self {
            types: vec![Type::Simple {
                name: "object".to_string(),
                supertype: Self::OBJECT,
            }],
            names,
        }
    }

    pub fn get(&self, id: TypeId) -> &Type {
        &self.types[id.0]
    }

    pub fn find(&self, name: &str) -> Option<TypeId> {
        self.names.get(name).copied()
    }

    pub fn len(&self) -> usize {
        self.types.len()
    }

    pub fn is_empty(&self) -> bool {
        self.types.is_empty()
    }

    /// Declares a simple type, or updates the supertype of a type that was
    /// first seen as a bare name.
    pub fn add_simple(&mut self, name: &str, supertype: TypeId) -> DomainResult<TypeId> {
        if name == "object" {
            return Ok(Self::OBJECT);
        }
        if let Some(existing) = self.find(name) {
            if self.subtype(supertype, existing) {
                return Err(DomainError::TypeCycle(name.to_string()));
            }
            if let Type::Simple {
                supertype: current, ..
            } = &mut self.types[existing.0]
            {
                if *current == Self::OBJECT {
                    *current = supertype;
                }
            }
            return Ok(existing);
        }
        let id = TypeId(self.types.len());
        self.types.push(Type::Simple {
            name: name.to_string(),
            supertype,
        });
        self.names.insert(name.to_string(), id);
        Ok(id)
    }

    /// Returns the canonical union of two types.
    pub fn union(&mut self, t1: TypeId, t2: TypeId) -> TypeId {
        let mut members = BTreeSet::new();
        for member in self.members(t1).into_iter().chain(self.members(t2)) {
            if members.iter().any(|m| self.subtype(member, *m)) {
                continue;
            }
            members.retain(|m| !self.subtype(*m, member));
            members.insert(member);
        }
        self.intern_union(members)
    }

    fn intern_union(&mut self, members: BTreeSet<TypeId>) -> TypeId {
        match members.len() {
            0 => Self::OBJECT,
            1 => *members.iter().next().unwrap_or(&Self::OBJECT),
            _ => {
                let candidate = Type::Union { members };
                if let Some(index) = self.types.iter().position(|t| *t == candidate) {
                    return TypeId(index);
                }
                self.types.push(candidate);
                TypeId(self.types.len() - 1)
            }
        }
    }

    fn members(&self, id: TypeId) -> Vec<TypeId> {
        match self.get(id) {
            Type::Simple { .. } => vec![id],
            Type::Union { members } => members.iter().copied().collect(),
        }
    }

    /// Checks if `t1` is a subtype of `t2`.
    pub fn subtype(&self, t1: TypeId, t2: TypeId) -> bool {
        if t2 == Self::OBJECT || t1 == t2 {
            return true;
        }
        match self.get(t1) {
            Type::Union { members } => members.iter().all(|m| self.subtype(*m, t2)),
            Type::Simple { supertype, .. } => match self.get(t2) {
                Type::Union { members } => members.iter().any(|m| self.subtype(t1, *m)),
                Type::Simple { .. } => t1 != Self::OBJECT && self.subtype(*supertype, t2),
            },
        }
    }

    /// Two types are compatible when some object could belong to both.
    pub fn compatible(&self, t1: TypeId, t2: TypeId) -> bool {
        let left = self.members(t1);
        let right = self.members(t2);
        left.iter()
            .any(|a| right.iter().any(|b| self.subtype(*a, *b) || self.subtype(*b, *a)))
    }

    pub fn name(&self, id: TypeId) -> String {
        TypeName { table: self, id }.to_string()
    }
}

struct TypeName<'a> {
    table: &'a TypeTable,
    id: TypeId,
}

impl fmt::Display for TypeName<'_> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self.table.get(self.id) {
            Type::Simple { name, .. } => f.write_str(name),
            Type::Union { members } => {
                f.write_str("(either")?;
                for member in members {
                    write!(f, " {}", self.table.name(*member))?;
                }
                f.write_str(")")
            }
        }
    }
}
