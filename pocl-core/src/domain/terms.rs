use std::collections::HashMap;

use serde::Serialize;

use super::error::{DomainError, DomainResult};
use super::types::{TypeId, TypeTable};

/// Identifier of a plan step. Schema parameters become variables scoped by
/// the id of the step instantiating the schema.
pub type StepId = usize;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize)]
pub struct ObjectId(pub usize);

/// Parameter `index` of the action instantiated as step `step`.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct Variable {
    pub step: StepId,
    pub index: usize,
    pub ty: TypeId,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub enum Term {
    Object(ObjectId),
    /// Unscoped action parameter, only found in schemas.
    Parameter { index: usize, ty: TypeId },
    Variable(Variable),
}

impl Term {
    pub fn instantiate(&self, step: StepId) -> Term {
        match *self {
            Term::Parameter { index, ty } => Term::Variable(Variable { step, index, ty }),
            other => other,
        }
    }

    pub fn as_object(&self) -> Option<ObjectId> {
        match self {
            Term::Object(id) => Some(*id),
            _ => None,
        }
    }

    pub fn as_variable(&self) -> Option<Variable> {
        match self {
            Term::Variable(var) => Some(*var),
            _ => None,
        }
    }

    pub fn is_ground(&self) -> bool {
        matches!(self, Term::Object(_))
    }
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Object {
    pub name: String,
    pub ty: TypeId,
}

#[derive(Debug, Clone, Default)]
pub struct ObjectTable {
    objects: Vec<Object>,
    names: HashMap<String, ObjectId>,
}

impl ObjectTable {
    pub fn add(&mut self, name: &str, ty: TypeId) -> DomainResult<ObjectId> {
        if self.names.contains_key(name) {
            return Err(DomainError::Duplicate(name.to_string()));
        }
        let id = ObjectId(self.objects.len());
        self.objects.push(Object {
            name: name.to_string(),
            ty,
        });
        self.names.insert(name.to_string(), id);
        Ok(id)
    }

    pub fn find(&self, name: &str) -> Option<ObjectId> {
        self.names.get(name).copied()
    }

    pub fn get(&self, id: ObjectId) -> &Object {
        &self.objects[id.0]
    }

    pub fn name(&self, id: ObjectId) -> &str {
        &self.objects[id.0].name
    }

    pub fn type_of(&self, id: ObjectId) -> TypeId {
        self.objects[id.0].ty
    }

    pub fn len(&self) -> usize {
        self.objects.len()
    }

    pub fn is_empty(&self) -> bool {
        self.objects.is_empty()
    }

    pub fn iter(&self) -> impl Iterator<Item = (ObjectId, &Object)> {
        self.objects
            .iter()
            .enumerate()
            .map(|(index, object)| (ObjectId(index), object))
    }

    /// Objects whose type is a subtype of `ty`, in declaration order.
    pub fn of_type<'a>(
        &'a self,
        ty: TypeId,
        types: &'a TypeTable,
    ) -> impl Iterator<Item = ObjectId> + 'a {
        self.iter()
            .filter(move |(_, object)| types.subtype(object.ty, ty))
            .map(|(id, _)| id)
    }
}
