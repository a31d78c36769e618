//! Value stacks the interpreter pushes to and pops from.

use crate::trace;
use crate::virtual_machine::errors::VMError;
use crate::virtual_machine::value::{Value, ValueType};
use std::collections::BTreeMap;
use std::fmt;

/// Identifies one of the VM's value stacks.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct StackId(pub u8);

/// Conventional default stack.
pub const VALUE_STACK: StackId = StackId(0);

impl fmt::Display for StackId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "stack #{}", self.0)
    }
}

/// LIFO storage for typed values.
///
/// Implementations must reject pops on an empty stack with
/// [`VMError::PopEmptyStack`] and pops of the wrong type with
/// [`VMError::TypeMismatch`], leaving the stack untouched in both cases.
pub trait ValueStack: Send {
    fn push(&mut self, value: Value) -> Result<(), VMError>;

    fn pop(&mut self, ty: ValueType) -> Result<Value, VMError>;

    fn peek(&self) -> Option<Value>;

    fn len(&self) -> usize;

    fn is_empty(&self) -> bool {
        self.len() == 0
    }

    fn clear(&mut self);

    /// Copies the content, bottom first.
    fn snapshot(&self) -> Vec<Value>;
}

/// Default stack: a vector of tagged values restricted to a closed type set.
#[derive(Debug, Clone)]
pub struct TaggedStack {
    id: StackId,
    types: Vec<ValueType>,
    values: Vec<Value>,
}

impl TaggedStack {
    pub fn new(id: StackId, types: impl IntoIterator<Item = ValueType>) -> Self {
        let mut types: Vec<ValueType> = types.into_iter().collect();
        types.sort();
        types.dedup();
        Self {
            id,
            types,
            values: Vec::new(),
        }
    }

    pub fn id(&self) -> StackId {
        self.id
    }

    /// Types this stack accepts.
    pub fn types(&self) -> &[ValueType] {
        &self.types
    }
}

impl ValueStack for TaggedStack {
    fn push(&mut self, value: Value) -> Result<(), VMError> {
        let ty = value.ty();
        if self.types.binary_search(&ty).is_err() {
            return Err(VMError::UnsupportedType { stack: self.id, ty });
        }
        trace!("{} push {value}", self.id);
        self.values.push(value);
        Ok(())
    }

    fn pop(&mut self, ty: ValueType) -> Result<Value, VMError> {
        let top = self
            .values
            .last()
            .ok_or(VMError::PopEmptyStack { stack: self.id, ty })?;
        if top.ty() != ty {
            return Err(VMError::TypeMismatch {
                stack: self.id,
                expected: ty,
                actual: top.ty(),
            });
        }
        trace!("{} pop {top}", self.id);
        self.values.pop().ok_or(VMError::PopEmptyStack { stack: self.id, ty })
    }

    fn peek(&self) -> Option<Value> {
        self.values.last().copied()
    }

    fn len(&self) -> usize {
        self.values.len()
    }

    fn clear(&mut self) {
        self.values.clear();
    }

    fn snapshot(&self) -> Vec<Value> {
        self.values.clone()
    }
}

/// The stacks owned by one VM, keyed by id.
pub(crate) struct StackSet {
    stacks: BTreeMap<StackId, Box<dyn ValueStack>>,
}

impl StackSet {
    /// One [`TaggedStack`] per declared stack.
    pub(crate) fn tagged<'a>(
        universes: impl IntoIterator<Item = (StackId, &'a [ValueType])>,
    ) -> Self {
        let stacks = universes
            .into_iter()
            .map(|(id, types)| {
                let stack: Box<dyn ValueStack> =
                    Box::new(TaggedStack::new(id, types.iter().copied()));
                (id, stack)
            })
            .collect();
        Self { stacks }
    }

    pub(crate) fn get(&self, id: StackId) -> Option<&dyn ValueStack> {
        self.stacks.get(&id).map(|stack| stack.as_ref())
    }

    pub(crate) fn get_mut(&mut self, id: StackId) -> Result<&mut dyn ValueStack, VMError> {
        match self.stacks.get_mut(&id) {
            Some(stack) => Ok(stack.as_mut()),
            None => Err(VMError::UnknownStack { stack: id }),
        }
    }

    pub(crate) fn replace(
        &mut self,
        id: StackId,
        stack: Box<dyn ValueStack>,
    ) -> Option<Box<dyn ValueStack>> {
        self.stacks.insert(id, stack)
    }

    pub(crate) fn clear(&mut self) {
        for stack in self.stacks.values_mut() {
            stack.clear();
        }
    }

    pub(crate) fn ids(&self) -> impl Iterator<Item = StackId> + '_ {
        self.stacks.keys().copied()
    }
}
