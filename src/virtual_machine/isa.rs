//! Instruction descriptors and the opcode table.
//!
//! An [`InstructionTable`] is built once from an ordered list of
//! [`Instruction`]s: the first instruction gets opcode `0x00`, the next `0x01`,
//! and so on. Each instruction declares
//! - the values it pops from the stacks ([`StackOperand`]),
//! - the operands it reads from the bytecode after its opcode ([`CodeOperand`]),
//! - the values it pushes back ([`Production`]),
//! - whether it may move the instruction pointer,
//! - its behavior: a callback, or a pipe forwarding consumed values unchanged.
//!
//! ```
//! use stackvm::virtual_machine::isa::{Instruction, InstructionTable, Outcome};
//! use stackvm::virtual_machine::stack::VALUE_STACK;
//! use stackvm::virtual_machine::value::ValueType::U32;
//!
//! let table = InstructionTable::builder()
//!     .instruction(Instruction::new("push").operand(U32).produces(VALUE_STACK, U32).pipe())
//!     .instruction(
//!         Instruction::new("add")
//!             .consumes(VALUE_STACK, U32)
//!             .consumes(VALUE_STACK, U32)
//!             .produces(VALUE_STACK, U32)
//!             .callback(|ops| {
//!                 Ok(Outcome::push(ops.stack_at::<u32>(0)?.wrapping_add(ops.stack_at::<u32>(1)?)))
//!             }),
//!     )
//!     .build()
//!     .unwrap();
//!
//! assert_eq!(table.opcode("add"), Some(1));
//! ```
//!
//! # Table invariants
//!
//! `build` rejects tables with more than 256 instructions, empty or duplicate
//! names, consumer types that no instruction produces on the same stack,
//! unsupported representation widths and pipes whose inputs do not line up with
//! their outputs.

use crate::virtual_machine::codec::{Endianness, Representation};
use crate::virtual_machine::errors::{ConfigError, VMError};
use crate::virtual_machine::stack::StackId;
use crate::virtual_machine::value::{FromValue, Operand, Value, ValueType};
use std::collections::{BTreeMap, HashMap};
use std::fmt;
use std::sync::Arc;

/// Number of opcode slots.
pub const OPCODE_SLOTS: usize = 256;

/// Operand read from the bytecode right after the opcode.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum CodeOperand {
    /// One encoded value.
    Value(ValueType),
    /// An encoded element count, followed at run time by that many pops of
    /// `element` from `stack`, handed to the callback as one list.
    Iterable {
        count: ValueType,
        stack: StackId,
        element: ValueType,
    },
}

impl CodeOperand {
    /// Type of the bytes encoded in the code for this operand.
    pub fn encoded_type(&self) -> ValueType {
        match *self {
            CodeOperand::Value(ty) => ty,
            CodeOperand::Iterable { count, .. } => count,
        }
    }
}

/// Value popped from a stack before the callback runs.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct StackOperand {
    pub stack: StackId,
    pub ty: ValueType,
}

/// Value pushed after the callback returns.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Production {
    /// One scalar.
    Value { stack: StackId, ty: ValueType },
    /// Every element of a returned list, in order.
    Each { stack: StackId, ty: ValueType },
}

impl Production {
    pub fn stack(&self) -> StackId {
        match *self {
            Production::Value { stack, .. } | Production::Each { stack, .. } => stack,
        }
    }

    pub fn ty(&self) -> ValueType {
        match *self {
            Production::Value { ty, .. } | Production::Each { ty, .. } => ty,
        }
    }
}

/// Arguments handed to a callback.
///
/// `stack` holds popped values in declaration order, which is the order they
/// were pushed in: the last declared consumer was the top of the stack. `code`
/// holds bytecode operands in textual order.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct Operands {
    pub stack: Vec<Value>,
    pub code: Vec<Operand>,
}

impl Operands {
    pub fn stack_at<T: FromValue>(&self, index: usize) -> Result<T, VMError> {
        self.stack
            .get(index)
            .copied()
            .and_then(T::from_value)
            .ok_or(VMError::OperandAccess {
                kind: "stack",
                index,
                expected: T::TYPE.name(),
            })
    }

    pub fn code_at<T: FromValue>(&self, index: usize) -> Result<T, VMError> {
        self.code
            .get(index)
            .and_then(Operand::as_scalar)
            .and_then(T::from_value)
            .ok_or(VMError::OperandAccess {
                kind: "code",
                index,
                expected: T::TYPE.name(),
            })
    }

    /// Elements of an iterable code operand, first popped first.
    pub fn list_at<T: FromValue>(&self, index: usize) -> Result<Vec<T>, VMError> {
        let access = VMError::OperandAccess {
            kind: "iterable",
            index,
            expected: T::TYPE.name(),
        };
        let Some(values) = self.code.get(index).and_then(Operand::as_list) else {
            return Err(access);
        };
        values
            .iter()
            .map(|value| T::from_value(*value))
            .collect::<Option<Vec<T>>>()
            .ok_or(access)
    }
}

/// How the instruction pointer moves after a callback.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum IpUpdate {
    /// Continue after the opcode and its bytecode operands.
    Advance,
    /// Continue at an absolute offset. Only allowed for ip-mutating instructions.
    Jump(usize),
}

/// What a callback returns: the produced values and the pointer update.
#[derive(Debug, Clone, PartialEq)]
pub struct Outcome {
    pub values: Vec<Operand>,
    pub ip: IpUpdate,
}

impl Outcome {
    /// No values, continue with the next instruction.
    pub fn none() -> Self {
        Self {
            values: Vec::new(),
            ip: IpUpdate::Advance,
        }
    }

    /// A single produced value.
    pub fn push(value: impl Into<Value>) -> Self {
        Self {
            values: vec![Operand::Scalar(value.into())],
            ip: IpUpdate::Advance,
        }
    }

    /// Several produced values, pushed in the given order.
    pub fn values<I>(values: I) -> Self
    where
        I: IntoIterator,
        I::Item: Into<Operand>,
    {
        Self {
            values: values.into_iter().map(Into::into).collect(),
            ip: IpUpdate::Advance,
        }
    }

    pub fn jump(target: usize) -> Self {
        Self {
            values: Vec::new(),
            ip: IpUpdate::Jump(target),
        }
    }

    pub fn jump_with<I>(target: usize, values: I) -> Self
    where
        I: IntoIterator,
        I::Item: Into<Operand>,
    {
        Self {
            ip: IpUpdate::Jump(target),
            ..Self::values(values)
        }
    }
}

/// Instruction callback.
pub type Callback = Arc<dyn Fn(&Operands) -> Result<Outcome, VMError> + Send + Sync>;

#[derive(Clone)]
enum Behavior {
    Callback(Callback),
    /// Forwards stack values, then code values, to the producers.
    Pipe,
    /// Unassigned opcode slot.
    Invalid,
}

/// Descriptor of one opcode.
#[derive(Clone)]
pub struct Instruction {
    name: String,
    opcode: u8,
    stack_consumers: Vec<StackOperand>,
    code_consumers: Vec<CodeOperand>,
    producers: Vec<Production>,
    mutates_ip: bool,
    behavior: Behavior,
}

impl Instruction {
    /// Starts describing an instruction named `name`.
    #[allow(clippy::new_ret_no_self)]
    pub fn new(name: impl Into<String>) -> InstructionBuilder {
        InstructionBuilder {
            name: name.into(),
            stack_consumers: Vec::new(),
            code_consumers: Vec::new(),
            producers: Vec::new(),
            mutates_ip: false,
        }
    }

    fn invalid(opcode: u8) -> Self {
        Self {
            name: "<invalid>".to_string(),
            opcode,
            stack_consumers: Vec::new(),
            code_consumers: Vec::new(),
            producers: Vec::new(),
            mutates_ip: false,
            behavior: Behavior::Invalid,
        }
    }

    pub fn name(&self) -> &str {
        &self.name
    }

    /// Opcode slot the instruction occupies in its table.
    pub fn opcode(&self) -> u8 {
        self.opcode
    }

    pub fn stack_consumers(&self) -> &[StackOperand] {
        &self.stack_consumers
    }

    pub fn code_consumers(&self) -> &[CodeOperand] {
        &self.code_consumers
    }

    pub fn producers(&self) -> &[Production] {
        &self.producers
    }

    pub fn mutates_ip(&self) -> bool {
        self.mutates_ip
    }

    pub fn is_pipe(&self) -> bool {
        matches!(self.behavior, Behavior::Pipe)
    }

    /// False for the sentinel filling unassigned opcode slots.
    pub fn is_defined(&self) -> bool {
        !matches!(self.behavior, Behavior::Invalid)
    }

    /// Runs the instruction's behavior. The sentinel always fails.
    pub(crate) fn invoke(&self, operands: &Operands) -> Result<Outcome, VMError> {
        match &self.behavior {
            Behavior::Callback(callback) => callback(operands),
            Behavior::Pipe if self.producers.is_empty() => Ok(Outcome::none()),
            Behavior::Pipe => {
                let forwarded = operands
                    .stack
                    .iter()
                    .map(|value| Operand::Scalar(*value))
                    .chain(operands.code.iter().cloned());
                Ok(Outcome::values(forwarded))
            }
            Behavior::Invalid => Err(VMError::InvalidOpcode {
                opcode: self.opcode,
            }),
        }
    }

    /// Values a pipe forwards, as `(is_list, type)` pairs.
    fn forwarded_shape(&self) -> Vec<(bool, ValueType)> {
        let from_stack = self.stack_consumers.iter().map(|c| (false, c.ty));
        let from_code = self.code_consumers.iter().map(|c| match *c {
            CodeOperand::Value(ty) => (false, ty),
            CodeOperand::Iterable { element, .. } => (true, element),
        });
        from_stack.chain(from_code).collect()
    }
}

impl fmt::Debug for Instruction {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Instruction")
            .field("name", &self.name)
            .field("opcode", &self.opcode)
            .field("stack_consumers", &self.stack_consumers)
            .field("code_consumers", &self.code_consumers)
            .field("producers", &self.producers)
            .field("mutates_ip", &self.mutates_ip)
            .field("pipe", &self.is_pipe())
            .finish()
    }
}

/// Builder returned by [`Instruction::new`].
///
/// Finished with [`callback`](Self::callback) or [`pipe`](Self::pipe).
#[derive(Debug, Clone)]
pub struct InstructionBuilder {
    name: String,
    stack_consumers: Vec<StackOperand>,
    code_consumers: Vec<CodeOperand>,
    producers: Vec<Production>,
    mutates_ip: bool,
}

impl InstructionBuilder {
    /// Pops a `ty` from `stack`. Declare consumers in push order.
    pub fn consumes(mut self, stack: StackId, ty: ValueType) -> Self {
        self.stack_consumers.push(StackOperand { stack, ty });
        self
    }

    pub fn produces(mut self, stack: StackId, ty: ValueType) -> Self {
        self.producers.push(Production::Value { stack, ty });
        self
    }

    /// Pushes every element of a returned list.
    pub fn produces_each(mut self, stack: StackId, ty: ValueType) -> Self {
        self.producers.push(Production::Each { stack, ty });
        self
    }

    /// Reads one `ty` operand from the bytecode.
    pub fn operand(mut self, ty: ValueType) -> Self {
        self.code_consumers.push(CodeOperand::Value(ty));
        self
    }

    /// Reads a `count` from the bytecode, then pops that many `element`s.
    pub fn iterable(mut self, count: ValueType, stack: StackId, element: ValueType) -> Self {
        self.code_consumers.push(CodeOperand::Iterable {
            count,
            stack,
            element,
        });
        self
    }

    /// Lets the callback return [`IpUpdate::Jump`].
    pub fn mutates_ip(mut self) -> Self {
        self.mutates_ip = true;
        self
    }

    pub fn callback<F>(self, callback: F) -> Instruction
    where
        F: Fn(&Operands) -> Result<Outcome, VMError> + Send + Sync + 'static,
    {
        self.finish(Behavior::Callback(Arc::new(callback)))
    }

    /// Forwards consumed values to the producers unchanged.
    pub fn pipe(self) -> Instruction {
        self.finish(Behavior::Pipe)
    }

    fn finish(self, behavior: Behavior) -> Instruction {
        Instruction {
            name: self.name,
            opcode: 0,
            stack_consumers: self.stack_consumers,
            code_consumers: self.code_consumers,
            producers: self.producers,
            mutates_ip: self.mutates_ip,
            behavior,
        }
    }
}

/// Immutable opcode table shared by the assembler, interpreter and disassembler.
pub struct InstructionTable {
    /// Always [`OPCODE_SLOTS`] entries; unassigned slots hold the sentinel.
    slots: Vec<Instruction>,
    defined: usize,
    names: HashMap<String, usize>,
    endianness: Endianness,
    representations: HashMap<ValueType, Representation>,
    stacks: BTreeMap<StackId, Vec<ValueType>>,
}

impl InstructionTable {
    pub fn builder() -> TableBuilder {
        TableBuilder::default()
    }

    /// Descriptor at `opcode`; the sentinel for unassigned slots.
    pub fn get(&self, opcode: u8) -> &Instruction {
        &self.slots[usize::from(opcode)]
    }

    /// Index of the instruction called `name`.
    pub fn opcode(&self, name: &str) -> Option<usize> {
        self.names.get(name).copied()
    }

    pub fn by_name(&self, name: &str) -> Option<&Instruction> {
        self.opcode(name).and_then(|index| self.slots.get(index))
    }

    /// Number of defined instructions.
    pub fn len(&self) -> usize {
        self.defined
    }

    pub fn is_empty(&self) -> bool {
        self.defined == 0
    }

    /// Defined instructions in opcode order.
    pub fn iter(&self) -> impl Iterator<Item = &Instruction> {
        self.slots[..self.defined].iter()
    }

    pub fn endianness(&self) -> Endianness {
        self.endianness
    }

    /// Encoding of `ty`: the per-type override, or its natural size in the
    /// table's default byte order.
    pub fn representation(&self, ty: ValueType) -> Representation {
        self.representations
            .get(&ty)
            .copied()
            .unwrap_or(Representation::natural(ty, self.endianness))
    }

    /// Declared stacks with the types each one holds.
    pub fn stacks(&self) -> impl Iterator<Item = (StackId, &[ValueType])> {
        self.stacks.iter().map(|(id, types)| (*id, types.as_slice()))
    }

    pub fn stack_types(&self, stack: StackId) -> Option<&[ValueType]> {
        self.stacks.get(&stack).map(Vec::as_slice)
    }
}

impl fmt::Debug for InstructionTable {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("InstructionTable")
            .field("instructions", &self.iter().collect::<Vec<_>>())
            .field("endianness", &self.endianness)
            .field("representations", &self.representations)
            .field("stacks", &self.stacks)
            .finish()
    }
}

/// Builder returned by [`InstructionTable::builder`].
#[derive(Default)]
pub struct TableBuilder {
    instructions: Vec<Instruction>,
    endianness: Endianness,
    representations: HashMap<ValueType, Representation>,
}

impl TableBuilder {
    /// Default byte order for types without an override.
    pub fn endianness(mut self, endianness: Endianness) -> Self {
        self.endianness = endianness;
        self
    }

    /// Overrides the encoding of one type.
    pub fn representation(mut self, ty: ValueType, representation: Representation) -> Self {
        self.representations.insert(ty, representation);
        self
    }

    /// Appends the next opcode.
    pub fn instruction(mut self, instruction: Instruction) -> Self {
        self.instructions.push(instruction);
        self
    }

    pub fn instructions(mut self, instructions: impl IntoIterator<Item = Instruction>) -> Self {
        self.instructions.extend(instructions);
        self
    }

    pub fn build(self) -> Result<InstructionTable, ConfigError> {
        let count = self.instructions.len();
        if count > OPCODE_SLOTS {
            return Err(ConfigError::TooManyInstructions { count });
        }

        for (&ty, representation) in &self.representations {
            if !representation.supports(ty) {
                return Err(ConfigError::UnsupportedWidth {
                    ty,
                    width: representation.width,
                });
            }
        }

        let mut names = HashMap::with_capacity(count);
        for (index, instruction) in self.instructions.iter().enumerate() {
            let name = instruction.name();
            if name.is_empty() || name.chars().any(char::is_whitespace) {
                return Err(ConfigError::InvalidName {
                    opcode: index,
                    name: name.to_string(),
                });
            }
            if names.insert(name.to_string(), index).is_some() {
                return Err(ConfigError::DuplicateName {
                    name: name.to_string(),
                });
            }
        }

        let stacks = stack_universes(&self.instructions);
        for instruction in &self.instructions {
            check_consumers(instruction, &stacks)?;
            if instruction.is_pipe() {
                check_pipe(instruction)?;
            }
        }

        let mut slots: Vec<Instruction> = Vec::with_capacity(OPCODE_SLOTS);
        for (index, mut instruction) in self.instructions.into_iter().enumerate() {
            instruction.opcode = index as u8;
            slots.push(instruction);
        }
        for index in count..OPCODE_SLOTS {
            slots.push(Instruction::invalid(index as u8));
        }

        Ok(InstructionTable {
            slots,
            defined: count,
            names,
            endianness: self.endianness,
            representations: self.representations,
            stacks,
        })
    }
}

/// Types produced on each stack across the whole table.
fn stack_universes(instructions: &[Instruction]) -> BTreeMap<StackId, Vec<ValueType>> {
    let mut stacks: BTreeMap<StackId, Vec<ValueType>> = BTreeMap::new();
    for production in instructions.iter().flat_map(|i| i.producers.iter()) {
        let types = stacks.entry(production.stack()).or_default();
        if !types.contains(&production.ty()) {
            types.push(production.ty());
        }
    }
    for types in stacks.values_mut() {
        types.sort();
    }
    stacks
}

fn check_consumers(
    instruction: &Instruction,
    stacks: &BTreeMap<StackId, Vec<ValueType>>,
) -> Result<(), ConfigError> {
    let popped = instruction
        .stack_consumers
        .iter()
        .map(|c| (c.stack, c.ty))
        .chain(instruction.code_consumers.iter().filter_map(|c| match *c {
            CodeOperand::Iterable { stack, element, .. } => Some((stack, element)),
            CodeOperand::Value(_) => None,
        }));

    for (stack, ty) in popped {
        let producible = stacks.get(&stack).is_some_and(|types| types.contains(&ty));
        if !producible {
            return Err(ConfigError::UnproducibleConsumer {
                instruction: instruction.name.clone(),
                stack,
                ty,
            });
        }
    }

    for consumer in &instruction.code_consumers {
        if let CodeOperand::Iterable { count, .. } = *consumer
            && count.is_float()
        {
            return Err(ConfigError::NonIntegerCount {
                instruction: instruction.name.clone(),
                ty: count,
            });
        }
    }
    Ok(())
}

fn check_pipe(instruction: &Instruction) -> Result<(), ConfigError> {
    // a pipe without producers discards what it consumes
    if instruction.producers.is_empty() {
        return Ok(());
    }

    let forwarded = instruction.forwarded_shape();
    let mismatch = |detail: String| ConfigError::PipeMismatch {
        instruction: instruction.name.clone(),
        detail,
    };

    if forwarded.len() != instruction.producers.len() {
        return Err(mismatch(format!(
            "{} value(s) consumed, {} produced",
            forwarded.len(),
            instruction.producers.len()
        )));
    }
    for (position, ((is_list, ty), production)) in
        forwarded.iter().zip(&instruction.producers).enumerate()
    {
        let fits = match production {
            Production::Value { ty: out, .. } => !is_list && ty == out,
            Production::Each { ty: out, .. } => *is_list && ty == out,
        };
        if !fits {
            return Err(mismatch(format!(
                "value {position} of type {ty} does not match producer {production:?}"
            )));
        }
    }
    Ok(())
}
