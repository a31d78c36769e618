//! Bytecode execution.
//!
//! One step of the interpreter:
//! 1. read the opcode byte and look up its descriptor,
//! 2. read the bytecode operands; an iterable operand reads its count, then
//!    pops that many elements,
//! 3. pop the stack consumers, last declared first,
//! 4. call the instruction,
//! 5. move the instruction pointer if the instruction asked for a jump,
//! 6. push the produced values in declared order.
//!
//! Execution stops successfully as soon as the pointer leaves the chunk, and
//! stops on the first error otherwise.

use crate::trace;
use crate::virtual_machine::codec::BytecodeCodec;
use crate::virtual_machine::errors::VMError;
use crate::virtual_machine::isa::{
    CodeOperand, Instruction, InstructionTable, IpUpdate, Operands, Production,
};
use crate::virtual_machine::program::InstructionPointer;
use crate::virtual_machine::stack::StackSet;
use crate::virtual_machine::value::{Operand, Value, ValueType};

/// Runs programs against a set of stacks.
pub(crate) struct Interpreter<'a, C: ?Sized> {
    table: &'a InstructionTable,
    codec: &'a C,
    stacks: &'a mut StackSet,
}

impl<'a, C> Interpreter<'a, C>
where
    C: BytecodeCodec + ?Sized,
{
    pub(crate) fn new(table: &'a InstructionTable, codec: &'a C, stacks: &'a mut StackSet) -> Self {
        Self {
            table,
            codec,
            stacks,
        }
    }

    /// Executes `chunk` from its first byte until the pointer leaves it.
    pub(crate) fn run(&mut self, chunk: &[u8]) -> Result<(), VMError> {
        let mut ip = InstructionPointer::new(chunk.len());
        while ip.in_chunk() {
            self.step(chunk, &mut ip)?;
        }
        Ok(())
    }

    fn step(&mut self, chunk: &[u8], ip: &mut InstructionPointer) -> Result<(), VMError> {
        let start = ip.offset();
        let opcode = ip.read_byte(chunk)?;
        let table = self.table;
        let instruction = table.get(opcode);
        trace!("exec {start:#06x}: {} ({opcode:#04x})", instruction.name());

        let code = self.read_code_operands(instruction, chunk, ip)?;
        let stack = self.pop_stack_operands(instruction)?;
        let operands = Operands { stack, code };

        let outcome = instruction.invoke(&operands)?;

        match outcome.ip {
            IpUpdate::Advance => {}
            IpUpdate::Jump(target) if instruction.mutates_ip() => {
                trace!("ip {start:#06x} -> {target:#06x}");
                ip.set(target);
            }
            IpUpdate::Jump(_) => {
                return Err(VMError::UnexpectedJump {
                    instruction: instruction.name().to_string(),
                });
            }
        }

        check_productions(instruction, &outcome.values)?;
        self.push_productions(instruction, outcome.values)
    }

    fn read_value(
        &self,
        chunk: &[u8],
        ip: &mut InstructionPointer,
        ty: ValueType,
    ) -> Result<Value, VMError> {
        let representation = self.table.representation(ty);
        let bytes = ip.read(chunk, representation.width)?;
        self.codec.decode(ty, representation, bytes)
    }

    fn read_code_operands(
        &mut self,
        instruction: &Instruction,
        chunk: &[u8],
        ip: &mut InstructionPointer,
    ) -> Result<Vec<Operand>, VMError> {
        let mut code = Vec::with_capacity(instruction.code_consumers().len());

        for consumer in instruction.code_consumers() {
            match *consumer {
                CodeOperand::Value(ty) => {
                    code.push(Operand::Scalar(self.read_value(chunk, ip, ty)?));
                }
                CodeOperand::Iterable {
                    count,
                    stack,
                    element,
                } => {
                    let raw = self.read_value(chunk, ip, count)?;
                    let count = raw
                        .as_i128()
                        .and_then(|n| usize::try_from(n).ok())
                        .ok_or_else(|| VMError::InvalidCount {
                            count: raw.to_string(),
                        })?;

                    let stack = self.stacks.get_mut(stack)?;
                    let mut list = Vec::with_capacity(count.min(stack.len()));
                    for _ in 0..count {
                        list.push(stack.pop(element)?);
                    }
                    trace!("popped {} element(s) for {}", list.len(), instruction.name());
                    code.push(Operand::List(list));
                }
            }
        }

        Ok(code)
    }

    /// Pops stack consumers, last declared first, and returns them in
    /// declaration order.
    fn pop_stack_operands(&mut self, instruction: &Instruction) -> Result<Vec<Value>, VMError> {
        let mut values = Vec::with_capacity(instruction.stack_consumers().len());
        for consumer in instruction.stack_consumers().iter().rev() {
            values.push(self.stacks.get_mut(consumer.stack)?.pop(consumer.ty)?);
        }
        values.reverse();
        Ok(values)
    }

    fn push_productions(
        &mut self,
        instruction: &Instruction,
        values: Vec<Operand>,
    ) -> Result<(), VMError> {
        for (production, operand) in instruction.producers().iter().zip(values) {
            let stack = self.stacks.get_mut(production.stack())?;
            match operand {
                Operand::Scalar(value) => stack.push(value)?,
                Operand::List(list) => {
                    for value in list {
                        stack.push(value)?;
                    }
                }
            }
        }
        Ok(())
    }
}

/// Checks callback results against the declared producers before anything is
/// pushed.
fn check_productions(instruction: &Instruction, values: &[Operand]) -> Result<(), VMError> {
    let mismatch = |detail: String| VMError::ProducerMismatch {
        instruction: instruction.name().to_string(),
        detail,
    };

    let producers = instruction.producers();
    if values.len() != producers.len() {
        return Err(mismatch(format!(
            "{} value(s) for {} producer(s)",
            values.len(),
            producers.len()
        )));
    }

    for (position, (production, operand)) in producers.iter().zip(values).enumerate() {
        let fits = match (production, operand) {
            (Production::Value { ty, .. }, Operand::Scalar(value)) => value.ty() == *ty,
            (Production::Each { ty, .. }, Operand::List(list)) => {
                list.iter().all(|value| value.ty() == *ty)
            }
            _ => false,
        };
        if !fits {
            return Err(mismatch(format!(
                "value {position} does not match {production:?}"
            )));
        }
    }
    Ok(())
}

#[cfg(test)]
mod tests;
