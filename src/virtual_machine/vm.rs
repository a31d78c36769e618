//! The machine facade: one instruction table, one codec and the stacks.
//!
//! Each pass (assemble, disassemble, interpret) returns a [`Pass`] carrying a
//! [`Status`](crate::virtual_machine::status::Status) and, on success, its
//! output. Failures never escape as panics.
//!
//! Stacks belong to the machine, not to a run: values left by one
//! [`Vm::interpret`] call are still there for the next one until
//! [`Vm::reset_stacks`].

use crate::debug;
use crate::virtual_machine::assembler::assemble;
use crate::virtual_machine::codec::{BytecodeCodec, NumericCodec};
use crate::virtual_machine::disassembler::disassemble;
use crate::virtual_machine::interpreter::Interpreter;
use crate::virtual_machine::isa::InstructionTable;
use crate::virtual_machine::program::Program;
use crate::virtual_machine::stack::{StackId, StackSet, ValueStack};
use crate::virtual_machine::status::{Pass, translate};
use crate::virtual_machine::value::Value;
use std::io::Read;
use std::sync::Arc;

pub struct Vm<C = NumericCodec> {
    table: Arc<InstructionTable>,
    codec: C,
    stacks: StackSet,
}

impl Vm {
    /// A machine using the default [`NumericCodec`].
    pub fn new(table: Arc<InstructionTable>) -> Self {
        Self::with_codec(table, NumericCodec)
    }
}

impl<C: BytecodeCodec> Vm<C> {
    /// A machine with a custom codec. Every stack the table declares starts
    /// out empty.
    pub fn with_codec(table: Arc<InstructionTable>, codec: C) -> Self {
        let stacks = StackSet::tagged(table.stacks());
        Self {
            table,
            codec,
            stacks,
        }
    }

    pub fn table(&self) -> &InstructionTable {
        &self.table
    }

    pub fn codec(&self) -> &C {
        &self.codec
    }

    pub fn assemble(&self, source: &str) -> Pass<Program> {
        let pass = translate(|| assemble(&self.table, &self.codec, source));
        if let Some(program) = pass.output() {
            debug!("assembled {} byte(s)", program.len());
        }
        logged("assemble", pass)
    }

    /// Reads the whole source from `reader`, then assembles it. Read failures
    /// end up as an unknown error.
    pub fn assemble_reader<R: Read>(&self, mut reader: R) -> Pass<Program> {
        let pass = translate(|| {
            let mut source = String::new();
            reader.read_to_string(&mut source)?;
            assemble(&self.table, &self.codec, &source)
        });
        logged("assemble", pass)
    }

    pub fn disassemble(&self, program: &Program) -> Pass<String> {
        let pass = translate(|| disassemble(&self.table, &self.codec, program.as_bytes()));
        logged("disassemble", pass)
    }

    /// Runs `program` from offset 0 against the machine's stacks.
    pub fn interpret(&mut self, program: &Program) -> Pass<()> {
        let table: &InstructionTable = &self.table;
        let codec = &self.codec;
        let stacks = &mut self.stacks;
        let pass = translate(|| Interpreter::new(table, codec, stacks).run(program.as_bytes()));
        logged("interpret", pass)
    }

    /// Contents of stack `id`, bottom first.
    pub fn stack(&self, id: StackId) -> Option<Vec<Value>> {
        self.stacks.get(id).map(|stack| stack.snapshot())
    }

    /// Installs a custom implementation for stack `id`, returning the one it
    /// replaces.
    pub fn replace_stack(
        &mut self,
        id: StackId,
        stack: Box<dyn ValueStack>,
    ) -> Option<Box<dyn ValueStack>> {
        self.stacks.replace(id, stack)
    }

    /// Empties every stack.
    pub fn reset_stacks(&mut self) {
        self.stacks.clear();
    }

    pub fn stack_ids(&self) -> Vec<StackId> {
        self.stacks.ids().collect()
    }
}

fn logged<T>(name: &str, pass: Pass<T>) -> Pass<T> {
    if let Some(err) = pass.error() {
        debug!("{name} failed with {}: {err}", pass.status());
    }
    pass
}
