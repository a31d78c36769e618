//! Pluggable stack-based bytecode virtual machine.
//!
//! A machine is described by an [`isa::InstructionTable`]: up to 256
//! instructions, each declaring what it pops from which stack, what it reads
//! from the bytecode and what it pushes back. The same table drives the
//! assembler, the disassembler and the interpreter, so the three always agree
//! on the bytecode layout.
//!
//! # Bytecode
//!
//! A program is a flat byte string. Each instruction is one opcode byte (its
//! position in the table) followed by its bytecode operands, encoded by a
//! [`codec::BytecodeCodec`] with the width and byte order the table assigns to
//! each value type. There is no header and no alignment.
//!
//! # Modules
//!
//! - [`status`]: Outcome codes and the [`status::Pass`] wrapper returned by every pass
//! - [`errors`]: Error types and their status mapping
//! - [`value`]: Value types and typed values
//! - [`codec`]: Text and byte encoding of numbers
//! - [`stack`]: Typed value stacks
//! - [`program`]: Bytecode container and instruction pointer
//! - [`isa`]: Instruction descriptors and the opcode table
//! - [`assembler`]: Text to bytecode, with diagnostics
//! - [`disassembler`]: Bytecode to text
//! - [`interpreter`]: Execution loop
//! - [`vm`]: The [`vm::Vm`] facade tying it together

pub mod assembler;
pub mod codec;
pub mod disassembler;
pub mod errors;
mod interpreter;
pub mod isa;
pub mod program;
pub mod stack;
pub mod status;
pub mod value;
pub mod vm;
