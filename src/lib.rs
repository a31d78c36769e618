//! Stack-based bytecode virtual machine library.
//!
//! Provides a configurable instruction table, a numeric bytecode codec, an
//! assembler, a disassembler, an interpreter and ready-made instruction sets.

pub mod instruction_sets;
pub mod utils;
pub mod virtual_machine;
