//! Instruction tables shared by unit tests.
