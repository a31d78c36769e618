//! Closed status codes reported by every engine pass.
//!
//! Internal failures are [`VMError`]s; callers of the VM facade only ever see a
//! [`Pass`], which pairs one [`Status`] with the pass output. [`translate`] is the
//! single boundary where errors (and panics raised by callbacks or codecs) are
//! turned into statuses.

use crate::virtual_machine::errors::VMError;
use std::any::Any;
use std::fmt;
use std::panic::{self, AssertUnwindSafe};

/// Result code of an assemble, interpret or disassemble pass.
#[repr(u16)]
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum Status {
    Success = 0,
    /// A line of assembly holds no instruction name.
    NoInstructionName = 1,
    /// The instruction name is not part of the instruction table.
    BadInstructionName = 2,
    /// The instruction index does not fit in an opcode byte.
    InstructionOpcodeOverflow = 3,
    /// Wrong operand count, or an operand that cannot be encoded or decoded.
    BadInstructionOperand = 4,
    /// The opcode byte maps to no instruction.
    InvalidInstructionOpcode = 5,
    /// A read or a pointer update went past the program chunk.
    CodeOverflow = 6,
    PopEmptyStack = 7,
    InternalError = 8,
    UnknownError = 9,
}

impl Status {
    /// Every status, in code order.
    pub const ALL: [Status; 10] = [
        Status::Success,
        Status::NoInstructionName,
        Status::BadInstructionName,
        Status::InstructionOpcodeOverflow,
        Status::BadInstructionOperand,
        Status::InvalidInstructionOpcode,
        Status::CodeOverflow,
        Status::PopEmptyStack,
        Status::InternalError,
        Status::UnknownError,
    ];

    pub fn is_success(self) -> bool {
        self == Status::Success
    }

    /// Numeric code of the status, stable across releases.
    pub fn code(self) -> u16 {
        self as u16
    }

    pub fn name(self) -> &'static str {
        match self {
            Status::Success => "SUCCESS",
            Status::NoInstructionName => "NO_INSTR_NAME",
            Status::BadInstructionName => "BAD_INSTR_NAME",
            Status::InstructionOpcodeOverflow => "INSTR_OPCODE_OVERFLOW",
            Status::BadInstructionOperand => "BAD_INSTR_OPERAND",
            Status::InvalidInstructionOpcode => "INVALID_INSTR_OPCODE",
            Status::CodeOverflow => "CODE_OVERFLOW",
            Status::PopEmptyStack => "POP_EMPTY_STACK",
            Status::InternalError => "INTERNAL_ERROR",
            Status::UnknownError => "UNKNOWN_ERROR",
        }
    }
}

impl fmt::Display for Status {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.name())
    }
}

/// Maps a value onto the closed status set.
///
/// Implemented for [`VMError`] through `#[derive(ToStatus)]`.
pub trait ToStatus {
    fn status(&self) -> Status;
}

impl ToStatus for Status {
    fn status(&self) -> Status {
        *self
    }
}

impl<T: ToStatus + ?Sized> ToStatus for Box<T> {
    fn status(&self) -> Status {
        (**self).status()
    }
}

/// Outcome of one engine pass.
///
/// A pass either succeeds with its full output, or fails with a status and the
/// error that caused it. There is never partial output.
#[derive(Debug)]
pub struct Pass<T> {
    status: Status,
    output: Option<T>,
    error: Option<VMError>,
}

impl<T> Pass<T> {
    fn success(output: T) -> Self {
        Self {
            status: Status::Success,
            output: Some(output),
            error: None,
        }
    }

    fn failure(error: VMError) -> Self {
        Self {
            status: error.status(),
            output: None,
            error: Some(error),
        }
    }

    pub fn status(&self) -> Status {
        self.status
    }

    pub fn is_success(&self) -> bool {
        self.status.is_success()
    }

    /// The pass output, present only on success.
    pub fn output(&self) -> Option<&T> {
        self.output.as_ref()
    }

    /// The error behind a failed pass.
    pub fn error(&self) -> Option<&VMError> {
        self.error.as_ref()
    }

    pub fn into_output(self) -> Option<T> {
        self.output
    }

    /// Converts back into a `Result`, for callers that prefer `?`.
    pub fn into_result(self) -> Result<T, VMError> {
        match (self.output, self.error) {
            (Some(output), _) => Ok(output),
            (None, Some(error)) => Err(error),
            (None, None) => Err(VMError::Panic {
                message: "pass finished without output".to_string(),
            }),
        }
    }
}

/// Runs a pass and funnels every failure into a status.
///
/// `Ok` maps to [`Status::Success`], `Err(e)` to `e.status()`, and a panic to
/// [`Status::UnknownError`].
pub fn translate<T>(pass: impl FnOnce() -> Result<T, VMError>) -> Pass<T> {
    match panic::catch_unwind(AssertUnwindSafe(pass)) {
        Ok(Ok(output)) => Pass::success(output),
        Ok(Err(error)) => Pass::failure(error),
        Err(payload) => Pass::failure(VMError::Panic {
            message: panic_message(payload.as_ref()),
        }),
    }
}

fn panic_message(payload: &(dyn Any + Send)) -> String {
    if let Some(message) = payload.downcast_ref::<&str>() {
        message.to_string()
    } else if let Some(message) = payload.downcast_ref::<String>() {
        message.clone()
    } else {
        "unknown panic payload".to_string()
    }
}
