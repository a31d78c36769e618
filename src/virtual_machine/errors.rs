use crate::virtual_machine::stack::StackId;
use crate::virtual_machine::value::ValueType;
use stackvm_derive::{Error, ToStatus};

/// Errors raised while assembling, interpreting or disassembling a program.
///
/// Each variant maps onto exactly one [`Status`](super::status::Status) via
/// `#[status(...)]`.
#[derive(Debug, Error, ToStatus)]
pub enum VMError {
    /// Assembly line without an instruction name.
    #[error("no instruction name")]
    #[status(NoInstructionName)]
    EmptyLine,
    /// Unrecognized instruction mnemonic during assembly.
    #[error("unknown instruction '{name}'")]
    #[status(BadInstructionName)]
    UnknownInstruction { name: String },
    /// Instruction index does not fit in one opcode byte.
    #[error("instruction index {index} does not fit in an opcode")]
    #[status(InstructionOpcodeOverflow)]
    OpcodeOverflow { index: usize },
    /// Wrong number of operands for an instruction.
    #[error("{instruction} expects {expected} operand(s), got {actual}")]
    #[status(BadInstructionOperand)]
    OperandCount {
        instruction: String,
        expected: usize,
        actual: usize,
    },
    /// Operand text is not a number of the expected type.
    #[error("'{text}' is not a valid {ty}")]
    #[status(BadInstructionOperand)]
    MalformedNumber { text: String, ty: ValueType },
    /// Operand text does not fit the type or its encoded width.
    #[error("'{text}' does not fit a {ty} encoded on {width} byte(s)")]
    #[status(BadInstructionOperand)]
    NumberOutOfRange {
        text: String,
        ty: ValueType,
        width: usize,
    },
    /// Decoded bytes hold a value outside the declared type.
    #[error("decoded value {value} does not fit a {ty}")]
    #[status(BadInstructionOperand)]
    DecodedOutOfRange { value: i128, ty: ValueType },
    /// Decoded double is finite but beyond the range of the declared float type.
    #[error("decoded value {value} does not fit a {ty}")]
    #[status(BadInstructionOperand)]
    DecodedFloatOutOfRange { value: f64, ty: ValueType },
    /// Iterable count operand is negative or does not fit in memory.
    #[error("invalid element count {count}")]
    #[status(BadInstructionOperand)]
    InvalidCount { count: String },
    /// Unknown opcode encountered in bytecode.
    #[error("invalid opcode {opcode:#04x}")]
    #[status(InvalidInstructionOpcode)]
    InvalidOpcode { opcode: u8 },
    /// Read past the end of the program chunk.
    #[error("reading {requested} byte(s) at offset {offset} overflows the code ({available} left)")]
    #[status(CodeOverflow)]
    CodeOverflow {
        offset: usize,
        requested: usize,
        available: usize,
    },
    /// Instruction pointer arithmetic overflowed.
    #[error("instruction pointer {ip} cannot move by {delta}")]
    #[status(CodeOverflow)]
    IpOverflow { ip: usize, delta: usize },
    #[error("pop of {ty} from empty {stack}")]
    #[status(PopEmptyStack)]
    PopEmptyStack { stack: StackId, ty: ValueType },
    /// Popped value has another type than the one requested.
    #[error("{stack} holds a {actual} where a {expected} was expected")]
    #[status(InternalError)]
    TypeMismatch {
        stack: StackId,
        expected: ValueType,
        actual: ValueType,
    },
    /// Pushed value is outside the stack's type universe.
    #[error("{stack} does not hold {ty} values")]
    #[status(InternalError)]
    UnsupportedType { stack: StackId, ty: ValueType },
    #[error("no {stack} in this vm")]
    #[status(InternalError)]
    UnknownStack { stack: StackId },
    /// A callback asked for a jump on an instruction that may not move the pointer.
    #[error("{instruction} is not allowed to modify the instruction pointer")]
    #[status(InternalError)]
    UnexpectedJump { instruction: String },
    /// Callback results do not match the declared producers.
    #[error("{instruction} produced values that do not match its producers: {detail}")]
    #[status(InternalError)]
    ProducerMismatch { instruction: String, detail: String },
    /// Callback asked for an operand that is missing or has another type.
    #[error("{kind} operand {index} is not a {expected}")]
    #[status(InternalError)]
    OperandAccess {
        kind: &'static str,
        index: usize,
        expected: &'static str,
    },
    /// Failure reported by an instruction callback.
    #[error("instruction failed: {message}")]
    #[status(InternalError)]
    Callback { message: String },
    /// File I/O error while loading or saving programs.
    #[error("io error: {0}")]
    #[status(UnknownError)]
    Io(String),
    /// Panic caught at the pass boundary.
    #[error("panic: {message}")]
    #[status(UnknownError)]
    Panic { message: String },
    /// Assembly error with line and column context.
    #[error("line {line}, column {column}: {source}")]
    #[status(from = source)]
    Assembly {
        line: usize,
        column: usize,
        source: Box<VMError>,
    },
}

impl VMError {
    /// Shorthand for callback failures.
    pub fn callback(message: impl Into<String>) -> Self {
        VMError::Callback {
            message: message.into(),
        }
    }

    /// Strips assembly location context.
    pub fn root(&self) -> &VMError {
        match self {
            VMError::Assembly { source, .. } => source.root(),
            other => other,
        }
    }
}

impl From<std::io::Error> for VMError {
    fn from(err: std::io::Error) -> Self {
        VMError::Io(err.to_string())
    }
}

/// Errors detected once, while an instruction table is built.
#[derive(Debug, Error)]
pub enum ConfigError {
    #[error("{count} instructions declared, at most 256 fit in an opcode byte")]
    TooManyInstructions { count: usize },
    /// Names must be non-empty single tokens.
    #[error("instruction {opcode} has an invalid name '{name}'")]
    InvalidName { opcode: usize, name: String },
    #[error("instruction name '{name}' is declared twice")]
    DuplicateName { name: String },
    /// Consumer type that no instruction ever produces on that stack.
    #[error("{instruction} consumes {ty} from {stack}, which no instruction produces there")]
    UnproducibleConsumer {
        instruction: String,
        stack: StackId,
        ty: ValueType,
    },
    /// Integer widths must lie in 1..=8, float widths must be 4 or 8.
    #[error("{ty} cannot be encoded on {width} byte(s)")]
    UnsupportedWidth { ty: ValueType, width: usize },
    /// Iterable count read from code must be an integer.
    #[error("{instruction} counts its elements with a {ty}, expected an integer type")]
    NonIntegerCount { instruction: String, ty: ValueType },
    /// Pipe instruction whose consumers do not line up with its producers.
    #[error("pipe {instruction} cannot forward its consumers: {detail}")]
    PipeMismatch { instruction: String, detail: String },
}
