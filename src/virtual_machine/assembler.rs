//! Assembly text to bytecode.
//!
//! # Syntax
//!
//! ```text
//! name operand1 operand2 ...
//! ```
//!
//! - One instruction per line, tokens separated by whitespace
//! - The operand count must match the instruction's bytecode operands exactly
//! - Integers are decimal or `0x`-prefixed hexadecimal, floats are decimal
//! - No comments and no labels: jump targets are raw byte offsets
//!
//! Each line becomes its opcode byte followed by the encoded operands; the
//! program is the plain concatenation of all lines.

use crate::trace;
use crate::virtual_machine::codec::BytecodeCodec;
use crate::virtual_machine::errors::VMError;
use crate::virtual_machine::isa::InstructionTable;
use crate::virtual_machine::program::Program;
use std::fmt::Write;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
struct Token<'a> {
    text: &'a str,
    /// 1-based column in the line.
    column: usize,
}

/// Splits a line on whitespace.
fn tokenize(line: &str) -> Vec<Token<'_>> {
    let mut out = Vec::with_capacity(4);
    let mut start: Option<usize> = None;

    for (i, c) in line.char_indices() {
        match (c.is_whitespace(), start) {
            (true, Some(s)) => {
                out.push(Token {
                    text: &line[s..i],
                    column: s + 1,
                });
                start = None;
            }
            (false, None) => start = Some(i),
            _ => {}
        }
    }
    if let Some(s) = start {
        out.push(Token {
            text: &line[s..],
            column: s + 1,
        });
    }

    out
}

/// Assembles a whole program.
///
/// Errors are wrapped in [`VMError::Assembly`] with the 1-based line and column
/// of the offending token.
pub fn assemble<C>(table: &InstructionTable, codec: &C, source: &str) -> Result<Program, VMError>
where
    C: BytecodeCodec + ?Sized,
{
    let mut program = Program::new();

    for (index, line) in source.lines().enumerate() {
        let bytes =
            assemble_line(table, codec, line).map_err(|(column, err)| VMError::Assembly {
                line: index + 1,
                column,
                source: Box::new(err),
            })?;
        program.extend(&bytes);
    }

    Ok(program)
}

/// Assembles one line, failing with the column of the faulty token.
fn assemble_line<C>(
    table: &InstructionTable,
    codec: &C,
    line: &str,
) -> Result<Vec<u8>, (usize, VMError)>
where
    C: BytecodeCodec + ?Sized,
{
    let tokens = tokenize(line);
    let Some((name, operands)) = tokens.split_first() else {
        return Err((1, VMError::EmptyLine));
    };

    let index = table.opcode(name.text).ok_or_else(|| {
        (
            name.column,
            VMError::UnknownInstruction {
                name: name.text.to_string(),
            },
        )
    })?;
    let opcode = u8::try_from(index).map_err(|_| (name.column, VMError::OpcodeOverflow { index }))?;
    let instruction = table.get(opcode);

    let expected = instruction.code_consumers();
    if operands.len() != expected.len() {
        let column = operands.get(expected.len()).unwrap_or(name).column;
        return Err((
            column,
            VMError::OperandCount {
                instruction: instruction.name().to_string(),
                expected: expected.len(),
                actual: operands.len(),
            },
        ));
    }

    trace!(
        "asm {} ({opcode:#04x}) {:?}",
        instruction.name(),
        operands.iter().map(|t| t.text).collect::<Vec<_>>()
    );

    let mut bytes = vec![opcode];
    for (token, consumer) in operands.iter().zip(expected) {
        let ty = consumer.encoded_type();
        let encoded = codec
            .encode_text(ty, table.representation(ty), token.text)
            .map_err(|err| (token.column, err))?;
        bytes.extend_from_slice(&encoded);
    }
    Ok(bytes)
}

/// Formats a compiler-style diagnostic for an assembly failure.
///
/// ```text
/// error: 'x' is not a valid u32
///  --> prog.asm:2:6
///   |
///    2 | push x
///   |      ^
/// ```
pub fn render_diagnostic(file: &str, source: &str, err: &VMError) -> String {
    let mut diag = String::new();

    let VMError::Assembly {
        line,
        column,
        source: cause,
    } = err
    else {
        let _ = writeln!(diag, "error: {err}");
        return diag;
    };

    let _ = writeln!(diag, "error: {cause}");
    let _ = writeln!(diag, " --> {file}:{line}:{column}");
    if let Some(raw_line) = source.lines().nth(line.saturating_sub(1)) {
        let underline = " ".repeat(column.saturating_sub(1));
        let _ = writeln!(diag, "  |");
        let _ = writeln!(diag, "{:>4} | {}", line, raw_line);
        let _ = writeln!(diag, "  | {}^", underline);
    }
    diag
}
