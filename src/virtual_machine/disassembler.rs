//! Bytecode back to assembly text.

use crate::trace;
use crate::virtual_machine::codec::BytecodeCodec;
use crate::virtual_machine::errors::VMError;
use crate::virtual_machine::isa::InstructionTable;
use crate::virtual_machine::program::InstructionPointer;

/// Renders `chunk` one instruction per line, newline-terminated.
///
/// Operands are printed in the codec's canonical form, so assembling the output
/// gives back the same bytes.
pub fn disassemble<C>(table: &InstructionTable, codec: &C, chunk: &[u8]) -> Result<String, VMError>
where
    C: BytecodeCodec + ?Sized,
{
    let mut out = String::new();
    let mut ip = InstructionPointer::new(chunk.len());

    while ip.in_chunk() {
        let offset = ip.offset();
        let opcode = ip.read_byte(chunk)?;
        let instruction = table.get(opcode);
        if !instruction.is_defined() {
            return Err(VMError::InvalidOpcode { opcode });
        }
        trace!("dis {offset:#06x}: {} ({opcode:#04x})", instruction.name());

        out.push_str(instruction.name());
        for consumer in instruction.code_consumers() {
            let ty = consumer.encoded_type();
            let representation = table.representation(ty);
            let bytes = ip.read(chunk, representation.width)?;
            let value = codec.decode(ty, representation, bytes)?;
            out.push(' ');
            out.push_str(&codec.format(value));
        }
        out.push('\n');
    }

    Ok(out)
}
