//! Program chunks and the bounds-checked instruction pointer walking them.
//!
//! A [`Program`] is a flat byte buffer: each instruction is one opcode byte
//! followed by its bytecode operands. There is no header or metadata.

use crate::virtual_machine::errors::VMError;
use std::fs;
use std::path::Path;

/// One program's bytecode.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct Program {
    bytes: Vec<u8>,
}

impl Program {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn from_bytes(bytes: impl Into<Vec<u8>>) -> Self {
        Self {
            bytes: bytes.into(),
        }
    }

    pub fn as_bytes(&self) -> &[u8] {
        &self.bytes
    }

    pub fn into_bytes(self) -> Vec<u8> {
        self.bytes
    }

    pub fn len(&self) -> usize {
        self.bytes.len()
    }

    pub fn is_empty(&self) -> bool {
        self.bytes.is_empty()
    }

    pub(crate) fn extend(&mut self, bytes: &[u8]) {
        self.bytes.extend_from_slice(bytes);
    }

    /// Reads a program file written by [`Program::save`].
    pub fn load(path: impl AsRef<Path>) -> Result<Self, VMError> {
        Ok(Self::from_bytes(fs::read(path)?))
    }

    pub fn save(&self, path: impl AsRef<Path>) -> Result<(), VMError> {
        fs::write(path, &self.bytes)?;
        Ok(())
    }
}

impl From<Vec<u8>> for Program {
    fn from(bytes: Vec<u8>) -> Self {
        Self { bytes }
    }
}

impl AsRef<[u8]> for Program {
    fn as_ref(&self) -> &[u8] {
        &self.bytes
    }
}

/// Cursor over a program chunk.
///
/// The pointer is rebased on every pass: offset 0 is the chunk's first byte and
/// `upper` the offset of its last byte (`None` for an empty chunk). Every read
/// is checked against `upper`; moving past it is allowed and simply means the
/// pointer left the chunk.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct InstructionPointer {
    offset: usize,
    upper: Option<usize>,
}

impl InstructionPointer {
    /// Pointer at the start of a chunk of `len` bytes.
    pub fn new(len: usize) -> Self {
        Self {
            offset: 0,
            upper: len.checked_sub(1),
        }
    }

    /// Moves back to the start of a chunk of `len` bytes.
    pub fn rebase(&mut self, len: usize) {
        *self = Self::new(len);
    }

    pub fn offset(&self) -> usize {
        self.offset
    }

    /// Offset of the chunk's last byte.
    pub fn upper(&self) -> Option<usize> {
        self.upper
    }

    /// Whether the pointer still designates a byte of the chunk.
    pub fn in_chunk(&self) -> bool {
        self.upper.is_some_and(|upper| self.offset <= upper)
    }

    /// Bytes left between the pointer and the end of the chunk.
    pub fn remaining(&self) -> usize {
        self.upper
            .map_or(0, |upper| (upper + 1).saturating_sub(self.offset))
    }

    pub fn advance(&mut self, delta: usize) -> Result<(), VMError> {
        self.offset = self.offset.checked_add(delta).ok_or(VMError::IpOverflow {
            ip: self.offset,
            delta,
        })?;
        Ok(())
    }

    pub fn retreat(&mut self, delta: usize) -> Result<(), VMError> {
        self.offset = self.offset.checked_sub(delta).ok_or(VMError::IpOverflow {
            ip: self.offset,
            delta,
        })?;
        Ok(())
    }

    /// Jumps to an absolute offset. Targets past the end are accepted.
    pub fn set(&mut self, offset: usize) {
        self.offset = offset;
    }

    /// Reads `count` bytes at the pointer and moves past them.
    pub fn read<'a>(&mut self, chunk: &'a [u8], count: usize) -> Result<&'a [u8], VMError> {
        let start = self.offset;
        let available = self.remaining().min(chunk.len().saturating_sub(start));
        let overflow = VMError::CodeOverflow {
            offset: start,
            requested: count,
            available,
        };
        if count > available {
            return Err(overflow);
        }

        let end = start.checked_add(count).ok_or(VMError::IpOverflow {
            ip: start,
            delta: count,
        })?;
        let slice = chunk.get(start..end).ok_or(overflow)?;
        self.offset = end;
        Ok(slice)
    }

    pub fn read_byte(&mut self, chunk: &[u8]) -> Result<u8, VMError> {
        let bytes = self.read(chunk, 1)?;
        Ok(bytes[0])
    }
}
