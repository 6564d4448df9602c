//! [`BinaryInput`] implementations.
use {
    super::BinaryInput,
    crate::error::{deserialization_failure, Result},
};

/// In-memory reader over a borrowed byte slice.
pub struct SliceInput<'a> {
    cursor: &'a [u8],
}

impl<'a> SliceInput<'a> {
    pub fn new(bytes: &'a [u8]) -> Self {
        Self { cursor: bytes }
    }

    /// Bytes not yet consumed.
    #[inline]
    pub fn remaining(&self) -> usize {
        self.cursor.len()
    }

    #[inline]
    pub fn is_empty(&self) -> bool {
        self.cursor.is_empty()
    }
}

impl BinaryInput for SliceInput<'_> {
    #[inline]
    fn read_exact(&mut self, buf: &mut [u8]) -> Result<()> {
        let Some((src, rest)) = self.cursor.split_at_checked(buf.len()) else {
            return Err(end_of_input(buf.len(), self.cursor.len()));
        };
        buf.copy_from_slice(src);
        self.cursor = rest;
        Ok(())
    }
}

/// In-memory reader owning its buffer, used for buffered chunk bodies.
pub struct MemoryInput {
    buffer: Vec<u8>,
    pos: usize,
}

impl MemoryInput {
    pub fn new(buffer: Vec<u8>) -> Self {
        Self { buffer, pos: 0 }
    }

    #[inline]
    pub fn remaining(&self) -> usize {
        self.buffer.len() - self.pos
    }
}

impl BinaryInput for MemoryInput {
    #[inline]
    fn read_exact(&mut self, buf: &mut [u8]) -> Result<()> {
        let Some(src) = self.buffer[self.pos..].get(..buf.len()) else {
            return Err(end_of_input(buf.len(), self.remaining()));
        };
        buf.copy_from_slice(src);
        self.pos += buf.len();
        Ok(())
    }
}

#[cold]
fn end_of_input(needed: usize, remaining: usize) -> crate::error::Error {
    deserialization_failure(
        format!("unexpected end of input: needed {needed} bytes, {remaining} remaining"),
        None,
    )
}
