//! Length-prefixed block framing.
//!
//! Every record, string block, and compressed entry in these formats sits
//! inside a block: a 4-byte little-endian header whose low 24 bits hold the
//! payload length and whose top byte carries per-block flags. The reader
//! trusts the declared length rather than the payload interpreter, which is
//! what makes unrecognized records skippable and corrupt files detectable.
//!
//! # Block header
//! ```text
//! [4 bytes, little-endian]
//!   bits  0..24  payload length
//!   bits 24..32  flags
//! [N bytes] payload
//! ```

use byteorder::{ByteOrder, LittleEndian};

use crate::ecad::context::Context;
use crate::ecad::types::error::{EcadError, Result};

/// Mask selecting the payload length from a raw block header.
pub const LENGTH_MASK: u32 = 0x00ff_ffff;

/// Returns the payload length encoded in a raw block header.
pub fn payload_len(raw_header: u32) -> usize {
    (raw_header & LENGTH_MASK) as usize
}

/// Returns the flag byte smuggled in the top byte of a raw block header.
pub fn header_flags(raw_header: u32) -> u8 {
    (raw_header >> 24) as u8
}

/// Cursor over a fully materialized byte stream.
///
/// All reads are bounds-checked against the underlying slice; a read past
/// the end fails with [`EcadError::Truncated`] rather than panicking.
#[derive(Debug)]
pub struct BlockReader<'a> {
    data: &'a [u8],
    pos: usize,
}

impl<'a> BlockReader<'a> {
    pub fn new(data: &'a [u8]) -> Self {
        Self { data, pos: 0 }
    }

    /// Current cursor position, in bytes from the start of the stream.
    pub fn position(&self) -> usize {
        self.pos
    }

    /// Number of bytes between the cursor and the end of the stream.
    pub fn remaining(&self) -> usize {
        self.data.len() - self.pos
    }

    /// Borrows `len` bytes at the cursor and advances past them.
    pub fn read_bytes(&mut self, len: usize) -> Result<&'a [u8]> {
        if len > self.remaining() {
            return Err(EcadError::Truncated {
                needed: len,
                remaining: self.remaining(),
            });
        }
        let bytes = &self.data[self.pos..self.pos + len];
        self.pos += len;
        Ok(bytes)
    }

    pub fn read_u8(&mut self) -> Result<u8> {
        Ok(self.read_bytes(1)?[0])
    }

    pub fn read_u16(&mut self) -> Result<u16> {
        Ok(LittleEndian::read_u16(self.read_bytes(2)?))
    }

    pub fn read_u32(&mut self) -> Result<u32> {
        Ok(LittleEndian::read_u32(self.read_bytes(4)?))
    }

    /// Reads one block, handing its payload to `interpret`.
    ///
    /// Equivalent to [`read_block_with`](Self::read_block_with) with an empty
    /// threshold of zero and a `Default`-producing empty fallback.
    pub fn read_block<T, F>(&mut self, ctx: &mut Context, interpret: F) -> Result<T>
    where
        T: Default,
        F: FnOnce(&mut BlockReader<'a>, &mut Context, u32) -> Result<T>,
    {
        self.read_block_with(ctx, 0, interpret, |_ctx| Ok(T::default()))
    }

    /// Reads one block, handing its payload to `interpret`.
    ///
    /// The 4-byte header is consumed and its low 24 bits taken as the payload
    /// length; `interpret` receives the raw, unmasked header value so it can
    /// inspect the flag byte. After `interpret` returns, the cursor is placed
    /// exactly at the end of the declared payload regardless of how many
    /// bytes were actually consumed, so partial reads are safe and forward
    /// progress is guaranteed.
    ///
    /// A payload length at or below `empty_threshold` skips `interpret` and
    /// invokes `on_empty` instead, without reading past the header.
    ///
    /// # Errors
    /// - [`EcadError::Truncated`] if the declared length extends past the
    ///   end of the stream; `interpret` is not run.
    /// - [`EcadError::StructuralOverrun`] if `interpret` consumed more bytes
    ///   than declared. The enclosing record must be abandoned.
    pub fn read_block_with<T, F, E>(
        &mut self,
        ctx: &mut Context,
        empty_threshold: usize,
        interpret: F,
        on_empty: E,
    ) -> Result<T>
    where
        F: FnOnce(&mut BlockReader<'a>, &mut Context, u32) -> Result<T>,
        E: FnOnce(&mut Context) -> Result<T>,
    {
        let raw_header = self.read_u32()?;
        let declared = payload_len(raw_header);
        if declared <= empty_threshold {
            return on_empty(ctx);
        }

        let start = self.pos;
        if declared > self.remaining() {
            return Err(EcadError::Truncated {
                needed: declared,
                remaining: self.remaining(),
            });
        }

        let result = interpret(self, ctx, raw_header)?;

        if self.pos > start + declared {
            return Err(EcadError::StructuralOverrun {
                path: ctx.path(),
                declared,
                consumed: self.pos - start,
            });
        }
        // Skip any unread payload bytes.
        self.pos = start + declared;
        Ok(result)
    }
}

/// Growable output buffer with block header backpatching.
#[derive(Debug, Default)]
pub struct BlockWriter {
    buf: Vec<u8>,
}

impl BlockWriter {
    pub fn new() -> Self {
        Self::default()
    }

    /// Current write position, in bytes from the start of the buffer.
    pub fn position(&self) -> usize {
        self.buf.len()
    }

    pub fn write_bytes(&mut self, bytes: &[u8]) {
        self.buf.extend_from_slice(bytes);
    }

    pub fn write_u8(&mut self, value: u8) {
        self.buf.push(value);
    }

    pub fn write_u16(&mut self, value: u16) {
        let mut bytes = [0u8; 2];
        LittleEndian::write_u16(&mut bytes, value);
        self.buf.extend_from_slice(&bytes);
    }

    pub fn write_u32(&mut self, value: u32) {
        let mut bytes = [0u8; 4];
        LittleEndian::write_u32(&mut bytes, value);
        self.buf.extend_from_slice(&bytes);
    }

    /// Writes one block with a zero flag byte.
    pub fn write_block<F>(&mut self, serialize: F) -> Result<()>
    where
        F: FnOnce(&mut BlockWriter) -> Result<()>,
    {
        self.write_block_flags(0, serialize)
    }

    /// Writes one block: reserves the 4-byte header, runs `serialize` into
    /// the buffer, then backpatches `(flags << 24) | length` over the
    /// reservation.
    ///
    /// # Errors
    /// [`EcadError::BlockTooLarge`] if the serialized payload does not fit
    /// the 24-bit length field.
    pub fn write_block_flags<F>(&mut self, flags: u8, serialize: F) -> Result<()>
    where
        F: FnOnce(&mut BlockWriter) -> Result<()>,
    {
        let header_at = self.buf.len();
        self.buf.extend_from_slice(&[0u8; 4]);

        serialize(self)?;

        let length = self.buf.len() - header_at - 4;
        if length > LENGTH_MASK as usize {
            return Err(EcadError::BlockTooLarge(length));
        }
        let header = ((flags as u32) << 24) | length as u32;
        LittleEndian::write_u32(&mut self.buf[header_at..header_at + 4], header);
        Ok(())
    }

    /// Consumes the writer, returning the accumulated bytes.
    pub fn into_inner(self) -> Vec<u8> {
        self.buf
    }

    pub fn as_bytes(&self) -> &[u8] {
        &self.buf
    }
}
