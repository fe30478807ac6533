//! Text encodings used inside record payloads.
//!
//! Five shapes occur in the wild:
//! - raw: every payload byte decoded with the active codepage
//! - C-string: raw with a trailing NUL that is dropped unconditionally
//! - Pascal string: a block whose payload is a C-string
//! - Pascal short string: a 1-byte length prefix followed by raw text
//! - font name: a fixed 32-byte UTF-16LE field, zero-terminated
//!
//! Byte-oriented decoding goes through a process-wide default codepage,
//! registered once at startup; callers that juggle several documents with
//! different legacy encodings pass an explicit override instead.

use std::sync::OnceLock;

use encoding_rs::{Encoding, UTF_16LE, WINDOWS_1252};
use log::trace;

use crate::ecad::codec::block::{BlockReader, BlockWriter, payload_len};
use crate::ecad::context::Context;
use crate::ecad::types::error::{EcadError, Result};

/// Size of the fixed-width font name field, in bytes.
pub const FONT_NAME_BYTES: usize = 32;

static DEFAULT_CODEPAGE: OnceLock<&'static Encoding> = OnceLock::new();

/// Registers the process-wide default codepage for byte-oriented text.
///
/// Only the first registration wins; returns `false` if a default was
/// already set. Readers created without an explicit codepage use this one,
/// falling back to Windows-1252 if nothing was ever registered.
pub fn register_codepage(encoding: &'static Encoding) -> bool {
    let registered = DEFAULT_CODEPAGE.set(encoding).is_ok();
    if registered {
        trace!("default codepage registered: {}", encoding.name());
    }
    registered
}

/// Returns the process-wide default codepage.
pub fn default_codepage() -> &'static Encoding {
    DEFAULT_CODEPAGE.get().copied().unwrap_or(WINDOWS_1252)
}

/// Decodes raw bytes with the given codepage.
pub fn decode_raw(bytes: &[u8], codepage: &'static Encoding) -> String {
    let (text, _, _) = codepage.decode(bytes);
    text.into_owned()
}

/// Decodes a C-string payload: the final byte is a terminator and is
/// dropped without inspection.
pub fn decode_cstring(bytes: &[u8], codepage: &'static Encoding) -> String {
    decode_raw(&bytes[..bytes.len().saturating_sub(1)], codepage)
}

/// Encodes text with the given codepage.
///
/// Characters outside the codepage are replaced with numeric character
/// references; lossless text goes through the dual-form parameter encoding
/// instead of this routine.
pub fn encode_text(text: &str, codepage: &'static Encoding) -> Vec<u8> {
    let (bytes, _, _) = codepage.encode(text);
    bytes.into_owned()
}

/// Reads a Pascal string: a block whose payload is a NUL-terminated string.
pub fn read_pascal_string(
    reader: &mut BlockReader<'_>,
    ctx: &mut Context,
    codepage: &'static Encoding,
) -> Result<String> {
    reader.read_block(ctx, |reader, _ctx, header| {
        let bytes = reader.read_bytes(payload_len(header))?;
        Ok(decode_cstring(bytes, codepage))
    })
}

/// Writes a Pascal string: a block containing the text and a NUL terminator.
pub fn write_pascal_string(
    writer: &mut BlockWriter,
    text: &str,
    codepage: &'static Encoding,
) -> Result<()> {
    writer.write_block(|writer| {
        writer.write_bytes(&encode_text(text, codepage));
        writer.write_u8(0);
        Ok(())
    })
}

/// Reads a Pascal short string: a 1-byte length prefix, then that many
/// bytes of text with no terminator.
pub fn read_short_string(
    reader: &mut BlockReader<'_>,
    codepage: &'static Encoding,
) -> Result<String> {
    let len = reader.read_u8()? as usize;
    let bytes = reader.read_bytes(len)?;
    Ok(decode_raw(bytes, codepage))
}

/// Writes a Pascal short string.
///
/// # Errors
/// [`EcadError::StringTooLong`] if the encoded text exceeds 255 bytes.
pub fn write_short_string(
    writer: &mut BlockWriter,
    text: &str,
    codepage: &'static Encoding,
) -> Result<()> {
    let bytes = encode_text(text, codepage);
    if bytes.len() > u8::MAX as usize {
        return Err(EcadError::StringTooLong(bytes.len()));
    }
    writer.write_u8(bytes.len() as u8);
    writer.write_bytes(&bytes);
    Ok(())
}

/// Reads a font name: a fixed 32-byte UTF-16LE field. Decoding stops at the
/// first NUL code unit; the cursor always advances the full 32 bytes.
pub fn read_font_name(reader: &mut BlockReader<'_>) -> Result<String> {
    let bytes = reader.read_bytes(FONT_NAME_BYTES)?;
    let end = bytes
        .chunks_exact(2)
        .position(|unit| unit == [0, 0])
        .map(|units| units * 2)
        .unwrap_or(FONT_NAME_BYTES);
    let (text, _, _) = UTF_16LE.decode(&bytes[..end]);
    Ok(text.into_owned())
}

/// Writes a font name into its fixed 32-byte field, truncating to 16
/// UTF-16 code units and zero-padding the remainder.
pub fn write_font_name(writer: &mut BlockWriter, name: &str) {
    let mut field = [0u8; FONT_NAME_BYTES];
    for (i, unit) in name.encode_utf16().take(FONT_NAME_BYTES / 2).enumerate() {
        field[i * 2..i * 2 + 2].copy_from_slice(&unit.to_le_bytes());
    }
    writer.write_bytes(&field);
}
