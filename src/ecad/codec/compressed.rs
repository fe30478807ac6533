//! Compressed named entries, as found in the `Storage` stream.
//!
//! Each entry nests three layers:
//! ```text
//! [block, flag byte 0x01]
//!   [1 byte]  entry tag, always 0xD0
//!   [short string] entry id
//!   [block]   0x78 0x9C zlib header
//!             raw DEFLATE stream
//!             Adler-32 of the plain data, big-endian
//! ```
//!
//! The trailing checksum is written but deliberately not verified on read;
//! files patched by other tools routinely carry stale checksums over valid
//! streams, and the DEFLATE decoder already catches real corruption.

use std::io::Read;

use adler2::adler32_slice;
use flate2::Compression;
use flate2::read::DeflateDecoder;
use flate2::write::DeflateEncoder;
use log::trace;

use encoding_rs::Encoding;

use crate::ecad::codec::block::{BlockReader, BlockWriter, payload_len};
use crate::ecad::codec::strings::{read_short_string, write_short_string};
use crate::ecad::context::Context;
use crate::ecad::types::error::{EcadError, Result};
use crate::ecad::types::models::CompressedEntry;

/// Tag byte opening every compressed entry.
pub const COMPRESSED_ENTRY_TAG: u8 = 0xd0;
/// Flag byte carried in the outer block header of compressed entries.
pub const COMPRESSED_BLOCK_FLAG: u8 = 0x01;
/// zlib stream header: deflate, 32 KiB window, default compression level.
pub const ZLIB_HEADER: [u8; 2] = [0x78, 0x9c];

/// Reads one compressed entry from the cursor.
///
/// An empty outer block yields an empty entry. The inner zlib stream is
/// inflated immediately; its Adler-32 trailer is skipped without
/// verification.
///
/// # Errors
/// - [`EcadError::UnexpectedTag`] if the entry tag is not `0xD0`.
/// - [`EcadError::Decompression`] if the DEFLATE stream is invalid.
pub fn read_compressed_entry(
    reader: &mut BlockReader<'_>,
    ctx: &mut Context,
    codepage: &'static Encoding,
) -> Result<CompressedEntry> {
    reader.read_block(ctx, |reader, ctx, _header| {
        let tag = reader.read_u8()?;
        if tag != COMPRESSED_ENTRY_TAG {
            return Err(EcadError::UnexpectedTag {
                path: ctx.path(),
                expected: COMPRESSED_ENTRY_TAG,
                actual: tag,
            });
        }
        let id = read_short_string(reader, codepage)?;
        let data = reader.read_block(ctx, |reader, _ctx, header| {
            inflate(reader.read_bytes(payload_len(header))?)
        })?;
        trace!("compressed entry '{}': {} bytes inflated", id, data.len());
        Ok(CompressedEntry { id, data })
    })
}

/// Writes one compressed entry at the cursor.
///
/// # Errors
/// [`EcadError::StringTooLong`] if the id exceeds 255 encoded bytes;
/// [`EcadError::BlockTooLarge`] if the packed payload overflows a block.
pub fn write_compressed_entry(
    writer: &mut BlockWriter,
    id: &str,
    data: &[u8],
    codepage: &'static Encoding,
) -> Result<()> {
    let packed = deflate(data)?;
    writer.write_block_flags(COMPRESSED_BLOCK_FLAG, |writer| {
        writer.write_u8(COMPRESSED_ENTRY_TAG);
        write_short_string(writer, id, codepage)?;
        writer.write_block(|writer| {
            writer.write_bytes(&packed);
            Ok(())
        })
    })
}

/// Inflates a zlib stream: 2-byte header, raw DEFLATE, Adler-32 trailer.
fn inflate(stream: &[u8]) -> Result<Vec<u8>> {
    if stream.len() < ZLIB_HEADER.len() {
        return Err(EcadError::Decompression(format!(
            "zlib stream of {} bytes is too short for its header",
            stream.len()
        )));
    }
    let mut data = Vec::new();
    DeflateDecoder::new(&stream[ZLIB_HEADER.len()..])
        .read_to_end(&mut data)
        .map_err(|e| EcadError::Decompression(e.to_string()))?;
    Ok(data)
}

/// Deflates plain data into a zlib stream with checksum trailer.
fn deflate(data: &[u8]) -> Result<Vec<u8>> {
    use std::io::Write;

    let mut packed = Vec::from(ZLIB_HEADER);
    let mut encoder = DeflateEncoder::new(packed, Compression::default());
    encoder.write_all(data)?;
    packed = encoder.finish()?;
    packed.extend_from_slice(&adler32_slice(data).to_be_bytes());
    Ok(packed)
}
