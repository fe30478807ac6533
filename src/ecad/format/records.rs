//! Section record streams.
//!
//! A section's `Data` stream is a bare concatenation of blocks, one per
//! record, read until the stream is exhausted. The block's flag byte picks
//! the payload shape: zero means a NUL-terminated parameter list, anything
//! else is an opaque binary record preserved verbatim so unknown record
//! shapes survive a read/write cycle.

use encoding_rs::Encoding;
use log::trace;

use crate::ecad::codec::block::{BlockReader, BlockWriter, header_flags, payload_len};
use crate::ecad::codec::parameters::ParameterCollection;
use crate::ecad::context::Context;
use crate::ecad::types::error::Result;
use crate::ecad::types::models::{NO_OWNER, OWNER_INDEX_KEY, Record, RecordPayload};

/// Flag byte marking a parameter list record.
pub const PARAMETER_RECORD_FLAG: u8 = 0;

/// Reads one block whose payload is a NUL-terminated parameter list.
pub fn read_parameter_block(
    reader: &mut BlockReader<'_>,
    ctx: &mut Context,
    codepage: &'static Encoding,
) -> Result<ParameterCollection> {
    reader.read_block(ctx, |reader, _ctx, header| {
        let bytes = reader.read_bytes(payload_len(header))?;
        let bytes = &bytes[..bytes.len().saturating_sub(1)];
        Ok(ParameterCollection::parse(bytes, codepage))
    })
}

/// Writes one block holding a NUL-terminated parameter list.
pub fn write_parameter_block(
    writer: &mut BlockWriter,
    parameters: &ParameterCollection,
    codepage: &'static Encoding,
) -> Result<()> {
    writer.write_block(|writer| {
        writer.write_bytes(&parameters.serialize(codepage));
        writer.write_u8(0);
        Ok(())
    })
}

/// Reads one record block, dispatching on the header flag byte.
pub fn read_record(
    reader: &mut BlockReader<'_>,
    ctx: &mut Context,
    codepage: &'static Encoding,
) -> Result<Record> {
    reader.read_block(ctx, |reader, _ctx, header| {
        let flags = header_flags(header);
        let bytes = reader.read_bytes(payload_len(header))?;
        if flags == PARAMETER_RECORD_FLAG {
            let bytes = &bytes[..bytes.len().saturating_sub(1)];
            Ok(Record::from_parameters(ParameterCollection::parse(
                bytes, codepage,
            )))
        } else {
            Ok(Record::from_binary(flags, bytes.to_vec()))
        }
    })
}

/// Writes one record block.
///
/// `owner_index` is the emission-order owner position; for parameter
/// records it is stored (or stripped, for roots) in the serialized list.
/// Binary records carry no owner and are written back verbatim.
pub fn write_record(
    writer: &mut BlockWriter,
    record: &Record,
    owner_index: i32,
    codepage: &'static Encoding,
) -> Result<()> {
    match &record.payload {
        RecordPayload::Parameters(parameters) => {
            let mut parameters = parameters.clone();
            if owner_index == NO_OWNER {
                parameters.remove(OWNER_INDEX_KEY);
            } else {
                parameters.set_int(OWNER_INDEX_KEY, owner_index);
            }
            write_parameter_block(writer, &parameters, codepage)
        }
        RecordPayload::Binary { flags, bytes } => writer.write_block_flags(*flags, |writer| {
            writer.write_bytes(bytes);
            Ok(())
        }),
    }
}

/// Reads records off a section stream until it is exhausted.
pub fn read_record_stream(
    data: &[u8],
    ctx: &mut Context,
    codepage: &'static Encoding,
) -> Result<Vec<Record>> {
    let mut reader = BlockReader::new(data);
    let mut records = Vec::new();
    while reader.remaining() > 0 {
        ctx.push(format!("record {}", records.len()));
        let record = read_record(&mut reader, ctx, codepage);
        ctx.pop();
        records.push(record?);
    }
    trace!("record stream: {} records", records.len());
    Ok(records)
}
