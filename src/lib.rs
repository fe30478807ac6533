//! # ecadlib
//!
//! A reader and writer for the OLE-hosted binary library and document
//! formats used by ECAD tools (PCB and schematic, both libraries and
//! documents). Covers block framing, parameter lists, compressed storage
//! entries, and record ownership trees.
//!
//! **Note:** Container I/O is abstracted behind [`Container`]; hook up a
//! compound-file implementation to read real files from disk.
pub mod ecad;

// Re-export the main types for convenience
pub use ecad::{
    Container, Context, DocumentReader, DocumentWriter, EcadError, MemoryContainer, ReadOptions,
    Result, Warning, WriteOptions,
    codec::parameters::{Parameter, ParameterCollection},
    types::models::{
        CompressedEntry, DocumentKind, Library, Record, RecordPayload, Section,
    },
};
