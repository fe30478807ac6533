//! Document reading.
//!
//! [`DocumentReader`] walks a container and assembles a [`Library`]:
//!
//! 1. `FileHeader` names the document kind and lists the sections.
//! 2. `SectionKeys`, when present, maps long section names to the storage
//!    keys actually used in the container.
//! 3. Each section's `Data` stream is decoded into records and its
//!    ownership forest resolved.
//! 4. `Storage` and `WideStrings` round out the shared resources.
//!
//! Malformed but recognizable input degrades to warnings wherever a
//! best-effort result is still coherent; structural damage inside a
//! stream fails the read with the offending path in the error.

use std::sync::Arc;
use std::sync::atomic::{AtomicBool, Ordering};

use encoding_rs::Encoding;
use log::{debug, info};

use crate::ecad::codec::block::BlockReader;
use crate::ecad::codec::compressed::read_compressed_entry;
use crate::ecad::codec::parameters::{ParameterCollection, codepoints_to_text};
use crate::ecad::codec::strings::default_codepage;
use crate::ecad::context::{Context, Warning};
use crate::ecad::format::keys::SectionKeys;
use crate::ecad::format::ownership::build_ownership_tree;
use crate::ecad::format::records::{read_parameter_block, read_record_stream};
use crate::ecad::storage::Container;
use crate::ecad::types::error::{EcadError, Result};
use crate::ecad::types::models::{
    COUNT_KEY, CompressedEntry, DATA_STREAM, DocumentKind, ENCODED_TEXT_PREFIX, FILE_HEADER_STREAM,
    HEADER_KEY, Library, RESERVED_STREAMS, SECTION_COUNT_KEY, SECTION_KEYS_STREAM,
    SECTION_REF_PREFIX, STORAGE_HEADER, STORAGE_SECTION, Section, WEIGHT_KEY,
    WIDE_STRINGS_SECTION,
};

/// Knobs for a single read pass.
#[derive(Clone, Default)]
pub struct ReadOptions {
    /// Codepage for byte-oriented text. Defaults to the process-wide
    /// registered codepage.
    pub codepage: Option<&'static Encoding>,
    /// Cooperative cancellation flag, polled between sections.
    pub cancel: Option<Arc<AtomicBool>>,
}

/// Reads a [`Library`] out of a [`Container`].
pub struct DocumentReader<'a, C: Container> {
    container: &'a C,
    options: ReadOptions,
    ctx: Context,
}

impl<'a, C: Container> DocumentReader<'a, C> {
    pub fn new(container: &'a C) -> Self {
        Self::with_options(container, ReadOptions::default())
    }

    pub fn with_options(container: &'a C, options: ReadOptions) -> Self {
        Self {
            container,
            options,
            ctx: Context::new(),
        }
    }

    /// Warnings accumulated so far, including those from a failed read.
    pub fn warnings(&self) -> &[Warning] {
        self.ctx.warnings()
    }

    /// Reads the whole document.
    ///
    /// A reader can be reused; every call starts with a clean warning list.
    pub fn read(&mut self) -> Result<Library> {
        self.ctx.take_warnings();
        self.check_cancelled()?;
        let codepage = self.options.codepage.unwrap_or_else(default_codepage);

        let header = self.read_file_header(codepage)?;
        let header_text = header.get(HEADER_KEY).unwrap_or_default().to_owned();
        let known: Vec<&str> = DocumentKind::ALL.iter().map(|k| k.header()).collect();
        self.ctx
            .check_value("document header", header_text.as_str(), &known);
        let kind = DocumentKind::from_header(&header_text);

        let keys = self.read_section_keys(codepage)?;
        let mut sections = Vec::new();
        for name in self.section_names(&header, &keys)? {
            self.check_cancelled()?;
            let key = keys.key_for_ref(&name).to_owned();
            let path = format!("{key}/{DATA_STREAM}");
            if !self.container.has_stream(&path) {
                self.ctx
                    .warn(format!("section '{name}' has no record stream, skipping"));
                continue;
            }
            let data = self.container.read_stream(&path)?;

            self.ctx.push(name.clone());
            let result = read_record_stream(&data, &mut self.ctx, codepage);
            let result = result.map(|mut records| {
                let roots = build_ownership_tree(&mut records, &mut self.ctx);
                (records, roots)
            });
            self.ctx.pop();

            let (records, roots) = result?;
            debug!("section '{}': {} records", name, records.len());
            sections.push(Section {
                name,
                records,
                roots,
            });
        }

        self.check_cancelled()?;
        let storage = self.read_storage(codepage)?;
        self.check_cancelled()?;
        let wide_strings = self.read_wide_strings(codepage)?;

        info!(
            "document read: {} sections, {} storage entries, {} wide strings, {} warnings",
            sections.len(),
            storage.len(),
            wide_strings.len(),
            self.ctx.warnings().len()
        );
        Ok(Library {
            kind,
            header,
            sections,
            storage,
            wide_strings,
        })
    }

    fn read_file_header(&mut self, codepage: &'static Encoding) -> Result<ParameterCollection> {
        let data = self.container.read_stream(FILE_HEADER_STREAM)?;
        let mut reader = BlockReader::new(&data);
        self.ctx.push(FILE_HEADER_STREAM);
        let header = read_parameter_block(&mut reader, &mut self.ctx, codepage);
        self.ctx.pop();
        header
    }

    fn read_section_keys(&mut self, codepage: &'static Encoding) -> Result<SectionKeys> {
        if !self.container.has_stream(SECTION_KEYS_STREAM) {
            return Ok(SectionKeys::new());
        }
        let data = self.container.read_stream(SECTION_KEYS_STREAM)?;
        let mut reader = BlockReader::new(&data);
        self.ctx.push(SECTION_KEYS_STREAM);
        let parameters = read_parameter_block(&mut reader, &mut self.ctx, codepage);
        self.ctx.pop();
        Ok(SectionKeys::from_parameters(&parameters?))
    }

    /// Long section names, in directory order.
    ///
    /// Prefers the `SECTIONCOUNT`/`SECTIONREF{i}` directory in the header;
    /// a header without one falls back to enumerating container storages
    /// that carry a `Data` stream and are not reserved.
    fn section_names(
        &mut self,
        header: &ParameterCollection,
        keys: &SectionKeys,
    ) -> Result<Vec<String>> {
        if let Some(count) = header.get_int(SECTION_COUNT_KEY) {
            let mut names = Vec::new();
            for i in 0..count.max(0).min(header.len() as i32) {
                let key = format!("{SECTION_REF_PREFIX}{i}");
                match header.get(&key) {
                    Some(name) => names.push(name.to_owned()),
                    None => self.ctx.warn(format!("section directory is missing {key}")),
                }
            }
            return Ok(names);
        }

        debug!("no section directory in header, enumerating container");
        let mut names = Vec::new();
        for child in self.container.children("")? {
            let reserved = RESERVED_STREAMS
                .iter()
                .any(|r| r.eq_ignore_ascii_case(&child));
            if reserved || !self.container.has_stream(&format!("{child}/{DATA_STREAM}")) {
                continue;
            }
            names.push(keys.ref_for_key(&child).to_owned());
        }
        Ok(names)
    }

    fn read_storage(&mut self, codepage: &'static Encoding) -> Result<Vec<CompressedEntry>> {
        let path = format!("{STORAGE_SECTION}/{DATA_STREAM}");
        if !self.container.has_stream(&path) {
            return Ok(Vec::new());
        }
        let data = self.container.read_stream(&path)?;
        let mut reader = BlockReader::new(&data);

        self.ctx.push(STORAGE_SECTION);
        let result = self.read_storage_entries(&mut reader, codepage);
        self.ctx.pop();
        result
    }

    fn read_storage_entries(
        &mut self,
        reader: &mut BlockReader<'_>,
        codepage: &'static Encoding,
    ) -> Result<Vec<CompressedEntry>> {
        let header = read_parameter_block(reader, &mut self.ctx, codepage)?;
        self.ctx.assert_value(
            "storage header",
            header.get(HEADER_KEY).unwrap_or_default(),
            &[STORAGE_HEADER],
        )?;
        let weight = header.get_int_or(WEIGHT_KEY, 0);

        let mut entries = Vec::new();
        while reader.remaining() > 0 {
            self.ctx.push(format!("entry {}", entries.len()));
            let entry = read_compressed_entry(reader, &mut self.ctx, codepage);
            self.ctx.pop();
            entries.push(entry?);
        }
        self.ctx
            .check_value("storage WEIGHT", weight, &[entries.len() as i32]);
        Ok(entries)
    }

    fn read_wide_strings(&mut self, codepage: &'static Encoding) -> Result<Vec<String>> {
        let path = format!("{WIDE_STRINGS_SECTION}/{DATA_STREAM}");
        if !self.container.has_stream(&path) {
            return Ok(Vec::new());
        }
        let data = self.container.read_stream(&path)?;
        let mut reader = BlockReader::new(&data);

        self.ctx.push(WIDE_STRINGS_SECTION);
        let result = self.read_wide_string_entries(&mut reader, codepage);
        self.ctx.pop();
        result
    }

    fn read_wide_string_entries(
        &mut self,
        reader: &mut BlockReader<'_>,
        codepage: &'static Encoding,
    ) -> Result<Vec<String>> {
        let parameters = read_parameter_block(reader, &mut self.ctx, codepage)?;
        let declared = parameters.get_int_or(COUNT_KEY, 0).max(0) as usize;
        // An inflated count cannot scan past the parameters present.
        let count = declared.min(parameters.len());
        let mut strings = Vec::new();
        for i in 0..count {
            let key = format!("{ENCODED_TEXT_PREFIX}{i}");
            if !parameters.contains(&key) {
                self.ctx.warn(format!("wide string table is missing {key}"));
                strings.push(String::new());
                continue;
            }
            strings.push(codepoints_to_text(&parameters.get_int_list(&key)));
        }
        Ok(strings)
    }

    fn check_cancelled(&self) -> Result<()> {
        if let Some(cancel) = &self.options.cancel
            && cancel.load(Ordering::Relaxed)
        {
            return Err(EcadError::Cancelled);
        }
        Ok(())
    }
}
