//! Document writing.
//!
//! [`DocumentWriter`] is the inverse of the reader: it renumbers each
//! section's ownership forest into emission order, serializes the record
//! streams, and rebuilds the bookkeeping streams (`FileHeader` directory,
//! `SectionKeys` aliases, `Storage`, `WideStrings`) from the in-memory
//! model. Unrecognized header keys and binary records pass through
//! untouched, so a read/write cycle preserves what it does not understand.

use std::sync::Arc;
use std::sync::atomic::{AtomicBool, Ordering};

use encoding_rs::Encoding;
use log::{debug, info};

use crate::ecad::codec::block::BlockWriter;
use crate::ecad::codec::compressed::write_compressed_entry;
use crate::ecad::codec::parameters::{ParameterCollection, text_to_codepoints};
use crate::ecad::codec::strings::default_codepage;
use crate::ecad::context::{Context, Warning};
use crate::ecad::format::keys::SectionKeys;
use crate::ecad::format::ownership::assign_emission_indices;
use crate::ecad::format::records::{write_parameter_block, write_record};
use crate::ecad::storage::Container;
use crate::ecad::types::error::{EcadError, Result};
use crate::ecad::types::models::{
    COUNT_KEY, DATA_STREAM, ENCODED_TEXT_PREFIX, FILE_HEADER_STREAM, HEADER_KEY, Library,
    SECTION_COUNT_KEY, SECTION_KEYS_STREAM, SECTION_REF_PREFIX, STORAGE_HEADER, STORAGE_SECTION,
    Section, WEIGHT_KEY, WIDE_STRINGS_SECTION,
};

/// Knobs for a single write pass.
#[derive(Clone, Default)]
pub struct WriteOptions {
    /// Codepage for byte-oriented text. Defaults to the process-wide
    /// registered codepage.
    pub codepage: Option<&'static Encoding>,
    /// Cooperative cancellation flag, polled between sections.
    pub cancel: Option<Arc<AtomicBool>>,
}

/// Writes a [`Library`] into a [`Container`].
pub struct DocumentWriter<'a, C: Container> {
    container: &'a mut C,
    options: WriteOptions,
    ctx: Context,
}

impl<'a, C: Container> DocumentWriter<'a, C> {
    pub fn new(container: &'a mut C) -> Self {
        Self::with_options(container, WriteOptions::default())
    }

    pub fn with_options(container: &'a mut C, options: WriteOptions) -> Self {
        Self {
            container,
            options,
            ctx: Context::new(),
        }
    }

    /// Warnings accumulated so far, including those from a failed write.
    pub fn warnings(&self) -> &[Warning] {
        self.ctx.warnings()
    }

    /// Writes the whole document.
    ///
    /// A writer can be reused; every call starts with a clean warning list.
    pub fn write(&mut self, library: &Library) -> Result<()> {
        self.ctx.take_warnings();
        self.check_cancelled()?;
        let codepage = self.options.codepage.unwrap_or_else(default_codepage);

        let mut keys = SectionKeys::new();
        let section_keys: Vec<String> = library
            .sections
            .iter()
            .map(|s| keys.assign(&s.name))
            .collect();

        self.write_file_header(library, codepage)?;
        if !keys.is_empty() {
            let mut writer = BlockWriter::new();
            self.ctx.push(SECTION_KEYS_STREAM);
            let result = write_parameter_block(&mut writer, &keys.to_parameters(), codepage);
            self.ctx.pop();
            result?;
            self.container
                .write_stream(SECTION_KEYS_STREAM, &writer.into_inner())?;
        }

        for (section, key) in library.sections.iter().zip(&section_keys) {
            self.check_cancelled()?;
            self.write_section(section, key, codepage)?;
        }

        self.check_cancelled()?;
        self.write_storage(library, codepage)?;
        self.check_cancelled()?;
        self.write_wide_strings(library, codepage)?;

        info!(
            "document written: {} sections, {} storage entries, {} wide strings, {} warnings",
            library.sections.len(),
            library.storage.len(),
            library.wide_strings.len(),
            self.ctx.warnings().len()
        );
        Ok(())
    }

    fn write_file_header(&mut self, library: &Library, codepage: &'static Encoding) -> Result<()> {
        let mut header = library.header.clone();
        if let Some(kind) = library.kind {
            header.set(HEADER_KEY, kind.header());
        }
        header.set_int(SECTION_COUNT_KEY, library.sections.len() as i32);
        for (i, section) in library.sections.iter().enumerate() {
            header.set(&format!("{SECTION_REF_PREFIX}{i}"), section.name.clone());
        }
        // Drop directory entries left over from a larger section list.
        let mut stale = library.sections.len();
        while header
            .remove(&format!("{SECTION_REF_PREFIX}{stale}"))
            .is_some()
        {
            stale += 1;
        }

        let mut writer = BlockWriter::new();
        self.ctx.push(FILE_HEADER_STREAM);
        let result = write_parameter_block(&mut writer, &header, codepage);
        self.ctx.pop();
        result?;
        self.container
            .write_stream(FILE_HEADER_STREAM, &writer.into_inner())
    }

    fn write_section(
        &mut self,
        section: &Section,
        key: &str,
        codepage: &'static Encoding,
    ) -> Result<()> {
        let emissions = assign_emission_indices(&section.records, &section.roots, &mut self.ctx);
        if emissions.len() != section.records.len() {
            self.ctx.warn(format!(
                "section '{}' emits {} of {} records, the rest are unreachable from its roots",
                section.name,
                emissions.len(),
                section.records.len()
            ));
        }

        let mut writer = BlockWriter::new();
        self.ctx.push(section.name.clone());
        let mut result = Ok(());
        for emission in &emissions {
            result = write_record(
                &mut writer,
                &section.records[emission.record],
                emission.owner_index,
                codepage,
            );
            if result.is_err() {
                break;
            }
        }
        self.ctx.pop();
        result?;

        debug!("section '{}': {} records", section.name, emissions.len());
        self.container
            .write_stream(&format!("{key}/{DATA_STREAM}"), &writer.into_inner())
    }

    fn write_storage(&mut self, library: &Library, codepage: &'static Encoding) -> Result<()> {
        let mut header = ParameterCollection::new();
        header.set(HEADER_KEY, STORAGE_HEADER);
        header.set_int(WEIGHT_KEY, library.storage.len() as i32);

        let mut writer = BlockWriter::new();
        self.ctx.push(STORAGE_SECTION);
        let result = self.write_storage_entries(&mut writer, &header, library, codepage);
        self.ctx.pop();
        result?;
        self.container
            .write_stream(&format!("{STORAGE_SECTION}/{DATA_STREAM}"), &writer.into_inner())
    }

    fn write_storage_entries(
        &mut self,
        writer: &mut BlockWriter,
        header: &ParameterCollection,
        library: &Library,
        codepage: &'static Encoding,
    ) -> Result<()> {
        write_parameter_block(writer, header, codepage)?;
        for (i, entry) in library.storage.iter().enumerate() {
            self.ctx.push(format!("entry {i}"));
            let result = write_compressed_entry(writer, &entry.id, &entry.data, codepage);
            self.ctx.pop();
            result?;
        }
        Ok(())
    }

    fn write_wide_strings(&mut self, library: &Library, codepage: &'static Encoding) -> Result<()> {
        let mut parameters = ParameterCollection::new();
        parameters.set_int(COUNT_KEY, library.wide_strings.len() as i32);
        for (i, text) in library.wide_strings.iter().enumerate() {
            parameters.set_int_list(&format!("{ENCODED_TEXT_PREFIX}{i}"), &text_to_codepoints(text));
        }

        let mut writer = BlockWriter::new();
        self.ctx.push(WIDE_STRINGS_SECTION);
        let result = write_parameter_block(&mut writer, &parameters, codepage);
        self.ctx.pop();
        result?;
        self.container.write_stream(
            &format!("{WIDE_STRINGS_SECTION}/{DATA_STREAM}"),
            &writer.into_inner(),
        )
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
