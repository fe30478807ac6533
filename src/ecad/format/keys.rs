//! Section name aliasing.
//!
//! Compound container storage names are capped at 31 characters and cannot
//! contain the path separator, but section names (component footprints,
//! symbol names) routinely exceed both. The `SectionKeys` stream maps each
//! offending name to a short generated storage key; names that fit are
//! stored under themselves and never appear in the table. A name matching
//! one of the bookkeeping streams (`Storage`, `FileHeader`, ...) is aliased
//! as well, so a section can never shadow a shared stream.

use crate::ecad::codec::parameters::ParameterCollection;
use crate::ecad::types::models::{
    KEY_COUNT_KEY, LIB_REF_PREFIX, RESERVED_STREAMS, SECTION_KEY_PREFIX,
};

/// Longest name a container storage can carry directly.
pub const MAX_SECTION_KEY_LEN: usize = 31;

const GENERATED_STEM_LEN: usize = 24;

/// The long-name to storage-key alias table.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct SectionKeys {
    entries: Vec<(String, String)>,
}

impl SectionKeys {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn len(&self) -> usize {
        self.entries.len()
    }

    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }

    /// Resolves a storage key back to its long section name. Keys without
    /// an alias entry are their own name.
    pub fn ref_for_key<'a>(&'a self, key: &'a str) -> &'a str {
        self.entries
            .iter()
            .find(|(_, k)| k.eq_ignore_ascii_case(key))
            .map(|(lib_ref, _)| lib_ref.as_str())
            .unwrap_or(key)
    }

    /// Resolves a long section name to its storage key. Names without an
    /// alias entry are their own key.
    pub fn key_for_ref<'a>(&'a self, lib_ref: &'a str) -> &'a str {
        self.entries
            .iter()
            .find(|(r, _)| r.eq_ignore_ascii_case(lib_ref))
            .map(|(_, key)| key.as_str())
            .unwrap_or(lib_ref)
    }

    /// Returns the storage key for a section name, generating and recording
    /// an alias if the name cannot be used as a storage name directly.
    pub fn assign(&mut self, lib_ref: &str) -> String {
        if let Some((_, key)) = self
            .entries
            .iter()
            .find(|(r, _)| r.eq_ignore_ascii_case(lib_ref))
        {
            return key.clone();
        }
        let reserved = RESERVED_STREAMS
            .iter()
            .any(|r| r.eq_ignore_ascii_case(lib_ref));
        if !reserved && lib_ref.chars().count() <= MAX_SECTION_KEY_LEN && !lib_ref.contains('/') {
            return lib_ref.to_owned();
        }
        let key = self.generate_key(lib_ref);
        self.entries.push((lib_ref.to_owned(), key.clone()));
        key
    }

    /// Builds a short unique key from the name's leading characters.
    fn generate_key(&self, lib_ref: &str) -> String {
        let stem: String = lib_ref
            .chars()
            .filter(|&c| c != '/')
            .take(GENERATED_STEM_LEN)
            .collect();
        let mut counter = 1u32;
        loop {
            let candidate = format!("{stem}~{counter}");
            let taken = self
                .entries
                .iter()
                .any(|(_, k)| k.eq_ignore_ascii_case(&candidate));
            if !taken {
                return candidate;
            }
            counter += 1;
        }
    }

    /// Decodes the table from its `SectionKeys` stream parameter list.
    pub fn from_parameters(parameters: &ParameterCollection) -> Self {
        let declared = parameters.get_int_or(KEY_COUNT_KEY, 0).max(0) as usize;
        // An inflated count cannot scan past the parameters present.
        let count = declared.min(parameters.len());
        let mut entries = Vec::new();
        for i in 0..count {
            let lib_ref = parameters.get(&format!("{LIB_REF_PREFIX}{i}"));
            let key = parameters.get(&format!("{SECTION_KEY_PREFIX}{i}"));
            if let (Some(lib_ref), Some(key)) = (lib_ref, key) {
                entries.push((lib_ref.to_owned(), key.to_owned()));
            }
        }
        Self { entries }
    }

    /// Encodes the table as its `SectionKeys` stream parameter list.
    pub fn to_parameters(&self) -> ParameterCollection {
        let mut parameters = ParameterCollection::new();
        parameters.set_int(KEY_COUNT_KEY, self.entries.len() as i32);
        for (i, (lib_ref, key)) in self.entries.iter().enumerate() {
            parameters.set(&format!("{LIB_REF_PREFIX}{i}"), lib_ref.clone());
            parameters.set(&format!("{SECTION_KEY_PREFIX}{i}"), key.clone());
        }
        parameters
    }
}
