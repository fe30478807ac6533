//! Document model and stream naming constants.
//!
//! A library file is a compound container holding one stream per section
//! plus a handful of well-known bookkeeping streams:
//!
//! ```text
//! <container root>
//! ├── FileHeader          document kind + section directory
//! ├── SectionKeys         long-name to storage-key aliases (optional)
//! ├── <key>/Data          record stream, one per section
//! ├── Storage/Data        compressed named entries (embedded images)
//! └── WideStrings/Data    codepoint-list string table
//! ```
//!
//! Records within a section form an ownership forest; the indices in
//! [`Record::children`] and [`Section::roots`] refer to positions in the
//! section's record vector.

use std::fmt;

use crate::ecad::codec::parameters::ParameterCollection;

/// Stream holding the document header and section directory.
pub const FILE_HEADER_STREAM: &str = "FileHeader";
/// Stream mapping long section names to container-safe storage keys.
pub const SECTION_KEYS_STREAM: &str = "SectionKeys";
/// Name of the record stream inside each section storage.
pub const DATA_STREAM: &str = "Data";
/// Storage holding compressed named entries.
pub const STORAGE_SECTION: &str = "Storage";
/// Storage holding the wide string table.
pub const WIDE_STRINGS_SECTION: &str = "WideStrings";

/// Expected header text of the compressed entry storage.
pub const STORAGE_HEADER: &str = "Icon storage";

/// Storages that never hold section record streams.
pub const RESERVED_STREAMS: [&str; 4] = [
    FILE_HEADER_STREAM,
    SECTION_KEYS_STREAM,
    STORAGE_SECTION,
    WIDE_STRINGS_SECTION,
];

pub const HEADER_KEY: &str = "HEADER";
pub const WEIGHT_KEY: &str = "WEIGHT";
pub const SECTION_COUNT_KEY: &str = "SECTIONCOUNT";
pub const SECTION_REF_PREFIX: &str = "SECTIONREF";
pub const RECORD_KEY: &str = "RECORD";
pub const OWNER_INDEX_KEY: &str = "OWNERINDEX";
pub const KEY_COUNT_KEY: &str = "KEYCOUNT";
pub const LIB_REF_PREFIX: &str = "LIBREF";
pub const SECTION_KEY_PREFIX: &str = "SECTIONKEY";
pub const COUNT_KEY: &str = "COUNT";
pub const ENCODED_TEXT_PREFIX: &str = "ENCODEDTEXT";

/// Owner index value marking a record with no owner.
pub const NO_OWNER: i32 = -1;

/// The document families sharing this container format.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum DocumentKind {
    FootprintLibrary,
    PcbDocument,
    SchematicLibrary,
    SchematicDocument,
}

impl DocumentKind {
    pub const ALL: [DocumentKind; 4] = [
        DocumentKind::FootprintLibrary,
        DocumentKind::PcbDocument,
        DocumentKind::SchematicLibrary,
        DocumentKind::SchematicDocument,
    ];

    /// The header string identifying this kind in the `FileHeader` stream.
    pub fn header(self) -> &'static str {
        match self {
            DocumentKind::FootprintLibrary => "PCB 6.0 Binary Library File",
            DocumentKind::PcbDocument => "PCB 6.0 Binary File",
            DocumentKind::SchematicLibrary => {
                "Protel for Windows - Schematic Library Editor Binary File Version 5.0"
            }
            DocumentKind::SchematicDocument => {
                "Protel for Windows - Schematic Capture Binary File Version 5.0"
            }
        }
    }

    /// Maps a `FileHeader` header string back to a document kind.
    pub fn from_header(header: &str) -> Option<Self> {
        Self::ALL.into_iter().find(|kind| kind.header() == header)
    }
}

impl fmt::Display for DocumentKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let name = match self {
            DocumentKind::FootprintLibrary => "footprint library",
            DocumentKind::PcbDocument => "PCB document",
            DocumentKind::SchematicLibrary => "schematic library",
            DocumentKind::SchematicDocument => "schematic document",
        };
        f.write_str(name)
    }
}

/// Payload of one record in a section stream.
#[derive(Debug, Clone, PartialEq)]
pub enum RecordPayload {
    /// A parameter list record (block flag byte zero).
    Parameters(ParameterCollection),
    /// Any other block, preserved verbatim with its flag byte.
    Binary { flags: u8, bytes: Vec<u8> },
}

/// One record in a section, with its resolved place in the ownership tree.
///
/// `children` and `parent` are derived from `owner_index` by
/// [`build_ownership_tree`](crate::ecad::format::ownership::build_ownership_tree);
/// they hold positions in the owning section's record vector.
#[derive(Debug, Clone, PartialEq)]
pub struct Record {
    pub payload: RecordPayload,
    pub owner_index: i32,
    pub children: Vec<usize>,
    pub parent: Option<usize>,
}

impl Record {
    pub fn from_parameters(parameters: ParameterCollection) -> Self {
        let owner_index = parameters.get_int_or(OWNER_INDEX_KEY, NO_OWNER);
        Self {
            payload: RecordPayload::Parameters(parameters),
            owner_index,
            children: Vec::new(),
            parent: None,
        }
    }

    pub fn from_binary(flags: u8, bytes: Vec<u8>) -> Self {
        Self {
            payload: RecordPayload::Binary { flags, bytes },
            owner_index: NO_OWNER,
            children: Vec::new(),
            parent: None,
        }
    }

    /// The parameter list, if this is a parameter record.
    pub fn parameters(&self) -> Option<&ParameterCollection> {
        match &self.payload {
            RecordPayload::Parameters(parameters) => Some(parameters),
            RecordPayload::Binary { .. } => None,
        }
    }

    pub fn parameters_mut(&mut self) -> Option<&mut ParameterCollection> {
        match &mut self.payload {
            RecordPayload::Parameters(parameters) => Some(parameters),
            RecordPayload::Binary { .. } => None,
        }
    }

    /// The `RECORD` type discriminator, if present.
    pub fn record_type(&self) -> Option<i32> {
        self.parameters().and_then(|p| p.get_int(RECORD_KEY))
    }
}

impl Default for Record {
    fn default() -> Self {
        Self::from_parameters(ParameterCollection::new())
    }
}

/// One named section and its record forest.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct Section {
    /// Long section name, after storage-key aliases are resolved.
    pub name: String,
    pub records: Vec<Record>,
    /// Positions of records with no owner, in stream order.
    pub roots: Vec<usize>,
}

impl Section {
    pub fn new(name: impl Into<String>) -> Self {
        Self {
            name: name.into(),
            records: Vec::new(),
            roots: Vec::new(),
        }
    }
}

/// One compressed named entry from the `Storage` stream.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct CompressedEntry {
    pub id: String,
    pub data: Vec<u8>,
}

/// A fully parsed library or document.
#[derive(Debug, Clone, Default)]
pub struct Library {
    /// Document kind recognized from the header, if any.
    pub kind: Option<DocumentKind>,
    /// The raw `FileHeader` parameter list, including unrecognized keys.
    pub header: ParameterCollection,
    pub sections: Vec<Section>,
    pub storage: Vec<CompressedEntry>,
    pub wide_strings: Vec<String>,
}

impl Library {
    pub fn new(kind: DocumentKind) -> Self {
        Self {
            kind: Some(kind),
            ..Self::default()
        }
    }

    /// Finds a section by its long name, case-insensitively.
    pub fn section(&self, name: &str) -> Option<&Section> {
        self.sections
            .iter()
            .find(|s| s.name.eq_ignore_ascii_case(name))
    }
}
