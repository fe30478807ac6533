//! `KEY=VALUE` parameter lists.
//!
//! Most records in these formats are not binary structs but flat parameter
//! lists: entries separated by `|` (or a backtick at nesting level one),
//! each entry a `NAME=VALUE` pair. The micro-language has a few quirks this
//! module preserves exactly:
//! - a separator *precedes* every entry, so serialized text starts with one
//! - keys are compared case-insensitively, and a rewritten key keeps its
//!   original position in the list
//! - a `%UTF8%` prefix on the key marks the value as UTF-8 encoded; such
//!   entries are written twice, once degraded to the legacy codepage under
//!   the bare name and once lossless under the prefixed name, so old tools
//!   still see something readable
//! - values keep no type information; typed access is parse-on-read

use std::fmt;
use std::str::FromStr;

use encoding_rs::Encoding;

use crate::ecad::codec::strings::decode_raw;

/// Entry separator at nesting level zero.
pub const SEPARATOR: u8 = b'|';
/// Entry separator inside nested lists carried as level-zero values.
pub const NESTED_SEPARATOR: u8 = b'`';

const UTF8_MARKER: &[u8] = b"%UTF8%";

/// One `NAME=VALUE` entry.
#[derive(Debug, Clone, Default)]
pub struct Parameter {
    pub name: String,
    pub value: String,
    /// Whether the value round-trips as UTF-8 instead of the legacy codepage.
    pub utf8: bool,
}

impl PartialEq for Parameter {
    fn eq(&self, other: &Self) -> bool {
        self.name.eq_ignore_ascii_case(&other.name)
            && self.value == other.value
            && self.utf8 == other.utf8
    }
}

impl fmt::Display for Parameter {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}={}", self.name, self.value)
    }
}

/// An ordered list of parameters with case-insensitive keyed access.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct ParameterCollection {
    entries: Vec<Parameter>,
}

impl ParameterCollection {
    pub fn new() -> Self {
        Self::default()
    }

    /// Parses a level-zero parameter list (`|`-separated).
    pub fn parse(bytes: &[u8], codepage: &'static Encoding) -> Self {
        Self::parse_with_separator(bytes, SEPARATOR, codepage)
    }

    /// Parses a nested parameter list (backtick-separated).
    pub fn parse_nested(bytes: &[u8], codepage: &'static Encoding) -> Self {
        Self::parse_with_separator(bytes, NESTED_SEPARATOR, codepage)
    }

    fn parse_with_separator(bytes: &[u8], separator: u8, codepage: &'static Encoding) -> Self {
        let mut collection = Self::new();
        for entry in bytes.split(|&b| b == separator) {
            let entry = trim_crlf(entry);
            if entry.is_empty() {
                continue;
            }

            let (name_bytes, value_bytes) = match entry.iter().position(|&b| b == b'=') {
                Some(eq) => (&entry[..eq], &entry[eq + 1..]),
                None => (&entry[..0], entry),
            };

            let (name_bytes, utf8) = match strip_utf8_marker(name_bytes) {
                Some(stripped) => (stripped, true),
                None => (name_bytes, false),
            };

            let name = decode_raw(name_bytes, codepage);
            let value = if utf8 {
                String::from_utf8_lossy(value_bytes).into_owned()
            } else {
                decode_raw(value_bytes, codepage)
            };
            collection.add(name, value, utf8);
        }
        collection
    }

    /// Serializes as a level-zero list, with a separator before each entry.
    pub fn serialize(&self, codepage: &'static Encoding) -> Vec<u8> {
        self.serialize_with_separator(SEPARATOR, codepage)
    }

    /// Serializes as a nested list, with a backtick before each entry.
    pub fn serialize_nested(&self, codepage: &'static Encoding) -> Vec<u8> {
        self.serialize_with_separator(NESTED_SEPARATOR, codepage)
    }

    fn serialize_with_separator(&self, separator: u8, codepage: &'static Encoding) -> Vec<u8> {
        let mut out = Vec::new();
        for entry in &self.entries {
            if entry.utf8 {
                // Degraded copy first so legacy tools find the bare name.
                push_entry(&mut out, separator, &entry.name, &entry.value, codepage);
                out.push(separator);
                out.extend_from_slice(UTF8_MARKER);
                let (name, _, _) = codepage.encode(&entry.name);
                out.extend_from_slice(&name);
                out.push(b'=');
                out.extend_from_slice(entry.value.as_bytes());
            } else {
                push_entry(&mut out, separator, &entry.name, &entry.value, codepage);
            }
        }
        out
    }

    /// Appends or overwrites an entry.
    ///
    /// A named entry replaces the value of an existing entry with the same
    /// name (compared case-insensitively) in place; entries with an empty
    /// name are positional and always appended.
    pub fn add(&mut self, name: String, value: String, utf8: bool) {
        if !name.is_empty()
            && let Some(existing) = self.find_mut(&name)
        {
            existing.value = value;
            existing.utf8 = utf8;
            return;
        }
        self.entries.push(Parameter { name, value, utf8 });
    }

    fn find(&self, name: &str) -> Option<&Parameter> {
        self.entries
            .iter()
            .find(|p| p.name.eq_ignore_ascii_case(name))
    }

    fn find_mut(&mut self, name: &str) -> Option<&mut Parameter> {
        self.entries
            .iter_mut()
            .find(|p| p.name.eq_ignore_ascii_case(name))
    }

    /// Looks up a value by name, case-insensitively.
    pub fn get(&self, name: &str) -> Option<&str> {
        self.find(name).map(|p| p.value.as_str())
    }

    pub fn contains(&self, name: &str) -> bool {
        self.find(name).is_some()
    }

    pub fn len(&self) -> usize {
        self.entries.len()
    }

    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }

    pub fn iter(&self) -> impl Iterator<Item = &Parameter> {
        self.entries.iter()
    }

    /// Integer view of a value; unparseable or absent values read as `None`.
    pub fn get_int(&self, name: &str) -> Option<i32> {
        self.get(name).and_then(|v| v.trim().parse().ok())
    }

    pub fn get_int_or(&self, name: &str, default: i32) -> i32 {
        self.get_int(name).unwrap_or(default)
    }

    pub fn get_double(&self, name: &str) -> Option<f64> {
        self.get(name).and_then(|v| v.trim().parse().ok())
    }

    pub fn get_double_or(&self, name: &str, default: f64) -> f64 {
        self.get_double(name).unwrap_or(default)
    }

    /// Boolean view: `T` and `TRUE` (any case) are true, everything else
    /// including absence is false.
    pub fn get_bool(&self, name: &str) -> bool {
        self.get(name)
            .map(|v| v.eq_ignore_ascii_case("T") || v.eq_ignore_ascii_case("TRUE"))
            .unwrap_or(false)
    }

    /// Parses a value into any `FromStr` type, falling back to the type's
    /// default on absence or parse failure.
    pub fn get_enum<T: FromStr + Default>(&self, name: &str) -> T {
        self.get(name)
            .and_then(|v| v.trim().parse().ok())
            .unwrap_or_default()
    }

    /// Comma-separated integer list view. Unparseable elements are dropped.
    pub fn get_int_list(&self, name: &str) -> Vec<i32> {
        self.get(name)
            .map(|v| {
                v.split(',')
                    .filter_map(|part| part.trim().parse().ok())
                    .collect()
            })
            .unwrap_or_default()
    }

    pub fn set(&mut self, name: &str, value: impl Into<String>) {
        self.add(name.to_owned(), value.into(), false);
    }

    /// Sets a value that must survive round-tripping as UTF-8.
    pub fn set_utf8(&mut self, name: &str, value: impl Into<String>) {
        self.add(name.to_owned(), value.into(), true);
    }

    pub fn set_int(&mut self, name: &str, value: i32) {
        self.set(name, value.to_string());
    }

    pub fn set_double(&mut self, name: &str, value: f64) {
        self.set(name, value.to_string());
    }

    pub fn set_bool(&mut self, name: &str, value: bool) {
        self.set(name, if value { "T" } else { "F" });
    }

    pub fn set_int_list(&mut self, name: &str, values: &[i32]) {
        let text = values
            .iter()
            .map(|v| v.to_string())
            .collect::<Vec<_>>()
            .join(",");
        self.set(name, text);
    }

    /// Sets a value, or removes the entry entirely when the value is empty.
    pub fn set_or_omit(&mut self, name: &str, value: &str) {
        if value.is_empty() {
            self.remove(name);
        } else {
            self.set(name, value);
        }
    }

    /// Sets an integer, or removes the entry when it equals the format's
    /// default for that key.
    pub fn set_int_or_omit(&mut self, name: &str, value: i32, default: i32) {
        if value == default {
            self.remove(name);
        } else {
            self.set_int(name, value);
        }
    }

    pub fn set_double_or_omit(&mut self, name: &str, value: f64, default: f64) {
        if value == default {
            self.remove(name);
        } else {
            self.set_double(name, value);
        }
    }

    pub fn set_bool_or_omit(&mut self, name: &str, value: bool, default: bool) {
        if value == default {
            self.remove(name);
        } else {
            self.set_bool(name, value);
        }
    }

    /// Removes an entry by name, returning it if present.
    pub fn remove(&mut self, name: &str) -> Option<Parameter> {
        self.entries
            .iter()
            .position(|p| p.name.eq_ignore_ascii_case(name))
            .map(|i| self.entries.remove(i))
    }
}

impl fmt::Display for ParameterCollection {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        for entry in &self.entries {
            write!(f, "|{entry}")?;
        }
        Ok(())
    }
}

fn push_entry(
    out: &mut Vec<u8>,
    separator: u8,
    name: &str,
    value: &str,
    codepage: &'static Encoding,
) {
    out.push(separator);
    let (name, _, _) = codepage.encode(name);
    out.extend_from_slice(&name);
    out.push(b'=');
    let (value, _, _) = codepage.encode(value);
    out.extend_from_slice(&value);
}

/// Strips trailing carriage returns and line feeds.
fn trim_crlf(mut entry: &[u8]) -> &[u8] {
    while let [rest @ .., b'\r' | b'\n'] = entry {
        entry = rest;
    }
    entry
}

/// Strips a leading `%UTF8%` marker, case-insensitively.
fn strip_utf8_marker(name: &[u8]) -> Option<&[u8]> {
    if name.len() >= UTF8_MARKER.len() && name[..UTF8_MARKER.len()].eq_ignore_ascii_case(UTF8_MARKER)
    {
        Some(&name[UTF8_MARKER.len()..])
    } else {
        None
    }
}

/// Decodes a codepoint list (as stored in wide string tables) into text.
/// Codepoints that are not valid Unicode scalars are dropped.
pub fn codepoints_to_text(codepoints: &[i32]) -> String {
    codepoints
        .iter()
        .filter_map(|&cp| u32::try_from(cp).ok())
        .filter_map(char::from_u32)
        .collect()
}

/// Encodes text as the codepoint list stored in wide string tables.
pub fn text_to_codepoints(text: &str) -> Vec<i32> {
    text.chars().map(|c| c as i32).collect()
}
