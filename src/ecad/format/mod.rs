//! Document structure layer.
//!
//! This module provides the mid-level layer that bridges between raw
//! stream bytes and the high-level [`DocumentReader`](crate::ecad::reader::DocumentReader)
//! and [`DocumentWriter`](crate::ecad::writer::DocumentWriter).
//!
//! # Module Organization
//!
//! - [`records`]: record stream framing and parameter record payloads
//! - [`ownership`]: owner index resolution and emission renumbering
//! - [`keys`]: long section name to storage key aliasing
//!
//! # Architecture
//!
//! ```text
//! Container Structure:
//! ┌──────────────────────┐
//! │  FileHeader          │ ← records::read_parameter_block()
//! ├──────────────────────┤
//! │  SectionKeys         │ ← keys::SectionKeys::from_parameters()
//! ├──────────────────────┤
//! │  <key>/Data          │ ← records::read_record_stream()
//! │  (one per section,   │   ownership::build_ownership_tree()
//! │   owner-linked)      │
//! ├──────────────────────┤
//! │  Storage/Data        │ ← codec::compressed
//! ├──────────────────────┤
//! │  WideStrings/Data    │ ← codec::parameters codepoint lists
//! └──────────────────────┘
//! ```

pub mod keys;
pub mod ownership;
pub mod records;
