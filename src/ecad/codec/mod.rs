//! Codec layer for the wire-level encodings.
//!
//! This module provides the low-level primitives every stream in the
//! container formats is built from.
//!
//! # Submodules
//!
//! - [`block`][]: length-prefixed block framing with flag bytes
//! - [`strings`][]: the five text encodings and the codepage registry
//! - [`parameters`][]: `KEY=VALUE` parameter list parsing and serialization
//! - [`compressed`][]: zlib-packed named entries

pub mod block;
pub mod compressed;
pub mod parameters;
pub mod strings;
