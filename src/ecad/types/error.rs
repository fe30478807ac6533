//! Custom error types for the ecadlib crate.

use thiserror::Error;

/// The primary error type for all operations in this crate.
///
/// Fatal conditions abort the current document read or write; recoverable
/// observations are accumulated as warnings on the diagnostic context
/// instead of being raised here.
#[derive(Debug, Error)]
pub enum EcadError {
    /// An error originating from I/O operations.
    #[error("I/O error: {0:?}")]
    Io(#[from] std::io::Error),

    /// A block interpreter read past the declared end of its block.
    #[error("block overrun at '{path}': consumed {consumed} bytes of a {declared}-byte block")]
    StructuralOverrun {
        path: String,
        declared: usize,
        consumed: usize,
    },

    /// A declared length or fixed-width field extends past the end of the data.
    #[error("truncated data: needed {needed} bytes, but only {remaining} remain")]
    Truncated { needed: usize, remaining: usize },

    /// A compressed entry did not start with the expected tag byte.
    #[error("unexpected tag at '{path}': expected {expected:#04x}, got {actual:#04x}")]
    UnexpectedTag {
        path: String,
        expected: u8,
        actual: u8,
    },

    /// A DEFLATE stream could not be decompressed.
    #[error("decompression failed: {0}")]
    Decompression(String),

    /// A block payload does not fit the 24-bit length field of the block header.
    #[error("block payload of {0} bytes exceeds the 24-bit length limit")]
    BlockTooLarge(usize),

    /// An encoded string does not fit a 1-byte length prefix.
    #[error("string of {0} encoded bytes exceeds the 255-byte short string limit")]
    StringTooLong(usize),

    /// A hard assertion on an observed value failed.
    #[error("assertion failed at '{path}': {message}")]
    AssertionFailed { path: String, message: String },

    /// A required container stream is absent.
    #[error("missing stream: {0}")]
    MissingStream(String),

    /// Cooperative cancellation was observed between storage sections.
    #[error("operation cancelled")]
    Cancelled,

    /// The data is structurally invalid in a way not covered by a more
    /// specific variant.
    #[error("invalid format: {0}")]
    InvalidFormat(String),
}

/// A convenience `Result` type alias using the crate's `EcadError` type.
pub type Result<T> = std::result::Result<T, EcadError>;
