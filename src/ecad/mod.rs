//! Core ECAD document module

pub mod codec;
pub mod context;
pub mod format;
pub mod reader;
pub mod storage;
pub mod types;
pub mod writer;

pub use context::{Context, Warning};
pub use reader::{DocumentReader, ReadOptions};
pub use storage::{Container, MemoryContainer};
pub use types::error::{EcadError, Result};
pub use writer::{DocumentWriter, WriteOptions};
