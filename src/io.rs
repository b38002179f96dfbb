//! Traits and types for core I/O functionality.

pub mod prelude;

pub use pagefs_core::{Error, Read, Result, Seek, SeekFrom, Write};
