#![no_std]

//! Core types for the [`pagefs`][] crate.
//!
//! See the documentation for [`pagefs`][] for more information.
//!
//! [`pagefs`]: https://docs.rs/pagefs

mod consts;
mod fs;
mod io;
mod name;
mod object_safe;

pub use consts::{NAME_MAX, NAME_MAX_PLUS_ONE};
pub use fs::{Caller, Cursor, Extent, Geometry, Metadata, OpenFlags};
pub use io::{Error, Read, Result, Seek, SeekFrom, Write};
pub use name::{Name, NameError};
pub use object_safe::{DynFile, DynFilesystem, FileCallback};

/// Creates a file name from a string.
///
/// Panics and causes a compiler error if the string is empty, too long, or contains null bytes or
/// non-ascii characters.
///
/// # Examples
///
/// ```
/// use pagefs_core::{name, Name};
///
/// const LOG: Name = name!("boot.log");
/// let data = name!("a.bin");
/// ```
///
/// Illegal values:
///
/// ```compile_fail
/// # use pagefs_core::{name, Name};
/// const WITH_NULL: Name = name!("a\0b");  // does not compile
/// ```
///
/// ```compile_fail
/// # use pagefs_core::{name, Name};
/// const WITH_UTF8: Name = name!("hÃ¶me");  // does not compile
/// ```
///
/// The macro enforces const evaluation so that compilation fails for illegal values even if the
/// macro is not used in a const context:
///
/// ```compile_fail
/// # use pagefs_core::name;
/// let name = name!("");  // does not compile
/// ```
#[macro_export]
macro_rules! name {
    ($name:literal) => {{
        const _NAME: $crate::Name = match $crate::Name::from_str($name) {
            Ok(name) => name,
            Err(_) => panic!("invalid pagefs file name"),
        };
        _NAME
    }};
}
