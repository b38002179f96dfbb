//! Traits and types for core I/O functionality.

use core::fmt::{self, Debug, Formatter};

use crate::fs::Cursor;

/// The `Read` trait allows for reading bytes from a file.
pub trait Read {
    /// Read at most buf.len() bytes.
    /// Upon success, return how many bytes were read.
    fn read(&self, buf: &mut [u8]) -> Result<usize>;

    fn read_exact(&self, mut buf: &mut [u8]) -> Result<()> {
        while !buf.is_empty() {
            match self.read(buf) {
                Ok(0) => break,
                Ok(n) => {
                    let tmp = buf;
                    buf = &mut tmp[n..];
                }
                Err(e) => return Err(e),
            }
        }
        if buf.is_empty() {
            Ok(())
        } else {
            Err(Error::FILE_EMPTY)
        }
    }
}

/** The `Write` trait allows for writing bytes to a file.

By analogy with `std::io::Write`, we also define a `flush()`
method. Writes land in the sector cache and only reach the
device once the cache is flushed or evicted.
*/
pub trait Write {
    /// Write at most data.len() bytes.
    /// The file will not necessarily be updated unless
    /// flush is called as there is a cache.
    /// Upon success, return how many bytes were written.
    fn write(&self, data: &[u8]) -> Result<usize>;

    /// Write out all pending writes to storage.
    fn flush(&self) -> Result<()>;

    fn write_all(&self, mut buf: &[u8]) -> Result<()> {
        while !buf.is_empty() {
            match self.write(buf) {
                Ok(0) => {
                    // failed to write whole buffer
                    return Err(Error::FILE_FULL);
                }
                Ok(n) => buf = &buf[n..],
                Err(e) => return Err(e),
            }
        }
        Ok(())
    }
}

/** Enumeration of possible methods to seek within an I/O object.

`End` is relative to the high-water size of the file.
*/
#[derive(Clone, Copy, Debug, Eq, PartialEq)]
pub enum SeekFrom {
    Start(u32),
    End(i32),
    Current(i32),
}

impl SeekFrom {
    pub fn off(self) -> i32 {
        match self {
            SeekFrom::Start(u) => u as i32,
            SeekFrom::End(i) => i,
            SeekFrom::Current(i) => i,
        }
    }

    /// Resolve against the current position and the high-water size.
    ///
    /// Positions before the start of the file are rejected with [`Error::INVALID`].
    pub fn resolve(self, current: usize, end: usize) -> Result<usize> {
        let (base, delta) = match self {
            SeekFrom::Start(u) => return Ok(u as usize),
            SeekFrom::End(i) => (end, i),
            SeekFrom::Current(i) => (current, i),
        };
        let target = base as i64 + delta as i64;
        if target < 0 {
            Err(Error::INVALID)
        } else {
            Ok(target as usize)
        }
    }
}

/** The `Seek` trait moves one of the two cursors a caller holds on a file.

Read and write positions are independent, so the cursor has to be named.
*/
pub trait Seek {
    /// Seek to an offset in bytes.
    /// If successful, returns the new position from start of file.
    fn seek(&self, cursor: Cursor, pos: SeekFrom) -> Result<usize>;

    fn rewind(&self, cursor: Cursor) -> Result<()> {
        self.seek(cursor, SeekFrom::Start(0)).map(drop)
    }
}

pub type Result<T, E = Error> = core::result::Result<T, E>;

/// The error type for filesystem operations.
///
/// Specific error codes are available as associated constants of this type.
///
/// ```
/// # use pagefs_core::Error;
/// assert_eq!(Error::IO.code(), -5);
/// assert_eq!(Error::new(-5), Some(Error::IO));
/// assert_eq!(Error::new(0), None);
/// ```
#[derive(Clone, Copy, PartialEq, Eq)]
pub struct Error {
    code: i32,
}

impl Error {
    /// The storage device failed to initialize. The filesystem stays disabled.
    pub const DEVICE_UNAVAILABLE: Self = Self::new_const(-19);

    /// Input / output error occurred.
    pub const IO: Self = Self::new_const(-5);

    /// The superblock carries a different version tag. Format the device.
    pub const VERSION_MISMATCH: Self = Self::new_const(-84);

    /// On-flash records are inconsistent.
    pub const CORRUPTION: Self = Self::new_const(-74);

    /// No space left available for operation.
    pub const NO_SPACE: Self = Self::new_const(-28);

    /// The file-info or extent table has no free slot.
    pub const TABLE_FULL: Self = Self::new_const(-23);

    /// File already exists.
    pub const ENTRY_ALREADY_EXISTED: Self = Self::new_const(-17);

    /// No entry found with that name.
    pub const NO_SUCH_ENTRY: Self = Self::new_const(-2);

    /// The file is still referenced by another open handle.
    pub const BUSY: Self = Self::new_const(-16);

    /// Write past the allocated extents.
    pub const FILE_FULL: Self = Self::new_const(-27);

    /// Read past the allocated extents.
    pub const FILE_EMPTY: Self = Self::new_const(-61);

    /// Incorrect value specified to function.
    pub const INVALID: Self = Self::new_const(-22);

    /// No memory available for completing request.
    pub const NO_MEMORY: Self = Self::new_const(-12);

    /// Bad file descriptor.
    pub const BAD_FILE_DESCRIPTOR: Self = Self::new_const(-9);

    /// Filename too long
    pub const FILENAME_TOO_LONG: Self = Self::new_const(-36);

    /// Construct an `Error` from an error code.
    ///
    /// Return values that are greater or equals to zero represent success.  In this case, `None`
    /// is returned.
    pub const fn new(code: i32) -> Option<Self> {
        if code >= 0 {
            None
        } else {
            Some(Self { code })
        }
    }

    const fn new_const(code: i32) -> Self {
        if code >= 0 {
            panic!("error code must be negative");
        }
        Self { code }
    }

    /// Return the error code of this error.
    pub const fn code(&self) -> i32 {
        self.code
    }
}

/// Prints a static string as the debug representation.
///
/// If unwrap or expect is used on a `Result<_, Error>`, the `Debug` implementation is not
/// always optimized out.  This leads to a significant increase of the binary size.
/// Enable the `debug-error` feature to print the name of the error constant.
impl Debug for Error {
    fn fmt(&self, f: &mut Formatter<'_>) -> fmt::Result {
        #[cfg(not(feature = "debug-error"))]
        {
            f.debug_struct("Error").finish()
        }
        #[cfg(feature = "debug-error")]
        {
            match self {
                &Self::DEVICE_UNAVAILABLE => f.write_str("DEVICE_UNAVAILABLE"),
                &Self::IO => f.write_str("IO"),
                &Self::VERSION_MISMATCH => f.write_str("VERSION_MISMATCH"),
                &Self::CORRUPTION => f.write_str("CORRUPTION"),
                &Self::NO_SPACE => f.write_str("NO_SPACE"),
                &Self::TABLE_FULL => f.write_str("TABLE_FULL"),
                &Self::ENTRY_ALREADY_EXISTED => f.write_str("ENTRY_ALREADY_EXISTED"),
                &Self::NO_SUCH_ENTRY => f.write_str("NO_SUCH_ENTRY"),
                &Self::BUSY => f.write_str("BUSY"),
                &Self::FILE_FULL => f.write_str("FILE_FULL"),
                &Self::FILE_EMPTY => f.write_str("FILE_EMPTY"),
                &Self::INVALID => f.write_str("INVALID"),
                &Self::NO_MEMORY => f.write_str("NO_MEMORY"),
                &Self::BAD_FILE_DESCRIPTOR => f.write_str("BAD_FILE_DESCRIPTOR"),
                &Self::FILENAME_TOO_LONG => f.write_str("FILENAME_TOO_LONG"),
                other => f.debug_tuple("Error").field(&other.code).finish(),
            }
        }
    }
}

impl From<Error> for i32 {
    fn from(error: Error) -> Self {
        error.code
    }
}

#[cfg(feature = "embedded-io")]
impl embedded_io::Error for Error {
    fn kind(&self) -> embedded_io::ErrorKind {
        match *self {
            Error::ENTRY_ALREADY_EXISTED => embedded_io::ErrorKind::AlreadyExists,
            Error::NO_SUCH_ENTRY => embedded_io::ErrorKind::NotFound,
            Error::BAD_FILE_DESCRIPTOR | Error::INVALID | Error::FILENAME_TOO_LONG => {
                embedded_io::ErrorKind::InvalidInput
            }
            Error::NO_MEMORY => embedded_io::ErrorKind::OutOfMemory,
            Error::DEVICE_UNAVAILABLE => embedded_io::ErrorKind::NotConnected,
            Error::VERSION_MISMATCH | Error::CORRUPTION => {
                embedded_io::ErrorKind::InvalidData
            }
            Error::FILE_FULL => embedded_io::ErrorKind::WriteZero,
            _ => embedded_io::ErrorKind::Other,
        }
    }
}
