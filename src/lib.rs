#![no_std]

/*!

[pagefs](https://github.com/pagefs/pagefs) is a small filesystem for NOR-style flash.

There are no directories: files live in one flat namespace of short ASCII names. Every file is
created with a fixed size, rounded up to whole pages, and backed by at most a handful of page
runs ("extents"). The device is divided into ordered zones:

```text
| file-info (superblock, file table, extent table) | page bitmap | data pages | reserved |
```

All device traffic goes through a single-sector write-back cache: reads and writes land in the
one resident sector, which is erased and re-programmed when it is flushed or evicted. Writing
bytes that are already there never dirties the cache.

### Usage

Implement [`driver::Storage`] for your flash, then go through [`Filesystem`]:

```
use pagefs::{
    fs::Filesystem,
    io::prelude::*,
    name, Caller, Cursor, SeekFrom,
};

// a RAM device with 128 byte pages and 1 KiB sectors
pagefs::ram_storage!(small);

let ram = Ram::default();
let mut storage = RamStorage::new(&ram);

// a fresh device carries no superblock
let fs = Filesystem::init(&mut storage);
let fs = match fs.mount() {
    Ok(fs) => fs,
    Err(pagefs::fs::MountError(fs, _)) => {
        fs.format().unwrap();
        fs.mount().unwrap()
    }
};

let me = Caller(0);
let file = fs.create(me, &name!("a.bin"), 4096).unwrap();
assert_eq!(file.du().unwrap(), 4096);

file.write_all(b"hello").unwrap();
file.seek(Cursor::Read, SeekFrom::Start(0)).unwrap();
let mut buf = [0u8; 5];
file.read_exact(&mut buf).unwrap();
assert_eq!(&buf, b"hello");

file.close().unwrap();
fs.flush().unwrap();
```

Several logical callers may hold the same file open. Each [`Caller`] gets its own read and write
cursor, while the file keeps one reference count:

```
# use pagefs::{fs::Filesystem, name, Caller, Cursor, SeekFrom};
# pagefs::ram_storage!(small);
# let ram = Ram::default();
# let mut storage = RamStorage::new(&ram);
# let fs = Filesystem::init(&mut storage);
# fs.format().unwrap();
# let fs = fs.mount().unwrap();
let writer = fs.create(Caller(1), &name!("log"), 256).unwrap();
let reader = fs.open(Caller(2), &name!("log")).unwrap();

writer.write(b"boot ok").unwrap();
let mut buf = [0u8; 7];
reader.read(&mut buf).unwrap();
assert_eq!(&buf, b"boot ok");

// still referenced by the writer
assert_eq!(reader.delete(), Err(pagefs::io::Error::BUSY));
```

### Errors

Every operation returns [`io::Result`]. The outcome of the last call is also kept, see
[`Filesystem::last_error`]. If the device does not come up, the filesystem is disabled for good
and every call fails with [`Error::DEVICE_UNAVAILABLE`](io::Error::DEVICE_UNAVAILABLE).

### Concurrency

A [`Filesystem`] is not `Sync`. Callers that share one from several execution contexts hand in
an [`driver::Exclusion`] via [`Filesystem::init_with`], which is entered around every device
transaction.
*/

#[cfg(feature = "alloc")]
extern crate alloc;

#[macro_use]
pub mod macros;

/// Configuration constants and table capacities.
pub mod consts;
/// The `Storage` trait and the mutual-exclusion hook.
pub mod driver;
pub mod fs;
/// Traits and types for core I/O functionality.
pub mod io;
/// Zone layout and on-flash record formats.
pub mod layout;
pub mod prelude;

mod bitmap;
mod cache;
mod engine;
mod file;
mod meta;
mod object_safe;
mod table;
mod volume;

#[cfg(feature = "embedded-io")]
pub mod eio;
#[cfg(feature = "embedded-io")]
mod eio_async;

pub use file::{File, OpenOptions};
pub use fs::{Filesystem, MountError};
pub use pagefs_core::{
    name, Caller, Cursor, DynFile, DynFilesystem, Extent, FileCallback, Geometry, Metadata, Name,
    NameError, OpenFlags, SeekFrom, NAME_MAX,
};

#[cfg(test)]
mod tests;
