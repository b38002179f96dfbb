use core::{cell::Cell, mem::ManuallyDrop};

use crate::{
    driver::Storage,
    fs::{mount_state::Mounted, Filesystem},
    io::{self, Result},
    table::Handle,
    Caller, Cursor, Name, OpenFlags, SeekFrom,
};

/// One caller's reference to an open file.
///
/// Dropping the file closes it, discarding any error. Use [`close`](File::close) to see it.
pub struct File<'f, 'a, S: Storage> {
    fs: &'f Filesystem<'a, S, Mounted>,
    handle: Handle,
    closed: Cell<bool>,
}

impl<'f, 'a, S: Storage> File<'f, 'a, S> {
    pub(crate) fn new(fs: &'f Filesystem<'a, S, Mounted>, handle: Handle) -> Self {
        Self {
            fs,
            handle,
            closed: Cell::new(false),
        }
    }

    pub fn name(&self) -> &Name {
        &self.handle.name
    }

    pub fn caller(&self) -> Caller {
        self.handle.caller
    }

    /// Read at this caller's read cursor, up to the end of the allocated pages.
    ///
    /// Returns a short count at the end of the file,
    /// [`Error::FILE_EMPTY`](crate::io::Error::FILE_EMPTY) if the cursor already is there.
    pub fn read(&self, buf: &mut [u8]) -> Result<usize> {
        self.fs.read(&self.handle, buf)
    }

    /// Write at this caller's write cursor, up to the end of the allocated pages.
    ///
    /// Returns a short count at the end of the file,
    /// [`Error::FILE_FULL`](crate::io::Error::FILE_FULL) if the cursor already is there.
    /// Data stays in the cache until it is flushed or evicted.
    pub fn write(&self, data: &[u8]) -> Result<usize> {
        self.fs.write(&self.handle, data)
    }

    /// Move this caller's read or write cursor. `SeekFrom::End` is relative to [`len`](Self::len).
    pub fn seek(&self, cursor: Cursor, pos: SeekFrom) -> Result<usize> {
        self.fs.seek(&self.handle, cursor, pos)
    }

    /// High-water mark of all write cursors since the file was opened.
    pub fn len(&self) -> Result<usize> {
        self.fs.size(&self.handle)
    }

    pub fn is_empty(&self) -> Result<bool> {
        self.len().map(|len| len == 0)
    }

    /// Allocated bytes.
    pub fn du(&self) -> Result<usize> {
        self.fs.capacity(&self.handle)
    }

    /// Drop this reference. The last reference writes back a dirty cache.
    pub fn close(self) -> Result<()> {
        let this = ManuallyDrop::new(self);
        this.fs.close_file(&this.handle)
    }

    /// Delete the file. Fails with [`Error::BUSY`](crate::io::Error::BUSY) while other
    /// references exist, leaving everything unchanged.
    pub fn delete(&self) -> Result<()> {
        self.fs.delete_file(&self.handle)?;
        self.closed.set(true);
        Ok(())
    }
}

impl<S: Storage> Drop for File<'_, '_, S> {
    fn drop(&mut self) {
        if !self.closed.get() {
            self.fs.close_file(&self.handle).ok();
        }
    }
}

impl<S: Storage> io::Read for File<'_, '_, S> {
    fn read(&self, buf: &mut [u8]) -> Result<usize> {
        File::read(self, buf)
    }
}

impl<S: Storage> io::Write for File<'_, '_, S> {
    fn write(&self, data: &[u8]) -> Result<usize> {
        File::write(self, data)
    }

    fn flush(&self) -> Result<()> {
        self.fs.flush()
    }
}

impl<S: Storage> io::Seek for File<'_, '_, S> {
    fn seek(&self, cursor: Cursor, pos: SeekFrom) -> Result<usize> {
        File::seek(self, cursor, pos)
    }
}

/// Options and flags which can be used to configure how a file is opened.
///
/// ```
/// # use pagefs::{Caller, OpenOptions, name};
/// # pagefs::ram_storage!(small);
/// # let ram = Ram::default();
/// # let mut storage = RamStorage::new(&ram);
/// # let fs = pagefs::Filesystem::init(&mut storage);
/// # fs.format().unwrap();
/// # let fs = fs.mount().unwrap();
/// let file = OpenOptions::new()
///     .create(true)
///     .size(4096)
///     .open(&fs, Caller(0), &name!("a.bin"))
///     .unwrap();
/// assert_eq!(file.du().unwrap(), 4096);
/// ```
#[derive(Clone, Debug)]
pub struct OpenOptions {
    flags: OpenFlags,
    size: usize,
}

impl Default for OpenOptions {
    fn default() -> Self {
        Self::new()
    }
}

impl OpenOptions {
    pub fn new() -> Self {
        Self {
            flags: OpenFlags::empty(),
            size: 0,
        }
    }

    /// Create the file if it does not exist.
    pub fn create(&mut self, create: bool) -> &mut Self {
        self.flags.set(OpenFlags::CREATE, create);
        self
    }

    /// Create the file, failing if it exists.
    pub fn create_new(&mut self, create_new: bool) -> &mut Self {
        self.flags.set(OpenFlags::CREATE | OpenFlags::EXCL, create_new);
        self
    }

    /// Size of a newly created file.
    pub fn size(&mut self, size: usize) -> &mut Self {
        self.size = size;
        self
    }

    pub fn flags(&self) -> OpenFlags {
        self.flags
    }

    pub fn requested_size(&self) -> usize {
        self.size
    }

    pub fn open<'f, 'a, S: Storage>(
        &self,
        fs: &'f Filesystem<'a, S, Mounted>,
        caller: Caller,
        name: &Name,
    ) -> Result<File<'f, 'a, S>> {
        fs.open_with_options(self, caller, name)
    }
}
