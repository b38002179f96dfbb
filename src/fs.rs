//! The filesystem context, files and open options.

use core::{cell::RefCell, fmt, marker::PhantomData};

use log::{debug, warn};

use crate::{
    driver::{Exclusion, NoExclusion, Storage},
    engine,
    io::{self, Error, Result},
    layout::Layout,
    table::{Handle, OpenTable},
    volume::Volume,
    Caller, Cursor, Geometry, Metadata, Name, OpenFlags, SeekFrom,
};

pub mod mount_state {
    mod private {
        pub trait Sealed {}
    }

    pub trait MountState: private::Sealed {}

    #[derive(Debug)]
    pub struct Mounted;
    impl private::Sealed for Mounted {}
    impl MountState for Mounted {}

    #[derive(Debug)]
    pub struct NotMounted;
    impl private::Sealed for NotMounted {}
    impl MountState for NotMounted {}
}

pub use crate::file::{File, OpenOptions};

use mount_state::{MountState, Mounted, NotMounted};

struct Inner<'a, S: Storage> {
    /// `Err` when the device failed to come up, permanently.
    volume: core::result::Result<Volume<'a, S>, Error>,
    table: OpenTable,
    last_error: Option<Error>,
}

/// A filesystem over one storage device.
///
/// All state lives in this value: the resident sector, the zone layout and the open-file table.
/// Methods take `&self`, files borrow the filesystem, and callers are named explicitly with a
/// [`Caller`] so several logical threads can keep independent cursors on one file.
pub struct Filesystem<'a, S: Storage, M: MountState = NotMounted> {
    inner: RefCell<Inner<'a, S>>,
    mount_state: PhantomData<M>,
}

/// Mounting failed. The unmounted filesystem is handed back, so it can be formatted.
pub struct MountError<'a, S: Storage>(pub Filesystem<'a, S, NotMounted>, pub Error);

impl<S: Storage> fmt::Debug for MountError<'_, S> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_tuple("MountError").field(&self.1).finish()
    }
}

pub type MountResult<'a, S> = core::result::Result<Filesystem<'a, S, Mounted>, MountError<'a, S>>;

impl<'a, S: Storage> Filesystem<'a, S, NotMounted> {
    /// Bring up the device and compute the zone layout, for single-threaded use.
    ///
    /// This never fails. If the device or its geometry is unusable, the filesystem is disabled
    /// and every later call returns the same error, [`Error::DEVICE_UNAVAILABLE`] for a failed
    /// device.
    pub fn init(storage: &'a mut S) -> Self {
        Self::init_with(storage, &NoExclusion)
    }

    /// Like [`init`](Self::init), entering `exclusion` around every device transaction.
    pub fn init_with(storage: &'a mut S, exclusion: &'a dyn Exclusion) -> Self {
        let volume = Volume::new(storage, exclusion);
        match &volume {
            Ok(volume) => debug!("layout: {:?}", volume.layout),
            Err(error) => warn!("filesystem disabled: {}", error.code()),
        }
        Self::from_inner(Inner {
            volume,
            table: OpenTable::new(),
            last_error: None,
        })
    }

    /// Check the superblock. A version mismatch is not repaired; call
    /// [`format`](Filesystem::format) on the returned filesystem.
    pub fn mount(self) -> MountResult<'a, S> {
        match self.run(|volume, _| volume.probe()) {
            Ok(()) => Ok(Filesystem::from_inner(self.inner.into_inner())),
            Err(error) => Err(MountError(self, error)),
        }
    }

    pub fn is_mountable(&self) -> bool {
        self.run(|volume, _| volume.probe()).is_ok()
    }
}

impl<'a, S: Storage, M: MountState> Filesystem<'a, S, M> {
    fn from_inner(inner: Inner<'a, S>) -> Self {
        Self {
            inner: RefCell::new(inner),
            mount_state: PhantomData,
        }
    }

    /// Run `f` against the live volume and record its outcome as the last error.
    pub(crate) fn run<R>(
        &self,
        f: impl FnOnce(&mut Volume<'a, S>, &mut OpenTable) -> Result<R>,
    ) -> Result<R> {
        let mut inner = self.inner.borrow_mut();
        let Inner {
            volume,
            table,
            last_error,
        } = &mut *inner;
        let result = match volume {
            Ok(volume) => f(volume, table),
            Err(error) => Err(*error),
        };
        *last_error = result.as_ref().err().copied();
        result
    }

    /// Erase all metadata and write a fresh superblock. Open handles become stale.
    pub fn format(&self) -> Result<()> {
        self.run(|volume, table| {
            table.clear();
            volume.format()
        })
    }

    /// Write back the resident sector if it is dirty.
    pub fn flush(&self) -> Result<()> {
        self.run(|volume, _| volume.flush())
    }

    /// Outcome of the last operation, `None` if it succeeded.
    pub fn last_error(&self) -> Option<Error> {
        self.inner.borrow().last_error
    }

    /// `None` when the filesystem is disabled.
    pub fn layout(&self) -> Option<Layout> {
        self.inner.borrow().volume.as_ref().ok().map(|volume| volume.layout)
    }

    /// Flush and close the device.
    pub fn close(self) -> Result<()> {
        self.run(|volume, table| {
            table.clear();
            volume.close()
        })
    }
}

impl<'a, S: Storage> Filesystem<'a, S, Mounted> {
    /// Flush and return to the unmounted state, keeping the device open.
    pub fn unmount(self) -> Result<Filesystem<'a, S, NotMounted>> {
        self.run(|volume, table| {
            table.clear();
            volume.flush()
        })?;
        Ok(Filesystem::from_inner(self.inner.into_inner()))
    }

    pub fn geometry(&self) -> Geometry {
        self.inner
            .borrow()
            .volume
            .as_ref()
            .map_or_else(|_| Geometry::default(), |volume| volume.geometry)
    }

    /// Bytes in the data zone.
    pub fn total_space(&self) -> usize {
        self.layout()
            .map_or(0, |layout| layout.data_pages() * layout.page_size())
    }

    /// Bytes in free data pages.
    pub fn available_space(&self) -> Result<usize> {
        self.run(|volume, _| Ok(volume.count_free()? * volume.layout.page_size()))
    }

    pub fn exists(&self, name: &Name) -> bool {
        matches!(self.run(|volume, _| volume.lookup(name)), Ok(Some(_)))
    }

    pub fn metadata(&self, name: &Name) -> Result<Metadata> {
        self.run(|volume, _| volume.metadata(name))
    }

    /// Open an existing file.
    ///
    /// If the file is open already, its reference count goes up and `caller`'s cursors are
    /// reset. Otherwise the extents are read from the metadata tables.
    pub fn open(&self, caller: Caller, name: &Name) -> Result<File<'_, 'a, S>> {
        let handle = self.run(|volume, table| {
            if let Some(handle) = table.attach(name, caller)? {
                return Ok(handle);
            }
            if !table.has_room() {
                return Err(Error::NO_MEMORY);
            }
            let entry = volume.lookup(name)?.ok_or(Error::NO_SUCH_ENTRY)?;
            let extents = volume.extents_of(&entry.record)?;
            table.register(entry, extents, caller)
        })?;
        Ok(File::new(self, handle))
    }

    /// Create a file of `size` bytes and open it.
    ///
    /// The size is rounded up to whole pages and cannot change later. Metadata updates stay in
    /// the cache until the next [`flush`](Self::flush).
    pub fn create(&self, caller: Caller, name: &Name, size: usize) -> Result<File<'_, 'a, S>> {
        let handle = self.run(|volume, table| {
            if table.contains(name) {
                return Err(Error::ENTRY_ALREADY_EXISTED);
            }
            if !table.has_room() {
                return Err(Error::NO_MEMORY);
            }
            let (entry, extents) = volume.create(name, size)?;
            table.register(entry, extents, caller)
        })?;
        Ok(File::new(self, handle))
    }

    pub fn open_with_options(
        &self,
        options: &OpenOptions,
        caller: Caller,
        name: &Name,
    ) -> Result<File<'_, 'a, S>> {
        let flags = options.flags();
        match self.open(caller, name) {
            Ok(file) if flags.contains(OpenFlags::CREATE | OpenFlags::EXCL) => {
                // keep the existing reference count intact
                file.close()?;
                self.fail(Error::ENTRY_ALREADY_EXISTED)
            }
            Err(Error::NO_SUCH_ENTRY) if flags.contains(OpenFlags::CREATE) => {
                self.create(caller, name, options.requested_size())
            }
            result => result,
        }
    }

    pub fn open_and_then<R>(
        &self,
        caller: Caller,
        name: &Name,
        f: impl FnOnce(&File<'_, 'a, S>) -> Result<R>,
    ) -> Result<R> {
        let file = self.open(caller, name)?;
        let result = f(&file);
        file.close()?;
        result
    }

    pub fn create_and_then<R>(
        &self,
        caller: Caller,
        name: &Name,
        size: usize,
        f: impl FnOnce(&File<'_, 'a, S>) -> Result<R>,
    ) -> Result<R> {
        let file = self.create(caller, name, size)?;
        let result = f(&file);
        file.close()?;
        result
    }

    /// Write `contents` from the start of a file, creating it with exactly that size if needed.
    pub fn write_file(&self, caller: Caller, name: &Name, contents: &[u8]) -> Result<()> {
        let file = OpenOptions::new()
            .create(true)
            .size(contents.len())
            .open(self, caller, name)?;
        let written = io::Write::write_all(&file, contents);
        file.close()?;
        written
    }

    /// Delete a file that nobody has open.
    pub fn remove(&self, name: &Name) -> Result<()> {
        self.run(|volume, table| {
            if table.contains(name) {
                return Err(Error::BUSY);
            }
            let entry = volume.lookup(name)?.ok_or(Error::NO_SUCH_ENTRY)?;
            volume.delete(&entry)
        })
    }

    /// Allocated bytes of a file, open or not.
    pub fn du(&self, name: &Name) -> Result<usize> {
        self.metadata(name).map(|metadata| metadata.capacity())
    }

    /// Number of open files.
    pub fn open_files(&self) -> usize {
        self.inner.borrow().table.len()
    }

    fn fail<R>(&self, error: Error) -> Result<R> {
        self.inner.borrow_mut().last_error = Some(error);
        Err(error)
    }

    pub(crate) fn read(&self, handle: &Handle, buf: &mut [u8]) -> Result<usize> {
        self.run(|volume, table| {
            let file = table.get_mut(handle)?;
            engine::read(volume, file, handle.caller, buf)
        })
    }

    pub(crate) fn write(&self, handle: &Handle, data: &[u8]) -> Result<usize> {
        self.run(|volume, table| {
            let file = table.get_mut(handle)?;
            engine::write(volume, file, handle.caller, data)
        })
    }

    pub(crate) fn seek(&self, handle: &Handle, cursor: Cursor, pos: SeekFrom) -> Result<usize> {
        self.run(|_, table| {
            let file = table.get_mut(handle)?;
            let size = file.size;
            let cursors = file.cursors(handle.caller)?;
            let current = match cursor {
                Cursor::Read => &mut cursors.read,
                Cursor::Write => &mut cursors.write,
            };
            *current = pos.resolve(*current, size)?;
            Ok(*current)
        })
    }

    pub(crate) fn size(&self, handle: &Handle) -> Result<usize> {
        self.run(|_, table| Ok(table.get_mut(handle)?.size))
    }

    pub(crate) fn capacity(&self, handle: &Handle) -> Result<usize> {
        self.run(|volume, table| {
            let page_size = volume.layout.page_size();
            Ok(table.get_mut(handle)?.capacity(page_size))
        })
    }

    /// Drop a reference. The last one re-reads the entry and writes back a dirty cache.
    pub(crate) fn close_file(&self, handle: &Handle) -> Result<()> {
        self.run(|volume, table| {
            let Some(file) = table.detach(handle)? else {
                return Ok(());
            };
            match volume.lookup(&file.entry.record.name)? {
                Some(_) => volume.flush(),
                None => {
                    warn!("{} vanished while open", file.entry.record.name);
                    Ok(())
                }
            }
        })
    }

    /// Delete the file behind `handle`, which must be its only reference.
    pub(crate) fn delete_file(&self, handle: &Handle) -> Result<()> {
        self.run(|volume, table| {
            let file = table.get_mut(handle)?;
            if file.refs() > 1 {
                return Err(Error::BUSY);
            }
            let entry = file.entry;
            volume.delete(&entry)?;
            table.remove(handle).map(drop)
        })
    }
}
