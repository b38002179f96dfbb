//! Object-safe implementations for [`File`][] and [`Filesystem`][].

use crate::{
    driver::Storage,
    fs::{mount_state::Mounted, Filesystem},
    io::{Error, Result},
    Caller, DynFile, DynFilesystem, File, FileCallback, Geometry, Metadata, Name,
};

impl<S: Storage> DynFile for File<'_, '_, S> {
    fn len(&self) -> Result<usize> {
        File::len(self)
    }

    fn is_empty(&self) -> Result<bool> {
        File::is_empty(self)
    }

    fn du(&self) -> Result<usize> {
        File::du(self)
    }
}

impl<S: Storage> DynFilesystem for Filesystem<'_, S, Mounted> {
    fn geometry(&self) -> Geometry {
        Filesystem::geometry(self)
    }

    fn total_space(&self) -> usize {
        Filesystem::total_space(self)
    }

    fn available_space(&self) -> Result<usize> {
        Filesystem::available_space(self)
    }

    fn exists(&self, name: &Name) -> bool {
        Filesystem::exists(self, name)
    }

    fn metadata(&self, name: &Name) -> Result<Metadata> {
        Filesystem::metadata(self, name)
    }

    fn remove(&self, name: &Name) -> Result<()> {
        Filesystem::remove(self, name)
    }

    fn flush(&self) -> Result<()> {
        Filesystem::flush(self)
    }

    fn last_error(&self) -> Option<Error> {
        Filesystem::last_error(self)
    }

    fn create_file_and_then_unit(
        &self,
        caller: Caller,
        name: &Name,
        size: usize,
        f: FileCallback<'_>,
    ) -> Result<()> {
        Filesystem::create_and_then(self, caller, name, size, |file| f(file))
    }

    fn open_file_and_then_unit(
        &self,
        caller: Caller,
        name: &Name,
        f: FileCallback<'_>,
    ) -> Result<()> {
        Filesystem::open_and_then(self, caller, name, |file| f(file))
    }

    fn write(&self, caller: Caller, name: &Name, contents: &[u8]) -> Result<()> {
        Filesystem::write_file(self, caller, name, contents)
    }
}
