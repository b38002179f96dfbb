use heapless::Vec;

use crate::{
    fs::{Caller, Geometry, Metadata},
    io::{Error, Read, Result, Seek, Write},
    name::Name,
};

// Make sure that the traits actually are object safe.
const _: Option<&dyn DynFile> = None;
const _: Option<&dyn DynFilesystem> = None;

pub type FileCallback<'a, R = ()> = &'a mut dyn FnMut(&dyn DynFile) -> Result<R>;

/// Object-safe trait for files.
///
/// The methods for opening files cannot be implemented in this trait.  Use these methods instead:
/// - [`DynFilesystem::create_file_and_then`](trait.DynFilesystem.html#method.create_file_and_then)
/// - [`DynFilesystem::open_file_and_then`](trait.DynFilesystem.html#method.open_file_and_then)
pub trait DynFile: Read + Seek + Write {
    /// High-water size.
    fn len(&self) -> Result<usize>;
    fn is_empty(&self) -> Result<bool>;
    /// Allocated bytes.
    fn du(&self) -> Result<usize>;
}

impl dyn DynFile + '_ {
    pub fn read_to_end<const N: usize>(&self, buf: &mut Vec<u8, N>) -> Result<usize> {
        let had = buf.len();
        buf.resize_default(buf.capacity())
            .map_err(|_| Error::NO_MEMORY)?;
        let read = match self.read(&mut buf[had..]) {
            Ok(read) => read,
            Err(Error::FILE_EMPTY) => 0,
            Err(error) => {
                buf.truncate(had);
                return Err(error);
            }
        };
        buf.truncate(had + read);
        Ok(read)
    }
}

/// Object-safe trait for filesystems.
///
/// The following methods cannot support generic return types in the callbacks:
/// - [`DynFilesystem::create_file_and_then_unit`][]
/// - [`DynFilesystem::open_file_and_then_unit`][]
///
/// Use these helper functions instead:
/// - [`DynFilesystem::create_file_and_then`](#method.create_file_and_then)
/// - [`DynFilesystem::open_file_and_then`](#method.open_file_and_then)
pub trait DynFilesystem {
    fn geometry(&self) -> Geometry;
    fn total_space(&self) -> usize;
    fn available_space(&self) -> Result<usize>;
    fn exists(&self, name: &Name) -> bool;
    fn metadata(&self, name: &Name) -> Result<Metadata>;
    fn remove(&self, name: &Name) -> Result<()>;
    fn flush(&self) -> Result<()>;
    fn last_error(&self) -> Option<Error>;
    fn create_file_and_then_unit(
        &self,
        caller: Caller,
        name: &Name,
        size: usize,
        f: FileCallback<'_>,
    ) -> Result<()>;
    fn open_file_and_then_unit(&self, caller: Caller, name: &Name, f: FileCallback<'_>)
        -> Result<()>;
    fn write(&self, caller: Caller, name: &Name, contents: &[u8]) -> Result<()>;
}

impl dyn DynFilesystem + '_ {
    pub fn read<const N: usize>(&self, caller: Caller, name: &Name) -> Result<Vec<u8, N>> {
        let mut contents = Vec::new();
        self.open_file_and_then(caller, name, &mut |file| {
            file.read_to_end(&mut contents)?;
            Ok(())
        })?;
        Ok(contents)
    }

    pub fn create_file_and_then<R>(
        &self,
        caller: Caller,
        name: &Name,
        size: usize,
        f: FileCallback<'_, R>,
    ) -> Result<R> {
        let mut result = Err(Error::IO);
        self.create_file_and_then_unit(caller, name, size, &mut |file| {
            result = Ok(f(file)?);
            Ok(())
        })?;
        result
    }

    pub fn open_file_and_then<R>(
        &self,
        caller: Caller,
        name: &Name,
        f: FileCallback<'_, R>,
    ) -> Result<R> {
        let mut result = Err(Error::IO);
        self.open_file_and_then_unit(caller, name, &mut |file| {
            result = Ok(f(file)?);
            Ok(())
        })?;
        result
    }
}
