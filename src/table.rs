//! Registry of open files, shared between callers by name.

use heapless::{FnvIndexMap, LinearMap};

use crate::{
    consts::{CALLERS_MAX, OPEN_FILES_MAX},
    io::{Error, Result},
    meta::{Entry, Extents},
    Caller, Name,
};

#[derive(Clone, Copy, Debug, Default, Eq, PartialEq)]
pub(crate) struct Cursors {
    pub read: usize,
    pub write: usize,
}

/// Identifies one registration of a file; stale after the file is closed for good, deleted or
/// the device is formatted.
#[derive(Clone, Copy, Debug, Eq, PartialEq)]
pub(crate) struct Handle {
    pub name: Name,
    pub caller: Caller,
    generation: u32,
}

pub(crate) struct OpenFile {
    pub entry: Entry,
    pub extents: Extents,
    /// High-water mark of any write cursor.
    pub size: usize,
    refs: usize,
    cursors: LinearMap<Caller, Cursors, CALLERS_MAX>,
    generation: u32,
}

impl OpenFile {
    pub fn refs(&self) -> usize {
        self.refs
    }

    /// The caller's cursors, starting at zero if it has none yet.
    pub fn cursors(&mut self, caller: Caller) -> Result<&mut Cursors> {
        if !self.cursors.contains_key(&caller) {
            self.cursors
                .insert(caller, Cursors::default())
                .map_err(|_| Error::NO_MEMORY)?;
        }
        self.cursors.get_mut(&caller).ok_or(Error::NO_MEMORY)
    }

    /// Allocated bytes.
    pub fn capacity(&self, page_size: usize) -> usize {
        self.extents
            .iter()
            .map(|extent| extent.count as usize * page_size)
            .sum()
    }
}

pub(crate) struct OpenTable {
    files: FnvIndexMap<Name, OpenFile, OPEN_FILES_MAX>,
    generation: u32,
}

impl OpenTable {
    pub fn new() -> Self {
        Self {
            files: FnvIndexMap::new(),
            generation: 0,
        }
    }

    pub fn len(&self) -> usize {
        self.files.len()
    }

    pub fn has_room(&self) -> bool {
        self.files.len() < self.files.capacity()
    }

    pub fn contains(&self, name: &Name) -> bool {
        self.files.contains_key(name)
    }

    /// Take another reference on an open file, resetting the caller's cursors.
    pub fn attach(&mut self, name: &Name, caller: Caller) -> Result<Option<Handle>> {
        let Some(file) = self.files.get_mut(name) else {
            return Ok(None);
        };
        *file.cursors(caller)? = Cursors::default();
        file.refs += 1;
        Ok(Some(Handle {
            name: *name,
            caller,
            generation: file.generation,
        }))
    }

    /// Register a file that is not open yet.
    pub fn register(&mut self, entry: Entry, extents: Extents, caller: Caller) -> Result<Handle> {
        let name = entry.record.name;
        if self.files.contains_key(&name) {
            return Err(Error::ENTRY_ALREADY_EXISTED);
        }
        self.generation = self.generation.wrapping_add(1);
        let mut file = OpenFile {
            entry,
            extents,
            size: 0,
            refs: 1,
            cursors: LinearMap::new(),
            generation: self.generation,
        };
        file.cursors(caller)?;
        self.files
            .insert(name, file)
            .map_err(|_| Error::NO_MEMORY)?;
        Ok(Handle {
            name,
            caller,
            generation: self.generation,
        })
    }

    pub fn get_mut(&mut self, handle: &Handle) -> Result<&mut OpenFile> {
        self.files
            .get_mut(&handle.name)
            .filter(|file| file.generation == handle.generation)
            .ok_or(Error::BAD_FILE_DESCRIPTOR)
    }

    /// Drop one reference. Returns the file once the last reference is gone.
    pub fn detach(&mut self, handle: &Handle) -> Result<Option<OpenFile>> {
        let file = self.get_mut(handle)?;
        file.refs -= 1;
        file.cursors.remove(&handle.caller);
        if file.refs > 0 {
            return Ok(None);
        }
        Ok(self.files.remove(&handle.name))
    }

    pub fn remove(&mut self, handle: &Handle) -> Result<OpenFile> {
        self.get_mut(handle)?;
        self.files
            .remove(&handle.name)
            .ok_or(Error::BAD_FILE_DESCRIPTOR)
    }

    /// Invalidate every handle.
    pub fn clear(&mut self) {
        self.files.clear();
    }
}
