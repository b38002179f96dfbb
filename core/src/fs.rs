use bitflags::bitflags;

bitflags! {
    /// Flags controlling how [`OpenOptions`] resolves a name.
    ///
    /// Without any flag a file is only opened if it already exists.
    ///
    /// [`OpenOptions`]: https://docs.rs/pagefs/latest/pagefs/struct.OpenOptions.html
    #[derive(Clone, Copy, Debug, Eq, PartialEq)]
    pub struct OpenFlags: u8 {
        /// Create the file if it does not exist.
        const CREATE = 0x1;
        /// Together with `CREATE`, fail if the file already exists.
        const EXCL = 0x2;
    }
}

/// Device geometry as reported by the storage driver.
///
/// All quantities are fixed for the lifetime of the device.
#[derive(Clone, Copy, Debug, Default, Eq, PartialEq)]
#[cfg_attr(feature = "serde", derive(serde::Serialize, serde::Deserialize))]
pub struct Geometry {
    /// Minimum read and allocation unit, in bytes.
    pub page_size: usize,
    /// Pages per erasable sector.
    pub pages_per_sector: usize,
    /// Pages per block. Informational only.
    pub pages_per_block: usize,
    /// Number of pages on the device.
    pub total_pages: usize,
}

impl Geometry {
    pub const fn sector_size(&self) -> usize {
        self.page_size * self.pages_per_sector
    }

    pub const fn sector_count(&self) -> usize {
        self.total_pages / self.pages_per_sector
    }

    pub const fn block_size(&self) -> usize {
        self.page_size * self.pages_per_block
    }

    pub const fn total_size(&self) -> usize {
        self.page_size * self.total_pages
    }

    pub const fn pages_for(&self, bytes: usize) -> usize {
        bytes.div_ceil(self.page_size)
    }
}

/// A contiguous run of pages, by absolute page number.
#[derive(Clone, Copy, Debug, Default, Eq, Hash, PartialEq)]
#[cfg_attr(feature = "serde", derive(serde::Serialize, serde::Deserialize))]
pub struct Extent {
    pub start: u32,
    pub count: u32,
}

impl Extent {
    pub const fn new(start: u32, count: u32) -> Self {
        Self { start, count }
    }

    /// First page after the run.
    pub const fn end(&self) -> u32 {
        self.start + self.count
    }

    pub const fn is_empty(&self) -> bool {
        self.count == 0
    }

    pub const fn contains(&self, page: u32) -> bool {
        page >= self.start && page < self.end()
    }
}

/// Identity of a logical caller.
///
/// Each caller owns one read and one write cursor on every file it opens.
#[derive(Clone, Copy, Debug, Default, Eq, Hash, PartialEq, PartialOrd, Ord)]
#[cfg_attr(feature = "serde", derive(serde::Serialize, serde::Deserialize))]
pub struct Caller(pub u8);

/// Selects one of the two cursors a caller holds on a file.
#[derive(Clone, Copy, Debug, Eq, Hash, PartialEq)]
pub enum Cursor {
    Read,
    Write,
}

/// What the metadata tables know about a file.
#[derive(Clone, Debug, Eq, PartialEq)]
#[cfg_attr(feature = "serde", derive(serde::Serialize, serde::Deserialize))]
pub struct Metadata {
    id: u16,
    extents: usize,
    capacity: usize,
}

impl Metadata {
    pub fn new(id: u16, extents: usize, capacity: usize) -> Self {
        Self {
            id,
            extents,
            capacity,
        }
    }

    /// Identifier shared by the file-info entry and its extents.
    pub fn id(&self) -> u16 {
        self.id
    }

    /// Number of page runs backing the file.
    pub fn extents(&self) -> usize {
        self.extents
    }

    /// Allocated bytes, always a whole number of pages.
    pub fn capacity(&self) -> usize {
        self.capacity
    }
}
