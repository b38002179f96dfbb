//! Zone layout and the on-flash record formats.
//!
//! The device is split into four ordered zones:
//!
//! ```text
//! | file-info | page-use bitmap | data ... | reserved |
//! ```
//!
//! The file-info zone starts with the superblock header, followed by the file-info table and
//! then the extent table. Records never straddle a sector boundary. Integers are little endian.

use core::cmp;

use ufmt::derive::uDebug;

use crate::{
    consts,
    io::{Error, Result},
    Extent, Geometry, Name,
};

/// `version[16] file_count:u16 reserved:u16`
pub const HEADER_SIZE: usize = 20;
/// `name[28] id:u16 extent_count:u16`
pub const FILE_RECORD_SIZE: usize = consts::NAME_MAX_PLUS_ONE + 4;
/// `file_id:u16 seq:u16 start:u32 count:u32`
pub const EXTENT_RECORD_SIZE: usize = 12;

const VERSION_SIZE: usize = 16;
const FREE_ID: u16 = 0xffff;

/// A run of whole sectors.
#[derive(Clone, Copy, Debug, uDebug, Eq, PartialEq)]
#[cfg_attr(feature = "serde", derive(serde::Serialize, serde::Deserialize))]
pub struct Zone {
    pub start: usize,
    pub end: usize,
}

impl Zone {
    pub fn len(&self) -> usize {
        self.end - self.start
    }

    pub fn is_empty(&self) -> bool {
        self.start == self.end
    }
}

/// Placement of a table of fixed-size records inside the file-info zone.
#[derive(Clone, Copy, Debug, uDebug, Eq, PartialEq)]
#[cfg_attr(feature = "serde", derive(serde::Serialize, serde::Deserialize))]
pub struct RecordRegion {
    sector_size: usize,
    first_sector: usize,
    first_offset: usize,
    record_size: usize,
    count: usize,
}

impl RecordRegion {
    fn new(
        sector_size: usize,
        (first_sector, first_offset): (usize, usize),
        record_size: usize,
        count: usize,
    ) -> Self {
        Self {
            sector_size,
            first_sector,
            first_offset,
            record_size,
            count,
        }
    }

    pub fn count(&self) -> usize {
        self.count
    }

    /// Sector and byte offset of record `index`.
    pub fn locate(&self, index: usize) -> (usize, usize) {
        let first_fit = (self.sector_size - self.first_offset) / self.record_size;
        if index < first_fit {
            return (
                self.first_sector,
                self.first_offset + index * self.record_size,
            );
        }
        let per_sector = self.sector_size / self.record_size;
        let rest = index - first_fit;
        (
            self.first_sector + 1 + rest / per_sector,
            (rest % per_sector) * self.record_size,
        )
    }

    /// Position right after the last record.
    fn end(&self) -> (usize, usize) {
        if self.count == 0 {
            return (self.first_sector, self.first_offset);
        }
        let (sector, offset) = self.locate(self.count - 1);
        (sector, offset + self.record_size)
    }
}

/// Zone boundaries, computed once from the device geometry.
#[derive(Clone, Copy, Debug, uDebug, Eq, PartialEq)]
#[cfg_attr(feature = "serde", derive(serde::Serialize, serde::Deserialize))]
pub struct Layout {
    page_size: usize,
    pages_per_sector: usize,
    total_pages: usize,
    info: Zone,
    bitmap: Zone,
    data_start: usize,
    data_pages: usize,
    pub(crate) files: RecordRegion,
    pub(crate) extents: RecordRegion,
}

impl Layout {
    /// Fails with [`Error::INVALID`] if the geometry leaves no data pages or cannot hold the
    /// fixed tables.
    pub fn new(geometry: &Geometry, reserved_size: usize) -> Result<Self> {
        let page_size = geometry.page_size;
        let pages_per_sector = geometry.pages_per_sector;
        let sector_size = geometry.sector_size();
        if page_size < HEADER_SIZE
            || pages_per_sector == 0
            || sector_size < HEADER_SIZE + FILE_RECORD_SIZE
        {
            return Err(Error::INVALID);
        }

        let files = RecordRegion::new(
            sector_size,
            (0, HEADER_SIZE),
            FILE_RECORD_SIZE,
            consts::FILES_MAX,
        );
        let extents = RecordRegion::new(
            sector_size,
            files.end(),
            EXTENT_RECORD_SIZE,
            consts::EXTENTS_MAX,
        );
        let (last_sector, _) = extents.locate(consts::EXTENTS_MAX - 1);
        let info = Zone {
            start: 0,
            end: last_sector + 1,
        };

        // whole sectors only, the tail of a partial sector is never used
        let usable_pages = geometry.sector_count() * pages_per_sector;
        // the data zone ends on a sector boundary so flushes never erase reserved bytes
        let reserved_pages = geometry
            .pages_for(reserved_size)
            .next_multiple_of(pages_per_sector);
        let bits_per_sector = sector_size * 8;

        let mut bitmap_sectors = 1;
        let data_pages = loop {
            let used = (info.end + bitmap_sectors) * pages_per_sector + reserved_pages;
            let remaining = usable_pages.checked_sub(used).ok_or(Error::INVALID)?;
            if bitmap_sectors * bits_per_sector >= remaining {
                break remaining;
            }
            bitmap_sectors += 1;
        };
        if data_pages == 0 {
            return Err(Error::INVALID);
        }

        let bitmap = Zone {
            start: info.end,
            end: info.end + bitmap_sectors,
        };
        let data_start = bitmap.end * pages_per_sector;

        Ok(Self {
            page_size,
            pages_per_sector,
            total_pages: geometry.total_pages,
            info,
            bitmap,
            data_start,
            data_pages,
            files,
            extents,
        })
    }

    pub fn page_size(&self) -> usize {
        self.page_size
    }

    pub fn sector_size(&self) -> usize {
        self.page_size * self.pages_per_sector
    }

    pub fn pages_per_sector(&self) -> usize {
        self.pages_per_sector
    }

    pub fn total_pages(&self) -> usize {
        self.total_pages
    }

    /// Sectors holding the header, file-info table and extent table.
    pub fn info(&self) -> Zone {
        self.info
    }

    /// Sectors holding the page-use bitmap.
    pub fn bitmap(&self) -> Zone {
        self.bitmap
    }

    /// First data page.
    pub fn data_start(&self) -> usize {
        self.data_start
    }

    pub fn data_pages(&self) -> usize {
        self.data_pages
    }

    /// First page of the reserved tail.
    pub fn reserved_start(&self) -> usize {
        self.data_start + self.data_pages
    }

    pub(crate) fn bits_per_sector(&self) -> usize {
        self.sector_size() * 8
    }

    /// Number of valid bits in bitmap sector `index` (zone relative).
    pub(crate) fn bits_in(&self, index: usize) -> usize {
        let first = index * self.bits_per_sector();
        cmp::min(
            self.bits_per_sector(),
            self.data_pages.saturating_sub(first),
        )
    }

    pub(crate) fn in_data_zone(&self, extent: &Extent) -> bool {
        let start = extent.start as usize;
        let end = start + extent.count as usize;
        extent.count > 0 && start >= self.data_start && end <= self.reserved_start()
    }
}

/// Superblock header.
#[derive(Clone, Copy, Debug, Eq, PartialEq)]
pub struct Header {
    version: [u8; VERSION_SIZE],
    pub file_count: u16,
}

impl Header {
    pub fn new() -> Self {
        let mut version = [0; VERSION_SIZE];
        let tag = consts::VERSION.as_bytes();
        version[..tag.len()].copy_from_slice(tag);
        Self {
            version,
            file_count: 0,
        }
    }

    pub fn is_current(&self) -> bool {
        self.version == Self::new().version
    }

    pub fn decode(bytes: &[u8]) -> Self {
        let mut version = [0; VERSION_SIZE];
        version.copy_from_slice(&bytes[..VERSION_SIZE]);
        Self {
            version,
            file_count: u16::from_le_bytes([bytes[16], bytes[17]]),
        }
    }

    pub fn encode(&self, out: &mut [u8]) {
        out[..VERSION_SIZE].copy_from_slice(&self.version);
        out[16..18].copy_from_slice(&self.file_count.to_le_bytes());
        out[18..HEADER_SIZE].fill(consts::ERASED);
    }
}

impl Default for Header {
    fn default() -> Self {
        Self::new()
    }
}

/// A table slot, free on flash when filled with the erased pattern.
#[derive(Clone, Copy, Debug, Eq, PartialEq)]
pub enum Slot<T> {
    Free,
    Occupied(T),
}

/// File-info entry.
#[derive(Clone, Copy, Debug, Eq, PartialEq)]
pub struct FileRecord {
    pub name: Name,
    pub id: u16,
    pub extent_count: u16,
}

impl FileRecord {
    pub fn decode(bytes: &[u8]) -> Result<Slot<Self>> {
        let name_field = &bytes[..consts::NAME_MAX_PLUS_ONE];
        let tail = &bytes[consts::NAME_MAX_PLUS_ONE..FILE_RECORD_SIZE];
        let id = u16::from_le_bytes([tail[0], tail[1]]);
        if id == FREE_ID {
            return Ok(Slot::Free);
        }
        let name = Name::from_nul_padded(name_field).map_err(|_| Error::CORRUPTION)?;
        Ok(Slot::Occupied(Self {
            name,
            id,
            extent_count: u16::from_le_bytes([tail[2], tail[3]]),
        }))
    }

    pub fn encode(slot: &Slot<Self>, out: &mut [u8]) {
        let out = &mut out[..FILE_RECORD_SIZE];
        match slot {
            Slot::Free => out.fill(consts::ERASED),
            Slot::Occupied(record) => {
                let (name_field, tail) = out.split_at_mut(consts::NAME_MAX_PLUS_ONE);
                name_field.fill(0);
                name_field[..record.name.len()].copy_from_slice(record.name.as_bytes());
                tail[..2].copy_from_slice(&record.id.to_le_bytes());
                tail[2..4].copy_from_slice(&record.extent_count.to_le_bytes());
            }
        }
    }
}

/// Extent entry.
#[derive(Clone, Copy, Debug, Eq, PartialEq)]
pub struct ExtentRecord {
    pub file_id: u16,
    pub seq: u16,
    pub extent: Extent,
}

impl ExtentRecord {
    pub fn decode(bytes: &[u8]) -> Slot<Self> {
        let file_id = u16::from_le_bytes([bytes[0], bytes[1]]);
        if file_id == FREE_ID {
            return Slot::Free;
        }
        let word = |at: usize| {
            u32::from_le_bytes([bytes[at], bytes[at + 1], bytes[at + 2], bytes[at + 3]])
        };
        Slot::Occupied(Self {
            file_id,
            seq: u16::from_le_bytes([bytes[2], bytes[3]]),
            extent: Extent::new(word(4), word(8)),
        })
    }

    pub fn encode(slot: &Slot<Self>, out: &mut [u8]) {
        let out = &mut out[..EXTENT_RECORD_SIZE];
        match slot {
            Slot::Free => out.fill(consts::ERASED),
            Slot::Occupied(record) => {
                out[..2].copy_from_slice(&record.file_id.to_le_bytes());
                out[2..4].copy_from_slice(&record.seq.to_le_bytes());
                out[4..8].copy_from_slice(&record.extent.start.to_le_bytes());
                out[8..12].copy_from_slice(&record.extent.count.to_le_bytes());
            }
        }
    }
}
