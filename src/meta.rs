//! File-info and extent tables.

use heapless::Vec;
use log::{debug, warn};

use crate::{
    consts::{EXTENTS_MAX, EXTENTS_PER_FILE_MAX, FILES_MAX},
    driver::Storage,
    io::{Error, Result},
    layout::{ExtentRecord, FileRecord, Header, Slot, HEADER_SIZE},
    volume::Volume,
    Extent, Metadata, Name,
};

pub(crate) type Extents = Vec<Extent, EXTENTS_PER_FILE_MAX>;

/// A live file-info entry and its slot in the table.
#[derive(Clone, Copy, Debug, Eq, PartialEq)]
pub(crate) struct Entry {
    pub index: usize,
    pub record: FileRecord,
}

impl<S: Storage> Volume<'_, S> {
    /// Check the superblock version with a single page read.
    pub(crate) fn probe(&mut self) -> Result<()> {
        let page = self.layout.info().start * self.layout.pages_per_sector();
        let page_size = self.layout.page_size();
        let bytes = self.cache.load_page(&mut self.device, page, page_size)?;
        if !Header::decode(&bytes[..HEADER_SIZE]).is_current() {
            warn!("superblock version mismatch, format required");
            return Err(Error::VERSION_MISMATCH);
        }
        Ok(())
    }

    fn checked_header(&mut self) -> Result<Header> {
        let header = self.read_header()?;
        if header.is_current() {
            Ok(header)
        } else {
            Err(Error::VERSION_MISMATCH)
        }
    }

    pub(crate) fn lookup(&mut self, name: &Name) -> Result<Option<Entry>> {
        self.checked_header()?;
        for index in 0..self.layout.files.count() {
            if let Slot::Occupied(record) = self.read_file(index)? {
                if record.name == *name {
                    return Ok(Some(Entry { index, record }));
                }
            }
        }
        Ok(None)
    }

    /// The file's page runs, in sequence order.
    pub(crate) fn extents_of(&mut self, record: &FileRecord) -> Result<Extents> {
        let mut found: Vec<(u16, Extent), EXTENTS_PER_FILE_MAX> = Vec::new();
        for index in 0..self.layout.extents.count() {
            if let Slot::Occupied(extent) = self.read_extent(index)? {
                if extent.file_id == record.id {
                    found
                        .push((extent.seq, extent.extent))
                        .map_err(|_| Error::NO_MEMORY)?;
                }
            }
        }
        found.sort_unstable_by_key(|(seq, _)| *seq);
        let complete = found.len() == record.extent_count as usize
            && found
                .iter()
                .enumerate()
                .all(|(i, (seq, extent))| *seq as usize == i && self.layout.in_data_zone(extent));
        if !complete {
            warn!("{}: extent table is inconsistent", record.name);
            return Err(Error::CORRUPTION);
        }
        Ok(found.iter().map(|(_, extent)| *extent).collect())
    }

    pub(crate) fn metadata(&mut self, name: &Name) -> Result<Metadata> {
        let entry = self.lookup(name)?.ok_or(Error::NO_SUCH_ENTRY)?;
        let extents = self.extents_of(&entry.record)?;
        let pages: usize = extents.iter().map(|extent| extent.count as usize).sum();
        Ok(Metadata::new(
            entry.record.id,
            extents.len(),
            pages * self.layout.page_size(),
        ))
    }

    /// Allocate `size` bytes of pages and record a new file.
    ///
    /// Writes stay in the cache, nothing is flushed. On failure every reserved page is
    /// returned to the bitmap.
    pub(crate) fn create(&mut self, name: &Name, size: usize) -> Result<(Entry, Extents)> {
        if size == 0 {
            return Err(Error::INVALID);
        }
        let header = self.checked_header()?;
        if self.lookup(name)?.is_some() {
            return Err(Error::ENTRY_ALREADY_EXISTED);
        }
        if header.file_count as usize >= FILES_MAX {
            return Err(Error::TABLE_FULL);
        }

        let pages = size.div_ceil(self.layout.page_size());
        let runs = self.allocate_all(pages)?;
        match self.record(name, &runs, header) {
            Ok(entry) => {
                debug!("created {} ({} pages in {} runs)", name, pages, runs.len());
                Ok((entry, runs))
            }
            Err(error) => {
                self.release(&runs);
                Err(error)
            }
        }
    }

    /// Keep allocating until `pages` are covered, one run per call.
    fn allocate_all(&mut self, pages: usize) -> Result<Extents> {
        let mut runs = Extents::new();
        let mut remaining = pages;
        while remaining > 0 {
            let run = match self.allocate(remaining) {
                Ok(run) => run,
                Err(error) => {
                    self.release(&runs);
                    return Err(error);
                }
            };
            if let Err(run) = runs.push(run) {
                self.release(&runs);
                self.release(&[run]);
                return Err(Error::NO_MEMORY);
            }
            remaining -= run.count as usize;
        }
        Ok(runs)
    }

    fn release(&mut self, runs: &[Extent]) {
        if let Err(error) = self.free(runs) {
            warn!("could not release {} runs: {}", runs.len(), error.code());
        }
    }

    fn record(&mut self, name: &Name, runs: &[Extent], mut header: Header) -> Result<Entry> {
        let mut file_slot = None;
        for index in 0..self.layout.files.count() {
            if self.read_file(index)? == Slot::Free {
                file_slot = Some(index);
                break;
            }
        }
        let index = file_slot.ok_or(Error::TABLE_FULL)?;

        let mut extent_slots: Vec<usize, EXTENTS_PER_FILE_MAX> = Vec::new();
        for slot in 0..self.layout.extents.count() {
            if extent_slots.len() == runs.len() {
                break;
            }
            if self.read_extent(slot)? == Slot::Free {
                extent_slots.push(slot).map_err(|_| Error::NO_MEMORY)?;
            }
        }
        if extent_slots.len() < runs.len() {
            return Err(Error::TABLE_FULL);
        }

        let record = FileRecord {
            name: *name,
            id: index as u16,
            extent_count: runs.len() as u16,
        };
        let mut written = 0;
        if let Err(error) = self.write_records(&record, index, &extent_slots, runs, &mut written) {
            // a failed write-back keeps its sector resident, so the slots are cleared there
            self.clear_slots(index, &extent_slots[..written.saturating_sub(1)], written > 0);
            return Err(error);
        }
        header.file_count += 1;
        if let Err(error) = self.write_header(&header) {
            self.clear_slots(index, &extent_slots, true);
            return Err(error);
        }
        Ok(Entry { index, record })
    }

    /// `written` counts the file slot and then each extent slot stored so far.
    fn write_records(
        &mut self,
        record: &FileRecord,
        index: usize,
        extent_slots: &[usize],
        runs: &[Extent],
        written: &mut usize,
    ) -> Result<()> {
        self.write_file(index, &Slot::Occupied(*record))?;
        *written += 1;
        for (seq, (slot, run)) in extent_slots.iter().zip(runs).enumerate() {
            let extent = ExtentRecord {
                file_id: record.id,
                seq: seq as u16,
                extent: *run,
            };
            self.write_extent(*slot, &Slot::Occupied(extent))?;
            *written += 1;
        }
        Ok(())
    }

    fn clear_slots(&mut self, index: usize, extent_slots: &[usize], file_slot: bool) {
        for slot in extent_slots.iter().rev() {
            if let Err(error) = self.write_extent(*slot, &Slot::Free) {
                warn!("could not clear extent slot {}: {}", slot, error.code());
            }
        }
        if file_slot {
            if let Err(error) = self.write_file(index, &Slot::Free) {
                warn!("could not clear file slot {}: {}", index, error.code());
            }
        }
    }

    /// Drop the entry, its extents and its pages. The table is not compacted.
    ///
    /// If the records cannot all be cleared the ones already cleared are put back and the file
    /// stays intact. The pages are released last.
    pub(crate) fn delete(&mut self, entry: &Entry) -> Result<()> {
        let header = self.checked_header()?;
        let mut owned: Vec<(usize, ExtentRecord), EXTENTS_MAX> = Vec::new();
        for index in 0..self.layout.extents.count() {
            if let Slot::Occupied(extent) = self.read_extent(index)? {
                if extent.file_id == entry.record.id {
                    owned.push((index, extent)).map_err(|_| Error::NO_MEMORY)?;
                }
            }
        }
        let runs: Vec<Extent, EXTENTS_MAX> =
            owned.iter().map(|(_, record)| record.extent).collect();
        if !runs.iter().all(|run| self.layout.in_data_zone(run)) {
            return Err(Error::CORRUPTION);
        }

        let mut cleared = 0;
        if let Err(error) = self.clear_records(entry, &owned, header, &mut cleared) {
            self.restore_records(entry, &owned[..cleared.saturating_sub(1)], cleared > 0);
            return Err(error);
        }
        self.free(&runs)?;
        debug!("deleted {} ({} runs)", entry.record.name, runs.len());
        Ok(())
    }

    /// `cleared` counts the file slot and then each extent slot freed so far.
    fn clear_records(
        &mut self,
        entry: &Entry,
        owned: &[(usize, ExtentRecord)],
        mut header: Header,
        cleared: &mut usize,
    ) -> Result<()> {
        self.write_file(entry.index, &Slot::Free)?;
        *cleared += 1;
        for (index, _) in owned {
            self.write_extent(*index, &Slot::Free)?;
            *cleared += 1;
        }
        header.file_count = header.file_count.saturating_sub(1);
        self.write_header(&header)
    }

    fn restore_records(
        &mut self,
        entry: &Entry,
        owned: &[(usize, ExtentRecord)],
        file_slot: bool,
    ) {
        for (index, record) in owned.iter().rev() {
            if let Err(error) = self.write_extent(*index, &Slot::Occupied(*record)) {
                warn!("could not restore extent slot {}: {}", index, error.code());
            }
        }
        if file_slot {
            if let Err(error) = self.write_file(entry.index, &Slot::Occupied(entry.record)) {
                warn!("could not restore {}: {}", entry.record.name, error.code());
            }
        }
    }

    /// Erase the file-info and bitmap zones and write a fresh superblock.
    ///
    /// Unflushed changes are dropped. Data pages are left as they are.
    pub(crate) fn format(&mut self) -> Result<()> {
        let sector_size = self.layout.sector_size();
        let start = self.layout.info().start;
        let end = self.layout.bitmap().end;
        self.cache.invalidate();
        self.device
            .erase(start * sector_size, (end - start) * sector_size)?;
        self.cache.assume_erased(start);
        self.write_header(&Header::new())?;
        self.flush()?;
        debug!("formatted, {} data pages", self.layout.data_pages());
        Ok(())
    }
}
