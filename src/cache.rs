//! The single-sector write-back cache.
//!
//! Every metadata, bitmap and data access goes through the one resident sector. A dirty sector is
//! erased and reprogrammed before another sector is brought in.

use log::trace;

use crate::{
    consts,
    driver::{Buffer, Device, Storage},
    io::{Error, Result},
};

pub(crate) struct SectorCache<B: Buffer> {
    buf: B,
    sector_size: usize,
    resident: Option<usize>,
    dirty: bool,
}

impl<B: Buffer> SectorCache<B> {
    /// Fails with [`Error::NO_MEMORY`] if `B` cannot hold a sector.
    pub fn new(sector_size: usize) -> Result<Self> {
        let mut buf = B::empty();
        buf.set_len(sector_size).map_err(|_| Error::NO_MEMORY)?;
        Ok(Self {
            buf,
            sector_size,
            resident: None,
            dirty: false,
        })
    }

    pub fn resident(&self) -> Option<usize> {
        self.resident
    }

    pub fn is_dirty(&self) -> bool {
        self.dirty
    }

    pub fn mark_dirty(&mut self) {
        debug_assert!(self.resident.is_some());
        self.dirty = true;
    }

    pub fn bytes(&self) -> &[u8] {
        &self.buf.as_slice()[..self.sector_size]
    }

    /// Changes must be followed by [`mark_dirty`](Self::mark_dirty).
    pub fn bytes_mut(&mut self) -> &mut [u8] {
        &mut self.buf.as_mut_slice()[..self.sector_size]
    }

    /// Make `sector` resident, writing back a dirty sector first.
    ///
    /// On a failed write-back nothing changes. On a failed read nothing is resident.
    pub fn ensure_resident<S: Storage>(
        &mut self,
        device: &mut Device<'_, S>,
        sector: usize,
    ) -> Result<()> {
        if self.resident == Some(sector) {
            return Ok(());
        }
        self.flush(device)?;
        trace!("cache: {:?} -> {}", self.resident, sector);
        let sector_size = self.sector_size;
        if let Err(e) = device.read_sector(sector, &mut self.buf.as_mut_slice()[..sector_size]) {
            self.resident = None;
            return Err(e);
        }
        self.resident = Some(sector);
        Ok(())
    }

    /// Write back the resident sector if it is dirty.
    pub fn flush<S: Storage>(&mut self, device: &mut Device<'_, S>) -> Result<()> {
        match self.resident {
            Some(sector) if self.dirty => {
                trace!("cache: flush {}", sector);
                device.rewrite_sector(sector, self.bytes())?;
                self.dirty = false;
                Ok(())
            }
            _ => Ok(()),
        }
    }

    /// Read a single page into the front of the buffer, leaving nothing resident.
    pub fn load_page<S: Storage>(
        &mut self,
        device: &mut Device<'_, S>,
        page: usize,
        page_size: usize,
    ) -> Result<&[u8]> {
        self.flush(device)?;
        self.resident = None;
        device.read_page(page, &mut self.buf.as_mut_slice()[..page_size])?;
        Ok(&self.buf.as_slice()[..page_size])
    }

    /// Adopt `sector` as resident with erased content, as it is on flash right after an erase.
    pub fn assume_erased(&mut self, sector: usize) {
        self.bytes_mut().fill(consts::ERASED);
        self.resident = Some(sector);
        self.dirty = false;
    }

    /// Forget the resident sector, dropping unflushed changes.
    pub fn invalidate(&mut self) {
        self.resident = None;
        self.dirty = false;
    }
}
