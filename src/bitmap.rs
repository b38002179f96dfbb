//! Page-use bitmap allocator.
//!
//! One bit per data page, least significant bit first, `1` meaning free. Bit `i` of the zone
//! tracks page `data_start + i`. A run never spans two bitmap sectors.

use log::trace;

use crate::{
    driver::Storage,
    io::{Error, Result},
    volume::Volume,
    Extent,
};

fn is_free(bytes: &[u8], bit: usize) -> bool {
    bytes[bit / 8] & (1 << (bit % 8)) != 0
}

fn set_bits(bytes: &mut [u8], first: usize, count: usize, free: bool) {
    for bit in first..first + count {
        let mask = 1 << (bit % 8);
        if free {
            bytes[bit / 8] |= mask;
        } else {
            bytes[bit / 8] &= !mask;
        }
    }
}

#[derive(Clone, Copy, Debug, Default)]
struct Run {
    /// Zone-relative bitmap sector.
    sector: usize,
    offset: usize,
    len: usize,
}

impl<S: Storage> Volume<'_, S> {
    /// Reserve `pages` contiguous pages.
    ///
    /// Returns the first exact fit. Without one, the longest free run found is reserved and
    /// returned instead, so the result may be shorter than requested and the caller has to
    /// allocate the shortfall separately. Fails with [`Error::NO_SPACE`] only when no page is free.
    pub(crate) fn allocate(&mut self, pages: usize) -> Result<Extent> {
        if pages == 0 {
            return Err(Error::INVALID);
        }
        let mut longest = Run::default();
        for sector in 0..self.layout.bitmap().len() {
            let bits = self.layout.bits_in(sector);
            if bits == 0 {
                break;
            }
            self.load(self.layout.bitmap().start + sector)?;
            let bytes = self.cache.bytes();
            let mut run = Run {
                sector,
                offset: 0,
                len: 0,
            };
            for bit in 0..bits {
                if !is_free(bytes, bit) {
                    run.len = 0;
                    continue;
                }
                if run.len == 0 {
                    run.offset = bit;
                }
                run.len += 1;
                if run.len > longest.len {
                    longest = run;
                }
                if run.len == pages {
                    return self.reserve(run);
                }
            }
        }
        if longest.len == 0 {
            return Err(Error::NO_SPACE);
        }
        trace!("allocate {}: only {} contiguous", pages, longest.len);
        self.reserve(longest)
    }

    fn reserve(&mut self, run: Run) -> Result<Extent> {
        self.load(self.layout.bitmap().start + run.sector)?;
        set_bits(self.cache.bytes_mut(), run.offset, run.len, false);
        self.cache.mark_dirty();
        let start =
            self.layout.data_start() + run.sector * self.layout.bits_per_sector() + run.offset;
        trace!("reserved {}+{}", start, run.len);
        Ok(Extent::new(start as u32, run.len as u32))
    }

    /// Return page runs to the bitmap.
    ///
    /// Every run is checked against the data zone before any bit is touched.
    pub(crate) fn free(&mut self, extents: &[Extent]) -> Result<()> {
        if !extents.iter().all(|extent| self.layout.in_data_zone(extent)) {
            return Err(Error::INVALID);
        }
        let per_sector = self.layout.bits_per_sector();
        for extent in extents {
            // locate the owning bitmap sector for each run on its own
            let mut bit = extent.start as usize - self.layout.data_start();
            let mut remaining = extent.count as usize;
            while remaining > 0 {
                let sector = bit / per_sector;
                let offset = bit % per_sector;
                let len = remaining.min(per_sector - offset);
                self.load(self.layout.bitmap().start + sector)?;
                set_bits(self.cache.bytes_mut(), offset, len, true);
                self.cache.mark_dirty();
                bit += len;
                remaining -= len;
            }
            trace!("freed {}+{}", extent.start, extent.count);
        }
        Ok(())
    }

    /// Number of free data pages.
    pub(crate) fn count_free(&mut self) -> Result<usize> {
        let mut free = 0;
        for sector in 0..self.layout.bitmap().len() {
            let bits = self.layout.bits_in(sector);
            if bits == 0 {
                break;
            }
            self.load(self.layout.bitmap().start + sector)?;
            let bytes = self.cache.bytes();
            free += (0..bits).filter(|bit| is_free(bytes, *bit)).count();
        }
        Ok(free)
    }
}
