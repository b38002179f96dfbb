//! The `Storage` driver and the mutual-exclusion hook around it.
#![allow(non_camel_case_types)]

use log::error;

use crate::io::{Error, Result};
use crate::Geometry;

mod private {
    pub struct NotEnoughCapacity;
    pub trait Sealed {
        /// The bytes of the sector buffer, at least as many as the last successful
        /// [`set_len`](Sealed::set_len) asked for.
        fn as_slice(&self) -> &[u8];
        /// Mutable view of [`as_slice`](Sealed::as_slice).
        fn as_mut_slice(&mut self) -> &mut [u8];

        /// Make room for one sector of `len` bytes.
        fn set_len(&mut self, len: usize) -> Result<(), NotEnoughCapacity>;

        /// An empty buffer, before `set_len`.
        fn empty() -> Self;
    }
}

/// A sector buffer: `[u8; N]`, or `Vec<u8>` with the `alloc` feature.
pub trait Buffer: private::Sealed {}

impl<const N: usize> private::Sealed for [u8; N] {
    fn as_slice(&self) -> &[u8] {
        self
    }

    fn as_mut_slice(&mut self) -> &mut [u8] {
        self
    }

    fn set_len(&mut self, len: usize) -> Result<(), private::NotEnoughCapacity> {
        if len > N {
            Err(private::NotEnoughCapacity)
        } else {
            Ok(())
        }
    }

    fn empty() -> Self {
        [0; N]
    }
}

impl<const N: usize> Buffer for [u8; N] {}

#[cfg(feature = "alloc")]
impl private::Sealed for alloc::vec::Vec<u8> {
    fn as_slice(&self) -> &[u8] {
        self
    }

    fn as_mut_slice(&mut self) -> &mut [u8] {
        self
    }

    fn set_len(&mut self, len: usize) -> Result<(), private::NotEnoughCapacity> {
        self.resize(len, 0);
        Ok(())
    }

    fn empty() -> Self {
        Self::new()
    }
}

#[cfg(feature = "alloc")]
impl Buffer for alloc::vec::Vec<u8> {}

/// Users of this library provide a "storage driver" by implementing this trait.
///
/// Pages are the read and allocation unit, sectors the erase and program unit.
/// The filesystem only ever programs whole sectors, always after erasing them.
pub trait Storage {
    /// Buffer holding the one resident sector, at least `sector_size` bytes.
    type SECTOR_BUFFER: Buffer;

    /// Bring up the device. A failure disables the filesystem for good.
    fn init(&mut self) -> Result<()> {
        Ok(())
    }

    /// Queried once at initialization.
    fn geometry(&self) -> Geometry;

    /// Bytes at the end of the device the filesystem must never touch.
    fn reserved_size(&self) -> usize {
        0
    }

    /// Read one page. `buf` is exactly one page long.
    fn read_page(&mut self, page: usize, buf: &mut [u8]) -> Result<usize>;
    /// Read one sector. `buf` is exactly one sector long.
    fn read_sector(&mut self, sector: usize, buf: &mut [u8]) -> Result<usize>;
    /// Program one erased sector. `data` is exactly one sector long.
    fn write_sector(&mut self, sector: usize, data: &[u8]) -> Result<usize>;
    /// Erase one sector.
    fn erase_sector(&mut self, sector: usize) -> Result<usize>;
    /// Erase a byte range. Guaranteed to be sector aligned.
    fn erase(&mut self, off: usize, len: usize) -> Result<usize>;

    fn close(&mut self) -> Result<()> {
        Ok(())
    }
}

/// A global mutual-exclusion region around device transactions.
///
/// The region is entered for the duration of a single read, or erase and program,
/// never while metadata is scanned in RAM.
pub trait Exclusion {
    fn acquire(&self);
    fn release(&self);
}

/// For single-threaded use.
#[derive(Clone, Copy, Debug, Default)]
pub struct NoExclusion;

impl Exclusion for NoExclusion {
    fn acquire(&self) {}
    fn release(&self) {}
}

struct Critical<'e>(&'e dyn Exclusion);

impl<'e> Critical<'e> {
    fn enter(exclusion: &'e dyn Exclusion) -> Self {
        exclusion.acquire();
        Self(exclusion)
    }
}

impl Drop for Critical<'_> {
    fn drop(&mut self) {
        self.0.release();
    }
}

/// Storage plus its exclusion region, as the cache sees it.
pub(crate) struct Device<'a, S: Storage> {
    storage: &'a mut S,
    exclusion: &'a dyn Exclusion,
}

impl<'a, S: Storage> Device<'a, S> {
    pub(crate) fn new(storage: &'a mut S, exclusion: &'a dyn Exclusion) -> Self {
        Self { storage, exclusion }
    }

    pub(crate) fn init(&mut self) -> Result<()> {
        self.storage.init().map_err(|e| {
            error!("storage init failed: {}", e.code());
            Error::DEVICE_UNAVAILABLE
        })
    }

    pub(crate) fn geometry(&self) -> Geometry {
        self.storage.geometry()
    }

    pub(crate) fn reserved_size(&self) -> usize {
        self.storage.reserved_size()
    }

    pub(crate) fn read_page(&mut self, page: usize, buf: &mut [u8]) -> Result<()> {
        let _critical = Critical::enter(self.exclusion);
        self.storage.read_page(page, buf).map(drop).map_err(|e| {
            error!("read_page {} failed: {}", page, e.code());
            e
        })
    }

    pub(crate) fn read_sector(&mut self, sector: usize, buf: &mut [u8]) -> Result<()> {
        let _critical = Critical::enter(self.exclusion);
        self.storage.read_sector(sector, buf).map(drop).map_err(|e| {
            error!("read_sector {} failed: {}", sector, e.code());
            e
        })
    }

    /// Erase then program, as one transaction.
    pub(crate) fn rewrite_sector(&mut self, sector: usize, data: &[u8]) -> Result<()> {
        let _critical = Critical::enter(self.exclusion);
        self.storage
            .erase_sector(sector)
            .and_then(|_| self.storage.write_sector(sector, data))
            .map(drop)
            .map_err(|e| {
                error!("rewrite_sector {} failed: {}", sector, e.code());
                e
            })
    }

    pub(crate) fn erase(&mut self, off: usize, len: usize) -> Result<()> {
        let _critical = Critical::enter(self.exclusion);
        self.storage.erase(off, len).map(drop).map_err(|e| {
            error!("erase {}+{} failed: {}", off, len, e.code());
            e
        })
    }

    pub(crate) fn close(&mut self) -> Result<()> {
        self.storage.close()
    }
}
