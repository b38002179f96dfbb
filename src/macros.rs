// TODO: should add another backend that randomly fails single page reads,
// to exercise the cache recovery paths beyond a whole failing device.
/// A configurable implementation of the Storage trait in memory.
///
/// Programming a sector ANDs the data into the backing bytes, as NOR flash does, so a missing
/// erase shows up as corrupted content. The backend counts sector writes and erases, and can be
/// told to fail initialization, every program and erase, or a single later sector erase.
///
/// The storage only borrows the backend immutably, so the counters and switches can be used
/// while a filesystem is mounted on top of it.
#[macro_export]
macro_rules! ram_storage {
    (

    name=$Name:ident,
    backend=$Backend:ident,
    erase_value=$erase_value:expr,
    page_size=$page_size:expr,
    pages_per_sector=$pages_per_sector:expr,
    pages_per_block=$pages_per_block:expr,
    sector_count=$sector_count:expr,
    reserved_size=$reserved_size:expr,

) => {
        pub struct $Backend {
            buf: core::cell::RefCell<[u8; $page_size * $pages_per_sector * $sector_count]>,
            pub sector_writes: core::cell::Cell<usize>,
            pub sector_erases: core::cell::Cell<usize>,
            pub page_reads: core::cell::Cell<usize>,
            pub fail_init: core::cell::Cell<bool>,
            pub fail_writes: core::cell::Cell<bool>,
            /// Sector erases to let through before exactly one fails.
            pub fail_erase_in: core::cell::Cell<Option<usize>>,
        }

        impl Default for $Backend {
            fn default() -> Self {
                $Backend {
                    buf: core::cell::RefCell::new(
                        [$erase_value; $page_size * $pages_per_sector * $sector_count],
                    ),
                    sector_writes: Default::default(),
                    sector_erases: Default::default(),
                    page_reads: Default::default(),
                    fail_init: Default::default(),
                    fail_writes: Default::default(),
                    fail_erase_in: Default::default(),
                }
            }
        }

        impl $Backend {
            /// Copy raw device bytes, bypassing the filesystem.
            pub fn peek(&self, offset: usize, buf: &mut [u8]) {
                buf.copy_from_slice(&self.buf.borrow()[offset..offset + buf.len()]);
            }

            /// Overwrite raw device bytes, bypassing the filesystem.
            pub fn poke(&self, offset: usize, data: &[u8]) {
                self.buf.borrow_mut()[offset..offset + data.len()].copy_from_slice(data);
            }
        }

        pub struct $Name<'backend> {
            backend: &'backend $Backend,
        }

        impl<'backend> $Name<'backend> {
            const ERASE_VALUE: u8 = $erase_value;
            const SECTOR_SIZE: usize = $page_size * $pages_per_sector;

            pub fn new(backend: &'backend $Backend) -> Self {
                $Name { backend }
            }

            fn check_writable(&self) -> $crate::io::Result<()> {
                if self.backend.fail_writes.get() {
                    Err($crate::io::Error::IO)
                } else {
                    Ok(())
                }
            }
        }

        impl<'backend> $crate::driver::Storage for $Name<'backend> {
            type SECTOR_BUFFER = [u8; $page_size * $pages_per_sector];

            fn init(&mut self) -> $crate::io::Result<()> {
                if self.backend.fail_init.get() {
                    Err($crate::io::Error::IO)
                } else {
                    Ok(())
                }
            }

            fn geometry(&self) -> $crate::Geometry {
                $crate::Geometry {
                    page_size: $page_size,
                    pages_per_sector: $pages_per_sector,
                    pages_per_block: $pages_per_block,
                    total_pages: $pages_per_sector * $sector_count,
                }
            }

            fn reserved_size(&self) -> usize {
                $reserved_size
            }

            fn read_page(&mut self, page: usize, buf: &mut [u8]) -> $crate::io::Result<usize> {
                debug_assert!(buf.len() == $page_size);
                let offset = page * $page_size;
                buf.copy_from_slice(&self.backend.buf.borrow()[offset..offset + buf.len()]);
                self.backend
                    .page_reads
                    .set(self.backend.page_reads.get() + 1);
                Ok(buf.len())
            }

            fn read_sector(&mut self, sector: usize, buf: &mut [u8]) -> $crate::io::Result<usize> {
                debug_assert!(buf.len() == Self::SECTOR_SIZE);
                let offset = sector * Self::SECTOR_SIZE;
                buf.copy_from_slice(&self.backend.buf.borrow()[offset..offset + buf.len()]);
                Ok(buf.len())
            }

            fn write_sector(&mut self, sector: usize, data: &[u8]) -> $crate::io::Result<usize> {
                debug_assert!(data.len() == Self::SECTOR_SIZE);
                self.check_writable()?;
                let offset = sector * Self::SECTOR_SIZE;
                let mut buf = self.backend.buf.borrow_mut();
                for (from, to) in data.iter().zip(buf[offset..].iter_mut()) {
                    *to &= *from;
                }
                self.backend
                    .sector_writes
                    .set(self.backend.sector_writes.get() + 1);
                Ok(data.len())
            }

            fn erase_sector(&mut self, sector: usize) -> $crate::io::Result<usize> {
                self.check_writable()?;
                match self.backend.fail_erase_in.get() {
                    Some(0) => {
                        self.backend.fail_erase_in.set(None);
                        return Err($crate::io::Error::IO);
                    }
                    Some(n) => self.backend.fail_erase_in.set(Some(n - 1)),
                    None => {}
                }
                let offset = sector * Self::SECTOR_SIZE;
                self.backend.buf.borrow_mut()[offset..offset + Self::SECTOR_SIZE]
                    .fill(Self::ERASE_VALUE);
                self.backend
                    .sector_erases
                    .set(self.backend.sector_erases.get() + 1);
                Ok(Self::SECTOR_SIZE)
            }

            fn erase(&mut self, offset: usize, len: usize) -> $crate::io::Result<usize> {
                debug_assert!(offset % Self::SECTOR_SIZE == 0);
                debug_assert!(len % Self::SECTOR_SIZE == 0);
                self.check_writable()?;
                self.backend.buf.borrow_mut()[offset..offset + len].fill(Self::ERASE_VALUE);
                self.backend
                    .sector_erases
                    .set(self.backend.sector_erases.get() + len / Self::SECTOR_SIZE);
                Ok(len)
            }
        }
    };
    ($Name:ident, $Backend:ident, $bytes:expr) => {
        $crate::ram_storage!(
            name = $Name,
            backend = $Backend,
            erase_value = 0xff,
            page_size = 128,
            pages_per_sector = 8,
            pages_per_block = 64,
            sector_count = $bytes / 1024,
            reserved_size = 0,
        );
    };
    (small) => {
        $crate::ram_storage!(
            name = RamStorage,
            backend = Ram,
            erase_value = 0xff,
            page_size = 128,
            pages_per_sector = 8,
            pages_per_block = 64,
            sector_count = 64,
            reserved_size = 0,
        );
    };
    (tiny) => {
        $crate::ram_storage!(
            name = RamStorage,
            backend = Ram,
            erase_value = 0xff,
            page_size = 16,
            pages_per_sector = 8,
            pages_per_block = 64,
            sector_count = 192,
            reserved_size = 0,
        );
    };
}
