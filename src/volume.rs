use crate::{
    cache::SectorCache,
    driver::{Device, Exclusion, Storage},
    io::Result,
    layout::{
        ExtentRecord, FileRecord, Header, Layout, Slot, EXTENT_RECORD_SIZE, FILE_RECORD_SIZE,
        HEADER_SIZE,
    },
    Geometry,
};

/// Device, zone layout and the sector cache. Allocator and metadata operations live on this type.
pub(crate) struct Volume<'a, S: Storage> {
    pub(crate) device: Device<'a, S>,
    pub(crate) cache: SectorCache<S::SECTOR_BUFFER>,
    pub(crate) layout: Layout,
    pub(crate) geometry: Geometry,
}

impl<'a, S: Storage> Volume<'a, S> {
    pub fn new(storage: &'a mut S, exclusion: &'a dyn Exclusion) -> Result<Self> {
        let mut device = Device::new(storage, exclusion);
        device.init()?;
        let geometry = device.geometry();
        let layout = Layout::new(&geometry, device.reserved_size())?;
        let cache = SectorCache::new(layout.sector_size())?;
        Ok(Self {
            device,
            cache,
            layout,
            geometry,
        })
    }

    pub fn flush(&mut self) -> Result<()> {
        self.cache.flush(&mut self.device)
    }

    pub(crate) fn load(&mut self, sector: usize) -> Result<()> {
        self.cache.ensure_resident(&mut self.device, sector)
    }

    /// Copy `record` into the resident sector at `offset`, marking it dirty only on change.
    fn store(&mut self, offset: usize, record: &[u8]) {
        let target = &mut self.cache.bytes_mut()[offset..offset + record.len()];
        if target != record {
            target.copy_from_slice(record);
            self.cache.mark_dirty();
        }
    }

    pub(crate) fn read_header(&mut self) -> Result<Header> {
        self.load(self.layout.info().start)?;
        Ok(Header::decode(&self.cache.bytes()[..HEADER_SIZE]))
    }

    pub(crate) fn write_header(&mut self, header: &Header) -> Result<()> {
        self.load(self.layout.info().start)?;
        let mut bytes = [0; HEADER_SIZE];
        header.encode(&mut bytes);
        self.store(0, &bytes);
        Ok(())
    }

    pub(crate) fn read_file(&mut self, index: usize) -> Result<Slot<FileRecord>> {
        let (sector, offset) = self.layout.files.locate(index);
        self.load(sector)?;
        FileRecord::decode(&self.cache.bytes()[offset..offset + FILE_RECORD_SIZE])
    }

    pub(crate) fn write_file(&mut self, index: usize, slot: &Slot<FileRecord>) -> Result<()> {
        let (sector, offset) = self.layout.files.locate(index);
        self.load(sector)?;
        let mut bytes = [0; FILE_RECORD_SIZE];
        FileRecord::encode(slot, &mut bytes);
        self.store(offset, &bytes);
        Ok(())
    }

    pub(crate) fn read_extent(&mut self, index: usize) -> Result<Slot<ExtentRecord>> {
        let (sector, offset) = self.layout.extents.locate(index);
        self.load(sector)?;
        Ok(ExtentRecord::decode(
            &self.cache.bytes()[offset..offset + EXTENT_RECORD_SIZE],
        ))
    }

    pub(crate) fn write_extent(&mut self, index: usize, slot: &Slot<ExtentRecord>) -> Result<()> {
        let (sector, offset) = self.layout.extents.locate(index);
        self.load(sector)?;
        let mut bytes = [0; EXTENT_RECORD_SIZE];
        ExtentRecord::encode(slot, &mut bytes);
        self.store(offset, &bytes);
        Ok(())
    }

    pub fn close(&mut self) -> Result<()> {
        self.flush()?;
        self.device.close()
    }
}
