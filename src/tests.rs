use core::cell::Cell;

use crate::{
    driver::{Exclusion, Storage},
    fs::{mount_state::Mounted, Filesystem, MountError, OpenOptions},
    io::{prelude::*, Error},
    name, Caller, Cursor, DynFilesystem, Extent, Name, SeekFrom,
};

ram_storage!(small);

mod tiny {
    ram_storage!(tiny);
}

mod broken {
    ram_storage!(
        name = RamStorage,
        backend = Ram,
        erase_value = 0xff,
        page_size = 8,
        pages_per_sector = 8,
        pages_per_block = 8,
        sector_count = 16,
        reserved_size = 0,
    );
}

mod unaligned {
    ram_storage!(
        name = RamStorage,
        backend = Ram,
        erase_value = 0xff,
        page_size = 128,
        pages_per_sector = 8,
        pages_per_block = 64,
        sector_count = 64,
        reserved_size = 100,
    );
}

fn mount_fresh<S: Storage>(storage: &mut S) -> Filesystem<'_, S, Mounted> {
    let fs = Filesystem::init(storage);
    fs.format().unwrap();
    fs.mount().unwrap()
}

fn numbered(i: usize) -> Name {
    Name::try_from(&[b'f', b'0' + (i / 10) as u8, b'0' + (i % 10) as u8][..]).unwrap()
}

#[test]
fn test_format() {
    let ram = Ram::default();
    let mut storage = RamStorage::new(&ram);
    let fs = Filesystem::init(&mut storage);

    // should fail: nothing was ever written
    assert!(!fs.is_mountable());
    let Err(MountError(fs, error)) = fs.mount() else {
        panic!("mounted a blank device");
    };
    assert_eq!(error, Error::VERSION_MISMATCH);
    assert_eq!(fs.last_error(), Some(Error::VERSION_MISMATCH));

    // should succeed
    fs.format().unwrap();
    assert_eq!(fs.last_error(), None);
    assert!(fs.is_mountable());
    let fs = fs.mount().unwrap();
    assert_eq!(fs.open_files(), 0);
    fs.unmount().unwrap().close().unwrap();
}

#[test]
fn test_version_mismatch_is_not_repaired() {
    let ram = Ram::default();
    {
        let mut storage = RamStorage::new(&ram);
        let fs = mount_fresh(&mut storage);
        fs.create(Caller(0), &name!("kept"), 128)
            .unwrap()
            .close()
            .unwrap();
        fs.flush().unwrap();
        fs.close().unwrap();
    }

    // another format revision
    ram.poke(0, b"pagefs-v0");

    let mut storage = RamStorage::new(&ram);
    let fs = Filesystem::init(&mut storage);
    let Err(MountError(fs, error)) = fs.mount() else {
        panic!("mounted a foreign superblock");
    };
    assert_eq!(error, Error::VERSION_MISMATCH);
    // mounting again does not fix it
    let Err(MountError(fs, _)) = fs.mount() else {
        panic!("mount repaired the superblock");
    };
    fs.format().unwrap();
    let fs = fs.mount().unwrap();
    assert!(!fs.exists(&name!("kept")));
}

#[test]
fn test_disabled_device() {
    let ram = Ram::default();
    ram.fail_init.set(true);
    let mut storage = RamStorage::new(&ram);
    let fs = Filesystem::init(&mut storage);

    assert!(fs.layout().is_none());
    assert_eq!(fs.format(), Err(Error::DEVICE_UNAVAILABLE));
    assert_eq!(fs.last_error(), Some(Error::DEVICE_UNAVAILABLE));
    let Err(MountError(fs, error)) = fs.mount() else {
        panic!("mounted a dead device");
    };
    assert_eq!(error, Error::DEVICE_UNAVAILABLE);

    // stays disabled for the lifetime of the filesystem
    ram.fail_init.set(false);
    assert_eq!(fs.format(), Err(Error::DEVICE_UNAVAILABLE));
    assert_eq!(fs.flush(), Err(Error::DEVICE_UNAVAILABLE));
    assert_eq!(ram.sector_writes.get(), 0);
}

#[test]
fn test_unusable_geometry() {
    let ram = broken::Ram::default();
    let mut storage = broken::RamStorage::new(&ram);
    let fs = Filesystem::init(&mut storage);
    assert!(fs.layout().is_none());
    let Err(MountError(_, error)) = fs.mount() else {
        panic!("mounted with 8 byte pages");
    };
    assert_eq!(error, Error::INVALID);
}

#[test]
fn test_create_delete_create() {
    let ram = Ram::default();
    let mut storage = RamStorage::new(&ram);
    let fs = mount_fresh(&mut storage);
    let name = name!("cycle.bin");
    let free = fs.available_space().unwrap();
    assert_eq!(free, fs.total_space());
    assert_eq!(free, 488 * 128);

    let file = fs.create(Caller(0), &name, 4096).unwrap();
    assert_eq!(fs.available_space().unwrap(), free - 4096);
    file.write(b"first life").unwrap();
    assert_eq!(file.len().unwrap(), 10);
    let id = fs.metadata(&name).unwrap().id();
    file.delete().unwrap();

    assert!(!fs.exists(&name));
    assert_eq!(fs.open_files(), 0);
    assert_eq!(fs.available_space().unwrap(), free);
    assert_eq!(fs.metadata(&name), Err(Error::NO_SUCH_ENTRY));

    let file = fs.create(Caller(0), &name, 4096).unwrap();
    assert_eq!(file.len().unwrap(), 0);
    assert_eq!(fs.metadata(&name).unwrap().id(), id);
    file.close().unwrap();
}

#[test]
fn test_create_rejects() {
    let ram = Ram::default();
    let mut storage = RamStorage::new(&ram);
    let fs = mount_fresh(&mut storage);
    let name = name!("once");

    assert_eq!(fs.create(Caller(0), &name, 0).map(drop), Err(Error::INVALID));
    assert!(!fs.exists(&name));

    let file = fs.create(Caller(0), &name, 16).unwrap();
    // open already
    assert_eq!(
        fs.create(Caller(1), &name, 16).map(drop),
        Err(Error::ENTRY_ALREADY_EXISTED)
    );
    file.close().unwrap();
    // only on flash
    assert_eq!(
        fs.create(Caller(1), &name, 16).map(drop),
        Err(Error::ENTRY_ALREADY_EXISTED)
    );
    assert_eq!(
        fs.open(Caller(0), &name!("missing")).map(drop),
        Err(Error::NO_SUCH_ENTRY)
    );
    assert_eq!(fs.last_error(), Some(Error::NO_SUCH_ENTRY));
}

#[test]
fn test_round_trip() {
    let ram = Ram::default();
    let mut storage = RamStorage::new(&ram);
    let fs = mount_fresh(&mut storage);

    let file = fs.create(Caller(0), &name!("round.trip"), 3000).unwrap();
    let capacity = file.du().unwrap();
    assert_eq!(capacity, 24 * 128);

    let mut data = [0u8; 24 * 128];
    for (i, byte) in data.iter_mut().enumerate() {
        *byte = (i * 7 % 251) as u8;
    }

    for n in [1, 2, 127, 128, 129, 1023, 1024, 1025, capacity - 1, capacity] {
        file.seek(Cursor::Write, SeekFrom::Start(0)).unwrap();
        file.seek(Cursor::Read, SeekFrom::Start(0)).unwrap();
        file.write_all(&data[..n]).unwrap();
        let mut back = [0u8; 24 * 128];
        file.read_exact(&mut back[..n]).unwrap();
        assert_eq!(&back[..n], &data[..n], "{} bytes", n);
    }
    assert_eq!(file.len().unwrap(), capacity);
}

#[test]
fn test_unbind() {
    let ram = Ram::default();
    {
        let mut storage = RamStorage::new(&ram);
        let fs = mount_fresh(&mut storage);
        let file = fs.create(Caller(0), &name!("unbind.txt"), 64).unwrap();
        file.write(b"hello world").unwrap();
        // the last close writes back the cache
        file.close().unwrap();
    }

    let mut storage = RamStorage::new(&ram);
    let fs = Filesystem::init(&mut storage).mount().unwrap();
    let file = fs.open(Caller(0), &name!("unbind.txt")).unwrap();
    let mut buf = [0u8; 11];
    file.read(&mut buf).unwrap();
    assert_eq!(&buf, b"hello world");
}

#[test]
fn test_flush_is_idempotent() {
    let ram = Ram::default();
    let mut storage = RamStorage::new(&ram);
    let fs = mount_fresh(&mut storage);

    let file = fs.create(Caller(0), &name!("a.bin"), 4096).unwrap();
    file.write(b"hello").unwrap();
    let data_sector = fs.layout().unwrap().data_start() / 8;
    fs.run(|volume, _| {
        assert_eq!(volume.cache.resident(), Some(data_sector));
        assert!(volume.cache.is_dirty());
        Ok(())
    })
    .unwrap();
    fs.flush().unwrap();
    fs.run(|volume, _| {
        assert!(!volume.cache.is_dirty());
        Ok(())
    })
    .unwrap();
    let writes = ram.sector_writes.get();
    fs.flush().unwrap();
    assert_eq!(ram.sector_writes.get(), writes);

    // reads and lookups never dirty the cache
    let mut buf = [0u8; 5];
    file.read(&mut buf).unwrap();
    assert!(fs.exists(&name!("a.bin")));
    fs.flush().unwrap();
    assert_eq!(ram.sector_writes.get(), writes);
}

#[test]
fn test_rewrite_same_bytes() {
    let ram = Ram::default();
    let mut storage = RamStorage::new(&ram);
    let fs = mount_fresh(&mut storage);

    let file = fs.create(Caller(0), &name!("same"), 256).unwrap();
    file.write(b"unchanged").unwrap();
    fs.flush().unwrap();
    let writes = ram.sector_writes.get();

    file.seek(Cursor::Write, SeekFrom::Start(0)).unwrap();
    assert_eq!(file.write(b"unchanged").unwrap(), 9);
    fs.flush().unwrap();
    assert_eq!(ram.sector_writes.get(), writes);

    file.seek(Cursor::Write, SeekFrom::Start(0)).unwrap();
    file.write(b"U").unwrap();
    fs.flush().unwrap();
    assert_eq!(ram.sector_writes.get(), writes + 1);
}

#[test]
fn test_shared_handle() {
    let ram = Ram::default();
    let mut storage = RamStorage::new(&ram);
    let fs = mount_fresh(&mut storage);
    let name = name!("shared");

    let a = fs.create(Caller(1), &name, 1024).unwrap();
    let b = fs.open(Caller(2), &name).unwrap();
    assert_eq!(fs.open_files(), 1);

    a.write(b"0123456789").unwrap();
    let mut buf = [0u8; 4];
    assert_eq!(b.read(&mut buf).unwrap(), 4);
    assert_eq!(&buf, b"0123");
    // independent cursors
    assert_eq!(a.read(&mut buf).unwrap(), 4);
    assert_eq!(&buf, b"0123");
    assert_eq!(b.seek(Cursor::Write, SeekFrom::Current(0)).unwrap(), 0);
    // one high-water size
    assert_eq!(b.len().unwrap(), 10);

    let before = fs.metadata(&name).unwrap();
    fs.flush().unwrap();
    let writes = ram.sector_writes.get();
    assert_eq!(b.delete(), Err(Error::BUSY));
    assert_eq!(fs.remove(&name), Err(Error::BUSY));
    assert_eq!(fs.metadata(&name).unwrap(), before);
    fs.flush().unwrap();
    assert_eq!(ram.sector_writes.get(), writes);

    // closing one reference keeps the other usable
    a.close().unwrap();
    assert_eq!(b.read(&mut buf).unwrap(), 4);
    assert_eq!(&buf, b"4567");

    b.delete().unwrap();
    assert!(!fs.exists(&name));
    assert_eq!(fs.open_files(), 0);
}

#[test]
fn test_reopen_resets_cursors() {
    let ram = Ram::default();
    let mut storage = RamStorage::new(&ram);
    let fs = mount_fresh(&mut storage);

    let first = fs.create(Caller(0), &name!("again"), 128).unwrap();
    first.write(b"abc").unwrap();
    let mut buf = [0u8; 2];
    first.read(&mut buf).unwrap();

    let second = fs.open(Caller(0), &name!("again")).unwrap();
    assert_eq!(second.seek(Cursor::Read, SeekFrom::Current(0)).unwrap(), 0);
    assert_eq!(second.seek(Cursor::Write, SeekFrom::Current(0)).unwrap(), 0);
    assert_eq!(second.len().unwrap(), 3);
}

#[test]
fn test_seek() {
    let ram = Ram::default();
    let mut storage = RamStorage::new(&ram);
    let fs = mount_fresh(&mut storage);

    let file = fs.create(Caller(0), &name!("seek.txt"), 256).unwrap();
    file.write(b"hello world").unwrap();
    assert_eq!(file.len().unwrap(), 11);

    assert_eq!(file.seek(Cursor::Read, SeekFrom::End(-5)).unwrap(), 6);
    let mut buf = [0u8; 5];
    file.read(&mut buf).unwrap();
    assert_eq!(&buf, b"world");

    assert_eq!(file.seek(Cursor::Read, SeekFrom::Current(-5)).unwrap(), 6);
    assert_eq!(
        file.seek(Cursor::Read, SeekFrom::Current(-7)),
        Err(Error::INVALID)
    );
    // a rejected seek leaves the cursor alone
    assert_eq!(file.seek(Cursor::Read, SeekFrom::Current(0)).unwrap(), 6);
    assert_eq!(file.seek(Cursor::Write, SeekFrom::End(-12)), Err(Error::INVALID));

    assert_eq!(file.seek(Cursor::Write, SeekFrom::Current(0)).unwrap(), 11);
    file.rewind(Cursor::Write).unwrap();
    file.write(b"J").unwrap();
    file.rewind(Cursor::Read).unwrap();
    file.read(&mut buf).unwrap();
    assert_eq!(&buf, b"Jello");
    // rewriting the start does not lower the size
    assert_eq!(file.len().unwrap(), 11);
}

#[test]
fn test_full_and_empty() {
    let ram = Ram::default();
    let mut storage = RamStorage::new(&ram);
    let fs = mount_fresh(&mut storage);

    let file = fs.create(Caller(0), &name!("one.page"), 100).unwrap();
    assert_eq!(file.du().unwrap(), 128);
    assert_eq!(fs.du(&name!("one.page")).unwrap(), 128);

    let data = [0x5a; 200];
    assert_eq!(file.write(&data).unwrap(), 128);
    assert_eq!(file.write(&data), Err(Error::FILE_FULL));
    assert_eq!(fs.last_error(), Some(Error::FILE_FULL));
    assert_eq!(file.write(&[]).unwrap(), 0);
    assert_eq!(fs.last_error(), None);

    let mut buf = [0u8; 200];
    assert_eq!(file.read(&mut buf).unwrap(), 128);
    assert!(buf[..128].iter().all(|byte| *byte == 0x5a));
    assert_eq!(file.read(&mut buf), Err(Error::FILE_EMPTY));
    assert_eq!(fs.last_error(), Some(Error::FILE_EMPTY));

    file.rewind(Cursor::Write).unwrap();
    assert_eq!(file.write_all(&data), Err(Error::FILE_FULL));
    file.rewind(Cursor::Read).unwrap();
    assert_eq!(file.read_exact(&mut buf), Err(Error::FILE_EMPTY));
}

#[test]
fn test_stale_handle_after_format() {
    let ram = Ram::default();
    let mut storage = RamStorage::new(&ram);
    let fs = mount_fresh(&mut storage);

    let file = fs.create(Caller(0), &name!("doomed"), 128).unwrap();
    file.write(b"never flushed").unwrap();
    fs.format().unwrap();

    assert_eq!(file.write(b"x"), Err(Error::BAD_FILE_DESCRIPTOR));
    assert_eq!(file.len(), Err(Error::BAD_FILE_DESCRIPTOR));
    assert_eq!(file.close(), Err(Error::BAD_FILE_DESCRIPTOR));
    assert!(!fs.exists(&name!("doomed")));
    assert_eq!(fs.open_files(), 0);
}

#[test]
fn test_stale_handle_after_reregistration() {
    let ram = Ram::default();
    let mut storage = RamStorage::new(&ram);
    let fs = mount_fresh(&mut storage);
    let name = name!("twice");

    let old = fs.create(Caller(0), &name, 128).unwrap();
    fs.format().unwrap();
    let new = fs.create(Caller(0), &name, 128).unwrap();

    // same name, different registration
    assert_eq!(old.write(b"x"), Err(Error::BAD_FILE_DESCRIPTOR));
    new.write(b"y").unwrap();
    drop(old);
    assert_eq!(fs.open_files(), 1);
    new.close().unwrap();
}

#[test]
fn test_allocation_boundary() {
    let ram = Ram::default();
    let mut storage = RamStorage::new(&ram);
    let fs = mount_fresh(&mut storage);
    let start = fs.layout().unwrap().data_start() as u32;
    assert_eq!(start, 24);

    fs.run(|volume, _| {
        assert_eq!(volume.allocate(0), Err(Error::INVALID));
        assert_eq!(volume.allocate(400)?, Extent::new(start, 400));
        assert_eq!(volume.allocate(80)?, Extent::new(start + 400, 80));
        // free runs of 20 and 8 pages
        volume.free(&[Extent::new(start + 100, 20)])?;

        // exactly the largest run, in one call
        assert_eq!(volume.allocate(20)?, Extent::new(start + 100, 20));
        volume.free(&[Extent::new(start + 100, 20)])?;

        // one page more than the largest run
        assert_eq!(volume.allocate(21)?, Extent::new(start + 100, 20));
        // the shortfall completes it
        assert_eq!(volume.allocate(1)?, Extent::new(start + 480, 1));

        assert_eq!(volume.allocate(100)?, Extent::new(start + 481, 7));
        assert_eq!(volume.count_free()?, 0);
        assert_eq!(volume.allocate(1), Err(Error::NO_SPACE));
        Ok(())
    })
    .unwrap();
}

#[test]
fn test_allocation_prefers_exact_fit() {
    let ram = Ram::default();
    let mut storage = RamStorage::new(&ram);
    let fs = mount_fresh(&mut storage);
    let start = fs.layout().unwrap().data_start() as u32;

    fs.run(|volume, _| {
        volume.allocate(488)?;
        volume.free(&[Extent::new(start + 10, 3), Extent::new(start + 50, 30)])?;
        // the first run that fits, not the longest
        assert_eq!(volume.allocate(3)?, Extent::new(start + 10, 3));
        assert_eq!(volume.allocate(4)?, Extent::new(start + 50, 4));
        Ok(())
    })
    .unwrap();
}

#[test]
fn test_free_rejects_foreign_runs() {
    let ram = Ram::default();
    let mut storage = RamStorage::new(&ram);
    let fs = mount_fresh(&mut storage);
    let layout = fs.layout().unwrap();
    let start = layout.data_start() as u32;
    let end = layout.reserved_start() as u32;

    fs.run(|volume, _| {
        volume.allocate(300)?;
        let free = volume.count_free()?;
        for bad in [
            Extent::new(0, 4),
            Extent::new(start - 1, 2),
            Extent::new(end - 2, 4),
            Extent::new(start, 0),
        ] {
            assert_eq!(
                volume.free(&[Extent::new(start, 4), bad]),
                Err(Error::INVALID)
            );
        }
        // nothing was released, not even the valid run
        assert_eq!(volume.count_free()?, free);
        Ok(())
    })
    .unwrap();
}

#[test]
fn test_free_across_bitmap_sectors() {
    let ram = tiny::Ram::default();
    let mut storage = tiny::RamStorage::new(&ram);
    let fs = mount_fresh(&mut storage);
    let layout = fs.layout().unwrap();
    assert_eq!(layout.bitmap().len(), 2);
    assert_eq!(layout.data_pages(), 1400);
    let start = layout.data_start() as u32;

    fs.run(|volume, _| {
        // runs never cross a bitmap sector
        let low = volume.allocate(1020)?;
        let high = volume.allocate(10)?;
        assert_eq!(low, Extent::new(start, 1020));
        assert_eq!(high, Extent::new(start + 1024, 10));
        assert_eq!(volume.count_free()?, 1400 - 1030);

        // two runs owned by different bitmap sectors, in one call
        volume.free(&[high, low])?;
        assert_eq!(volume.count_free()?, 1400);

        volume.allocate(1024)?;
        volume.allocate(376)?;
        assert_eq!(volume.count_free()?, 0);

        // one run straddling the two sectors
        volume.free(&[Extent::new(start + 1000, 50)])?;
        assert_eq!(volume.count_free()?, 50);
        assert_eq!(volume.allocate(50)?, Extent::new(start + 1024, 26));
        assert_eq!(volume.allocate(24)?, Extent::new(start + 1000, 24));
        assert_eq!(volume.count_free()?, 0);
        Ok(())
    })
    .unwrap();
}

#[test]
fn test_create_covers_shortfall() {
    let ram = Ram::default();
    let mut storage = RamStorage::new(&ram);
    let fs = mount_fresh(&mut storage);
    let start = fs.layout().unwrap().data_start() as u32;
    let me = Caller(0);

    fs.create(me, &name!("a"), 10 * 128).unwrap().close().unwrap();
    fs.create(me, &name!("b"), 10 * 128).unwrap().close().unwrap();
    fs.create(me, &name!("c"), 463 * 128).unwrap().close().unwrap();
    fs.remove(&name!("a")).unwrap();
    assert_eq!(fs.available_space().unwrap(), 15 * 128);

    // 10 free pages at the front, 5 at the back
    let file = fs.create(me, &name!("d"), 12 * 128).unwrap();
    let metadata = fs.metadata(&name!("d")).unwrap();
    assert_eq!(metadata.extents(), 2);
    assert_eq!(metadata.capacity(), 12 * 128);
    fs.run(|volume, _| {
        let entry = volume.lookup(&name!("d"))?.ok_or(Error::NO_SUCH_ENTRY)?;
        let extents = volume.extents_of(&entry.record)?;
        assert_eq!(
            &extents[..],
            &[Extent::new(start, 10), Extent::new(start + 483, 2)]
        );
        Ok(())
    })
    .unwrap();

    let mut data = [0u8; 12 * 128];
    for (i, byte) in data.iter_mut().enumerate() {
        *byte = (i / 128) as u8;
    }
    file.write_all(&data).unwrap();
    file.close().unwrap();

    let file = fs.open(me, &name!("d")).unwrap();
    let mut back = [0u8; 12 * 128];
    file.read_exact(&mut back).unwrap();
    assert_eq!(&back[..], &data[..]);
    file.close().unwrap();

    // 3 pages left, a failed create gives them back
    let free = fs.available_space().unwrap();
    assert_eq!(free, 3 * 128);
    assert_eq!(
        fs.create(me, &name!("e"), 4 * 128).map(drop),
        Err(Error::NO_SPACE)
    );
    assert_eq!(fs.available_space().unwrap(), free);
    assert!(!fs.exists(&name!("e")));
}

#[test]
fn test_table_limits() {
    let ram = Ram::default();
    let mut storage = RamStorage::new(&ram);
    let fs = mount_fresh(&mut storage);

    for i in 0..crate::consts::FILES_MAX {
        fs.create(Caller(0), &numbered(i), 1).unwrap().close().unwrap();
    }
    let free = fs.available_space().unwrap();
    assert_eq!(
        fs.create(Caller(0), &name!("extra"), 1).map(drop),
        Err(Error::TABLE_FULL)
    );
    assert_eq!(fs.available_space().unwrap(), free);

    let mut files = heapless::Vec::<_, 8>::new();
    for i in 0..crate::consts::OPEN_FILES_MAX {
        files
            .push(fs.open(Caller(0), &numbered(i)).unwrap())
            .ok()
            .unwrap();
    }
    assert_eq!(
        fs.open(Caller(0), &numbered(20)).map(drop),
        Err(Error::NO_MEMORY)
    );

    // a known file takes more callers, up to the cursor capacity
    let mut callers = heapless::Vec::<_, 4>::new();
    for caller in 1..crate::consts::CALLERS_MAX as u8 {
        callers
            .push(fs.open(Caller(caller), &numbered(0)).unwrap())
            .ok()
            .unwrap();
    }
    assert_eq!(
        fs.open(Caller(9), &numbered(0)).map(drop),
        Err(Error::NO_MEMORY)
    );
}

#[test]
fn test_open_options() {
    let ram = Ram::default();
    let mut storage = RamStorage::new(&ram);
    let fs = mount_fresh(&mut storage);
    let name = name!("options");

    assert_eq!(
        OpenOptions::new().open(&fs, Caller(0), &name).map(drop),
        Err(Error::NO_SUCH_ENTRY)
    );
    let file = OpenOptions::new()
        .create(true)
        .size(300)
        .open(&fs, Caller(0), &name)
        .unwrap();
    assert_eq!(file.du().unwrap(), 384);

    assert_eq!(
        OpenOptions::new()
            .create_new(true)
            .size(300)
            .open(&fs, Caller(1), &name)
            .map(drop),
        Err(Error::ENTRY_ALREADY_EXISTED)
    );
    assert_eq!(fs.last_error(), Some(Error::ENTRY_ALREADY_EXISTED));

    // the failed attempt took no reference
    file.delete().unwrap();
}

#[test]
fn test_cache_write_back_failure() {
    let ram = Ram::default();
    let mut storage = RamStorage::new(&ram);
    let fs = mount_fresh(&mut storage);
    let data_start = fs.layout().unwrap().data_start();

    let file = fs.create(Caller(0), &name!("persist"), 256).unwrap();
    fs.flush().unwrap();
    file.write(b"persist").unwrap();

    ram.fail_writes.set(true);
    assert_eq!(fs.flush(), Err(Error::IO));
    assert_eq!(fs.last_error(), Some(Error::IO));
    // the dirty sector is kept for another attempt
    assert_eq!(file.seek(Cursor::Read, SeekFrom::Start(0)).unwrap(), 0);
    let mut buf = [0u8; 7];
    file.read(&mut buf).unwrap();
    assert_eq!(&buf, b"persist");

    ram.fail_writes.set(false);
    fs.flush().unwrap();
    assert_eq!(fs.last_error(), None);
    let mut raw = [0u8; 7];
    ram.peek(data_start * 128, &mut raw);
    assert_eq!(&raw, b"persist");
}

#[test]
fn test_failed_create_leaves_no_entry() {
    let ram = Ram::default();
    let mut storage = RamStorage::new(&ram);
    let fs = mount_fresh(&mut storage);
    let total = fs.total_space();

    // the bitmap write-back goes through, the one after the new file slot does not
    ram.fail_erase_in.set(Some(1));
    assert_eq!(
        fs.create(Caller(0), &name!("a"), 256).map(drop),
        Err(Error::IO)
    );
    assert_eq!(ram.fail_erase_in.get(), None);
    fs.flush().unwrap();

    assert!(!fs.exists(&name!("a")));
    assert_eq!(fs.available_space().unwrap(), total);
    assert_eq!(
        fs.open(Caller(0), &name!("a")).map(drop),
        Err(Error::NO_SUCH_ENTRY)
    );

    fs.write_file(Caller(0), &name!("a"), b"second try").unwrap();
    fs.close().unwrap();

    let mut storage = RamStorage::new(&ram);
    let fs = Filesystem::init(&mut storage).mount().unwrap();
    assert_eq!(fs.metadata(&name!("a")).unwrap().extents(), 1);
    let file = fs.open(Caller(0), &name!("a")).unwrap();
    let mut buf = [0u8; 10];
    file.read_exact(&mut buf).unwrap();
    assert_eq!(&buf, b"second try");
}

#[test]
fn test_failed_delete_keeps_file() {
    let ram = Ram::default();
    let mut storage = RamStorage::new(&ram);
    let fs = mount_fresh(&mut storage);
    fs.write_file(Caller(0), &name!("keep"), b"still here").unwrap();
    fs.flush().unwrap();
    let free = fs.available_space().unwrap();

    let file = fs.open(Caller(0), &name!("keep")).unwrap();
    ram.fail_erase_in.set(Some(0));
    assert_eq!(file.delete(), Err(Error::IO));
    fs.flush().unwrap();

    assert!(fs.exists(&name!("keep")));
    assert_eq!(fs.available_space().unwrap(), free);
    let mut buf = [0u8; 10];
    file.read_exact(&mut buf).unwrap();
    assert_eq!(&buf, b"still here");

    file.delete().unwrap();
    assert!(!fs.exists(&name!("keep")));
    assert_eq!(fs.available_space().unwrap(), fs.total_space());
}

#[test]
fn test_unaligned_reserved_tail() {
    let ram = unaligned::Ram::default();
    // last page of the device, inside the reserved tail
    let marker = [0u8; 16];
    ram.poke(511 * 128, &marker);

    let mut storage = unaligned::RamStorage::new(&ram);
    let fs = mount_fresh(&mut storage);
    let layout = fs.layout().unwrap();
    assert_eq!(layout.reserved_start(), 504);

    let free = fs.available_space().unwrap();
    assert_eq!(free, (504 - layout.data_start()) * 128);
    let file = fs.create(Caller(0), &name!("fill"), free).unwrap();
    file.seek(Cursor::Write, SeekFrom::Start((free - 16) as u32))
        .unwrap();
    file.write_all(&[0x5a; 16]).unwrap();
    file.close().unwrap();
    fs.flush().unwrap();

    let mut raw = [0u8; 16];
    ram.peek(504 * 128 - 16, &mut raw);
    assert_eq!(raw, [0x5a; 16]);
    ram.peek(511 * 128, &mut raw);
    assert_eq!(raw, marker);
}

#[cfg(feature = "embedded-io")]
#[test]
fn test_embedded_io() {
    use crate::eio::{Reader, Writer};
    use embedded_io::{Error as _, ErrorKind, Read as _, ReadExactError, Write as _};

    let ram = Ram::default();
    let mut storage = RamStorage::new(&ram);
    let fs = mount_fresh(&mut storage);
    let file = fs.create(Caller(0), &name!("eio"), 128).unwrap();

    let mut writer = Writer::new(&file);
    writer.write_all(b"embedded").unwrap();
    writer.flush().unwrap();
    assert_eq!(writer.write(&[0xee; 200]).unwrap(), 120);
    let full = writer.write(&[0xee]).unwrap_err();
    assert_eq!(full, Error::FILE_FULL);
    assert_eq!(full.kind(), ErrorKind::WriteZero);

    let mut reader = Reader::new(&file);
    let mut buf = [0u8; 8];
    reader.read_exact(&mut buf).unwrap();
    assert_eq!(&buf, b"embedded");

    // the end of the allocated pages is end of file
    let mut rest = [0u8; 200];
    assert_eq!(reader.read(&mut rest).unwrap(), 120);
    assert!(rest[..120].iter().all(|byte| *byte == 0xee));
    assert_eq!(reader.read(&mut rest).unwrap(), 0);
    assert!(matches!(
        reader.read_exact(&mut buf),
        Err(ReadExactError::UnexpectedEof)
    ));

    file.seek(Cursor::Read, SeekFrom::End(-4)).unwrap();
    assert!(matches!(
        reader.read_exact(&mut buf),
        Err(ReadExactError::UnexpectedEof)
    ));
}

#[derive(Default)]
struct CountingExclusion {
    acquired: Cell<usize>,
    released: Cell<usize>,
}

impl Exclusion for CountingExclusion {
    fn acquire(&self) {
        // never nested
        assert_eq!(self.acquired.get(), self.released.get());
        self.acquired.set(self.acquired.get() + 1);
    }

    fn release(&self) {
        self.released.set(self.released.get() + 1);
    }
}

#[test]
fn test_exclusion_is_balanced() {
    let exclusion = CountingExclusion::default();
    let ram = Ram::default();
    ram.fail_writes.set(true);
    let mut storage = RamStorage::new(&ram);
    let fs = Filesystem::init_with(&mut storage, &exclusion);

    // failing transactions release too
    assert_eq!(fs.format(), Err(Error::IO));
    ram.fail_writes.set(false);
    fs.format().unwrap();
    let fs = fs.mount().unwrap();
    let file = fs.create(Caller(0), &name!("locked"), 2048).unwrap();
    file.write_all(&[1; 2048]).unwrap();
    file.close().unwrap();

    assert!(exclusion.acquired.get() > 0);
    assert_eq!(exclusion.acquired.get(), exclusion.released.get());
}

#[test]
fn test_dyn_filesystem() {
    let ram = Ram::default();
    let mut storage = RamStorage::new(&ram);
    let fs = mount_fresh(&mut storage);
    let fs: &dyn DynFilesystem = &fs;

    fs.write(Caller(0), &name!("dyn"), b"through dyn").unwrap();
    assert!(fs.exists(&name!("dyn")));
    assert_eq!(fs.metadata(&name!("dyn")).unwrap().capacity(), 128);

    // reads run to the end of the allocated page
    let contents: heapless::Vec<u8, 64> = fs.read(Caller(0), &name!("dyn")).unwrap();
    assert_eq!(contents.len(), 64);
    assert_eq!(&contents[..11], b"through dyn");

    let len = fs
        .open_file_and_then(Caller(1), &name!("dyn"), &mut |file| {
            file.seek(Cursor::Write, SeekFrom::Start(8))?;
            file.write(b"DYN")?;
            file.len()
        })
        .unwrap();
    assert_eq!(len, 11);

    let du = fs
        .create_file_and_then(Caller(0), &name!("made"), 200, &mut |file| file.du())
        .unwrap();
    assert_eq!(du, 256);

    fs.remove(&name!("dyn")).unwrap();
    assert_eq!(fs.last_error(), None);
    assert!(!fs.exists(&name!("dyn")));
}

#[cfg(feature = "serde")]
#[test]
fn test_serde() {
    let extent = Extent::new(24, 10);
    let mut buf = [0u8; 16];
    let n = ssmarshal::serialize(&mut buf, &extent).unwrap();
    assert_eq!(n, 8);
    let (back, read): (Extent, usize) = ssmarshal::deserialize(&buf[..n]).unwrap();
    assert_eq!(back, extent);
    assert_eq!(read, n);

    let caller = Caller(3);
    let n = ssmarshal::serialize(&mut buf, &caller).unwrap();
    let (back, _): (Caller, usize) = ssmarshal::deserialize(&buf[..n]).unwrap();
    assert_eq!(back, caller);
}
