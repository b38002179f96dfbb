//! Byte-level reads and writes through a file's extents.

use core::cmp;

use crate::{
    driver::Storage,
    io::{Error, Result},
    table::OpenFile,
    volume::Volume,
    Caller, Extent,
};

/// Where a logical offset lands on the device.
#[derive(Clone, Copy, Debug, Eq, PartialEq)]
pub(crate) struct Position {
    /// Absolute page holding the offset.
    pub page: usize,
    /// Absolute byte address of the offset.
    pub address: usize,
    /// Absolute byte address right after the containing extent.
    pub extent_end: usize,
}

/// Walk the extents in sequence order. `None` once `offset` is past the last extent.
pub(crate) fn locate(extents: &[Extent], page_size: usize, offset: usize) -> Option<Position> {
    let mut rest = offset;
    for extent in extents {
        let span = extent.count as usize * page_size;
        if rest < span {
            let base = extent.start as usize * page_size;
            return Some(Position {
                page: extent.start as usize + rest / page_size,
                address: base + rest,
                extent_end: base + span,
            });
        }
        rest -= span;
    }
    None
}

/// Bring the sector holding `offset` in and return the byte window inside it, bounded by the
/// sector end and the extent end.
fn window<S: Storage>(
    volume: &mut Volume<'_, S>,
    extents: &[Extent],
    offset: usize,
) -> Result<Option<(usize, usize)>> {
    let Some(position) = locate(extents, volume.layout.page_size(), offset) else {
        return Ok(None);
    };
    let sector_size = volume.layout.sector_size();
    let sector = position.page / volume.layout.pages_per_sector();
    let sector_end = (sector + 1) * sector_size;
    volume.load(sector)?;
    let start = position.address - sector * sector_size;
    let end = cmp::min(sector_end, position.extent_end) - sector * sector_size;
    Ok(Some((start, end)))
}

/// Read at the caller's read cursor. Reads stop at the end of the allocated extents.
pub(crate) fn read<S: Storage>(
    volume: &mut Volume<'_, S>,
    file: &mut OpenFile,
    caller: Caller,
    buf: &mut [u8],
) -> Result<usize> {
    let mut cursor = file.cursors(caller)?.read;
    if buf.is_empty() {
        return Ok(0);
    }
    let mut done = 0;
    while done < buf.len() {
        let Some((start, end)) = window(volume, &file.extents, cursor)? else {
            break;
        };
        let n = cmp::min(buf.len() - done, end - start);
        buf[done..done + n].copy_from_slice(&volume.cache.bytes()[start..start + n]);
        done += n;
        cursor += n;
        file.cursors(caller)?.read = cursor;
    }
    if done == 0 {
        return Err(Error::FILE_EMPTY);
    }
    Ok(done)
}

/// Write at the caller's write cursor. The cache is only dirtied by bytes that change.
pub(crate) fn write<S: Storage>(
    volume: &mut Volume<'_, S>,
    file: &mut OpenFile,
    caller: Caller,
    data: &[u8],
) -> Result<usize> {
    let mut cursor = file.cursors(caller)?.write;
    if data.is_empty() {
        return Ok(0);
    }
    let mut done = 0;
    while done < data.len() {
        let Some((start, end)) = window(volume, &file.extents, cursor)? else {
            break;
        };
        let n = cmp::min(data.len() - done, end - start);
        let source = &data[done..done + n];
        let target = &mut volume.cache.bytes_mut()[start..start + n];
        if target != source {
            target.copy_from_slice(source);
            volume.cache.mark_dirty();
        }
        done += n;
        cursor += n;
        file.cursors(caller)?.write = cursor;
        file.size = cmp::max(file.size, cursor);
    }
    if done == 0 {
        return Err(Error::FILE_FULL);
    }
    Ok(done)
}

#[cfg(test)]
mod tests {
    use super::{locate, Position};
    use crate::Extent;

    #[test]
    fn locate_walks_extents_in_order() {
        let extents = [Extent::new(10, 2), Extent::new(40, 1)];
        assert_eq!(
            locate(&extents, 16, 0),
            Some(Position {
                page: 10,
                address: 160,
                extent_end: 192
            })
        );
        assert_eq!(locate(&extents, 16, 31).map(|p| p.page), Some(11));
        assert_eq!(
            locate(&extents, 16, 33),
            Some(Position {
                page: 40,
                address: 641,
                extent_end: 656
            })
        );
        assert_eq!(locate(&extents, 16, 48), None);
        assert_eq!(locate(&[], 16, 0), None);
    }
}
