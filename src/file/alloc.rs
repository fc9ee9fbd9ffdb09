//! Thin wrappers over the `fallocate(2)` operations the in-file manager
//! uses to insert, remove, and sparsify byte ranges without rewriting the
//! rest of the file, plus the filesystem block size used to pick
//! move/trim boundaries.

use std::fs::File;
use std::os::fd::AsFd;

use rustix::fs::{fallocate, fstat, FallocateFlags};

fn errno_to_io(e: rustix::io::Errno) -> std::io::Error {
    std::io::Error::from_raw_os_error(e.raw_os_error())
}

pub(super) fn block_size(file: &File) -> crate::Result<u64> {
    let st = fstat(file.as_fd()).map_err(errno_to_io)?;
    Ok(st.st_blksize as u64)
}

pub(super) fn punch_hole(file: &File, offset: u64, len: u64) -> crate::Result<()> {
    fallocate(
        file.as_fd(),
        FallocateFlags::PUNCH_HOLE | FallocateFlags::KEEP_SIZE,
        offset,
        len,
    )
    .map_err(errno_to_io)?;
    Ok(())
}

pub(super) fn collapse_range(file: &File, offset: u64, len: u64) -> crate::Result<()> {
    fallocate(file.as_fd(), FallocateFlags::COLLAPSE_RANGE, offset, len).map_err(errno_to_io)?;
    Ok(())
}

pub(super) fn insert_range(file: &File, offset: u64, len: u64) -> crate::Result<()> {
    fallocate(file.as_fd(), FallocateFlags::INSERT_RANGE, offset, len).map_err(errno_to_io)?;
    Ok(())
}
