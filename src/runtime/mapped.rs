//! Mapped-memory file copy.
//!
//! The source is mapped read-only, the destination is sized up front and
//! mapped read-write, and the copy is a single memory move followed by a
//! flush back to disk.

use std::fs::{File, OpenOptions};
use std::io;
use std::path::Path;

use memmap2::{Mmap, MmapMut};
use tracing::debug;

use super::channel::ensure_distinct;
use super::error::TransferError;

/// Copy `source` to `destination` through memory mappings.
///
/// The destination is created or truncated and sized to the source.
/// Returns the number of bytes copied.
pub fn copy_mapped(source: &Path, destination: &Path) -> Result<u64, TransferError> {
    let src = File::open(source).map_err(|e| match e.kind() {
        io::ErrorKind::NotFound => TransferError::FileNotFound(source.to_path_buf()),
        _ => TransferError::Open {
            path: source.to_path_buf(),
            source: e,
        },
    })?;
    ensure_distinct(source, destination)?;
    let len = src.metadata().map_err(TransferError::Read)?.len();

    let dst = OpenOptions::new()
        .read(true)
        .write(true)
        .create(true)
        .truncate(true)
        .open(destination)
        .map_err(|e| TransferError::Open {
            path: destination.to_path_buf(),
            source: e,
        })?;

    // Zero-length mappings are rejected by the OS
    if len == 0 {
        debug!(source = %source.display(), "Empty source, nothing to map");
        return Ok(0);
    }

    dst.set_len(len).map_err(TransferError::Write)?;

    // SAFETY: both files are opened by this function and are distinct (checked
    // above). Concurrent modification by another process is not guarded against.
    let input = unsafe { Mmap::map(&src) }.map_err(|e| TransferError::Map {
        path: source.to_path_buf(),
        source: e,
    })?;
    // SAFETY: as above.
    let mut output = unsafe { MmapMut::map_mut(&dst) }.map_err(|e| TransferError::Map {
        path: destination.to_path_buf(),
        source: e,
    })?;

    output.copy_from_slice(&input);
    output.flush().map_err(TransferError::Write)?;

    debug!(bytes = len, "Mapped copy complete");
    Ok(len)
}
