//! Local file copy in one of three modes, timed.
//!
//! - `chunked`: file channels through a `ChunkedCopier`
//! - `stream`: `std::io::copy` between file handles
//! - `mapped`: both files memory-mapped, one memory move

use std::fs::{File, OpenOptions};
use std::io;
use std::path::Path;
use std::time::{Duration, Instant};

use clap::ValueEnum;
use tracing::debug;

use crate::runtime::mapped::copy_mapped;
use crate::runtime::{copy, ensure_distinct, FileChannel, TransferError};

/// How `copy_file` moves the bytes.
#[derive(Debug, Clone, Copy, PartialEq, Eq, ValueEnum)]
pub enum CopyMode {
    Chunked,
    Stream,
    Mapped,
}

/// Result of a timed copy.
#[derive(Debug, Clone, Copy)]
pub struct CopyReport {
    pub mode: CopyMode,
    pub bytes: u64,
    pub elapsed: Duration,
}

impl CopyReport {
    /// Throughput in MiB/s; zero for instant copies.
    pub fn mib_per_sec(&self) -> f64 {
        let secs = self.elapsed.as_secs_f64();
        if secs == 0.0 {
            return 0.0;
        }
        self.bytes as f64 / (1024.0 * 1024.0) / secs
    }
}

/// Copy `source` to `destination`, creating or truncating the destination.
///
/// Copying a file onto itself is refused before anything is opened.
pub fn copy_file(
    source: &Path,
    destination: &Path,
    mode: CopyMode,
    buffer_size: usize,
) -> Result<CopyReport, TransferError> {
    ensure_distinct(source, destination)?;
    let started = Instant::now();

    let bytes = match mode {
        CopyMode::Chunked => {
            let mut src = FileChannel::open(source)?;
            let mut dst = FileChannel::create(destination)?;
            copy(&mut src, &mut dst, buffer_size)?
        }
        CopyMode::Stream => stream_copy(source, destination)?,
        CopyMode::Mapped => copy_mapped(source, destination)?,
    };

    let report = CopyReport {
        mode,
        bytes,
        elapsed: started.elapsed(),
    };
    debug!(?mode, bytes, elapsed_us = report.elapsed.as_micros() as u64, "Copy finished");
    Ok(report)
}

fn stream_copy(source: &Path, destination: &Path) -> Result<u64, TransferError> {
    let mut src = File::open(source).map_err(|e| match e.kind() {
        io::ErrorKind::NotFound => TransferError::FileNotFound(source.to_path_buf()),
        _ => TransferError::Open {
            path: source.to_path_buf(),
            source: e,
        },
    })?;
    let mut dst = OpenOptions::new()
        .write(true)
        .create(true)
        .truncate(true)
        .open(destination)
        .map_err(|e| TransferError::Open {
            path: destination.to_path_buf(),
            source: e,
        })?;

    // io::copy does not say which side failed
    io::copy(&mut src, &mut dst).map_err(TransferError::Write)
}
