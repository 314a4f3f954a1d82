//! Byte channels the copier moves data through.
//!
//! A channel is an endpoint that bytes pass through; it stores nothing.
//! Reads fill a `ByteBuffer` up to its limit, writes drain it to its limit.
//! Files, TCP connections and plain `std::io` streams all implement the
//! same pair of traits so the copier does not care which it is given.

use std::fs::{self, File, OpenOptions};
use std::io::{self, Read, Write};
use std::path::{Path, PathBuf};

use super::buffer::ByteBuffer;
use super::error::TransferError;

/// Result of a single read into a buffer.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ReadOutcome {
    /// This many bytes were placed in the buffer.
    /// Zero only when the buffer had no room.
    Data(usize),
    /// The peer will send nothing more.
    Eof,
}

/// A source of bytes.
pub trait ReadChannel {
    /// Read up to `buf.remaining()` bytes at the buffer's position.
    fn read_into(&mut self, buf: &mut ByteBuffer) -> Result<ReadOutcome, TransferError>;
}

/// A sink of bytes.
pub trait WriteChannel {
    /// Write every remaining byte of `buf`, advancing its position as
    /// bytes are accepted.
    fn write_from(&mut self, buf: &mut ByteBuffer) -> Result<(), TransferError>;
}

impl<T: ReadChannel + ?Sized> ReadChannel for &mut T {
    fn read_into(&mut self, buf: &mut ByteBuffer) -> Result<ReadOutcome, TransferError> {
        (**self).read_into(buf)
    }
}

impl<T: WriteChannel + ?Sized> WriteChannel for &mut T {
    fn write_from(&mut self, buf: &mut ByteBuffer) -> Result<(), TransferError> {
        (**self).write_from(buf)
    }
}

/// Single read from `reader` into the writable region of `buf`.
pub(crate) fn fill_from<R: Read + ?Sized>(
    reader: &mut R,
    buf: &mut ByteBuffer,
) -> Result<ReadOutcome, TransferError> {
    if !buf.has_remaining() {
        return Ok(ReadOutcome::Data(0));
    }

    loop {
        match reader.read(buf.chunk_mut()) {
            Ok(0) => return Ok(ReadOutcome::Eof),
            Ok(n) => {
                buf.advance(n)?;
                return Ok(ReadOutcome::Data(n));
            }
            Err(e) if e.kind() == io::ErrorKind::Interrupted => continue,
            Err(e) => return Err(TransferError::Read(e)),
        }
    }
}

/// Write the readable region of `buf` to `writer` until it is empty.
pub(crate) fn drain_into<W: Write + ?Sized>(
    writer: &mut W,
    buf: &mut ByteBuffer,
) -> Result<(), TransferError> {
    while buf.has_remaining() {
        match writer.write(buf.chunk()) {
            Ok(0) => {
                return Err(TransferError::Write(io::Error::new(
                    io::ErrorKind::WriteZero,
                    "channel accepted zero bytes",
                )));
            }
            Ok(n) => buf.advance(n)?,
            Err(e) if e.kind() == io::ErrorKind::Interrupted => continue,
            Err(e) => return Err(TransferError::Write(e)),
        }
    }
    Ok(())
}

/// Refuse a copy whose destination is the source file itself.
///
/// Opening the destination truncates it, which would destroy the source
/// before a byte is read. Paths are compared by identity, so symlinks and
/// `..` segments are seen through. A destination that does not exist yet
/// is always distinct.
pub fn ensure_distinct(source: &Path, destination: &Path) -> Result<(), TransferError> {
    let (Ok(src), Ok(dst)) = (fs::metadata(source), fs::metadata(destination)) else {
        return Ok(());
    };

    #[cfg(unix)]
    let same = {
        use std::os::unix::fs::MetadataExt;
        src.dev() == dst.dev() && src.ino() == dst.ino()
    };
    #[cfg(not(unix))]
    let same = {
        let _ = (src, dst);
        match (fs::canonicalize(source), fs::canonicalize(destination)) {
            (Ok(a), Ok(b)) => a == b,
            _ => false,
        }
    };

    if same {
        return Err(TransferError::Open {
            path: destination.to_path_buf(),
            source: io::Error::new(
                io::ErrorKind::InvalidInput,
                "source and destination are the same file",
            ),
        });
    }
    Ok(())
}

/// A file opened for reading or writing.
#[derive(Debug)]
pub struct FileChannel {
    file: File,
    path: PathBuf,
}

impl FileChannel {
    /// Open an existing file for reading.
    pub fn open(path: impl AsRef<Path>) -> Result<Self, TransferError> {
        let path = path.as_ref();
        let file = File::open(path).map_err(|e| match e.kind() {
            io::ErrorKind::NotFound => TransferError::FileNotFound(path.to_path_buf()),
            _ => TransferError::Open {
                path: path.to_path_buf(),
                source: e,
            },
        })?;
        Ok(Self {
            file,
            path: path.to_path_buf(),
        })
    }

    /// Open a file for writing, creating it or truncating existing content.
    pub fn create(path: impl AsRef<Path>) -> Result<Self, TransferError> {
        let path = path.as_ref();
        let file = OpenOptions::new()
            .write(true)
            .create(true)
            .truncate(true)
            .open(path)
            .map_err(|e| TransferError::Open {
                path: path.to_path_buf(),
                source: e,
            })?;
        Ok(Self {
            file,
            path: path.to_path_buf(),
        })
    }

    /// Path the file was opened from.
    pub fn path(&self) -> &Path {
        &self.path
    }

    /// Current size of the file on disk.
    pub fn size(&self) -> Result<u64, TransferError> {
        self.file
            .metadata()
            .map(|m| m.len())
            .map_err(TransferError::Read)
    }
}

impl ReadChannel for FileChannel {
    fn read_into(&mut self, buf: &mut ByteBuffer) -> Result<ReadOutcome, TransferError> {
        fill_from(&mut self.file, buf)
    }
}

impl WriteChannel for FileChannel {
    fn write_from(&mut self, buf: &mut ByteBuffer) -> Result<(), TransferError> {
        drain_into(&mut self.file, buf)
    }
}

/// Adapter exposing any `std::io` reader or writer as a channel.
#[derive(Debug)]
pub struct IoChannel<T> {
    inner: T,
}

impl<T> IoChannel<T> {
    /// Wrap a reader or writer.
    pub fn new(inner: T) -> Self {
        Self { inner }
    }

    /// Borrow the wrapped value.
    pub fn get_ref(&self) -> &T {
        &self.inner
    }

    /// Unwrap, returning the wrapped value.
    pub fn into_inner(self) -> T {
        self.inner
    }
}

impl<T: Read> ReadChannel for IoChannel<T> {
    fn read_into(&mut self, buf: &mut ByteBuffer) -> Result<ReadOutcome, TransferError> {
        fill_from(&mut self.inner, buf)
    }
}

impl<T: Write> WriteChannel for IoChannel<T> {
    fn write_from(&mut self, buf: &mut ByteBuffer) -> Result<(), TransferError> {
        drain_into(&mut self.inner, buf)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::io::Cursor;

    #[test]
    fn test_read_reports_eof_separately_from_zero() {
        let mut source = IoChannel::new(Cursor::new(b"abc".to_vec()));
        let mut buf = ByteBuffer::allocate(8);

        assert_eq!(source.read_into(&mut buf).unwrap(), ReadOutcome::Data(3));
        assert_eq!(source.read_into(&mut buf).unwrap(), ReadOutcome::Eof);

        // A full buffer reads nothing but is not end-of-stream
        let mut full = ByteBuffer::allocate(0);
        let mut source = IoChannel::new(Cursor::new(b"abc".to_vec()));
        assert_eq!(source.read_into(&mut full).unwrap(), ReadOutcome::Data(0));
    }

    #[test]
    fn test_read_stops_at_limit() {
        let mut source = IoChannel::new(Cursor::new(b"hello world".to_vec()));
        let mut buf = ByteBuffer::allocate(4);

        assert_eq!(source.read_into(&mut buf).unwrap(), ReadOutcome::Data(4));
        buf.flip();
        assert_eq!(buf.chunk(), b"hell");
    }

    #[test]
    fn test_write_drains_buffer() {
        let mut sink = IoChannel::new(Vec::new());
        let mut buf = ByteBuffer::wrap(b"payload".to_vec());

        sink.write_from(&mut buf).unwrap();
        assert!(!buf.has_remaining());
        assert_eq!(sink.into_inner(), b"payload");
    }

    #[test]
    fn test_write_zero_is_an_error() {
        let mut full: [u8; 0] = [];
        let mut sink = IoChannel::new(&mut full[..]);
        let mut buf = ByteBuffer::wrap(b"x".to_vec());

        let err = sink.write_from(&mut buf).unwrap_err();
        assert!(matches!(err, TransferError::Write(_)));
        assert_eq!(err.io_kind(), Some(io::ErrorKind::WriteZero));
    }

    #[test]
    fn test_file_channel_missing_source() {
        let dir = tempfile::tempdir().unwrap();
        let missing = dir.path().join("missing.bin");

        let err = FileChannel::open(&missing).unwrap_err();
        assert!(matches!(err, TransferError::FileNotFound(ref p) if *p == missing));
    }

    #[test]
    fn test_file_channel_create_truncates() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("out.bin");
        std::fs::write(&path, b"old contents that are long").unwrap();

        let mut file = FileChannel::create(&path).unwrap();
        let mut buf = ByteBuffer::wrap(b"new".to_vec());
        file.write_from(&mut buf).unwrap();
        assert_eq!(file.size().unwrap(), 3);
        drop(file);

        assert_eq!(std::fs::read(&path).unwrap(), b"new");
    }

    #[test]
    fn test_ensure_distinct() {
        let dir = tempfile::tempdir().unwrap();
        let a = dir.path().join("a.bin");
        let b = dir.path().join("b.bin");
        std::fs::write(&a, b"a").unwrap();

        // Destination not created yet
        ensure_distinct(&a, &b).unwrap();
        std::fs::write(&b, b"b").unwrap();
        ensure_distinct(&a, &b).unwrap();

        let err = ensure_distinct(&a, &a).unwrap_err();
        assert!(matches!(err, TransferError::Open { ref path, .. } if *path == a));
        assert_eq!(err.io_kind(), Some(io::ErrorKind::InvalidInput));

        // Same file reached through a different spelling
        let dotted = dir.path().join(".").join("a.bin");
        assert!(ensure_distinct(&a, &dotted).is_err());
    }

    #[cfg(unix)]
    #[test]
    fn test_ensure_distinct_sees_through_symlinks() {
        let dir = tempfile::tempdir().unwrap();
        let target = dir.path().join("target.bin");
        let link = dir.path().join("link.bin");
        std::fs::write(&target, b"data").unwrap();
        std::os::unix::fs::symlink(&target, &link).unwrap();

        assert!(ensure_distinct(&target, &link).is_err());
        assert!(ensure_distinct(&link, &target).is_err());
    }
}
