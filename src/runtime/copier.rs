//! Chunked copy through one reusable buffer.
//!
//! Each round reads whatever the source offers into the buffer, flips it,
//! drains it to the destination and clears it. Only the bytes reported by
//! the read are ever written, so stale content from earlier rounds never
//! reaches the destination.

use tracing::trace;

use super::buffer::ByteBuffer;
use super::channel::{ReadChannel, ReadOutcome, WriteChannel};
use super::error::TransferError;

/// Default staging buffer size in bytes.
pub const DEFAULT_BUFFER_SIZE: usize = 1024;

/// Copier owning a single staging buffer.
///
/// The buffer is reused across calls to `copy`, one copy at a time.
#[derive(Debug)]
pub struct ChunkedCopier {
    buffer: ByteBuffer,
}

impl ChunkedCopier {
    /// # Panics
    /// Panics if `buffer_size` is zero.
    pub fn new(buffer_size: usize) -> Self {
        assert!(buffer_size > 0, "copy buffer size must be non-zero");
        Self {
            buffer: ByteBuffer::allocate(buffer_size),
        }
    }

    pub fn buffer_size(&self) -> usize {
        self.buffer.capacity()
    }

    /// Move every byte from `source` to `destination` until the source
    /// reports end-of-stream.
    ///
    /// Returns the number of bytes copied. On error the destination holds
    /// exactly the bytes it accepted before the failure.
    pub fn copy<R, W>(&mut self, mut source: R, mut destination: W) -> Result<u64, TransferError>
    where
        R: ReadChannel,
        W: WriteChannel,
    {
        let mut total = 0u64;
        self.buffer.clear();

        loop {
            let n = match source.read_into(&mut self.buffer)? {
                ReadOutcome::Eof => break,
                ReadOutcome::Data(n) => n,
            };

            self.buffer.flip();
            destination.write_from(&mut self.buffer)?;
            self.buffer.clear();

            total += n as u64;
            trace!(chunk = n, total, "Copied chunk");
        }

        Ok(total)
    }
}

/// Copy `source` to `destination` through a fresh buffer of `buffer_size`.
pub fn copy<R, W>(source: R, destination: W, buffer_size: usize) -> Result<u64, TransferError>
where
    R: ReadChannel,
    W: WriteChannel,
{
    ChunkedCopier::new(buffer_size).copy(source, destination)
}
