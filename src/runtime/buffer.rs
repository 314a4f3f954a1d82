//! Fixed-capacity byte buffer with cursor-based access.
//!
//! A `ByteBuffer` owns a byte region that is never reallocated. Access is
//! driven by three cursors plus an optional mark:
//!
//! ```text
//! 0 <= mark <= position <= limit <= capacity
//! ```
//!
//! ## Modes
//!
//! The buffer has no stored mode; the cursors imply it:
//! - **write mode**: `limit == capacity`, `put` advances `position`
//! - **read mode**: `limit` is where writing stopped, `get` advances `position`
//!
//! `flip` switches from writing to reading, `clear` goes back to writing.
//! Neither touches the stored bytes.

/// Error returned when a buffer is used outside its cursor bounds.
#[derive(Debug, Clone, Copy, PartialEq, Eq, thiserror::Error)]
pub enum BufferError {
    /// Not enough space left between position and limit for a write.
    #[error("buffer overflow: {requested} bytes requested, {remaining} remaining")]
    Overflow { requested: usize, remaining: usize },
    /// Not enough data left between position and limit for a read.
    #[error("buffer underflow: {requested} bytes requested, {remaining} remaining")]
    Underflow { requested: usize, remaining: usize },
    /// `reset` was called without a preceding `mark`.
    #[error("reset called without a mark")]
    InvalidMark,
}

/// Cursor-based fixed-capacity byte buffer.
#[derive(Debug, Clone)]
pub struct ByteBuffer {
    /// Backing storage, length == capacity.
    data: Box<[u8]>,
    /// Index of the next byte to read or write.
    position: usize,
    /// End of the accessible region.
    limit: usize,
    /// Saved position for `reset`.
    mark: Option<usize>,
}

impl ByteBuffer {
    /// Allocate a zeroed buffer in write mode.
    pub fn allocate(capacity: usize) -> Self {
        Self {
            data: vec![0u8; capacity].into_boxed_slice(),
            position: 0,
            limit: capacity,
            mark: None,
        }
    }

    /// Wrap existing bytes in a buffer ready for reading.
    pub fn wrap(bytes: impl Into<Vec<u8>>) -> Self {
        let data = bytes.into().into_boxed_slice();
        let limit = data.len();
        Self {
            data,
            position: 0,
            limit,
            mark: None,
        }
    }

    /// Total size of the backing storage. Never changes.
    pub fn capacity(&self) -> usize {
        self.data.len()
    }

    /// Current read/write position.
    pub fn position(&self) -> usize {
        self.position
    }

    /// End of the active region.
    pub fn limit(&self) -> usize {
        self.limit
    }

    /// Bytes between position and limit.
    pub fn remaining(&self) -> usize {
        self.limit - self.position
    }

    /// Whether any bytes lie between position and limit.
    pub fn has_remaining(&self) -> bool {
        self.remaining() > 0
    }

    /// Copy `src` in at the current position.
    ///
    /// Fails without writing anything if `src` does not fit.
    pub fn put(&mut self, src: &[u8]) -> Result<(), BufferError> {
        let remaining = self.remaining();
        if src.len() > remaining {
            return Err(BufferError::Overflow {
                requested: src.len(),
                remaining,
            });
        }
        let end = self.position + src.len();
        self.data[self.position..end].copy_from_slice(src);
        self.position = end;
        self.check_invariants();
        Ok(())
    }

    /// Take the next `count` bytes.
    pub fn get(&mut self, count: usize) -> Result<&[u8], BufferError> {
        let remaining = self.remaining();
        if count > remaining {
            return Err(BufferError::Underflow {
                requested: count,
                remaining,
            });
        }
        let start = self.position;
        self.position += count;
        self.check_invariants();
        Ok(&self.data[start..start + count])
    }

    /// Fill `dst` completely from the buffer.
    pub fn get_into(&mut self, dst: &mut [u8]) -> Result<(), BufferError> {
        let src = self.get(dst.len())?;
        dst.copy_from_slice(src);
        Ok(())
    }

    pub fn get_u8(&mut self) -> Result<u8, BufferError> {
        Ok(self.get(1)?[0])
    }

    /// Switch to read mode: `limit = position`, `position = 0`.
    pub fn flip(&mut self) {
        self.limit = self.position;
        self.position = 0;
        self.mark = None;
        self.check_invariants();
    }

    /// Switch to write mode over the whole capacity.
    ///
    /// Stored bytes are left as they are; they are only "forgotten".
    pub fn clear(&mut self) {
        self.position = 0;
        self.limit = self.capacity();
        self.mark = None;
        self.check_invariants();
    }

    /// Rewind to the start so the same data can be read again.
    pub fn rewind(&mut self) {
        self.position = 0;
        self.mark = None;
        self.check_invariants();
    }

    /// Record the current position.
    pub fn mark(&mut self) {
        self.mark = Some(self.position);
    }

    /// Return to the marked position. The mark is kept.
    pub fn reset(&mut self) -> Result<(), BufferError> {
        let mark = self.mark.ok_or(BufferError::InvalidMark)?;
        self.position = mark;
        self.check_invariants();
        Ok(())
    }

    /// Move unread bytes to the front and switch to write mode after them.
    pub fn compact(&mut self) {
        let remaining = self.remaining();
        self.data.copy_within(self.position..self.limit, 0);
        self.position = remaining;
        self.limit = self.capacity();
        self.mark = None;
        self.check_invariants();
    }

    /// The accessible region `[position, limit)`.
    ///
    /// In read mode this is the unread data.
    pub fn chunk(&self) -> &[u8] {
        &self.data[self.position..self.limit]
    }

    /// The accessible region `[position, limit)` for direct filling.
    ///
    /// Pair with `advance` once the number of filled bytes is known.
    pub fn chunk_mut(&mut self) -> &mut [u8] {
        &mut self.data[self.position..self.limit]
    }

    /// Move position forward by `count` bytes already read or written
    /// through `chunk`/`chunk_mut`.
    pub fn advance(&mut self, count: usize) -> Result<(), BufferError> {
        let remaining = self.remaining();
        if count > remaining {
            return Err(BufferError::Overflow {
                requested: count,
                remaining,
            });
        }
        self.position += count;
        self.check_invariants();
        Ok(())
    }

    #[inline]
    fn check_invariants(&self) {
        debug_assert!(self.position <= self.limit, "position past limit");
        debug_assert!(self.limit <= self.data.len(), "limit past capacity");
        debug_assert!(
            self.mark.map_or(true, |m| m <= self.position),
            "mark past position"
        );
    }
}
