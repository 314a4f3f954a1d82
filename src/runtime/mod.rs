//! Blocking I/O runtime.
//!
//! Building blocks shared by transfer sessions and the copy benchmark:
//! - `ByteBuffer`: cursor-based staging buffer
//! - `ReadChannel` / `WriteChannel`: endpoints bytes move through
//! - `Connection` / `Listener`: TCP with explicit half-close
//! - `ChunkedCopier`: source-to-destination copy through one buffer
//! - `copy_mapped`: file copy through memory mappings

pub mod buffer;
pub mod channel;
pub mod connection;
pub mod copier;
pub mod error;
pub mod mapped;

pub use buffer::{BufferError, ByteBuffer};
pub use channel::{ensure_distinct, FileChannel, IoChannel, ReadChannel, ReadOutcome, WriteChannel};
pub use connection::{ConnState, Connection, Listener};
pub use copier::{copy, ChunkedCopier, DEFAULT_BUFFER_SIZE};
pub use error::TransferError;
