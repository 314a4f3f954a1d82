//! buffered-transfer: blocking file transfer through a staging buffer
//!
//! A sender streams a file over TCP through a fixed-size cursor buffer,
//! half-closes its side and waits for the receiver's acknowledgment. The
//! receiver stores everything up to end-of-stream and replies once.
//!
//! Features:
//! - Cursor-based `ByteBuffer` (position / limit / capacity / mark)
//! - Chunked copy between files, connections and in-memory streams
//! - Single-transfer send / receive sessions with explicit states
//! - Accept loop with one worker thread per transfer
//! - Local copy benchmark: chunked, stream and memory-mapped

pub mod benchmark;
pub mod config;
pub mod runtime;
pub mod server;
pub mod session;
