//! One file transfer over one connection.
//!
//! A session drives the client or server half of a transfer and records
//! where it is in its lifecycle:
//!
//! ```text
//! client: Init -> Connecting -> Sending -> [AwaitingAck] -> Closed
//! server: Init -> Connecting -> Receiving -> Acknowledging -> Closed
//!         any non-terminal state -> Failed
//! ```
//!
//! Files and connections are locals of the running step, so every exit
//! path releases them exactly once. Transfers are not atomic: a failed
//! receive leaves whatever arrived in the destination file.

use std::net::SocketAddr;
use std::path::Path;
use std::time::{Duration, Instant};

use bytes::{BufMut, BytesMut};
use tracing::{debug, info, warn};

use crate::runtime::{
    ChunkedCopier, Connection, FileChannel, IoChannel, Listener, TransferError,
};

/// Lifecycle of a transfer session.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum SessionState {
    Init,
    /// Connecting (client) or binding and accepting (server).
    Connecting,
    Sending,
    AwaitingAck,
    Receiving,
    Acknowledging,
    Closed,
    Failed,
}

impl SessionState {
    pub fn is_terminal(self) -> bool {
        matches!(self, SessionState::Closed | SessionState::Failed)
    }
}

/// Which half of the transfer a session runs.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Role {
    Client,
    Server,
}

/// Outcome of a completed transfer.
#[derive(Debug, Clone)]
pub struct TransferReport {
    /// File bytes moved over the connection.
    pub bytes: u64,
    /// Acknowledgment received (client) or sent (server).
    pub ack: Option<String>,
    pub peer: SocketAddr,
    pub elapsed: Duration,
}

/// A single client or server transfer.
#[derive(Debug)]
pub struct TransferSession {
    role: Role,
    state: SessionState,
    buffer_size: usize,
}

impl TransferSession {
    /// # Panics
    /// Panics if `buffer_size` is zero.
    pub fn client(buffer_size: usize) -> Self {
        Self::new(Role::Client, buffer_size)
    }

    /// # Panics
    /// Panics if `buffer_size` is zero.
    pub fn server(buffer_size: usize) -> Self {
        Self::new(Role::Server, buffer_size)
    }

    fn new(role: Role, buffer_size: usize) -> Self {
        assert!(buffer_size > 0, "transfer buffer size must be non-zero");
        Self {
            role,
            state: SessionState::Init,
            buffer_size,
        }
    }

    /// Which half of the transfer this session runs.
    pub fn role(&self) -> Role {
        self.role
    }

    /// Where the session is in its lifecycle.
    pub fn state(&self) -> SessionState {
        self.state
    }

    /// Send `path` to the server at `addr`.
    ///
    /// With `await_ack`, the reply is drained to end-of-stream and returned
    /// in the report.
    pub fn send(
        &mut self,
        path: &Path,
        addr: &str,
        await_ack: bool,
    ) -> Result<TransferReport, TransferError> {
        self.expect_role(Role::Client);
        let result = self.run_send(path, addr, await_ack);
        self.finish(result)
    }

    fn run_send(
        &mut self,
        path: &Path,
        addr: &str,
        await_ack: bool,
    ) -> Result<TransferReport, TransferError> {
        let started = Instant::now();
        let mut file = FileChannel::open(path)?;

        self.transition(SessionState::Connecting);
        let mut conn = Connection::connect(addr)?;
        let peer = conn.peer_addr();

        self.transition(SessionState::Sending);
        let mut copier = ChunkedCopier::new(self.buffer_size);
        let bytes = copier.copy(&mut file, &mut conn)?;
        conn.shutdown_output()?;
        info!(peer = %peer, bytes, "File sent");

        let ack = if await_ack {
            self.transition(SessionState::AwaitingAck);
            let mut reply = IoChannel::new(BytesMut::new().writer());
            copier.copy(&mut conn, &mut reply)?;
            let reply = reply.into_inner().into_inner();
            Some(String::from_utf8_lossy(&reply).into_owned())
        } else {
            None
        };

        drop(file);
        conn.close();

        Ok(TransferReport {
            bytes,
            ack,
            peer,
            elapsed: started.elapsed(),
        })
    }

    /// Bind `addr`, accept one client, and store its file at `destination`.
    pub fn listen_and_receive(
        &mut self,
        addr: &str,
        destination: &Path,
        ack: &str,
    ) -> Result<TransferReport, TransferError> {
        self.expect_role(Role::Server);
        self.transition(SessionState::Connecting);
        let listener = match Listener::bind(addr) {
            Ok(listener) => listener,
            Err(e) => return self.finish(Err(e)),
        };
        self.receive(listener, destination, ack)
    }

    /// Accept one client on `listener` and store its file at `destination`.
    ///
    /// The listener is closed once the connection is accepted.
    pub fn receive(
        &mut self,
        listener: Listener,
        destination: &Path,
        ack: &str,
    ) -> Result<TransferReport, TransferError> {
        self.expect_role(Role::Server);
        self.transition(SessionState::Connecting);
        let conn = listener.accept();
        drop(listener);
        match conn {
            Ok(conn) => self.receive_from(conn, destination, ack),
            Err(e) => self.finish(Err(e)),
        }
    }

    /// Store everything `conn` sends at `destination`, then reply with `ack`.
    pub fn receive_from(
        &mut self,
        conn: Connection,
        destination: &Path,
        ack: &str,
    ) -> Result<TransferReport, TransferError> {
        self.expect_role(Role::Server);
        let result = self.run_receive(conn, destination, ack);
        self.finish(result)
    }

    fn run_receive(
        &mut self,
        mut conn: Connection,
        destination: &Path,
        ack: &str,
    ) -> Result<TransferReport, TransferError> {
        let started = Instant::now();
        let peer = conn.peer_addr();
        let mut file = FileChannel::create(destination)?;

        self.transition(SessionState::Receiving);
        let mut copier = ChunkedCopier::new(self.buffer_size);
        let bytes = copier.copy(&mut conn, &mut file)?;
        drop(file);
        info!(peer = %peer, bytes, destination = %destination.display(), "File received");

        self.transition(SessionState::Acknowledging);
        copier.copy(IoChannel::new(ack.as_bytes()), &mut conn)?;
        conn.close();

        Ok(TransferReport {
            bytes,
            ack: Some(ack.to_string()),
            peer,
            elapsed: started.elapsed(),
        })
    }

    fn transition(&mut self, next: SessionState) {
        debug_assert!(!self.state.is_terminal(), "session already finished");
        if self.state != next {
            debug!(role = ?self.role, from = ?self.state, to = ?next, "Session state");
            self.state = next;
        }
    }

    fn finish(
        &mut self,
        result: Result<TransferReport, TransferError>,
    ) -> Result<TransferReport, TransferError> {
        match &result {
            Ok(_) => self.transition(SessionState::Closed),
            Err(e) => {
                warn!(role = ?self.role, state = ?self.state, error = %e, "Transfer failed");
                self.transition(SessionState::Failed);
            }
        }
        result
    }

    fn expect_role(&self, role: Role) {
        assert_eq!(self.role, role, "operation not valid for this session role");
        assert!(!self.state.is_terminal(), "session already finished");
    }
}
