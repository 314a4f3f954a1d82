//! TCP connection with explicit half-close.
//!
//! A connection moves through `Open -> OutputShutdown -> Closed`. Output
//! shutdown tells the peer no more bytes are coming while the local side
//! keeps reading, which is how a sender learns the receiver's reply.

use std::io;
use std::net::{Shutdown, SocketAddr, TcpListener, TcpStream, ToSocketAddrs};

use socket2::{Domain, Protocol, Socket, Type};
use tracing::{debug, trace};

use super::buffer::ByteBuffer;
use super::channel::{drain_into, fill_from, ReadChannel, ReadOutcome, WriteChannel};
use super::error::TransferError;

/// Listen backlog. Sessions accept one connection at a time.
const LISTEN_BACKLOG: i32 = 128;

/// Current state of a connection.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ConnState {
    /// Readable and writable.
    Open,
    /// Local output has been shut down; input is still readable.
    OutputShutdown,
    /// The socket has been released.
    Closed,
}

/// A single TCP connection.
#[derive(Debug)]
pub struct Connection {
    /// `None` once closed.
    stream: Option<TcpStream>,
    peer: SocketAddr,
    state: ConnState,
}

impl Connection {
    /// Open a connection to `addr`.
    pub fn connect(addr: &str) -> Result<Self, TransferError> {
        let stream = TcpStream::connect(addr).map_err(|e| TransferError::Connect {
            addr: addr.to_string(),
            source: e,
        })?;
        let peer = stream.peer_addr().map_err(|e| TransferError::Connect {
            addr: addr.to_string(),
            source: e,
        })?;
        debug!(peer = %peer, "Connected");
        Ok(Self::from_stream(stream, peer))
    }

    /// Bind `addr`, block until exactly one peer connects, then stop listening.
    pub fn listen_and_accept(addr: &str) -> Result<Self, TransferError> {
        let listener = Listener::bind(addr)?;
        listener.accept()
    }

    fn from_stream(stream: TcpStream, peer: SocketAddr) -> Self {
        Self {
            stream: Some(stream),
            peer,
            state: ConnState::Open,
        }
    }

    /// Address of the remote end.
    pub fn peer_addr(&self) -> SocketAddr {
        self.peer
    }

    /// Current lifecycle state.
    pub fn state(&self) -> ConnState {
        self.state
    }

    /// Signal end-of-stream to the peer. The connection stays readable.
    pub fn shutdown_output(&mut self) -> Result<(), TransferError> {
        if self.state == ConnState::OutputShutdown {
            return Ok(());
        }
        let stream = self.stream_or(TransferError::Shutdown)?;
        stream
            .shutdown(Shutdown::Write)
            .map_err(TransferError::Shutdown)?;
        self.state = ConnState::OutputShutdown;
        trace!(peer = %self.peer, "Output shut down");
        Ok(())
    }

    /// Release the socket. Calling this again is a no-op.
    pub fn close(&mut self) {
        if let Some(stream) = self.stream.take() {
            drop(stream);
            self.state = ConnState::Closed;
            debug!(peer = %self.peer, "Connection closed");
        }
    }

    fn stream_or(
        &mut self,
        wrap: fn(io::Error) -> TransferError,
    ) -> Result<&mut TcpStream, TransferError> {
        self.stream
            .as_mut()
            .ok_or_else(|| wrap(io::Error::new(io::ErrorKind::NotConnected, "connection closed")))
    }
}

impl ReadChannel for Connection {
    fn read_into(&mut self, buf: &mut ByteBuffer) -> Result<ReadOutcome, TransferError> {
        let stream = self.stream_or(TransferError::Read)?;
        fill_from(stream, buf)
    }
}

impl WriteChannel for Connection {
    fn write_from(&mut self, buf: &mut ByteBuffer) -> Result<(), TransferError> {
        if self.state == ConnState::OutputShutdown {
            return Err(TransferError::Write(io::Error::new(
                io::ErrorKind::BrokenPipe,
                "output already shut down",
            )));
        }
        let stream = self.stream_or(TransferError::Write)?;
        drain_into(stream, buf)
    }
}

impl Drop for Connection {
    fn drop(&mut self) {
        self.close();
    }
}

/// A bound listening socket.
#[derive(Debug)]
pub struct Listener {
    inner: TcpListener,
    local: SocketAddr,
}

impl Listener {
    /// Bind and listen on `addr`.
    ///
    /// Fails with `TransferError::Bind` if the address cannot be resolved or
    /// is already taken by another listener.
    pub fn bind(addr: &str) -> Result<Self, TransferError> {
        let bind_err = |source: io::Error| TransferError::Bind {
            addr: addr.to_string(),
            source,
        };

        let sock_addr = addr
            .to_socket_addrs()
            .map_err(bind_err)?
            .next()
            .ok_or_else(|| {
                bind_err(io::Error::new(
                    io::ErrorKind::InvalidInput,
                    "address resolved to nothing",
                ))
            })?;

        let inner = create_listener(sock_addr).map_err(bind_err)?;
        let local = inner.local_addr().map_err(bind_err)?;
        debug!(address = %local, "Listening");

        Ok(Self { inner, local })
    }

    /// Address the listener is bound to.
    pub fn local_addr(&self) -> SocketAddr {
        self.local
    }

    /// Block until one peer connects.
    pub fn accept(&self) -> Result<Connection, TransferError> {
        loop {
            match self.inner.accept() {
                Ok((stream, peer)) => {
                    debug!(peer = %peer, "Accepted connection");
                    return Ok(Connection::from_stream(stream, peer));
                }
                Err(e) if e.kind() == io::ErrorKind::Interrupted => continue,
                Err(e) => return Err(TransferError::Accept(e)),
            }
        }
    }
}

/// Blocking listener with address reuse.
///
/// `SO_REUSEADDR` lets a restarted server rebind past `TIME_WAIT`, but a
/// second live listener on the same port is still refused.
fn create_listener(addr: SocketAddr) -> io::Result<TcpListener> {
    let socket = Socket::new(Domain::for_address(addr), Type::STREAM, Some(Protocol::TCP))?;

    #[cfg(unix)]
    socket.set_reuse_address(true)?;
    socket.bind(&addr.into())?;
    socket.listen(LISTEN_BACKLOG)?;

    Ok(socket.into())
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::thread;

    #[test]
    fn test_connection_state_transitions() {
        let listener = Listener::bind("127.0.0.1:0").unwrap();
        let addr = listener.local_addr().to_string();
        let server = thread::spawn(move || listener.accept().unwrap());

        let mut conn = Connection::connect(&addr).unwrap();
        let _peer = server.join().unwrap();
        assert_eq!(conn.state(), ConnState::Open);

        conn.shutdown_output().unwrap();
        assert_eq!(conn.state(), ConnState::OutputShutdown);

        conn.close();
        assert_eq!(conn.state(), ConnState::Closed);

        // Idempotent
        conn.close();
        assert_eq!(conn.state(), ConnState::Closed);

        let mut buf = ByteBuffer::allocate(8);
        assert!(matches!(
            conn.read_into(&mut buf),
            Err(TransferError::Read(_))
        ));
    }

    #[test]
    fn test_half_close_keeps_input_open() {
        let listener = Listener::bind("127.0.0.1:0").unwrap();
        let addr = listener.local_addr().to_string();

        let server = thread::spawn(move || {
            let mut conn = listener.accept().unwrap();
            let mut buf = ByteBuffer::allocate(16);
            // Peer's output is shut down, so reading ends in end-of-stream
            while let ReadOutcome::Data(_) = conn.read_into(&mut buf).unwrap() {}
            buf.flip();
            assert_eq!(buf.chunk(), b"ping");

            let mut reply = ByteBuffer::wrap(b"ack".to_vec());
            conn.write_from(&mut reply).unwrap();
        });

        let mut conn = Connection::connect(&addr).unwrap();
        let mut out = ByteBuffer::wrap(b"ping".to_vec());
        conn.write_from(&mut out).unwrap();
        conn.shutdown_output().unwrap();

        let mut buf = ByteBuffer::allocate(16);
        while let ReadOutcome::Data(_) = conn.read_into(&mut buf).unwrap() {}
        buf.flip();
        assert_eq!(buf.chunk(), b"ack");

        // Writing after the half-close is refused locally
        let mut late = ByteBuffer::wrap(b"late".to_vec());
        assert!(matches!(
            conn.write_from(&mut late),
            Err(TransferError::Write(_))
        ));

        server.join().unwrap();
    }

    #[test]
    fn test_listen_and_accept_single_peer() {
        let addr = {
            let listener = Listener::bind("127.0.0.1:0").unwrap();
            listener.local_addr().to_string()
        };

        let server_addr = addr.clone();
        let server = thread::spawn(move || {
            let mut conn = Connection::listen_and_accept(&server_addr).unwrap();
            let mut buf = ByteBuffer::allocate(8);
            while let ReadOutcome::Data(_) = conn.read_into(&mut buf).unwrap() {}
            buf.flip();
            buf.chunk().to_vec()
        });

        // The server thread may not be listening yet
        let mut conn = loop {
            match Connection::connect(&addr) {
                Ok(conn) => break conn,
                Err(_) => thread::sleep(std::time::Duration::from_millis(10)),
            }
        };
        conn.write_from(&mut ByteBuffer::wrap(b"hi".to_vec())).unwrap();
        conn.close();

        assert_eq!(server.join().unwrap(), b"hi");
    }

    #[test]
    fn test_bind_conflict() {
        let first = Listener::bind("127.0.0.1:0").unwrap();
        let addr = first.local_addr().to_string();

        let err = Listener::bind(&addr).unwrap_err();
        assert!(matches!(err, TransferError::Bind { .. }));
        assert_eq!(err.io_kind(), Some(io::ErrorKind::AddrInUse));
    }

    #[test]
    fn test_connect_refused() {
        // Bind then drop to find a port nobody is listening on
        let addr = {
            let listener = Listener::bind("127.0.0.1:0").unwrap();
            listener.local_addr().to_string()
        };

        let err = Connection::connect(&addr).unwrap_err();
        assert!(matches!(err, TransferError::Connect { .. }));
    }
}
