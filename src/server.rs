//! Accept loop handing each transfer to its own worker thread.
//!
//! Every accepted connection becomes a server-side `TransferSession` on a
//! named thread, writing to a fresh file in the output directory. Sessions
//! share nothing but the sequence counter used for file names.

use std::path::{Path, PathBuf};
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::Arc;
use std::thread::{self, JoinHandle};
use std::time::Duration;

use chrono::Utc;
use tracing::{debug, error, info, warn};

use crate::config::Config;
use crate::runtime::{Listener, TransferError};
use crate::session::TransferSession;

/// Maximum number of transfers running at once
const MAX_WORKERS: usize = 1024;

/// Pause after a failed accept so persistent errors (e.g. out of file
/// descriptors) do not spin the loop
const ACCEPT_BACKOFF: Duration = Duration::from_millis(100);

/// Server instance
pub struct Server {
    listen: String,
    output_dir: PathBuf,
    buffer_size: usize,
    ack_message: Arc<str>,
    max_transfers: Option<u64>,
    sequence: Arc<AtomicU64>,
}

impl Server {
    /// Create a new server writing into `output_dir`.
    pub fn new(config: &Config, output_dir: PathBuf, max_transfers: Option<u64>) -> Self {
        Server {
            listen: config.listen.clone(),
            output_dir,
            buffer_size: config.buffer_size,
            ack_message: Arc::from(config.ack_message.as_str()),
            max_transfers,
            sequence: Arc::new(AtomicU64::new(0)),
        }
    }

    /// Bind the listen address and serve until `max_transfers` connections
    /// have been accepted, or forever.
    pub fn run(&self) -> Result<(), TransferError> {
        let listener = Listener::bind(&self.listen)?;
        self.serve(listener)
    }

    /// Serve on an already bound listener.
    pub fn serve(&self, listener: Listener) -> Result<(), TransferError> {
        std::fs::create_dir_all(&self.output_dir).map_err(|e| TransferError::Open {
            path: self.output_dir.clone(),
            source: e,
        })?;
        info!(address = %listener.local_addr(), dir = %self.output_dir.display(), "Server listening");

        let mut workers: Vec<JoinHandle<()>> = Vec::new();
        let mut accepted = 0u64;

        while self.max_transfers.map_or(true, |max| accepted < max) {
            // Make room for the next worker before accepting
            reap(&mut workers, MAX_WORKERS - 1);

            let conn = match listener.accept() {
                Ok(conn) => conn,
                Err(e) => {
                    error!(error = %e, "Failed to accept connection");
                    thread::sleep(ACCEPT_BACKOFF);
                    continue;
                }
            };
            accepted += 1;

            let id = self.sequence.fetch_add(1, Ordering::Relaxed);
            let destination = destination_path(&self.output_dir, id);
            let ack = Arc::clone(&self.ack_message);
            let buffer_size = self.buffer_size;
            let peer = conn.peer_addr();
            debug!(peer = %peer, id, "New connection");

            let spawned = thread::Builder::new()
                .name(format!("transfer-{id}"))
                .spawn(move || {
                    let mut session = TransferSession::server(buffer_size);
                    if let Err(e) = session.receive_from(conn, &destination, &ack) {
                        error!(transfer = id, peer = %peer, error = %e, "Transfer failed");
                    }
                });

            match spawned {
                Ok(handle) => workers.push(handle),
                // The connection went down with the closure
                Err(e) => error!(transfer = id, error = %e, "Failed to spawn worker"),
            }
        }

        drop(listener);
        reap(&mut workers, 0);
        info!(transfers = accepted, "Server stopped");
        Ok(())
    }
}

/// Join finished workers, then block on the oldest until at most `keep`
/// remain. Returns how many of the joined workers panicked.
fn reap(workers: &mut Vec<JoinHandle<()>>, keep: usize) -> usize {
    let mut panicked = 0;
    let mut join = |worker: JoinHandle<()>| {
        let name = worker.thread().name().unwrap_or("worker").to_string();
        if worker.join().is_err() {
            error!(worker = %name, "Transfer worker panicked");
            panicked += 1;
        }
    };

    let (finished, running): (Vec<_>, Vec<_>) =
        workers.drain(..).partition(|w| w.is_finished());
    *workers = running;
    finished.into_iter().for_each(&mut join);

    if workers.len() > keep {
        if keep > 0 {
            warn!(running = workers.len(), "Worker limit reached, waiting for transfers");
        }
        let excess = workers.len() - keep;
        workers.drain(..excess).for_each(&mut join);
    }
    panicked
}

/// `<dir>/<UTC timestamp>-<sequence>.bin`
fn destination_path(dir: &Path, id: u64) -> PathBuf {
    let stamp = Utc::now().format("%Y%m%dT%H%M%S");
    dir.join(format!("{stamp}-{id:04}.bin"))
}
