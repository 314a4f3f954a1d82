//! buffered-transfer command-line entry point.
//!
//! Subcommands:
//! - `send`: send one file and print the receiver's acknowledgment
//! - `receive`: accept one connection and store the file
//! - `serve`: accept connections in a loop, one thread per transfer
//! - `copy`: time a local file copy

use buffered_transfer::benchmark::copy_file;
use buffered_transfer::config::{Command, Config};
use buffered_transfer::server::Server;
use buffered_transfer::session::TransferSession;
use tracing::info;
use tracing_subscriber::EnvFilter;

fn main() -> Result<(), Box<dyn std::error::Error>> {
    // Load configuration
    let config = Config::load()?;

    // Initialize logging
    let filter =
        EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new(&config.log_level));

    tracing_subscriber::fmt()
        .with_env_filter(filter)
        .with_target(false)
        .init();

    info!(
        command = ?config.command,
        buffer_size = config.buffer_size,
        "Starting buffered-transfer"
    );

    match config.command.clone() {
        Command::Send { file, .. } => {
            let mut session = TransferSession::client(config.buffer_size);
            let report = session.send(&file, &config.connect, config.await_ack)?;
            info!(
                peer = %report.peer,
                bytes = report.bytes,
                elapsed_ms = report.elapsed.as_millis() as u64,
                "Transfer complete"
            );
            if let Some(ack) = report.ack {
                info!(ack = %ack, "Receiver acknowledged");
                println!("{ack}");
            }
        }
        Command::Receive { output } => {
            let mut session = TransferSession::server(config.buffer_size);
            let report = session.listen_and_receive(&config.listen, &output, &config.ack_message)?;
            info!(
                peer = %report.peer,
                bytes = report.bytes,
                output = %output.display(),
                elapsed_ms = report.elapsed.as_millis() as u64,
                "Transfer complete"
            );
        }
        Command::Serve { dir, max_transfers } => {
            Server::new(&config, dir, max_transfers).run()?;
        }
        Command::Copy {
            source,
            destination,
            mode,
        } => {
            let report = copy_file(&source, &destination, mode, config.buffer_size)?;
            info!(
                mode = ?report.mode,
                bytes = report.bytes,
                elapsed_us = report.elapsed.as_micros() as u64,
                mib_per_sec = %format!("{:.1}", report.mib_per_sec()),
                "Copy complete"
            );
        }
    }

    Ok(())
}
