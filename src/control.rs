use std::io;
use std::net::SocketAddr;

use tokio::io::{AsyncBufReadExt, AsyncWriteExt, BufReader};
use tokio::net::{TcpListener, TcpStream};
use tokio::sync::mpsc;

use crate::delay::DelayCell;

/// Runtime control plane: a line-oriented TCP listener that adjusts the
/// shared delay or shuts the process down.
///
/// Serves one connection at a time; when a connection closes for any reason
/// the listener goes back to accepting. Malformed input never stops it.
pub struct ControlListener {
    listener: TcpListener,
}

impl ControlListener {
    /// Bind the control port.
    ///
    /// `ip` is `127.0.0.1` unless an explicit forwarding IP was configured;
    /// only explicit configuration opts into listening on all interfaces.
    pub async fn bind(ip: &str, port: u16) -> io::Result<Self> {
        let listener = TcpListener::bind((ip, port)).await?;
        Ok(Self { listener })
    }

    pub fn local_addr(&self) -> io::Result<SocketAddr> {
        self.listener.local_addr()
    }

    /// Accept loop. Returns only after a `CLOSE` command has been
    /// acknowledged and signaled on `close`.
    pub async fn run(self, delay: DelayCell, close: mpsc::Sender<()>) {
        match self.local_addr() {
            Ok(addr) => tracing::info!(%addr, "control listener ready"),
            Err(_) => tracing::info!("control listener ready"),
        }

        loop {
            let (stream, peer) = match self.listener.accept().await {
                Ok(accepted) => accepted,
                Err(err) => {
                    tracing::warn!(error = %err, "error accepting control connection");
                    continue;
                }
            };

            tracing::info!(%peer, "control connection accepted");
            if !serve_connection(stream, &delay, &close).await {
                return;
            }
            tracing::info!(%peer, "control connection closed, ready to accept a new one");
        }
    }
}

/// Handle one control connection until it closes.
///
/// Returns `false` when a `CLOSE` command was received and the listener
/// should stop accepting.
async fn serve_connection(stream: TcpStream, delay: &DelayCell, close: &mpsc::Sender<()>) -> bool {
    let (reader, mut writer) = stream.into_split();
    let mut reader = BufReader::new(reader);
    let mut line = String::new();

    loop {
        line.clear();
        match reader.read_line(&mut line).await {
            Ok(0) => return true,
            Ok(_) => {}
            Err(err) => {
                tracing::warn!(error = %err, "error reading control command");
                return true;
            }
        }

        let command = line.trim();
        if command == "CLOSE" {
            tracing::info!("received CLOSE command, shutting down");
            if let Err(err) = writer.write_all(b"Closing connection.\n").await {
                tracing::warn!(error = %err, "failed to acknowledge CLOSE");
            }
            let _ = close.send(()).await;
            return false;
        }

        match command.parse::<u64>() {
            Ok(millis) => {
                delay.set(millis);
                tracing::info!(millis, "sleep timer updated");
                let ack = format!("SLEEP_TIMER set to: {millis}\n");
                if let Err(err) = writer.write_all(ack.as_bytes()).await {
                    tracing::warn!(error = %err, "failed to acknowledge command");
                    return true;
                }
            }
            Err(err) => {
                // no acknowledgement for malformed input, keep reading
                tracing::warn!(command, error = %err, "ignoring malformed control command");
            }
        }
    }
}
