// Copyright 2025 Lablup Inc. and Jeongkyu Shin
//
// Licensed under the Apache License, Version 2.0 (the "License");
// you may not use this file except in compliance with the License.
// You may obtain a copy of the License at
//
//     http://www.apache.org/licenses/LICENSE-2.0
//
// Unless required by applicable law or agreed to in writing, software
// distributed under the License is distributed on an "AS IS" BASIS,
// WITHOUT WARRANTIES OR CONDITIONS OF ANY KIND, either express or implied.
// See the License for the specific language governing permissions and
// limitations under the License.

//! Bidirectional byte relay between a local connection and a remote channel.
//!
//! # Architecture
//!
//! The relay consists of two concurrent pumps:
//! - **Client→Remote**: reads from the local socket, writes to the channel
//! - **Remote→Client**: reads from the channel, writes to the local socket
//!
//! Both pumps share a cancellation token. Whichever pump finishes first,
//! by end of stream or by error, cancels it so the other stops promptly,
//! and each pump shuts down the write half it owns. The relay only returns
//! once both pumps have stopped.
//!
//! There is no half-close: end of stream in one direction tears down the
//! other as well, even in the middle of a write. A client that shuts down
//! its sending side after a request and then waits for the response will
//! not receive it. Protocols that keep both directions open until the
//! exchange is over, which covers database wire protocols, are unaffected.

use std::fmt;
use std::io;
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::Arc;
use std::time::{Duration, Instant};
use tokio::io::{AsyncRead, AsyncReadExt, AsyncWrite, AsyncWriteExt};
use tokio_util::sync::CancellationToken;
use tracing::{debug, trace};

/// Read buffer size per direction.
pub const RELAY_BUFFER_SIZE: usize = 8 * 1024;

/// Upper bound for shutting down a write half after its pump stops.
pub const SHUTDOWN_GRACE: Duration = Duration::from_secs(5);

/// Direction of a relay pump.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Direction {
    ClientToRemote,
    RemoteToClient,
}

impl fmt::Display for Direction {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Direction::ClientToRemote => write!(f, "client→remote"),
            Direction::RemoteToClient => write!(f, "remote→client"),
        }
    }
}

/// Live counters for a relay
#[derive(Debug, Clone)]
pub struct TunnelStats {
    /// Bytes transferred from client to remote
    pub bytes_client_to_remote: Arc<AtomicU64>,
    /// Bytes transferred from remote to client
    pub bytes_remote_to_client: Arc<AtomicU64>,
    /// Start time of the relay
    pub started_at: Instant,
}

impl Default for TunnelStats {
    fn default() -> Self {
        Self::new()
    }
}

impl TunnelStats {
    pub fn new() -> Self {
        Self {
            bytes_client_to_remote: Arc::new(AtomicU64::new(0)),
            bytes_remote_to_client: Arc::new(AtomicU64::new(0)),
            started_at: Instant::now(),
        }
    }

    fn counter(&self, direction: Direction) -> &AtomicU64 {
        match direction {
            Direction::ClientToRemote => &self.bytes_client_to_remote,
            Direction::RemoteToClient => &self.bytes_remote_to_client,
        }
    }
}

/// Result of one direction of a relay.
#[derive(Debug)]
pub struct DirectionReport {
    pub bytes: u64,
    /// I/O failure that ended this direction, if any.
    pub error: Option<io::Error>,
}

/// Final account of a finished relay. Both directions are always reported.
#[derive(Debug)]
pub struct RelayReport {
    pub client_to_remote: DirectionReport,
    pub remote_to_client: DirectionReport,
    pub duration: Duration,
}

impl RelayReport {
    pub fn total_bytes(&self) -> u64 {
        self.client_to_remote.bytes + self.remote_to_client.bytes
    }

    /// Errors per direction, in client→remote then remote→client order.
    pub fn errors(&self) -> impl Iterator<Item = (Direction, &io::Error)> {
        [
            (Direction::ClientToRemote, &self.client_to_remote),
            (Direction::RemoteToClient, &self.remote_to_client),
        ]
        .into_iter()
        .filter_map(|(d, r)| r.error.as_ref().map(|e| (d, e)))
    }

    /// Neither direction ended with an I/O error.
    pub fn is_clean(&self) -> bool {
        self.errors().next().is_none()
    }
}

/// Errors that only mean the peer went away.
pub fn is_disconnect(e: &io::Error) -> bool {
    matches!(
        e.kind(),
        io::ErrorKind::ConnectionReset
            | io::ErrorKind::ConnectionAborted
            | io::ErrorKind::BrokenPipe
            | io::ErrorKind::UnexpectedEof
    )
}

/// Bidirectional relay between a client stream and a remote stream
pub struct Tunnel {
    stats: TunnelStats,
    shutdown: CancellationToken,
}

impl Tunnel {
    /// Create a relay that also stops when `shutdown` is cancelled.
    pub fn new(shutdown: CancellationToken) -> Self {
        Self {
            stats: TunnelStats::new(),
            shutdown,
        }
    }

    /// Relay bytes in both directions until either side finishes.
    ///
    /// Consumes both streams; they are closed when this returns.
    pub async fn run<C, R>(&self, client: C, remote: R) -> RelayReport
    where
        C: AsyncRead + AsyncWrite + Send,
        R: AsyncRead + AsyncWrite + Send,
    {
        let done = self.shutdown.child_token();
        let (client_rx, client_tx) = tokio::io::split(client);
        let (remote_rx, remote_tx) = tokio::io::split(remote);

        debug!("Starting bidirectional relay");

        let (upstream, downstream) = tokio::join!(
            self.pump(Direction::ClientToRemote, client_rx, remote_tx, &done),
            self.pump(Direction::RemoteToClient, remote_rx, client_tx, &done),
        );

        let report = RelayReport {
            client_to_remote: DirectionReport {
                bytes: self.stats.bytes_client_to_remote.load(Ordering::Relaxed),
                error: upstream,
            },
            remote_to_client: DirectionReport {
                bytes: self.stats.bytes_remote_to_client.load(Ordering::Relaxed),
                error: downstream,
            },
            duration: self.stats.started_at.elapsed(),
        };

        debug!(
            "Relay completed: {} bytes C→R, {} bytes R→C, duration: {:?}",
            report.client_to_remote.bytes, report.remote_to_client.bytes, report.duration
        );

        report
    }

    /// Copy `reader` into `writer` until end of stream, an error, or `done`.
    async fn pump<Rd, Wr>(
        &self,
        direction: Direction,
        mut reader: Rd,
        mut writer: Wr,
        done: &CancellationToken,
    ) -> Option<io::Error>
    where
        Rd: AsyncRead + Unpin,
        Wr: AsyncWrite + Unpin,
    {
        let counter = self.stats.counter(direction);
        let mut buffer = vec![0u8; RELAY_BUFFER_SIZE];

        let result: io::Result<()> = loop {
            let n = tokio::select! {
                _ = done.cancelled() => break Ok(()),
                read = reader.read(&mut buffer) => match read {
                    Ok(0) => {
                        trace!("{} reached end of stream", direction);
                        break Ok(());
                    }
                    Ok(n) => n,
                    Err(e) => break Err(e),
                },
            };

            tokio::select! {
                _ = done.cancelled() => break Ok(()),
                written = writer.write_all(&buffer[..n]) => {
                    if let Err(e) = written {
                        break Err(e);
                    }
                }
            }

            let total = counter.fetch_add(n as u64, Ordering::Relaxed) + n as u64;
            trace!("Forwarded {} bytes {} (total: {})", n, direction, total);
        };

        // Stop the opposite pump, then close our write half
        done.cancel();
        match tokio::time::timeout(SHUTDOWN_GRACE, writer.shutdown()).await {
            Ok(Ok(())) => {}
            Ok(Err(e)) => trace!("{} shutdown failed: {}", direction, e),
            Err(_) => trace!("{} shutdown timed out", direction),
        }

        result.err()
    }
}
