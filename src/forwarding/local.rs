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

//! Accept loop for one tunnel.
//!
//! A [`ListenerSupervisor`] owns the local listener of a tunnel. Every
//! accepted connection becomes an independent forwarding unit:
//!
//! 1. Resolve credentials (re-read on every connection)
//! 2. Dial the relay host and open a channel to the destination
//! 3. Relay bytes until either side closes
//!
//! Failures in a unit are logged and close only that client connection.
//! Nothing is retried.

use std::net::SocketAddr;
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::Arc;
use std::time::Duration;
use tokio::net::{TcpListener, TcpStream};
use tokio::sync::Semaphore;
use tokio::time::sleep;
use tokio_util::sync::CancellationToken;
use tokio_util::task::TaskTracker;
use tracing::{debug, error, info, info_span, trace, warn, Instrument};
use uuid::Uuid;

use super::dialer::TunnelDialer;
use super::tunnel::{is_disconnect, RelayReport, Tunnel};
use super::ForwardingStats;
use crate::config::TunnelSpec;
use crate::error::TunnelError;

/// Pause after a failed `accept()` before trying again.
pub const ACCEPT_ERROR_PAUSE: Duration = Duration::from_millis(100);

/// Counters shared between a supervisor and its units
#[derive(Debug, Default)]
pub struct SupervisorStats {
    /// Total connections accepted
    connections_accepted: AtomicU64,
    /// Currently active connections
    active_connections: AtomicU64,
    /// Connections that never reached the relay phase
    connections_failed: AtomicU64,
    /// Total bytes transferred across all connections
    total_bytes_transferred: AtomicU64,
}

impl SupervisorStats {
    pub fn snapshot(&self) -> ForwardingStats {
        ForwardingStats {
            active_connections: self.active_connections.load(Ordering::Relaxed) as usize,
            total_connections: self.connections_accepted.load(Ordering::Relaxed),
            bytes_transferred: self.total_bytes_transferred.load(Ordering::Relaxed),
            failed_connections: self.connections_failed.load(Ordering::Relaxed),
        }
    }
}

/// Listener and accept loop of a single tunnel
#[derive(Debug)]
pub struct ListenerSupervisor<D: TunnelDialer> {
    spec: Arc<TunnelSpec>,
    dialer: Arc<D>,
    listener: TcpListener,
    local_addr: SocketAddr,
    limiter: Option<Arc<Semaphore>>,
    cancel_token: CancellationToken,
    units: TaskTracker,
    stats: Arc<SupervisorStats>,
}

impl<D: TunnelDialer> ListenerSupervisor<D> {
    /// Bind the tunnel's listen address.
    ///
    /// # Errors
    ///
    /// [`TunnelError::Listen`] when the address cannot be bound.
    pub async fn bind(
        spec: Arc<TunnelSpec>,
        dialer: Arc<D>,
        cancel_token: CancellationToken,
    ) -> Result<Self, TunnelError> {
        let listen_error = |source| TunnelError::Listen {
            addr: spec.listen_addr.to_string(),
            source,
        };

        let listener = TcpListener::bind(spec.listen_addr)
            .await
            .map_err(listen_error)?;
        let local_addr = listener.local_addr().map_err(listen_error)?;

        info!(
            tunnel = %spec.name,
            "Listening on {} → {} via {}@{}",
            local_addr,
            spec.destination_addr(),
            spec.user,
            spec.relay_addr()
        );

        let limiter = spec
            .max_connections
            .map(|n| Arc::new(Semaphore::new(n.min(Semaphore::MAX_PERMITS))));

        Ok(Self {
            spec,
            dialer,
            listener,
            local_addr,
            limiter,
            cancel_token,
            units: TaskTracker::new(),
            stats: Arc::new(SupervisorStats::default()),
        })
    }

    /// Address actually bound, useful when the configured port was 0.
    pub fn local_addr(&self) -> SocketAddr {
        self.local_addr
    }

    pub fn stats(&self) -> Arc<SupervisorStats> {
        Arc::clone(&self.stats)
    }

    /// Accept connections until the cancellation token fires, then wait
    /// for in-flight units to finish.
    pub async fn run(self) {
        loop {
            tokio::select! {
                result = self.listener.accept() => {
                    match result {
                        Ok((stream, peer_addr)) => {
                            trace!(tunnel = %self.spec.name, "Accepted connection from {}", peer_addr);
                            self.stats.connections_accepted.fetch_add(1, Ordering::Relaxed);
                            self.spawn_connection_handler(stream, peer_addr);
                        }
                        Err(source) => {
                            let e = TunnelError::Accept {
                                addr: self.local_addr.to_string(),
                                source,
                            };
                            error!(tunnel = %self.spec.name, "{}", e);

                            // Brief pause to avoid busy loop on persistent errors
                            tokio::select! {
                                _ = sleep(ACCEPT_ERROR_PAUSE) => {}
                                _ = self.cancel_token.cancelled() => break,
                            }
                        }
                    }
                }
                _ = self.cancel_token.cancelled() => {
                    break;
                }
            }
        }

        info!(tunnel = %self.spec.name, "Stopped listening on {}", self.local_addr);
        drop(self.listener);

        self.units.close();
        self.units.wait().await;
        debug!(tunnel = %self.spec.name, "All connections closed");
    }

    /// Spawn an independent forwarding unit for one accepted connection
    fn spawn_connection_handler(&self, stream: TcpStream, peer_addr: SocketAddr) {
        let spec = Arc::clone(&self.spec);
        let dialer = Arc::clone(&self.dialer);
        let limiter = self.limiter.clone();
        let stats = Arc::clone(&self.stats);
        let cancel_token = self.cancel_token.clone();

        let span = info_span!(
            "unit",
            tunnel = %spec.name,
            unit = %Uuid::new_v4(),
            peer = %peer_addr
        );

        self.units.spawn(
            async move {
                stats.active_connections.fetch_add(1, Ordering::Relaxed);

                let result =
                    Self::handle_connection(stream, &spec, dialer.as_ref(), limiter, cancel_token)
                        .await;

                stats.active_connections.fetch_sub(1, Ordering::Relaxed);

                match result {
                    Ok(Some(report)) => {
                        stats
                            .total_bytes_transferred
                            .fetch_add(report.total_bytes(), Ordering::Relaxed);
                        log_report(&report);
                    }
                    Ok(None) => debug!("Connection abandoned during shutdown"),
                    Err(e) => {
                        stats.connections_failed.fetch_add(1, Ordering::Relaxed);
                        match e {
                            TunnelError::NoCredentials => error!("{}", e),
                            _ => warn!("Connection failed: {}", e),
                        }
                    }
                }
            }
            .instrument(span),
        );
    }

    /// Run one forwarding unit. `Ok(None)` means shutdown came first.
    async fn handle_connection(
        stream: TcpStream,
        spec: &TunnelSpec,
        dialer: &D,
        limiter: Option<Arc<Semaphore>>,
        cancel_token: CancellationToken,
    ) -> Result<Option<RelayReport>, TunnelError> {
        if let Err(e) = stream.set_nodelay(true) {
            trace!("Failed to set TCP_NODELAY: {}", e);
        }

        let setup = async {
            let permit = match limiter {
                Some(semaphore) => semaphore.acquire_owned().await.ok(),
                None => None,
            };

            let auth = spec.auth_resolver().resolve().await?;
            debug!(
                "Dialing {}@{} for {} using {}",
                spec.user,
                spec.relay_addr(),
                spec.destination_addr(),
                auth.first().map_or("none", |m| m.kind())
            );
            let channel = dialer
                .dial(&spec.relay_addr(), &spec.user, auth, &spec.destination_addr())
                .await?;
            Ok::<_, TunnelError>((channel, permit))
        };

        let (channel, _permit) = tokio::select! {
            result = setup => result?,
            _ = cancel_token.cancelled() => return Ok(None),
        };

        debug!("Channel to {} open, relaying", spec.destination_addr());
        let report = Tunnel::new(cancel_token).run(stream, channel).await;
        Ok(Some(report))
    }
}

fn log_report(report: &RelayReport) {
    for (direction, e) in report.errors() {
        if is_disconnect(e) {
            debug!("{} ended: {}", direction, e);
        } else {
            warn!("{} failed: {}", direction, e);
        }
    }

    info!(
        "Connection closed: {} bytes sent, {} bytes received in {:?}",
        report.client_to_remote.bytes, report.remote_to_client.bytes, report.duration
    );
}
