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

//! Registry of running tunnels and their shared shutdown signal.
//!
//! The registry starts one [`ListenerSupervisor`] per tunnel, keeps their
//! task handles, and owns the cancellation token every supervisor and
//! forwarding unit listens to. Cancelling it stops all listeners and tears
//! down in-flight connections.

use std::net::SocketAddr;
use std::sync::Arc;
use tokio::task::JoinHandle;
use tokio_util::sync::CancellationToken;
use tracing::{error, info, warn};

use super::dialer::TunnelDialer;
use super::local::{ListenerSupervisor, SupervisorStats};
use super::ForwardingStats;
use crate::config::TunnelSpec;
use crate::error::TunnelError;

/// State kept for a started tunnel
#[derive(Debug)]
struct RegisteredTunnel {
    name: String,
    local_addr: SocketAddr,
    stats: Arc<SupervisorStats>,
    task_handle: JoinHandle<()>,
}

/// Owner of every running tunnel
#[derive(Debug, Default)]
pub struct TunnelRegistry {
    tunnels: Vec<RegisteredTunnel>,
    /// Global cancellation token for shutdown
    shutdown_token: CancellationToken,
}

impl TunnelRegistry {
    pub fn new() -> Self {
        Self::default()
    }

    /// Token that stops every tunnel when cancelled.
    pub fn cancel_token(&self) -> CancellationToken {
        self.shutdown_token.clone()
    }

    /// Bind and start a tunnel.
    ///
    /// Returns the bound address. A failure is logged and leaves the other
    /// tunnels untouched.
    pub async fn start<D: TunnelDialer>(
        &mut self,
        spec: TunnelSpec,
        dialer: Arc<D>,
    ) -> Result<SocketAddr, TunnelError> {
        let name = spec.name.clone();
        let supervisor =
            match ListenerSupervisor::bind(Arc::new(spec), dialer, self.shutdown_token.clone())
                .await
            {
                Ok(supervisor) => supervisor,
                Err(e) => {
                    error!(tunnel = %name, "Tunnel not started: {}", e);
                    return Err(e);
                }
            };

        let local_addr = supervisor.local_addr();
        let stats = supervisor.stats();
        let task_handle = tokio::spawn(supervisor.run());

        self.tunnels.push(RegisteredTunnel {
            name,
            local_addr,
            stats,
            task_handle,
        });

        Ok(local_addr)
    }

    pub fn len(&self) -> usize {
        self.tunnels.len()
    }

    pub fn is_empty(&self) -> bool {
        self.tunnels.is_empty()
    }

    /// Bound address of the tunnel called `name`.
    pub fn local_addr(&self, name: &str) -> Option<SocketAddr> {
        self.find(name).map(|t| t.local_addr)
    }

    /// Connection counters of the tunnel called `name`.
    pub fn stats(&self, name: &str) -> Option<ForwardingStats> {
        self.find(name).map(|t| t.stats.snapshot())
    }

    fn find(&self, name: &str) -> Option<&RegisteredTunnel> {
        self.tunnels.iter().find(|t| t.name == name)
    }

    /// Wait until every supervisor has stopped.
    pub async fn wait(self) {
        for tunnel in self.tunnels {
            if let Err(e) = tunnel.task_handle.await {
                warn!(tunnel = %tunnel.name, "Tunnel task ended abnormally: {}", e);
            }
        }
    }

    /// Cancel every tunnel and wait for them to stop.
    pub async fn shutdown(self) {
        info!("Shutting down {} tunnel(s)", self.tunnels.len());
        self.shutdown_token.cancel();
        self.wait().await;
    }
}
