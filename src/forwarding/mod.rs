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

//! Local TCP listeners forwarded through an SSH relay.
//!
//! # Components
//!
//! - [`TunnelRegistry`]: starts tunnels and owns the shutdown signal
//! - [`ListenerSupervisor`]: accept loop of one tunnel
//! - [`TunnelDialer`]: opens the remote stream, [`SshDialer`] over SSH
//! - [`Tunnel`]: relays bytes between the two halves of a connection

pub mod dialer;
pub mod local;
pub mod manager;
pub mod tunnel;

// Re-export key types for convenience
pub use dialer::{SshChannel, SshDialer, TunnelDialer};
pub use local::ListenerSupervisor;
pub use manager::TunnelRegistry;
pub use tunnel::{Direction, DirectionReport, RelayReport, Tunnel};

/// Connection counters for one tunnel
#[derive(Debug, Default, Clone, PartialEq, Eq)]
pub struct ForwardingStats {
    /// Number of active connections
    pub active_connections: usize,
    /// Total connections accepted
    pub total_connections: u64,
    /// Total bytes transferred
    pub bytes_transferred: u64,
    /// Connections that failed before relaying
    pub failed_connections: u64,
}
