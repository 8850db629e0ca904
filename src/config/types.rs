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

//! Configuration type definitions.

use std::fmt;
use std::net::SocketAddr;
use std::path::PathBuf;
use std::time::Duration;
use thiserror::Error;
use zeroize::Zeroizing;

use super::utils::join_host_port;
use crate::ssh::known_hosts::{get_check_method, StrictHostKeyChecking};
use crate::ssh::tokio_client::ServerCheckMethod;
use crate::ssh::AuthResolver;

/// Default SSH port used when the relay address carries none.
pub const DEFAULT_SSH_PORT: u16 = 22;

/// Default timeout for reaching and authenticating to the relay host.
pub const DEFAULT_CONNECT_TIMEOUT: Duration = Duration::from_secs(30);

/// One configured tunnel: a local listener, a relay host and a destination.
///
/// Built once at startup and never modified afterwards.
#[derive(Clone)]
pub struct TunnelSpec {
    /// `default` for the unindexed tunnel, otherwise the index.
    pub name: String,
    pub listen_addr: SocketAddr,
    pub relay_host: String,
    pub relay_port: u16,
    pub user: String,
    /// Key file path exactly as configured, `~/` not yet expanded.
    pub key_path: Option<String>,
    pub password: Option<Zeroizing<String>>,
    /// Destination host, resolved by the relay.
    pub destination_host: String,
    pub destination_port: u16,
    pub host_key_check: StrictHostKeyChecking,
    pub known_hosts_file: Option<PathBuf>,
    /// Base64 host key pinned for the relay.
    pub host_key: Option<String>,
    pub connect_timeout: Duration,
    /// Concurrent forwarding units allowed, `None` for unbounded.
    pub max_connections: Option<usize>,
}

impl TunnelSpec {
    pub fn relay_addr(&self) -> String {
        join_host_port(&self.relay_host, self.relay_port)
    }

    pub fn destination_addr(&self) -> String {
        join_host_port(&self.destination_host, self.destination_port)
    }

    /// Credentials resolver for connections accepted by this tunnel.
    pub fn auth_resolver(&self) -> AuthResolver {
        AuthResolver::new(self.key_path.clone(), self.password.clone())
    }

    /// Host key verification policy for the relay.
    pub fn server_check(&self) -> ServerCheckMethod {
        get_check_method(
            self.host_key_check,
            self.known_hosts_file.as_deref(),
            self.host_key.as_deref(),
        )
    }
}

impl fmt::Debug for TunnelSpec {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("TunnelSpec")
            .field("name", &self.name)
            .field("listen_addr", &self.listen_addr)
            .field("relay", &self.relay_addr())
            .field("user", &self.user)
            .field("key_path", &self.key_path)
            .field("password", &self.password.as_ref().map(|_| "<redacted>"))
            .field("destination", &self.destination_addr())
            .field("host_key_check", &self.host_key_check)
            .field("connect_timeout", &self.connect_timeout)
            .field("max_connections", &self.max_connections)
            .finish()
    }
}

impl fmt::Display for TunnelSpec {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(
            f,
            "{}→{}@{}→{}",
            self.listen_addr,
            self.user,
            self.relay_addr(),
            self.destination_addr()
        )
    }
}

/// A tunnel entry that could not be turned into a [`TunnelSpec`].
#[derive(Debug, Clone, Error, PartialEq, Eq)]
pub enum ConfigError {
    #[error("tunnel '{tunnel}': missing required variable {var}")]
    Missing { tunnel: String, var: String },

    #[error("tunnel '{tunnel}': invalid {var} '{value}': {reason}")]
    Invalid {
        tunnel: String,
        var: String,
        value: String,
        reason: String,
    },
}

/// Outcome of resolving the environment.
#[derive(Debug, Default)]
pub struct ResolvedConfig {
    /// Valid tunnels, `default` first, then by index.
    pub tunnels: Vec<TunnelSpec>,
    /// One entry per tunnel that was configured but is unusable.
    pub errors: Vec<ConfigError>,
}

impl ResolvedConfig {
    /// Nothing at all was configured.
    pub fn is_empty(&self) -> bool {
        self.tunnels.is_empty() && self.errors.is_empty()
    }
}
