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

//! SSH connection management and establishment.
//!
//! This module handles the low-level SSH connection establishment,
//! host key verification, authentication and `direct-tcpip` channels.

use russh::client::{Config, Handle, Handler, Msg};
use russh::Channel;
use std::fmt::Debug;
use std::net::SocketAddr;
use std::sync::Arc;

use super::authentication::{authenticate_any, AuthMethod, ServerCheckMethod};

/// An authenticated ssh connection to a relay host.
///
/// # Examples
///
/// ```no_run
/// use tunnelmux::ssh::tokio_client::{AuthMethod, Client, ServerCheckMethod};
/// use std::sync::Arc;
/// #[tokio::main]
/// async fn main() -> Result<(), tunnelmux::ssh::tokio_client::Error> {
///     let client = Client::connect(
///         ("bastion.example.com", 22),
///         "deploy",
///         &[AuthMethod::with_password("secret")],
///         ServerCheckMethod::with_known_hosts_file("/home/deploy/.ssh/known_hosts"),
///         Arc::new(russh::client::Config::default()),
///     ).await?;
///
///     let channel = client.open_direct_tcpip_channel("db.internal", 5432, None).await?;
///     drop(channel);
///     client.disconnect().await?;
///     Ok(())
/// }
/// ```
#[derive(Clone)]
pub struct Client {
    connection_handle: Arc<Handle<ClientHandler>>,
    username: String,
    hostname: String,
    port: u16,
}

impl Client {
    /// Open a ssh connection to a remote host and authenticate.
    ///
    /// `methods` are offered in order; the first one accepted by the server
    /// wins. If authentication fails the half-open session is disconnected
    /// before the error is returned.
    pub async fn connect(
        addr: (&str, u16),
        username: &str,
        methods: &[AuthMethod],
        server_check: ServerCheckMethod,
        config: Arc<Config>,
    ) -> Result<Self, super::Error> {
        let (hostname, port) = addr;
        let handler = ClientHandler::new(hostname.to_string(), port, server_check);
        let mut handle = russh::client::connect(config, (hostname, port), handler).await?;

        if let Err(e) = authenticate_any(&mut handle, username, methods).await {
            if let Err(disconnect_err) = handle
                .disconnect(russh::Disconnect::ByApplication, "", "")
                .await
            {
                tracing::trace!("Disconnect after failed authentication: {}", disconnect_err);
            }
            return Err(e);
        }

        Ok(Self {
            connection_handle: Arc::new(handle),
            username: username.to_string(),
            hostname: hostname.to_string(),
            port,
        })
    }

    /// Open a TCP/IP forwarding channel.
    ///
    /// This opens a `direct-tcpip` channel to `host:port`. The host name is
    /// sent as-is and resolved by the relay, not locally.
    pub async fn open_direct_tcpip_channel(
        &self,
        host: &str,
        port: u16,
        originator: Option<SocketAddr>,
    ) -> Result<Channel<Msg>, super::Error> {
        let (originator_host, originator_port) = originator
            .map(|src| (src.ip().to_string(), u32::from(src.port())))
            .unwrap_or_else(|| ("127.0.0.1".to_string(), 0));

        self.connection_handle
            .channel_open_direct_tcpip(host, u32::from(port), originator_host, originator_port)
            .await
            .map_err(super::Error::SshError)
    }

    /// Disconnect from the remote host.
    pub async fn disconnect(&self) -> Result<(), super::Error> {
        self.connection_handle
            .disconnect(russh::Disconnect::ByApplication, "", "")
            .await
            .map_err(super::Error::SshError)
    }

    /// Check if the connection is closed.
    pub fn is_closed(&self) -> bool {
        self.connection_handle.is_closed()
    }
}

impl Debug for Client {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Client")
            .field("username", &self.username)
            .field("hostname", &self.hostname)
            .field("port", &self.port)
            .field("connection_handle", &"Handle<ClientHandler>")
            .finish()
    }
}

/// SSH client handler for managing server key verification.
#[derive(Debug, Clone)]
pub struct ClientHandler {
    hostname: String,
    port: u16,
    server_check: ServerCheckMethod,
}

impl ClientHandler {
    /// Create a new client handler.
    pub fn new(hostname: String, port: u16, server_check: ServerCheckMethod) -> Self {
        Self {
            hostname,
            port,
            server_check,
        }
    }
}

impl Handler for ClientHandler {
    type Error = super::Error;

    async fn check_server_key(
        &mut self,
        server_public_key: &russh::keys::PublicKey,
    ) -> Result<bool, Self::Error> {
        match &self.server_check {
            ServerCheckMethod::NoCheck => Ok(true),
            ServerCheckMethod::PublicKey(key) => {
                let pk = russh::keys::parse_public_key_base64(key)
                    .map_err(|_| super::Error::ServerCheckFailed)?;

                Ok(pk == *server_public_key)
            }
            ServerCheckMethod::KnownHostsFile(known_hosts_path) => {
                let known = russh::keys::check_known_hosts_path(
                    &self.hostname,
                    self.port,
                    server_public_key,
                    known_hosts_path,
                )
                .map_err(|_| super::Error::ServerCheckFailed)?;

                if !known {
                    tracing::warn!(
                        "Host key for {}:{} not found in {:?}",
                        self.hostname,
                        self.port,
                        known_hosts_path
                    );
                }
                Ok(known)
            }
            ServerCheckMethod::AcceptNew(known_hosts_path) => {
                let known = russh::keys::check_known_hosts_path(
                    &self.hostname,
                    self.port,
                    server_public_key,
                    known_hosts_path,
                )
                .map_err(|_| super::Error::ServerCheckFailed)?;

                if !known {
                    tracing::info!(
                        "Learning new host key for {}:{} into {:?}",
                        self.hostname,
                        self.port,
                        known_hosts_path
                    );
                    russh::keys::known_hosts::learn_known_hosts_path(
                        &self.hostname,
                        self.port,
                        server_public_key,
                        known_hosts_path,
                    )
                    .map_err(|_| super::Error::ServerCheckFailed)?;
                }
                Ok(true)
            }
        }
    }
}
