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

//! Establishing the remote half of a forwarding unit.
//!
//! A [`TunnelDialer`] turns relay coordinates and credentials into a
//! byte stream that reaches the destination. [`SshDialer`] does this with a
//! fresh SSH session per call and a `direct-tcpip` channel through it.

use async_trait::async_trait;
use russh::client::Msg;
use russh::ChannelStream;
use std::io;
use std::pin::Pin;
use std::sync::Arc;
use std::task::{Context, Poll};
use std::time::Duration;
use tokio::io::{AsyncRead, AsyncWrite, ReadBuf};
use tracing::{debug, trace, warn};

use crate::config::{split_host_port, TunnelSpec, DEFAULT_SSH_PORT};
use crate::error::TunnelError;
use crate::ssh::tokio_client::{AuthMethod, Client, Config, Error, ServerCheckMethod};

/// Opens a stream to `destination` through the relay host `relay`.
///
/// Implementations perform no retries; every call is one attempt.
#[async_trait]
pub trait TunnelDialer: Send + Sync + 'static {
    type Channel: AsyncRead + AsyncWrite + Send + Unpin + 'static;

    /// # Errors
    ///
    /// [`TunnelError::SessionFailed`] when the relay cannot be reached,
    /// verified or authenticated to, [`TunnelError::ChannelFailed`] when
    /// the relay refuses or cannot reach the destination.
    async fn dial(
        &self,
        relay: &str,
        user: &str,
        auth: Vec<AuthMethod>,
        destination: &str,
    ) -> Result<Self::Channel, TunnelError>;
}

/// Dialer backed by one SSH session per connection.
#[derive(Debug, Clone)]
pub struct SshDialer {
    server_check: ServerCheckMethod,
    connect_timeout: Duration,
    config: Arc<Config>,
}

impl SshDialer {
    pub fn new(server_check: ServerCheckMethod, connect_timeout: Duration) -> Self {
        let config = Config {
            keepalive_interval: Some(Duration::from_secs(30)),
            keepalive_max: 3,
            inactivity_timeout: None,
            ..Default::default()
        };

        Self {
            server_check,
            connect_timeout,
            config: Arc::new(config),
        }
    }

    /// Dialer using the host key policy and timeout of `spec`.
    pub fn for_tunnel(spec: &TunnelSpec) -> Self {
        let server_check = spec.server_check();
        if server_check.is_insecure() {
            warn!(
                tunnel = %spec.name,
                "Host key checking is disabled for relay {}; connections are open to interception",
                spec.relay_addr()
            );
        }
        Self::new(server_check, spec.connect_timeout)
    }
}

#[async_trait]
impl TunnelDialer for SshDialer {
    type Channel = SshChannel;

    async fn dial(
        &self,
        relay: &str,
        user: &str,
        auth: Vec<AuthMethod>,
        destination: &str,
    ) -> Result<SshChannel, TunnelError> {
        let (relay_host, relay_port) = split_host_port(relay, Some(DEFAULT_SSH_PORT)).map_err(
            |reason| {
                TunnelError::session(
                    relay,
                    Error::AddressInvalid(io::Error::new(io::ErrorKind::InvalidInput, reason)),
                )
            },
        )?;
        let (dest_host, dest_port) = split_host_port(destination, None).map_err(|reason| {
            TunnelError::channel(
                relay,
                destination,
                Error::AddressInvalid(io::Error::new(io::ErrorKind::InvalidInput, reason)),
            )
        })?;

        debug!(
            "Connecting to {}@{} ({} auth method(s))",
            user,
            relay,
            auth.len()
        );

        let connect = Client::connect(
            (relay_host.as_str(), relay_port),
            user,
            &auth,
            self.server_check.clone(),
            Arc::clone(&self.config),
        );
        let client = match tokio::time::timeout(self.connect_timeout, connect).await {
            Ok(Ok(client)) => client,
            Ok(Err(e)) => return Err(TunnelError::session(relay, e)),
            Err(_) => {
                return Err(TunnelError::session(
                    relay,
                    Error::Timeout(self.connect_timeout),
                ))
            }
        };

        trace!("Opening direct-tcpip channel to {}", destination);
        match client
            .open_direct_tcpip_channel(&dest_host, dest_port, None)
            .await
        {
            Ok(channel) => Ok(SshChannel {
                stream: channel.into_stream(),
                session: Some(client),
            }),
            Err(e) => {
                if let Err(disconnect_err) = client.disconnect().await {
                    trace!("Disconnect after channel failure: {}", disconnect_err);
                }
                Err(TunnelError::channel(relay, destination, e))
            }
        }
    }
}

/// A `direct-tcpip` channel that owns its SSH session.
///
/// Dropping the channel disconnects the session.
pub struct SshChannel {
    stream: ChannelStream<Msg>,
    session: Option<Client>,
}

impl std::fmt::Debug for SshChannel {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("SshChannel")
            .field("session", &self.session)
            .finish_non_exhaustive()
    }
}

impl AsyncRead for SshChannel {
    fn poll_read(
        mut self: Pin<&mut Self>,
        cx: &mut Context<'_>,
        buf: &mut ReadBuf<'_>,
    ) -> Poll<io::Result<()>> {
        Pin::new(&mut self.stream).poll_read(cx, buf)
    }
}

impl AsyncWrite for SshChannel {
    fn poll_write(
        mut self: Pin<&mut Self>,
        cx: &mut Context<'_>,
        buf: &[u8],
    ) -> Poll<io::Result<usize>> {
        Pin::new(&mut self.stream).poll_write(cx, buf)
    }

    fn poll_flush(mut self: Pin<&mut Self>, cx: &mut Context<'_>) -> Poll<io::Result<()>> {
        Pin::new(&mut self.stream).poll_flush(cx)
    }

    fn poll_shutdown(mut self: Pin<&mut Self>, cx: &mut Context<'_>) -> Poll<io::Result<()>> {
        Pin::new(&mut self.stream).poll_shutdown(cx)
    }
}

impl Drop for SshChannel {
    fn drop(&mut self) {
        let Some(session) = self.session.take() else {
            return;
        };
        if session.is_closed() {
            return;
        }
        if let Ok(runtime) = tokio::runtime::Handle::try_current() {
            runtime.spawn(async move {
                if let Err(e) = session.disconnect().await {
                    trace!("Session disconnect on channel drop: {}", e);
                }
            });
        }
    }
}
