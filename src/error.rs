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

//! Errors surfaced by the forwarding engine.
//!
//! Every variant is local to one unit of work: a listener, one connection
//! attempt, or one relay. None of them is propagated past the component
//! that reports it.

use std::io;
use thiserror::Error;

use crate::ssh::tokio_client;

#[derive(Debug, Error)]
pub enum TunnelError {
    /// The local listen address could not be bound.
    #[error("failed to listen on {addr}: {source}")]
    Listen {
        addr: String,
        #[source]
        source: io::Error,
    },

    /// A single `accept()` on the listener failed.
    #[error("failed to accept connection on {addr}: {source}")]
    Accept {
        addr: String,
        #[source]
        source: io::Error,
    },

    /// Neither a key file nor a password is configured.
    #[error("no credentials configured: set a key file or a password")]
    NoCredentials,

    /// The relay host could not be reached, verified or authenticated to.
    #[error("failed to establish SSH session to {relay}: {source}")]
    SessionFailed {
        relay: String,
        #[source]
        source: tokio_client::Error,
    },

    /// The relay host accepted us but could not reach the destination.
    #[error("relay {relay} could not open a channel to {destination}: {source}")]
    ChannelFailed {
        relay: String,
        destination: String,
        #[source]
        source: tokio_client::Error,
    },
}

impl TunnelError {
    pub(crate) fn session(relay: impl Into<String>, source: tokio_client::Error) -> Self {
        Self::SessionFailed {
            relay: relay.into(),
            source,
        }
    }

    pub(crate) fn channel(
        relay: impl Into<String>,
        destination: impl Into<String>,
        source: tokio_client::Error,
    ) -> Self {
        Self::ChannelFailed {
            relay: relay.into(),
            destination: destination.into(),
            source,
        }
    }
}
