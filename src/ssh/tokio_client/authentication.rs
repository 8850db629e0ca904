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

//! SSH authentication methods and server verification.
//!
//! Only the two credential kinds a tunnel can be configured with are
//! supported: an already-parsed private key and a password. Host key
//! verification is selected per tunnel through [`ServerCheckMethod`].

use russh::client::{Handle, Handler};
use russh::keys::PrivateKey;
use std::fmt;
use std::path::PathBuf;
use std::sync::Arc;
use zeroize::Zeroizing;

/// A credential offered to the relay host.
#[derive(Clone)]
pub enum AuthMethod {
    /// Public key authentication with parsed private key material.
    PublicKey(Arc<PrivateKey>),
    Password(Zeroizing<String>),
}

impl AuthMethod {
    /// Convenience method to create a [`AuthMethod`] from a string literal.
    pub fn with_password(password: &str) -> Self {
        Self::Password(Zeroizing::new(password.to_string()))
    }

    pub fn with_key(key: PrivateKey) -> Self {
        Self::PublicKey(Arc::new(key))
    }

    /// Short name used in log lines.
    pub fn kind(&self) -> &'static str {
        match self {
            Self::PublicKey(_) => "publickey",
            Self::Password(_) => "password",
        }
    }
}

// Secrets never reach log output.
impl fmt::Debug for AuthMethod {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::PublicKey(key) => f
                .debug_tuple("PublicKey")
                .field(&key.algorithm().as_str())
                .finish(),
            Self::Password(_) => f.debug_tuple("Password").field(&"<redacted>").finish(),
        }
    }
}

/// Server host key verification methods.
///
/// These methods control how the client verifies the server's host key during connection.
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
#[non_exhaustive]
pub enum ServerCheckMethod {
    /// No verification - accept any host key (insecure, explicit opt-in only)
    NoCheck,
    /// Verify against a specific base64 encoded public key
    PublicKey(String),
    /// Verify against a known_hosts file, rejecting unknown hosts
    KnownHostsFile(PathBuf),
    /// Verify against a known_hosts file, recording hosts seen for the first time
    AcceptNew(PathBuf),
}

impl ServerCheckMethod {
    /// Convenience method to create a [`ServerCheckMethod`] from a string literal.
    pub fn with_public_key(key: &str) -> Self {
        Self::PublicKey(key.to_string())
    }

    /// Convenience method to create a [`ServerCheckMethod`] from a path.
    pub fn with_known_hosts_file<T: Into<PathBuf>>(known_hosts_file: T) -> Self {
        Self::KnownHostsFile(known_hosts_file.into())
    }

    pub fn is_insecure(&self) -> bool {
        matches!(self, Self::NoCheck)
    }
}

/// This takes a handle and performs authentification with the given method.
pub(super) async fn authenticate<H: Handler>(
    handle: &mut Handle<H>,
    username: &str,
    auth: &AuthMethod,
) -> Result<(), super::Error> {
    match auth {
        AuthMethod::Password(password) => {
            let is_authentificated = handle
                .authenticate_password(username, password.as_str())
                .await?;
            if !is_authentificated.success() {
                return Err(super::Error::PasswordWrong);
            }
        }
        AuthMethod::PublicKey(key) => {
            let is_authentificated = handle
                .authenticate_publickey(
                    username,
                    russh::keys::PrivateKeyWithHashAlg::new(
                        Arc::clone(key),
                        handle.best_supported_rsa_hash().await?.flatten(),
                    ),
                )
                .await?;
            if !is_authentificated.success() {
                return Err(super::Error::KeyAuthFailed);
            }
        }
    };
    Ok(())
}

/// Offer each method in order until one is accepted.
///
/// Returns the error of the last rejected method when none succeeds.
pub(super) async fn authenticate_any<H: Handler>(
    handle: &mut Handle<H>,
    username: &str,
    methods: &[AuthMethod],
) -> Result<(), super::Error> {
    let mut last_err = super::Error::NoAuthMethods;
    for method in methods {
        match authenticate(handle, username, method).await {
            Ok(()) => {
                tracing::debug!("Authenticated as {} using {}", username, method.kind());
                return Ok(());
            }
            Err(e) if e.is_auth_rejection() => {
                tracing::debug!("Relay rejected {} authentication: {}", method.kind(), e);
                last_err = e;
            }
            Err(e) => return Err(e),
        }
    }
    Err(last_err)
}
