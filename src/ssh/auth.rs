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

//! Authentication method resolution for tunnel connections.
//!
//! Resolution runs once per accepted connection and is never cached, so a
//! key file that becomes readable between two attempts is picked up by the
//! second one.

use zeroize::Zeroizing;

use super::tokio_client::AuthMethod;
use crate::config::expand_tilde;
use crate::error::TunnelError;

/// Credentials configured for one tunnel.
#[derive(Clone, Default)]
pub struct AuthResolver {
    /// Optional path to SSH key file, as configured
    pub key_path: Option<String>,
    /// Optional password, also the fallback when the key cannot be used
    pub password: Option<Zeroizing<String>>,
}

impl std::fmt::Debug for AuthResolver {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("AuthResolver")
            .field("key_path", &self.key_path)
            .field("password", &self.password.as_ref().map(|_| "<redacted>"))
            .finish()
    }
}

impl AuthResolver {
    /// Create a resolver. Empty values count as not configured.
    pub fn new(key_path: Option<String>, password: Option<Zeroizing<String>>) -> Self {
        Self {
            key_path: key_path.filter(|p| !p.is_empty()),
            password: password.filter(|p| !p.is_empty()),
        }
    }

    /// Determine the authentication methods to offer, in order.
    ///
    /// 1. Key file (if configured) that reads and parses as a private key
    /// 2. Configured password, when there is no usable key
    /// 3. The key path itself used as a password, when the key is unusable
    ///    and no password is configured. The configured string is sent
    ///    unchanged, without `~/` expansion.
    ///
    /// # Errors
    ///
    /// Returns [`TunnelError::NoCredentials`] when neither a key path nor a
    /// password is configured.
    pub async fn resolve(&self) -> Result<Vec<AuthMethod>, TunnelError> {
        if let Some(ref key_path) = self.key_path {
            return Ok(vec![self.key_file_auth(key_path).await]);
        }

        if let Some(ref password) = self.password {
            tracing::debug!("Using password authentication");
            return Ok(vec![AuthMethod::Password(password.clone())]);
        }

        Err(TunnelError::NoCredentials)
    }

    /// Attempt authentication with a specific key file, degrading to a
    /// password when the key cannot be read or parsed.
    async fn key_file_auth(&self, key_path: &str) -> AuthMethod {
        tracing::debug!("Authenticating with key: {:?}", key_path);

        let failure = match tokio::fs::read(expand_tilde(key_path)).await {
            Ok(bytes) => {
                let key_contents = Zeroizing::new(bytes);
                match std::str::from_utf8(&key_contents) {
                    Ok(text) => match russh::keys::decode_secret_key(text, None) {
                        Ok(key) => return AuthMethod::with_key(key),
                        Err(e) => format!("failed to parse key file: {e}"),
                    },
                    Err(_) => "key file is not valid UTF-8".to_string(),
                }
            }
            Err(e) => format!("failed to read key file: {e}"),
        };

        if let Some(ref password) = self.password {
            tracing::debug!(
                "Key {:?} unusable ({}), using configured password",
                key_path,
                failure
            );
            return AuthMethod::Password(password.clone());
        }

        // Older configurations put the password in the key file variable.
        tracing::warn!(
            "Key {:?} unusable ({}) and no password configured; using the key path as the password",
            key_path,
            failure
        );
        AuthMethod::Password(Zeroizing::new(key_path.to_string()))
    }
}
