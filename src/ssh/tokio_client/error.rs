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

use std::io;
use std::time::Duration;

/// Errors raised while talking to a relay host.
#[derive(Debug, thiserror::Error)]
#[non_exhaustive]
pub enum Error {
    #[error("Key authentication failed")]
    KeyAuthFailed,
    #[error("Password authentication failed")]
    PasswordWrong,
    #[error("No authentication method was offered")]
    NoAuthMethods,
    #[error("Invalid address was provided: {0}")]
    AddressInvalid(io::Error),
    #[error("Server host key verification failed")]
    ServerCheckFailed,
    #[error("Connection timed out after {0:?}")]
    Timeout(Duration),
    #[error("Ssh error occured: {0}")]
    SshError(#[from] russh::Error),
    #[error("I/O error")]
    IoError(#[from] io::Error),
}

impl Error {
    /// Whether the relay rejected the offered credentials, as opposed to
    /// failing at the transport or host-key level.
    pub fn is_auth_rejection(&self) -> bool {
        matches!(
            self,
            Error::KeyAuthFailed | Error::PasswordWrong | Error::NoAuthMethods
        )
    }
}
