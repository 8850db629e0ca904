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

//! Turning environment variables into tunnel specifications.
//!
//! An unindexed variable set (`LISTENER_ADDRESS`, `SERVER_HOST`, ...)
//! describes the `default` tunnel. Suffixed variables (`LISTENER_ADDRESS_1`,
//! `SERVER_HOST_1`, ...) describe tunnel `1`, falling back to the unindexed
//! value for everything except the listen address.

use std::collections::{BTreeSet, HashMap};
use std::path::PathBuf;
use std::time::Duration;
use tokio::sync::Semaphore;
use zeroize::Zeroizing;

use super::types::{
    ConfigError, ResolvedConfig, TunnelSpec, DEFAULT_CONNECT_TIMEOUT, DEFAULT_SSH_PORT,
};
use super::utils::{expand_tilde, parse_listen_addr, split_host_port};
use crate::ssh::StrictHostKeyChecking;

pub const LISTENER_ADDRESS: &str = "LISTENER_ADDRESS";
pub const SERVER_HOST: &str = "SERVER_HOST";
pub const SSH_USER: &str = "SSH_USER";
pub const SSH_KEY_FILE: &str = "SSH_KEY_FILE";
pub const SSH_PASSWORD: &str = "SSH_PASSWORD";
pub const DB_HOST: &str = "DB_HOST";
pub const STRICT_HOST_KEY_CHECKING: &str = "STRICT_HOST_KEY_CHECKING";
pub const KNOWN_HOSTS_FILE: &str = "KNOWN_HOSTS_FILE";
pub const HOST_KEY: &str = "HOST_KEY";
pub const CONNECT_TIMEOUT: &str = "CONNECT_TIMEOUT";
pub const MAX_CONNECTIONS: &str = "MAX_CONNECTIONS";

const DEFAULT_TUNNEL: &str = "default";

/// Misspelled names still accepted from older deployments.
fn legacy_alias(var: &str) -> Option<&'static str> {
    match var {
        SSH_USER => Some("SHH_USER"),
        SSH_KEY_FILE => Some("SHH_KEY_FILE"),
        SSH_PASSWORD => Some("SHH_PASSWORD"),
        _ => None,
    }
}

/// Resolves tunnel specifications from a snapshot of variables.
#[derive(Debug, Clone, Default)]
pub struct ConfigResolver {
    vars: HashMap<String, String>,
}

impl ConfigResolver {
    /// Snapshot the process environment, skipping non-UTF-8 entries.
    pub fn from_env() -> Self {
        Self::from_vars(std::env::vars_os().filter_map(|(k, v)| {
            Some((k.into_string().ok()?, v.into_string().ok()?))
        }))
    }

    pub fn from_vars<I, K, V>(vars: I) -> Self
    where
        I: IntoIterator<Item = (K, V)>,
        K: Into<String>,
        V: Into<String>,
    {
        Self {
            vars: vars
                .into_iter()
                .map(|(k, v)| (k.into(), v.into()))
                .collect(),
        }
    }

    /// Resolve every configured tunnel.
    ///
    /// Invalid entries are collected in [`ResolvedConfig::errors`] and do not
    /// affect the other tunnels.
    pub fn resolve(&self) -> ResolvedConfig {
        let mut resolved = ResolvedConfig::default();

        let mut entries: Vec<Option<u32>> = Vec::new();
        if self.get(LISTENER_ADDRESS).is_some() {
            entries.push(None);
        }
        entries.extend(self.indices().into_iter().map(Some));

        for index in entries {
            match self.resolve_tunnel(index) {
                Ok(spec) => resolved.tunnels.push(spec),
                Err(e) => resolved.errors.push(e),
            }
        }

        resolved
    }

    /// Indices `n` for which `LISTENER_ADDRESS_<n>` is set, ascending.
    fn indices(&self) -> BTreeSet<u32> {
        let prefix = format!("{LISTENER_ADDRESS}_");
        self.vars
            .iter()
            .filter(|(_, v)| !v.trim().is_empty())
            .filter_map(|(k, _)| k.strip_prefix(&prefix)?.parse::<u32>().ok())
            .collect()
    }

    fn get(&self, key: &str) -> Option<&str> {
        self.vars
            .get(key)
            .map(|v| v.trim())
            .filter(|v| !v.is_empty())
    }

    /// Raw value of `key`; only the empty string counts as unset.
    fn get_verbatim(&self, key: &str) -> Option<&str> {
        self.vars
            .get(key)
            .map(String::as_str)
            .filter(|v| !v.is_empty())
    }

    /// Look up `var` for a tunnel, trying the indexed name, its legacy
    /// alias, then the unindexed forms. Surrounding whitespace is removed.
    fn lookup(&self, var: &str, index: Option<u32>) -> Option<&str> {
        self.lookup_with(var, index, Self::get)
    }

    /// Like [`Self::lookup`] but keeps the value exactly as configured,
    /// for passwords and paths.
    fn lookup_verbatim(&self, var: &str, index: Option<u32>) -> Option<&str> {
        self.lookup_with(var, index, Self::get_verbatim)
    }

    fn lookup_with<'a>(
        &'a self,
        var: &str,
        index: Option<u32>,
        get: fn(&'a Self, &str) -> Option<&'a str>,
    ) -> Option<&'a str> {
        let alias = legacy_alias(var);

        if let Some(n) = index {
            let indexed = get(self, &format!("{var}_{n}"))
                .or_else(|| alias.and_then(|a| get(self, &format!("{a}_{n}"))));
            if indexed.is_some() || var == LISTENER_ADDRESS {
                return indexed;
            }
        }

        get(self, var).or_else(|| alias.and_then(|a| get(self, a)))
    }

    fn resolve_tunnel(&self, index: Option<u32>) -> Result<TunnelSpec, ConfigError> {
        let name = index.map_or_else(|| DEFAULT_TUNNEL.to_string(), |n| n.to_string());
        let var_name = |var: &str| match index {
            Some(n) => format!("{var}_{n}"),
            None => var.to_string(),
        };
        let required = |var: &str| {
            self.lookup(var, index).ok_or_else(|| ConfigError::Missing {
                tunnel: name.clone(),
                var: var_name(var),
            })
        };
        let invalid = |var: &str, value: &str, reason: String| ConfigError::Invalid {
            tunnel: name.clone(),
            var: var_name(var),
            value: value.to_string(),
            reason,
        };

        let listen = required(LISTENER_ADDRESS)?;
        let listen_addr =
            parse_listen_addr(listen).map_err(|e| invalid(LISTENER_ADDRESS, listen, e))?;

        let relay = required(SERVER_HOST)?;
        let (relay_host, relay_port) = split_host_port(relay, Some(DEFAULT_SSH_PORT))
            .map_err(|e| invalid(SERVER_HOST, relay, e))?;

        let user = required(SSH_USER)?.to_string();

        let destination = required(DB_HOST)?;
        let (destination_host, destination_port) =
            split_host_port(destination, None).map_err(|e| invalid(DB_HOST, destination, e))?;

        let key_path = self.lookup_verbatim(SSH_KEY_FILE, index).map(str::to_string);
        let password = self
            .lookup_verbatim(SSH_PASSWORD, index)
            .map(|p| Zeroizing::new(p.to_string()));

        let host_key_check = match self.lookup(STRICT_HOST_KEY_CHECKING, index) {
            Some(v) => v
                .parse::<StrictHostKeyChecking>()
                .map_err(|e| invalid(STRICT_HOST_KEY_CHECKING, v, e))?,
            None => StrictHostKeyChecking::default(),
        };
        let known_hosts_file: Option<PathBuf> =
            self.lookup_verbatim(KNOWN_HOSTS_FILE, index).map(expand_tilde);
        let host_key = self.lookup(HOST_KEY, index).map(str::to_string);

        let connect_timeout = match self.lookup(CONNECT_TIMEOUT, index) {
            Some(v) => match v.parse::<u64>() {
                Ok(secs) if secs >= 1 => Duration::from_secs(secs),
                _ => {
                    return Err(invalid(
                        CONNECT_TIMEOUT,
                        v,
                        "expected a whole number of seconds >= 1".to_string(),
                    ))
                }
            },
            None => DEFAULT_CONNECT_TIMEOUT,
        };

        let max_connections = match self.lookup(MAX_CONNECTIONS, index) {
            Some(v) => match v.parse::<usize>() {
                Ok(0) => None,
                Ok(n) if n <= Semaphore::MAX_PERMITS => Some(n),
                Ok(_) => {
                    return Err(invalid(
                        MAX_CONNECTIONS,
                        v,
                        format!("must not exceed {}", Semaphore::MAX_PERMITS),
                    ))
                }
                Err(_) => {
                    return Err(invalid(
                        MAX_CONNECTIONS,
                        v,
                        "expected a non-negative integer".to_string(),
                    ))
                }
            },
            None => None,
        };

        Ok(TunnelSpec {
            name,
            listen_addr,
            relay_host,
            relay_port,
            user,
            key_path,
            password,
            destination_host,
            destination_port,
            host_key_check,
            known_hosts_file,
            host_key,
            connect_timeout,
            max_connections,
        })
    }
}
