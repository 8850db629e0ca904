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

use super::tokio_client::ServerCheckMethod;
use directories::BaseDirs;
use std::path::{Path, PathBuf};
use std::str::FromStr;

/// Get the default known_hosts file path
pub fn get_default_known_hosts_path() -> Option<PathBuf> {
    BaseDirs::new().map(|dirs| dirs.home_dir().join(".ssh").join("known_hosts"))
}

/// Create a ServerCheckMethod for one tunnel.
///
/// A pinned host key wins over known_hosts. Without an explicit file the
/// user's `~/.ssh/known_hosts` is used; when even that cannot be determined
/// a relative `known_hosts` in the working directory is used, so that
/// verification still happens (and fails closed on an unknown host).
pub fn get_check_method(
    strict_mode: StrictHostKeyChecking,
    known_hosts_file: Option<&Path>,
    pinned_key: Option<&str>,
) -> ServerCheckMethod {
    if strict_mode == StrictHostKeyChecking::No {
        tracing::debug!("Host key checking disabled (strict mode = no)");
        return ServerCheckMethod::NoCheck;
    }

    if let Some(key) = pinned_key {
        tracing::debug!("Using pinned host key");
        return ServerCheckMethod::with_public_key(key);
    }

    let path = known_hosts_file
        .map(Path::to_path_buf)
        .or_else(get_default_known_hosts_path)
        .unwrap_or_else(|| {
            tracing::warn!("Could not determine home directory, using ./known_hosts");
            PathBuf::from("known_hosts")
        });

    match strict_mode {
        StrictHostKeyChecking::AcceptNew => {
            tracing::debug!("Using known_hosts file: {:?} (accept-new mode)", path);
            ServerCheckMethod::AcceptNew(path)
        }
        _ => {
            tracing::debug!("Using known_hosts file: {:?} (strict mode)", path);
            ServerCheckMethod::KnownHostsFile(path)
        }
    }
}

/// Mode for host key checking
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum StrictHostKeyChecking {
    /// Always verify host keys (fail on unknown/changed)
    #[default]
    Yes,
    /// Never verify host keys (accept all)
    No,
    /// Verify known hosts, add new ones automatically (TOFU)
    AcceptNew,
}

impl FromStr for StrictHostKeyChecking {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.trim().to_lowercase().as_str() {
            "yes" | "true" => Ok(Self::Yes),
            "no" | "false" => Ok(Self::No),
            "accept-new" | "tofu" => Ok(Self::AcceptNew),
            other => Err(format!(
                "invalid host key checking mode '{other}' (expected yes, no or accept-new)"
            )),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_strict_host_key_checking_from_str() {
        assert_eq!(
            StrictHostKeyChecking::from_str("yes").unwrap(),
            StrictHostKeyChecking::Yes
        );
        assert_eq!(
            StrictHostKeyChecking::from_str("TRUE").unwrap(),
            StrictHostKeyChecking::Yes
        );
        assert_eq!(
            StrictHostKeyChecking::from_str("no").unwrap(),
            StrictHostKeyChecking::No
        );
        assert_eq!(
            StrictHostKeyChecking::from_str("false").unwrap(),
            StrictHostKeyChecking::No
        );
        assert_eq!(
            StrictHostKeyChecking::from_str("accept-new").unwrap(),
            StrictHostKeyChecking::AcceptNew
        );
        assert_eq!(
            StrictHostKeyChecking::from_str("tofu").unwrap(),
            StrictHostKeyChecking::AcceptNew
        );
        assert!(StrictHostKeyChecking::from_str("maybe").is_err());
    }

    #[test]
    fn test_strict_host_key_checking_default_is_strict() {
        assert_eq!(StrictHostKeyChecking::default(), StrictHostKeyChecking::Yes);
    }

    #[test]
    fn test_get_check_method() {
        let method = get_check_method(StrictHostKeyChecking::No, None, Some("AAAA"));
        assert!(matches!(method, ServerCheckMethod::NoCheck));

        let method = get_check_method(StrictHostKeyChecking::Yes, None, Some("AAAA"));
        assert_eq!(method, ServerCheckMethod::PublicKey("AAAA".to_string()));

        let file = Path::new("/etc/tunnelmux/known_hosts");
        let method = get_check_method(StrictHostKeyChecking::Yes, Some(file), None);
        assert_eq!(method, ServerCheckMethod::KnownHostsFile(file.to_path_buf()));

        let method = get_check_method(StrictHostKeyChecking::AcceptNew, Some(file), None);
        assert_eq!(method, ServerCheckMethod::AcceptNew(file.to_path_buf()));
    }

    #[test]
    fn test_default_path_is_used_without_explicit_file() {
        let method = get_check_method(StrictHostKeyChecking::Yes, None, None);
        match method {
            ServerCheckMethod::KnownHostsFile(path) => {
                assert!(path.ends_with("known_hosts"));
            }
            other => panic!("Expected KnownHostsFile, got {other:?}"),
        }
    }
}
