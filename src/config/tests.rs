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

//! Configuration tests.

use std::net::{IpAddr, Ipv4Addr};
use std::path::PathBuf;
use std::time::Duration;

use super::loader::load_env_file;
use super::resolver::ConfigResolver;
use super::types::{ConfigError, DEFAULT_CONNECT_TIMEOUT};
use crate::ssh::tokio_client::ServerCheckMethod;
use crate::ssh::StrictHostKeyChecking;

fn resolver(vars: &[(&str, &str)]) -> ConfigResolver {
    ConfigResolver::from_vars(vars.iter().map(|(k, v)| (k.to_string(), v.to_string())))
}

const SINGLE: &[(&str, &str)] = &[
    ("LISTENER_ADDRESS", "127.0.0.1:5432"),
    ("SERVER_HOST", "bastion.example.com"),
    ("SSH_USER", "deploy"),
    ("SSH_PASSWORD", "secret"),
    ("DB_HOST", "db.internal:5432"),
];

#[test]
fn test_unindexed_tunnel() {
    let resolved = resolver(SINGLE).resolve();
    assert!(resolved.errors.is_empty(), "{:?}", resolved.errors);
    assert_eq!(resolved.tunnels.len(), 1);

    let spec = &resolved.tunnels[0];
    assert_eq!(spec.name, "default");
    assert_eq!(spec.listen_addr.port(), 5432);
    assert_eq!(spec.relay_addr(), "bastion.example.com:22");
    assert_eq!(spec.user, "deploy");
    assert_eq!(spec.destination_addr(), "db.internal:5432");
    assert_eq!(spec.password.as_ref().map(|p| p.as_str()), Some("secret"));
    assert!(spec.key_path.is_none());
    assert_eq!(spec.host_key_check, StrictHostKeyChecking::Yes);
    assert_eq!(spec.connect_timeout, DEFAULT_CONNECT_TIMEOUT);
    assert_eq!(spec.max_connections, None);
}

#[test]
fn test_nothing_configured() {
    let resolved = resolver(&[("PATH", "/usr/bin")]).resolve();
    assert!(resolved.is_empty());
}

#[test]
fn test_indexed_tunnels_fall_back_to_unindexed_values() {
    let resolved = resolver(&[
        ("SERVER_HOST", "bastion:2222"),
        ("SSH_USER", "deploy"),
        ("SSH_KEY_FILE", "/keys/shared"),
        ("DB_HOST", "db-main:5432"),
        ("LISTENER_ADDRESS_1", "127.0.0.1:6001"),
        ("LISTENER_ADDRESS_2", "127.0.0.1:6002"),
        ("DB_HOST_2", "db-replica:5432"),
        ("SSH_USER_2", "readonly"),
    ])
    .resolve();

    assert!(resolved.errors.is_empty(), "{:?}", resolved.errors);
    // No unindexed LISTENER_ADDRESS, so no default tunnel
    assert_eq!(resolved.tunnels.len(), 2);

    let first = &resolved.tunnels[0];
    assert_eq!(first.name, "1");
    assert_eq!(first.relay_addr(), "bastion:2222");
    assert_eq!(first.user, "deploy");
    assert_eq!(first.destination_addr(), "db-main:5432");
    assert_eq!(first.key_path.as_deref(), Some("/keys/shared"));

    let second = &resolved.tunnels[1];
    assert_eq!(second.name, "2");
    assert_eq!(second.user, "readonly");
    assert_eq!(second.destination_addr(), "db-replica:5432");
}

#[test]
fn test_listener_address_never_falls_back() {
    let resolved = resolver(&[
        ("LISTENER_ADDRESS", "127.0.0.1:5432"),
        ("SERVER_HOST", "bastion"),
        ("SSH_USER", "deploy"),
        ("SSH_PASSWORD", "secret"),
        ("DB_HOST", "db:5432"),
        ("DB_HOST_3", "other:5432"),
    ])
    .resolve();

    // DB_HOST_3 alone does not create tunnel 3
    assert_eq!(resolved.tunnels.len(), 1);
    assert_eq!(resolved.tunnels[0].name, "default");
}

#[test]
fn test_tunnels_ordered_default_first_then_by_index() {
    let mut vars = SINGLE.to_vec();
    vars.push(("LISTENER_ADDRESS_10", "127.0.0.1:6010"));
    vars.push(("LISTENER_ADDRESS_2", "127.0.0.1:6002"));
    let resolved = resolver(&vars).resolve();

    let names: Vec<_> = resolved.tunnels.iter().map(|t| t.name.as_str()).collect();
    assert_eq!(names, vec!["default", "2", "10"]);
}

#[test]
fn test_legacy_aliases() {
    let resolved = resolver(&[
        ("LISTENER_ADDRESS", "5432"),
        ("SERVER_HOST", "bastion"),
        ("SHH_USER", "legacy"),
        ("SHH_KEY_FILE", "/keys/legacy"),
        ("SHH_PASSWORD", "old"),
        ("DB_HOST", "db:5432"),
    ])
    .resolve();

    assert!(resolved.errors.is_empty(), "{:?}", resolved.errors);
    let spec = &resolved.tunnels[0];
    assert_eq!(spec.user, "legacy");
    assert_eq!(spec.key_path.as_deref(), Some("/keys/legacy"));
    assert_eq!(spec.password.as_ref().map(|p| p.as_str()), Some("old"));
    assert_eq!(spec.listen_addr.ip(), IpAddr::V4(Ipv4Addr::LOCALHOST));
}

#[test]
fn test_current_name_wins_over_alias() {
    let mut vars = SINGLE.to_vec();
    vars.push(("SHH_USER", "legacy"));
    let resolved = resolver(&vars).resolve();
    assert_eq!(resolved.tunnels[0].user, "deploy");
}

#[test]
fn test_indexed_alias_wins_over_unindexed_name() {
    let resolved = resolver(&[
        ("SERVER_HOST", "bastion"),
        ("SSH_USER", "deploy"),
        ("SSH_PASSWORD", "secret"),
        ("DB_HOST", "db:5432"),
        ("LISTENER_ADDRESS_1", "127.0.0.1:6001"),
        ("SHH_USER_1", "legacy-one"),
    ])
    .resolve();
    assert_eq!(resolved.tunnels[0].user, "legacy-one");
}

#[test]
fn test_missing_required_variable_is_per_tunnel() {
    let mut vars = SINGLE.to_vec();
    vars.push(("LISTENER_ADDRESS_1", "127.0.0.1:6001"));
    vars.push(("LISTENER_ADDRESS_2", "127.0.0.1:6002"));
    vars.retain(|(k, _)| *k != "DB_HOST");
    vars.push(("DB_HOST_2", "db:5432"));
    let resolved = resolver(&vars).resolve();

    assert_eq!(resolved.tunnels.len(), 1);
    assert_eq!(resolved.tunnels[0].name, "2");
    assert_eq!(
        resolved.errors,
        vec![
            ConfigError::Missing {
                tunnel: "default".to_string(),
                var: "DB_HOST".to_string(),
            },
            ConfigError::Missing {
                tunnel: "1".to_string(),
                var: "DB_HOST_1".to_string(),
            },
        ]
    );
}

#[test]
fn test_missing_credentials_is_not_a_config_error() {
    let vars: Vec<_> = SINGLE
        .iter()
        .copied()
        .filter(|(k, _)| !matches!(*k, "SSH_PASSWORD" | "SERVER_HOST"))
        .collect();
    let resolved = resolver(&vars).resolve();

    // Credentials are checked per connection
    assert!(resolved.errors.is_empty());
    assert_eq!(resolved.tunnels.len(), 1);
    assert!(resolved.tunnels[0].auth_resolver().password.is_none());
}

#[test]
fn test_invalid_values() {
    let cases: &[(&str, &str)] = &[
        ("LISTENER_ADDRESS", "not-an-address"),
        ("SERVER_HOST", "bastion:notaport"),
        ("DB_HOST", "db-without-port"),
        ("STRICT_HOST_KEY_CHECKING", "maybe"),
        ("CONNECT_TIMEOUT", "0"),
        ("CONNECT_TIMEOUT", "soon"),
        ("MAX_CONNECTIONS", "-1"),
    ];

    for (var, value) in cases {
        let mut vars: Vec<_> = SINGLE.iter().copied().filter(|(k, _)| k != var).collect();
        vars.push((*var, *value));
        let resolved = resolver(&vars).resolve();

        assert!(resolved.tunnels.is_empty(), "{var}={value} accepted");
        match &resolved.errors[..] {
            [ConfigError::Invalid { var: v, value: got, .. }] => {
                assert_eq!(v.as_str(), *var);
                assert_eq!(got.as_str(), *value);
            }
            other => panic!("{var}={value}: unexpected errors {other:?}"),
        }
    }
}

#[test]
fn test_optional_settings() {
    let mut vars = SINGLE.to_vec();
    vars.push(("STRICT_HOST_KEY_CHECKING", "accept-new"));
    vars.push(("KNOWN_HOSTS_FILE", "/etc/tunnelmux/known_hosts"));
    vars.push(("CONNECT_TIMEOUT", "5"));
    vars.push(("MAX_CONNECTIONS", "16"));
    let spec = resolver(&vars).resolve().tunnels.remove(0);

    assert_eq!(spec.host_key_check, StrictHostKeyChecking::AcceptNew);
    assert_eq!(spec.connect_timeout, Duration::from_secs(5));
    assert_eq!(spec.max_connections, Some(16));
    assert_eq!(
        spec.server_check(),
        ServerCheckMethod::AcceptNew(PathBuf::from("/etc/tunnelmux/known_hosts"))
    );
}

#[test]
fn test_zero_max_connections_is_unbounded() {
    let mut vars = SINGLE.to_vec();
    vars.push(("MAX_CONNECTIONS", "0"));
    let spec = resolver(&vars).resolve().tunnels.remove(0);
    assert_eq!(spec.max_connections, None);
}

#[test]
fn test_pinned_host_key_overrides_known_hosts() {
    let mut vars = SINGLE.to_vec();
    vars.push(("KNOWN_HOSTS_FILE", "/etc/known_hosts"));
    vars.push(("HOST_KEY", "AAAAC3NzaC1lZDI1NTE5AAAAIFakeKey"));
    let spec = resolver(&vars).resolve().tunnels.remove(0);
    assert_eq!(
        spec.server_check(),
        ServerCheckMethod::PublicKey("AAAAC3NzaC1lZDI1NTE5AAAAIFakeKey".to_string())
    );
}

#[test]
fn test_host_key_checking_disabled() {
    let mut vars = SINGLE.to_vec();
    vars.push(("STRICT_HOST_KEY_CHECKING", "no"));
    let spec = resolver(&vars).resolve().tunnels.remove(0);
    assert!(spec.server_check().is_insecure());
}

#[test]
fn test_blank_values_count_as_unset() {
    let mut vars = SINGLE.to_vec();
    vars.push(("LISTENER_ADDRESS_1", "   "));
    vars.push(("SSH_KEY_FILE", ""));
    let resolved = resolver(&vars).resolve();
    assert_eq!(resolved.tunnels.len(), 1);
    assert!(resolved.tunnels[0].key_path.is_none());
}

#[test]
fn test_debug_redacts_password() {
    let spec = resolver(SINGLE).resolve().tunnels.remove(0);
    let debug = format!("{spec:?}");
    assert!(!debug.contains("secret"));
    assert!(debug.contains("<redacted>"));
}

#[test]
fn test_load_env_file_sets_variables_verbatim() {
    let temp_dir = tempfile::TempDir::new().unwrap();
    let path = temp_dir.path().join(".env");
    std::fs::write(
        &path,
        "# tunnel one\nTUNNELMUX_LOADER_RELAY=\"bastion:22\"\nTUNNELMUX_LOADER_PASSWORD=\"  pass word  \"\n",
    )
    .unwrap();

    assert!(load_env_file(&path).unwrap());
    assert_eq!(
        std::env::var("TUNNELMUX_LOADER_RELAY").unwrap(),
        "bastion:22"
    );
    assert_eq!(
        std::env::var("TUNNELMUX_LOADER_PASSWORD").unwrap(),
        "  pass word  "
    );
}

#[test]
fn test_malformed_env_file_is_an_error() {
    let temp_dir = tempfile::TempDir::new().unwrap();
    let path = temp_dir.path().join(".env");
    std::fs::write(&path, "TUNNELMUX_LOADER_BROKEN=\"unterminated\n").unwrap();

    let err = load_env_file(&path).unwrap_err();
    assert!(err.to_string().contains("Failed to load env file"));
}

#[test]
fn test_secrets_and_paths_keep_surrounding_whitespace() {
    let mut vars: Vec<(&str, &str)> = SINGLE
        .iter()
        .filter(|(k, _)| !matches!(*k, "SSH_PASSWORD" | "SERVER_HOST"))
        .copied()
        .collect();
    vars.push(("SSH_PASSWORD", "  pass word  "));
    vars.push(("SSH_KEY_FILE", " spaced key "));
    vars.push(("SERVER_HOST", " bastion:2222 "));
    let spec = resolver(&vars).resolve().tunnels.remove(0);

    assert_eq!(
        spec.password.as_ref().map(|p| p.as_str()),
        Some("  pass word  ")
    );
    assert_eq!(spec.key_path.as_deref(), Some(" spaced key "));
    // Addresses are still trimmed
    assert_eq!(spec.relay_addr(), "bastion:2222");
}

#[test]
fn test_key_path_is_kept_as_configured() {
    let mut vars = SINGLE.to_vec();
    vars.push(("SSH_KEY_FILE", "~/legacy-secret"));
    let spec = resolver(&vars).resolve().tunnels.remove(0);
    assert_eq!(spec.key_path.as_deref(), Some("~/legacy-secret"));
    assert_eq!(
        spec.auth_resolver().key_path.as_deref(),
        Some("~/legacy-secret")
    );
}

#[test]
fn test_max_connections_above_semaphore_limit_is_invalid() {
    let too_many = (tokio::sync::Semaphore::MAX_PERMITS + 1).to_string();
    let mut vars = SINGLE.to_vec();
    vars.push(("MAX_CONNECTIONS", too_many.as_str()));
    let resolved = resolver(&vars).resolve();

    assert!(resolved.tunnels.is_empty());
    assert!(matches!(
        resolved.errors.as_slice(),
        [ConfigError::Invalid { var, .. }] if var == "MAX_CONNECTIONS"
    ));

    let limit = tokio::sync::Semaphore::MAX_PERMITS.to_string();
    let mut vars = SINGLE.to_vec();
    vars.push(("MAX_CONNECTIONS", limit.as_str()));
    let spec = resolver(&vars).resolve().tunnels.remove(0);
    assert_eq!(spec.max_connections, Some(tokio::sync::Semaphore::MAX_PERMITS));
}

#[test]
fn test_missing_env_file_is_ignored() {
    let temp_dir = tempfile::TempDir::new().unwrap();
    let loaded = load_env_file(&temp_dir.path().join("absent.env")).unwrap();
    assert!(!loaded);
}
