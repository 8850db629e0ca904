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

//! Address helpers for configuration values.

use std::net::{IpAddr, Ipv4Addr, SocketAddr};
use std::path::PathBuf;

/// Split `host[:port]` into its parts.
///
/// Accepts `host`, `host:port`, `[v6]`, `[v6]:port` and a bare IPv6
/// literal. `default_port` is used when no port is present; without one a
/// missing port is an error.
pub fn split_host_port(spec: &str, default_port: Option<u16>) -> Result<(String, u16), String> {
    let spec = spec.trim();

    let (host, port) = if let Some(rest) = spec.strip_prefix('[') {
        let (host, after) = rest
            .split_once(']')
            .ok_or_else(|| "unclosed '[' in address".to_string())?;
        match after {
            "" => (host, None),
            _ => {
                let port = after
                    .strip_prefix(':')
                    .ok_or_else(|| format!("unexpected '{after}' after ']'"))?;
                (host, Some(port))
            }
        }
    } else if spec.matches(':').count() > 1 {
        // Bare IPv6 literal, no port possible
        (spec, None)
    } else if let Some((host, port)) = spec.rsplit_once(':') {
        (host, Some(port))
    } else {
        (spec, None)
    };

    if host.is_empty() {
        return Err("host is empty".to_string());
    }

    let port = match port {
        Some(p) => p
            .parse::<u16>()
            .map_err(|_| format!("invalid port '{p}'"))?,
        None => default_port.ok_or_else(|| "port is required".to_string())?,
    };

    Ok((host.to_string(), port))
}

/// Parse a local listen address.
///
/// Formats supported:
/// - `port` -> 127.0.0.1:port
/// - `:port` or `*:port` -> 0.0.0.0:port (all interfaces)
/// - `localhost:port` -> 127.0.0.1:port
/// - `address:port` -> address:port
pub fn parse_listen_addr(spec: &str) -> Result<SocketAddr, String> {
    let spec = spec.trim();

    if let Ok(port) = spec.parse::<u16>() {
        return Ok(SocketAddr::new(IpAddr::V4(Ipv4Addr::LOCALHOST), port));
    }

    let wildcard = spec.strip_prefix("*:").or_else(|| spec.strip_prefix(':'));
    if let Some(port_str) = wildcard {
        let port = port_str
            .parse::<u16>()
            .map_err(|_| format!("invalid port '{port_str}'"))?;
        return Ok(SocketAddr::new(IpAddr::V4(Ipv4Addr::UNSPECIFIED), port));
    }

    if let Some(port_str) = spec.strip_prefix("localhost:") {
        let port = port_str
            .parse::<u16>()
            .map_err(|_| format!("invalid port '{port_str}'"))?;
        return Ok(SocketAddr::new(IpAddr::V4(Ipv4Addr::LOCALHOST), port));
    }

    spec.parse::<SocketAddr>()
        .map_err(|_| "expected port, :port, localhost:port or ip:port".to_string())
}

/// Inverse of [`split_host_port`], bracketing IPv6 hosts.
pub fn join_host_port(host: &str, port: u16) -> String {
    if host.contains(':') {
        format!("[{host}]:{port}")
    } else {
        format!("{host}:{port}")
    }
}

/// Expand a leading `~/` to the user's home directory.
pub fn expand_tilde(path: &str) -> PathBuf {
    if let Some(rest) = path.strip_prefix("~/") {
        if let Some(dirs) = directories::BaseDirs::new() {
            return dirs.home_dir().join(rest);
        }
    }
    PathBuf::from(path)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_split_host_port() {
        assert_eq!(
            split_host_port("bastion:2222", Some(22)).unwrap(),
            ("bastion".to_string(), 2222)
        );
        assert_eq!(
            split_host_port("bastion", Some(22)).unwrap(),
            ("bastion".to_string(), 22)
        );
        assert_eq!(
            split_host_port("[::1]:2200", Some(22)).unwrap(),
            ("::1".to_string(), 2200)
        );
        assert_eq!(
            split_host_port("[fe80::1]", Some(22)).unwrap(),
            ("fe80::1".to_string(), 22)
        );
        assert_eq!(
            split_host_port("fe80::1", Some(22)).unwrap(),
            ("fe80::1".to_string(), 22)
        );
        assert_eq!(
            split_host_port(" db.internal:5432 ", None).unwrap(),
            ("db.internal".to_string(), 5432)
        );
    }

    #[test]
    fn test_split_host_port_errors() {
        assert!(split_host_port("db.internal", None).is_err());
        assert!(split_host_port(":5432", None).is_err());
        assert!(split_host_port("db:notaport", None).is_err());
        assert!(split_host_port("db:70000", None).is_err());
        assert!(split_host_port("[::1", Some(22)).is_err());
        assert!(split_host_port("[::1]x", Some(22)).is_err());
    }

    #[test]
    fn test_parse_listen_addr() {
        let addr = parse_listen_addr("5432").unwrap();
        assert_eq!(addr.ip(), IpAddr::V4(Ipv4Addr::LOCALHOST));
        assert_eq!(addr.port(), 5432);

        let addr = parse_listen_addr(":5432").unwrap();
        assert_eq!(addr.ip(), IpAddr::V4(Ipv4Addr::UNSPECIFIED));

        let addr = parse_listen_addr("*:5433").unwrap();
        assert_eq!(addr.ip(), IpAddr::V4(Ipv4Addr::UNSPECIFIED));
        assert_eq!(addr.port(), 5433);

        let addr = parse_listen_addr("localhost:6000").unwrap();
        assert_eq!(addr.ip(), IpAddr::V4(Ipv4Addr::LOCALHOST));

        let addr = parse_listen_addr("192.168.1.1:8080").unwrap();
        assert_eq!(addr.ip(), IpAddr::V4(Ipv4Addr::new(192, 168, 1, 1)));

        let addr = parse_listen_addr("[::1]:8080").unwrap();
        assert_eq!(addr.port(), 8080);

        assert!(parse_listen_addr("db.internal:5432").is_err());
        assert!(parse_listen_addr(":notaport").is_err());
        assert!(parse_listen_addr("").is_err());
    }

    #[test]
    fn test_join_host_port() {
        assert_eq!(join_host_port("db", 5432), "db:5432");
        assert_eq!(join_host_port("::1", 22), "[::1]:22");
    }

    #[test]
    fn test_expand_tilde_leaves_other_paths_alone() {
        assert_eq!(expand_tilde("/etc/key"), PathBuf::from("/etc/key"));
        assert_eq!(expand_tilde("relative/key"), PathBuf::from("relative/key"));
        assert!(expand_tilde("~/.ssh/id_ed25519").ends_with(".ssh/id_ed25519"));
    }
}
