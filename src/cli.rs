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

use clap::Parser;
use std::path::PathBuf;

#[derive(Parser, Debug)]
#[command(
    name = "tunnelmux",
    version,
    about = "Local TCP listeners forwarded to remote hosts through an SSH relay",
    long_about = "tunnelmux binds one local TCP listener per configured tunnel. Every accepted\nconnection gets its own SSH session to the relay host and a direct-tcpip channel\nto the destination, and bytes are relayed until either side closes.\nTunnels are configured through environment variables, optionally loaded from a\ndotenv file.",
    after_help = "CONFIGURATION:\n  LISTENER_ADDRESS[_N]          Local listen address (port, :port, ip:port)\n  SERVER_HOST[_N]               Relay host, host[:port] (default port 22)\n  SSH_USER[_N]                  Relay username\n  SSH_KEY_FILE[_N]              Private key path\n  SSH_PASSWORD[_N]              Password, also the fallback when the key is unusable\n  DB_HOST[_N]                   Destination host:port, resolved by the relay\n  STRICT_HOST_KEY_CHECKING[_N]  yes (default), accept-new or no\n  KNOWN_HOSTS_FILE[_N]          known_hosts path (default ~/.ssh/known_hosts)\n  HOST_KEY[_N]                  Pinned base64 host key for the relay\n  CONNECT_TIMEOUT[_N]           Seconds to reach and authenticate to the relay\n  MAX_CONNECTIONS[_N]           Concurrent connections per tunnel (0 = unbounded)\n\nIndexed variables fall back to the unindexed ones, except LISTENER_ADDRESS."
)]
pub struct Cli {
    #[arg(
        long,
        default_value = ".env",
        help = "Dotenv file to load before reading the environment\nA missing file is ignored; variables already set are not overridden"
    )]
    pub env_file: PathBuf,

    #[arg(
        short = 'v',
        long,
        action = clap::ArgAction::Count,
        help = "Increase verbosity (-v, -vv, -vvv)"
    )]
    pub verbose: u8,
}
