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

use anyhow::Result;
use clap::Parser;
use std::sync::Arc;
use tokio_util::sync::CancellationToken;

use tunnelmux::{
    cli::Cli,
    config::{load_env_file, ConfigResolver},
    forwarding::{SshDialer, TunnelRegistry},
    utils::init_logging,
};

#[tokio::main]
async fn main() -> Result<()> {
    let cli = Cli::parse();

    // Load the env file first so it can also carry RUST_LOG
    let env_loaded = load_env_file(&cli.env_file);

    init_logging(cli.verbose);

    if env_loaded? {
        tracing::debug!("Loaded environment from {:?}", cli.env_file);
    } else {
        tracing::debug!("No env file at {:?}", cli.env_file);
    }

    let resolved = ConfigResolver::from_env().resolve();
    for e in &resolved.errors {
        tracing::error!("{}", e);
    }

    if resolved.is_empty() {
        tracing::info!("No tunnels configured (set LISTENER_ADDRESS or LISTENER_ADDRESS_<n>)");
        return Ok(());
    }

    let configured = resolved.tunnels.len() + resolved.errors.len();
    let mut registry = TunnelRegistry::new();
    for spec in resolved.tunnels {
        let dialer = Arc::new(SshDialer::for_tunnel(&spec));
        // Failures are logged by the registry and only disable that tunnel
        let _ = registry.start(spec, dialer).await;
    }

    if registry.is_empty() {
        anyhow::bail!("None of the {configured} configured tunnel(s) could be started");
    }

    tracing::info!(
        "{} of {} tunnel(s) running",
        registry.len(),
        configured
    );

    tokio::spawn(shutdown_on_signal(registry.cancel_token()));
    registry.wait().await;

    tracing::info!("All tunnels stopped");
    Ok(())
}

/// Cancel `token` on Ctrl-C, or on SIGTERM where available.
async fn shutdown_on_signal(token: CancellationToken) {
    #[cfg(unix)]
    {
        use tokio::signal::unix::{signal, SignalKind};

        match signal(SignalKind::terminate()) {
            Ok(mut terminate) => {
                tokio::select! {
                    result = tokio::signal::ctrl_c() => {
                        if let Err(e) = result {
                            tracing::error!("Failed to listen for Ctrl-C: {}", e);
                            return;
                        }
                    }
                    _ = terminate.recv() => {}
                }
            }
            Err(e) => {
                tracing::warn!("Failed to install SIGTERM handler: {}", e);
                if let Err(e) = tokio::signal::ctrl_c().await {
                    tracing::error!("Failed to listen for Ctrl-C: {}", e);
                    return;
                }
            }
        }
    }

    #[cfg(not(unix))]
    {
        if let Err(e) = tokio::signal::ctrl_c().await {
            tracing::error!("Failed to listen for Ctrl-C: {}", e);
            return;
        }
    }

    tracing::info!("Shutdown signal received, closing tunnels");
    token.cancel();
}
