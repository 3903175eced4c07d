// Copyright (c) 2026 CLNP Contributors
// SPDX-License-Identifier: Apache-2.0

#![forbid(unsafe_code)]
#![deny(clippy::unwrap_used, clippy::expect_used, clippy::panic)]

use clap::Parser;
use std::sync::Arc;
use std::time::Duration;
use tracing_subscriber::EnvFilter;

use clnp_daemon::config::ServiceConfig;
use clnp_daemon::server::{self, AppState};
use clnp_daemon::store::{SystemClock, SWEEP_INTERVAL_MS};

#[derive(Debug, Parser)]
#[command(name = "clnp-daemon")]
#[command(about = "Pointer-liveness verification service")]
struct Args {
    /// Overrides HOST/PORT, e.g. 0.0.0.0:8787.
    #[arg(long)]
    listen: Option<String>,

    /// Overrides CLNP_DATA_DIR.
    #[arg(long)]
    data_dir: Option<String>,

    #[arg(long, default_value = "info")]
    log: String,
}

#[tokio::main]
async fn main() -> Result<(), Box<dyn std::error::Error>> {
    let args = Args::parse();

    tracing_subscriber::fmt()
        .with_env_filter(EnvFilter::new(args.log))
        .init();

    let mut cfg = ServiceConfig::from_env();
    if let Some(listen) = args.listen {
        let (host, port) = listen
            .rsplit_once(':')
            .ok_or("--listen must be host:port")?;
        cfg.host = host.to_string();
        cfg.port = port.parse()?;
    }
    if let Some(data_dir) = args.data_dir {
        cfg.data_dir = data_dir.into();
    }
    std::fs::create_dir_all(&cfg.data_dir)?;
    if cfg.ephemeral_secret {
        tracing::warn!(
            "CLNP_SECRET is unset; using an ephemeral key, tokens will not survive a restart"
        );
    }
    if cfg.admin_token.is_none() {
        tracing::info!("CLNP_ADMIN_TOKEN is unset; admin routes disabled");
    }

    let addr = cfg.listen_addr();
    let state = AppState::build(cfg, Arc::new(SystemClock));

    let sweeper_store = state.store.clone();
    tokio::spawn(async move {
        let mut ticker = tokio::time::interval(Duration::from_millis(SWEEP_INTERVAL_MS));
        loop {
            ticker.tick().await;
            let evicted = sweeper_store.sweep();
            if evicted > 0 {
                tracing::debug!(evicted = %evicted, "challenge sweep");
            }
        }
    });

    let listener = tokio::net::TcpListener::bind(&addr).await?;
    tracing::info!(
        %addr,
        data_dir = %state.cfg.data_dir.display(),
        ttl_ms = %state.cfg.challenge_ttl_ms,
        "starting liveness verification daemon"
    );
    server::serve(listener, state).await?;
    Ok(())
}
