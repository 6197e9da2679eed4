// SPDX-License-Identifier: BUSL-1.1
// Copyright (c) 2026 Alfred Jean LLC

//! `managerd`: binds the TCP listener, wires up the three core components,
//! and runs until interrupted. Grounded on the teacher's daemon startup
//! shape (`oj-daemon::lifecycle::startup`) — config, then component
//! construction, then listener bind — with all WAL/snapshot/lock-file
//! persistence omitted (SPEC_FULL.md §6, "no persistence").

mod config;
mod connection;
mod snapshot;
mod socket;

use config::ManagerConfig;
use connection::{ConnectionServer, ManagerCtx};
use manager_core::SystemClock;
use manager_dispatcher::TaskDispatcher;
use manager_registry::WorkerRegistry;
use manager_stream::StreamProxy;
use snapshot::ManagerSnapshot;
use std::path::PathBuf;
use std::sync::Arc;
use std::time::{Duration, Instant};
use tokio::sync::Notify;
use tracing::{error, info};

const SNAPSHOT_INTERVAL: Duration = Duration::from_secs(60);

fn init_tracing() {
    use tracing_subscriber::{fmt, EnvFilter};

    let filter = EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("info"));
    fmt().with_env_filter(filter).with_target(true).init();
}

/// `--config <path>`, the only flag this binary accepts; everything else is
/// environment variables (see `config::ManagerConfig::load`).
fn parse_config_path() -> Option<PathBuf> {
    let mut args = std::env::args().skip(1);
    while let Some(arg) = args.next() {
        if arg == "--config" {
            return args.next().map(PathBuf::from);
        }
        if let Some(path) = arg.strip_prefix("--config=") {
            return Some(PathBuf::from(path));
        }
    }
    None
}

#[tokio::main]
async fn main() {
    init_tracing();

    let config_path = parse_config_path();
    let config = match ManagerConfig::load(config_path.as_deref()) {
        Ok(config) => config,
        Err(e) => {
            error!(error = %e, "failed to load configuration");
            std::process::exit(1);
        }
    };

    let clock = SystemClock;
    let registry = Arc::new(WorkerRegistry::new(clock.clone(), config.registry));
    let dispatcher = Arc::new(TaskDispatcher::new(clock.clone(), config.dispatch));
    let stream = Arc::new(StreamProxy::new(clock.clone(), config.stream));

    let ctx = Arc::new(ManagerCtx {
        registry: Arc::clone(&registry),
        dispatcher: Arc::clone(&dispatcher),
        stream: Arc::clone(&stream),
        clock,
        auth_token: config.server.auth_token.clone(),
        manager_id: uuid::Uuid::new_v4().to_string(),
        start_time: Instant::now(),
    });

    let server = match ConnectionServer::bind(&config.server.host, config.server.port, Arc::clone(&ctx)).await {
        Ok(server) => server,
        Err(e) => {
            error!(error = %e, "failed to bind listener");
            std::process::exit(1);
        }
    };
    let addr = server.local_addr().expect("bound listener has a local address");
    info!(%addr, manager_id = %ctx.manager_id, "manager listening");

    let shutdown = Arc::new(Notify::new());

    let health_check_shutdown = Arc::clone(&shutdown);
    let health_check_registry = Arc::clone(&registry);
    tokio::spawn(async move {
        health_check_registry.run_health_check_loop(health_check_shutdown).await;
    });

    let snapshot_shutdown = Arc::clone(&shutdown);
    let snapshot_ctx = Arc::clone(&ctx);
    tokio::spawn(async move {
        run_snapshot_loop(snapshot_ctx, snapshot_shutdown).await;
    });

    let server_shutdown = Arc::clone(&shutdown);
    let accept_loop = tokio::spawn(async move {
        server.run(server_shutdown).await;
    });

    if let Err(e) = tokio::signal::ctrl_c().await {
        error!(error = %e, "failed to listen for shutdown signal");
    }
    info!("shutdown requested");
    shutdown.notify_waiters();
    let _ = accept_loop.await;
}

async fn run_snapshot_loop(ctx: Arc<ManagerCtx>, shutdown: Arc<Notify>) {
    let mut ticker = tokio::time::interval(SNAPSHOT_INTERVAL);
    loop {
        tokio::select! {
            _ = ticker.tick() => {
                let snapshot = ManagerSnapshot::capture(&ctx.registry, &ctx.dispatcher, &ctx.stream, ctx.start_time);
                info!(?snapshot, "manager snapshot");
            }
            _ = shutdown.notified() => break,
        }
    }
}
