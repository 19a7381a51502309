//! Event relay binary.
//!
//! # Usage
//!
//! ```bash
//! RELAY_COLLECTOR_URL=https://collector.internal/events event-relay
//!
//! # With logging
//! RUST_LOG=event_relay=debug event-relay --collector-url http://localhost:9000/
//! ```

use std::net::SocketAddr;
use std::time::Duration;

use anyhow::Context;
use clap::{Parser, ValueEnum};
use event_relay::{Collector, DispatcherConfig, RelayConfig};
use tracing::info;

#[derive(Debug, Clone, Copy, ValueEnum)]
enum LogFormat {
    Text,
    Json,
}

#[derive(Debug, Parser)]
#[command(name = "event-relay", version, about = "Reshape analytics events and forward them to a collector")]
struct Args {
    /// Address the ingress endpoint binds to.
    #[arg(long, env = "RELAY_LISTEN_ADDR", default_value = "0.0.0.0:8080")]
    listen_addr: SocketAddr,

    /// Collector URL canonical events are POSTed to.
    #[arg(long, env = "RELAY_COLLECTOR_URL")]
    collector_url: String,

    /// Delivery workers (maximum concurrent deliveries). Defaults to available parallelism.
    #[arg(long, env = "RELAY_WORKERS")]
    workers: Option<usize>,

    /// Events that may wait for a worker before ingress answers 503.
    #[arg(long, env = "RELAY_QUEUE_CAPACITY", default_value_t = 1_000)]
    queue_capacity: usize,

    /// Per-attempt delivery timeout in milliseconds.
    #[arg(long, env = "RELAY_DELIVERY_TIMEOUT_MS", default_value_t = 5_000)]
    delivery_timeout_ms: u64,

    /// Retries after a failed delivery before the event is dead-lettered.
    #[arg(long, env = "RELAY_MAX_RETRIES", default_value_t = 0)]
    max_retries: u32,

    /// Largest accepted request body in bytes.
    #[arg(long, env = "RELAY_MAX_BODY_BYTES", default_value_t = event_relay::DEFAULT_MAX_BODY_BYTES)]
    max_body_bytes: usize,

    #[arg(long, env = "RELAY_LOG_FORMAT", value_enum, default_value_t = LogFormat::Text)]
    log_format: LogFormat,
}

impl Args {
    fn into_config(self) -> RelayConfig {
        let collector = Collector::new(self.collector_url)
            .with_timeout(Duration::from_millis(self.delivery_timeout_ms))
            .with_max_retries(self.max_retries);

        let defaults = DispatcherConfig::default();
        let dispatcher = DispatcherConfig {
            worker_count: self.workers.unwrap_or(defaults.worker_count),
            queue_capacity: self.queue_capacity,
            ..defaults
        };

        RelayConfig::new(self.listen_addr, collector)
            .with_dispatcher(dispatcher)
            .with_max_body_bytes(self.max_body_bytes)
    }
}

fn init_tracing(format: LogFormat) {
    let filter = tracing_subscriber::EnvFilter::try_from_default_env()
        .unwrap_or_else(|_| tracing_subscriber::EnvFilter::new("info"));

    let builder = tracing_subscriber::fmt().with_env_filter(filter);
    match format {
        LogFormat::Text => builder.init(),
        LogFormat::Json => builder.json().init(),
    }
}

async fn shutdown_signal() {
    if let Err(err) = tokio::signal::ctrl_c().await {
        tracing::error!(error = %err, "failed to listen for shutdown signal");
        std::future::pending::<()>().await;
    }
    info!("shutdown signal received");
}

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    let args = Args::parse();
    init_tracing(args.log_format);

    let config = args.into_config();
    config.validate().context("invalid configuration")?;

    info!(
        version = env!("CARGO_PKG_VERSION"),
        listen_addr = %config.listen_addr,
        collector = %config.collector.url,
        workers = config.dispatcher.worker_count,
        queue_capacity = config.dispatcher.queue_capacity,
        "event relay starting"
    );

    event_relay::run(config, shutdown_signal())
        .await
        .context("relay terminated with an error")?;

    info!("event relay stopped");
    Ok(())
}
