//! Seckill command line
//!
//! ```text
//! seckill check-config --config seckill.toml
//! seckill simulate --users 1000 --stock 100 --backend memory
//! seckill simulate --users 200 --stock 10 --backend redis --repeat 2
//! ```

use clap::{Parser, Subcommand, ValueEnum};
use seckill_core::config::Config;
use seckill_core::engine::{InMemoryLedger, InMemorySharedStore, SharedStore};
use seckill_core::keys;
use seckill_core::redis::util::sanitize_url;
use seckill_core::redis::RedisSharedStore;
use seckill_core::types::SeckillVoucher;
use seckill_core::SeckillPipeline;

use chrono::{Duration as ChronoDuration, Utc};
use std::collections::BTreeMap;
use std::path::PathBuf;
use std::sync::Arc;
use std::time::Instant;
use tracing::info;
use tracing_subscriber::EnvFilter;

// =============================================================================
// CLI Definition
// =============================================================================

/// Flash-sale ordering core
#[derive(Parser)]
#[command(name = "seckill")]
#[command(version)]
#[command(about = "Flash-sale admission and order pipeline", long_about = None)]
struct Cli {
    #[command(subcommand)]
    command: Commands,

    /// Path to configuration file
    #[arg(short, long, global = true, env = "SECKILL_CONFIG")]
    config: Option<PathBuf>,
}

#[derive(Subcommand)]
enum Commands {
    /// Validate configuration and print a summary
    CheckConfig,

    /// Drive concurrent buyers against one voucher and print the outcome
    Simulate {
        /// Number of distinct users
        #[arg(short, long, default_value_t = 1000)]
        users: u64,

        /// Voucher stock
        #[arg(short, long, default_value_t = 100)]
        stock: u32,

        /// Voucher id
        #[arg(long, default_value_t = 1)]
        voucher: u64,

        /// Attempts per user
        #[arg(long, default_value_t = 1)]
        repeat: u32,

        /// Shared store backend
        #[arg(short, long, value_enum, default_value_t = Backend::Memory)]
        backend: Backend,

        /// Print Prometheus metrics after the run
        #[arg(long)]
        metrics: bool,
    },
}

#[derive(Clone, Copy, ValueEnum)]
enum Backend {
    /// In-process store, no external services
    Memory,
    /// Redis at `redis.url`
    Redis,
}

// =============================================================================
// Command Handlers
// =============================================================================

fn load_config(cli: &Cli) -> Result<Config, Box<dyn std::error::Error>> {
    let config = match &cli.config {
        Some(path) => Config::from_file_with_env(path)?,
        None => Config::from_env(),
    };
    config.validate()?;
    Ok(config)
}

fn cmd_check_config(config: &Config) {
    println!("Configuration is valid!");
    println!();
    println!("Redis:");
    println!("  URL: {}", sanitize_url(&config.redis.url));
    println!("  Pool size: {}", config.redis.pool_size);
    println!("  Command timeout: {} ms", config.redis.command_timeout_ms);
    println!();
    println!("Seckill:");
    println!("  Queue capacity: {}", config.seckill.queue_capacity);
    println!("  Workers: {}", config.seckill.workers);
    println!("  Order lock TTL: {} s", config.lock.order_lock_ttl_secs);
    println!();
    println!("Cache (rebuild pool {}):", config.cache.rebuild_pool_size);
    for ns in &config.cache.namespaces {
        println!("  {:<12} {}", ns.name, ns.strategy);
    }
    println!();
    println!("Monitoring:");
    println!("  Metrics enabled: {}", config.monitoring.metrics_enabled);
    println!("  Log level: {}", config.monitoring.log_level);
}

#[allow(clippy::too_many_arguments)]
async fn cmd_simulate(
    config: &Config,
    users: u64,
    stock: u32,
    voucher_id: u64,
    repeat: u32,
    backend: Backend,
    print_metrics: bool,
) -> Result<(), Box<dyn std::error::Error>> {
    let store: Arc<dyn SharedStore> = match backend {
        Backend::Memory => Arc::new(InMemorySharedStore::new()),
        Backend::Redis => {
            Arc::new(RedisSharedStore::connect(config.redis.to_redis_config()).await?)
        },
    };
    let ledger = Arc::new(InMemoryLedger::new().with_voucher(voucher_id, stock));

    let pipeline = SeckillPipeline::builder(store.clone(), ledger.clone())
        .config(config)
        .start()?;

    let now = Utc::now();
    let voucher = SeckillVoucher::new(
        voucher_id,
        stock,
        now - ChronoDuration::seconds(1),
        now + ChronoDuration::hours(1),
    );
    // Start from an empty purchase set so reruns against Redis are comparable
    store.delete(&keys::seckill_orders(voucher_id)).await?;
    pipeline.publish_voucher(&voucher).await?;
    info!(users, stock, repeat, store = store.store_id(), "Starting simulation");

    let pipeline = Arc::new(pipeline);
    let started = Instant::now();
    let attempts = (0..users).flat_map(|user| (0..repeat).map(move |_| user));
    let tasks: Vec<_> = attempts
        .map(|user| {
            let pipeline = pipeline.clone();
            tokio::spawn(async move { pipeline.admit(user, voucher_id).await })
        })
        .collect();

    let mut outcomes: BTreeMap<&'static str, u64> = BTreeMap::new();
    for result in futures::future::join_all(tasks).await {
        let code = match result? {
            Ok(_) => "ELIGIBLE",
            Err(e) => e.code(),
        };
        *outcomes.entry(code).or_default() += 1;
    }
    let admit_elapsed = started.elapsed();

    let unfinished = pipeline.shutdown().await;
    let remaining = pipeline.admission().remaining_stock(voucher_id).await?;

    println!("Simulation finished in {:.2?}", admit_elapsed);
    println!();
    println!("Admission outcomes:");
    for (code, count) in &outcomes {
        println!("  {:<16} {}", code, count);
    }
    println!();
    println!("Ledger:");
    println!("  Orders persisted: {}", ledger.order_count());
    println!("  Ledger stock: {}", ledger.stock(voucher_id).unwrap_or(0));
    println!("  Store stock: {}", remaining.unwrap_or(0));
    if unfinished > 0 {
        println!("  Workers still running at timeout: {}", unfinished);
    }

    if print_metrics {
        println!();
        print!("{}", pipeline.metrics().gather()?);
    }
    Ok(())
}

// =============================================================================
// Entry Point
// =============================================================================

#[tokio::main]
async fn main() -> Result<(), Box<dyn std::error::Error>> {
    let cli = Cli::parse();
    let config = load_config(&cli)?;

    let filter = EnvFilter::try_from_default_env()
        .or_else(|_| EnvFilter::try_new(&config.monitoring.log_level))?;
    tracing_subscriber::fmt().with_env_filter(filter).init();

    match cli.command {
        Commands::CheckConfig => cmd_check_config(&config),
        Commands::Simulate {
            users,
            stock,
            voucher,
            repeat,
            backend,
            metrics,
        } => {
            cmd_simulate(&config, users, stock, voucher, repeat, backend, metrics).await?;
        },
    }

    Ok(())
}
