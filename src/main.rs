//! Time-series sample router
//!
//! # Architecture
//! - **core**: Lock-free queues, pools and pool-allocated samples
//! - **nodes**: Sample sources and sinks (signal generator, loopback)
//! - **hot_path**: Hook chain and the per-path thread
//! - **hooks**: Built-in and optional hook types
//! - **infrastructure**: Cold path (logging, metrics, config)
//!
//! Usage: `sigroute [config.toml]`. Without an argument the file named by
//! `CONFIG_PATH` is used.

use anyhow::Context;
use sigroute::hot_path::HookRegistry;
use sigroute::infrastructure::logging::init_logging;
use sigroute::nodes::NodeRegistry;
use sigroute::{Config, Engine};
use std::time::Duration;

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    let config = match std::env::args().nth(1) {
        Some(path) => Config::from_file(&path).with_context(|| format!("Failed to load {path}"))?,
        None => Config::load().context("Failed to load configuration")?,
    };

    let _guards = init_logging(&config.global.log_dir, &config.global.log_level)
        .context("Failed to initialize logging")?;

    let nodes = NodeRegistry::with_defaults();
    let hooks = HookRegistry::with_defaults();
    tracing::info!(target: "main", node_types = ?nodes.kinds(), "Starting sigroute");

    let mut engine = Engine::from_config(&config, &nodes, &hooks)?;
    engine.start()?;

    if config.global.stats > 0.0 {
        let mut interval = tokio::time::interval(Duration::from_secs_f64(config.global.stats));
        interval.tick().await;
        loop {
            tokio::select! {
                _ = interval.tick() => engine.periodic(),
                res = tokio::signal::ctrl_c() => {
                    res.context("Failed to listen for shutdown signal")?;
                    break;
                }
            }
        }
    } else {
        tokio::signal::ctrl_c()
            .await
            .context("Failed to listen for shutdown signal")?;
    }

    tracing::info!(target: "main", "Shutdown requested");
    engine.stop()?;

    for path in engine.paths() {
        tracing::info!(target: "main", path = %path.name(), stats = ?path.stats(), "Final path statistics");
    }

    Ok(())
}
