//! greeterd: an asynchronous greeter RPC engine
//!
//! Two request-dispatch cores run side by side:
//! - Completion-queue engine: one dispatch thread routes completion events
//!   to per-request call handlers; a fresh listener is armed for every
//!   consumed accept, so capacity is bounded only by memory.
//! - Worker-pool engine: a fixed set of reusable contexts cycle through
//!   receive/wait/send against a shared UDP socket.
//!
//! Configuration comes from CLI arguments or a TOML file; shutdown is
//! signal-driven.

mod config;
mod error;
mod greeter;
mod pool;
mod timer;

use config::Config;
use greeter::GreeterEngine;
use pool::PoolEngine;
use tracing::{info, warn};
use tracing_subscriber::EnvFilter;

fn main() -> Result<(), Box<dyn std::error::Error>> {
    // Load configuration
    let config = Config::load()?;

    // Initialize logging
    let filter =
        EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new(&config.log_level));

    tracing_subscriber::fmt()
        .with_env_filter(filter)
        .with_target(false)
        .init();

    info!(
        listen = %config.listen,
        pool_size = config.pool_size,
        work_delay_ms = config.work_delay_ms,
        stats_interval = config.stats_interval,
        "Starting greeterd"
    );

    let greeter = GreeterEngine::new(config.stats_interval());
    greeter.start()?;

    // Startup self-check: one round trip through the dispatch core.
    if let Some(client) = greeter.client() {
        match client.say_hello("greeterd") {
            Ok(reply) => info!(
                reply,
                armed_listeners = greeter.stats().armed_listeners,
                "Greeter self-check passed"
            ),
            Err(e) => warn!(error = %e, "Greeter self-check failed"),
        }
    }

    let pool = PoolEngine::new(config.listen.clone(), config.pool_size, config.work_delay());
    pool.start()?;

    wait_for_termination()?;

    info!("Termination request received, stopping");
    pool.stop();
    greeter.stop();

    Ok(())
}

/// Block until SIGINT/ctrl-c.
fn wait_for_termination() -> Result<(), std::io::Error> {
    let runtime = tokio::runtime::Builder::new_current_thread()
        .enable_all()
        .build()?;
    runtime.block_on(tokio::signal::ctrl_c())
}
