//! Worker-pool engine: binds the shared socket and runs the contexts.
//!
//! All contexts run as tasks on one current-thread runtime, so the pool has
//! exactly one dispatch thread. Stopping raises the shutdown signal and
//! abandons whatever is in flight; nothing is drained.

use crate::error::EngineError;
use crate::pool::worker::WorkerContext;
use std::net::SocketAddr;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::{Arc, Mutex};
use std::thread::{self, JoinHandle};
use std::time::Duration;
use tokio::net::UdpSocket;
use tokio::sync::watch;
use tokio::task::JoinSet;
use tracing::{debug, error, info};

struct RunningPool {
    shutdown: watch::Sender<bool>,
    thread: JoinHandle<()>,
}

/// Fixed-size worker pool serving framed request/reply over a shared socket.
pub struct PoolEngine {
    listen: String,
    pool_size: usize,
    work_delay: Duration,
    inner: Mutex<Option<RunningPool>>,
    stopped: AtomicBool,
}

impl PoolEngine {
    pub fn new(listen: impl Into<String>, pool_size: usize, work_delay: Duration) -> Self {
        Self {
            listen: listen.into(),
            // A pool needs at least one slot to make progress.
            pool_size: pool_size.max(1),
            work_delay,
            inner: Mutex::new(None),
            stopped: AtomicBool::new(false),
        }
    }

    /// Bind the socket and start the pool. Returns the bound address.
    pub fn start(&self) -> Result<SocketAddr, EngineError> {
        let mut inner = self.locked();
        if inner.is_some() || self.stopped.load(Ordering::Acquire) {
            return Err(EngineError::AlreadyStarted);
        }

        let socket = std::net::UdpSocket::bind(&self.listen).map_err(EngineError::Bind)?;
        socket.set_nonblocking(true).map_err(EngineError::Bind)?;
        let local_addr = socket.local_addr().map_err(EngineError::Bind)?;

        let (shutdown_tx, shutdown_rx) = watch::channel(false);
        let pool_size = self.pool_size;
        let work_delay = self.work_delay;

        let thread = thread::Builder::new()
            .name("pool-engine".to_string())
            .spawn(move || run_pool(socket, pool_size, work_delay, shutdown_rx))
            .map_err(EngineError::Spawn)?;

        *inner = Some(RunningPool {
            shutdown: shutdown_tx,
            thread,
        });

        info!(addr = %local_addr, workers = pool_size, "pool engine started");
        Ok(local_addr)
    }

    /// Stop the pool. Idempotent: the second call logs and returns.
    pub fn stop(&self) {
        if self.stopped.swap(true, Ordering::AcqRel) {
            info!("already stopped, skip");
            return;
        }

        let running = self.locked().take();
        let Some(running) = running else {
            return;
        };

        info!("stopping pool engine");
        let _ = running.shutdown.send(true);
        let _ = running.thread.join();
        info!("pool engine stopped");
    }

    fn locked(&self) -> std::sync::MutexGuard<'_, Option<RunningPool>> {
        self.inner.lock().unwrap_or_else(|e| e.into_inner())
    }
}

impl Drop for PoolEngine {
    fn drop(&mut self) {
        self.stop();
    }
}

/// Body of the pool thread: one current-thread runtime driving all contexts.
fn run_pool(
    socket: std::net::UdpSocket,
    pool_size: usize,
    work_delay: Duration,
    shutdown: watch::Receiver<bool>,
) {
    let runtime = match tokio::runtime::Builder::new_current_thread()
        .enable_all()
        .build()
    {
        Ok(runtime) => runtime,
        Err(e) => {
            error!(error = %e, "failed to build pool runtime");
            return;
        }
    };

    runtime.block_on(async move {
        let socket = match UdpSocket::from_std(socket) {
            Ok(socket) => Arc::new(socket),
            Err(e) => {
                error!(error = %e, "failed to register pool socket");
                return;
            }
        };

        let mut contexts = JoinSet::new();
        for id in 0..pool_size {
            let ctx =
                WorkerContext::new(id, Arc::clone(&socket), work_delay, shutdown.clone());
            contexts.spawn(ctx.run());
        }

        while let Some(joined) = contexts.join_next().await {
            match joined {
                Ok(Ok(())) => {}
                Ok(Err(e)) => {
                    // Transport corruption on one context takes the whole
                    // pool down; remaining contexts are abandoned.
                    error!(error = %e, "worker failed, shutting pool down");
                    break;
                }
                Err(e) => {
                    error!(error = %e, "worker task panicked");
                    break;
                }
            }
        }
    });

    debug!("pool runtime exited");
}
