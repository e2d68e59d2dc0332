//! Greeter engine lifecycle: wires queue, transport, bridge, and dispatcher
//! together and owns the business logic.
//!
//! `start` is non-blocking: the dispatch loop runs on its own thread until
//! `stop` shuts the completion source down. Stop ordering matters: the
//! transport closes before the queue, so the loop never dispatches into a
//! torn-down transport.

use crate::error::EngineError;
use crate::greeter::bridge::ExecutionBridge;
use crate::greeter::completion::{self, CompletionPoster};
use crate::greeter::dispatcher::{Dispatcher, RequestCallback};
use crate::greeter::transport::{self, GreeterClient, ServerTransport};
use crate::timer::RepeatingTimer;
use std::sync::atomic::{AtomicBool, AtomicUsize, Ordering};
use std::sync::{Arc, Mutex};
use std::thread::{self, JoinHandle};
use std::time::Duration;
use tracing::info;

/// Compute the reply for a `SayHello` request.
pub fn say_hello(name: &str) -> String {
    format!("Hello {name}")
}

/// Engine counters, updated by the dispatch thread and read from anywhere.
#[derive(Default)]
pub struct EngineStats {
    armed: AtomicUsize,
    in_flight: AtomicUsize,
    completed: AtomicUsize,
    failed: AtomicUsize,
}

/// Point-in-time view of the engine counters.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct StatsSnapshot {
    pub armed_listeners: usize,
    pub in_flight: usize,
    pub completed: usize,
    pub failed: usize,
}

impl EngineStats {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn listener_armed(&self) {
        self.armed.fetch_add(1, Ordering::Relaxed);
    }

    pub fn listener_disarmed(&self) {
        self.armed.fetch_sub(1, Ordering::Relaxed);
    }

    pub fn request_arrived(&self) {
        self.armed.fetch_sub(1, Ordering::Relaxed);
        self.in_flight.fetch_add(1, Ordering::Relaxed);
    }

    pub fn request_finished(&self) {
        self.in_flight.fetch_sub(1, Ordering::Relaxed);
        self.completed.fetch_add(1, Ordering::Relaxed);
    }

    pub fn request_failed(&self) {
        self.in_flight.fetch_sub(1, Ordering::Relaxed);
        self.failed.fetch_add(1, Ordering::Relaxed);
    }

    pub fn snapshot(&self) -> StatsSnapshot {
        StatsSnapshot {
            armed_listeners: self.armed.load(Ordering::Relaxed),
            in_flight: self.in_flight.load(Ordering::Relaxed),
            completed: self.completed.load(Ordering::Relaxed),
            failed: self.failed.load(Ordering::Relaxed),
        }
    }
}

struct Running {
    client: GreeterClient,
    transport: ServerTransport,
    bridge: Arc<ExecutionBridge>,
    poster: CompletionPoster,
    dispatcher: JoinHandle<()>,
    timer: RepeatingTimer,
}

/// The completion-queue greeter engine.
pub struct GreeterEngine {
    stats_interval: Duration,
    stats: Arc<EngineStats>,
    inner: Mutex<Option<Running>>,
    stopped: AtomicBool,
}

impl GreeterEngine {
    pub fn new(stats_interval: Duration) -> Self {
        Self {
            stats_interval,
            stats: Arc::new(EngineStats::new()),
            inner: Mutex::new(None),
            stopped: AtomicBool::new(false),
        }
    }

    /// Start the engine. Non-blocking: dispatching begins on a dedicated
    /// thread, with one listener armed before this returns.
    pub fn start(&self) -> Result<(), EngineError> {
        let mut inner = self.locked();
        if inner.is_some() || self.stopped.load(Ordering::Acquire) {
            return Err(EngineError::AlreadyStarted);
        }

        let (queue, poster) = completion::pair();
        let (server, client) = transport::channel(poster.clone());
        let bridge = ExecutionBridge::start().map_err(EngineError::Spawn)?;

        let callback: RequestCallback = Arc::new(say_hello);
        let dispatcher = Dispatcher::new(
            queue,
            poster.clone(),
            server.clone(),
            Arc::clone(&bridge),
            callback,
            Arc::clone(&self.stats),
        );

        let dispatch_thread = thread::Builder::new()
            .name("greeter-dispatch".to_string())
            .spawn(move || dispatcher.run())
            .map_err(EngineError::Spawn)?;

        // Stats ticks go through the bridge so they serialize with request
        // callbacks on the application loop.
        let timer = {
            let bridge = Arc::clone(&bridge);
            let stats = Arc::clone(&self.stats);
            RepeatingTimer::start("stats", self.stats_interval, move || {
                let stats = Arc::clone(&stats);
                bridge.submit(Box::new(move || {
                    let s = stats.snapshot();
                    info!(
                        armed_listeners = s.armed_listeners,
                        in_flight = s.in_flight,
                        completed = s.completed,
                        failed = s.failed,
                        "publishing periodic stats"
                    );
                }));
            })
            .map_err(EngineError::Spawn)?
        };

        *inner = Some(Running {
            client,
            transport: server,
            bridge,
            poster,
            dispatcher: dispatch_thread,
            timer,
        });

        info!("greeter engine started");
        Ok(())
    }

    /// Client handle for the running engine, if any.
    pub fn client(&self) -> Option<GreeterClient> {
        self.locked().as_ref().map(|r| r.client.clone())
    }

    /// Current engine counters.
    pub fn stats(&self) -> StatsSnapshot {
        self.stats.snapshot()
    }

    /// Stop the engine. Idempotent: the second call logs and returns.
    ///
    /// Order: transport first (no new work, pending accepts flushed with
    /// `ok=false`), then the bridge (queued callbacks drain and post their
    /// completions), then the completion source; finally the dispatch
    /// thread is joined. Handlers still registered at that point are
    /// abandoned, not drained.
    pub fn stop(&self) {
        if self.stopped.swap(true, Ordering::AcqRel) {
            info!("already stopped, skip");
            return;
        }

        let running = self.locked().take();
        let Some(running) = running else {
            return;
        };

        info!("stopping greeter engine");
        running.timer.stop();
        running.transport.close();
        running.bridge.shutdown();
        running.poster.shutdown();
        let _ = running.dispatcher.join();
        info!("greeter engine stopped");
    }

    fn locked(&self) -> std::sync::MutexGuard<'_, Option<Running>> {
        self.inner.lock().unwrap_or_else(|e| e.into_inner())
    }
}

impl Drop for GreeterEngine {
    fn drop(&mut self) {
        self.stop();
    }
}
