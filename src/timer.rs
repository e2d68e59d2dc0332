//! Repeating timer on a dedicated thread.
//!
//! Fires a callback at a fixed interval until stopped. The engine uses it to
//! submit periodic stats ticks to the execution bridge, so stats publishing
//! runs serialized with request callbacks.

use std::io;
use std::sync::mpsc;
use std::sync::Mutex;
use std::thread::{self, JoinHandle};
use std::time::Duration;
use tracing::debug;

/// Repeating timer firing `tick` every `interval` until stopped.
pub struct RepeatingTimer {
    stop_tx: Mutex<Option<mpsc::Sender<()>>>,
    thread: Mutex<Option<JoinHandle<()>>>,
}

impl RepeatingTimer {
    /// Spawn the timer thread and start ticking.
    pub fn start<F>(name: &str, interval: Duration, tick: F) -> io::Result<Self>
    where
        F: Fn() + Send + 'static,
    {
        let (stop_tx, stop_rx) = mpsc::channel::<()>();

        let thread = thread::Builder::new()
            .name(format!("timer-{name}"))
            .spawn(move || loop {
                match stop_rx.recv_timeout(interval) {
                    Err(mpsc::RecvTimeoutError::Timeout) => tick(),
                    Ok(()) | Err(mpsc::RecvTimeoutError::Disconnected) => {
                        debug!("timer stopping");
                        return;
                    }
                }
            })?;

        Ok(Self {
            stop_tx: Mutex::new(Some(stop_tx)),
            thread: Mutex::new(Some(thread)),
        })
    }

    /// Stop the timer and join its thread. Calling twice is a no-op.
    pub fn stop(&self) {
        let tx = self.stop_tx.lock().ok().and_then(|mut guard| guard.take());
        if let Some(tx) = tx {
            let _ = tx.send(());
        }

        let handle = self.thread.lock().ok().and_then(|mut guard| guard.take());
        if let Some(handle) = handle {
            let _ = handle.join();
        }
    }
}

impl Drop for RepeatingTimer {
    fn drop(&mut self) {
        self.stop();
    }
}
