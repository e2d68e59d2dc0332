//! Execution bridge: the single-threaded application loop.
//!
//! Application callbacks never run on the dispatch thread. They are handed
//! across an explicit work channel to one dedicated thread, so business
//! logic stays serialized with other engine activity (stats ticks) even
//! though it is triggered from I/O completions. Payload ownership moves
//! through the channel; completed replies come back through the mailbox.

use crate::greeter::completion::Tag;
use std::collections::HashMap;
use std::io;
use std::sync::mpsc;
use std::sync::{Arc, Mutex};
use std::thread::{self, JoinHandle};
use tracing::{debug, trace};

/// Unit of work run on the application loop.
pub type Job = Box<dyn FnOnce() + Send + 'static>;

/// Mailbox of computed replies, keyed by the handler tag. The bridge
/// deposits; the dispatcher takes.
#[derive(Clone, Default)]
pub struct ReplyMailbox {
    replies: Arc<Mutex<HashMap<Tag, String>>>,
}

impl ReplyMailbox {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn deposit(&self, tag: Tag, reply: String) {
        self.locked().insert(tag, reply);
    }

    pub fn take(&self, tag: Tag) -> Option<String> {
        self.locked().remove(&tag)
    }

    fn locked(&self) -> std::sync::MutexGuard<'_, HashMap<Tag, String>> {
        self.replies.lock().unwrap_or_else(|e| e.into_inner())
    }
}

/// Handle to the application loop thread.
pub struct ExecutionBridge {
    tx: Mutex<Option<mpsc::Sender<Job>>>,
    thread: Mutex<Option<JoinHandle<()>>>,
}

impl ExecutionBridge {
    /// Spawn the application loop thread.
    pub fn start() -> io::Result<Arc<Self>> {
        let (tx, rx) = mpsc::channel::<Job>();

        let thread = thread::Builder::new()
            .name("app-loop".to_string())
            .spawn(move || {
                debug!("application loop started");
                while let Ok(job) = rx.recv() {
                    trace!("running job");
                    job();
                }
                debug!("application loop exited");
            })?;

        Ok(Arc::new(Self {
            tx: Mutex::new(Some(tx)),
            thread: Mutex::new(Some(thread)),
        }))
    }

    /// Submit a job to run on the application loop.
    ///
    /// Returns `false` if the bridge has already shut down; the job is
    /// dropped in that case.
    pub fn submit(&self, job: Job) -> bool {
        let guard = self.tx.lock().unwrap_or_else(|e| e.into_inner());
        match guard.as_ref() {
            Some(tx) => tx.send(job).is_ok(),
            None => false,
        }
    }

    /// Shut down the loop: queued jobs finish, then the thread exits and is
    /// joined. Calling twice is a no-op.
    pub fn shutdown(&self) {
        let tx = self
            .tx
            .lock()
            .unwrap_or_else(|e| e.into_inner())
            .take();
        drop(tx);

        let handle = self
            .thread
            .lock()
            .unwrap_or_else(|e| e.into_inner())
            .take();
        if let Some(handle) = handle {
            let _ = handle.join();
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::sync::atomic::{AtomicUsize, Ordering};
    use std::thread::ThreadId;

    #[test]
    fn test_jobs_run_serialized_on_one_thread() {
        let bridge = ExecutionBridge::start().unwrap();
        let seen: Arc<Mutex<Vec<ThreadId>>> = Arc::new(Mutex::new(Vec::new()));

        for _ in 0..16 {
            let seen = Arc::clone(&seen);
            assert!(bridge.submit(Box::new(move || {
                seen.lock().unwrap().push(thread::current().id());
            })));
        }

        bridge.shutdown();

        let seen = seen.lock().unwrap();
        assert_eq!(seen.len(), 16);
        assert!(seen.iter().all(|id| *id == seen[0]));
        assert_ne!(seen[0], thread::current().id());
    }

    #[test]
    fn test_shutdown_drains_queued_jobs() {
        let bridge = ExecutionBridge::start().unwrap();
        let count = Arc::new(AtomicUsize::new(0));

        for _ in 0..8 {
            let count = Arc::clone(&count);
            bridge.submit(Box::new(move || {
                count.fetch_add(1, Ordering::Relaxed);
            }));
        }

        bridge.shutdown();
        assert_eq!(count.load(Ordering::Relaxed), 8);
    }

    #[test]
    fn test_submit_after_shutdown_is_rejected() {
        let bridge = ExecutionBridge::start().unwrap();
        bridge.shutdown();
        bridge.shutdown(); // idempotent

        assert!(!bridge.submit(Box::new(|| {})));
    }

    #[test]
    fn test_mailbox_take_is_single_shot() {
        let mailbox = ReplyMailbox::new();
        mailbox.deposit(Tag(3), "Hello".to_string());

        assert_eq!(mailbox.take(Tag(3)), Some("Hello".to_string()));
        assert_eq!(mailbox.take(Tag(3)), None);
    }
}
