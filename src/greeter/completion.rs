//! Completion queue: the synchronization primitive the dispatch loop blocks on.
//!
//! Every asynchronous operation resolves as a `(Tag, ok)` pair posted here.
//! `ok=false` means failure or shutdown and must not continue normal
//! progression. Shutting the queue down is the sole cancellation primitive:
//! it wakes a blocked `next` within one wait cycle.

use std::fmt;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::mpsc;
use std::sync::Arc;

/// Opaque identity correlating a pending asynchronous operation with the
/// handler that issued it. The value is the handler's registry key.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub struct Tag(pub(crate) usize);

impl fmt::Display for Tag {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.0)
    }
}

enum Event {
    Ready(Tag, bool),
    Shutdown,
}

/// Consumer side of the completion queue. Owned by the dispatch thread.
pub struct CompletionQueue {
    rx: mpsc::Receiver<Event>,
}

/// Producer side of the completion queue. Cheap to clone; held by the
/// transport, the execution bridge jobs, and the engine's stop path.
#[derive(Clone)]
pub struct CompletionPoster {
    tx: mpsc::Sender<Event>,
    down: Arc<AtomicBool>,
}

/// Create a connected queue/poster pair.
pub fn pair() -> (CompletionQueue, CompletionPoster) {
    let (tx, rx) = mpsc::channel();
    (
        CompletionQueue { rx },
        CompletionPoster {
            tx,
            down: Arc::new(AtomicBool::new(false)),
        },
    )
}

impl CompletionQueue {
    /// Block until the next completion event.
    ///
    /// Returns `None` once the queue has been shut down and all events posted
    /// before the shutdown have been drained.
    pub fn next(&self) -> Option<(Tag, bool)> {
        match self.rx.recv() {
            Ok(Event::Ready(tag, ok)) => Some((tag, ok)),
            Ok(Event::Shutdown) | Err(mpsc::RecvError) => None,
        }
    }
}

impl CompletionPoster {
    /// Post a completion event. Events posted after shutdown are dropped.
    pub fn post(&self, tag: Tag, ok: bool) {
        if self.down.load(Ordering::Acquire) {
            return;
        }
        let _ = self.tx.send(Event::Ready(tag, ok));
    }

    /// Shut the queue down. Idempotent: the second call is a no-op.
    ///
    /// Events already queued are still delivered before `next` returns `None`.
    pub fn shutdown(&self) {
        if self.down.swap(true, Ordering::AcqRel) {
            return;
        }
        let _ = self.tx.send(Event::Shutdown);
    }
}
