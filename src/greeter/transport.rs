//! In-process transport for the greeter method.
//!
//! Models the contract the dispatch core needs from an RPC framework:
//! arming a tag registers exactly one pending accept that fires once when a
//! client call matches it; the arrived request and its single-use responder
//! are parked in a mailbox until the dispatcher collects them with the
//! completed tag. The completion source is bound at construction and there
//! is a single method, `SayHello` (multi-method routing is out of scope).

use crate::error::CallError;
use crate::greeter::completion::{CompletionPoster, Tag};
use std::collections::{HashMap, VecDeque};
use std::sync::{mpsc, Arc, Mutex, MutexGuard};
use std::time::Duration;
use tracing::{debug, trace};

/// How long a caller waits for a reply before giving up.
const CALL_TIMEOUT: Duration = Duration::from_secs(5);

/// Single-use capability bound to one in-flight exchange.
///
/// Consumed by value: the reply (or failure) for an exchange can only be
/// delivered once.
pub struct Responder {
    tx: mpsc::Sender<Result<String, CallError>>,
}

impl Responder {
    /// Deliver the final outcome to the caller.
    pub fn send(self, outcome: Result<String, CallError>) {
        // The caller may have timed out and gone away; that is its problem.
        let _ = self.tx.send(outcome);
    }
}

/// Create a responder and the receiving end the caller blocks on.
pub(crate) fn responder_pair() -> (Responder, mpsc::Receiver<Result<String, CallError>>) {
    let (tx, rx) = mpsc::channel();
    (Responder { tx }, rx)
}

/// A request that has matched a pending accept, with the capability to
/// answer it.
pub struct ArrivedCall {
    pub request: String,
    pub responder: Responder,
}

struct Inner {
    open: bool,
    /// Armed accepts waiting for a call, oldest first.
    pending_accepts: VecDeque<Tag>,
    /// Calls that arrived before an accept was armed, oldest first.
    waiting_calls: VecDeque<ArrivedCall>,
    /// Mailbox of matched calls, collected by the dispatcher per tag.
    arrived: HashMap<Tag, ArrivedCall>,
    completions: CompletionPoster,
}

impl Inner {
    fn match_call(&mut self, tag: Tag, call: ArrivedCall) {
        trace!(%tag, "request matched pending accept");
        self.arrived.insert(tag, call);
        self.completions.post(tag, true);
    }
}

/// Server side of the transport, used by the dispatcher.
#[derive(Clone)]
pub struct ServerTransport {
    inner: Arc<Mutex<Inner>>,
}

/// Client handle for issuing calls against the transport.
#[derive(Clone)]
pub struct GreeterClient {
    inner: Arc<Mutex<Inner>>,
}

/// Create a connected transport, posting completions to `completions`.
pub fn channel(completions: CompletionPoster) -> (ServerTransport, GreeterClient) {
    let inner = Arc::new(Mutex::new(Inner {
        open: true,
        pending_accepts: VecDeque::new(),
        waiting_calls: VecDeque::new(),
        arrived: HashMap::new(),
        completions,
    }));

    (
        ServerTransport {
            inner: Arc::clone(&inner),
        },
        GreeterClient { inner },
    )
}

fn locked(inner: &Mutex<Inner>) -> MutexGuard<'_, Inner> {
    // A poisoned lock only means another thread panicked mid-update of the
    // queues; the data is still structurally sound.
    inner.lock().unwrap_or_else(|e| e.into_inner())
}

impl ServerTransport {
    /// Register interest in the next inbound request, identified by `tag`.
    ///
    /// Fires exactly once: either immediately against an already-waiting
    /// call, or when a matching call arrives later. On a closed transport
    /// the arm completes with `ok=false`.
    pub fn arm(&self, tag: Tag) {
        let mut inner = locked(&self.inner);

        if !inner.open {
            debug!(%tag, "arm on closed transport");
            inner.completions.post(tag, false);
            return;
        }

        match inner.waiting_calls.pop_front() {
            Some(call) => inner.match_call(tag, call),
            None => inner.pending_accepts.push_back(tag),
        }
    }

    /// Collect the matched call for a completed accept.
    pub fn take_arrived(&self, tag: Tag) -> Option<ArrivedCall> {
        locked(&self.inner).arrived.remove(&tag)
    }

    /// Stop accepting new work. Idempotent.
    ///
    /// Pending accepts complete with `ok=false`; waiting callers get a
    /// failure. Calls already collected by the dispatcher still finish.
    pub fn close(&self) {
        let mut inner = locked(&self.inner);
        if !inner.open {
            return;
        }
        inner.open = false;

        while let Some(tag) = inner.pending_accepts.pop_front() {
            inner.completions.post(tag, false);
        }
        while let Some(call) = inner.waiting_calls.pop_front() {
            call.responder.send(Err(CallError::EngineStopped));
        }
        debug!("transport closed");
    }
}

impl GreeterClient {
    /// Issue a `SayHello` call and block for its reply.
    ///
    /// Fails promptly (never hangs) when no engine is listening, when the
    /// engine stops mid-call, or when the reply deadline passes.
    pub fn say_hello(&self, name: &str) -> Result<String, CallError> {
        let (responder, rx) = responder_pair();

        {
            let mut inner = locked(&self.inner);
            if !inner.open {
                return Err(CallError::NoListener);
            }

            let call = ArrivedCall {
                request: name.to_string(),
                responder,
            };
            match inner.pending_accepts.pop_front() {
                Some(tag) => inner.match_call(tag, call),
                None => inner.waiting_calls.push_back(call),
            }
        }

        match rx.recv_timeout(CALL_TIMEOUT) {
            Ok(outcome) => outcome,
            Err(mpsc::RecvTimeoutError::Timeout) => Err(CallError::Timeout),
            Err(mpsc::RecvTimeoutError::Disconnected) => Err(CallError::EngineStopped),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::greeter::completion;
    use std::thread;
    use std::time::Duration;

    #[test]
    fn test_call_on_closed_transport_fails_fast() {
        let (_queue, poster) = completion::pair();
        let (server, client) = channel(poster);

        server.close();

        assert_eq!(client.say_hello("world"), Err(CallError::NoListener));
    }

    #[test]
    fn test_arm_then_call_matches() {
        let (queue, poster) = completion::pair();
        let (server, client) = channel(poster);

        server.arm(Tag(0));

        let caller = thread::spawn(move || client.say_hello("world"));

        let (tag, ok) = queue.next().unwrap();
        assert_eq!(tag, Tag(0));
        assert!(ok);

        let call = server.take_arrived(tag).unwrap();
        assert_eq!(call.request, "world");
        call.responder.send(Ok("Hello world".to_string()));

        assert_eq!(caller.join().unwrap(), Ok("Hello world".to_string()));
    }

    #[test]
    fn test_call_before_arm_waits_for_accept() {
        let (queue, poster) = completion::pair();
        let (server, client) = channel(poster);

        let caller = thread::spawn(move || client.say_hello("early"));
        thread::sleep(Duration::from_millis(20));

        server.arm(Tag(4));

        let (tag, ok) = queue.next().unwrap();
        assert_eq!(tag, Tag(4));
        assert!(ok);

        let call = server.take_arrived(tag).unwrap();
        assert_eq!(call.request, "early");
        call.responder.send(Ok("Hello early".to_string()));

        assert_eq!(caller.join().unwrap(), Ok("Hello early".to_string()));
    }

    #[test]
    fn test_close_flushes_pending_accepts_not_ok() {
        let (queue, poster) = completion::pair();
        let (server, _client) = channel(poster);

        server.arm(Tag(1));
        server.close();
        server.close(); // idempotent

        assert_eq!(queue.next(), Some((Tag(1), false)));
    }

    #[test]
    fn test_close_fails_waiting_callers() {
        let (_queue, poster) = completion::pair();
        let (server, client) = channel(poster);

        let caller = thread::spawn(move || client.say_hello("stranded"));
        thread::sleep(Duration::from_millis(20));

        server.close();

        assert_eq!(caller.join().unwrap(), Err(CallError::EngineStopped));
    }

    #[test]
    fn test_arm_on_closed_transport_completes_not_ok() {
        let (queue, poster) = completion::pair();
        let (server, _client) = channel(poster);

        server.close();
        server.arm(Tag(9));

        assert_eq!(queue.next(), Some((Tag(9), false)));
    }

    #[test]
    fn test_take_arrived_is_single_shot() {
        let (queue, poster) = completion::pair();
        let (server, client) = channel(poster);

        server.arm(Tag(0));
        let caller = thread::spawn(move || client.say_hello("once"));

        let (tag, _ok) = queue.next().unwrap();
        let call = server.take_arrived(tag).unwrap();
        assert!(server.take_arrived(tag).is_none());

        call.responder.send(Ok("Hello once".to_string()));
        assert_eq!(caller.join().unwrap(), Ok("Hello once".to_string()));
    }
}
