//! Dispatch loop routing completion events to call handlers.
//!
//! One thread blocks on the completion queue and advances the state machine
//! each `(tag, ok)` pair belongs to. Handler creation stays here: after a
//! completed accept is consumed, the dispatcher itself arms a fresh listener
//! so there is always capacity for the next request. Handlers are disposed
//! by removing them from the registry on their terminal transition, so a tag
//! can never advance a dead handler.

use crate::error::CallError;
use crate::greeter::bridge::{ExecutionBridge, ReplyMailbox};
use crate::greeter::completion::{CompletionPoster, CompletionQueue, Tag};
use crate::greeter::engine::EngineStats;
use crate::greeter::handler::{CallHandler, CallStatus};
use crate::greeter::registry::HandlerRegistry;
use crate::greeter::transport::{ArrivedCall, ServerTransport};
use std::sync::Arc;
use tracing::{debug, info, trace};

/// Application callback computing a reply from a request.
pub type RequestCallback = Arc<dyn Fn(&str) -> String + Send + Sync>;

pub(crate) struct Dispatcher {
    queue: CompletionQueue,
    poster: CompletionPoster,
    registry: HandlerRegistry,
    transport: ServerTransport,
    bridge: Arc<ExecutionBridge>,
    replies: ReplyMailbox,
    callback: RequestCallback,
    stats: Arc<EngineStats>,
}

impl Dispatcher {
    pub fn new(
        queue: CompletionQueue,
        poster: CompletionPoster,
        transport: ServerTransport,
        bridge: Arc<ExecutionBridge>,
        callback: RequestCallback,
        stats: Arc<EngineStats>,
    ) -> Self {
        Self {
            queue,
            poster,
            registry: HandlerRegistry::new(),
            transport,
            bridge,
            replies: ReplyMailbox::new(),
            callback,
            stats,
        }
    }

    /// Run the dispatch loop until the completion queue shuts down.
    pub fn run(mut self) {
        info!("dispatch loop started");
        self.arm_fresh_handler();

        while let Some((tag, ok)) = self.queue.next() {
            self.advance(tag, ok);
        }

        info!(
            abandoned = self.registry.len(),
            "dispatch loop exited"
        );
    }

    /// Create a handler in `Create` state and advance it so it arms itself.
    fn arm_fresh_handler(&mut self) {
        let tag = self.registry.insert(CallHandler::new());
        trace!(%tag, "arming fresh listener");
        self.advance(tag, true);
    }

    /// Route one completion event to its handler.
    fn advance(&mut self, tag: Tag, ok: bool) {
        let Some(status) = self.registry.get(tag).map(|h| h.status) else {
            debug!(%tag, "completion for disposed tag, dropping");
            return;
        };

        if !ok {
            self.dispose(tag);
            return;
        }

        match status {
            CallStatus::Create => {
                if let Some(handler) = self.registry.get_mut(tag) {
                    handler.arm();
                }
                self.stats.listener_armed();
                self.transport.arm(tag);
            }
            CallStatus::Process => {
                if let Some(reply) = self.replies.take(tag) {
                    self.finish(tag, reply);
                } else if let Some(call) = self.transport.take_arrived(tag) {
                    self.process(tag, call);
                } else {
                    // A completion with nothing to act on means the tag
                    // correlation is broken; continuing would corrupt state.
                    panic!("completion for tag {tag} with neither arrival nor reply");
                }
            }
            CallStatus::Finish => self.dispose(tag),
        }
    }

    /// A request arrived for an armed handler: keep listening, then hand the
    /// request to the application loop.
    fn process(&mut self, tag: Tag, call: ArrivedCall) {
        // Replacement listener goes up before any processing, so a new
        // request can always be accepted.
        self.arm_fresh_handler();

        self.stats.request_arrived();
        let ArrivedCall { request, responder } = call;
        trace!(%tag, request = %request, "processing request");

        if let Some(handler) = self.registry.get_mut(tag) {
            handler.start_processing(request.clone(), responder);
        }

        let callback = Arc::clone(&self.callback);
        let replies = self.replies.clone();
        let poster = self.poster.clone();
        let submitted = self.bridge.submit(Box::new(move || {
            let reply = callback(&request);
            replies.deposit(tag, reply);
            poster.post(tag, true);
        }));

        if !submitted {
            // Bridge already shut down (stop race); dispose on the next cycle.
            self.poster.post(tag, false);
        }
    }

    /// The application callback finished: enter `Finish`, answer the caller,
    /// and destroy the handler.
    fn finish(&mut self, tag: Tag, reply: String) {
        let Some(handler) = self.registry.remove(tag) else {
            return;
        };
        self.stats.request_finished();

        let (reply, responder) = handler.complete(reply);
        match responder {
            Some(responder) => {
                trace!(%tag, "finishing call");
                responder.send(Ok(reply));
            }
            None => panic!("finish for tag {tag} without responder"),
        }
    }

    /// Terminal non-advancing branch: release the handler exactly once.
    fn dispose(&mut self, tag: Tag) {
        let Some(mut handler) = self.registry.remove(tag) else {
            return;
        };
        debug!(%tag, status = ?handler.status, "disposing handler");

        if handler.is_armed() {
            self.stats.listener_disarmed();
        } else if handler.dispatched && handler.status != CallStatus::Finish {
            self.stats.request_failed();
        }

        // A caller stuck on this exchange gets a failure, not a hang.
        if let Some(responder) = handler.responder.take() {
            responder.send(Err(CallError::EngineStopped));
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::greeter::{completion, transport};
    use std::thread;

    fn test_dispatcher() -> (Dispatcher, transport::GreeterClient) {
        let (queue, poster) = completion::pair();
        let (server, client) = transport::channel(poster.clone());
        let bridge = ExecutionBridge::start().unwrap();
        let callback: RequestCallback = Arc::new(|name| format!("Hello {name}"));

        let dispatcher = Dispatcher::new(
            queue,
            poster,
            server,
            bridge,
            callback,
            Arc::new(EngineStats::new()),
        );
        (dispatcher, client)
    }

    #[test]
    fn test_stale_tag_is_dropped_not_advanced() {
        let (mut dispatcher, _client) = test_dispatcher();
        dispatcher.advance(Tag(99), true);
        dispatcher.advance(Tag(99), false);
        assert!(dispatcher.registry.is_empty());
    }

    #[test]
    fn test_not_ok_disposes_exactly_once() {
        let (mut dispatcher, _client) = test_dispatcher();
        dispatcher.arm_fresh_handler();
        assert_eq!(dispatcher.registry.len(), 1);
        assert_eq!(dispatcher.stats.snapshot().armed_listeners, 1);

        dispatcher.advance(Tag(0), false);
        assert!(dispatcher.registry.is_empty());
        assert_eq!(dispatcher.stats.snapshot().armed_listeners, 0);

        // Second completion for the same tag is a no-op.
        dispatcher.advance(Tag(0), false);
        assert!(dispatcher.registry.is_empty());
    }

    #[test]
    fn test_full_request_cycle_step_by_step() {
        let (mut dispatcher, client) = test_dispatcher();
        dispatcher.arm_fresh_handler();

        let caller = thread::spawn(move || client.say_hello("world 3"));

        // Accept completion: request arrives, replacement listener armed,
        // callback dispatched to the bridge.
        let (tag, ok) = dispatcher.queue.next().unwrap();
        assert!(ok);
        dispatcher.advance(tag, ok);
        assert_eq!(dispatcher.registry.armed_count(), 1);
        assert_eq!(dispatcher.registry.len(), 2);

        // Callback completion: handler finishes and is destroyed.
        let (done_tag, ok) = dispatcher.queue.next().unwrap();
        assert_eq!(done_tag, tag);
        assert!(ok);
        dispatcher.advance(done_tag, ok);
        assert_eq!(dispatcher.registry.len(), 1);
        assert!(!dispatcher.registry.contains(tag));

        assert_eq!(caller.join().unwrap(), Ok("Hello world 3".to_string()));

        let stats = dispatcher.stats.snapshot();
        assert_eq!(stats.completed, 1);
        assert_eq!(stats.in_flight, 0);
        assert_eq!(stats.armed_listeners, 1);
    }
}
