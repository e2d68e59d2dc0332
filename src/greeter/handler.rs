//! Per-request call handler state machine.
//!
//! One handler exists per in-flight exchange. It is created in `Create`
//! state, armed as the listener for the next inbound request, and advances
//! through `Process` to `Finish` as completions arrive. The dispatcher owns
//! the lifecycle through the registry; a handler never spawns or destroys
//! other handlers.

use crate::greeter::transport::Responder;

/// Current serving state. Governs which transport operation is legal next.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum CallStatus {
    /// Just constructed; must arm an accept for the method.
    Create,
    /// Armed and waiting for a request, or processing one.
    Process,
    /// Reply sent; the handler is disposed on entry to this state.
    Finish,
}

/// Holds the context of one client request.
pub struct CallHandler {
    /// The current serving state.
    pub status: CallStatus,
    /// Request from the client. Filled by the transport on arrival.
    pub request: String,
    /// Reply to the client. Filled by the application callback.
    pub reply: String,
    /// The means to get back to the client. Used exactly once, in `Finish`.
    pub responder: Option<Responder>,
    /// Whether the application callback has been submitted to the bridge.
    pub dispatched: bool,
}

impl CallHandler {
    pub fn new() -> Self {
        Self {
            status: CallStatus::Create,
            request: String::new(),
            reply: String::new(),
            responder: None,
            dispatched: false,
        }
    }

    /// Mark the handler armed: interest registered, waiting for a request.
    pub fn arm(&mut self) {
        self.status = CallStatus::Process;
    }

    /// A handler is armed while it waits for a request to arrive.
    pub fn is_armed(&self) -> bool {
        self.status == CallStatus::Process && !self.dispatched
    }

    /// Take ownership of an arrived request and its responder; the callback
    /// job for it is being submitted.
    pub fn start_processing(&mut self, request: String, responder: Responder) {
        self.request = request;
        self.responder = Some(responder);
        self.dispatched = true;
    }

    /// Enter `Finish` with the computed reply, yielding the single-use
    /// responder. Consumes the handler: there is no state after `Finish`.
    pub fn complete(mut self, reply: String) -> (String, Option<Responder>) {
        self.status = CallStatus::Finish;
        self.reply = reply;
        let responder = self.responder.take();
        (self.reply, responder)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::greeter::transport;

    #[test]
    fn test_new_handler_starts_in_create() {
        let handler = CallHandler::new();
        assert_eq!(handler.status, CallStatus::Create);
        assert!(!handler.is_armed());
        assert!(handler.responder.is_none());
    }

    #[test]
    fn test_armed_until_request_arrives() {
        let mut handler = CallHandler::new();
        handler.arm();
        assert!(handler.is_armed());

        let (responder, _rx) = transport::responder_pair();
        handler.start_processing("world".to_string(), responder);
        assert!(!handler.is_armed());
        assert_eq!(handler.request, "world");
        assert!(handler.dispatched);
    }

    #[test]
    fn test_complete_yields_responder_once() {
        let mut handler = CallHandler::new();
        handler.arm();

        let (responder, rx) = transport::responder_pair();
        handler.start_processing("world".to_string(), responder);

        let (reply, responder) = handler.complete("Hello world".to_string());
        assert_eq!(reply, "Hello world");

        responder.unwrap().send(Ok(reply));
        assert_eq!(rx.recv().unwrap(), Ok("Hello world".to_string()));
    }
}
