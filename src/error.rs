//! Error types for the greeter engine.
//!
//! `EngineError` covers unrecoverable engine-level failures; `CallError` is
//! the failure result a caller sees instead of a reply. Transport-signaled
//! `ok=false` completions are not errors at all: they only dispose the
//! affected handler.

use std::io;

/// Unrecoverable engine-level failure.
#[derive(Debug)]
pub enum EngineError {
    /// `start` was called on an engine that is already running or stopped.
    AlreadyStarted,
    /// The listen address could not be parsed or bound.
    Bind(io::Error),
    /// A worker context hit a transport failure other than shutdown.
    Transport(io::Error),
    /// An engine thread could not be spawned.
    Spawn(io::Error),
}

impl std::fmt::Display for EngineError {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            EngineError::AlreadyStarted => write!(f, "engine already started"),
            EngineError::Bind(e) => write!(f, "failed to bind listen address: {e}"),
            EngineError::Transport(e) => write!(f, "fatal transport failure: {e}"),
            EngineError::Spawn(e) => write!(f, "failed to spawn engine thread: {e}"),
        }
    }
}

impl std::error::Error for EngineError {
    fn source(&self) -> Option<&(dyn std::error::Error + 'static)> {
        match self {
            EngineError::AlreadyStarted => None,
            EngineError::Bind(e) | EngineError::Transport(e) | EngineError::Spawn(e) => Some(e),
        }
    }
}

/// Failure result delivered to a caller instead of a reply.
///
/// Every variant is distinguishable from a successful call; a caller never
/// hangs waiting for a reply that cannot come.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum CallError {
    /// No engine is listening on the target transport.
    NoListener,
    /// The engine stopped while the call was in flight.
    EngineStopped,
    /// The call was accepted but no reply arrived within the deadline.
    Timeout,
}

impl std::fmt::Display for CallError {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            CallError::NoListener => write!(f, "no listener reachable"),
            CallError::EngineStopped => write!(f, "engine stopped"),
            CallError::Timeout => write!(f, "call timed out"),
        }
    }
}

impl std::error::Error for CallError {}
