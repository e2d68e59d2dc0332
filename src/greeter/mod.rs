//! Completion-queue greeter engine.
//!
//! One dispatch thread blocks on a completion queue and routes each
//! `(tag, ok)` event to the call handler that issued the operation. Handlers
//! live in a slab registry keyed by tag; application callbacks run on a
//! separate single-threaded execution bridge.

pub mod bridge;
pub mod completion;
pub mod dispatcher;
pub mod engine;
pub mod handler;
pub mod registry;
pub mod transport;

pub use engine::GreeterEngine;
