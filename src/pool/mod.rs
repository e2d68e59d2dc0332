//! Fixed worker-pool request/reply engine.
//!
//! A small, fixed set of reusable worker contexts cycle through
//! receive/wait/send against one shared UDP socket, giving limited but
//! deterministic pipelining without a queue explosion.

pub mod engine;
pub mod frame;
pub mod worker;

pub use engine::PoolEngine;
