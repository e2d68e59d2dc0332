//! Reusable worker context state machine.
//!
//! A fixed number of contexts cycle through receive, wait, and send against
//! one shared socket. Each context has at most one socket operation in
//! flight and owns its buffers exclusively, so no locking is needed between
//! contexts. A context that cannot parse an inbound message drops it and
//! re-arms its receive; the slot is never wedged by bad input.

use crate::error::EngineError;
use crate::pool::frame::Frame;
use bytes::Bytes;
use std::net::SocketAddr;
use std::sync::Arc;
use std::time::Duration;
use tokio::net::UdpSocket;
use tokio::sync::watch;
use tracing::{debug, info, trace};

/// Largest datagram a context will accept.
const RECV_BUFFER_SIZE: usize = 16 * 1024;

/// Pipeline position of a worker context.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum WorkerState {
    /// Freshly allocated; arms the first receive.
    Init,
    /// A receive is outstanding on the shared socket.
    Recv,
    /// Reply computed; attach it to the pending send.
    Wait,
    /// A send is outstanding on the shared socket.
    Send,
}

/// One slot of the fixed worker pool.
pub struct WorkerContext {
    id: usize,
    state: WorkerState,
    /// Receive buffer, reused across cycles.
    buf: Vec<u8>,
    /// Reply owned by this context between `Recv` and `Send`.
    pending: Option<Frame>,
    /// Encoded reply attached to the in-flight send.
    outgoing: Option<(Bytes, SocketAddr)>,
    peer: Option<SocketAddr>,
    socket: Arc<UdpSocket>,
    work_delay: Duration,
    shutdown: watch::Receiver<bool>,
}

impl WorkerContext {
    pub fn new(
        id: usize,
        socket: Arc<UdpSocket>,
        work_delay: Duration,
        shutdown: watch::Receiver<bool>,
    ) -> Self {
        Self {
            id,
            state: WorkerState::Init,
            buf: vec![0u8; RECV_BUFFER_SIZE],
            pending: None,
            outgoing: None,
            peer: None,
            socket,
            work_delay,
            shutdown,
        }
    }

    /// Cycle through the pipeline until the transport shuts down.
    ///
    /// Returns `Ok(())` on a clean stop; any transport failure other than
    /// shutdown is fatal and propagates.
    pub async fn run(mut self) -> Result<(), EngineError> {
        loop {
            match self.state {
                WorkerState::Init => {
                    trace!(worker = self.id, "context initialized, arming receive");
                    self.state = WorkerState::Recv;
                }
                WorkerState::Recv => {
                    if !self.recv().await? {
                        info!(worker = self.id, "transport closed, stopping");
                        return Ok(());
                    }
                }
                WorkerState::Wait => self.attach_reply(),
                WorkerState::Send => self.send().await?,
            }
        }
    }

    /// Wait for one datagram. Returns `false` on the closed-transport
    /// signal; stays in `Recv` after a malformed message.
    async fn recv(&mut self) -> Result<bool, EngineError> {
        let (len, peer) = tokio::select! {
            changed = self.shutdown.changed() => {
                match changed {
                    Ok(()) if !*self.shutdown.borrow() => return Ok(true),
                    // Signal raised or engine side dropped: stop.
                    _ => return Ok(false),
                }
            }
            res = self.socket.recv_from(&mut self.buf) => {
                res.map_err(EngineError::Transport)?
            }
        };

        match Frame::parse(&self.buf[..len]) {
            None => {
                debug!(worker = self.id, len, "malformed message, dropping");
                // Re-arm on the same context; do not advance the pipeline.
            }
            Some(request) => {
                trace!(
                    worker = self.id,
                    header_len = request.header.len(),
                    body_len = request.body.len(),
                    "request received"
                );
                // Simulated processing latency. Awaiting here suspends only
                // this context; the other contexts keep the socket busy.
                if !self.work_delay.is_zero() {
                    tokio::time::sleep(self.work_delay).await;
                }
                self.pending = Some(Frame::reply());
                self.peer = Some(peer);
                self.state = WorkerState::Wait;
            }
        }
        Ok(true)
    }

    /// Attach the computed reply to the pending send.
    fn attach_reply(&mut self) {
        let Some(reply) = self.pending.take() else {
            panic!("worker {} in Wait state with no pending message", self.id);
        };
        let Some(peer) = self.peer.take() else {
            panic!("worker {} in Wait state with no peer", self.id);
        };
        self.outgoing = Some((reply.encode(), peer));
        self.state = WorkerState::Send;
    }

    /// Complete the in-flight send and cycle back to `Recv`.
    async fn send(&mut self) -> Result<(), EngineError> {
        let Some((data, peer)) = self.outgoing.take() else {
            panic!("worker {} in Send state with no outgoing message", self.id);
        };
        self.socket
            .send_to(&data, peer)
            .await
            .map_err(EngineError::Transport)?;
        trace!(worker = self.id, peer = %peer, "reply sent");
        self.state = WorkerState::Recv;
        Ok(())
    }
}
