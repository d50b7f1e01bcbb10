//! Inbound frame routing.
//!
//! The [`Dispatcher`] decodes frames, drops those addressed to other agents,
//! and runs each routed handler as its own task on a [`TaskTracker`]. Replies
//! go through [`Outbound`], which feeds the connection's single writer task.

mod handlers;
mod outbound;

pub use handlers::{
    ExecHandler, HandlerContext, HandlerRegistry, IdentityHandler, MessageHandler,
    NavigateHandler, PingHandler,
};
pub use outbound::Outbound;

use std::sync::Arc;
use tether_proto::{Codec, Envelope, kind};
use tokio_util::task::TaskTracker;
use tracing::{debug, trace, warn};

/// What happened to one inbound frame.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum FrameOutcome {
    /// A handler task was spawned.
    Dispatched,
    /// Addressed to another agent; no reply.
    Filtered,
    /// Undecodable; an error frame was sent.
    Rejected,
    /// No handler for the type; an error frame was sent.
    Unknown,
}

impl FrameOutcome {
    /// Whether the frame decoded into a well-formed envelope.
    pub fn is_well_formed(self) -> bool {
        !matches!(self, FrameOutcome::Rejected)
    }
}

pub struct Dispatcher {
    codec: Codec,
    registry: Arc<HandlerRegistry>,
    context: HandlerContext,
    outbound: Outbound,
    tracker: TaskTracker,
    diagnostics: bool,
}

impl Dispatcher {
    pub fn new(
        codec: Codec,
        registry: Arc<HandlerRegistry>,
        context: HandlerContext,
        outbound: Outbound,
        tracker: TaskTracker,
    ) -> Self {
        Self {
            codec,
            registry,
            context,
            outbound,
            tracker,
            diagnostics: false,
        }
    }

    pub fn with_diagnostics(mut self, diagnostics: bool) -> Self {
        self.diagnostics = diagnostics;
        self
    }

    pub fn on_frame(&self, raw: &[u8]) -> FrameOutcome {
        if self.diagnostics {
            debug!(frame = %String::from_utf8_lossy(raw), "inbound frame");
        }

        let envelope = match self.codec.decode(raw) {
            Ok(envelope) => envelope,
            Err(err) => {
                warn!(error = %err, "rejecting malformed frame");
                self.outbound
                    .send(Envelope::new(kind::ERROR, format!("invalid JSON: {err}")));
                return FrameOutcome::Rejected;
            }
        };

        if !envelope.is_addressed_to(&self.context.identity) {
            trace!(kind = %envelope.kind, addressed_to = ?envelope.target, "frame addressed elsewhere");
            return FrameOutcome::Filtered;
        }

        let Some(handler) = self.registry.get(&envelope.kind) else {
            debug!(kind = %envelope.kind, "no handler for message type");
            self.outbound.send(Envelope::new(
                kind::ERROR,
                format!("unknown message type: {}", envelope.kind),
            ));
            return FrameOutcome::Unknown;
        };

        let context = self.context.clone();
        let outbound = self.outbound.clone();
        self.tracker.spawn(async move {
            let kind = envelope.kind.clone();
            let reply = handler.handle(context, envelope).await;
            if !outbound.send(reply) {
                debug!(%kind, "reply dropped after disconnect");
            }
        });
        FrameOutcome::Dispatched
    }
}
