use std::sync::Arc;
use tether_proto::{Codec, Envelope};
use tokio::sync::mpsc;
use tracing::{debug, trace};

/// Cloneable handle for queueing frames to a connection's single writer task.
///
/// Every frame is stamped with the agent's identity and encoded before it is
/// queued, so the writer only ever moves complete frames onto the socket.
#[derive(Clone, Debug)]
pub struct Outbound {
    tx: mpsc::UnboundedSender<String>,
    codec: Codec,
    identity: Arc<str>,
    diagnostics: bool,
}

impl Outbound {
    pub fn channel(codec: Codec, identity: Arc<str>) -> (Self, mpsc::UnboundedReceiver<String>) {
        let (tx, rx) = mpsc::unbounded_channel();
        (
            Self {
                tx,
                codec,
                identity,
                diagnostics: false,
            },
            rx,
        )
    }

    pub fn with_diagnostics(mut self, diagnostics: bool) -> Self {
        self.diagnostics = diagnostics;
        self
    }

    /// Queues `envelope`. Returns `false` once the connection is gone; the frame
    /// is dropped in that case.
    pub fn send(&self, envelope: Envelope) -> bool {
        let envelope = envelope.with_target(&*self.identity);
        let frame = self.codec.encode(&envelope);
        if self.diagnostics {
            debug!(%frame, "queueing frame");
        } else {
            trace!(kind = %envelope.kind, "queueing frame");
        }
        match self.tx.send(frame) {
            Ok(()) => true,
            Err(_) => {
                debug!(kind = %envelope.kind, "connection closed; dropping frame");
                false
            }
        }
    }

    pub fn is_closed(&self) -> bool {
        self.tx.is_closed()
    }
}
