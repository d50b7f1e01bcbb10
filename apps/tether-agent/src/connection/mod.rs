//! Connection lifecycle: dial candidates in order, hold one socket, feed its
//! frames to a [`Dispatcher`], and reconnect when it goes away.

pub mod backoff;

pub use backoff::{BackoffPolicy, BackoffState};

use clap::ValueEnum;
use futures_util::stream::SplitSink;
use futures_util::{SinkExt, StreamExt};
use std::sync::Arc;
use std::time::Duration;
use tether_proto::{Codec, Envelope, kind};
use thiserror::Error;
use tokio::net::TcpStream;
use tokio::sync::mpsc;
use tokio::time::Instant;
use tokio_tungstenite::tungstenite::{self, Message};
use tokio_tungstenite::{MaybeTlsStream, WebSocketStream, connect_async};
use tokio_util::sync::CancellationToken;
use tokio_util::task::TaskTracker;
use tracing::{debug, info, trace, warn};
use url::Url;

use crate::dispatch::{Dispatcher, HandlerContext, HandlerRegistry, Outbound};
use crate::exec::CommandExecutor;
use crate::session::SessionState;

type WsStream = WebSocketStream<MaybeTlsStream<TcpStream>>;
type WsSink = SplitSink<WsStream, Message>;

const WRITER_CLOSE_GRACE: Duration = Duration::from_secs(2);

#[derive(Debug, Error)]
pub enum ConnectError {
    #[error("dial to {endpoint} timed out after {after:?}")]
    Timeout { endpoint: Url, after: Duration },
    #[error("dial to {endpoint} failed: {source}")]
    Transport {
        endpoint: Url,
        #[source]
        source: Box<tungstenite::Error>,
    },
}

/// First frame sent on a fresh connection.
#[derive(Clone, Copy, Debug, Default, ValueEnum, PartialEq, Eq)]
pub enum HandshakeMode {
    /// `id` carrying the agent identity.
    #[default]
    Identity,
    /// `CREATE_CONNECTION` carrying the session's starting directory.
    Directory,
}

#[derive(Debug, Clone)]
pub struct ConnectionSettings {
    pub endpoints: Vec<Url>,
    /// When off only the first endpoint is ever dialed.
    pub failover: bool,
    pub dial_timeout: Duration,
    pub idle_timeout: Duration,
    /// Fixed pause after an established connection drops.
    pub reconnect_pause: Duration,
    pub backoff: BackoffPolicy,
    pub handshake: HandshakeMode,
    pub diagnostics: bool,
}

impl ConnectionSettings {
    pub fn new(endpoints: Vec<Url>) -> Self {
        Self {
            endpoints,
            failover: true,
            dial_timeout: Duration::from_secs(10),
            idle_timeout: Duration::from_secs(300),
            reconnect_pause: Duration::from_secs(1),
            backoff: BackoffPolicy::default(),
            handshake: HandshakeMode::Identity,
            diagnostics: false,
        }
    }

    /// Endpoints dialed in one cycle, in order.
    pub fn candidates(&self) -> &[Url] {
        if self.failover {
            &self.endpoints
        } else {
            &self.endpoints[..self.endpoints.len().min(1)]
        }
    }
}

/// Why a connected session ended.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum SessionEnd {
    Closed,
    IdleTimeout,
    Transport(String),
    Shutdown,
}

pub struct ConnectionManager {
    settings: ConnectionSettings,
    codec: Codec,
    registry: Arc<HandlerRegistry>,
    executor: Arc<CommandExecutor>,
    identity: Arc<str>,
    tracker: TaskTracker,
    backoff: BackoffState,
}

impl ConnectionManager {
    pub fn new(
        settings: ConnectionSettings,
        codec: Codec,
        registry: Arc<HandlerRegistry>,
        executor: Arc<CommandExecutor>,
        identity: Arc<str>,
        tracker: TaskTracker,
    ) -> Self {
        let backoff = BackoffState::new(settings.backoff);
        Self {
            settings,
            codec,
            registry,
            executor,
            identity,
            tracker,
            backoff,
        }
    }

    pub fn backoff(&self) -> &BackoffState {
        &self.backoff
    }

    /// Runs until `shutdown` is cancelled. Transport problems of any kind lead
    /// back to dialing.
    pub async fn run(&mut self, shutdown: CancellationToken) {
        info!(
            endpoints = self.settings.candidates().len(),
            failover = self.settings.failover,
            "connection manager starting"
        );
        while let Some(pause) = self.cycle(&shutdown).await {
            tokio::select! {
                _ = shutdown.cancelled() => break,
                _ = tokio::time::sleep(pause) => {}
            }
        }
        info!("connection manager stopped");
    }

    /// Dials the candidates once and serves whichever connects. Returns the
    /// pause before the next cycle, or `None` once shutdown has begun.
    async fn cycle(&mut self, shutdown: &CancellationToken) -> Option<Duration> {
        let dialed = tokio::select! {
            biased;
            _ = shutdown.cancelled() => return None,
            dialed = self.dial_any() => dialed,
        };

        match dialed {
            Some((endpoint, stream)) => {
                self.backoff.reset();
                let end = self.serve(stream, shutdown).await;
                if end == SessionEnd::Shutdown {
                    return None;
                }
                info!(endpoint = %endpoint, reason = ?end, "connection ended");
                Some(self.settings.reconnect_pause)
            }
            None => {
                let delay = self.backoff.record_failure();
                warn!(
                    attempt = self.backoff.attempt(),
                    delay_ms = delay.as_millis() as u64,
                    "no endpoint reachable; backing off"
                );
                Some(delay)
            }
        }
    }

    async fn dial_any(&self) -> Option<(Url, WsStream)> {
        for endpoint in self.settings.candidates() {
            match self.dial(endpoint).await {
                Ok(stream) => {
                    info!(endpoint = %endpoint, "connected");
                    return Some((endpoint.clone(), stream));
                }
                Err(err) => warn!(error = %err, "dial failed"),
            }
        }
        None
    }

    async fn dial(&self, endpoint: &Url) -> Result<WsStream, ConnectError> {
        debug!(endpoint = %endpoint, "dialing");
        match tokio::time::timeout(self.settings.dial_timeout, connect_async(endpoint.as_str()))
            .await
        {
            Ok(Ok((stream, _response))) => Ok(stream),
            Ok(Err(source)) => Err(ConnectError::Transport {
                endpoint: endpoint.clone(),
                source: Box::new(source),
            }),
            Err(_) => Err(ConnectError::Timeout {
                endpoint: endpoint.clone(),
                after: self.settings.dial_timeout,
            }),
        }
    }

    /// Owns one connected socket until it fails, idles out, or shutdown begins.
    async fn serve(&self, stream: WsStream, shutdown: &CancellationToken) -> SessionEnd {
        let (sink, mut incoming) = stream.split();
        let (outbound, frames) = Outbound::channel(self.codec.clone(), self.identity.clone());
        let outbound = outbound.with_diagnostics(self.settings.diagnostics);
        let writer_stop = shutdown.child_token();
        let writer = tokio::spawn(write_frames(sink, frames, writer_stop.clone()));

        let session = SessionState::new(self.executor.environment().home.clone());
        self.send_handshake(&outbound, &session).await;

        let dispatcher = Dispatcher::new(
            self.codec.clone(),
            self.registry.clone(),
            HandlerContext {
                identity: self.identity.clone(),
                session,
                executor: self.executor.clone(),
            },
            outbound,
            self.tracker.clone(),
        )
        .with_diagnostics(self.settings.diagnostics);

        let idle = self.settings.idle_timeout;
        let mut deadline = Instant::now() + idle;
        let end = loop {
            let next = tokio::select! {
                _ = shutdown.cancelled() => break SessionEnd::Shutdown,
                _ = tokio::time::sleep_until(deadline) => break SessionEnd::IdleTimeout,
                next = incoming.next() => next,
            };
            let raw = match next {
                Some(Ok(Message::Text(text))) => text.into_bytes(),
                Some(Ok(Message::Binary(bytes))) => bytes,
                Some(Ok(Message::Close(frame))) => {
                    debug!(?frame, "peer closed connection");
                    break SessionEnd::Closed;
                }
                Some(Ok(_)) => continue,
                Some(Err(err)) => break SessionEnd::Transport(err.to_string()),
                None => break SessionEnd::Closed,
            };
            if dispatcher.on_frame(&raw).is_well_formed() {
                deadline = Instant::now() + idle;
            }
        };

        // Replies still in flight find the writer gone and are dropped.
        drop(dispatcher);
        writer_stop.cancel();
        if tokio::time::timeout(WRITER_CLOSE_GRACE, writer).await.is_err() {
            debug!("writer did not close in time");
        }
        end
    }

    async fn send_handshake(&self, outbound: &Outbound, session: &SessionState) {
        let handshake = match self.settings.handshake {
            HandshakeMode::Identity => Envelope::new(kind::ID, &*self.identity),
            HandshakeMode::Directory => Envelope::new(
                kind::CREATE_CONNECTION,
                session.current_dir().await.display().to_string(),
            ),
        };
        outbound.send(handshake);
        outbound.send(Envelope::new(
            kind::PROMPT,
            self.executor.prompt(session).await,
        ));
    }
}

/// The only task that writes to the socket.
async fn write_frames(
    mut sink: WsSink,
    mut frames: mpsc::UnboundedReceiver<String>,
    stop: CancellationToken,
) {
    loop {
        let frame = tokio::select! {
            _ = stop.cancelled() => break,
            frame = frames.recv() => match frame {
                Some(frame) => frame,
                None => break,
            },
        };
        if let Err(err) = sink.send(Message::Text(frame)).await {
            debug!(error = %err, "write failed; closing writer");
            break;
        }
    }
    frames.close();
    if let Err(err) = sink.close().await {
        trace!(error = %err, "close after writer stop");
    }
}
