use async_trait::async_trait;
use serde_json::Value;
use std::collections::HashMap;
use std::sync::Arc;
use tether_proto::{CommandResult, Envelope, PONG_PAYLOAD, kind};
use tracing::warn;

use crate::exec::CommandExecutor;
use crate::session::SessionState;

/// Everything a handler may touch while serving one frame of one connection.
#[derive(Clone, Debug)]
pub struct HandlerContext {
    pub identity: Arc<str>,
    pub session: SessionState,
    pub executor: Arc<CommandExecutor>,
}

/// Serves one message type. Each invocation yields exactly one reply.
#[async_trait]
pub trait MessageHandler: Send + Sync {
    async fn handle(&self, ctx: HandlerContext, envelope: Envelope) -> Envelope;
}

#[derive(Default, Clone)]
pub struct HandlerRegistry {
    handlers: HashMap<String, Arc<dyn MessageHandler>>,
}

impl HandlerRegistry {
    pub fn new() -> Self {
        Self::default()
    }

    /// `id`, `ping`, `cd`, `exec` and `command`.
    pub fn with_builtin_handlers() -> Self {
        let exec: Arc<dyn MessageHandler> = Arc::new(ExecHandler);
        let mut registry = Self::new();
        registry.register(kind::ID, Arc::new(IdentityHandler));
        registry.register(kind::PING, Arc::new(PingHandler));
        registry.register(kind::CD, Arc::new(NavigateHandler));
        registry.register(kind::EXEC, exec.clone());
        registry.register(kind::COMMAND, exec);
        registry
    }

    pub fn register(&mut self, kind: impl Into<String>, handler: Arc<dyn MessageHandler>) {
        let kind = kind.into();
        if self.handlers.insert(kind.clone(), handler).is_some() {
            warn!(%kind, "replacing existing message handler");
        }
    }

    pub fn get(&self, kind: &str) -> Option<Arc<dyn MessageHandler>> {
        self.handlers.get(kind).cloned()
    }

    pub fn kinds(&self) -> impl Iterator<Item = &str> {
        self.handlers.keys().map(String::as_str)
    }
}

impl std::fmt::Debug for HandlerRegistry {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        let mut kinds: Vec<&str> = self.kinds().collect();
        kinds.sort_unstable();
        f.debug_struct("HandlerRegistry").field("kinds", &kinds).finish()
    }
}

pub struct IdentityHandler;

#[async_trait]
impl MessageHandler for IdentityHandler {
    async fn handle(&self, ctx: HandlerContext, _envelope: Envelope) -> Envelope {
        Envelope::new(kind::ID, &*ctx.identity)
    }
}

pub struct PingHandler;

#[async_trait]
impl MessageHandler for PingHandler {
    async fn handle(&self, _ctx: HandlerContext, _envelope: Envelope) -> Envelope {
        Envelope::new(kind::PONG, PONG_PAYLOAD)
    }
}

pub struct NavigateHandler;

#[async_trait]
impl MessageHandler for NavigateHandler {
    async fn handle(&self, ctx: HandlerContext, envelope: Envelope) -> Envelope {
        let request = Request::parse(&envelope.payload, "path");
        // Unlike a bare `cd` command, a `cd` frame must name a target.
        let target = request.text.as_deref().map(str::trim).filter(|path| !path.is_empty());
        let result = match target {
            Some(path) => ctx.executor.navigate(&ctx.session, Some(path)).await,
            None => CommandResult::failure(
                "",
                "missing navigation target",
                ctx.executor.prompt(&ctx.session).await,
            ),
        };
        output(result.with_request_id(request.request_id))
    }
}

pub struct ExecHandler;

#[async_trait]
impl MessageHandler for ExecHandler {
    async fn handle(&self, ctx: HandlerContext, envelope: Envelope) -> Envelope {
        let request = Request::parse(&envelope.payload, "command");
        let command = request.text.unwrap_or_default();
        let result = ctx.executor.execute(&ctx.session, &command).await;
        output(result.with_request_id(request.request_id))
    }
}

fn output(result: CommandResult) -> Envelope {
    match serde_json::to_value(&result) {
        Ok(payload) => Envelope::new(kind::OUTPUT, payload),
        Err(err) => Envelope::new(kind::ERROR, format!("failed to encode result: {err}")),
    }
}

/// A payload given either as a bare string or as an object carrying the text
/// under `field` plus an optional `request_id`.
#[derive(Debug, Default, PartialEq, Eq)]
struct Request {
    text: Option<String>,
    request_id: Option<String>,
}

impl Request {
    fn parse(payload: &Value, field: &str) -> Self {
        match payload {
            Value::String(text) => Self {
                text: Some(text.clone()),
                request_id: None,
            },
            Value::Object(map) => Self {
                text: map.get(field).and_then(Value::as_str).map(str::to_owned),
                request_id: map.get("request_id").and_then(|id| match id {
                    Value::String(id) => Some(id.clone()),
                    Value::Number(id) => Some(id.to_string()),
                    _ => None,
                }),
            },
            _ => Self::default(),
        }
    }
}
