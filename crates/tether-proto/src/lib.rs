//! Shared wire definitions for agent ↔ control plane communication.
//! Keeping this in a dedicated crate lets the control plane (or a test
//! harness) speak the protocol without pulling in the agent runtime.

mod codec;
mod result;

pub use codec::{Codec, DecodeError, Envelope, WireFields};
pub use result::{CommandResult, CommandStatus, EMPTY_SUCCESS_SENTINEL};

/// Message type names exchanged over the connection.
pub mod kind {
    /// Inbound: report identity. Outbound: identity handshake / reply.
    pub const ID: &str = "id";
    pub const PING: &str = "ping";
    pub const PONG: &str = "pong";
    pub const CD: &str = "cd";
    pub const EXEC: &str = "exec";
    pub const COMMAND: &str = "command";
    pub const OUTPUT: &str = "output";
    pub const ERROR: &str = "error";
    pub const PROMPT: &str = "prompt";
    /// Handshake carrying the session's starting directory.
    pub const CREATE_CONNECTION: &str = "CREATE_CONNECTION";
}

/// Literal payload carried by `pong` replies.
pub const PONG_PAYLOAD: &str = "pong";
