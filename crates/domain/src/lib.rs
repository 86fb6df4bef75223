//! Shared types for the task orchestrator: conversation/turn/message wire
//! shapes, the task control block, the inbound queue, tool definitions,
//! configuration, structured trace events, and the shared error type.

pub mod config;
pub mod conversation;
pub mod error;
pub mod queue;
pub mod task;
pub mod tool;
pub mod trace;

pub use conversation::{ContentBlock, Conversation, Message, Role, ToolResultStatus, Turn};
pub use error::{Error, Result};
pub use queue::{EnvelopePayload, EnvelopeKind, InboundEnvelope, Inbox};
pub use task::{TaskRecord, TaskStatus, Usage};
pub use tool::{ToolDefinition, ToolOutcome};
