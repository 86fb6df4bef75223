use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

use crate::conversation::ContentBlock;

/// What kind of thing arrived in a task's inbox.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum EnvelopeKind {
    User,
    ToolResult,
    Completion,
}

/// An inbound envelope awaiting merge into the conversation (SPEC_FULL.md
/// §3 "Inbox").
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct InboundEnvelope {
    pub kind: EnvelopeKind,
    pub payload: EnvelopePayload,
    #[serde(default)]
    pub sender_id: Option<String>,
    /// Present only for `kind == ToolResult`.
    #[serde(default)]
    pub tool_use_id: Option<String>,
    pub timestamp: DateTime<Utc>,
}

/// The content an envelope carries, before it is converted into a
/// `ContentBlock` at ingestion time.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(untagged)]
pub enum EnvelopePayload {
    Text(String),
    ToolResult {
        content: String,
        is_error: bool,
    },
}

impl InboundEnvelope {
    pub fn user(text: impl Into<String>, sender_id: Option<String>) -> Self {
        Self {
            kind: EnvelopeKind::User,
            payload: EnvelopePayload::Text(text.into()),
            sender_id,
            tool_use_id: None,
            timestamp: Utc::now(),
        }
    }

    pub fn tool_result(tool_use_id: impl Into<String>, content: impl Into<String>, is_error: bool) -> Self {
        Self {
            kind: EnvelopeKind::ToolResult,
            payload: EnvelopePayload::ToolResult {
                content: content.into(),
                is_error,
            },
            sender_id: None,
            tool_use_id: Some(tool_use_id.into()),
            timestamp: Utc::now(),
        }
    }

    pub fn completion(text: impl Into<String>, sender_id: impl Into<String>) -> Self {
        Self {
            kind: EnvelopeKind::Completion,
            payload: EnvelopePayload::Text(text.into()),
            sender_id: Some(sender_id.into()),
            tool_use_id: None,
            timestamp: Utc::now(),
        }
    }

    /// Convert this envelope's payload into the content block it contributes
    /// once merged into the conversation (C5's grouping rule, §4.5).
    pub fn to_content_block(&self) -> ContentBlock {
        match (&self.payload, &self.tool_use_id) {
            (EnvelopePayload::ToolResult { content, is_error }, Some(id)) => {
                let status = if *is_error {
                    crate::conversation::ToolResultStatus::Error
                } else {
                    crate::conversation::ToolResultStatus::Success
                };
                ContentBlock::tool_result(id.clone(), content.clone(), status)
            }
            (EnvelopePayload::Text(text), _) => ContentBlock::text(text.clone()),
            (EnvelopePayload::ToolResult { content, .. }, None) => ContentBlock::text(content.clone()),
        }
    }
}

/// A task's inbox: an ordered list of not-yet-merged envelopes.
pub type Inbox = Vec<InboundEnvelope>;
