use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

/// A message role in the wire protocol. Only user/assistant turns exist at
/// this layer — tool results travel inside a user message's content blocks
/// rather than as a distinct role (see invariant 2/3 in SPEC_FULL.md §3).
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Role {
    User,
    Assistant,
}

/// One block of message content.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(tag = "type")]
pub enum ContentBlock {
    #[serde(rename = "text")]
    Text { text: String },
    #[serde(rename = "tool_use")]
    ToolUse {
        id: String,
        name: String,
        input: serde_json::Value,
    },
    #[serde(rename = "tool_result")]
    ToolResult {
        id: String,
        content: Vec<ContentBlock>,
        #[serde(default, skip_serializing_if = "Option::is_none")]
        status: Option<ToolResultStatus>,
    },
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum ToolResultStatus {
    Success,
    Error,
}

impl ContentBlock {
    pub fn text(text: impl Into<String>) -> Self {
        ContentBlock::Text { text: text.into() }
    }

    pub fn tool_use(id: impl Into<String>, name: impl Into<String>, input: serde_json::Value) -> Self {
        ContentBlock::ToolUse {
            id: id.into(),
            name: name.into(),
            input,
        }
    }

    pub fn tool_result(
        id: impl Into<String>,
        content: impl Into<String>,
        status: ToolResultStatus,
    ) -> Self {
        ContentBlock::ToolResult {
            id: id.into(),
            content: vec![ContentBlock::text(content)],
            status: Some(status),
        }
    }

    pub fn as_tool_use_id(&self) -> Option<&str> {
        match self {
            ContentBlock::ToolUse { id, .. } => Some(id),
            _ => None,
        }
    }

    pub fn as_tool_result_id(&self) -> Option<&str> {
        match self {
            ContentBlock::ToolResult { id, .. } => Some(id),
            _ => None,
        }
    }

    pub fn is_text(&self) -> bool {
        matches!(self, ContentBlock::Text { .. })
    }
}

/// A single message within a turn.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Message {
    pub role: Role,
    pub content: Vec<ContentBlock>,
    pub timestamp: DateTime<Utc>,
}

impl Message {
    pub fn user(content: Vec<ContentBlock>) -> Self {
        Self {
            role: Role::User,
            content,
            timestamp: Utc::now(),
        }
    }

    pub fn assistant(content: Vec<ContentBlock>) -> Self {
        Self {
            role: Role::Assistant,
            content,
            timestamp: Utc::now(),
        }
    }

    /// Tool-use ids introduced by this message, in order.
    pub fn tool_use_ids(&self) -> Vec<&str> {
        self.content.iter().filter_map(ContentBlock::as_tool_use_id).collect()
    }

    /// Tool-result ids answered by this message, in order.
    pub fn tool_result_ids(&self) -> Vec<&str> {
        self.content.iter().filter_map(ContentBlock::as_tool_result_id).collect()
    }

    /// Invariant 4: a turn-ending assistant message has at least one text
    /// block and no tool-use blocks.
    pub fn is_turn_ending(&self) -> bool {
        self.role == Role::Assistant
            && self.content.iter().any(ContentBlock::is_text)
            && !self.content.iter().any(|b| matches!(b, ContentBlock::ToolUse { .. }))
    }

    /// Concatenation of all text blocks, in order, joined by newlines.
    pub fn text(&self) -> String {
        self.content
            .iter()
            .filter_map(|b| match b {
                ContentBlock::Text { text } => Some(text.as_str()),
                _ => None,
            })
            .collect::<Vec<_>>()
            .join("\n")
    }
}

/// A turn: a maximal contiguous segment of the conversation from a
/// user-initiated message through the next turn-ending assistant response.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Turn {
    pub turn_number: u32,
    pub started_at: DateTime<Utc>,
    pub messages: Vec<Message>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub turn_summary: Option<String>,
}

impl Turn {
    pub fn new(turn_number: u32) -> Self {
        Self {
            turn_number,
            started_at: Utc::now(),
            messages: Vec::new(),
            turn_summary: None,
        }
    }

    /// Invariant 4: a turn is closed iff its last message is turn-ending.
    pub fn is_closed(&self) -> bool {
        self.messages.last().is_some_and(Message::is_turn_ending)
    }
}

/// The full per-task conversation: an ordered sequence of turns.
#[derive(Debug, Clone, Serialize, Deserialize, Default)]
pub struct Conversation {
    pub turns: Vec<Turn>,
}

impl Conversation {
    pub fn new() -> Self {
        Self { turns: Vec::new() }
    }

    pub fn last_turn(&self) -> Option<&Turn> {
        self.turns.last()
    }

    pub fn last_turn_mut(&mut self) -> Option<&mut Turn> {
        self.turns.last_mut()
    }

    /// Flatten all turns' messages into the wire-format message list
    /// submitted to the LLM (role + content only, per SPEC_FULL.md §4.6 step 3).
    pub fn flatten_messages(&self) -> Vec<Message> {
        self.turns.iter().flat_map(|t| t.messages.clone()).collect()
    }
}
