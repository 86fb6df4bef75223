use sa_domain::conversation::Message;
use sa_domain::error::Result;
use sa_domain::task::Usage;
use sa_domain::tool::ToolDefinition;

// ━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━
// Request / Response types (Converse-style wire contract, SPEC_FULL.md §6)
// ━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━

/// A request submitted to a model for one iteration (§4.6 step 5).
#[derive(Debug, Clone)]
pub struct ChatRequest {
    /// The flattened conversation messages (role + content only).
    pub messages: Vec<Message>,
    /// The static + dynamic system prompt assembled for this task.
    pub system_prompt: String,
    /// Tool definitions the model may invoke this turn.
    pub tools: Vec<ToolDefinition>,
    /// Model identifier to call.
    pub model_id: String,
    pub temperature: Option<f32>,
    pub max_tokens: Option<u32>,
}

/// Why the model stopped generating.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum StopReason {
    EndTurn,
    ToolUse,
    MaxTokens,
    StopSequence,
}

/// The model's response to a `ChatRequest`.
#[derive(Debug, Clone)]
pub struct ChatResponse {
    /// Content blocks of the assistant message (text and/or tool-use blocks).
    pub content: Vec<sa_domain::conversation::ContentBlock>,
    pub stop_reason: StopReason,
    pub usage: Option<Usage>,
}

// ━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━
// Core provider trait
// ━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━

/// Trait every LLM adapter implements. Request/response only — no
/// streaming, since the iteration engine (C6) consumes one full response
/// per call (SPEC_FULL.md §4.6).
#[async_trait::async_trait]
pub trait LlmProvider: Send + Sync {
    async fn chat(&self, req: ChatRequest) -> Result<ChatResponse>;

    /// A unique identifier for this provider instance.
    fn provider_id(&self) -> &str;
}
