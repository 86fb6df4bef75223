use serde::Serialize;

/// Structured trace events emitted across the orchestrator crates, each
/// serialized into a single `trace_event` tracing field so a log aggregator
/// can filter/correlate on `event` without parsing free text.
#[derive(Debug, Clone, Serialize)]
#[serde(tag = "event")]
pub enum TraceEvent {
    TurnCreated {
        task_id: String,
        turn_number: u32,
    },
    TurnClosed {
        task_id: String,
        turn_number: u32,
        iterations: u32,
    },
    MessagesAppended {
        task_id: String,
        turn_number: u32,
        count: usize,
        new_turn: bool,
    },
    ConversationRepaired {
        task_id: String,
        synthetic_results: usize,
    },
    ThrottleStateChanged {
        model_id: String,
        multiplier: f64,
        reason: &'static str,
    },
    LivenessReconciled {
        task_id: String,
        was_alive: bool,
        now_alive: bool,
    },
    TaskLaunched {
        task_id: String,
        branch: &'static str,
        pid: Option<u32>,
    },
    TaskStopped {
        task_id: String,
    },
    CompletionPropagated {
        child_task_id: String,
        parent_task_id: String,
        parent_was_alive: bool,
    },
    ToolDispatched {
        task_id: String,
        tool_name: String,
        ok: bool,
        duration_ms: u64,
    },
    LlmRequest {
        model_id: String,
        task_id: String,
        duration_ms: u64,
        input_tokens: Option<u32>,
        output_tokens: Option<u32>,
    },
}

impl TraceEvent {
    pub fn emit(&self) {
        let json = serde_json::to_string(self).unwrap_or_default();
        tracing::info!(trace_event = %json, "sa_event");
    }
}
