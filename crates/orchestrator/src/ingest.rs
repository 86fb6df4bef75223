//! Queue Ingester (C5): the sole writer of inbound messages into the
//! conversation (SPEC_FULL.md §4.5).

use sa_domain::conversation::{ContentBlock, Conversation, Message, Turn};
use sa_domain::error::Result;
use sa_domain::queue::{EnvelopeKind, Inbox, InboundEnvelope};
use sa_domain::task::{TaskRecord, TaskStatus};
use sa_domain::trace::TraceEvent;
use sa_store::{PubSub, StoreAdapter};

/// Append an envelope to a task's inbox. Does not inspect the conversation —
/// producers are decoupled from ingestion.
pub fn enqueue(store: &StoreAdapter, task_id: &str, envelope: InboundEnvelope) -> Result<usize> {
    store.arrappend(&format!("task_queue:{task_id}"), envelope)
}

/// Drain the inbox into the conversation. Returns `true` if any envelopes
/// were ingested.
pub fn drain(store: &StoreAdapter, pubsub: &PubSub<String>, task_id: &str) -> Result<bool> {
    let inbox_key = format!("task_queue:{task_id}");
    let conversation_key = format!("task:{task_id}");
    let task_key = format!("task_data:{task_id}");

    let envelopes: Inbox = store.get(&inbox_key)?.unwrap_or_default();
    if envelopes.is_empty() {
        return Ok(false);
    }

    let task: Option<TaskRecord> = store.get(&task_key)?;
    let stopped = task.map(|t| t.status == TaskStatus::Stopped).unwrap_or(true);

    let mut conversation: Conversation = store.get(&conversation_key)?.unwrap_or_default();

    let needs_new_turn = conversation.turns.is_empty()
        || conversation.last_turn().map(|t| t.messages.is_empty()).unwrap_or(true)
        || (stopped
            && conversation
                .last_turn()
                .and_then(|t| t.messages.last())
                .map(Message::is_turn_ending)
                .unwrap_or(false));

    if needs_new_turn {
        let next_number = conversation.turns.len() as u32;
        conversation.turns.push(Turn::new(next_number));
        TraceEvent::TurnCreated {
            task_id: task_id.to_string(),
            turn_number: next_number,
        }
        .emit();
    }

    let new_messages = group_into_messages(envelopes);
    let appended = new_messages.len();
    let turn_number = {
        let turn = conversation.last_turn_mut().expect("turn just ensured to exist above");
        turn.messages.extend(new_messages);
        turn.turn_number
    };

    store.set(&conversation_key, &conversation)?;
    store.delete(&inbox_key)?;

    pubsub.publish(&format!("task:{task_id}"), "messages_appended".to_string());
    TraceEvent::MessagesAppended {
        task_id: task_id.to_string(),
        turn_number,
        count: appended,
        new_turn: needs_new_turn,
    }
    .emit();

    Ok(true)
}

/// Grouping rule: all `tool_result` envelopes coalesce into a single leading
/// user message; each `user`/`completion` envelope becomes its own user
/// message, in arrival order, after the tool-results message.
fn group_into_messages(envelopes: Vec<InboundEnvelope>) -> Vec<Message> {
    let mut tool_result_blocks: Vec<ContentBlock> = Vec::new();
    let mut rest: Vec<Message> = Vec::new();

    for envelope in envelopes {
        match envelope.kind {
            EnvelopeKind::ToolResult => tool_result_blocks.push(envelope.to_content_block()),
            EnvelopeKind::User | EnvelopeKind::Completion => {
                rest.push(Message::user(vec![envelope.to_content_block()]))
            }
        }
    }

    let mut out = Vec::new();
    if !tool_result_blocks.is_empty() {
        out.push(Message::user(tool_result_blocks));
    }
    out.extend(rest);
    out
}

#[cfg(test)]
mod tests {
    use super::*;
    use sa_domain::conversation::ToolResultStatus;

    fn store() -> StoreAdapter {
        let dir = tempfile::tempdir().unwrap();
        StoreAdapter::new(dir.into_path()).unwrap()
    }

    #[test]
    fn drain_on_empty_inbox_is_noop() {
        let store = store();
        let pubsub = PubSub::default();
        assert!(!drain(&store, &pubsub, "t1").unwrap());
    }

    #[test]
    fn drain_creates_first_turn_from_user_envelope() {
        let store = store();
        let pubsub = PubSub::default();
        enqueue(&store, "t1", InboundEnvelope::user("hello", None)).unwrap();

        assert!(drain(&store, &pubsub, "t1").unwrap());
        let conv: Conversation = store.get("task:t1").unwrap().unwrap();
        assert_eq!(conv.turns.len(), 1);
        assert_eq!(conv.turns[0].messages.len(), 1);
        assert_eq!(conv.turns[0].messages[0].text(), "hello");

        let inbox: Option<Inbox> = store.get("task_queue:t1").unwrap();
        assert!(inbox.is_none());
    }

    #[test]
    fn drain_appends_into_open_turn_when_not_stopped() {
        let store = store();
        let pubsub = PubSub::default();
        let mut task = TaskRecord::new("t1", "model-a");
        task.mark_running(123);
        store.set("task_data:t1", &task).unwrap();

        enqueue(&store, "t1", InboundEnvelope::user("first", None)).unwrap();
        drain(&store, &pubsub, "t1").unwrap();

        enqueue(&store, "t1", InboundEnvelope::user("second", None)).unwrap();
        drain(&store, &pubsub, "t1").unwrap();

        let conv: Conversation = store.get("task:t1").unwrap().unwrap();
        assert_eq!(conv.turns.len(), 1);
        assert_eq!(conv.turns[0].messages.len(), 2);
    }

    #[test]
    fn stopped_task_with_closed_turn_starts_a_new_turn() {
        let store = store();
        let pubsub = PubSub::default();
        let task = TaskRecord::new("t1", "model-a");
        store.set("task_data:t1", &task).unwrap();

        let mut conv = Conversation::new();
        let mut turn0 = Turn::new(0);
        turn0.messages.push(Message::user(vec![ContentBlock::text("hi")]));
        turn0.messages.push(Message::assistant(vec![ContentBlock::text("hello")]));
        conv.turns.push(turn0);
        store.set("task:t1", &conv).unwrap();

        enqueue(&store, "t1", InboundEnvelope::user("again", None)).unwrap();
        drain(&store, &pubsub, "t1").unwrap();

        let conv: Conversation = store.get("task:t1").unwrap().unwrap();
        assert_eq!(conv.turns.len(), 2);
    }

    #[test]
    fn tool_results_coalesce_before_user_envelopes() {
        let store = store();
        let pubsub = PubSub::default();
        enqueue(&store, "t1", InboundEnvelope::user("seed", None)).unwrap();
        drain(&store, &pubsub, "t1").unwrap();

        enqueue(&store, "t1", InboundEnvelope::user("second user msg", None)).unwrap();
        enqueue(&store, "t1", InboundEnvelope::tool_result("u1", "12:00", false)).unwrap();
        enqueue(&store, "t1", InboundEnvelope::tool_result("u2", "sunny", false)).unwrap();
        drain(&store, &pubsub, "t1").unwrap();

        let conv: Conversation = store.get("task:t1").unwrap().unwrap();
        let messages = &conv.turns[0].messages;
        assert_eq!(messages.len(), 3); // seed + coalesced tool results + second user
        match &messages[1].content[0] {
            ContentBlock::ToolResult { id, status, .. } => {
                assert_eq!(id, "u1");
                assert_eq!(*status, Some(ToolResultStatus::Success));
            }
            other => panic!("expected tool_result, got {other:?}"),
        }
        assert_eq!(messages[2].text(), "second user msg");
    }
}
