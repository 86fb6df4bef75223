//! Conversation Repair (C4): produces a wire-ready view of the conversation
//! that satisfies the alternation and tool-pairing invariants, without
//! mutating the stored conversation.

use sa_domain::conversation::{Conversation, ContentBlock, Message, Role, ToolResultStatus};
use sa_domain::trace::TraceEvent;

const INTERRUPTED: &str = r#"{"error":"Tool execution interrupted or failed to complete"}"#;

fn synthetic_result(id: &str) -> ContentBlock {
    ContentBlock::tool_result(id, INTERRUPTED, ToolResultStatus::Error)
}

fn synthetic_message(pending: &[String]) -> Message {
    Message::user(pending.iter().map(|id| synthetic_result(id)).collect())
}

/// Walk the conversation turn by turn, repairing violations of invariants
/// (1)-(3) as they're encountered. Returns the flattened, repaired message
/// list ready to submit to the LLM. Emits one `ConversationRepaired` trace
/// event per call, counting every synthetic `tool_result` inserted (zero for
/// an already well-formed conversation).
pub fn repair(task_id: &str, conversation: &Conversation) -> Vec<Message> {
    let mut out: Vec<Message> = Vec::new();
    let mut pending: Vec<String> = Vec::new();
    let mut prev_role: Option<Role> = None;
    let mut synthetic_results = 0usize;

    for turn in &conversation.turns {
        for msg in &turn.messages {
            match msg.role {
                Role::Assistant => {
                    if prev_role == Some(Role::Assistant) && !pending.is_empty() {
                        synthetic_results += pending.len();
                        out.push(synthetic_message(&pending));
                        pending.clear();
                    }
                    pending = msg.tool_use_ids().into_iter().map(str::to_owned).collect();
                    out.push(msg.clone());
                }
                Role::User => {
                    let answered: Vec<&str> = msg.tool_result_ids();
                    pending.retain(|id| !answered.contains(&id.as_str()));
                    if pending.is_empty() {
                        out.push(msg.clone());
                    } else {
                        synthetic_results += pending.len();
                        let mut content = msg.content.clone();
                        for id in pending.drain(..) {
                            content.push(synthetic_result(&id));
                        }
                        out.push(Message {
                            role: Role::User,
                            content,
                            timestamp: msg.timestamp,
                        });
                    }
                }
            }
            prev_role = Some(msg.role);
        }
    }

    if synthetic_results > 0 {
        TraceEvent::ConversationRepaired {
            task_id: task_id.to_string(),
            synthetic_results,
        }
        .emit();
    }

    out
}
