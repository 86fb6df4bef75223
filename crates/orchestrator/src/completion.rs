//! Completion Propagator (C8): hands a finished child turn's result to its
//! parent task (SPEC_FULL.md §4.8).

use sa_domain::error::Result;
use sa_domain::queue::InboundEnvelope;
use sa_domain::trace::TraceEvent;
use sa_store::{PubSub, StoreAdapter};

use crate::ingest;
use crate::lifecycle::{LaunchRequest, TaskLifecycleManager};
use crate::liveness::LivenessProbe;

/// Compose the completion message a parent sees from a child, per §4.8:
/// child id, turn and iteration counts, and the child's final text.
pub fn compose_completion_text(child_task_id: &str, turn_number: u32, iterations: u32, final_text: &str) -> String {
    format!(
        "Child task {child_task_id} has completed (turn {turn_number}, {iterations} iteration(s)).\n{final_text}"
    )
}

/// Propagate a child's turn-ending completion to its parent: enqueue a
/// `completion` envelope, then probe the parent and launch it if dead. A
/// live parent's own ingester will pick the envelope up on its next drain —
/// this call makes no attempt to wake it directly.
pub async fn propagate(
    lifecycle: &TaskLifecycleManager,
    liveness: &LivenessProbe,
    store: &StoreAdapter,
    pubsub: &PubSub<String>,
    child_task_id: &str,
    parent_task_id: &str,
    turn_number: u32,
    iterations: u32,
    final_text: &str,
) -> Result<()> {
    let text = compose_completion_text(child_task_id, turn_number, iterations, final_text);
    ingest::enqueue(
        store,
        parent_task_id,
        InboundEnvelope::completion(text, child_task_id.to_string()),
    )?;

    let probe = liveness.probe(store, pubsub, parent_task_id)?;
    if !probe.alive {
        lifecycle
            .launch(LaunchRequest {
                task_id: Some(parent_task_id.to_string()),
                start_process: true,
                ..Default::default()
            })
            .await?;
    }

    TraceEvent::CompletionPropagated {
        child_task_id: child_task_id.to_string(),
        parent_task_id: parent_task_id.to_string(),
        parent_was_alive: probe.alive,
    }
    .emit();

    Ok(())
}
