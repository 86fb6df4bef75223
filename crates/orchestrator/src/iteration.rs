//! Iteration Engine (C6): the per-process main loop that drains the inbox,
//! repairs and submits the conversation, dispatches tools, and closes turns
//! (SPEC_FULL.md §4.6).

use std::collections::HashMap;
use std::sync::Arc;

use parking_lot::Mutex;

use sa_domain::config::{LlmConfig, TaskConfig, ThrottleConfig};
use sa_domain::conversation::{Conversation, Message, Role};
use sa_domain::error::{Error, Result};
use sa_domain::task::{TaskRecord, TaskStatus};
use sa_domain::trace::TraceEvent;
use sa_providers::{ChatRequest, ProviderRegistry, StopReason};
use sa_store::{PubSub, StoreAdapter};

use crate::completion;
use crate::dispatch::ToolRegistry;
use crate::ingest;
use crate::lifecycle::TaskLifecycleManager;
use crate::liveness::LivenessProbe;
use crate::repair;
use crate::throttle::{ChatOutcome, ThrottleCoordinator};

/// Whether a single step of the loop closed the current turn, and whether
/// the caller should keep iterating.
struct StepOutcome {
    turn_ending: bool,
    keep_going: bool,
}

pub struct IterationEngine {
    store: Arc<StoreAdapter>,
    pubsub: Arc<PubSub<String>>,
    providers: Arc<ProviderRegistry>,
    tools: Arc<ToolRegistry>,
    liveness: Arc<LivenessProbe>,
    lifecycle: Arc<TaskLifecycleManager>,
    throttle_config: ThrottleConfig,
    llm_config: LlmConfig,
    task_config: TaskConfig,
    throttles: Mutex<HashMap<String, Arc<ThrottleCoordinator>>>,
}

impl IterationEngine {
    pub fn new(
        store: Arc<StoreAdapter>,
        pubsub: Arc<PubSub<String>>,
        providers: Arc<ProviderRegistry>,
        tools: Arc<ToolRegistry>,
        liveness: Arc<LivenessProbe>,
        lifecycle: Arc<TaskLifecycleManager>,
        throttle_config: ThrottleConfig,
        llm_config: LlmConfig,
        task_config: TaskConfig,
    ) -> Self {
        Self {
            store,
            pubsub,
            providers,
            tools,
            liveness,
            lifecycle,
            throttle_config,
            llm_config,
            task_config,
            throttles: Mutex::new(HashMap::new()),
        }
    }

    fn throttle_for(&self, model_id: &str) -> Arc<ThrottleCoordinator> {
        let mut throttles = self.throttles.lock();
        throttles
            .entry(model_id.to_string())
            .or_insert_with(|| ThrottleCoordinator::new(self.throttle_config.clone(), model_id, self.pubsub.clone()))
            .clone()
    }

    /// Drive one task to completion (turn-ending) or until `max_iterations`
    /// is exhausted or the task is asked to stop. Marks the task stopped
    /// and clears its pid on every exit path, including a panic unwind.
    pub async fn run_task(&self, task_id: &str) -> Result<()> {
        let task_key = format!("task_data:{task_id}");
        let mut record: TaskRecord = self
            .store
            .get(&task_key)?
            .ok_or_else(|| Error::TaskNotFound(task_id.to_string()))?;
        record.mark_running(std::process::id());
        self.store.set(&task_key, &record)?;

        let guard = RunningGuard::new(self.store.clone(), self.pubsub.clone(), task_id.to_string());

        let max_iterations = if record.max_iterations > 0 {
            record.max_iterations
        } else {
            self.task_config.default_max_iterations
        };
        let outcome = self.drive(task_id, max_iterations).await;
        guard.finish();
        outcome
    }

    async fn drive(&self, task_id: &str, max_iterations: u32) -> Result<()> {
        let mut iterations = 0u32;
        loop {
            if iterations >= max_iterations {
                break;
            }
            let task_key = format!("task_data:{task_id}");
            let record: Option<TaskRecord> = self.store.get(&task_key)?;
            if record.map(|t| t.status == TaskStatus::Stopped).unwrap_or(true) {
                break;
            }

            let step = self.step(task_id).await?;
            iterations += 1;
            if step.turn_ending {
                self.close_turn(task_id, iterations).await?;
                break;
            }
            if !step.keep_going {
                break;
            }
        }
        Ok(())
    }

    /// One pass of SPEC_FULL.md §4.6's 9-step algorithm.
    async fn step(&self, task_id: &str) -> Result<StepOutcome> {
        // Step 1: drain the inbox into the conversation.
        ingest::drain(&self.store, &self.pubsub, task_id)?;

        // Step 2: load + repair.
        let conversation_key = format!("task:{task_id}");
        let conversation: Conversation = self.store.get(&conversation_key)?.unwrap_or_default();
        let messages = repair::repair(task_id, &conversation);

        let task_key = format!("task_data:{task_id}");
        let record: TaskRecord = self
            .store
            .get(&task_key)?
            .ok_or_else(|| Error::TaskNotFound(task_id.to_string()))?;

        // Step 4: assemble the prompt.
        let system_prompt = self.assemble_system_prompt(&record)?;

        // Step 5: submit via the throttle coordinator.
        let throttle = self.throttle_for(&record.model_id);
        let provider = self.providers.require(&record.model_id)?;
        let request = ChatRequest {
            messages: messages.clone(),
            system_prompt,
            tools: self.tools.definitions(),
            model_id: record.model_id.clone(),
            temperature: None,
            max_tokens: None,
        };
        let last_output_tokens = record.last_usage.output_tokens;
        let task_key_for_stop = task_key.clone();
        let store_for_stop = self.store.clone();
        let is_stopped = move || {
            store_for_stop
                .get::<TaskRecord>(&task_key_for_stop)
                .ok()
                .flatten()
                .map(|t| t.status == TaskStatus::Stopped)
                .unwrap_or(true)
        };
        let model_id = record.model_id.clone();
        let call_started = std::time::Instant::now();
        let outcome = throttle
            .call(last_output_tokens, &is_stopped, || provider.chat(request))
            .await?;

        let response = match outcome {
            ChatOutcome::Response(resp) => resp,
            ChatOutcome::Throttled | ChatOutcome::Cancelled => {
                return Ok(StepOutcome { turn_ending: false, keep_going: true });
            }
        };

        TraceEvent::LlmRequest {
            model_id,
            task_id: task_id.to_string(),
            duration_ms: call_started.elapsed().as_millis() as u64,
            input_tokens: response.usage.map(|u| u.input_tokens as u32),
            output_tokens: response.usage.map(|u| u.output_tokens as u32),
        }
        .emit();

        if let Some(usage) = response.usage {
            let mut record = record.clone();
            record.last_usage = usage;
            self.store.set(&task_key, &record)?;
        }

        // Step 6: persist the assistant message.
        let assistant_message = Message::assistant(response.content.clone());
        self.append_message(task_id, assistant_message.clone())?;

        // Step 7: dispatch tool_use blocks, if any.
        let tool_use_ids: Vec<_> = assistant_message
            .content
            .iter()
            .filter_map(|block| match block {
                sa_domain::conversation::ContentBlock::ToolUse { id, name, input } => {
                    Some((id.clone(), name.clone(), input.clone()))
                }
                _ => None,
            })
            .collect();

        if !tool_use_ids.is_empty() {
            for (id, name, input) in tool_use_ids {
                self.tools.dispatch(&self.store, task_id, &id, &name, input).await?;
            }
            return Ok(StepOutcome { turn_ending: false, keep_going: true });
        }

        // Step 8: max_tokens truncation — keep iterating without closing.
        if response.stop_reason == StopReason::MaxTokens {
            return Ok(StepOutcome { turn_ending: false, keep_going: true });
        }

        // Step 9: turn-ending response. Summarize and close.
        Ok(StepOutcome { turn_ending: true, keep_going: true })
    }

    fn append_message(&self, task_id: &str, message: Message) -> Result<()> {
        let conversation_key = format!("task:{task_id}");
        self.store.patch(&conversation_key, Conversation::default(), |conv: &mut Conversation| {
            if conv.turns.is_empty() {
                conv.turns.push(sa_domain::conversation::Turn::new(0));
            }
            conv.last_turn_mut().expect("turn ensured above").messages.push(message);
        })?;
        Ok(())
    }

    fn assemble_system_prompt(&self, record: &TaskRecord) -> Result<String> {
        let mut prompt = record.static_system_prompt.clone();
        if let Some(parent_id) = &record.parent_task_id {
            let parent_key = format!("task:{parent_id}");
            if let Some(parent_conv) = self.store.get::<Conversation>(&parent_key)? {
                if let Some(summary) = parent_conv.last_turn().and_then(|t| t.turn_summary.clone()) {
                    prompt.push_str("\n\nParent task context:\n");
                    prompt.push_str(&summary);
                }
            }
        }
        Ok(prompt)
    }

    /// Step 9's summarizer call and turn close, plus completion propagation
    /// (C8) when this task has a parent.
    async fn close_turn(&self, task_id: &str, iterations: u32) -> Result<()> {
        let conversation_key = format!("task:{task_id}");
        let conversation: Conversation = self.store.get(&conversation_key)?.unwrap_or_default();
        let turn_number = conversation.last_turn().map(|t| t.turn_number).unwrap_or(0);
        let final_text = conversation
            .last_turn()
            .and_then(|t| t.messages.iter().rev().find(|m| m.role == Role::Assistant))
            .map(Message::text)
            .unwrap_or_default();

        let task_key = format!("task_data:{task_id}");
        let record: TaskRecord = self
            .store
            .get(&task_key)?
            .ok_or_else(|| Error::TaskNotFound(task_id.to_string()))?;
        let summarizer_model_id = self
            .llm_config
            .summarizer_model_id
            .clone()
            .unwrap_or_else(|| record.model_id.clone());

        let summary = match self.providers.get(&summarizer_model_id) {
            Some(provider) => {
                let request = ChatRequest {
                    messages: vec![Message::user(vec![sa_domain::conversation::ContentBlock::text(format!(
                        "Summarize this turn's final response in one sentence:\n\n{final_text}"
                    ))])],
                    system_prompt: "You write terse, one-sentence turn summaries.".to_string(),
                    tools: Vec::new(),
                    model_id: summarizer_model_id,
                    temperature: None,
                    max_tokens: None,
                };
                match provider.chat(request).await {
                    Ok(resp) => resp.content.iter().map(|b| match b {
                        sa_domain::conversation::ContentBlock::Text { text } => text.clone(),
                        _ => String::new(),
                    }).collect::<Vec<_>>().join(" "),
                    Err(_) => final_text.clone(),
                }
            }
            None => final_text.clone(),
        };

        self.store.patch(&conversation_key, Conversation::default(), |conv: &mut Conversation| {
            if let Some(turn) = conv.last_turn_mut() {
                turn.turn_summary = Some(summary.clone());
            }
        })?;

        TraceEvent::TurnClosed {
            task_id: task_id.to_string(),
            turn_number,
            iterations,
        }
        .emit();

        if let Some(parent_id) = &record.parent_task_id {
            completion::propagate(
                &self.lifecycle,
                &self.liveness,
                &self.store,
                &self.pubsub,
                task_id,
                parent_id,
                turn_number,
                iterations,
                &final_text,
            )
            .await?;
        }

        Ok(())
    }
}

/// Enforces the finally-discipline exit guard of SPEC_FULL.md §4.6: the
/// task is marked stopped and its pid cleared on any exit path, including
/// a panic unwind.
struct RunningGuard {
    store: Arc<StoreAdapter>,
    pubsub: Arc<PubSub<String>>,
    task_id: String,
    cleared: bool,
}

impl RunningGuard {
    fn new(store: Arc<StoreAdapter>, pubsub: Arc<PubSub<String>>, task_id: String) -> Self {
        Self { store, pubsub, task_id, cleared: false }
    }

    fn clear(&mut self) {
        let key = format!("task_data:{}", self.task_id);
        if let Ok(Some(mut record)) = self.store.get::<TaskRecord>(&key) {
            record.mark_stopped();
            let _ = self.store.set(&key, &record);
        }
        self.pubsub.publish(&format!("task:{}", self.task_id), "process_ended".to_string());
        self.cleared = true;
    }

    fn finish(mut self) {
        self.clear();
    }
}

impl Drop for RunningGuard {
    fn drop(&mut self) {
        if !self.cleared {
            self.clear();
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use sa_domain::conversation::ContentBlock;
    use sa_domain::queue::InboundEnvelope;
    use sa_providers::ChatResponse;
    use std::path::PathBuf;
    use std::time::Duration;

    struct StubProvider {
        id: String,
        responses: Mutex<Vec<ChatResponse>>,
    }

    #[async_trait::async_trait]
    impl sa_providers::LlmProvider for StubProvider {
        async fn chat(&self, _req: ChatRequest) -> Result<ChatResponse> {
            let mut responses = self.responses.lock();
            Ok(responses.pop().unwrap_or(ChatResponse {
                content: vec![ContentBlock::text("done")],
                stop_reason: StopReason::EndTurn,
                usage: None,
            }))
        }

        fn provider_id(&self) -> &str {
            &self.id
        }
    }

    fn engine_with_provider(provider: StubProvider) -> (IterationEngine, Arc<StoreAdapter>) {
        let dir = tempfile::tempdir().unwrap();
        let store = Arc::new(StoreAdapter::new(dir.into_path()).unwrap());
        let pubsub = Arc::new(PubSub::default());
        let liveness = Arc::new(LivenessProbe::new());
        let lifecycle = Arc::new(TaskLifecycleManager::new(
            store.clone(),
            pubsub.clone(),
            liveness.clone(),
            PathBuf::from("/bin/true"),
            Duration::from_millis(50),
        ));
        let mut registry_map: HashMap<String, Arc<dyn sa_providers::LlmProvider>> = HashMap::new();
        registry_map.insert("model-a".to_string(), Arc::new(provider));
        let providers = Arc::new(sa_providers::ProviderRegistry::from_map(registry_map));
        let tools = Arc::new(ToolRegistry::new());

        let engine = IterationEngine::new(
            store.clone(),
            pubsub,
            providers,
            tools,
            liveness,
            lifecycle,
            ThrottleConfig::default(),
            LlmConfig::default(),
            TaskConfig::default(),
        );
        (engine, store)
    }

    #[tokio::test]
    async fn single_user_turn_closes_with_text_response() {
        let provider = StubProvider {
            id: "model-a".into(),
            responses: Mutex::new(vec![ChatResponse {
                content: vec![ContentBlock::text("the answer is 4")],
                stop_reason: StopReason::EndTurn,
                usage: None,
            }]),
        };
        let (engine, store) = engine_with_provider(provider);

        let mut record = TaskRecord::new("t1", "model-a");
        record.max_iterations = 5;
        store.set("task_data:t1", &record).unwrap();
        ingest::enqueue(&store, "t1", InboundEnvelope::user("2+2?", None)).unwrap();

        engine.run_task("t1").await.unwrap();

        let conv: Conversation = store.get("task:t1").unwrap().unwrap();
        assert_eq!(conv.turns.len(), 1);
        assert!(conv.turns[0].is_closed());
        assert!(conv.turns[0].turn_summary.is_some());

        let record: TaskRecord = store.get("task_data:t1").unwrap().unwrap();
        assert_eq!(record.status, TaskStatus::Stopped);
        assert!(record.pid.is_none());
    }
}
