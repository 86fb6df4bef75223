//! Tool Dispatcher (C9): name -> handler lookup and invocation.
//!
//! A handler is a boxed `async_trait` object held behind an `Arc`, matching
//! a trait-object dispatch table over a `HashMap<String, _>`. The registry
//! is built once at worker startup from static configuration.

use std::collections::HashMap;
use std::sync::Arc;
use std::time::Instant;

use sa_domain::error::Result;
use sa_domain::queue::InboundEnvelope;
use sa_domain::tool::{ToolDefinition, ToolOutcome};
use sa_domain::trace::TraceEvent;
use sa_store::StoreAdapter;

use crate::ingest;

#[async_trait::async_trait]
pub trait ToolHandler: Send + Sync {
    fn definition(&self) -> ToolDefinition;
    async fn invoke(&self, input: serde_json::Value, task_id: &str) -> ToolOutcome;
}

#[derive(Default)]
pub struct ToolRegistry {
    handlers: HashMap<String, Arc<dyn ToolHandler>>,
}

impl ToolRegistry {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn register(&mut self, handler: Arc<dyn ToolHandler>) {
        self.handlers.insert(handler.definition().name.clone(), handler);
    }

    pub fn definitions(&self) -> Vec<ToolDefinition> {
        self.handlers.values().map(|h| h.definition()).collect()
    }

    /// Invoke a single tool-use block and enqueue its result back onto the
    /// task's inbox. Exceptions never escape this call — an unknown tool
    /// name or a handler failure becomes an error `tool_result`, preserving
    /// invariant (2).
    pub async fn dispatch(
        &self,
        store: &StoreAdapter,
        task_id: &str,
        tool_use_id: &str,
        tool_name: &str,
        input: serde_json::Value,
    ) -> Result<()> {
        let started = Instant::now();
        let outcome = match self.handlers.get(tool_name) {
            Some(handler) => handler.invoke(input, task_id).await,
            None => ToolOutcome::Error(format!("no tool registered named '{tool_name}'")),
        };
        let (content, is_error) = outcome.into_result_text();

        ingest::enqueue(
            store,
            task_id,
            InboundEnvelope::tool_result(tool_use_id, content, is_error),
        )?;

        TraceEvent::ToolDispatched {
            task_id: task_id.to_string(),
            tool_name: tool_name.to_string(),
            ok: !is_error,
            duration_ms: started.elapsed().as_millis() as u64,
        }
        .emit();

        Ok(())
    }
}
