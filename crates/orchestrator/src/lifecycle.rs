//! Task Lifecycle Manager (C7): the launch/stop decision matrix and OS
//! process spawn/kill (SPEC_FULL.md §4.7).

use std::path::PathBuf;
use std::sync::Arc;
use std::time::Duration;

use tokio::process::Command;
use uuid::Uuid;

use sa_domain::conversation::{Conversation, ContentBlock, Message, Turn};
use sa_domain::error::{Error, Result};
use sa_domain::queue::InboundEnvelope;
use sa_domain::task::TaskRecord;
use sa_domain::trace::TraceEvent;
use sa_store::{PubSub, StoreAdapter};

use crate::ingest;
use crate::liveness::LivenessProbe;

/// Parameters for `launch`. `task_id` absent means "allocate a new one";
/// `model_id` is required only on the branches that create a task record
/// from scratch (SPEC_FULL.md §4.7's decision matrix).
#[derive(Debug, Clone, Default)]
pub struct LaunchRequest {
    pub task_id: Option<String>,
    pub model_id: Option<String>,
    pub enable_recursion: Option<bool>,
    pub initial_messages: Vec<String>,
    pub parent_task_id: Option<String>,
    pub max_iterations: Option<u32>,
    pub start_process: bool,
}

impl LaunchRequest {
    pub fn new_task(model_id: impl Into<String>) -> Self {
        Self {
            model_id: Some(model_id.into()),
            start_process: true,
            ..Default::default()
        }
    }
}

#[derive(Debug, Clone)]
pub struct LaunchOutcome {
    pub task_id: String,
    pub pid: Option<u32>,
    pub branch: &'static str,
}

pub struct TaskLifecycleManager {
    store: Arc<StoreAdapter>,
    pubsub: Arc<PubSub<String>>,
    liveness: Arc<LivenessProbe>,
    worker_binary: PathBuf,
    stop_grace: Duration,
}

impl TaskLifecycleManager {
    pub fn new(
        store: Arc<StoreAdapter>,
        pubsub: Arc<PubSub<String>>,
        liveness: Arc<LivenessProbe>,
        worker_binary: PathBuf,
        stop_grace: Duration,
    ) -> Self {
        Self {
            store,
            pubsub,
            liveness,
            worker_binary,
            stop_grace,
        }
    }

    pub async fn launch(&self, req: LaunchRequest) -> Result<LaunchOutcome> {
        let task_id = req.task_id.clone().unwrap_or_else(|| Uuid::new_v4().to_string());
        let task_key = format!("task_data:{task_id}");
        let conversation_key = format!("task:{task_id}");

        let existing: Option<TaskRecord> = self.store.get(&task_key)?;
        // The critical invariant: never overwrite an existing conversation.
        // The check is on the conversation key's presence, not on process
        // liveness.
        let conversation_exists = self.store.get::<Conversation>(&conversation_key)?.is_some();

        let probe = if existing.is_some() {
            self.liveness.probe(&self.store, &self.pubsub, &task_id)?
        } else {
            crate::liveness::ProbeResult {
                alive: false,
                pid: None,
                cpu_percent: None,
            }
        };

        let branch: &'static str = match (&existing, probe.alive, conversation_exists) {
            (Some(_), true, _) => "resume",
            (Some(_), false, true) => "reactivate",
            (Some(_), false, false) => "create-with-id",
            (None, _, _) => "create-with-id",
        };

        let pid = match branch {
            "resume" => {
                let mut record = existing.expect("resume implies an existing task record");
                let pid = record.pid;
                self.apply_overrides(&mut record, &req);
                self.store.set(&task_key, &record)?;
                self.enqueue_initial(&task_id, &req.initial_messages)?;
                pid
            }
            "reactivate" => {
                let mut record = existing.expect("reactivate implies an existing task record");
                self.apply_overrides(&mut record, &req);
                self.store.set(&task_key, &record)?;
                self.enqueue_initial(&task_id, &req.initial_messages)?;
                self.maybe_spawn(&task_id, req.start_process).await?
            }
            "create-with-id" => {
                let model_id = req
                    .model_id
                    .clone()
                    .ok_or_else(|| Error::Config("model_id is required to create a new task".into()))?;
                let mut record = TaskRecord::new(task_id.clone(), model_id);
                record.parent_task_id = req.parent_task_id.clone();
                record.enable_recursion = req.enable_recursion.unwrap_or(false);
                if let Some(max_iter) = req.max_iterations {
                    record.max_iterations = max_iter;
                }
                self.store.set(&task_key, &record)?;
                self.write_initial_conversation(&conversation_key, &req.initial_messages)?;
                self.maybe_spawn(&task_id, req.start_process).await?
            }
            _ => unreachable!("decision matrix is exhaustive"),
        };

        TraceEvent::TaskLaunched {
            task_id: task_id.clone(),
            branch,
            pid,
        }
        .emit();

        Ok(LaunchOutcome { task_id, pid, branch })
    }

    fn apply_overrides(&self, record: &mut TaskRecord, req: &LaunchRequest) {
        if let Some(model_id) = &req.model_id {
            record.model_id = model_id.clone();
        }
        if let Some(enable) = req.enable_recursion {
            record.enable_recursion = enable;
        }
        if let Some(max_iter) = req.max_iterations {
            record.max_iterations = max_iter;
        }
    }

    fn enqueue_initial(&self, task_id: &str, initial_messages: &[String]) -> Result<()> {
        for text in initial_messages {
            ingest::enqueue(&self.store, task_id, InboundEnvelope::user(text.clone(), None))?;
        }
        Ok(())
    }

    fn write_initial_conversation(&self, conversation_key: &str, initial_messages: &[String]) -> Result<()> {
        let mut conversation = Conversation::new();
        let mut turn0 = Turn::new(0);
        for text in initial_messages {
            turn0.messages.push(Message::user(vec![ContentBlock::text(text.clone())]));
        }
        conversation.turns.push(turn0);
        self.store.set(conversation_key, &conversation)
    }

    async fn maybe_spawn(&self, task_id: &str, start_process: bool) -> Result<Option<u32>> {
        if !start_process {
            return Ok(None);
        }
        Ok(Some(self.spawn(task_id).await?))
    }

    async fn spawn(&self, task_id: &str) -> Result<u32> {
        let child = Command::new(&self.worker_binary)
            .arg("worker")
            .arg("--task-id")
            .arg(task_id)
            .spawn()
            .map_err(Error::Io)?;
        child
            .id()
            .ok_or_else(|| Error::Other("spawned worker process reported no pid".into()))
    }

    /// `stop(task_id)`: terminate, escalate to kill after the grace window,
    /// then mark the task record stopped on confirmed death.
    pub async fn stop(&self, task_id: &str) -> Result<()> {
        let task_key = format!("task_data:{task_id}");
        let Some(mut record): Option<TaskRecord> = self.store.get(&task_key)? else {
            return Ok(());
        };
        let Some(pid) = record.pid else {
            return Ok(());
        };

        signal::terminate(pid);
        let deadline = tokio::time::Instant::now() + self.stop_grace;
        loop {
            if !self.liveness.probe_pid(pid).alive {
                break;
            }
            if tokio::time::Instant::now() >= deadline {
                signal::kill(pid);
                break;
            }
            tokio::time::sleep(Duration::from_millis(100)).await;
        }

        record.mark_stopped();
        self.store.set(&task_key, &record)?;
        self.pubsub.publish(&format!("task:{task_id}"), "process_ended".to_string());
        TraceEvent::TaskStopped { task_id: task_id.to_string() }.emit();
        Ok(())
    }
}

mod signal {
    #[cfg(unix)]
    pub fn terminate(pid: u32) {
        unsafe {
            libc::kill(pid as i32, libc::SIGTERM);
        }
    }

    #[cfg(unix)]
    pub fn kill(pid: u32) {
        unsafe {
            libc::kill(pid as i32, libc::SIGKILL);
        }
    }

    #[cfg(not(unix))]
    pub fn terminate(_pid: u32) {}
    #[cfg(not(unix))]
    pub fn kill(_pid: u32) {}
}
