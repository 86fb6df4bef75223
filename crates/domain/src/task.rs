use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

/// Token usage for a single LLM call, as reported by the provider.
#[derive(Debug, Clone, Copy, Default, Serialize, Deserialize)]
pub struct Usage {
    pub input_tokens: u64,
    pub output_tokens: u64,
    pub total_tokens: u64,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum TaskStatus {
    Running,
    Stopped,
}

impl TaskStatus {
    /// `stopped` is the only terminal-for-now status — a stopped task can
    /// always be reactivated later, unlike a genuinely deleted one.
    pub fn is_terminal(self) -> bool {
        matches!(self, TaskStatus::Stopped)
    }
}

/// The control block for a task (SPEC_FULL.md §3 "Task record").
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct TaskRecord {
    pub task_id: String,
    #[serde(default)]
    pub parent_task_id: Option<String>,
    pub model_id: String,
    pub static_system_prompt: String,
    #[serde(default)]
    pub enable_recursion: bool,
    pub status: TaskStatus,
    #[serde(default)]
    pub pid: Option<u32>,
    pub created_at: DateTime<Utc>,
    pub process_started_at: DateTime<Utc>,
    #[serde(default = "default_max_iterations")]
    pub max_iterations: u32,
    #[serde(default)]
    pub last_usage: Usage,
    /// Advisory only — never consulted for correctness. See DESIGN.md.
    #[serde(default)]
    pub children: Vec<String>,
}

fn default_max_iterations() -> u32 {
    250
}

impl TaskRecord {
    pub fn new(task_id: impl Into<String>, model_id: impl Into<String>) -> Self {
        let now = Utc::now();
        Self {
            task_id: task_id.into(),
            parent_task_id: None,
            model_id: model_id.into(),
            static_system_prompt: String::new(),
            enable_recursion: false,
            status: TaskStatus::Stopped,
            pid: None,
            created_at: now,
            process_started_at: now,
            max_iterations: default_max_iterations(),
            last_usage: Usage::default(),
            children: Vec::new(),
        }
    }

    /// Invariant 5: `status == running` implies a recorded pid, and vice versa.
    pub fn invariant_5_holds(&self) -> bool {
        match self.status {
            TaskStatus::Running => self.pid.is_some(),
            TaskStatus::Stopped => self.pid.is_none(),
        }
    }

    pub fn mark_running(&mut self, pid: u32) {
        self.status = TaskStatus::Running;
        self.pid = Some(pid);
        self.process_started_at = Utc::now();
    }

    pub fn mark_stopped(&mut self) {
        self.status = TaskStatus::Stopped;
        self.pid = None;
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn new_task_starts_stopped_with_no_pid() {
        let t = TaskRecord::new("t1", "m1");
        assert_eq!(t.status, TaskStatus::Stopped);
        assert!(t.pid.is_none());
        assert!(t.invariant_5_holds());
    }

    #[test]
    fn mark_running_sets_pid() {
        let mut t = TaskRecord::new("t1", "m1");
        t.mark_running(1234);
        assert_eq!(t.status, TaskStatus::Running);
        assert_eq!(t.pid, Some(1234));
        assert!(t.invariant_5_holds());
    }

    #[test]
    fn mark_stopped_clears_pid() {
        let mut t = TaskRecord::new("t1", "m1");
        t.mark_running(1234);
        t.mark_stopped();
        assert!(t.pid.is_none());
        assert!(t.invariant_5_holds());
    }

    #[test]
    fn default_max_iterations_is_250() {
        let t = TaskRecord::new("t1", "m1");
        assert_eq!(t.max_iterations, 250);
    }

    #[test]
    fn stopped_is_terminal_running_is_not() {
        assert!(TaskStatus::Stopped.is_terminal());
        assert!(!TaskStatus::Running.is_terminal());
    }

    #[test]
    fn serde_roundtrip_missing_optional_fields() {
        let json = serde_json::json!({
            "task_id": "t1",
            "model_id": "m1",
            "static_system_prompt": "",
            "status": "stopped",
            "created_at": Utc::now(),
            "process_started_at": Utc::now(),
        });
        let t: TaskRecord = serde_json::from_value(json).unwrap();
        assert_eq!(t.max_iterations, 250);
        assert!(t.children.is_empty());
        assert!(t.parent_task_id.is_none());
    }
}
