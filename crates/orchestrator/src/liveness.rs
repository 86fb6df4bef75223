//! Liveness Probe (C2): checks OS process status for a task's recorded pid
//! and reconciles the task record when the process has died.

use parking_lot::Mutex;
use sysinfo::{Pid, ProcessStatus, System};

use sa_domain::error::Result;
use sa_domain::task::{TaskRecord, TaskStatus};
use sa_domain::trace::TraceEvent;
use sa_store::{PubSub, StoreAdapter};

#[derive(Debug, Clone, Copy, PartialEq)]
pub struct ProbeResult {
    pub alive: bool,
    pub pid: Option<u32>,
    pub cpu_percent: Option<f32>,
}

fn is_alive_status(status: ProcessStatus) -> bool {
    matches!(
        status,
        ProcessStatus::Run | ProcessStatus::Sleep | ProcessStatus::Idle | ProcessStatus::UninterruptibleDiskSleep
    )
}

pub struct LivenessProbe {
    system: Mutex<System>,
}

impl LivenessProbe {
    pub fn new() -> Self {
        Self {
            system: Mutex::new(System::new_all()),
        }
    }

    /// Query the OS directly for `pid`'s status, without touching the store.
    pub fn probe_pid(&self, pid: u32) -> ProbeResult {
        let mut system = self.system.lock();
        system.refresh_all();
        let sys_pid = Pid::from_u32(pid);
        match system.process(sys_pid) {
            Some(proc) if is_alive_status(proc.status()) => ProbeResult {
                alive: true,
                pid: Some(pid),
                cpu_percent: Some(proc.cpu_usage()),
            },
            _ => ProbeResult {
                alive: false,
                pid: None,
                cpu_percent: None,
            },
        }
    }

    /// Probe a task's recorded pid, reconciling the task record in the store
    /// when the process has died (SPEC_FULL.md §4.2). A task with no
    /// recorded pid is reported dead without consulting the OS.
    pub fn probe(&self, store: &StoreAdapter, pubsub: &PubSub<String>, task_id: &str) -> Result<ProbeResult> {
        let key = format!("task_data:{task_id}");
        let Some(mut record): Option<TaskRecord> = store.get(&key)? else {
            return Ok(ProbeResult { alive: false, pid: None, cpu_percent: None });
        };
        let Some(pid) = record.pid else {
            return Ok(ProbeResult { alive: false, pid: None, cpu_percent: None });
        };

        let result = self.probe_pid(pid);
        if !result.alive {
            let was_alive = record.status == TaskStatus::Running;
            record.mark_stopped();
            store.set(&key, &record)?;
            pubsub.publish(&format!("task:{task_id}"), "process_ended".to_string());
            TraceEvent::LivenessReconciled {
                task_id: task_id.to_string(),
                was_alive,
                now_alive: false,
            }
            .emit();
        }
        Ok(result)
    }
}

impl Default for LivenessProbe {
    fn default() -> Self {
        Self::new()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn store() -> StoreAdapter {
        let dir = tempfile::tempdir().unwrap();
        StoreAdapter::new(dir.into_path()).unwrap()
    }

    #[test]
    fn no_task_record_is_dead() {
        let probe = LivenessProbe::new();
        let store = store();
        let pubsub = PubSub::default();
        let result = probe.probe(&store, &pubsub, "ghost").unwrap();
        assert!(!result.alive);
    }

    #[test]
    fn task_with_no_pid_is_dead_without_os_query() {
        let probe = LivenessProbe::new();
        let store = store();
        let pubsub = PubSub::default();
        store.set("task_data:t1", &TaskRecord::new("t1", "model-a")).unwrap();
        let result = probe.probe(&store, &pubsub, "t1").unwrap();
        assert!(!result.alive);
    }

    #[test]
    fn task_with_nonexistent_pid_is_reconciled_to_stopped() {
        let probe = LivenessProbe::new();
        let store = store();
        let pubsub = PubSub::default();
        let mut task = TaskRecord::new("t1", "model-a");
        // An implausible pid that should not correspond to a live process.
        task.mark_running(u32::MAX - 1);
        store.set("task_data:t1", &task).unwrap();

        let result = probe.probe(&store, &pubsub, "t1").unwrap();
        assert!(!result.alive);

        let reconciled: TaskRecord = store.get("task_data:t1").unwrap().unwrap();
        assert_eq!(reconciled.status, TaskStatus::Stopped);
        assert!(reconciled.pid.is_none());
    }

    #[test]
    fn current_process_pid_is_alive() {
        let probe = LivenessProbe::new();
        let pid = std::process::id();
        let result = probe.probe_pid(pid);
        assert!(result.alive);
    }
}
