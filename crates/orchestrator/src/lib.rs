//! Task orchestrator: the nine components that together launch, drive, and
//! retire per-task worker processes (SPEC_FULL.md §4).

pub mod completion;
pub mod dispatch;
pub mod ingest;
pub mod iteration;
pub mod lifecycle;
pub mod liveness;
pub mod repair;
pub mod throttle;

pub use dispatch::{ToolHandler, ToolRegistry};
pub use iteration::IterationEngine;
pub use lifecycle::{LaunchOutcome, LaunchRequest, TaskLifecycleManager};
pub use liveness::{LivenessProbe, ProbeResult};
pub use throttle::{ChatOutcome, ThrottleCoordinator};
