//! Store Adapter (C1) for the task orchestrator: a namespaced, file-backed
//! JSON-document store with atomic per-key operations, plus pub/sub channels
//! layered over the same key namespace for conversation and throttle-state
//! convergence notifications.

pub mod adapter;
pub mod pubsub;

pub use adapter::StoreAdapter;
pub use pubsub::PubSub;
