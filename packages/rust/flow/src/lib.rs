//! Minimal workflow engine for staged document generation.
//!
//! Units of work implement a three-phase contract against a [`SharedStore`]:
//! `prepare` reads the store, `execute` does the slow (retryable) work, and
//! `finalize` writes results back and names the transition to follow.
//! A [`Flow`] wires units together by transition name and drives them one at
//! a time from its start unit until no edge matches.

pub mod batch;
pub mod graph;
pub mod node;
pub mod observer;
pub mod retry;
pub mod store;

pub use batch::{BatchNode, BatchTask};
pub use graph::{Activation, EdgeBuilder, Flow, FlowReport, NodeId};
pub use node::{Activate, ActivationContext, DEFAULT_TRANSITION, Node, Task};
pub use observer::{FlowObserver, SilentObserver};
pub use retry::{
    RecordingSleeper, RetryPolicy, Sleeper, TokioSleeper, retry_with_backoff,
    retry_with_backoff_notify,
};
pub use store::{Compartment, SharedStore};
