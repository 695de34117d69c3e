//! Progress hooks invoked by the flow driver.

use std::time::Duration;

use reportflow_shared::ReportFlowError;

/// Receives lifecycle events from a running [`Flow`](crate::Flow).
///
/// All methods default to no-ops so implementors pick what they display.
pub trait FlowObserver: Send + Sync {
    fn node_started(&self, _node: &str) {}

    /// An execute attempt failed and will be retried after `delay`.
    fn retrying(&self, _node: &str, _attempt: u32, _delay: Duration, _error: &ReportFlowError) {}

    /// One item of a batch unit completed.
    fn item_finished(&self, _node: &str, _completed: usize, _total: usize) {}

    fn node_finished(&self, _node: &str, _transition: &str) {}

    fn node_failed(&self, _node: &str, _error: &ReportFlowError) {}
}

/// Observer that ignores every event.
#[derive(Debug, Default, Clone, Copy)]
pub struct SilentObserver;

impl FlowObserver for SilentObserver {}
