//! Flow wiring and the run driver.

use std::collections::HashMap;
use std::fmt;
use std::sync::Arc;
use std::time::{Duration, Instant};

use tracing::{info, instrument};

use reportflow_shared::{ReportFlowError, Result};

use crate::node::{Activate, ActivationContext, DEFAULT_TRANSITION};
use crate::observer::{FlowObserver, SilentObserver};
use crate::retry::{Sleeper, TokioSleeper};
use crate::store::SharedStore;

/// Upper bound on activations in one run, guarding against transition cycles.
const DEFAULT_MAX_ACTIVATIONS: usize = 10_000;

/// Handle to a unit registered in a [`Flow`].
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub struct NodeId(usize);

/// One completed unit activation.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Activation {
    pub node: String,
    pub transition: String,
}

/// Summary of a successful run.
#[derive(Debug, Clone)]
pub struct FlowReport {
    pub activations: Vec<Activation>,
    pub elapsed: Duration,
}

impl FlowReport {
    /// Unit names in activation order.
    pub fn path(&self) -> Vec<&str> {
        self.activations.iter().map(|a| a.node.as_str()).collect()
    }
}

/// A directed graph of units linked by named transitions.
pub struct Flow {
    units: Vec<Box<dyn Activate>>,
    edges: HashMap<(NodeId, String), NodeId>,
    start: Option<NodeId>,
    sleeper: Arc<dyn Sleeper>,
    observer: Arc<dyn FlowObserver>,
    max_activations: usize,
}

impl Default for Flow {
    fn default() -> Self {
        Self::new()
    }
}

impl fmt::Debug for Flow {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let names: Vec<&str> = self.units.iter().map(|u| u.name()).collect();
        f.debug_struct("Flow")
            .field("units", &names)
            .field("edges", &self.edges.len())
            .field("start", &self.start)
            .finish()
    }
}

/// Pending edge created by [`Flow::on`].
pub struct EdgeBuilder<'a> {
    flow: &'a mut Flow,
    from: NodeId,
    transition: String,
}

impl<'a> EdgeBuilder<'a> {
    /// Route the pending transition to `target`.
    pub fn to(self, target: NodeId) -> &'a mut Flow {
        self.flow.edges.insert((self.from, self.transition), target);
        self.flow
    }
}

impl Flow {
    pub fn new() -> Self {
        Self {
            units: Vec::new(),
            edges: HashMap::new(),
            start: None,
            sleeper: Arc::new(TokioSleeper),
            observer: Arc::new(SilentObserver),
            max_activations: DEFAULT_MAX_ACTIVATIONS,
        }
    }

    /// Register a unit. The first registered unit is the start unit.
    pub fn add(&mut self, unit: impl Activate + 'static) -> NodeId {
        let id = NodeId(self.units.len());
        self.units.push(Box::new(unit));
        if self.start.is_none() {
            self.start = Some(id);
        }
        id
    }

    pub fn set_start(&mut self, id: NodeId) -> &mut Self {
        self.start = Some(id);
        self
    }

    /// Wire the default transition of `from` to `to`.
    pub fn link(&mut self, from: NodeId, to: NodeId) -> &mut Self {
        self.on(from, DEFAULT_TRANSITION).to(to)
    }

    /// Begin wiring the named transition of `from`.
    pub fn on(&mut self, from: NodeId, transition: impl Into<String>) -> EdgeBuilder<'_> {
        EdgeBuilder {
            flow: self,
            from,
            transition: transition.into(),
        }
    }

    /// Successor of `from` under `transition`, if wired.
    pub fn successor(&self, from: NodeId, transition: &str) -> Option<NodeId> {
        self.edges.get(&(from, transition.to_string())).copied()
    }

    pub fn with_sleeper(mut self, sleeper: Arc<dyn Sleeper>) -> Self {
        self.sleeper = sleeper;
        self
    }

    pub fn with_observer(mut self, observer: Arc<dyn FlowObserver>) -> Self {
        self.observer = observer;
        self
    }

    pub fn with_max_activations(mut self, max: usize) -> Self {
        self.max_activations = max.max(1);
        self
    }

    pub fn len(&self) -> usize {
        self.units.len()
    }

    pub fn is_empty(&self) -> bool {
        self.units.is_empty()
    }

    /// Drive the flow from its start unit until no edge matches a transition.
    ///
    /// Units activate one at a time. The first unit error aborts the run and
    /// is returned unchanged; writes made by earlier units stay in `store`.
    #[instrument(skip_all, fields(units = self.units.len()))]
    pub async fn run(&self, store: &mut SharedStore) -> Result<FlowReport> {
        let started = Instant::now();
        let mut current = self
            .start
            .ok_or_else(|| ReportFlowError::validation("flow has no units"))?;

        let ctx = ActivationContext {
            sleeper: self.sleeper.as_ref(),
            observer: self.observer.as_ref(),
        };
        let mut activations = Vec::new();

        loop {
            if activations.len() >= self.max_activations {
                return Err(ReportFlowError::validation(format!(
                    "flow exceeded {} activations; check for a transition cycle",
                    self.max_activations
                )));
            }

            let unit = self.units.get(current.0).ok_or_else(|| {
                ReportFlowError::validation(format!("unknown unit id {}", current.0))
            })?;
            let name = unit.name().to_string();

            info!(unit = %name, "activating");
            self.observer.node_started(&name);

            let transition = match unit.activate(store, &ctx).await {
                Ok(t) => t,
                Err(err) => {
                    self.observer.node_failed(&name, &err);
                    return Err(err);
                }
            };
            self.observer.node_finished(&name, &transition);

            let next = self.edges.get(&(current, transition.clone())).copied();
            activations.push(Activation {
                node: name,
                transition,
            });

            match next {
                Some(id) => current = id,
                None => break,
            }
        }

        let elapsed = started.elapsed();
        info!(
            activations = activations.len(),
            elapsed_ms = elapsed.as_millis() as u64,
            "flow complete"
        );
        Ok(FlowReport {
            activations,
            elapsed,
        })
    }
}
