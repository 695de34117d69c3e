//! The three-phase unit contract and its retrying wrapper.

use async_trait::async_trait;
use tracing::{debug, instrument};

use reportflow_shared::Result;

use crate::observer::FlowObserver;
use crate::retry::{RetryPolicy, Sleeper, retry_with_backoff_notify};
use crate::store::SharedStore;

/// Transition name followed when a unit does not pick a branch.
pub const DEFAULT_TRANSITION: &str = "default";

/// A single unit of work.
///
/// `prepare` and `finalize` run exactly once per activation; `execute` may run
/// several times under the unit's [`RetryPolicy`] and must not touch the store.
#[async_trait]
pub trait Node: Send + Sync {
    /// Data extracted from the store for `execute`.
    type Prepared: Send + Sync;
    /// Result of a successful `execute`.
    type Output: Send;

    fn name(&self) -> &str;

    fn prepare(&self, store: &SharedStore) -> Result<Self::Prepared>;

    async fn execute(&self, prepared: &Self::Prepared) -> Result<Self::Output>;

    /// Write results into the store and return the transition to follow.
    fn finalize(
        &self,
        store: &mut SharedStore,
        prepared: Self::Prepared,
        output: Self::Output,
    ) -> Result<String>;
}

/// Services the driver lends to a unit during activation.
pub struct ActivationContext<'a> {
    pub sleeper: &'a dyn Sleeper,
    pub observer: &'a dyn FlowObserver,
}

/// Object-safe form of a runnable unit, as stored in a [`Flow`](crate::Flow).
#[async_trait]
pub trait Activate: Send + Sync {
    fn name(&self) -> &str;

    /// Run prepare, execute (with retries) and finalize against `store`.
    async fn activate(
        &self,
        store: &mut SharedStore,
        ctx: &ActivationContext<'_>,
    ) -> Result<String>;
}

/// A [`Node`] paired with its retry policy.
pub struct Task<N> {
    node: N,
    policy: RetryPolicy,
}

impl<N: Node> Task<N> {
    pub fn new(node: N) -> Self {
        Self {
            node,
            policy: RetryPolicy::default(),
        }
    }

    pub fn with_policy(mut self, policy: RetryPolicy) -> Self {
        self.policy = policy;
        self
    }

    pub fn policy(&self) -> &RetryPolicy {
        &self.policy
    }

    pub fn node(&self) -> &N {
        &self.node
    }
}

#[async_trait]
impl<N: Node + 'static> Activate for Task<N> {
    fn name(&self) -> &str {
        self.node.name()
    }

    #[instrument(skip_all, fields(node = %self.node.name()))]
    async fn activate(
        &self,
        store: &mut SharedStore,
        ctx: &ActivationContext<'_>,
    ) -> Result<String> {
        let prepared = self.node.prepare(store)?;
        debug!("prepared");

        let name = self.node.name();
        let output = retry_with_backoff_notify(
            &self.policy,
            ctx.sleeper,
            |attempt, delay, err| ctx.observer.retrying(name, attempt, delay, err),
            |_| self.node.execute(&prepared),
        )
        .await?;

        let transition = self.node.finalize(store, prepared, output)?;
        debug!(%transition, "finalized");
        Ok(transition)
    }
}
