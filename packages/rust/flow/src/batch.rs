//! Units that execute once per item of a prepared list.

use std::sync::atomic::{AtomicUsize, Ordering};

use async_trait::async_trait;
use futures::future::{BoxFuture, FutureExt};
use futures::{StreamExt, TryStreamExt, stream};
use tracing::{debug, instrument};

use reportflow_shared::{ReportFlowError, Result};

use crate::node::{Activate, ActivationContext};
use crate::retry::{RetryPolicy, retry_with_backoff_notify};
use crate::store::SharedStore;

/// A unit whose execute phase runs per item.
///
/// `finalize` receives outputs in item order. If any item fails after its
/// retries, the whole unit fails and `finalize` is not called.
#[async_trait]
pub trait BatchNode: Send + Sync {
    type Item: Send + Sync;
    type Output: Send + Sync;

    fn name(&self) -> &str;

    fn prepare(&self, store: &SharedStore) -> Result<Vec<Self::Item>>;

    /// Process one item. `previous` is the output of the item before it when
    /// items run sequentially, and always `None` under concurrency.
    async fn execute_item(
        &self,
        item: &Self::Item,
        previous: Option<&Self::Output>,
    ) -> Result<Self::Output>;

    fn finalize(
        &self,
        store: &mut SharedStore,
        items: Vec<Self::Item>,
        outputs: Vec<Self::Output>,
    ) -> Result<String>;
}

/// A [`BatchNode`] with its retry policy and item concurrency.
pub struct BatchTask<B> {
    node: B,
    policy: RetryPolicy,
    concurrency: usize,
}

impl<B: BatchNode> BatchTask<B> {
    pub fn new(node: B) -> Self {
        Self {
            node,
            policy: RetryPolicy::default(),
            concurrency: 1,
        }
    }

    pub fn with_policy(mut self, policy: RetryPolicy) -> Self {
        self.policy = policy;
        self
    }

    /// Items in flight at once; values below 1 behave as 1.
    pub fn with_concurrency(mut self, concurrency: usize) -> Self {
        self.concurrency = concurrency.max(1);
        self
    }

    pub fn node(&self) -> &B {
        &self.node
    }

    async fn run_sequential(
        &self,
        items: &[B::Item],
        ctx: &ActivationContext<'_>,
    ) -> Result<Vec<B::Output>> {
        let name = self.node.name();
        let mut outputs: Vec<B::Output> = Vec::with_capacity(items.len());

        for (i, item) in items.iter().enumerate() {
            let previous = outputs.last();
            let output = retry_with_backoff_notify(
                &self.policy,
                ctx.sleeper,
                |attempt, delay, err| ctx.observer.retrying(name, attempt, delay, err),
                |_| self.node.execute_item(item, previous),
            )
            .await?;
            outputs.push(output);
            ctx.observer.item_finished(name, i + 1, items.len());
        }

        Ok(outputs)
    }

    async fn run_concurrent(
        &self,
        items: &[B::Item],
        ctx: &ActivationContext<'_>,
    ) -> Result<Vec<B::Output>> {
        let name = self.node.name();
        let total = items.len();
        let finished = AtomicUsize::new(0);
        let finished = &finished;

        let futures: Vec<BoxFuture<'_, Result<B::Output>>> = items
            .iter()
            .map(|item| {
                async move {
                    let output = retry_with_backoff_notify(
                        &self.policy,
                        ctx.sleeper,
                        |attempt, delay, err| ctx.observer.retrying(name, attempt, delay, err),
                        |_| self.node.execute_item(item, None),
                    )
                    .await?;
                    let completed = finished.fetch_add(1, Ordering::Relaxed) + 1;
                    ctx.observer.item_finished(name, completed, total);
                    Ok::<_, ReportFlowError>(output)
                }
                .boxed()
            })
            .collect();

        stream::iter(futures)
            .buffered(self.concurrency)
            .try_collect()
            .await
    }
}

#[async_trait]
impl<B: BatchNode + 'static> Activate for BatchTask<B> {
    fn name(&self) -> &str {
        self.node.name()
    }

    #[instrument(skip_all, fields(node = %self.node.name(), concurrency = self.concurrency))]
    async fn activate(
        &self,
        store: &mut SharedStore,
        ctx: &ActivationContext<'_>,
    ) -> Result<String> {
        let items = self.node.prepare(store)?;
        debug!(items = items.len(), "prepared batch");

        let outputs = if self.concurrency > 1 {
            self.run_concurrent(&items, ctx).await?
        } else {
            self.run_sequential(&items, ctx).await?
        };

        let transition = self.node.finalize(store, items, outputs)?;
        debug!(%transition, "finalized batch");
        Ok(transition)
    }
}
